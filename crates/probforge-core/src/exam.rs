//! Exam composer.
//!
//! Manages exams and the ordered problem links inside them. Ordering is by
//! `order_index` ascending; equal indices keep link creation order.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Exam, ExamDraft, ExamEntry, ExamProblem, Problem};
use crate::traits::ContentStore;

pub struct ExamComposer {
    store: Arc<dyn ContentStore>,
}

impl ExamComposer {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub async fn create_exam(&self, draft: ExamDraft, owner_id: Uuid) -> Result<Exam> {
        let exam = self.store.create_exam(draft.validate(owner_id)?).await?;
        info!(exam_id = %exam.id, "exam created");
        Ok(exam)
    }

    pub async fn get_exam(&self, exam_id: Uuid) -> Result<Exam> {
        self.store.get_exam(exam_id).await
    }

    pub async fn list_exams(&self, owner_id: Option<Uuid>) -> Result<Vec<Exam>> {
        self.store.list_exams(owner_id).await
    }

    /// Set the published flag. Repeating the same value is a no-op.
    pub async fn set_published(&self, exam_id: Uuid, published: bool) -> Result<Exam> {
        let exam = self.store.set_exam_published(exam_id, published).await?;
        info!(exam_id = %exam_id, published, "exam visibility changed");
        Ok(exam)
    }

    /// Attach a problem to an exam at `order_index`.
    ///
    /// Fails with `ExamNotFound`, `ProblemNotFound` or `DuplicateLink`; a failed
    /// call leaves the exam unchanged.
    pub async fn add_problem(
        &self,
        exam_id: Uuid,
        problem_id: Uuid,
        order_index: i32,
    ) -> Result<ExamProblem> {
        let link = self
            .store
            .create_link(ExamProblem {
                exam_id,
                problem_id,
                order_index,
            })
            .await?;
        debug!(exam_id = %exam_id, problem_id = %problem_id, order_index, "problem added to exam");
        Ok(link)
    }

    /// Move a problem within an exam. Applying the same index twice is a no-op.
    pub async fn reorder(
        &self,
        exam_id: Uuid,
        problem_id: Uuid,
        new_order_index: i32,
    ) -> Result<ExamProblem> {
        self.store
            .update_link_order(exam_id, problem_id, new_order_index)
            .await
    }

    /// Detach a problem from an exam. Removing an absent link succeeds.
    pub async fn remove_problem(&self, exam_id: Uuid, problem_id: Uuid) -> Result<()> {
        let removed = self.store.delete_link(exam_id, problem_id).await?;
        debug!(exam_id = %exam_id, problem_id = %problem_id, removed, "problem removed from exam");
        Ok(())
    }

    /// Problems of an exam in administration order.
    pub async fn list_problems(&self, exam_id: Uuid) -> Result<Vec<Problem>> {
        Ok(self
            .store
            .list_exam_problems(exam_id)
            .await?
            .into_iter()
            .map(|(_, problem)| problem)
            .collect())
    }

    /// Like [`Self::list_problems`], keeping each problem's `order_index`.
    pub async fn list_entries(&self, exam_id: Uuid) -> Result<Vec<ExamEntry>> {
        Ok(self
            .store
            .list_exam_problems(exam_id)
            .await?
            .into_iter()
            .map(|(link, problem)| ExamEntry {
                order_index: link.order_index,
                problem,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::ProblemDraft;
    use crate::store::InMemoryStore;
    use crate::traits::ContentStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        composer: ExamComposer,
        exam: Exam,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let composer = ExamComposer::new(store.clone());
        let exam = composer
            .create_exam(ExamDraft::new("Quadratics quiz"), Uuid::new_v4())
            .await
            .unwrap();
        Fixture {
            store,
            composer,
            exam,
        }
    }

    async fn problem(store: &InMemoryStore, content: &str) -> Problem {
        store
            .create_problem(ProblemDraft::new(content).validate(None).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn list_sorts_by_order_index() {
        let f = fixture().await;
        let three = problem(&f.store, "three").await;
        let one = problem(&f.store, "one").await;
        let two = problem(&f.store, "two").await;

        f.composer.add_problem(f.exam.id, three.id, 3).await.unwrap();
        f.composer.add_problem(f.exam.id, one.id, 1).await.unwrap();
        f.composer.add_problem(f.exam.id, two.id, 2).await.unwrap();

        let contents: Vec<String> = f
            .composer
            .list_problems(f.exam.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn duplicate_add_fails_and_keeps_state() {
        let f = fixture().await;
        let p = problem(&f.store, "p").await;

        f.composer.add_problem(f.exam.id, p.id, 1).await.unwrap();
        let err = f
            .composer
            .add_problem(f.exam.id, p.id, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateLink { .. }));

        let entries = f.composer.list_entries(f.exam.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].order_index, 1);
    }

    #[tokio::test]
    async fn add_requires_both_sides() {
        let f = fixture().await;
        let p = problem(&f.store, "p").await;

        let err = f
            .composer
            .add_problem(Uuid::new_v4(), p.id, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExamNotFound(_)));

        let err = f
            .composer
            .add_problem(f.exam.id, Uuid::new_v4(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProblemNotFound(_)));
    }

    #[tokio::test]
    async fn reorder_is_idempotent() {
        let f = fixture().await;
        let a = problem(&f.store, "a").await;
        let b = problem(&f.store, "b").await;
        f.composer.add_problem(f.exam.id, a.id, 1).await.unwrap();
        f.composer.add_problem(f.exam.id, b.id, 2).await.unwrap();

        let first = f.composer.reorder(f.exam.id, a.id, 10).await.unwrap();
        let second = f.composer.reorder(f.exam.id, a.id, 10).await.unwrap();
        assert_eq!(first, second);

        let contents: Vec<String> = f
            .composer
            .list_problems(f.exam.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.content)
            .collect();
        assert_eq!(contents, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn reorder_missing_link_fails() {
        let f = fixture().await;
        let p = problem(&f.store, "p").await;
        let err = f.composer.reorder(f.exam.id, p.id, 1).await.unwrap_err();
        assert!(matches!(err, Error::LinkNotFound { .. }));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let f = fixture().await;
        let p = problem(&f.store, "p").await;
        f.composer.add_problem(f.exam.id, p.id, 1).await.unwrap();

        f.composer.remove_problem(f.exam.id, p.id).await.unwrap();
        f.composer.remove_problem(f.exam.id, p.id).await.unwrap();
        assert!(f.composer.list_problems(f.exam.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let f = fixture().await;
        let err = f
            .composer
            .create_exam(ExamDraft::new(" "), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn list_exams_filters_by_owner() {
        let f = fixture().await;
        let other_owner = Uuid::new_v4();
        f.composer
            .create_exam(ExamDraft::new("Other"), other_owner)
            .await
            .unwrap();

        assert_eq!(f.composer.list_exams(None).await.unwrap().len(), 2);
        let mine = f.composer.list_exams(Some(f.exam.owner_id)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, f.exam.id);
    }
}
