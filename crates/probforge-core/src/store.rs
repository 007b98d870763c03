//! In-process [`ContentStore`].
//!
//! All tables live behind a single `RwLock`, so every trait method is one
//! critical section and therefore atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    DeleteOutcome, DeletePolicy, Exam, ExamProblem, NewExam, NewProblem, Problem, ProblemFilter,
};
use crate::traits::ContentStore;

#[derive(Debug)]
struct LinkRow {
    link: ExamProblem,
    /// Insertion sequence, used to break `order_index` ties.
    seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    problems: HashMap<Uuid, Problem>,
    problem_order: Vec<Uuid>,
    exams: HashMap<Uuid, Exam>,
    exam_order: Vec<Uuid>,
    links: HashMap<(Uuid, Uuid), LinkRow>,
    next_link_seq: u64,
}

/// A [`ContentStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed problem row without any integrity checks.
    ///
    /// Only meant for reproducing corrupted data in tests.
    #[doc(hidden)]
    pub async fn insert_raw_problem(&self, problem: Problem) {
        let mut tables = self.tables.write().await;
        tables.problem_order.push(problem.id);
        tables.problems.insert(problem.id, problem);
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn create_problem(&self, problem: NewProblem) -> Result<Problem> {
        let mut tables = self.tables.write().await;
        if let Some(parent_id) = problem.parent_id {
            if !tables.problems.contains_key(&parent_id) {
                return Err(Error::ParentNotFound(parent_id));
            }
        }
        let problem = problem.into_problem();
        tables.problem_order.push(problem.id);
        tables.problems.insert(problem.id, problem.clone());
        Ok(problem)
    }

    async fn get_problem(&self, id: Uuid) -> Result<Problem> {
        let tables = self.tables.read().await;
        tables
            .problems
            .get(&id)
            .cloned()
            .ok_or(Error::ProblemNotFound(id))
    }

    async fn list_problems(&self, filter: &ProblemFilter) -> Result<Vec<Problem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .problem_order
            .iter()
            .filter_map(|id| tables.problems.get(id))
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn list_children(&self, parent_id: Uuid) -> Result<Vec<Problem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .problem_order
            .iter()
            .filter_map(|id| tables.problems.get(id))
            .filter(|p| p.parent_id == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn delete_problem(&self, id: Uuid, policy: DeletePolicy) -> Result<DeleteOutcome> {
        let mut tables = self.tables.write().await;
        if !tables.problems.contains_key(&id) {
            return Err(Error::ProblemNotFound(id));
        }

        let children = tables
            .problems
            .values()
            .filter(|p| p.parent_id == Some(id))
            .count();
        if children > 0 {
            return Err(Error::ProblemInUse {
                id,
                reason: format!("{children} variant(s) derive from it"),
            });
        }

        let linked: Vec<(Uuid, Uuid)> = tables
            .links
            .keys()
            .filter(|(_, problem_id)| *problem_id == id)
            .copied()
            .collect();
        if !linked.is_empty() && policy == DeletePolicy::Reject {
            return Err(Error::ProblemInUse {
                id,
                reason: format!("linked into {} exam(s)", linked.len()),
            });
        }

        for key in &linked {
            tables.links.remove(key);
        }
        tables.problems.remove(&id);
        tables.problem_order.retain(|p| *p != id);

        Ok(DeleteOutcome {
            problem_id: id,
            links_removed: linked.len(),
        })
    }

    async fn create_exam(&self, exam: NewExam) -> Result<Exam> {
        let mut tables = self.tables.write().await;
        let exam = exam.into_exam();
        tables.exam_order.push(exam.id);
        tables.exams.insert(exam.id, exam.clone());
        Ok(exam)
    }

    async fn get_exam(&self, id: Uuid) -> Result<Exam> {
        let tables = self.tables.read().await;
        tables.exams.get(&id).cloned().ok_or(Error::ExamNotFound(id))
    }

    async fn list_exams(&self, owner_id: Option<Uuid>) -> Result<Vec<Exam>> {
        let tables = self.tables.read().await;
        Ok(tables
            .exam_order
            .iter()
            .filter_map(|id| tables.exams.get(id))
            .filter(|e| owner_id.map_or(true, |owner| e.owner_id == owner))
            .cloned()
            .collect())
    }

    async fn set_exam_published(&self, id: Uuid, published: bool) -> Result<Exam> {
        let mut tables = self.tables.write().await;
        let exam = tables.exams.get_mut(&id).ok_or(Error::ExamNotFound(id))?;
        exam.is_published = published;
        Ok(exam.clone())
    }

    async fn create_link(&self, link: ExamProblem) -> Result<ExamProblem> {
        let mut tables = self.tables.write().await;
        if !tables.exams.contains_key(&link.exam_id) {
            return Err(Error::ExamNotFound(link.exam_id));
        }
        if !tables.problems.contains_key(&link.problem_id) {
            return Err(Error::ProblemNotFound(link.problem_id));
        }
        let key = (link.exam_id, link.problem_id);
        if tables.links.contains_key(&key) {
            return Err(Error::DuplicateLink {
                exam_id: link.exam_id,
                problem_id: link.problem_id,
            });
        }
        let seq = tables.next_link_seq;
        tables.next_link_seq += 1;
        tables.links.insert(key, LinkRow { link, seq });
        Ok(link)
    }

    async fn update_link_order(
        &self,
        exam_id: Uuid,
        problem_id: Uuid,
        order_index: i32,
    ) -> Result<ExamProblem> {
        let mut tables = self.tables.write().await;
        let row = tables
            .links
            .get_mut(&(exam_id, problem_id))
            .ok_or(Error::LinkNotFound {
                exam_id,
                problem_id,
            })?;
        row.link.order_index = order_index;
        Ok(row.link)
    }

    async fn delete_link(&self, exam_id: Uuid, problem_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.links.remove(&(exam_id, problem_id)).is_some())
    }

    async fn list_exam_problems(&self, exam_id: Uuid) -> Result<Vec<(ExamProblem, Problem)>> {
        let tables = self.tables.read().await;
        if !tables.exams.contains_key(&exam_id) {
            return Err(Error::ExamNotFound(exam_id));
        }

        let mut rows: Vec<&LinkRow> = tables
            .links
            .values()
            .filter(|row| row.link.exam_id == exam_id)
            .collect();
        rows.sort_by_key(|row| (row.link.order_index, row.seq));

        rows.into_iter()
            .map(|row| {
                let problem = tables
                    .problems
                    .get(&row.link.problem_id)
                    .cloned()
                    .ok_or_else(|| {
                        Error::Storage(format!(
                            "exam {} links missing problem {}",
                            exam_id, row.link.problem_id
                        ))
                    })?;
                Ok((row.link, problem))
            })
            .collect()
    }
}
