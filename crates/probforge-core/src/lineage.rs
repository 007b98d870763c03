//! Lineage manager.
//!
//! Creates problems, including generated variants, and answers questions about
//! the parent → children tree. Ancestry is always resolved by repeated keyed
//! lookups through the [`ContentStore`], bounded by a visited set.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    DeleteOutcome, DeletePolicy, GeneratedVariant, NewProblem, Problem, ProblemDraft,
    ProblemFilter, VariantOverrides,
};
use crate::traits::ContentStore;

pub struct LineageManager {
    store: Arc<dyn ContentStore>,
    delete_policy: DeletePolicy,
}

impl LineageManager {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self {
            store,
            delete_policy: DeletePolicy::default(),
        }
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    /// Create a problem from a user draft. A draft naming a parent attaches
    /// the new problem below it.
    pub async fn create_problem(
        &self,
        draft: ProblemDraft,
        owner_id: Option<Uuid>,
    ) -> Result<Problem> {
        let new = draft.validate(owner_id)?;
        if let Some(parent_id) = new.parent_id {
            self.ensure_acyclic(parent_id).await?;
        }
        let problem = self.store.create_problem(new).await?;
        info!(problem_id = %problem.id, parent_id = ?problem.parent_id, "problem created");
        Ok(problem)
    }

    /// Persist a generated variant as a child of `parent_id`.
    ///
    /// Subject and difficulty come from the parent unless overridden. The
    /// owner always comes from the parent.
    pub async fn create_variant(
        &self,
        parent_id: Uuid,
        generated: GeneratedVariant,
        overrides: &VariantOverrides,
    ) -> Result<Problem> {
        let parent = self.load_parent(parent_id).await?;
        let (subject, difficulty) = overrides.resolve(&parent)?;
        if generated.content.trim().is_empty() {
            return Err(Error::Validation("generated content is empty".into()));
        }
        self.ensure_acyclic(parent.id).await?;

        let new = NewProblem {
            owner_id: parent.owner_id,
            parent_id: Some(parent.id),
            content: generated.content,
            solution: Some(generated.solution),
            subject,
            difficulty,
        };
        let variant = self.store.create_problem(new).await?;
        info!(problem_id = %variant.id, parent_id = %parent.id, "variant created");
        Ok(variant)
    }

    pub async fn get_problem(&self, id: Uuid) -> Result<Problem> {
        self.store.get_problem(id).await
    }

    pub async fn list_problems(&self, filter: &ProblemFilter) -> Result<Vec<Problem>> {
        self.store.list_problems(filter).await
    }

    /// Direct variants of a problem. Fails if the problem itself is absent.
    pub async fn list_children(&self, problem_id: Uuid) -> Result<Vec<Problem>> {
        self.store.get_problem(problem_id).await?;
        self.store.list_children(problem_id).await
    }

    /// Ancestors of a problem, root first, excluding the problem itself.
    ///
    /// A dangling parent reference ends the chain where it breaks. A revisited
    /// id fails with [`Error::LineageCycle`] instead of looping.
    pub async fn list_ancestors(&self, problem_id: Uuid) -> Result<Vec<Problem>> {
        let start = self.store.get_problem(problem_id).await?;
        let mut visited = HashSet::from([start.id]);
        let mut chain = Vec::new();
        let mut next = start.parent_id;

        while let Some(id) = next {
            if !visited.insert(id) {
                warn!(problem_id = %problem_id, revisited = %id, "cycle in problem lineage");
                return Err(Error::LineageCycle(id));
            }
            match self.store.get_problem(id).await {
                Ok(parent) => {
                    next = parent.parent_id;
                    chain.push(parent);
                }
                Err(Error::ProblemNotFound(_)) => {
                    warn!(problem_id = %problem_id, missing = %id, "lineage references a missing problem");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        chain.reverse();
        Ok(chain)
    }

    /// Delete a problem under the configured [`DeletePolicy`].
    pub async fn delete_problem(&self, problem_id: Uuid) -> Result<DeleteOutcome> {
        let outcome = self
            .store
            .delete_problem(problem_id, self.delete_policy)
            .await?;
        info!(
            problem_id = %problem_id,
            links_removed = outcome.links_removed,
            policy = %self.delete_policy,
            "problem deleted"
        );
        Ok(outcome)
    }

    async fn load_parent(&self, parent_id: Uuid) -> Result<Problem> {
        match self.store.get_problem(parent_id).await {
            Err(Error::ProblemNotFound(id)) => Err(Error::ParentNotFound(id)),
            other => other,
        }
    }

    /// Walk upward from the prospective parent and make sure the chain
    /// terminates. A new row has a fresh id, so the only way to close a loop is
    /// corrupted data above the parent; that is refused rather than extended.
    async fn ensure_acyclic(&self, parent_id: Uuid) -> Result<()> {
        let mut visited = HashSet::new();
        let mut next = Some(parent_id);
        while let Some(id) = next {
            if !visited.insert(id) {
                return Err(Error::LineageCycle(id));
            }
            next = match self.store.get_problem(id).await {
                Ok(p) => p.parent_id,
                Err(Error::ProblemNotFound(missing)) if missing == parent_id => {
                    return Err(Error::ParentNotFound(parent_id));
                }
                Err(Error::ProblemNotFound(_)) => None,
                Err(e) => return Err(e),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn manager() -> (Arc<InMemoryStore>, LineageManager) {
        let store = Arc::new(InMemoryStore::new());
        let manager = LineageManager::new(store.clone());
        (store, manager)
    }

    fn generated(content: &str) -> GeneratedVariant {
        GeneratedVariant {
            content: content.into(),
            solution: "worked".into(),
        }
    }

    #[tokio::test]
    async fn root_has_no_ancestors() {
        let (_, lineage) = manager();
        let root = lineage
            .create_problem(ProblemDraft::new("Solve x^2=4"), None)
            .await
            .unwrap();
        assert!(lineage.list_ancestors(root.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn chain_ancestors_are_root_first() {
        let (_, lineage) = manager();
        let p0 = lineage
            .create_problem(ProblemDraft::new("p0"), None)
            .await
            .unwrap();
        let mut chain = vec![p0.clone()];
        for i in 1..=4 {
            let parent = chain.last().unwrap().id;
            let child = lineage
                .create_variant(parent, generated(&format!("p{i}")), &VariantOverrides::default())
                .await
                .unwrap();
            chain.push(child);
        }

        let last = chain.last().unwrap().id;
        let ancestors: Vec<Uuid> = lineage
            .list_ancestors(last)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        let expected: Vec<Uuid> = chain[..chain.len() - 1].iter().map(|p| p.id).collect();
        assert_eq!(ancestors, expected);
    }

    #[tokio::test]
    async fn variant_inherits_from_parent() {
        let (_, lineage) = manager();
        let owner = Uuid::new_v4();
        let parent = lineage
            .create_problem(
                ProblemDraft::new("Solve x^2=4")
                    .with_subject("math")
                    .with_difficulty(2),
                Some(owner),
            )
            .await
            .unwrap();

        let variant = lineage
            .create_variant(
                parent.id,
                GeneratedVariant {
                    content: "Solve x^2=9".into(),
                    solution: "x=±3".into(),
                },
                &VariantOverrides::default(),
            )
            .await
            .unwrap();

        assert_eq!(variant.parent_id, Some(parent.id));
        assert_eq!(variant.subject, "math");
        assert_eq!(variant.difficulty, 2);
        assert_eq!(variant.owner_id, Some(owner));
        assert_eq!(variant.solution.as_deref(), Some("x=±3"));
    }

    #[tokio::test]
    async fn overrides_never_change_owner() {
        let (_, lineage) = manager();
        let owner = Uuid::new_v4();
        let parent = lineage
            .create_problem(ProblemDraft::new("v = d/t"), Some(owner))
            .await
            .unwrap();
        let overrides = VariantOverrides {
            subject: Some("physics".into()),
            difficulty: Some(3),
        };
        let variant = lineage
            .create_variant(parent.id, generated("v = 10/2"), &overrides)
            .await
            .unwrap();
        assert_eq!(variant.subject, "physics");
        assert_eq!(variant.difficulty, 3);
        assert_eq!(variant.owner_id, Some(owner));
    }

    #[tokio::test]
    async fn variant_of_missing_parent_fails_without_writing() {
        let (store, lineage) = manager();
        let missing = Uuid::new_v4();
        let err = lineage
            .create_variant(missing, generated("x"), &VariantOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParentNotFound(id) if id == missing));
        assert!(store
            .list_problems(&ProblemFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn draft_with_missing_parent_is_parent_not_found() {
        let (_, lineage) = manager();
        let err = lineage
            .create_problem(ProblemDraft::new("x").with_parent(Uuid::new_v4()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ParentNotFound(_)));
    }

    #[tokio::test]
    async fn children_lists_direct_variants_only() {
        let (_, lineage) = manager();
        let root = lineage
            .create_problem(ProblemDraft::new("root"), None)
            .await
            .unwrap();
        let a = lineage
            .create_variant(root.id, generated("a"), &VariantOverrides::default())
            .await
            .unwrap();
        let b = lineage
            .create_variant(root.id, generated("b"), &VariantOverrides::default())
            .await
            .unwrap();
        lineage
            .create_variant(a.id, generated("grandchild"), &VariantOverrides::default())
            .await
            .unwrap();

        let ids: Vec<Uuid> = lineage
            .list_children(root.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);

        assert!(lineage.list_children(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn ancestors_terminate_on_corrupted_cycle() {
        let (store, lineage) = manager();
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let template = NewProblem {
            owner_id: None,
            parent_id: None,
            content: "loop".into(),
            solution: None,
            subject: "math".into(),
            difficulty: 1,
        }
        .into_problem();

        store
            .insert_raw_problem(Problem {
                id: a_id,
                parent_id: Some(b_id),
                ..template.clone()
            })
            .await;
        store
            .insert_raw_problem(Problem {
                id: b_id,
                parent_id: Some(a_id),
                ..template
            })
            .await;

        let err = lineage.list_ancestors(a_id).await.unwrap_err();
        assert!(matches!(err, Error::LineageCycle(_)));

        let err = lineage
            .create_variant(a_id, generated("x"), &VariantOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LineageCycle(_)));
    }

    #[tokio::test]
    async fn ancestors_stop_at_dangling_reference() {
        let (store, lineage) = manager();
        let orphan = Problem {
            parent_id: Some(Uuid::new_v4()),
            ..NewProblem {
                owner_id: None,
                parent_id: None,
                content: "orphan".into(),
                solution: None,
                subject: "math".into(),
                difficulty: 1,
            }
            .into_problem()
        };
        store.insert_raw_problem(orphan.clone()).await;
        assert!(lineage.list_ancestors(orphan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_uses_configured_policy() {
        let (_, lineage) = manager();
        let lineage = lineage.with_delete_policy(DeletePolicy::Cascade);
        let p = lineage
            .create_problem(ProblemDraft::new("p"), None)
            .await
            .unwrap();
        let outcome = lineage.delete_problem(p.id).await.unwrap();
        assert_eq!(outcome.links_removed, 0);
        assert!(matches!(
            lineage.get_problem(p.id).await,
            Err(Error::ProblemNotFound(_))
        ));
    }
}
