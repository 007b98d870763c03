use std::sync::Arc;
use std::time::Instant;

use probforge_core::model::DeletePolicy;
use probforge_core::traits::{ContentStore, VariantGenerator};
use probforge_core::{ExamComposer, GenerationRetry, LineageManager, VariantOrchestrator};

/// Knobs for [`AppState::new`] that come from configuration.
#[derive(Debug, Clone, Default)]
pub struct StateOptions {
    pub delete_policy: DeletePolicy,
    pub retry: GenerationRetry,
}

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub lineage: Arc<LineageManager>,
    pub exams: Arc<ExamComposer>,
    pub orchestrator: Arc<VariantOrchestrator>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ContentStore>,
        generator: Arc<dyn VariantGenerator>,
        options: StateOptions,
    ) -> Self {
        let lineage = Arc::new(
            LineageManager::new(store.clone()).with_delete_policy(options.delete_policy),
        );
        let orchestrator = Arc::new(
            VariantOrchestrator::new(store.clone(), generator, lineage.clone())
                .with_retry(options.retry),
        );
        Self {
            lineage,
            exams: Arc::new(ExamComposer::new(store)),
            orchestrator,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
