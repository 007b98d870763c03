//! "Generate similar problem" orchestrator.
//!
//! Runs `FetchOriginal → Generate → Persist → Done` once per request. Each
//! stage can end the run in a [`VariantFailure`]; nothing is written unless
//! `Persist` completes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, GenerationError, ProviderError};
use crate::lineage::LineageManager;
use crate::model::{GeneratedVariant, Problem, VariantOverrides};
use crate::traits::{ContentStore, VariantGenerator};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Stages of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantStage {
    FetchOriginal,
    Generate,
    Persist,
    Done,
}

impl fmt::Display for VariantStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantStage::FetchOriginal => write!(f, "fetch_original"),
            VariantStage::Generate => write!(f, "generate"),
            VariantStage::Persist => write!(f, "persist"),
            VariantStage::Done => write!(f, "done"),
        }
    }
}

/// Terminal failure of an orchestrator run.
#[derive(Debug, Error)]
pub enum VariantFailure {
    #[error("original problem not found: {0}")]
    OriginalMissing(Uuid),

    /// The request itself was invalid (e.g. an out-of-range override).
    #[error("invalid variant request: {0}")]
    InvalidRequest(#[source] Error),

    #[error("failed to load original problem: {0}")]
    FetchFailed(#[source] Error),

    #[error("variant generation failed: {0}")]
    GenerationFailed(#[source] GenerationError),

    #[error("failed to persist generated variant: {0}")]
    PersistFailed(#[source] Error),
}

impl VariantFailure {
    /// Stage the run was in when it failed.
    pub fn stage(&self) -> VariantStage {
        match self {
            VariantFailure::OriginalMissing(_)
            | VariantFailure::InvalidRequest(_)
            | VariantFailure::FetchFailed(_) => VariantStage::FetchOriginal,
            VariantFailure::GenerationFailed(_) => VariantStage::Generate,
            VariantFailure::PersistFailed(_) => VariantStage::Persist,
        }
    }
}

/// Bounded retry for transient generation failures.
#[derive(Debug, Clone)]
pub struct GenerationRetry {
    /// Total attempts, including the first one. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub initial_delay: Duration,
}

impl GenerationRetry {
    /// A single attempt, never retried.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
        }
    }
}

impl Default for GenerationRetry {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Coordinates the content store, generator and lineage manager for the
/// variant use case.
pub struct VariantOrchestrator {
    store: Arc<dyn ContentStore>,
    generator: Arc<dyn VariantGenerator>,
    lineage: Arc<LineageManager>,
    retry: GenerationRetry,
}

impl VariantOrchestrator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        generator: Arc<dyn VariantGenerator>,
        lineage: Arc<LineageManager>,
    ) -> Self {
        Self {
            store,
            generator,
            lineage,
            retry: GenerationRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: GenerationRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Generate a variant of `problem_id` and persist it as its child.
    #[instrument(skip_all, fields(problem_id = %problem_id))]
    pub async fn generate_similar(
        &self,
        problem_id: Uuid,
        overrides: &VariantOverrides,
    ) -> Result<Problem, VariantFailure> {
        debug!(stage = %VariantStage::FetchOriginal, "variant run started");
        let original = match self.store.get_problem(problem_id).await {
            Ok(p) => p,
            Err(Error::ProblemNotFound(id)) => return Err(VariantFailure::OriginalMissing(id)),
            Err(e) => return Err(VariantFailure::FetchFailed(e)),
        };
        let (subject, _) = overrides
            .resolve(&original)
            .map_err(VariantFailure::InvalidRequest)?;

        debug!(stage = %VariantStage::Generate, subject = %subject, "requesting variant");
        let generated = self
            .generate_with_retry(&original.content, &subject)
            .await
            .map_err(|e| {
                warn!(error = %e, "variant generation failed");
                VariantFailure::GenerationFailed(e)
            })?;

        debug!(stage = %VariantStage::Persist, "persisting variant");
        let variant = self
            .lineage
            .create_variant(original.id, generated, overrides)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    "generated variant discarded: persistence failed after a successful generation call"
                );
                VariantFailure::PersistFailed(e)
            })?;

        info!(stage = %VariantStage::Done, variant_id = %variant.id, "variant run finished");
        Ok(variant)
    }

    async fn generate_with_retry(
        &self,
        content: &str,
        subject: &str,
    ) -> Result<GeneratedVariant, GenerationError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut delay = self.retry.initial_delay;
        let mut attempt = 1;

        loop {
            match self.generate_once(content, subject).await {
                Ok(variant) => return Ok(variant),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    // Honour the provider's retry-after hint when rate limited
                    if let GenerationError::Unavailable(provider_err) = &e {
                        if let Some(ms) = provider_err.retry_after_ms() {
                            delay = Duration::from_millis(ms).min(MAX_RETRY_DELAY);
                        }
                    }
                    warn!(attempt, max_attempts, error = %e, delay_ms = delay.as_millis() as u64, "retrying variant generation");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One generator call on its own task. If the caller goes away mid-call
    /// the task still runs to completion and its result is dropped.
    async fn generate_once(
        &self,
        content: &str,
        subject: &str,
    ) -> Result<GeneratedVariant, GenerationError> {
        let generator = Arc::clone(&self.generator);
        let content = content.to_string();
        let subject = subject.to_string();
        let handle =
            tokio::spawn(async move { generator.generate_variant(&content, &subject).await });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(GenerationError::Unavailable(
                ProviderError::InvalidResponse(format!(
                    "generation task ended abnormally: {join_err}"
                )),
            )),
        }
    }
}
