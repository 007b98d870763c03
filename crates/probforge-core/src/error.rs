//! Error types.
//!
//! [`Error`] covers the content store, lineage and exam operations.
//! [`ProviderError`] describes transport-level failures of an LLM backend and
//! [`GenerationError`] is what the variant gateway reports to its callers.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by store, lineage and exam operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("problem not found: {0}")]
    ProblemNotFound(Uuid),

    #[error("parent problem not found: {0}")]
    ParentNotFound(Uuid),

    #[error("exam not found: {0}")]
    ExamNotFound(Uuid),

    #[error("problem {problem_id} is not part of exam {exam_id}")]
    LinkNotFound { exam_id: Uuid, problem_id: Uuid },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("problem {problem_id} is already linked to exam {exam_id}")]
    DuplicateLink { exam_id: Uuid, problem_id: Uuid },

    #[error("problem {id} is still referenced: {reason}")]
    ProblemInUse { id: Uuid, reason: String },

    /// Ancestry walk revisited a problem. Only possible with corrupted data.
    #[error("lineage cycle detected at problem {0}")]
    LineageCycle(Uuid),

    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Returns `true` for any of the "entity absent" variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ProblemNotFound(_)
                | Error::ParentNotFound(_)
                | Error::ExamNotFound(_)
                | Error::LinkNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The provider's response envelope could not be decoded.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Failure of the variant generator gateway.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The provider answered, but not with the `{content, solution}` schema.
    #[error("generated output did not match the expected schema: {0}")]
    Format(String),

    /// The provider could not be reached or refused the request.
    #[error("generation service unavailable: {0}")]
    Unavailable(#[from] ProviderError),
}

impl GenerationError {
    /// Whether re-issuing the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Format(_) => false,
            GenerationError::Unavailable(e) => !e.is_permanent(),
        }
    }
}
