//! Provider and configuration error types.

use thiserror::Error;

pub use probforge_core::error::ProviderError;

/// Problems with the configuration that must stop the process at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The default provider is not defined under `[providers]`.
    #[error("default provider '{name}' is not configured (available: {available:?})")]
    MissingProvider {
        name: String,
        available: Vec<String>,
    },

    /// A provider that needs a credential has none after env resolution.
    #[error("provider '{0}' has no API key; set it in the config or the environment")]
    MissingApiKey(String),

    /// A provider that needs an endpoint has none.
    #[error("provider '{0}' has an empty base_url")]
    MissingEndpoint(String),

    /// No default model is set.
    #[error("default_model must not be empty")]
    MissingModel,

    /// A numeric setting is out of range.
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    /// The HTTP client for a provider could not be built.
    #[error("failed to build HTTP client for provider '{name}': {reason}")]
    Client { name: String, reason: String },
}

/// Map a reqwest send error to a [`ProviderError`].
pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

/// Turn an HTTP error status into a [`ProviderError`], passing successful
/// responses through.
///
/// 429 honours `retry-after` (seconds, default 5), 401/403 are auth failures,
/// 404 means the model is unknown to the backend.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    if status == 429 {
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5)
            * 1000;
        return Err(ProviderError::RateLimited { retry_after_ms });
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        401 | 403 => ProviderError::AuthenticationFailed(body),
        404 => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError {
            status,
            message: body,
        },
    })
}

/// Build the shared HTTP client with a per-request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::NetworkError(format!("failed to build HTTP client: {e}")))
}
