//! Request extractors shared by the route modules.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::response::AppError;

/// Header naming the calling user. Authentication happens upstream.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Caller identity from the `x-owner-id` header, if any.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Option<Uuid>);

impl Caller {
    /// The caller's id, or a validation error when the header is absent.
    pub fn require(self) -> Result<Uuid, AppError> {
        self.0
            .ok_or_else(|| AppError::validation(format!("{OWNER_HEADER} header is required")))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(OWNER_HEADER) else {
            return Ok(Caller(None));
        };
        let raw = value
            .to_str()
            .map_err(|_| AppError::validation(format!("{OWNER_HEADER} must be ASCII")))?;
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::validation(format!("{OWNER_HEADER} is not a valid UUID")))?;
        Ok(Caller(Some(id)))
    }
}
