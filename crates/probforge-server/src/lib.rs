//! probforge-server — HTTP API over the probforge core.
//!
//! Exposes problems, their lineage, variant generation and exams as JSON
//! routes. Errors share one body shape, see [`response::AppError`].

pub mod extract;
pub mod response;
pub mod routes;
pub mod state;

pub use response::AppError;
pub use routes::router;
pub use state::{AppState, StateOptions};
