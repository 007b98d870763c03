//! probforge-store — persistent storage for problems and exams.
//!
//! [`SqliteStore`] implements `probforge_core::traits::ContentStore` on top of
//! a sqlx SQLite pool.

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStore, StoreInitError};
