//! probforge-core — problem lineage, exam composition and variant generation.
//!
//! This crate defines the data model, the storage and provider traits, and the
//! components built on them: the variant gateway, the lineage manager, the
//! exam composer and the orchestrator for the "generate similar problem" flow.

pub mod error;
pub mod exam;
pub mod gateway;
pub mod lineage;
pub mod model;
pub mod orchestrator;
pub mod store;
pub mod traits;

pub use error::{Error, GenerationError, ProviderError, Result};
pub use exam::ExamComposer;
pub use gateway::{GatewaySettings, VariantGateway};
pub use lineage::LineageManager;
pub use orchestrator::{GenerationRetry, VariantFailure, VariantOrchestrator, VariantStage};
pub use store::InMemoryStore;
