//! probforge-providers — LLM provider integrations and configuration.
//!
//! Implements the `LlmProvider` trait for OpenAI, Anthropic, Gemini and Ollama, and
//! loads the `probforge.toml` configuration that selects among them.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{
    create_provider, load_config, load_config_from, ProbforgeConfig, ProviderConfig, ServerConfig,
};
pub use error::{ConfigError, ProviderError};
pub use mock::MockProvider;
