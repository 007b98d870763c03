//! Configuration loading and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use probforge_core::model::DeletePolicy;
use probforge_core::traits::LlmProvider;
use probforge_core::{GatewaySettings, GenerationRetry};

use crate::anthropic::AnthropicProvider;
use crate::error::ConfigError;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "probforge.toml";

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

impl ProviderConfig {
    /// The `type` tag of this provider.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::OpenAI { .. } => "openai",
            ProviderConfig::Anthropic { .. } => "anthropic",
            ProviderConfig::Gemini { .. } => "gemini",
            ProviderConfig::Ollama { .. } => "ollama",
        }
    }

    fn resolved(&self) -> ProviderConfig {
        match self {
            ProviderConfig::OpenAI {
                api_key,
                base_url,
                org_id,
            } => ProviderConfig::OpenAI {
                api_key: resolve_env_vars(api_key),
                base_url: base_url.as_deref().map(resolve_env_vars),
                org_id: org_id.as_deref().map(resolve_env_vars),
            },
            ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
                api_key: resolve_env_vars(api_key),
                base_url: base_url.as_deref().map(resolve_env_vars),
            },
            ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
                api_key: resolve_env_vars(api_key),
                base_url: base_url.as_deref().map(resolve_env_vars),
            },
            ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
                base_url: resolve_env_vars(base_url),
            },
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// sqlx connection URL of the content database.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Tracing filter directive; `RUST_LOG` wins when set.
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_database_url() -> String {
    "sqlite://probforge.db".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database_url: default_database_url(),
            log_level: None,
        }
    }
}

/// Top-level probforge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbforgeConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider used for variant generation.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model used for variant generation.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Total generation attempts per request, including the first.
    #[serde(default = "default_attempts")]
    pub max_generation_attempts: u32,
    /// Delay before the first generation retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// What happens to exam links when a problem is deleted.
    #[serde(default)]
    pub delete_policy: DeletePolicy,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_attempts() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1000
}

impl Default for ProbforgeConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_generation_attempts: default_attempts(),
            retry_delay_ms: default_retry_delay(),
            delete_policy: DeletePolicy::default(),
            server: ServerConfig::default(),
        }
    }
}

impl ProbforgeConfig {
    /// Check that variant generation can work with this configuration.
    ///
    /// Run at startup so a missing key fails the process instead of the
    /// first generation request.
    pub fn validate_generation(&self) -> Result<(), ConfigError> {
        let provider = self.providers.get(&self.default_provider).ok_or_else(|| {
            let mut available: Vec<String> = self.providers.keys().cloned().collect();
            available.sort();
            ConfigError::MissingProvider {
                name: self.default_provider.clone(),
                available,
            }
        })?;

        match provider {
            ProviderConfig::OpenAI { api_key, .. }
            | ProviderConfig::Anthropic { api_key, .. }
            | ProviderConfig::Gemini { api_key, .. }
                if api_key.trim().is_empty() =>
            {
                return Err(ConfigError::MissingApiKey(self.default_provider.clone()));
            }
            ProviderConfig::Ollama { base_url } if base_url.trim().is_empty() => {
                return Err(ConfigError::MissingEndpoint(self.default_provider.clone()));
            }
            _ => {}
        }

        if self.default_model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidSetting {
                field: "temperature",
                reason: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "max_tokens",
                reason: "must be positive".into(),
            });
        }
        if self.max_generation_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "max_generation_attempts",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Validate, then build the default provider.
    pub fn generation_provider(&self) -> Result<Arc<dyn LlmProvider>, ConfigError> {
        self.validate_generation()?;
        let config = self
            .providers
            .get(&self.default_provider)
            .ok_or_else(|| ConfigError::MissingProvider {
                name: self.default_provider.clone(),
                available: Vec::new(),
            })?;
        create_provider(&self.default_provider, config)
    }

    /// Gateway settings derived from the defaults in this file.
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            model: self.default_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Retry policy for the orchestrator.
    pub fn generation_retry(&self) -> GenerationRetry {
        GenerationRetry {
            max_attempts: self.max_generation_attempts.max(1),
            initial_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Apply `PROBFORGE_*` overrides read through `lookup`, then resolve
    /// `${VAR}` references in provider fields.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("PROBFORGE_ANTHROPIC_KEY") {
            let entry = self
                .providers
                .entry("anthropic".into())
                .or_insert(ProviderConfig::Anthropic {
                    api_key: String::new(),
                    base_url: None,
                });
            if let ProviderConfig::Anthropic { api_key, .. } = entry {
                *api_key = key;
            }
        }

        if let Some(key) = lookup("PROBFORGE_OPENAI_KEY") {
            let entry = self
                .providers
                .entry("openai".into())
                .or_insert(ProviderConfig::OpenAI {
                    api_key: String::new(),
                    base_url: None,
                    org_id: None,
                });
            if let ProviderConfig::OpenAI { api_key, .. } = entry {
                *api_key = key;
            }
        }

        if let Some(key) = lookup("PROBFORGE_GEMINI_KEY") {
            let entry = self
                .providers
                .entry("gemini".into())
                .or_insert(ProviderConfig::Gemini {
                    api_key: String::new(),
                    base_url: None,
                });
            if let ProviderConfig::Gemini { api_key, .. } = entry {
                *api_key = key;
            }
        }

        if let Some(url) = lookup("PROBFORGE_DATABASE_URL") {
            self.server.database_url = url;
        }
        if let Some(bind) = lookup("PROBFORGE_BIND") {
            self.server.bind = bind;
        }

        self.providers = self
            .providers
            .iter()
            .map(|(k, v)| (k.clone(), v.resolved()))
            .collect();
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Unset variables resolve to the empty string. Substituted values are
/// inserted verbatim and never scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + end];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `probforge.toml` in the current directory
/// 2. `~/.config/probforge/config.toml`
///
/// Environment overrides: `PROBFORGE_OPENAI_KEY`, `PROBFORGE_ANTHROPIC_KEY`,
/// `PROBFORGE_GEMINI_KEY`, `PROBFORGE_DATABASE_URL`, `PROBFORGE_BIND`.
pub fn load_config() -> Result<ProbforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ProbforgeConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() {
                Some(local)
            } else {
                global_config_path().filter(|p| p.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => parse_config_file(&path)?,
        None => ProbforgeConfig::default(),
    };
    config.apply_overrides(|name| std::env::var(name).ok());
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<ProbforgeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<ProbforgeConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

/// `~/.config/probforge/config.toml`, if `HOME` is set.
pub fn global_config_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|h| {
        PathBuf::from(h)
            .join(".config")
            .join("probforge")
            .join("config.toml")
    })
}

/// Create a provider instance from its configuration.
pub fn create_provider(
    name: &str,
    config: &ProviderConfig,
) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let client_error = |e: crate::error::ProviderError| ConfigError::Client {
        name: name.to_string(),
        reason: e.to_string(),
    };
    let provider: Arc<dyn LlmProvider> = match config {
        ProviderConfig::Anthropic { api_key, base_url } => Arc::new(
            AnthropicProvider::new(api_key, base_url.clone()).map_err(client_error)?,
        ),
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(
            OpenAiProvider::new(api_key, base_url.clone(), org_id.clone())
                .map_err(client_error)?,
        ),
        ProviderConfig::Gemini { api_key, base_url } => Arc::new(
            GeminiProvider::new(api_key, base_url.clone()).map_err(client_error)?,
        ),
        ProviderConfig::Ollama { base_url } => {
            Arc::new(OllamaProvider::new(base_url).map_err(client_error)?)
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
default_provider = "openai"
default_model = "gpt-4o-mini"
temperature = 0.4
max_tokens = 1024
max_generation_attempts = 3
retry_delay_ms = 250
delete_policy = "cascade"

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.anthropic]
type = "anthropic"
api_key = "sk-ant"

[providers.ollama]
type = "ollama"

[server]
bind = "0.0.0.0:9000"
database_url = "sqlite://data/probforge.db"
log_level = "debug"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_PROBFORGE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_PROBFORGE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_PROBFORGE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_PROBFORGE_TEST_VAR");
        assert_eq!(resolve_env_vars("${_PROBFORGE_UNSET_VAR_XYZ}"), "");
        assert_eq!(resolve_env_vars("no refs"), "no refs");
    }

    #[test]
    fn resolve_env_vars_does_not_expand_values() {
        std::env::set_var("_PROBFORGE_SELF_REF", "${_PROBFORGE_SELF_REF}");
        assert_eq!(
            resolve_env_vars("key=${_PROBFORGE_SELF_REF}!"),
            "key=${_PROBFORGE_SELF_REF}!"
        );
        std::env::remove_var("_PROBFORGE_SELF_REF");
        assert_eq!(resolve_env_vars("a${b"), "a${b");
    }

    #[test]
    fn default_config() {
        let config = ProbforgeConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.max_generation_attempts, 2);
        assert_eq!(config.delete_policy, DeletePolicy::Reject);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn parse_full_config() {
        let config: ProbforgeConfig = toml::from_str(FULL_CONFIG).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert!(matches!(
            config.providers.get("anthropic"),
            Some(ProviderConfig::Anthropic { .. })
        ));
        assert!(matches!(
            config.providers.get("ollama"),
            Some(ProviderConfig::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));
        assert_eq!(config.delete_policy, DeletePolicy::Cascade);
        assert_eq!(config.server.log_level.as_deref(), Some("debug"));

        let settings = config.gateway_settings();
        assert_eq!(settings.model, "gpt-4o-mini");
        assert_eq!(settings.max_tokens, 1024);

        let retry = config.generation_retry();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(250));
    }

    #[test]
    fn debug_masks_api_keys() {
        let config: ProbforgeConfig = toml::from_str(FULL_CONFIG).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-openai"));
        assert!(!debug.contains("sk-ant"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn env_overrides_win() {
        let mut config = ProbforgeConfig::default();
        config.apply_overrides(|name| match name {
            "PROBFORGE_OPENAI_KEY" => Some("sk-from-env".into()),
            "PROBFORGE_BIND" => Some("0.0.0.0:1234".into()),
            "PROBFORGE_DATABASE_URL" => Some("sqlite::memory:".into()),
            _ => None,
        });

        assert!(matches!(
            config.providers.get("openai"),
            Some(ProviderConfig::OpenAI { api_key, .. }) if api_key == "sk-from-env"
        ));
        assert!(!config.providers.contains_key("anthropic"));
        assert_eq!(config.server.bind, "0.0.0.0:1234");
        assert_eq!(config.server.database_url, "sqlite::memory:");
        config.validate_generation().unwrap();
    }

    #[test]
    fn gemini_provider_from_toml_and_env() {
        let mut config: ProbforgeConfig = toml::from_str(
            r#"
default_provider = "gemini"
default_model = "gemini-2.0-flash"

[providers.gemini]
type = "gemini"
api_key = ""
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate_generation(),
            Err(ConfigError::MissingApiKey(ref name)) if name == "gemini"
        ));

        config.apply_overrides(|name| (name == "PROBFORGE_GEMINI_KEY").then(|| "AIza-test".into()));
        let provider = config.generation_provider().unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(config.providers["gemini"].kind(), "gemini");
        assert!(!format!("{config:?}").contains("AIza-test"));
    }

    #[test]
    fn validation_requires_default_provider() {
        let config = ProbforgeConfig::default();
        let err = config.validate_generation().unwrap_err();
        assert!(matches!(err, ConfigError::MissingProvider { ref name, .. } if name == "openai"));
    }

    #[test]
    fn validation_rejects_unresolved_key() {
        let toml_str = r#"
[providers.openai]
type = "openai"
api_key = "${_PROBFORGE_DEFINITELY_UNSET_KEY}"
"#;
        let mut config: ProbforgeConfig = toml::from_str(toml_str).unwrap();
        config.apply_overrides(no_env);
        let err = config.validate_generation().unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey(ref name) if name == "openai"));
        assert!(config.generation_provider().is_err());
    }

    #[test]
    fn validation_rejects_bad_numbers() {
        let mut config: ProbforgeConfig = toml::from_str(FULL_CONFIG).unwrap();
        config.temperature = 3.5;
        assert!(matches!(
            config.validate_generation(),
            Err(ConfigError::InvalidSetting { field: "temperature", .. })
        ));

        config.temperature = 0.5;
        config.max_generation_attempts = 0;
        assert!(matches!(
            config.validate_generation(),
            Err(ConfigError::InvalidSetting { field: "max_generation_attempts", .. })
        ));
    }

    #[test]
    fn ollama_needs_no_key() {
        let mut config: ProbforgeConfig = toml::from_str(FULL_CONFIG).unwrap();
        config.default_provider = "ollama".into();
        let provider = config.generation_provider().unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, FULL_CONFIG).unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.default_model, "gpt-4o-mini");

        let missing = dir.path().join("missing.toml");
        let err = load_config_from(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "default_provider = [").unwrap();

        let err = parse_config_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }
}
