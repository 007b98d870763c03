//! Variant generator gateway.
//!
//! Wraps an [`LlmProvider`] behind the fixed `{content, solution}` contract:
//! it renders a deterministic instruction template, calls the provider once,
//! and validates the answer. Transport failures surface as
//! [`GenerationError::Unavailable`], schema mismatches as
//! [`GenerationError::Format`]. Nothing is retried here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::GenerationError;
use crate::model::GeneratedVariant;
use crate::traits::{extract_json_payload, CompletionRequest, LlmProvider, VariantGenerator};

/// System prompt sent with every variant request.
pub const VARIANT_SYSTEM_PROMPT: &str = "You are an expert author of mathematics and physics practice material. Respond ONLY with a single JSON object. Do not add explanations outside the JSON.";

/// Sampling settings for variant generation.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature. Some variety is wanted, so this is not 0.
    pub temperature: f64,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// [`VariantGenerator`] backed by an LLM provider.
pub struct VariantGateway {
    provider: Arc<dyn LlmProvider>,
    settings: GatewaySettings,
}

impl VariantGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: GatewaySettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    fn build_request(&self, source_content: &str, subject: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            prompt: render_variant_prompt(source_content, subject),
            system_prompt: Some(VARIANT_SYSTEM_PROMPT.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            json_mode: true,
        }
    }
}

#[async_trait]
impl VariantGenerator for VariantGateway {
    #[instrument(skip(self, source_content), fields(provider = %self.provider.name(), model = %self.settings.model))]
    async fn generate_variant(
        &self,
        source_content: &str,
        subject: &str,
    ) -> Result<GeneratedVariant, GenerationError> {
        let request = self.build_request(source_content, subject);
        let response = self.provider.complete(&request).await.map_err(|e| {
            warn!(error = %e, "variant generation call failed");
            GenerationError::Unavailable(e)
        })?;

        debug!(
            latency_ms = response.latency_ms,
            total_tokens = response.token_usage.total_tokens,
            "variant generation call returned"
        );

        parse_variant(&response.content)
    }
}

/// Render the instruction template for one source problem.
///
/// The output depends only on the inputs.
pub fn render_variant_prompt(source_content: &str, subject: &str) -> String {
    format!(
        "Create ONE new practice problem that keeps the structure and solution method of the \
         original problem below, but changes the numbers, names or setting.\n\
         \n\
         # Original problem\n\
         Subject: {subject}\n\
         Problem: {source_content}\n\
         \n\
         # Output format\n\
         Return a JSON object with exactly these string keys:\n\
         - \"content\": the new problem statement\n\
         - \"solution\": a detailed worked solution (may be empty, but the key must be present)\n\
         Write all formulas in LaTeX."
    )
}

/// Validate raw provider output against the `{content, solution}` schema.
///
/// A missing `solution` key is a format error; an empty `solution` string is
/// accepted. A blank `content` is a format error.
pub fn parse_variant(raw: &str) -> Result<GeneratedVariant, GenerationError> {
    let payload = extract_json_payload(raw);
    let value: Value = serde_json::from_str(&payload)
        .map_err(|e| GenerationError::Format(format!("output is not valid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(GenerationError::Format(
            "output is not a JSON object".to_string(),
        ));
    };

    let content = required_string(&map, "content")?;
    if content.trim().is_empty() {
        return Err(GenerationError::Format("\"content\" is empty".to_string()));
    }
    let solution = required_string(&map, "solution")?;

    Ok(GeneratedVariant {
        content: content.trim().to_string(),
        solution: solution.to_string(),
    })
}

fn required_string<'a>(
    map: &'a serde_json::Map<String, Value>,
    key: &str,
) -> Result<&'a str, GenerationError> {
    match map.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(GenerationError::Format(format!(
            "\"{key}\" must be a string, got {}",
            json_kind(other)
        ))),
        None => Err(GenerationError::Format(format!("missing \"{key}\" field"))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
