//! Core trait definitions for content storage, LLM providers and variant
//! generation.
//!
//! `ContentStore` is implemented by [`crate::store::InMemoryStore`] and the
//! `probforge-store` crate. `LlmProvider` is implemented by the
//! `probforge-providers` crate. `VariantGenerator` is implemented by
//! [`crate::gateway::VariantGateway`] and by test fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GenerationError, ProviderError, Result};
use crate::model::{
    DeletePolicy, DeleteOutcome, Exam, ExamProblem, GeneratedVariant, NewExam, NewProblem,
    Problem, ProblemFilter,
};

// ---------------------------------------------------------------------------
// Content store trait
// ---------------------------------------------------------------------------

/// Durable record of problems, exams and the links between them.
///
/// Every write is atomic per call: either the whole change is visible or none
/// of it is. Lookups of absent ids fail with a not-found error, while listings
/// return an empty sequence.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a problem. If `parent_id` is set, the parent must exist at the
    /// moment of insertion, otherwise `ParentNotFound`.
    async fn create_problem(&self, problem: NewProblem) -> Result<Problem>;

    async fn get_problem(&self, id: Uuid) -> Result<Problem>;

    /// Problems matching the filter, in creation order.
    async fn list_problems(&self, filter: &ProblemFilter) -> Result<Vec<Problem>>;

    /// Direct children of a problem, in creation order.
    async fn list_children(&self, parent_id: Uuid) -> Result<Vec<Problem>>;

    /// Delete a problem that has no variants, handling exam links per `policy`.
    async fn delete_problem(&self, id: Uuid, policy: DeletePolicy) -> Result<DeleteOutcome>;

    async fn create_exam(&self, exam: NewExam) -> Result<Exam>;

    async fn get_exam(&self, id: Uuid) -> Result<Exam>;

    /// Exams in creation order, optionally restricted to one owner.
    async fn list_exams(&self, owner_id: Option<Uuid>) -> Result<Vec<Exam>>;

    async fn set_exam_published(&self, id: Uuid, published: bool) -> Result<Exam>;

    /// Link a problem into an exam. Fails with `ExamNotFound`,
    /// `ProblemNotFound` or `DuplicateLink`.
    async fn create_link(&self, link: ExamProblem) -> Result<ExamProblem>;

    /// Change the position of an existing link. Fails with `LinkNotFound`.
    async fn update_link_order(
        &self,
        exam_id: Uuid,
        problem_id: Uuid,
        order_index: i32,
    ) -> Result<ExamProblem>;

    /// Remove a link. Returns `false` if it did not exist.
    async fn delete_link(&self, exam_id: Uuid, problem_id: Uuid) -> Result<bool>;

    /// Links of an exam joined with their problems, sorted by `order_index`
    /// and then by link creation order.
    async fn list_exam_problems(&self, exam_id: Uuid) -> Result<Vec<(ExamProblem, Problem)>>;
}

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that complete a prompt.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Complete a prompt and return the raw text.
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request to complete a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g. "gpt-4o").
    pub model: String,
    /// The user prompt.
    pub prompt: String,
    /// System prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Ask the backend to emit a bare JSON object, where supported.
    #[serde(default)]
    pub json_mode: bool,
}

/// Response from an LLM completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The raw response content.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
    /// Cost per 1K input tokens in USD.
    pub cost_per_1k_input: f64,
    /// Cost per 1K output tokens in USD.
    pub cost_per_1k_output: f64,
}

// ---------------------------------------------------------------------------
// Variant generator trait
// ---------------------------------------------------------------------------

/// Produces a structurally similar problem from an existing one.
///
/// Implementations never persist anything.
#[async_trait]
pub trait VariantGenerator: Send + Sync {
    async fn generate_variant(
        &self,
        source_content: &str,
        subject: &str,
    ) -> std::result::Result<GeneratedVariant, GenerationError>;
}

// ---------------------------------------------------------------------------
// JSON payload extraction
// ---------------------------------------------------------------------------

/// Extract a JSON payload from an LLM response.
///
/// Handles:
/// - A ```json``` block (preferred)
/// - A generic ``` block
/// - A raw response with no markdown blocks (trimmed and returned as-is)
pub fn extract_json_payload(response: &str) -> String {
    let mut json_block: Option<String> = None;
    let mut generic_block: Option<String> = None;
    let mut in_block = false;
    let mut is_json_block = false;
    let mut is_generic_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json";
            is_generic_block = lang.is_empty();
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_json_block && json_block.is_none() {
                json_block = Some(current_block.clone());
            } else if is_generic_block && generic_block.is_none() {
                generic_block = Some(current_block.clone());
            }
            current_block.clear();
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    // Truncated (unclosed) block: keep what was accumulated
    if in_block && !current_block.is_empty() {
        if is_json_block && json_block.is_none() {
            json_block = Some(current_block);
        } else if is_generic_block && generic_block.is_none() {
            generic_block = Some(current_block);
        }
    }

    json_block
        .or(generic_block)
        .unwrap_or_else(|| response.trim().to_string())
}
