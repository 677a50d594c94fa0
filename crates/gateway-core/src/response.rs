//! Response types returned by the gateway: completions and model listings.

use crate::request::ChatMessage;
use serde::{Deserialize, Serialize};

/// Why a choice stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Model reached a natural stopping point or a stop sequence.
    Stop,
    /// Hit `max_tokens`.
    Length,
    /// Model requested a tool/function call.
    ToolCalls,
    /// Content was filtered by the provider.
    ContentFilter,
    /// Client cancelled the request before completion.
    Cancelled,
}

/// Token accounting and cost for one request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt/input.
    pub prompt_tokens: u32,
    /// Tokens generated in the completion.
    pub completion_tokens: u32,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u32,
    /// Computed USD cost of this request.
    pub cost_usd: f64,
}

impl Usage {
    /// Construct usage from prompt/completion token counts and a cost.
    #[must_use]
    pub fn new(prompt_tokens: u32, completion_tokens: u32, cost_usd: f64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_usd,
        }
    }
}

/// One completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Position of this choice within the response.
    pub index: u32,
    /// The generated message.
    pub message: ChatMessage,
    /// Why generation stopped for this choice.
    pub finish_reason: FinishReason,
}

/// Unified gateway response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Response identifier.
    pub id: String,
    /// Object tag, e.g. `"chat.completion"` or `"list"` for embeddings.
    pub object: String,
    /// Unix timestamp of creation.
    pub created: i64,
    /// Model that produced this response.
    pub model: String,
    /// Provider that served this response.
    pub provider: String,
    /// Ordered completion choices. Empty for embedding responses.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Ordered embedding vectors, aligned with request input order. Empty for
    /// completion responses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeddings: Vec<Vec<f32>>,
    /// Token accounting and cost.
    pub usage: Usage,
    /// Whether this response was served from the response cache.
    #[serde(default)]
    pub cache_hit: bool,
}

/// One entry in `/v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelObject {
    /// Model identifier.
    pub id: String,
    /// Object tag, always `"model"`.
    #[serde(default = "default_model_object")]
    pub object: String,
    /// Creation timestamp (unused upstream metadata, kept for API parity).
    #[serde(default)]
    pub created: i64,
    /// Provider serving this model.
    pub owned_by: String,
}

fn default_model_object() -> String {
    "model".to_string()
}

/// Response body for `GET /v1/models`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Object tag, always `"list"`.
    #[serde(default = "default_list_object")]
    pub object: String,
    /// The models available.
    pub data: Vec<ModelObject>,
}

fn default_list_object() -> String {
    "list".to_string()
}
