//! Streaming chunk types shared by provider adapters, the router, and the gateway.
//!
//! A streaming completion is a lazy, finite sequence of [`ChatChunk`]s. The
//! Router never buffers them; the Gateway renders each one as an SSE event.

use serde::{Deserialize, Serialize};

use crate::response::{FinishReason, Usage};

/// Incremental delta for one choice within a streaming chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role, present only on the first chunk of a choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Incremental text content, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One choice's delta within a streaming chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Position of this choice.
    pub index: u32,
    /// The incremental delta.
    pub delta: ChunkDelta,
    /// Present only on the terminal chunk for this choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// One streaming delta emitted by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Id shared by every chunk of the same response.
    pub id: String,
    /// Object tag, e.g. `"chat.completion.chunk"`.
    pub object: String,
    /// Unix timestamp.
    pub created: i64,
    /// Model that produced this chunk.
    pub model: String,
    /// Per-choice deltas in this chunk.
    pub choices: Vec<ChunkChoice>,
    /// Usage totals; only populated on the terminal chunk for providers that
    /// report it there (most providers do not report usage on every delta).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatChunk {
    /// Whether this chunk is the terminal chunk of the stream (every choice
    /// carries a `finish_reason`).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.choices.is_empty() && self.choices.iter().all(|c| c.finish_reason.is_some())
    }
}
