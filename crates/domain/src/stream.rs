use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Token usage reported by a model provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One event of a provider's streaming chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { text: String },
    Thinking { text: String },
    ToolCallStarted { call_id: String, tool_name: String },
    ToolCallDelta { call_id: String, delta: String },
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
    /// The provider reported its context window was exceeded; the runtime
    /// loop matches on this to trigger reactive compaction (`spec.md` §4.1,
    /// §4.3).
    ContextWindowExceeded,
    Error { message: String },
}
