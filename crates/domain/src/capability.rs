use serde::{Deserialize, Serialize};

/// Advertised capabilities of a provider/model pairing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LlmCapabilities {
    pub supports_tools: bool,
    pub supports_streaming: bool,
    pub supports_json_mode: bool,
    pub context_window_tokens: u32,
    pub max_output_tokens: u32,
}

impl Default for LlmCapabilities {
    fn default() -> Self {
        LlmCapabilities {
            supports_tools: true,
            supports_streaming: true,
            supports_json_mode: false,
            context_window_tokens: 128_000,
            max_output_tokens: 4_096,
        }
    }
}
