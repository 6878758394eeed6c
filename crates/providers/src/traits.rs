use swarm_domain::capability::LlmCapabilities;
use swarm_domain::error::Result;
use swarm_domain::stream::{BoxStream, StreamEvent, Usage};
use swarm_domain::tool::{Message, ToolCall, ToolDefinition};

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
    pub model: Option<String>,
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Trait every LLM adapter must implement. A single concrete adapter
/// (`OpenAiCompatProvider`) is carried in this workspace — vendor-specific
/// adapters beyond it are out of scope (`spec.md` §1).
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    fn capabilities(&self) -> &LlmCapabilities;

    fn provider_id(&self) -> &str;
}
