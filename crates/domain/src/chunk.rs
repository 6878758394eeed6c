use serde::{Deserialize, Serialize};

/// A sub-event of the swarm dispatcher's nested stream, merged inline into
/// the parent output so the UI can render nested progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmEventKind {
    Init,
    Chunk,
    Finish,
    Fail,
}

/// One output chunk of the session runtime's lazy output sequence.
///
/// These are what gets serialized as `{"chunk": <Chunk>}` per NDJSON line on
/// `/api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    Text { text: String },
    Thought { text: String },
    ToolCall { tool_name: String, args: serde_json::Value },
    ToolResult {
        tool_name: String,
        content: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        clean: Option<bool>,
    },
    SwarmEvent {
        sub_type: SwarmEventKind,
        worker_port: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        task_preview: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Chunk {
    pub fn text(text: impl Into<String>) -> Self {
        Chunk::Text { text: text.into() }
    }

    pub fn tool_call(tool_name: impl Into<String>, args: serde_json::Value) -> Self {
        Chunk::ToolCall {
            tool_name: tool_name.into(),
            args,
        }
    }

    pub fn tool_result(
        tool_name: impl Into<String>,
        content: serde_json::Value,
        clean: Option<bool>,
    ) -> Self {
        Chunk::ToolResult {
            tool_name: tool_name.into(),
            content,
            clean,
        }
    }
}

/// Wire envelope for a single NDJSON line: `{"chunk": <Chunk>}`.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkEnvelope {
    pub chunk: Chunk,
}

impl From<Chunk> for ChunkEnvelope {
    fn from(chunk: Chunk) -> Self {
        ChunkEnvelope { chunk }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_chunk_serializes_tagged() {
        let chunk = Chunk::text("hi");
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn envelope_wraps_chunk_under_chunk_key() {
        let env: ChunkEnvelope = Chunk::text("hi").into();
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["chunk"]["type"], "text");
    }
}
