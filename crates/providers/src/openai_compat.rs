//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, and any other endpoint that
//! follows the OpenAI chat completions wire format. The single adapter this
//! workspace carries; Anthropic/Google/Bedrock/OAuth adapters are explicitly
//! out of scope (`spec.md` §1).

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use swarm_domain::capability::LlmCapabilities;
use swarm_domain::error::{Error, Result};
use swarm_domain::stream::{BoxStream, StreamEvent, Usage};
use swarm_domain::tool::{Message, Role, ToolCall, ToolDefinition};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>, default_model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(OpenAiCompatProvider {
            id: id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            capabilities: LlmCapabilities::default(),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": stream,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content,
        }),
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let tool_calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.call_id,
                        "type": "function",
                        "function": {
                            "name": tc.tool_name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": if msg.content.is_empty() { Value::Null } else { Value::String(msg.content.clone()) },
                "tool_calls": tool_calls,
            })
        }
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content,
        }),
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn finish_reason_is_context_exceeded(reason: Option<&str>) -> bool {
    matches!(reason, Some("length")) // OpenAI signals truncation via finish_reason=length
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(&req, false);
        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::BAD_REQUEST {
            let text = resp.text().await.unwrap_or_default();
            if text.contains("context_length_exceeded") || text.contains("maximum context length") {
                return Err(Error::ContextWindowExceeded);
            }
            return Err(Error::Http(text));
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Http(format!("{status}: {text}")));
        }

        let value: Value = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        parse_chat_response(value, self.effective_model(&req))
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = self.build_body(&req, true);
        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST
                && (text.contains("context_length_exceeded") || text.contains("maximum context length"))
            {
                let stream = futures_util::stream::once(async { Ok(StreamEvent::ContextWindowExceeded) });
                return Ok(Box::pin(stream));
            }
            return Err(Error::Http(format!("{status}: {text}")));
        }

        let byte_stream = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut buf = String::new();
            let mut tool_call_names: std::collections::HashMap<u32, (String, String)> = std::collections::HashMap::new();
            let mut tool_call_args: std::collections::HashMap<u32, String> = std::collections::HashMap::new();
            futures_util::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(Error::Http(e.to_string()));
                        continue;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    if line.is_empty() || !line.starts_with("data:") {
                        continue;
                    }
                    let payload = line.trim_start_matches("data:").trim();
                    if payload == "[DONE]" {
                        yield Ok(StreamEvent::Done { usage: None, finish_reason: None });
                        continue;
                    }
                    let Ok(value) = serde_json::from_str::<Value>(payload) else { continue };
                    let Some(choice) = value["choices"].get(0) else { continue };
                    let delta = &choice["delta"];
                    if let Some(text) = delta["content"].as_str() {
                        if !text.is_empty() {
                            yield Ok(StreamEvent::Token { text: text.to_string() });
                        }
                    }
                    if let Some(calls) = delta["tool_calls"].as_array() {
                        for call in calls {
                            let idx = call["index"].as_u64().unwrap_or(0) as u32;
                            if let Some(name) = call["function"]["name"].as_str() {
                                let call_id = call["id"].as_str().unwrap_or_default().to_string();
                                tool_call_names.insert(idx, (call_id.clone(), name.to_string()));
                                yield Ok(StreamEvent::ToolCallStarted { call_id, tool_name: name.to_string() });
                            }
                            if let Some(args_delta) = call["function"]["arguments"].as_str() {
                                if let Some((call_id, _)) = tool_call_names.get(&idx) {
                                    tool_call_args.entry(idx).or_default().push_str(args_delta);
                                    yield Ok(StreamEvent::ToolCallDelta { call_id: call_id.clone(), delta: args_delta.to_string() });
                                }
                            }
                        }
                    }
                    if let Some(reason) = choice["finish_reason"].as_str() {
                        if reason == "tool_calls" {
                            for (idx, (call_id, name)) in &tool_call_names {
                                let raw = tool_call_args.get(idx).map(|s| s.as_str()).unwrap_or("{}");
                                let arguments = serde_json::from_str(raw).unwrap_or(Value::Object(Default::default()));
                                yield Ok(StreamEvent::ToolCallFinished {
                                    call_id: call_id.clone(),
                                    tool_name: name.clone(),
                                    arguments,
                                });
                            }
                        }
                        if finish_reason_is_context_exceeded(Some(reason)) {
                            yield Ok(StreamEvent::ContextWindowExceeded);
                        }
                        yield Ok(StreamEvent::Done { usage: None, finish_reason: Some(reason.to_string()) });
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

fn parse_chat_response(value: Value, model: String) -> Result<ChatResponse> {
    let choice = value["choices"].get(0).ok_or_else(|| Error::Http("no choices in response".into()))?;
    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();
    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let call_id = tc["id"].as_str()?.to_string();
                    let tool_name = tc["function"]["name"].as_str()?.to_string();
                    let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                    let arguments = serde_json::from_str(args_str).unwrap_or(Value::Null);
                    Some(ToolCall { call_id, tool_name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();
    let usage = value.get("usage").map(|u| Usage {
        prompt_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        total_tokens: u["total_tokens"].as_u64().unwrap_or(0) as u32,
    });
    let finish_reason = choice["finish_reason"].as_str().map(|s| s.to_string());
    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        model,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_to_openai_tool_role_carries_call_id() {
        let msg = Message::tool_result("call-1", "42");
        let value = msg_to_openai(&msg);
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call-1");
    }

    #[test]
    fn parse_chat_response_extracts_tool_calls() {
        let value = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call-1",
                        "function": {"name": "skill_load", "arguments": "{\"skill_id\":\"web\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let resp = parse_chat_response(value, "gpt-4o-mini".to_string()).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].tool_name, "skill_load");
    }

    #[test]
    fn finish_reason_length_is_context_exceeded() {
        assert!(finish_reason_is_context_exceeded(Some("length")));
        assert!(!finish_reason_is_context_exceeded(Some("stop")));
    }
}
