use std::sync::Arc;

use swarm_domain::config::CompactionConfig;
use swarm_domain::error::{Error, Result};
use swarm_domain::event::{Author, Content, Event, Part};
use swarm_providers::traits::{ChatRequest, LlmProvider};
use swarm_domain::tool::Message;

use crate::truncation::head_tail_truncate;

/// Which of the three tiers (`spec.md` §4.3) tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionTier {
    Predictive,
    Structural,
    Reactive,
}

impl CompactionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactionTier::Predictive => "predictive",
            CompactionTier::Structural => "structural",
            CompactionTier::Reactive => "reactive",
        }
    }
}

const SUMMARIZER_INSTRUCTION: &str = "You are summarizing a conversation so it can continue with a fresh \
context window. Preserve: (a) the user's core goal, (b) key completed steps \
and decisions, (c) open questions. Omit code blocks and verbose tool output. \
Keep the summary self-contained — a reader with no other context must be \
able to continue the task from it alone.";

pub struct CompactionEngine {
    config: CompactionConfig,
}

impl CompactionEngine {
    pub fn new(config: CompactionConfig) -> Self {
        CompactionEngine { config }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    fn estimate_tokens(&self, events: &[Event]) -> f64 {
        let chars: usize = events
            .iter()
            .flat_map(|e| &e.content.parts)
            .filter_map(|p| p.as_text())
            .map(|t| t.chars().count())
            .sum();
        chars as f64 / self.config.chars_per_token_estimate
    }

    /// Predictive + structural trigger check (`spec.md` §4.3). Reactive
    /// triggering comes from the caller observing `ContextWindowExceeded`
    /// from the model provider, not from inspecting the log, so it has no
    /// corresponding check here.
    pub fn should_compact(&self, events: &[Event], context_window_tokens: u32) -> Option<CompactionTier> {
        if events.len() < self.config.min_events_to_compact {
            return None;
        }
        if events.len() > self.config.structural_event_threshold {
            return Some(CompactionTier::Structural);
        }
        let estimated = self.estimate_tokens(events);
        if estimated > self.config.predictive_ratio * context_window_tokens as f64 {
            return Some(CompactionTier::Predictive);
        }
        None
    }

    fn render_conversation(&self, events: &[Event]) -> String {
        let mut out = String::new();
        for event in events {
            let role = format!("{:?}", event.author).to_lowercase();
            for part in &event.content.parts {
                match part {
                    Part::Text { text } | Part::Thought { text } => {
                        out.push_str(&format!("[{role}] {text}\n"));
                    }
                    Part::FunctionCall { tool_name, args } => {
                        out.push_str(&format!("[{role}] called {tool_name}({args})\n"));
                    }
                    Part::FunctionResponse { tool_name, result } => {
                        out.push_str(&format!("[{role}] {tool_name} -> {result}\n"));
                    }
                }
            }
        }
        out
    }

    fn leading_system_events(events: &[Event]) -> usize {
        events.iter().take_while(|e| e.author == Author::System).count()
    }

    /// `true` when `events` is already the output of a prior compaction —
    /// exactly the leading system events followed by one compaction-marker
    /// event (optionally followed by a balanced synthetic function_response,
    /// see step 5). Used to make `compact` idempotent.
    fn already_compacted(events: &[Event]) -> bool {
        let split = Self::leading_system_events(events);
        let rest = &events[split..];
        match rest.len() {
            0 => false,
            1 => rest[0].is_compaction_marker(),
            2 => rest[0].is_compaction_marker() && matches!(rest[1].content.parts.first(), Some(Part::FunctionResponse { .. })),
            _ => false,
        }
    }

    /// Run compaction. `pending_call` is the tool name of a dangling
    /// `function_call` the reactive tier interrupted mid-flight, if any
    /// (`spec.md` §4.3 step 5). Returns the new event list; the caller must
    /// persist it via `SessionStore::replace_events` — this function never
    /// mutates a store itself, matching the in-place-replacement invariant
    /// being the *store's* responsibility, not the engine's.
    pub async fn compact(
        &self,
        summarizer: Arc<dyn LlmProvider>,
        events: &[Event],
        pending_call: Option<&str>,
    ) -> Result<Vec<Event>> {
        if Self::already_compacted(events) {
            return Ok(events.to_vec());
        }

        let rendered = self.render_conversation(events);
        let truncated = head_tail_truncate(
            &rendered,
            self.config.safety_cap_chars,
            self.config.head_keep_ratio,
            self.config.tail_keep_ratio,
        );

        let req = ChatRequest {
            messages: vec![
                Message::system(SUMMARIZER_INSTRUCTION),
                Message::user(truncated),
            ],
            ..Default::default()
        };

        let response = summarizer
            .chat(req)
            .await
            .map_err(|e| Error::CompactionFailed(e.to_string()))?;

        let split = Self::leading_system_events(events);
        let mut new_events: Vec<Event> = events[..split].to_vec();

        let summary_text = format!(
            "[System] Context cleared. Summary of previous conversation:\n{}",
            response.content
        );
        let mut summary_event = Event::new(Author::User, Content::text(Author::User, summary_text));
        summary_event
            .metadata
            .insert("compaction".into(), serde_json::json!(true));
        summary_event
            .metadata
            .insert("turns_compacted".into(), serde_json::json!(events.len() - split));
        new_events.push(summary_event);

        if let Some(tool_name) = pending_call {
            new_events.push(Event::new(
                Author::System,
                Content {
                    role: Author::System,
                    parts: vec![Part::FunctionResponse {
                        tool_name: tool_name.to_string(),
                        result: serde_json::json!({"status": "cancelled_by_compaction"}),
                    }],
                },
            ));
        }

        Ok(new_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use swarm_domain::capability::LlmCapabilities;
    use swarm_domain::stream::{BoxStream, StreamEvent};
    use swarm_providers::traits::ChatResponse;

    struct StubProvider {
        reply: String,
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            if self.fail {
                return Err(Error::Http("boom".into()));
            }
            Ok(ChatResponse {
                content: self.reply.clone(),
                tool_calls: vec![],
                usage: None,
                model: "stub".into(),
                finish_reason: Some("stop".into()),
            })
        }
        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            unimplemented!()
        }
        fn capabilities(&self) -> &LlmCapabilities {
            static CAPS: LlmCapabilities = LlmCapabilities {
                supports_tools: true,
                supports_streaming: true,
                supports_json_mode: false,
                context_window_tokens: 128_000,
                max_output_tokens: 4096,
            };
            &CAPS
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn engine() -> CompactionEngine {
        CompactionEngine::new(CompactionConfig {
            min_events_to_compact: 1,
            ..Default::default()
        })
    }

    #[test]
    fn structural_trigger_fires_past_threshold() {
        let config = CompactionConfig { structural_event_threshold: 2, min_events_to_compact: 1, ..Default::default() };
        let engine = CompactionEngine::new(config);
        let events = vec![Event::user("a"), Event::user("b"), Event::user("c")];
        assert_eq!(engine.should_compact(&events, 128_000), Some(CompactionTier::Structural));
    }

    #[test]
    fn below_minimum_events_never_compacts() {
        let config = CompactionConfig { structural_event_threshold: 1, min_events_to_compact: 10, ..Default::default() };
        let engine = CompactionEngine::new(config);
        let events = vec![Event::user("a"), Event::user("b")];
        assert_eq!(engine.should_compact(&events, 128_000), None);
    }

    #[test]
    fn predictive_trigger_fires_on_large_text() {
        let config = CompactionConfig { predictive_ratio: 0.5, min_events_to_compact: 1, structural_event_threshold: 10_000, ..Default::default() };
        let engine = CompactionEngine::new(config);
        let events = vec![Event::user("x".repeat(10_000))];
        // 10_000 chars / 3 chars-per-token ~= 3333 tokens > 0.5*100 = 50
        assert_eq!(engine.should_compact(&events, 100), Some(CompactionTier::Predictive));
    }

    #[tokio::test]
    async fn compact_keeps_leading_system_events_and_adds_one_summary() {
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider { reply: "summary text".into(), fail: false });
        let events = vec![Event::system("you are a helper"), Event::user("hello"), Event::model_text("hi")];
        let new_events = engine().compact(provider, &events, None).await.unwrap();
        assert_eq!(new_events.len(), 2);
        assert_eq!(new_events[0].author, Author::System);
        assert!(new_events[1].is_compaction_marker());
        assert!(new_events[1].content.parts[0].as_text().unwrap().contains("summary text"));
    }

    #[tokio::test]
    async fn compact_is_idempotent() {
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider { reply: "summary".into(), fail: false });
        let events = vec![Event::system("sys"), Event::user("hello")];
        let once = engine().compact(provider.clone(), &events, None).await.unwrap();
        let twice = engine().compact(provider, &once, None).await.unwrap();
        assert_eq!(once.len(), twice.len());
        assert_eq!(
            once[1].content.parts[0].as_text(),
            twice[1].content.parts[0].as_text()
        );
    }

    #[tokio::test]
    async fn compact_appends_synthetic_function_response_for_pending_call() {
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider { reply: "summary".into(), fail: false });
        let events = vec![Event::system("sys"), Event::user("hello")];
        let new_events = engine().compact(provider, &events, Some("shell")).await.unwrap();
        assert_eq!(new_events.len(), 3);
        match &new_events[2].content.parts[0] {
            Part::FunctionResponse { tool_name, .. } => assert_eq!(tool_name, "shell"),
            other => panic!("expected function response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn compact_failure_leaves_no_partial_state() {
        let provider: Arc<dyn LlmProvider> = Arc::new(StubProvider { reply: String::new(), fail: true });
        let events = vec![Event::user("hello")];
        let result = engine().compact(provider, &events, None).await;
        assert!(matches!(result, Err(Error::CompactionFailed(_))));
    }
}
