use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Model,
    System,
}

/// A single piece of an event's content.
///
/// `function_call`/`function_response` must always appear in matched pairs
/// across the event log (see the compaction engine's balancing rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    Thought { text: String },
    FunctionCall { tool_name: String, args: serde_json::Value },
    FunctionResponse { tool_name: String, result: serde_json::Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Concatenated text of every `Text`/`Thought` part; used by the
    /// compaction engine to build a text rendering of the log.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } | Part::Thought { text } => Some(text),
            _ => None,
        }
    }
}

/// The role-tagged body of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: Author,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Author, text: impl Into<String>) -> Self {
        Content {
            role,
            parts: vec![Part::text(text)],
        }
    }
}

/// One record in a session's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub author: Author,
    pub content: Content,
    pub created_at: DateTime<Utc>,
    /// Free-form marker bag (e.g. `{"compaction": true, "turns_compacted": n}`).
    /// Not part of the spec's data model proper but mirrors the teacher's
    /// `TranscriptLine::metadata` idiom for attaching provenance to a line
    /// without growing the `Event` shape itself.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    pub fn new(author: Author, content: Content) -> Self {
        Event {
            author,
            content,
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Event::new(Author::User, Content::text(Author::User, text))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Event::new(Author::System, Content::text(Author::System, text))
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Event::new(Author::Model, Content::text(Author::Model, text))
    }

    pub fn is_compaction_marker(&self) -> bool {
        self.metadata
            .get("compaction")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// All `function_call` tool names with no matching `function_response`
    /// appearing later in `tail` (the events following this one). Used by
    /// the compaction engine to detect a dangling call it must balance.
    pub fn pending_call_names(events: &[Event]) -> Vec<String> {
        let mut pending = Vec::new();
        for event in events {
            for part in &event.content.parts {
                match part {
                    Part::FunctionCall { tool_name, .. } => pending.push(tool_name.clone()),
                    Part::FunctionResponse { tool_name, .. } => {
                        if let Some(pos) = pending.iter().position(|n| n == tool_name) {
                            pending.remove(pos);
                        }
                    }
                    _ => {}
                }
            }
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_call_detects_dangling_function_call() {
        let events = vec![Event::new(
            Author::Model,
            Content {
                role: Author::Model,
                parts: vec![Part::FunctionCall {
                    tool_name: "shell".into(),
                    args: serde_json::json!({}),
                }],
            },
        )];
        assert_eq!(Event::pending_call_names(&events), vec!["shell".to_string()]);
    }

    #[test]
    fn pending_call_is_cleared_by_matching_response() {
        let events = vec![
            Event::new(
                Author::Model,
                Content {
                    role: Author::Model,
                    parts: vec![Part::FunctionCall {
                        tool_name: "shell".into(),
                        args: serde_json::json!({}),
                    }],
                },
            ),
            Event::new(
                Author::System,
                Content {
                    role: Author::System,
                    parts: vec![Part::FunctionResponse {
                        tool_name: "shell".into(),
                        result: serde_json::json!({"ok": true}),
                    }],
                },
            ),
        ];
        assert!(Event::pending_call_names(&events).is_empty());
    }

    #[test]
    fn compaction_marker_roundtrips() {
        let mut event = Event::system("hi");
        assert!(!event.is_compaction_marker());
        event.metadata.insert("compaction".into(), serde_json::json!(true));
        assert!(event.is_compaction_marker());
    }
}
