use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// `(app_name, user_id, session_id)` — uniquely identifies a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        SessionKey {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// A single string form suitable as a SQL primary key:
    /// `{app_name}::{user_id}::{session_id}`.
    pub fn as_db_key(&self) -> String {
        format!("{}::{}::{}", self.app_name, self.user_id, self.session_id)
    }
}

/// A session's full persisted state, as reconstructed from the `sessions`
/// and `events` tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Auto-derived from the first ~30 characters of the first user turn.
    pub title: Option<String>,
    /// Free-form state carried across turns (task plans, counters).
    pub metadata: serde_json::Value,
    pub events: Vec<Event>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Session {
            key,
            created_at: now,
            updated_at: now,
            title: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            events: Vec::new(),
        }
    }

    /// Derive an auto-title from the first ~30 characters of `text`, as
    /// `spec.md` §3 requires. Left free for a richer (e.g. LLM-generated)
    /// implementation by design (`spec.md` §9); callers must not depend on
    /// the exact truncation behavior beyond "roughly the first 30 chars".
    pub fn derive_title(text: &str) -> String {
        let trimmed = text.trim();
        let cut = trimmed
            .char_indices()
            .map(|(i, _)| i)
            .nth(30)
            .unwrap_or(trimmed.len());
        trimmed[..cut].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_title_truncates_to_30_chars() {
        let text = "a".repeat(50);
        assert_eq!(Session::derive_title(&text).chars().count(), 30);
    }

    #[test]
    fn derive_title_keeps_short_text_whole() {
        assert_eq!(Session::derive_title("hello"), "hello");
    }

    #[test]
    fn session_key_db_key_is_stable() {
        let key = SessionKey::new("app", "user", "s1");
        assert_eq!(key.as_db_key(), "app::user::s1");
    }
}
