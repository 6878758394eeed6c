use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use swarm_domain::error::{Error, Result};
use swarm_domain::event::Event;
use swarm_domain::session::{Session, SessionKey};

/// Summary row for `GET /api/sessions` (`spec.md` §6.1).
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: Option<String>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed session store implementing the two-table schema in
/// `spec.md` §6.4 (`sessions`, `events`). One file per node, named by port
/// by the caller (`Config::sessions_db_path_for_port`).
///
/// Mutation goes exclusively through `append_event`/`replace_events` — the
/// in-place-replacement invariant (`spec.md` §9) is enforced here, not by
/// the caller mutating a cached `Session` value directly.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| Error::Other(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| Error::Other(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                key TEXT PRIMARY KEY,
                app_name TEXT NOT NULL,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                state JSON NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
                session_key TEXT NOT NULL,
                seq INTEGER NOT NULL,
                author TEXT NOT NULL,
                content JSON NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (session_key, seq)
            );",
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        Ok(SessionStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Create a new empty session, or return the existing one for `key` if
    /// it already exists (idempotent, matching `spec.md`'s "created lazily
    /// on first chat turn").
    pub fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        if let Some(session) = self.get(key)? {
            return Ok(session);
        }
        let session = Session::new(key.clone());
        let conn = self.conn.lock();
        let state = serde_json::json!({"title": session.title, "metadata": session.metadata});
        conn.execute(
            "INSERT OR IGNORE INTO sessions (key, app_name, user_id, session_id, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key.as_db_key(),
                key.app_name,
                key.user_id,
                key.session_id,
                state.to_string(),
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        drop(conn);
        self.get(key)?.ok_or_else(|| Error::Other("session vanished after insert".into()))
    }

    pub fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT state, created_at, updated_at FROM sessions WHERE key = ?1",
                params![key.as_db_key()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .map_err(|e| Error::Other(e.to_string()))?;
        let Some((state_str, created_at, updated_at)) = row else {
            return Ok(None);
        };
        let state: serde_json::Value = serde_json::from_str(&state_str)?;

        let mut stmt = conn
            .prepare("SELECT content FROM events WHERE session_key = ?1 ORDER BY seq ASC")
            .map_err(|e| Error::Other(e.to_string()))?;
        let events: Vec<Event> = stmt
            .query_map(params![key.as_db_key()], |r| {
                let content: String = r.get(0)?;
                Ok(content)
            })
            .map_err(|e| Error::Other(e.to_string()))?
            .filter_map(|r| r.ok())
            .filter_map(|s| serde_json::from_str::<Event>(&s).ok())
            .collect();

        Ok(Some(Session {
            key: key.clone(),
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
            title: state.get("title").and_then(|v| v.as_str()).map(str::to_string),
            metadata: state.get("metadata").cloned().unwrap_or(serde_json::json!({})),
            events,
        }))
    }

    /// Append a single event, auto-deriving the session title from the
    /// first user turn if unset (`spec.md` §3, §4.1 step 2).
    pub fn append_event(&self, key: &SessionKey, event: Event) -> Result<i64> {
        let conn = self.conn.lock();
        let next_seq: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(seq), -1) + 1 FROM events WHERE session_key = ?1",
                params![key.as_db_key()],
                |r| r.get(0),
            )
            .map_err(|e| Error::Other(e.to_string()))?;

        let content = serde_json::to_string(&event)?;
        conn.execute(
            "INSERT INTO events (session_key, seq, author, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.as_db_key(),
                next_seq,
                format!("{:?}", event.author).to_lowercase(),
                content,
                event.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Other(e.to_string()))?;

        conn.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE key = ?2",
            params![Utc::now().to_rfc3339(), key.as_db_key()],
        )
        .map_err(|e| Error::Other(e.to_string()))?;

        Ok(next_seq)
    }

    pub fn set_title_if_unset(&self, key: &SessionKey, title: &str) -> Result<()> {
        let conn = self.conn.lock();
        let state_str: Option<String> = conn
            .query_row("SELECT state FROM sessions WHERE key = ?1", params![key.as_db_key()], |r| r.get(0))
            .optional()
            .map_err(|e| Error::Other(e.to_string()))?;
        let Some(state_str) = state_str else { return Ok(()) };
        let mut state: serde_json::Value = serde_json::from_str(&state_str)?;
        if state.get("title").and_then(|v| v.as_str()).is_some() {
            return Ok(());
        }
        state["title"] = serde_json::Value::String(title.to_string());
        conn.execute(
            "UPDATE sessions SET state = ?1 WHERE key = ?2",
            params![state.to_string(), key.as_db_key()],
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        Ok(())
    }

    /// Replace the entire event list in a single transaction: delete every
    /// row for `key`, then insert `events` with fresh sequence numbers. This
    /// is the store's sole mutation primitive for compaction (`spec.md`
    /// §4.3, §9) — it never hands callers a mutable reference to mutate
    /// themselves.
    pub fn replace_events(&self, key: &SessionKey, events: &[Event]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| Error::Other(e.to_string()))?;
        tx.execute("DELETE FROM events WHERE session_key = ?1", params![key.as_db_key()])
            .map_err(|e| Error::Other(e.to_string()))?;
        for (seq, event) in events.iter().enumerate() {
            let content = serde_json::to_string(event)?;
            tx.execute(
                "INSERT INTO events (session_key, seq, author, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    key.as_db_key(),
                    seq as i64,
                    format!("{:?}", event.author).to_lowercase(),
                    content,
                    event.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| Error::Other(e.to_string()))?;
        }
        tx.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE key = ?2",
            params![Utc::now().to_rfc3339(), key.as_db_key()],
        )
        .map_err(|e| Error::Other(e.to_string()))?;
        tx.commit().map_err(|e| Error::Other(e.to_string()))?;
        Ok(())
    }

    pub fn list(&self, app_name: &str, user_id: &str) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT s.session_id, s.state, s.created_at, s.updated_at,
                        (SELECT COUNT(*) FROM events e WHERE e.session_key = s.key)
                 FROM sessions s WHERE s.app_name = ?1 AND s.user_id = ?2
                 ORDER BY s.updated_at DESC",
            )
            .map_err(|e| Error::Other(e.to_string()))?;
        let rows = stmt
            .query_map(params![app_name, user_id], |r| {
                let session_id: String = r.get(0)?;
                let state_str: String = r.get(1)?;
                let created_at: String = r.get(2)?;
                let updated_at: String = r.get(3)?;
                let count: i64 = r.get(4)?;
                Ok((session_id, state_str, created_at, updated_at, count))
            })
            .map_err(|e| Error::Other(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (session_id, state_str, created_at, updated_at, count) =
                row.map_err(|e| Error::Other(e.to_string()))?;
            let state: serde_json::Value = serde_json::from_str(&state_str)?;
            out.push(SessionSummary {
                session_id,
                title: state.get("title").and_then(|v| v.as_str()).map(str::to_string),
                message_count: count,
                created_at: parse_ts(&created_at),
                updated_at: parse_ts(&updated_at),
            });
        }
        Ok(out)
    }

    /// Returns `true` if a session existed and was deleted.
    pub fn delete(&self, key: &SessionKey) -> Result<bool> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM events WHERE session_key = ?1", params![key.as_db_key()])
            .map_err(|e| Error::Other(e.to_string()))?;
        let affected = conn
            .execute("DELETE FROM sessions WHERE key = ?1", params![key.as_db_key()])
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(affected > 0)
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_domain::event::Event;

    fn key(id: &str) -> SessionKey {
        SessionKey::new("app", "user", id)
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let store = SessionStore::open_in_memory().unwrap();
        let a = store.get_or_create(&key("s1")).unwrap();
        let b = store.get_or_create(&key("s1")).unwrap();
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn append_event_is_monotone_and_ordered() {
        let store = SessionStore::open_in_memory().unwrap();
        let k = key("s1");
        store.get_or_create(&k).unwrap();
        store.append_event(&k, Event::user("hello")).unwrap();
        store.append_event(&k, Event::model_text("hi there")).unwrap();
        let session = store.get(&k).unwrap().unwrap();
        assert_eq!(session.events.len(), 2);
        assert_eq!(session.events[0].content.parts[0].as_text(), Some("hello"));
    }

    #[test]
    fn replace_events_mutates_in_place() {
        let store = SessionStore::open_in_memory().unwrap();
        let k = key("s1");
        store.get_or_create(&k).unwrap();
        store.append_event(&k, Event::user("a")).unwrap();
        store.append_event(&k, Event::user("b")).unwrap();
        store.append_event(&k, Event::user("c")).unwrap();

        let new_events = vec![Event::system("summary")];
        store.replace_events(&k, &new_events).unwrap();

        let session = store.get(&k).unwrap().unwrap();
        assert_eq!(session.events.len(), 1);
        assert_eq!(session.events[0].content.parts[0].as_text(), Some("summary"));
    }

    #[test]
    fn delete_then_get_returns_none() {
        let store = SessionStore::open_in_memory().unwrap();
        let k = key("s1");
        store.get_or_create(&k).unwrap();
        assert!(store.delete(&k).unwrap());
        assert!(store.get(&k).unwrap().is_none());
        assert!(!store.delete(&k).unwrap());
    }

    #[test]
    fn title_set_once_is_sticky() {
        let store = SessionStore::open_in_memory().unwrap();
        let k = key("s1");
        store.get_or_create(&k).unwrap();
        store.set_title_if_unset(&k, "first title").unwrap();
        store.set_title_if_unset(&k, "second title").unwrap();
        let session = store.get(&k).unwrap().unwrap();
        assert_eq!(session.title.as_deref(), Some("first title"));
    }

    #[test]
    fn list_excludes_deleted_sessions() {
        let store = SessionStore::open_in_memory().unwrap();
        store.get_or_create(&key("s1")).unwrap();
        store.get_or_create(&key("s2")).unwrap();
        store.delete(&key("s1")).unwrap();
        let summaries = store.list("app", "user").unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].session_id, "s2");
    }
}
