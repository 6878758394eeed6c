use serde::Serialize;

/// Structured lifecycle events emitted at `info` level for observability,
/// mirroring the teacher's `sa_event`/`TraceEvent` idiom: one JSON payload
/// per log line, named by `type`, so a log pipeline can index on it without
/// parsing free-text messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    SessionResolved { session_key: String },
    SessionDeleted { session_key: String },
    TranscriptAppend { session_key: String, seq: i64 },
    CompactionTriggered { session_key: String, tier: &'static str },
    CompactionCompleted { session_key: String, events_before: usize, events_after: usize },
    CompactionFailed { session_key: String, reason: String },
    SkillDiscovered { skill_id: String },
    SkillActivated { session_key: String, skill_id: String },
    BusyLockAcquired { session_key: String },
    BusyLockRejected { held_session_key: String },
    BusyLockPreempted { held_session_key: String },
    CancellationPosted { session_key: String },
    CancellationObserved { session_key: String },
    DispatchAttempt { target_port: u16, sub_session_id: String },
    PeerPruned { port: u16 },
    RegistrySelfRegistered { port: u16 },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "swarm_event");
    }
}
