use thiserror::Error;

/// The error kinds named in the orchestrator's error-handling design.
///
/// Each variant corresponds to a row in the error-kind/policy table: the
/// *kind* is what call sites match on, the policy itself lives at the call
/// site (tool dispatch, the session loop, the dispatcher tool, ...).
#[derive(Debug, Error)]
pub enum Error {
    #[error("tool error: {0}")]
    Tool(String),

    #[error("context window exceeded")]
    ContextWindowExceeded,

    #[error("cancelled")]
    Cancelled,

    #[error("peer busy: port={port} task={current_task:?} running_for={running_time_seconds}s")]
    PeerBusy {
        port: u16,
        current_task: Option<String>,
        running_time_seconds: u64,
    },

    #[error("peer unreachable: port={0}")]
    PeerUnreachable(u16),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("compaction failed: {0}")]
    CompactionFailed(String),

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
