use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use swarm_compactor::CompactionEngine;
use swarm_domain::config::Config;
use swarm_providers::registry::ProviderRegistry;
use swarm_registry::NodeRegistry;
use swarm_sessions::SessionStore;
use swarm_skills::SkillsRegistry;

use crate::runtime::cancel::CancelMap;
use crate::runtime::busy_lock::BusyLock;
use crate::runtime::tool_trait::ToolTable;

/// Shared, cloneable handle to everything a request handler or tool needs.
/// Trimmed hard from the teacher's `AppState`: no dashboard asset handle,
/// no WebSocket connection table, no capability router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub self_port: u16,
    pub self_url: String,
    pub llm: Arc<ProviderRegistry>,
    pub sessions: Arc<SessionStore>,
    pub skills: Arc<SkillsRegistry>,
    pub compactor: Arc<CompactionEngine>,
    pub registry: Arc<NodeRegistry>,
    pub http_client: reqwest::Client,
    pub cancel_map: Arc<CancelMap>,
    pub busy_lock: Arc<BusyLock>,
    pub tools: ToolTable,
    /// Per-session bound tool names, in import order. In-memory only: tool
    /// bindings are scoped to the process lifetime of a session, not
    /// persisted (unlike the session's event log).
    pub session_tools: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl AppState {
    pub fn session_db_key(key: &swarm_domain::session::SessionKey) -> String {
        key.as_db_key()
    }

    /// Tool names currently bound for `session_key`, inserting the core
    /// set (`spec.md` §4.2) the first time a session is seen.
    pub fn bound_tools(&self, session_key: &str) -> Vec<String> {
        let mut map = self.session_tools.write();
        map.entry(session_key.to_string())
            .or_insert_with(crate::runtime::tool_trait::core_tool_names)
            .clone()
    }

    /// Append `name` to `session_key`'s binding list if not already bound.
    /// Returns whether it was newly added.
    pub fn bind_tool(&self, session_key: &str, name: &str) -> bool {
        let mut map = self.session_tools.write();
        let names = map
            .entry(session_key.to_string())
            .or_insert_with(crate::runtime::tool_trait::core_tool_names);
        if names.iter().any(|n| n == name) {
            false
        } else {
            names.push(name.to_string());
            true
        }
    }
}
