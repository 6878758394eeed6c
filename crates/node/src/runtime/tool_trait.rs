//! The tool-binding seam (`spec.md` §4.2, §9). The original system binds
//! tools dynamically by name at runtime; Rust's static type system models
//! that as a fixed in-process table of `Arc<dyn Tool>` built at startup,
//! with per-session *binding lists* (which names are currently callable in
//! this session) layered on top — see `DESIGN.md` for the full writeup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use swarm_domain::chunk::Chunk;
use swarm_domain::error::Result;
use swarm_domain::session::SessionKey;
use swarm_domain::tool::ToolDefinition;
use tokio::sync::mpsc::UnboundedSender;

use super::cancel::CancelToken;
use crate::state::AppState;

/// Everything a tool implementation needs besides its own arguments: the
/// session it's running in, a handle to node-wide state, its
/// cancellation token, and a sink for chunks it wants to emit *during* its
/// own execution (the swarm dispatcher's `swarm_event` chunks, emitted
/// while a peer call is still streaming back).
pub struct ToolContext {
    pub session_key: SessionKey,
    pub state: AppState,
    pub cancel: CancelToken,
    pub chunk_tx: UnboundedSender<Chunk>,
}

impl ToolContext {
    pub fn emit(&self, chunk: Chunk) {
        // A closed receiver means the HTTP client disconnected; dropping
        // the chunk is correct, there is nowhere left to send it.
        let _ = self.chunk_tx.send(chunk);
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn definition(&self) -> ToolDefinition;
    async fn invoke(&self, args: Value, ctx: &ToolContext) -> Result<Value>;
}

/// The fixed, node-wide table of every tool implementation that exists,
/// keyed by name. Distinct from a session's *binding list* (`Vec<String>`
/// of names currently in scope for that session) — the table is the
/// universe of callable tools, the binding list is which of them a given
/// session has imported so far.
#[derive(Clone)]
pub struct ToolTable {
    tools: Arc<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolTable {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let map = tools.into_iter().map(|t| (t.name().to_string(), t)).collect();
        ToolTable { tools: Arc::new(map) }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.definition())
            .collect()
    }
}

/// Tools every session is created with (`spec.md` §4.2): `skill_load` plus
/// the two swarm dispatcher tools, which the spec's end-to-end scenarios
/// invoke without any prior `skill_load` call.
pub fn core_tool_names() -> Vec<String> {
    vec!["skill_load".to_string(), "dispatch_task".to_string(), "dispatch_batch".to_string()]
}
