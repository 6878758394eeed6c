//! The swarm dispatcher tool (`spec.md` §4.5): delegates a sub-task to a
//! peer node over HTTP, with self-exclusion, load-spreading shuffle, busy
//! rejection, urgent preemption, and dead-peer self-healing.

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::{json, Value};
use swarm_domain::chunk::{Chunk, SwarmEventKind};
use swarm_domain::error::{Error, Result};
use swarm_domain::tool::ToolDefinition;
use swarm_registry::NodeRecord;
use uuid::Uuid;

use crate::runtime::tool_trait::{Tool, ToolContext};

const CLUSTER_APP: &str = "swarm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    Urgent,
}

impl Priority {
    pub fn from_str(s: Option<&str>) -> Self {
        match s {
            Some("URGENT") | Some("urgent") => Priority::Urgent,
            _ => Priority::Normal,
        }
    }
}

pub struct DispatchParams {
    pub task_instruction: String,
    pub context_info: Option<String>,
    pub target_port: Option<u16>,
    pub sub_session_id: Option<String>,
    pub priority: Priority,
}

impl DispatchParams {
    pub fn from_args(args: &Value) -> Result<Self> {
        let task_instruction = args
            .get("task_instruction")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Tool("dispatch_task requires task_instruction".to_string()))?
            .to_string();
        Ok(DispatchParams {
            task_instruction,
            context_info: args.get("context_info").and_then(|v| v.as_str()).map(str::to_string),
            target_port: args.get("target_port").and_then(|v| v.as_u64()).map(|p| p as u16),
            sub_session_id: args.get("sub_session_id").and_then(|v| v.as_str()).map(str::to_string),
            priority: Priority::from_str(args.get("priority").and_then(|v| v.as_str())),
        })
    }
}

pub struct DispatchTaskTool;

#[async_trait]
impl Tool for DispatchTaskTool {
    fn name(&self) -> &str {
        "dispatch_task"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Delegate a sub-task to a peer node in the swarm. Leave target_port unset to let the \
                dispatcher pick any available peer (load-spread); set it to address a specific peer."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "task_instruction": {"type": "string"},
                    "context_info": {"type": "string"},
                    "target_port": {"type": "integer"},
                    "sub_session_id": {"type": "string"},
                    "priority": {"type": "string", "enum": ["NORMAL", "URGENT"]}
                },
                "required": ["task_instruction"]
            }),
        }
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let params = DispatchParams::from_args(&args)?;
        let report = dispatch_one(ctx, params).await;
        Ok(json!({ "report": report }))
    }
}

/// Runs the full algorithm in `spec.md` §4.5 steps 1-6. Never returns an
/// `Err` for ordinary dispatch outcomes (empty candidate set, busy peer,
/// exhausted candidates) — those are reported back to the model as text,
/// per the spec's "never raises" edge case.
pub async fn dispatch_one(ctx: &ToolContext, params: DispatchParams) -> String {
    let self_port = ctx.state.self_port;

    let peers = match ctx.state.registry.active_peers(self_port) {
        Ok(peers) => peers,
        Err(e) => return format!("dispatch failed: registry unavailable ({e})"),
    };

    if peers.is_empty() {
        return "No peer nodes are currently registered in the swarm. Perform this task locally instead of dispatching it.".to_string();
    }

    let candidates: Vec<NodeRecord> = if let Some(target_port) = params.target_port {
        match peers.iter().find(|p| p.port == target_port) {
            Some(peer) => vec![peer.clone()],
            None => return format!("dispatch failed: no peer registered at port {target_port}"),
        }
    } else {
        let mut shuffled = peers;
        shuffled.shuffle(&mut rand::thread_rng());
        shuffled
    };

    let sub_session_id = params.sub_session_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut message = format!(
        "you are a worker in the swarm; store long artifacts under ./workspace/{sub}/; \
         do not dump full code or long text in the reply; report only paths and brief status.\n\n{task}",
        sub = sub_session_id,
        task = params.task_instruction,
    );
    if let Some(context) = &params.context_info {
        message.push_str(&format!("\n\nContext: {context}"));
    }
    if params.priority == Priority::Urgent {
        message = format!("[URGENT_INTERRUPT] {message}");
    }

    let caller_identity = format!("node-{self_port}");
    let mut last_error: Option<String> = None;

    for peer in candidates {
        let task_preview: String = params.task_instruction.chars().take(80).collect();
        let body = json!({
            "message": message,
            "app_name": CLUSTER_APP,
            "user_id": caller_identity,
            "session_id": sub_session_id,
        });

        let response = ctx
            .state
            .http_client
            .post(format!("{}/api/chat", peer.url))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                ctx.emit(Chunk::SwarmEvent {
                    sub_type: SwarmEventKind::Init,
                    worker_port: peer.port,
                    task_preview: Some(task_preview.clone()),
                    content: None,
                    error: None,
                });
                let final_report = consume_peer_stream(resp, ctx, peer.port).await;
                ctx.emit(Chunk::SwarmEvent {
                    sub_type: SwarmEventKind::Finish,
                    worker_port: peer.port,
                    task_preview: None,
                    content: None,
                    error: None,
                });
                return format!(
                    "✅ [SWARM TASK COMPLETED]\nWorker: port={}, session={}\n{}\n\n(cite this worker's result when reporting to the user)",
                    peer.port, sub_session_id, final_report
                );
            }
            Ok(resp) if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE => {
                let busy: BusyBody = resp.json().await.unwrap_or_default();
                if params.target_port.is_some() {
                    return format!(
                        "Peer port={} is busy (current_task={:?}, running_time_seconds={}). \
                         Retry with priority=URGENT to preempt it, or call dispatch_task without target_port to pick a different peer.",
                        peer.port, busy.current_task, busy.running_time_seconds
                    );
                }
                last_error = Some(format!("peer port={} busy", peer.port));
                continue;
            }
            Ok(resp) => {
                last_error = Some(format!("peer port={} returned HTTP {}", peer.port, resp.status()));
                continue;
            }
            Err(e) => {
                // Connection error: the peer is presumed dead. Prune and
                // move on (self-healing, spec.md §4.5 step 5, §8).
                let _ = ctx.state.registry.prune(peer.port);
                ctx.emit(Chunk::SwarmEvent {
                    sub_type: SwarmEventKind::Fail,
                    worker_port: peer.port,
                    task_preview: None,
                    content: None,
                    error: Some(e.to_string()),
                });
                last_error = Some(format!("peer port={} unreachable: {e}", peer.port));
                continue;
            }
        }
    }

    format!(
        "dispatch failed: all candidate peers exhausted. last error: {}",
        last_error.unwrap_or_else(|| "none".to_string())
    )
}

#[derive(Debug, Default, Deserialize)]
struct BusyBody {
    current_task: Option<String>,
    #[serde(default)]
    running_time_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ChunkLine {
    chunk: Chunk,
}

/// Consume a peer's NDJSON stream, projecting only `text` chunks into the
/// returned `final_report` (process-masking, `spec.md` §4.5 step 5) while
/// forwarding every chunk upward as a `swarm_event`.
async fn consume_peer_stream(response: reqwest::Response, ctx: &ToolContext, worker_port: u16) -> String {
    let mut stream = response.bytes_stream();
    let mut buf = String::new();
    let mut final_report = String::new();

    while let Some(next) = stream.next().await {
        let bytes = match next {
            Ok(b) => b,
            Err(e) => {
                ctx.emit(Chunk::SwarmEvent {
                    sub_type: SwarmEventKind::Fail,
                    worker_port,
                    task_preview: None,
                    content: None,
                    error: Some(e.to_string()),
                });
                break;
            }
        };
        buf.push_str(&String::from_utf8_lossy(&bytes));
        while let Some(pos) = buf.find('\n') {
            let line = buf[..pos].to_string();
            buf.drain(..=pos);
            if line.trim().is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<ChunkLine>(&line) else {
                continue;
            };
            if let Chunk::Text { text } = &parsed.chunk {
                final_report.push_str(text);
                ctx.emit(Chunk::SwarmEvent {
                    sub_type: SwarmEventKind::Chunk,
                    worker_port,
                    task_preview: None,
                    content: Some(text.clone()),
                    error: None,
                });
            }
            // tool_call / tool_result / thought chunks are deliberately
            // dropped here — process-masking bounds the leader's context
            // to the worker's final prose, not its working trace.
        }
    }

    final_report
}
