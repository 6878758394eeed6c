//! The batch dispatcher tool (`spec.md` §4.6): fans out `dispatch_task` in
//! parallel across a list of task strings and joins the reports behind a
//! stable, byte-for-byte delimiter the UI parses into per-task cards.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};
use swarm_domain::error::{Error, Result};
use swarm_domain::tool::ToolDefinition;
use uuid::Uuid;

use super::dispatcher::{dispatch_one, DispatchParams, Priority};
use crate::runtime::tool_trait::{Tool, ToolContext};

pub struct DispatchBatchTool;

#[async_trait]
impl Tool for DispatchBatchTool {
    fn name(&self) -> &str {
        "dispatch_batch"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Fan out several independent sub-tasks to the swarm in parallel and return a joined report. \
                No ordering is guaranteed between tasks."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "tasks": {"type": "array", "items": {"type": "string"}},
                    "common_context": {"type": "string"},
                    "priority": {"type": "string", "enum": ["NORMAL", "URGENT"]}
                },
                "required": ["tasks"]
            }),
        }
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let tasks: Vec<String> = args
            .get("tasks")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::Tool("dispatch_batch requires a tasks array".to_string()))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        if tasks.is_empty() {
            return Err(Error::Tool("dispatch_batch requires at least one task".to_string()));
        }
        let common_context = args.get("common_context").and_then(|v| v.as_str()).map(str::to_string);
        let priority = Priority::from_str(args.get("priority").and_then(|v| v.as_str()));

        let futures = tasks.into_iter().map(|task_instruction| {
            let params = DispatchParams {
                task_instruction,
                context_info: common_context.clone(),
                target_port: None,
                sub_session_id: Some(Uuid::new_v4().to_string()),
                priority,
            };
            dispatch_one(ctx, params)
        });

        let reports = join_all(futures).await;
        let joined = reports
            .into_iter()
            .enumerate()
            .map(|(i, report)| format!("--- 任务 {} 结果 ---\n{}", i + 1, report))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(json!({ "report": joined }))
    }
}
