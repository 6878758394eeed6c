//! The `skill_load` meta-tool (`spec.md` §4.7) plus its special case for
//! the `compactor` skill (`spec.md` §4.2's `smart_compact()`, folded into
//! the same activation path rather than bound as a second tool — see
//! `DESIGN.md`).

use async_trait::async_trait;
use serde_json::{json, Value};
use swarm_domain::error::{Error, Result};
use swarm_domain::tool::ToolDefinition;
use swarm_skills::COMPACTOR_SKILL_ID;

use super::tool_trait::{Tool, ToolContext};

pub struct SkillLoadTool;

#[async_trait]
impl Tool for SkillLoadTool {
    fn name(&self) -> &str {
        "skill_load"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Load a skill's full standard operating procedure and import any tools it contributes. \
                Pass skill_id=\"compactor\" to force an immediate context compaction regardless of trigger thresholds."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "skill_id": {"type": "string", "description": "Identifier of the skill to load, from the skill index."}
                },
                "required": ["skill_id"]
            }),
        }
    }

    async fn invoke(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let skill_id = args
            .get("skill_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Tool("skill_load requires a skill_id argument".to_string()))?;

        if skill_id == COMPACTOR_SKILL_ID {
            return force_compact(ctx).await;
        }

        let doc = ctx.state.skills.read_doc(skill_id)?;
        let db_key = ctx.session_key.as_db_key();
        let newly_bound = ctx.state.bind_tool(&db_key, skill_id);

        swarm_domain::trace::TraceEvent::SkillActivated {
            session_key: db_key.clone(),
            skill_id: skill_id.to_string(),
        }
        .emit();

        Ok(json!({
            "status": "loaded",
            "skill_id": skill_id,
            "newly_bound": newly_bound,
            "instructions": doc,
        }))
    }
}

async fn force_compact(ctx: &ToolContext) -> Result<Value> {
    let db_key = ctx.session_key.as_db_key();
    let session = ctx
        .state
        .sessions
        .get(&ctx.session_key)?
        .ok_or_else(|| Error::Tool("cannot compact a session that does not exist".to_string()))?;

    let events_before = session.events.len();
    let summarizer = ctx.state.llm.summarizer();
    let new_events = ctx.state.compactor.compact(summarizer, &session.events, None).await?;
    let events_after = new_events.len();
    ctx.state.sessions.replace_events(&ctx.session_key, &new_events)?;

    swarm_domain::trace::TraceEvent::CompactionCompleted {
        session_key: db_key,
        events_before,
        events_after,
    }
    .emit();

    Ok(json!({
        "status": "compacted",
        "events_before": events_before,
        "events_after": events_after,
    }))
}
