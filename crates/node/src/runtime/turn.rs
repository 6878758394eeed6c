//! The session runtime: the ReAct loop (`spec.md` §4.1). Sends the
//! conversation to the model, streams parts upward as chunks, dispatches
//! tool invocations sequentially in emission order, persists events, and
//! honors cancellation and compaction along the way.

use std::collections::HashMap;

use futures_util::StreamExt;
use swarm_domain::chunk::Chunk;
use swarm_domain::error::{Error, Result};
use swarm_domain::event::{Author, Content, Event, Part};
use swarm_domain::session::{Session, SessionKey};
use swarm_domain::stream::StreamEvent;
use swarm_domain::tool::{Message, ToolCall};
use swarm_providers::traits::ChatRequest;
use tokio::sync::mpsc::UnboundedSender;

use super::cancel::{check_cancellation, CancelToken};
use super::tool_trait::ToolContext;
use crate::state::AppState;

/// Backstop against a model stuck in an endless tool-call cycle. Ambient
/// engineering, not a spec feature — the spec's loop has no iteration cap
/// of its own.
const MAX_TOOL_LOOPS: usize = 25;

pub async fn run_turn(
    state: AppState,
    session_key: SessionKey,
    user_message: String,
    cancel: CancelToken,
    chunk_tx: UnboundedSender<Chunk>,
) {
    if let Err(e) = run_turn_inner(&state, &session_key, user_message, &cancel, &chunk_tx).await {
        let _ = chunk_tx.send(Chunk::text(format!("[error] {e}")));
    }
}

async fn run_turn_inner(
    state: &AppState,
    session_key: &SessionKey,
    user_message: String,
    cancel: &CancelToken,
    chunk_tx: &UnboundedSender<Chunk>,
) -> Result<()> {
    state.sessions.get_or_create(session_key)?;

    let title = Session::derive_title(&user_message);
    state.sessions.set_title_if_unset(session_key, &title)?;

    let user_event = Event::user(user_message);
    state.sessions.append_event(session_key, user_event)?;

    let db_key = session_key.as_db_key();
    let ctx = ToolContext {
        session_key: session_key.clone(),
        state: state.clone(),
        cancel: cancel.clone(),
        chunk_tx: chunk_tx.clone(),
    };

    let mut retried_after_compaction = false;

    for _ in 0..MAX_TOOL_LOOPS {
        check_cancellation(cancel)?;

        let session = state
            .sessions
            .get(session_key)?
            .ok_or_else(|| Error::Other("session vanished mid-turn".to_string()))?;

        let executor = state.llm.executor();

        // Pre-flight predictive/structural check (spec.md §4.1 step 3,
        // §4.3): run before the request is built, not just reactively after
        // the model rejects it. Reactive triggering still happens below via
        // `ContextWindowExceeded`/`StreamEvent::ContextWindowExceeded`.
        if state.compactor.config().auto && !retried_after_compaction {
            let context_window_tokens = executor.capabilities().context_window_tokens;
            if let Some(tier) = state.compactor.should_compact(&session.events, context_window_tokens) {
                swarm_domain::trace::TraceEvent::CompactionTriggered {
                    session_key: db_key.clone(),
                    tier: tier.as_str(),
                }
                .emit();
                run_compaction(state, session_key, None).await?;
                retried_after_compaction = true;
                continue;
            }
        }

        let bound_names = state.bound_tools(&db_key);
        let tools = state.tools.definitions_for(&bound_names);
        let messages = render_messages(&state.skills.render_index(), &session.events);

        let req = ChatRequest {
            messages,
            tools,
            ..Default::default()
        };

        let mut stream = match executor.chat_stream(req).await {
            Ok(s) => s,
            Err(Error::ContextWindowExceeded) => {
                if retried_after_compaction {
                    return Err(Error::ContextWindowExceeded);
                }
                run_compaction(state, session_key, None).await?;
                retried_after_compaction = true;
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut response_text = String::new();
        let mut pending_calls: HashMap<String, (String, String)> = HashMap::new();
        let mut finished_calls: Vec<ToolCall> = Vec::new();
        let mut context_exceeded = false;

        while let Some(event) = stream.next().await {
            check_cancellation(cancel)?;
            match event? {
                StreamEvent::Token { text } => {
                    response_text.push_str(&text);
                    chunk_tx.send(Chunk::text(text)).ok();
                }
                StreamEvent::Thinking { text } => {
                    chunk_tx.send(Chunk::Thought { text }).ok();
                }
                StreamEvent::ToolCallStarted { call_id, tool_name } => {
                    pending_calls.insert(call_id, (tool_name, String::new()));
                }
                StreamEvent::ToolCallDelta { call_id, delta } => {
                    if let Some((_, args)) = pending_calls.get_mut(&call_id) {
                        args.push_str(&delta);
                    }
                }
                StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                    pending_calls.remove(&call_id);
                    finished_calls.push(ToolCall {
                        call_id,
                        tool_name,
                        arguments,
                    });
                }
                StreamEvent::ContextWindowExceeded => {
                    context_exceeded = true;
                    break;
                }
                StreamEvent::Done { .. } => break,
                StreamEvent::Error { message } => return Err(Error::Other(message)),
            }
        }

        if context_exceeded {
            if retried_after_compaction {
                return Err(Error::ContextWindowExceeded);
            }
            let pending_call = finished_calls.first().map(|c| c.tool_name.as_str());
            run_compaction(state, session_key, pending_call).await?;
            retried_after_compaction = true;
            continue;
        }

        if !response_text.is_empty() {
            state
                .sessions
                .append_event(session_key, Event::model_text(response_text))?;
        }

        if finished_calls.is_empty() {
            return Ok(());
        }

        let call_parts: Vec<Part> = finished_calls
            .iter()
            .map(|c| Part::FunctionCall {
                tool_name: c.tool_name.clone(),
                args: c.arguments.clone(),
            })
            .collect();
        state.sessions.append_event(
            session_key,
            Event::new(Author::Model, Content { role: Author::Model, parts: call_parts }),
        )?;

        // Sequential dispatch in emission order (spec.md §4.1 Tie-breaks):
        // a later call in the same turn may depend on an earlier one's
        // result, so these never run concurrently. Concurrency is the
        // batch dispatcher's job, not the loop's.
        for call in &finished_calls {
            check_cancellation(cancel)?;
            chunk_tx
                .send(Chunk::tool_call(call.tool_name.clone(), call.arguments.clone()))
                .ok();

            let result = match state.tools.get(&call.tool_name) {
                Some(tool) => tool.invoke(call.arguments.clone(), &ctx).await,
                None => Err(Error::Tool(format!("no tool bound named {}", call.tool_name))),
            };

            let (content, clean) = match result {
                Ok(value) => (value, Some(true)),
                Err(e) => (serde_json::json!({"error": e.to_string(), "status": "failed"}), Some(false)),
            };
            let content = truncate_tool_result(content);

            chunk_tx
                .send(Chunk::tool_result(call.tool_name.clone(), content.clone(), clean))
                .ok();

            state.sessions.append_event(
                session_key,
                Event::new(
                    Author::System,
                    Content {
                        role: Author::System,
                        parts: vec![Part::FunctionResponse {
                            tool_name: call.tool_name.clone(),
                            result: content,
                        }],
                    },
                ),
            )?;
        }
    }

    chunk_tx
        .send(Chunk::text("\n[stopped: reached the maximum number of tool-call iterations for this turn]"))
        .ok();
    Ok(())
}

/// Runs one compaction pass, whichever tier triggered it (predictive,
/// structural, or reactive) — `compact` itself is tier-agnostic.
async fn run_compaction(state: &AppState, session_key: &SessionKey, pending_call: Option<&str>) -> Result<()> {
    let session = state
        .sessions
        .get(session_key)?
        .ok_or_else(|| Error::Other("session vanished during compaction".to_string()))?;
    let events_before = session.events.len();
    let new_events = state
        .compactor
        .compact(state.llm.summarizer(), &session.events, pending_call)
        .await?;
    let events_after = new_events.len();
    state.sessions.replace_events(session_key, &new_events)?;
    swarm_domain::trace::TraceEvent::CompactionCompleted {
        session_key: session_key.as_db_key(),
        events_before,
        events_after,
    }
    .emit();
    Ok(())
}

/// Cap on a single tool result's serialized size before it's appended to
/// the event log or sent back to the model (`spec.md` §4.1 Edge cases: "a
/// tool that returns a value too large to send to the model is truncated
/// with a marker"). Ambient constant, not a spec-named number.
const MAX_TOOL_RESULT_CHARS: usize = 20_000;

fn truncate_tool_result(value: serde_json::Value) -> serde_json::Value {
    let rendered = value.to_string();
    let total_chars = rendered.chars().count();
    if total_chars <= MAX_TOOL_RESULT_CHARS {
        return value;
    }
    let kept: String = rendered.chars().take(MAX_TOOL_RESULT_CHARS).collect();
    serde_json::json!({
        "truncated": true,
        "original_chars": total_chars,
        "content": kept,
    })
}

/// Flatten the persisted event log plus the skill index into provider
/// messages. Past `function_call`/`function_response` parts are rendered
/// as plain narrative text rather than reconstructed as wire-level
/// `tool_calls`/`tool_call_id` pairs — the domain event model doesn't
/// carry call ids (only tool names), so exact replay of the original
/// OpenAI tool-calling shape isn't attempted; this mirrors the
/// compaction engine's own `render_conversation` approach to history.
fn render_messages(skills_index: &str, events: &[Event]) -> Vec<Message> {
    let mut messages = vec![Message::system(format!(
        "Available skills (call skill_load with a skill_id to activate one):\n{skills_index}"
    ))];

    for event in events {
        for part in &event.content.parts {
            match part {
                Part::Text { text } | Part::Thought { text } => {
                    let msg = match event.author {
                        Author::User => Message::user(text.clone()),
                        Author::Model => Message::assistant(text.clone()),
                        Author::System => Message::system(text.clone()),
                    };
                    messages.push(msg);
                }
                Part::FunctionCall { tool_name, args } => {
                    messages.push(Message::assistant(format!("[called {tool_name}({args})]")));
                }
                Part::FunctionResponse { tool_name, result } => {
                    messages.push(Message::system(format!("[{tool_name} returned {result}]")));
                }
            }
        }
    }
    messages
}
