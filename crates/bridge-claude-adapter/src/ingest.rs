// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Translates one JSONL record — attach mode (`handle_record`) or one
//! stdout line from a live subprocess (`handle_stream_record`) — into
//! zero or more canonical events. Both entry points share the block
//! walkers in [`crate::record`] so the two ingestion modes stay provably
//! consistent with each other.

use bridge_protocol::event::{ContentBlock, EventKind, Role};
use bridge_protocol::risk::assess_risk;
use bridge_protocol::{Event, EventFactory, SessionStatus};
use serde_json::Value;
use uuid::Uuid;

use crate::record::{
    extract_assistant_blocks, extract_text, extract_tool_results, parse_usage, AssistantBlock,
};

/// Mutable state threaded through a session's ingestion, independent of
/// attach vs. live mode — both record families update the same fields.
#[derive(Debug, Clone)]
pub struct IngestState {
    pub project_path: Option<String>,
    pub version: Option<String>,
    pub environment_emitted: bool,
    pub status: SessionStatus,
}

impl Default for IngestState {
    fn default() -> Self {
        Self {
            project_path: None,
            version: None,
            environment_emitted: false,
            status: SessionStatus::Starting,
        }
    }
}

fn transition(state: &mut IngestState, to: SessionStatus, factory: &EventFactory, session_id: &str) -> Option<Event> {
    if state.status == to {
        return None;
    }
    let from = state.status;
    state.status = to;
    Some(factory.create_event(session_id, EventKind::SessionStatusChanged { from, to }))
}

fn new_message_id(uuid_field: Option<&str>) -> String {
    uuid_field.map(str::to_string).unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// §4.3.1 — one line from an attached `.jsonl` file. Malformed JSON and
/// unrecognised record types produce no events.
pub fn handle_record(
    factory: &EventFactory,
    session_id: &str,
    line: &str,
    state: &mut IngestState,
) -> Vec<Event> {
    let Ok(value) = serde_json::from_str::<Value>(line) else { return Vec::new() };
    match value.get("type").and_then(Value::as_str) {
        Some("user") => handle_user_record(factory, session_id, &value, state),
        Some("assistant") => handle_assistant_record(factory, session_id, &value, state, true),
        _ => Vec::new(),
    }
}

fn handle_user_record(
    factory: &EventFactory,
    session_id: &str,
    value: &Value,
    state: &mut IngestState,
) -> Vec<Event> {
    let mut events = Vec::new();

    if state.project_path.is_none() {
        if let Some(cwd) = value.get("cwd").and_then(Value::as_str) {
            state.project_path = Some(cwd.to_string());
        }
    }
    if state.version.is_none() {
        if let Some(v) = value.get("version").and_then(Value::as_str) {
            state.version = Some(v.to_string());
        }
    }

    let content = value.pointer("/message/content").cloned().unwrap_or(Value::Null);
    let text = extract_text(&content);
    if !text.trim().is_empty() {
        let message_id = new_message_id(value.get("uuid").and_then(Value::as_str));
        events.push(factory.create_event(
            session_id,
            EventKind::MessageStart { message_id: message_id.clone(), role: Role::User },
        ));
        events.push(factory.create_event(
            session_id,
            EventKind::MessageComplete {
                message_id,
                role: Role::User,
                content: vec![ContentBlock::Text { text }],
            },
        ));
    }

    for result in extract_tool_results(&content) {
        let event = if result.is_error {
            EventKind::ToolError {
                tool_call_id: result.tool_use_id,
                code: "TOOL_ERROR".to_string(),
                message: result.output,
                recoverable: true,
            }
        } else {
            EventKind::ToolResult { tool_call_id: result.tool_use_id, output: result.output, duration_ms: 0 }
        };
        events.push(factory.create_event(session_id, event));
    }

    if let Some(e) = transition(state, SessionStatus::Thinking, factory, session_id) {
        events.push(e);
    }
    events
}

/// §4.3.1 (assistant half) and §4.3.2 (shared with live mode). `complete`
/// is `false` when ingesting a streaming fragment whose `stop_reason` is
/// still `null` — the record represents partial output and MUST NOT
/// close the message out.
fn handle_assistant_record(
    factory: &EventFactory,
    session_id: &str,
    value: &Value,
    state: &mut IngestState,
    complete: bool,
) -> Vec<Event> {
    let mut events = Vec::new();

    if let Some(e) = transition(state, SessionStatus::Running, factory, session_id) {
        events.push(e);
    }

    let message = value.get("message").unwrap_or(&Value::Null);
    if !state.environment_emitted {
        if let Some(model) = message.get("model").and_then(Value::as_str) {
            events.push(factory.create_event(
                session_id,
                EventKind::EnvironmentInfo {
                    model: Some(model.to_string()),
                    agent_version: state.version.clone(),
                },
            ));
            state.environment_emitted = true;
        }
    }

    if let Some(usage) = message.get("usage") {
        events.push(factory.create_event(
            session_id,
            EventKind::ResourceTokenUsage { usage: parse_usage(usage) },
        ));
    }

    let message_id = new_message_id(value.get("uuid").and_then(Value::as_str));
    events.push(factory.create_event(
        session_id,
        EventKind::MessageStart { message_id: message_id.clone(), role: Role::Assistant },
    ));

    let content = message.get("content").cloned().unwrap_or(Value::Null);
    let mut text = String::new();
    let mut content_blocks = Vec::new();
    for block in extract_assistant_blocks(&content) {
        match block {
            AssistantBlock::Text(t) => {
                text.push_str(&t);
                content_blocks.push(ContentBlock::Text { text: t });
            }
            AssistantBlock::Thinking(t) => {
                let thinking_id = Uuid::new_v4().to_string();
                events.push(factory.create_event(
                    session_id,
                    EventKind::ThinkingStart { message_id: thinking_id.clone() },
                ));
                if !t.text.is_empty() {
                    events.push(factory.create_event(
                        session_id,
                        EventKind::ThinkingDelta { message_id: thinking_id.clone(), delta: t.text },
                    ));
                }
                events.push(factory.create_event(
                    session_id,
                    EventKind::ThinkingComplete { message_id: thinking_id, redacted: t.redacted },
                ));
            }
            AssistantBlock::ToolUse(tool_use) => {
                let risk = assess_risk(&tool_use.name, &tool_use.input);
                content_blocks.push(ContentBlock::ToolUse {
                    tool_call_id: tool_use.id.clone(),
                    tool_name: tool_use.name.clone(),
                    input: tool_use.input.clone(),
                });
                events.push(factory.create_event(
                    session_id,
                    EventKind::ToolStart {
                        tool_call_id: tool_use.id.clone(),
                        tool_name: tool_use.name.clone(),
                        input: tool_use.input,
                    },
                ));
                events.push(factory.create_event(
                    session_id,
                    EventKind::ToolExecuting {
                        tool_call_id: tool_use.id,
                        risk_level: risk,
                        requires_approval: false,
                    },
                ));
            }
        }
    }

    if !text.is_empty() {
        events.push(factory.create_event(
            session_id,
            EventKind::MessageDelta { message_id: message_id.clone(), role: Role::Assistant, delta: text },
        ));
    }

    if complete {
        events.push(factory.create_event(
            session_id,
            EventKind::MessageComplete { message_id, role: Role::Assistant, content: content_blocks },
        ));
    }

    events
}

/// §4.3.2 — one stdout line from a live subprocess. Returns the produced
/// events plus, for `system{subtype:init}` records, the definitive
/// session id reported by the CLI.
pub fn handle_stream_record(
    factory: &EventFactory,
    session_id: &str,
    line: &str,
    state: &mut IngestState,
) -> (Vec<Event>, Option<String>) {
    let Ok(value) = serde_json::from_str::<Value>(line) else { return (Vec::new(), None) };
    match value.get("type").and_then(Value::as_str) {
        Some("system") if value.get("subtype").and_then(Value::as_str) == Some("init") => {
            let mut events = Vec::new();
            if let Some(v) = value.get("claude_version").and_then(Value::as_str) {
                state.version = Some(v.to_string());
            }
            if !state.environment_emitted {
                events.push(factory.create_event(
                    session_id,
                    EventKind::EnvironmentInfo {
                        model: value.get("model").and_then(Value::as_str).map(str::to_string),
                        agent_version: state.version.clone(),
                    },
                ));
                state.environment_emitted = true;
            }
            let definitive_id = value.get("session_id").and_then(Value::as_str).map(str::to_string);
            (events, definitive_id)
        }
        Some("tool_use") => {
            let id = value.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
            let name = value.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let input = value.get("input").cloned().unwrap_or(Value::Null);
            let risk = assess_risk(&name, &input);
            (
                vec![
                    factory.create_event(
                        session_id,
                        EventKind::ToolStart { tool_call_id: id.clone(), tool_name: name, input },
                    ),
                    factory.create_event(
                        session_id,
                        EventKind::ToolExecuting { tool_call_id: id, risk_level: risk, requires_approval: false },
                    ),
                ],
                None,
            )
        }
        Some("tool_result") => {
            let tool_call_id =
                value.get("tool_use_id").and_then(Value::as_str).unwrap_or_default().to_string();
            let is_error = value.get("is_error").and_then(Value::as_bool).unwrap_or(false);
            let output = extract_text(value.get("content").unwrap_or(&Value::Null));
            let event = if is_error {
                EventKind::ToolError { tool_call_id, code: "TOOL_ERROR".to_string(), message: output, recoverable: true }
            } else {
                EventKind::ToolResult { tool_call_id, output, duration_ms: 0 }
            };
            (vec![factory.create_event(session_id, event)], None)
        }
        Some("user") => (handle_user_record(factory, session_id, &value, state), None),
        Some("assistant") => {
            let stop_reason = value.pointer("/message/stop_reason").or_else(|| value.get("stop_reason"));
            let complete = !matches!(stop_reason, None | Some(Value::Null));
            (handle_assistant_record(factory, session_id, &value, state, complete), None)
        }
        _ => (Vec::new(), None),
    }
}
