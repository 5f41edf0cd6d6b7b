// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The canonical event envelope and the per-session sequence counter that
//! orders it.
//!
//! # Ordering
//!
//! `seq` is a per-session counter starting at 1. [`EventFactory`] owns one
//! atomic counter per `sessionId` in a [`DashMap`], so concurrent sessions
//! never contend on each other's counter and a single session's counter is
//! incremented atomically regardless of which task calls `create_event`.
//!
//! Emission itself (`create_event` → hand the [`Event`] to the broadcast
//! channel) must happen on a single serialised path per session — this
//! crate only guarantees the counter is correct, not that callers serialise
//! their sends; see `bridge-gateway` for the per-session send queue that
//! makes that guarantee end to end.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::risk::RiskLevel;
use crate::session::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One item of a `message:complete` content array — text and tool-use
/// blocks are interleaved in emission order, matching the underlying
/// agent's own content-block ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { tool_call_id: String, tool_name: String, input: Value },
}

/// Preview shown to a client alongside `approval:requested`, derived from
/// the tool's input by a small per-tool-name table (see `bridge-approval`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ApprovalPreview {
    Command { command: String, working_dir: Option<String> },
    Description { text: String },
}

/// A summary of token usage, used by `resource:token_usage` and
/// `session:completed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub change_kind: FileChangeKind,
}

/// The full event taxonomy from the protocol reference. The wire tag is the
/// colon-separated `type` string named on each variant; unknown future
/// types round-trip opaquely via [`EventKind::Custom`] when tagged
/// `"custom"` with a `name` discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EventKind {
    #[serde(rename = "session:started")]
    SessionStarted { project_path: String },

    #[serde(rename = "message:start")]
    MessageStart { message_id: String, role: Role },

    #[serde(rename = "message:delta")]
    MessageDelta { message_id: String, role: Role, delta: String },

    #[serde(rename = "message:complete")]
    MessageComplete {
        message_id: String,
        role: Role,
        content: Vec<ContentBlock>,
    },

    #[serde(rename = "tool:start")]
    ToolStart { tool_call_id: String, tool_name: String, input: Value },

    #[serde(rename = "tool:executing")]
    ToolExecuting {
        tool_call_id: String,
        risk_level: RiskLevel,
        requires_approval: bool,
    },

    #[serde(rename = "tool:result")]
    ToolResult { tool_call_id: String, output: String, duration_ms: u64 },

    #[serde(rename = "tool:error")]
    ToolError { tool_call_id: String, code: String, message: String, recoverable: bool },

    #[serde(rename = "approval:requested")]
    ApprovalRequested {
        request_id: String,
        tool_call_id: String,
        tool_name: String,
        tool_input: Value,
        risk_level: RiskLevel,
        description: String,
        expires_at: String,
        preview: Option<ApprovalPreview>,
    },

    #[serde(rename = "approval:resolved")]
    ApprovalResolved {
        request_id: String,
        approved: bool,
        resolved_by: String,
        reason: Option<String>,
    },

    #[serde(rename = "environment:info")]
    EnvironmentInfo {
        model: Option<String>,
        agent_version: Option<String>,
    },

    #[serde(rename = "resource:token_usage")]
    ResourceTokenUsage {
        #[serde(flatten)]
        usage: TokenUsage,
    },

    #[serde(rename = "thinking:start")]
    ThinkingStart { message_id: String },

    #[serde(rename = "thinking:delta")]
    ThinkingDelta { message_id: String, delta: String },

    #[serde(rename = "thinking:complete")]
    ThinkingComplete { message_id: String, redacted: bool },

    #[serde(rename = "session:status_changed")]
    SessionStatusChanged { from: SessionStatus, to: SessionStatus },

    #[serde(rename = "session:error")]
    SessionError { code: String, message: String, recoverable: bool },

    #[serde(rename = "session:completed")]
    SessionCompleted {
        duration_ms: u64,
        token_usage: TokenUsage,
        files_changed: u64,
    },

    #[serde(rename = "file:change")]
    FileChange {
        #[serde(flatten)]
        change: FileChange,
    },

    #[serde(rename = "file:batch")]
    FileBatch { changes: Vec<FileChange> },

    #[serde(rename = "custom")]
    Custom {
        name: String,
        #[serde(flatten)]
        data: Value,
    },
}

/// The envelope common to every event: `{seq, sessionId, timestamp, type,
/// ...fields}`. `kind` is flattened so its internal `type` tag and payload
/// fields sit at the same JSON level as `seq`/`sessionId`/`timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub seq: u64,
    pub session_id: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Owns the per-session `seq` counters and stamps new events.
///
/// Counters are process-wide and not persisted — they reset implicitly on
/// daemon restart, and explicitly via [`EventFactory::reset_sequence`] /
/// [`EventFactory::reset_all_sequences`] (used by tests and by adapters
/// when a session is re-created with the same id).
#[derive(Debug, Default)]
pub struct EventFactory {
    counters: DashMap<String, AtomicU64>,
}

impl EventFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next `seq` for `session_id`, stamp `timestamp = now()`,
    /// and wrap `kind` into a full [`Event`]. The first event for a fresh
    /// session id gets `seq = 1`.
    pub fn create_event(&self, session_id: impl Into<String>, kind: EventKind) -> Event {
        let session_id = session_id.into();
        let counter = self
            .counters
            .entry(session_id.clone())
            .or_insert_with(|| AtomicU64::new(0));
        let seq = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Event {
            seq,
            session_id,
            timestamp: Utc::now().to_rfc3339(),
            kind,
        }
    }

    /// Zero the counter for one session (e.g. on session re-attach).
    pub fn reset_sequence(&self, session_id: &str) {
        self.counters.remove(session_id);
    }

    /// Clear every counter. Used by tests to get a clean slate.
    pub fn reset_all_sequences(&self) {
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_event_has_seq_one() {
        let f = EventFactory::new();
        let e = f.create_event("s1", EventKind::SessionStarted { project_path: "/tmp".into() });
        assert_eq!(e.seq, 1);
    }

    #[test]
    fn seq_increments_by_one_with_no_gaps() {
        let f = EventFactory::new();
        for i in 1..=5u64 {
            let e = f.create_event("s1", EventKind::SessionStarted { project_path: "/tmp".into() });
            assert_eq!(e.seq, i);
        }
    }

    #[test]
    fn different_sessions_have_independent_counters() {
        let f = EventFactory::new();
        let a1 = f.create_event("a", EventKind::SessionStarted { project_path: "/a".into() });
        let b1 = f.create_event("b", EventKind::SessionStarted { project_path: "/b".into() });
        let a2 = f.create_event("a", EventKind::SessionStarted { project_path: "/a".into() });
        assert_eq!(a1.seq, 1);
        assert_eq!(b1.seq, 1);
        assert_eq!(a2.seq, 2);
    }

    #[test]
    fn reset_sequence_zeroes_one_session_only() {
        let f = EventFactory::new();
        f.create_event("a", EventKind::SessionStarted { project_path: "/a".into() });
        f.create_event("b", EventKind::SessionStarted { project_path: "/b".into() });
        f.reset_sequence("a");
        let a = f.create_event("a", EventKind::SessionStarted { project_path: "/a".into() });
        let b = f.create_event("b", EventKind::SessionStarted { project_path: "/b".into() });
        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 2);
    }

    #[test]
    fn reset_all_sequences_clears_every_counter() {
        let f = EventFactory::new();
        f.create_event("a", EventKind::SessionStarted { project_path: "/a".into() });
        f.create_event("b", EventKind::SessionStarted { project_path: "/b".into() });
        f.reset_all_sequences();
        let a = f.create_event("a", EventKind::SessionStarted { project_path: "/a".into() });
        assert_eq!(a.seq, 1);
    }

    #[test]
    fn event_envelope_round_trips_through_json() {
        let f = EventFactory::new();
        let e = f.create_event(
            "s1",
            EventKind::ToolStart {
                tool_call_id: "tu1".into(),
                tool_name: "Write".into(),
                input: json!({"file_path": "/tmp/x"}),
            },
        );
        let text = serde_json::to_string(&e).unwrap();
        assert!(text.contains("\"type\":\"tool:start\""));
        assert!(text.contains("\"sessionId\":\"s1\""));
        let back: Event = serde_json::from_str(&text).unwrap();
        assert_eq!(back.seq, e.seq);
        match back.kind {
            EventKind::ToolStart { tool_call_id, .. } => assert_eq!(tool_call_id, "tu1"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn custom_event_round_trips_opaquely() {
        let f = EventFactory::new();
        let e = f.create_event(
            "s1",
            EventKind::Custom { name: "claude:compaction".into(), data: json!({"freed": 42}) },
        );
        let text = serde_json::to_string(&e).unwrap();
        let back: Event = serde_json::from_str(&text).unwrap();
        match back.kind {
            EventKind::Custom { name, data } => {
                assert_eq!(name, "claude:compaction");
                assert_eq!(data["freed"], 42);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn approval_resolved_round_trip() {
        let f = EventFactory::new();
        let e = f.create_event(
            "s1",
            EventKind::ApprovalResolved {
                request_id: "r1".into(),
                approved: true,
                resolved_by: "user".into(),
                reason: None,
            },
        );
        let text = serde_json::to_string(&e).unwrap();
        let back: Event = serde_json::from_str(&text).unwrap();
        match back.kind {
            EventKind::ApprovalResolved { approved, .. } => assert!(approved),
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
