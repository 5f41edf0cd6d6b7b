// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Commands a client sends over the multiplexer to steer a session. Tagged
//! on the wire by the `command` field rather than `type`, to keep commands
//! visually distinct from events in a mixed log.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::PermissionMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Command {
    SendMessage {
        session_id: String,
        text: String,
    },
    ApproveToolCall {
        request_id: String,
        tool_call_id: String,
    },
    DenyToolCall {
        request_id: String,
        tool_call_id: String,
        reason: Option<String>,
    },
    Cancel {
        session_id: String,
    },
    Pause {
        session_id: String,
    },
    Resume {
        session_id: String,
    },
    Terminate {
        session_id: String,
    },
    AnswerQuestion {
        session_id: String,
        question_id: String,
        answer: Value,
    },
    SetPermissionPolicy {
        session_id: String,
        mode: PermissionMode,
    },
}

impl Command {
    /// The session a command targets, when it targets one. `ApproveToolCall`
    /// and `DenyToolCall` are scoped by `request_id` instead — the approval
    /// manager resolves that to a session internally.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Command::SendMessage { session_id, .. }
            | Command::Cancel { session_id }
            | Command::Pause { session_id }
            | Command::Resume { session_id }
            | Command::Terminate { session_id }
            | Command::AnswerQuestion { session_id, .. }
            | Command::SetPermissionPolicy { session_id, .. } => Some(session_id),
            Command::ApproveToolCall { .. } | Command::DenyToolCall { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn approve_tool_call_matches_wire_shape() {
        let text = r#"{"command":"approve_tool_call","requestId":"r1","toolCallId":"tu1"}"#;
        let cmd: Command = serde_json::from_str(text).unwrap();
        match cmd {
            Command::ApproveToolCall { request_id, tool_call_id } => {
                assert_eq!(request_id, "r1");
                assert_eq!(tool_call_id, "tu1");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn deny_tool_call_reason_is_optional() {
        let text = r#"{"command":"deny_tool_call","requestId":"r1","toolCallId":"tu1"}"#;
        let cmd: Command = serde_json::from_str(text).unwrap();
        match cmd {
            Command::DenyToolCall { reason, .. } => assert!(reason.is_none()),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn send_message_round_trips() {
        let cmd = Command::SendMessage { session_id: "s1".into(), text: "hi".into() };
        let text = serde_json::to_string(&cmd).unwrap();
        assert!(text.contains("\"command\":\"send_message\""));
        assert!(text.contains("\"sessionId\":\"s1\""));
        let back: Command = serde_json::from_str(&text).unwrap();
        assert_eq!(back.session_id(), Some("s1"));
    }

    #[test]
    fn set_permission_policy_carries_mode() {
        let cmd = Command::SetPermissionPolicy {
            session_id: "s1".into(),
            mode: PermissionMode::BypassPermissions,
        };
        let text = serde_json::to_string(&cmd).unwrap();
        assert!(text.contains("\"mode\":\"bypassPermissions\""));
    }

    #[test]
    fn answer_question_carries_arbitrary_json_answer() {
        let cmd = Command::AnswerQuestion {
            session_id: "s1".into(),
            question_id: "q1".into(),
            answer: json!({"choice": 2}),
        };
        let text = serde_json::to_string(&cmd).unwrap();
        let back: Command = serde_json::from_str(&text).unwrap();
        match back {
            Command::AnswerQuestion { answer, .. } => assert_eq!(answer["choice"], 2),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn approve_and_deny_have_no_session_id() {
        let a = Command::ApproveToolCall { request_id: "r".into(), tool_call_id: "t".into() };
        let d = Command::DenyToolCall { request_id: "r".into(), tool_call_id: "t".into(), reason: None };
        assert_eq!(a.session_id(), None);
        assert_eq!(d.session_id(), None);
    }
}
