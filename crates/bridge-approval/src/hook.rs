// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The hook RPC contract: an external hook script posts a [`HookInput`] and
//! blocks for a [`HookDecision`]. Field names are intentionally snake_case
//! (not the rest of the wire protocol's camelCase) — this is the one
//! surface shared with the agent CLI's own hook mechanism, which already
//! speaks snake_case.

use bridge_protocol::event::ApprovalPreview;
use bridge_protocol::session::PermissionMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    pub session_id: String,
    pub tool_name: String,
    pub tool_use_id: String,
    pub tool_input: Value,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
}

/// What the hook script does with the return value: `ask` means "I
/// decline to decide — fall back to your own interactive prompt".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookDecision {
    Allow,
    Deny,
    Ask,
}

impl HookDecision {
    pub fn approved(self) -> bool {
        matches!(self, HookDecision::Allow)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HookResponse {
    pub decision: HookDecision,
}

impl From<HookDecision> for HookResponse {
    fn from(decision: HookDecision) -> Self {
        Self { decision }
    }
}

/// Who caused a pending approval to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    User,
    Policy,
    Timeout,
}

impl ResolvedBy {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolvedBy::User => "user",
            ResolvedBy::Policy => "policy",
            ResolvedBy::Timeout => "timeout",
        }
    }
}

/// `Bash → {command, workingDir}`; `Write|Edit → {description}`; anything
/// else gets no preview. `cwd` is the hook call's own working directory,
/// not part of Bash's tool schema.
pub fn derive_preview(
    tool_name: &str,
    tool_input: &Value,
    cwd: Option<&str>,
) -> Option<ApprovalPreview> {
    match tool_name {
        "Bash" => {
            let command = tool_input.get("command").and_then(Value::as_str)?.to_string();
            let working_dir = cwd.map(str::to_string);
            Some(ApprovalPreview::Command { command, working_dir })
        }
        "Write" | "Edit" => {
            let text = bridge_protocol::risk::describe_tool_call(tool_name, tool_input);
            Some(ApprovalPreview::Description { text })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bash_preview_carries_command() {
        let preview = derive_preview("Bash", &json!({"command": "ls -la"}), None).unwrap();
        match preview {
            ApprovalPreview::Command { command, .. } => assert_eq!(command, "ls -la"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn bash_preview_carries_working_dir_from_hook_cwd() {
        let preview =
            derive_preview("Bash", &json!({"command": "ls -la"}), Some("/tmp/project")).unwrap();
        match preview {
            ApprovalPreview::Command { working_dir, .. } => {
                assert_eq!(working_dir.as_deref(), Some("/tmp/project"))
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn write_preview_is_description() {
        let preview = derive_preview("Write", &json!({"file_path": "/tmp/foo.ts"}), None).unwrap();
        match preview {
            ApprovalPreview::Description { text } => assert_eq!(text, "Write /tmp/foo.ts"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_has_no_preview() {
        assert!(derive_preview("Glob", &json!({}), None).is_none());
    }

    #[test]
    fn hook_decision_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&HookDecision::Ask).unwrap(), "\"ask\"");
    }

    #[test]
    fn hook_input_deserializes_without_cwd() {
        let text = r#"{"session_id":"s1","tool_name":"Write","tool_use_id":"tu1","tool_input":{"file_path":"/tmp/foo.ts"},"permission_mode":"default"}"#;
        let input: HookInput = serde_json::from_str(text).unwrap();
        assert_eq!(input.session_id, "s1");
        assert!(input.cwd.is_none());
        assert_eq!(input.permission_mode, Some(PermissionMode::Default));
    }
}
