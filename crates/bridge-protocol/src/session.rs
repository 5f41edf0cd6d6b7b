// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Session descriptor, lifecycle status, and permission mode — the shapes
//! the orchestrator exposes to clients and the approval manager consults.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session. Transitions are broadcast as
/// `session:status_changed { from, to }` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Running,
    Thinking,
    WaitingForInput,
    WaitingForApproval,
    Paused,
    Idle,
    Completed,
    Error,
}

/// Out-of-band hint from the agent that widens or narrows the approval
/// policy. Carried on `HookInput` and settable via `set_permission_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

impl Default for PermissionMode {
    fn default() -> Self {
        PermissionMode::Default
    }
}

/// What the orchestrator exposes to clients via `sessions_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub id: String,
    pub adapter: String,
    pub project_path: String,
    pub display_name: Option<String>,
    pub status: SessionStatus,
    pub created_at: String,
    pub last_activity: String,
    pub first_user_message: Option<String>,
    pub last_assistant_message: Option<String>,
    pub model_id: Option<String>,
    #[serde(default)]
    pub permission_mode: PermissionMode,
}
