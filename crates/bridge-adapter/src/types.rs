// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Plain data shared by the [`crate::Adapter`] and [`crate::Session`] traits.
//! None of it carries behaviour — it exists so an adapter can hand the
//! orchestrator a result without the orchestrator knowing that adapter's
//! internal record types.

use std::path::PathBuf;

use serde_json::Value;

/// Filesystem hints an adapter may expose for diagnostics. Any field may be
/// absent — an HTTP-only adapter has no `sessions`/`logs` directory at all.
#[derive(Debug, Clone, Default)]
pub struct DataPaths {
    pub sessions: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub logs: Option<PathBuf>,
}

/// One row of `discoverSessions()` — enough to populate a session
/// descriptor without attaching.
#[derive(Debug, Clone)]
pub struct DiscoveredSession {
    pub id: String,
    pub project_path: String,
    pub session_name: Option<String>,
    pub last_message: Option<String>,
    pub model_id: Option<String>,
    /// Used to sort discovery results newest-first; not surfaced to clients.
    pub modified_at: std::time::SystemTime,
}

/// Parameters for `startSession`.
#[derive(Debug, Clone)]
pub struct StartSessionParams {
    pub project_path: String,
    pub prompt: String,
    pub model: Option<String>,
    pub agent_options: Option<Value>,
}
