// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The `Adapter` contract: one per agent family. An adapter knows how to
//! detect the underlying CLI, discover existing sessions, watch for new
//! ones, and bring a [`crate::Session`] into being either by attaching to
//! an existing log or by spawning a fresh process.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Capabilities;

use crate::error::AdapterError;
use crate::session::Session;
use crate::types::{DataPaths, DiscoveredSession, StartSessionParams};
use crate::watch::{DiscoveryEvent, WatchHandle};

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Pure descriptor of what this adapter's agent can do.
    fn capabilities(&self) -> Capabilities;

    /// Best-effort detection of the underlying CLI. Shells out; a
    /// non-zero exit or missing binary means `false`.
    async fn is_installed(&self) -> bool;

    /// Version string reported by the CLI, if detection succeeded.
    async fn version(&self) -> Option<String>;

    /// Filesystem hints for diagnostics. May be entirely empty.
    fn data_paths(&self) -> DataPaths;

    /// Enumerate sessions already on disk, newest first. Read-only;
    /// malformed or unreadable candidates are skipped rather than failing
    /// the whole call.
    async fn discover_sessions(&self) -> Result<Vec<DiscoveredSession>, AdapterError>;

    /// Start watching for new, changed, or removed sessions. The callback
    /// may be invoked from any task; cancelling the returned handle is
    /// idempotent.
    fn watch_sessions(
        &self,
        on_event: Box<dyn Fn(DiscoveryEvent) + Send + Sync>,
    ) -> Result<WatchHandle, AdapterError>;

    /// Attach to a session already known to this adapter. Fails with
    /// `AdapterError::NotFound` if `id` is unknown.
    async fn attach_to_session(&self, id: &str) -> Result<Arc<dyn Session>, AdapterError>;

    /// Spawn a brand new session.
    async fn start_session(
        &self,
        params: StartSessionParams,
    ) -> Result<Arc<dyn Session>, AdapterError>;
}
