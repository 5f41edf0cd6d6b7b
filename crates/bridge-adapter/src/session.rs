// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The `Session` contract: a single live conversation with one agent in one
//! project directory, owned exclusively by the adapter that created it.

use async_trait::async_trait;
use bridge_protocol::{Capabilities, Command, Event};
use tokio::sync::broadcast;

use crate::error::AdapterError;

/// Capacity of a session's event broadcast channel. Generous relative to
/// the 5000-event history buffer — a lagging subscriber drops only if it
/// falls behind an entire history buffer's worth of events between polls.
pub const EVENT_CHANNEL_CAPACITY: usize = 4096;

#[async_trait]
pub trait Session: Send + Sync {
    /// Stable identifier, unique within the owning adapter.
    fn id(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Subscribe to this session's event stream. Every event emitted after
    /// the call returns is delivered in `seq` order. Dropping the receiver
    /// is the unsubscribe — idempotent and O(1), matching a broadcast
    /// channel's own semantics.
    fn subscribe(&self) -> broadcast::Receiver<Event>;

    /// Apply a command to this session (write to subprocess stdin, signal
    /// cancellation, resolve a pending question, ...).
    async fn execute(&self, command: Command) -> Result<(), AdapterError>;

    /// Snapshot of every event emitted so far, in `seq` order. Waits for
    /// any in-flight initial read from disk to complete before returning.
    async fn history(&self) -> Vec<Event>;

    /// Hint to re-read the underlying source. Adapters that have no notion
    /// of an external source (pure subprocess sessions) may leave this at
    /// its no-op default.
    async fn refresh(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Release watchers and subscribers. Does not signal the underlying
    /// agent process — use `execute(Command::Terminate { .. })` for that.
    async fn detach(&self);
}
