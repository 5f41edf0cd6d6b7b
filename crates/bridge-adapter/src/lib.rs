// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The interface every agent integration implements: detection, session
//! discovery and watching, attach/start, event subscription, command
//! execution, and history replay.
//!
//! This crate defines the contract only. `bridge-claude-adapter` provides
//! the one concrete implementation specified here; other agent families
//! can implement [`Adapter`] and [`Session`] without touching the
//! multiplexer or orchestrator.

mod adapter;
mod error;
mod session;
mod types;
mod watch;

pub use adapter::Adapter;
pub use error::AdapterError;
pub use session::{Session, EVENT_CHANNEL_CAPACITY};
pub use types::{DataPaths, DiscoveredSession, StartSessionParams};
pub use watch::{DiscoveryEvent, WatchHandle};
