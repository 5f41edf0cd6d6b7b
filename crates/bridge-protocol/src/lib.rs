// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Canonical event/command wire protocol shared by every adapter, the
//! approval manager, and the WebSocket multiplexer.
//!
//! This crate is pure data plus a handful of pure functions. It has no
//! knowledge of sockets, processes, or the filesystem — that lives in
//! `bridge-adapter`, `bridge-claude-adapter`, `bridge-approval`, and
//! `bridge-gateway`.

pub mod capability;
pub mod command;
pub mod event;
pub mod risk;
pub mod session;

pub use capability::{AgentIdentity, Capabilities, FeatureBitmap, IntegrationMethod};
pub use command::Command;
pub use event::{ContentBlock, Event, EventFactory, EventKind, Role};
pub use risk::{assess_risk, categorize_tool, describe_tool_call, RiskLevel, ToolCategory};
pub use session::{PermissionMode, SessionDescriptor, SessionStatus};
