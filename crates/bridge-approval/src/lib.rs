// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Human-in-the-loop tool approval. One [`ApprovalManager`] arbitrates
//! every pending request across every session: permission-mode bypass,
//! below-threshold auto-approve, fall-through when no client is attached,
//! and routing to clients with a timeout.

mod error;
mod hook;
mod manager;

pub use error::ApprovalError;
pub use hook::{derive_preview, HookDecision, HookInput, HookResponse, ResolvedBy};
pub use manager::ApprovalManager;
