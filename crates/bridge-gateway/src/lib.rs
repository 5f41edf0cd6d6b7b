// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Axum WebSocket multiplexer, hook HTTP surface, and the session
//! orchestrator that glues every configured adapter to both.

pub mod auth;
pub mod config;
mod error;
mod hooks;
mod orchestrator;
mod server;
mod wire;
mod ws;

pub use error::GatewayError;
pub use orchestrator::SessionOrchestrator;
pub use server::{build_router, build_state, serve, AppState};
