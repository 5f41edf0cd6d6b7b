// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The hook HTTP surface: `POST /api/hooks/approve` and `GET
//! /api/hooks/health`, merged into the same listener as `/ws`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bridge_approval::HookInput;
use serde::Serialize;
use tracing::warn;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    ok: bool,
    pending: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { ok: true, pending: state.approvals.pending_count().await })
}

/// Body size is bounded upstream by `RequestBodyLimitLayer` (see
/// `server.rs`), which returns 413 itself before this handler ever runs;
/// a rejection here means malformed JSON or a missing required field.
pub async fn approve(
    State(state): State<AppState>,
    body: Result<Json<HookInput>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let input = match body {
        Ok(Json(input)) => input,
        Err(e) => {
            warn!(error = %e, "hook request rejected");
            return (StatusCode::BAD_REQUEST, e.body_text()).into_response();
        }
    };

    let decision = state.approvals.request_approval(input).await;
    Json(bridge_approval::HookResponse::from(decision)).into_response()
}
