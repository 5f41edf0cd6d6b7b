// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! `ApprovalManager` — one hub arbitrating every tool-call approval across
//! every session, the same "single owner of pending state, resolve via
//! oneshot" shape as the control service's `pending_approvals` map, just
//! promoted to a top-level service since here one manager must serve every
//! session rather than one per conversation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_protocol::risk::{assess_risk, describe_tool_call, RiskLevel};
use bridge_protocol::session::PermissionMode;
use bridge_protocol::{Command, Event, EventFactory, EventKind};
use chrono::Utc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApprovalError;
use crate::hook::{derive_preview, HookDecision, HookInput, ResolvedBy};

const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(290);

struct Pending {
    session_id: String,
    resolver: oneshot::Sender<HookDecision>,
    timeout_handle: tokio::task::JoinHandle<()>,
}

/// Evaluates permission-mode bypass and the risk threshold, routes what's
/// left to connected clients, and resolves pending requests either by
/// explicit command or by timeout. Cheap to clone — every clone shares the
/// same pending-request table and broadcast sender.
#[derive(Clone)]
pub struct ApprovalManager {
    inner: Arc<Inner>,
}

struct Inner {
    pending: Mutex<HashMap<String, Pending>>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    factory: Arc<EventFactory>,
    threshold: RiskLevel,
    require_client: bool,
    timeout: Duration,
    client_count: Box<dyn Fn() -> usize + Send + Sync>,
}

impl ApprovalManager {
    pub fn new(
        event_tx: tokio::sync::broadcast::Sender<Event>,
        factory: Arc<EventFactory>,
        threshold: RiskLevel,
        require_client: bool,
        client_count: impl Fn() -> usize + Send + Sync + 'static,
    ) -> Self {
        Self::with_timeout(
            event_tx,
            factory,
            threshold,
            require_client,
            DEFAULT_APPROVAL_TIMEOUT,
            client_count,
        )
    }

    pub fn with_timeout(
        event_tx: tokio::sync::broadcast::Sender<Event>,
        factory: Arc<EventFactory>,
        threshold: RiskLevel,
        require_client: bool,
        timeout: Duration,
        client_count: impl Fn() -> usize + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                event_tx,
                factory,
                threshold,
                require_client,
                timeout,
                client_count: Box::new(client_count),
            }),
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    /// The decision procedure in `spec.md` §4.4, evaluated in order.
    pub async fn request_approval(&self, input: HookInput) -> HookDecision {
        if let Some(decision) = bypass_decision(input.permission_mode, &input.tool_name) {
            debug!(tool = %input.tool_name, "permission-mode bypass");
            return decision;
        }

        let risk = assess_risk(&input.tool_name, &input.tool_input);
        if risk < self.inner.threshold {
            debug!(tool = %input.tool_name, ?risk, "below-threshold auto-approve");
            return HookDecision::Allow;
        }

        if (self.inner.client_count)() == 0 && self.inner.require_client {
            debug!("no clients attached, falling through to local prompt");
            return HookDecision::Ask;
        }

        self.route_to_clients(input, risk).await
    }

    async fn route_to_clients(&self, input: HookInput, risk: RiskLevel) -> HookDecision {
        let request_id = Uuid::new_v4().to_string();
        let preview = derive_preview(&input.tool_name, &input.tool_input, input.cwd.as_deref());
        let description = describe_tool_call(&input.tool_name, &input.tool_input);
        let expires_at = Utc::now() + chrono::Duration::from_std(self.inner.timeout).unwrap();

        let (resolver, waiter) = oneshot::channel();
        let timeout_handle = self.spawn_timeout(request_id.clone());

        {
            let mut pending = self.inner.pending.lock().await;
            pending.insert(
                request_id.clone(),
                Pending { session_id: input.session_id.clone(), resolver, timeout_handle },
            );
        }

        let event = self.inner.factory.create_event(
            &input.session_id,
            EventKind::ApprovalRequested {
                request_id: request_id.clone(),
                tool_call_id: input.tool_use_id.clone(),
                tool_name: input.tool_name.clone(),
                tool_input: input.tool_input.clone(),
                risk_level: risk,
                description,
                expires_at: expires_at.to_rfc3339(),
                preview,
            },
        );
        let _ = self.inner.event_tx.send(event);

        waiter.await.unwrap_or(HookDecision::Ask)
    }

    fn spawn_timeout(&self, request_id: String) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let timeout = self.inner.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = manager.resolve(&request_id, HookDecision::Ask, ResolvedBy::Timeout, None).await;
        })
    }

    /// Atomic look-up + delete + complete-waiter + stop-timer. Returns
    /// `false` without side effects if `request_id` is unknown or was
    /// already resolved — callers (command handling, the timeout racing
    /// with a user decision) rely on only one of them winning.
    pub async fn resolve(
        &self,
        request_id: &str,
        decision: HookDecision,
        resolved_by: ResolvedBy,
        reason: Option<String>,
    ) -> Result<(), ApprovalError> {
        let pending = {
            let mut table = self.inner.pending.lock().await;
            table.remove(request_id)
        };
        let Some(pending) = pending else {
            return Err(ApprovalError::NotFound(request_id.to_string()));
        };
        pending.timeout_handle.abort();

        let event = self.inner.factory.create_event(
            &pending.session_id,
            EventKind::ApprovalResolved {
                request_id: request_id.to_string(),
                approved: decision.approved(),
                resolved_by: resolved_by.as_str().to_string(),
                reason,
            },
        );
        let _ = self.inner.event_tx.send(event);

        if pending.resolver.send(decision).is_err() {
            warn!(%request_id, "approval waiter already gone");
        }
        Ok(())
    }

    /// Maps `approve_tool_call`/`deny_tool_call` to [`Self::resolve`].
    /// Returns `true` iff this manager recognised and applied the command,
    /// so the caller knows not to route it onward.
    pub async fn handle_command(&self, cmd: &Command) -> bool {
        match cmd {
            Command::ApproveToolCall { request_id, .. } => {
                let _ = self.resolve(request_id, HookDecision::Allow, ResolvedBy::User, None).await;
                true
            }
            Command::DenyToolCall { request_id, reason, .. } => {
                let _ = self
                    .resolve(request_id, HookDecision::Deny, ResolvedBy::User, reason.clone())
                    .await;
                true
            }
            _ => false,
        }
    }

    /// Resolve every pending record with `ask` so no agent is left blocked
    /// on daemon shutdown.
    pub async fn cleanup(&self) {
        let ids: Vec<String> = self.inner.pending.lock().await.keys().cloned().collect();
        for id in ids {
            let _ = self.resolve(&id, HookDecision::Ask, ResolvedBy::Timeout, None).await;
        }
    }
}

fn bypass_decision(mode: Option<PermissionMode>, tool_name: &str) -> Option<HookDecision> {
    match mode? {
        PermissionMode::BypassPermissions => Some(HookDecision::Allow),
        PermissionMode::Plan if tool_name == "Write" => Some(HookDecision::Allow),
        PermissionMode::AcceptEdits
            if matches!(tool_name, "Write" | "Edit" | "NotebookEdit") =>
        {
            Some(HookDecision::Allow)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hook_input(tool_name: &str, input: serde_json::Value, mode: Option<PermissionMode>) -> HookInput {
        HookInput {
            session_id: "s1".to_string(),
            tool_name: tool_name.to_string(),
            tool_use_id: "tu1".to_string(),
            tool_input: input,
            cwd: None,
            permission_mode: mode,
        }
    }

    fn manager_with(threshold: RiskLevel, require_client: bool, clients: usize) -> ApprovalManager {
        let (tx, _) = tokio::sync::broadcast::channel(64);
        ApprovalManager::new(tx, Arc::new(EventFactory::new()), threshold, require_client, move || clients)
    }

    #[tokio::test]
    async fn bypass_permissions_allows_without_pending_record() {
        let manager = manager_with(RiskLevel::Low, true, 1);
        let input = hook_input(
            "Bash",
            json!({"command": "rm -rf foo"}),
            Some(PermissionMode::BypassPermissions),
        );
        let decision = manager.request_approval(input).await;
        assert_eq!(decision, HookDecision::Allow);
        assert_eq!(manager.pending_count().await, 0);
    }

    #[tokio::test]
    async fn plan_mode_allows_write_only() {
        let manager = manager_with(RiskLevel::Low, false, 1);
        let write = hook_input("Write", json!({"file_path": "/tmp/plan.md"}), Some(PermissionMode::Plan));
        assert_eq!(manager.request_approval(write).await, HookDecision::Allow);
    }

    #[tokio::test]
    async fn below_threshold_auto_approves() {
        let manager = manager_with(RiskLevel::High, true, 1);
        let input = hook_input("Write", json!({"file_path": "/tmp/x"}), None);
        assert_eq!(manager.request_approval(input).await, HookDecision::Allow);
        assert_eq!(manager.pending_count().await, 0);
    }

    #[tokio::test]
    async fn falls_through_to_ask_with_no_clients() {
        let manager = manager_with(RiskLevel::Low, true, 0);
        let input = hook_input("Write", json!({"file_path": "/tmp/x"}), None);
        assert_eq!(manager.request_approval(input).await, HookDecision::Ask);
        assert_eq!(manager.pending_count().await, 0);
    }

    #[tokio::test]
    async fn routed_request_resolves_on_approve_command() {
        let manager = manager_with(RiskLevel::Low, true, 1);
        let input = hook_input("Write", json!({"file_path": "/tmp/foo.ts"}), None);

        let manager_clone = manager.clone();
        let request = tokio::spawn(async move { manager_clone.request_approval(input).await });

        let mut request_id = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let ids: Vec<String> = manager.inner.pending.lock().await.keys().cloned().collect();
            if let Some(id) = ids.into_iter().next() {
                request_id = Some(id);
                break;
            }
        }
        let request_id = request_id.expect("pending record never appeared");

        manager
            .handle_command(&Command::ApproveToolCall {
                request_id,
                tool_call_id: "tu1".to_string(),
            })
            .await;

        let decision = tokio::time::timeout(Duration::from_secs(1), request).await.unwrap().unwrap();
        assert_eq!(decision, HookDecision::Allow);
    }

    #[tokio::test]
    async fn cleanup_resolves_all_pending_with_ask() {
        let manager = manager_with(RiskLevel::Low, true, 1);
        let input = hook_input("Write", json!({"file_path": "/tmp/foo.ts"}), None);

        let manager_clone = manager.clone();
        let request = tokio::spawn(async move { manager_clone.request_approval(input).await });

        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if manager.pending_count().await > 0 {
                break;
            }
        }

        manager.cleanup().await;
        let decision = tokio::time::timeout(Duration::from_secs(1), request).await.unwrap().unwrap();
        assert_eq!(decision, HookDecision::Ask);
        assert_eq!(manager.pending_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_resolve_returns_not_found() {
        let manager = manager_with(RiskLevel::Low, true, 1);
        let input = hook_input("Write", json!({"file_path": "/tmp/foo.ts"}), None);

        let manager_clone = manager.clone();
        tokio::spawn(async move { manager_clone.request_approval(input).await });

        let mut request_id = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let ids: Vec<String> = manager.inner.pending.lock().await.keys().cloned().collect();
            if let Some(id) = ids.into_iter().next() {
                request_id = Some(id);
                break;
            }
        }
        let request_id = request_id.unwrap();

        manager.resolve(&request_id, HookDecision::Allow, ResolvedBy::User, None).await.unwrap();
        let second = manager.resolve(&request_id, HookDecision::Deny, ResolvedBy::User, None).await;
        assert!(matches!(second, Err(ApprovalError::NotFound(_))));
    }
}
