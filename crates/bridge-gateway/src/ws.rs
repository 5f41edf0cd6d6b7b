// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The `/ws` handler: auth handshake, subscribe/unsubscribe with history
//! replay, command demux, and server-push liveness ping. One task per
//! connection, following the teacher's `tokio::select!` shape over
//! `socket.recv()` and a `broadcast::Receiver` — the difference from the
//! teacher being that here authentication is the *first message after
//! upgrade* rather than an HTTP-layer bearer check before it, since that's
//! what this wire protocol specifies.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use bridge_protocol::Event;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout};
use tracing::{info, warn};

use crate::server::AppState;
use crate::wire::{ClientMessage, ServerMessage};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const CLOSE_AUTH_TIMEOUT: u16 = 4001;
const CLOSE_AUTH_FAILED: u16 = 4002;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Increments the shared connected-client count on construction and
/// decrements it on drop, so the approval manager's fall-through check
/// stays correct regardless of which branch ends the connection.
struct ClientCountGuard(Arc<std::sync::atomic::AtomicUsize>);

impl ClientCountGuard {
    fn enter(counter: Arc<std::sync::atomic::AtomicUsize>) -> Self {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ClientCountGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState, peer: SocketAddr) {
    let user_id = match authenticate(&mut socket, &state, peer).await {
        Some(id) => id,
        None => return,
    };
    info!(%peer, user = %user_id, "client authenticated");
    let _client_count_guard = ClientCountGuard::enter(state.connected_clients.clone());

    let capabilities = state.orchestrator.capabilities_list();
    send(&mut socket, &ServerMessage::AuthSuccess { capabilities }).await;
    send(&mut socket, &ServerMessage::SessionsList { sessions: state.orchestrator.sessions_snapshot() }).await;

    let mut events = state.orchestrator.subscribe_events();
    let mut sessions_list = state.orchestrator.subscribe_sessions_list();
    let mut subscriptions: Option<HashSet<String>> = Some(HashSet::new());
    let mut ping_timer = interval(PING_INTERVAL);
    ping_timer.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_message(&mut socket, &state, &text, &mut subscriptions, peer).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%peer, "WebSocket recv error: {e}");
                        break;
                    }
                }
            }
            result = events.recv() => {
                match result {
                    Ok(event) => {
                        if subscription_matches(&subscriptions, &event) {
                            send(&mut socket, &ServerMessage::AcpEvent { event }).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(%peer, "client lagged by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            result = sessions_list.recv() => {
                match result {
                    Ok(sessions) => send(&mut socket, &ServerMessage::SessionsList { sessions }).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_timer.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%peer, "client disconnected");
}

/// Drives the unauthenticated state: waits up to 10 s for a valid
/// `{"type":"auth",...}` message. Returns the authenticated user id, or
/// `None` after closing the socket with the appropriate code.
async fn authenticate(socket: &mut WebSocket, state: &AppState, peer: SocketAddr) -> Option<String> {
    let deadline = timeout(AUTH_TIMEOUT, async {
        loop {
            match socket.recv().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Auth { token }) => return Some(token),
                        Ok(_) => {
                            send(
                                socket,
                                &ServerMessage::Error {
                                    code: "NOT_AUTHENTICATED".into(),
                                    message: "send auth before any other message".into(),
                                },
                            )
                            .await;
                        }
                        Err(_) => {
                            send(
                                socket,
                                &ServerMessage::Error {
                                    code: "INVALID_MESSAGE".into(),
                                    message: "malformed JSON".into(),
                                },
                            )
                            .await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return None,
                _ => {}
            }
        }
    })
    .await;

    let token = match deadline {
        Ok(Some(token)) => token,
        Ok(None) => return None,
        Err(_) => {
            warn!(%peer, "auth timeout");
            close(socket, CLOSE_AUTH_TIMEOUT, "auth timeout").await;
            return None;
        }
    };

    match state.authenticator.authenticate(&token) {
        Some(user_id) => Some(user_id),
        None => {
            send(socket, &ServerMessage::AuthError { message: "invalid token".into() }).await;
            close(socket, CLOSE_AUTH_FAILED, "auth failed").await;
            None
        }
    }
}

/// Returns `false` when the connection should close.
async fn handle_client_message(
    socket: &mut WebSocket,
    state: &AppState,
    text: &str,
    subscriptions: &mut Option<HashSet<String>>,
    peer: SocketAddr,
) -> bool {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(_) => {
            send(
                socket,
                &ServerMessage::Error { code: "INVALID_MESSAGE".into(), message: "malformed JSON".into() },
            )
            .await;
            return true;
        }
    };

    match msg {
        ClientMessage::Auth { .. } => {}
        ClientMessage::Ping => send(socket, &ServerMessage::Pong).await,
        ClientMessage::Subscribe { session_ids } => {
            subscribe(socket, state, subscriptions, session_ids).await;
        }
        ClientMessage::Unsubscribe { session_ids } => {
            if let Some(set) = subscriptions {
                for id in session_ids {
                    set.remove(&id);
                }
            }
        }
        ClientMessage::Command { session_id, command } => {
            if state.approvals.handle_command(&command).await {
                return true;
            }
            if let Err(e) = state.orchestrator.execute_command(&session_id, command).await {
                warn!(%peer, session = %session_id, error = %e, "command execution failed");
            }
        }
        ClientMessage::StartSession { agent, project_path, prompt } => {
            if let Err(e) = state.orchestrator.start_session(&agent, project_path, prompt).await {
                warn!(%peer, agent = %agent, error = %e, "start_session failed");
            }
        }
        ClientMessage::TerminateSession { session_id } => {
            if let Err(e) = state.orchestrator.terminate_session(&session_id).await {
                warn!(%peer, session = %session_id, error = %e, "terminate_session failed");
            }
        }
    }
    true
}

/// `subscriptions == None` means "all sessions"; `Some(set)` is an explicit
/// allow-list, unioned with every newly-subscribed id.
async fn subscribe(
    socket: &mut WebSocket,
    state: &AppState,
    subscriptions: &mut Option<HashSet<String>>,
    session_ids: Option<Vec<String>>,
) {
    let Some(ids) = session_ids else {
        *subscriptions = None;
        return;
    };

    let newly_subscribed: Vec<String> = {
        let set = subscriptions.get_or_insert_with(HashSet::new);
        ids.into_iter().filter(|id| set.insert(id.clone())).collect()
    };

    // History replay must not block live event delivery to other
    // subscriptions, but per-session ordering must hold — a sequential
    // per-id replay on this connection's own task satisfies both, since
    // nothing else on this task emits events concurrently.
    for id in newly_subscribed {
        match state.orchestrator.history(&id).await {
            Ok(events) => {
                for event in events {
                    send(socket, &ServerMessage::AcpEvent { event }).await;
                }
            }
            Err(e) => warn!(session = %id, error = %e, "history replay failed"),
        }
        send(socket, &ServerMessage::HistoryComplete { session_id: id }).await;
    }
}

fn subscription_matches(subscriptions: &Option<HashSet<String>>, event: &Event) -> bool {
    match subscriptions {
        None => true,
        Some(set) => set.contains(&event.session_id),
    }
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(msg) {
        let _ = socket.send(Message::Text(text)).await;
    }
}

async fn close(socket: &mut WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame { code, reason: reason.to_string().into() })))
        .await;
}
