// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The WebSocket envelope shapes, distinct from the `Event`/`Command` types
//! `bridge-protocol` defines — these carry the handshake and subscription
//! messages that wrap an `Event`/`Command` rather than the payload itself.

use bridge_protocol::{Capabilities, Command, Event, SessionDescriptor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    Ping,
    Subscribe {
        #[serde(default)]
        session_ids: Option<Vec<String>>,
    },
    Unsubscribe {
        session_ids: Vec<String>,
    },
    Command {
        session_id: String,
        command: Command,
    },
    StartSession {
        agent: String,
        project_path: String,
        prompt: String,
    },
    TerminateSession {
        session_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    AuthSuccess { capabilities: Vec<Capabilities> },
    AuthError { message: String },
    SessionsList { sessions: Vec<SessionDescriptor> },
    AcpEvent { event: Event },
    HistoryComplete { session_id: String },
    Error { code: String, message: String },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_message_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"auth","token":"tok"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Auth { token } if token == "tok"));
    }

    #[test]
    fn subscribe_without_session_ids_is_none() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"subscribe"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { session_ids: None }));
    }

    #[test]
    fn subscribe_with_session_ids_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","sessionIds":["s1","s2"]}"#).unwrap();
        match msg {
            ClientMessage::Subscribe { session_ids: Some(ids) } => {
                assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()])
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn command_message_nests_acp_command() {
        let text = r#"{"type":"command","sessionId":"s1","command":{"command":"send_message","sessionId":"s1","text":"hi"}}"#;
        let msg: ClientMessage = serde_json::from_str(text).unwrap();
        match msg {
            ClientMessage::Command { session_id, command } => {
                assert_eq!(session_id, "s1");
                assert_eq!(command.session_id(), Some("s1"));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn history_complete_serializes_camel_case() {
        let msg = ServerMessage::HistoryComplete { session_id: "s1".into() };
        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(text, r#"{"type":"history_complete","sessionId":"s1"}"#);
    }

    #[test]
    fn pong_has_no_fields() {
        let text = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(text, r#"{"type":"pong"}"#);
    }
}
