// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Capability descriptor: what an adapter identifies as and what it can do.
//! Sent once on `auth_success` and consumed by clients to decide which UI
//! affordances to show (e.g. hide the "pause" button if `session_control`
//! is false).

use serde::{Deserialize, Serialize};

/// How an adapter talks to its underlying agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    Sdk,
    Http,
    Pty,
    #[serde(rename = "file-watch")]
    FileWatch,
    Mcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    pub name: String,
    pub display_name: String,
    pub icon: Option<String>,
    pub version: Option<String>,
    pub integration_method: IntegrationMethod,
}

/// Feature bitmap. Every field defaults to `false` so an adapter only has
/// to set the capabilities it actually has.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureBitmap {
    pub streaming: bool,
    pub approval: bool,
    pub session_control: bool,
    pub planning: bool,
    pub resources: bool,
    pub file_operations: bool,
    pub git: bool,
    pub web: bool,
    pub multimodal: bool,
    pub interaction: bool,
    pub thinking: bool,
    /// Adapter-specific event-type prefixes carried as `custom` events,
    /// e.g. `["claude:compaction"]`.
    pub custom_event_namespaces: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub protocol_version: String,
    pub agent: AgentIdentity,
    pub features: FeatureBitmap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integration_method_file_watch_renders_hyphenated() {
        let s = serde_json::to_string(&IntegrationMethod::FileWatch).unwrap();
        assert_eq!(s, "\"file-watch\"");
    }

    #[test]
    fn feature_bitmap_default_is_all_false() {
        let f = FeatureBitmap::default();
        assert!(!f.streaming && !f.approval && !f.thinking);
        assert!(f.custom_event_namespaces.is_empty());
    }

    #[test]
    fn capabilities_round_trip() {
        let caps = Capabilities {
            protocol_version: "1".into(),
            agent: AgentIdentity {
                name: "claude-code".into(),
                display_name: "Claude Code".into(),
                icon: None,
                version: Some("1.2.3".into()),
                integration_method: IntegrationMethod::FileWatch,
            },
            features: FeatureBitmap {
                streaming: true,
                approval: true,
                ..Default::default()
            },
        };
        let json = serde_json::to_string(&caps).unwrap();
        let back: Capabilities = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent.name, "claude-code");
        assert!(back.features.streaming);
        assert!(!back.features.git);
    }
}
