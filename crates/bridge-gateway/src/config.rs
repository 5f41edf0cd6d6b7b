// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Daemon configuration loaded from YAML.
//!
//! Layers are **deep-merged** — override only the fields you care about.
//!
//! Search order (later overrides earlier):
//! 1. `/etc/agentbridged/config.yaml`
//! 2. `~/.config/agentbridged/config.yaml`
//! 3. `.agentbridged/config.yaml` (workspace-local)
//! 4. Path given to [`load`] explicitly.
//!
//! `load(None)` with no file on disk returns fully populated, production-safe
//! defaults: loopback bind, medium approval threshold, a client required
//! before a risky tool call is routed.

use std::path::{Path, PathBuf};

use anyhow::Context;
use bridge_protocol::RiskLevel;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}
fn default_threshold() -> RiskLevel {
    RiskLevel::Medium
}
fn default_true() -> bool {
    true
}
fn default_approval_timeout_secs() -> u64 {
    290
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// `host:port` the WS/HTTP listener binds to. Default: loopback only.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Minimum risk level that must be routed to a connected client rather
    /// than auto-approved.
    #[serde(default = "default_threshold")]
    pub approval_threshold: RiskLevel,

    /// Whether a tool call at or above the threshold falls through to
    /// `ask` when no client is connected, rather than blocking forever.
    #[serde(default = "default_true")]
    pub require_client: bool,

    /// Seconds before a routed approval resolves with `ask` on its own.
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,

    /// Root directory adapters should use for session logs. `None` means
    /// "use the adapter's own default" (e.g. `~/.claude/projects`).
    #[serde(default)]
    pub session_log_root: Option<PathBuf>,

    /// Path to the hashed bearer token file (see [`crate::auth`]). `None`
    /// means the default location under the user config directory.
    #[serde(default)]
    pub auth_token_file: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            approval_threshold: default_threshold(),
            require_client: default_true(),
            approval_timeout_secs: default_approval_timeout_secs(),
            session_log_root: None,
            auth_token_file: None,
        }
    }
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    paths.push(PathBuf::from("/etc/agentbridged/config.yaml"));
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/agentbridged/config.yaml"));
    }
    paths.push(PathBuf::from(".agentbridged/config.yaml"));
    paths
}

pub fn load(extra: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading gateway config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit gateway config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let config: GatewayConfig = if matches!(&merged, serde_yaml::Value::Mapping(m) if m.is_empty())
    {
        GatewayConfig::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    Ok(config)
}

fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry =
                    d.entry(k).or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind_is_loopback() {
        let c = GatewayConfig::default();
        assert!(c.bind.starts_with("127.0.0.1"));
    }

    #[test]
    fn default_threshold_is_medium() {
        assert_eq!(GatewayConfig::default().approval_threshold, RiskLevel::Medium);
    }

    #[test]
    fn default_require_client_is_true() {
        assert!(GatewayConfig::default().require_client);
    }

    #[test]
    fn load_returns_defaults_when_no_files_exist() {
        let c = load(None).unwrap();
        assert_eq!(c.bind, default_bind());
    }

    #[test]
    fn config_yaml_round_trip() {
        let c = GatewayConfig::default();
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: GatewayConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.bind, c.bind);
        assert_eq!(back.approval_threshold, c.approval_threshold);
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = "approval_threshold: high\n";
        let c: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.approval_threshold, RiskLevel::High);
        assert!(c.require_client, "unnamed fields keep their defaults");
    }
}
