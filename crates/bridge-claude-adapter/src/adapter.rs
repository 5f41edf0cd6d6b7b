// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Top-level [`Adapter`] implementation for the Claude Code CLI: wires
//! discovery, filesystem watching, and session construction together
//! behind the one entry point the orchestrator holds per agent family.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_adapter::{
    Adapter, AdapterError, DataPaths, DiscoveredSession, DiscoveryEvent, Session,
    StartSessionParams, WatchHandle,
};
use bridge_protocol::{AgentIdentity, Capabilities, FeatureBitmap, IntegrationMethod};
use tokio::process::Command;
use uuid::Uuid;

use crate::discovery;
use crate::path::encode_project_path;
use crate::process::DEFAULT_CLI_BINARY;
use crate::session::ClaudeSession;
use crate::watcher;

/// Discovers and drives Claude Code CLI sessions via its on-disk JSONL
/// logs and `--print --output-format stream-json` subprocess mode.
pub struct ClaudeAdapter {
    cli_binary: String,
    projects_root: PathBuf,
}

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self { cli_binary: DEFAULT_CLI_BINARY.to_string(), projects_root: discovery::default_projects_root() }
    }

    /// Override the CLI binary and/or session-log root, mainly for tests.
    pub fn with_paths(cli_binary: String, projects_root: PathBuf) -> Self {
        Self { cli_binary, projects_root }
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for ClaudeAdapter {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            protocol_version: "1".to_string(),
            agent: AgentIdentity {
                name: "claude-code".to_string(),
                display_name: "Claude Code".to_string(),
                icon: None,
                version: None,
                integration_method: IntegrationMethod::FileWatch,
            },
            features: FeatureBitmap {
                streaming: true,
                approval: true,
                session_control: true,
                planning: false,
                resources: true,
                file_operations: true,
                git: false,
                web: false,
                multimodal: false,
                interaction: false,
                thinking: true,
                custom_event_namespaces: vec!["claude:compaction".to_string()],
            },
        }
    }

    async fn is_installed(&self) -> bool {
        Command::new(&self.cli_binary)
            .arg("--version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    async fn version(&self) -> Option<String> {
        let output = Command::new(&self.cli_binary).arg("--version").output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Some(text.trim().to_string())
    }

    fn data_paths(&self) -> DataPaths {
        DataPaths {
            sessions: Some(self.projects_root.clone()),
            config: dirs::home_dir().map(|h| h.join(".claude")),
            logs: Some(self.projects_root.clone()),
        }
    }

    async fn discover_sessions(&self) -> Result<Vec<DiscoveredSession>, AdapterError> {
        let root = self.projects_root.clone();
        tokio::task::spawn_blocking(move || discovery::discover_sessions(&root))
            .await
            .map_err(|e| AdapterError::Io(std::io::Error::other(e)))
    }

    fn watch_sessions(
        &self,
        on_event: Box<dyn Fn(DiscoveryEvent) + Send + Sync>,
    ) -> Result<WatchHandle, AdapterError> {
        watcher::watch_sessions(&self.projects_root, on_event)
    }

    async fn attach_to_session(&self, id: &str) -> Result<Arc<dyn Session>, AdapterError> {
        let sessions = self.discover_sessions().await?;
        let Some(found) = sessions.iter().find(|s| s.id == id) else {
            return Err(AdapterError::NotFound(id.to_string()));
        };
        let project_dir = self.projects_root.join(encode_project_path(&found.project_path));
        let log_path = project_dir.join(format!("{id}.jsonl"));
        let session = ClaudeSession::attach(
            id.to_string(),
            log_path,
            self.cli_binary.clone(),
            self.capabilities(),
        );
        Ok(Arc::new(session))
    }

    async fn start_session(
        &self,
        params: StartSessionParams,
    ) -> Result<Arc<dyn Session>, AdapterError> {
        let id = Uuid::new_v4().to_string();
        let session = ClaudeSession::start(
            id,
            params.project_path,
            params.prompt,
            params.model,
            self.cli_binary.clone(),
            self.capabilities(),
        );
        Ok(Arc::new(session))
    }
}
