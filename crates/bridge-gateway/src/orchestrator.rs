// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Glues every configured [`Adapter`] to the multiplexer: seeds the session
//! catalogue at startup, keeps it live via `watchSessions`, lazily attaches
//! on first subscribe, and forwards each session's own event stream into one
//! shared broadcast channel — the same "single task owns the live map,
//! everything else reads a snapshot or a channel" shape as the control
//! service this workspace started from.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_adapter::{Adapter, AdapterError, DiscoveredSession, DiscoveryEvent, Session, StartSessionParams, WatchHandle};
use bridge_protocol::{Capabilities, Command, Event, EventKind, PermissionMode, SessionDescriptor, SessionStatus};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    adapters: HashMap<String, Arc<dyn Adapter>>,
    sessions: DashMap<String, Arc<dyn Session>>,
    catalogue: DashMap<String, SessionDescriptor>,
    event_tx: broadcast::Sender<Event>,
    sessions_list_tx: broadcast::Sender<Vec<SessionDescriptor>>,
    watch_handles: Mutex<Vec<WatchHandle>>,
}

impl SessionOrchestrator {
    pub fn new(adapters: Vec<Arc<dyn Adapter>>, event_tx: broadcast::Sender<Event>) -> Self {
        let adapters =
            adapters.into_iter().map(|a| (a.capabilities().agent.name.clone(), a)).collect();
        let (sessions_list_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                adapters,
                sessions: DashMap::new(),
                catalogue: DashMap::new(),
                event_tx,
                sessions_list_tx,
                watch_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn capabilities_list(&self) -> Vec<Capabilities> {
        self.inner.adapters.values().map(|a| a.capabilities()).collect()
    }

    pub fn sessions_snapshot(&self) -> Vec<SessionDescriptor> {
        self.inner.catalogue.iter().map(|e| e.value().clone()).collect()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.inner.event_tx.subscribe()
    }

    pub fn subscribe_sessions_list(&self) -> broadcast::Receiver<Vec<SessionDescriptor>> {
        self.inner.sessions_list_tx.subscribe()
    }

    /// Seed the catalogue and start watching every adapter. Call once at
    /// startup, after construction.
    pub async fn start(&self) -> Result<(), AdapterError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, DiscoveryEvent)>();

        for (name, adapter) in &self.inner.adapters {
            match adapter.discover_sessions().await {
                Ok(discovered) => {
                    for d in &discovered {
                        self.inner.catalogue.insert(d.id.clone(), descriptor_from_discovered(name, d));
                    }
                    info!(adapter = %name, count = discovered.len(), "seeded session catalogue");
                }
                Err(e) => warn!(adapter = %name, error = %e, "initial session discovery failed"),
            }

            let name_for_cb = name.clone();
            let tx = tx.clone();
            let handle = adapter.watch_sessions(Box::new(move |ev| {
                let _ = tx.send((name_for_cb.clone(), ev));
            }))?;
            self.inner.watch_handles.lock().await.push(handle);
        }

        self.broadcast_sessions_list();

        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some((adapter_name, ev)) = rx.recv().await {
                handle_discovery_event(&inner, &adapter_name, ev).await;
            }
        });

        Ok(())
    }

    fn broadcast_sessions_list(&self) {
        let _ = self.inner.sessions_list_tx.send(self.sessions_snapshot());
    }

    /// Return an already-attached session, or attach lazily from the
    /// catalogue. Idempotent per id.
    pub async fn get_or_attach(&self, id: &str) -> Result<Arc<dyn Session>, AdapterError> {
        if let Some(s) = self.inner.sessions.get(id) {
            return Ok(s.clone());
        }
        let adapter_name = self
            .inner
            .catalogue
            .get(id)
            .map(|d| d.adapter.clone())
            .ok_or_else(|| AdapterError::NotFound(id.to_string()))?;
        let adapter = self
            .inner
            .adapters
            .get(&adapter_name)
            .ok_or_else(|| AdapterError::NotFound(adapter_name.clone()))?;
        let session = adapter.attach_to_session(id).await?;
        self.spawn_forwarder(id, session.clone());
        self.inner.sessions.insert(id.to_string(), session.clone());
        Ok(session)
    }

    pub async fn history(&self, id: &str) -> Result<Vec<Event>, AdapterError> {
        let session = self.get_or_attach(id).await?;
        Ok(session.history().await)
    }

    pub async fn execute_command(&self, session_id: &str, command: Command) -> Result<(), AdapterError> {
        let session = self.get_or_attach(session_id).await?;
        session.execute(command).await
    }

    pub async fn start_session(
        &self,
        agent: &str,
        project_path: String,
        prompt: String,
    ) -> Result<String, AdapterError> {
        let adapter =
            self.inner.adapters.get(agent).ok_or_else(|| AdapterError::NotFound(agent.to_string()))?;
        let params = StartSessionParams {
            project_path: project_path.clone(),
            prompt,
            model: None,
            agent_options: None,
        };
        let session = adapter.start_session(params).await?;
        let id = session.id().to_string();

        let now = Utc::now().to_rfc3339();
        let descriptor = SessionDescriptor {
            id: id.clone(),
            adapter: agent.to_string(),
            project_path,
            display_name: None,
            status: SessionStatus::Starting,
            created_at: now.clone(),
            last_activity: now,
            first_user_message: None,
            last_assistant_message: None,
            model_id: None,
            permission_mode: PermissionMode::default(),
        };
        self.inner.catalogue.insert(id.clone(), descriptor);
        self.spawn_forwarder(&id, session.clone());
        self.inner.sessions.insert(id.clone(), session);
        self.broadcast_sessions_list();
        Ok(id)
    }

    pub async fn terminate_session(&self, id: &str) -> Result<(), AdapterError> {
        let session = self.get_or_attach(id).await?;
        session.execute(Command::Terminate { session_id: id.to_string() }).await
    }

    fn spawn_forwarder(&self, id: &str, session: Arc<dyn Session>) {
        let mut rx = session.subscribe();
        let inner = self.inner.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let EventKind::SessionStatusChanged { to, .. } = &event.kind {
                            if let Some(mut d) = inner.catalogue.get_mut(&id) {
                                d.status = *to;
                            }
                        }
                        let _ = inner.event_tx.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(session = %id, skipped = n, "orchestrator forwarder lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Resolve all pending approvals (handled by `bridge-approval`) and
    /// release every watcher and attached session.
    pub async fn shutdown(&self) {
        for handle in self.inner.watch_handles.lock().await.drain(..) {
            handle.cancel();
        }
        let sessions: Vec<Arc<dyn Session>> =
            self.inner.sessions.iter().map(|e| e.value().clone()).collect();
        for session in sessions {
            session.detach().await;
        }
    }
}

fn descriptor_from_discovered(adapter_name: &str, d: &DiscoveredSession) -> SessionDescriptor {
    let ts = chrono::DateTime::<Utc>::from(d.modified_at).to_rfc3339();
    SessionDescriptor {
        id: d.id.clone(),
        adapter: adapter_name.to_string(),
        project_path: d.project_path.clone(),
        display_name: d.session_name.clone(),
        status: SessionStatus::Idle,
        created_at: ts.clone(),
        last_activity: ts,
        first_user_message: None,
        last_assistant_message: d.last_message.clone(),
        model_id: d.model_id.clone(),
        permission_mode: PermissionMode::default(),
    }
}

async fn handle_discovery_event(inner: &Arc<Inner>, adapter_name: &str, ev: DiscoveryEvent) {
    match ev {
        DiscoveryEvent::SessionCreated(id) | DiscoveryEvent::SessionUpdated(id) => {
            if let Some(adapter) = inner.adapters.get(adapter_name) {
                match adapter.discover_sessions().await {
                    Ok(discovered) => {
                        if let Some(d) = discovered.iter().find(|d| d.id == id) {
                            let existing_status = inner.catalogue.get(&id).map(|e| e.status);
                            let mut descriptor = descriptor_from_discovered(adapter_name, d);
                            if let Some(status) = existing_status {
                                descriptor.status = status;
                            }
                            inner.catalogue.insert(id, descriptor);
                        }
                    }
                    Err(e) => warn!(adapter = %adapter_name, error = %e, "re-enumeration failed"),
                }
            }
        }
        DiscoveryEvent::SessionRemoved(id) => {
            inner.catalogue.remove(&id);
            if let Some((_, session)) = inner.sessions.remove(&id) {
                session.detach().await;
            }
        }
    }
    let _ = inner.sessions_list_tx.send(inner.catalogue.iter().map(|e| e.value().clone()).collect());
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_protocol::capability::{AgentIdentity, FeatureBitmap, IntegrationMethod};

    struct NoopSession {
        id: String,
        tx: broadcast::Sender<Event>,
    }

    #[async_trait]
    impl Session for NoopSession {
        fn id(&self) -> &str {
            &self.id
        }
        fn capabilities(&self) -> Capabilities {
            test_capabilities("noop")
        }
        fn subscribe(&self) -> broadcast::Receiver<Event> {
            self.tx.subscribe()
        }
        async fn execute(&self, _command: Command) -> Result<(), AdapterError> {
            Ok(())
        }
        async fn history(&self) -> Vec<Event> {
            Vec::new()
        }
        async fn detach(&self) {}
    }

    struct NoopAdapter {
        name: String,
        tx: broadcast::Sender<Event>,
    }

    #[async_trait]
    impl Adapter for NoopAdapter {
        fn capabilities(&self) -> Capabilities {
            test_capabilities(&self.name)
        }
        async fn is_installed(&self) -> bool {
            true
        }
        async fn version(&self) -> Option<String> {
            None
        }
        fn data_paths(&self) -> bridge_adapter::DataPaths {
            bridge_adapter::DataPaths::default()
        }
        async fn discover_sessions(&self) -> Result<Vec<DiscoveredSession>, AdapterError> {
            Ok(Vec::new())
        }
        fn watch_sessions(
            &self,
            _on_event: Box<dyn Fn(DiscoveryEvent) + Send + Sync>,
        ) -> Result<WatchHandle, AdapterError> {
            Ok(WatchHandle::new(|| {}))
        }
        async fn attach_to_session(&self, id: &str) -> Result<Arc<dyn Session>, AdapterError> {
            Ok(Arc::new(NoopSession { id: id.to_string(), tx: self.tx.clone() }))
        }
        async fn start_session(
            &self,
            params: StartSessionParams,
        ) -> Result<Arc<dyn Session>, AdapterError> {
            let _ = params;
            Ok(Arc::new(NoopSession { id: "new-session".to_string(), tx: self.tx.clone() }))
        }
    }

    fn test_capabilities(name: &str) -> Capabilities {
        Capabilities {
            protocol_version: "1".into(),
            agent: AgentIdentity {
                name: name.to_string(),
                display_name: name.to_string(),
                icon: None,
                version: None,
                integration_method: IntegrationMethod::FileWatch,
            },
            features: FeatureBitmap::default(),
        }
    }

    fn orchestrator_with_adapter() -> SessionOrchestrator {
        let (tx, _) = broadcast::channel(64);
        let adapter = Arc::new(NoopAdapter { name: "noop".into(), tx });
        let (event_tx, _) = broadcast::channel(64);
        SessionOrchestrator::new(vec![adapter], event_tx)
    }

    #[tokio::test]
    async fn start_seeds_empty_catalogue_without_error() {
        let orch = orchestrator_with_adapter();
        orch.start().await.unwrap();
        assert!(orch.sessions_snapshot().is_empty());
    }

    #[tokio::test]
    async fn start_session_adds_descriptor_and_broadcasts() {
        let orch = orchestrator_with_adapter();
        orch.start().await.unwrap();
        let mut list_rx = orch.subscribe_sessions_list();

        let id = orch.start_session("noop", "/tmp/proj".into(), "hello".into()).await.unwrap();
        assert_eq!(id, "new-session");

        let snapshot = orch.sessions_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "new-session");

        let broadcasted = tokio::time::timeout(std::time::Duration::from_secs(1), list_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(broadcasted.len(), 1);
    }

    #[tokio::test]
    async fn get_or_attach_unknown_id_is_not_found() {
        let orch = orchestrator_with_adapter();
        let err = orch.get_or_attach("ghost").await.unwrap_err();
        assert!(matches!(err, AdapterError::NotFound(_)));
    }

    #[tokio::test]
    async fn capabilities_list_has_one_entry_per_adapter() {
        let orch = orchestrator_with_adapter();
        assert_eq!(orch.capabilities_list().len(), 1);
    }
}
