// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! A session's two ingestion modes — attach (tail a `.jsonl` file) and
//! live (read a subprocess's stdout) — are driven by one actor task so
//! that both sources funnel through a single serialised emit path. That
//! is what keeps `seq` gap-free regardless of which source produced the
//! event: the file watcher and the stdout reader both just send the
//! actor a command and wait their turn, the same shape as the control
//! service's command loop this crate is grounded on.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_adapter::{AdapterError, Session, EVENT_CHANNEL_CAPACITY};
use bridge_protocol::event::{ContentBlock, Role, TokenUsage};
use bridge_protocol::{Capabilities, Command, Event, EventFactory, EventKind};
use notify::{RecursiveMode, Watcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::ingest::{handle_record, handle_stream_record, IngestState};
use crate::process;

/// In-memory history cap. On overflow, retain the most recent half —
/// `getHistory().len()` then sits in `[MAX_HISTORY/2, MAX_HISTORY]` as
/// more events arrive, which is exactly the bound callers are promised.
const MAX_HISTORY: usize = 5000;

fn push_history(history: &mut VecDeque<Event>, event: Event) {
    history.push_back(event);
    if history.len() > MAX_HISTORY {
        let drop_count = history.len() - MAX_HISTORY / 2;
        for _ in 0..drop_count {
            history.pop_front();
        }
    }
}

enum ActorCommand {
    Execute(Command, oneshot::Sender<Result<(), AdapterError>>),
    History(oneshot::Sender<Vec<Event>>),
    Refresh(oneshot::Sender<Result<(), AdapterError>>),
    Detach,
    FileChanged,
    /// Carries the kill signal for the turn that just started, so the
    /// actor can cancel it later without holding the `Child` itself.
    ProcessStarted(oneshot::Sender<()>),
    ProcessLine(String),
    ProcessStderr(String),
    ProcessExited(Option<i32>),
    ProcessSpawnFailed(String),
}

/// A live conversation in one project directory. Cheap to clone — every
/// clone shares the same actor task and broadcast channel.
#[derive(Clone)]
pub struct ClaudeSession {
    id: String,
    capabilities: Capabilities,
    event_tx: broadcast::Sender<Event>,
    cmd_tx: mpsc::Sender<ActorCommand>,
}

impl ClaudeSession {
    /// Attach to an existing `.jsonl` log. Performs the initial read
    /// before returning the constructed session's actor starts, so a
    /// `history()` call queued right after construction is guaranteed to
    /// observe it (the actor processes its initial read before it opens
    /// its command loop).
    pub fn attach(
        id: String,
        log_path: PathBuf,
        cli_binary: String,
        capabilities: Capabilities,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let actor = SessionActor {
            id: id.clone(),
            cli_binary,
            factory: Arc::new(EventFactory::new()),
            state: IngestState::default(),
            history: VecDeque::new(),
            event_tx: event_tx.clone(),
            log_path: Some(log_path),
            last_read_position: 0,
            suppress_file_events: Arc::new(AtomicBool::new(false)),
            process_active: false,
            kill_tx: None,
            cmd_tx: cmd_tx.clone(),
            _file_watcher: None,
        };
        tokio::spawn(actor.run(cmd_rx));

        Self { id, capabilities, event_tx, cmd_tx }
    }

    /// Spawn a brand-new subprocess — no underlying log to attach to yet.
    pub fn start(
        id: String,
        project_path: String,
        prompt: String,
        model: Option<String>,
        cli_binary: String,
        capabilities: Capabilities,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let mut state = IngestState::default();
        state.project_path = Some(project_path.clone());

        let actor = SessionActor {
            id: id.clone(),
            cli_binary: cli_binary.clone(),
            factory: Arc::new(EventFactory::new()),
            state,
            history: VecDeque::new(),
            event_tx: event_tx.clone(),
            log_path: None,
            last_read_position: 0,
            suppress_file_events: Arc::new(AtomicBool::new(false)),
            process_active: false,
            kill_tx: None,
            cmd_tx: cmd_tx.clone(),
            _file_watcher: None,
        };

        let cmd_tx_for_spawn = cmd_tx.clone();
        tokio::spawn(async move {
            let args = process::start_args(&prompt, model.as_deref());
            spawn_and_pump(cli_binary, project_path, args, cmd_tx_for_spawn).await;
        });
        tokio::spawn(actor.run(cmd_rx));

        Self { id, capabilities, event_tx, cmd_tx }
    }
}

#[async_trait]
impl Session for ClaudeSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    async fn execute(&self, command: Command) -> Result<(), AdapterError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ActorCommand::Execute(command, tx))
            .await
            .map_err(|_| AdapterError::NotFound(self.id.clone()))?;
        rx.await.map_err(|_| AdapterError::NotFound(self.id.clone()))?
    }

    async fn history(&self) -> Vec<Event> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(ActorCommand::History(tx)).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    async fn refresh(&self) -> Result<(), AdapterError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(ActorCommand::Refresh(tx))
            .await
            .map_err(|_| AdapterError::NotFound(self.id.clone()))?;
        rx.await.map_err(|_| AdapterError::NotFound(self.id.clone()))?
    }

    async fn detach(&self) {
        let _ = self.cmd_tx.send(ActorCommand::Detach).await;
    }
}

struct SessionActor {
    id: String,
    cli_binary: String,
    factory: Arc<EventFactory>,
    state: IngestState,
    history: VecDeque<Event>,
    event_tx: broadcast::Sender<Event>,
    log_path: Option<PathBuf>,
    /// Count of newline-delimited records already ingested. A trailing
    /// empty element from splitting on `\n` never advances this.
    last_read_position: usize,
    suppress_file_events: Arc<AtomicBool>,
    /// Whether a subprocess turn is currently in flight. The CLI runs
    /// one-shot (`--print`) per turn, so there is no persistent stdin to
    /// write follow-up messages to — a new message while this is `true`
    /// must wait for the current turn to finish.
    process_active: bool,
    /// Kill signal for the in-flight turn, if any. Sending on it tells
    /// `spawn_and_pump`'s select loop to `start_kill()` the child.
    kill_tx: Option<oneshot::Sender<()>>,
    cmd_tx: mpsc::Sender<ActorCommand>,
    _file_watcher: Option<notify::RecommendedWatcher>,
}

impl SessionActor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ActorCommand>) {
        if self.log_path.is_some() {
            self.read_and_ingest_new_records().await;
            self.start_file_watch();
        }

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                ActorCommand::Execute(command, reply) => {
                    let result = self.execute(command).await;
                    let _ = reply.send(result);
                }
                ActorCommand::History(reply) => {
                    let _ = reply.send(self.history.iter().cloned().collect());
                }
                ActorCommand::Refresh(reply) => {
                    self.read_and_ingest_new_records().await;
                    let _ = reply.send(Ok(()));
                }
                ActorCommand::Detach => {
                    self._file_watcher = None;
                    break;
                }
                ActorCommand::FileChanged => {
                    if !self.suppress_file_events.load(Ordering::SeqCst) {
                        self.read_and_ingest_new_records().await;
                    }
                }
                ActorCommand::ProcessStarted(kill_tx) => {
                    self.process_active = true;
                    self.kill_tx = Some(kill_tx);
                }
                ActorCommand::ProcessLine(line) => {
                    self.ingest_stream_line(&line);
                }
                ActorCommand::ProcessStderr(line) => {
                    tracing::warn!(session_id = %self.id, %line, "agent subprocess stderr");
                }
                ActorCommand::ProcessExited(code) => {
                    self.on_process_exited(code).await;
                }
                ActorCommand::ProcessSpawnFailed(message) => {
                    let event = self.factory.create_event(
                        &self.id,
                        EventKind::SessionError {
                            code: "SPAWN_ERROR".to_string(),
                            message,
                            recoverable: false,
                        },
                    );
                    self.emit(event);
                }
            }
        }
    }

    fn emit(&mut self, event: Event) {
        push_history(&mut self.history, event.clone());
        let _ = self.event_tx.send(event);
    }

    fn ingest_stream_line(&mut self, line: &str) {
        let (events, definitive_id) =
            handle_stream_record(&self.factory, &self.id, line, &mut self.state);
        for event in events {
            self.emit(event);
        }
        // The definitive session id reported by `system{subtype:init}` is
        // intentionally not applied as a rename here: the orchestrator
        // keyed this session by its pre-spawn id and a mid-flight rename
        // would strand existing subscribers. Record it for diagnostics only.
        if let Some(real_id) = definitive_id {
            if real_id != self.id {
                tracing::debug!(session_id = %self.id, %real_id, "CLI reported a different session id");
            }
        }
    }

    async fn read_and_ingest_new_records(&mut self) {
        let Some(path) = self.log_path.clone() else { return };
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "failed to read session log");
                return;
            }
        };
        // A trailing newline produces one empty trailing element from
        // `split('\n')`; it must not count as a record.
        let mut records: Vec<&str> = contents.split('\n').collect();
        if records.last() == Some(&"") {
            records.pop();
        }
        if records.len() <= self.last_read_position {
            return;
        }
        let new_records: Vec<String> =
            records[self.last_read_position..].iter().map(|s| s.to_string()).collect();
        self.last_read_position = records.len();

        for line in new_records {
            if line.trim().is_empty() {
                continue;
            }
            let events = handle_record(&self.factory, &self.id, &line, &mut self.state);
            for event in events {
                self.emit(event);
            }
        }
    }

    fn start_file_watch(&mut self) {
        let Some(path) = self.log_path.clone() else { return };
        let tx = self.cmd_tx.clone();
        let handler = move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = tx.try_send(ActorCommand::FileChanged);
            }
        };
        match notify::recommended_watcher(handler) {
            Ok(mut watcher) => {
                let watch_target = path.parent().unwrap_or(&path);
                if let Err(e) = watcher.watch(watch_target, RecursiveMode::NonRecursive) {
                    tracing::warn!(session_id = %self.id, error = %e, "failed to watch session log");
                    return;
                }
                self._file_watcher = Some(watcher);
            }
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "failed to create session log watcher");
            }
        }
    }

    /// Re-sync `last_read_position` to the file's current tail without
    /// emitting anything — called after a resumed subprocess exits, since
    /// everything it wrote was already ingested from its stdout.
    async fn resync_read_position_to_tail(&mut self) {
        let Some(path) = self.log_path.clone() else { return };
        if let Ok(contents) = tokio::fs::read_to_string(&path).await {
            let mut records: Vec<&str> = contents.split('\n').collect();
            if records.last() == Some(&"") {
                records.pop();
            }
            self.last_read_position = records.len();
        }
    }

    async fn execute(&mut self, command: Command) -> Result<(), AdapterError> {
        match command {
            Command::SendMessage { text, .. } => self.send_message(text).await,
            Command::Cancel { .. } | Command::Terminate { .. } => self.kill_process().await,
            Command::Pause { .. } => {
                Err(AdapterError::Unsupported("pause is not supported by this adapter".into()))
            }
            Command::Resume { .. } => Ok(()), // no-op: see resume-with-no-prompt open question
            Command::AnswerQuestion { .. } => {
                Err(AdapterError::Unsupported("interactive questions are not supported by this adapter".into()))
            }
            Command::SetPermissionPolicy { .. } => Ok(()),
            Command::ApproveToolCall { .. } | Command::DenyToolCall { .. } => {
                // Resolved upstream by the approval manager before reaching a session.
                Ok(())
            }
        }
    }

    async fn send_message(&mut self, text: String) -> Result<(), AdapterError> {
        if self.process_active {
            return Err(AdapterError::Unsupported(
                "a turn is already in flight for this session".into(),
            ));
        }

        // Resume: echo the user's text immediately so the UI sees it
        // without waiting on the subprocess, then spawn the resumed CLI.
        let message_id = Uuid::new_v4().to_string();
        let start = self.factory.create_event(
            &self.id,
            EventKind::MessageStart { message_id: message_id.clone(), role: Role::User },
        );
        self.emit(start);
        let complete = self.factory.create_event(
            &self.id,
            EventKind::MessageComplete {
                message_id,
                role: Role::User,
                content: vec![ContentBlock::Text { text: text.clone() }],
            },
        );
        self.emit(complete);

        let Some(project_path) = self.state.project_path.clone() else {
            return Err(AdapterError::SpawnFailed("unknown project path for resume".into()));
        };

        self.suppress_file_events.store(true, Ordering::SeqCst);
        let args = process::resume_args(&self.id, &text);
        let cmd_tx = self.cmd_tx.clone();
        let binary = self.cli_binary.clone();
        tokio::spawn(async move {
            spawn_and_pump(binary, project_path, args, cmd_tx).await;
        });
        Ok(())
    }

    /// Signals the in-flight turn's `spawn_and_pump` task to `start_kill()`
    /// its child. A no-op if no turn is currently running.
    async fn kill_process(&mut self) -> Result<(), AdapterError> {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        Ok(())
    }

    async fn on_process_exited(&mut self, code: Option<i32>) {
        self.process_active = false;
        self.kill_tx = None;
        let was_resume = self.suppress_file_events.swap(false, Ordering::SeqCst);
        if was_resume {
            self.resync_read_position_to_tail().await;
        }
        let event = match code {
            Some(0) => self.factory.create_event(
                &self.id,
                EventKind::SessionCompleted {
                    duration_ms: 0,
                    token_usage: TokenUsage::default(),
                    files_changed: 0,
                },
            ),
            _ => self.factory.create_event(
                &self.id,
                EventKind::SessionError {
                    code: "PROCESS_ERROR".to_string(),
                    message: format!("agent process exited with status {code:?}"),
                    recoverable: true,
                },
            ),
        };
        self.emit(event);
    }
}

/// Spawn the CLI and pump its stdout/stderr/exit back to the actor via
/// `cmd_tx`. Runs on its own task so the actor loop never blocks on
/// subprocess I/O.
async fn spawn_and_pump(
    binary: String,
    project_path: String,
    args: Vec<String>,
    cmd_tx: mpsc::Sender<ActorCommand>,
) {
    let mut child = match process::spawn(&binary, &project_path, &args) {
        Ok(c) => c,
        Err(e) => {
            let _ = cmd_tx.send(ActorCommand::ProcessSpawnFailed(e.to_string())).await;
            return;
        }
    };
    let (kill_tx, kill_rx) = oneshot::channel();
    let _ = cmd_tx.send(ActorCommand::ProcessStarted(kill_tx)).await;

    if let Some(stdout) = child.stdout.take() {
        let tx = cmd_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(ActorCommand::ProcessLine(line)).await.is_err() {
                    break;
                }
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = cmd_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(ActorCommand::ProcessStderr(line)).await.is_err() {
                    break;
                }
            }
        });
    }

    let status = wait_for_exit(&mut child, kill_rx).await;
    let _ = cmd_tx.send(ActorCommand::ProcessExited(status)).await;
}

/// Waits for natural exit, or kills the child the moment a signal arrives
/// on `kill_rx` and waits for it to actually reap.
async fn wait_for_exit(child: &mut Child, kill_rx: oneshot::Receiver<()>) -> Option<i32> {
    tokio::select! {
        status = child.wait() => status.ok().and_then(|s| s.code()),
        _ = kill_rx => {
            let _ = child.start_kill();
            child.wait().await.ok().and_then(|s| s.code())
        }
    }
}
