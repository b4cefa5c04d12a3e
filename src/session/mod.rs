pub mod naming;

use crate::diagnostics::{detect_diagnostic_line, DiagnosticLevel};
use crate::errors::AppResult;
use crate::models::{AppSettings, SessionState};
use crate::paths::PathResolver;
use crate::protocol::{decoder_for, ControlDecoder, ControlMessage};
use crate::ui::{
    UiAdapter, LABEL_LOADING, LABEL_READY, LABEL_SELECTING_INPUT, TEXT_NO_OUTPUT_SELECTED, TEXT_SELECTING_OUTPUT,
};
use crate::worker::{SpawnedWorker, WorkerCommand, WorkerEvent, WorkerLauncher, WorkerLink};
use naming::default_output_name;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    OpenFile,
    /// Finish the current session, then stop the controller.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    OpenFile,
    SaveFile,
}

struct PendingPrompt {
    kind: PromptKind,
    handle: JoinHandle<Option<PathBuf>>,
}

struct ActiveWorker {
    link: Box<dyn WorkerLink>,
    events: mpsc::Receiver<WorkerEvent>,
    decoder: Box<dyn ControlDecoder>,
    /// Sentinels seen but not yet turned into a save prompt.
    queued_requests: usize,
    /// Set once the UI has been handed back for a new open while this worker finishes.
    rearmed: bool,
    /// A request was cancelled, so the worker may wait on stdin forever.
    orphaned: bool,
    deadline: Option<Instant>,
}

impl ActiveWorker {
    fn new(spawned: SpawnedWorker, decoder: Box<dyn ControlDecoder>, deadline: Option<Instant>) -> Self {
        Self {
            link: spawned.link,
            events: spawned.events,
            decoder,
            queued_requests: 0,
            rearmed: false,
            orphaned: false,
            deadline,
        }
    }
}

enum Step {
    Command(Option<UiCommand>),
    Prompt(PromptKind, Option<PathBuf>),
    Worker(Option<WorkerEvent>),
    Deadline,
}

/// Owns the one session and its worker. All transitions happen inside [`SessionController::run`].
pub struct SessionController {
    ui: Arc<dyn UiAdapter>,
    paths: Arc<dyn PathResolver>,
    launcher: Arc<dyn WorkerLauncher>,
    settings: AppSettings,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    session_id: String,
    worker: Option<ActiveWorker>,
    prompt: Option<PendingPrompt>,
    commands_closed: bool,
    shutdown_requested: bool,
}

impl SessionController {
    pub fn new(
        ui: Arc<dyn UiAdapter>,
        paths: Arc<dyn PathResolver>,
        launcher: Arc<dyn WorkerLauncher>,
        settings: AppSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            ui,
            paths,
            launcher,
            settings,
            state: SessionState::Idle,
            state_tx,
            session_id: String::new(),
            worker: None,
            prompt: None,
            commands_closed: false,
            shutdown_requested: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<UiCommand>) {
        self.ui.set_busy_label(LABEL_READY);
        loop {
            if self.ready_to_stop().await {
                break;
            }
            let step = self.next_step(&mut commands).await;
            self.apply(step).await;
        }
        tracing::info!(state = self.state.as_str(), "session controller stopped");
    }

    async fn ready_to_stop(&mut self) -> bool {
        if !self.shutdown_requested || self.prompt.is_some() {
            return false;
        }
        let stranded = self
            .worker
            .as_ref()
            .is_some_and(|worker| worker.orphaned && worker.queued_requests == 0);
        if stranded {
            self.teardown_worker("shutdown with an unanswered output request").await;
            self.transition(SessionState::Idle);
        }
        self.worker.is_none()
    }

    async fn next_step(&mut self, commands: &mut mpsc::Receiver<UiCommand>) -> Step {
        let deadline = self.worker.as_ref().and_then(|worker| worker.deadline);
        let accept_commands = !self.commands_closed;
        tokio::select! {
            command = commands.recv(), if accept_commands => Step::Command(command),
            (kind, answer) = wait_prompt(&mut self.prompt) => Step::Prompt(kind, answer),
            event = next_worker_event(&mut self.worker) => Step::Worker(event),
            _ = sleep_until(deadline) => Step::Deadline,
        }
    }

    async fn apply(&mut self, step: Step) {
        match step {
            Step::Command(Some(command)) => self.handle_command(command).await,
            Step::Command(None) => {
                self.commands_closed = true;
                self.shutdown_requested = true;
            }
            Step::Prompt(kind, answer) => {
                self.prompt = None;
                match kind {
                    PromptKind::OpenFile => self.on_input_selected(answer).await,
                    PromptKind::SaveFile => self.on_output_selected(answer).await,
                }
            }
            Step::Worker(Some(WorkerEvent::Stdout(bytes))) => self.on_stdout(&bytes),
            Step::Worker(Some(WorkerEvent::Stderr(bytes))) => log_worker_stderr(&bytes),
            Step::Worker(Some(WorkerEvent::Exited(code))) => self.on_worker_exit(code),
            Step::Worker(None) => self.on_worker_exit(None),
            Step::Deadline => self.on_deadline().await,
        }
    }

    async fn handle_command(&mut self, command: UiCommand) {
        match command {
            UiCommand::Shutdown => {
                tracing::info!(state = self.state.as_str(), "shutdown requested");
                self.shutdown_requested = true;
            }
            UiCommand::OpenFile => {
                if self.shutdown_requested {
                    tracing::info!("open ignored: shutting down");
                    return;
                }
                if self.prompt.is_some() {
                    tracing::info!(state = self.state.as_str(), "open ignored: a prompt is already showing");
                    return;
                }
                if let Some(rearmed) = self.worker.as_ref().map(|worker| worker.rearmed) {
                    if !rearmed {
                        tracing::info!(state = self.state.as_str(), "open ignored: worker is busy");
                        return;
                    }
                    if !self.settings.replace_finishing_worker {
                        tracing::info!("open ignored: previous worker still finishing");
                        self.ui.render("The previous conversion is still finishing.");
                        return;
                    }
                    self.teardown_worker("replaced by a new session").await;
                }
                self.begin_session();
            }
        }
    }

    fn begin_session(&mut self) {
        self.session_id = Uuid::new_v4().to_string();
        tracing::info!(session_id = %self.session_id, "session started");
        self.transition(SessionState::SelectingInput);
        self.ui.set_busy_label(LABEL_SELECTING_INPUT);

        let ui = self.ui.clone();
        self.prompt = Some(PendingPrompt {
            kind: PromptKind::OpenFile,
            handle: tokio::spawn(async move { ui.prompt_open_file().await }),
        });
    }

    async fn on_input_selected(&mut self, answer: Option<PathBuf>) {
        let Some(input) = answer else {
            tracing::info!(session_id = %self.session_id, "input selection cancelled");
            self.transition(SessionState::Idle);
            self.ui.set_busy_label(LABEL_READY);
            return;
        };

        tracing::info!(session_id = %self.session_id, input = %input.display(), "input selected");
        let spawned = self.prepare_command(&input).and_then(|command| {
            tracing::info!(session_id = %self.session_id, command = %command.display(), "launching worker");
            self.launcher.launch(&command)
        });
        match spawned {
            Ok(spawned) => {
                let deadline = self.settings.worker_timeout_seconds.and_then(worker_deadline);
                let worker = ActiveWorker::new(spawned, decoder_for(self.settings.framing), deadline);
                tracing::info!(session_id = %self.session_id, pid = ?worker.link.pid(), "worker running");
                self.worker = Some(worker);
                self.transition(SessionState::Running);
                self.ui.set_busy_label(LABEL_LOADING);
            }
            Err(error) => {
                tracing::error!(session_id = %self.session_id, error = %error, "failed to start worker");
                self.ui.render(&format!("Could not start conversion: {}", error));
                self.transition(SessionState::Failed);
                self.ui.set_busy_label(LABEL_READY);
            }
        }
    }

    fn prepare_command(&self, input: &Path) -> AppResult<WorkerCommand> {
        let executable = self.paths.resolve_worker_executable()?;
        let script = self.paths.resolve_worker_script()?;
        Ok(WorkerCommand::for_input(
            &executable,
            &self.settings.interpreter_args,
            &script,
            input,
        ))
    }

    fn on_stdout(&mut self, bytes: &[u8]) {
        let messages = match self.worker.as_mut() {
            Some(worker) => worker.decoder.decode(bytes),
            None => return,
        };
        for message in messages {
            self.on_control_message(message);
        }
    }

    fn on_control_message(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::ProgressText(text) => self.ui.render(&text),
            ControlMessage::RequestOutputPath => {
                let Some(worker) = self.worker.as_mut() else {
                    return;
                };
                worker.queued_requests += 1;
                worker.rearmed = false;
                if self.prompt.is_none() {
                    self.prompt_for_output();
                } else {
                    tracing::info!(session_id = %self.session_id, "output request queued behind an open prompt");
                }
            }
        }
    }

    fn prompt_for_output(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        worker.queued_requests = worker.queued_requests.saturating_sub(1);

        self.transition(SessionState::AwaitingOutputPath);
        self.ui.render(TEXT_SELECTING_OUTPUT);
        let suggested = default_output_name(&self.settings.output_name_prefix, &self.settings.output_extension);
        tracing::info!(session_id = %self.session_id, suggested = %suggested, "worker requested output path");

        let ui = self.ui.clone();
        self.prompt = Some(PendingPrompt {
            kind: PromptKind::SaveFile,
            handle: tokio::spawn(async move { ui.prompt_save_file(&suggested).await }),
        });
    }

    async fn on_output_selected(&mut self, answer: Option<PathBuf>) {
        if self.worker.is_none() {
            tracing::warn!(session_id = %self.session_id, "output path chosen after worker ended; discarded");
            return;
        }

        match answer {
            Some(output) => {
                let output = absolute_output_path(&output);
                let text = output.to_string_lossy().to_string();
                let written = match self.worker.as_mut() {
                    Some(worker) => worker.link.write_line(&text).await,
                    None => return,
                };
                match written {
                    Ok(()) => tracing::info!(session_id = %self.session_id, output = %text, "output path sent to worker"),
                    Err(error) => {
                        tracing::error!(session_id = %self.session_id, error = %error, "failed to answer output request");
                        self.ui.render(&format!("Could not send the output path to the worker: {}", error));
                    }
                }
            }
            None => {
                self.ui.render(TEXT_NO_OUTPUT_SELECTED);
                if self.settings.terminate_orphaned_worker {
                    tracing::warn!(session_id = %self.session_id, "output request cancelled; terminating worker");
                    self.teardown_worker("output request cancelled").await;
                    self.transition(SessionState::Idle);
                    self.ui.set_busy_label(LABEL_READY);
                    return;
                }
                tracing::warn!(
                    session_id = %self.session_id,
                    code = "ORPHANED_WORKER",
                    "output request cancelled; worker left waiting on stdin"
                );
                if let Some(worker) = self.worker.as_mut() {
                    worker.orphaned = true;
                }
            }
        }

        let queued = self.worker.as_ref().map_or(0, |worker| worker.queued_requests);
        if queued > 0 {
            self.prompt_for_output();
            return;
        }
        if let Some(worker) = self.worker.as_mut() {
            worker.rearmed = true;
        }
        self.transition(SessionState::Running);
        self.ui.set_busy_label(LABEL_READY);
    }

    fn on_worker_exit(&mut self, code: Option<i32>) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        for message in worker.decoder.finish() {
            match message {
                ControlMessage::ProgressText(text) => self.ui.render(&text),
                ControlMessage::RequestOutputPath => {
                    tracing::warn!(session_id = %self.session_id, "output request arrived as the worker exited; ignored");
                }
            }
        }

        if let Some(prompt) = self.prompt.take() {
            if prompt.kind == PromptKind::SaveFile {
                tracing::warn!(session_id = %self.session_id, "worker exited while awaiting an output path");
            }
            prompt.handle.abort();
        }

        match code {
            Some(0) => tracing::info!(session_id = %self.session_id, "worker finished"),
            other => tracing::warn!(session_id = %self.session_id, exit_code = ?other, "worker finished abnormally"),
        }
        self.transition(SessionState::Done);
        self.ui.set_busy_label(LABEL_READY);
    }

    async fn on_deadline(&mut self) {
        let seconds = self.settings.worker_timeout_seconds.unwrap_or_default();
        tracing::warn!(session_id = %self.session_id, timeout_seconds = seconds, "worker timed out");
        if let Some(prompt) = self.prompt.take() {
            prompt.handle.abort();
        }
        self.teardown_worker("timed out").await;
        self.ui.render(&format!("Conversion timed out after {} s.", seconds));
        self.transition(SessionState::Failed);
        self.ui.set_busy_label(LABEL_READY);
    }

    async fn teardown_worker(&mut self, reason: &str) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };
        tracing::warn!(session_id = %self.session_id, pid = ?worker.link.pid(), reason, "tearing down worker");
        if let Err(error) = worker.link.close_input().await {
            tracing::debug!(session_id = %self.session_id, error = %error, "worker stdin already gone");
        }
        if let Err(error) = worker.link.terminate().await {
            tracing::error!(session_id = %self.session_id, error = %error, "failed to terminate worker");
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = self.state.as_str(), to = next.as_str(), "session transition");
        self.state = next;
        self.state_tx.send_replace(next);
    }
}

async fn wait_prompt(prompt: &mut Option<PendingPrompt>) -> (PromptKind, Option<PathBuf>) {
    match prompt {
        Some(pending) => {
            let answer = match (&mut pending.handle).await {
                Ok(answer) => answer,
                Err(error) => {
                    tracing::error!(error = %error, "prompt task failed; treating as cancelled");
                    None
                }
            };
            (pending.kind, answer)
        }
        None => std::future::pending().await,
    }
}

async fn next_worker_event(worker: &mut Option<ActiveWorker>) -> Option<WorkerEvent> {
    match worker {
        Some(worker) => worker.events.recv().await,
        None => std::future::pending().await,
    }
}

/// `None` when the timeout is too far out to represent; such a worker simply has no deadline.
fn worker_deadline(seconds: u64) -> Option<Instant> {
    let deadline = Instant::now().checked_add(Duration::from_secs(seconds));
    if deadline.is_none() {
        tracing::warn!(timeout_seconds = seconds, "worker timeout out of range; running without a deadline");
    }
    deadline
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn absolute_output_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn log_worker_stderr(bytes: &[u8]) {
    let text = String::from_utf8_lossy(bytes);
    for line in text.lines() {
        match detect_diagnostic_line(line) {
            Some((DiagnosticLevel::Error, message)) => tracing::error!(stream = "stderr", "{}", message),
            Some((DiagnosticLevel::Warning, message)) => tracing::warn!(stream = "stderr", "{}", message),
            None if !line.trim().is_empty() => tracing::info!(stream = "stderr", "{}", line.trim_end()),
            None => {}
        }
    }
}
