//! The orchestrator task: owns the [`RewindSession`], runs one attempt at a time and
//! drives autoplay.
//!
//! Callers talk to it through an [`OrchestratorHandle`] (commands in, snapshots out over a
//! `watch` channel). Attempt work runs in its own task and reports back through an internal
//! channel stamped with the attempt generation.

use std::{sync::Arc, time::Duration};

use shared::domain::{LoadingPhase, SessionHandle, SessionRequest};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientSettings,
    deck::{DeckLayout, SlideCursor, SlideKind},
    poll_until_ready,
    session::{AttemptEvent, AttemptEventKind, AttemptTicket, RewindSession, SessionState},
    warmup::MediaWarmupCache,
    GatewayClient, GatewayError, PollPolicy,
};

const COMMAND_BUFFER: usize = 64;

/// Read-only view published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSnapshot {
    pub generation: u64,
    pub state: SessionState,
    pub phase: Option<LoadingPhase>,
    pub phase_trail: Vec<LoadingPhase>,
    pub request: Option<SessionRequest>,
    pub handle: Option<SessionHandle>,
    pub cursor: SlideCursor,
    pub slide: Option<SlideKind>,
    pub paused: bool,
    pub music_enabled: bool,
    pub autoplay_armed: bool,
    pub navigation_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorCommand {
    Submit(SessionRequest),
    Retry,
    Acknowledge,
    Restart,
    Advance,
    Retreat,
    TogglePause,
    SetPaused(bool),
    ToggleMusic,
    Shutdown,
}

impl OrchestratorCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorCommand::Submit(_) => "submit",
            OrchestratorCommand::Retry => "retry",
            OrchestratorCommand::Acknowledge => "acknowledge",
            OrchestratorCommand::Restart => "restart",
            OrchestratorCommand::Advance => "advance",
            OrchestratorCommand::Retreat => "retreat",
            OrchestratorCommand::TogglePause => "toggle_pause",
            OrchestratorCommand::SetPaused(_) => "set_paused",
            OrchestratorCommand::ToggleMusic => "toggle_music",
            OrchestratorCommand::Shutdown => "shutdown",
        }
    }
}

pub struct OrchestratorDeps {
    pub gateway: Arc<dyn GatewayClient>,
    pub warmup: Arc<MediaWarmupCache>,
    pub poll_policy: PollPolicy,
    pub autoplay_period: Duration,
    pub layout: DeckLayout,
}

impl OrchestratorDeps {
    pub fn from_settings(
        settings: &ClientSettings,
        gateway: Arc<dyn GatewayClient>,
        warmup: Arc<MediaWarmupCache>,
    ) -> Self {
        Self {
            gateway,
            warmup,
            poll_policy: PollPolicy::from_settings(settings),
            autoplay_period: settings.autoplay_period,
            layout: DeckLayout::standard(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("orchestrator task has stopped")]
pub struct OrchestratorClosed;

pub struct OrchestratorHandle {
    commands: mpsc::Sender<OrchestratorCommand>,
    snapshots: watch::Receiver<OrchestratorSnapshot>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    pub async fn send(&self, command: OrchestratorCommand) -> Result<(), OrchestratorClosed> {
        self.commands
            .send(command)
            .await
            .map_err(|_| OrchestratorClosed)
    }

    pub async fn submit(&self, request: SessionRequest) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::Submit(request)).await
    }

    pub async fn retry(&self) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::Retry).await
    }

    pub async fn acknowledge(&self) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::Acknowledge).await
    }

    pub async fn restart(&self) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::Restart).await
    }

    pub async fn advance(&self) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::Advance).await
    }

    pub async fn retreat(&self) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::Retreat).await
    }

    pub async fn toggle_pause(&self) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::TogglePause).await
    }

    pub async fn set_paused(&self, paused: bool) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::SetPaused(paused)).await
    }

    pub async fn toggle_music(&self) -> Result<(), OrchestratorClosed> {
        self.send(OrchestratorCommand::ToggleMusic).await
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.snapshots.clone()
    }

    /// Resolves with the first published snapshot that satisfies `predicate`.
    pub async fn wait_for<F>(
        &self,
        mut predicate: F,
    ) -> Result<OrchestratorSnapshot, OrchestratorClosed>
    where
        F: FnMut(&OrchestratorSnapshot) -> bool,
    {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| OrchestratorClosed)?;
        Ok(snapshot.clone())
    }

    /// Stops the orchestrator and any attempt in flight, then waits for the task to exit.
    pub async fn shutdown(self) -> Result<(), OrchestratorClosed> {
        let _ = self.commands.send(OrchestratorCommand::Shutdown).await;
        self.task.await.map_err(|_| OrchestratorClosed)
    }
}

pub struct Orchestrator {
    deps: OrchestratorDeps,
    session: RewindSession,
    events: mpsc::UnboundedSender<AttemptEvent>,
    attempt: Option<JoinHandle<()>>,
    autoplay_deadline: Option<Instant>,
    snapshots: watch::Sender<OrchestratorSnapshot>,
}

impl Orchestrator {
    pub fn spawn(deps: OrchestratorDeps) -> OrchestratorHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = RewindSession::new(deps.layout.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

        let orchestrator = Self {
            deps,
            session,
            events: event_tx,
            attempt: None,
            autoplay_deadline: None,
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(orchestrator.run(command_rx, event_rx));

        OrchestratorHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<OrchestratorCommand>,
        mut events: mpsc::UnboundedReceiver<AttemptEvent>,
    ) {
        info!("orchestrator: started");
        loop {
            let deadline = self.autoplay_deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(OrchestratorCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.handle_autoplay();
                }
            }
            self.publish();
        }
        self.cancel_attempt();
        info!("orchestrator: stopped");
    }

    fn handle_command(&mut self, command: OrchestratorCommand) {
        debug!(command = command.name(), "orchestrator: command");
        match command {
            OrchestratorCommand::Submit(request) => {
                if let Some(ticket) = self.session.submit(request) {
                    self.launch(ticket);
                }
            }
            OrchestratorCommand::Retry => {
                if let Some(ticket) = self.session.retry() {
                    self.launch(ticket);
                }
            }
            OrchestratorCommand::Acknowledge => {
                if self.session.acknowledge() {
                    self.cancel_attempt();
                }
            }
            OrchestratorCommand::Restart => {
                self.cancel_attempt();
                self.session.restart();
            }
            OrchestratorCommand::Advance => {
                let transition = self.session.advance();
                self.sync_autoplay(transition.changed());
                return;
            }
            OrchestratorCommand::Retreat => {
                let transition = self.session.retreat();
                self.sync_autoplay(transition.changed());
                return;
            }
            OrchestratorCommand::TogglePause => {
                let paused = self.session.toggle_pause();
                info!(paused, "orchestrator: pause toggled");
            }
            OrchestratorCommand::SetPaused(paused) => {
                self.session.set_paused(paused);
            }
            OrchestratorCommand::ToggleMusic => {
                let enabled = self.session.toggle_music();
                info!(enabled, "orchestrator: music toggled");
            }
            OrchestratorCommand::Shutdown => {}
        }
        self.sync_autoplay(false);
    }

    fn handle_event(&mut self, event: AttemptEvent) {
        let was_ready = self.session.state().is_ready();
        if !self.session.apply(event) {
            return;
        }
        let became_ready = !was_ready && self.session.state().is_ready();
        if became_ready {
            info!(
                generation = self.session.generation(),
                "orchestrator: rewind ready"
            );
        }
        if matches!(self.session.state(), SessionState::Failed(_)) {
            self.attempt = None;
        }
        self.sync_autoplay(became_ready);
    }

    fn handle_autoplay(&mut self) {
        self.autoplay_deadline = None;
        let transition = self.session.autoplay_tick();
        debug!(?transition, "orchestrator: autoplay fired");
        self.sync_autoplay(transition.changed());
    }

    /// Re-arms or clears the autoplay countdown. A running countdown keeps its deadline
    /// unless `restart_countdown` is set.
    fn sync_autoplay(&mut self, restart_countdown: bool) {
        if !self.session.autoplay_armed() {
            self.autoplay_deadline = None;
        } else if restart_countdown || self.autoplay_deadline.is_none() {
            self.autoplay_deadline = Some(Instant::now() + self.deps.autoplay_period);
        }
    }

    fn launch(&mut self, ticket: AttemptTicket) {
        self.cancel_attempt();
        let reporter = AttemptReporter {
            generation: ticket.generation,
            events: self.events.clone(),
        };
        let gateway = Arc::clone(&self.deps.gateway);
        let warmup = Arc::clone(&self.deps.warmup);
        let policy = self.deps.poll_policy;
        self.attempt = Some(tokio::spawn(run_attempt(
            gateway,
            warmup,
            policy,
            ticket.request,
            reporter,
        )));
    }

    fn cancel_attempt(&mut self) {
        if let Some(task) = self.attempt.take() {
            task.abort();
            debug!("orchestrator: attempt cancelled");
        }
    }

    fn publish(&self) {
        let next = self.session.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

struct AttemptReporter {
    generation: u64,
    events: mpsc::UnboundedSender<AttemptEvent>,
}

impl AttemptReporter {
    fn send(&self, kind: AttemptEventKind) {
        let event = AttemptEvent {
            generation: self.generation,
            kind,
        };
        if self.events.send(event).is_err() {
            debug!(generation = self.generation, "orchestrator: event dropped after shutdown");
        }
    }
}

async fn run_attempt(
    gateway: Arc<dyn GatewayClient>,
    warmup: Arc<MediaWarmupCache>,
    policy: PollPolicy,
    request: SessionRequest,
    reporter: AttemptReporter,
) {
    if let Err(err) = drive_attempt(gateway, warmup, policy, request, &reporter).await {
        warn!(generation = reporter.generation, error = %err, "orchestrator: attempt failed");
        reporter.send(AttemptEventKind::Failed(err));
    }
}

async fn drive_attempt(
    gateway: Arc<dyn GatewayClient>,
    warmup: Arc<MediaWarmupCache>,
    policy: PollPolicy,
    request: SessionRequest,
    reporter: &AttemptReporter,
) -> Result<(), GatewayError> {
    let start = gateway.start_session(&request).await?;
    reporter.send(AttemptEventKind::HandleReceived(start.handle.clone()));

    let mut result = poll_until_ready(&*gateway, &start.handle, &policy, |phase| {
        reporter.send(AttemptEventKind::Phase(phase))
    })
    .await?;
    if result.player.is_none() {
        result.player = start.player;
    }
    reporter.send(AttemptEventKind::PollCompleted);

    let report = warmup
        .warm(&result, |loaded, total| {
            reporter.send(AttemptEventKind::WarmupProgress { loaded, total })
        })
        .await;
    reporter.send(AttemptEventKind::Completed { result, report });
    Ok(())
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
