//! Session state machine for one rewind at a time.
//!
//! `RewindSession` is synchronous: the orchestrator task feeds it user commands and
//! attempt events and reads snapshots back out. Every attempt gets a fresh generation;
//! events stamped with an older generation are dropped, which is what keeps late
//! callbacks from a cancelled attempt from touching post-restart state.

use std::sync::Arc;

use shared::domain::{LoadingPhase, SessionHandle, SessionRequest, SessionResult};
use tracing::{debug, info, warn};

use crate::{
    deck::{DeckController, DeckLayout, DeckTransition},
    failure::SessionFailure,
    orchestrator::OrchestratorSnapshot,
    warmup::WarmupReport,
    GatewayError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Starting,
    Polling { phase: LoadingPhase },
    Warming { loaded: usize, total: usize },
    Ready(Arc<SessionResult>),
    Failed(SessionFailure),
}

impl SessionState {
    pub fn phase(&self) -> Option<LoadingPhase> {
        match self {
            SessionState::Idle | SessionState::Failed(_) => None,
            SessionState::Starting => Some(LoadingPhase::Searching),
            SessionState::Polling { phase } => Some(*phase),
            SessionState::Warming { .. } => Some(LoadingPhase::Caching),
            SessionState::Ready(_) => Some(LoadingPhase::Ready),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Polling { .. } => "polling",
            SessionState::Warming { .. } => "warming",
            SessionState::Ready(_) => "ready",
            SessionState::Failed(_) => "failed",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Polling { .. } | SessionState::Warming { .. }
        )
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready(_))
    }

    pub fn result(&self) -> Option<&Arc<SessionResult>> {
        match self {
            SessionState::Ready(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        match self {
            SessionState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum AttemptEventKind {
    HandleReceived(SessionHandle),
    Phase(LoadingPhase),
    PollCompleted,
    WarmupProgress { loaded: usize, total: usize },
    Completed {
        result: SessionResult,
        report: WarmupReport,
    },
    Failed(GatewayError),
}

#[derive(Debug, Clone)]
pub struct AttemptEvent {
    pub generation: u64,
    pub kind: AttemptEventKind,
}

/// Work order for one attempt, handed to whoever runs the gateway calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptTicket {
    pub generation: u64,
    pub request: SessionRequest,
}

pub struct RewindSession {
    generation: u64,
    request: Option<SessionRequest>,
    handle: Option<SessionHandle>,
    state: SessionState,
    phase_trail: Vec<LoadingPhase>,
    deck: DeckController,
    music_enabled: bool,
    last_warmup: Option<WarmupReport>,
}

impl RewindSession {
    pub fn new(layout: DeckLayout) -> Self {
        Self {
            generation: 0,
            request: None,
            handle: None,
            state: SessionState::Idle,
            phase_trail: Vec::new(),
            deck: DeckController::new(layout),
            music_enabled: true,
            last_warmup: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn request(&self) -> Option<&SessionRequest> {
        self.request.as_ref()
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    pub fn phase_trail(&self) -> &[LoadingPhase] {
        &self.phase_trail
    }

    pub fn deck(&self) -> &DeckController {
        &self.deck
    }

    pub fn music_enabled(&self) -> bool {
        self.music_enabled
    }

    pub fn last_warmup(&self) -> Option<&WarmupReport> {
        self.last_warmup.as_ref()
    }

    /// Autoplay may only tick while the session is ready and the deck allows it.
    pub fn autoplay_armed(&self) -> bool {
        self.state.is_ready() && self.deck.autoplay_eligible()
    }

    pub fn submit(&mut self, request: SessionRequest) -> Option<AttemptTicket> {
        if self.state != SessionState::Idle {
            warn!(state = self.state.tag(), "session: submit ignored outside idle");
            return None;
        }
        self.request = Some(request);
        self.begin_attempt()
    }

    /// Re-submits the request of a failed attempt.
    pub fn retry(&mut self) -> Option<AttemptTicket> {
        if !matches!(self.state, SessionState::Failed(_)) {
            return None;
        }
        self.begin_attempt()
    }

    /// Dismisses a failure; the user must enter a fresh request.
    pub fn acknowledge(&mut self) -> bool {
        if !matches!(self.state, SessionState::Failed(_)) {
            return false;
        }
        self.generation += 1;
        self.clear_attempt();
        self.deck.show_entry();
        info!(generation = self.generation, "session: failure dismissed");
        true
    }

    /// Drops all attempt data at once, from any state.
    pub fn restart(&mut self) {
        self.generation += 1;
        self.clear_attempt();
        self.deck.reset();
        info!(generation = self.generation, "session: restarted");
    }

    pub fn apply(&mut self, event: AttemptEvent) -> bool {
        if event.generation != self.generation {
            debug!(
                event_generation = event.generation,
                generation = self.generation,
                "session: stale event dropped"
            );
            return false;
        }

        match (&self.state, event.kind) {
            (SessionState::Starting, AttemptEventKind::HandleReceived(handle)) => {
                info!(session_id = %handle.session_id, "session: handle received");
                self.handle = Some(handle);
                self.enter(SessionState::Polling {
                    phase: LoadingPhase::Found,
                });
                true
            }
            (SessionState::Polling { phase }, AttemptEventKind::Phase(next)) => {
                // Caching and Ready belong to the client, not the backend.
                if next > *phase && next <= LoadingPhase::Analyzing {
                    self.enter(SessionState::Polling { phase: next });
                    true
                } else {
                    false
                }
            }
            (SessionState::Polling { .. }, AttemptEventKind::PollCompleted) => {
                self.enter(SessionState::Warming {
                    loaded: 0,
                    total: 0,
                });
                true
            }
            (SessionState::Warming { .. }, AttemptEventKind::WarmupProgress { loaded, total }) => {
                self.state = SessionState::Warming { loaded, total };
                true
            }
            (SessionState::Warming { .. }, AttemptEventKind::Completed { result, report }) => {
                self.last_warmup = Some(report);
                self.enter(SessionState::Ready(Arc::new(result)));
                self.deck.begin_content();
                true
            }
            (state, AttemptEventKind::Failed(err)) if state.is_loading() => {
                let failure = SessionFailure::from_gateway(&err);
                warn!(
                    category = ?failure.category(),
                    detail = failure.detail(),
                    "session: attempt failed"
                );
                self.state = SessionState::Failed(failure);
                true
            }
            (state, kind) => {
                debug!(state = state.tag(), ?kind, "session: event ignored");
                false
            }
        }
    }

    pub fn advance(&mut self) -> DeckTransition {
        if !self.state.is_ready() {
            return DeckTransition::Unchanged;
        }
        self.deck.advance()
    }

    pub fn retreat(&mut self) -> DeckTransition {
        if !self.state.is_ready() {
            return DeckTransition::Unchanged;
        }
        self.deck.retreat()
    }

    pub fn autoplay_tick(&mut self) -> DeckTransition {
        if !self.state.is_ready() {
            return DeckTransition::Unchanged;
        }
        self.deck.autoplay_tick()
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.deck.toggle_pause()
    }

    pub fn set_paused(&mut self, paused: bool) -> bool {
        self.deck.set_paused(paused)
    }

    pub fn toggle_music(&mut self) -> bool {
        self.music_enabled = !self.music_enabled;
        self.music_enabled
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            generation: self.generation,
            state: self.state.clone(),
            phase: self.state.phase(),
            phase_trail: self.phase_trail.clone(),
            request: self.request.clone(),
            handle: self.handle.clone(),
            cursor: self.deck.cursor(),
            slide: self.deck.current_kind(),
            paused: self.deck.is_paused(),
            music_enabled: self.music_enabled,
            autoplay_armed: self.autoplay_armed(),
            navigation_enabled: self.state.is_ready(),
        }
    }

    fn begin_attempt(&mut self) -> Option<AttemptTicket> {
        let request = self.request.clone()?;
        self.generation += 1;
        self.handle = None;
        self.last_warmup = None;
        self.phase_trail.clear();
        self.enter(SessionState::Starting);
        self.deck.show_loading();
        info!(
            generation = self.generation,
            request = %request,
            "session: attempt started"
        );
        Some(AttemptTicket {
            generation: self.generation,
            request,
        })
    }

    fn enter(&mut self, state: SessionState) {
        if let Some(phase) = state.phase() {
            if self.phase_trail.last() != Some(&phase) {
                self.phase_trail.push(phase);
            }
        }
        debug!(from = self.state.tag(), to = state.tag(), "session: transition");
        self.state = state;
    }

    fn clear_attempt(&mut self) {
        self.request = None;
        self.handle = None;
        self.last_warmup = None;
        self.phase_trail.clear();
        self.state = SessionState::Idle;
    }
}

impl Default for RewindSession {
    fn default() -> Self {
        Self::new(DeckLayout::standard())
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
