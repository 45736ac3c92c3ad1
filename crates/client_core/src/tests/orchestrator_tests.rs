use super::*;
use crate::{
    assets::{AssetIndex, ChampionIndex},
    failure::FailureCategory,
    warmup::MediaFetcher,
    SessionStart,
};
use async_trait::async_trait;
use shared::{
    analytics::{AnalyticsBundle, ChampionStat, PlayerSummary},
    domain::SessionId,
    protocol::PollResponse,
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};
use tokio::time::{sleep, timeout};

const CDN: &str = "https://cdn.example.net";

/// Scripted replies; the last entry of each script repeats once it is reached.
struct ScriptedGateway {
    starts: Mutex<VecDeque<Result<SessionStart, GatewayError>>>,
    polls: Mutex<VecDeque<PollResponse>>,
    start_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl ScriptedGateway {
    fn new(
        starts: Vec<Result<SessionStart, GatewayError>>,
        polls: Vec<PollResponse>,
    ) -> Arc<Self> {
        Arc::new(Self {
            starts: Mutex::new(starts.into()),
            polls: Mutex::new(polls.into()),
            start_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
        })
    }

    fn next<T: Clone>(script: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut script = script.lock().expect("script lock");
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl GatewayClient for ScriptedGateway {
    async fn start_session(&self, _request: &SessionRequest) -> Result<SessionStart, GatewayError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.starts).unwrap_or(Err(GatewayError::MissingHandle))
    }

    async fn poll_session(&self, _handle: &SessionHandle) -> Result<PollResponse, GatewayError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::next(&self.polls).unwrap_or_else(|| PollResponse::processing("analyzing")))
    }
}

#[derive(Default)]
struct CountingFetcher {
    fetched: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for CountingFetcher {
    async fn fetch(&self, _url: &str) -> anyhow::Result<()> {
        self.fetched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Holds every image for a few seconds so an attempt stays in `Warming`.
#[derive(Default)]
struct SlowFetcher {
    fetched: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for SlowFetcher {
    async fn fetch(&self, _url: &str) -> anyhow::Result<()> {
        sleep(Duration::from_secs(5)).await;
        self.fetched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn started(id: &str) -> Result<SessionStart, GatewayError> {
    Ok(SessionStart {
        handle: SessionHandle {
            session_id: SessionId(id.to_string()),
        },
        player: Some(PlayerSummary {
            game_name: "Foo".into(),
            tag_line: "NA1".into(),
            profile_icon_id: Some(29),
            summoner_level: Some(301),
        }),
    })
}

fn completed() -> PollResponse {
    PollResponse::complete(AnalyticsBundle {
        favorite_champions: Some(vec![ChampionStat {
            champion_name: "Ahri".into(),
            games: 40,
            wins: 22,
            kills: 0,
            deaths: 0,
            assists: 0,
        }]),
        ..AnalyticsBundle::default()
    })
}

fn deps_with(
    gateway: Arc<ScriptedGateway>,
    fetcher: Arc<dyn MediaFetcher>,
    max_attempts: u32,
) -> OrchestratorDeps {
    let assets = Arc::new(AssetIndex::preloaded(
        CDN,
        ChampionIndex::new("14.24.1", [("Ahri", "Ahri")]),
    ));
    OrchestratorDeps {
        gateway,
        warmup: Arc::new(MediaWarmupCache::new(fetcher, assets, Vec::new(), 10)),
        poll_policy: PollPolicy {
            interval: Duration::from_secs(1),
            max_attempts,
        },
        autoplay_period: Duration::from_secs(10),
        layout: DeckLayout::standard(),
    }
}

fn deps(gateway: Arc<ScriptedGateway>) -> OrchestratorDeps {
    deps_with(gateway, Arc::new(CountingFetcher::default()), 150)
}

fn request() -> SessionRequest {
    SessionRequest::new("Foo", "NA1", "na1").expect("valid request")
}

async fn ready(handle: &OrchestratorHandle) -> OrchestratorSnapshot {
    handle
        .wait_for(|snapshot| snapshot.state.is_ready())
        .await
        .expect("orchestrator alive")
}

#[tokio::test(start_paused = true)]
async fn successful_rewind_lands_on_first_content_slide() {
    let gateway = ScriptedGateway::new(
        vec![started("abc")],
        vec![
            PollResponse::processing("found"),
            PollResponse::processing("analyzing"),
            completed(),
        ],
    );
    let fetcher = Arc::new(CountingFetcher::default());
    let handle = Orchestrator::spawn(deps_with(gateway.clone(), fetcher.clone(), 150));

    handle.submit(request()).await.expect("submit");
    let snapshot = ready(&handle).await;

    assert_eq!(
        snapshot.phase_trail,
        vec![
            LoadingPhase::Searching,
            LoadingPhase::Found,
            LoadingPhase::Analyzing,
            LoadingPhase::Caching,
            LoadingPhase::Ready,
        ]
    );
    assert_eq!(snapshot.cursor.index, 2);
    assert_eq!(snapshot.slide, Some(SlideKind::Welcome));
    assert!(snapshot.navigation_enabled);
    assert!(snapshot.autoplay_armed);
    assert_eq!(
        snapshot.handle.map(|handle| handle.session_id),
        Some(SessionId("abc".into()))
    );
    let result = snapshot.state.result().expect("result");
    assert_eq!(
        result.player.as_ref().map(|player| player.game_name.as_str()),
        Some("Foo")
    );
    assert_eq!(gateway.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 3);
    // profile icon, champion icon and splash
    assert_eq!(fetcher.fetched.load(Ordering::SeqCst), 3);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn autoplay_advances_after_one_period() {
    let gateway = ScriptedGateway::new(vec![started("abc")], vec![completed()]);
    let handle = Orchestrator::spawn(deps(gateway));

    handle.submit(request()).await.expect("submit");
    ready(&handle).await;

    sleep(Duration::from_secs(9)).await;
    assert_eq!(handle.snapshot().cursor.index, 2);

    let moved = timeout(
        Duration::from_secs(2),
        handle.wait_for(|snapshot| snapshot.cursor.index == 3),
    )
    .await
    .expect("autoplay within the period")
    .expect("orchestrator alive");
    assert_eq!(moved.slide, Some(SlideKind::TimeSpent));
}

#[tokio::test(start_paused = true)]
async fn manual_advance_restarts_the_countdown() {
    let gateway = ScriptedGateway::new(vec![started("abc")], vec![completed()]);
    let handle = Orchestrator::spawn(deps(gateway));

    handle.submit(request()).await.expect("submit");
    ready(&handle).await;

    sleep(Duration::from_secs(8)).await;
    handle.advance().await.expect("advance");
    handle
        .wait_for(|snapshot| snapshot.cursor.index == 3)
        .await
        .expect("orchestrator alive");

    // The old deadline would have fired two seconds after the advance.
    sleep(Duration::from_secs(9)).await;
    assert_eq!(handle.snapshot().cursor.index, 3);

    timeout(
        Duration::from_secs(2),
        handle.wait_for(|snapshot| snapshot.cursor.index == 4),
    )
    .await
    .expect("autoplay one full period after the advance")
    .expect("orchestrator alive");
}

#[tokio::test(start_paused = true)]
async fn resuming_starts_a_fresh_period() {
    let gateway = ScriptedGateway::new(vec![started("abc")], vec![completed()]);
    let handle = Orchestrator::spawn(deps(gateway));

    handle.submit(request()).await.expect("submit");
    ready(&handle).await;
    handle.set_paused(true).await.expect("pause");
    handle
        .wait_for(|snapshot| snapshot.paused)
        .await
        .expect("orchestrator alive");

    sleep(Duration::from_secs(7)).await;
    handle.set_paused(false).await.expect("resume");
    let resumed = handle
        .wait_for(|snapshot| !snapshot.paused)
        .await
        .expect("orchestrator alive");
    assert!(resumed.autoplay_armed);

    sleep(Duration::from_secs(9)).await;
    assert_eq!(handle.snapshot().cursor.index, 2);

    timeout(
        Duration::from_secs(2),
        handle.wait_for(|snapshot| snapshot.cursor.index == 3),
    )
    .await
    .expect("autoplay one full period after resuming")
    .expect("orchestrator alive");
}

#[tokio::test(start_paused = true)]
async fn paused_deck_never_autoplays_but_accepts_manual_navigation() {
    let gateway = ScriptedGateway::new(vec![started("abc")], vec![completed()]);
    let handle = Orchestrator::spawn(deps(gateway));

    handle.submit(request()).await.expect("submit");
    ready(&handle).await;
    handle.toggle_pause().await.expect("pause");
    let paused = handle
        .wait_for(|snapshot| snapshot.paused)
        .await
        .expect("orchestrator alive");
    assert!(!paused.autoplay_armed);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(handle.snapshot().cursor.index, 2);

    handle.advance().await.expect("advance");
    let advanced = handle
        .wait_for(|snapshot| snapshot.cursor.index == 3)
        .await
        .expect("orchestrator alive");
    assert!(advanced.paused);
}

#[tokio::test(start_paused = true)]
async fn navigation_is_ignored_while_loading() {
    let gateway = ScriptedGateway::new(
        vec![started("abc")],
        vec![PollResponse::processing("analyzing")],
    );
    let handle = Orchestrator::spawn(deps(gateway));

    handle.submit(request()).await.expect("submit");
    handle
        .wait_for(|snapshot| snapshot.phase == Some(LoadingPhase::Analyzing))
        .await
        .expect("orchestrator alive");

    handle.advance().await.expect("advance");
    handle.toggle_music().await.expect("music");
    // Commands apply in order, so the advance has been handled once music flips.
    let snapshot = handle
        .wait_for(|snapshot| !snapshot.music_enabled)
        .await
        .expect("orchestrator alive");
    assert_eq!(snapshot.cursor.index, 1);
    assert!(!snapshot.navigation_enabled);
}

#[tokio::test(start_paused = true)]
async fn restart_mid_poll_discards_the_attempt() {
    let gateway = ScriptedGateway::new(
        vec![started("abc")],
        vec![PollResponse::processing("analyzing")],
    );
    let handle = Orchestrator::spawn(deps(gateway.clone()));

    handle.submit(request()).await.expect("submit");
    let polling = handle
        .wait_for(|snapshot| snapshot.phase == Some(LoadingPhase::Analyzing))
        .await
        .expect("orchestrator alive");

    handle.restart().await.expect("restart");
    let restarted = handle
        .wait_for(|snapshot| snapshot.state == SessionState::Idle)
        .await
        .expect("orchestrator alive");
    assert!(restarted.generation > polling.generation);
    let polls_at_restart = gateway.poll_calls.load(Ordering::SeqCst);

    sleep(Duration::from_secs(30)).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.handle.is_none());
    assert!(snapshot.phase_trail.is_empty());
    assert_eq!(snapshot.cursor.index, 0);
    assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), polls_at_restart);
}

#[tokio::test(start_paused = true)]
async fn restart_while_warming_discards_late_progress() {
    let gateway = ScriptedGateway::new(vec![started("abc")], vec![completed()]);
    let fetcher = Arc::new(SlowFetcher::default());
    let handle = Orchestrator::spawn(deps_with(gateway, fetcher.clone(), 150));

    handle.submit(request()).await.expect("submit");
    let warming = handle
        .wait_for(|snapshot| matches!(snapshot.state, SessionState::Warming { .. }))
        .await
        .expect("orchestrator alive");

    handle.restart().await.expect("restart");
    let restarted = handle
        .wait_for(|snapshot| snapshot.state == SessionState::Idle)
        .await
        .expect("orchestrator alive");
    assert!(restarted.generation > warming.generation);

    sleep(Duration::from_secs(30)).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.generation, restarted.generation);
    assert!(snapshot.handle.is_none());
    assert!(snapshot.phase_trail.is_empty());
    assert_eq!(snapshot.cursor.index, 0);
    assert!(!snapshot.autoplay_armed);
    // The aborted warmup never finished a single image.
    assert_eq!(fetcher.fetched.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn restart_while_ready_cancels_the_pending_countdown() {
    let gateway = ScriptedGateway::new(vec![started("abc")], vec![completed()]);
    let handle = Orchestrator::spawn(deps(gateway));

    handle.submit(request()).await.expect("submit");
    ready(&handle).await;
    sleep(Duration::from_secs(5)).await;

    handle.restart().await.expect("restart");
    handle
        .wait_for(|snapshot| snapshot.state == SessionState::Idle)
        .await
        .expect("orchestrator alive");

    sleep(Duration::from_secs(30)).await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert_eq!(snapshot.cursor.index, 0);
    assert!(!snapshot.autoplay_armed);
}

#[tokio::test(start_paused = true)]
async fn missing_handle_fails_then_retry_and_acknowledge() {
    let gateway = ScriptedGateway::new(vec![Err(GatewayError::MissingHandle)], Vec::new());
    let handle = Orchestrator::spawn(deps(gateway.clone()));

    handle.submit(request()).await.expect("submit");
    let failed = handle
        .wait_for(|snapshot| matches!(snapshot.state, SessionState::Failed(_)))
        .await
        .expect("orchestrator alive");
    let failure = failed.state.failure().expect("failure");
    assert_eq!(failure.category(), FailureCategory::MissingSession);
    assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 0);

    handle.retry().await.expect("retry");
    handle
        .wait_for(|snapshot| {
            snapshot.generation > failed.generation
                && matches!(snapshot.state, SessionState::Failed(_))
        })
        .await
        .expect("orchestrator alive");
    assert_eq!(gateway.start_calls.load(Ordering::SeqCst), 2);

    handle.acknowledge().await.expect("acknowledge");
    let idle = handle
        .wait_for(|snapshot| snapshot.state == SessionState::Idle)
        .await
        .expect("orchestrator alive");
    assert_eq!(idle.cursor.index, 0);
    assert!(idle.request.is_none());
}

#[tokio::test(start_paused = true)]
async fn retry_after_transport_failure_can_succeed() {
    let gateway = ScriptedGateway::new(
        vec![
            Err(GatewayError::Transport("connection refused".into())),
            started("abc"),
        ],
        vec![completed()],
    );
    let handle = Orchestrator::spawn(deps(gateway));

    handle.submit(request()).await.expect("submit");
    let failed = handle
        .wait_for(|snapshot| matches!(snapshot.state, SessionState::Failed(_)))
        .await
        .expect("orchestrator alive");
    assert_eq!(
        failed.state.failure().map(|failure| failure.category()),
        Some(FailureCategory::Network)
    );

    handle.retry().await.expect("retry");
    let snapshot = ready(&handle).await;
    assert_eq!(snapshot.request, Some(request()));
}

#[tokio::test(start_paused = true)]
async fn exhausted_poll_budget_is_a_timeout_failure() {
    let gateway = ScriptedGateway::new(
        vec![started("abc")],
        vec![PollResponse::processing("analyzing")],
    );
    let handle = Orchestrator::spawn(deps_with(
        gateway.clone(),
        Arc::new(CountingFetcher::default()),
        3,
    ));

    handle.submit(request()).await.expect("submit");
    let failed = handle
        .wait_for(|snapshot| matches!(snapshot.state, SessionState::Failed(_)))
        .await
        .expect("orchestrator alive");

    assert_eq!(
        failed.state.failure().map(|failure| failure.category()),
        Some(FailureCategory::Timeout)
    );
    assert_eq!(gateway.poll_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn music_survives_restart() {
    let gateway = ScriptedGateway::new(vec![started("abc")], vec![completed()]);
    let handle = Orchestrator::spawn(deps(gateway));

    handle.toggle_music().await.expect("music");
    handle.submit(request()).await.expect("submit");
    ready(&handle).await;
    handle.set_paused(true).await.expect("pause");
    handle.restart().await.expect("restart");

    let snapshot = handle
        .wait_for(|snapshot| snapshot.state == SessionState::Idle)
        .await
        .expect("orchestrator alive");
    assert!(!snapshot.music_enabled);
    assert!(!snapshot.paused);
}

#[tokio::test]
async fn handle_reports_closed_after_shutdown() {
    let gateway = ScriptedGateway::new(vec![started("abc")], vec![completed()]);
    let handle = Orchestrator::spawn(deps(gateway));
    let mut updates = handle.subscribe();

    handle.shutdown().await.expect("shutdown");

    assert!(updates.changed().await.is_err());
}
