use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    analytics::PlayerSummary,
    domain::{LoadingPhase, SessionHandle, SessionRequest, SessionResult},
    error::{ApiError, ErrorCode},
    protocol::{PollResponse, PollStatus, StartSessionResponse},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub mod assets;
pub mod config;
pub mod deck;
pub mod failure;
pub mod orchestrator;
pub mod session;
pub mod warmup;

pub use assets::AssetIndex;
pub use config::{load_settings, ClientSettings};
pub use deck::{DeckController, DeckLayout, DeckTransition, SlideCursor, SlideKind, SubPhase};
pub use failure::{FailureCategory, SessionFailure};
pub use orchestrator::{
    Orchestrator, OrchestratorClosed, OrchestratorCommand, OrchestratorDeps, OrchestratorHandle,
    OrchestratorSnapshot,
};
pub use session::{RewindSession, SessionState};
pub use warmup::{HttpMediaFetcher, MediaFetcher, MediaWarmupCache, WarmupReport};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("gateway accepted the request but returned no session id")]
    MissingHandle,
    #[error("session did not complete after {attempts} poll attempts")]
    Timeout { attempts: u32 },
    #[error("gateway rejected request with status {status}: {message}")]
    Rejected {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
    #[error("backend job failed: {message}")]
    Backend { message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed gateway response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else if err.is_timeout() {
            GatewayError::Transport(format!("request timed out: {err}"))
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// What `/start` hands back: a handle to poll plus whatever player info the backend already has.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    pub handle: SessionHandle,
    pub player: Option<PlayerSummary>,
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn start_session(&self, request: &SessionRequest) -> Result<SessionStart, GatewayError>;
    async fn poll_session(&self, handle: &SessionHandle) -> Result<PollResponse, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            interval: settings.poll_interval,
            max_attempts: settings.max_poll_attempts.max(1),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

/// Polls until the job completes. Per-poll errors are retried within the same attempt budget;
/// a backend-declared failure ends the loop immediately.
pub async fn poll_until_ready<F>(
    gateway: &dyn GatewayClient,
    handle: &SessionHandle,
    policy: &PollPolicy,
    mut on_phase: F,
) -> Result<SessionResult, GatewayError>
where
    F: FnMut(LoadingPhase) + Send,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 0..max_attempts {
        debug!(
            session_id = %handle.session_id,
            attempt = attempt + 1,
            max_attempts,
            "gateway: poll attempt"
        );
        match gateway.poll_session(handle).await {
            Ok(response) => match response.status {
                PollStatus::Processing => {
                    on_phase(LoadingPhase::from_backend(response.phase.as_deref()));
                }
                PollStatus::Complete => {
                    info!(
                        session_id = %handle.session_id,
                        attempt = attempt + 1,
                        "gateway: session complete"
                    );
                    return Ok(SessionResult {
                        analytics: response.analytics.unwrap_or_default(),
                        player: response.player,
                    });
                }
                PollStatus::Failed => {
                    return Err(GatewayError::Backend {
                        message: response
                            .error
                            .unwrap_or_else(|| "analysis failed".to_string()),
                    });
                }
            },
            Err(err) => {
                warn!(
                    session_id = %handle.session_id,
                    attempt = attempt + 1,
                    error = %err,
                    "gateway: poll failed; retrying"
                );
            }
        }

        if attempt + 1 < max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(GatewayError::Timeout {
        attempts: max_attempts,
    })
}

pub struct HttpGateway {
    http: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid gateway url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("gateway url '{base_url}' cannot carry a path");
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build gateway http client")?;
        Ok(Self { http, base_url })
    }

    pub fn from_settings(settings: &ClientSettings) -> anyhow::Result<Self> {
        Self::new(&settings.gateway_url, settings.request_timeout)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

async fn rejection(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => (Some(api_error.code), api_error.message),
        Err(_) => (None, body.trim().to_string()),
    };
    GatewayError::Rejected {
        status,
        code,
        message,
    }
}

#[async_trait]
impl GatewayClient for HttpGateway {
    async fn start_session(&self, request: &SessionRequest) -> Result<SessionStart, GatewayError> {
        let response = self
            .http
            .post(self.endpoint(&["start"]))
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let body: StartSessionResponse = response.json().await?;
        let handle = SessionHandle::from_raw(body.session_id.as_deref())
            .ok_or(GatewayError::MissingHandle)?;
        info!(session_id = %handle.session_id, request = %request, "gateway: session started");
        Ok(SessionStart {
            handle,
            player: body.player,
        })
    }

    async fn poll_session(&self, handle: &SessionHandle) -> Result<PollResponse, GatewayError> {
        let response = self
            .http
            .get(self.endpoint(&["session", &handle.session_id.0]))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
