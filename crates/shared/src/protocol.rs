use serde::{Deserialize, Serialize};

use crate::{
    analytics::{AnalyticsBundle, PlayerSummary},
    domain::SessionRequest,
};

/// Body of `POST /start`.
pub type StartSessionRequest = SessionRequest;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub player: Option<PlayerSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollStatus {
    Processing,
    Complete,
    Failed,
}

/// Body of `GET /session/{sessionId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub status: PollStatus,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub analytics: Option<AnalyticsBundle>,
    #[serde(default)]
    pub player: Option<PlayerSummary>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PollResponse {
    pub fn processing(phase: impl Into<String>) -> Self {
        Self {
            status: PollStatus::Processing,
            phase: Some(phase.into()),
            analytics: None,
            player: None,
            error: None,
        }
    }

    pub fn complete(analytics: AnalyticsBundle) -> Self {
        Self {
            status: PollStatus::Complete,
            phase: None,
            analytics: Some(analytics),
            player: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: PollStatus::Failed,
            phase: None,
            analytics: None,
            player: None,
            error: Some(error.into()),
        }
    }
}
