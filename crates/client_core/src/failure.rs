//! Terminal failure modeling: every failed attempt collapses into one categorized message.

use shared::error::ErrorCode;

use crate::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    NotFound,
    Unauthorized,
    RateLimited,
    NoEligibleMatches,
    Network,
    Timeout,
    MissingSession,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    category: FailureCategory,
    message: String,
    detail: String,
}

impl SessionFailure {
    pub fn from_gateway(err: &GatewayError) -> Self {
        let detail = err.to_string();
        let category = match err {
            GatewayError::MissingHandle => FailureCategory::MissingSession,
            GatewayError::Timeout { .. } => FailureCategory::Timeout,
            GatewayError::Rejected {
                status,
                code,
                message,
            } => code.and_then(category_for_code).unwrap_or_else(|| match status {
                404 => FailureCategory::NotFound,
                401 | 403 => FailureCategory::Unauthorized,
                429 => FailureCategory::RateLimited,
                _ => classify_message(message),
            }),
            GatewayError::Backend { message } => classify_message(message),
            GatewayError::Transport(message) => match classify_message(message) {
                FailureCategory::Unknown => FailureCategory::Network,
                category => category,
            },
            GatewayError::Decode(_) => FailureCategory::Unknown,
        };
        Self::new(category, detail)
    }

    pub fn from_message(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        Self::new(classify_message(&detail), detail)
    }

    fn new(category: FailureCategory, detail: String) -> Self {
        let message = match category {
            FailureCategory::NotFound => {
                "Player not found; check the Riot ID and region.".to_string()
            }
            FailureCategory::Unauthorized => {
                "The analytics service refused the request; try again later.".to_string()
            }
            FailureCategory::RateLimited => {
                "Too many lookups right now; wait a moment and retry.".to_string()
            }
            FailureCategory::NoEligibleMatches => {
                "No eligible matches were found for this season.".to_string()
            }
            FailureCategory::Network => {
                "Analytics service unreachable; check your connection and retry.".to_string()
            }
            FailureCategory::Timeout => {
                "Your rewind is taking too long to prepare; retry in a moment.".to_string()
            }
            FailureCategory::MissingSession => {
                "The analytics service did not start a session; please resubmit.".to_string()
            }
            FailureCategory::Unknown => format!("Something went wrong: {detail}"),
        };

        Self {
            category,
            message,
            detail,
        }
    }

    pub fn category(&self) -> FailureCategory {
        self.category
    }

    /// User-facing sentence for the failure modal.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// The modal always offers retry alongside dismiss.
    pub fn can_retry(&self) -> bool {
        true
    }
}

/// Backend error codes that name a category outright. `Validation` and `Internal` say
/// nothing user-facing, so those fall through to status and message.
fn category_for_code(code: ErrorCode) -> Option<FailureCategory> {
    match code {
        ErrorCode::NotFound => Some(FailureCategory::NotFound),
        ErrorCode::Unauthorized | ErrorCode::Forbidden => Some(FailureCategory::Unauthorized),
        ErrorCode::RateLimited => Some(FailureCategory::RateLimited),
        ErrorCode::NoEligibleMatches => Some(FailureCategory::NoEligibleMatches),
        ErrorCode::Validation | ErrorCode::Internal => None,
    }
}

/// Best-effort keyword classification of free-form error text.
pub fn classify_message(message: &str) -> FailureCategory {
    let lower = message.to_ascii_lowercase();
    if lower.contains("no eligible")
        || lower.contains("no matches")
        || lower.contains("no ranked")
        || lower.contains("not enough games")
    {
        FailureCategory::NoEligibleMatches
    } else if lower.contains("not found") || lower.contains("404") || lower.contains("unknown player")
    {
        FailureCategory::NotFound
    } else if lower.contains("rate limit")
        || lower.contains("rate-limit")
        || lower.contains("too many requests")
        || lower.contains("429")
    {
        FailureCategory::RateLimited
    } else if lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("401")
        || lower.contains("403")
        || lower.contains("api key")
    {
        FailureCategory::Unauthorized
    } else if lower.contains("timed out") || lower.contains("timeout") {
        FailureCategory::Timeout
    } else if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("unreachable")
        || lower.contains("failed to connect")
    {
        FailureCategory::Network
    } else {
        FailureCategory::Unknown
    }
}
