use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::{AnalyticsBundle, PlayerSummary};

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id_newtype!(SessionId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionRequestError {
    #[error("identity name must not be empty")]
    EmptyIdentityName,
    #[error("identity tag must not be empty")]
    EmptyIdentityTag,
    #[error("region must not be empty")]
    EmptyRegion,
    #[error("riot id must look like Name#TAG")]
    MalformedRiotId,
}

/// Lookup submitted by the user. Fields are trimmed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawSessionRequest")]
pub struct SessionRequest {
    identity_name: String,
    identity_tag: String,
    region: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSessionRequest {
    identity_name: String,
    identity_tag: String,
    region: String,
}

impl TryFrom<RawSessionRequest> for SessionRequest {
    type Error = SessionRequestError;

    fn try_from(raw: RawSessionRequest) -> Result<Self, Self::Error> {
        Self::new(raw.identity_name, raw.identity_tag, raw.region)
    }
}

impl SessionRequest {
    pub fn new(
        identity_name: impl AsRef<str>,
        identity_tag: impl AsRef<str>,
        region: impl AsRef<str>,
    ) -> Result<Self, SessionRequestError> {
        let identity_name = identity_name.as_ref().trim();
        let identity_tag = identity_tag.as_ref().trim().trim_start_matches('#').trim();
        let region = region.as_ref().trim();

        if identity_name.is_empty() {
            return Err(SessionRequestError::EmptyIdentityName);
        }
        if identity_tag.is_empty() {
            return Err(SessionRequestError::EmptyIdentityTag);
        }
        if region.is_empty() {
            return Err(SessionRequestError::EmptyRegion);
        }

        Ok(Self {
            identity_name: identity_name.to_string(),
            identity_tag: identity_tag.to_string(),
            region: region.to_string(),
        })
    }

    /// Splits a combined `Name#TAG` id.
    pub fn parse_riot_id(
        riot_id: &str,
        region: impl AsRef<str>,
    ) -> Result<Self, SessionRequestError> {
        let (name, tag) = riot_id
            .rsplit_once('#')
            .ok_or(SessionRequestError::MalformedRiotId)?;
        Self::new(name, tag, region)
    }

    pub fn identity_name(&self) -> &str {
        &self.identity_name
    }

    pub fn identity_tag(&self) -> &str {
        &self.identity_tag
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}

impl fmt::Display for SessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({})", self.identity_name, self.identity_tag, self.region)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: SessionId,
}

impl SessionHandle {
    /// Returns `None` for a missing or blank id.
    pub fn from_raw(session_id: Option<&str>) -> Option<Self> {
        let id = session_id?.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            session_id: SessionId(id.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingPhase {
    Searching,
    Found,
    Analyzing,
    Caching,
    Ready,
}

impl LoadingPhase {
    pub const ALL: [LoadingPhase; 5] = [
        LoadingPhase::Searching,
        LoadingPhase::Found,
        LoadingPhase::Analyzing,
        LoadingPhase::Caching,
        LoadingPhase::Ready,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LoadingPhase::Searching => "searching",
            LoadingPhase::Found => "found",
            LoadingPhase::Analyzing => "analyzing",
            LoadingPhase::Caching => "caching",
            LoadingPhase::Ready => "ready",
        }
    }

    /// Backend phase names are advisory; anything unrecognized reads as `Analyzing`.
    pub fn from_backend(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.parse().ok())
            .unwrap_or(LoadingPhase::Analyzing)
    }
}

impl FromStr for LoadingPhase {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "searching" => Ok(LoadingPhase::Searching),
            "found" => Ok(LoadingPhase::Found),
            "analyzing" | "analysing" => Ok(LoadingPhase::Analyzing),
            "caching" => Ok(LoadingPhase::Caching),
            "ready" => Ok(LoadingPhase::Ready),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LoadingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub analytics: AnalyticsBundle,
    pub player: Option<PlayerSummary>,
}
