//! Versioned art lookup against a Data Dragon style CDN.
//!
//! The champion index is fetched on first use and kept for the lifetime of the
//! [`AssetIndex`]; a failed fetch is not remembered, so the next caller tries again.

use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::ClientSettings;

/// Display names whose CDN key is not simply the name with punctuation removed.
const IRREGULAR_CHAMPION_KEYS: &[(&str, &str)] = &[
    ("wukong", "MonkeyKing"),
    ("nunu & willump", "Nunu"),
    ("renata glasc", "Renata"),
    ("cho'gath", "Chogath"),
    ("kai'sa", "Kaisa"),
    ("kha'zix", "Khazix"),
    ("vel'koz", "Velkoz"),
    ("bel'veth", "Belveth"),
    ("leblanc", "Leblanc"),
    ("dr. mundo", "DrMundo"),
    ("kog'maw", "KogMaw"),
    ("rek'sai", "RekSai"),
    ("k'sante", "KSante"),
    ("jarvan iv", "JarvanIV"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChampionIndex {
    version: String,
    // lowercase id or display name -> canonical id
    keys: HashMap<String, String>,
    champions: usize,
}

impl ChampionIndex {
    pub fn new<I, S>(version: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut keys = HashMap::new();
        let mut champions = 0;
        for (id, name) in entries {
            let id = id.into();
            keys.insert(name.into().to_lowercase(), id.clone());
            keys.insert(id.to_lowercase(), id);
            champions += 1;
        }
        Self {
            version: version.into(),
            keys,
            champions,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn canonical(&self, key: &str) -> Option<&str> {
        self.keys.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.champions
    }

    pub fn is_empty(&self) -> bool {
        self.champions == 0
    }
}

/// Maps a champion display name to its CDN key without consulting the index.
pub fn normalize_champion_name(name: &str) -> String {
    let lookup = name.trim().to_lowercase();
    if let Some((_, key)) = IRREGULAR_CHAMPION_KEYS
        .iter()
        .find(|(display, _)| *display == lookup)
    {
        return (*key).to_string();
    }
    name.chars().filter(|c| c.is_ascii_alphabetic()).collect()
}

#[derive(Deserialize)]
struct ChampionFile {
    data: HashMap<String, ChampionEntry>,
}

#[derive(Deserialize)]
struct ChampionEntry {
    id: String,
    name: String,
}

pub struct AssetIndex {
    http: Client,
    cdn_url: String,
    locale: String,
    index: OnceCell<ChampionIndex>,
}

impl AssetIndex {
    pub fn new(cdn_url: &str, locale: &str, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build asset http client")?;
        Ok(Self {
            http,
            cdn_url: cdn_url.trim_end_matches('/').to_string(),
            locale: locale.to_string(),
            index: OnceCell::new(),
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Self::new(
            &settings.cdn_url,
            &settings.asset_locale,
            settings.request_timeout,
        )
    }

    /// An index that never touches the network.
    pub fn preloaded(cdn_url: &str, index: ChampionIndex) -> Self {
        Self {
            http: Client::new(),
            cdn_url: cdn_url.trim_end_matches('/').to_string(),
            locale: "en_US".to_string(),
            index: OnceCell::new_with(Some(index)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.index.initialized()
    }

    pub async fn index(&self) -> Result<&ChampionIndex> {
        self.index.get_or_try_init(|| self.fetch_index()).await
    }

    async fn fetch_index(&self) -> Result<ChampionIndex> {
        let versions: Vec<String> = self
            .http
            .get(format!("{}/api/versions.json", self.cdn_url))
            .send()
            .await
            .context("failed to fetch asset versions")?
            .error_for_status()
            .context("asset versions request rejected")?
            .json()
            .await
            .context("malformed asset versions list")?;
        let version = versions
            .into_iter()
            .next()
            .context("asset versions list is empty")?;

        let champions: ChampionFile = self
            .http
            .get(format!(
                "{}/cdn/{version}/data/{}/champion.json",
                self.cdn_url, self.locale
            ))
            .send()
            .await
            .context("failed to fetch champion index")?
            .error_for_status()
            .context("champion index request rejected")?
            .json()
            .await
            .context("malformed champion index")?;

        let index = ChampionIndex::new(
            version,
            champions
                .data
                .into_values()
                .map(|entry| (entry.id, entry.name)),
        );
        info!(
            version = index.version(),
            champions = index.len(),
            "assets: champion index loaded"
        );
        Ok(index)
    }

    /// Canonical key for a champion; uses the index when it is already loaded, never fetches it.
    pub fn champion_key(&self, name: &str) -> String {
        let normalized = normalize_champion_name(name);
        match self.index.get() {
            Some(index) => index
                .canonical(&normalized)
                .or_else(|| index.canonical(name.trim()))
                .map(str::to_string)
                .unwrap_or(normalized),
            None => normalized,
        }
    }

    pub async fn champion_icon_url(&self, name: &str) -> Result<String> {
        let index = self.index().await?;
        let key = self.champion_key(name);
        Ok(format!(
            "{}/cdn/{}/img/champion/{key}.png",
            self.cdn_url,
            index.version()
        ))
    }

    /// Splash art is unversioned.
    pub fn champion_splash_url(&self, name: &str) -> String {
        format!(
            "{}/cdn/img/champion/splash/{}_0.jpg",
            self.cdn_url,
            self.champion_key(name)
        )
    }

    pub async fn profile_icon_url(&self, icon_id: u32) -> Result<String> {
        let index = self.index().await?;
        Ok(format!(
            "{}/cdn/{}/img/profileicon/{icon_id}.png",
            self.cdn_url,
            index.version()
        ))
    }
}

#[cfg(test)]
#[path = "tests/assets_tests.rs"]
mod tests;
