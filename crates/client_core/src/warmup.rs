//! Best-effort media preloading before the first slide is revealed.
//!
//! Warmup never fails: broken URLs are recorded in the [`WarmupReport`] and counted as
//! loaded so progress always reaches its total.

use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{stream::FuturesUnordered, StreamExt};
use reqwest::Client;
use shared::domain::SessionResult;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{assets::AssetIndex, config::ClientSettings};

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<()>;
}

pub struct HttpMediaFetcher {
    http: Client,
}

impl HttpMediaFetcher {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build media http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("media request rejected for {url}"))?;
        response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmupOutcome {
    Loaded,
    AlreadyCached,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupItem {
    pub url: String,
    pub outcome: WarmupOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    pub items: Vec<WarmupItem>,
}

impl WarmupReport {
    pub fn attempted(&self) -> usize {
        self.items.len()
    }

    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|item| !matches!(item.outcome, WarmupOutcome::Failed(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }
}

pub struct MediaWarmupCache {
    fetcher: Arc<dyn MediaFetcher>,
    assets: Arc<AssetIndex>,
    static_art: Vec<String>,
    batch_width: usize,
    warmed: Mutex<HashSet<String>>,
}

impl MediaWarmupCache {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        assets: Arc<AssetIndex>,
        static_art: Vec<String>,
        batch_width: usize,
    ) -> Self {
        Self {
            fetcher,
            assets,
            static_art,
            batch_width: batch_width.max(1),
            warmed: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_settings(
        settings: &ClientSettings,
        fetcher: Arc<dyn MediaFetcher>,
        assets: Arc<AssetIndex>,
    ) -> Self {
        Self::new(
            fetcher,
            assets,
            settings.static_art.clone(),
            settings.warmup_batch_width,
        )
    }

    /// Every image the result references, de-duplicated by final URL in first-seen order.
    pub async fn collect_urls(&self, result: &SessionResult) -> Vec<String> {
        let analytics = &result.analytics;
        let mut icon_ids: Vec<u32> = result
            .player
            .iter()
            .filter_map(|player| player.profile_icon_id)
            .collect();
        icon_ids.extend(
            analytics
                .leaderboard
                .iter()
                .flatten()
                .filter_map(|entry| entry.profile_icon_id),
        );
        let champions = analytics.champion_names();

        let mut urls = Vec::new();
        if !icon_ids.is_empty() || !champions.is_empty() {
            // Resolve the index first so splash keys are canonical too.
            let index_ready = match self.assets.index().await {
                Ok(_) => true,
                Err(err) => {
                    warn!(error = %err, "warmup: asset index unavailable; skipping versioned art");
                    false
                }
            };

            if index_ready {
                for id in &icon_ids {
                    if let Ok(url) = self.assets.profile_icon_url(*id).await {
                        urls.push(url);
                    }
                }
            }
            for name in &champions {
                if index_ready {
                    if let Ok(url) = self.assets.champion_icon_url(name).await {
                        urls.push(url);
                    }
                }
                urls.push(self.assets.champion_splash_url(name));
            }
        }
        urls.extend(self.static_art.iter().cloned());

        let mut seen = HashSet::new();
        urls.retain(|url| seen.insert(url.clone()));
        urls
    }

    /// Fetches every referenced image in batches of `batch_width`, reporting `(loaded, total)`
    /// after each one.
    pub async fn warm<F>(&self, result: &SessionResult, mut on_progress: F) -> WarmupReport
    where
        F: FnMut(usize, usize) + Send,
    {
        let urls = self.collect_urls(result).await;
        let total = urls.len();
        let mut report = WarmupReport::default();
        if total == 0 {
            debug!("warmup: nothing to preload");
            return report;
        }

        let mut loaded = 0;
        for batch in urls.chunks(self.batch_width) {
            let already: HashSet<String> = {
                let warmed = self.warmed.lock().await;
                batch
                    .iter()
                    .filter(|url| warmed.contains(*url))
                    .cloned()
                    .collect()
            };

            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .map(|url| {
                    let fetcher = Arc::clone(&self.fetcher);
                    let cached = already.contains(url);
                    async move {
                        if cached {
                            return (url, WarmupOutcome::AlreadyCached);
                        }
                        match fetcher.fetch(url).await {
                            Ok(()) => (url, WarmupOutcome::Loaded),
                            Err(err) => (url, WarmupOutcome::Failed(format!("{err:#}"))),
                        }
                    }
                })
                .collect();

            while let Some((url, outcome)) = pending.next().await {
                match &outcome {
                    WarmupOutcome::Loaded => {
                        self.warmed.lock().await.insert(url.clone());
                    }
                    WarmupOutcome::Failed(reason) => {
                        debug!(url = %url, reason = %reason, "warmup: image failed");
                    }
                    WarmupOutcome::AlreadyCached => {}
                }
                loaded += 1;
                on_progress(loaded, total);
                report.items.push(WarmupItem {
                    url: url.clone(),
                    outcome,
                });
            }
            debug!(loaded, total, "warmup: batch complete");
        }

        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "warmup: finished"
        );
        report
    }
}

#[cfg(test)]
#[path = "tests/warmup_tests.rs"]
mod tests;
