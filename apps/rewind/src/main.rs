use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    load_settings, AssetIndex, HttpGateway, HttpMediaFetcher, MediaWarmupCache, Orchestrator,
    OrchestratorCommand, OrchestratorDeps, OrchestratorSnapshot, SessionState, SlideKind, SubPhase,
};
use shared::{analytics::AnalyticsBundle, domain::SessionRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rewind", about = "Play back a season rewind in the terminal")]
struct Args {
    /// Combined `Name#TAG` id; alternative to --identity-name/--identity-tag.
    #[arg(long, conflicts_with_all = ["identity_name", "identity_tag"])]
    riot_id: Option<String>,
    #[arg(long)]
    identity_name: Option<String>,
    #[arg(long)]
    identity_tag: Option<String>,
    #[arg(long, default_value = "na1")]
    region: String,
    /// Settings file; defaults to ./rewind.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    gateway_url: Option<String>,
    #[arg(long)]
    autoplay_secs: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(OrchestratorCommand),
    Dump,
    Help,
    Quit,
}

const HELP: &str = "commands: n next, p prev, space/pause, m music, r retry, d dismiss, \
x restart, s Name#TAG [region] new lookup, j dump json, q quit";

fn build_request(args: &Args) -> Result<Option<SessionRequest>> {
    let request = match (&args.riot_id, &args.identity_name, &args.identity_tag) {
        (Some(riot_id), _, _) => Some(SessionRequest::parse_riot_id(riot_id, &args.region)?),
        (None, Some(name), Some(tag)) => Some(SessionRequest::new(name, tag, &args.region)?),
        (None, None, None) => None,
        _ => anyhow::bail!("--identity-name and --identity-tag must be given together"),
    };
    Ok(request)
}

fn parse_input(line: &str, default_region: &str) -> Result<Option<Input>> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let input = match word {
        "" => None,
        "n" | "next" => Some(Input::Command(OrchestratorCommand::Advance)),
        "p" | "prev" => Some(Input::Command(OrchestratorCommand::Retreat)),
        "pause" | "space" => Some(Input::Command(OrchestratorCommand::TogglePause)),
        "m" | "music" => Some(Input::Command(OrchestratorCommand::ToggleMusic)),
        "r" | "retry" => Some(Input::Command(OrchestratorCommand::Retry)),
        "d" | "dismiss" => Some(Input::Command(OrchestratorCommand::Acknowledge)),
        "x" | "restart" => Some(Input::Command(OrchestratorCommand::Restart)),
        "s" | "submit" => {
            let (riot_id, region) = rest.trim().split_once(' ').unwrap_or((rest.trim(), ""));
            let region = if region.trim().is_empty() {
                default_region
            } else {
                region.trim()
            };
            let request = SessionRequest::parse_riot_id(riot_id, region)
                .with_context(|| format!("cannot look up '{riot_id}'"))?;
            Some(Input::Command(OrchestratorCommand::Submit(request)))
        }
        "j" | "json" => Some(Input::Dump),
        "h" | "help" | "?" => Some(Input::Help),
        "q" | "quit" | "exit" => Some(Input::Quit),
        other => anyhow::bail!("unknown command '{other}'"),
    };
    Ok(input)
}

fn describe_slide(kind: SlideKind, analytics: &AnalyticsBundle) -> Option<String> {
    if kind.namespace().is_some_and(|namespace| !analytics.has(namespace)) {
        return Some("nothing to show here this season".to_string());
    }
    match kind {
        SlideKind::TimeSpent => analytics.time_spent.as_ref().map(|time| {
            format!(
                "{} games, {:.1} hours on the Rift",
                time.games_played, time.hours_played
            )
        }),
        SlideKind::FavoriteChampions => analytics.favorite_champions.as_ref().map(|list| {
            list.iter()
                .map(|stat| {
                    format!(
                        "{} ({} games, {:.0}% wins)",
                        stat.champion_name,
                        stat.games,
                        stat.win_rate() * 100.0
                    )
                })
                .collect::<Vec<_>>()
                .join(", ")
        }),
        SlideKind::BestMatch => analytics.best_match.as_ref().map(|best| {
            format!(
                "{} {}/{}/{} ({:.2} KDA){}",
                best.champion_name,
                best.kills,
                best.deaths,
                best.assists,
                best.kda(),
                if best.win { ", victory" } else { "" }
            )
        }),
        SlideKind::Leaderboard => analytics.leaderboard.as_ref().map(|entries| {
            entries
                .iter()
                .enumerate()
                .map(|(rank, entry)| format!("{}. {} ({:.1})", rank + 1, entry.game_name, entry.score))
                .collect::<Vec<_>>()
                .join("  ")
        }),
        SlideKind::PlayStyle => analytics.play_style.as_ref().map(|style| {
            if style.traits.is_empty() {
                style.headline.clone()
            } else {
                format!("{}: {}", style.headline, style.traits.join(", "))
            }
        }),
        SlideKind::Entry | SlideKind::Loading | SlideKind::Welcome | SlideKind::Outro => None,
    }
}

fn render(snapshot: &OrchestratorSnapshot) -> String {
    match &snapshot.state {
        SessionState::Idle => "idle: `s Name#TAG [region]` to start".to_string(),
        SessionState::Starting | SessionState::Polling { .. } => format!(
            "loading: {}",
            snapshot
                .phase
                .map(|phase| phase.as_str())
                .unwrap_or("searching")
        ),
        SessionState::Warming { loaded, total } => format!("caching media {loaded}/{total}"),
        SessionState::Failed(failure) => {
            format!("error: {} (r retry, d dismiss)", failure.message())
        }
        SessionState::Ready(result) => {
            let kind = snapshot.slide;
            let mut line = format!(
                "[{}] {}",
                snapshot.cursor.index,
                kind.map(SlideKind::title).unwrap_or("slide")
            );
            if snapshot.cursor.sub_phase == SubPhase::Commentary {
                line.push_str(" +");
            }
            if snapshot.paused {
                line.push_str(" (paused)");
            }
            let detail = match kind {
                Some(SlideKind::Welcome) => result
                    .player
                    .as_ref()
                    .map(|player| format!("{}#{}", player.game_name, player.tag_line)),
                Some(kind) => describe_slide(kind, &result.analytics),
                None => None,
            };
            if let Some(detail) = detail {
                line.push_str(" - ");
                line.push_str(&detail);
            }
            line
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let initial = build_request(&args)?;

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(url) = &args.gateway_url {
        settings.gateway_url = url.clone();
    }
    if let Some(secs) = args.autoplay_secs {
        settings.autoplay_period = Duration::from_secs(secs);
    }
    info!(gateway = %settings.gateway_url, cdn = %settings.cdn_url, "rewind: settings loaded");

    let gateway = Arc::new(HttpGateway::from_settings(&settings)?);
    let assets = Arc::new(AssetIndex::from_settings(&settings)?);
    let fetcher = Arc::new(HttpMediaFetcher::new(settings.request_timeout)?);
    let warmup = Arc::new(MediaWarmupCache::from_settings(&settings, fetcher, assets));
    let handle = Orchestrator::spawn(OrchestratorDeps::from_settings(&settings, gateway, warmup));

    println!("{HELP}");
    if let Some(request) = initial {
        handle.submit(request).await?;
    }

    let mut updates = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", render(&updates.borrow_and_update()));

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", render(&updates.borrow_and_update()));
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_input(&line, &args.region) {
                    Ok(Some(Input::Command(command))) => handle.send(command).await?,
                    Ok(Some(Input::Dump)) => match handle.snapshot().state.result() {
                        Some(result) => println!("{}", serde_json::to_string_pretty(&result.analytics)?),
                        None => println!("no rewind loaded yet"),
                    },
                    Ok(Some(Input::Help)) => println!("{HELP}"),
                    Ok(Some(Input::Quit)) => break,
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "rewind: input rejected"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await?;
    Ok(())
}
