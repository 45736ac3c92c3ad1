//! Analytics payload returned by a completed rewind job. Every namespace is optional.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub game_name: String,
    pub tag_line: String,
    #[serde(default)]
    pub profile_icon_id: Option<u32>,
    #[serde(default)]
    pub summoner_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    TimeSpent,
    FavoriteChampions,
    BestMatch,
    Leaderboard,
    PlayStyle,
}

impl Namespace {
    pub fn key(self) -> &'static str {
        match self {
            Namespace::TimeSpent => "timeSpent",
            Namespace::FavoriteChampions => "favoriteChampions",
            Namespace::BestMatch => "bestMatch",
            Namespace::Leaderboard => "leaderboard",
            Namespace::PlayStyle => "playStyle",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsBundle {
    #[serde(
        default,
        deserialize_with = "lenient_namespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_spent: Option<TimeSpent>,
    #[serde(
        default,
        deserialize_with = "lenient_namespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub favorite_champions: Option<Vec<ChampionStat>>,
    #[serde(
        default,
        deserialize_with = "lenient_namespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub best_match: Option<BestMatch>,
    #[serde(
        default,
        deserialize_with = "lenient_namespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
    #[serde(
        default,
        deserialize_with = "lenient_namespace",
        skip_serializing_if = "Option::is_none"
    )]
    pub play_style: Option<PlayStyle>,
    /// Namespaces this client has no typed view of.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// A malformed namespace reads as absent instead of failing the whole bundle.
fn lenient_namespace<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => match serde_json::from_value(raw) {
            Ok(namespace) => Ok(Some(namespace)),
            Err(err) => {
                warn!(error = %err, "analytics: malformed namespace dropped");
                Ok(None)
            }
        },
    }
}

impl AnalyticsBundle {
    /// An empty list counts as absent: the slide has nothing to show.
    pub fn has(&self, namespace: Namespace) -> bool {
        match namespace {
            Namespace::TimeSpent => self.time_spent.is_some(),
            Namespace::FavoriteChampions => self
                .favorite_champions
                .as_ref()
                .is_some_and(|list| !list.is_empty()),
            Namespace::BestMatch => self.best_match.is_some(),
            Namespace::Leaderboard => self
                .leaderboard
                .as_ref()
                .is_some_and(|list| !list.is_empty()),
            Namespace::PlayStyle => self.play_style.is_some(),
        }
    }

    pub fn namespaces_present(&self) -> Vec<Namespace> {
        [
            Namespace::TimeSpent,
            Namespace::FavoriteChampions,
            Namespace::BestMatch,
            Namespace::Leaderboard,
            Namespace::PlayStyle,
        ]
        .into_iter()
        .filter(|namespace| self.has(*namespace))
        .collect()
    }

    /// Champion display names in the order their art should be warmed.
    pub fn champion_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .favorite_champions
            .iter()
            .flatten()
            .map(|stat| stat.champion_name.as_str())
            .collect();
        if let Some(best) = &self.best_match {
            names.push(best.champion_name.as_str());
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpent {
    pub games_played: u32,
    pub hours_played: f64,
    #[serde(default)]
    pub longest_session_minutes: Option<u32>,
    #[serde(default)]
    pub busiest_month: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionStat {
    pub champion_name: String,
    pub games: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
}

impl ChampionStat {
    pub fn win_rate(&self) -> f64 {
        if self.games == 0 {
            return 0.0;
        }
        f64::from(self.wins) / f64::from(self.games)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestMatch {
    pub champion_name: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    #[serde(default)]
    pub win: bool,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    pub played_at: Option<String>,
}

impl BestMatch {
    /// Deathless games divide by one, as the in-game scoreboard does.
    pub fn kda(&self) -> f64 {
        (f64::from(self.kills) + f64::from(self.assists)) / f64::from(self.deaths.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub game_name: String,
    #[serde(default)]
    pub tag_line: Option<String>,
    #[serde(default)]
    pub profile_icon_id: Option<u32>,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayStyle {
    pub headline: String,
    #[serde(default)]
    pub traits: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_namespaces_stay_absent_and_unknown_ones_are_kept() {
        let bundle: AnalyticsBundle = serde_json::from_value(serde_json::json!({
            "timeSpent": {"gamesPlayed": 412, "hoursPlayed": 190.5},
            "favoriteChampions": [],
            "objectiveControl": {"dragons": 88}
        }))
        .expect("bundle");

        assert_eq!(bundle.namespaces_present(), vec![Namespace::TimeSpent]);
        assert!(!bundle.has(Namespace::FavoriteChampions));
        assert!(bundle.best_match.is_none());
        assert_eq!(
            bundle.other.get("objectiveControl"),
            Some(&serde_json::json!({"dragons": 88}))
        );
    }

    #[test]
    fn champion_names_cover_favorites_then_best_match() {
        let bundle = AnalyticsBundle {
            favorite_champions: Some(vec![
                ChampionStat {
                    champion_name: "Ahri".into(),
                    games: 40,
                    wins: 22,
                    kills: 0,
                    deaths: 0,
                    assists: 0,
                },
                ChampionStat {
                    champion_name: "Kai'Sa".into(),
                    games: 12,
                    wins: 5,
                    kills: 0,
                    deaths: 0,
                    assists: 0,
                },
            ]),
            best_match: Some(BestMatch {
                champion_name: "Wukong".into(),
                kills: 14,
                deaths: 0,
                assists: 9,
                win: true,
                duration_seconds: None,
                played_at: None,
            }),
            ..AnalyticsBundle::default()
        };

        assert_eq!(bundle.champion_names(), vec!["Ahri", "Kai'Sa", "Wukong"]);
        assert_eq!(bundle.best_match.as_ref().map(BestMatch::kda), Some(23.0));
    }

    #[test]
    fn win_rate_handles_zero_games() {
        let stat = ChampionStat {
            champion_name: "Annie".into(),
            games: 0,
            wins: 0,
            kills: 0,
            deaths: 0,
            assists: 0,
        };
        assert_eq!(stat.win_rate(), 0.0);
    }

    #[test]
    fn malformed_namespace_is_dropped_without_losing_the_rest() {
        let bundle: AnalyticsBundle = serde_json::from_value(serde_json::json!({
            "timeSpent": {"hours": 5},
            "bestMatch": null,
            "leaderboard": "not a list",
            "playStyle": {"headline": "Roamer"}
        }))
        .expect("bundle");

        assert!(bundle.time_spent.is_none());
        assert!(bundle.best_match.is_none());
        assert!(bundle.leaderboard.is_none());
        assert_eq!(
            bundle.play_style.map(|style| style.headline),
            Some("Roamer".to_string())
        );
        assert!(bundle.other.is_empty());
    }

    #[test]
    fn kda_does_not_overflow_on_extreme_counts() {
        let best = BestMatch {
            champion_name: "Ahri".into(),
            kills: u32::MAX,
            deaths: 0,
            assists: u32::MAX,
            win: false,
            duration_seconds: None,
            played_at: None,
        };
        assert_eq!(best.kda(), 2.0 * f64::from(u32::MAX));
    }
}
