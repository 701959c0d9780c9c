use log::{info, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{build_client, fetch_json, validate_event_key, EventDataset, StatsError};

pub const STATBOTICS_BASE_URL: &str = "https://api.statbotics.io/v3";
const PAGE_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub winrate: f64,
}

/// EPA 指标；缺数据时全部为 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamEpa {
    pub team: u64,
    pub current: f64,
    pub recent: f64,
    pub mean: f64,
    pub max: f64,
    pub record: TeamRecord,
}

impl TeamEpa {
    /// Build from a `/team/{n}` response. Requires `norm_epa`; other fields
    /// default to zero.
    pub fn from_team_value(team: u64, data: &Value) -> Option<Self> {
        let current = data.get("norm_epa")?;
        let num = |v: Option<&Value>| v.and_then(Value::as_f64).unwrap_or(0.0);
        let count = |v: Option<&Value>| v.and_then(Value::as_u64).unwrap_or(0) as u32;

        let record = data.get("record");
        let field = |name: &str| record.and_then(|r| r.get(name));

        Some(Self {
            team,
            current: current.as_f64().unwrap_or(0.0),
            recent: num(data.get("recent_epa")),
            mean: num(data.get("mean_epa")),
            max: num(data.get("max_epa")),
            record: TeamRecord {
                wins: count(field("wins")),
                losses: count(field("losses")),
                ties: count(field("ties")),
                winrate: num(field("winrate")),
            },
        })
    }

    pub fn zeroed(team: u64) -> Self {
        Self {
            team,
            ..Self::default()
        }
    }
}

/// Statbotics API v3 客户端（无需鉴权）
pub struct StatboticsClient {
    client: Client,
    base_url: String,
}

impl StatboticsClient {
    pub fn new() -> Result<Self, StatsError> {
        Ok(Self {
            client: build_client()?,
            base_url: STATBOTICS_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn get_api_data(&self, endpoint: &str) -> Result<Option<Value>, StatsError> {
        let url = format!("{}{}", self.base_url, endpoint);
        fetch_json(self.client.get(&url), &url)
    }

    /// Event info, per-team event stats, match predictions and EPA ranking.
    pub fn get_event_data(&self, event_key: &str) -> Result<EventDataset, StatsError> {
        validate_event_key(event_key)?;
        info!("📈 Fetching Statbotics data for {}", event_key);

        let event_info = self.fetch_event_data(event_key)?;
        if event_info.is_none() {
            return Err(StatsError::EventNotFound(event_key.to_string()));
        }

        let mut data = EventDataset::new(event_key);
        data.push("event_info", event_info);
        data.push(
            "event_teams",
            self.get_api_data(&format!(
                "/team_events?event={}&limit={}",
                event_key, PAGE_LIMIT
            ))?,
        );
        data.push(
            "match_predictions",
            self.get_api_data(&format!(
                "/matches?event={}&limit={}",
                event_key, PAGE_LIMIT
            ))?,
        );
        data.push(
            "team_rankings",
            self.get_api_data(&format!(
                "/team_events?event={}&metric=epa_rank&limit={}",
                event_key, PAGE_LIMIT
            ))?,
        );
        Ok(data)
    }

    pub fn fetch_event_data(&self, event_key: &str) -> Result<Option<Value>, StatsError> {
        self.get_api_data(&format!("/event/{}", event_key))
    }

    pub fn get_match_prediction(&self, match_key: &str) -> Result<Option<Value>, StatsError> {
        self.fetch_match_data(match_key)
    }

    pub fn fetch_match_data(&self, match_key: &str) -> Result<Option<Value>, StatsError> {
        self.get_api_data(&format!("/match/{}", match_key))
    }

    /// One entry per requested team, in order. A failed or incomplete lookup
    /// yields zeroed numbers rather than an error.
    pub fn fetch_team_epa(&self, teams: &[u64]) -> Vec<TeamEpa> {
        teams
            .iter()
            .map(|&team| match self.get_api_data(&format!("/team/{}", team)) {
                Ok(Some(data)) => {
                    TeamEpa::from_team_value(team, &data).unwrap_or_else(|| TeamEpa::zeroed(team))
                }
                Ok(None) => TeamEpa::zeroed(team),
                Err(e) => {
                    warn!("EPA lookup for team {} failed: {}", team, e);
                    TeamEpa::zeroed(team)
                }
            })
            .collect()
    }
}
