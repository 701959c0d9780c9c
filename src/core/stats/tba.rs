use log::{debug, info};
use reqwest::blocking::Client;
use serde_json::Value;

use super::{build_client, fetch_json, validate_event_key, EventDataset, StatsError};

pub const TBA_BASE_URL: &str = "https://www.thebluealliance.com/api/v3";
const AUTH_HEADER: &str = "X-TBA-Auth-Key";

/// The Blue Alliance API v3 客户端
pub struct TbaClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TbaClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, StatsError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(StatsError::MissingApiKey);
        }
        Ok(Self {
            client: build_client()?,
            base_url: TBA_BASE_URL.to_string(),
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn get_api_data(&self, endpoint: &str) -> Result<Option<Value>, StatsError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let request = self.client.get(&url).header(AUTH_HEADER, &self.api_key);
        fetch_json(request, &url)
    }

    pub fn fetch_teams(&self, event_key: &str) -> Result<Option<Value>, StatsError> {
        validate_event_key(event_key)?;
        self.get_api_data(&format!("/event/{}/teams", event_key))
    }

    /// `oprs`, `dprs` and `ccwms` keyed by `frc<number>`.
    pub fn fetch_oprs(&self, event_key: &str) -> Result<Option<Value>, StatsError> {
        validate_event_key(event_key)?;
        self.get_api_data(&format!("/event/{}/oprs", event_key))
    }

    pub fn fetch_team_info(&self, team: u64) -> Result<Option<Value>, StatsError> {
        self.get_api_data(&format!("/team/frc{}", team))
    }

    /// Team numbers playing in one match.
    pub fn fetch_match_teams(&self, match_key: &str) -> Result<Vec<u64>, StatsError> {
        let teams = self.get_api_data(&format!("/match/{}/teams", match_key))?;
        let numbers: Vec<u64> = teams
            .as_ref()
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|t| t.get("team_number").and_then(Value::as_u64))
                    .collect()
            })
            .unwrap_or_default();
        debug!("Match {} teams: {:?}", match_key, numbers);
        Ok(numbers)
    }

    pub fn fetch_match(&self, match_key: &str) -> Result<Option<Value>, StatsError> {
        self.get_api_data(&format!("/match/{}", match_key))
    }

    /// Event info, teams, matches (score breakdowns back-filled), rankings,
    /// alliances and match details.
    pub fn get_event_data(&self, event_key: &str) -> Result<EventDataset, StatsError> {
        validate_event_key(event_key)?;
        info!("🏆 Fetching TBA data for {}", event_key);

        let event_info = self.get_api_data(&format!("/event/{}", event_key))?;
        if event_info.is_none() {
            return Err(StatsError::EventNotFound(event_key.to_string()));
        }

        let mut data = EventDataset::new(event_key);
        data.push("event_info", event_info);
        data.push("teams", self.fetch_teams(event_key)?);

        let mut matches = self.get_api_data(&format!("/event/{}/matches", event_key))?;
        if let Some(Value::Array(items)) = matches.as_mut() {
            for item in items.iter_mut() {
                self.backfill_score_breakdown(item)?;
            }
        }
        data.push("matches", matches);

        data.push(
            "rankings",
            self.get_api_data(&format!("/event/{}/rankings", event_key))?,
        );
        data.push(
            "alliances",
            self.get_api_data(&format!("/event/{}/alliances", event_key))?,
        );
        data.push(
            "match_details",
            self.get_api_data(&format!("/event/{}/matches", event_key))?,
        );

        Ok(data)
    }

    fn backfill_score_breakdown(&self, item: &mut Value) -> Result<(), StatsError> {
        if !needs_breakdown(item) {
            return Ok(());
        }
        let Some(key) = item.get("key").and_then(Value::as_str).map(String::from) else {
            return Ok(());
        };
        if let Some(detail) = self.fetch_match(&key)? {
            let breakdown = detail.get("score_breakdown");
            if let (Some(breakdown), Some(obj)) = (breakdown, item.as_object_mut()) {
                obj.insert("score_breakdown".to_string(), breakdown.clone());
            }
        }
        Ok(())
    }
}

/// Missing, null or empty `score_breakdown`.
fn needs_breakdown(item: &Value) -> bool {
    match item.get("score_breakdown") {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}
