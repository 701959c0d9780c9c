//! Event statistics from The Blue Alliance and Statbotics, exported as CSV.

use std::time::Duration;

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;
use thiserror::Error;

pub mod export;
pub mod flatten;
pub mod insights;
pub mod match_report;
mod statbotics;
mod tba;

pub use export::{convert_to_csv, event_output_dir};
pub use insights::{fetch_team_insights, write_insights_csv, TeamInsight, INSIGHTS_FILE};
pub use match_report::{fetch_combined_match, format_match_name, write_match_files, CombinedMatch};
pub use statbotics::{StatboticsClient, TeamEpa, TeamRecord, STATBOTICS_BASE_URL};
pub use tba::{TbaClient, TBA_BASE_URL};

const USER_AGENT: &str = concat!("scout-scan/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static EVENT_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}[a-z0-9]+$").expect("event key pattern is valid"));

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON 数据解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid event key: {0:?} (expected e.g. 2025mimil)")]
    InvalidEventKey(String),
    #[error("Missing TBA API key")]
    MissingApiKey,
    #[error("找不到赛事: {0}")]
    EventNotFound(String),
}

/// Event keys look like `2025mimil`: a year then lowercase letters or digits.
pub fn validate_event_key(key: &str) -> Result<(), StatsError> {
    if EVENT_KEY_RE.is_match(key) {
        Ok(())
    } else {
        Err(StatsError::InvalidEventKey(key.to_string()))
    }
}

/// Named JSON sections in fetch order; a section is `None` when its request
/// did not return data.
#[derive(Debug, Clone, Default)]
pub struct EventDataset {
    pub event_key: String,
    sections: Vec<(String, Option<Value>)>,
}

impl EventDataset {
    pub fn new(event_key: impl Into<String>) -> Self {
        Self {
            event_key: event_key.into(),
            sections: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &str, value: Option<Value>) {
        self.sections.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.sections.iter().map(|(n, v)| (n.as_str(), v.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

pub(crate) fn build_client() -> Result<Client, StatsError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Send a GET and parse JSON. Non-success statuses are logged and yield `None`.
pub(crate) fn fetch_json(request: RequestBuilder, url: &str) -> Result<Option<Value>, StatsError> {
    info!("🌐 GET {}", url);
    let resp = request.send()?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        warn!("{} returned {}: {}", url, status, snippet);
        return Ok(None);
    }
    Ok(Some(resp.json()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_event_key() {
        assert!(validate_event_key("2025mimil").is_ok());
        assert!(validate_event_key("2024cmptx").is_ok());
        assert!(matches!(
            validate_event_key("mimil"),
            Err(StatsError::InvalidEventKey(_))
        ));
        assert!(validate_event_key("2025MIMIL").is_err());
        assert!(validate_event_key("2025").is_err());
        assert!(validate_event_key("2025mi/../x").is_err());
    }

    #[test]
    fn test_dataset_keeps_order_and_missing_sections() {
        let mut data = EventDataset::new("2025mimil");
        data.push("event_info", Some(json!({"name": "Milford"})));
        data.push("rankings", None);

        let names: Vec<&str> = data.sections().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["event_info", "rankings"]);
        assert!(data.get("rankings").is_none());
        assert_eq!(data.get("event_info").unwrap()["name"], "Milford");
        assert_eq!(data.len(), 2);
    }
}
