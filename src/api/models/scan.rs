use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::scanner::deduplicator::{Evaluation, Feedback, ScanOutcome};
use crate::core::scanner::match_state::{MatchState, STATION_COUNT};
use crate::core::scanner::payload::StationIdentity;

/// Entries kept in the activity log.
pub const ACTIVITY_LOG_CAPACITY: usize = 5;

/// 一次扫描判定，供 UI 展示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub outcome: ScanOutcome,
    pub station: Option<StationIdentity>,
    pub match_id: Option<String>,
    pub timestamp_ms: u64,
    /// Sound / flash cue, if any.
    pub feedback: Option<Feedback>,
}

impl From<&Evaluation> for ScanEvent {
    fn from(evaluation: &Evaluation) -> Self {
        Self {
            outcome: evaluation.outcome,
            station: evaluation.station,
            match_id: evaluation.match_id.clone(),
            timestamp_ms: evaluation.timestamp_ms,
            feedback: evaluation.feedback(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationStatus {
    pub station: StationIdentity,
    pub submitted: bool,
}

/// 比赛进度快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: Option<String>,
    pub stations: Vec<StationStatus>,
    pub submitted: usize,
    pub total: usize,
    pub percent_complete: u8,
}

impl From<&MatchState> for MatchSnapshot {
    fn from(state: &MatchState) -> Self {
        Self {
            match_id: state.match_id().map(String::from),
            stations: state
                .stations()
                .map(|(station, submitted)| StationStatus { station, submitted })
                .collect(),
            submitted: state.submitted_count(),
            total: STATION_COUNT,
            percent_complete: state.percent_complete(),
        }
    }
}

impl MatchSnapshot {
    /// `Match: 2025mi_qm12 - 3/6 tablets submitted`
    pub fn status_line(&self) -> String {
        match &self.match_id {
            Some(id) => format!(
                "Match: {} - {}/{} tablets submitted",
                id, self.submitted, self.total
            ),
            None => "No active match".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub level: ActivityLevel,
    pub message: String,
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
}

/// Most recent activity first; older entries fall off.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: ActivityLevel, message: impl Into<String>) {
        self.entries.push_front(ActivityEntry {
            level,
            message: message.into(),
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
        });
        self.entries.truncate(ACTIVITY_LOG_CAPACITY);
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ActivityEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
