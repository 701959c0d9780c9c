use std::collections::{HashSet, VecDeque};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::match_state::{MatchState, MatchUpdate};
use super::payload::{parse_match_id, parse_station, StationIdentity};

/// 去重/冷却配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// 两次分类事件之间的最短间隔（毫秒）
    pub cooldown_ms: u64,
    /// 空闲时两次扫描之间的最短间隔（毫秒）
    pub scan_interval_ms: u64,
    pub max_history_size: usize,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: 2_000,
            scan_interval_ms: 500,
            max_history_size: 100,
        }
    }
}

/// Insertion-ordered set of accepted payload texts, oldest evicted first.
#[derive(Debug, Clone)]
pub struct HistorySet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl HistorySet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            members: HashSet::new(),
            capacity,
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        self.members.contains(text)
    }

    /// Returns `false` if the text was already present. Evicts the oldest
    /// entries once the set grows past its capacity.
    pub fn insert(&mut self, text: &str) -> bool {
        if !self.members.insert(text.to_string()) {
            return false;
        }
        self.order.push_back(text.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOutcome {
    Accepted,
    Duplicate,
    Suppressed,
}

/// UI cue for a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feedback {
    Success,
    Duplicate,
}

/// 单次判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub outcome: ScanOutcome,
    pub station: Option<StationIdentity>,
    pub match_id: Option<String>,
    /// Duplicate feedback should be shown (cooldown elapsed).
    pub announce: bool,
    pub update: MatchUpdate,
    pub timestamp_ms: u64,
}

impl Evaluation {
    pub fn feedback(&self) -> Option<Feedback> {
        match self.outcome {
            ScanOutcome::Accepted => Some(Feedback::Success),
            ScanOutcome::Duplicate if self.announce => Some(Feedback::Duplicate),
            _ => None,
        }
    }
}

/// 扫描去重器 + 比赛提交追踪
///
/// One cooldown gate (`last_event_ms`) serves both acceptance and duplicate
/// announcements; only those two events move it.
pub struct ScanDeduplicator {
    history: HistorySet,
    match_state: MatchState,
    settings: TrackingSettings,
    last_event_ms: Option<u64>,
}

impl ScanDeduplicator {
    pub fn new() -> Self {
        Self::with_settings(TrackingSettings::default())
    }

    pub fn with_settings(settings: TrackingSettings) -> Self {
        Self {
            history: HistorySet::new(settings.max_history_size),
            match_state: MatchState::new(),
            settings,
            last_event_ms: None,
        }
    }

    pub fn settings(&self) -> &TrackingSettings {
        &self.settings
    }

    pub fn match_state(&self) -> &MatchState {
        &self.match_state
    }

    /// Swap in a different match state, returning the previous one.
    pub fn replace_match_state(&mut self, state: MatchState) -> MatchState {
        std::mem::replace(&mut self.match_state, state)
    }

    pub fn history(&self) -> &HistorySet {
        &self.history
    }

    pub fn is_known(&self, text: &str) -> bool {
        self.history.contains(text)
    }

    pub fn last_event_ms(&self) -> Option<u64> {
        self.last_event_ms
    }

    /// Whether enough time passed since the last classification event to
    /// run another scan.
    pub fn should_scan(&self, now_ms: u64) -> bool {
        self.elapsed_since_event(now_ms)
            .map_or(true, |elapsed| elapsed > self.settings.scan_interval_ms)
    }

    /// 判定一条解码内容：接受 / 重复 / 冷却抑制
    pub fn evaluate(&mut self, text: &str, now_ms: u64) -> Evaluation {
        let station = parse_station(text);
        let match_id = parse_match_id(text).map(|s| s.to_string());
        let elapsed = self.elapsed_since_event(now_ms);

        let mut evaluation = Evaluation {
            outcome: ScanOutcome::Suppressed,
            station,
            match_id,
            announce: false,
            update: MatchUpdate::default(),
            timestamp_ms: now_ms,
        };

        if self.history.contains(text) {
            evaluation.outcome = ScanOutcome::Duplicate;
            let announce = elapsed.map_or(true, |e| e >= self.settings.cooldown_ms);
            if announce {
                evaluation.announce = true;
                self.last_event_ms = Some(now_ms);
                info!("🔁 Duplicate scan from {}", describe(station));
            }
            return evaluation;
        }

        let cooled = elapsed.map_or(true, |e| e > self.settings.cooldown_ms);
        if !cooled {
            debug!("Scan suppressed, {:?} ms since last event", elapsed);
            return evaluation;
        }

        let (next, update) = self
            .match_state
            .transition(evaluation.match_id.as_deref(), station);
        if update.new_match {
            info!(
                "🏁 Tracking match {}",
                next.match_id().unwrap_or_default()
            );
        }
        self.match_state = next;
        self.history.insert(text);
        self.last_event_ms = Some(now_ms);

        info!(
            "✅ Accepted scan from {} ({}/6 submitted)",
            describe(station),
            self.match_state.submitted_count()
        );

        evaluation.outcome = ScanOutcome::Accepted;
        evaluation.update = update;
        evaluation
    }

    /// Forget history, match state and the cooldown gate.
    pub fn reset(&mut self) {
        self.history.clear();
        self.match_state = MatchState::new();
        self.last_event_ms = None;
    }

    fn elapsed_since_event(&self, now_ms: u64) -> Option<u64> {
        self.last_event_ms.map(|last| now_ms.saturating_sub(last))
    }
}

impl Default for ScanDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(station: Option<StationIdentity>) -> String {
    station.map_or_else(|| "unknown tablet".to_string(), |s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(match_id: &str, alliance: &str, station: u8, team: u32) -> String {
        format!("{team},Scout,{match_id},{alliance},2025mi,{station},12,0,0,0")
    }

    fn create_deduplicator(max_history_size: usize) -> ScanDeduplicator {
        ScanDeduplicator::with_settings(TrackingSettings {
            max_history_size,
            ..TrackingSettings::default()
        })
    }

    #[test]
    fn test_history_set_evicts_oldest() {
        let mut history = HistorySet::new(2);
        assert!(history.insert("a"));
        assert!(history.insert("b"));
        assert!(!history.insert("a"));
        assert!(history.insert("c"));

        assert!(!history.contains("a"));
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_first_payload_is_accepted() {
        let mut dedup = ScanDeduplicator::new();
        let eval = dedup.evaluate("118,Jane,2025mi_qm12,Red,2025mi,2,12,...", 0);

        assert_eq!(eval.outcome, ScanOutcome::Accepted);
        assert_eq!(eval.station, Some(StationIdentity::Red2));
        assert_eq!(eval.match_id.as_deref(), Some("2025mi_qm12"));
        assert_eq!(eval.feedback(), Some(Feedback::Success));
        assert!(dedup.match_state().is_submitted(StationIdentity::Red2));
    }

    #[test]
    fn test_cooldown_suppresses_new_text() {
        let mut dedup = ScanDeduplicator::new();
        let first = payload("qm1", "Red", 1, 1);
        let second = payload("qm1", "Red", 2, 2);

        assert_eq!(dedup.evaluate(&first, 10_000).outcome, ScanOutcome::Accepted);

        let eval = dedup.evaluate(&second, 11_000);
        assert_eq!(eval.outcome, ScanOutcome::Suppressed);
        assert_eq!(eval.feedback(), None);
        assert!(!dedup.is_known(&second));
        assert_eq!(dedup.match_state().submitted_count(), 1);

        // exactly at the cooldown is still too early
        assert_eq!(dedup.evaluate(&second, 12_000).outcome, ScanOutcome::Suppressed);
        assert_eq!(dedup.evaluate(&second, 12_001).outcome, ScanOutcome::Accepted);
    }

    #[test]
    fn test_same_text_suppressed_then_duplicate() {
        let mut dedup = ScanDeduplicator::new();
        let other = payload("qm1", "Blue", 1, 7);
        let text = payload("qm1", "Red", 3, 9);

        dedup.evaluate(&other, 0);
        assert_eq!(dedup.evaluate(&text, 500).outcome, ScanOutcome::Suppressed);
        assert_eq!(dedup.evaluate(&text, 900).outcome, ScanOutcome::Suppressed);

        assert_eq!(dedup.evaluate(&text, 2_500).outcome, ScanOutcome::Accepted);
        let eval = dedup.evaluate(&text, 2_600);
        assert_eq!(eval.outcome, ScanOutcome::Duplicate);
        assert!(!eval.announce);
    }

    #[test]
    fn test_duplicate_after_cooldown_is_announced_without_flag_change() {
        let mut dedup = ScanDeduplicator::new();
        let text = payload("qm4", "Blue", 2, 254);
        dedup.evaluate(&text, 0);
        let before = dedup.match_state().clone();

        let eval = dedup.evaluate(&text, 2_000);
        assert_eq!(eval.outcome, ScanOutcome::Duplicate);
        assert!(eval.announce);
        assert_eq!(eval.feedback(), Some(Feedback::Duplicate));
        assert_eq!(dedup.last_event_ms(), Some(2_000));
        assert_eq!(dedup.match_state(), &before);

        // announcing moved the gate
        let quiet = dedup.evaluate(&text, 3_000);
        assert!(!quiet.announce);
    }

    #[test]
    fn test_six_stations_complete_and_new_match_resets() {
        let mut dedup = ScanDeduplicator::new();
        let mut now = 0;
        for (i, station) in StationIdentity::ALL.iter().enumerate() {
            let alliance = station.alliance();
            let text = payload("qm7", alliance.as_str(), station.number(), i as u32 + 100);
            assert_eq!(dedup.evaluate(&text, now).outcome, ScanOutcome::Accepted);
            now += 2_500;
        }
        assert!(dedup.match_state().is_complete());

        let eval = dedup.evaluate(&payload("qm8", "Red", 1, 5), now);
        assert!(eval.update.new_match);
        assert_eq!(dedup.match_state().match_id(), Some("qm8"));
        assert_eq!(dedup.match_state().submitted_count(), 1);
    }

    #[test]
    fn test_history_cap_forgets_oldest() {
        let mut dedup = create_deduplicator(3);
        let texts: Vec<String> = (0..4).map(|i| payload("qm2", "Red", 1, i)).collect();
        for (i, text) in texts.iter().enumerate() {
            assert_eq!(
                dedup.evaluate(text, i as u64 * 3_000).outcome,
                ScanOutcome::Accepted
            );
        }

        assert_eq!(dedup.history().len(), 3);
        assert!(!dedup.is_known(&texts[0]));
        assert_eq!(dedup.evaluate(&texts[0], 20_000).outcome, ScanOutcome::Accepted);
        assert_eq!(dedup.evaluate(&texts[3], 30_000).outcome, ScanOutcome::Duplicate);
    }

    #[test]
    fn test_malformed_payload_is_still_tracked() {
        let mut dedup = ScanDeduplicator::new();
        let eval = dedup.evaluate("hello world", 0);
        assert_eq!(eval.outcome, ScanOutcome::Accepted);
        assert_eq!(eval.station, None);
        assert_eq!(dedup.match_state(), &MatchState::Idle);

        assert_eq!(dedup.evaluate("hello world", 5_000).outcome, ScanOutcome::Duplicate);
    }

    #[test]
    fn test_should_scan_interval() {
        let mut dedup = ScanDeduplicator::new();
        assert!(dedup.should_scan(0));
        dedup.evaluate("x", 1_000);
        assert!(!dedup.should_scan(1_500));
        assert!(dedup.should_scan(1_501));
    }

    #[test]
    fn test_reset_and_replace_state() {
        let mut dedup = ScanDeduplicator::new();
        dedup.evaluate(&payload("qm1", "Red", 1, 1), 0);

        let previous = dedup.replace_match_state(MatchState::active("qm9"));
        assert_eq!(previous.match_id(), Some("qm1"));
        assert_eq!(dedup.match_state().match_id(), Some("qm9"));

        dedup.reset();
        assert!(dedup.history().is_empty());
        assert_eq!(dedup.last_event_ms(), None);
        assert_eq!(dedup.match_state(), &MatchState::Idle);
    }
}
