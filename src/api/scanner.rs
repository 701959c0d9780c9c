//! 扫码器门面：管线 + 活动日志 + 比赛进度

use std::path::PathBuf;

use log::{info, warn};
use thiserror::Error;

use crate::api::models::{ActivityEntry, ActivityLevel, ActivityLog, MatchSnapshot, ScanEvent};
use crate::config::{ScannerConfig, MIN_BRIGHTNESS_THRESHOLD};
use crate::core::scanner::capture::{CaptureError, CaptureWorker};
use crate::core::scanner::{
    CodeDecoder, DetectionSettings, Frame, FrameReport, RqrrDecoder, ScanOutcome, ScanPipeline,
};
use crate::core::storage::{FileScanStore, ScanSink, StorageError};

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("存储失败: {0}")]
    Storage(#[from] StorageError),

    #[error("采集失败: {0}")]
    Capture(#[from] CaptureError),
}

/// Result of one frame: the raw pipeline report plus one event per decoded code.
#[derive(Debug, Clone)]
pub struct ScanUpdate {
    pub report: FrameReport,
    pub events: Vec<ScanEvent>,
}

/// 二维码扫描器
///
/// ```ignore
/// let mut scanner = QrScanner::create(&ScannerConfig::default())?;
/// let update = scanner.process_frame(&frame);
/// println!("{}", scanner.match_snapshot().status_line());
/// ```
pub struct QrScanner {
    pipeline: ScanPipeline,
    activity: ActivityLog,
}

impl QrScanner {
    /// `rqrr` decoding, files under the configured (or platform) data dir.
    pub fn create(config: &ScannerConfig) -> Result<Self, ScannerError> {
        let store = match &config.storage.data_dir {
            Some(dir) => FileScanStore::open(dir.clone())?,
            None => FileScanStore::open_default()?,
        };
        Ok(Self::with_parts(config, Box::new(RqrrDecoder::new()), Box::new(store)))
    }

    pub fn with_parts(
        config: &ScannerConfig,
        decoder: Box<dyn CodeDecoder>,
        sink: Box<dyn ScanSink>,
    ) -> Self {
        info!("🔍 QrScanner: created");
        let mut activity = ActivityLog::new();
        activity.push(ActivityLevel::Info, "Scanner ready");
        Self {
            pipeline: ScanPipeline::with_config(config.pipeline_config(), decoder, sink),
            activity,
        }
    }

    pub fn process_frame(&mut self, frame: &Frame) -> ScanUpdate {
        let report = self.pipeline.process_frame(frame);
        let mut events = Vec::with_capacity(report.codes.len());

        for code in &report.codes {
            let evaluation = &code.evaluation;
            if evaluation.update.new_match {
                if let Some(id) = evaluation.match_id.as_deref() {
                    self.activity.push(ActivityLevel::Info, format!("New match: {}", id));
                }
            }

            match evaluation.outcome {
                ScanOutcome::Accepted => {
                    let who = evaluation
                        .station
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown station".to_string());
                    self.activity
                        .push(ActivityLevel::Success, format!("Scanned {}", who));
                    if let Some(err) = &code.persist_error {
                        self.activity
                            .push(ActivityLevel::Error, format!("Save failed: {}", err));
                    }
                    let complete = self.pipeline.match_state().is_complete();
                    if evaluation.update.marked.is_some() && complete {
                        self.activity
                            .push(ActivityLevel::Success, "All 6 tablets submitted");
                    }
                }
                ScanOutcome::Duplicate if evaluation.announce => {
                    self.activity
                        .push(ActivityLevel::Warning, "Duplicate QR code - already scanned");
                }
                _ => {}
            }

            events.push(ScanEvent::from(evaluation));
        }

        ScanUpdate { report, events }
    }

    /// Feed every frame the worker delivers until its source runs dry.
    pub fn drain_worker<F>(&mut self, worker: &CaptureWorker, mut on_update: F) -> usize
    where
        F: FnMut(&ScanUpdate),
    {
        let mut processed = 0;
        for frame in worker.frames() {
            let update = self.process_frame(&frame);
            on_update(&update);
            processed += 1;
        }
        processed
    }

    pub fn match_snapshot(&self) -> MatchSnapshot {
        MatchSnapshot::from(self.pipeline.match_state())
    }

    pub fn activity(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.activity.entries()
    }

    pub fn detection_settings(&self) -> &DetectionSettings {
        self.pipeline.detection_settings()
    }

    pub fn set_focus_enabled(&mut self, enabled: bool) {
        self.pipeline.detection_settings_mut().focus_enabled = enabled;
    }

    pub fn set_highlight_potential(&mut self, enabled: bool) {
        self.pipeline.detection_settings_mut().highlight_potential = enabled;
    }

    /// Clamped to the supported minimum.
    pub fn set_brightness_threshold(&mut self, threshold: u8) {
        self.pipeline.detection_settings_mut().brightness_threshold =
            threshold.max(MIN_BRIGHTNESS_THRESHOLD);
    }

    /// Write the last decoded payload to storage again.
    pub fn save_last_payload(&mut self, now_ms: u64) -> Result<PathBuf, ScannerError> {
        match self.pipeline.save_last_payload(now_ms) {
            Ok(path) => {
                self.activity.push(ActivityLevel::Success, "Saved last scan");
                Ok(path)
            }
            Err(e) => {
                let level = match e {
                    StorageError::NoData => ActivityLevel::Warning,
                    _ => ActivityLevel::Error,
                };
                self.activity.push(level, e.to_string());
                Err(e.into())
            }
        }
    }

    /// Write the current match summary, if any station has submitted.
    pub fn finish(&mut self) -> Result<Option<PathBuf>, ScannerError> {
        let written = self.pipeline.write_match_summary().map_err(|e| {
            warn!("Match summary not written: {}", e);
            self.activity.push(ActivityLevel::Error, e.to_string());
            e
        })?;
        if let Some(path) = &written {
            self.activity
                .push(ActivityLevel::Info, format!("Summary saved to {}", path.display()));
        }
        Ok(written)
    }

    pub fn reset(&mut self) {
        self.pipeline.reset();
        self.activity.clear();
        self.activity.push(ActivityLevel::Info, "Tracker reset");
    }
}

impl Drop for QrScanner {
    fn drop(&mut self) {
        info!("🗑️ QrScanner: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::{Feedback, MockDecoder};
    use crate::core::storage::MemoryScanSink;

    const RED2: &str = "118,Jane,2025mi_qm12,Red,2025mi,2";
    const BLUE1: &str = "254,Sam,2025mi_qm12,Blue,2025mi,1";

    fn create_test_frame(frame_number: u64, timestamp_ms: u64) -> Frame {
        Frame::new(8, 8, vec![0; 8 * 8 * 3], timestamp_ms, frame_number)
    }

    fn create_scanner(frames: Vec<(u64, String)>, sink: MemoryScanSink) -> QrScanner {
        let mut config = ScannerConfig::default();
        config.detection.focus_enabled = false;
        QrScanner::with_parts(&config, Box::new(MockDecoder::with_frames(frames)), Box::new(sink))
    }

    #[test]
    fn test_accept_then_duplicate_events() {
        let sink = MemoryScanSink::new();
        let mut scanner = create_scanner(vec![(0, RED2.into()), (1, RED2.into())], sink.clone());

        let first = scanner.process_frame(&create_test_frame(0, 1_000));
        assert_eq!(first.events.len(), 1);
        assert_eq!(first.events[0].feedback, Some(Feedback::Success));
        assert_eq!(sink.scans().len(), 1);

        let second = scanner.process_frame(&create_test_frame(1, 3_500));
        assert_eq!(second.events[0].outcome, ScanOutcome::Duplicate);
        assert_eq!(second.events[0].feedback, Some(Feedback::Duplicate));
        assert_eq!(sink.scans().len(), 1);

        let latest = scanner.activity().next().unwrap();
        assert_eq!(latest.level, ActivityLevel::Warning);
    }

    #[test]
    fn test_snapshot_tracks_stations() {
        let script = vec![(0, RED2.into()), (1, BLUE1.into())];
        let mut scanner = create_scanner(script, MemoryScanSink::new());
        scanner.process_frame(&create_test_frame(0, 1_000));
        scanner.process_frame(&create_test_frame(1, 4_000));

        let snapshot = scanner.match_snapshot();
        assert_eq!(snapshot.match_id.as_deref(), Some("2025mi_qm12"));
        assert_eq!(snapshot.submitted, 2);
        assert!(snapshot.stations[1].submitted);
        assert!(snapshot.stations[3].submitted);
    }

    #[test]
    fn test_sink_failure_is_logged() {
        let mut scanner = create_scanner(vec![(0, RED2.into())], MemoryScanSink::failing());
        let update = scanner.process_frame(&create_test_frame(0, 1_000));

        assert_eq!(update.events[0].outcome, ScanOutcome::Accepted);
        assert!(scanner.activity().any(|e| e.level == ActivityLevel::Error));
        assert_eq!(scanner.match_snapshot().submitted, 1);
    }

    #[test]
    fn test_save_without_payload() {
        let mut scanner = create_scanner(vec![], MemoryScanSink::new());
        assert!(matches!(
            scanner.save_last_payload(0),
            Err(ScannerError::Storage(StorageError::NoData))
        ));
        assert_eq!(scanner.activity().next().unwrap().level, ActivityLevel::Warning);
    }

    #[test]
    fn test_settings_toggles() {
        let mut scanner = create_scanner(vec![], MemoryScanSink::new());
        scanner.set_focus_enabled(true);
        scanner.set_highlight_potential(false);
        scanner.set_brightness_threshold(10);

        let settings = scanner.detection_settings();
        assert!(settings.focus_enabled);
        assert!(!settings.highlight_potential);
        assert_eq!(settings.brightness_threshold, MIN_BRIGHTNESS_THRESHOLD);
    }

    #[test]
    fn test_reset_clears_match() {
        let mut scanner = create_scanner(vec![(0, RED2.into())], MemoryScanSink::new());
        scanner.process_frame(&create_test_frame(0, 1_000));
        scanner.reset();
        assert_eq!(scanner.match_snapshot().match_id, None);
        assert_eq!(scanner.activity().count(), 1);
    }
}
