use std::path::PathBuf;

use log::{error, warn};
use rayon::prelude::*;

use crate::core::storage::{AcceptedScan, ScanSink, StorageError};

use super::decoder::CodeDecoder;
use super::deduplicator::{Evaluation, ScanDeduplicator, ScanOutcome, TrackingSettings};
use super::frame::Frame;
use super::match_state::MatchState;
use super::region_detector::{DetectionSettings, RegionDetector};
use super::types::{DecodedPayload, Region};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub detection: DetectionSettings,
    pub tracking: TrackingSettings,
}

/// 单个二维码的处理结果
#[derive(Debug, Clone)]
pub struct CodeReport {
    pub payload: DecodedPayload,
    /// Text was already in history before this frame (drawn red instead of green).
    pub previously_seen: bool,
    pub evaluation: Evaluation,
    pub saved_to: Option<PathBuf>,
    pub persist_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_number: u64,
    pub timestamp_ms: u64,
    /// Detection and decoding ran for this frame.
    pub scanned: bool,
    /// Candidate regions for the overlay, when highlighting is on.
    pub highlights: Vec<Region>,
    pub codes: Vec<CodeReport>,
}

impl FrameReport {
    fn idle(frame: &Frame) -> Self {
        Self {
            frame_number: frame.frame_number,
            timestamp_ms: frame.timestamp_ms,
            scanned: false,
            highlights: Vec::new(),
            codes: Vec::new(),
        }
    }

    pub fn accepted(&self) -> impl Iterator<Item = &CodeReport> {
        self.codes
            .iter()
            .filter(|c| c.evaluation.outcome == ScanOutcome::Accepted)
    }
}

/// 扫描管线：亮区检测 → 解码 → 去重 → 持久化
pub struct ScanPipeline {
    detector: RegionDetector,
    deduplicator: ScanDeduplicator,
    decoder: Box<dyn CodeDecoder>,
    sink: Box<dyn ScanSink>,
    last_payload: Option<String>,
}

impl ScanPipeline {
    pub fn new(decoder: Box<dyn CodeDecoder>, sink: Box<dyn ScanSink>) -> Self {
        Self::with_config(PipelineConfig::default(), decoder, sink)
    }

    pub fn with_config(
        config: PipelineConfig,
        decoder: Box<dyn CodeDecoder>,
        sink: Box<dyn ScanSink>,
    ) -> Self {
        Self {
            detector: RegionDetector::with_settings(config.detection),
            deduplicator: ScanDeduplicator::with_settings(config.tracking),
            decoder,
            sink,
            last_payload: None,
        }
    }

    pub fn detection_settings(&self) -> &DetectionSettings {
        self.detector.settings()
    }

    pub fn detection_settings_mut(&mut self) -> &mut DetectionSettings {
        self.detector.settings_mut()
    }

    pub fn deduplicator(&self) -> &ScanDeduplicator {
        &self.deduplicator
    }

    pub fn match_state(&self) -> &MatchState {
        self.deduplicator.match_state()
    }

    pub fn last_payload(&self) -> Option<&str> {
        self.last_payload.as_deref()
    }

    /// Run one frame through the pipeline. Frames arriving within the scan
    /// interval, and malformed frames, come back unscanned.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let mut report = FrameReport::idle(frame);
        let now = frame.timestamp_ms;
        if !frame.is_valid() || !self.deduplicator.should_scan(now) {
            return report;
        }
        report.scanned = true;

        let regions = self.detector.detect(frame);
        let settings = self.detector.settings();
        if settings.highlight_potential {
            report.highlights = regions.clone();
        }

        let payloads = if settings.focus_enabled && !regions.is_empty() {
            let focused = &regions[..regions.len().min(settings.focused_regions)];
            decode_regions(self.decoder.as_ref(), frame, focused, settings.region_margin)
        } else {
            decode_or_empty(self.decoder.as_ref(), frame)
        };

        for payload in payloads {
            let code = self.handle_payload(payload, now);
            report.codes.push(code);
        }
        report
    }

    fn handle_payload(&mut self, payload: DecodedPayload, now_ms: u64) -> CodeReport {
        let previously_seen = self.deduplicator.is_known(&payload.text);
        self.last_payload = Some(payload.text.clone());
        let evaluation = self.deduplicator.evaluate(&payload.text, now_ms);

        let mut saved_to = None;
        let mut persist_error = None;
        if evaluation.outcome == ScanOutcome::Accepted {
            let scan = AcceptedScan {
                text: payload.text.clone(),
                station: evaluation.station,
                match_id: evaluation.match_id.clone(),
                timestamp_ms: now_ms,
            };
            match self.sink.persist(&scan) {
                Ok(path) => saved_to = Some(path),
                Err(e) => {
                    error!("Failed to save scan: {}", e);
                    persist_error = Some(e.to_string());
                }
            }
        }

        CodeReport {
            payload,
            previously_seen,
            evaluation,
            saved_to,
            persist_error,
        }
    }

    /// Persist the most recently decoded text again, without touching the
    /// tracker.
    pub fn save_last_payload(&mut self, now_ms: u64) -> Result<PathBuf, StorageError> {
        let text = self.last_payload.clone().ok_or(StorageError::NoData)?;
        let scan = AcceptedScan {
            station: super::payload::parse_station(&text),
            match_id: super::payload::parse_match_id(&text).map(String::from),
            text,
            timestamp_ms: now_ms,
        };
        self.sink.persist(&scan)
    }

    /// Write the summary of the current match, if any station submitted.
    pub fn write_match_summary(&mut self) -> Result<Option<PathBuf>, StorageError> {
        self.sink.write_match_summary(self.deduplicator.match_state())
    }

    pub fn reset(&mut self) {
        self.deduplicator.reset();
        self.last_payload = None;
    }
}

fn decode_or_empty(decoder: &dyn CodeDecoder, frame: &Frame) -> Vec<DecodedPayload> {
    decoder.decode(frame).unwrap_or_else(|e| {
        warn!("Decode failed on frame {}: {}", frame.frame_number, e);
        Vec::new()
    })
}

/// Decode each region's crop in parallel and shift results into frame
/// coordinates. Output keeps region order.
fn decode_regions(
    decoder: &dyn CodeDecoder,
    frame: &Frame,
    regions: &[Region],
    margin: u32,
) -> Vec<DecodedPayload> {
    let per_region: Vec<Vec<DecodedPayload>> = regions
        .par_iter()
        .map(|region| {
            let window = region.bounds.expand(margin, frame.width, frame.height);
            let crop = frame.crop(&window);
            decode_or_empty(decoder, &crop)
                .into_iter()
                .map(|p| p.translated(window.x, window.y))
                .collect()
        })
        .collect();
    per_region.into_iter().flatten().collect()
}
