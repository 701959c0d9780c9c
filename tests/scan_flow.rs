use std::fs;
use std::path::Path;

use scout_scan::api::models::ActivityLevel;
use scout_scan::api::QrScanner;
use scout_scan::config::ScannerConfig;
use scout_scan::core::scanner::capture::{CaptureSettings, CaptureWorker, ImageSequenceSource};
use scout_scan::core::scanner::throttle::StaticLoadProbe;
use scout_scan::core::scanner::{Frame, MockDecoder, ScanOutcome};
use scout_scan::core::storage::{FileScanStore, RESULTS_FILE, SCANS_DIR};

const STATIONS: [(&str, &str); 6] = [
    ("Red", "1"),
    ("Red", "2"),
    ("Red", "3"),
    ("Blue", "1"),
    ("Blue", "2"),
    ("Blue", "3"),
];

fn payload(team: u32, match_key: &str, alliance: &str, station: &str) -> String {
    let mut fields = vec![
        team.to_string(),
        "Scout".to_string(),
        match_key.to_string(),
        alliance.to_string(),
        "2025mi".to_string(),
        station.to_string(),
    ];
    // pad to the full 27-field record
    fields.extend((6..27).map(|i| i.to_string()));
    fields.join(",")
}

fn create_test_frame(frame_number: u64, timestamp_ms: u64) -> Frame {
    Frame::new(16, 16, vec![20; 16 * 16 * 3], timestamp_ms, frame_number)
}

fn count_lines(path: &Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count()
}

#[test]
fn test_full_match_is_tracked_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ScannerConfig::default();
    config.storage.data_dir = Some(dir.path().to_path_buf());

    let mut script: Vec<(u64, String)> = STATIONS
        .iter()
        .enumerate()
        .map(|(i, (alliance, station))| {
            (i as u64, payload(100 + i as u32, "2025mi_qm12", alliance, station))
        })
        .collect();
    // frame 6 re-shows Red 1, frame 7 starts the next match
    script.push((6, script[0].1.clone()));
    script.push((7, payload(999, "2025mi_qm13", "Blue", "2")));

    let store = FileScanStore::open(dir.path()).unwrap();
    let mut scanner = QrScanner::with_parts(
        &config,
        Box::new(MockDecoder::with_frames(script)),
        Box::new(store),
    );

    for n in 0..6u64 {
        let update = scanner.process_frame(&create_test_frame(n, n * 2_500));
        assert_eq!(update.events.len(), 1);
        assert_eq!(update.events[0].outcome, ScanOutcome::Accepted);
    }

    let snapshot = scanner.match_snapshot();
    assert_eq!(snapshot.submitted, 6);
    assert_eq!(snapshot.percent_complete, 100);
    assert!(scanner
        .activity()
        .any(|e| e.level == ActivityLevel::Success && e.message.contains("All 6")));

    let results = dir.path().join(RESULTS_FILE);
    assert_eq!(count_lines(&results), 7);
    let header = fs::read_to_string(&results).unwrap();
    assert!(header.starts_with("teamNumber,scouterName,matchKey"));
    assert_eq!(fs::read_dir(dir.path().join(SCANS_DIR)).unwrap().count(), 6);

    let summary = scanner.finish().unwrap().unwrap();
    let text = fs::read_to_string(summary).unwrap();
    assert_eq!(text.matches("✓ SCANNED").count(), 6);

    let duplicate = scanner.process_frame(&create_test_frame(6, 15_000));
    assert_eq!(duplicate.events[0].outcome, ScanOutcome::Duplicate);
    assert_eq!(count_lines(&results), 7);

    let next = scanner.process_frame(&create_test_frame(7, 17_500));
    assert_eq!(next.events[0].outcome, ScanOutcome::Accepted);
    let snapshot = scanner.match_snapshot();
    assert_eq!(snapshot.match_id.as_deref(), Some("2025mi_qm13"));
    assert_eq!(snapshot.submitted, 1);
    assert_eq!(count_lines(&results), 8);
}

#[test]
fn test_rapid_frames_are_rate_limited() {
    let dir = tempfile::tempdir().unwrap();
    let config = ScannerConfig::default();
    let text = payload(33, "2025mi_qm1", "Red", "1");
    let store = FileScanStore::open(dir.path()).unwrap();
    let mut scanner = QrScanner::with_parts(
        &config,
        Box::new(MockDecoder::with_payloads(vec![text])),
        Box::new(store),
    );

    let first = scanner.process_frame(&create_test_frame(0, 10_000));
    assert!(first.report.scanned);

    // inside the scan interval
    let skipped = scanner.process_frame(&create_test_frame(1, 10_300));
    assert!(!skipped.report.scanned);
    assert!(skipped.events.is_empty());

    // scanned, but the cooldown swallows the repeat silently
    let quiet = scanner.process_frame(&create_test_frame(2, 11_000));
    assert!(quiet.report.scanned);
    assert_eq!(quiet.events[0].outcome, ScanOutcome::Duplicate);
    assert_eq!(quiet.events[0].feedback, None);

    assert_eq!(count_lines(&dir.path().join(RESULTS_FILE)), 2);
}

#[test]
fn test_image_sequence_through_capture_thread() {
    let dir = tempfile::tempdir().unwrap();
    let mut images = Vec::new();
    for i in 0..3 {
        let path = dir.path().join(format!("frame_{}.png", i));
        image::RgbImage::from_pixel(32, 32, image::Rgb([40, 40, 40]))
            .save(&path)
            .unwrap();
        images.push(path);
    }

    let script = vec![
        (0, payload(1, "2025mi_qm2", "Red", "1")),
        (2, payload(2, "2025mi_qm2", "Blue", "3")),
    ];
    let data_dir = dir.path().join("data");
    let store = FileScanStore::open(&data_dir).unwrap();
    let mut scanner = QrScanner::with_parts(
        &ScannerConfig::default(),
        Box::new(MockDecoder::with_frames(script)),
        Box::new(store),
    );

    let settings = CaptureSettings {
        drop_when_busy: false,
        pacing_ms: 0,
        ..CaptureSettings::default()
    };
    let mut worker = CaptureWorker::start(
        ImageSequenceSource::new(images, 2_500),
        StaticLoadProbe(None),
        settings,
    )
    .unwrap();

    let mut accepted = 0;
    let processed = scanner.drain_worker(&worker, |update| {
        accepted += update.report.accepted().count();
    });
    let stats = worker.stop().unwrap();

    assert_eq!(processed, 3);
    assert_eq!(stats.delivered, 3);
    assert_eq!(accepted, 2);
    assert_eq!(scanner.match_snapshot().submitted, 2);
}

#[test]
fn test_unidentified_scans_in_same_second_both_kept() {
    let dir = tempfile::tempdir().unwrap();
    let script = vec![(0, "hello".to_string()), (1, "world".to_string())];
    let store = FileScanStore::open(dir.path()).unwrap();
    let mut scanner = QrScanner::with_parts(
        &ScannerConfig::default(),
        Box::new(MockDecoder::with_frames(script)),
        Box::new(store),
    );

    for n in 0..2u64 {
        let update = scanner.process_frame(&create_test_frame(n, n * 2_500));
        assert_eq!(update.events[0].outcome, ScanOutcome::Accepted);
    }

    let mut saved: Vec<String> = fs::read_dir(dir.path().join(SCANS_DIR))
        .unwrap()
        .map(|entry| fs::read_to_string(entry.unwrap().path()).unwrap())
        .collect();
    saved.sort();
    assert_eq!(saved, vec!["hello", "world"]);
    assert_eq!(count_lines(&dir.path().join(RESULTS_FILE)), 3);
}
