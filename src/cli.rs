//! CLI commands: image-sequence scanning and stats export.

use std::error::Error;
use std::path::{Path, PathBuf};

use scout_scan::api::stats::{
    combined_match, export_statbotics_event, export_tba_event, save_combined_match, team_insights,
    ExportSummary, ExportTarget,
};
use scout_scan::api::{QrScanner, ScanUpdate};
use scout_scan::config::ScannerConfig;
use scout_scan::core::scanner::{CaptureWorker, ImageSequenceSource, ScanOutcome, SystemMemoryProbe};

type CliResult = Result<(), Box<dyn Error>>;

pub fn load_config(path: Option<&Path>) -> Result<ScannerConfig, Box<dyn Error>> {
    Ok(ScannerConfig::load_or_default(path)?)
}

/// Replay image files through the capture thread and the scanner.
pub fn scan_images(
    mut config: ScannerConfig,
    images: Vec<PathBuf>,
    data_dir: Option<PathBuf>,
    interval_ms: u64,
) -> CliResult {
    if data_dir.is_some() {
        config.storage.data_dir = data_dir;
    }
    let mut scanner = QrScanner::create(&config)?;

    let total = images.len();
    let source = ImageSequenceSource::new(images, interval_ms);
    let mut capture = config.capture.clone();
    // every file matters, wait for the scanner instead of dropping
    capture.drop_when_busy = false;
    let mut worker = CaptureWorker::start(source, SystemMemoryProbe, capture)?;

    let processed = scanner.drain_worker(&worker, print_update);
    if let Some(stats) = worker.stop() {
        let skipped = stats.captured.saturating_sub(stats.delivered);
        if skipped > 0 {
            println!("{} images skipped under memory pressure", skipped);
        }
    }

    println!();
    println!("Processed {}/{} images", processed, total);
    let snapshot = scanner.match_snapshot();
    println!("{}", snapshot.status_line());
    for status in &snapshot.stations {
        let mark = if status.submitted { "✓" } else { "·" };
        println!("  {} {}", mark, status.station);
    }

    if let Some(path) = scanner.finish()? {
        println!("Summary: {}", path.display());
    }
    Ok(())
}

fn print_update(update: &ScanUpdate) {
    for code in &update.report.codes {
        let evaluation = &code.evaluation;
        let station = evaluation
            .station
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let match_id = evaluation.match_id.as_deref().unwrap_or("-");
        let label = match evaluation.outcome {
            ScanOutcome::Accepted => "ACCEPTED",
            ScanOutcome::Duplicate => "DUPLICATE",
            ScanOutcome::Suppressed => "cooldown",
        };
        println!(
            "[frame {:>4}] {:<9} {:<7} {}",
            update.report.frame_number, label, station, match_id
        );
        if let Some(path) = &code.saved_to {
            println!("             saved {}", path.display());
        }
        if let Some(err) = &code.persist_error {
            println!("             save failed: {}", err);
        }
    }
}

pub fn export_tba(
    config: &ScannerConfig,
    event: &str,
    target: &ExportTarget,
    api_key: Option<&str>,
) -> CliResult {
    let summary = export_tba_event(&config.stats, api_key, event, target)?;
    print_export(&summary, target.update_existing);
    Ok(())
}

pub fn export_statbotics(config: &ScannerConfig, event: &str, target: &ExportTarget) -> CliResult {
    let summary = export_statbotics_event(&config.stats, event, target)?;
    print_export(&summary, target.update_existing);
    Ok(())
}

fn print_export(summary: &ExportSummary, update_existing: bool) {
    if summary.files.is_empty() {
        println!("No data returned.");
        return;
    }
    let verb = if update_existing { "Updated" } else { "Created" };
    println!(
        "{} {} CSV files in {}",
        verb,
        summary.files.len(),
        summary.event_dir.display()
    );
    print_files(&summary.files);
}

fn print_files(files: &[PathBuf]) {
    for file in files {
        println!("  {}", file.display());
    }
}

/// Print the combined match record; with `save_to`, also write it and the
/// match CSVs there.
pub fn print_match(
    config: &ScannerConfig,
    match_key: &str,
    api_key: Option<&str>,
    save_to: Option<&Path>,
) -> CliResult {
    let Some(dir) = save_to else {
        match combined_match(&config.stats, api_key, match_key)? {
            Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            None => println!("Match {} not found.", match_key),
        }
        return Ok(());
    };

    match save_combined_match(&config.stats, api_key, match_key, dir)? {
        Some((report, files)) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!();
            println!("Saved:");
            print_files(&files);
        }
        None => println!("Match {} not found.", match_key),
    }
    Ok(())
}

pub fn insights(
    config: &ScannerConfig,
    event: &str,
    out: &Path,
    api_key: Option<&str>,
) -> CliResult {
    match team_insights(&config.stats, api_key, event, out)? {
        Some(path) => println!("Team insights written to {}", path.display()),
        None => println!("No teams found for {}.", event),
    }
    Ok(())
}

pub fn init_config(path: &Path) -> CliResult {
    ScannerConfig::default().save(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
