//! Persistence of accepted scans.
//!
//! Layout under the data directory:
//!
//! ```text
//! results.csv                                   aggregate table, one row per scan
//! scanned_data/qr_data_<match>_<Red2>_<ts>.csv  verbatim payload per scan
//! match_summary_<match>_<ts>.txt                per-station checklist
//! ```
//!
//! `<ts>` has millisecond resolution; a name that still exists gets a `_<n>`
//! suffix, so no write ever replaces an earlier file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use log::{info, warn};
use thiserror::Error;

use crate::core::scanner::match_state::MatchState;
use crate::core::scanner::payload::{strip_quotes, StationIdentity, FIELD_DELIMITER, RECORD_FIELDS};
use crate::core::table;

pub const RESULTS_FILE: &str = "results.csv";
pub const SCANS_DIR: &str = "scanned_data";

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No scanned data to save")]
    NoData,

    #[error("Could not determine a data directory")]
    NoDataDir,
}

/// 一条已接受的扫描
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedScan {
    pub text: String,
    pub station: Option<StationIdentity>,
    pub match_id: Option<String>,
    pub timestamp_ms: u64,
}

pub trait ScanSink: Send {
    /// Store one accepted payload; returns where it was written.
    fn persist(&mut self, scan: &AcceptedScan) -> Result<PathBuf, StorageError>;

    /// Write the per-station checklist for the current match. `Ok(None)` when
    /// there is nothing to summarise.
    fn write_match_summary(&mut self, state: &MatchState) -> Result<Option<PathBuf>, StorageError>;
}

/// `~/.scoutops` on Unix, `%LOCALAPPDATA%\ScoutOps` on Windows.
pub fn default_data_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_local_dir().map(|d| d.join("ScoutOps"))
    } else {
        dirs::home_dir().map(|h| h.join(".scoutops"))
    }
}

/// 文件存储：单次扫描文件 + 汇总表 + 比赛总结
pub struct FileScanStore {
    root: PathBuf,
    scans_dir: PathBuf,
}

impl FileScanStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        let scans_dir = root.join(SCANS_DIR);
        fs::create_dir_all(&scans_dir)?;
        info!("💾 Scan data directory: {}", root.display());
        Ok(Self { root, scans_dir })
    }

    pub fn open_default() -> Result<Self, StorageError> {
        Self::open(default_data_dir().ok_or(StorageError::NoDataDir)?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scans_dir(&self) -> &Path {
        &self.scans_dir
    }

    pub fn results_csv(&self) -> PathBuf {
        self.root.join(RESULTS_FILE)
    }

    fn scan_file_name(scan: &AcceptedScan, stamp: &str) -> String {
        let mut name = String::from("qr_data");
        if let Some(match_id) = scan.match_id.as_deref() {
            name.push('_');
            name.push_str(match_id);
        }
        if let Some(station) = scan.station {
            name.push('_');
            name.push_str(&station.file_tag());
        }
        format!("{}_{}", name, stamp)
    }
}

/// Create `<stem>.<ext>` in `dir`, or `<stem>_<n>.<ext>` with the first free
/// `n`, and write `contents` to it. Never truncates an existing file.
fn write_new_file(dir: &Path, stem: &str, ext: &str, contents: &str) -> std::io::Result<PathBuf> {
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{}_{}.{}", stem, attempt, ext)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(contents.as_bytes())?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

impl ScanSink for FileScanStore {
    fn persist(&mut self, scan: &AcceptedScan) -> Result<PathBuf, StorageError> {
        let data = strip_quotes(&scan.text);
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let stem = Self::scan_file_name(scan, &stamp);
        let path = write_new_file(&self.scans_dir, &stem, "csv", data)?;

        let fields: Vec<&str> = data.split(FIELD_DELIMITER).collect();
        if fields.len() != RECORD_FIELDS.len() {
            warn!(
                "Payload has {} fields, expected {}",
                fields.len(),
                RECORD_FIELDS.len()
            );
        }
        table::append_row(&self.results_csv(), &RECORD_FIELDS, &fields)?;

        info!("💾 Saved scan to {}", path.display());
        Ok(path)
    }

    fn write_match_summary(&mut self, state: &MatchState) -> Result<Option<PathBuf>, StorageError> {
        let Some(match_id) = state.match_id() else {
            return Ok(None);
        };
        if state.submitted_count() == 0 {
            return Ok(None);
        }

        let now = Local::now();
        let stem = format!("match_summary_{}_{}", match_id, now.format(STAMP_FORMAT));
        let path = write_new_file(
            &self.root,
            &stem,
            "txt",
            &render_match_summary(state, &now.to_rfc3339()),
        )?;

        info!("📋 Match summary written to {}", path.display());
        Ok(Some(path))
    }
}

/// Plain-text checklist of every station for the active match.
pub fn render_match_summary(state: &MatchState, generated_at: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Match Summary: {}\n",
        state.match_id().unwrap_or("-")
    ));
    out.push_str(&format!("Generated: {}\n", generated_at));
    out.push_str(&format!(
        "Scanned: {}/6 ({}%)\n\n",
        state.submitted_count(),
        state.percent_complete()
    ));
    for (station, submitted) in state.stations() {
        let mark = if submitted { "✓ SCANNED" } else { "✗ MISSING" };
        out.push_str(&format!("{}: {}\n", station, mark));
    }
    out
}

/// 内存存储（测试 / 演练用）
#[derive(Clone, Default)]
pub struct MemoryScanSink {
    scans: Arc<Mutex<Vec<AcceptedScan>>>,
    fail: bool,
}

impl MemoryScanSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Snapshot of everything persisted so far, shared across clones.
    pub fn scans(&self) -> Vec<AcceptedScan> {
        self.scans.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ScanSink for MemoryScanSink {
    fn persist(&mut self, scan: &AcceptedScan) -> Result<PathBuf, StorageError> {
        if self.fail {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only sink",
            )));
        }
        let mut scans = self
            .scans
            .lock()
            .map_err(|_| StorageError::Io(std::io::Error::other("sink lock poisoned")))?;
        scans.push(scan.clone());
        Ok(PathBuf::from(format!("memory://{}", scans.len())))
    }

    fn write_match_summary(
        &mut self,
        _state: &MatchState,
    ) -> Result<Option<PathBuf>, StorageError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_scan(text: &str) -> AcceptedScan {
        AcceptedScan {
            text: text.to_string(),
            station: crate::core::scanner::payload::parse_station(text),
            match_id: crate::core::scanner::payload::parse_match_id(text).map(String::from),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_persist_writes_scan_file_and_results_row() {
        let dir = tempdir().unwrap();
        let mut store = FileScanStore::open(dir.path()).unwrap();

        let path = store
            .persist(&create_scan("\"118,Jane,2025mi_qm12,Red,2025mi,2,12\""))
            .unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("qr_data_2025mi_qm12_Red2_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "118,Jane,2025mi_qm12,Red,2025mi,2,12"
        );

        store.persist(&create_scan("254,Sam,2025mi_qm12,Blue,2025mi,1,12")).unwrap();

        let results = fs::read_to_string(store.results_csv()).unwrap();
        let lines: Vec<&str> = results.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("teamNumber,scouterName,matchKey"));
        assert_eq!(lines[1], "118,Jane,2025mi_qm12,Red,2025mi,2,12");
    }

    #[test]
    fn test_unknown_station_file_name() {
        assert_eq!(
            FileScanStore::scan_file_name(&create_scan("hello"), "20250101_120000_000"),
            "qr_data_20250101_120000_000"
        );
    }

    #[test]
    fn test_back_to_back_scans_keep_separate_files() {
        let dir = tempdir().unwrap();
        let mut store = FileScanStore::open(dir.path()).unwrap();

        // neither payload carries a match or station, so the names differ
        // only by timestamp
        let first = store.persist(&create_scan("hello")).unwrap();
        let second = store.persist(&create_scan("world")).unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_dir(store.scans_dir()).unwrap().count(), 2);
        assert_eq!(fs::read_to_string(&first).unwrap(), "hello");
        assert_eq!(fs::read_to_string(&second).unwrap(), "world");
    }

    #[test]
    fn test_write_new_file_adds_suffix_on_collision() {
        let dir = tempdir().unwrap();
        let a = write_new_file(dir.path(), "qr_data_x", "csv", "one").unwrap();
        let b = write_new_file(dir.path(), "qr_data_x", "csv", "two").unwrap();
        let c = write_new_file(dir.path(), "qr_data_x", "csv", "three").unwrap();

        assert_eq!(a.file_name().unwrap(), "qr_data_x.csv");
        assert_eq!(b.file_name().unwrap(), "qr_data_x_1.csv");
        assert_eq!(c.file_name().unwrap(), "qr_data_x_2.csv");
        assert_eq!(fs::read_to_string(&a).unwrap(), "one");
    }

    #[test]
    fn test_match_summary() {
        let dir = tempdir().unwrap();
        let mut store = FileScanStore::open(dir.path()).unwrap();

        assert!(store.write_match_summary(&MatchState::Idle).unwrap().is_none());
        assert!(store
            .write_match_summary(&MatchState::active("qm1"))
            .unwrap()
            .is_none());

        let (state, _) =
            MatchState::active("qm1").transition(Some("qm1"), Some(StationIdentity::Blue2));
        let path = store.write_match_summary(&state).unwrap().unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("Scanned: 1/6"));
        assert!(text.contains("Blue 2: ✓ SCANNED"));
        assert!(text.contains("Red 1: ✗ MISSING"));
    }

    #[test]
    fn test_memory_sink_shares_records() {
        let sink = MemoryScanSink::new();
        let mut writer = sink.clone();
        writer.persist(&create_scan("a,b,c,Red,e,1")).unwrap();
        assert_eq!(sink.scans().len(), 1);

        let mut broken = MemoryScanSink::failing();
        assert!(broken.persist(&create_scan("x")).is_err());
    }
}
