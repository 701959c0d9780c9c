//! 赛事数据导出入口

use std::path::{Path, PathBuf};

use log::info;

use crate::config::StatsSettings;
use crate::core::stats::{
    convert_to_csv, event_output_dir, fetch_combined_match, fetch_team_insights,
    write_insights_csv, write_match_files, CombinedMatch, StatboticsClient, StatsError, TbaClient,
    INSIGHTS_FILE,
};

/// Where and how an event export is written.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub base_dir: PathBuf,
    /// Reuse `<base>/<event>` instead of a new timestamped directory.
    pub update_existing: bool,
}

impl ExportTarget {
    pub fn new(base_dir: impl Into<PathBuf>, update_existing: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            update_existing,
        }
    }

    pub fn event_dir(&self, event_key: &str) -> PathBuf {
        event_output_dir(&self.base_dir, event_key, self.update_existing)
    }
}

/// Result of an event export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub event_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

fn tba_client(settings: &StatsSettings, api_key: Option<&str>) -> Result<TbaClient, StatsError> {
    let key = api_key
        .or(settings.tba_api_key.as_deref())
        .ok_or(StatsError::MissingApiKey)?;
    Ok(TbaClient::new(key)?.with_base_url(settings.tba_base_url.as_str()))
}

fn statbotics_client(settings: &StatsSettings) -> Result<StatboticsClient, StatsError> {
    Ok(StatboticsClient::new()?.with_base_url(settings.statbotics_base_url.as_str()))
}

/// Fetch every TBA section for `event_key` and write one CSV per section.
/// `api_key` overrides the configured key.
pub fn export_tba_event(
    settings: &StatsSettings,
    api_key: Option<&str>,
    event_key: &str,
    target: &ExportTarget,
) -> Result<ExportSummary, StatsError> {
    let client = tba_client(settings, api_key)?;
    let dataset = client.get_event_data(event_key)?;
    let event_dir = target.event_dir(event_key);
    let files = convert_to_csv(&dataset, &event_dir)?;
    info!("✅ TBA export for {}: {} files", event_key, files.len());
    Ok(ExportSummary { event_dir, files })
}

pub fn export_statbotics_event(
    settings: &StatsSettings,
    event_key: &str,
    target: &ExportTarget,
) -> Result<ExportSummary, StatsError> {
    let dataset = statbotics_client(settings)?.get_event_data(event_key)?;
    let event_dir = target.event_dir(event_key);
    let files = convert_to_csv(&dataset, &event_dir)?;
    info!("✅ Statbotics export for {}: {} files", event_key, files.len());
    Ok(ExportSummary { event_dir, files })
}

/// TBA match + Statbotics prediction + team info, OPR and EPA in one record.
pub fn combined_match(
    settings: &StatsSettings,
    api_key: Option<&str>,
    match_key: &str,
) -> Result<Option<CombinedMatch>, StatsError> {
    let tba = tba_client(settings, api_key)?;
    let statbotics = statbotics_client(settings)?;
    fetch_combined_match(&tba, &statbotics, match_key)
}

/// Same as [`combined_match`], then writes the JSON record and the match
/// CSVs into `output_dir`.
pub fn save_combined_match(
    settings: &StatsSettings,
    api_key: Option<&str>,
    match_key: &str,
    output_dir: &Path,
) -> Result<Option<(CombinedMatch, Vec<PathBuf>)>, StatsError> {
    let Some(combined) = combined_match(settings, api_key, match_key)? else {
        return Ok(None);
    };
    let files = write_match_files(&combined, output_dir)?;
    Ok(Some((combined, files)))
}

/// `Team_Insights.csv` for every team at the event, best EPA first.
/// `Ok(None)` when TBA lists no teams.
pub fn team_insights(
    settings: &StatsSettings,
    api_key: Option<&str>,
    event_key: &str,
    output_dir: &Path,
) -> Result<Option<PathBuf>, StatsError> {
    let tba = tba_client(settings, api_key)?;
    let statbotics = statbotics_client(settings)?;
    let rows = fetch_team_insights(&tba, &statbotics, event_key)?;
    if rows.is_empty() {
        return Ok(None);
    }

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(INSIGHTS_FILE);
    write_insights_csv(&rows, &path)?;
    info!("✅ Team insights for {} teams at {}", rows.len(), event_key);
    Ok(Some(path))
}
