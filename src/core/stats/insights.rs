//! Per-team scouting sheet: TBA team info and OPR next to Statbotics EPA.

use std::path::Path;

use log::info;
use serde::Serialize;
use serde_json::Value;

use super::statbotics::{StatboticsClient, TeamEpa};
use super::tba::TbaClient;
use super::StatsError;
use crate::core::table::write_table;

pub const INSIGHTS_FILE: &str = "Team_Insights.csv";

pub const INSIGHT_COLUMNS: [&str; 14] = [
    "team",
    "nickname",
    "city",
    "state",
    "country",
    "opr",
    "epa_current",
    "epa_recent",
    "epa_mean",
    "epa_max",
    "wins",
    "losses",
    "ties",
    "win_rate",
];

/// 一支队伍的汇总行
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeamInsight {
    pub team: u64,
    pub nickname: String,
    pub name: String,
    pub city: String,
    pub state_prov: String,
    pub country: String,
    pub opr: f64,
    pub epa: TeamEpa,
}

impl TeamInsight {
    /// `info` is a TBA team object, `oprs` the `/event/{key}/oprs` response.
    /// Anything missing reads as empty or zero.
    pub fn new(team: u64, info: Option<&Value>, oprs: Option<&Value>, epa: TeamEpa) -> Self {
        let text = |name: &str| {
            info.and_then(|i| i.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            team,
            nickname: text("nickname"),
            name: text("name"),
            city: text("city"),
            state_prov: text("state_prov"),
            country: text("country"),
            opr: opr_for(oprs, team),
            epa,
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        let record = &self.epa.record;
        vec![
            self.team.to_string(),
            self.nickname.clone(),
            self.city.clone(),
            self.state_prov.clone(),
            self.country.clone(),
            self.opr.to_string(),
            self.epa.current.to_string(),
            self.epa.recent.to_string(),
            self.epa.mean.to_string(),
            self.epa.max.to_string(),
            record.wins.to_string(),
            record.losses.to_string(),
            record.ties.to_string(),
            record.winrate.to_string(),
        ]
    }
}

/// OPR of `team` from an `/event/{key}/oprs` response, 0 when absent.
pub fn opr_for(oprs: Option<&Value>, team: u64) -> f64 {
    oprs.and_then(|o| o.get("oprs"))
        .and_then(|o| o.get(format!("frc{}", team)))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Team numbers in an `/event/{key}/teams` response, in response order.
pub fn team_numbers(teams: &Value) -> Vec<u64> {
    teams
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t.get("team_number").and_then(Value::as_u64))
                .collect()
        })
        .unwrap_or_default()
}

/// Join event teams with OPRs and EPAs; sorted by current EPA, best first.
pub fn build_insights(teams: &Value, oprs: Option<&Value>, epas: &[TeamEpa]) -> Vec<TeamInsight> {
    let mut rows: Vec<TeamInsight> = teams
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|info| {
            let team = info.get("team_number").and_then(Value::as_u64)?;
            let epa = epas
                .iter()
                .find(|e| e.team == team)
                .copied()
                .unwrap_or_else(|| TeamEpa::zeroed(team));
            Some(TeamInsight::new(team, Some(info), oprs, epa))
        })
        .collect();

    rows.sort_by(|a, b| b.epa.current.total_cmp(&a.epa.current));
    rows
}

pub fn write_insights_csv(rows: &[TeamInsight], path: &Path) -> Result<(), StatsError> {
    let table: Vec<Vec<String>> = rows.iter().map(TeamInsight::to_row).collect();
    write_table(path, &INSIGHT_COLUMNS, &table)?;
    Ok(())
}

/// Every team at `event_key` with OPR and EPA. Empty when TBA lists no teams.
pub fn fetch_team_insights(
    tba: &TbaClient,
    statbotics: &StatboticsClient,
    event_key: &str,
) -> Result<Vec<TeamInsight>, StatsError> {
    let Some(teams) = tba.fetch_teams(event_key)? else {
        return Ok(Vec::new());
    };
    let numbers = team_numbers(&teams);
    if numbers.is_empty() {
        return Ok(Vec::new());
    }
    info!("👥 {} teams at {}, fetching OPR and EPA", numbers.len(), event_key);

    let oprs = tba.fetch_oprs(event_key)?;
    let epas = statbotics.fetch_team_epa(&numbers);
    Ok(build_insights(&teams, oprs.as_ref(), &epas))
}
