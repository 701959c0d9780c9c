use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use serde_json::Value;

use super::insights::{write_insights_csv, TeamInsight, INSIGHTS_FILE};
use super::statbotics::StatboticsClient;
use super::tba::TbaClient;
use super::StatsError;
use crate::core::table::write_table;

pub const MATCH_RESULTS_FILE: &str = "results.csv";

const RESULT_COLUMNS: [&str; 21] = [
    "match_key",
    "match_name",
    "winner",
    "red_score",
    "blue_score",
    "red_auto_points",
    "blue_auto_points",
    "red_teleop_points",
    "blue_teleop_points",
    "red_endgame_points",
    "blue_endgame_points",
    "red_foul_points",
    "blue_foul_points",
    "red_total_pieces",
    "blue_total_pieces",
    "red_auto_bonus",
    "blue_auto_bonus",
    "red_coral_bonus",
    "blue_coral_bonus",
    "red_barge_bonus",
    "blue_barge_bonus",
];

/// Human-readable round name, e.g. `Qual 12` or `Semifinal 2 Match 1`.
pub fn format_match_name(tba_match: &Value) -> String {
    let comp_level = tba_match
        .get("comp_level")
        .and_then(Value::as_str)
        .unwrap_or("qm");
    let number = tba_match
        .get("match_number")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    let set = tba_match
        .get("set_number")
        .and_then(Value::as_u64)
        .unwrap_or(1);

    match comp_level {
        "qm" => format!("Qual {}", number),
        "qf" => format!("Quarterfinal {} Match {}", set, number),
        "sf" => format!("Semifinal {} Match {}", set, number),
        "f" => format!("Final {}", number),
        other => format!("{} {}", other.to_uppercase(), number),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllianceTeams {
    pub red: Vec<String>,
    pub blue: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchPrediction {
    pub winner: String,
    pub red_win_prob: f64,
    pub red_score: f64,
    pub blue_score: f64,
}

/// One alliance's TBA score breakdown. Game-specific counters read as zero
/// or `false` for seasons that do not report them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllianceResult {
    pub score: i64,
    pub no_foul: i64,
    pub auto_points: i64,
    pub teleop_points: i64,
    pub endgame_points: i64,
    pub foul_count: i64,
    pub tech_foul_count: i64,
    pub foul_points: i64,
    pub adjust_points: i64,
    pub auto_pieces: i64,
    pub teleop_pieces: i64,
    pub total_pieces: i64,
    pub rp: i64,
    pub auto_bonus: bool,
    pub coral_bonus: bool,
    pub barge_bonus: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchResult {
    pub winner: String,
    pub red: AllianceResult,
    pub blue: AllianceResult,
}

/// TBA 比赛信息 + Statbotics 预测 + 参赛队资料（OPR / EPA）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinedMatch {
    pub key: String,
    pub event: String,
    pub comp_level: String,
    pub elim: bool,
    pub match_number: u64,
    pub match_name: String,
    pub completed: bool,
    pub alliances: AllianceTeams,
    pub prediction: Option<MatchPrediction>,
    pub result: Option<MatchResult>,
    pub teams: Vec<TeamInsight>,
}

impl CombinedMatch {
    pub fn build(tba_match: &Value, prediction: Option<&Value>, teams: Vec<TeamInsight>) -> Self {
        let text = |name: &str| {
            tba_match
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let comp_level = text("comp_level");

        Self {
            key: text("key"),
            event: text("event_key"),
            elim: !comp_level.is_empty() && comp_level != "qm",
            comp_level,
            match_number: tba_match
                .get("match_number")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            match_name: format_match_name(tba_match),
            completed: tba_match
                .get("actual_time")
                .and_then(Value::as_i64)
                .is_some_and(|t| t > 0),
            alliances: alliance_teams(tba_match),
            prediction: prediction.map(parse_prediction),
            result: parse_result(tba_match),
            teams,
        }
    }

    /// Every team number on the field, red first.
    pub fn team_numbers(&self) -> Vec<u64> {
        self.alliances
            .red
            .iter()
            .chain(&self.alliances.blue)
            .filter_map(|t| t.parse().ok())
            .collect()
    }

    /// The single row of the match `results.csv`.
    pub fn result_row(&self) -> Vec<String> {
        let result = self.result.clone().unwrap_or_default();
        let (red, blue) = (&result.red, &result.blue);
        let mut row = vec![
            self.key.clone(),
            self.match_name.clone(),
            result.winner.clone(),
        ];
        for (r, b) in [
            (red.score, blue.score),
            (red.auto_points, blue.auto_points),
            (red.teleop_points, blue.teleop_points),
            (red.endgame_points, blue.endgame_points),
            (red.foul_points, blue.foul_points),
            (red.total_pieces, blue.total_pieces),
        ] {
            row.push(r.to_string());
            row.push(b.to_string());
        }
        for (r, b) in [
            (red.auto_bonus, blue.auto_bonus),
            (red.coral_bonus, blue.coral_bonus),
            (red.barge_bonus, blue.barge_bonus),
        ] {
            row.push(r.to_string());
            row.push(b.to_string());
        }
        row
    }
}

fn alliance_teams(tba_match: &Value) -> AllianceTeams {
    let keys = |color: &str| -> Vec<String> {
        tba_match
            .pointer(&format!("/alliances/{}/team_keys", color))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|k| k.trim_start_matches("frc").to_string())
                    .collect()
            })
            .unwrap_or_default()
    };
    AllianceTeams {
        red: keys("red"),
        blue: keys("blue"),
    }
}

fn parse_prediction(pred: &Value) -> MatchPrediction {
    // v3 nests predictions under "pred"; older payloads keep them at the top
    let source = pred.get("pred").unwrap_or(pred);
    let num = |name: &str| source.get(name).and_then(Value::as_f64).unwrap_or(0.0);
    MatchPrediction {
        winner: source
            .get("winner")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        red_win_prob: num("red_win_prob"),
        red_score: num("red_score"),
        blue_score: num("blue_score"),
    }
}

fn parse_result(tba_match: &Value) -> Option<MatchResult> {
    let breakdown = tba_match.get("score_breakdown").filter(|b| b.is_object())?;
    let alliance = |color: &str| {
        let Some(score) = breakdown.get(color) else {
            return AllianceResult::default();
        };
        let num = |name: &str| score.get(name).and_then(Value::as_i64).unwrap_or(0);
        let flag = |name: &str| score.get(name).and_then(Value::as_bool).unwrap_or(false);
        let auto_pieces = num("autoCoralCount");
        let teleop_pieces = num("teleopCoralCount");
        AllianceResult {
            score: num("totalPoints"),
            no_foul: num("totalPoints") - num("foulPoints"),
            auto_points: num("autoPoints"),
            teleop_points: num("teleopPoints"),
            endgame_points: num("endGameBargePoints"),
            foul_count: num("foulCount"),
            tech_foul_count: num("techFoulCount"),
            foul_points: num("foulPoints"),
            adjust_points: num("adjustPoints"),
            auto_pieces,
            teleop_pieces,
            total_pieces: auto_pieces + teleop_pieces,
            rp: num("rp"),
            auto_bonus: flag("autoBonusAchieved"),
            coral_bonus: flag("coralBonusAchieved"),
            barge_bonus: flag("bargeBonusAchieved"),
        }
    };

    Some(MatchResult {
        winner: tba_match
            .get("winning_alliance")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        red: alliance("red"),
        blue: alliance("blue"),
    })
}

/// Fetch one match from TBA, its Statbotics prediction, and for every team
/// on the field the TBA team info, event OPR and EPA. `Ok(None)` when TBA has
/// no such match.
pub fn fetch_combined_match(
    tba: &TbaClient,
    statbotics: &StatboticsClient,
    match_key: &str,
) -> Result<Option<CombinedMatch>, StatsError> {
    let Some(tba_match) = tba.fetch_match(match_key)? else {
        return Ok(None);
    };
    let prediction = statbotics.get_match_prediction(match_key)?;
    let mut combined = CombinedMatch::build(&tba_match, prediction.as_ref(), Vec::new());

    let mut numbers = combined.team_numbers();
    if numbers.is_empty() {
        numbers = tba.fetch_match_teams(match_key)?;
    }
    let oprs = match combined.event.as_str() {
        "" => None,
        event => tba.fetch_oprs(event)?,
    };
    let epas = statbotics.fetch_team_epa(&numbers);

    for epa in epas {
        let info = tba.fetch_team_info(epa.team)?;
        combined
            .teams
            .push(TeamInsight::new(epa.team, info.as_ref(), oprs.as_ref(), epa));
    }
    Ok(Some(combined))
}

/// Write `<key>_combined.json`, `results.csv` and `Team_Insights.csv` into
/// `output_dir`. The two CSVs are replaced on every call.
pub fn write_match_files(
    combined: &CombinedMatch,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, StatsError> {
    fs::create_dir_all(output_dir)?;

    let json_path = output_dir.join(format!("{}_combined.json", combined.key));
    fs::write(&json_path, serde_json::to_string_pretty(combined)?)?;

    let results_path = output_dir.join(MATCH_RESULTS_FILE);
    write_table(&results_path, &RESULT_COLUMNS, &[combined.result_row()])?;

    let insights_path = output_dir.join(INSIGHTS_FILE);
    write_insights_csv(&combined.teams, &insights_path)?;

    info!("💾 Match {} saved to {}", combined.key, output_dir.display());
    Ok(vec![json_path, results_path, insights_path])
}
