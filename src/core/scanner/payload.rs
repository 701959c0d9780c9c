//! Scouting payload layout: one comma-separated record per tablet submission.
//!
//! Field 2 carries the match key, field 3 the alliance colour and field 5 the
//! station number. Anything that does not parse degrades to "unknown" instead
//! of failing.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const FIELD_DELIMITER: char = ',';

/// 固定字段表头（与平板端导出顺序一致）
pub const RECORD_FIELDS: [&str; 27] = [
    "teamNumber",
    "scouterName",
    "matchKey",
    "allianceColor",
    "eventKey",
    "station",
    "matchNumber",
    "auton_CoralScoringLevel1",
    "auton_CoralScoringLevel2",
    "auton_CoralScoringLevel3",
    "auton_CoralScoringLevel4",
    "auton_LeftBarge",
    "auton_AlgaeScoringProcessor",
    "auton_AlgaeScoringBarge",
    "botLocation",
    "teleop_CoralScoringLevel1",
    "teleop_CoralScoringLevel2",
    "teleop_CoralScoringLevel3",
    "teleop_CoralScoringLevel4",
    "teleop_AlgaeScoringBarge",
    "teleop_AlgaeScoringProcessor",
    "teleop_AlgaePickUp",
    "teleop_Defense",
    "endgame_Deep_Climb",
    "endgame_Shallow_Climb",
    "endgame_Park",
    "endgame_Comments",
];

const MATCH_KEY_FIELD: usize = 2;
const ALLIANCE_FIELD: usize = 3;
const STATION_FIELD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Alliance {
    Red,
    Blue,
}

impl Alliance {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("red") {
            Some(Alliance::Red)
        } else if text.eq_ignore_ascii_case("blue") {
            Some(Alliance::Blue)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Alliance::Red => "Red",
            Alliance::Blue => "Blue",
        }
    }
}

/// 六个平板位：红 1-3，蓝 1-3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StationIdentity {
    Red1,
    Red2,
    Red3,
    Blue1,
    Blue2,
    Blue3,
}

impl StationIdentity {
    pub const ALL: [StationIdentity; 6] = [
        StationIdentity::Red1,
        StationIdentity::Red2,
        StationIdentity::Red3,
        StationIdentity::Blue1,
        StationIdentity::Blue2,
        StationIdentity::Blue3,
    ];

    pub fn new(alliance: Alliance, number: u8) -> Option<Self> {
        let station = match (alliance, number) {
            (Alliance::Red, 1) => StationIdentity::Red1,
            (Alliance::Red, 2) => StationIdentity::Red2,
            (Alliance::Red, 3) => StationIdentity::Red3,
            (Alliance::Blue, 1) => StationIdentity::Blue1,
            (Alliance::Blue, 2) => StationIdentity::Blue2,
            (Alliance::Blue, 3) => StationIdentity::Blue3,
            _ => return None,
        };
        Some(station)
    }

    /// Position in [`StationIdentity::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn alliance(&self) -> Alliance {
        match self {
            StationIdentity::Red1 | StationIdentity::Red2 | StationIdentity::Red3 => Alliance::Red,
            _ => Alliance::Blue,
        }
    }

    pub fn number(&self) -> u8 {
        (self.index() % 3) as u8 + 1
    }

    /// Compact form used in file names, e.g. `Red2`.
    pub fn file_tag(&self) -> String {
        format!("{}{}", self.alliance().as_str(), self.number())
    }
}

impl fmt::Display for StationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.alliance().as_str(), self.number())
    }
}

/// Removes any surrounding single or double quotes.
pub fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'')
}

/// Alliance colour from field 3 and station number from field 5. Needs at
/// least six fields; anything else is unknown.
pub fn parse_station(text: &str) -> Option<StationIdentity> {
    let parts: Vec<&str> = strip_quotes(text).split(FIELD_DELIMITER).collect();
    if parts.len() <= STATION_FIELD {
        return None;
    }
    let alliance = Alliance::parse(parts[ALLIANCE_FIELD])?;
    let number = parts[STATION_FIELD].trim().parse::<u8>().ok()?;
    StationIdentity::new(alliance, number)
}

/// Match key from field 2, when the payload has at least four fields.
pub fn parse_match_id(text: &str) -> Option<&str> {
    let parts: Vec<&str> = strip_quotes(text).split(FIELD_DELIMITER).collect();
    if parts.len() <= ALLIANCE_FIELD {
        return None;
    }
    let key = parts[MATCH_KEY_FIELD].trim();
    (!key.is_empty()).then_some(key)
}

/// A payload split into its fields, paired with [`RECORD_FIELDS`] by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoutingRecord {
    fields: Vec<String>,
}

impl ScoutingRecord {
    pub fn parse(text: &str) -> Self {
        let fields = strip_quotes(text)
            .split(FIELD_DELIMITER)
            .map(|f| f.to_string())
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let idx = RECORD_FIELDS.iter().position(|f| *f == name)?;
        self.fields.get(idx).map(|s| s.as_str())
    }

    pub fn team_number(&self) -> Option<u32> {
        self.get("teamNumber")?.trim().parse().ok()
    }

    /// Exactly one value per header field and a numeric team number.
    pub fn is_well_formed(&self) -> bool {
        self.fields.len() == RECORD_FIELDS.len() && self.team_number().is_some()
    }
}
