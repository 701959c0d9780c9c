use serde::Serialize;

use super::payload::StationIdentity;

pub const STATION_COUNT: usize = 6;

/// 当前比赛的提交状态
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum MatchState {
    #[default]
    Idle,
    Active {
        match_id: String,
        submitted: [bool; STATION_COUNT],
    },
}

/// What an accepted submission changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchUpdate {
    /// A different match id replaced the previous state.
    pub new_match: bool,
    /// Station whose flag went from unsubmitted to submitted.
    pub marked: Option<StationIdentity>,
}

impl MatchState {
    pub fn new() -> Self {
        MatchState::Idle
    }

    pub fn active(match_id: impl Into<String>) -> Self {
        MatchState::Active {
            match_id: match_id.into(),
            submitted: [false; STATION_COUNT],
        }
    }

    pub fn match_id(&self) -> Option<&str> {
        match self {
            MatchState::Idle => None,
            MatchState::Active { match_id, .. } => Some(match_id),
        }
    }

    pub fn is_submitted(&self, station: StationIdentity) -> bool {
        match self {
            MatchState::Idle => false,
            MatchState::Active { submitted, .. } => submitted[station.index()],
        }
    }

    pub fn submitted_count(&self) -> usize {
        match self {
            MatchState::Idle => 0,
            MatchState::Active { submitted, .. } => submitted.iter().filter(|s| **s).count(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.submitted_count() == STATION_COUNT
    }

    pub fn percent_complete(&self) -> u8 {
        (self.submitted_count() * 100 / STATION_COUNT) as u8
    }

    /// `(station, submitted)` in display order, Red 1 through Blue 3.
    pub fn stations(&self) -> impl Iterator<Item = (StationIdentity, bool)> + '_ {
        StationIdentity::ALL
            .into_iter()
            .map(move |station| (station, self.is_submitted(station)))
    }

    /// State after one accepted submission.
    ///
    /// A match id different from the current one starts a fresh `Active`
    /// state with every flag cleared. Without a match id the current state is
    /// kept, so an `Idle` tracker stays idle.
    pub fn transition(
        &self,
        match_id: Option<&str>,
        station: Option<StationIdentity>,
    ) -> (MatchState, MatchUpdate) {
        let mut update = MatchUpdate::default();

        let mut next = match (self, match_id) {
            (_, Some(id)) if self.match_id() != Some(id) => {
                update.new_match = true;
                MatchState::active(id)
            }
            _ => self.clone(),
        };

        if let (MatchState::Active { submitted, .. }, Some(station)) = (&mut next, station) {
            let flag = &mut submitted[station.index()];
            if !*flag {
                *flag = true;
                update.marked = Some(station);
            }
        }

        (next, update)
    }
}
