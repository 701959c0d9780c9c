pub mod scan;

pub use scan::{ActivityEntry, ActivityLevel, ActivityLog, MatchSnapshot, ScanEvent, StationStatus};
