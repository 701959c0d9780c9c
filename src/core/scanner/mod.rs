pub mod capture;
pub mod contour;
pub mod decoder;
pub mod deduplicator;
pub mod frame;
pub mod match_state;
pub mod payload;
pub mod pipeline;
pub mod region_detector;
pub mod throttle;
pub mod types;

pub use capture::{CaptureError, CaptureSettings, CaptureWorker, FrameSource, ImageSequenceSource};
pub use decoder::{CodeDecoder, DecodeError, MockDecoder, RqrrDecoder};
pub use deduplicator::{Evaluation, Feedback, ScanDeduplicator, ScanOutcome, TrackingSettings};
pub use frame::Frame;
pub use match_state::MatchState;
pub use payload::StationIdentity;
pub use pipeline::{FrameReport, PipelineConfig, ScanPipeline};
pub use region_detector::{DetectionSettings, RegionDetector};
pub use throttle::{LoadProbe, SystemMemoryProbe};
pub use types::{BoundingBox, DecodedPayload, Region};
