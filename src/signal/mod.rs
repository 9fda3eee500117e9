//! Per-frame signal extractors.
//!
//! Extractors turn raw model outputs into normalized indicators. They are
//! pure with one exception: the violence score buffer, which carries the
//! only cross-frame memory in the pipeline (a trailing mean that trades up
//! to one buffer-length of latency for single-frame false-positive
//! suppression).

mod distress;
mod objects;
mod pose;
mod violence;

pub use distress::{evaluate_distress, DistressSignal};
pub use objects::{dangerous_objects, DangerousObject};
pub use pose::{analyze_poses, PoseSignals};
pub use violence::ViolenceScoreBuffer;
