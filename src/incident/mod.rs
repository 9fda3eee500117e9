//! Incident classification and alert throttling.
//!
//! The classifier is a pure combination step: identical extractor outputs
//! always yield identical candidate sets. The throttle is the only stateful
//! piece, one independent cooldown per category per session.

mod classifier;
mod throttle;

pub use classifier::{classify_frame, CandidateIncident, Evidence, FrameIndicators};
pub use throttle::{AlertThrottle, ThrottleState};
