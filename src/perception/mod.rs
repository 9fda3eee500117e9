//! Perception adapter layer.
//!
//! Each external model family sits behind a trait with one per-frame call
//! returning a typed result. The adapter owns one backend per family and
//! degrades any backend failure to `ModelOutcome::Unavailable` for that
//! family and that frame only; a failing model never blocks the others and
//! never aborts the frame loop.
//!
//! Color contract: the landmark families (pose, hands, faces) and the object
//! detector receive RGB; the violence scorer and the per-face classifiers
//! receive native BGR. Conversion happens exactly once per frame, here.

mod adapter;
pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod tract;
mod types;

pub use adapter::{
    EmotionAnalyzer, FaceDetector, GenderClassifier, HandTracker, ObjectDetector,
    PerceptionAdapter, PoseEstimator, ViolenceScorer,
};
pub use types::{
    EmotionScores, FaceBox, FrameObservations, Gender, GenderEstimate, HandPose, Landmark,
    ModelOutcome, PersonPose, RawDetection, HAND_MIDDLE_FINGER_TIP, HAND_THUMB_MCP, HAND_THUMB_TIP,
    POSE_LEFT_SHOULDER, POSE_LEFT_WRIST, POSE_NOSE, POSE_RIGHT_SHOULDER, POSE_RIGHT_WRIST,
};
