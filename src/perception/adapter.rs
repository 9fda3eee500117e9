use anyhow::Result;

use crate::frame::{BoundingBox, Frame};

use super::types::{
    EmotionScores, FaceBox, FrameObservations, GenderEstimate, HandPose, ModelOutcome, PersonPose,
    RawDetection,
};

/// Object detector family. Receives RGB, returns detections in normalized
/// detector space with max-class scores.
pub trait ObjectDetector: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Pose family. One call returns zero or more people.
pub trait PoseEstimator: Send {
    fn name(&self) -> &'static str;

    fn estimate(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<PersonPose>>;
}

/// Hand landmark family.
pub trait HandTracker: Send {
    fn name(&self) -> &'static str;

    fn track(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<HandPose>>;
}

/// Face detector family. Returns pixel-space boxes.
pub trait FaceDetector: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<FaceBox>>;
}

/// Per-face gender classifier. Receives a BGR crop.
///
/// Implementations apply their own decision boundary and return `None`
/// below their confidence floor; callers only ever see confident estimates.
pub trait GenderClassifier: Send {
    fn name(&self) -> &'static str;

    fn classify(&mut self, face_bgr: &[u8], width: u32, height: u32)
        -> Result<Option<GenderEstimate>>;
}

/// Per-face emotion analyzer. Receives a BGR crop, scores on a 0-100 scale.
pub trait EmotionAnalyzer: Send {
    fn name(&self) -> &'static str;

    fn analyze(&mut self, face_bgr: &[u8], width: u32, height: u32) -> Result<EmotionScores>;
}

/// Whole-frame violence classifier, scalar score in [0, 1]. Receives BGR.
pub trait ViolenceScorer: Send {
    fn name(&self) -> &'static str;

    fn score(&mut self, bgr: &[u8], width: u32, height: u32) -> Result<f32>;
}

/// Owns one backend per model family for the lifetime of a session.
///
/// Models are loaded per session and never shared across sessions.
pub struct PerceptionAdapter {
    objects: Box<dyn ObjectDetector>,
    poses: Box<dyn PoseEstimator>,
    hands: Box<dyn HandTracker>,
    faces: Box<dyn FaceDetector>,
    gender: Box<dyn GenderClassifier>,
    emotion: Box<dyn EmotionAnalyzer>,
    violence: Box<dyn ViolenceScorer>,
}

impl PerceptionAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        objects: Box<dyn ObjectDetector>,
        poses: Box<dyn PoseEstimator>,
        hands: Box<dyn HandTracker>,
        faces: Box<dyn FaceDetector>,
        gender: Box<dyn GenderClassifier>,
        emotion: Box<dyn EmotionAnalyzer>,
        violence: Box<dyn ViolenceScorer>,
    ) -> Self {
        Self {
            objects,
            poses,
            hands,
            faces,
            gender,
            emotion,
            violence,
        }
    }

    /// Run the eager model families on one frame.
    ///
    /// RGB is derived once and shared by the families that need it. Any
    /// family failure degrades to `Unavailable` for this frame only.
    pub fn observe(&mut self, frame: &Frame) -> FrameObservations {
        let rgb = frame.to_rgb();
        let (w, h) = (frame.width, frame.height);

        FrameObservations {
            objects: outcome(self.objects.name(), self.objects.detect(&rgb, w, h)),
            poses: outcome(self.poses.name(), self.poses.estimate(&rgb, w, h)),
            hands: outcome(self.hands.name(), self.hands.track(&rgb, w, h)),
            faces: outcome(self.faces.name(), self.faces.detect(&rgb, w, h)),
            violence_score: outcome(self.violence.name(), self.violence.score(frame.bgr(), w, h)),
        }
    }

    /// Classify the gender of one face. Boxes with no frame overlap read as
    /// "no confident estimate", matching how invalid face crops are skipped.
    pub fn face_gender(
        &mut self,
        frame: &Frame,
        bbox: &BoundingBox,
    ) -> ModelOutcome<Option<GenderEstimate>> {
        let Some((crop, w, h)) = frame.crop_bgr(bbox) else {
            return ModelOutcome::Ready(None);
        };
        outcome(self.gender.name(), self.gender.classify(&crop, w, h))
    }

    /// Score one face for fear. Only called behind the thumbs-down gate.
    pub fn face_emotion(&mut self, frame: &Frame, bbox: &BoundingBox) -> ModelOutcome<EmotionScores> {
        let Some((crop, w, h)) = frame.crop_bgr(bbox) else {
            return ModelOutcome::Unavailable;
        };
        outcome(self.emotion.name(), self.emotion.analyze(&crop, w, h))
    }
}

fn outcome<T>(family: &str, result: Result<T>) -> ModelOutcome<T> {
    match result {
        Ok(value) => ModelOutcome::Ready(value),
        Err(e) => {
            log::debug!(
                "{}: model '{}' degraded this frame: {}",
                crate::FaultKind::ModelUnavailable,
                family,
                e
            );
            ModelOutcome::Unavailable
        }
    }
}
