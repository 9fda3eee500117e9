//! Stub perception backends.
//!
//! Static backends return a fixed result every frame; sequence backends pop
//! scripted results call by call. They drive unit tests, the `stub://`
//! sources, and daemon builds compiled without a real inference feature.

use anyhow::Result;

use super::adapter::{
    EmotionAnalyzer, FaceDetector, GenderClassifier, HandTracker, ObjectDetector,
    PerceptionAdapter, PoseEstimator, ViolenceScorer,
};
use super::types::{EmotionScores, FaceBox, GenderEstimate, HandPose, PersonPose, RawDetection};

/// Adapter wired entirely with empty stubs: no detections, violence 0.0.
pub fn stub_adapter() -> PerceptionAdapter {
    PerceptionAdapter::new(
        Box::new(StaticObjectDetector::default()),
        Box::new(StaticPoseEstimator::default()),
        Box::new(StaticHandTracker::default()),
        Box::new(StaticFaceDetector::default()),
        Box::new(SequenceGenderClassifier::default()),
        Box::new(FixedEmotionAnalyzer::new(0.0)),
        Box::new(FixedViolenceScorer::new(0.0)),
    )
}

#[derive(Default)]
pub struct StaticObjectDetector {
    pub detections: Vec<RawDetection>,
}

impl StaticObjectDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }
}

impl ObjectDetector for StaticObjectDetector {
    fn name(&self) -> &'static str {
        "stub-objects"
    }

    fn detect(&mut self, _rgb: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }
}

#[derive(Default)]
pub struct StaticPoseEstimator {
    pub poses: Vec<PersonPose>,
}

impl StaticPoseEstimator {
    pub fn new(poses: Vec<PersonPose>) -> Self {
        Self { poses }
    }
}

impl PoseEstimator for StaticPoseEstimator {
    fn name(&self) -> &'static str {
        "stub-pose"
    }

    fn estimate(&mut self, _rgb: &[u8], _width: u32, _height: u32) -> Result<Vec<PersonPose>> {
        Ok(self.poses.clone())
    }
}

#[derive(Default)]
pub struct StaticHandTracker {
    pub hands: Vec<HandPose>,
}

impl StaticHandTracker {
    pub fn new(hands: Vec<HandPose>) -> Self {
        Self { hands }
    }
}

impl HandTracker for StaticHandTracker {
    fn name(&self) -> &'static str {
        "stub-hands"
    }

    fn track(&mut self, _rgb: &[u8], _width: u32, _height: u32) -> Result<Vec<HandPose>> {
        Ok(self.hands.clone())
    }
}

#[derive(Default)]
pub struct StaticFaceDetector {
    pub faces: Vec<FaceBox>,
}

impl StaticFaceDetector {
    pub fn new(faces: Vec<FaceBox>) -> Self {
        Self { faces }
    }
}

impl FaceDetector for StaticFaceDetector {
    fn name(&self) -> &'static str {
        "stub-faces"
    }

    fn detect(&mut self, _rgb: &[u8], _width: u32, _height: u32) -> Result<Vec<FaceBox>> {
        Ok(self.faces.clone())
    }
}

/// Pops one scripted answer per classify call, in face order. Returns `None`
/// once the script is exhausted.
#[derive(Default)]
pub struct SequenceGenderClassifier {
    pub answers: std::collections::VecDeque<Option<GenderEstimate>>,
}

impl SequenceGenderClassifier {
    pub fn new(answers: Vec<Option<GenderEstimate>>) -> Self {
        Self {
            answers: answers.into(),
        }
    }
}

impl GenderClassifier for SequenceGenderClassifier {
    fn name(&self) -> &'static str {
        "stub-gender"
    }

    fn classify(
        &mut self,
        _face_bgr: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Option<GenderEstimate>> {
        Ok(self.answers.pop_front().flatten())
    }
}

pub struct FixedEmotionAnalyzer {
    pub fear: f32,
}

impl FixedEmotionAnalyzer {
    pub fn new(fear: f32) -> Self {
        Self { fear }
    }
}

impl EmotionAnalyzer for FixedEmotionAnalyzer {
    fn name(&self) -> &'static str {
        "stub-emotion"
    }

    fn analyze(&mut self, _face_bgr: &[u8], _width: u32, _height: u32) -> Result<EmotionScores> {
        Ok(EmotionScores { fear: self.fear })
    }
}

pub struct FixedViolenceScorer {
    pub score: f32,
}

impl FixedViolenceScorer {
    pub fn new(score: f32) -> Self {
        Self { score }
    }
}

impl ViolenceScorer for FixedViolenceScorer {
    fn name(&self) -> &'static str {
        "stub-violence"
    }

    fn score(&mut self, _bgr: &[u8], _width: u32, _height: u32) -> Result<f32> {
        Ok(self.score)
    }
}

/// Pops one scripted score per frame; repeats the last score when exhausted.
pub struct SequenceViolenceScorer {
    scores: Vec<f32>,
    next: usize,
}

impl SequenceViolenceScorer {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores, next: 0 }
    }
}

impl ViolenceScorer for SequenceViolenceScorer {
    fn name(&self) -> &'static str {
        "stub-violence-seq"
    }

    fn score(&mut self, _bgr: &[u8], _width: u32, _height: u32) -> Result<f32> {
        let idx = self.next.min(self.scores.len().saturating_sub(1));
        self.next += 1;
        Ok(self.scores.get(idx).copied().unwrap_or(0.0))
    }
}
