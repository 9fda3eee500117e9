use serde::{Deserialize, Serialize};

use crate::frame::BoundingBox;

// Landmark indices follow the usual 33-point pose / 21-point hand layouts.
pub const POSE_NOSE: usize = 0;
pub const POSE_LEFT_SHOULDER: usize = 11;
pub const POSE_RIGHT_SHOULDER: usize = 12;
pub const POSE_LEFT_WRIST: usize = 15;
pub const POSE_RIGHT_WRIST: usize = 16;

pub const HAND_THUMB_MCP: usize = 2;
pub const HAND_THUMB_TIP: usize = 4;
pub const HAND_MIDDLE_FINGER_TIP: usize = 12;

/// One landmark in normalized image coordinates. Smaller y is higher.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Landmark) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One person's pose landmarks for one frame.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PersonPose {
    pub landmarks: Vec<Landmark>,
}

impl PersonPose {
    pub fn landmark(&self, index: usize) -> Option<Landmark> {
        self.landmarks.get(index).copied()
    }

    pub fn nose(&self) -> Option<Landmark> {
        self.landmark(POSE_NOSE)
    }

    pub fn left_shoulder(&self) -> Option<Landmark> {
        self.landmark(POSE_LEFT_SHOULDER)
    }

    pub fn right_shoulder(&self) -> Option<Landmark> {
        self.landmark(POSE_RIGHT_SHOULDER)
    }

    pub fn left_wrist(&self) -> Option<Landmark> {
        self.landmark(POSE_LEFT_WRIST)
    }

    pub fn right_wrist(&self) -> Option<Landmark> {
        self.landmark(POSE_RIGHT_WRIST)
    }
}

/// One hand's landmarks for one frame.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HandPose {
    pub landmarks: Vec<Landmark>,
}

impl HandPose {
    pub fn landmark(&self, index: usize) -> Option<Landmark> {
        self.landmarks.get(index).copied()
    }

    pub fn thumb_tip(&self) -> Option<Landmark> {
        self.landmark(HAND_THUMB_TIP)
    }

    pub fn thumb_mcp(&self) -> Option<Landmark> {
        self.landmark(HAND_THUMB_MCP)
    }

    pub fn middle_finger_tip(&self) -> Option<Landmark> {
        self.landmark(HAND_MIDDLE_FINGER_TIP)
    }
}

/// One detected face, pixel-space box.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FaceBox {
    pub bbox: BoundingBox,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GenderEstimate {
    pub gender: Gender,
    pub confidence: f32,
}

/// Emotion scores on a 0-100 scale.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct EmotionScores {
    pub fear: f32,
}

/// Raw object detection in normalized detector space: center + extent plus
/// the max-class score. The dangerous-object extractor rescales to pixels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

/// Per-family outcome for one frame. A failed model degrades to
/// `Unavailable` for that frame; it is never an error to the caller.
#[derive(Clone, Debug)]
pub enum ModelOutcome<T> {
    Ready(T),
    Unavailable,
}

impl<T> ModelOutcome<T> {
    pub fn available(&self) -> Option<&T> {
        match self {
            ModelOutcome::Ready(value) => Some(value),
            ModelOutcome::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, ModelOutcome::Unavailable)
    }
}

impl<T: Default> ModelOutcome<T> {
    /// Degraded view: unavailable reads as "no detection this frame".
    pub fn ready_or_default(self) -> T {
        match self {
            ModelOutcome::Ready(value) => value,
            ModelOutcome::Unavailable => T::default(),
        }
    }
}

/// Everything the eager model families produced for one frame.
///
/// Gender and emotion are not here: they run lazily, per face crop, behind
/// the distress gate.
#[derive(Clone, Debug)]
pub struct FrameObservations {
    pub objects: ModelOutcome<Vec<RawDetection>>,
    pub poses: ModelOutcome<Vec<PersonPose>>,
    pub hands: ModelOutcome<Vec<HandPose>>,
    pub faces: ModelOutcome<Vec<FaceBox>>,
    pub violence_score: ModelOutcome<f32>,
}
