use crate::config::FusionSettings;
use crate::frame::{BoundingBox, Frame};
use crate::perception::{FaceBox, Gender, HandPose, ModelOutcome, PerceptionAdapter};

/// Outcome of the gesture+emotion distress evaluation for one frame.
#[derive(Clone, Debug, Default)]
pub struct DistressSignal {
    pub fired: bool,
    pub description: String,
    pub female_box: Option<BoundingBox>,
    pub fear_score: f32,
    pub male_count: usize,
}

/// Evaluate the distress signal: a thumbs-down gesture gates the (expensive)
/// emotion analysis; a female face scoring above the fear threshold with
/// enough male faces nearby fires the signal, at most once per frame.
///
/// The gate is a necessary condition: without a thumbs-down in frame, the
/// emotion analyzer is never invoked.
pub fn evaluate_distress(
    frame: &Frame,
    hands: &[HandPose],
    faces: &[FaceBox],
    adapter: &mut PerceptionAdapter,
    settings: &FusionSettings,
) -> DistressSignal {
    let mut signal = DistressSignal::default();

    if faces.is_empty() || !hands.iter().any(thumbs_down) {
        return signal;
    }

    // Gate open: collect distressed female faces.
    let mut distressed: Vec<(usize, f32)> = Vec::new();
    for (idx, face) in faces.iter().enumerate() {
        let estimate = match adapter.face_gender(frame, &face.bbox) {
            ModelOutcome::Ready(Some(estimate)) => estimate,
            ModelOutcome::Ready(None) | ModelOutcome::Unavailable => continue,
        };
        if estimate.gender != Gender::Female {
            continue;
        }
        let ModelOutcome::Ready(scores) = adapter.face_emotion(frame, &face.bbox) else {
            continue;
        };
        if scores.fear > settings.emotion_distress_threshold {
            distressed.push((idx, scores.fear));
        }
    }

    // First qualifying female wins; the signal fires at most once per frame.
    for (female_idx, fear) in distressed {
        let female_box = faces[female_idx].bbox;
        let radius = settings.proximity_threshold * frame.width as f32;

        let mut male_count = 0usize;
        for (idx, face) in faces.iter().enumerate() {
            if idx == female_idx {
                continue;
            }
            if female_box.center_distance(&face.bbox) >= radius {
                continue;
            }
            if let ModelOutcome::Ready(Some(estimate)) = adapter.face_gender(frame, &face.bbox) {
                if estimate.gender == Gender::Male {
                    male_count += 1;
                }
            }
        }

        if male_count >= settings.nearby_male_minimum {
            signal.fired = true;
            signal.description = format!(
                "Female showing thumbs down and fear expression surrounded by {} males",
                male_count
            );
            signal.female_box = Some(female_box);
            signal.fear_score = fear;
            signal.male_count = male_count;
            break;
        }
    }

    signal
}

/// Thumbs-down: thumb tip below the thumb base and below the middle
/// fingertip in image-vertical coordinates.
fn thumbs_down(hand: &HandPose) -> bool {
    let (Some(tip), Some(mcp), Some(middle_tip)) =
        (hand.thumb_tip(), hand.thumb_mcp(), hand.middle_finger_tip())
    else {
        return false;
    };
    tip.y > mcp.y && tip.y > middle_tip.y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::stub::{
        FixedViolenceScorer, SequenceGenderClassifier, StaticFaceDetector, StaticHandTracker,
        StaticObjectDetector, StaticPoseEstimator,
    };
    use crate::perception::{EmotionAnalyzer, GenderEstimate, Landmark};
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEmotionAnalyzer {
        calls: Arc<AtomicUsize>,
        fear: f32,
    }

    impl EmotionAnalyzer for CountingEmotionAnalyzer {
        fn name(&self) -> &'static str {
            "counting-emotion"
        }

        fn analyze(
            &mut self,
            _face_bgr: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<crate::perception::EmotionScores> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::perception::EmotionScores { fear: self.fear })
        }
    }

    fn hand(thumbs_down: bool) -> HandPose {
        let mut landmarks = vec![Landmark::default(); 21];
        if thumbs_down {
            landmarks[crate::perception::HAND_THUMB_MCP] = Landmark::new(0.5, 0.4);
            landmarks[crate::perception::HAND_MIDDLE_FINGER_TIP] = Landmark::new(0.5, 0.45);
            landmarks[crate::perception::HAND_THUMB_TIP] = Landmark::new(0.5, 0.6);
        } else {
            landmarks[crate::perception::HAND_THUMB_MCP] = Landmark::new(0.5, 0.6);
            landmarks[crate::perception::HAND_MIDDLE_FINGER_TIP] = Landmark::new(0.5, 0.45);
            landmarks[crate::perception::HAND_THUMB_TIP] = Landmark::new(0.5, 0.4);
        }
        HandPose { landmarks }
    }

    fn face_at(x: i32) -> FaceBox {
        FaceBox {
            bbox: BoundingBox::new(x, 100, x + 40, 140),
        }
    }

    fn female(confidence: f32) -> Option<GenderEstimate> {
        Some(GenderEstimate {
            gender: Gender::Female,
            confidence,
        })
    }

    fn male() -> Option<GenderEstimate> {
        Some(GenderEstimate {
            gender: Gender::Male,
            confidence: 0.9,
        })
    }

    fn adapter_with(
        gender_script: Vec<Option<GenderEstimate>>,
        emotion_calls: Arc<AtomicUsize>,
        fear: f32,
    ) -> PerceptionAdapter {
        PerceptionAdapter::new(
            Box::new(StaticObjectDetector::default()),
            Box::new(StaticPoseEstimator::default()),
            Box::new(StaticHandTracker::default()),
            Box::new(StaticFaceDetector::default()),
            Box::new(SequenceGenderClassifier::new(gender_script)),
            Box::new(CountingEmotionAnalyzer {
                calls: emotion_calls,
                fear,
            }),
            Box::new(FixedViolenceScorer::new(0.0)),
        )
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 640 * 480 * 3], 640, 480, 1, 0).unwrap()
    }

    #[test]
    fn without_thumbs_down_emotion_is_never_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut adapter = adapter_with(vec![female(0.9)], calls.clone(), 90.0);

        let faces = vec![face_at(100), face_at(150), face_at(200)];
        let signal = evaluate_distress(
            &frame(),
            &[hand(false)],
            &faces,
            &mut adapter,
            &FusionSettings::default(),
        );

        assert!(!signal.fired);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fires_with_two_nearby_males() {
        let calls = Arc::new(AtomicUsize::new(0));
        // Scan phase: female, male, male. Count phase: male, male.
        let script = vec![female(0.9), male(), male(), male(), male()];
        let mut adapter = adapter_with(script, calls.clone(), 70.0);

        // 0.15 * 640 = 96px radius; neighbors are ~50px and ~100px-ish away
        // center to center, both inside.
        let faces = vec![face_at(100), face_at(150), face_at(60)];
        let signal = evaluate_distress(
            &frame(),
            &[hand(true)],
            &faces,
            &mut adapter,
            &FusionSettings::default(),
        );

        assert!(signal.fired);
        assert_eq!(signal.male_count, 2);
        assert!(signal.description.contains("surrounded by 2 males"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_nearby_male_is_not_enough() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = vec![female(0.9), male(), male()];
        let mut adapter = adapter_with(script, calls, 70.0);

        let faces = vec![face_at(100), face_at(150)];
        let signal = evaluate_distress(
            &frame(),
            &[hand(true)],
            &faces,
            &mut adapter,
            &FusionSettings::default(),
        );

        assert!(!signal.fired);
    }

    #[test]
    fn fear_at_or_below_threshold_does_not_distress() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = vec![female(0.9), male(), male()];
        let mut adapter = adapter_with(script, calls, 60.0);

        let faces = vec![face_at(100), face_at(150), face_at(60)];
        let signal = evaluate_distress(
            &frame(),
            &[hand(true)],
            &faces,
            &mut adapter,
            &FusionSettings::default(),
        );

        assert!(!signal.fired);
    }

    #[test]
    fn distant_males_do_not_count() {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = vec![female(0.9), male(), male(), male(), male()];
        let mut adapter = adapter_with(script, calls, 80.0);

        // Second neighbor is ~500px away, outside the 96px radius.
        let faces = vec![face_at(100), face_at(150), face_at(600)];
        let signal = evaluate_distress(
            &frame(),
            &[hand(true)],
            &faces,
            &mut adapter,
            &FusionSettings::default(),
        );

        assert!(!signal.fired);
        assert_eq!(signal.male_count, 0);
    }
}
