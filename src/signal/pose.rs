use crate::config::FusionSettings;
use crate::perception::PersonPose;

/// Aggregated pose-derived aggression indicators for one frame.
#[derive(Clone, Debug, Default)]
pub struct PoseSignals {
    pub population: usize,
    pub raised_hands_count: usize,
    /// Human-readable per-person / per-pair indicators; these become the
    /// alert description verbatim.
    pub indicators: Vec<String>,
    pub has_violent_poses: bool,
    pub has_mass_violence: bool,
    pub mass_violence_desc: String,
}

impl PoseSignals {
    pub fn violent_poses_desc(&self) -> String {
        self.indicators.join("; ")
    }
}

/// Analyze all detected people for individual and group aggression.
///
/// "Hands raised" means both wrists above both shoulders in image-vertical
/// coordinates. A raised hand horizontally within reach of the nose reads
/// as a fighting stance. A pair whose noses are closer than the proximity
/// threshold, where the first of the pair has hands raised, reads as a
/// close confrontation. Mass violence requires an absolute minimum group
/// size, an absolute minimum raised-hand count, and a raised fraction,
/// so a small crowd with one excited person does not trigger it.
pub fn analyze_poses(poses: &[PersonPose], settings: &FusionSettings) -> PoseSignals {
    let mut signals = PoseSignals {
        population: poses.len(),
        ..PoseSignals::default()
    };

    for (i, pose) in poses.iter().enumerate() {
        let (Some(left_wrist), Some(right_wrist), Some(left_shoulder), Some(right_shoulder), Some(nose)) = (
            pose.left_wrist(),
            pose.right_wrist(),
            pose.left_shoulder(),
            pose.right_shoulder(),
            pose.nose(),
        ) else {
            continue;
        };

        let hands_raised = left_wrist.y < left_shoulder.y && right_wrist.y < right_shoulder.y;
        if hands_raised {
            signals.raised_hands_count += 1;

            let hands_near_face = (left_wrist.x - nose.x).abs()
                < settings.fighting_reach_threshold
                || (right_wrist.x - nose.x).abs() < settings.fighting_reach_threshold;
            if hands_near_face {
                signals
                    .indicators
                    .push(format!("Person {} showing fighting stance", i + 1));
            }
        }

        for (j, other) in poses.iter().enumerate().skip(i + 1) {
            let Some(other_nose) = other.nose() else {
                continue;
            };
            let distance = nose.distance(&other_nose);
            if distance < settings.proximity_threshold && hands_raised {
                signals.indicators.push(format!(
                    "Close confrontation between Person {} and Person {}",
                    i + 1,
                    j + 1
                ));
            }
        }
    }

    signals.has_violent_poses = !signals.indicators.is_empty();

    if signals.population >= settings.group_size_threshold {
        let fraction = signals.raised_hands_count as f32 / signals.population as f32;
        signals.has_mass_violence = signals.raised_hands_count
            >= settings.group_size_threshold.saturating_sub(1)
            && fraction > settings.raised_fraction_threshold;
        if signals.has_mass_violence {
            signals.mass_violence_desc = format!(
                "Mass gathering with {} of {} people showing aggressive poses ({:.1}%)",
                signals.raised_hands_count,
                signals.population,
                fraction * 100.0
            );
        }
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::{
        Landmark, POSE_LEFT_SHOULDER, POSE_LEFT_WRIST, POSE_NOSE, POSE_RIGHT_SHOULDER,
        POSE_RIGHT_WRIST,
    };

    /// Build a pose at a given nose position, hands raised or lowered.
    fn person(nose_x: f32, nose_y: f32, hands_raised: bool) -> PersonPose {
        let mut landmarks = vec![Landmark::default(); 33];
        landmarks[POSE_NOSE] = Landmark::new(nose_x, nose_y);
        landmarks[POSE_LEFT_SHOULDER] = Landmark::new(nose_x - 0.05, nose_y + 0.15);
        landmarks[POSE_RIGHT_SHOULDER] = Landmark::new(nose_x + 0.05, nose_y + 0.15);
        let wrist_y = if hands_raised {
            nose_y - 0.05
        } else {
            nose_y + 0.35
        };
        // Wrists sit far from the nose horizontally; fighting stance is
        // exercised separately.
        landmarks[POSE_LEFT_WRIST] = Landmark::new(nose_x - 0.3, wrist_y);
        landmarks[POSE_RIGHT_WRIST] = Landmark::new(nose_x + 0.3, wrist_y);
        PersonPose { landmarks }
    }

    fn fighter(nose_x: f32, nose_y: f32) -> PersonPose {
        let mut pose = person(nose_x, nose_y, true);
        pose.landmarks[POSE_LEFT_WRIST].x = nose_x - 0.1;
        pose
    }

    #[test]
    fn mass_violence_needs_count_and_fraction() {
        let settings = FusionSettings::default();

        // 3 of 4 raised: count 3 >= 2, fraction 75% > 60%.
        let poses = vec![
            person(0.1, 0.3, true),
            person(0.4, 0.3, true),
            person(0.7, 0.3, true),
            person(0.9, 0.3, false),
        ];
        assert!(analyze_poses(&poses, &settings).has_mass_violence);

        // 2 of 4 raised: fraction 50% fails.
        let poses = vec![
            person(0.1, 0.3, true),
            person(0.4, 0.3, true),
            person(0.7, 0.3, false),
            person(0.9, 0.3, false),
        ];
        assert!(!analyze_poses(&poses, &settings).has_mass_violence);

        // 2 of 2 raised: below the group size threshold entirely.
        let poses = vec![person(0.1, 0.3, true), person(0.4, 0.3, true)];
        assert!(!analyze_poses(&poses, &settings).has_mass_violence);
    }

    #[test]
    fn confrontation_requires_proximity_and_raised_hands() {
        let settings = FusionSettings::default();

        // Nose distance 0.10 < 0.15, first person raised.
        let poses = vec![person(0.50, 0.3, true), person(0.60, 0.3, false)];
        let signals = analyze_poses(&poses, &settings);
        assert!(signals.has_violent_poses);
        assert!(signals.violent_poses_desc().contains("Close confrontation"));

        // Distance 0.20: no confrontation.
        let poses = vec![person(0.40, 0.3, true), person(0.60, 0.3, false)];
        assert!(!analyze_poses(&poses, &settings).has_violent_poses);

        // Close but nobody has hands raised: no confrontation.
        let poses = vec![person(0.50, 0.3, false), person(0.60, 0.3, false)];
        assert!(!analyze_poses(&poses, &settings).has_violent_poses);
    }

    #[test]
    fn fighting_stance_needs_a_raised_hand_near_the_nose() {
        let settings = FusionSettings::default();

        let signals = analyze_poses(&[fighter(0.5, 0.3)], &settings);
        assert!(signals.has_violent_poses);
        assert_eq!(
            signals.violent_poses_desc(),
            "Person 1 showing fighting stance"
        );

        // Raised but wrists far from the face: not a stance.
        let signals = analyze_poses(&[person(0.5, 0.3, true)], &settings);
        assert!(!signals.has_violent_poses);
    }

    #[test]
    fn incomplete_poses_are_skipped_but_counted_in_population() {
        let settings = FusionSettings::default();
        let poses = vec![
            fighter(0.5, 0.3),
            PersonPose::default(),
        ];
        let signals = analyze_poses(&poses, &settings);
        assert_eq!(signals.population, 2);
        assert_eq!(signals.raised_hands_count, 1);
        assert!(signals.has_violent_poses);
    }
}
