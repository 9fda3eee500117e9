use serde::{Deserialize, Serialize};

use crate::config::FusionSettings;
use crate::frame::BoundingBox;
use crate::perception::RawDetection;

/// A weapon-like detection kept by the allow-list filter, rescaled to
/// frame pixel coordinates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DangerousObject {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Filter raw detections down to dangerous objects.
///
/// Keeps labels on the allow-list whose max-class score is strictly above
/// the threshold, and converts normalized center+extent boxes to pixel
/// corner boxes by proportional scaling.
pub fn dangerous_objects(
    raw: &[RawDetection],
    settings: &FusionSettings,
    frame_width: u32,
    frame_height: u32,
) -> Vec<DangerousObject> {
    let mut kept = Vec::new();
    for detection in raw {
        if detection.confidence <= settings.object_confidence_threshold {
            continue;
        }
        let label = detection.label.to_ascii_lowercase();
        if !settings.dangerous_labels.iter().any(|allowed| *allowed == label) {
            continue;
        }

        let center_x = detection.cx * frame_width as f32;
        let center_y = detection.cy * frame_height as f32;
        let w = detection.w * frame_width as f32;
        let h = detection.h * frame_height as f32;
        let x1 = (center_x - w / 2.0) as i32;
        let y1 = (center_y - h / 2.0) as i32;

        kept.push(DangerousObject {
            label,
            confidence: detection.confidence,
            bbox: BoundingBox::new(x1, y1, x1 + w as i32, y1 + h as i32),
        });
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(label: &str, confidence: f32) -> RawDetection {
        RawDetection {
            label: label.to_string(),
            confidence,
            cx: 0.5,
            cy: 0.5,
            w: 0.25,
            h: 0.5,
        }
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        let settings = FusionSettings::default();
        assert!(dangerous_objects(&[raw("knife", 0.39)], &settings, 640, 480).is_empty());
        assert!(dangerous_objects(&[raw("knife", 0.40)], &settings, 640, 480).is_empty());
        assert_eq!(
            dangerous_objects(&[raw("knife", 0.41)], &settings, 640, 480).len(),
            1
        );
    }

    #[test]
    fn labels_off_the_allow_list_are_dropped() {
        let settings = FusionSettings::default();
        assert!(dangerous_objects(&[raw("umbrella", 0.95)], &settings, 640, 480).is_empty());
        // Case-insensitive match against the lowercase allow-list.
        assert_eq!(
            dangerous_objects(&[raw("Baseball Bat", 0.8)], &settings, 640, 480).len(),
            1
        );
    }

    #[test]
    fn boxes_rescale_from_center_extent_to_pixel_corners() {
        let settings = FusionSettings::default();
        let kept = dangerous_objects(&[raw("gun", 0.9)], &settings, 640, 480);
        let bbox = kept[0].bbox;
        // center (320, 240), extent (160, 240)
        assert_eq!(bbox, BoundingBox::new(240, 120, 400, 360));
    }
}
