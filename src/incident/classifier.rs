use serde::{Deserialize, Serialize};

use crate::config::FusionSettings;
use crate::frame::BoundingBox;
use crate::signal::{DangerousObject, DistressSignal, PoseSignals};
use crate::IncidentCategory;

/// Supporting evidence carried by a candidate and persisted with the
/// incident record. Only the fields relevant to the category are set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<DangerousObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smoothed_violence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raised_hands: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub female_box: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fear_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub male_count: Option<usize>,
}

/// A per-frame judgment that a category of incident is occurring, prior to
/// cooldown filtering. Consumed immediately by the throttle.
#[derive(Clone, Debug)]
pub struct CandidateIncident {
    pub category: IncidentCategory,
    pub description: String,
    pub confidence: Option<f32>,
    pub evidence: Evidence,
}

/// The extractor outputs the classifier combines for one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameIndicators {
    pub dangerous_objects: Vec<DangerousObject>,
    pub smoothed_violence: Option<f32>,
    pub pose: PoseSignals,
    pub distress: DistressSignal,
}

/// Combine one frame's indicators into zero or more candidate incidents.
///
/// Evaluation order is fixed: object danger first (unambiguous, highest
/// confidence), then the smoothed ML violence score, then the pose-derived
/// group and pairwise signals, then distress. Categories are independent;
/// all qualifying ones are emitted. Stateless across frames.
pub fn classify_frame(
    indicators: &FrameIndicators,
    settings: &FusionSettings,
) -> Vec<CandidateIncident> {
    let mut candidates = Vec::new();

    if !indicators.dangerous_objects.is_empty() {
        let listing = indicators
            .dangerous_objects
            .iter()
            .map(|o| format!("{} ({:.2})", o.label, o.confidence))
            .collect::<Vec<_>>()
            .join(", ");
        let top_confidence = indicators
            .dangerous_objects
            .iter()
            .map(|o| o.confidence)
            .fold(f32::NEG_INFINITY, f32::max);
        candidates.push(CandidateIncident {
            category: IncidentCategory::Weapons,
            description: format!("Dangerous objects detected: {}", listing),
            confidence: Some(top_confidence),
            evidence: Evidence {
                objects: indicators.dangerous_objects.clone(),
                ..Evidence::default()
            },
        });
    }

    if let Some(smoothed) = indicators.smoothed_violence {
        if smoothed > settings.violence_threshold {
            candidates.push(CandidateIncident {
                category: IncidentCategory::Violence,
                description: format!("Violence detected with confidence {:.2}", smoothed),
                confidence: Some(smoothed),
                evidence: Evidence {
                    smoothed_violence: Some(smoothed),
                    ..Evidence::default()
                },
            });
        }
    }

    if indicators.pose.has_mass_violence {
        candidates.push(CandidateIncident {
            category: IncidentCategory::MassGathering,
            description: indicators.pose.mass_violence_desc.clone(),
            confidence: None,
            evidence: Evidence {
                population: Some(indicators.pose.population),
                raised_hands: Some(indicators.pose.raised_hands_count),
                ..Evidence::default()
            },
        });
    }

    if indicators.pose.has_violent_poses {
        candidates.push(CandidateIncident {
            category: IncidentCategory::ViolentPoses,
            description: indicators.pose.violent_poses_desc(),
            confidence: None,
            evidence: Evidence {
                population: Some(indicators.pose.population),
                raised_hands: Some(indicators.pose.raised_hands_count),
                ..Evidence::default()
            },
        });
    }

    if indicators.distress.fired {
        candidates.push(CandidateIncident {
            category: IncidentCategory::FemaleDistress,
            description: indicators.distress.description.clone(),
            confidence: None,
            evidence: Evidence {
                female_box: indicators.distress.female_box,
                fear_score: Some(indicators.distress.fear_score),
                male_count: Some(indicators.distress.male_count),
                ..Evidence::default()
            },
        });
    }

    candidates
}
