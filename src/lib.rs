//! Sentinel Incident Kernel
//!
//! This crate implements the core engine for multi-signal video incident
//! detection: per-frame perception fusion, temporal smoothing, incident
//! classification, and throttled alerting.
//!
//! # Architecture
//!
//! Data flows strictly downstream, once per frame:
//!
//! ```text
//! ingest -> perception -> signal -> incident -> record / notify
//! ```
//!
//! The only cross-frame state is the violence score buffer and the
//! per-category alert cooldown, both owned by the session that created them.
//! Sessions are isolated: each loads its own models and keeps its own
//! temporal state, so independent sources can run concurrently without
//! shared mutable state.
//!
//! # Module Structure
//!
//! - `ingest`: frame sources (local file, camera device, network stream, stub)
//! - `perception`: uniform adapter over the opaque model families
//! - `signal`: pure per-frame indicator extractors
//! - `incident`: candidate classification and the alert throttle
//! - `record`: snapshot + sidecar persistence and the incident index
//! - `notify`: outbound alert transports (MQTT, webhook)
//! - `session`: the stream driver and session handles
//! - `api`: loopback control API (start sessions, list incidents)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod api;
pub mod config;
pub mod frame;
pub mod incident;
pub mod ingest;
pub mod notify;
pub mod perception;
pub mod record;
pub mod session;
pub mod signal;

pub use config::SentinelConfig;
pub use frame::Frame;
pub use incident::{AlertThrottle, CandidateIncident, Evidence, ThrottleState};
pub use ingest::{FrameSource, SourceSpec};
pub use notify::Notifier;
pub use perception::{FrameObservations, ModelOutcome, PerceptionAdapter};
pub use record::{
    InMemoryIncidentStore, IncidentRecorder, IncidentStore, IncidentSummary, SqliteIncidentStore,
};
pub use session::{Session, SessionHandle, SessionStatus};

/// Seconds since the Unix epoch.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

// -------------------- Incident Categories --------------------

/// The incident categories the classifier can emit.
///
/// Categories are not mutually exclusive; a single frame may qualify for
/// several at once. Each category throttles independently.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    Weapons,
    Violence,
    MassGathering,
    ViolentPoses,
    FemaleDistress,
}

impl IncidentCategory {
    pub const ALL: [IncidentCategory; 5] = [
        IncidentCategory::Weapons,
        IncidentCategory::Violence,
        IncidentCategory::MassGathering,
        IncidentCategory::ViolentPoses,
        IncidentCategory::FemaleDistress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentCategory::Weapons => "weapons",
            IncidentCategory::Violence => "violence",
            IncidentCategory::MassGathering => "mass_gathering",
            IncidentCategory::ViolentPoses => "violent_poses",
            IncidentCategory::FemaleDistress => "female_distress",
        }
    }

    /// Directory name used by the snapshot recorder.
    pub fn dir_name(&self) -> &'static str {
        match self {
            IncidentCategory::Weapons => "Dangerous_Objects",
            IncidentCategory::Violence => "Violence_Detection",
            IncidentCategory::MassGathering => "Mass_Gathering_Violence",
            IncidentCategory::ViolentPoses => "Violent_Poses",
            IncidentCategory::FemaleDistress => "Female_Distress",
        }
    }

    pub fn parse(value: &str) -> Option<IncidentCategory> {
        IncidentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == value || c.dir_name() == value)
    }
}

impl fmt::Display for IncidentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------- Fault Taxonomy --------------------

/// Non-fatal and fatal fault classes recognized by the session policy.
///
/// Only `SourceUnavailable` terminates a session; everything else is
/// degraded locally and logged with context.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FaultKind {
    SourceUnavailable,
    ModelUnavailable,
    PersistenceFailure,
    NotificationFailure,
    InvalidInput,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::SourceUnavailable => "source_unavailable",
            FaultKind::ModelUnavailable => "model_unavailable",
            FaultKind::PersistenceFailure => "persistence_failure",
            FaultKind::NotificationFailure => "notification_failure",
            FaultKind::InvalidInput => "invalid_input",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_names_round_trip() {
        for category in IncidentCategory::ALL {
            assert_eq!(IncidentCategory::parse(category.as_str()), Some(category));
            assert_eq!(IncidentCategory::parse(category.dir_name()), Some(category));
        }
        assert_eq!(IncidentCategory::parse("parade"), None);
    }
}
