//! Stream driver and session handles.
//!
//! One session drives one source: frames are pulled at a bounded rate and
//! run through perception, extraction, classification, and the throttle,
//! strictly in order and strictly sequentially. Frame N+1 is not fetched
//! until frame N's pipeline (including any persistence and notification)
//! has completed, which keeps the temporal reasoning free of out-of-order
//! concerns.
//!
//! A session owns all of its state: the frame source, the loaded models,
//! the violence score buffer, and the alert throttle. Nothing is shared
//! across sessions. Stopping is cooperative, checked once per frame; the
//! caller gets an explicit handle with queryable status instead of a
//! fire-and-forget thread.

use anyhow::{Context, Result};
use rand::RngCore;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{FusionSettings, IngestSettings};
use crate::frame::{Frame, ALERT_RED, BANNER_WHITE};
use crate::incident::{classify_frame, AlertThrottle, CandidateIncident, FrameIndicators};
use crate::ingest::{FrameSource, SourceSpec};
use crate::notify::Notifier;
use crate::perception::PerceptionAdapter;
use crate::record::IncidentRecorder;
use crate::signal::{analyze_poses, dangerous_objects, evaluate_distress, ViolenceScoreBuffer};
use crate::{now_s, FaultKind, IncidentCategory};

const ALERT_BANNER_ROWS: u32 = 24;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum SessionStatus {
    Running,
    Stopped,
    Failed(String),
}

/// Handle to a running session.
///
/// Dropping the handle does not stop the session; call `request_stop` (or
/// `stop` to also join) for a cooperative shutdown.
pub struct SessionHandle {
    pub id: String,
    pub spec: SourceSpec,
    stop: Arc<AtomicBool>,
    status: Arc<Mutex<SessionStatus>>,
    join: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_else(|_| SessionStatus::Failed("status lock poisoned".to_string()))
    }

    /// Signal the session to stop at the next frame boundary.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Signal stop and wait for the session thread to finish.
    pub fn stop(&mut self) -> Result<()> {
        self.request_stop();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow::anyhow!("session thread panicked"))?;
        }
        Ok(())
    }
}

pub struct Session;

impl Session {
    /// Open the source and start the pipeline on a dedicated thread.
    ///
    /// Source-open failure is fatal and surfaces here, synchronously; the
    /// session thread is never started. Everything the loop needs moves
    /// into the thread and is released when it exits, on every exit path.
    pub fn spawn(
        spec: SourceSpec,
        ingest: &IngestSettings,
        fusion: FusionSettings,
        adapter: PerceptionAdapter,
        recorder: IncidentRecorder,
        notifiers: Vec<Box<dyn Notifier>>,
    ) -> Result<SessionHandle> {
        let source = FrameSource::open(&spec, ingest).with_context(|| {
            format!(
                "{}: could not open video source '{}'",
                FaultKind::SourceUnavailable,
                spec
            )
        })?;

        let id = session_id();
        let stop = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(SessionStatus::Running));

        log::info!("session {} starting on '{}'", id, spec);

        let thread_id = id.clone();
        let thread_stop = stop.clone();
        let thread_status = status.clone();
        let frame_interval = Duration::from_millis(1000 / ingest.target_fps.max(1) as u64);
        let join = std::thread::spawn(move || {
            let outcome = run_loop(
                source,
                fusion,
                adapter,
                recorder,
                notifiers,
                &thread_stop,
                frame_interval,
            );
            let final_status = match outcome {
                Ok(()) => {
                    log::info!("session {} finished", thread_id);
                    SessionStatus::Stopped
                }
                Err(e) => {
                    log::error!("session {} failed: {:#}", thread_id, e);
                    SessionStatus::Failed(format!("{:#}", e))
                }
            };
            if let Ok(mut status) = thread_status.lock() {
                *status = final_status;
            }
        });

        Ok(SessionHandle {
            id,
            spec,
            stop,
            status,
            join: Some(join),
        })
    }
}

fn session_id() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sess-{}", hex::encode(bytes))
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    mut source: FrameSource,
    fusion: FusionSettings,
    mut adapter: PerceptionAdapter,
    mut recorder: IncidentRecorder,
    mut notifiers: Vec<Box<dyn Notifier>>,
    stop: &AtomicBool,
    frame_interval: Duration,
) -> Result<()> {
    let mut throttle = AlertThrottle::new(fusion.alert_cooldown);
    let mut violence_buffer = ViolenceScoreBuffer::new(fusion.violence_buffer_len);
    let mut last_health_log = std::time::Instant::now();

    loop {
        if stop.load(Ordering::SeqCst) {
            log::info!("stop requested, ending session");
            break;
        }

        let Some(mut frame) = source.next_frame().context("frame acquisition failed")? else {
            log::info!("end of video stream reached");
            break;
        };

        // Warm-up: let auto-exposure and model state settle before analyzing.
        if frame.seq <= fusion.warmup_frames {
            continue;
        }

        let crate::perception::FrameObservations {
            objects,
            poses,
            hands,
            faces,
            violence_score,
        } = adapter.observe(&frame);

        let dangerous = objects
            .available()
            .map(|raw| dangerous_objects(raw, &fusion, frame.width, frame.height))
            .unwrap_or_default();

        // Unavailable frames are not pushed: the model contributes nothing
        // this frame rather than decaying the window.
        let smoothed_violence = violence_score
            .available()
            .map(|&score| violence_buffer.push(score));

        let poses = poses.ready_or_default();
        let hands = hands.ready_or_default();
        let faces = faces.ready_or_default();

        let pose_signals = analyze_poses(&poses, &fusion);
        let distress = evaluate_distress(&frame, &hands, &faces, &mut adapter, &fusion);

        let indicators = FrameIndicators {
            dangerous_objects: dangerous,
            smoothed_violence,
            pose: pose_signals,
            distress,
        };
        let candidates = classify_frame(&indicators, &fusion);

        let mut fired_any = false;
        if !candidates.is_empty() {
            let now = now_s()?;
            for candidate in candidates {
                if !throttle.is_ready(candidate.category, now) {
                    log::debug!("{} candidate suppressed by cooldown", candidate.category);
                    continue;
                }
                // An attempt consumes the cooldown window even if persistence
                // fails below; a broken recorder must not cause retry storms.
                throttle.mark_fired(candidate.category, now);
                fired_any = true;
                fire_alert(&mut frame, &candidate, now, &mut recorder, &mut notifiers);
            }
        }

        if fired_any {
            // Live-display side effect only; the decision path never reads it.
            frame.fill_banner(ALERT_BANNER_ROWS, BANNER_WHITE);
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            log::info!(
                "source health={} frames={} descriptor={}",
                source.is_healthy(),
                stats.frames_captured,
                stats.descriptor
            );
            last_health_log = std::time::Instant::now();
        }

        std::thread::sleep(frame_interval);
    }

    Ok(())
}

fn fire_alert(
    frame: &mut Frame,
    candidate: &CandidateIncident,
    now: u64,
    recorder: &mut IncidentRecorder,
    notifiers: &mut [Box<dyn Notifier>],
) {
    for object in &candidate.evidence.objects {
        frame.draw_box(&object.bbox, ALERT_RED);
    }
    if let Some(female_box) = &candidate.evidence.female_box {
        frame.draw_box(female_box, ALERT_RED);
    }

    let message = alert_message(candidate.category, now, &candidate.description);

    let snapshot_path = match recorder.record(
        frame,
        candidate.category,
        &candidate.description,
        &candidate.evidence,
    ) {
        Ok(path) => path,
        Err(e) => {
            // Alert attempted, evidence missing; cooldown already consumed.
            log::error!(
                "{} for {} at {}: {:#}",
                FaultKind::PersistenceFailure,
                candidate.category,
                now,
                e
            );
            return;
        }
    };

    log::info!(
        "alert fired: {} snapshot={}",
        candidate.category,
        snapshot_path.display()
    );

    for notifier in notifiers.iter_mut() {
        if let Err(e) = notifier.deliver(&snapshot_path, &message) {
            log::error!(
                "{} via {} for {} at {}: {:#}",
                FaultKind::NotificationFailure,
                notifier.name(),
                candidate.category,
                now,
                e
            );
        }
    }
}

fn alert_message(category: IncidentCategory, now: u64, description: &str) -> String {
    match category {
        IncidentCategory::Weapons => {
            format!("HIGH CONFIDENCE DANGER - t{}: {}!", now, description)
        }
        IncidentCategory::Violence => {
            format!("VIOLENCE DETECTED - t{}!\nDetails: {}", now, description)
        }
        IncidentCategory::MassGathering => format!(
            "HIGH CONFIDENCE ALERT - t{}: Mass gathering violence detected!\nDetails: {}",
            now, description
        ),
        IncidentCategory::ViolentPoses => format!(
            "HIGH CONFIDENCE ALERT - t{}: Multiple people showing violent behavior!\nDetails: {}",
            now, description
        ),
        IncidentCategory::FemaleDistress => format!(
            "HIGH CONFIDENCE FEMALE DISTRESS - t{}!\nDetails: {}",
            now, description
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::stub::{
        FixedEmotionAnalyzer, FixedViolenceScorer, SequenceGenderClassifier, StaticFaceDetector,
        StaticHandTracker, StaticObjectDetector, StaticPoseEstimator,
    };
    use crate::perception::RawDetection;
    use crate::record::{list_incidents, IncidentRecorder, SqliteIncidentStore};
    use std::path::Path;

    struct RecordingNotifier {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn deliver(&mut self, _snapshot: &Path, message: &str) -> Result<()> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    /// Wait for a finite session to drain on its own before joining.
    fn wait_until_finished(handle: &SessionHandle) {
        for _ in 0..500 {
            if handle.status() != SessionStatus::Running {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("session did not finish in time");
    }

    fn fast_ingest() -> IngestSettings {
        IngestSettings {
            target_fps: 500,
            width: 64,
            height: 48,
        }
    }

    fn knife_adapter() -> PerceptionAdapter {
        PerceptionAdapter::new(
            Box::new(StaticObjectDetector::new(vec![RawDetection {
                label: "knife".to_string(),
                confidence: 0.9,
                cx: 0.5,
                cy: 0.5,
                w: 0.2,
                h: 0.2,
            }])),
            Box::new(StaticPoseEstimator::default()),
            Box::new(StaticHandTracker::default()),
            Box::new(StaticFaceDetector::default()),
            Box::new(SequenceGenderClassifier::default()),
            Box::new(FixedEmotionAnalyzer::new(0.0)),
            Box::new(FixedViolenceScorer::new(0.0)),
        )
    }

    #[test]
    fn weapons_alert_fires_once_under_cooldown_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("incidents.db");
        let store = SqliteIncidentStore::open(db_path.to_str().unwrap()).unwrap();
        let recorder = IncidentRecorder::new(dir.path().join("snapshots"), Box::new(store));

        let messages = Arc::new(Mutex::new(Vec::new()));
        let notifier = RecordingNotifier {
            messages: messages.clone(),
        };

        let spec = SourceSpec::parse("stub://street?frames=40").unwrap();
        let mut handle = Session::spawn(
            spec,
            &fast_ingest(),
            FusionSettings::default(),
            knife_adapter(),
            recorder,
            vec![Box::new(notifier)],
        )
        .expect("session starts");

        wait_until_finished(&handle);
        handle.stop().expect("session joins");
        assert_eq!(handle.status(), SessionStatus::Stopped);

        // Every analyzed frame had a knife, but the 15s cooldown admits only
        // the first within this sub-second run.
        let incidents = list_incidents(db_path.to_str().unwrap()).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].category, IncidentCategory::Weapons);
        assert!(incidents[0].description.contains("knife (0.90)"));
        assert!(std::path::Path::new(&incidents[0].snapshot_path).exists());

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("HIGH CONFIDENCE DANGER"));
    }

    #[test]
    fn violence_alert_waits_for_the_smoothed_window() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("incidents.db");
        let store = SqliteIncidentStore::open(db_path.to_str().unwrap()).unwrap();
        let recorder = IncidentRecorder::new(dir.path().join("snapshots"), Box::new(store));

        // Eight calm frames, then a sustained 1.0 from the scorer. The
        // trailing mean crosses 0.75 only once enough calm frames have
        // left the window, so exactly one violence alert fires late in
        // the 40-frame run.
        let mut scores = vec![0.0f32; 8];
        scores.extend(std::iter::repeat(1.0).take(17));
        let adapter = PerceptionAdapter::new(
            Box::new(StaticObjectDetector::default()),
            Box::new(StaticPoseEstimator::default()),
            Box::new(StaticHandTracker::default()),
            Box::new(StaticFaceDetector::default()),
            Box::new(SequenceGenderClassifier::default()),
            Box::new(FixedEmotionAnalyzer::new(0.0)),
            Box::new(crate::perception::stub::SequenceViolenceScorer::new(scores)),
        );

        let spec = SourceSpec::parse("stub://street?frames=40").unwrap();
        let mut handle = Session::spawn(
            spec,
            &fast_ingest(),
            FusionSettings::default(),
            adapter,
            recorder,
            Vec::new(),
        )
        .expect("session starts");
        wait_until_finished(&handle);
        handle.stop().expect("session joins");

        let incidents = list_incidents(db_path.to_str().unwrap()).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].category, IncidentCategory::Violence);
        assert!(incidents[0]
            .description
            .starts_with("Violence detected with confidence"));
    }

    #[test]
    fn warmup_frames_are_not_analyzed() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("incidents.db");
        let store = SqliteIncidentStore::open(db_path.to_str().unwrap()).unwrap();
        let recorder = IncidentRecorder::new(dir.path().join("snapshots"), Box::new(store));

        // Source ends inside the warm-up window: nothing is ever analyzed.
        let spec = SourceSpec::parse("stub://street?frames=15").unwrap();
        let mut handle = Session::spawn(
            spec,
            &fast_ingest(),
            FusionSettings::default(),
            knife_adapter(),
            recorder,
            Vec::new(),
        )
        .expect("session starts");
        wait_until_finished(&handle);
        handle.stop().expect("session joins");

        assert_eq!(handle.status(), SessionStatus::Stopped);
        assert!(list_incidents(db_path.to_str().unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn stop_signal_ends_an_unbounded_session() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = IncidentRecorder::new(
            dir.path().join("snapshots"),
            Box::new(crate::record::InMemoryIncidentStore::new()),
        );

        let spec = SourceSpec::parse("stub://endless").unwrap();
        let mut handle = Session::spawn(
            spec,
            &fast_ingest(),
            FusionSettings::default(),
            crate::perception::stub::stub_adapter(),
            recorder,
            Vec::new(),
        )
        .expect("session starts");

        assert_eq!(handle.status(), SessionStatus::Running);
        handle.stop().expect("session joins");
        assert_eq!(handle.status(), SessionStatus::Stopped);
    }

    #[test]
    fn unopenable_source_fails_synchronously() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = IncidentRecorder::new(
            dir.path().join("snapshots"),
            Box::new(crate::record::InMemoryIncidentStore::new()),
        );

        // Without the ffmpeg feature a file path cannot be opened; with it,
        // the path does not exist. Either way the failure is synchronous.
        let spec = SourceSpec::parse("/no/such/clip.mp4").unwrap();
        let result = Session::spawn(
            spec,
            &fast_ingest(),
            FusionSettings::default(),
            crate::perception::stub::stub_adapter(),
            recorder,
            Vec::new(),
        );
        assert!(result.is_err());
    }
}
