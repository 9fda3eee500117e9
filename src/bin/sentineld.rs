//! sentineld - Sentinel Incident Kernel daemon
//!
//! This daemon:
//! 1. Serves the loopback control API (start sessions, list incidents)
//! 2. Optionally autostarts a session on the configured source
//! 3. Runs each session's fusion pipeline on its own thread
//! 4. Persists fired alerts (snapshot + sidecar + index) and notifies
//! 5. Stops sessions cooperatively on SIGINT/SIGTERM

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sentinel_kernel::api::{ApiConfig, ApiServer, SessionFactory, SessionManager};
use sentinel_kernel::notify::build_notifiers;
use sentinel_kernel::perception::PerceptionAdapter;
use sentinel_kernel::record::{IncidentRecorder, SqliteIncidentStore};
use sentinel_kernel::{Session, SentinelConfig, SessionHandle, SourceSpec};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SentinelConfig::load().context("failed to load configuration")?;
    log::info!(
        "sentineld starting. incident index: {}, snapshots: {}",
        cfg.db_path,
        cfg.snapshot_dir.display()
    );

    // Open once at startup so a broken index path fails fast.
    SqliteIncidentStore::open(&cfg.db_path).context("failed to open incident index")?;

    let manager = Arc::new(SessionManager::new());
    let factory = session_factory(cfg.clone());

    let api_config = ApiConfig {
        addr: cfg.api_addr.clone(),
        token_path: cfg.api_token_path.clone(),
    };
    let api_handle = ApiServer::new(
        api_config,
        cfg.db_path.clone(),
        manager.clone(),
        factory,
    )
    .spawn()?;
    log::info!("control api listening on {}", api_handle.addr);
    if let Some(path) = &api_handle.token_path {
        log::info!("control api capability token written to {}", path.display());
    } else {
        log::warn!(
            "control api capability token (handle securely): {}",
            api_handle.token
        );
    }

    if let Some(source) = &cfg.source {
        match SourceSpec::parse(source).and_then(|spec| start_session(&cfg, spec)) {
            Ok(handle) => {
                log::info!("autostarted session {} on '{}'", handle.id, source);
                manager.insert(handle);
            }
            Err(e) => log::error!("autostart on '{}' failed: {:#}", source, e),
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_hook = running.clone();
    ctrlc::set_handler(move || {
        running_hook.store(false, Ordering::SeqCst);
    })
    .context("failed to install signal handler")?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(500));
    }

    log::info!("shutting down: stopping sessions");
    manager.stop_all();
    api_handle.stop()?;
    log::info!("sentineld stopped");
    Ok(())
}

fn session_factory(cfg: SentinelConfig) -> SessionFactory {
    Box::new(move |spec| start_session(&cfg, spec))
}

/// Wire up one session: fresh models, recorder, and notifiers. Sessions
/// share nothing but the on-disk index.
fn start_session(cfg: &SentinelConfig, spec: SourceSpec) -> Result<SessionHandle> {
    let store = SqliteIncidentStore::open(&cfg.db_path)?;
    let recorder = IncidentRecorder::new(cfg.snapshot_dir.clone(), Box::new(store));
    let notifiers = build_notifiers(&cfg.notify);
    let adapter = build_adapter()?;
    Session::spawn(
        spec,
        &cfg.ingest,
        cfg.fusion.clone(),
        adapter,
        recorder,
        notifiers,
    )
}

/// Assemble the per-session perception stack.
///
/// With `backend-tract`, the violence and gender classifiers come from the
/// ONNX models named by SENTINEL_VIOLENCE_MODEL / SENTINEL_GENDER_MODEL;
/// other families (and every family in a default build) run as stubs until
/// a backend is wired in.
fn build_adapter() -> Result<PerceptionAdapter> {
    #[cfg(feature = "backend-tract")]
    {
        use sentinel_kernel::perception::stub;
        use sentinel_kernel::perception::tract::{TractGenderClassifier, TractViolenceScorer};

        let violence_model = std::env::var("SENTINEL_VIOLENCE_MODEL").ok();
        let gender_model = std::env::var("SENTINEL_GENDER_MODEL").ok();
        if let (Some(violence_model), Some(gender_model)) = (violence_model, gender_model) {
            return Ok(PerceptionAdapter::new(
                Box::new(stub::StaticObjectDetector::default()),
                Box::new(stub::StaticPoseEstimator::default()),
                Box::new(stub::StaticHandTracker::default()),
                Box::new(stub::StaticFaceDetector::default()),
                Box::new(TractGenderClassifier::new(&gender_model)?),
                Box::new(stub::FixedEmotionAnalyzer::new(0.0)),
                Box::new(TractViolenceScorer::new(&violence_model)?),
            ));
        }
        log::warn!("tract backend compiled in but model paths unset; using stub perception");
    }

    log::warn!("perception running on stubs; no incidents will be detected");
    Ok(sentinel_kernel::perception::stub::stub_adapter())
}
