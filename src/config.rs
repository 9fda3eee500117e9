use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "sentinel.db";
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8811";
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_MQTT_TOPIC: &str = "sentinel/alerts";
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

const DEFAULT_DANGEROUS_LABELS: [&str; 5] = ["knife", "scissors", "gun", "baseball bat", "stick"];

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    db_path: Option<String>,
    snapshot_dir: Option<String>,
    source: Option<String>,
    api: Option<ApiConfigFile>,
    ingest: Option<IngestConfigFile>,
    fusion: Option<FusionConfigFile>,
    notify: Option<NotifyConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    token_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct IngestConfigFile {
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FusionConfigFile {
    dangerous_labels: Option<Vec<String>>,
    object_confidence_threshold: Option<f32>,
    violence_threshold: Option<f32>,
    violence_buffer_len: Option<usize>,
    group_size_threshold: Option<usize>,
    raised_fraction_threshold: Option<f32>,
    fighting_reach_threshold: Option<f32>,
    proximity_threshold: Option<f32>,
    emotion_distress_threshold: Option<f32>,
    nearby_male_minimum: Option<usize>,
    alert_cooldown_secs: Option<u64>,
    warmup_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifyConfigFile {
    mqtt_addr: Option<String>,
    mqtt_topic: Option<String>,
    webhook_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub db_path: String,
    pub snapshot_dir: PathBuf,
    /// Source to open at daemon start. Sessions can also be started via the API.
    pub source: Option<String>,
    pub api_addr: String,
    pub api_token_path: Option<PathBuf>,
    pub ingest: IngestSettings,
    pub fusion: FusionSettings,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

/// Tunables for the signal extractors, classifier, and throttle.
#[derive(Debug, Clone)]
pub struct FusionSettings {
    pub dangerous_labels: Vec<String>,
    pub object_confidence_threshold: f32,
    pub violence_threshold: f32,
    pub violence_buffer_len: usize,
    pub group_size_threshold: usize,
    pub raised_fraction_threshold: f32,
    pub fighting_reach_threshold: f32,
    pub proximity_threshold: f32,
    pub emotion_distress_threshold: f32,
    pub nearby_male_minimum: usize,
    pub alert_cooldown: Duration,
    pub warmup_frames: u64,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            dangerous_labels: DEFAULT_DANGEROUS_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            object_confidence_threshold: 0.4,
            violence_threshold: 0.75,
            violence_buffer_len: 15,
            group_size_threshold: 3,
            raised_fraction_threshold: 0.6,
            fighting_reach_threshold: 0.2,
            proximity_threshold: 0.15,
            emotion_distress_threshold: 60.0,
            nearby_male_minimum: 2,
            alert_cooldown: Duration::from_secs(15),
            warmup_frames: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub mqtt_addr: Option<String>,
    pub mqtt_topic: String,
    pub webhook_url: Option<String>,
    pub timeout: Duration,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            mqtt_addr: None,
            mqtt_topic: DEFAULT_MQTT_TOPIC.to_string(),
            webhook_url: None,
            timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
        }
    }
}

impl SentinelConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTINEL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let fusion_file = file.fusion.unwrap_or_default();
        let fusion_defaults = FusionSettings::default();
        let fusion = FusionSettings {
            dangerous_labels: fusion_file
                .dangerous_labels
                .unwrap_or(fusion_defaults.dangerous_labels),
            object_confidence_threshold: fusion_file
                .object_confidence_threshold
                .unwrap_or(fusion_defaults.object_confidence_threshold),
            violence_threshold: fusion_file
                .violence_threshold
                .unwrap_or(fusion_defaults.violence_threshold),
            violence_buffer_len: fusion_file
                .violence_buffer_len
                .unwrap_or(fusion_defaults.violence_buffer_len),
            group_size_threshold: fusion_file
                .group_size_threshold
                .unwrap_or(fusion_defaults.group_size_threshold),
            raised_fraction_threshold: fusion_file
                .raised_fraction_threshold
                .unwrap_or(fusion_defaults.raised_fraction_threshold),
            fighting_reach_threshold: fusion_file
                .fighting_reach_threshold
                .unwrap_or(fusion_defaults.fighting_reach_threshold),
            proximity_threshold: fusion_file
                .proximity_threshold
                .unwrap_or(fusion_defaults.proximity_threshold),
            emotion_distress_threshold: fusion_file
                .emotion_distress_threshold
                .unwrap_or(fusion_defaults.emotion_distress_threshold),
            nearby_male_minimum: fusion_file
                .nearby_male_minimum
                .unwrap_or(fusion_defaults.nearby_male_minimum),
            alert_cooldown: fusion_file
                .alert_cooldown_secs
                .map(Duration::from_secs)
                .unwrap_or(fusion_defaults.alert_cooldown),
            warmup_frames: fusion_file
                .warmup_frames
                .unwrap_or(fusion_defaults.warmup_frames),
        };

        let notify_file = file.notify.unwrap_or_default();
        let notify_defaults = NotifySettings::default();
        let notify = NotifySettings {
            mqtt_addr: notify_file.mqtt_addr,
            mqtt_topic: notify_file.mqtt_topic.unwrap_or(notify_defaults.mqtt_topic),
            webhook_url: notify_file.webhook_url,
            timeout: notify_file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(notify_defaults.timeout),
        };

        let ingest_file = file.ingest.unwrap_or_default();
        let ingest = IngestSettings {
            target_fps: ingest_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            width: ingest_file.width.unwrap_or(DEFAULT_FRAME_WIDTH),
            height: ingest_file.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
        };

        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            snapshot_dir: file
                .snapshot_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            source: file.source,
            api_addr: file
                .api
                .as_ref()
                .and_then(|api| api.addr.clone())
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            api_token_path: file.api.and_then(|api| api.token_path),
            ingest,
            fusion,
            notify,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SENTINEL_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(dir) = std::env::var("SENTINEL_SNAPSHOT_DIR") {
            if !dir.trim().is_empty() {
                self.snapshot_dir = PathBuf::from(dir);
            }
        }
        if let Ok(source) = std::env::var("SENTINEL_SOURCE") {
            if !source.trim().is_empty() {
                self.source = Some(source);
            }
        }
        if let Ok(addr) = std::env::var("SENTINEL_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(path) = std::env::var("SENTINEL_API_TOKEN_PATH") {
            if !path.trim().is_empty() {
                self.api_token_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(addr) = std::env::var("SENTINEL_MQTT_ADDR") {
            if !addr.trim().is_empty() {
                self.notify.mqtt_addr = Some(addr);
            }
        }
        if let Ok(url) = std::env::var("SENTINEL_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.notify.webhook_url = Some(url);
            }
        }
        if let Ok(secs) = std::env::var("SENTINEL_COOLDOWN_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| anyhow!("SENTINEL_COOLDOWN_SECS must be an integer number of seconds"))?;
            self.fusion.alert_cooldown = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.fusion.alert_cooldown.as_secs() == 0 {
            return Err(anyhow!("alert cooldown must be greater than zero"));
        }
        if self.fusion.violence_buffer_len == 0 {
            return Err(anyhow!("violence buffer length must be greater than zero"));
        }
        if self.fusion.dangerous_labels.is_empty() {
            return Err(anyhow!("dangerous label allow-list must not be empty"));
        }
        if self.fusion.group_size_threshold == 0 {
            return Err(anyhow!("group size threshold must be at least 1"));
        }
        for (name, value) in [
            (
                "object_confidence_threshold",
                self.fusion.object_confidence_threshold,
            ),
            ("violence_threshold", self.fusion.violence_threshold),
            (
                "raised_fraction_threshold",
                self.fusion.raised_fraction_threshold,
            ),
            ("proximity_threshold", self.fusion.proximity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1]", name));
            }
        }
        if self.ingest.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if let Some(webhook) = &self.notify.webhook_url {
            url::Url::parse(webhook)
                .map_err(|e| anyhow!("invalid webhook url '{}': {}", webhook, e))?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
