use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureSettings;
use crate::classify::PRESENCE_MIN_CONF;
use crate::engine::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT};
use crate::frame::MAX_FRAME_DIM;
use crate::gate::GateThresholds;
use crate::ingest::{SourceSettings, DEFAULT_SOURCE_URL};

const DEFAULT_SOURCE_FPS: u32 = 15;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_INFERENCE_INTERVAL_MS: u64 = 500;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;
const DEFAULT_TARGET_CROP: &str = "tomato";
const DEFAULT_LABELS_FILE: &str = "class_names.json";

#[derive(Debug, Deserialize, Default)]
struct SorterdConfigFile {
    source: Option<SourceConfigFile>,
    gate: Option<GateConfigFile>,
    classifier: Option<ClassifierConfigFile>,
    capture: Option<CaptureConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct GateConfigFile {
    min_present_streak: Option<u32>,
    class_stability: Option<usize>,
    armed_first_min_conf: Option<f32>,
    motion_score_threshold: Option<f64>,
    scene_edge_min: Option<f64>,
    scene_contrast_min: Option<f64>,
    edge_delta_min: Option<f64>,
    contrast_delta_min: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassifierConfigFile {
    presence_min_conf: Option<f32>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    preprocess_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    inference_interval_ms: Option<u64>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    wait_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    target_crop: Option<String>,
    auto_arm: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct SorterdConfig {
    pub source: SourceSettings,
    pub gate: GateThresholds,
    pub classifier: ClassifierSettings,
    pub capture: CaptureSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub presence_min_conf: f32,
    /// ONNX model; `None` selects the model-free scene classifier.
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub preprocess_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub target_crop: String,
    /// Arm immediately for each session instead of waiting for an operator
    /// trigger on stdin.
    pub auto_arm: bool,
}

impl SorterdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SORTER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SorterdConfigFile) -> Self {
        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source_file.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };

        let defaults = GateThresholds::default();
        let gate_file = file.gate.unwrap_or_default();
        let gate = GateThresholds {
            min_present_streak: gate_file
                .min_present_streak
                .unwrap_or(defaults.min_present_streak),
            class_stability: gate_file
                .class_stability
                .unwrap_or(defaults.class_stability),
            armed_first_min_conf: gate_file
                .armed_first_min_conf
                .unwrap_or(defaults.armed_first_min_conf),
            motion_score_threshold: gate_file
                .motion_score_threshold
                .unwrap_or(defaults.motion_score_threshold),
            scene_edge_min: gate_file.scene_edge_min.unwrap_or(defaults.scene_edge_min),
            scene_contrast_min: gate_file
                .scene_contrast_min
                .unwrap_or(defaults.scene_contrast_min),
            edge_delta_min: gate_file.edge_delta_min.unwrap_or(defaults.edge_delta_min),
            contrast_delta_min: gate_file
                .contrast_delta_min
                .unwrap_or(defaults.contrast_delta_min),
        };

        let classifier_file = file.classifier.unwrap_or_default();
        let classifier = ClassifierSettings {
            presence_min_conf: classifier_file
                .presence_min_conf
                .unwrap_or(PRESENCE_MIN_CONF),
            model_path: classifier_file.model_path,
            labels_path: classifier_file.labels_path,
            preprocess_path: classifier_file.preprocess_path,
        };

        let capture_file = file.capture.unwrap_or_default();
        let capture = CaptureSettings {
            inference_interval: Duration::from_millis(
                capture_file
                    .inference_interval_ms
                    .unwrap_or(DEFAULT_INFERENCE_INTERVAL_MS),
            ),
            retry_backoff: Duration::from_millis(
                capture_file
                    .retry_backoff_ms
                    .unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
            ),
        };

        let session_file = file.session.unwrap_or_default();
        let session = SessionSettings {
            wait_timeout: session_file
                .wait_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WAIT_TIMEOUT),
            poll_interval: session_file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            target_crop: session_file
                .target_crop
                .unwrap_or_else(|| DEFAULT_TARGET_CROP.to_string()),
            auto_arm: session_file.auto_arm.unwrap_or(true),
        };

        Self {
            source,
            gate,
            classifier,
            capture,
            session,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SORTER_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(crop) = std::env::var("SORTER_TARGET_CROP") {
            if !crop.trim().is_empty() {
                self.session.target_crop = crop;
            }
        }
        if let Ok(timeout) = std::env::var("SORTER_WAIT_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                anyhow!("SORTER_WAIT_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.session.wait_timeout = Duration::from_millis(millis);
        }
        if let Ok(interval) = std::env::var("SORTER_INFERENCE_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("SORTER_INFERENCE_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.capture.inference_interval = Duration::from_millis(millis);
        }
        if let Ok(path) = std::env::var("SORTER_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.classifier.model_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        self.source.url = self.source.url.trim().to_string();
        for (name, value) in [("width", self.source.width), ("height", self.source.height)] {
            if value == 0 || value > MAX_FRAME_DIM {
                return Err(anyhow!(
                    "source {} must be within 1..={}, got {}",
                    name,
                    MAX_FRAME_DIM,
                    value
                ));
            }
        }

        self.gate.validate()?;

        if !(0.0..=1.0).contains(&self.classifier.presence_min_conf) {
            return Err(anyhow!(
                "presence_min_conf must be within 0..=1, got {}",
                self.classifier.presence_min_conf
            ));
        }
        if let Some(model_path) = &self.classifier.model_path {
            if self.classifier.labels_path.is_none() {
                self.classifier.labels_path = Some(model_path.with_file_name(DEFAULT_LABELS_FILE));
            }
        }

        if self.capture.inference_interval.is_zero() {
            return Err(anyhow!("inference interval must be greater than zero"));
        }
        if self.session.wait_timeout.is_zero() {
            return Err(anyhow!("wait timeout must be greater than zero"));
        }
        if self.session.poll_interval.is_zero() {
            return Err(anyhow!("poll interval must be greater than zero"));
        }
        if self.session.poll_interval > self.session.wait_timeout {
            return Err(anyhow!(
                "poll interval ({:?}) must not exceed wait timeout ({:?})",
                self.session.poll_interval,
                self.session.wait_timeout
            ));
        }

        let crop = self.session.target_crop.trim().to_lowercase();
        if crop.is_empty() {
            return Err(anyhow!("target crop must not be empty"));
        }
        self.session.target_crop = crop;
        Ok(())
    }
}

impl Default for SorterdConfig {
    fn default() -> Self {
        Self::from_file(SorterdConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<SorterdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
