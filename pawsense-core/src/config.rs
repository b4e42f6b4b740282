// Configuration for the PawSense monitor
//
// Layering: built-in defaults, then an optional TOML file, then
// `PAWSENSE__SECTION__KEY` environment variables. The Telegram credentials
// also honour the plain `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID` variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MIN_HISTORY_CAPACITY: usize = 4;
pub const MAX_HISTORY_CAPACITY: usize = 200;

/// Alerting and history parameters consumed by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum classifier confidence for an alert
    pub emotion_threshold: f32,
    /// Minimum seconds between two alerts for the same key
    pub alert_cooldown_secs: u64,
    /// Consecutive negative samples that form a pattern
    pub pattern_length: usize,
    pub history_capacity: usize,
    pub digest_interval_secs: u64,
    /// Minimum seconds between two classifications of a live stream
    pub analysis_interval_secs: u64,
    /// Throttle per (emotion, confidence decile) instead of per emotion
    pub bucket_by_confidence: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            emotion_threshold: 0.6,
            alert_cooldown_secs: 30,
            pattern_length: 3,
            history_capacity: 50,
            digest_interval_secs: 1800,
            analysis_interval_secs: 2,
            bucket_by_confidence: false,
        }
    }
}

impl MonitorConfig {
    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn digest_interval(&self) -> Duration {
        Duration::from_secs(self.digest_interval_secs)
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.analysis_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// YOLOv8 ONNX export
    pub detector_path: PathBuf,
    /// Four-class emotion classifier ONNX export
    pub classifier_path: PathBuf,
    pub detector_threshold: f32,
    pub nms_threshold: f32,
    /// Run the detector on every n-th frame, reusing the last result in between
    pub frame_skip: u32,
    /// Classify the best dog crop instead of the whole frame
    pub crop_to_dog: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_path: PathBuf::from("models/yolov8n.onnx"),
            classifier_path: PathBuf::from("models/dog_emotion.onnx"),
            detector_threshold: 0.60,
            nms_threshold: 0.45,
            frame_skip: 2,
            crop_to_dog: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Free uploaded analyses per client; 0 disables the limit
    pub analysis_limit: u32,
    /// Dashboard frame push rate while streaming
    pub frame_rate: u32,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            analysis_limit: 5,
            frame_rate: 10,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: Option<String>,
}

impl TelegramConfig {
    /// Both credentials present and non-empty
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        present(&self.token) && present(&self.chat_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Daily-rolling log files are written here when set
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: Some(PathBuf::from("logs")),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PawsenseConfig {
    pub monitor: MonitorConfig,
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
}

impl PawsenseConfig {
    /// Load defaults, an optional TOML file and environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&PawsenseConfig::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Configuration(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PAWSENSE")
                .separator("__")
                .try_parsing(true),
        );

        let mut cfg: PawsenseConfig = builder.build()?.try_deserialize()?;
        cfg.apply_legacy_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: PawsenseConfig =
            toml::from_str(raw).map_err(|e| Error::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn apply_legacy_env(&mut self) {
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.trim().is_empty() {
                self.telegram.token = Some(token);
            }
        }
        if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
            if !chat_id.trim().is_empty() {
                self.telegram.chat_id = Some(chat_id);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let m = &self.monitor;
        if !(m.emotion_threshold > 0.0 && m.emotion_threshold <= 1.0) {
            return Err(Error::Configuration(
                "monitor.emotion_threshold must be in (0, 1]".to_string(),
            ));
        }
        if m.alert_cooldown_secs == 0 {
            return Err(Error::Configuration(
                "monitor.alert_cooldown_secs must be > 0".to_string(),
            ));
        }
        if !(MIN_HISTORY_CAPACITY..=MAX_HISTORY_CAPACITY).contains(&m.history_capacity) {
            return Err(Error::Configuration(format!(
                "monitor.history_capacity must be between {} and {}",
                MIN_HISTORY_CAPACITY, MAX_HISTORY_CAPACITY
            )));
        }
        if m.pattern_length == 0 || m.pattern_length > m.history_capacity {
            return Err(Error::Configuration(
                "monitor.pattern_length must be between 1 and history_capacity".to_string(),
            ));
        }
        if m.digest_interval_secs == 0 {
            return Err(Error::Configuration(
                "monitor.digest_interval_secs must be > 0".to_string(),
            ));
        }

        let c = &self.camera;
        if c.width == 0 || c.height == 0 {
            return Err(Error::Configuration("camera resolution must be non-zero".to_string()));
        }
        if c.width > 7680 || c.height > 4320 {
            return Err(Error::Configuration("camera resolution too large (max 8K)".to_string()));
        }
        if c.fps == 0 || c.fps > 120 {
            return Err(Error::Configuration("camera.fps must be between 1 and 120".to_string()));
        }
        if c.index > 100 {
            return Err(Error::Configuration("camera.index too large (max 100)".to_string()));
        }

        let md = &self.models;
        if !(md.detector_threshold > 0.0 && md.detector_threshold <= 1.0) {
            return Err(Error::Configuration(
                "models.detector_threshold must be in (0, 1]".to_string(),
            ));
        }
        if !(md.nms_threshold > 0.0 && md.nms_threshold <= 1.0) {
            return Err(Error::Configuration(
                "models.nms_threshold must be in (0, 1]".to_string(),
            ));
        }
        if md.frame_skip == 0 {
            return Err(Error::Configuration("models.frame_skip must be >= 1".to_string()));
        }

        let s = &self.server;
        if s.port == 0 {
            return Err(Error::Configuration("server.port cannot be 0".to_string()));
        }
        if s.frame_rate == 0 || s.frame_rate > 60 {
            return Err(Error::Configuration(
                "server.frame_rate must be between 1 and 60".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PawsenseConfig::default();
        assert_eq!(config.monitor.emotion_threshold, 0.6);
        assert_eq!(config.monitor.alert_cooldown_secs, 30);
        assert_eq!(config.monitor.pattern_length, 3);
        assert_eq!(config.monitor.digest_interval_secs, 1800);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.analysis_limit, 5);
        assert!(!config.telegram.is_configured());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_threshold() {
        let mut config = PawsenseConfig::default();
        config.monitor.emotion_threshold = 0.0;
        assert!(config.validate().is_err());
        config.monitor.emotion_threshold = 1.01;
        assert!(config.validate().is_err());
        config.monitor.emotion_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_history_bounds() {
        let mut config = PawsenseConfig::default();
        config.monitor.history_capacity = 3;
        assert!(config.validate().is_err());
        config.monitor.history_capacity = 201;
        assert!(config.validate().is_err());
        config.monitor.history_capacity = 4;
        config.monitor.pattern_length = 5;
        assert!(config.validate().is_err());
        config.monitor.pattern_length = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_camera() {
        let mut config = PawsenseConfig::default();
        config.camera.fps = 0;
        assert!(config.validate().is_err());
        config.camera.fps = 30;
        config.camera.width = 7681;
        assert!(config.validate().is_err());
        config.camera.width = 640;
        config.camera.index = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PawsenseConfig::from_toml_str(
            r#"
            [monitor]
            emotion_threshold = 0.7
            alert_cooldown_secs = 2

            [telegram]
            token = "123:abc"
            chat_id = "42"
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.emotion_threshold, 0.7);
        assert_eq!(config.monitor.alert_cooldown_secs, 2);
        assert_eq!(config.monitor.pattern_length, 3);
        assert_eq!(config.server.port, 5000);
        assert!(config.telegram.is_configured());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PawsenseConfig::default();
        let raw = config.to_toml_string().unwrap();
        let back = PawsenseConfig::from_toml_str(&raw).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pawsense.toml");
        std::fs::write(&path, "[server]\nport = 8088\n").unwrap();
        let config = PawsenseConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.monitor.history_capacity, 50);
    }

    #[test]
    fn test_load_missing_file() {
        let result = PawsenseConfig::load(Some(Path::new("/nonexistent/pawsense.toml")));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_blank_credentials_not_configured() {
        let telegram = TelegramConfig {
            token: Some("  ".to_string()),
            chat_id: Some("1".to_string()),
            api_base: None,
        };
        assert!(!telegram.is_configured());
    }
}
