pub mod types;
pub mod error;
pub mod config;
pub mod history;
pub mod cooldown;
pub mod coordinator;
pub mod auth;
pub mod report;
pub mod quota;

pub use error::{Error, Result};
pub use types::{BoundingBox, Detection, EmotionLabel, EmotionSample};
pub use config::{
    CameraConfig, LoggingConfig, ModelConfig, MonitorConfig, PawsenseConfig, ServerConfig,
    TelegramConfig,
};
pub use history::{detect_pattern, EmotionHistory};
pub use cooldown::{AlertCooldownState, CooldownKey};
pub use coordinator::{
    periodic_digest_due, AlertCoordinator, AlertDecision, MonitoringState, SharedCoordinator,
};
pub use auth::SessionAuthorizer;
pub use report::{AlertKind, CoordinatorStats, DailySummary, EmotionCount, EmotionReading, StatusSnapshot};
pub use quota::AnalysisQuota;
