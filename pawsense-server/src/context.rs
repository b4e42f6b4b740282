// Shared application state handed to every handler

use crate::dispatcher::DispatchHandle;
use crate::error::MonitorError;
use crate::metrics::ServiceMetrics;
use crate::monitor::MonitorService;
use crate::vision::VisionBackend;
use crate::websocket::DashboardHub;
use pawsense_core::{
    AlertCoordinator, AnalysisQuota, DailySummary, PawsenseConfig, SessionAuthorizer,
    SharedCoordinator, StatusSnapshot,
};
use pawsense_eye::{PipelineConfig, VideoAnalyzer, VideoSummary, VisionError};
use parking_lot::Mutex;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<PawsenseConfig>,
    pub coordinator: SharedCoordinator,
    pub authorizer: Arc<Mutex<SessionAuthorizer>>,
    pub quota: Arc<Mutex<AnalysisQuota>>,
    pub hub: DashboardHub,
    pub alerts: DispatchHandle,
    pub monitor: Arc<MonitorService>,
    pub vision: VisionBackend,
    pub metrics: Arc<ServiceMetrics>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppContext {
    /// Create a new context; the configured owner chat starts authorized
    pub fn new(
        config: PawsenseConfig,
        vision: VisionBackend,
        alerts: DispatchHandle,
        metrics: Arc<ServiceMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        let coordinator = AlertCoordinator::shared(&config.monitor);
        let hub = DashboardHub::default();

        let mut authorizer = SessionAuthorizer::new();
        if let Some(owner) = config.telegram.chat_id.as_deref().filter(|c| !c.trim().is_empty()) {
            authorizer.preauthorize(owner.trim());
        }

        let monitor = MonitorService::new(
            vision.clone(),
            PipelineConfig::from_config(&config.models, &config.monitor),
            config.server.frame_rate,
            coordinator.clone(),
            hub.clone(),
            alerts.clone(),
            metrics.clone(),
            shutdown.clone(),
        );

        Self {
            quota: Arc::new(Mutex::new(AnalysisQuota::new(config.server.analysis_limit))),
            config: Arc::new(config),
            coordinator,
            authorizer: Arc::new(Mutex::new(authorizer)),
            hub,
            alerts,
            monitor: Arc::new(monitor),
            vision,
            metrics,
            shutdown,
            started_at: Instant::now(),
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        self.coordinator.lock().status()
    }

    pub fn summary(&self) -> DailySummary {
        self.coordinator.lock().summary()
    }

    /// Toggle the alert gate and tell the dashboards
    pub fn set_monitoring(&self, enabled: bool) -> StatusSnapshot {
        let status = {
            let mut coordinator = self.coordinator.lock();
            coordinator.set_monitoring(enabled);
            coordinator.status()
        };
        self.hub.publish("monitoring_changed", json!({ "enabled": enabled }));
        status
    }

    pub fn clear_history(&self) {
        self.coordinator.lock().clear();
        self.hub.publish("history_cleared", json!({}));
    }

    pub async fn start_realtime(&self) -> Result<(), MonitorError> {
        self.monitor.start().await
    }

    pub async fn stop_realtime(&self) -> bool {
        self.monitor.stop().await
    }

    /// Frame-sampled analysis of a stored video, run off the async workers.
    /// Uploaded videos never feed the live emotion history.
    pub async fn analyze_video(&self, path: &Path) -> Result<VideoSummary, VisionError> {
        let models = self.vision.models()?.clone();
        let vision = self.vision.clone();
        let crop = self.config.models.crop_to_dog;
        let path = path.to_path_buf();

        let summary = tokio::task::spawn_blocking(move || {
            let mut source = vision.open_video(&path)?;
            VideoAnalyzer::new(models.detector, models.classifier)
                .with_crop_to_dog(crop)
                .analyze(source.as_mut())
        })
        .await
        .map_err(|e| VisionError::Processing(format!("Analysis task failed: {}", e)))??;
        self.metrics.record_analysis("video");
        Ok(summary)
    }

    /// Cancel every background task and wait for the capture loop
    pub async fn shutdown(&self) {
        info!("Stopping background tasks");
        self.shutdown.cancel();
        self.monitor.stop().await;
    }
}
