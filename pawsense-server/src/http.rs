// HTTP API for the dashboard

use crate::context::AppContext;
use crate::dispatcher::Delivery;
use crate::error::{ApiError, ApiResult};
use crate::notifier::ParseMode;
use crate::static_files::dashboard_handler;
use crate::vision::VisionStatus;
use crate::websocket::websocket_handler;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use pawsense_core::{DailySummary, StatusSnapshot};
use pawsense_eye::{analyze_image, render_video_summary, Frame, ImageAnalysis, VideoSummary};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub realtime: bool,
    pub telegram: bool,
    pub vision: VisionStatusBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VisionStatusBody {
    pub models_loaded: bool,
    pub camera_available: bool,
    pub video_available: bool,
}

impl From<VisionStatus> for VisionStatusBody {
    fn from(status: VisionStatus) -> Self {
        Self {
            models_loaded: status.models_loaded,
            camera_available: status.camera_available,
            video_available: status.video_available,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: StatusSnapshot,
    pub realtime: bool,
}

#[derive(Debug, Deserialize)]
pub struct MonitoringRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub filename: String,
    #[serde(default)]
    pub notify: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "lowercase")]
pub enum AnalysisResult {
    Image(ImageAnalysis),
    Video(VideoSummary),
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    /// None when uploads are unlimited
    pub remaining: Option<u32>,
}

/// Create the router with every dashboard route
pub fn create_router(ctx: AppContext) -> Router {
    let upload_limit = ctx.config.server.max_upload_bytes;

    let public_routes = Router::new()
        .route("/", get(dashboard_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/ws", get(websocket_handler));

    let api_routes = Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/monitoring", post(monitoring_handler))
        .route("/api/clear", post(clear_handler))
        .route("/api/realtime/start", post(realtime_start_handler))
        .route("/api/realtime/stop", post(realtime_stop_handler))
        .route("/api/telegram/test", post(telegram_test_handler));

    let upload_routes = Router::new()
        .route("/api/analyze", post(analyze_handler))
        .layer(DefaultBodyLimit::max(upload_limit));

    public_routes
        .merge(api_routes)
        .merge(upload_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

async fn health_handler(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        realtime: ctx.monitor.is_running(),
        telegram: ctx.alerts.is_enabled(),
        vision: ctx.vision.describe().into(),
    })
}

/// Metrics endpoint (Prometheus format)
async fn metrics_handler(State(ctx): State<AppContext>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        ctx.metrics.render_prometheus(),
    )
}

async fn status_handler(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: ctx.status(),
        realtime: ctx.monitor.is_running(),
    })
}

async fn summary_handler(State(ctx): State<AppContext>) -> Json<DailySummary> {
    Json(ctx.summary())
}

async fn monitoring_handler(
    State(ctx): State<AppContext>,
    Json(request): Json<MonitoringRequest>,
) -> Json<StatusSnapshot> {
    Json(ctx.set_monitoring(request.enabled))
}

async fn clear_handler(State(ctx): State<AppContext>) -> Json<StatusSnapshot> {
    ctx.clear_history();
    Json(ctx.status())
}

async fn realtime_start_handler(State(ctx): State<AppContext>) -> ApiResult<impl IntoResponse> {
    ctx.start_realtime().await?;
    Ok(Json(json!({ "status": "started" })))
}

async fn realtime_stop_handler(State(ctx): State<AppContext>) -> impl IntoResponse {
    let was_running = ctx.stop_realtime().await;
    Json(json!({ "status": "stopped", "was_running": was_running }))
}

async fn telegram_test_handler(State(ctx): State<AppContext>) -> ApiResult<impl IntoResponse> {
    if !ctx.alerts.is_enabled() {
        return Err(ApiError::Unavailable("Telegram bot is not configured".to_string()));
    }
    let queued = ctx.alerts.enqueue(Delivery::Text {
        text: "🧪 Test message from PawSense. Notifications are working.".to_string(),
        mode: ParseMode::Plain,
    });
    if !queued {
        return Err(ApiError::Unavailable("Notification queue is full".to_string()));
    }
    Ok(Json(json!({ "status": "queued" })))
}

/// Analyze an uploaded still or video sent as the raw request body
async fn analyze_handler(
    State(ctx): State<AppContext>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(params): Query<AnalyzeParams>,
    body: Bytes,
) -> ApiResult<Json<AnalyzeResponse>> {
    let client = client_id(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let remaining = ctx.quota.lock().reserve(&client)?;

    match analyze_upload(&ctx, &params, body).await {
        Ok(analysis) => {
            info!("Upload {} analyzed for {}", params.filename, client);
            Ok(Json(AnalyzeResponse {
                success: true,
                analysis,
                remaining,
            }))
        }
        Err(e) => {
            ctx.quota.lock().release(&client);
            Err(e)
        }
    }
}

async fn analyze_upload(ctx: &AppContext, params: &AnalyzeParams, body: Bytes) -> ApiResult<AnalysisResult> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    }
    let extension = extension_of(&params.filename)
        .ok_or_else(|| ApiError::BadRequest(format!("Unsupported file: {}", params.filename)))?;

    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(AnalysisResult::Image(analyze_upload_image(ctx, body).await?))
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        Ok(AnalysisResult::Video(
            analyze_upload_video(ctx, body, &extension, params.notify).await?,
        ))
    } else {
        Err(ApiError::BadRequest(format!("Unsupported file format: .{}", extension)))
    }
}

async fn analyze_upload_image(ctx: &AppContext, body: Bytes) -> ApiResult<ImageAnalysis> {
    let models = ctx.vision.models()?.clone();
    let crop = ctx.config.models.crop_to_dog;
    let analysis = tokio::task::spawn_blocking(move || {
        let frame = Frame::decode(&body)?;
        analyze_image(models.detector.as_ref(), models.classifier.as_ref(), &frame, crop)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Analysis task failed: {}", e)))??;
    ctx.metrics.record_analysis("image");
    Ok(analysis)
}

async fn analyze_upload_video(
    ctx: &AppContext,
    body: Bytes,
    extension: &str,
    notify: bool,
) -> ApiResult<VideoSummary> {
    // Fail before buffering the upload when models are missing
    ctx.vision.models()?;

    let mut upload = tempfile::Builder::new()
        .prefix("pawsense-upload-")
        .suffix(&format!(".{}", extension))
        .tempfile()
        .map_err(|e| ApiError::Internal(format!("Could not store upload: {}", e)))?;
    upload
        .write_all(&body)
        .and_then(|_| upload.flush())
        .map_err(|e| ApiError::Internal(format!("Could not store upload: {}", e)))?;

    let summary = ctx.analyze_video(upload.path()).await?;

    if notify && ctx.alerts.is_enabled() {
        match upload.into_temp_path().keep() {
            Ok(path) => {
                let queued = ctx.alerts.enqueue(Delivery::Video {
                    path: path.clone(),
                    caption: render_video_summary(&summary),
                    remove_after: true,
                });
                if !queued {
                    let _ = std::fs::remove_file(&path);
                }
            }
            Err(e) => warn!("Could not keep upload for delivery: {}", e),
        }
    }
    Ok(summary)
}

/// Client identity for the analysis quota: first forwarded address, else the peer
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn extension_of(filename: &str) -> Option<String> {
    let (_, extension) = filename.rsplit_once('.')?;
    let extension = extension.trim().to_lowercase();
    (!extension.is_empty()).then_some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.168.1.7:5555".parse().unwrap();
        assert_eq!(client_id(&headers, Some(peer)), "192.168.1.7");
        assert_eq!(client_id(&headers, None), "unknown");

        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_id(&headers, Some(peer)), "203.0.113.9");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("dog.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("clip.final.mp4").as_deref(), Some("mp4"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
    }
}
