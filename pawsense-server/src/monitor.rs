// Real-time monitoring: the capture loop and the periodic digest

use crate::dispatcher::{Delivery, DispatchHandle};
use crate::error::MonitorError;
use crate::metrics::ServiceMetrics;
use crate::notifier::ParseMode;
use crate::vision::VisionBackend;
use crate::websocket::DashboardHub;
use base64::Engine;
use chrono::Utc;
use pawsense_core::report::{alert_message, fallback_alert, render_digest};
use pawsense_core::{AlertDecision, Detection, EmotionLabel, EmotionSample, SharedCoordinator};
use pawsense_eye::{annotate, Classification, Frame, FramePipeline, FrameSource, PipelineConfig};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const FRAME_JPEG_QUALITY: u8 = 70;
const SNAPSHOT_JPEG_QUALITY: u8 = 90;
/// Dashboard frame pushes are capped at 10 per second
const MIN_PUSH_INTERVAL: Duration = Duration::from_millis(100);
/// Consecutive capture errors tolerated before the loop gives up
const MAX_READ_FAILURES: u32 = 10;
const READ_BACKOFF: Duration = Duration::from_millis(200);
/// How often the digest task checks whether a report is due
pub const DIGEST_CHECK_PERIOD: Duration = Duration::from_secs(60);

struct RunningCapture {
    token: CancellationToken,
    task: JoinHandle<CaptureReport>,
}

/// What one capture run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub frames: u64,
    pub classifications: u64,
    pub alerts: u64,
    pub dropped: u64,
}

/// Owns at most one capture loop at a time
pub struct MonitorService {
    vision: VisionBackend,
    pipeline: PipelineConfig,
    frame_interval: Duration,
    coordinator: SharedCoordinator,
    hub: DashboardHub,
    alerts: DispatchHandle,
    metrics: Arc<ServiceMetrics>,
    shutdown: CancellationToken,
    read_backoff: Duration,
    running: Mutex<Option<RunningCapture>>,
}

impl MonitorService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vision: VisionBackend,
        pipeline: PipelineConfig,
        frame_rate: u32,
        coordinator: SharedCoordinator,
        hub: DashboardHub,
        alerts: DispatchHandle,
        metrics: Arc<ServiceMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            vision,
            pipeline,
            frame_interval: Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64),
            coordinator,
            hub,
            alerts,
            metrics,
            shutdown,
            read_backoff: READ_BACKOFF,
            running: Mutex::new(None),
        }
    }

    /// Base delay between capture retries, multiplied by the failure count
    pub fn with_read_backoff(mut self, backoff: Duration) -> Self {
        self.read_backoff = backoff;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }

    /// Open the camera and start the capture loop on a blocking thread
    pub async fn start(&self) -> Result<(), MonitorError> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }
        let models = self
            .vision
            .models
            .clone()
            .ok_or_else(|| MonitorError::Unavailable("emotion models are not loaded".to_string()))?;
        let opener = self
            .vision
            .camera
            .clone()
            .ok_or_else(|| MonitorError::Unavailable("camera capture is not available in this build".to_string()))?;

        let source = tokio::task::spawn_blocking(move || opener())
            .await
            .map_err(|e| MonitorError::Unavailable(format!("camera open task failed: {}", e)))??;

        let mut running = self.running.lock();
        if running.as_ref().map(|r| !r.task.is_finished()).unwrap_or(false) {
            return Err(MonitorError::AlreadyRunning);
        }

        let token = self.shutdown.child_token();
        let capture = CaptureLoop {
            pipeline: FramePipeline::new(models.detector, models.classifier, self.pipeline.clone()),
            coordinator: self.coordinator.clone(),
            hub: self.hub.clone(),
            alerts: self.alerts.clone(),
            metrics: self.metrics.clone(),
            frame_interval: self.frame_interval,
            read_backoff: self.read_backoff,
            last_push: None,
            last_reading: None,
        };
        let loop_token = token.clone();
        let task = tokio::task::spawn_blocking(move || capture.run(source, loop_token));
        *running = Some(RunningCapture { token, task });

        info!("🎥 Real-time monitoring started");
        self.hub.publish("detection_started", json!({ "status": "success" }));
        Ok(())
    }

    /// Cancel the loop and wait for it. Returns false when nothing was running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            return false;
        };
        let was_active = !running.task.is_finished();
        running.token.cancel();
        match running.task.await {
            Ok(report) => info!("Real-time monitoring stopped after {} frames", report.frames),
            Err(e) => error!("Capture loop ended abnormally: {}", e),
        }
        was_active
    }

    /// Wait for the current loop to end on its own
    pub async fn join(&self) -> Option<CaptureReport> {
        let running = self.running.lock().take()?;
        running.task.await.ok()
    }
}

struct CaptureLoop {
    pipeline: FramePipeline,
    coordinator: SharedCoordinator,
    hub: DashboardHub,
    alerts: DispatchHandle,
    metrics: Arc<ServiceMetrics>,
    frame_interval: Duration,
    read_backoff: Duration,
    last_push: Option<Instant>,
    /// Most recent emotion, drawn on pushed frames while a dog is in view
    last_reading: Option<(EmotionLabel, f32)>,
}

impl CaptureLoop {
    /// Cancellation is checked once per frame
    fn run(mut self, mut source: Box<dyn FrameSource>, token: CancellationToken) -> CaptureReport {
        let mut report = CaptureReport::default();
        let mut failures: u32 = 0;
        loop {
            if token.is_cancelled() {
                break;
            }
            let started = Instant::now();

            let frame = match source.read_frame() {
                Ok(Some(frame)) => {
                    failures = 0;
                    frame
                }
                Ok(None) => {
                    info!("Capture source reached the end of the stream");
                    break;
                }
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_READ_FAILURES {
                        error!("Capture failed {} times in a row, giving up: {}", failures, e);
                        self.hub.publish("detection_error", json!({ "error": e.to_string() }));
                        break;
                    }
                    warn!("Capture failed ({}/{}): {}", failures, MAX_READ_FAILURES, e);
                    if !wait_unless_cancelled(&token, self.read_backoff * failures) {
                        break;
                    }
                    continue;
                }
            };
            report.frames += 1;
            self.metrics.record_frame();

            match self.pipeline.process(&frame) {
                Ok(outcome) => {
                    if let Some(classification) = &outcome.classification {
                        report.classifications += 1;
                        self.last_reading = Some((classification.label.clone(), classification.confidence));
                        if self.handle_classification(&frame, classification, &outcome.detections) {
                            report.alerts += 1;
                        }
                    }
                    self.push_frame(&frame, &outcome.detections);
                }
                Err(e) => {
                    report.dropped += 1;
                    warn!("Dropping frame {}: {}", report.frames, e);
                    self.push_frame(&frame, &[]);
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }

        self.hub.publish(
            "detection_stopped",
            json!({ "status": "success", "frames": report.frames }),
        );
        report
    }

    /// Returns whether an alert was raised
    fn handle_classification(&self, frame: &Frame, classification: &Classification, detections: &[Detection]) -> bool {
        let dogs = detections.len();
        let sample = EmotionSample::new(classification.label.clone(), classification.confidence);
        let recorded_at = sample.recorded_at;
        let (decision, monitoring) = {
            let mut coordinator = self.coordinator.lock();
            let decision = coordinator.observe(sample);
            (decision, coordinator.monitoring().is_enabled())
        };
        self.metrics.record_classification(classification.label.as_str());

        let probabilities: serde_json::Map<String, serde_json::Value> = classification
            .labelled()
            .into_iter()
            .map(|(label, p)| (label.as_str().to_string(), json!(p)))
            .collect();
        self.hub.publish(
            "emotion_update",
            json!({
                "emotion": classification.label,
                "confidence": classification.confidence,
                "probabilities": probabilities,
                "dogs": dogs,
                "monitoring": monitoring,
                "timestamp": recorded_at,
            }),
        );

        let AlertDecision::Alert { kind, label, confidence } = decision else {
            return false;
        };
        self.hub.publish(
            "alert",
            json!({
                "kind": kind,
                "emotion": label,
                "confidence": confidence,
                "timestamp": recorded_at,
            }),
        );
        let snapshot = match annotate(frame, detections, Some((&label, confidence))).to_jpeg(SNAPSHOT_JPEG_QUALITY) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!("Could not encode alert snapshot: {}", e);
                None
            }
        };
        self.alerts.enqueue(Delivery::Alert {
            message: alert_message(&label, confidence, kind, Utc::now()),
            fallback: fallback_alert(&label, confidence),
            snapshot,
        });
        true
    }

    fn push_frame(&mut self, frame: &Frame, detections: &[Detection]) {
        if self.hub.receiver_count() == 0 {
            return;
        }
        let now = Instant::now();
        if self.last_push.is_some_and(|last| now.duration_since(last) < MIN_PUSH_INTERVAL) {
            return;
        }
        self.last_push = Some(now);
        let reading = match (&self.last_reading, detections.is_empty()) {
            (Some((label, confidence)), false) => Some((label, *confidence)),
            _ => None,
        };
        match annotate(frame, detections, reading).to_jpeg(FRAME_JPEG_QUALITY) {
            Ok(jpeg) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
                self.hub.publish(
                    "frame_update",
                    json!({ "frame": encoded, "dogs": detections.len() }),
                );
            }
            Err(e) => debug!("Skipping frame push: {}", e),
        }
    }
}

// Blocking sleep in short slices; false when cancelled meanwhile
fn wait_unless_cancelled(token: &CancellationToken, total: Duration) -> bool {
    const SLICE: Duration = Duration::from_millis(20);
    let deadline = Instant::now() + total;
    loop {
        if token.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLICE.min(deadline - now));
    }
}

/// Push the periodic digest to the chat while monitoring is enabled
pub fn spawn_digest_task(
    coordinator: SharedCoordinator,
    alerts: DispatchHandle,
    token: CancellationToken,
    check_every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(check_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            if send_due_digest(&coordinator, &alerts, Instant::now()) {
                info!("⏰ Periodic digest queued");
            }
        }
        debug!("Digest task stopped");
    })
}

/// Queue the digest when one is due; it counts as sent only once the dispatcher accepted it
pub fn send_due_digest(coordinator: &SharedCoordinator, alerts: &DispatchHandle, now: Instant) -> bool {
    let text = {
        let coordinator = coordinator.lock();
        if !coordinator.digest_due(now) {
            return false;
        }
        render_digest(&coordinator.summary())
    };
    let queued = alerts.enqueue(Delivery::Text {
        text,
        mode: ParseMode::Markdown,
    });
    if queued {
        coordinator.lock().mark_digest_sent(now);
    } else {
        warn!("Periodic digest not queued, retrying on the next check");
    }
    queued
}
