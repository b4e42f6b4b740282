use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Process counters, mirrored into the `metrics` facade
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    frames_processed: AtomicU64,
    classifications: AtomicU64,
    alerts_delivered: AtomicU64,
    delivery_failures: AtomicU64,
    analyses: AtomicU64,
    dashboard_clients: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub classifications: u64,
    pub alerts_delivered: u64,
    pub delivery_failures: u64,
    pub analyses: u64,
    pub dashboard_clients: i64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        counter!("pawsense_frames_processed_total").increment(1);
    }

    pub fn record_classification(&self, label: &str) {
        self.classifications.fetch_add(1, Ordering::Relaxed);
        counter!("pawsense_classifications_total", "emotion" => label.to_string()).increment(1);
    }

    pub fn record_delivery(&self) {
        self.alerts_delivered.fetch_add(1, Ordering::Relaxed);
        counter!("pawsense_notifications_sent_total").increment(1);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        counter!("pawsense_notification_failures_total").increment(1);
    }

    pub fn record_analysis(&self, kind: &'static str) {
        self.analyses.fetch_add(1, Ordering::Relaxed);
        counter!("pawsense_uploads_analyzed_total", "kind" => kind).increment(1);
    }

    pub fn client_connected(&self) {
        let now = self.dashboard_clients.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("pawsense_dashboard_clients").set(now as f64);
    }

    pub fn client_disconnected(&self) {
        let now = self.dashboard_clients.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("pawsense_dashboard_clients").set(now.max(0) as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            classifications: self.classifications.load(Ordering::Relaxed),
            alerts_delivered: self.alerts_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            analyses: self.analyses.load(Ordering::Relaxed),
            dashboard_clients: self.dashboard_clients.load(Ordering::Relaxed).max(0),
        }
    }

    /// Prometheus text exposition of the local counters
    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            "# HELP pawsense_frames_processed_total Frames run through the pipeline\n\
             # TYPE pawsense_frames_processed_total counter\n\
             pawsense_frames_processed_total {}\n\
             # HELP pawsense_classifications_total Emotion classifications\n\
             # TYPE pawsense_classifications_total counter\n\
             pawsense_classifications_total {}\n\
             # HELP pawsense_notifications_sent_total Chat notifications delivered\n\
             # TYPE pawsense_notifications_sent_total counter\n\
             pawsense_notifications_sent_total {}\n\
             # HELP pawsense_notification_failures_total Chat notifications given up on\n\
             # TYPE pawsense_notification_failures_total counter\n\
             pawsense_notification_failures_total {}\n\
             # HELP pawsense_uploads_analyzed_total Uploaded images and videos analyzed\n\
             # TYPE pawsense_uploads_analyzed_total counter\n\
             pawsense_uploads_analyzed_total {}\n\
             # HELP pawsense_dashboard_clients Connected dashboard sockets\n\
             # TYPE pawsense_dashboard_clients gauge\n\
             pawsense_dashboard_clients {}\n",
            s.frames_processed,
            s.classifications,
            s.alerts_delivered,
            s.delivery_failures,
            s.analyses,
            s.dashboard_clients
        )
    }
}
