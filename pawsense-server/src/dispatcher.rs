// Single task that owns the notifier and works through queued deliveries

use crate::error::NotifyError;
use crate::metrics::ServiceMetrics;
use crate::notifier::{Notifier, ParseMode};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const QUEUE_CAPACITY: usize = 32;
/// Upper bound for one delivery including its fallback
pub const JOB_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Formatted alert with an optional JPEG snapshot and a plain fallback
    Alert {
        message: String,
        fallback: String,
        snapshot: Option<Vec<u8>>,
    },
    Text { text: String, mode: ParseMode },
    /// `remove_after` deletes the file once the delivery is over
    Video {
        path: PathBuf,
        caption: String,
        remove_after: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Primary send failed, the plain fallback went through
    Fallback,
    Failed,
}

/// Cheap handle for enqueueing deliveries. Disabled when no bot is configured.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: Option<mpsc::Sender<Delivery>>,
}

impl DispatchHandle {
    /// Bounded queue and its handle; the receiver side is driven by [`spawn_dispatcher`]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Never blocks; a full queue drops the delivery
    pub fn enqueue(&self, delivery: Delivery) -> bool {
        let Some(tx) = &self.tx else {
            debug!("Notifications disabled, dropping delivery");
            return false;
        };
        match tx.try_send(delivery) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Notification queue full, dropping delivery");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Notification dispatcher stopped, dropping delivery");
                false
            }
        }
    }
}

/// Start the dispatcher task; it exits when every handle is dropped, or when
/// `token` is cancelled and the queued deliveries have been worked off
pub fn spawn_dispatcher(
    notifier: Arc<dyn Notifier>,
    metrics: Arc<ServiceMetrics>,
    token: CancellationToken,
    job_timeout: Duration,
) -> (DispatchHandle, JoinHandle<()>) {
    let (handle, mut rx) = DispatchHandle::channel(QUEUE_CAPACITY);
    let task = tokio::spawn(async move {
        info!("📨 Notification dispatcher started");
        loop {
            let delivery = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            run_job(notifier.as_ref(), &metrics, &delivery, job_timeout).await;
        }

        // Shutdown: stop accepting, then flush what is already queued within one job timeout
        rx.close();
        let deadline = tokio::time::Instant::now() + job_timeout;
        let mut flushed = 0usize;
        let mut dropped = 0usize;
        while let Some(delivery) = rx.recv().await {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                dropped += 1;
                continue;
            }
            if run_job(notifier.as_ref(), &metrics, &delivery, remaining).await {
                flushed += 1;
            }
        }
        if flushed > 0 {
            info!("Flushed {} queued deliveries on shutdown", flushed);
        }
        if dropped > 0 {
            warn!("Dropped {} queued deliveries on shutdown", dropped);
        }
        info!("Notification dispatcher stopped");
    });
    (handle, task)
}

// Returns false when the delivery failed or timed out
async fn run_job(notifier: &dyn Notifier, metrics: &ServiceMetrics, delivery: &Delivery, limit: Duration) -> bool {
    match tokio::time::timeout(limit, deliver(notifier, delivery)).await {
        Ok(DeliveryOutcome::Failed) => {
            metrics.record_delivery_failure();
            false
        }
        Ok(_) => {
            metrics.record_delivery();
            true
        }
        Err(_) => {
            warn!("Delivery timed out after {:?}", limit);
            metrics.record_delivery_failure();
            false
        }
    }
}

/// Run one delivery: the primary send, then at most one plain-text fallback
pub async fn deliver(notifier: &dyn Notifier, delivery: &Delivery) -> DeliveryOutcome {
    match delivery {
        Delivery::Alert {
            message,
            fallback,
            snapshot,
        } => {
            let primary = match snapshot {
                Some(jpeg) => send_snapshot(notifier, jpeg, message).await,
                None => notifier.send_text(message, ParseMode::Markdown).await,
            };
            match primary {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(e) => {
                    warn!("Alert delivery failed, sending plain fallback: {}", e);
                    fall_back(notifier, fallback).await
                }
            }
        }
        Delivery::Text { text, mode } => match notifier.send_text(text, *mode).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) if *mode == ParseMode::Markdown => {
                warn!("Markdown message rejected, resending as plain text: {}", e);
                fall_back(notifier, text).await
            }
            Err(e) => {
                warn!("Message delivery failed: {}", e);
                DeliveryOutcome::Failed
            }
        },
        Delivery::Video {
            path,
            caption,
            remove_after,
        } => {
            let outcome = match notifier.send_video(path, caption).await {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(e) => {
                    warn!("Video delivery failed, sending caption only: {}", e);
                    fall_back(notifier, caption).await
                }
            };
            if *remove_after {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    debug!("Could not remove {}: {}", path.display(), e);
                }
            }
            outcome
        }
    }
}

async fn fall_back(notifier: &dyn Notifier, text: &str) -> DeliveryOutcome {
    match notifier.send_text(text, ParseMode::Plain).await {
        Ok(()) => DeliveryOutcome::Fallback,
        Err(e) => {
            warn!("Fallback delivery failed, giving up: {}", e);
            DeliveryOutcome::Failed
        }
    }
}

// The snapshot file lives until the send completes
async fn send_snapshot(notifier: &dyn Notifier, jpeg: &[u8], caption: &str) -> Result<(), NotifyError> {
    let mut file = tempfile::Builder::new()
        .prefix("pawsense-alert-")
        .suffix(".jpg")
        .tempfile()?;
    file.write_all(jpeg)?;
    file.flush()?;
    notifier.send_image(file.path(), caption).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::MockNotifier;
    use mockall::predicate::eq;

    fn alert(snapshot: Option<Vec<u8>>) -> Delivery {
        Delivery::Alert {
            message: "*ALERT*".to_string(),
            fallback: "ALERT".to_string(),
            snapshot,
        }
    }

    #[tokio::test]
    async fn test_alert_with_snapshot_sends_image() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_image()
            .withf(|path, caption| path.exists() && caption == "*ALERT*")
            .times(1)
            .returning(|_, _| Ok(()));
        notifier.expect_send_text().never();

        let outcome = deliver(&notifier, &alert(Some(vec![0xFF, 0xD8, 0xFF]))).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_alert_without_snapshot_sends_markdown() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_text()
            .with(eq("*ALERT*"), eq(ParseMode::Markdown))
            .times(1)
            .returning(|_, _| Ok(()));

        assert_eq!(deliver(&notifier, &alert(None)).await, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_failed_alert_falls_back_once() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_image()
            .times(1)
            .returning(|_, _| Err(NotifyError::Api("photo rejected".to_string())));
        notifier
            .expect_send_text()
            .with(eq("ALERT"), eq(ParseMode::Plain))
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = deliver(&notifier, &alert(Some(vec![1, 2, 3]))).await;
        assert_eq!(outcome, DeliveryOutcome::Fallback);
    }

    #[tokio::test]
    async fn test_failed_fallback_gives_up() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_text()
            .times(2)
            .returning(|_, _| Err(NotifyError::Api("down".to_string())));

        assert_eq!(deliver(&notifier, &alert(None)).await, DeliveryOutcome::Failed);
    }

    #[tokio::test]
    async fn test_plain_text_is_not_retried() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_text()
            .times(1)
            .returning(|_, _| Err(NotifyError::Api("down".to_string())));

        let delivery = Delivery::Text {
            text: "hello".to_string(),
            mode: ParseMode::Plain,
        };
        assert_eq!(deliver(&notifier, &delivery).await, DeliveryOutcome::Failed);
    }

    #[tokio::test]
    async fn test_dispatcher_drains_queue_and_stops() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send_text().times(2).returning(|_, _| Ok(()));
        let metrics = Arc::new(ServiceMetrics::new());
        let token = CancellationToken::new();

        let (handle, task) = spawn_dispatcher(Arc::new(notifier), metrics.clone(), token.clone(), JOB_TIMEOUT);
        assert!(handle.enqueue(Delivery::Text {
            text: "one".to_string(),
            mode: ParseMode::Plain,
        }));
        assert!(handle.enqueue(Delivery::Text {
            text: "two".to_string(),
            mode: ParseMode::Markdown,
        }));
        drop(handle);
        task.await.unwrap();

        assert_eq!(metrics.snapshot().alerts_delivered, 2);
    }

    #[tokio::test]
    async fn test_cancel_flushes_queued_deliveries() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send_text().times(2).returning(|_, _| Ok(()));
        let metrics = Arc::new(ServiceMetrics::new());
        let token = CancellationToken::new();
        token.cancel();

        let (handle, task) = spawn_dispatcher(Arc::new(notifier), metrics.clone(), token, JOB_TIMEOUT);
        for text in ["one", "two"] {
            assert!(handle.enqueue(Delivery::Text {
                text: text.to_string(),
                mode: ParseMode::Plain,
            }));
        }
        task.await.unwrap();

        assert_eq!(metrics.snapshot().alerts_delivered, 2);
        assert!(!handle.enqueue(alert(None)));
    }

    #[tokio::test]
    async fn test_flush_stops_at_job_timeout() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send_text().returning(|_, _| Ok(()));
        notifier.expect_send_image().returning(|_, _| {
            std::thread::sleep(Duration::from_millis(80));
            Ok(())
        });
        let metrics = Arc::new(ServiceMetrics::new());
        let token = CancellationToken::new();
        token.cancel();

        let (handle, task) = spawn_dispatcher(Arc::new(notifier), metrics.clone(), token, Duration::from_millis(50));
        assert!(handle.enqueue(alert(Some(vec![0xFF, 0xD8]))));
        assert!(handle.enqueue(alert(None)));
        task.await.unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.alerts_delivered, 1);
        assert_eq!(snapshot.delivery_failures, 0);
    }

    #[test]
    fn test_channel_handle_reports_closed_queue() {
        let (handle, rx) = DispatchHandle::channel(1);
        assert!(handle.is_enabled());
        drop(rx);
        assert!(!handle.enqueue(alert(None)));
    }

    #[test]
    fn test_disabled_handle_drops() {
        let handle = DispatchHandle::disabled();
        assert!(!handle.is_enabled());
        assert!(!handle.enqueue(alert(None)));
    }
}
