//! Alert/session coordinator.
//!
//! Owns the rolling emotion history, the per-key alert cooldowns and the
//! monitoring flag. Every operation is infallible and synchronous; callers
//! share one instance behind [`SharedCoordinator`] so that the capture loop
//! and the command handlers never mutate the same containers concurrently.

use crate::config::MonitorConfig;
use crate::cooldown::{AlertCooldownState, CooldownKey};
use crate::history::{detect_pattern, EmotionHistory};
use crate::report::{
    distribution_from, headline_advice, AlertKind, CoordinatorStats, DailySummary,
    EmotionReading, StatusSnapshot, STATUS_WINDOW,
};
use crate::types::{EmotionLabel, EmotionSample};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub type SharedCoordinator = Arc<Mutex<AlertCoordinator>>;

/// Outbound alert gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitoringState {
    Enabled,
    Paused,
}

impl MonitoringState {
    pub fn is_enabled(self) -> bool {
        self == MonitoringState::Enabled
    }
}

impl From<bool> for MonitoringState {
    fn from(enabled: bool) -> Self {
        if enabled {
            MonitoringState::Enabled
        } else {
            MonitoringState::Paused
        }
    }
}

/// Result of [`AlertCoordinator::observe`]
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    None,
    Alert {
        kind: AlertKind,
        label: EmotionLabel,
        confidence: f32,
    },
}

impl AlertDecision {
    pub fn is_alert(&self) -> bool {
        matches!(self, AlertDecision::Alert { .. })
    }

    pub fn kind(&self) -> Option<AlertKind> {
        match self {
            AlertDecision::Alert { kind, .. } => Some(*kind),
            AlertDecision::None => None,
        }
    }
}

/// True when no digest has been sent yet or `interval` has elapsed since the last one
pub fn periodic_digest_due(last_sent: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last_sent {
        Some(last) => now.saturating_duration_since(last) >= interval,
        None => true,
    }
}

pub struct AlertCoordinator {
    threshold: f32,
    pattern_length: usize,
    bucket_by_confidence: bool,
    digest_interval: Duration,
    history: EmotionHistory,
    // Confident samples only; emptied whenever a pattern alert fires
    pattern_window: EmotionHistory,
    cooldowns: AlertCooldownState,
    monitoring: MonitoringState,
    last_digest: Option<Instant>,
    stats: CoordinatorStats,
}

impl AlertCoordinator {
    /// Create a new coordinator from the monitor settings
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            threshold: config.emotion_threshold,
            pattern_length: config.pattern_length,
            bucket_by_confidence: config.bucket_by_confidence,
            digest_interval: config.digest_interval(),
            history: EmotionHistory::new(config.history_capacity),
            pattern_window: EmotionHistory::new(config.pattern_length),
            cooldowns: AlertCooldownState::new(config.alert_cooldown()),
            monitoring: MonitoringState::Enabled,
            last_digest: None,
            stats: CoordinatorStats::default(),
        }
    }

    pub fn shared(config: &MonitorConfig) -> SharedCoordinator {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// Append a sample to the history, evicting the oldest when full
    pub fn record(&mut self, sample: EmotionSample) {
        if sample.confidence >= self.threshold {
            self.pattern_window.push(sample.clone());
        }
        self.history.push(sample);
        self.stats.samples_recorded += 1;
    }

    pub fn should_alert(&mut self, label: &EmotionLabel, confidence: f32) -> bool {
        self.should_alert_at(label, confidence, Instant::now())
    }

    /// Alert gate. Marks the cooldown for the key when it returns true.
    pub fn should_alert_at(&mut self, label: &EmotionLabel, confidence: f32, now: Instant) -> bool {
        if !self.monitoring.is_enabled() {
            return false;
        }
        if confidence.is_nan() || confidence < self.threshold || !label.is_negative() {
            return false;
        }
        let key = CooldownKey::new(label, confidence, self.bucket_by_confidence);
        self.cooldowns.try_fire(key, now)
    }

    /// True iff the newest `pattern_length` history entries are all negative
    pub fn detect_pattern(&self) -> bool {
        detect_pattern(&self.history, self.pattern_length)
    }

    /// Record a sample and decide whether it should produce an alert.
    ///
    /// A run of `pattern_length` confident negative samples escalates to a
    /// pattern alert; that alert marks the cooldown of the latest label and
    /// empties the pattern window, so the next pattern needs a fresh run.
    /// Otherwise a single sample alerts through [`Self::should_alert_at`].
    pub fn observe(&mut self, sample: EmotionSample) -> AlertDecision {
        let now = sample.timestamp;
        let label = sample.label.clone();
        let confidence = sample.confidence;
        self.record(sample);

        if !self.monitoring.is_enabled() {
            return AlertDecision::None;
        }

        if detect_pattern(&self.pattern_window, self.pattern_length) {
            self.pattern_window.clear();
            self.cooldowns.mark(
                CooldownKey::new(&label, confidence, self.bucket_by_confidence),
                now,
            );
            self.stats.alerts_emitted += 1;
            self.stats.pattern_alerts += 1;
            info!("Pattern alert: {} consecutive negative samples ending in {}", self.pattern_length, label);
            return AlertDecision::Alert {
                kind: AlertKind::Pattern,
                label,
                confidence,
            };
        }

        if self.should_alert_at(&label, confidence, now) {
            self.stats.alerts_emitted += 1;
            info!("Alert: {} ({:.2})", label, confidence);
            return AlertDecision::Alert {
                kind: AlertKind::Immediate,
                label,
                confidence,
            };
        }

        debug!("No alert for {} ({:.2})", label, confidence);
        AlertDecision::None
    }

    pub fn set_monitoring(&mut self, enabled: bool) {
        let state = MonitoringState::from(enabled);
        if state != self.monitoring {
            info!("Monitoring {}", if enabled { "enabled" } else { "paused" });
        }
        self.monitoring = state;
    }

    pub fn monitoring(&self) -> MonitoringState {
        self.monitoring
    }

    /// Empty history, pattern window and cooldowns
    pub fn clear(&mut self) {
        self.history.clear();
        self.pattern_window.clear();
        self.cooldowns.clear();
        info!("Emotion history and alert cooldowns cleared");
    }

    pub fn history(&self) -> &EmotionHistory {
        &self.history
    }

    pub fn cooldowns(&self) -> &AlertCooldownState {
        &self.cooldowns
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    /// Digest is due, monitoring is on and there is something to report
    pub fn digest_due(&self, now: Instant) -> bool {
        self.monitoring.is_enabled()
            && !self.history.is_empty()
            && periodic_digest_due(self.last_digest, now, self.digest_interval)
    }

    pub fn mark_digest_sent(&mut self, now: Instant) {
        self.last_digest = Some(now);
        self.stats.digests_sent += 1;
    }

    pub fn status(&self) -> StatusSnapshot {
        let recent: Vec<EmotionReading> = self.history.recent(STATUS_WINDOW).map(reading).collect();
        let recent_distribution = distribution_from(recent.iter().map(|r| &r.label));
        StatusSnapshot {
            monitoring: self.monitoring.is_enabled(),
            last: self.history.last().map(reading),
            recent,
            recent_distribution,
            history_len: self.history.len(),
            history_capacity: self.history.capacity(),
            stats: self.stats,
        }
    }

    pub fn summary(&self) -> DailySummary {
        let total = self.history.len();
        let distribution = distribution_from(self.history.iter().map(|s| &s.label));
        let dominant = distribution.first().map(|d| d.label.clone());
        let (conf_sum, negatives) = self
            .history
            .iter()
            .fold((0.0f32, 0usize), |(sum, neg), s| {
                (sum + s.confidence, neg + s.label.is_negative() as usize)
            });
        let (average_confidence, negative_share) = if total == 0 {
            (0.0, 0.0)
        } else {
            (conf_sum / total as f32, negatives as f32 / total as f32)
        };
        DailySummary {
            total,
            recommendation: dominant.as_ref().map(|l| headline_advice(l).to_string()),
            dominant,
            distribution,
            average_confidence,
            negative_share,
        }
    }
}

fn reading(sample: &EmotionSample) -> EmotionReading {
    EmotionReading {
        label: sample.label.clone(),
        confidence: sample.confidence,
        recorded_at: sample.recorded_at,
    }
}
