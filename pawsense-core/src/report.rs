// Status / summary snapshots and the user-facing copy built from them

use crate::types::EmotionLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Samples shown in the "recent activity" part of a status report
pub const STATUS_WINDOW: usize = 5;

/// One history entry as shown to users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub label: EmotionLabel,
    pub confidence: f32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionCount {
    pub label: EmotionLabel,
    pub count: usize,
    pub percentage: f32,
}

/// Build a distribution sorted by count (descending), ties by label name
pub fn distribution_from<'a, I>(labels: I) -> Vec<EmotionCount>
where
    I: IntoIterator<Item = &'a EmotionLabel>,
{
    let mut counts: Vec<(EmotionLabel, usize)> = Vec::new();
    let mut total = 0usize;
    for label in labels {
        total += 1;
        match counts.iter_mut().find(|(l, _)| l == label) {
            Some((_, c)) => *c += 1,
            None => counts.push((label.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    counts
        .into_iter()
        .map(|(label, count)| EmotionCount {
            label,
            count,
            percentage: if total == 0 {
                0.0
            } else {
                count as f32 * 100.0 / total as f32
            },
        })
        .collect()
}

/// Counters maintained by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub samples_recorded: u64,
    pub alerts_emitted: u64,
    pub pattern_alerts: u64,
    pub digests_sent: u64,
}

/// Current state for the `/status` command and the dashboard header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub monitoring: bool,
    pub last: Option<EmotionReading>,
    pub recent: Vec<EmotionReading>,
    pub recent_distribution: Vec<EmotionCount>,
    pub history_len: usize,
    pub history_capacity: usize,
    pub stats: CoordinatorStats,
}

/// Aggregate over the whole in-memory history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub total: usize,
    pub dominant: Option<EmotionLabel>,
    pub distribution: Vec<EmotionCount>,
    pub average_confidence: f32,
    pub negative_share: f32,
    pub recommendation: Option<String>,
}

/// Per-emotion advice, headline first
pub fn recommendations(label: &EmotionLabel) -> &'static [&'static str] {
    match label {
        EmotionLabel::Angry => &[
            "🚨 Your dog seems upset. Some suggestions:",
            "• Check for loud noises that could be stressing them",
            "• Make sure fresh water and food are available",
            "• Give them a quiet space to calm down",
            "• Avoid forcing interaction until they settle",
            "• If it persists, talk to a veterinarian",
        ],
        EmotionLabel::Sad => &[
            "😢 Your dog looks sad. We suggest:",
            "• Spend some quality time with them",
            "• Take them for a walk if you can",
            "• Check for signs of illness or pain",
            "• Make sure they are not left alone for too long",
            "• Interactive toys can help keep them stimulated",
            "• If the sadness persists, consult a veterinarian",
        ],
        EmotionLabel::Happy => &[
            "😊 Your dog is happy! That's great:",
            "• Keep up the activities that make them happy",
            "• It's a good moment for positive training",
            "• You can introduce new games or toys",
        ],
        EmotionLabel::Relaxed => &[
            "😌 Your dog is relaxed:",
            "• This is the ideal state, keep it up",
            "• Keep the environment calm",
            "• A good moment for rest",
        ],
        EmotionLabel::Unknown(_) => &["Keep an eye on how your pet is doing."],
    }
}

/// One-line advice used in summaries
pub fn headline_advice(label: &EmotionLabel) -> &'static str {
    match label {
        EmotionLabel::Happy => "Your dog looks very happy! Keep doing what makes them feel good.",
        EmotionLabel::Relaxed => "Your dog is in an ideal relaxed state. Keep the environment calm.",
        EmotionLabel::Sad => "Your dog showed signs of sadness. Consider giving them more attention and checking on their wellbeing.",
        EmotionLabel::Angry => "Stress or irritation was detected. Look into what might be causing it.",
        EmotionLabel::Unknown(_) => "Keep monitoring your pet's wellbeing.",
    }
}

pub const GENERAL_TIPS: &str = "💡 *GENERAL TIPS FOR YOUR DOG*\n\n\
🏃 *Regular exercise*\n\
• Daily walks suited to age and breed\n\
• Interactive games at home\n\n\
🥗 *Feeding*\n\
• Regular meal times\n\
• Fresh water always available\n\n\
❤️ *Emotional wellbeing*\n\
• Consistent routines\n\
• Quality time together\n\
• A calm place to rest\n\n\
🏥 *Health*\n\
• Regular vet visits\n\
• Watch for changes in behaviour\n\n\
📱 PawSense helps you follow your dog's mood and spot patterns that may need attention.";

pub const HELP_TEXT: &str = "🐕 *PawSense commands*\n\n\
/status - current state and recent emotions\n\
/summary - summary of today's analyses\n\
/tips - general care tips\n\
/monitor\\_on - resume alerts\n\
/monitor\\_off - pause alerts\n\
/realtime\\_start - start camera monitoring\n\
/realtime\\_stop - stop camera monitoring\n\
/clear - clear emotion history\n\
/connect CODE - authorize this chat\n\
/disconnect - revoke this chat\n\
/help - this message";

/// Which rule produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// A single confident negative sample
    Immediate,
    /// Several consecutive negative samples
    Pattern,
}

/// Markdown alert body
pub fn alert_message(label: &EmotionLabel, confidence: f32, kind: AlertKind, at: DateTime<Utc>) -> String {
    let mut message = String::from("🐕 *BEHAVIOUR ALERT*\n\n");
    message.push_str(&format!(
        "Detected emotion: *{}* ({:.2})\n",
        label.as_str().to_uppercase(),
        confidence
    ));
    if kind == AlertKind::Pattern {
        message.push_str("Detected repeatedly in the latest analyses.\n");
    }
    message.push('\n');
    message.push_str(&recommendations(label).join("\n"));
    message.push_str(&format!("\n\n📊 Confidence: {:.1}%", confidence * 100.0));
    message.push_str(&format!("\n⏰ Time: {}", at.format("%H:%M:%S")));
    message
}

/// Plain text sent once when the formatted alert could not be delivered
pub fn fallback_alert(label: &EmotionLabel, confidence: f32) -> String {
    format!(
        "ALERT: your dog is {} ({:.0}%)",
        label.as_str().to_uppercase(),
        confidence * 100.0
    )
}

pub fn render_status(status: &StatusSnapshot) -> String {
    let mut text = String::from("📊 *CURRENT STATUS*\n\n");
    text.push_str(if status.monitoring {
        "🟢 Monitoring: *ACTIVE*\n"
    } else {
        "🔴 Monitoring: *PAUSED*\n"
    });
    match &status.last {
        Some(last) => text.push_str(&format!(
            "{} Last emotion: *{}* ({:.0}%)\n",
            last.label.emoji(),
            last.label.as_str().to_uppercase(),
            last.confidence * 100.0
        )),
        None => text.push_str("🐕 No emotions recorded yet\n"),
    }
    text.push_str(&format!("📈 Analyses in memory: {}\n", status.history_len));
    text.push_str(&format!("🚨 Alerts sent: {}\n", status.stats.alerts_emitted));

    if !status.recent_distribution.is_empty() {
        text.push_str(&format!("\n*Last {} analyses:*\n", status.recent.len()));
        for entry in &status.recent_distribution {
            text.push_str(&format!(
                "{} {}: {}\n",
                entry.label.emoji(),
                capitalize(entry.label.as_str()),
                entry.count
            ));
        }
    }
    text
}

pub fn render_summary(summary: &DailySummary) -> String {
    let Some(dominant) = &summary.dominant else {
        return "📈 *DAILY SUMMARY*\n\n\
📊 Not enough data yet.\n\
Data collection starts as soon as your dog is detected."
            .to_string();
    };

    let mut text = String::from("📈 *DAILY SUMMARY*\n\n");
    text.push_str(&format!("📊 Total analyses: *{}*\n", summary.total));
    text.push_str(&format!(
        "🎯 Dominant emotion: *{}*\n",
        dominant.as_str().to_uppercase()
    ));
    text.push_str(&format!(
        "🎚 Average confidence: {:.1}%\n\n*Distribution:*\n",
        summary.average_confidence * 100.0
    ));
    for entry in &summary.distribution {
        text.push_str(&format!(
            "{} {}: {} ({:.1}%)\n",
            entry.label.emoji(),
            capitalize(entry.label.as_str()),
            entry.count,
            entry.percentage
        ));
    }
    if let Some(rec) = &summary.recommendation {
        text.push_str("\n*Recommendation of the day:*\n");
        text.push_str(rec);
    }
    text
}

/// Periodic digest pushed to the chat
pub fn render_digest(summary: &DailySummary) -> String {
    let mut text = String::from("⏰ *PERIODIC REPORT*\n\n");
    text.push_str(&render_summary(summary));
    text
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
