//! Human-readable rendering for list and export output

use crate::models::ConversationLog;
use chrono::{DateTime, Utc};

/// Longest relative age shown, in days
pub const MAX_AGE_DAYS: i64 = 99;

/// Compact relative age of `timestamp` as seen at `now`
///
/// Up to a minute the age falls into 15-second buckets (`0s` up to and
/// including 15 seconds, then `15s`, `30s`, `45s`). Longer ages show whole
/// minutes, hours, or days, capped at `99d`. Future timestamps count as `0s`.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use clover::format::time_ago_at;
///
/// let now = Utc::now();
/// assert_eq!(time_ago_at(now - Duration::seconds(20), now), "15s");
/// assert_eq!(time_ago_at(now - Duration::seconds(90), now), "1m");
/// assert_eq!(time_ago_at(now - Duration::hours(3), now), "3h");
/// ```
pub fn time_ago_at(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - timestamp).num_seconds().max(0);
    match seconds {
        0..=15 => "0s".to_string(),
        16..=30 => "15s".to_string(),
        31..=45 => "30s".to_string(),
        46..=60 => "45s".to_string(),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", (s / 86_400).min(MAX_AGE_DAYS)),
    }
}

/// Left-align `name` and right-align `age` within `width` columns
///
/// At least one space always separates the two, so long names push the
/// age past `width` instead of touching it.
pub fn pad_label(name: &str, age: &str, width: usize) -> String {
    let used = name.chars().count() + age.chars().count();
    let padding = width.saturating_sub(used).max(1);
    format!("{}{}{}", name, " ".repeat(padding), age)
}

/// `YYYY-MM-DD HH:MM:SS` rendering in UTC
pub fn readable_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Render a conversation log as a plain-text transcript
///
/// The transcript starts with the conversation's name, id, timestamps, and
/// agent configuration, lists every turn as a user block followed by an
/// assistant block, and ends with the log as pretty-printed JSON.
pub fn render_transcript(log: &ConversationLog) -> String {
    let conversation = &log.conversation;
    let mut lines: Vec<String> = vec![
        format!(
            "Conversation: {}  (ID: {})",
            conversation.name, conversation.id
        ),
        format!(
            "Created:      {}",
            readable_timestamp(conversation.created_at)
        ),
        format!(
            "Last updated: {}",
            readable_timestamp(conversation.updated_at)
        ),
        String::new(),
        "Agent configuration:".to_string(),
    ];
    for (key, value) in conversation.agent_config.entries() {
        lines.push(format!("  \u{2022} {}: {}", key, value));
    }
    lines.push(String::new());

    lines.push("Transcript:".to_string());
    for turn in &log.turns {
        lines.push("--- User ---".to_string());
        lines.push(turn.user_message.as_deref().unwrap_or("").trim().to_string());
        lines.push(String::new());
        lines.push("--- Assistant ---".to_string());
        lines.push(
            turn.assistant_response
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_string(),
        );
        lines.push(String::new());
        lines.push(String::new());
    }

    lines.push("\u{2013}\u{2013}\u{2013} Full raw log JSON \u{2013}\u{2013}\u{2013}".to_string());
    lines.push(serde_json::to_string_pretty(log).unwrap_or_else(|e| format!("<unavailable: {}>", e)));

    lines.join("\n")
}
