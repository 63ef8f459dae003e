//! Pure transforms between store records and the local message log
//!
//! Nothing here performs I/O. Every function can be re-run on the same input
//! and yields the same output, so a log can always be rebuilt from the turns.

use crate::models::{Conversation, Message, Turn};
use std::cmp::Ordering;

/// Greeting shown when a conversation's history cannot be loaded
pub const PLACEHOLDER_GREETING: &str = "How can I help you?";

/// Flatten ordered turns into the message log
///
/// Each turn contributes its user message (if present) followed by its
/// assistant response (if present). Empty or missing halves contribute
/// nothing, so a malformed turn never breaks the transform.
///
/// # Examples
///
/// ```
/// use clover::history::flatten_turns;
/// use clover::models::{Role, Turn};
///
/// let turns = vec![
///     Turn::new(Some("Hi"), Some("Hello!")),
///     Turn::new(Some("Still there?"), None),
/// ];
/// let messages = flatten_turns(&turns);
/// assert_eq!(messages.len(), 3);
/// assert_eq!(messages[0].role, Role::User);
/// assert_eq!(messages[1].role, Role::Assistant);
/// ```
pub fn flatten_turns(turns: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        if let Some(text) = turn.user_text() {
            messages.push(Message::user(text));
        }
        if let Some(text) = turn.assistant_text() {
            messages.push(Message::assistant(text));
        }
    }
    messages
}

/// The log a session falls back to when history could not be fetched
pub fn placeholder_log() -> Vec<Message> {
    vec![Message::assistant(PLACEHOLDER_GREETING)]
}

/// Total order used for the conversation list: most recently updated first,
/// ties broken by identifier
pub fn recency_order(a: &Conversation, b: &Conversation) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort conversations by recency, in place
pub fn sort_by_recency(conversations: &mut [Conversation]) {
    conversations.sort_by(recency_order);
}
