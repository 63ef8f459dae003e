//! Typed records exchanged with the conversation store
//!
//! Remote JSON is parsed into these types at the boundary. A shape mismatch
//! becomes [`CloverError::RemoteValidation`] there instead of surfacing as a
//! missing-key failure deep inside the client.

use crate::error::{CloverError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the person chatting
    User,
    /// Produced by the completion backend (or synthesized by the client)
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Completion state of a message in the local log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Fully delivered
    #[default]
    Complete,
    /// Partial assistant output kept after an interrupted or cancelled stream
    Incomplete,
    /// Synthetic assistant message describing a failed send
    Error,
}

/// A role-tagged piece of text, as rendered by the chat surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who wrote the message
    pub role: Role,
    /// Text content
    pub content: String,
    /// Whether the message is complete
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use clover::models::{Message, Role};
    ///
    /// let msg = Message::user("Hello!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            status: MessageStatus::Complete,
        }
    }

    /// Creates a new, complete assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            status: MessageStatus::Complete,
        }
    }

    /// Creates an assistant message holding partial output
    pub fn incomplete(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            status: MessageStatus::Incomplete,
        }
    }

    /// Creates a synthetic assistant message describing a failure
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            status: MessageStatus::Error,
        }
    }
}

/// Parameters controlling how the completion backend answers
///
/// Fixed once a conversation is created. Keys the client does not know about
/// are kept in `extra` so they survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Template used to inject retrieved documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_prompt: Option<String>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Number of retrieval chunks to include
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_documents: Option<u32>,
    /// Retrieval chunk size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
    /// Number of previous turns the backend replays as context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_previous_turns: Option<u32>,
    /// Maximum tokens for the whole request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Maximum tokens the model may generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    /// Parameters not modelled above
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AgentConfig {
    /// Flatten the configuration into ordered `(key, value)` pairs for display
    ///
    /// # Examples
    ///
    /// ```
    /// use clover::models::AgentConfig;
    ///
    /// let config = AgentConfig {
    ///     temperature: Some(0.5),
    ///     ..Default::default()
    /// };
    /// let entries = config.entries();
    /// assert_eq!(entries, vec![("temperature".to_string(), "0.5".to_string())]);
    /// ```
    pub fn entries(&self) -> Vec<(String, String)> {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| {
                    let rendered = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, rendered)
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A named, persisted chat session
///
/// The store owns the record; the client only ever holds a transient copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the last turn was added
    pub updated_at: DateTime<Utc>,
    /// Agent configuration captured at creation time
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent_config: AgentConfig,
}

/// One user-message/assistant-response pair, possibly partial
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Store identifier of the turn (numeric keys are kept as text)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "opt_string_or_number"
    )]
    pub id: Option<String>,
    /// Owning conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// What the user sent
    #[serde(default)]
    pub user_message: Option<String>,
    /// What the assistant answered
    #[serde(default)]
    pub assistant_response: Option<String>,
}

impl Turn {
    /// Builds a turn from its two halves, for tests and fixtures
    pub fn new(user_message: Option<&str>, assistant_response: Option<&str>) -> Self {
        Self {
            user_message: user_message.map(str::to_string),
            assistant_response: assistant_response.map(str::to_string),
            ..Default::default()
        }
    }

    /// The user half, if present and non-empty
    pub fn user_text(&self) -> Option<&str> {
        self.user_message.as_deref().filter(|s| !s.is_empty())
    }

    /// The assistant half, if present and non-empty
    pub fn assistant_text(&self) -> Option<&str> {
        self.assistant_response.as_deref().filter(|s| !s.is_empty())
    }
}

/// Full transcript of a conversation as returned by the log endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationLog {
    /// Conversation metadata
    pub conversation: Conversation,
    /// Every turn, in creation order
    #[serde(default)]
    pub turns: Vec<Turn>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Parse a remote JSON body into a typed record
///
/// # Errors
///
/// Returns [`CloverError::RemoteValidation`] naming `what` when the body does
/// not match the expected shape.
pub fn parse_remote<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!("Unexpected {} payload: {}", what, e);
        CloverError::RemoteValidation(format!("unexpected {} payload: {}", what, e))
    })
}
