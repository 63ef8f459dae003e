//! Conversation store interface and its HTTP implementation
//!
//! The store owns conversations and turns. Reads and the create/delete
//! writes go through the hosted edge functions; rename goes through the
//! REST interface of the same project.

use crate::config::SupabaseConfig;
use crate::error::{CloverError, Result};
use crate::http;
use crate::models::{parse_remote, AgentConfig, Conversation, ConversationLog, Turn};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

/// Remote store of conversations and turns
///
/// Every call carries the signed-in user's bearer token; the store scopes
/// results to that user.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All conversations visible to the user, in no particular order
    async fn list_conversations(&self, token: &str) -> Result<Vec<Conversation>>;

    /// Turns of a conversation, in creation order
    async fn list_turns(&self, token: &str, conversation_id: &str) -> Result<Vec<Turn>>;

    /// Create a conversation and return the stored record
    async fn create_conversation(
        &self,
        token: &str,
        name: &str,
        agent_config: &AgentConfig,
    ) -> Result<Conversation>;

    /// Change a conversation's display name and return the updated record
    async fn rename_conversation(
        &self,
        token: &str,
        conversation_id: &str,
        name: &str,
    ) -> Result<Conversation>;

    /// Delete a conversation and all of its turns
    async fn delete_conversation(&self, token: &str, conversation_id: &str) -> Result<()>;

    /// Full transcript of a conversation
    async fn fetch_log(&self, token: &str, conversation_id: &str) -> Result<ConversationLog>;
}

#[derive(Debug, Serialize)]
struct CreateConversationRequest<'a> {
    name: &'a str,
    agent_config: &'a AgentConfig,
}

#[derive(Debug, Serialize)]
struct RenameConversationRequest<'a> {
    name: &'a str,
}

/// [`ConversationStore`] backed by the hosted edge functions and REST API
///
/// # Examples
///
/// ```
/// use clover::config::SupabaseConfig;
/// use clover::store::HttpConversationStore;
///
/// let store = HttpConversationStore::new(&SupabaseConfig::default());
/// assert!(store.is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct HttpConversationStore {
    client: Client,
    functions_url: String,
    rest_url: String,
    anon_key: String,
}

impl HttpConversationStore {
    /// Create a store client from the service configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_client(config.timeout())?,
            functions_url: config.functions_url(),
            rest_url: config.rest_url(),
            anon_key: config.anon_key.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        let request = request.bearer_auth(token);
        if self.anon_key.is_empty() {
            request
        } else {
            request.header("apikey", &self.anon_key)
        }
    }

    async fn send(&self, request: RequestBuilder, token: &str, subject: &str) -> Result<String> {
        let response = self
            .authorized(request, token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Store request for {} failed: {}", subject, e);
                CloverError::from_transport(e)
            })?;
        let response = http::check_status(response, subject).await?;
        http::read_text(response).await
    }
}

#[async_trait]
impl ConversationStore for HttpConversationStore {
    async fn list_conversations(&self, token: &str) -> Result<Vec<Conversation>> {
        let request = self
            .client
            .get(format!("{}/conversations", self.functions_url));
        let body = self.send(request, token, "conversation list").await?;
        let conversations: Vec<Conversation> = parse_remote(&body, "conversation list")?;
        tracing::debug!("Store returned {} conversations", conversations.len());
        Ok(conversations)
    }

    async fn list_turns(&self, token: &str, conversation_id: &str) -> Result<Vec<Turn>> {
        let request = self
            .client
            .get(format!("{}/turns", self.functions_url))
            .query(&[("conversation_id", conversation_id)]);
        let body = self.send(request, token, conversation_id).await?;
        let turns: Vec<Turn> = parse_remote(&body, "turn list")?;
        tracing::debug!(
            "Store returned {} turns for {}",
            turns.len(),
            conversation_id
        );
        Ok(turns)
    }

    async fn create_conversation(
        &self,
        token: &str,
        name: &str,
        agent_config: &AgentConfig,
    ) -> Result<Conversation> {
        let request = self
            .client
            .post(format!("{}/conversations", self.functions_url))
            .json(&CreateConversationRequest { name, agent_config });
        let body = self.send(request, token, "create conversation").await?;
        single_record(&body, "created conversation")?
            .ok_or_else(|| {
                CloverError::RemoteValidation("store returned no created conversation".to_string())
            })
    }

    async fn rename_conversation(
        &self,
        token: &str,
        conversation_id: &str,
        name: &str,
    ) -> Result<Conversation> {
        let request = self
            .client
            .patch(format!("{}/conversations", self.rest_url))
            .query(&[("id", format!("eq.{}", conversation_id))])
            .header("Prefer", "return=representation")
            .json(&RenameConversationRequest { name });
        let body = self.send(request, token, conversation_id).await?;
        // The REST interface answers an update matching no row with an empty array
        single_record(&body, "renamed conversation")?
            .ok_or_else(|| CloverError::NotFound(conversation_id.to_string()))
    }

    async fn delete_conversation(&self, token: &str, conversation_id: &str) -> Result<()> {
        let request = self
            .client
            .delete(format!("{}/conversations/{}", self.functions_url, conversation_id));
        self.send(request, token, conversation_id).await?;
        tracing::info!("Deleted conversation {}", conversation_id);
        Ok(())
    }

    async fn fetch_log(&self, token: &str, conversation_id: &str) -> Result<ConversationLog> {
        let request = self
            .client
            .get(format!("{}/log", self.functions_url))
            .query(&[("conversation_id", conversation_id)]);
        let body = self.send(request, token, conversation_id).await?;
        parse_log(&body)
    }
}

/// Parse a record that may arrive bare or wrapped in a one-element array
fn single_record(body: &str, what: &str) -> Result<Option<Conversation>> {
    let value: Value = parse_remote(body, what)?;
    let record = match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(first) => first,
            None => return Ok(None),
        },
        other => other,
    };
    serde_json::from_value(record)
        .map(Some)
        .map_err(|e| CloverError::RemoteValidation(format!("unexpected {} payload: {}", what, e)))
}

/// Parse the log endpoint's body, which may be JSON encoded twice
///
/// # Errors
///
/// Returns [`CloverError::RemoteValidation`] if neither layer parses into a
/// conversation log
pub fn parse_log(body: &str) -> Result<ConversationLog> {
    let value: Value = parse_remote(body, "conversation log")?;
    let value = match value {
        Value::String(inner) => parse_remote(&inner, "conversation log")?,
        other => other,
    };
    serde_json::from_value(value).map_err(|e| {
        CloverError::RemoteValidation(format!("unexpected conversation log payload: {}", e))
    })
}
