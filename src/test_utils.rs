//! Test utilities for Clover
//!
//! In-memory stand-ins for the store, backend, and auth seams, plus small
//! fixture and assertion helpers.

use crate::auth::{AuthSession, AuthUser, Authenticator};
use crate::backend::{CompletionBackend, FragmentStream};
use crate::config::Config;
use crate::error::{CloverError, Result};
use crate::models::{AgentConfig, Conversation, ConversationLog, Turn};
use crate::store::ConversationStore;
use async_trait::async_trait;
use futures::StreamExt;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use tokio::sync::oneshot;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a test configuration with default values
pub fn test_config() -> Config {
    serde_yaml::from_str(&test_config_yaml()).expect("test config must parse")
}

/// A configuration file pointing at local services
pub fn test_config_yaml() -> String {
    r#"
supabase:
  url: http://127.0.0.1:54321
  anon_key: test-anon-key
backend:
  base_url: http://127.0.0.1:8000/api
  streaming: true
cache:
  list_ttl_seconds: 30
  history_ttl_seconds: 30
"#
    .to_string()
}

/// A conversation updated `minute` minutes past noon on 2025-01-01
pub fn conversation(id: &str, minute: u32) -> Conversation {
    let ts = Utc
        .with_ymd_and_hms(2025, 1, 1, 12, minute, 0)
        .single()
        .expect("valid fixture timestamp");
    Conversation {
        id: id.to_string(),
        name: format!("Convo-{}", id),
        created_at: ts,
        updated_at: ts,
        agent_config: AgentConfig::default(),
    }
}

/// In-memory [`ConversationStore`]
#[derive(Default)]
pub struct FakeStore {
    conversations: Mutex<Vec<Conversation>>,
    turns: Mutex<HashMap<String, Vec<Turn>>>,
    failure: Mutex<Option<CloverError>>,
    next_id: AtomicUsize,
    /// Number of list calls that reached the store
    pub list_calls: AtomicUsize,
    /// Number of turn-list calls that reached the store
    pub turn_calls: AtomicUsize,
}

impl FakeStore {
    /// Insert or replace a conversation
    pub fn add(&self, conversation: Conversation) {
        let mut list = self.conversations.lock().unwrap();
        list.retain(|c| c.id != conversation.id);
        list.push(conversation);
    }

    /// Remove a conversation behind the client's back
    pub fn remove(&self, id: &str) {
        self.conversations.lock().unwrap().retain(|c| c.id != id);
        self.turns.lock().unwrap().remove(id);
    }

    /// Current stored copy of a conversation
    pub fn get(&self, id: &str) -> Option<Conversation> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Replace the turns of a conversation
    pub fn set_turns(&self, id: &str, turns: Vec<Turn>) {
        self.turns.lock().unwrap().insert(id.to_string(), turns);
    }

    /// Make the next call fail with `error`
    pub fn fail_next(&self, error: CloverError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    fn take_failure(&self) -> Result<()> {
        match self.failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn exists(&self, id: &str) -> Result<()> {
        if self.get(id).is_some() {
            Ok(())
        } else {
            Err(CloverError::NotFound(id.to_string()))
        }
    }
}

#[async_trait]
impl ConversationStore for FakeStore {
    async fn list_conversations(&self, _token: &str) -> Result<Vec<Conversation>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn list_turns(&self, _token: &str, conversation_id: &str) -> Result<Vec<Turn>> {
        self.turn_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        self.exists(conversation_id)?;
        Ok(self
            .turns
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_conversation(
        &self,
        _token: &str,
        name: &str,
        agent_config: &AgentConfig,
    ) -> Result<Conversation> {
        self.take_failure()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let created = Conversation {
            id: format!("new-{}", n),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            agent_config: agent_config.clone(),
        };
        self.add(created.clone());
        Ok(created)
    }

    async fn rename_conversation(
        &self,
        _token: &str,
        conversation_id: &str,
        name: &str,
    ) -> Result<Conversation> {
        self.take_failure()?;
        let mut list = self.conversations.lock().unwrap();
        let found = list
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| CloverError::NotFound(conversation_id.to_string()))?;
        found.name = name.to_string();
        Ok(found.clone())
    }

    async fn delete_conversation(&self, _token: &str, conversation_id: &str) -> Result<()> {
        self.take_failure()?;
        self.exists(conversation_id)?;
        self.remove(conversation_id);
        Ok(())
    }

    async fn fetch_log(&self, _token: &str, conversation_id: &str) -> Result<ConversationLog> {
        self.take_failure()?;
        let conversation = self
            .get(conversation_id)
            .ok_or_else(|| CloverError::NotFound(conversation_id.to_string()))?;
        let turns = self
            .turns
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        Ok(ConversationLog {
            conversation,
            turns,
        })
    }
}

enum Script {
    Reply(Vec<String>),
    Interrupt(Vec<String>),
    Stall(Vec<String>),
    Fail(Mutex<Option<CloverError>>),
}

/// Scripted [`CompletionBackend`]
pub struct FakeBackend {
    script: Script,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    calls: AtomicUsize,
    last_agent_config: Mutex<Option<AgentConfig>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::replying(&["ok"])
    }
}

impl FakeBackend {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            gate: Mutex::new(None),
            calls: AtomicUsize::new(0),
            last_agent_config: Mutex::new(None),
        }
    }

    /// Reply with `fragments`, in order
    pub fn replying(fragments: &[&str]) -> Self {
        Self::with_script(Script::Reply(
            fragments.iter().map(|f| f.to_string()).collect(),
        ))
    }

    /// Produce `fragments`, then break the stream
    pub fn interrupted(fragments: &[&str]) -> Self {
        Self::with_script(Script::Interrupt(
            fragments.iter().map(|f| f.to_string()).collect(),
        ))
    }

    /// Produce `fragments`, then never finish
    pub fn stalling(fragments: &[&str]) -> Self {
        Self::with_script(Script::Stall(
            fragments.iter().map(|f| f.to_string()).collect(),
        ))
    }

    /// Refuse the request with `error`
    pub fn failing(error: CloverError) -> Self {
        Self::with_script(Script::Fail(Mutex::new(Some(error))))
    }

    /// Reply with `fragments`, but hold the first call until the returned
    /// sender fires
    pub fn gated(fragments: &[&str]) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let backend = Self::replying(fragments);
        *backend.gate.lock().unwrap() = Some(rx);
        (backend, tx)
    }

    /// Number of turns sent so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Agent configuration passed with the latest turn
    pub fn last_agent_config(&self) -> Option<AgentConfig> {
        self.last_agent_config.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn send_turn(
        &self,
        _token: &str,
        _conversation_id: &str,
        _user_message: &str,
        agent_config: &AgentConfig,
    ) -> Result<FragmentStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_agent_config.lock().unwrap() = Some(agent_config.clone());

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if let Script::Stall(fragments) = &self.script {
            let head = futures::stream::iter(fragments.clone().into_iter().map(Ok::<_, CloverError>));
            return Ok(Box::pin(
                head.chain(futures::stream::pending::<Result<String>>()),
            ));
        }

        let items: Vec<Result<String>> = match &self.script {
            Script::Reply(fragments) => fragments.iter().cloned().map(Ok).collect(),
            Script::Interrupt(fragments) => fragments
                .iter()
                .cloned()
                .map(Ok)
                .chain(std::iter::once(Err(CloverError::StreamInterrupted(
                    "connection reset".to_string(),
                ))))
                .collect(),
            Script::Stall(_) => Vec::new(),
            Script::Fail(error) => {
                let error = error
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| CloverError::Network("failed".to_string()));
                return Err(error);
            }
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// [`Authenticator`] accepting any password except `nope`
#[derive(Default)]
pub struct FakeAuth {
    /// Number of sign-outs seen
    pub sign_outs: AtomicUsize,
}

#[async_trait]
impl Authenticator for FakeAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        if password == "nope" {
            return Err(CloverError::Authentication(
                "Invalid login credentials".to_string(),
            ));
        }
        Ok(AuthSession {
            access_token: format!("jwt-for-{}", email),
            refresh_token: None,
            expires_at: None,
            user: AuthUser {
                id: format!("id-{}", email),
                email: Some(email.to_string()),
            },
        })
    }

    async fn sign_out(&self, _session: &AuthSession) -> Result<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_config_is_valid() {
        let config = test_config();
        assert_eq!(config.supabase.anon_key, "test-anon-key");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_fake_store_not_found() {
        let store = FakeStore::default();
        let err = store.delete_conversation("t", "missing").await.unwrap_err();
        assert!(matches!(err, CloverError::NotFound(_)));
    }
}
