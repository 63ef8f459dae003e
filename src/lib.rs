//! Clover - conversation sync and streaming chat client library
//!
//! This library signs a user in against a hosted auth service, keeps their
//! conversations in a remote store, and streams assistant replies from a
//! completion backend into a per-session message log.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `client`: The conversation client that ties the pieces together
//! - `auth`, `store`, `backend`: Remote services behind async traits
//! - `session`: Per-user session state (signed-in user, selection, log)
//! - `cache`: TTL caches for conversation lists and histories
//! - `models`, `history`, `naming`, `format`: Data types and pure helpers
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`, `commands`, `credentials`: Command-line front end
//!
//! # Example
//!
//! ```no_run
//! use clover::{Config, ConversationClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let client = ConversationClient::from_config(&config)?;
//!     let mut ctx = client.sign_in("sam@example.com", "secret").await?;
//!     client.create_conversation(&mut ctx, None, None).await?;
//!     let outcome = client
//!         .send_message(&mut ctx, "Hello!", &mut |text: &str| println!("{}", text), None)
//!         .await?;
//!     println!("completed: {}", outcome.is_completed());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod backend;
pub mod cache;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod format;
pub mod history;
pub(crate) mod http;
pub mod models;
pub mod naming;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use auth::{AuthClient, AuthSession, Authenticator};
pub use backend::{CompletionBackend, HttpCompletionBackend};
pub use client::{ClientOptions, ConversationClient, SendOutcome, StreamObserver};
pub use config::Config;
pub use error::{CloverError, Result};
pub use models::{AgentConfig, Conversation, ConversationLog, Message, MessageStatus, Role, Turn};
pub use session::SessionContext;
pub use store::{ConversationStore, HttpConversationStore};

#[cfg(test)]
pub mod test_utils;
