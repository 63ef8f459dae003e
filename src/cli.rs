//! Command-line interface definition for Clover
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for signing in, managing conversations, and chatting.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Clover - conversation sync and streaming chat client
///
/// Sign in once with `clover login`, then list, create, and chat with
/// conversations stored remotely.
#[derive(Parser, Debug, Clone)]
#[command(name = "clover")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the completion backend URL from config
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Clover
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in and remember the session
    Login {
        /// Account email
        #[arg(short, long, env = "CLOVER_EMAIL")]
        email: Option<String>,

        /// Account password (prompted for when omitted)
        #[arg(long, env = "CLOVER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and forget the session
    Logout,

    /// List conversations, most recently updated first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the message log of a conversation
    History {
        /// Conversation id or exact name
        conversation: String,
    },

    /// Create a conversation
    Create {
        /// Display name (random when omitted)
        #[arg(short, long)]
        name: Option<String>,

        /// System prompt for the new conversation
        #[arg(long)]
        system_prompt: Option<String>,

        /// Sampling temperature for the new conversation
        #[arg(long)]
        temperature: Option<f64>,

        /// Number of previous turns the backend replays
        #[arg(long)]
        max_previous_turns: Option<u32>,
    },

    /// Rename a conversation
    Rename {
        /// Conversation id or exact name
        conversation: String,

        /// New display name
        name: String,
    },

    /// Delete a conversation and all of its turns
    Delete {
        /// Conversation id or exact name
        conversation: String,

        /// Skip the interactive confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Chat interactively, streaming replies
    Chat {
        /// Conversation id or exact name (a new conversation when omitted)
        conversation: Option<String>,
    },

    /// Send one message and stream the reply
    Send {
        /// Conversation id or exact name
        conversation: String,

        /// Message text
        message: String,
    },

    /// Export a conversation's transcript
    Export {
        /// Conversation id or exact name
        conversation: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            backend_url: None,
            command: Commands::List { json: false },
        }
    }
}
