//! Configuration management for Clover
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{CloverError, Result};
use crate::models::AgentConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for Clover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hosted backend-as-a-service settings (auth, conversation store)
    #[serde(default)]
    pub supabase: SupabaseConfig,
    /// Completion backend settings
    #[serde(default)]
    pub backend: BackendConfig,
    /// Client-side caching
    #[serde(default)]
    pub cache: CacheConfig,
    /// Agent configuration applied to newly created conversations
    #[serde(default = "default_agent_config")]
    pub agent: AgentConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Settings for the hosted auth service and conversation store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project base URL
    #[serde(default = "default_supabase_url")]
    pub url: String,

    /// Public anon key, sent as the `apikey` header
    #[serde(default)]
    pub anon_key: String,

    /// Per-request timeout for store and auth calls (seconds)
    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,
}

fn default_supabase_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_store_timeout() -> u64 {
    5
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: default_supabase_url(),
            anon_key: String::new(),
            timeout_seconds: default_store_timeout(),
        }
    }
}

impl SupabaseConfig {
    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Base URL of the edge functions (`/functions/v1`)
    ///
    /// # Examples
    ///
    /// ```
    /// use clover::config::SupabaseConfig;
    ///
    /// let config = SupabaseConfig {
    ///     url: "https://demo.supabase.co/".to_string(),
    ///     ..Default::default()
    /// };
    /// assert_eq!(config.functions_url(), "https://demo.supabase.co/functions/v1");
    /// ```
    pub fn functions_url(&self) -> String {
        format!("{}/functions/v1", self.base())
    }

    /// Base URL of the REST interface (`/rest/v1`)
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base())
    }

    /// Base URL of the auth service (`/auth/v1`)
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.base())
    }

    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// How the body of a streamed turn is split into fragments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FragmentFraming {
    /// Each non-empty line is one fragment (line terminators are dropped)
    #[default]
    Lines,
    /// Each received chunk is one fragment, split only on UTF-8 boundaries
    Raw,
}

impl std::str::FromStr for FragmentFraming {
    type Err = CloverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lines" => Ok(Self::Lines),
            "raw" => Ok(Self::Raw),
            other => Err(CloverError::Config(format!(
                "Invalid framing: {}. Must be one of: lines, raw",
                other
            ))),
        }
    }
}

/// Completion backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the completion API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Timeout for a whole turn, including the streamed body (seconds)
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,

    /// Read the reply as a stream; when false the backend answers with a
    /// single JSON body
    #[serde(default = "default_streaming")]
    pub streaming: bool,

    /// Fragment framing for streamed replies
    #[serde(default)]
    pub framing: FragmentFraming,

    /// Send the conversation's agent configuration with each turn
    #[serde(default)]
    pub forward_agent_config: bool,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_backend_timeout() -> u64 {
    120
}

fn default_streaming() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            timeout_seconds: default_backend_timeout(),
            streaming: default_streaming(),
            framing: FragmentFraming::default(),
            forward_agent_config: false,
        }
    }
}

impl BackendConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Client-side cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live of the conversation list (seconds, 0 disables)
    #[serde(default = "default_cache_ttl")]
    pub list_ttl_seconds: u64,

    /// Time-to-live of a conversation's history (seconds, 0 disables)
    #[serde(default = "default_cache_ttl")]
    pub history_ttl_seconds: u64,
}

fn default_cache_ttl() -> u64 {
    30
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            list_ttl_seconds: default_cache_ttl(),
            history_ttl_seconds: default_cache_ttl(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "clover=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Default system prompt for new conversations
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Agent configuration applied to new conversations when none is given
///
/// # Examples
///
/// ```
/// use clover::config::default_agent_config;
///
/// let agent = default_agent_config();
/// assert_eq!(agent.max_previous_turns, Some(6));
/// ```
pub fn default_agent_config() -> AgentConfig {
    AgentConfig {
        system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        document_prompt: Some(
            "Here are additional documents that may help answer the users question: {context}"
                .to_string(),
        ),
        temperature: Some(0.4),
        retrieval_documents: Some(5),
        chunk_size: None,
        max_previous_turns: Some(6),
        max_tokens: Some(400),
        max_completion_tokens: Some(400),
        extra: Default::default(),
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            supabase: SupabaseConfig::default(),
            backend: BackendConfig::default(),
            cache: CacheConfig::default(),
            agent: default_agent_config(),
            logging: LoggingConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CloverError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| CloverError::Config(format!("Failed to parse config: {}", e)))
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("CLOVER_SUPABASE_URL") {
            self.supabase.url = url;
        }

        if let Ok(key) = std::env::var("CLOVER_SUPABASE_ANON_KEY") {
            self.supabase.anon_key = key;
        }

        if let Ok(url) = std::env::var("CLOVER_BACKEND_URL") {
            self.backend.base_url = url;
        }

        if let Ok(timeout) = std::env::var("CLOVER_STORE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.supabase.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CLOVER_STORE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(timeout) = std::env::var("CLOVER_BACKEND_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.backend.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid CLOVER_BACKEND_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(streaming) = std::env::var("CLOVER_STREAMING") {
            if let Ok(value) = streaming.parse() {
                self.backend.streaming = value;
            } else {
                tracing::warn!("Invalid CLOVER_STREAMING: {}", streaming);
            }
        }

        if let Ok(framing) = std::env::var("CLOVER_FRAMING") {
            match framing.parse() {
                Ok(value) => self.backend.framing = value,
                Err(e) => tracing::warn!("Ignoring CLOVER_FRAMING: {}", e),
            }
        }

        if let Ok(forward) = std::env::var("CLOVER_FORWARD_AGENT_CONFIG") {
            if let Ok(value) = forward.parse() {
                self.backend.forward_agent_config = value;
            } else {
                tracing::warn!("Invalid CLOVER_FORWARD_AGENT_CONFIG: {}", forward);
            }
        }

        if let Ok(ttl) = std::env::var("CLOVER_CACHE_TTL_SECONDS") {
            if let Ok(value) = ttl.parse() {
                self.cache.list_ttl_seconds = value;
                self.cache.history_ttl_seconds = value;
            } else {
                tracing::warn!("Invalid CLOVER_CACHE_TTL_SECONDS: {}", ttl);
            }
        }

        if let Ok(prompt) = std::env::var("CLOVER_SYSTEM_PROMPT") {
            self.agent.system_prompt = Some(prompt);
        }

        if let Ok(json) = std::env::var("CLOVER_LOG_JSON") {
            if let Ok(value) = json.parse() {
                self.logging.json = value;
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(url) = &cli.backend_url {
            self.backend.base_url = url.clone();
        }
        if cli.verbose {
            self.logging.level = "clover=debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = url::Url::parse(&self.supabase.url) {
            return Err(CloverError::Config(format!(
                "supabase.url is not a valid URL ({}): {}",
                self.supabase.url, e
            )));
        }

        if let Err(e) = url::Url::parse(&self.backend.base_url) {
            return Err(CloverError::Config(format!(
                "backend.base_url is not a valid URL ({}): {}",
                self.backend.base_url, e
            )));
        }

        if self.supabase.timeout_seconds == 0 {
            return Err(CloverError::Config(
                "supabase.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.backend.timeout_seconds == 0 {
            return Err(CloverError::Config(
                "backend.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if let Some(temperature) = self.agent.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(CloverError::Config(
                    "agent.temperature must be between 0.0 and 2.0".to_string(),
                ));
            }
        }

        if self.agent.max_previous_turns == Some(0) {
            return Err(CloverError::Config(
                "agent.max_previous_turns must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
