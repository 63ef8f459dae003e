//! Clover - conversation sync and streaming chat client
//!
#![doc = "Main entry point for the Clover command-line client."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clover::cli::{Cli, Commands};
use clover::commands;
use clover::commands::conversations::CreateOptions;
use clover::config::{Config, LoggingConfig};
use clover::credentials::CredentialStore;
use clover::CloverError;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_tracing(&config.logging);

    // Validate configuration
    config.validate()?;

    let result = run(cli.command, config).await;
    if let Err(e) = &result {
        if let Some(clover_err) = e.downcast_ref::<CloverError>() {
            if clover_err.requires_reauthentication() {
                CredentialStore::default().clear();
                eprintln!("Your session is no longer valid. Run `clover login` to sign in again.");
            }
        }
    }
    result
}

async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Login { email, password } => {
            tracing::info!("Signing in");
            commands::auth::login(config, email, password).await
        }
        Commands::Logout => commands::auth::logout(config).await,
        Commands::List { json } => commands::conversations::list(config, json).await,
        Commands::History { conversation } => {
            commands::conversations::history(config, conversation).await
        }
        Commands::Create {
            name,
            system_prompt,
            temperature,
            max_previous_turns,
        } => {
            let options = CreateOptions {
                name,
                system_prompt,
                temperature,
                max_previous_turns,
            };
            commands::conversations::create(config, options).await
        }
        Commands::Rename { conversation, name } => {
            commands::conversations::rename(config, conversation, name).await
        }
        Commands::Delete { conversation, yes } => {
            commands::conversations::delete(config, conversation, yes).await
        }
        Commands::Chat { conversation } => {
            tracing::info!("Starting interactive chat");
            if let Some(c) = &conversation {
                tracing::debug!("Opening conversation: {}", c);
            }
            commands::chat::run_chat(config, conversation).await
        }
        Commands::Send {
            conversation,
            message,
        } => commands::chat::send_once(config, conversation, message).await,
        Commands::Export {
            conversation,
            output,
        } => commands::export::export(config, conversation, output).await,
    }
}

/// Initialize tracing; `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
