//! Conversation listing and management commands

use super::{connect, render_messages, resolve_conversation};
use crate::config::Config;
use crate::format::{pad_label, readable_timestamp, time_ago_at};
use crate::models::{AgentConfig, Conversation};
use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use prettytable::{format, Table};
use rustyline::DefaultEditor;

/// Width of the name-and-age label column
pub const LABEL_WIDTH: usize = 24;

/// Longest display name accepted from the terminal, in characters
pub const MAX_NAME_CHARS: usize = 20;

/// Trim a user-supplied display name and check its length
///
/// # Errors
///
/// Returns error if the name is blank or longer than [`MAX_NAME_CHARS`]
pub fn checked_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("The conversation name must not be empty");
    }
    let len = name.chars().count();
    if len > MAX_NAME_CHARS {
        anyhow::bail!(
            "The conversation name is {} characters long; the limit is {}",
            len,
            MAX_NAME_CHARS
        );
    }
    Ok(name)
}

/// Overrides applied on top of the configured agent defaults
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Display name
    pub name: Option<String>,
    /// System prompt
    pub system_prompt: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Previous turns replayed as context
    pub max_previous_turns: Option<u32>,
}

impl CreateOptions {
    /// Apply the overrides to `defaults`
    pub fn agent_config(&self, defaults: AgentConfig) -> AgentConfig {
        let mut config = defaults;
        if let Some(prompt) = self.system_prompt.clone().filter(|p| !p.trim().is_empty()) {
            config.system_prompt = Some(prompt);
        }
        if let Some(temperature) = self.temperature {
            config.temperature = Some(temperature);
        }
        if let Some(turns) = self.max_previous_turns {
            config.max_previous_turns = Some(turns);
        }
        config
    }
}

/// Build the conversation table shown by `clover list`
pub fn conversation_table(conversations: &[Conversation], now: DateTime<Utc>) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Conversation".bold(),
        "ID".bold(),
        "Last Updated".bold()
    ]);

    for conversation in conversations {
        let age = time_ago_at(conversation.updated_at, now);
        table.add_row(prettytable::row![
            pad_label(&conversation.name, &age, LABEL_WIDTH),
            conversation.id.cyan(),
            readable_timestamp(conversation.updated_at)
        ]);
    }
    table
}

/// List the user's conversations, newest first
pub async fn list(config: Config, json: bool) -> Result<()> {
    let (client, ctx) = connect(&config)?;
    let conversations = client.list_conversations(&ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversations)?);
        return Ok(());
    }

    if conversations.is_empty() {
        println!("{}", "No conversations yet.".yellow());
        println!("Use {} to start one.", "clover create".cyan());
        return Ok(());
    }

    println!("\nConversations:");
    conversation_table(&conversations, Utc::now()).printstd();
    println!();
    Ok(())
}

/// Print the message log of one conversation
pub async fn history(config: Config, conversation: String) -> Result<()> {
    let (client, ctx) = connect(&config)?;
    let target = resolve_conversation(&client, &ctx, &conversation).await?;
    let messages = client.fetch_history(&ctx, &target.id).await?;

    println!("{} {}\n", "Conversation:".bold(), target.name.cyan());
    if messages.is_empty() {
        println!("{}", "No messages yet.".yellow());
    } else {
        print!("{}", render_messages(&messages));
    }
    Ok(())
}

/// Create a conversation with the configured defaults plus `options`
pub async fn create(config: Config, options: CreateOptions) -> Result<()> {
    // A blank name asks for a random one
    let name = match options.name.as_deref() {
        Some(name) if !name.trim().is_empty() => Some(checked_name(name)?.to_string()),
        _ => None,
    };
    let (client, mut ctx) = connect(&config)?;
    let agent_config = options.agent_config(client.default_agent_config());
    let created = client
        .create_conversation(&mut ctx, name, Some(agent_config))
        .await?;

    println!(
        "{} {} ({})",
        "Created".green(),
        created.name.bold(),
        created.id.cyan()
    );
    Ok(())
}

/// Rename a conversation
pub async fn rename(config: Config, conversation: String, name: String) -> Result<()> {
    let name = checked_name(&name)?;
    let (client, mut ctx) = connect(&config)?;
    let target = resolve_conversation(&client, &ctx, &conversation).await?;
    let updated = client
        .rename_conversation(&mut ctx, &target.id, name)
        .await?;

    println!(
        "{} '{}' to '{}'",
        "Renamed".green(),
        target.name,
        updated.name.bold()
    );
    Ok(())
}

/// Delete a conversation after a two-step confirmation
///
/// The first step asks whether to delete; the second asks for the name to
/// be typed back. `yes` skips both.
pub async fn delete(config: Config, conversation: String, yes: bool) -> Result<()> {
    let (client, mut ctx) = connect(&config)?;
    let target = resolve_conversation(&client, &ctx, &conversation).await?;

    if !yes && !confirm_deletion(&target)? {
        println!("{}", "Deletion cancelled.".yellow());
        return Ok(());
    }

    client.delete_conversation(&mut ctx, &target.id).await?;
    println!(
        "{}",
        format!("Deleted conversation {} ({})", target.name, target.id).green()
    );
    Ok(())
}

fn confirm_deletion(target: &Conversation) -> Result<bool> {
    let mut editor = DefaultEditor::new()?;
    let first = editor.readline(&format!(
        "Delete '{}' and all of its messages? [y/N] ",
        target.name
    ))?;
    if !is_affirmative(&first) {
        return Ok(false);
    }
    let second = editor.readline(&format!(
        "{} Type the conversation name to confirm: ",
        "This cannot be undone.".red().bold()
    ))?;
    Ok(second.trim() == target.name)
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_agent_config;
    use crate::test_utils::conversation;
    use chrono::TimeZone;

    #[test]
    fn test_create_options_override_defaults() {
        let options = CreateOptions {
            name: Some("Trip".to_string()),
            system_prompt: Some("Be brief".to_string()),
            temperature: Some(1.1),
            max_previous_turns: None,
        };
        let config = options.agent_config(default_agent_config());
        assert_eq!(config.system_prompt.as_deref(), Some("Be brief"));
        assert_eq!(config.temperature, Some(1.1));
        assert_eq!(config.max_previous_turns, Some(6));
    }

    #[test]
    fn test_create_options_blank_prompt_keeps_default() {
        let options = CreateOptions {
            system_prompt: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(options.agent_config(default_agent_config()), default_agent_config());
    }

    #[test]
    fn test_conversation_table_rows() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 13, 0, 0).single().unwrap();
        let table = conversation_table(&[conversation("c-1", 30), conversation("c-2", 0)], now);
        // Header plus one row per conversation
        assert_eq!(table.len(), 3);
        let rendered = table.to_string();
        assert!(rendered.contains("Convo-c-1"));
        assert!(rendered.contains("30m"));
        assert!(rendered.contains("1h"));
    }

    #[test]
    fn test_checked_name_limits_length() {
        assert_eq!(checked_name("  Road trip ").unwrap(), "Road trip");
        assert_eq!(checked_name(&"a".repeat(20)).unwrap().len(), 20);
        assert!(checked_name(&"a".repeat(21)).is_err());
        assert!(checked_name("   ").is_err());
    }

    #[test]
    fn test_checked_name_counts_characters_not_bytes() {
        // 20 characters, 40 bytes
        let name = "é".repeat(20);
        assert!(checked_name(&name).is_ok());
        let err = checked_name(&"é".repeat(21)).unwrap_err();
        assert!(err.to_string().contains("21 characters"));
    }

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
    }
}
