//! Transcript export command

use super::{connect, resolve_conversation};
use crate::config::Config;
use crate::format::render_transcript;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Default file name for an exported conversation
pub fn default_export_name(conversation_id: &str) -> String {
    format!("conversation_{}.txt", conversation_id)
}

/// Export a conversation transcript to `output`, or stdout when `None`
///
/// A directory as `output` receives a file named after the conversation.
pub async fn export(config: Config, conversation: String, output: Option<PathBuf>) -> Result<()> {
    let (client, ctx) = connect(&config)?;
    let target = resolve_conversation(&client, &ctx, &conversation).await?;
    let log = client.export_log(&ctx, &target.id).await?;
    let transcript = render_transcript(&log);

    match output {
        None => print!("{}", transcript),
        Some(path) => {
            let path = export_path(&path, &target.id);
            std::fs::write(&path, transcript)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} {}",
                "Exported transcript to".green(),
                path.display().to_string().bold()
            );
        }
    }
    Ok(())
}

fn export_path(output: &Path, conversation_id: &str) -> PathBuf {
    if output.is_dir() {
        output.join(default_export_name(conversation_id))
    } else {
        output.to_path_buf()
    }
}
