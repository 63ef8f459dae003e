//! Command handlers for Clover
//!
//! Every handler loads the stored session, runs one client operation, and
//! prints the result. The handlers hold no conversation logic of their own.

use crate::client::{ConversationClient, SendOutcome, StreamObserver};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::error::CloverError;
use crate::models::{Conversation, Message, MessageStatus, Role};
use crate::session::SessionContext;
use anyhow::Result;
use colored::Colorize;
use std::io::Write;

pub mod conversations;
pub mod export;

/// Build the client and restore the stored session
///
/// # Errors
///
/// Returns an authentication error when nobody is signed in
pub(crate) fn connect(config: &Config) -> Result<(ConversationClient, SessionContext)> {
    let client = ConversationClient::from_config(config)?;
    let session = CredentialStore::default().load()?;
    tracing::debug!("Restored session for {}", session.user_label());
    Ok((client, SessionContext::new(session)))
}

/// Find a conversation by id, or else by exact name
pub(crate) fn find_conversation<'a>(
    conversations: &'a [Conversation],
    key: &str,
) -> std::result::Result<&'a Conversation, CloverError> {
    if let Some(found) = conversations.iter().find(|c| c.id == key) {
        return Ok(found);
    }
    let mut named = conversations.iter().filter(|c| c.name == key);
    match (named.next(), named.next()) {
        (Some(found), None) => Ok(found),
        (Some(_), Some(_)) => Err(CloverError::RemoteValidation(format!(
            "Several conversations are named '{}'; use the id instead",
            key
        ))),
        (None, _) => Err(CloverError::NotFound(key.to_string())),
    }
}

/// Resolve a conversation id or name against the user's list
pub(crate) async fn resolve_conversation(
    client: &ConversationClient,
    ctx: &SessionContext,
    key: &str,
) -> Result<Conversation> {
    let conversations = client.list_conversations(ctx).await?;
    Ok(find_conversation(&conversations, key)?.clone())
}

/// Render a message log for the terminal
pub(crate) fn render_messages(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let label = match message.role {
            Role::User => "you".cyan().bold(),
            Role::Assistant => "clover".green().bold(),
        };
        let content = match message.status {
            MessageStatus::Complete => message.content.normal(),
            MessageStatus::Incomplete => message.content.yellow(),
            MessageStatus::Error => message.content.red(),
        };
        out.push_str(&format!("{}: {}\n", label, content));
    }
    out
}

/// Prints a streamed reply as it grows
#[derive(Debug)]
pub(crate) struct TerminalPrinter {
    printed: usize,
    report_errors: bool,
}

impl Default for TerminalPrinter {
    fn default() -> Self {
        Self {
            printed: 0,
            report_errors: true,
        }
    }
}

impl TerminalPrinter {
    /// A printer that leaves failures to the caller
    pub(crate) fn without_errors() -> Self {
        Self {
            report_errors: false,
            ..Self::default()
        }
    }

    /// Line printed after the reply ends, if any
    fn finish_notice(&self, outcome: &SendOutcome) -> Option<String> {
        match outcome {
            SendOutcome::Completed { .. } => None,
            SendOutcome::Failed { error, .. } if self.report_errors => {
                Some(format!("{} {}", "Error:".red().bold(), error))
            }
            SendOutcome::Failed { .. } => None,
            SendOutcome::Cancelled { .. } => Some("Reply cancelled".yellow().to_string()),
        }
    }
}

impl StreamObserver for TerminalPrinter {
    fn on_partial(&mut self, accumulated: &str) {
        // The accumulator only ever grows, so the old length is a char boundary
        let fresh = accumulated.get(self.printed..).unwrap_or_default();
        print!("{}", fresh);
        let _ = std::io::stdout().flush();
        self.printed = accumulated.len();
    }

    fn on_finish(&mut self, outcome: &SendOutcome) {
        if self.printed > 0 || outcome.is_completed() {
            println!();
        }
        if let Some(notice) = self.finish_notice(outcome) {
            println!("{}", notice);
        }
        self.printed = 0;
    }
}

pub mod auth {
    //! Sign in and sign out
    use super::*;
    use rustyline::DefaultEditor;

    /// Sign in and store the session in the keyring
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `email` - Account email (prompted for when `None`)
    /// * `password` - Account password (prompted for when `None`)
    pub async fn login(config: Config, email: Option<String>, password: Option<String>) -> Result<()> {
        let mut editor = DefaultEditor::new()?;
        let email = match email {
            Some(email) => email,
            None => editor.readline("Email: ")?,
        };
        let password = match password {
            Some(password) => password,
            None => editor.readline("Password: ")?,
        };

        let client = ConversationClient::from_config(&config)?;
        let ctx = client.sign_in(email.trim(), &password).await?;
        CredentialStore::default().save(ctx.auth())?;

        println!(
            "{} {}",
            "Signed in as".green(),
            ctx.auth().user_label().bold()
        );
        Ok(())
    }

    /// Sign out remotely and forget the stored session
    ///
    /// The stored session is removed even if the remote sign-out fails.
    pub async fn logout(config: Config) -> Result<()> {
        let credentials = CredentialStore::default();
        let session = match credentials.load() {
            Ok(session) => session,
            Err(_) => {
                credentials.clear();
                println!("{}", "Not signed in.".yellow());
                return Ok(());
            }
        };

        let client = ConversationClient::from_config(&config)?;
        let result = client.sign_out(SessionContext::new(session)).await;
        credentials.clear();

        match result {
            Ok(()) => {
                println!("{}", "Signed out.".green());
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Remote sign-out failed: {}", e);
                println!(
                    "{} (local session removed; remote sign-out failed: {})",
                    "Signed out".yellow(),
                    e
                );
                Ok(())
            }
        }
    }
}

pub mod chat {
    //! Streamed message sending, one-shot and interactive
    use super::*;
    use crate::format::render_transcript;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use tokio_util::sync::CancellationToken;

    /// Commands recognized inside the chat loop
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ChatCommand {
        /// Plain text to send
        Message(String),
        /// `/history`
        History,
        /// `/rename <name>`
        Rename(String),
        /// `/export`
        Export,
        /// `/help`
        Help,
        /// `/exit` or `/quit`
        Exit,
        /// Anything else starting with `/`
        Unknown(String),
    }

    /// Parse one line of chat input
    pub fn parse_chat_command(line: &str) -> ChatCommand {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return ChatCommand::Message(trimmed.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "history" => ChatCommand::History,
            "rename" if !arg.is_empty() => ChatCommand::Rename(arg.to_string()),
            "export" => ChatCommand::Export,
            "help" => ChatCommand::Help,
            "exit" | "quit" => ChatCommand::Exit,
            _ => ChatCommand::Unknown(trimmed.to_string()),
        }
    }

    /// Send one message and stream the reply to stdout
    pub async fn send_once(config: Config, conversation: String, message: String) -> Result<()> {
        let (client, mut ctx) = connect(&config)?;
        let target = resolve_conversation(&client, &ctx, &conversation).await?;
        if let Some(e) = client.select_conversation(&mut ctx, target).await {
            if ctx.selected().is_none() {
                return Err(e.into());
            }
            tracing::warn!("Sending without local history: {}", e);
        }

        // main reports the failure, so the printer stays quiet about it
        let mut printer = TerminalPrinter::without_errors();
        let outcome = stream_with_interrupt(&client, &mut ctx, &message, &mut printer).await?;
        match outcome {
            SendOutcome::Failed { error, .. } => Err(error.into()),
            _ => Ok(()),
        }
    }

    /// Run the interactive chat loop
    ///
    /// Ctrl-C while a reply streams cancels the reply; Ctrl-C or Ctrl-D at
    /// the prompt leaves the loop.
    pub async fn run_chat(config: Config, conversation: Option<String>) -> Result<()> {
        let (client, mut ctx) = connect(&config)?;

        match conversation {
            Some(key) => {
                let target = resolve_conversation(&client, &ctx, &key).await?;
                if let Some(e) = client.select_conversation(&mut ctx, target).await {
                    if ctx.selected().is_none() {
                        return Err(e.into());
                    }
                    println!("{} {}", "Could not load history:".yellow(), e);
                }
            }
            None => {
                client.create_conversation(&mut ctx, None, None).await?;
            }
        }

        if let Some(selected) = ctx.selected() {
            println!(
                "{} {} ({})",
                "Conversation:".bold(),
                selected.name.cyan(),
                selected.id
            );
        }
        println!("Type /help for commands.\n");
        print!("{}", render_messages(ctx.messages()));

        let mut editor = DefaultEditor::new()?;
        loop {
            match editor.readline(&format!("{} ", "you>".cyan().bold())) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line.trim());

                    match parse_chat_command(&line) {
                        ChatCommand::Message(text) => {
                            print!("{} ", "clover:".green().bold());
                            let _ = std::io::stdout().flush();
                            let mut printer = TerminalPrinter::default();
                            match stream_with_interrupt(&client, &mut ctx, &text, &mut printer)
                                .await
                            {
                                Ok(_) => {}
                                Err(e) => println!("{} {}", "Error:".red().bold(), e),
                            }
                        }
                        ChatCommand::History => {
                            print!("{}", render_messages(ctx.messages()));
                        }
                        ChatCommand::Rename(name) => {
                            let Some(id) = ctx.selected_id().map(str::to_string) else {
                                break;
                            };
                            let name = match conversations::checked_name(&name) {
                                Ok(name) => name.to_string(),
                                Err(e) => {
                                    println!("{} {}", "Rename failed:".red(), e);
                                    continue;
                                }
                            };
                            match client.rename_conversation(&mut ctx, &id, &name).await {
                                Ok(updated) => {
                                    println!("{} {}", "Renamed to".green(), updated.name)
                                }
                                Err(e) => println!("{} {}", "Rename failed:".red(), e),
                            }
                            if ctx.selected().is_none() {
                                println!("{}", "This conversation no longer exists.".yellow());
                                break;
                            }
                        }
                        ChatCommand::Export => {
                            let Some(id) = ctx.selected_id().map(str::to_string) else {
                                break;
                            };
                            match client.export_log(&ctx, &id).await {
                                Ok(log) => println!("{}", render_transcript(&log)),
                                Err(e) => println!("{} {}", "Export failed:".red(), e),
                            }
                        }
                        ChatCommand::Help => print_help(),
                        ChatCommand::Exit => break,
                        ChatCommand::Unknown(command) => {
                            println!("{} {}", "Unknown command:".yellow(), command);
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Send `text`, cancelling the reply on Ctrl-C
    async fn stream_with_interrupt(
        client: &ConversationClient,
        ctx: &mut SessionContext,
        text: &str,
        printer: &mut TerminalPrinter,
    ) -> std::result::Result<SendOutcome, CloverError> {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let outcome = client
            .send_message(ctx, text, printer, Some(&cancel))
            .await;
        watcher.abort();
        outcome
    }

    fn print_help() {
        println!("{}", "Chat commands:".bold());
        println!("  /history        Show the conversation so far");
        println!("  /rename <name>  Rename this conversation");
        println!("  /export         Print the full transcript");
        println!("  /help           Show this help");
        println!("  /exit           Leave the chat (also /quit, Ctrl-D)");
        println!();
        println!("Press Ctrl-C while a reply streams to cancel it.");
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_parse_plain_message() {
            assert_eq!(
                parse_chat_command("  hello there "),
                ChatCommand::Message("hello there".to_string())
            );
        }

        #[test]
        fn test_parse_slash_commands() {
            assert_eq!(parse_chat_command("/history"), ChatCommand::History);
            assert_eq!(parse_chat_command("/export"), ChatCommand::Export);
            assert_eq!(parse_chat_command("/help"), ChatCommand::Help);
            assert_eq!(parse_chat_command("/quit"), ChatCommand::Exit);
            assert_eq!(parse_chat_command("/exit"), ChatCommand::Exit);
        }

        #[test]
        fn test_parse_rename_requires_name() {
            assert_eq!(
                parse_chat_command("/rename  Road trip "),
                ChatCommand::Rename("Road trip".to_string())
            );
            assert_eq!(
                parse_chat_command("/rename"),
                ChatCommand::Unknown("/rename".to_string())
            );
        }

        #[test]
        fn test_parse_unknown_command() {
            assert_eq!(
                parse_chat_command("/frobnicate now"),
                ChatCommand::Unknown("/frobnicate now".to_string())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::conversation;

    #[test]
    fn test_find_conversation_by_id_then_name() {
        let list = vec![conversation("c-1", 1), conversation("c-2", 2)];
        assert_eq!(find_conversation(&list, "c-2").unwrap().id, "c-2");
        assert_eq!(find_conversation(&list, "Convo-c-1").unwrap().id, "c-1");
    }

    #[test]
    fn test_find_conversation_missing() {
        let list = vec![conversation("c-1", 1)];
        assert!(matches!(
            find_conversation(&list, "nope"),
            Err(CloverError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_conversation_ambiguous_name() {
        let mut twin = conversation("c-2", 2);
        twin.name = "Convo-c-1".to_string();
        let list = vec![conversation("c-1", 1), twin];
        // Exact id still wins
        assert_eq!(find_conversation(&list, "c-1").unwrap().id, "c-1");
        assert!(find_conversation(&list, "Convo-c-1").is_err());
    }

    #[test]
    fn test_render_messages_labels_roles() {
        colored::control::set_override(false);
        let text = render_messages(&[
            Message::user("hi"),
            Message::assistant("hello"),
            Message::error("**Error:** boom"),
        ]);
        assert_eq!(text, "you: hi\nclover: hello\nclover: **Error:** boom\n");
    }

    #[test]
    fn test_terminal_printer_tracks_printed_prefix() {
        let mut printer = TerminalPrinter::default();
        printer.on_partial("Hel");
        assert_eq!(printer.printed, 3);
        printer.on_partial("Hello");
        assert_eq!(printer.printed, 5);
        printer.on_finish(&SendOutcome::Completed {
            text: "Hello".to_string(),
        });
        assert_eq!(printer.printed, 0);
    }

    #[test]
    fn test_quiet_printer_leaves_failures_to_caller() {
        colored::control::set_override(false);
        let failed = SendOutcome::Failed {
            error: CloverError::Network("connection refused".to_string()),
            partial: String::new(),
        };

        let loud = TerminalPrinter::default();
        assert_eq!(
            loud.finish_notice(&failed).as_deref(),
            Some("Error: Network error: connection refused")
        );

        let quiet = TerminalPrinter::without_errors();
        assert_eq!(quiet.finish_notice(&failed), None);
        let cancelled = SendOutcome::Cancelled {
            partial: String::new(),
        };
        assert_eq!(
            quiet.finish_notice(&cancelled).as_deref(),
            Some("Reply cancelled")
        );
    }
}
