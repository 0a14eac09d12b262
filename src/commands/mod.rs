/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `chat`: Interactive chat with session archive
- `run_ask`: One question, answer streamed to stdout
- `run_upload`: Document upload for the rag service
- `run_health`: Gateway reachability probe

Answers are rendered by watching the session store while the dispatcher
writes into it.
*/

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::client::ServiceClient;
use crate::config::Config;
use crate::dispatcher::{Dispatcher, TurnReport};
use crate::error::{QaError, Result};
use crate::notify::LogNotifier;
use crate::service::ServiceMode;
use crate::session::{Role, SessionState, SessionStore};

// Archived session listing
pub mod history;

// Special commands parser for the chat loop
pub mod special_commands;

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Runs a readline loop that sends questions to the selected service and
    //! handles session commands. Every chat session gets a fresh id, which is
    //! also forwarded to the backend as the conversation id.

    use super::*;
    use crate::commands::history::{find_entry, print_history};
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::notify::TerminalNotifier;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use uuid::Uuid;

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `mode` - Optional override for the configured default service
    ///
    /// # Errors
    ///
    /// Returns an error if the mode is invalid, the client cannot be built,
    /// or the terminal cannot be read.
    pub async fn run_chat(config: Config, mode: Option<String>) -> Result<()> {
        let mut mode = resolve_mode(&config, mode.as_deref())?;
        let store = SessionStore::new();
        let dispatcher =
            Dispatcher::from_config(&config, store.clone(), Arc::new(TerminalNotifier))?;
        let mut session_id = Uuid::new_v4().to_string();
        tracing::info!("Started chat session {}", session_id);

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(mode, dispatcher.client().base_url());

        loop {
            let prompt = format!("{} >> ", mode.colored_tag());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}", e.to_string().red());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::None => {}
                        SpecialCommand::Exit => break,
                        SpecialCommand::NewSession => {
                            if store.snapshot().messages.is_empty() {
                                println!("{}", "Already in a new session.".yellow());
                            } else {
                                store.archive_session(&session_id);
                                session_id = Uuid::new_v4().to_string();
                                println!("{} {}", "Started new session".green(), session_id.cyan());
                            }
                            continue;
                        }
                        SpecialCommand::ListHistory => {
                            print_history(&store.snapshot());
                            continue;
                        }
                        SpecialCommand::OpenSession(id) => {
                            let state = store.snapshot();
                            let Some(target) = find_entry(&state, &id).map(|e| e.id.clone()) else {
                                eprintln!("{}", format!("No archived session matches {}", id).red());
                                continue;
                            };
                            if !state.messages.is_empty() && target != session_id {
                                store.update_history(&session_id);
                                store.archive_session(&session_id);
                            }
                            store.restore(&target);
                            session_id = target;
                            print_transcript(&store.snapshot());
                            continue;
                        }
                        SpecialCommand::SwitchMode(next) => {
                            mode = next;
                            println!("Switched to {} ({})", mode.colored_tag(), mode.description());
                            continue;
                        }
                        SpecialCommand::Upload(files) => {
                            match dispatcher.client().upload_files(&files).await {
                                Ok(response) => print_upload(&response, files.len()),
                                Err(e) => eprintln!("{} {}", "Upload failed:".red().bold(), e),
                            }
                            continue;
                        }
                        SpecialCommand::ShowStatus => {
                            print_status(&dispatcher, mode, &session_id);
                            continue;
                        }
                        SpecialCommand::Help => {
                            print_help();
                            continue;
                        }
                    }

                    store.dispatch(crate::session::Action::SetInput(trimmed.to_string()));
                    if let Err(e) = stream_turn(&dispatcher, trimmed, mode, Some(&session_id)).await {
                        tracing::debug!("Turn ended with error: {}", e);
                    }
                    store.update_history(&session_id);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        tracing::info!("Chat session {} ended", session_id);
        Ok(())
    }

    fn print_welcome_banner(mode: ServiceMode, base_url: &str) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║          QAStream Interactive Chat - Welcome!                ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Service: {} ({})", mode.colored_tag(), mode.description());
        println!("Gateway: {}\n", base_url.cyan());
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    fn print_status(dispatcher: &Dispatcher, mode: ServiceMode, session_id: &str) {
        let state = dispatcher.store().snapshot();
        println!("\n{}", "Session Status".bold());
        println!("  Service:   {} ({})", mode.colored_tag(), mode.description());
        println!("  Session:   {}", session_id.cyan());
        println!("  Messages:  {}", state.messages.len());
        println!("  Archived:  {}", state.history.len());
        println!("  Last turn: {}", dispatcher.phase());
        if let Some(error) = dispatcher.last_error() {
            println!("  Error:     {}", error.red());
        }
        println!();
    }

    fn print_transcript(state: &SessionState) {
        for message in &state.messages {
            match message.role {
                Role::User => println!("{} {}", ">>".bold(), message.content),
                Role::Assistant => {
                    let tag = message.service.map(|s| s.colored_tag()).unwrap_or_default();
                    println!("{} {}", tag, message.content);
                }
            }
        }
        println!();
    }
}

/// Answer text not yet shown for the reply at `reply_index`
///
/// `printed` is the byte length already shown and is advanced past the
/// returned text. Returns `None` until the reply exists and has grown.
pub fn pending_output(state: &SessionState, reply_index: usize, printed: &mut usize) -> Option<String> {
    let reply = state.messages.get(reply_index)?;
    if reply.role != Role::Assistant {
        return None;
    }
    let fresh = reply.content.get(*printed..)?;
    if fresh.is_empty() {
        return None;
    }
    *printed = reply.content.len();
    Some(fresh.to_string())
}

/// Submit `question` and print the answer to stdout as it grows
///
/// Ctrl-C abandons the turn; the dispatcher clears the busy flag when the
/// turn is dropped.
pub async fn stream_turn(
    dispatcher: &Dispatcher,
    question: &str,
    mode: ServiceMode,
    chat_id: Option<&str>,
) -> Result<TurnReport> {
    let store = dispatcher.store();
    let mut updates = store.subscribe();
    let reply_index = store.snapshot().messages.len() + 1;
    let mut printed = 0usize;
    let mut stdout = std::io::stdout();

    let submit = dispatcher.submit(question, mode, chat_id);
    tokio::pin!(submit);

    let result = loop {
        tokio::select! {
            result = &mut submit => break result,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut submit).await;
                }
                let chunk = pending_output(&updates.borrow_and_update(), reply_index, &mut printed);
                if let Some(chunk) = chunk {
                    print!("{}", chunk);
                    let _ = stdout.flush();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break Err(QaError::Generation("interrupted".to_string()).into());
            }
        }
    };

    let state = store.snapshot();
    if let Some(chunk) = pending_output(&state, reply_index, &mut printed) {
        print!("{}", chunk);
    }
    if printed > 0 {
        println!();
    }
    print_references(&state, reply_index);
    result
}

fn print_references(state: &SessionState, reply_index: usize) {
    let Some(references) = state
        .messages
        .get(reply_index)
        .and_then(|m| m.references.as_ref())
    else {
        return;
    };
    println!("{}", "Sources:".bold());
    for (i, reference) in references.iter().enumerate() {
        println!("  [{}] {} {}", i + 1, reference.title, reference.citation.dimmed());
    }
}

fn print_upload(response: &crate::client::UploadResponse, requested: usize) {
    let message = response.message.as_deref().unwrap_or("Upload complete");
    println!("{}", message.green());
    let count = response.count.unwrap_or(requested as u64);
    println!("Stored {} file(s)", count);
    for name in response.files.iter().flatten() {
        println!("  - {}", name.cyan());
    }
}

fn resolve_mode(config: &Config, mode: Option<&str>) -> Result<ServiceMode> {
    match mode {
        Some(mode) => ServiceMode::parse_str(mode).map_err(|e| QaError::Config(e).into()),
        None => config.default_mode(),
    }
}

/// Ask one question and stream the answer to stdout
///
/// # Errors
///
/// Returns the connection or streaming error of the turn
pub async fn run_ask(
    config: Config,
    mode: Option<String>,
    chat_id: Option<String>,
    question: String,
) -> Result<()> {
    let mode = resolve_mode(&config, mode.as_deref())?;
    let dispatcher = Dispatcher::from_config(&config, SessionStore::new(), Arc::new(LogNotifier))?;
    let report = stream_turn(&dispatcher, &question, mode, chat_id.as_deref()).await?;
    tracing::debug!(
        "Answer complete: {} frames, {} deltas, {} unknown",
        report.frames,
        report.deltas,
        report.unknown
    );
    Ok(())
}

/// Upload documents for the rag service
///
/// # Errors
///
/// Returns [`QaError::Upload`] with the server's message when rejected
pub async fn run_upload(config: Config, files: Vec<PathBuf>) -> Result<()> {
    let client = ServiceClient::from_config(&config)?;
    let response = client.upload_files(&files).await?;
    print_upload(&response, files.len());
    Ok(())
}

/// Check that the gateway answers on its root route
///
/// # Errors
///
/// Returns [`QaError::Connection`] when the gateway is unreachable or
/// answers with an error status
pub async fn run_health(config: Config) -> Result<()> {
    let client = ServiceClient::from_config(&config)?;
    if client.health().await? {
        println!("{} {}", "Gateway is healthy:".green(), client.base_url());
        Ok(())
    } else {
        Err(QaError::Connection(format!("Gateway at {} reported an error status", client.base_url())).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Action, Message, MessagePatch};

    #[test]
    fn test_pending_output_tracks_growth() {
        let store = SessionStore::new();
        store.push_user_message("q");
        let mut printed = 0;
        assert!(pending_output(&store.snapshot(), 1, &mut printed).is_none());

        let token = store.open_turn(ServiceMode::Tools).unwrap();
        assert!(pending_output(&store.snapshot(), 1, &mut printed).is_none());

        store.update_last_message(token, MessagePatch::content("Hel")).unwrap();
        assert_eq!(pending_output(&store.snapshot(), 1, &mut printed).as_deref(), Some("Hel"));
        store.update_last_message(token, MessagePatch::content("Hello")).unwrap();
        assert_eq!(pending_output(&store.snapshot(), 1, &mut printed).as_deref(), Some("lo"));
        assert!(pending_output(&store.snapshot(), 1, &mut printed).is_none());
    }

    #[test]
    fn test_pending_output_ignores_user_messages() {
        let store = SessionStore::new();
        store.dispatch(Action::SetMessages(vec![Message::user("a"), Message::user("b")]));
        let mut printed = 0;
        assert!(pending_output(&store.snapshot(), 1, &mut printed).is_none());
    }

    #[test]
    fn test_resolve_mode_prefers_override() {
        let config = Config::default();
        assert_eq!(resolve_mode(&config, Some("rag")).unwrap(), ServiceMode::Rag);
        assert_eq!(resolve_mode(&config, None).unwrap(), ServiceMode::Tools);
        assert!(resolve_mode(&config, Some("nope")).is_err());
    }
}
