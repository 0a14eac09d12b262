//! Special commands parser for interactive chat mode
//!
//! Special commands manage the session instead of being sent as questions:
//! - Start a new session, archiving the current one
//! - List and reopen archived sessions
//! - Switch the answering service
//! - Upload documents for retrieval
//! - Show status and help, or exit
//!
//! Commands are prefixed with `/` and are case-insensitive. Arguments keep
//! their original case.

use std::path::PathBuf;

use thiserror::Error;

use crate::service::ServiceMode;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Archive the current session and start an empty one
    NewSession,

    /// List archived sessions
    ListHistory,

    /// Reopen an archived session by id or id prefix
    OpenSession(String),

    /// Switch the answering service
    SwitchMode(ServiceMode),

    /// Upload documents for retrieval
    Upload(Vec<PathBuf>),

    /// Display current service and session status
    ShowStatus,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; the input is a question
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns [`CommandError::UnknownCommand`] for unrecognized `/` input and
/// [`CommandError::MissingArgument`] or [`CommandError::UnsupportedArgument`]
/// when a command's argument is absent or invalid.
///
/// # Examples
///
/// ```
/// use qastream::commands::special_commands::{parse_special_command, SpecialCommand};
/// use qastream::service::ServiceMode;
///
/// let cmd = parse_special_command("/mode rag").unwrap();
/// assert_eq!(cmd, SpecialCommand::SwitchMode(ServiceMode::Rag));
///
/// let cmd = parse_special_command("what is the weather").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match command.as_str() {
        "/new" | "/clear" => Ok(SpecialCommand::NewSession),
        "/history" => Ok(SpecialCommand::ListHistory),

        "/open" | "/resume" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/open".to_string(),
                    usage: "/open <session_id>".to_string(),
                })
            } else {
                Ok(SpecialCommand::OpenSession(rest.to_string()))
            }
        }

        "/mode" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "/mode".to_string(),
                    usage: "/mode <rag|tools|search>".to_string(),
                });
            }
            ServiceMode::parse_str(rest)
                .map(SpecialCommand::SwitchMode)
                .map_err(|_| CommandError::UnsupportedArgument {
                    command: "/mode".to_string(),
                    arg: rest.to_string(),
                })
        }
        "/rag" => Ok(SpecialCommand::SwitchMode(ServiceMode::Rag)),
        "/tools" => Ok(SpecialCommand::SwitchMode(ServiceMode::Tools)),
        "/search" => Ok(SpecialCommand::SwitchMode(ServiceMode::Search)),

        "/upload" => {
            let files: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
            if files.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/upload".to_string(),
                    usage: "/upload <file> [file...]".to_string(),
                })
            } else {
                Ok(SpecialCommand::Upload(files))
            }
        }

        "/status" => Ok(SpecialCommand::ShowStatus),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "exit" | "quit" | "/exit" | "/quit" => Ok(SpecialCommand::Exit),

        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

/// Display help text for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat Mode
===========================================

SERVICES:
  /mode rag       - Answer from uploaded documents
  /mode tools     - Answer with stock market tools
  /mode search    - Answer from a web search
  /rag, /tools, /search - Shorthands for /mode

SESSIONS:
  /new            - Archive this session and start a new one
  /history        - List archived sessions
  /open <id>      - Reopen an archived session (id prefix is enough)

DOCUMENTS:
  /upload <file> [file...] - Upload documents for the rag service

OTHER:
  /status         - Show current service and session
  /help           - Show this help
  /exit, exit     - Leave the chat

Anything else is sent as a question to the current service.
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(
            parse_special_command("How is ACME doing?").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_mode_switching() {
        assert_eq!(
            parse_special_command("/mode SEARCH").unwrap(),
            SpecialCommand::SwitchMode(ServiceMode::Search)
        );
        assert_eq!(
            parse_special_command("/rag").unwrap(),
            SpecialCommand::SwitchMode(ServiceMode::Rag)
        );
        assert_eq!(
            parse_special_command("/mode").unwrap_err(),
            CommandError::MissingArgument {
                command: "/mode".to_string(),
                usage: "/mode <rag|tools|search>".to_string(),
            }
        );
        assert!(matches!(
            parse_special_command("/mode poetry"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
    }

    #[test]
    fn test_open_keeps_argument_case() {
        assert_eq!(
            parse_special_command("/open AbC123").unwrap(),
            SpecialCommand::OpenSession("AbC123".to_string())
        );
        assert!(parse_special_command("/open").is_err());
    }

    #[test]
    fn test_upload_collects_paths() {
        assert_eq!(
            parse_special_command("/upload a.pdf  docs/b.txt").unwrap(),
            SpecialCommand::Upload(vec![PathBuf::from("a.pdf"), PathBuf::from("docs/b.txt")])
        );
        assert!(parse_special_command("/upload").is_err());
    }

    #[test]
    fn test_session_and_exit_commands() {
        assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewSession);
        assert_eq!(parse_special_command("/History").unwrap(), SpecialCommand::ListHistory);
        assert_eq!(parse_special_command("quit").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("/exit").unwrap(), SpecialCommand::Exit);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_special_command("/models list").unwrap_err(),
            CommandError::UnknownCommand("/models".to_string())
        );
    }
}
