//! Command-line interface definition for QAStream
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot questions,
//! document upload and a gateway health probe.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// QAStream - streaming question answering client
///
/// Ask questions against document retrieval, stock tool and web search
/// backends and watch the answer arrive as it is generated.
#[derive(Parser, Debug, Clone)]
#[command(name = "qastream")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the gateway base URL from config
    #[arg(long)]
    pub base_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for QAStream
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Service to ask: rag, tools or search
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Ask a single question and stream the answer to stdout
    Ask {
        /// Service to ask: rag, tools or search
        #[arg(short, long)]
        mode: Option<String>,

        /// Conversation id forwarded to the backend
        #[arg(long)]
        chat_id: Option<String>,

        /// The question
        question: String,
    },

    /// Upload documents for retrieval
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check that the gateway is reachable
    Health,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
