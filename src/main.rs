//! QAStream - streaming question answering client
//!
//! Main entry point for the QAStream command-line application.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use qastream::cli::{Cli, Commands};
use qastream::commands;
use qastream::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { mode } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(m) = &mode {
                tracing::debug!("Using mode override: {}", m);
            }
            commands::chat::run_chat(config, mode).await?;
            Ok(())
        }
        Commands::Ask {
            mode,
            chat_id,
            question,
        } => {
            tracing::debug!("Asking a single question");
            commands::run_ask(config, mode, chat_id, question).await?;
            Ok(())
        }
        Commands::Upload { files } => {
            tracing::info!("Uploading {} file(s)", files.len());
            commands::run_upload(config, files).await?;
            Ok(())
        }
        Commands::Health => {
            commands::run_health(config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber
///
/// Logs go to stderr so streamed answers on stdout stay clean. `RUST_LOG`
/// wins over the `--verbose` default.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "qastream=debug" } else { "qastream=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
