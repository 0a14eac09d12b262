//! QAStream - streaming question answering client library
//!
//! This library talks to a question answering gateway that exposes three
//! services (document retrieval, stock tools and web search), each of which
//! streams its answer back as blank-line delimited frames.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `stream`: byte decoding, framing, payload routing and paced accumulation
//! - `session`: conversation state, the reducer that changes it, and its store
//! - `client`: HTTP access to the gateway routes
//! - `dispatcher`: runs one generation end to end and owns the busy flag
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` and `commands`: the command-line front end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use qastream::{Config, Dispatcher, ServiceMode, SessionStore};
//! use qastream::notify::LogNotifier;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let store = SessionStore::new();
//!     let dispatcher = Dispatcher::from_config(&config, store.clone(), Arc::new(LogNotifier))?;
//!     let report = dispatcher.submit("What moved ACME today?", ServiceMode::Tools, None).await?;
//!     println!("{}", report.content);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod notify;
pub mod service;
pub mod session;
pub mod stream;

// Re-export commonly used types
pub use client::ServiceClient;
pub use config::Config;
pub use dispatcher::{Dispatcher, TurnPhase, TurnReport};
pub use error::{QaError, Result};
pub use service::ServiceMode;
pub use session::{Action, Message, SessionState, SessionStore};
pub use stream::{FramePolicy, ParsedEvent, Router};
