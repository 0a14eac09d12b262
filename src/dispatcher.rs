//! Turn dispatcher
//!
//! Drives one generation end to end: connect to the service for the
//! selected mode, open an assistant turn, then feed frames through the
//! router and the accumulator into the session store until the body ends.
//!
//! The busy flag is owned by a guard for the whole turn. It is cleared on
//! success, on every error path, and when the caller drops the turn future
//! mid-stream; dropping the future also drops the response body and closes
//! the connection.
//!
//! Partial answers are never rolled back: when the stream breaks, whatever
//! was delivered stays in the conversation and the failure is reported.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;

use crate::client::ServiceClient;
use crate::config::{Config, StreamConfig};
use crate::error::{QaError, Result};
use crate::notify::Notifier;
use crate::service::ServiceMode;
use crate::session::{Action, GenerationToken, MessagePatch, SessionStore};
use crate::stream::{frames, ContentAccumulator, FramePolicy, ParsedEvent, Router};

/// Notification title for a completed turn
pub const SUCCESS_TITLE: &str = "Answer Generation Successful";

/// Notification title for a failed turn
pub const FAILURE_TITLE: &str = "Answer Generation Failed";

/// Lifecycle of one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn has run yet, or the last one was abandoned
    Idle,
    /// Submission accepted
    Dispatched,
    /// Waiting for the service to answer
    Connecting,
    /// Receiving frames
    Streaming,
    /// Body ended normally
    Completed,
    /// No usable response was obtained
    ConnectionFailed,
    /// The body broke off or an update was rejected
    StreamError,
}

impl TurnPhase {
    /// Whether the turn has ended
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Completed | Self::ConnectionFailed | Self::StreamError
        )
    }

    /// Whether `next` is a legal successor of this phase
    pub fn can_advance_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Idle | Completed | ConnectionFailed | StreamError, Dispatched)
                | (Dispatched, Connecting)
                | (Connecting, Streaming | ConnectionFailed)
                | (Streaming, Completed | StreamError)
                | (Dispatched | Connecting | Streaming, Idle)
        )
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Dispatched => "dispatched",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::ConnectionFailed => "connection-failed",
            Self::StreamError => "stream-error",
        };
        f.write_str(name)
    }
}

/// Summary of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// Generation that received the answer
    pub token: GenerationToken,
    /// Service that answered
    pub mode: ServiceMode,
    /// Frames received
    pub frames: usize,
    /// Content deltas appended
    pub deltas: usize,
    /// Citation batches received
    pub citation_batches: usize,
    /// Frames that were not recognized
    pub unknown: usize,
    /// Final answer text
    pub content: String,
}

/// Holds the busy flag for the duration of a turn
struct BusyGuard<'a> {
    store: &'a SessionStore,
    phase: &'a watch::Sender<TurnPhase>,
}

impl<'a> BusyGuard<'a> {
    fn acquire(store: &'a SessionStore, phase: &'a watch::Sender<TurnPhase>) -> Result<Self> {
        let outcomes = store.dispatch_with(|state| {
            if state.loading {
                Vec::new()
            } else {
                vec![Action::SetLoading(true)]
            }
        });
        if outcomes.is_empty() {
            tracing::warn!("Rejected submission while a generation is in progress");
            return Err(QaError::Busy.into());
        }
        Ok(Self { store, phase })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let current = *self.phase.borrow();
        if !current.is_terminal() {
            tracing::warn!("Turn abandoned while {}", current);
            self.phase.send_replace(TurnPhase::Idle);
        }
        self.store.dispatch_with(|_| {
            vec![Action::SetLoading(false), Action::SetInput(String::new())]
        });
        tracing::debug!("Busy flag cleared");
    }
}

/// Runs generations against the gateway and records them in the session
pub struct Dispatcher {
    client: ServiceClient,
    store: SessionStore,
    router: Router,
    notifier: Arc<dyn Notifier>,
    pacing: Duration,
    frame_policy: FramePolicy,
    phase: watch::Sender<TurnPhase>,
    last_error: Mutex<Option<String>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("client", &self.client)
            .field("router", &self.router)
            .field("pacing", &self.pacing)
            .field("frame_policy", &self.frame_policy)
            .field("phase", &*self.phase.borrow())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher writing into `store`
    pub fn new(
        client: ServiceClient,
        store: SessionStore,
        notifier: Arc<dyn Notifier>,
        stream: &StreamConfig,
    ) -> Self {
        let (phase, _) = watch::channel(TurnPhase::Idle);
        Self {
            client,
            store,
            router: Router::new(),
            notifier,
            pacing: stream.pacing(),
            frame_policy: stream.frame_policy,
            phase,
            last_error: Mutex::new(None),
        }
    }

    /// Create a dispatcher from the full configuration
    pub fn from_config(config: &Config, store: SessionStore, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let client = ServiceClient::from_config(config)?;
        Ok(Self::new(client, store, notifier, &config.stream))
    }

    /// Replace the payload strategy table
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Session store this dispatcher writes to
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Underlying gateway client
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    /// Phase of the current or most recent turn
    pub fn phase(&self) -> TurnPhase {
        *self.phase.borrow()
    }

    /// Receiver notified on every phase change
    pub fn subscribe_phase(&self) -> watch::Receiver<TurnPhase> {
        self.phase.subscribe()
    }

    /// Error message of the most recent failed turn
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Submit `question` to the `mode` service and stream the answer into
    /// the session
    ///
    /// # Errors
    ///
    /// Returns [`QaError::Busy`] without touching the session when another
    /// turn is in flight. Otherwise any connection or streaming failure is
    /// returned after the busy flag has been cleared and a failure
    /// notification has been sent.
    pub async fn submit(
        &self,
        question: &str,
        mode: ServiceMode,
        chat_id: Option<&str>,
    ) -> Result<TurnReport> {
        let guard = BusyGuard::acquire(&self.store, &self.phase)?;
        self.set_phase(TurnPhase::Dispatched);
        tracing::info!(mode = %mode, "Submitting question");
        self.store.push_user_message(question);

        let result = self.run_turn(question, mode, chat_id).await;
        drop(guard);

        match &result {
            Ok(report) => {
                tracing::info!(
                    mode = %mode,
                    frames = report.frames,
                    deltas = report.deltas,
                    citations = report.citation_batches,
                    "Turn completed"
                );
                self.record_error(None);
                self.notifier.notify(SUCCESS_TITLE, None);
            }
            Err(e) => {
                tracing::error!(mode = %mode, "Turn failed: {}", e);
                let message = e.to_string();
                self.record_error(Some(message.clone()));
                self.notifier.notify(FAILURE_TITLE, Some(&message));
            }
        }
        result
    }

    async fn run_turn(
        &self,
        question: &str,
        mode: ServiceMode,
        chat_id: Option<&str>,
    ) -> Result<TurnReport> {
        self.set_phase(TurnPhase::Connecting);
        let body = match self.client.open_stream(question, mode, chat_id).await {
            Ok(body) => body,
            Err(e) => {
                self.set_phase(TurnPhase::ConnectionFailed);
                return Err(e);
            }
        };

        let token = self.store.open_turn(mode)?;
        self.set_phase(TurnPhase::Streaming);
        tracing::debug!("Opened assistant turn {}", token);

        let mut accumulator = ContentAccumulator::new(token, self.pacing);
        let mut report = TurnReport {
            token,
            mode,
            frames: 0,
            deltas: 0,
            citation_batches: 0,
            unknown: 0,
            content: String::new(),
        };

        let frames = frames(body, self.frame_policy);
        tokio::pin!(frames);

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    self.set_phase(TurnPhase::StreamError);
                    return Err(e);
                }
            };
            report.frames += 1;

            if let Err(e) = self.deliver(mode, &frame, &mut accumulator, &mut report).await {
                self.set_phase(TurnPhase::StreamError);
                return Err(e);
            }
        }

        self.set_phase(TurnPhase::Completed);
        report.content = accumulator.text().to_string();
        Ok(report)
    }

    async fn deliver(
        &self,
        mode: ServiceMode,
        frame: &str,
        accumulator: &mut ContentAccumulator,
        report: &mut TurnReport,
    ) -> Result<()> {
        match self.router.route(mode, frame) {
            ParsedEvent::ContentDelta { text } => {
                let patch = accumulator.append(&text).await;
                self.store
                    .update_last_message(accumulator.token(), patch)?;
                report.deltas += 1;
            }
            ParsedEvent::CitationBatch { references } => {
                report.citation_batches += 1;
                tracing::debug!("Received {} reference(s)", references.len());
                if !references.is_empty() {
                    self.store
                        .update_last_message(accumulator.token(), MessagePatch::references(references))?;
                }
            }
            ParsedEvent::Unknown { raw } => {
                report.unknown += 1;
                tracing::debug!("Dropping unrecognized frame: {:?}", raw);
            }
        }
        Ok(())
    }

    fn set_phase(&self, next: TurnPhase) {
        let current = *self.phase.borrow();
        if !current.can_advance_to(next) {
            tracing::warn!("Unexpected turn transition {} -> {}", current, next);
        }
        tracing::debug!("Turn {} -> {}", current, next);
        self.phase.send_replace(next);
    }

    fn record_error(&self, error: Option<String>) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_happy_path_transitions() {
        use TurnPhase::*;
        assert!(Idle.can_advance_to(Dispatched));
        assert!(Dispatched.can_advance_to(Connecting));
        assert!(Connecting.can_advance_to(Streaming));
        assert!(Streaming.can_advance_to(Completed));
        assert!(Completed.can_advance_to(Dispatched));
    }

    #[test]
    fn test_phase_escape_edges() {
        use TurnPhase::*;
        assert!(Connecting.can_advance_to(ConnectionFailed));
        assert!(Streaming.can_advance_to(StreamError));
        assert!(!Connecting.can_advance_to(Completed));
        assert!(!Idle.can_advance_to(Streaming));
        assert!(!Streaming.can_advance_to(ConnectionFailed));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(TurnPhase::Completed.is_terminal());
        assert!(TurnPhase::StreamError.is_terminal());
        assert!(!TurnPhase::Streaming.is_terminal());
        assert_eq!(TurnPhase::ConnectionFailed.to_string(), "connection-failed");
    }

    #[test]
    fn test_busy_guard_rejects_second_acquire_and_clears() {
        let store = SessionStore::new();
        let (phase, _) = watch::channel(TurnPhase::Idle);
        store.dispatch(Action::SetInput("draft".into()));
        {
            let _guard = BusyGuard::acquire(&store, &phase).unwrap();
            assert!(store.is_loading());
            let err = BusyGuard::acquire(&store, &phase).err().expect("busy");
            assert!(matches!(err.downcast_ref::<QaError>(), Some(QaError::Busy)));
            assert!(store.is_loading());
        }
        let state = store.snapshot();
        assert!(!state.loading);
        assert!(state.input.is_empty());
    }

    #[test]
    fn test_busy_guard_resets_abandoned_phase() {
        let store = SessionStore::new();
        let (phase, _) = watch::channel(TurnPhase::Idle);
        {
            let _guard = BusyGuard::acquire(&store, &phase).unwrap();
            phase.send_replace(TurnPhase::Streaming);
        }
        assert_eq!(*phase.borrow(), TurnPhase::Idle);
    }
}
