//! Serialized owner of the session state
//!
//! [`SessionStore`] is the only writer of [`SessionState`]. Every action is
//! applied through [`reduce`] while the watch channel's lock is held, so
//! transitions never interleave; renderers subscribe and observe snapshots.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;

use super::reducer::{archive_actions, reduce, update_history_action, Action, Outcome, SessionState};
use super::types::{GenerationToken, Message, MessagePatch};
use crate::error::{QaError, Result};
use crate::service::ServiceMode;

/// Shared handle to the session state
#[derive(Debug, Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store holding an empty session
    pub fn new() -> Self {
        Self::with_state(SessionState::default())
    }

    /// Create a store holding `state`
    pub fn with_state(state: SessionState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { state: Arc::new(tx) }
    }

    /// Apply one action
    pub fn dispatch(&self, action: Action) -> Outcome {
        self.dispatch_with(|_| vec![action])
            .pop()
            .unwrap_or(Outcome::NoOp)
    }

    /// Build actions from the current state and apply them as one step
    ///
    /// No other action can be applied between the ones returned by `build`.
    pub fn dispatch_with<F>(&self, build: F) -> Vec<Outcome>
    where
        F: FnOnce(&SessionState) -> Vec<Action>,
    {
        let mut outcomes = Vec::new();
        self.state.send_modify(|state| {
            for action in build(state) {
                let name = action.name();
                let transition = reduce(std::mem::take(state), action);
                *state = transition.state;
                tracing::trace!(action = name, outcome = ?transition.outcome, "Applied action");
                outcomes.push(transition.outcome);
            }
        });
        outcomes
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified after every applied action
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Whether a generation is in flight
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Append a user message
    pub fn push_user_message(&self, content: impl Into<String>) {
        self.dispatch(Action::AddMessage(Message::user(content)));
    }

    /// Open an empty assistant turn for `service` and return its token
    pub fn open_turn(&self, service: ServiceMode) -> Result<GenerationToken> {
        let mut token = None;
        self.state.send_modify(|state| {
            let transition = reduce(
                std::mem::take(state),
                Action::AddMessage(Message::assistant_turn(service)),
            );
            *state = transition.state;
            token = state.open_turn();
        });
        token.ok_or_else(|| QaError::Generation("assistant turn was not opened".to_string()).into())
    }

    /// Merge `patch` into the open turn identified by `token`
    ///
    /// An empty conversation is a silent no-op; a token that is not the
    /// open turn yields [`QaError::StaleGeneration`].
    pub fn update_last_message(&self, token: GenerationToken, patch: MessagePatch) -> Result<()> {
        match self.dispatch(Action::UpdateLastMessage { token, patch }) {
            Outcome::Applied | Outcome::NoOp => Ok(()),
            Outcome::Rejected { expected, got } => {
                tracing::warn!("Rejected update for {} (open turn: {:?})", got, expected);
                Err(QaError::StaleGeneration { expected, got }.into())
            }
        }
    }

    /// Archive the active session under `session_id` and clear it
    ///
    /// Returns `true` when a new history entry was created.
    pub fn archive_session(&self, session_id: &str) -> bool {
        let now = Utc::now();
        let outcomes = self.dispatch_with(|state| archive_actions(state, session_id, now));
        let archived = outcomes.len() > 1;
        if archived {
            tracing::info!("Archived session {}", session_id);
        } else {
            tracing::debug!("Session {} already archived; cleared active list", session_id);
        }
        archived
    }

    /// Refresh the archived entry of `session_id` from the active list
    ///
    /// Returns `false` when the session has never been archived.
    pub fn update_history(&self, session_id: &str) -> bool {
        let now = Utc::now();
        let outcomes =
            self.dispatch_with(|state| update_history_action(state, session_id, now).into_iter().collect());
        !outcomes.is_empty()
    }

    /// Load the archived session `session_id` into the active list
    ///
    /// Returns `false` when no such entry exists.
    pub fn restore(&self, session_id: &str) -> bool {
        let outcomes = self.dispatch_with(|state| {
            state
                .history_entry(session_id)
                .map(|entry| Action::SetMessages(entry.messages.clone()))
                .into_iter()
                .collect()
        });
        !outcomes.is_empty()
    }
}
