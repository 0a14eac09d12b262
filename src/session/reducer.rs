//! Session state and its transition function
//!
//! All changes to the session go through [`reduce`], a pure function from
//! the current state and an [`Action`] to the next state. Archive and
//! history-update operations are expressed as action sequences built from
//! the current state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::types::{seed_input, GenerationToken, HistoryEntry, Message, MessagePatch, Role};

/// Everything the client knows about the conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Pending input buffer
    pub input: String,
    /// Active conversation, oldest first
    pub messages: Vec<Message>,
    /// True while a generation is in flight; gates new submissions
    pub loading: bool,
    /// Archived sessions, in archive order
    pub history: Vec<HistoryEntry>,
    /// Ids of every archived session
    pub history_ids: HashSet<String>,
    open_turn: Option<GenerationToken>,
    generations: u64,
}

impl SessionState {
    /// Token of the assistant turn currently accepting updates
    pub fn open_turn(&self) -> Option<GenerationToken> {
        self.open_turn
    }

    /// Last message of the active conversation
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Archived entry for `id`
    pub fn history_entry(&self, id: &str) -> Option<&HistoryEntry> {
        self.history.iter().find(|entry| entry.id == id)
    }
}

/// State transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Replace the pending input buffer
    SetInput(String),
    /// Replace the whole active list (normal append or history restore)
    SetMessages(Vec<Message>),
    /// Append one message; an assistant message opens a new generation
    AddMessage(Message),
    /// Merge a partial update into the last message of the open generation
    UpdateLastMessage {
        /// Generation the update belongs to
        token: GenerationToken,
        /// Fields to replace
        patch: MessagePatch,
    },
    /// Toggle the busy flag
    SetLoading(bool),
    /// Clear the active list
    ResetMessages,
    /// Replace the archive
    SetHistory(Vec<HistoryEntry>),
    /// Replace the archived id set
    SetHistoryIds(HashSet<String>),
}

impl Action {
    /// Action name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetInput(_) => "SetInput",
            Self::SetMessages(_) => "SetMessages",
            Self::AddMessage(_) => "AddMessage",
            Self::UpdateLastMessage { .. } => "UpdateLastMessage",
            Self::SetLoading(_) => "SetLoading",
            Self::ResetMessages => "ResetMessages",
            Self::SetHistory(_) => "SetHistory",
            Self::SetHistoryIds(_) => "SetHistoryIds",
        }
    }
}

/// What a transition did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The state changed
    Applied,
    /// Nothing to do (update on an empty list)
    NoOp,
    /// The update carried a token that is not the open generation
    Rejected {
        /// Open generation at the time
        expected: Option<GenerationToken>,
        /// Token carried by the update
        got: GenerationToken,
    },
}

/// Next state plus what happened
#[derive(Debug, Clone)]
pub struct Transition {
    /// State after the action
    pub state: SessionState,
    /// Effect of the action
    pub outcome: Outcome,
}

impl Transition {
    fn applied(state: SessionState) -> Self {
        Self {
            state,
            outcome: Outcome::Applied,
        }
    }
}

/// Apply `action` to `state`
///
/// # Examples
///
/// ```
/// use qastream::service::ServiceMode;
/// use qastream::session::{reduce, Action, Message, MessagePatch, SessionState};
///
/// let state = reduce(SessionState::default(), Action::AddMessage(Message::user("hi"))).state;
/// let state = reduce(state, Action::AddMessage(Message::assistant_turn(ServiceMode::Tools))).state;
/// let token = state.open_turn().unwrap();
/// let state = reduce(state, Action::UpdateLastMessage { token, patch: MessagePatch::content("hello") }).state;
/// assert_eq!(state.messages[1].content, "hello");
/// ```
pub fn reduce(mut state: SessionState, action: Action) -> Transition {
    match action {
        Action::SetInput(input) => {
            state.input = input;
            Transition::applied(state)
        }
        Action::SetMessages(messages) => {
            state.messages = messages;
            state.open_turn = None;
            Transition::applied(state)
        }
        Action::AddMessage(message) => {
            state.open_turn = if message.role == Role::Assistant {
                state.generations += 1;
                Some(GenerationToken::new(state.generations))
            } else {
                None
            };
            state.messages.push(message);
            Transition::applied(state)
        }
        Action::UpdateLastMessage { token, patch } => {
            if state.messages.is_empty() {
                return Transition {
                    state,
                    outcome: Outcome::NoOp,
                };
            }
            if state.open_turn != Some(token) {
                let outcome = Outcome::Rejected {
                    expected: state.open_turn,
                    got: token,
                };
                return Transition { state, outcome };
            }
            if let Some(last) = state.messages.last_mut() {
                last.apply(patch);
            }
            Transition::applied(state)
        }
        Action::SetLoading(loading) => {
            state.loading = loading;
            Transition::applied(state)
        }
        Action::ResetMessages => {
            state.messages.clear();
            state.open_turn = None;
            Transition::applied(state)
        }
        Action::SetHistory(history) => {
            state.history = history;
            Transition::applied(state)
        }
        Action::SetHistoryIds(ids) => {
            state.history_ids = ids;
            Transition::applied(state)
        }
    }
}

/// Actions that archive the active session under `session_id` and clear it
///
/// A session already in the archive is not added twice; the active list is
/// cleared either way. An empty id is never archived.
pub fn archive_actions(state: &SessionState, session_id: &str, now: DateTime<Utc>) -> Vec<Action> {
    let mut actions = Vec::with_capacity(3);
    if !session_id.is_empty() && !state.history_ids.contains(session_id) {
        let mut history = state.history.clone();
        history.push(HistoryEntry::snapshot(session_id, state.messages.clone(), now));
        let mut ids = state.history_ids.clone();
        ids.insert(session_id.to_string());
        actions.push(Action::SetHistory(history));
        actions.push(Action::SetHistoryIds(ids));
    }
    actions.push(Action::ResetMessages);
    actions
}

/// Action that refreshes the archived entry for `session_id` from the
/// active list, or `None` when the session was never archived
pub fn update_history_action(state: &SessionState, session_id: &str, now: DateTime<Utc>) -> Option<Action> {
    let index = state.history.iter().position(|entry| entry.id == session_id)?;
    let mut history = state.history.clone();
    let entry = &mut history[index];
    entry.input = seed_input(&state.messages);
    entry.messages = state.messages.clone();
    entry.timestamp = now;
    Some(Action::SetHistory(history))
}
