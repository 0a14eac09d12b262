//! Session state machine
//!
//! - `types`: messages, references, history entries, generation tokens
//! - `reducer`: the pure transition function and archive helpers
//! - `store`: the serialized owner of the state that everything else talks to

pub mod reducer;
pub mod store;
pub mod types;

pub use reducer::{archive_actions, reduce, update_history_action, Action, Outcome, SessionState, Transition};
pub use store::SessionStore;
pub use types::{seed_input, GenerationToken, HistoryEntry, Message, MessagePatch, Reference, Role};
