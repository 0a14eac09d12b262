//! Paced content accumulation
//!
//! Concatenates content deltas in arrival order for a single generation and
//! hands back the cumulative text after a fixed pacing delay, which gives
//! the typing effect. Deltas are not deduplicated: a repeated delta is
//! appended twice.

use std::time::Duration;

use crate::session::{GenerationToken, MessagePatch};

/// Default delay between delivered updates
pub const DEFAULT_PACING: Duration = Duration::from_millis(30);

/// Running answer text for one generation
#[derive(Debug)]
pub struct ContentAccumulator {
    token: GenerationToken,
    text: String,
    pacing: Duration,
    deltas: usize,
}

impl ContentAccumulator {
    /// Start accumulating for the turn identified by `token`
    pub fn new(token: GenerationToken, pacing: Duration) -> Self {
        Self {
            token,
            text: String::new(),
            pacing,
            deltas: 0,
        }
    }

    /// Generation this accumulator belongs to
    pub fn token(&self) -> GenerationToken {
        self.token
    }

    /// Append a delta without waiting and return the cumulative text
    pub fn push(&mut self, delta: &str) -> &str {
        self.text.push_str(delta);
        self.deltas += 1;
        &self.text
    }

    /// Append a delta, wait out the pacing delay, and return the update to
    /// deliver for the last message
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use qastream::session::{GenerationToken, MessagePatch};
    /// use qastream::stream::ContentAccumulator;
    ///
    /// # tokio_test::block_on(async {
    /// let mut acc = ContentAccumulator::new(GenerationToken::new(1), Duration::ZERO);
    /// acc.append("Hel").await;
    /// let patch = acc.append("lo").await;
    /// assert_eq!(patch, MessagePatch::content("Hello"));
    /// # });
    /// ```
    pub async fn append(&mut self, delta: &str) -> MessagePatch {
        self.push(delta);
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        MessagePatch::content(self.text.clone())
    }

    /// Cumulative text so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of deltas appended
    pub fn deltas(&self) -> usize {
        self.deltas
    }
}
