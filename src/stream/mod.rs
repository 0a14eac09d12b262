//! Streaming pipeline: bytes to frames, frames to events, events to text
//!
//! - `decoder`: incremental UTF-8 decoding and blank-line framing
//! - `router`: per-service payload classification
//! - `accumulator`: ordered, paced concatenation of content deltas

pub mod accumulator;
pub mod decoder;
pub mod router;

pub use accumulator::{ContentAccumulator, DEFAULT_PACING};
pub use decoder::{frames, FrameDecoder, FramePolicy};
pub use router::{JsonOrRawText, JsonPayload, ParsedEvent, PayloadStrategy, Router};
