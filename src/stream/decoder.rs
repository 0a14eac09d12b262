//! Frame decoder for chunked answer streams
//!
//! Turns the byte chunks of one response body into complete text frames.
//! Frames are separated by a blank line (`\n\n`); chunk boundaries may fall
//! anywhere, including inside the delimiter or inside a multi-byte
//! character. A `data:` prefix (with or without a following space) is
//! stripped from each frame.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{QaError, Result};

/// Blank-line frame delimiter.
const FRAME_DELIMITER: &str = "\n\n";

/// SSE data field prefix.
const DATA_PREFIX: &str = "data:";

/// What to do with a delimited frame that carries no `data:` prefix
///
/// SSE servers use unprefixed lines for comments and keepalives, but some
/// backends frame plain text the same way. The trailing frame flushed at end
/// of stream is always kept, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePolicy {
    /// Drop unprefixed frames
    #[default]
    RequireDataPrefix,
    /// Forward unprefixed frames verbatim
    PassThrough,
}

impl FramePolicy {
    /// Parse a policy name as used in config files and env vars
    pub fn parse_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "require_data_prefix" | "strict" => Ok(Self::RequireDataPrefix),
            "pass_through" | "passthrough" => Ok(Self::PassThrough),
            other => Err(format!("Unknown frame policy: {}", other)),
        }
    }
}

/// Incremental UTF-8 decoder
///
/// Holds back an incomplete trailing sequence until the next chunk arrives.
/// Invalid sequences are replaced with U+FFFD instead of failing the stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
    substitutions: usize,
}

impl Utf8Decoder {
    /// Create a decoder with no pending bytes
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, returning every character that is complete so far
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut input: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            let err = QaError::Decode(format!(
                                "invalid UTF-8 sequence of {} byte(s)",
                                bad
                            ));
                            tracing::warn!("{}; substituting U+FFFD", err);
                            self.substitutions += 1;
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[bad..];
                        }
                        None => {
                            // incomplete sequence at the end of the chunk
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = input.to_vec();
        out
    }

    /// Flush the decoder at end of stream
    ///
    /// A sequence that never completed is replaced with U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let pending = std::mem::take(&mut self.pending);
        tracing::warn!(
            "{}",
            QaError::Decode(format!(
                "stream ended inside a UTF-8 sequence ({} byte(s))",
                pending.len()
            ))
        );
        self.substitutions += 1;
        String::from_utf8_lossy(&pending).into_owned()
    }

    /// Number of replacement characters emitted so far
    pub fn substitutions(&self) -> usize {
        self.substitutions
    }
}

/// Strip a leading `data:` field name, with or without one following space
///
/// # Examples
///
/// ```
/// use qastream::stream::decoder::strip_data_prefix;
///
/// assert_eq!(strip_data_prefix("data: {\"content\":\"hi\"}"), Some("{\"content\":\"hi\"}"));
/// assert_eq!(strip_data_prefix("data:raw"), Some("raw"));
/// assert_eq!(strip_data_prefix(": keepalive"), None);
/// ```
pub fn strip_data_prefix(frame: &str) -> Option<&str> {
    frame
        .strip_prefix(DATA_PREFIX)
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}

/// Stateful splitter from byte chunks to frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    policy: FramePolicy,
    dropped: usize,
}

impl FrameDecoder {
    /// Create a decoder applying `policy` to unprefixed frames
    pub fn new(policy: FramePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Feed one chunk and collect every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find(FRAME_DELIMITER) {
            let segment: String = self.buffer.drain(..pos + FRAME_DELIMITER.len()).collect();
            let segment = &segment[..pos];
            if let Some(frame) = self.accept(segment) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush the trailing text once the body has ended
    ///
    /// Servers that omit the final blank line still get their last frame
    /// delivered. The prefix is stripped when present; the frame is kept
    /// either way.
    pub fn finish(&mut self) -> Option<String> {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let rest = std::mem::take(&mut self.buffer);
        if rest.is_empty() {
            return None;
        }
        let frame = strip_data_prefix(&rest).unwrap_or(&rest);
        if frame.is_empty() {
            None
        } else {
            Some(frame.to_string())
        }
    }

    /// Number of delimited frames dropped for lacking a `data:` prefix
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Number of replacement characters substituted for invalid bytes
    pub fn substitutions(&self) -> usize {
        self.utf8.substitutions()
    }

    fn accept(&mut self, segment: &str) -> Option<String> {
        let frame = match strip_data_prefix(segment) {
            Some(payload) => payload,
            None => match self.policy {
                FramePolicy::PassThrough => segment,
                FramePolicy::RequireDataPrefix => {
                    if !segment.is_empty() {
                        tracing::debug!("Dropping unprefixed frame: {:?}", segment);
                        self.dropped += 1;
                    }
                    return None;
                }
            },
        };
        if frame.is_empty() {
            None
        } else {
            Some(frame.to_string())
        }
    }
}

struct FrameStream<S> {
    body: S,
    decoder: FrameDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

/// Adapt a response body into a lazy, one-pass stream of frames
///
/// A transport error while reading the body ends the stream with a
/// [`QaError::Generation`] item; frames completed before the error are
/// still delivered first.
pub fn frames<S, E>(body: S, policy: FramePolicy) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let state = FrameStream {
        body,
        decoder: FrameDecoder::new(policy),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.ready.pop_front() {
                return Some((Ok(frame), st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let completed = st.decoder.push(&chunk);
                    st.ready.extend(completed);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    let err = QaError::Generation(format!("response stream interrupted: {}", e));
                    return Some((Err(err.into()), st));
                }
                None => {
                    st.finished = true;
                    if let Some(frame) = st.decoder.finish() {
                        st.ready.push_back(frame);
                    }
                    if st.decoder.dropped() > 0 {
                        tracing::debug!("Dropped {} unprefixed frame(s)", st.decoder.dropped());
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]], policy: FramePolicy) -> Vec<String> {
        let mut decoder = FrameDecoder::new(policy);
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.push(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn test_single_frame_prefix_stripped() {
        let frames = decode_all(&[b"data: {\"content\":\"hi\"}\n\n"], FramePolicy::default());
        assert_eq!(frames, vec![r#"{"content":"hi"}"#]);
    }

    #[test]
    fn test_prefix_without_space() {
        let frames = decode_all(&[b"data:abc\n\n"], FramePolicy::default());
        assert_eq!(frames, vec!["abc"]);
    }

    #[test]
    fn test_every_split_point_yields_same_frames() {
        let body = "data: {\"content\":\"h\u{e9}llo\"}\n\ndata: {\"content\":\"w\u{1F600}rld\"}\n\ndata: tail\n\n";
        let bytes = body.as_bytes();
        let expected = decode_all(&[bytes], FramePolicy::default());
        assert_eq!(expected.len(), 3);

        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let got = decode_all(&[&bytes[..i], &bytes[i..j], &bytes[j..]], FramePolicy::default());
                assert_eq!(got, expected, "split at {} and {}", i, j);
            }
        }
    }

    #[test]
    fn test_delimiter_split_across_chunks() {
        let frames = decode_all(&[b"data: a\n", b"\ndata: b\n", b"\n"], FramePolicy::default());
        assert_eq!(frames, vec!["a", "b"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let snowman = "\u{2603}".as_bytes();
        let mut decoder = FrameDecoder::new(FramePolicy::default());
        assert!(decoder.push(b"data: ").is_empty());
        assert!(decoder.push(&snowman[..1]).is_empty());
        assert!(decoder.push(&snowman[1..2]).is_empty());
        let frames = decoder.push(&[&snowman[2..], b"\n\n".as_slice()].concat());
        assert_eq!(frames, vec!["\u{2603}"]);
        assert_eq!(decoder.substitutions(), 0);
    }

    #[test]
    fn test_trailing_frame_without_delimiter() {
        let frames = decode_all(&[b"data: one\n\ndata: two"], FramePolicy::default());
        assert_eq!(frames, vec!["one", "two"]);
    }

    #[test]
    fn test_trailing_unprefixed_text_is_kept() {
        let frames = decode_all(&[b"plain answer text"], FramePolicy::default());
        assert_eq!(frames, vec!["plain answer text"]);
    }

    #[test]
    fn test_unprefixed_frames_dropped_by_default() {
        let mut decoder = FrameDecoder::new(FramePolicy::RequireDataPrefix);
        let frames = decoder.push(b": keepalive\n\ndata: real\n\n");
        assert_eq!(frames, vec!["real"]);
        assert_eq!(decoder.dropped(), 1);
    }

    #[test]
    fn test_pass_through_keeps_unprefixed_frames() {
        let frames = decode_all(&[b"raw one\n\ndata: two\n\n"], FramePolicy::PassThrough);
        assert_eq!(frames, vec!["raw one", "two"]);
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let frames = decode_all(&[b"data: a\n\n\n\ndata: b\n\n"], FramePolicy::PassThrough);
        assert_eq!(frames, vec!["a", "b"]);
    }

    #[test]
    fn test_invalid_bytes_are_substituted() {
        let mut decoder = FrameDecoder::new(FramePolicy::default());
        let frames = decoder.push(b"data: a\xffb\n\n");
        assert_eq!(frames, vec!["a\u{FFFD}b"]);
        assert_eq!(decoder.substitutions(), 1);
    }

    #[test]
    fn test_truncated_sequence_at_end_is_substituted() {
        let mut decoder = FrameDecoder::new(FramePolicy::default());
        assert!(decoder.push(b"data: x\xe2\x98").is_empty());
        assert_eq!(decoder.finish(), Some("x\u{FFFD}".to_string()));
    }

    #[test]
    fn test_frame_policy_parse() {
        assert_eq!(
            FramePolicy::parse_str("pass-through").unwrap(),
            FramePolicy::PassThrough
        );
        assert_eq!(
            FramePolicy::parse_str("require_data_prefix").unwrap(),
            FramePolicy::RequireDataPrefix
        );
        assert!(FramePolicy::parse_str("lenient").is_err());
    }

    #[tokio::test]
    async fn test_frames_stream_scenario_chunks() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"content\":\"Hel")),
            Ok(Bytes::from_static(b"lo\"}\n\ndata: {\"content\":\"!\"}\n\n")),
        ];
        let collected: Vec<String> = frames(stream::iter(chunks), FramePolicy::default())
            .map(|r| r.expect("frame"))
            .collect()
            .await;
        assert_eq!(collected, vec![r#"{"content":"Hello"}"#, r#"{"content":"!"}"#]);
    }

    #[tokio::test]
    async fn test_frames_stream_error_after_complete_frames() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: one\n\ndata: par")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from_static(b"never\n\n")),
        ];
        let items: Vec<Result<String>> = frames(stream::iter(chunks), FramePolicy::default())
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "one");
        let err = items[1].as_ref().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QaError>(),
            Some(QaError::Generation(_))
        ));
    }
}
