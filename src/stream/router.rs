//! Payload classification
//!
//! Each backend encodes its answers differently: most send JSON objects
//! with `content` or `citations`, while the document-retrieval backend may
//! still stream raw text. The [`Router`] keeps one [`PayloadStrategy`] per
//! [`ServiceMode`] so the formats stay isolated from each other.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::QaError;
use crate::service::ServiceMode;
use crate::session::Reference;

/// Classified frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    /// Incremental answer text
    ContentDelta {
        /// Fragment to append
        text: String,
    },
    /// Sources for the current answer
    CitationBatch {
        /// Ordered references
        references: Vec<Reference>,
    },
    /// Anything else; dropped by the dispatcher
    Unknown {
        /// Frame text as received
        raw: String,
    },
}

/// Decoding strategy for one backend's frame payloads
pub trait PayloadStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Classify one stripped frame
    fn classify(&self, frame: &str) -> ParsedEvent;
}

/// Classify a frame as a JSON payload object
///
/// Returns [`QaError::Parse`] when the frame is not a JSON object, leaving
/// the fallback decision to the strategy.
pub fn classify_json(frame: &str) -> Result<ParsedEvent, QaError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| QaError::Parse(format!("invalid JSON payload: {}", e)))?;
    let Value::Object(mut fields) = value else {
        return Err(QaError::Parse("payload is not a JSON object".to_string()));
    };

    if let Some(citations) = fields.remove("citations") {
        match serde_json::from_value::<Vec<Reference>>(citations) {
            Ok(references) => return Ok(ParsedEvent::CitationBatch { references }),
            Err(e) => tracing::warn!("Ignoring malformed citations field: {}", e),
        }
    }

    if let Some(Value::String(text)) = fields.remove("content") {
        return Ok(ParsedEvent::ContentDelta { text });
    }

    if let Some(Value::String(message)) = fields.get("error") {
        tracing::warn!("Backend reported an error in stream: {}", message);
    }

    Ok(ParsedEvent::Unknown {
        raw: frame.to_string(),
    })
}

/// Strict JSON: frames that do not parse are dropped
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPayload;

impl PayloadStrategy for JsonPayload {
    fn name(&self) -> &'static str {
        "json"
    }

    fn classify(&self, frame: &str) -> ParsedEvent {
        classify_json(frame).unwrap_or_else(|e| {
            tracing::debug!("{}; dropping frame", e);
            ParsedEvent::Unknown {
                raw: frame.to_string(),
            }
        })
    }
}

/// JSON with a raw-text fallback for legacy plain-text backends
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonOrRawText;

impl PayloadStrategy for JsonOrRawText {
    fn name(&self) -> &'static str {
        "json-or-raw-text"
    }

    fn classify(&self, frame: &str) -> ParsedEvent {
        classify_json(frame).unwrap_or_else(|e| {
            tracing::debug!("{}; treating frame as raw answer text", e);
            ParsedEvent::ContentDelta {
                text: frame.to_string(),
            }
        })
    }
}

/// Strategy table keyed by service mode
#[derive(Debug, Clone)]
pub struct Router {
    strategies: HashMap<ServiceMode, Arc<dyn PayloadStrategy>>,
    fallback: Arc<dyn PayloadStrategy>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Router with the stock table: raw-text fallback for document
    /// retrieval, strict JSON everywhere else
    pub fn new() -> Self {
        let mut strategies: HashMap<ServiceMode, Arc<dyn PayloadStrategy>> = HashMap::new();
        strategies.insert(ServiceMode::Rag, Arc::new(JsonOrRawText));
        strategies.insert(ServiceMode::Tools, Arc::new(JsonPayload));
        strategies.insert(ServiceMode::Search, Arc::new(JsonPayload));
        Self {
            strategies,
            fallback: Arc::new(JsonPayload),
        }
    }

    /// Replace the strategy used for `mode`
    pub fn with_strategy(mut self, mode: ServiceMode, strategy: Arc<dyn PayloadStrategy>) -> Self {
        self.strategies.insert(mode, strategy);
        self
    }

    /// Strategy applied to frames of `mode`
    pub fn strategy_for(&self, mode: ServiceMode) -> &dyn PayloadStrategy {
        self.strategies
            .get(&mode)
            .map(|s| s.as_ref())
            .unwrap_or_else(|| self.fallback.as_ref())
    }

    /// Classify one frame received from a `mode` backend
    ///
    /// # Examples
    ///
    /// ```
    /// use qastream::service::ServiceMode;
    /// use qastream::stream::{ParsedEvent, Router};
    ///
    /// let router = Router::new();
    /// let event = router.route(ServiceMode::Rag, "plain answer text");
    /// assert_eq!(event, ParsedEvent::ContentDelta { text: "plain answer text".into() });
    ///
    /// let event = router.route(ServiceMode::Tools, "plain answer text");
    /// assert!(matches!(event, ParsedEvent::Unknown { .. }));
    /// ```
    pub fn route(&self, mode: ServiceMode, frame: &str) -> ParsedEvent {
        let event = self.strategy_for(mode).classify(frame);
        tracing::trace!(mode = %mode, ?event, "Routed frame");
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_frame() {
        let event = classify_json(r#"{"content":"Hel"}"#).unwrap();
        assert_eq!(
            event,
            ParsedEvent::ContentDelta {
                text: "Hel".to_string()
            }
        );
    }

    #[test]
    fn test_citation_frame() {
        let event = classify_json(r#"{"citations":[{"title":"Doc A","citation":"p.3"}]}"#).unwrap();
        assert_eq!(
            event,
            ParsedEvent::CitationBatch {
                references: vec![Reference::new("Doc A", "p.3")]
            }
        );
    }

    #[test]
    fn test_citations_take_precedence_over_content() {
        let event =
            classify_json(r#"{"content":"x","citations":[{"title":"t","citation":"https://a"}]}"#)
                .unwrap();
        assert!(matches!(event, ParsedEvent::CitationBatch { .. }));
    }

    #[test]
    fn test_malformed_citations_fall_back_to_content() {
        let event = classify_json(r#"{"citations":"nope","content":"text"}"#).unwrap();
        assert_eq!(
            event,
            ParsedEvent::ContentDelta {
                text: "text".to_string()
            }
        );
    }

    #[test]
    fn test_json_without_known_fields_is_unknown() {
        let event = classify_json(r#"{"error":"upstream failed"}"#).unwrap();
        assert!(matches!(event, ParsedEvent::Unknown { .. }));
    }

    #[test]
    fn test_non_object_json_is_parse_error() {
        assert!(matches!(classify_json("42"), Err(QaError::Parse(_))));
        assert!(matches!(classify_json("not json"), Err(QaError::Parse(_))));
    }

    #[test]
    fn test_rag_falls_back_to_raw_text() {
        let router = Router::new();
        assert_eq!(
            router.route(ServiceMode::Rag, "plain answer text"),
            ParsedEvent::ContentDelta {
                text: "plain answer text".to_string()
            }
        );
    }

    #[test]
    fn test_rag_json_without_fields_stays_unknown() {
        let router = Router::new();
        let event = router.route(ServiceMode::Rag, r#"{"status":"ok"}"#);
        assert!(matches!(event, ParsedEvent::Unknown { .. }));
    }

    #[test]
    fn test_other_modes_drop_raw_text() {
        let router = Router::new();
        for mode in [ServiceMode::Tools, ServiceMode::Search] {
            assert_eq!(
                router.route(mode, "plain answer text"),
                ParsedEvent::Unknown {
                    raw: "plain answer text".to_string()
                }
            );
        }
    }

    #[test]
    fn test_strategy_table_names() {
        let router = Router::new();
        assert_eq!(router.strategy_for(ServiceMode::Rag).name(), "json-or-raw-text");
        assert_eq!(router.strategy_for(ServiceMode::Tools).name(), "json");
        assert_eq!(router.strategy_for(ServiceMode::Search).name(), "json");
    }

    #[test]
    fn test_with_strategy_overrides_mode() {
        let router = Router::new().with_strategy(ServiceMode::Search, Arc::new(JsonOrRawText));
        assert_eq!(
            router.route(ServiceMode::Search, "raw"),
            ParsedEvent::ContentDelta {
                text: "raw".to_string()
            }
        );
    }
}
