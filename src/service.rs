//! Backend service modes
//!
//! Each answer-generation backend sits behind its own gateway endpoint:
//! - Document retrieval (`rag`): answers grounded in uploaded documents
//! - Tool invocation (`tools`): stock tools exposed over MCP
//! - Web search (`search`): answers from live web results

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway route for file uploads
pub const UPLOAD_PATH: &str = "/v1/api/file-upload";

/// Gateway route for the health probe
pub const HEALTH_PATH: &str = "/";

/// Backend service selected for a generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    /// Document retrieval over uploaded files
    ///
    /// Older deployments of this backend stream raw text instead of JSON
    /// frames, so unparseable frames are kept as answer text.
    Rag,

    /// Tool invocation through the stock MCP server
    Tools,

    /// Web search agent
    Search,
}

impl fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServiceMode {
    /// All modes, in menu order
    pub const ALL: [ServiceMode; 3] = [ServiceMode::Rag, ServiceMode::Tools, ServiceMode::Search];

    /// Parse a service mode from a string
    ///
    /// Accepts the short tags as well as descriptive aliases.
    ///
    /// # Examples
    ///
    /// ```
    /// use qastream::service::ServiceMode;
    ///
    /// assert_eq!(ServiceMode::parse_str("rag").unwrap(), ServiceMode::Rag);
    /// assert_eq!(ServiceMode::parse_str("web-search").unwrap(), ServiceMode::Search);
    /// assert!(ServiceMode::parse_str("chat").is_err());
    /// ```
    pub fn parse_str(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "rag" | "documents" | "document-retrieval" => Ok(Self::Rag),
            "tools" | "stocks" | "tool-invocation" => Ok(Self::Tools),
            "search" | "web" | "web-search" => Ok(Self::Search),
            other => Err(format!("Unknown service mode: {}", other)),
        }
    }

    /// Short tag used in config files, requests and message service tags
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Tools => "tools",
            Self::Search => "search",
        }
    }

    /// Gateway route answering questions for this mode
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Rag => "/v1/api/rag",
            Self::Tools => "/v1/api/stocks",
            Self::Search => "/v1/api/search",
        }
    }

    /// Get a user-friendly description of this mode
    pub fn description(&self) -> &'static str {
        match self {
            Self::Rag => "Question answering over uploaded documents",
            Self::Tools => "Company background and prices through stock tools",
            Self::Search => "Answers retrieved directly from the web",
        }
    }

    /// Get a colored tag representation of this mode
    pub fn colored_tag(&self) -> String {
        match self {
            Self::Rag => format!("[{}]", "RAG".purple()),
            Self::Tools => format!("[{}]", "TOOLS".green()),
            Self::Search => format!("[{}]", "SEARCH".cyan()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_tags() {
        assert_eq!(ServiceMode::parse_str("rag").unwrap(), ServiceMode::Rag);
        assert_eq!(ServiceMode::parse_str("tools").unwrap(), ServiceMode::Tools);
        assert_eq!(
            ServiceMode::parse_str("search").unwrap(),
            ServiceMode::Search
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(ServiceMode::parse_str(" RAG ").unwrap(), ServiceMode::Rag);
        assert_eq!(
            ServiceMode::parse_str("Tool-Invocation").unwrap(),
            ServiceMode::Tools
        );
    }

    #[test]
    fn test_parse_unknown_mode() {
        let err = ServiceMode::parse_str("chat").unwrap_err();
        assert!(err.contains("chat"));
    }

    #[test]
    fn test_endpoint_mapping() {
        assert_eq!(ServiceMode::Rag.endpoint(), "/v1/api/rag");
        assert_eq!(ServiceMode::Tools.endpoint(), "/v1/api/stocks");
        assert_eq!(ServiceMode::Search.endpoint(), "/v1/api/search");
    }

    #[test]
    fn test_display_matches_tag() {
        for mode in ServiceMode::ALL {
            assert_eq!(mode.to_string(), mode.as_str());
            assert_eq!(ServiceMode::parse_str(mode.as_str()).unwrap(), mode);
        }
    }

    #[test]
    fn test_serde_uses_short_tag() {
        let yaml = serde_yaml::to_string(&ServiceMode::Search).unwrap();
        assert!(yaml.contains("search"));
        let mode: ServiceMode = serde_yaml::from_str("rag").unwrap();
        assert_eq!(mode, ServiceMode::Rag);
    }

    #[test]
    fn test_colored_tag_contains_name() {
        assert!(ServiceMode::Tools.colored_tag().contains("TOOLS"));
    }
}
