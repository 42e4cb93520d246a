use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error taxonomy tag carried by every `CrawlError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    #[serde(rename = "FetchError")]
    Fetch,
    #[serde(rename = "RenderError")]
    Render,
    #[serde(rename = "SummarizationError")]
    Summarization,
    #[serde(rename = "PlanningError")]
    Planning,
    #[serde(rename = "TransportError")]
    Transport,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "ValidationError")]
    Validation,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Fetch => "FetchError",
            ErrorType::Render => "RenderError",
            ErrorType::Summarization => "SummarizationError",
            ErrorType::Planning => "PlanningError",
            ErrorType::Transport => "TransportError",
            ErrorType::Timeout => "TimeoutError",
            ErrorType::Validation => "ValidationError",
        }
    }

    /// Per-node errors end one branch; the crawl carries on
    pub fn is_per_node(&self) -> bool {
        matches!(
            self,
            ErrorType::Fetch | ErrorType::Render | ErrorType::Summarization | ErrorType::Planning
        )
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a page could not be loaded
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error("navigation to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("timed out loading {url}")]
    Timeout { url: String },

    #[error("{url} is not an HTML page ({content_type})")]
    NotHtml { url: String, content_type: String },

    #[error("page {url} did not finish rendering: {reason}")]
    Render { url: String, reason: String },

    #[error("no browser session available: {0}")]
    Session(String),

    #[error("cannot perform action '{key}': {reason}")]
    Unsupported { key: String, reason: String },
}

impl FetchFailure {
    pub fn error_type(&self) -> ErrorType {
        match self {
            FetchFailure::Render { .. } => ErrorType::Render,
            _ => ErrorType::Fetch,
        }
    }
}

/// Failure talking to the language model
#[derive(Debug, Error)]
pub enum LlmFailure {
    #[error("language model request failed: {0}")]
    Request(String),

    #[error("language model returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model timed out")]
    Timeout,

    #[error("language model returned an empty reply")]
    EmptyReply,

    #[error("language model is not configured: {0}")]
    NotConfigured(String),
}

/// Failure producing a page summary
#[derive(Debug, Error)]
pub enum SummaryFailure {
    #[error(transparent)]
    Llm(#[from] LlmFailure),

    #[error("summary was empty")]
    Empty,
}

/// Failure producing an action plan
#[derive(Debug, Error)]
pub enum PlanFailure {
    #[error(transparent)]
    Llm(#[from] LlmFailure),

    #[error("could not parse plan: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_maps_to_taxonomy() {
        let render = FetchFailure::Render {
            url: "https://a.test".to_string(),
            reason: "readyState stuck".to_string(),
        };
        assert_eq!(render.error_type(), ErrorType::Render);

        let timeout = FetchFailure::Timeout {
            url: "https://a.test".to_string(),
        };
        assert_eq!(timeout.error_type(), ErrorType::Fetch);
        assert_eq!(timeout.to_string(), "timed out loading https://a.test");
    }

    #[test]
    fn test_per_node_classification() {
        assert!(ErrorType::Planning.is_per_node());
        assert!(ErrorType::Render.is_per_node());
        assert!(!ErrorType::Timeout.is_per_node());
        assert!(!ErrorType::Validation.is_per_node());
        assert_eq!(ErrorType::Summarization.to_string(), "SummarizationError");
    }
}
