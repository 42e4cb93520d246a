use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

use crate::errors::ErrorType;

/// Deepest crawl depth a request may ask for
pub const MAX_CRAWL_DEPTH: u32 = 6;

/// A crawl submission as received from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// URL the crawl starts from
    pub start_url: String,

    /// What the user wants to find out
    pub user_instruction: String,

    /// Maximum depth below the start page, clamped to `0..=6`
    #[serde(deserialize_with = "clamped_depth")]
    pub max_depth: u32,
}

fn clamped_depth<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(clamp_depth(raw))
}

/// Clamps any requested depth into the supported range
pub fn clamp_depth(raw: i64) -> u32 {
    raw.clamp(0, MAX_CRAWL_DEPTH as i64) as u32
}

/// A request that passed validation and is safe to hand to the engine
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub start_url: Url,
    pub user_instruction: String,
    pub max_depth: u32,
}

impl CrawlRequest {
    /// Create a request, clamping the depth
    pub fn new(start_url: &str, user_instruction: &str, max_depth: i64) -> Self {
        Self {
            start_url: start_url.to_string(),
            user_instruction: user_instruction.to_string(),
            max_depth: clamp_depth(max_depth),
        }
    }

    /// Check the request before any crawl work begins
    pub fn validate(&self) -> Result<ValidatedRequest, CrawlError> {
        let start_url = Url::parse(self.start_url.trim()).map_err(|e| {
            CrawlError::new(
                ErrorType::Validation,
                format!("start_url is not a valid URL: {}", e),
            )
            .with_detail("url", self.start_url.as_str())
        })?;

        if !matches!(start_url.scheme(), "http" | "https") {
            return Err(CrawlError::new(
                ErrorType::Validation,
                format!("unsupported URL scheme '{}'", start_url.scheme()),
            )
            .with_detail("url", self.start_url.as_str()));
        }

        let instruction = self.user_instruction.trim();
        if instruction.is_empty() {
            return Err(CrawlError::new(
                ErrorType::Validation,
                "user_instruction must not be empty",
            ));
        }

        Ok(ValidatedRequest {
            start_url,
            user_instruction: instruction.to_string(),
            max_depth: self.max_depth.min(MAX_CRAWL_DEPTH),
        })
    }
}

/// Snapshot of a fetched page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDetails {
    pub url: String,
    pub title: String,
    pub body_text: String,
}

/// Back-reference to the navigation that produced a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAction {
    pub url: String,
    pub action_key: String,
}

/// What the planner wants done with a page element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Stop,
}

/// A candidate or taken action on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageActionDetailed {
    pub action: ActionKind,

    /// Key of the element the action applies to (empty for `stop`)
    #[serde(default)]
    pub target: String,

    /// Why the model chose this action
    #[serde(default)]
    pub reason: String,

    /// Sub-goal the action serves
    #[serde(default)]
    pub goal: String,
}

impl PageActionDetailed {
    pub fn click(target: &str, reason: &str, goal: &str) -> Self {
        Self {
            action: ActionKind::Click,
            target: target.to_string(),
            reason: reason.to_string(),
            goal: goal.to_string(),
        }
    }

    pub fn stop(reason: &str) -> Self {
        Self {
            action: ActionKind::Stop,
            target: String::new(),
            reason: reason.to_string(),
            goal: String::new(),
        }
    }

    pub fn is_stop(&self) -> bool {
        self.action == ActionKind::Stop
    }
}

/// One visited node of the crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Distance from the start page (0 = start page)
    pub depth: u32,

    pub details: PageDetails,

    /// `None` only for the start page
    pub prev_page_action: Option<PageAction>,

    pub summary: String,

    /// Actions the planner proposed for this page, in planner order
    pub actions: Vec<PageActionDetailed>,

    /// Action keys already explored from this page
    pub visited_keys: BTreeSet<String>,
}

impl HistoryEntry {
    pub fn new(depth: u32, details: PageDetails, prev_page_action: Option<PageAction>) -> Self {
        Self {
            depth,
            details,
            prev_page_action,
            summary: String::new(),
            actions: Vec::new(),
            visited_keys: BTreeSet::new(),
        }
    }
}

/// A single error reported alongside a crawl response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlError {
    pub error_type: ErrorType,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

impl CrawlError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attach a diagnostic value
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// URL the error is tied to, if any
    pub fn url(&self) -> Option<&str> {
        self.details.get("url").and_then(Value::as_str)
    }
}

/// Final payload returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResponse {
    pub success: bool,
    pub message: String,
    pub history: Vec<HistoryEntry>,
    pub errors: Option<Vec<CrawlError>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_is_clamped_on_deserialize() {
        let req: CrawlRequest = serde_json::from_str(
            r#"{"start_url":"https://example.com","user_instruction":"x","max_depth":42}"#,
        )
        .unwrap();
        assert_eq!(req.max_depth, 6);

        let req: CrawlRequest = serde_json::from_str(
            r#"{"start_url":"https://example.com","user_instruction":"x","max_depth":-3}"#,
        )
        .unwrap();
        assert_eq!(req.max_depth, 0);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let err = CrawlRequest::new("not a url", "find prices", 1)
            .validate()
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::Validation);
        assert_eq!(err.url(), Some("not a url"));

        let err = CrawlRequest::new("ftp://example.com", "find prices", 1)
            .validate()
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::Validation);

        let err = CrawlRequest::new("https://example.com", "   ", 1)
            .validate()
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::Validation);
    }

    #[test]
    fn test_validate_trims_instruction() {
        let ok = CrawlRequest::new("https://example.com/", "  copper price \n", 9)
            .validate()
            .unwrap();
        assert_eq!(ok.user_instruction, "copper price");
        assert_eq!(ok.max_depth, 6);
        assert_eq!(ok.start_url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_response_wire_format() {
        let mut entry = HistoryEntry::new(
            0,
            PageDetails {
                url: "https://example.com".to_string(),
                title: "Example".to_string(),
                body_text: "Hello".to_string(),
            },
            None,
        );
        entry.actions.push(PageActionDetailed::stop("done"));
        entry.visited_keys.insert("https://example.com/a".to_string());

        let response = CrawlResponse {
            success: true,
            message: "ok".to_string(),
            history: vec![entry],
            errors: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["history"][0]["prev_page_action"], Value::Null);
        assert_eq!(json["history"][0]["actions"][0]["action"], "stop");
        assert_eq!(
            json["history"][0]["visited_keys"][0],
            "https://example.com/a"
        );
        assert_eq!(json["errors"], Value::Null);
    }

    #[test]
    fn test_crawl_error_serializes_type_tag() {
        let err = CrawlError::new(ErrorType::Fetch, "boom").with_detail("url", "https://x.test");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error_type"], "FetchError");
        assert_eq!(json["details"]["url"], "https://x.test");
    }
}
