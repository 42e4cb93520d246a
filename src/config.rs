use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Whether explored action keys are remembered per page or for the whole crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// Keys are only deduplicated among the children of one page
    #[default]
    Local,
    /// A key explored anywhere in the crawl is never explored again
    Global,
}

/// Which discovered links may be offered to the planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Whether links to other sites may be followed
    #[serde(default)]
    pub allow_external: bool,

    /// Regex patterns for URLs to include
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl ScopeConfig {
    /// Compile every include and exclude pattern once, reporting the first bad one
    pub fn validate(&self) -> Result<(), regex::Error> {
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            Regex::new(pattern)?;
        }
        Ok(())
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            allow_external: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Settings for the OpenAI-compatible chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key; falls back to `OPENAI_API_KEY`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Reply token cap per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Attempts for transient failures (429/5xx, connect errors)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
        }
    }
}

/// Full configuration for the crawler and its HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrigilConfig {
    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Maximum number of pages processed at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Upper bound on pages visited by one crawl
    #[serde(default = "default_max_total_nodes")]
    pub max_total_nodes: usize,

    /// Maximum wall-clock time for one crawl
    #[serde(default = "default_crawl_timeout_secs")]
    pub crawl_timeout_secs: u64,

    /// Per-page fetch bound (navigation + rendering + extraction)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Bound on waiting for `document.readyState == "complete"`
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// Extra wait after the document is complete, for late scripts
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,

    /// Per-call bound on language model requests
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    /// Dedup scope for explored action keys
    #[serde(default)]
    pub dedup_scope: DedupScope,

    /// Most click actions followed from one page
    #[serde(default = "default_max_actions_per_page")]
    pub max_actions_per_page: usize,

    /// Cap on extracted body text length (characters)
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,

    /// Cap on actionable elements extracted per page
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,

    /// Link scope rules
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Language model settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for StrigilConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            max_concurrency: default_max_concurrency(),
            max_total_nodes: default_max_total_nodes(),
            crawl_timeout_secs: default_crawl_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            render_timeout_secs: default_render_timeout_secs(),
            settle_millis: default_settle_millis(),
            llm_timeout_secs: default_llm_timeout_secs(),
            dedup_scope: DedupScope::default(),
            max_actions_per_page: default_max_actions_per_page(),
            max_body_chars: default_max_body_chars(),
            max_elements: default_max_elements(),
            scope: ScopeConfig::default(),
            llm: LlmConfig::default(),
            bind: default_bind(),
        }
    }
}

impl StrigilConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        Self::from_json(&contents)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, Box<dyn Error>> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                self.webdriver_url = webdriver_url;
            }
        }

        if self.llm.api_key.as_deref().is_none_or(str::is_empty) {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                if !key.trim().is_empty() {
                    self.llm.api_key = Some(key);
                }
            }
        }

        if let Ok(bind) = std::env::var("STRIGIL_BIND") {
            if !bind.is_empty() {
                self.bind = bind;
            }
        }
    }

    pub fn crawl_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl_timeout_secs.max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs.max(1))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs.max(1))
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_total_nodes() -> usize {
    30
}

fn default_crawl_timeout_secs() -> u64 {
    240
}

fn default_fetch_timeout_secs() -> u64 {
    45
}

fn default_render_timeout_secs() -> u64 {
    15
}

fn default_settle_millis() -> u64 {
    500
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_max_actions_per_page() -> usize {
    3
}

fn default_max_body_chars() -> usize {
    20_000
}

fn default_max_elements() -> usize {
    150
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> usize {
    800
}

fn default_max_retries() -> usize {
    3
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = StrigilConfig::from_json("{}").unwrap();
        assert_eq!(config.webdriver_url, "http://localhost:4444");
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.dedup_scope, DedupScope::Local);
        assert!(!config.scope.allow_external);
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = StrigilConfig::from_json(
            r#"{
                "max_total_nodes": 5,
                "dedup_scope": "global",
                "scope": { "allow_external": true, "exclude_patterns": ["/login"] },
                "llm": { "model": "local-model", "base_url": "http://localhost:11434/v1" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_total_nodes, 5);
        assert_eq!(config.dedup_scope, DedupScope::Global);
        assert!(config.scope.allow_external);
        assert_eq!(config.scope.exclude_patterns, vec!["/login".to_string()]);
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(config.llm.max_retries, 3);
    }

    #[test]
    fn test_scope_patterns_are_validated() {
        let mut scope = ScopeConfig {
            exclude_patterns: vec!["/logout".to_string()],
            ..ScopeConfig::default()
        };
        assert!(scope.validate().is_ok());

        scope.exclude_patterns.push("/admin/[".to_string());
        assert!(scope.validate().is_err());
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let mut config = StrigilConfig::default();
        config.llm.api_key = Some("sk-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_zero_timeouts_are_raised_to_one_second() {
        let config = StrigilConfig::from_json(r#"{"fetch_timeout_secs": 0}"#).unwrap();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(1));
    }
}
