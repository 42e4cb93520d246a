pub mod config;
pub mod engine;
pub mod errors;
pub mod fetcher;
pub mod filter;
pub mod llm;
pub mod parsers;
pub mod planner;
pub mod response;
pub mod results;
pub mod server;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod stubs;

// Re-export commonly used types for convenience
pub use config::StrigilConfig;
pub use engine::{CrawlEngine, EngineSettings};
pub use errors::ErrorType;
pub use results::{CrawlError, CrawlRequest, CrawlResponse, HistoryEntry, PageActionDetailed};

use fetcher::WebDriverFetcher;
use llm::LanguageModel;
use llm::openai::OpenAiChat;
use planner::LlmPlanner;
use summarizer::LlmSummarizer;
use std::sync::Arc;

/// Builder for a crawl engine backed by WebDriver and an OpenAI-compatible model
#[derive(Debug, Clone, Default)]
pub struct Strigil {
    config: StrigilConfig,
}

impl Strigil {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: StrigilConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a file
    pub fn with_config_file(
        self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let config = StrigilConfig::from_file(path)?;
        Ok(self.with_config(config))
    }

    /// Load configuration from a string
    pub fn with_config_str(self, config_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config = StrigilConfig::from_json(config_str)?;
        Ok(self.with_config(config))
    }

    /// Apply `WEBDRIVER_URL`, `OPENAI_API_KEY` and `STRIGIL_BIND` overrides
    pub fn with_env(mut self) -> Self {
        self.config.apply_env();
        self
    }

    /// Set the maximum number of pages processed at once
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.max_concurrency = max_concurrency;
        self
    }

    /// Set the maximum runtime of one crawl
    pub fn with_total_timeout(mut self, timeout_seconds: u64) -> Self {
        self.config.crawl_timeout_secs = timeout_seconds;
        self
    }

    /// Set the maximum number of pages one crawl may visit
    pub fn with_max_nodes(mut self, max_total_nodes: usize) -> Self {
        self.config.max_total_nodes = max_total_nodes;
        self
    }

    pub fn with_webdriver_url(mut self, webdriver_url: &str) -> Self {
        self.config.webdriver_url = webdriver_url.to_string();
        self
    }

    pub fn config(&self) -> &StrigilConfig {
        &self.config
    }

    /// Wire the browser fetcher and the model-backed summarizer and planner
    pub fn build(self) -> Result<CrawlEngine, Box<dyn std::error::Error>> {
        let config = self.config;
        config.scope.validate()?;
        let model: Arc<dyn LanguageModel> =
            Arc::new(OpenAiChat::new(&config.llm, config.llm_timeout())?);

        ::log::info!(
            "Using model {} at {} with WebDriver at {}",
            config.llm.model,
            config.llm.base_url,
            config.webdriver_url
        );

        Ok(CrawlEngine::new(
            Arc::new(WebDriverFetcher::new(&config)),
            Arc::new(LlmSummarizer::new(Arc::clone(&model))),
            Arc::new(LlmPlanner::new(model, config.max_actions_per_page)),
            EngineSettings::from_config(&config),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_builder_overrides() {
        let builder = Strigil::new()
            .with_max_concurrency(2)
            .with_total_timeout(30)
            .with_max_nodes(7)
            .with_webdriver_url("http://localhost:9515");

        let config = builder.config();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.crawl_timeout_secs, 30);
        assert_eq!(config.max_total_nodes, 7);
        assert_eq!(config.webdriver_url, "http://localhost:9515");
    }

    #[test]
    fn test_build_requires_api_key() {
        let err = Strigil::new().build().err().unwrap();
        assert!(err.to_string().contains("API key"));
    }

    #[tokio::test]
    async fn test_build_from_config_str() {
        let engine = Strigil::new()
            .with_config_str(
                r#"{
                    "max_concurrency": 3,
                    "crawl_timeout_secs": 90,
                    "dedup_scope": "global",
                    "llm": { "api_key": "sk-test", "model": "gpt-4o" }
                }"#,
            )
            .unwrap()
            .build()
            .unwrap();

        let settings = engine.settings();
        assert_eq!(settings.max_concurrency, 3);
        assert_eq!(settings.crawl_timeout, Duration::from_secs(90));
        assert_eq!(settings.dedup_scope, config::DedupScope::Global);
    }

    #[test]
    fn test_build_rejects_bad_scope_pattern() {
        let err = Strigil::new()
            .with_config_str(
                r#"{
                    "scope": { "exclude_patterns": ["/logout", "(unclosed"] },
                    "llm": { "api_key": "sk-test" }
                }"#,
            )
            .unwrap()
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn test_bad_config_str() {
        assert!(Strigil::new().with_config_str("{ not json").is_err());
    }
}
