use crate::results::{CrawlError, CrawlResponse, HistoryEntry};

/// Assembles the final payload from what the engine collected
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    start_url: String,
    history: Vec<HistoryEntry>,
    errors: Vec<CrawlError>,
    omitted: usize,
    timed_out: bool,
}

impl ResponseBuilder {
    pub fn new(start_url: &str) -> Self {
        Self {
            start_url: start_url.to_string(),
            ..Self::default()
        }
    }

    /// History in traversal order
    pub fn history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn errors(mut self, errors: Vec<CrawlError>) -> Self {
        self.errors = errors;
        self
    }

    /// Number of nodes skipped because the node limit was reached
    pub fn omitted(mut self, omitted: usize) -> Self {
        self.omitted = omitted;
        self
    }

    pub fn timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    /// Success whenever the start page made it into the history
    pub fn build(self) -> CrawlResponse {
        let success = !self.history.is_empty();

        let message = if success {
            let mut message = format!(
                "Crawl completed: visited {} page(s) with {} error(s)",
                self.history.len(),
                self.errors.len()
            );
            if self.omitted > 0 {
                message.push_str("; node limit reached");
            }
            if self.timed_out {
                message.push_str("; crawl timed out");
            }
            message
        } else if self.timed_out {
            format!(
                "Crawl failed: timed out before {} could be loaded",
                self.start_url
            )
        } else {
            format!("Crawl failed: could not load start page {}", self.start_url)
        };

        CrawlResponse {
            success,
            message,
            history: self.history,
            errors: (!self.errors.is_empty()).then_some(self.errors),
        }
    }

    /// Response for a request rejected before any crawl work began
    pub fn rejected(error: CrawlError) -> CrawlResponse {
        CrawlResponse {
            success: false,
            message: format!("Invalid crawl request: {}", error.message),
            history: Vec::new(),
            errors: Some(vec![error]),
        }
    }
}
