//! Deterministic in-memory capabilities for tests.

use crate::errors::{FetchFailure, LlmFailure, PlanFailure, SummaryFailure};
use crate::fetcher::{ActionableElement, FetchedPage, PageFetcher};
use crate::filter::UrlFilter;
use crate::planner::{ActionPlanner, BranchStep};
use crate::results::{PageActionDetailed, PageDetails};
use crate::summarizer::Summarizer;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

pub fn canonical(url: &str) -> String {
    Url::parse(url).map(|u| u.to_string()).unwrap_or_else(|_| url.to_string())
}

struct StubPage {
    title: String,
    body: String,
    links: Vec<String>,
}

/// A fixed site map served from memory
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, StubPage>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    fetched: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, title: &str, links: &[&str]) -> Self {
        self.pages.insert(
            canonical(url),
            StubPage {
                title: title.to_string(),
                body: format!("Body of {}", title),
                links: links.iter().map(|l| canonical(l)).collect(),
            },
        );
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(canonical(url));
        self
    }

    pub fn delayed(mut self, url: &str, millis: u64) -> Self {
        self.delays
            .insert(canonical(url), Duration::from_millis(millis));
        self
    }

    /// URLs fetched so far, in call order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &Url, _scope: &UrlFilter) -> Result<FetchedPage, FetchFailure> {
        let key = url.to_string();
        self.fetched.lock().unwrap().push(key.clone());

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&key) {
            return Err(FetchFailure::Network {
                url: key,
                reason: "connection refused".to_string(),
            });
        }

        let page = self.pages.get(&key).ok_or_else(|| FetchFailure::Network {
            url: key.clone(),
            reason: "404 Not Found".to_string(),
        })?;

        Ok(FetchedPage {
            details: PageDetails {
                url: key,
                title: page.title.clone(),
                body_text: page.body.clone(),
            },
            elements: page
                .links
                .iter()
                .filter_map(|href| ActionableElement::link(href, href))
                .collect(),
        })
    }
}

/// Summarizes as "Summary of <title>", failing for chosen URLs
#[derive(Default)]
pub struct StubSummarizer {
    failing: HashSet<String>,
}

impl StubSummarizer {
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(canonical(url));
        self
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(
        &self,
        page: &PageDetails,
        _user_instruction: &str,
    ) -> Result<String, SummaryFailure> {
        if self.failing.contains(&page.url) {
            return Err(SummaryFailure::Llm(LlmFailure::Status {
                status: 500,
                body: "overloaded".to_string(),
            }));
        }
        Ok(format!("Summary of {}", page.title))
    }
}

/// A planner call as seen by [`StubPlanner`]
#[derive(Debug, Clone)]
pub struct PlanCall {
    pub url: String,
    pub history: Vec<BranchStep>,
    pub visited: BTreeSet<String>,
}

/// Clicks every element in page order unless told otherwise for a URL
#[derive(Default)]
pub struct StubPlanner {
    stops: HashSet<String>,
    failing: HashSet<String>,
    scripted: HashMap<String, Vec<PageActionDetailed>>,
    calls: Mutex<Vec<PlanCall>>,
}

impl StubPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_at(mut self, url: &str) -> Self {
        self.stops.insert(canonical(url));
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(canonical(url));
        self
    }

    /// Return exactly `actions` for `url`
    pub fn scripted(mut self, url: &str, actions: Vec<PageActionDetailed>) -> Self {
        self.scripted.insert(canonical(url), actions);
        self
    }

    pub fn calls(&self) -> Vec<PlanCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionPlanner for StubPlanner {
    async fn plan(
        &self,
        page: &FetchedPage,
        _user_instruction: &str,
        history: &[BranchStep],
        visited_keys: &BTreeSet<String>,
    ) -> Result<Vec<PageActionDetailed>, PlanFailure> {
        let url = page.details.url.clone();
        self.calls.lock().unwrap().push(PlanCall {
            url: url.clone(),
            history: history.to_vec(),
            visited: visited_keys.clone(),
        });

        if self.failing.contains(&url) {
            return Err(PlanFailure::Parse("model replied with prose".to_string()));
        }
        if let Some(actions) = self.scripted.get(&url) {
            return Ok(actions.clone());
        }
        if self.stops.contains(&url) {
            return Ok(vec![PageActionDetailed::stop("found the answer")]);
        }

        Ok(page
            .elements
            .iter()
            .filter(|e| !visited_keys.contains(&e.key))
            .map(|e| PageActionDetailed::click(&e.key, "looks relevant", "explore"))
            .collect())
    }
}
