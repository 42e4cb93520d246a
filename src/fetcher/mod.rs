pub mod webdriver;

pub use webdriver::WebDriverFetcher;

use crate::errors::FetchFailure;
use crate::filter::UrlFilter;
use crate::results::PageDetails;
use async_trait::async_trait;
use url::Url;

/// How an actionable element is acted upon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// A link; following it navigates to `href`
    Link { href: Url },
    /// A button-like element; `ordinal` is its index among all button-like elements
    Button { ordinal: usize },
}

/// Something on a page the planner can choose to act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionableElement {
    /// Opaque action key, unique within the page
    pub key: String,
    pub kind: ElementKind,
    /// Visible text shown to the planner
    pub label: String,
}

impl ActionableElement {
    pub fn link(href: &str, label: &str) -> Option<Self> {
        let href = Url::parse(href).ok()?;
        Some(Self {
            key: href.to_string(),
            kind: ElementKind::Link { href },
            label: label.to_string(),
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ElementKind::Link { .. } => "link",
            ElementKind::Button { .. } => "button",
        }
    }
}

/// A rendered page together with what can be done on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub details: PageDetails,
    pub elements: Vec<ActionableElement>,
}

impl FetchedPage {
    pub fn element(&self, key: &str) -> Option<&ActionableElement> {
        self.elements.iter().find(|e| e.key == key)
    }
}

/// Loads pages with dynamic content rendered
///
/// `scope` decides which discovered links are offered as actions.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Load and render `url`
    async fn fetch(&self, url: &Url, scope: &UrlFilter) -> Result<FetchedPage, FetchFailure>;

    /// Perform `element` on the page `from` and capture where it leads
    async fn follow(
        &self,
        from: &FetchedPage,
        element: &ActionableElement,
        scope: &UrlFilter,
    ) -> Result<FetchedPage, FetchFailure> {
        match &element.kind {
            ElementKind::Link { href } => self.fetch(href, scope).await,
            ElementKind::Button { .. } => Err(FetchFailure::Unsupported {
                key: element.key.clone(),
                reason: format!("clicking buttons on {} needs a browser", from.details.url),
            }),
        }
    }

    /// Release any resources held between fetches
    async fn shutdown(&self) {}
}
