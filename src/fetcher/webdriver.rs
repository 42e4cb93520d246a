use crate::config::StrigilConfig;
use crate::errors::FetchFailure;
use crate::fetcher::{ActionableElement, ElementKind, FetchedPage, PageFetcher};
use crate::filter::UrlFilter;
use crate::parsers::html::{self, BUTTON_SELECTOR};
use crate::parsers::text::collapse_whitespace;
use crate::parsers::{ContentKind, ExtractOptions, is_html_content_type};
use crate::results::PageDetails;
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use url::Url;

/// Endpoints tried when the configured WebDriver is unreachable
const FALLBACK_WEBDRIVER_URLS: [&str; 4] = [
    "http://localhost:9515", // ChromeDriver default
    "http://localhost:4723", // Appium default
    "http://localhost:9222", // Chrome debug port default
    "http://127.0.0.1:4444",
];

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Renders pages in a real browser through WebDriver
///
/// Sessions are connected lazily and kept in an idle pool between fetches,
/// so concurrent node tasks each get their own browser session.
pub struct WebDriverFetcher {
    webdriver_url: String,
    idle: Mutex<Vec<Client>>,
    max_idle: usize,
    render_timeout: Duration,
    settle: Duration,
    options: ExtractOptions,
}

impl WebDriverFetcher {
    pub fn new(config: &StrigilConfig) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            idle: Mutex::new(Vec::new()),
            max_idle: config.max_concurrency.max(1),
            render_timeout: config.render_timeout(),
            settle: Duration::from_millis(config.settle_millis),
            options: ExtractOptions {
                max_body_chars: config.max_body_chars,
                max_elements: config.max_elements,
            },
        }
    }

    async fn acquire(&self) -> Result<Client, FetchFailure> {
        if let Some(client) = self.idle.lock().await.pop() {
            return Ok(client);
        }
        connect_to_webdriver(&self.webdriver_url).await
    }

    /// Return a session to the pool, or drop it if it is no longer usable
    async fn release<T>(&self, client: Client, outcome: &Result<T, FetchFailure>) {
        let lost = matches!(outcome, Err(FetchFailure::Session(_)));
        if !lost {
            let mut idle = self.idle.lock().await;
            if idle.len() < self.max_idle {
                idle.push(client);
                return;
            }
        }

        if let Err(e) = client.close().await {
            ::log::debug!("Failed to close WebDriver session: {}", e);
        }
    }

    async fn load(
        &self,
        client: &Client,
        url: &Url,
        scope: &UrlFilter,
    ) -> Result<FetchedPage, FetchFailure> {
        client
            .goto(url.as_str())
            .await
            .map_err(|e| navigation_error(e, "navigating to", url.as_str()))?;
        self.capture(client, scope).await
    }

    async fn click_button(
        &self,
        client: &Client,
        from: &FetchedPage,
        element: &ActionableElement,
        ordinal: usize,
        scope: &UrlFilter,
    ) -> Result<FetchedPage, FetchFailure> {
        let parent_url = from.details.url.as_str();
        client
            .goto(parent_url)
            .await
            .map_err(|e| navigation_error(e, "navigating to", parent_url))?;
        self.wait_for_render(client, parent_url).await?;

        let buttons = client
            .find_all(Locator::Css(BUTTON_SELECTOR))
            .await
            .map_err(|e| navigation_error(e, "locating buttons on", parent_url))?;
        let Some(button) = buttons.get(ordinal) else {
            return Err(FetchFailure::Unsupported {
                key: element.key.clone(),
                reason: format!("button no longer present on {}", parent_url),
            });
        };

        ::log::debug!("Clicking '{}' on {}", element.label, parent_url);
        button
            .click()
            .await
            .map_err(|e| navigation_error(e, "clicking a button on", parent_url))?;

        // Give navigation or client-side updates a moment to start
        sleep(self.settle).await;
        self.capture(client, scope).await
    }

    /// Wait for rendering, then extract the current document
    async fn capture(&self, client: &Client, scope: &UrlFilter) -> Result<FetchedPage, FetchFailure> {
        let current = client
            .current_url()
            .await
            .map_err(|e| navigation_error(e, "reading the location of", "current page"))?;
        let url_str = current.as_str();
        self.wait_for_render(client, url_str).await?;

        let content_type = client
            .execute("return document.contentType || '';", vec![])
            .await
            .map_err(|e| navigation_error(e, "inspecting", url_str))?;
        let content_type = content_type.as_str().unwrap_or_default().to_string();
        if !is_html_content_type(&content_type) {
            return Err(FetchFailure::NotHtml {
                url: url_str.to_string(),
                content_type,
            });
        }

        let source = client
            .source()
            .await
            .map_err(|e| navigation_error(e, "getting source for", url_str))?;
        let parsed = html::extract(&source, &current, scope, &self.options);

        let browser_title = client
            .title()
            .await
            .map(|t| collapse_whitespace(&t))
            .unwrap_or_default();
        let title = if browser_title.is_empty() {
            parsed.title
        } else {
            browser_title
        };

        Ok(FetchedPage {
            details: PageDetails {
                url: url_str.to_string(),
                title,
                body_text: parsed.body_text,
            },
            elements: parsed.elements,
        })
    }

    /// Poll `document.readyState` until the page reports complete
    async fn wait_for_render(&self, client: &Client, url: &str) -> Result<(), FetchFailure> {
        let deadline = Instant::now() + self.render_timeout;
        loop {
            let state = client
                .execute("return document.readyState;", vec![])
                .await
                .map_err(|e| navigation_error(e, "checking render state of", url))?;
            if state.as_str() == Some("complete") {
                break;
            }
            if Instant::now() >= deadline {
                return Err(FetchFailure::Render {
                    url: url.to_string(),
                    reason: format!(
                        "document still '{}' after {:?}",
                        state.as_str().unwrap_or("unknown"),
                        self.render_timeout
                    ),
                });
            }
            sleep(READY_POLL_INTERVAL).await;
        }

        sleep(self.settle).await;
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for WebDriverFetcher {
    async fn fetch(&self, url: &Url, scope: &UrlFilter) -> Result<FetchedPage, FetchFailure> {
        let kind = ContentKind::from_url(url.as_str());
        if !kind.is_html() {
            return Err(FetchFailure::NotHtml {
                url: url.to_string(),
                content_type: format!("{:?}", kind).to_lowercase(),
            });
        }

        let client = self.acquire().await?;
        ::log::debug!("Fetching {}", url);
        let result = self.load(&client, url, scope).await;
        self.release(client, &result).await;
        result
    }

    async fn follow(
        &self,
        from: &FetchedPage,
        element: &ActionableElement,
        scope: &UrlFilter,
    ) -> Result<FetchedPage, FetchFailure> {
        match element.kind {
            ElementKind::Link { ref href } => self.fetch(href, scope).await,
            ElementKind::Button { ordinal } => {
                let client = self.acquire().await?;
                let result = self
                    .click_button(&client, from, element, ordinal, scope)
                    .await;
                self.release(client, &result).await;
                result
            }
        }
    }

    /// Close every idle browser session
    async fn shutdown(&self) {
        let sessions: Vec<Client> = self.idle.lock().await.drain(..).collect();
        for client in sessions {
            if let Err(e) = client.close().await {
                ::log::warn!("Failed to close WebDriver session: {}", e);
            }
        }
    }
}

/// Connects to the WebDriver instance, trying the usual local endpoints as fallback
async fn connect_to_webdriver(webdriver_url: &str) -> Result<Client, FetchFailure> {
    match ClientBuilder::native().connect(webdriver_url).await {
        Ok(client) => {
            ::log::debug!("Connected to WebDriver at {}", webdriver_url);
            return Ok(client);
        }
        Err(e) => {
            ::log::error!("Failed to connect to WebDriver at {}: {}", webdriver_url, e);
        }
    }

    for url in FALLBACK_WEBDRIVER_URLS {
        if url == webdriver_url {
            continue;
        }

        ::log::info!("Trying fallback WebDriver URL: {}", url);
        if let Ok(client) = ClientBuilder::native().connect(url).await {
            ::log::debug!("Connected to fallback WebDriver at {}", url);
            return Ok(client);
        }
    }

    ::log::error!(
        "Make sure a WebDriver server is running or set the WEBDRIVER_URL environment variable"
    );
    Err(FetchFailure::Session(format!(
        "could not connect to WebDriver at {} or any fallback",
        webdriver_url
    )))
}

/// Maps a WebDriver command error, separating lost sessions from page failures
fn navigation_error(error: CmdError, context: &str, url: &str) -> FetchFailure {
    let reason = error.to_string();
    if reason.contains("Unable to find session") || reason.contains("invalid session id") {
        ::log::warn!("Lost WebDriver session while {} {}", context, url);
        FetchFailure::Session(reason)
    } else {
        ::log::warn!("Failed {} {}: {}", context, url, reason);
        FetchFailure::Network {
            url: url.to_string(),
            reason,
        }
    }
}
