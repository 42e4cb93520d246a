use regex::Regex;
use url::Url;

use crate::config::ScopeConfig;

/// Asset paths that never lead to a readable page
const ASSET_PATTERN: &str =
    r"(?i)\.(jpg|jpeg|png|gif|webp|bmp|css|js|ico|svg|woff|woff2|ttf|eot|pdf|zip|gz|tar|mp3|mp4|avi|mov)$";

/// Decides which discovered links stay inside the crawl scope
#[derive(Debug)]
pub struct UrlFilter {
    allow_external: bool,
    root_host: Option<String>,
    asset_regex: Option<Regex>,
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

impl UrlFilter {
    /// Build a filter anchored at the crawl's start URL
    pub fn new(root_url: &Url, config: &ScopeConfig) -> Result<Self, regex::Error> {
        let mut include_regexes = Vec::with_capacity(config.include_patterns.len());
        for pattern in &config.include_patterns {
            include_regexes.push(Regex::new(pattern)?);
        }

        let mut exclude_regexes = Vec::with_capacity(config.exclude_patterns.len());
        for pattern in &config.exclude_patterns {
            exclude_regexes.push(Regex::new(pattern)?);
        }

        Ok(Self {
            allow_external: config.allow_external,
            root_host: root_url.host_str().map(host_without_www),
            asset_regex: Some(Regex::new(ASSET_PATTERN)?),
            include_regexes,
            exclude_regexes,
        })
    }

    /// Filter with default scope rules
    pub fn for_root(root_url: &Url) -> Self {
        Self {
            allow_external: false,
            root_host: root_url.host_str().map(host_without_www),
            asset_regex: Regex::new(ASSET_PATTERN).ok(),
            include_regexes: Vec::new(),
            exclude_regexes: Vec::new(),
        }
    }

    /// Determine if a link may be offered as an action
    pub fn allows(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }

        if !self.is_in_host_scope(url) {
            return false;
        }

        // Query strings and fragments do not hide an asset
        if self
            .asset_regex
            .as_ref()
            .is_some_and(|re| re.is_match(url.path()))
        {
            return false;
        }

        // Exclusions take precedence
        let url_str = url.as_str();
        if self.exclude_regexes.iter().any(|re| re.is_match(url_str)) {
            return false;
        }

        self.include_regexes.is_empty() || self.include_regexes.iter().any(|re| re.is_match(url_str))
    }

    /// Same host as the root, or one of its subdomains
    fn is_in_host_scope(&self, url: &Url) -> bool {
        if self.allow_external {
            return true;
        }

        let (Some(root), Some(host)) = (&self.root_host, url.host_str()) else {
            return false;
        };
        let host = host_without_www(host);
        host == *root || host.ends_with(&format!(".{}", root))
    }
}

fn host_without_www(host: &str) -> String {
    host.trim_start_matches("www.").to_ascii_lowercase()
}

/// Strip the fragment so links differing only by anchor share a key
pub fn normalize_url(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}
