use crate::fetcher::{ActionableElement, ElementKind};
use crate::filter::{UrlFilter, normalize_url};
use crate::parsers::ExtractOptions;
use crate::parsers::text::{collapse_whitespace, normalize_lines, truncate_chars};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use url::Url;

/// Elements the browser's button locator matches, in the same order
pub const BUTTON_SELECTOR: &str =
    "button, [role=button], input[type=submit], input[type=button]";

/// Longest label kept for an actionable element
pub const MAX_LABEL_CHARS: usize = 120;

const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe", "object",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

/// Result of extracting a rendered page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: String,
    pub body_text: String,
    pub elements: Vec<ActionableElement>,
}

/// Extracts title, visible text and actionable elements from rendered HTML
pub fn extract(
    html: &str,
    page_url: &Url,
    filter: &UrlFilter,
    options: &ExtractOptions,
) -> ParsedPage {
    let doc = Html::parse_document(html);

    let title = extract_title(&doc);
    let body_text = extract_body_text(&doc, options.max_body_chars);
    let mut elements = extract_links(&doc, page_url, filter);
    elements.extend(extract_buttons(&doc));
    elements.truncate(options.max_elements);

    ::log::debug!(
        "Extracted {} chars of text and {} actionable elements from {}",
        body_text.len(),
        elements.len(),
        page_url
    );

    ParsedPage {
        title,
        body_text,
        elements,
    }
}

/// `<title>`, falling back to the first `<h1>`
pub fn extract_title(doc: &Html) -> String {
    for selector in ["title", "h1"] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = doc.select(&selector).next() {
            let title = collapse_whitespace(&element.text().collect::<String>());
            if !title.is_empty() {
                return title;
            }
        }
    }
    String::new()
}

/// Visible text, one block-level element per line
pub fn extract_body_text(doc: &Html, max_chars: usize) -> String {
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| doc.select(&body).next())
        .unwrap_or_else(|| doc.root_element());

    let mut raw = String::new();
    collect_text(root, &mut raw);
    normalize_lines(&raw, max_chars)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let value = element.value();
    if SKIPPED_TAGS.contains(&value.name())
        || value.attr("hidden").is_some()
        || value.attr("aria-hidden") == Some("true")
    {
        return;
    }

    let block = BLOCK_TAGS.contains(&value.name());
    if block {
        out.push('\n');
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&text.replace(['\n', '\r', '\t'], " ")),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, out);
                }
            }
            _ => {}
        }
    }

    if block {
        out.push('\n');
    }
}

fn element_label(element: &ElementRef<'_>) -> String {
    let text = collapse_whitespace(&element.text().collect::<String>());
    let label = if !text.is_empty() {
        text
    } else {
        ["aria-label", "title", "value", "alt"]
            .iter()
            .filter_map(|attr| element.value().attr(attr))
            .map(collapse_whitespace)
            .find(|s| !s.is_empty())
            .unwrap_or_default()
    };
    truncate_chars(&label, MAX_LABEL_CHARS).to_string()
}

/// In-scope `a[href]` links, keyed by their absolute URL
pub fn extract_links(doc: &Html, page_url: &Url, filter: &UrlFilter) -> Vec<ActionableElement> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let self_key = normalize_url(page_url);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in doc.select(&selector) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let lowered = href.to_ascii_lowercase();
        if href.is_empty()
            || href.starts_with('#')
            || lowered.starts_with("javascript:")
            || lowered.starts_with("mailto:")
            || lowered.starts_with("tel:")
        {
            continue;
        }

        let Ok(resolved) = page_url.join(href) else {
            ::log::trace!("Skipping unresolvable link {}", href);
            continue;
        };
        let normalized = normalize_url(&resolved);
        if normalized == self_key || !filter.allows(&normalized) {
            continue;
        }

        let key = normalized.to_string();
        if !seen.insert(key.clone()) {
            continue;
        }

        let mut label = element_label(&anchor);
        if label.is_empty() {
            label = normalized.path().to_string();
        }

        links.push(ActionableElement {
            key,
            kind: ElementKind::Link { href: normalized },
            label,
        });
    }

    links
}

/// Enabled button-like elements, keyed by label
pub fn extract_buttons(doc: &Html) -> Vec<ActionableElement> {
    let Ok(selector) = Selector::parse(BUTTON_SELECTOR) else {
        return Vec::new();
    };
    let mut label_counts: HashMap<String, usize> = HashMap::new();
    let mut buttons = Vec::new();

    for (ordinal, element) in doc.select(&selector).enumerate() {
        let value = element.value();
        if value.attr("disabled").is_some() {
            continue;
        }
        // Anchors with role=button are already offered as links
        if value.name() == "a" && value.attr("href").is_some() {
            continue;
        }

        let label = element_label(&element);
        if label.is_empty() {
            continue;
        }

        let count = label_counts.entry(label.clone()).or_insert(0);
        *count += 1;
        let key = if *count == 1 {
            format!("button:{}", label)
        } else {
            format!("button:{}#{}", label, count)
        };

        buttons.push(ActionableElement {
            key,
            kind: ElementKind::Button { ordinal },
            label,
        });
    }

    buttons
}
