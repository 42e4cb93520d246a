pub mod html;
pub mod text;

#[cfg(test)]
mod tests;

/// Rough classification of what a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// HTML page (the default)
    Html,
    /// Plain text or YAML
    Text,
    /// PDF and other office documents
    Document,
    /// Images, stylesheets, scripts, media
    Asset,
}

impl ContentKind {
    /// Determines the content kind from the URL path
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();

        let extension = match path.rsplit_once('/') {
            Some((_, last)) => last.rsplit_once('.').map(|(_, ext)| ext),
            None => None,
        };

        let kind = match extension {
            Some("txt") | Some("yaml") | Some("yml") | Some("md") | Some("csv") => {
                ContentKind::Text
            }
            Some("pdf") | Some("doc") | Some("docx") | Some("xls") | Some("xlsx")
            | Some("ppt") | Some("pptx") => ContentKind::Document,
            Some("jpg") | Some("jpeg") | Some("png") | Some("gif") | Some("webp")
            | Some("svg") | Some("ico") | Some("css") | Some("js") | Some("mp3")
            | Some("mp4") | Some("zip") => ContentKind::Asset,
            _ => ContentKind::Html,
        };
        ::log::trace!("Classified {} as {:?}", url, kind);
        kind
    }

    pub fn is_html(&self) -> bool {
        matches!(self, ContentKind::Html)
    }
}

/// Whether a `document.contentType` value denotes a renderable HTML page
pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml"
}

/// Limits applied while extracting a page
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Cap on body text length (characters)
    pub max_body_chars: usize,
    /// Cap on actionable elements
    pub max_elements: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_body_chars: 20_000,
            max_elements: 150,
        }
    }
}
