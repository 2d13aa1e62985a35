use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::detect::Doi;

/// Elements whose text never shows up on a rendered page.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new line when the page is rendered.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

#[derive(Debug, Error)]
pub enum PageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Page returned HTTP {status}: {url}")]
    Status { status: u16, url: String },
}

/// A single `<meta>` tag as it appears in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaTag {
    pub name: Option<String>,
    pub property: Option<String>,
    pub content: String,
}

impl MetaTag {
    #[cfg(test)]
    pub fn named(name: &str, content: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            property: None,
            content: content.to_string(),
        }
    }
}

/// A parsed web page: its URL plus the HTML document.
pub struct Page {
    url: String,
    document: Html,
}

impl Page {
    pub fn parse(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            document: Html::parse_document(html),
        }
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    /// All meta tags in document order.
    pub fn meta_tags(&self) -> Vec<MetaTag> {
        let Some(sel) = selector("meta") else {
            return Vec::new();
        };
        self.document
            .select(&sel)
            .map(|el| {
                let attrs = el.value();
                MetaTag {
                    name: attrs.attr("name").map(str::to_string),
                    property: attrs.attr("property").map(str::to_string),
                    content: attrs.attr("content").unwrap_or_default().to_string(),
                }
            })
            .collect()
    }

    /// Visible text of `<body>`, with a line break between block elements.
    pub fn body_text(&self) -> String {
        let Some(body) = select_first(&self.document, "body") else {
            return String::new();
        };
        let mut out = String::new();
        collect_text(body, &mut out, true);
        out
    }

    /// Run detection and capture the result for the rest of this request.
    pub fn context(&self) -> PageContext {
        let doi = crate::detect::detect(&self.url, &self.meta_tags(), &self.body_text());
        PageContext {
            url: self.url.clone(),
            doi,
        }
    }
}

/// What is known about the page for the lifetime of one request.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub url: String,
    pub doi: Option<Doi>,
}

/// Fetches page HTML when the caller doesn't supply it.
pub struct PageFetcher {
    client: reqwest::Client,
}

impl PageFetcher {
    pub fn new() -> Result<Self, PageError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent("paper-triage/0.1")
                .build()?,
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<String, PageError> {
        tracing::debug!("Fetching page {}", url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PageError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

pub(crate) fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            tracing::warn!("Invalid selector {}: {:?}", css, e);
            None
        }
    }
}

pub(crate) fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    document.select(&sel).next()
}

/// Text content of an element, skipping hidden elements.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out, false);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String, block_breaks: bool) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if HIDDEN_ELEMENTS.contains(&name) {
                continue;
            }
            let is_block = block_breaks && BLOCK_ELEMENTS.contains(&name);
            if is_block {
                line_break(out);
            }
            collect_text(child_el, out, block_breaks);
            if is_block {
                line_break(out);
            }
        }
    }
}

fn line_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
