use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::page::{element_text, select_first, selector};

/// Below this many characters, the best article container is not trusted
/// and every paragraph on the page is used instead.
pub const FULL_TEXT_FALLBACK_THRESHOLD: usize = 500;

const TITLE_SELECTORS: &[&str] = &[
    r#"meta[name="citation_title"]"#,
    r#"meta[property="og:title"]"#,
    "h1.article-title",
    "h1.title",
    ".article-title",
    "h1",
];

const ABSTRACT_SELECTORS: &[&str] = &[
    r#"meta[name="citation_abstract"]"#,
    ".abstract",
    "#abstract",
    r#"[class*="abstract"]"#,
];

const ARTICLE_SELECTORS: &[&str] = &[
    "article",
    ".article-body",
    ".article-content",
    "#article-content",
    "main",
    ".paper-content",
];

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());

/// Bibliographic content scraped from a paper's landing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperContent {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub full_text: String,
    pub authors: String,
    pub year: String,
}

impl PaperContent {
    /// Length of the full text in characters.
    pub fn full_text_len(&self) -> usize {
        self.full_text.chars().count()
    }
}

pub fn extract(document: &Html) -> PaperContent {
    PaperContent {
        title: first_non_empty(document, TITLE_SELECTORS),
        abstract_text: first_non_empty(document, ABSTRACT_SELECTORS),
        full_text: full_text(document),
        authors: authors(document),
        year: year(document),
    }
}

/// Try each selector in turn, looking only at its first match.
fn first_non_empty(document: &Html, selectors: &[&str]) -> String {
    selectors
        .iter()
        .filter_map(|css| select_first(document, css))
        .map(content_or_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// `content` attribute for meta tags, text for everything else.
fn content_or_text(el: ElementRef<'_>) -> String {
    match el.value().attr("content") {
        Some(content) if !content.trim().is_empty() => content.trim().to_string(),
        _ => element_text(el).trim().to_string(),
    }
}

fn authors(document: &Html) -> String {
    let Some(sel) = selector(r#"meta[name="citation_author"]"#) else {
        return String::new();
    };
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn year(document: &Html) -> String {
    select_first(
        document,
        r#"meta[name="citation_publication_date"], meta[name="citation_year"]"#,
    )
    .and_then(|el| el.value().attr("content"))
    .and_then(|date| YEAR.find(date))
    .map(|m| m.as_str().to_string())
    .unwrap_or_default()
}

fn full_text(document: &Html) -> String {
    let container = ARTICLE_SELECTORS
        .iter()
        .filter_map(|css| select_first(document, css))
        .map(element_text)
        .find(|text| text.chars().count() > FULL_TEXT_FALLBACK_THRESHOLD);

    if let Some(text) = container {
        return text;
    }

    tracing::debug!("No article container over {} chars, using paragraphs", FULL_TEXT_FALLBACK_THRESHOLD);
    let Some(sel) = selector("p") else {
        return String::new();
    };
    document
        .select(&sel)
        .map(element_text)
        .collect::<Vec<_>>()
        .join("\n\n")
}
