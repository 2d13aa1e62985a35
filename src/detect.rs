use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::page::MetaTag;

/// URL patterns, tried in order.
static URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)doi\.org/(10\.\d{4,}/\S+)",
        r"(?i)dx\.doi\.org/(10\.\d{4,}/\S+)",
        r"(?i)doi[:\s]+(10\.\d{4,}/\S+)",
        r"(?i)(10\.\d{4,}/\S+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static BODY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)DOI[:\s]+(10\.\d{4,}/\S+)").unwrap());

static RESOLVER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://)?(dx\.)?doi\.org/").unwrap());

static DOI_SHAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^10\.\d{4,}/\S+$").unwrap());

/// A normalized DOI, e.g. `10.1038/nphys1170`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Doi(String);

impl Doi {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Clean a DOI lifted out of free text. Returns `None` when nothing
    /// DOI-shaped is left after trailing punctuation is dropped.
    fn from_text_match(raw: &str) -> Option<Self> {
        let cleaned = trim_trailing_punctuation(raw);
        DOI_SHAPE
            .is_match(cleaned)
            .then(|| Self(cleaned.to_string()))
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Find the DOI of a page. The URL wins over meta tags, which win over the
/// body text.
pub fn detect(url: &str, meta_tags: &[MetaTag], body_text: &str) -> Option<Doi> {
    from_url(url)
        .or_else(|| from_meta(meta_tags))
        .or_else(|| from_body(body_text))
}

fn from_url(url: &str) -> Option<Doi> {
    URL_PATTERNS
        .iter()
        .filter_map(|re| re.captures(url))
        .find_map(|caps| Doi::from_text_match(&caps[1]))
}

fn from_meta(meta_tags: &[MetaTag]) -> Option<Doi> {
    let tag = meta_tags.iter().find(|tag| {
        matches!(tag.name.as_deref(), Some("citation_doi") | Some("DOI"))
            || tag.property.as_deref() == Some("citation_doi")
    })?;
    let value = RESOLVER_PREFIX.replace(tag.content.trim(), "");
    if value.is_empty() {
        return None;
    }
    Some(Doi(value.into_owned()))
}

// Weak heuristic: anything DOI-shaped after the word "DOI" counts.
fn from_body(body_text: &str) -> Option<Doi> {
    BODY_PATTERN
        .captures_iter(body_text)
        .find_map(|caps| Doi::from_text_match(&caps[1]))
}

/// Drop sentence punctuation glued to the end of a DOI. Closing brackets are
/// only dropped when unbalanced, since suffixes like `S0140-6736(20)30183-5`
/// are legal.
fn trim_trailing_punctuation(raw: &str) -> &str {
    let mut s = raw;
    while let Some(last) = s.chars().last() {
        let strip = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\'' | '>' => true,
            ')' => s.matches('(').count() < s.matches(')').count(),
            ']' => s.matches('[').count() < s.matches(']').count(),
            '}' => s.matches('{').count() < s.matches('}').count(),
            _ => false,
        };
        if !strip {
            break;
        }
        s = &s[..s.len() - last.len_utf8()];
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_url(url: &str) -> Option<String> {
        detect(url, &[], "").map(|d| d.to_string())
    }

    #[test]
    fn test_doi_org_url() {
        assert_eq!(
            detect_url("https://doi.org/10.1038/nphys1170").as_deref(),
            Some("10.1038/nphys1170")
        );
        assert_eq!(
            detect_url("http://dx.doi.org/10.1103/PhysRevLett.116.061102").as_deref(),
            Some("10.1103/PhysRevLett.116.061102")
        );
    }

    #[test]
    fn test_url_trailing_punctuation_excluded() {
        assert_eq!(
            detect_url("https://doi.org/10.1000/xyz123.").as_deref(),
            Some("10.1000/xyz123")
        );
        assert_eq!(
            detect_url("https://doi.org/10.1000/xyz123\", ").as_deref(),
            Some("10.1000/xyz123")
        );
    }

    #[test]
    fn test_balanced_parentheses_kept() {
        assert_eq!(
            detect_url("https://doi.org/10.1016/S0140-6736(20)30183-5").as_deref(),
            Some("10.1016/S0140-6736(20)30183-5")
        );
        assert_eq!(
            detect_url("https://doi.org/10.1016/S0140-6736(20)30183-5)").as_deref(),
            Some("10.1016/S0140-6736(20)30183-5")
        );
    }

    #[test]
    fn test_doi_prefix_in_url_is_case_insensitive() {
        assert_eq!(
            detect_url("https://example.org/lookup?q=DOI:10.5555/abc-def").as_deref(),
            Some("10.5555/abc-def")
        );
    }

    #[test]
    fn test_bare_doi_in_publisher_url() {
        assert_eq!(
            detect_url("https://dl.acm.org/doi/full/10.1145/3290605.3300230").as_deref(),
            Some("10.1145/3290605.3300230")
        );
    }

    #[test]
    fn test_short_registrant_is_not_a_doi() {
        assert_eq!(detect_url("https://example.org/files/10.12/report"), None);
    }

    #[test]
    fn test_meta_tag_strips_resolver() {
        let tags = vec![MetaTag::named("citation_doi", "https://dx.doi.org/10.1371/journal.pone.0000001")];
        let doi = detect("https://journals.plos.org/article", &tags, "");
        assert_eq!(doi.unwrap().as_str(), "10.1371/journal.pone.0000001");
    }

    #[test]
    fn test_meta_tag_variants() {
        let tags = vec![MetaTag::named("DOI", "10.1000/upper")];
        assert_eq!(detect("https://example.org", &tags, "").unwrap().as_str(), "10.1000/upper");

        let tags = vec![MetaTag {
            name: None,
            property: Some("citation_doi".to_string()),
            content: "doi.org/10.1000/prop".to_string(),
        }];
        assert_eq!(detect("https://example.org", &tags, "").unwrap().as_str(), "10.1000/prop");
    }

    #[test]
    fn test_meta_name_is_case_sensitive() {
        let tags = vec![MetaTag::named("Citation_DOI", "10.1000/ignored")];
        assert_eq!(detect("https://example.org", &tags, ""), None);
    }

    #[test]
    fn test_first_meta_in_document_order_wins() {
        let tags = vec![
            MetaTag::named("description", "not a doi"),
            MetaTag::named("DOI", "10.1000/first"),
            MetaTag::named("citation_doi", "10.1000/second"),
        ];
        assert_eq!(detect("https://example.org", &tags, "").unwrap().as_str(), "10.1000/first");
    }

    #[test]
    fn test_url_beats_meta_beats_body() {
        let tags = vec![MetaTag::named("citation_doi", "10.1000/meta")];
        let body = "DOI: 10.1000/body";
        assert_eq!(
            detect("https://doi.org/10.1000/url", &tags, body).unwrap().as_str(),
            "10.1000/url"
        );
        assert_eq!(detect("https://example.org", &tags, body).unwrap().as_str(), "10.1000/meta");
        assert_eq!(detect("https://example.org", &[], body).unwrap().as_str(), "10.1000/body");
    }

    #[test]
    fn test_body_text_scan() {
        let body = "Received 3 May 2021\nDOI:10.5555/12345678.\nLicensed under CC-BY";
        assert_eq!(
            detect("https://example.org", &[], body).unwrap().as_str(),
            "10.5555/12345678"
        );
    }

    #[test]
    fn test_nothing_found_is_none() {
        let tags = vec![MetaTag::named("citation_title", "Just a title")];
        let body = "A page about many things, version 10.2 of something.";
        assert_eq!(detect("https://example.org/blog/post", &tags, body), None);
    }
}
