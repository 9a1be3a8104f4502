use regex::Regex;

use crate::app::{NotifierError, Result};

pub const DEFAULT_START_MARKER: &str = r#"<body class="docs-gm">"#;
pub const DEFAULT_END_MARKER: &str = "<script";

/// Stands in for every masked attribute.
pub const PLACEHOLDER: &str = "*";

/// Attribute assignments whose values change on every page regeneration.
const VOLATILE_ATTRS: &str = r#"(?:href|id)="\S*""#;

/// Cuts a published page down to the part worth hashing.
///
/// The body is taken strictly between the start marker and the first end
/// marker that follows it; `href="…"` and `id="…"` assignments inside it are
/// replaced with [`PLACEHOLDER`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    start_marker: String,
    end_marker: String,
    volatile: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self::with_markers(DEFAULT_START_MARKER, DEFAULT_END_MARKER)
    }

    pub fn with_markers(start_marker: impl Into<String>, end_marker: impl Into<String>) -> Self {
        Self {
            start_marker: start_marker.into(),
            end_marker: end_marker.into(),
            volatile: Regex::new(VOLATILE_ATTRS).expect("static regex is valid"),
        }
    }

    pub fn normalize(&self, document: &str) -> Result<String> {
        let body = self.extract_body(document)?;
        Ok(self.volatile.replace_all(body, PLACEHOLDER).into_owned())
    }

    fn extract_body<'a>(&self, document: &'a str) -> Result<&'a str> {
        let start = document
            .find(&self.start_marker)
            .map(|i| i + self.start_marker.len())
            .ok_or_else(|| NotifierError::MarkerNotFound(self.start_marker.clone()))?;

        let rest = &document[start..];
        let end = rest
            .find(&self.end_marker)
            .ok_or_else(|| NotifierError::MarkerNotFound(self.end_marker.clone()))?;

        Ok(&rest[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!(
            r#"<html><head><script>var t = 1;</script></head><body class="docs-gm">{}<script>init()</script></body></html>"#,
            body
        )
    }

    #[test]
    fn test_extracts_between_markers() {
        let normalizer = Normalizer::new();
        let out = normalizer.normalize(&page("<table><tr><td>Math</td></tr></table>")).unwrap();
        assert_eq!(out, "<table><tr><td>Math</td></tr></table>");
    }

    #[test]
    fn test_ignores_scripts_before_body() {
        let normalizer = Normalizer::new();
        let out = normalizer.normalize(&page("<p>x</p>")).unwrap();
        assert!(!out.contains("var t"));
    }

    #[test]
    fn test_masks_href_and_id() {
        let normalizer = Normalizer::new();
        let out = normalizer
            .normalize(&page(r#"<a href="https://x/?t=123" id="h.5">Link</a>"#))
            .unwrap();
        assert_eq!(out, "<a * *>Link</a>");
    }

    #[test]
    fn test_deterministic() {
        let normalizer = Normalizer::new();
        let doc = page(r#"<div id="sheet-1"><td>Fizika</td></div>"#);
        assert_eq!(
            normalizer.normalize(&doc).unwrap(),
            normalizer.normalize(&doc).unwrap()
        );
    }

    #[test]
    fn test_missing_start_marker() {
        let normalizer = Normalizer::new();
        let err = normalizer
            .normalize("<html><body><script></script></body></html>")
            .unwrap_err();
        assert!(matches!(err, NotifierError::MarkerNotFound(m) if m == DEFAULT_START_MARKER));
    }

    #[test]
    fn test_missing_end_marker_after_start() {
        let normalizer = Normalizer::new();
        let doc = r#"<script></script><body class="docs-gm"><p>no scripts here</p></body>"#;
        let err = normalizer.normalize(doc).unwrap_err();
        assert!(matches!(err, NotifierError::MarkerNotFound(m) if m == DEFAULT_END_MARKER));
    }

    #[test]
    fn test_custom_markers() {
        let normalizer = Normalizer::with_markers("<main>", "</main>");
        let out = normalizer.normalize("<main>Week 1</main>").unwrap();
        assert_eq!(out, "Week 1");
    }
}
