//! Page event collection
//!
//! Turns the engine's raw page events into normalized `PageResult`s, kept in
//! arrival order for the lifetime of one traversal.

use std::collections::BTreeMap;

use tracing::debug;

use crate::crawler::content_extraction::extract_title;
use crate::crawler::engine::RawPage;
use crate::crawler::PageResult;

/// Marker stored as the error of a failed page when the engine gave no reason
const UNKNOWN_FETCH_ERROR: &str = "page could not be fetched";

/// Accumulates the pages of one traversal
#[derive(Debug, Default)]
pub struct PageCollector {
    pages: Vec<PageResult>,
}

impl PageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize and store a page, returning the stored result
    pub fn collect(&mut self, raw: RawPage) -> &PageResult {
        let page = normalize_page(raw);
        debug!(url = %page.url, status = ?page.status_code, "collected page");
        self.pages.push(page);
        &self.pages[self.pages.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[PageResult] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<PageResult> {
        self.pages
    }
}

/// Normalize a raw engine page
///
/// Header names are lowercased and repeated headers joined with `", "`. The
/// content type comes from the `content-type` header. A page whose fetch failed
/// keeps no status code and carries an error marker instead of content.
pub fn normalize_page(raw: RawPage) -> PageResult {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in raw.headers {
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_string();
        headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    let content_type = headers.get("content-type").cloned();

    let failed = raw.error.is_some() || raw.status_code.is_none() || raw.content.is_none();
    if failed {
        let error = raw
            .error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_FETCH_ERROR.to_string());
        return PageResult {
            url: raw.url,
            status_code: None,
            content_type,
            headers,
            raw_content: String::new(),
            title: None,
            error: Some(error),
        };
    }

    let raw_content = raw.content.unwrap_or_default();
    let title = if looks_like_html(content_type.as_deref(), &raw_content) {
        extract_title(&raw_content)
    } else {
        None
    };

    PageResult {
        url: raw.url,
        status_code: raw.status_code,
        content_type,
        headers,
        raw_content,
        title,
        error: None,
    }
}

fn looks_like_html(content_type: Option<&str>, content: &str) -> bool {
    match content_type {
        Some(ct) => ct.to_ascii_lowercase().contains("html"),
        None => content.trim_start().starts_with('<'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_in_arrival_order() {
        let mut collector = PageCollector::new();
        collector.collect(RawPage::fetched("https://example.com/b", 200, "b"));
        collector.collect(RawPage::fetched("https://example.com/a", 200, "a"));

        let urls: Vec<_> = collector.pages().iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/b", "https://example.com/a"]);
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn test_headers_normalized() {
        let raw = RawPage::fetched(
            "https://example.com",
            200,
            "<html><title>Home</title></html>",
        )
        .with_header("Content-Type", "text/html; charset=utf-8")
        .with_header("Set-Cookie", "a=1")
        .with_header("set-cookie", "b=2");

        let page = normalize_page(raw);
        assert_eq!(page.content_type.as_deref(), Some("text/html; charset=utf-8"));
        assert_eq!(page.headers.get("set-cookie").unwrap(), "a=1, b=2");
        assert_eq!(page.title.as_deref(), Some("Home"));
        assert_eq!(page.status_code, Some(200));
        assert!(page.error.is_none());
    }

    #[test]
    fn test_failed_page_gets_error_marker() {
        let page = normalize_page(RawPage::failed("https://example.com/x", "connection reset"));
        assert_eq!(page.status_code, None);
        assert_eq!(page.error.as_deref(), Some("connection reset"));
        assert!(page.raw_content.is_empty());

        let page = normalize_page(RawPage {
            url: "https://example.com/y".to_string(),
            ..Default::default()
        });
        assert_eq!(page.error.as_deref(), Some(UNKNOWN_FETCH_ERROR));
    }

    #[test]
    fn test_no_title_for_non_html() {
        let raw = RawPage::fetched("https://example.com/data.json", 200, "{\"title\": 1}")
            .with_header("content-type", "application/json");
        assert_eq!(normalize_page(raw).title, None);
    }
}
