//! # Acquisition Requests
//!
//! A request names a target URL and one of the five acquisition modes, plus the
//! knobs that shape the traversal. `AcquisitionPayload` is the JSON body accepted
//! by the HTTP surface; each endpoint turns it into an `AcquisitionRequest` for
//! its own mode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Acquisition mode selected by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Full-site crawl collecting every page and the discovered links
    Crawl,
    /// Pattern-based extraction over the first page
    Scrape,
    /// Headless render of a page
    Render,
    /// Plain-text extraction
    ExtractText,
    /// Change detection against the previous check
    Monitor,
}

impl Mode {
    /// Name used in routes and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Crawl => "crawl",
            Mode::Scrape => "scrape",
            Mode::Render => "render",
            Mode::ExtractText => "extract-text",
            Mode::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single acquisition intent
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionRequest {
    /// URL the traversal starts from
    pub target_url: String,

    /// Requested mode
    pub mode: Mode,

    /// Page budget; `None` falls back to the configured default
    pub max_pages: Option<i64>,

    /// URL patterns the engine must not visit
    pub blacklist: Vec<String>,

    /// Whether to render pages with a headless browser
    pub use_headless_render: bool,

    /// How long the headless browser waits before capturing content
    pub headless_wait_ms: Option<u64>,

    /// Extra request headers sent with every fetch
    pub extra_headers: BTreeMap<String, String>,

    /// Named extraction patterns (scrape mode)
    pub extraction_rules: BTreeMap<String, String>,

    /// Cron expression for recurring checks (monitor mode)
    pub schedule_expression: Option<String>,
}

impl AcquisitionRequest {
    /// Create a request with every optional field unset
    pub fn new(target_url: impl Into<String>, mode: Mode) -> Self {
        Self {
            target_url: target_url.into(),
            mode,
            max_pages: None,
            blacklist: Vec::new(),
            use_headless_render: false,
            headless_wait_ms: None,
            extra_headers: BTreeMap::new(),
            extraction_rules: BTreeMap::new(),
            schedule_expression: None,
        }
    }
}

/// JSON body accepted by every acquisition endpoint
///
/// Fields that a given endpoint does not use are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcquisitionPayload {
    pub url: Option<String>,
    pub max_pages: Option<i64>,
    pub blacklist_urls: Vec<String>,
    pub headers: BTreeMap<String, String>,
    pub selectors: BTreeMap<String, String>,
    pub use_headless: bool,
    pub wait_time: Option<u64>,
    pub cron_expression: Option<String>,
}

impl AcquisitionPayload {
    /// Convert the payload into a request for `mode`
    ///
    /// Fails with a validation error when `url` is missing or blank.
    pub fn into_request(self, mode: Mode) -> Result<AcquisitionRequest, Error> {
        let url = self
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Validation("URL is required".to_string()))?;

        let mut request = AcquisitionRequest::new(url, mode);
        match mode {
            Mode::Crawl => {
                request.max_pages = self.max_pages;
                request.blacklist = self.blacklist_urls;
                request.extra_headers = self.headers;
            }
            Mode::Scrape => {
                request.extraction_rules = self.selectors;
                request.use_headless_render = self.use_headless;
            }
            Mode::Render => {
                request.use_headless_render = true;
                request.headless_wait_ms = self.wait_time;
            }
            Mode::ExtractText => {
                request.use_headless_render = self.use_headless;
            }
            Mode::Monitor => {
                request.use_headless_render = self.use_headless;
                request.schedule_expression = self
                    .cron_expression
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty());
            }
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_url_is_rejected() {
        let payload: AcquisitionPayload = serde_json::from_str("{}").unwrap();
        let err = payload.into_request(Mode::Crawl).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "URL is required"));

        let payload: AcquisitionPayload = serde_json::from_str(r#"{"url": "   "}"#).unwrap();
        assert!(payload.into_request(Mode::Scrape).is_err());
    }

    #[test]
    fn test_crawl_payload_fields() {
        let payload: AcquisitionPayload = serde_json::from_str(
            r#"{
                "url": "https://example.com",
                "maxPages": 5,
                "blacklistUrls": ["/private"],
                "headers": {"x-token": "abc"},
                "selectors": {"ignored": "x"}
            }"#,
        )
        .unwrap();
        let request = payload.into_request(Mode::Crawl).unwrap();

        assert_eq!(request.target_url, "https://example.com");
        assert_eq!(request.max_pages, Some(5));
        assert_eq!(request.blacklist, vec!["/private".to_string()]);
        assert_eq!(request.extra_headers.get("x-token").unwrap(), "abc");
        assert!(request.extraction_rules.is_empty());
    }

    #[test]
    fn test_render_forces_headless() {
        let payload: AcquisitionPayload =
            serde_json::from_str(r#"{"url": "https://example.com", "waitTime": 1200}"#).unwrap();
        let request = payload.into_request(Mode::Render).unwrap();
        assert!(request.use_headless_render);
        assert_eq!(request.headless_wait_ms, Some(1200));
    }

    #[test]
    fn test_monitor_blank_cron_is_dropped() {
        let payload: AcquisitionPayload = serde_json::from_str(
            r#"{"url": "https://example.com", "cronExpression": " ", "useHeadless": true}"#,
        )
        .unwrap();
        let request = payload.into_request(Mode::Monitor).unwrap();
        assert!(request.schedule_expression.is_none());
        assert!(request.use_headless_render);
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(Mode::ExtractText.to_string(), "extract-text");
        let mode: Mode = serde_json::from_str("\"monitor\"").unwrap();
        assert_eq!(mode, Mode::Monitor);
    }
}
