//! # Traversal Configuration Module
//!
//! This module turns an `AcquisitionRequest` into a validated `TraversalConfig`,
//! the only shape the crawling engine ever sees.
//!
//! ## Key Components
//!
//! - `TraversalConfig`: budget, blacklist, rendering mode and header overrides for one traversal
//! - `TraversalDefaults`: fallbacks applied when the request leaves a field unset
//! - `build`: the pure request-to-config translation
//!
//! ## Rules
//!
//! - The target must be an absolute http(s) URL
//! - The page budget is never below one; unset means the default budget
//! - Blacklist entries are trimmed, deduplicated and must compile as patterns
//! - Headless traversals always carry a wait time, defaulted when the caller gave none
//! - Render traversals are always headless

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use regex::Regex;
use spider::reqwest::header::{HeaderName, HeaderValue};
use url::Url;

use crate::crawler::error::ConfigError;
use crate::request::{AcquisitionRequest, Mode};

/// Default page budget
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Default headless wait in milliseconds
pub const DEFAULT_HEADLESS_WAIT_MS: u64 = 5000;

/// Fallback values used by [`build`]
#[derive(Debug, Clone, Copy)]
pub struct TraversalDefaults {
    /// Page budget when the request has none
    pub max_pages: u32,

    /// Headless wait when the request has none
    pub headless_wait_ms: u64,
}

impl Default for TraversalDefaults {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            headless_wait_ms: DEFAULT_HEADLESS_WAIT_MS,
        }
    }
}

/// Validated configuration for a single traversal
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalConfig {
    /// Absolute URL the traversal starts from
    pub target_url: Url,

    /// Maximum number of pages the engine may fetch
    pub max_pages: u32,

    /// Deduplicated URL patterns to skip; empty means no filtering
    pub blacklist: BTreeSet<String>,

    /// Whether pages are rendered by a headless browser
    pub headless: bool,

    /// Wait before capturing rendered content; always set when `headless` is
    pub headless_wait_ms: Option<u64>,

    /// Header overrides sent with every request
    pub headers: BTreeMap<String, String>,

    /// Named extraction patterns
    pub extraction_rules: BTreeMap<String, String>,
}

impl TraversalConfig {
    /// The headless wait as a Duration
    pub fn headless_wait(&self) -> Option<Duration> {
        self.headless_wait_ms.map(Duration::from_millis)
    }
}

/// Build a traversal configuration from a request
///
/// Pure: performs no I/O and never touches shared state.
pub fn build(
    request: &AcquisitionRequest,
    defaults: TraversalDefaults,
) -> Result<TraversalConfig, ConfigError> {
    let target_url = parse_target(&request.target_url)?;

    let max_pages = match request.max_pages {
        Some(n) => n.clamp(1, i64::from(u32::MAX)) as u32,
        None => defaults.max_pages.max(1),
    };

    let mut blacklist = BTreeSet::new();
    for pattern in request.blacklist.iter().map(|p| p.trim()) {
        if pattern.is_empty() {
            continue;
        }
        Regex::new(pattern).map_err(|e| ConfigError::InvalidBlacklistPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        blacklist.insert(pattern.to_string());
    }

    let mut headers = BTreeMap::new();
    for (name, value) in &request.extra_headers {
        let name = name.trim();
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        headers.insert(name.to_ascii_lowercase(), value.clone());
    }

    let headless = request.use_headless_render || request.mode == Mode::Render;
    let headless_wait_ms = if headless {
        Some(request.headless_wait_ms.unwrap_or(defaults.headless_wait_ms))
    } else {
        None
    };

    Ok(TraversalConfig {
        target_url,
        max_pages,
        blacklist,
        headless,
        headless_wait_ms,
        headers,
        extraction_rules: request.extraction_rules.clone(),
    })
}

fn parse_target(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::MissingUrl);
    }

    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        scheme => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", scheme),
        }),
    }
}
