//! # Website Acquisition Module
//!
//! This module drives a crawling engine over a target site and shapes what it
//! returns. The engine does every fetch and render; this module decides what to
//! ask of it and what to keep.
//!
//! ## Key Components
//!
//! - `TraversalConfig` / `build`: validated traversal parameters built from a request
//! - `CrawlEngine`: the engine capability, with a `spider` backed implementation
//! - `PageCollector`: normalizes page events into `PageResult`s in arrival order
//! - `TraversalDriver`: runs one traversal and routes page events per mode
//! - `normalize_text`: HTML to plain text for the extract-text mode
//!
//! ## Usage
//!
//! Build a config from an `AcquisitionRequest`, create an engine, and hand both to
//! a `TraversalDriver` together with the shared `ChangeMonitor`.

mod collector;
pub mod config;
mod content_extraction;
mod driver;
mod engine;
mod error;
mod spider_integration;
#[cfg(test)]
pub(crate) mod testing;

pub use collector::{PageCollector, normalize_page};
pub use config::{TraversalConfig, TraversalDefaults, build};
pub use content_extraction::{extract_title, normalize_text};
pub use driver::{
    CrawlResult, DEFAULT_EVENT_BUFFER, ModeResult, PageSummary, RenderResult, ScrapeResult,
    TextResult, TraversalDriver, TraversalOutcome,
};
pub use engine::{CrawlEngine, EngineCompletion, EngineFactory, RawPage};
pub use error::{ConfigError, TraversalError};
pub use spider_integration::{SpiderEngine, SpiderEngineFactory};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A page visited during one traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// URL of the page
    pub url: String,

    /// HTTP status; absent when the fetch failed
    pub status_code: Option<u16>,

    /// Value of the content-type header
    pub content_type: Option<String>,

    /// Response headers, names lowercased
    pub headers: BTreeMap<String, String>,

    /// Page body as fetched or rendered
    #[serde(rename = "content")]
    pub raw_content: String,

    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Fetch failure for this page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
