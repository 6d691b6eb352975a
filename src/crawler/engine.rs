//! Crawling engine capability
//!
//! The engine performs every fetch, render and parse. The rest of the crate only
//! sees the page events it emits and the links it discovered.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::crawler::config::TraversalConfig;
use crate::crawler::error::TraversalError;

/// One page as reported by the engine, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    /// URL the engine visited
    pub url: String,

    /// HTTP status, absent when the fetch itself failed
    pub status_code: Option<u16>,

    /// Response headers as received; names may repeat
    pub headers: Vec<(String, String)>,

    /// Page body, absent when the fetch failed
    pub content: Option<String>,

    /// Engine-reported failure for this page
    pub error: Option<String>,
}

impl RawPage {
    /// A successfully fetched page
    pub fn fetched(url: impl Into<String>, status_code: u16, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code: Some(status_code),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A page the engine failed to fetch
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Add a response header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// What the engine reports once a traversal is finished
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineCompletion {
    /// Every link the engine discovered
    pub links: Vec<String>,

    /// Visited pages whose events never reached the consumer
    pub pages_dropped: u64,
}

/// A crawling engine able to run one traversal
///
/// Page events are sent on `events` one at a time; the receiver sees them in
/// send order. Returning `Err` means the traversal as a whole could not run;
/// single page failures are reported as `RawPage::failed` events instead.
#[async_trait]
pub trait CrawlEngine: Send {
    async fn crawl(
        &mut self,
        config: &TraversalConfig,
        events: mpsc::Sender<RawPage>,
    ) -> Result<EngineCompletion, TraversalError>;
}

/// Creates a fresh engine for every traversal
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: CrawlEngine + 'static;

    fn create(&self) -> Self::Engine;
}
