//! # Acquisition Service
//!
//! Ties the pieces together for one request: build the traversal config, run a
//! fresh engine through the driver, and shape the JSON response. The service owns
//! the shared `ChangeMonitor`; everything else lives for one request only.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use crate::crawler::{
    self, CrawlResult, EngineFactory, ModeResult, PageResult, ScrapeResult, SpiderEngineFactory,
    TextResult, TraversalDefaults, TraversalDriver,
};
use crate::error::Result;
use crate::extraction::ExtractionOutcome;
use crate::monitor::{ChangeMonitor, ContentDigest, next_run_after};
use crate::request::{AcquisitionRequest, Mode};

/// Service-wide settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Page budget when a request has none
    pub default_max_pages: u32,

    /// Headless wait in milliseconds when a request has none
    pub default_headless_wait_ms: u64,

    /// User agent sent by the spider engine
    pub user_agent: String,

    /// Whether the spider engine respects robots.txt
    pub respect_robots_txt: bool,

    /// Upper bound on one traversal; `None` waits for the engine
    pub traversal_timeout: Option<Duration>,

    /// Capacity of the driver's page event channel
    pub event_buffer: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_max_pages: crawler::config::DEFAULT_MAX_PAGES,
            default_headless_wait_ms: crawler::config::DEFAULT_HEADLESS_WAIT_MS,
            user_agent: format!("trawl/{}", env!("CARGO_PKG_VERSION")),
            respect_robots_txt: true,
            traversal_timeout: None,
            event_buffer: crawler::DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Builder for ServiceConfig
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
        }
    }

    /// Set the default page budget
    pub fn default_max_pages(mut self, max_pages: u32) -> Self {
        self.config.default_max_pages = max_pages;
        self
    }

    /// Set the default headless wait in milliseconds
    pub fn default_headless_wait_ms(mut self, wait_ms: u64) -> Self {
        self.config.default_headless_wait_ms = wait_ms;
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set whether robots.txt is respected
    pub fn respect_robots_txt(mut self, respect: bool) -> Self {
        self.config.respect_robots_txt = respect;
        self
    }

    /// Set the traversal timeout
    pub fn traversal_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.traversal_timeout = timeout;
        self
    }

    /// Set the page event channel capacity
    pub fn event_buffer(mut self, event_buffer: usize) -> Self {
        self.config.event_buffer = event_buffer;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ServiceConfig {
        self.config
    }
}

impl ServiceConfig {
    /// Create a new builder
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::new()
    }

    /// Spider engine factory carrying these settings
    pub fn spider_factory(&self) -> SpiderEngineFactory {
        SpiderEngineFactory {
            user_agent: self.user_agent.clone(),
            respect_robots_txt: self.respect_robots_txt,
            subscription_capacity: self.event_buffer.max(1),
        }
    }

    fn defaults(&self) -> TraversalDefaults {
        TraversalDefaults {
            max_pages: self.default_max_pages,
            headless_wait_ms: self.default_headless_wait_ms,
        }
    }
}

/// Success body of the crawl endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: CrawlResult,
    pub timed_out: bool,
    /// Visited pages missing from `pages`
    pub pages_dropped: u64,
}

/// Success body of the scrape endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub success: bool,
    pub url: String,
    pub pages: Vec<crawler::PageSummary>,
    pub extracted_data: ExtractionOutcome,
}

/// Success body of the render endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RenderResponse {
    pub success: bool,
    pub page: Option<PageResult>,
}

/// Success body of the extract-text endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TextResponse {
    pub success: bool,
    pub url: String,
    pub text: String,
}

/// Success body of the monitor endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResponse {
    pub success: bool,
    pub url: String,
    pub is_first_check: bool,
    pub has_changed: bool,
    pub current_hash: ContentDigest,
    pub previous_hash: Option<ContentDigest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Response for any mode
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AcquisitionResponse {
    Crawl(CrawlResponse),
    Scrape(ScrapeResponse),
    Render(RenderResponse),
    ExtractText(TextResponse),
    Monitor(MonitorResponse),
}

/// Runs acquisition requests against engines from `F`
pub struct AcquisitionService<F> {
    factory: F,
    monitor: Arc<ChangeMonitor>,
    config: ServiceConfig,
}

impl<F: EngineFactory> AcquisitionService<F> {
    pub fn new(factory: F, config: ServiceConfig) -> Self {
        Self::with_monitor(factory, config, ChangeMonitor::shared())
    }

    /// Use an existing monitor, e.g. one shared with another service
    pub fn with_monitor(factory: F, config: ServiceConfig, monitor: Arc<ChangeMonitor>) -> Self {
        Self {
            factory,
            monitor,
            config,
        }
    }

    pub fn monitor(&self) -> &Arc<ChangeMonitor> {
        &self.monitor
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Handle one request
    #[instrument(skip(self, request), fields(url = %request.target_url, mode = %request.mode))]
    pub async fn handle(&self, request: AcquisitionRequest) -> Result<AcquisitionResponse> {
        self.handle_at(request, Utc::now()).await
    }

    /// Handle one request, computing the next scheduled run relative to `now`
    pub async fn handle_at(
        &self,
        request: AcquisitionRequest,
        now: DateTime<Utc>,
    ) -> Result<AcquisitionResponse> {
        let config = crawler::build(&request, self.config.defaults())?;

        let next_run_at = match (&request.mode, &request.schedule_expression) {
            (Mode::Monitor, Some(expression)) => Some(next_run_after(expression, now)?),
            _ => None,
        };

        let outcome = TraversalDriver::new(self.factory.create(), self.monitor.clone())
            .with_timeout(self.config.traversal_timeout)
            .with_event_buffer(self.config.event_buffer)
            .run(&config, request.mode)
            .await?;

        info!(
            pages_seen = outcome.pages_seen,
            timed_out = outcome.timed_out,
            pages_dropped = outcome.pages_dropped,
            "Request completed"
        );

        let url = request.target_url;
        let response = match outcome.result {
            ModeResult::Crawl(result) => AcquisitionResponse::Crawl(CrawlResponse {
                success: true,
                result,
                timed_out: outcome.timed_out,
                pages_dropped: outcome.pages_dropped,
            }),
            ModeResult::Scrape(ScrapeResult {
                pages,
                extracted_data,
            }) => AcquisitionResponse::Scrape(ScrapeResponse {
                success: true,
                url,
                pages,
                extracted_data,
            }),
            ModeResult::Render(result) => AcquisitionResponse::Render(RenderResponse {
                success: true,
                page: result.page,
            }),
            ModeResult::ExtractText(TextResult { text }) => {
                AcquisitionResponse::ExtractText(TextResponse {
                    success: true,
                    url,
                    text,
                })
            }
            ModeResult::Monitor(checked) => AcquisitionResponse::Monitor(MonitorResponse {
                success: true,
                url,
                is_first_check: checked.is_first_check,
                has_changed: checked.has_changed,
                current_hash: checked.current_digest,
                previous_hash: checked.previous_digest,
                next_run_at,
            }),
        };
        Ok(response)
    }
}
