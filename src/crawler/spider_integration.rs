//! Integration with spider library for web crawling

use async_trait::async_trait;
use spider::compact_str::CompactString;
use spider::page::Page;
use spider::reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use spider::website::Website;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::crawler::config::TraversalConfig;
use crate::crawler::driver::DEFAULT_EVENT_BUFFER;
use crate::crawler::engine::{CrawlEngine, EngineCompletion, EngineFactory, RawPage};
use crate::crawler::error::TraversalError;

/// Settings shared by every spider engine a factory creates
#[derive(Debug, Clone)]
pub struct SpiderEngineFactory {
    /// User agent sent with every request
    pub user_agent: String,

    /// Whether to respect robots.txt
    pub respect_robots_txt: bool,

    /// Capacity of spider's page broadcast channel
    pub subscription_capacity: usize,
}

impl Default for SpiderEngineFactory {
    fn default() -> Self {
        Self {
            user_agent: format!("trawl/{}", env!("CARGO_PKG_VERSION")),
            respect_robots_txt: true,
            subscription_capacity: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl EngineFactory for SpiderEngineFactory {
    type Engine = SpiderEngine;

    fn create(&self) -> SpiderEngine {
        SpiderEngine {
            settings: self.clone(),
        }
    }
}

/// Crawl engine backed by `spider::website::Website`
#[derive(Debug, Clone)]
pub struct SpiderEngine {
    settings: SpiderEngineFactory,
}

impl SpiderEngine {
    fn website(&self, config: &TraversalConfig) -> Result<Website, TraversalError> {
        let mut website = Website::new(config.target_url.as_str());
        website
            .configuration
            .with_respect_robots_txt(self.settings.respect_robots_txt)
            .with_user_agent(Some(&self.settings.user_agent))
            .with_limit(config.max_pages);

        if !config.blacklist.is_empty() {
            let blacklist: Vec<CompactString> = config
                .blacklist
                .iter()
                .map(|pattern| CompactString::from(pattern.as_str()))
                .collect();
            website.configuration.with_blacklist_url(Some(blacklist));
        }

        if !config.headers.is_empty() {
            website
                .configuration
                .with_headers(Some(header_map(config)?));
        }

        if config.headless {
            configure_headless(&mut website, config)?;
        }

        Ok(website)
    }
}

#[cfg(feature = "chrome")]
fn configure_headless(website: &mut Website, config: &TraversalConfig) -> Result<(), TraversalError> {
    use spider::features::chrome_common::WaitForDelay;

    website
        .configuration
        .with_wait_for_delay(Some(WaitForDelay::new(config.headless_wait())));
    Ok(())
}

#[cfg(not(feature = "chrome"))]
fn configure_headless(_website: &mut Website, _config: &TraversalConfig) -> Result<(), TraversalError> {
    Err(TraversalError::EngineFailure(
        "headless rendering is unavailable: built without the `chrome` feature".to_string(),
    ))
}

fn header_map(config: &TraversalConfig) -> Result<HeaderMap, TraversalError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TraversalError::EngineFailure(format!("Invalid header {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TraversalError::EngineFailure(format!("Invalid header value: {}", e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Convert a spider page into an engine-neutral page event
fn raw_page(page: &Page) -> RawPage {
    let url = page.get_url().to_string();

    let headers = page
        .headers
        .as_ref()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    if let Some(error) = &page.error_status {
        return RawPage {
            url,
            headers,
            error: Some(error.to_string()),
            ..Default::default()
        };
    }

    RawPage {
        url,
        status_code: Some(page.status_code.as_u16()),
        headers,
        content: Some(page.get_html()),
        error: None,
    }
}

/// Largest broadcast buffer requested from spider, whatever the page budget
const MAX_SUBSCRIPTION_CAPACITY: usize = 4096;

/// Aborts the task when dropped, e.g. when a timeout drops the crawl future
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drain spider's broadcast into an unbounded queue so the subscription never
/// waits on page processing. Returns the number of pages spider reported as lost.
async fn forward_pages(
    mut rx: broadcast::Receiver<Page>,
    queue: mpsc::UnboundedSender<RawPage>,
) -> u64 {
    let mut dropped = 0;
    loop {
        match rx.recv().await {
            Ok(page) => {
                debug!("Received page: {}", page.get_url());
                if queue.send(raw_page(&page)).is_err() {
                    debug!("Page relay went away, stopping forwarder");
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Page subscription lagged, {} pages were not delivered", skipped);
                dropped += skipped;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    dropped
}

/// Hand queued pages to the driver at the pace it consumes them
async fn relay_pages(
    mut queue: mpsc::UnboundedReceiver<RawPage>,
    events: mpsc::Sender<RawPage>,
) {
    while let Some(page) = queue.recv().await {
        if events.send(page).await.is_err() {
            debug!("Page consumer went away, stopping relay");
            break;
        }
    }
}

#[async_trait]
impl CrawlEngine for SpiderEngine {
    #[instrument(skip(self, config, events), fields(url = %config.target_url))]
    async fn crawl(
        &mut self,
        config: &TraversalConfig,
        events: mpsc::Sender<RawPage>,
    ) -> Result<EngineCompletion, TraversalError> {
        let mut website = self.website(config)?;

        let capacity = (config.max_pages as usize)
            .min(MAX_SUBSCRIPTION_CAPACITY)
            .max(self.settings.subscription_capacity.max(1));
        let rx = website.subscribe(capacity);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let mut forwarder = AbortOnDrop(tokio::spawn(forward_pages(rx, queue_tx)));
        let mut relay = AbortOnDrop(tokio::spawn(relay_pages(queue_rx, events)));

        if config.headless {
            website.crawl().await;
        } else {
            website.crawl_raw().await;
        }
        info!("Crawl finished");
        website.unsubscribe();

        let pages_dropped = (&mut forwarder.0).await?;
        (&mut relay.0).await?;
        if pages_dropped > 0 {
            warn!(pages_dropped, "Pages were lost by the subscription");
        }

        let mut links: Vec<String> = website
            .get_links()
            .iter()
            .map(|link| link.inner().to_string())
            .collect();
        links.sort();
        info!("Discovered {} links", links.len());

        Ok(EngineCompletion {
            links,
            pages_dropped,
        })
    }
}
