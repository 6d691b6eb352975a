//! Traversal driver
//!
//! Owns one traversal against a crawling engine. Page events are consumed one
//! at a time while the engine runs and are routed according to the mode:
//!
//! | Mode | Collector | Also |
//! |---|---|---|
//! | crawl | every page | discovered links after completion |
//! | scrape | every page | extraction rules on the first page |
//! | render | every page | most recent page returned in full |
//! | extract-text | every page | normalized text of the most recent page |
//! | monitor | every page | change check on the first page |
//!
//! A failed page is recorded with its error and never aborts the traversal.
//! When the optional timeout expires the engine is dropped and the pages already
//! collected are still returned.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::crawler::collector::PageCollector;
use crate::crawler::config::TraversalConfig;
use crate::crawler::content_extraction::normalize_text;
use crate::crawler::engine::{CrawlEngine, EngineCompletion, RawPage};
use crate::crawler::error::TraversalError;
use crate::crawler::PageResult;
use crate::extraction::{self, ExtractionOutcome};
use crate::monitor::{ChangeMonitor, MonitorOutcome};
use crate::request::Mode;

/// Default capacity of the page event channel
pub const DEFAULT_EVENT_BUFFER: usize = 16;

/// Summary of a visited page, without its content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PageResult> for PageSummary {
    fn from(page: &PageResult) -> Self {
        Self {
            url: page.url.clone(),
            title: page.title.clone(),
            status_code: page.status_code,
            content_type: page.content_type.clone(),
            headers: page.headers.clone(),
            error: page.error.clone(),
        }
    }
}

/// Output of a full-site crawl
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlResult {
    pub pages: Vec<PageSummary>,
    pub links: Vec<String>,
}

/// Output of a scrape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub pages: Vec<PageSummary>,
    pub extracted_data: ExtractionOutcome,
}

/// Output of a headless render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderResult {
    pub page: Option<PageResult>,
}

/// Output of a text extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextResult {
    pub text: String,
}

/// Mode-specific result of a traversal
#[derive(Debug, Clone, PartialEq)]
pub enum ModeResult {
    Crawl(CrawlResult),
    Scrape(ScrapeResult),
    Render(RenderResult),
    ExtractText(TextResult),
    Monitor(MonitorOutcome),
}

/// Everything a finished traversal produced
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalOutcome {
    pub result: ModeResult,

    /// Page events received, including those a mode ignored
    pub pages_seen: usize,

    /// The traversal was cut short by the timeout
    pub timed_out: bool,

    /// Visited pages the engine could not deliver
    pub pages_dropped: u64,
}

/// Runs a single traversal; consumed by [`TraversalDriver::run`]
pub struct TraversalDriver<E> {
    engine: E,
    monitor: Arc<ChangeMonitor>,
    timeout: Option<Duration>,
    event_buffer: usize,
}

impl<E: CrawlEngine> TraversalDriver<E> {
    pub fn new(engine: E, monitor: Arc<ChangeMonitor>) -> Self {
        Self {
            engine,
            monitor,
            timeout: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Stop the traversal after `timeout`, keeping the pages collected so far
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Capacity of the page event channel
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    /// Run the engine over `config` and assemble the result for `mode`
    #[instrument(skip(self, config, mode), fields(url = %config.target_url, mode = %mode))]
    pub async fn run(
        mut self,
        config: &TraversalConfig,
        mode: Mode,
    ) -> Result<TraversalOutcome, TraversalError> {
        info!("Starting traversal");
        debug!("Traversal config: {:?}", config);

        let (tx, mut rx) = mpsc::channel(self.event_buffer);
        let mut router = PageRouter::new(mode, config, &self.monitor);

        let timeout = self.timeout;
        let engine = &mut self.engine;
        let crawl = async move {
            match timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, engine.crawl(config, tx)).await {
                        Ok(result) => result.map(|completion| (completion, false)),
                        Err(_) => Ok((EngineCompletion::default(), true)),
                    }
                }
                None => engine
                    .crawl(config, tx)
                    .await
                    .map(|completion| (completion, false)),
            }
        };
        let consume = async {
            while let Some(raw) = rx.recv().await {
                let span = info_span!("process_page", url = %raw.url);
                router.route(raw).instrument(span).await;
            }
        };

        let (engine_result, ()) = tokio::join!(crawl, consume);
        let (completion, timed_out) = engine_result.inspect_err(|e| {
            warn!("Traversal aborted: {}", e);
        })?;

        if router.collector.is_empty() {
            warn!("Engine produced no pages");
        }
        if completion.pages_dropped > 0 {
            warn!(
                pages_dropped = completion.pages_dropped,
                "Engine lost page events, results are incomplete"
            );
        }
        if timed_out {
            warn!(
                pages = router.collector.len(),
                "Traversal timed out, returning collected pages"
            );
        }
        info!(pages_seen = router.pages_seen, "Traversal finished");

        let pages_seen = router.pages_seen;
        let pages_dropped = completion.pages_dropped;
        let result = router.finish(completion)?;
        Ok(TraversalOutcome {
            result,
            pages_seen,
            timed_out,
            pages_dropped,
        })
    }
}

/// Per-traversal routing state
struct PageRouter<'a> {
    mode: Mode,
    target_url: String,
    rules: &'a BTreeMap<String, String>,
    monitor: &'a ChangeMonitor,
    collector: PageCollector,
    pages_seen: usize,
    extracted: Option<ExtractionOutcome>,
    checked: Option<MonitorOutcome>,
    monitor_failure: Option<String>,
    text: Option<String>,
}

impl<'a> PageRouter<'a> {
    fn new(mode: Mode, config: &'a TraversalConfig, monitor: &'a ChangeMonitor) -> Self {
        Self {
            mode,
            target_url: config.target_url.to_string(),
            rules: &config.extraction_rules,
            monitor,
            collector: PageCollector::new(),
            pages_seen: 0,
            extracted: None,
            checked: None,
            monitor_failure: None,
            text: None,
        }
    }

    async fn route(&mut self, raw: RawPage) {
        self.pages_seen += 1;
        let first = self.pages_seen == 1;

        let page = self.collector.collect(raw);
        if let Some(error) = &page.error {
            warn!(url = %page.url, "Page fetch failed: {}", error);
        }

        match self.mode {
            Mode::Crawl | Mode::Render => {}
            Mode::Scrape => {
                if first {
                    if !self.rules.is_empty() {
                        self.extracted = Some(extraction::extract(&page.raw_content, self.rules));
                    }
                } else {
                    debug!(url = %page.url, "Ignoring page beyond the first for extraction");
                }
            }
            Mode::ExtractText => {
                self.text = Some(normalize_text(&page.raw_content));
            }
            Mode::Monitor => {
                if first {
                    match &page.error {
                        None => {
                            let content = page.raw_content.clone();
                            self.checked =
                                Some(self.monitor.check(&self.target_url, &content).await);
                        }
                        Some(error) => self.monitor_failure = Some(error.clone()),
                    }
                } else {
                    debug!(url = %page.url, "Ignoring page beyond the first for monitoring");
                }
            }
        }
    }

    fn finish(self, completion: EngineCompletion) -> Result<ModeResult, TraversalError> {
        let pages = self.collector.into_pages();
        let summaries = || pages.iter().map(PageSummary::from).collect::<Vec<_>>();

        let result = match self.mode {
            Mode::Crawl => {
                let links: BTreeSet<String> = completion.links.into_iter().collect();
                ModeResult::Crawl(CrawlResult {
                    pages: summaries(),
                    links: links.into_iter().collect(),
                })
            }
            Mode::Scrape => ModeResult::Scrape(ScrapeResult {
                pages: summaries(),
                extracted_data: self.extracted.unwrap_or_default(),
            }),
            Mode::Render => ModeResult::Render(RenderResult {
                page: pages.last().cloned(),
            }),
            Mode::ExtractText => ModeResult::ExtractText(TextResult {
                text: self.text.unwrap_or_default(),
            }),
            Mode::Monitor => match self.checked {
                Some(outcome) => ModeResult::Monitor(outcome),
                None => {
                    return Err(TraversalError::NoPage {
                        url: self.target_url,
                        detail: self
                            .monitor_failure
                            .unwrap_or_else(|| "the engine returned no pages".to_string()),
                    });
                }
            },
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::config::{TraversalDefaults, build};
    use crate::crawler::testing::ScriptedEngine;
    use crate::monitor::ContentDigest;
    use crate::request::AcquisitionRequest;

    fn config_for(url: &str, mode: Mode, max_pages: Option<i64>) -> TraversalConfig {
        let mut request = AcquisitionRequest::new(url, mode);
        request.max_pages = max_pages;
        build(&request, TraversalDefaults::default()).unwrap()
    }

    async fn run(engine: ScriptedEngine, config: &TraversalConfig, mode: Mode) -> TraversalOutcome {
        TraversalDriver::new(engine, ChangeMonitor::shared())
            .run(config, mode)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_crawl_single_page() {
        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com", 200, "<title>Example</title>")
                .with_header("Content-Type", "text/html"),
        ])
        .with_links(&["https://example.com/b", "https://example.com/a", "https://example.com/a"]);
        let config = config_for("https://example.com", Mode::Crawl, Some(1));

        let outcome = run(engine, &config, Mode::Crawl).await;
        let ModeResult::Crawl(result) = outcome.result else {
            panic!("expected crawl result");
        };

        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.pages[0].url, "https://example.com");
        assert_eq!(result.pages[0].status_code, Some(200));
        assert_eq!(result.pages[0].title.as_deref(), Some("Example"));
        assert_eq!(
            result.links,
            vec!["https://example.com/a".to_string(), "https://example.com/b".to_string()]
        );
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_page_failure_is_not_fatal() {
        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com", 200, "<p>ok</p>"),
            RawPage::failed("https://example.com/broken", "timed out"),
            RawPage::fetched("https://example.com/next", 200, "<p>ok</p>"),
        ]);
        let config = config_for("https://example.com", Mode::Crawl, None);

        let outcome = run(engine, &config, Mode::Crawl).await;
        let ModeResult::Crawl(result) = outcome.result else {
            panic!("expected crawl result");
        };
        assert_eq!(result.pages.len(), 3);
        assert_eq!(result.pages[1].status_code, None);
        assert_eq!(result.pages[1].error.as_deref(), Some("timed out"));
        assert_eq!(outcome.pages_seen, 3);
    }

    #[tokio::test]
    async fn test_engine_failure_is_fatal() {
        let config = config_for("https://example.com", Mode::Crawl, None);
        let result = TraversalDriver::new(ScriptedEngine::failing("no browser"), ChangeMonitor::shared())
            .run(&config, Mode::Crawl)
            .await;
        assert!(matches!(result, Err(TraversalError::EngineFailure(ref d)) if d == "no browser"));
    }

    #[tokio::test]
    async fn test_scrape_uses_first_page_only() {
        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com", 200, "<title>Hello</title>"),
            RawPage::fetched("https://example.com/other", 200, "<title>Other</title>"),
        ]);
        let mut request = AcquisitionRequest::new("https://example.com", Mode::Scrape);
        request
            .extraction_rules
            .insert("title".to_string(), "<title>(.*?)</title>".to_string());
        let config = build(&request, TraversalDefaults::default()).unwrap();

        let outcome = run(engine, &config, Mode::Scrape).await;
        assert_eq!(outcome.pages_seen, 2);
        let ModeResult::Scrape(result) = outcome.result else {
            panic!("expected scrape result");
        };
        assert_eq!(result.pages.len(), 2);
        assert_eq!(
            result.extracted_data["title"].matches().unwrap(),
            &["Hello".to_string()]
        );
    }

    #[tokio::test]
    async fn test_extract_text_last_write_wins() {
        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com", 200, "<p>first</p>"),
            RawPage::fetched("https://example.com/2", 200, "<p>second&nbsp;page</p>"),
        ]);
        let config = config_for("https://example.com", Mode::ExtractText, None);

        let outcome = run(engine, &config, Mode::ExtractText).await;
        assert_eq!(
            outcome.result,
            ModeResult::ExtractText(TextResult {
                text: "second page".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_extract_text_failed_last_page_wins() {
        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com", 200, "<p>first</p>"),
            RawPage::failed("https://example.com/2", "refused"),
        ]);
        let config = config_for("https://example.com", Mode::ExtractText, None);

        let outcome = run(engine, &config, Mode::ExtractText).await;
        assert_eq!(
            outcome.result,
            ModeResult::ExtractText(TextResult {
                text: String::new()
            })
        );
    }

    #[tokio::test]
    async fn test_dropped_pages_are_reported() {
        let engine = ScriptedEngine::new(vec![RawPage::fetched("https://example.com", 200, "1")])
            .with_dropped(3);
        let config = config_for("https://example.com", Mode::Crawl, None);

        let outcome = run(engine, &config, Mode::Crawl).await;
        assert_eq!(outcome.pages_dropped, 3);
        assert_eq!(outcome.pages_seen, 1);
    }

    #[tokio::test]
    async fn test_page_logs_attach_to_page_span() {
        use std::sync::Mutex;
        use tracing::Subscriber;
        use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
        use tracing_subscriber::registry::LookupSpan;

        #[derive(Clone, Default)]
        struct EventSpans(Arc<Mutex<Vec<Option<String>>>>);

        impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for EventSpans {
            fn on_event(&self, _event: &tracing::Event<'_>, ctx: Context<'_, S>) {
                let span = ctx.lookup_current().map(|span| span.name().to_string());
                self.0.lock().unwrap().push(span);
            }
        }

        let spans = EventSpans::default();
        let subscriber = tracing_subscriber::registry().with(spans.clone());
        let _default = tracing::subscriber::set_default(subscriber);

        let engine = ScriptedEngine::new(vec![RawPage::failed("https://example.com", "refused")]);
        let config = config_for("https://example.com", Mode::Crawl, None);
        run(engine, &config, Mode::Crawl).await;

        let seen = spans.0.lock().unwrap();
        assert!(
            seen.iter()
                .any(|span| span.as_deref() == Some("process_page"))
        );
    }

    #[tokio::test]
    async fn test_render_returns_page_verbatim() {
        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com", 200, "<div id=app>rendered</div>")
                .with_header("content-type", "text/html")
                .with_header("x-served-by", "edge"),
        ]);
        let config = config_for("https://example.com", Mode::Render, None);
        assert!(config.headless);

        let outcome = run(engine, &config, Mode::Render).await;
        let ModeResult::Render(RenderResult { page: Some(page) }) = outcome.result else {
            panic!("expected rendered page");
        };
        assert_eq!(page.raw_content, "<div id=app>rendered</div>");
        assert_eq!(page.headers.get("x-served-by").unwrap(), "edge");
        assert_eq!(page.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_render_without_pages() {
        let config = config_for("https://example.com", Mode::Render, None);
        let outcome = run(ScriptedEngine::new(vec![]), &config, Mode::Render).await;
        assert_eq!(outcome.result, ModeResult::Render(RenderResult { page: None }));
    }

    #[tokio::test]
    async fn test_monitor_first_page_keyed_by_target() {
        let monitor = ChangeMonitor::shared();
        let config = config_for("https://example.com", Mode::Monitor, None);

        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com/", 200, "A"),
            RawPage::fetched("https://example.com/other", 200, "ignored"),
        ]);
        let outcome = TraversalDriver::new(engine, monitor.clone())
            .run(&config, Mode::Monitor)
            .await
            .unwrap();
        let ModeResult::Monitor(first) = outcome.result else {
            panic!("expected monitor outcome");
        };
        assert!(first.is_first_check);
        assert!(!first.has_changed);

        let engine = ScriptedEngine::new(vec![RawPage::fetched("https://example.com/", 200, "B")]);
        let outcome = TraversalDriver::new(engine, monitor.clone())
            .run(&config, Mode::Monitor)
            .await
            .unwrap();
        let ModeResult::Monitor(second) = outcome.result else {
            panic!("expected monitor outcome");
        };
        assert!(!second.is_first_check);
        assert!(second.has_changed);
        assert_eq!(second.previous_digest, Some(ContentDigest::of("A")));
        assert_eq!(second.current_digest, ContentDigest::of("B"));
    }

    #[tokio::test]
    async fn test_monitor_failed_page_leaves_store_untouched() {
        let monitor = ChangeMonitor::shared();
        let config = config_for("https://example.com", Mode::Monitor, None);
        let engine = ScriptedEngine::new(vec![RawPage::failed("https://example.com/", "dns")]);

        let result = TraversalDriver::new(engine, monitor.clone())
            .run(&config, Mode::Monitor)
            .await;
        assert!(matches!(result, Err(TraversalError::NoPage { ref detail, .. }) if detail == "dns"));
        assert!(monitor.record("https://example.com/").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_collected_pages() {
        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com", 200, "1"),
            RawPage::fetched("https://example.com/2", 200, "2"),
            RawPage::fetched("https://example.com/3", 200, "3"),
        ])
        .with_delay(Duration::from_secs(10));
        let config = config_for("https://example.com", Mode::Crawl, None);

        let outcome = TraversalDriver::new(engine, ChangeMonitor::shared())
            .with_timeout(Some(Duration::from_secs(25)))
            .run(&config, Mode::Crawl)
            .await
            .unwrap();

        assert!(outcome.timed_out);
        let ModeResult::Crawl(result) = outcome.result else {
            panic!("expected crawl result");
        };
        assert_eq!(result.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_budget_passed_to_engine() {
        let engine = ScriptedEngine::new(vec![
            RawPage::fetched("https://example.com", 200, "1"),
            RawPage::fetched("https://example.com/2", 200, "2"),
        ]);
        let seen = engine.seen_configs.clone();
        let config = config_for("https://example.com", Mode::Crawl, Some(1));

        let outcome = run(engine, &config, Mode::Crawl).await;
        assert_eq!(outcome.pages_seen, 1);
        assert_eq!(seen.lock().unwrap()[0].max_pages, 1);
    }
}
