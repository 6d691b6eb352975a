//! Scripted engine for tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::crawler::config::TraversalConfig;
use crate::crawler::engine::{CrawlEngine, EngineCompletion, EngineFactory, RawPage};
use crate::crawler::error::TraversalError;

/// Replays a fixed list of page events
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    pub pages: Vec<RawPage>,
    pub links: Vec<String>,
    pub fail_start: Option<String>,
    /// Pause before each event
    pub delay: Option<Duration>,
    /// Reported as lost by the engine
    pub dropped: u64,
    /// Configs this engine was run with
    pub seen_configs: Arc<Mutex<Vec<TraversalConfig>>>,
}

impl ScriptedEngine {
    pub fn new(pages: Vec<RawPage>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    pub fn with_links(mut self, links: &[&str]) -> Self {
        self.links = links.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn failing(detail: &str) -> Self {
        Self {
            fail_start: Some(detail.to_string()),
            ..Default::default()
        }
    }

    pub fn with_dropped(mut self, dropped: u64) -> Self {
        self.dropped = dropped;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl CrawlEngine for ScriptedEngine {
    async fn crawl(
        &mut self,
        config: &TraversalConfig,
        events: mpsc::Sender<RawPage>,
    ) -> Result<EngineCompletion, TraversalError> {
        self.seen_configs
            .lock()
            .expect("config log poisoned")
            .push(config.clone());

        if let Some(detail) = &self.fail_start {
            return Err(TraversalError::EngineFailure(detail.clone()));
        }

        for page in self.pages.iter().take(config.max_pages as usize) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if events.send(page.clone()).await.is_err() {
                break;
            }
        }

        Ok(EngineCompletion {
            links: self.links.clone(),
            pages_dropped: self.dropped,
        })
    }
}

/// Hands out clones of one scripted engine
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    pub engine: ScriptedEngine,
}

impl ScriptedFactory {
    pub fn new(engine: ScriptedEngine) -> Self {
        Self { engine }
    }
}

impl EngineFactory for ScriptedFactory {
    type Engine = ScriptedEngine;

    fn create(&self) -> ScriptedEngine {
        self.engine.clone()
    }
}
