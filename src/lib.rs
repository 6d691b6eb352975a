//! # Trawl - Web Content Acquisition Service
//!
//! This crate turns "acquire this site" requests into configured traversals of a
//! crawling engine and shapes what the engine returns. Five modes share one
//! request contract:
//!
//! - `crawl`: every visited page plus the discovered links
//! - `scrape`: named pattern rules applied to the first page
//! - `render`: a headless-rendered page returned verbatim
//! - `extract-text`: plain text of the most recent page
//! - `monitor`: content change detection against the previous check, with an
//!   optional cron schedule for the next run
//!
//! Fetching, rendering and link discovery are delegated to [`spider`]; the crate
//! owns configuration, page normalization, extraction and the content hash store.
//!
//! ## Example
//!
//! ```rust,no_run
//! use trawl::request::{AcquisitionRequest, Mode};
//! use trawl::service::{AcquisitionService, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().default_max_pages(5).build();
//!     let service = AcquisitionService::new(config.spider_factory(), config);
//!
//!     let response = service
//!         .handle(AcquisitionRequest::new("https://example.com", Mode::Crawl))
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```

mod error;

pub mod crawler;
pub mod extraction;
pub mod monitor;
pub mod request;
pub mod server;
pub mod service;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::request::{AcquisitionPayload, AcquisitionRequest, Mode};
    pub use crate::service::{AcquisitionResponse, AcquisitionService, ServiceConfig};
}
