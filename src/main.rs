//! # Trawl CLI Application
//!
//! Command-line entry point for the acquisition service.
//!
//! ## Subcommands
//!
//! - `serve`: run the HTTP API
//! - `crawl`, `scrape`, `render`, `extract-text`, `monitor`: run one request and
//!   print the same JSON the HTTP API would return
//! - `next-run`: print upcoming run times of a cron expression
//!
//! Service-wide options (page budget, user agent, timeout, ...) are shared by
//! every subcommand. `--otel` exports traces and metrics over OTLP and
//! `--log-file` mirrors logs into a file.

mod telemetry;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::instrument;
use trawl::monitor::next_run_after;
use trawl::request::{AcquisitionRequest, Mode};
use trawl::service::{AcquisitionService, ServiceConfig};

#[derive(Parser)]
#[command(author, version, about = "Web content acquisition service", long_about = None)]
struct Cli {
    /// Export traces and metrics over OTLP
    #[arg(long, global = true)]
    otel: bool,

    /// Directory to write trawl.log into
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve(ServeArgs),

    /// Crawl a site and list its pages and links
    Crawl(CrawlArgs),

    /// Apply extraction patterns to the first page of a site
    Scrape(ScrapeArgs),

    /// Render a page with a headless browser
    Render(RenderArgs),

    /// Extract the plain text of a page
    ExtractText(TextArgs),

    /// Check a page for content changes
    Monitor(MonitorArgs),

    /// Print the next run times of a cron expression
    NextRun(NextRunArgs),
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Page budget when a request has none
    #[arg(long, global = true, default_value = "20")]
    default_max_pages: u32,

    /// Headless wait in milliseconds when a request has none
    #[arg(long, global = true, default_value = "5000")]
    default_wait_ms: u64,

    /// User agent sent with every request
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Ignore robots.txt
    #[arg(long, global = true)]
    ignore_robots: bool,

    /// Give up on a traversal after this many seconds, keeping collected pages
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Capacity of the page event channel
    #[arg(long, global = true, default_value = "16")]
    event_buffer: usize,
}

impl ServiceArgs {
    fn to_config(&self) -> ServiceConfig {
        let mut builder = ServiceConfig::builder()
            .default_max_pages(self.default_max_pages)
            .default_headless_wait_ms(self.default_wait_ms)
            .respect_robots_txt(!self.ignore_robots)
            .traversal_timeout(self.timeout_secs.map(Duration::from_secs))
            .event_buffer(self.event_buffer);
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        builder.build()
    }
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// URL to crawl
    #[arg(required = true)]
    url: String,

    /// Maximum number of pages to crawl
    #[arg(short = 'p', long)]
    max_pages: Option<i64>,

    /// URL pattern to skip (repeatable)
    #[arg(short, long)]
    blacklist: Vec<String>,

    /// Extra request header as NAME=VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_key_val)]
    headers: Vec<(String, String)>,
}

#[derive(Args, Debug)]
struct ScrapeArgs {
    /// URL to scrape
    #[arg(required = true)]
    url: String,

    /// Extraction rule as NAME=PATTERN (repeatable)
    #[arg(short, long = "selector", value_parser = parse_key_val)]
    selectors: Vec<(String, String)>,

    /// Render with a headless browser
    #[arg(long)]
    headless: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// URL to render
    #[arg(required = true)]
    url: String,

    /// Milliseconds to wait before capturing the page
    #[arg(short, long)]
    wait_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct TextArgs {
    /// URL to extract text from
    #[arg(required = true)]
    url: String,

    /// Render with a headless browser
    #[arg(long)]
    headless: bool,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// URL to check
    #[arg(required = true)]
    url: String,

    /// Cron expression of the recurring check
    #[arg(short, long)]
    cron: Option<String>,

    /// Render with a headless browser
    #[arg(long)]
    headless: bool,
}

#[derive(Args, Debug)]
struct NextRunArgs {
    /// Cron expression (5, 6 or 7 fields)
    #[arg(required = true)]
    expression: String,

    /// Number of upcoming runs to print
    #[arg(short = 'n', long, default_value = "1")]
    count: usize,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let _telemetry = telemetry::init_tracing_subscriber(cli.otel, cli.log_file.as_deref())?;
    let config = cli.service.to_config();

    // Execute the appropriate command
    match cli.command {
        Some(Commands::Serve(args)) => serve_command(args, config).await?,
        Some(Commands::Crawl(args)) => {
            let mut request = AcquisitionRequest::new(args.url, Mode::Crawl);
            request.max_pages = args.max_pages;
            request.blacklist = args.blacklist;
            request.extra_headers = args.headers.into_iter().collect();
            acquire_command(request, config).await?;
        }
        Some(Commands::Scrape(args)) => {
            let mut request = AcquisitionRequest::new(args.url, Mode::Scrape);
            request.extraction_rules = args.selectors.into_iter().collect::<BTreeMap<_, _>>();
            request.use_headless_render = args.headless;
            acquire_command(request, config).await?;
        }
        Some(Commands::Render(args)) => {
            let mut request = AcquisitionRequest::new(args.url, Mode::Render);
            request.use_headless_render = true;
            request.headless_wait_ms = args.wait_ms;
            acquire_command(request, config).await?;
        }
        Some(Commands::ExtractText(args)) => {
            let mut request = AcquisitionRequest::new(args.url, Mode::ExtractText);
            request.use_headless_render = args.headless;
            acquire_command(request, config).await?;
        }
        Some(Commands::Monitor(args)) => {
            let mut request = AcquisitionRequest::new(args.url, Mode::Monitor);
            request.use_headless_render = args.headless;
            request.schedule_expression = args.cron;
            acquire_command(request, config).await?;
        }
        Some(Commands::NextRun(args)) => next_run_command(args)?,
        None => {
            // If no command is provided, show help
            let _ = Cli::parse_from(["trawl", "--help"]);
        }
    }

    Ok(())
}

#[instrument(skip(config))]
async fn serve_command(args: ServeArgs, config: ServiceConfig) -> anyhow::Result<()> {
    let service = AcquisitionService::new(config.spider_factory(), config);
    trawl::server::start(args.bind, Arc::new(service)).await
}

#[instrument(skip(request, config), fields(url = %request.target_url, mode = %request.mode))]
async fn acquire_command(request: AcquisitionRequest, config: ServiceConfig) -> anyhow::Result<()> {
    let service = AcquisitionService::new(config.spider_factory(), config);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} [{elapsed}] {msg}")?);
    spinner.set_message(format!("{} {}", request.mode, request.target_url));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = service.handle(request).await;
    spinner.finish_and_clear();

    let response = result?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn next_run_command(args: NextRunArgs) -> anyhow::Result<()> {
    let mut cursor = Utc::now();
    for _ in 0..args.count.max(1) {
        cursor = next_run_after(&args.expression, cursor)?;
        println!("{}", cursor.to_rfc3339());
    }
    Ok(())
}
