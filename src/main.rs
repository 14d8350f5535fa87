//! # GDELT Harvest
//!
//! A three-stage pipeline that discovers English-language news articles in
//! the GDELT Global Entity Graph, scrapes their body text per publisher and
//! appends `url, sentiment, article_text` rows to a CSV file.
//!
//! ## Usage
//!
//! ```sh
//! NEWS_API_KEY=... gdelt_harvest -o ./articles.csv
//! ```
//!
//! ## Architecture
//!
//! 1. **Harvesting**: stream the batch-file manifest, fetch and filter batch
//!    files on a pool of worker threads (one per CPU)
//! 2. **Fetching**: scrape each candidate article with its source's strategy
//! 3. **Sink**: append the scraped articles to CSV in batches
//!
//! SIGTERM, SIGINT and SIGHUP cancel in-flight requests; every stage still
//! drains and the CSV is flushed before exit. A second signal exits at once.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod fetcher;
mod harvester;
mod models;
mod pipeline;
mod scrapers;
mod shutdown;
mod sink;
mod utils;

use cli::Cli;
use config::{Routes, default_sources, load_sources, validate_sources};
use harvester::{HarvestSettings, HttpRemote};
use pipeline::{Pipeline, PipelineError, Settings};
use scrapers::Registry;
use shutdown::Shutdown;
use utils::{available_workers, ensure_appendable, resolve_output_path};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("gdelt_harvest starting up");

    let args = Cli::parse();
    debug!(?args.output, ?args.config, "Parsed CLI arguments");

    // ---- Sources: fail fast before any thread starts ----
    let registry = Registry::with_defaults(args.news_api_key.clone());
    let raw_sources = match &args.config {
        Some(path) => load_sources(path)?,
        None => default_sources(),
    };
    let sources = match validate_sources(&raw_sources, &registry) {
        Ok(sources) => sources,
        Err(e) => {
            error!(error = %e, "Invalid sources configuration");
            return Err(e.into());
        }
    };
    let routes = Routes::resolve(&sources, &registry);
    info!(routes = ?routes, "Sources validated");

    let output_path = resolve_output_path(args.output.as_deref());
    if let Err(e) = ensure_appendable(&output_path) {
        error!(
            path = %output_path.display(),
            error = %e,
            "Output file is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let settings = Settings {
        harvest: HarvestSettings {
            manifest_url: args.manifest_url.clone(),
            workers: args.workers.unwrap_or_else(available_workers),
            window_size: args.window_size,
            request_timeout: Duration::from_secs(args.timeout_secs),
            max_batches: args.max_batches,
        },
        task_queue_capacity: args.queue_capacity,
        max_in_flight: args.max_in_flight,
        sink_batch_size: args.batch_size,
        output_path,
    };
    info!(
        workers = settings.harvest.workers,
        window_size = settings.harvest.window_size,
        queue_capacity = settings.task_queue_capacity,
        max_in_flight = settings.max_in_flight,
        "Starting pipeline"
    );

    let pipeline = Pipeline::start(settings, routes, Arc::new(HttpRemote), Shutdown::new())?;
    let summary = match pipeline.run_until_signal().await {
        Err(PipelineError::Aborted(signal)) => {
            error!(signal, "Exiting before the pipeline drained");
            std::process::exit(130);
        }
        result => result?,
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        batches = summary.harvest.batches,
        tasks = summary.harvest.tasks,
        unroutable = summary.fetch.unroutable,
        cancelled = summary.fetch.cancelled,
        rows = summary.sink.rows,
        "Execution complete"
    );

    Ok(())
}
