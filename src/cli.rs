//! Command-line interface definitions for GDELT Harvest.
//!
//! All arguments can be provided via command-line flags, most also via
//! environment variables.

use clap::Parser;
use std::path::PathBuf;

use crate::fetcher::DEFAULT_MAX_IN_FLIGHT;
use crate::harvester::{DEFAULT_MANIFEST_URL, DEFAULT_WINDOW_SIZE};
use crate::sink::DEFAULT_BATCH_SIZE;

/// Command-line arguments for the GDELT Harvest application.
///
/// # Examples
///
/// ```sh
/// # Default sources, append to ./articles.csv
/// gdelt_harvest
///
/// # Custom sources file and output directory
/// gdelt_harvest -c sources.yaml -o ./data
///
/// # Only the 50 newest batch files, 4 workers
/// gdelt_harvest --max-batches 50 -w 4
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// CSV file (or existing directory) rows are appended to
    #[arg(short, long, env = "GDELT_HARVEST_OUTPUT")]
    pub output: Option<PathBuf>,

    /// YAML file listing `{source, strategy}` entries
    #[arg(short, long, env = "GDELT_HARVEST_SOURCES")]
    pub config: Option<PathBuf>,

    /// Manifest of compressed batch files
    #[arg(long, default_value = DEFAULT_MANIFEST_URL)]
    pub manifest_url: String,

    /// Harvest workers (defaults to available parallelism)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Batch files each worker fetches together
    #[arg(long, default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,

    /// Capacity of the queue between harvesting and scraping
    #[arg(long, default_value_t = 500)]
    pub queue_capacity: usize,

    /// Article scrapes allowed in flight at once
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,

    /// Rows buffered before each CSV write
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Only harvest the newest N batch files
    #[arg(long)]
    pub max_batches: Option<usize>,

    /// Guardian content API key
    #[arg(long, env = "NEWS_API_KEY", hide_env_values = true)]
    pub news_api_key: Option<String>,
}
