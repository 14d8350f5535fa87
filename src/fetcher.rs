//! Stage 2: scrape article text for every harvested task.
//!
//! The Fetcher owns a single current-thread runtime for its whole life. It
//! pulls tasks from the cross-stage queue, resolves each task's source to a
//! strategy and runs up to `max_in_flight` extractions at once in a
//! [`JoinSet`]. While the set is full no new task is pulled, which keeps the
//! cross-stage queue's backpressure intact.
//!
//! One `reqwest::Client` is opened when the Fetcher starts and dropped when it
//! returns. Every exit path (end of stream, closed queue, shutdown) forwards
//! exactly one `EndOfStream` to the Sink.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Routes;
use crate::models::{ArticleRecord, Message, ScrapeTask};
use crate::scrapers::extract_or_marker;
use crate::shutdown::Shutdown;
use crate::utils::http_client;

/// Extractions allowed to overlap by default.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    /// Tasks pulled off the queue.
    pub received: usize,
    /// Tasks whose source matched no strategy.
    pub unroutable: usize,
    /// Records handed to the Sink.
    pub forwarded: usize,
    /// Extractions aborted by shutdown.
    pub cancelled: usize,
    /// Extractions that panicked.
    pub panicked: usize,
}

/// Scrapes every routed task with its source's strategy.
pub struct Fetcher {
    routes: Routes,
    max_in_flight: usize,
    request_timeout: Duration,
    shutdown: Shutdown,
}

impl Fetcher {
    pub fn new(
        routes: Routes,
        max_in_flight: usize,
        request_timeout: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            routes,
            max_in_flight: max_in_flight.max(1),
            request_timeout,
            shutdown,
        }
    }

    /// Run the Fetcher on a dedicated runtime, blocking the calling thread.
    pub fn run(
        self,
        tasks: mpsc::Receiver<Message<ScrapeTask>>,
        output: mpsc::UnboundedSender<Message<ArticleRecord>>,
    ) -> std::io::Result<FetchStats> {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = output.send(Message::EndOfStream);
                return Err(e);
            }
        };
        runtime.block_on(self.drain(tasks, output))
    }

    /// Process tasks until end of stream or shutdown.
    ///
    /// # Arguments
    ///
    /// * `tasks` - Cross-stage queue fed by the Harvester
    /// * `output` - Queue drained by the Sink
    ///
    /// # Returns
    ///
    /// Counters for the run. Exactly one `EndOfStream` has been sent on
    /// `output` by the time this returns, error or not.
    #[instrument(level = "info", skip_all, fields(max_in_flight = self.max_in_flight))]
    pub async fn drain(
        self,
        mut tasks: mpsc::Receiver<Message<ScrapeTask>>,
        output: mpsc::UnboundedSender<Message<ArticleRecord>>,
    ) -> std::io::Result<FetchStats> {
        let client = match http_client(self.request_timeout) {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Failed to build HTTP client");
                let _ = output.send(Message::EndOfStream);
                return Err(std::io::Error::other(e));
            }
        };
        let mut in_flight: JoinSet<ArticleRecord> = JoinSet::new();
        let mut stats = FetchStats::default();

        let mut cancelled = loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break true,
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    forward(joined, &output, &mut stats);
                }
                msg = tasks.recv(), if in_flight.len() < self.max_in_flight => match msg {
                    Some(Message::Data(task)) => {
                        stats.received += 1;
                        self.dispatch(task, &client, &mut in_flight, &mut stats);
                    }
                    Some(Message::EndOfStream) => {
                        info!(in_flight = in_flight.len(), "End of stream; finishing in-flight extractions");
                        break false;
                    }
                    None => {
                        warn!("Task queue closed without end-of-stream");
                        break false;
                    }
                },
            }
        };

        // Let whatever is still running finish, unless shutdown interrupts.
        while !cancelled {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => cancelled = true,
                joined = in_flight.join_next() => match joined {
                    Some(joined) => forward(joined, &output, &mut stats),
                    None => break,
                },
            }
        }

        if cancelled {
            info!(in_flight = in_flight.len(), "Shutdown requested; cancelling extractions");
            in_flight.abort_all();
            while let Some(joined) = in_flight.join_next().await {
                forward(joined, &output, &mut stats);
            }
        }

        drop(tasks);
        drop(client);
        debug!("HTTP client released");

        if output.send(Message::EndOfStream).is_err() {
            warn!("Output queue closed; end-of-stream not delivered");
        }
        info!(
            received = stats.received,
            unroutable = stats.unroutable,
            forwarded = stats.forwarded,
            cancelled = stats.cancelled,
            panicked = stats.panicked,
            "Fetcher finished"
        );
        Ok(stats)
    }

    /// Start the extraction for `task`, or drop it if no strategy matches.
    fn dispatch(
        &self,
        task: ScrapeTask,
        client: &Client,
        in_flight: &mut JoinSet<ArticleRecord>,
        stats: &mut FetchStats,
    ) {
        let Some(route) = self.routes.find(&task.source) else {
            warn!(url = %task.url, source = %task.source, "No strategy for source; dropping task");
            stats.unroutable += 1;
            return;
        };

        debug!(url = %task.url, strategy = route.strategy.id(), "Scraping");
        let strategy = Arc::clone(&route.strategy);
        let client = client.clone();
        in_flight.spawn(async move {
            let text = extract_or_marker(strategy.as_ref(), &client, &task.url).await;
            ArticleRecord::from_task(task, text)
        });
    }
}

fn forward(
    joined: Result<ArticleRecord, JoinError>,
    output: &mpsc::UnboundedSender<Message<ArticleRecord>>,
    stats: &mut FetchStats,
) {
    match joined {
        Ok(record) => {
            if output.send(Message::Data(record)).is_ok() {
                stats.forwarded += 1;
            } else {
                warn!("Output queue closed; dropping record");
            }
        }
        Err(e) if e.is_cancelled() => {
            debug!("Extraction cancelled");
            stats.cancelled += 1;
        }
        Err(e) => {
            error!(error = %e, "Extraction task panicked");
            stats.panicked += 1;
        }
    }
}
