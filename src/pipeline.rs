//! Wiring of the three stages and the signal-driven shutdown.
//!
//! ```text
//! producer ─▶ [batch queue, 2×N] ─▶ N harvest workers ─▶ [task queue, bounded]
//!     ─▶ Fetcher ─▶ [output queue, unbounded] ─▶ Sink ─▶ articles.csv
//! ```
//!
//! Every stage runs on its own OS thread. On SIGTERM/SIGINT/SIGHUP the
//! orchestrator triggers the shared [`Shutdown`] and injects end-of-stream
//! markers into the batch and task queues so no blocked read hangs; each
//! stage then forwards its own end-of-stream and exits. A second signal
//! during that drain abandons it.

use crossbeam_channel::Sender;
use futures::stream::{self, Stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::config::Routes;
use crate::fetcher::{FetchStats, Fetcher};
use crate::harvester::{HarvestSettings, HarvestStats, Harvester, Remote};
use crate::models::{ManifestEntry, Message, ScrapeTask};
use crate::shutdown::{Shutdown, signals};
use crate::sink::{Sink, SinkError, SinkStats};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn {stage} thread: {error}")]
    Spawn {
        stage: &'static str,
        #[source]
        error: std::io::Error,
    },

    #[error("{0} thread panicked")]
    Panicked(&'static str),

    #[error("{stage} failed: {error}")]
    Stage {
        stage: &'static str,
        #[source]
        error: std::io::Error,
    },

    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("second {0} received; drain abandoned")]
    Aborted(&'static str),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub harvest: HarvestSettings,
    /// Capacity of the Harvester → Fetcher queue.
    pub task_queue_capacity: usize,
    pub max_in_flight: usize,
    pub sink_batch_size: usize,
    pub output_path: PathBuf,
}

/// Counters from every stage of a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub harvest: HarvestStats,
    pub fetch: FetchStats,
    pub sink: SinkStats,
}

/// Extra queue handles the orchestrator keeps to wake blocked readers.
///
/// The task queue handle is weak: once the Harvester is gone, however it
/// ended, the Fetcher sees the queue close.
struct Injector {
    batches: Sender<Message<ManifestEntry>>,
    tasks: mpsc::WeakSender<Message<ScrapeTask>>,
    workers: usize,
}

impl Injector {
    fn new(
        batches: Sender<Message<ManifestEntry>>,
        tasks: &mpsc::Sender<Message<ScrapeTask>>,
        workers: usize,
    ) -> Self {
        Self {
            batches,
            tasks: tasks.downgrade(),
            workers,
        }
    }

    /// Best effort: a full queue already has something for its readers.
    fn inject(&self) {
        for _ in 0..self.workers {
            let _ = self.batches.try_send(Message::EndOfStream);
        }
        if let Some(tasks) = self.tasks.upgrade() {
            let _ = tasks.try_send(Message::EndOfStream);
        }
    }
}

/// A running harvest: the three stage threads and the handles needed to stop
/// them.
pub struct Pipeline {
    shutdown: Shutdown,
    injector: Injector,
    harvester: JoinHandle<std::io::Result<HarvestStats>>,
    fetcher: JoinHandle<std::io::Result<FetchStats>>,
    sink: JoinHandle<Result<SinkStats, SinkError>>,
}

fn spawn<T, F>(stage: &'static str, f: F) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(stage.to_string())
        .spawn(f)
        .map_err(|error| PipelineError::Spawn { stage, error })
}

impl Pipeline {
    /// Create the queues and spawn every stage, downstream first.
    ///
    /// # Arguments
    ///
    /// * `settings` - Queue sizes, worker count and output path
    /// * `routes` - Validated source to strategy table
    /// * `remote` - Where manifest and batch bytes are fetched from
    /// * `shutdown` - Handle shared with every stage
    ///
    /// # Returns
    ///
    /// The running pipeline, or the first thread that could not be spawned.
    #[instrument(level = "info", skip_all, fields(workers = settings.harvest.workers))]
    pub fn start(
        settings: Settings,
        routes: Routes,
        remote: Arc<dyn Remote>,
        shutdown: Shutdown,
    ) -> Result<Self, PipelineError> {
        let workers = settings.harvest.workers.max(1);
        let (batch_tx, batch_rx) = crossbeam_channel::bounded(workers * 2);
        let (task_tx, task_rx) = mpsc::channel(settings.task_queue_capacity.max(1));
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let sink = Sink::new(settings.output_path.clone(), settings.sink_batch_size);
        let sink = spawn("sink", move || sink.run(out_rx))?;

        let fetcher = Fetcher::new(
            routes.clone(),
            settings.max_in_flight,
            settings.harvest.request_timeout,
            shutdown.clone(),
        );
        // On failure the closure drops `out_tx`, which ends the Sink.
        let fetcher = spawn("fetcher", move || fetcher.run(task_rx, out_tx))?;

        let injector = Injector::new(batch_tx.clone(), &task_tx, workers);
        let harvester = Harvester::new(
            remote,
            routes.sources(),
            settings.harvest.clone(),
            shutdown.clone(),
        );
        let harvester = match spawn("harvester", move || harvester.run(batch_tx, batch_rx, task_tx)) {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.trigger();
                return Err(e);
            }
        };

        info!(
            output = %settings.output_path.display(),
            sources = ?routes,
            "Pipeline started"
        );
        Ok(Self {
            shutdown,
            injector,
            harvester,
            fetcher,
            sink,
        })
    }

    /// Stop every stage: cancel in-flight work and wake blocked readers.
    pub fn interrupt(&self) {
        self.shutdown.trigger();
        self.injector.inject();
    }

    /// Wait for every stage to exit. Blocks the calling thread.
    pub fn join(self) -> Result<Summary, PipelineError> {
        let Pipeline {
            injector,
            harvester,
            fetcher,
            sink,
            ..
        } = self;
        let result = join_stages(harvester, fetcher, sink);
        drop(injector);
        result
    }

    /// Wait for the run to finish, interrupting it on SIGTERM/SIGINT/SIGHUP.
    ///
    /// Without signal handlers the run simply completes.
    pub async fn run_until_signal(self) -> Result<Summary, PipelineError> {
        let interrupts = match signals() {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Signal handlers unavailable; running without them");
                stream::pending().boxed()
            }
        };
        self.run_until(interrupts).await
    }

    /// Wait for the run to finish, driven by a stream of interrupts.
    ///
    /// # Arguments
    ///
    /// * `interrupts` - Names of the signals received, in order
    ///
    /// # Returns
    ///
    /// The run's [`Summary`]. The first interrupt stops the pipeline and
    /// waits for the stages to drain; a second one returns
    /// [`PipelineError::Aborted`] without waiting further.
    pub async fn run_until<S>(self, mut interrupts: S) -> Result<Summary, PipelineError>
    where
        S: Stream<Item = &'static str> + Unpin,
    {
        let Pipeline {
            shutdown,
            injector,
            harvester,
            fetcher,
            sink,
        } = self;
        let join = tokio::task::spawn_blocking(move || join_stages(harvester, fetcher, sink));
        tokio::pin!(join);

        tokio::select! {
            joined = &mut join => return flatten(joined),
            Some(name) = interrupts.next() => {
                warn!(signal = name, "Interrupt received; stopping pipeline (send again to abort)");
                shutdown.trigger();
                injector.inject();
            }
        }
        drop(injector);

        tokio::select! {
            joined = &mut join => flatten(joined),
            Some(name) = interrupts.next() => {
                error!(signal = name, "Second interrupt received; abandoning drain");
                Err(PipelineError::Aborted(name))
            }
        }
    }
}

fn flatten(
    joined: Result<Result<Summary, PipelineError>, tokio::task::JoinError>,
) -> Result<Summary, PipelineError> {
    joined.map_err(|_| PipelineError::Panicked("orchestrator"))?
}

fn join_stages(
    harvester: JoinHandle<std::io::Result<HarvestStats>>,
    fetcher: JoinHandle<std::io::Result<FetchStats>>,
    sink: JoinHandle<Result<SinkStats, SinkError>>,
) -> Result<Summary, PipelineError> {
    let harvest = harvester
        .join()
        .map_err(|_| PipelineError::Panicked("harvester"))
        .and_then(|r| r.map_err(|error| PipelineError::Stage { stage: "harvester", error }));
    let fetch = fetcher
        .join()
        .map_err(|_| PipelineError::Panicked("fetcher"))
        .and_then(|r| r.map_err(|error| PipelineError::Stage { stage: "fetcher", error }));
    let sink = sink
        .join()
        .map_err(|_| PipelineError::Panicked("sink"))
        .and_then(|r| r.map_err(PipelineError::from));

    for (stage, failed) in [
        ("harvester", harvest.as_ref().err()),
        ("fetcher", fetch.as_ref().err()),
        ("sink", sink.as_ref().err()),
    ] {
        if let Some(e) = failed {
            error!(stage, error = %e, "Stage failed");
        }
    }

    Ok(Summary {
        harvest: harvest?,
        fetch: fetch?,
        sink: sink?,
    })
}
