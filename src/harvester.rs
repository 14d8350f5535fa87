//! Stage 1: discover candidate articles from the GDELT entity graph.
//!
//! One producer thread streams the manifest of compressed batch files into a
//! bounded internal queue (`2 × workers`). Each worker thread takes entries in
//! windows, fetches a whole window concurrently on a current-thread runtime
//! built for that window only, then gunzips, decodes and filters the records
//! outside the runtime and pushes [`ScrapeTask`]s onto the cross-stage queue.
//!
//! # Termination
//!
//! - the producer pushes one `EndOfStream` per worker once the manifest is exhausted
//! - each worker flushes its partial window on `EndOfStream`, then exits
//! - once every worker has exited, exactly one `EndOfStream` goes downstream
//!
//! On shutdown, reads and writes on the internal batch queue watch
//! [`Shutdown::closed`], and the per-window runtime drops its in-flight
//! requests as soon as the token is cancelled. Puts on the cross-stage task
//! queue check the shutdown flag before each send; a put already blocked on
//! a full queue is released when the Fetcher exits and drops its receiver.

use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender, select};
use flate2::read::MultiGzDecoder;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::models::{BatchRecord, ManifestEntry, Message, ScrapeTask};
use crate::shutdown::Shutdown;
use crate::utils::{http_client, truncate_for_log};

/// GDELT Global Entity Graph master file list.
pub const DEFAULT_MANIFEST_URL: &str =
    "http://data.gdeltproject.org/gdeltv3/geg_gcnlapi/MASTERFILELIST.TXT";

/// Manifest entries fetched together by one worker.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),
}

/// Where manifest and batch-file bytes come from.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn get(&self, client: &Client, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`Remote`] backed by plain HTTP GETs.
#[derive(Debug, Default)]
pub struct HttpRemote;

#[async_trait]
impl Remote for HttpRemote {
    async fn get(&self, client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = client.get(url).send().await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub manifest_url: String,
    pub workers: usize,
    pub window_size: usize,
    pub request_timeout: Duration,
    /// Only the newest `max_batches` manifest entries are harvested.
    pub max_batches: Option<usize>,
}

/// Counters reported by a finished harvest.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HarvestStats {
    pub batches: usize,
    pub records: usize,
    pub tasks: usize,
}

impl std::ops::AddAssign for HarvestStats {
    fn add_assign(&mut self, other: Self) {
        self.batches += other.batches;
        self.records += other.records;
        self.tasks += other.tasks;
    }
}

/// Split a manifest body into batch URLs, newest first.
pub fn parse_manifest(body: &str, max_batches: Option<usize>) -> Vec<ManifestEntry> {
    let entries = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .rev()
        .map(str::to_string);
    match max_batches {
        Some(max) => entries.take(max).collect(),
        None => entries.collect(),
    }
}

/// Decode one batch line, JSON first, then YAML for anything JSON refuses.
pub fn decode_record(line: &str) -> Option<BatchRecord> {
    serde_json::from_str(line)
        .ok()
        .or_else(|| serde_yaml::from_str(line).ok())
}

/// Gunzip a batch payload and turn its matching English records into tasks.
///
/// Every gzip member of the payload is read. Only a payload that fails to
/// decompress is skipped whole; a line that is not UTF-8 or not a record is
/// skipped on its own.
///
/// # Arguments
///
/// * `payload` - Raw bytes of one batch file
/// * `sources` - Configured source substrings, in priority order
///
/// # Returns
///
/// The number of decoded records alongside the tasks they produced.
pub fn decode_batch(payload: &[u8], sources: &[String]) -> (usize, Vec<ScrapeTask>) {
    let mut raw = Vec::new();
    if let Err(e) = MultiGzDecoder::new(payload).read_to_end(&mut raw) {
        warn!(bytes = payload.len(), error = %e, "Skipping undecompressable batch");
        return (0, Vec::new());
    }

    let mut records = 0;
    let mut tasks = Vec::new();
    for bytes in raw.split(|b| *b == b'\n') {
        let line = match std::str::from_utf8(bytes) {
            Ok(line) => line.trim(),
            Err(e) => {
                debug!(error = %e, "Skipping non-UTF-8 record line");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        let Some(record) = decode_record(line) else {
            debug!(line = %truncate_for_log(line, 120), "Skipping malformed record");
            continue;
        };
        records += 1;
        if record.lang != "en" {
            continue;
        }
        if let Some(task) = ScrapeTask::route(record, sources) {
            tasks.push(task);
        }
    }
    (records, tasks)
}

/// Send `msg` on a bounded queue unless shutdown arrives first.
fn send_or_shutdown<T>(tx: &Sender<T>, msg: T, shutdown: &Shutdown) -> bool {
    select! {
        send(tx, msg) -> res => res.is_ok(),
        recv(shutdown.closed()) -> _ => false,
    }
}

/// Manifest producer plus a pool of batch-file workers.
pub struct Harvester {
    remote: Arc<dyn Remote>,
    sources: Arc<Vec<String>>,
    settings: HarvestSettings,
    shutdown: Shutdown,
}

impl Harvester {
    pub fn new(
        remote: Arc<dyn Remote>,
        sources: Vec<String>,
        settings: HarvestSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            remote,
            sources: Arc::new(sources),
            settings,
            shutdown,
        }
    }

    /// Run the producer and worker pool to completion.
    ///
    /// Blocks the calling thread. `batches` must be the internal queue whose
    /// receiver is `batch_rx`. Exactly one `EndOfStream` is sent on `tasks`
    /// after every worker has exited.
    #[instrument(level = "info", skip_all, fields(workers = self.settings.workers))]
    pub fn run(
        self,
        batches: Sender<Message<ManifestEntry>>,
        batch_rx: Receiver<Message<ManifestEntry>>,
        tasks: mpsc::Sender<Message<ScrapeTask>>,
    ) -> std::io::Result<HarvestStats> {
        let workers = self.settings.workers.max(1);

        let producer = {
            let remote = Arc::clone(&self.remote);
            let settings = self.settings.clone();
            let shutdown = self.shutdown.clone();
            let batches = batches.clone();
            let spawned = thread::Builder::new()
                .name("harvest-producer".to_string())
                .spawn(move || produce(remote.as_ref(), &settings, workers, &batches, &shutdown));
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    error!(error = %e, "Failed to spawn manifest producer");
                    let _ = tasks.blocking_send(Message::EndOfStream);
                    return Err(e);
                }
            }
        };

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker {
                id,
                remote: Arc::clone(&self.remote),
                sources: Arc::clone(&self.sources),
                window_size: self.settings.window_size.max(1),
                request_timeout: self.settings.request_timeout,
                shutdown: self.shutdown.clone(),
            };
            let rx = batch_rx.clone();
            let tx = tasks.clone();
            let spawned = thread::Builder::new()
                .name(format!("harvest-worker-{id}"))
                .spawn(move || worker.run(rx, tx));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Running workers leave through the shutdown path.
                    error!(worker = id, error = %e, "Failed to spawn harvest worker");
                    self.shutdown.trigger();
                    break;
                }
            }
        }
        drop(batch_rx);

        if producer.join().is_err() {
            error!("Manifest producer panicked; releasing workers");
            for _ in 0..workers {
                let _ = batches.try_send(Message::EndOfStream);
            }
        }
        drop(batches);

        let mut stats = HarvestStats::default();
        for (id, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(worker_stats) => stats += worker_stats,
                Err(_) => error!(worker = id, "Harvest worker panicked"),
            }
        }

        if tasks.blocking_send(Message::EndOfStream).is_err() {
            debug!("Fetcher already gone; end-of-stream not delivered");
        }
        info!(
            batches = stats.batches,
            records = stats.records,
            tasks = stats.tasks,
            "Harvest finished"
        );
        Ok(stats)
    }
}

/// Fetch the manifest and feed its entries to the workers.
#[instrument(level = "info", skip_all, fields(url = %settings.manifest_url))]
fn produce(
    remote: &dyn Remote,
    settings: &HarvestSettings,
    workers: usize,
    batches: &Sender<Message<ManifestEntry>>,
    shutdown: &Shutdown,
) {
    let entries = match fetch_manifest(remote, settings, shutdown) {
        Ok(body) => parse_manifest(&body, settings.max_batches),
        Err(e) => {
            error!(error = %e, "Manifest fetch failed; nothing to harvest");
            Vec::new()
        }
    };
    info!(count = entries.len(), "Queueing manifest entries");

    for entry in entries {
        if !send_or_shutdown(batches, Message::Data(entry), shutdown) {
            info!("Shutdown requested; manifest producer stopping early");
            break;
        }
    }

    for _ in 0..workers {
        if shutdown.is_triggered() {
            let _ = batches.try_send(Message::EndOfStream);
        } else if !send_or_shutdown(batches, Message::EndOfStream, shutdown) {
            break;
        }
    }
    debug!(workers, "Manifest producer done");
}

fn fetch_manifest(
    remote: &dyn Remote,
    settings: &HarvestSettings,
    shutdown: &Shutdown,
) -> Result<String, Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let client = http_client(settings.request_timeout)?;
    let fetched = runtime.block_on(async {
        tokio::select! {
            _ = shutdown.cancelled() => None,
            res = remote.get(&client, &settings.manifest_url) => Some(res),
        }
    });
    match fetched {
        Some(res) => Ok(String::from_utf8_lossy(&res?).into_owned()),
        None => {
            info!("Shutdown requested; manifest fetch cancelled");
            Ok(String::new())
        }
    }
}

struct Worker {
    id: usize,
    remote: Arc<dyn Remote>,
    sources: Arc<Vec<String>>,
    window_size: usize,
    request_timeout: Duration,
    shutdown: Shutdown,
}

impl Worker {
    #[instrument(level = "info", skip_all, fields(worker = self.id))]
    fn run(
        self,
        batches: Receiver<Message<ManifestEntry>>,
        tasks: mpsc::Sender<Message<ScrapeTask>>,
    ) -> HarvestStats {
        let mut stats = HarvestStats::default();
        let mut window: Vec<ManifestEntry> = Vec::with_capacity(self.window_size);

        loop {
            let msg = select! {
                recv(batches) -> msg => msg.unwrap_or(Message::EndOfStream),
                recv(self.shutdown.closed()) -> _ => {
                    info!(pending = window.len(), "Shutdown requested; dropping window");
                    return stats;
                }
            };

            match msg {
                Message::Data(entry) => {
                    window.push(entry);
                    if window.len() >= self.window_size
                        && !self.process_window(&mut window, &tasks, &mut stats)
                    {
                        return stats;
                    }
                }
                Message::EndOfStream => {
                    if !window.is_empty() {
                        self.process_window(&mut window, &tasks, &mut stats);
                    }
                    info!(
                        batches = stats.batches,
                        tasks = stats.tasks,
                        "Harvest worker done"
                    );
                    return stats;
                }
            }
        }
    }

    /// Fetch, decode and forward one window. Returns false when the worker
    /// should stop (shutdown, or the Fetcher is gone).
    fn process_window(
        &self,
        window: &mut Vec<ManifestEntry>,
        tasks: &mpsc::Sender<Message<ScrapeTask>>,
        stats: &mut HarvestStats,
    ) -> bool {
        let entries = std::mem::take(window);
        let Some(payloads) = self.fetch_window(&entries) else {
            return false;
        };
        debug!(
            requested = entries.len(),
            fetched = payloads.iter().filter(|p| !p.is_empty()).count(),
            "Fetched window"
        );

        for payload in payloads.iter().filter(|p| !p.is_empty()) {
            stats.batches += 1;
            let (records, found) = decode_batch(payload, &self.sources);
            stats.records += records;

            for task in found {
                if self.shutdown.is_triggered() {
                    return false;
                }
                debug!(url = %task.url, source = %task.source, "Queueing scrape task");
                if tasks.blocking_send(Message::Data(task)).is_err() {
                    warn!("Task queue closed; harvest worker stopping");
                    return false;
                }
                stats.tasks += 1;
            }
        }
        true
    }

    /// Fetch every entry concurrently on a runtime scoped to this window.
    ///
    /// Returns `None` if shutdown interrupted the window. Failed fetches come
    /// back as empty payloads.
    fn fetch_window(&self, entries: &[ManifestEntry]) -> Option<Vec<Vec<u8>>> {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                error!(error = %e, "Failed to build window runtime");
                return Some(Vec::new());
            }
        };

        runtime.block_on(async {
            let client = match http_client(self.request_timeout) {
                Ok(client) => client,
                Err(e) => {
                    error!(error = %e, "Failed to build HTTP client");
                    return Some(Vec::new());
                }
            };

            let fetches = stream::iter(entries)
                .map(|url| {
                    let client = &client;
                    async move {
                        match self.remote.get(client, url).await {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                warn!(%url, error = %e, "Batch fetch failed");
                                Vec::new()
                            }
                        }
                    }
                })
                .buffer_unordered(entries.len().max(1))
                .collect::<Vec<_>>();

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(in_flight = entries.len(), "Shutdown requested; cancelling window");
                    None
                }
                payloads = fetches => Some(payloads),
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// In-memory [`Remote`]; unknown URLs fail like a 404.
    #[derive(Default)]
    pub(crate) struct FakeRemote {
        pub(crate) bodies: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl Remote for FakeRemote {
        async fn get(&self, _client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
            self.bodies
                .get(url)
                .cloned()
                .ok_or(FetchError::Status(404))
        }
    }

    /// Serves the manifest, then never answers a batch request.
    #[derive(Default)]
    struct Stall {
        manifest: Vec<u8>,
        started: AtomicUsize,
        dropped: Arc<AtomicUsize>,
    }

    struct DropGuard(Arc<AtomicUsize>);

    impl Drop for DropGuard {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Remote for Stall {
        async fn get(&self, _client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
            if url == settings(1).manifest_url {
                return Ok(self.manifest.clone());
            }
            let _guard = DropGuard(Arc::clone(&self.dropped));
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(Vec::new())
        }
    }

    pub(crate) fn gzip(lines: &[String]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(lines.join("\n").as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    pub(crate) fn line(url: &str, lang: &str, score: f64) -> String {
        format!(r#"{{"date":"2021-06-21 00:00:00","url":"{url}","lang":"{lang}","score":{score},"entities":[]}}"#)
    }

    fn sources() -> Vec<String> {
        vec!["www.theguardian.com".to_string(), "://news.yahoo.com".to_string()]
    }

    fn settings(workers: usize) -> HarvestSettings {
        HarvestSettings {
            manifest_url: "http://gdelt.test/MASTERFILELIST.TXT".to_string(),
            workers,
            window_size: DEFAULT_WINDOW_SIZE,
            request_timeout: Duration::from_secs(5),
            max_batches: None,
        }
    }

    fn drain(mut rx: mpsc::Receiver<Message<ScrapeTask>>) -> (Vec<ScrapeTask>, usize) {
        let mut tasks = Vec::new();
        let mut sentinels = 0;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Message::Data(task) => tasks.push(task),
                Message::EndOfStream => sentinels += 1,
            }
        }
        (tasks, sentinels)
    }

    #[test]
    fn test_parse_manifest_newest_first() {
        let body = "http://a/1.gz\n\nhttp://a/2.gz\r\nhttp://a/3.gz\n";
        assert_eq!(
            parse_manifest(body, None),
            vec!["http://a/3.gz", "http://a/2.gz", "http://a/1.gz"]
        );
        assert_eq!(parse_manifest(body, Some(1)), vec!["http://a/3.gz"]);
        assert!(parse_manifest("\n\n", None).is_empty());
    }

    #[test]
    fn test_decode_record_yaml_fallback() {
        let rec = decode_record("{url: 'https://news.yahoo.com/a', lang: en, score: -0.3}").unwrap();
        assert_eq!(rec.url, "https://news.yahoo.com/a");
        assert_eq!(rec.score, -0.3);
        assert!(decode_record("not a record").is_none());
    }

    #[test]
    fn test_decode_batch_filters_language_and_source() {
        let payload = gzip(&[
            line("https://www.theguardian.com/a", "en", 0.5),
            line("https://www.theguardian.com/b", "fr", 0.5),
            line("https://example.com/c", "en", 0.1),
            "{broken".to_string(),
            String::new(),
            line("https://news.yahoo.com/d", "en", -0.2),
        ]);

        let (records, tasks) = decode_batch(&payload, &sources());
        assert_eq!(records, 4);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].source, "www.theguardian.com");
        assert_eq!(tasks[1].source, "://news.yahoo.com");
        assert!(tasks.iter().all(|t| sources().contains(&t.source)));
    }

    #[test]
    fn test_decode_batch_skips_only_the_bad_line() {
        let mut raw = line("https://news.yahoo.com/a", "en", 0.1).into_bytes();
        raw.extend_from_slice(b"\n{\"url\":\"https://news.yahoo.com/\xff\",\"lang\":\"en\",\"score\":0}\n");
        raw.extend_from_slice(line("https://news.yahoo.com/b", "en", 0.2).as_bytes());

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let payload = encoder.finish().unwrap();

        let (records, tasks) = decode_batch(&payload, &sources());
        assert_eq!(records, 2);
        let urls: Vec<_> = tasks.iter().map(|t| t.url.as_str()).collect();
        assert_eq!(urls, ["https://news.yahoo.com/a", "https://news.yahoo.com/b"]);
    }

    #[test]
    fn test_decode_batch_reads_every_gzip_member() {
        let mut payload = gzip(&[line("https://www.theguardian.com/a", "en", 0.5)]);
        payload.extend(gzip(&[line("https://www.theguardian.com/b", "en", 0.5)]));

        let (records, tasks) = decode_batch(&payload, &sources());
        assert_eq!(records, 2);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].url, "https://www.theguardian.com/b");
    }

    #[test]
    fn test_decode_batch_corrupt_payload() {
        let (records, tasks) = decode_batch(b"definitely not gzip", &sources());
        assert_eq!(records, 0);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_harvest_partial_windows_and_single_sentinel() {
        let mut remote = FakeRemote::default();
        let mut manifest = String::new();
        for i in 0..13 {
            let url = format!("http://gdelt.test/{i}.gz");
            manifest.push_str(&url);
            manifest.push('\n');
            remote.bodies.insert(
                url,
                gzip(&[line(&format!("https://www.theguardian.com/{i}"), "en", 1.0)]),
            );
        }
        // One manifest entry that 404s.
        manifest.push_str("http://gdelt.test/missing.gz\n");
        remote
            .bodies
            .insert(settings(1).manifest_url, manifest.into_bytes());

        let workers = 3;
        let (batch_tx, batch_rx) = crossbeam_channel::bounded(workers * 2);
        let (task_tx, task_rx) = mpsc::channel(500);
        let harvester = Harvester::new(
            Arc::new(remote),
            sources(),
            settings(workers),
            Shutdown::new(),
        );

        let stats = harvester.run(batch_tx, batch_rx, task_tx).unwrap();
        let (tasks, sentinels) = drain(task_rx);

        assert_eq!(stats.batches, 13);
        assert_eq!(stats.tasks, 13);
        assert_eq!(tasks.len(), 13);
        assert_eq!(sentinels, 1);
    }

    #[test]
    fn test_manifest_failure_still_terminates() {
        let (batch_tx, batch_rx) = crossbeam_channel::bounded(4);
        let (task_tx, task_rx) = mpsc::channel(10);
        let harvester = Harvester::new(
            Arc::new(FakeRemote::default()),
            sources(),
            settings(2),
            Shutdown::new(),
        );

        let stats = harvester.run(batch_tx, batch_rx, task_tx).unwrap();
        let (tasks, sentinels) = drain(task_rx);
        assert_eq!(stats, HarvestStats::default());
        assert!(tasks.is_empty());
        assert_eq!(sentinels, 1);
    }

    #[test]
    fn test_shutdown_unblocks_full_task_queue() {
        let mut remote = FakeRemote::default();
        let lines: Vec<String> = (0..50)
            .map(|i| line(&format!("https://news.yahoo.com/{i}"), "en", 0.0))
            .collect();
        remote
            .bodies
            .insert("http://gdelt.test/0.gz".to_string(), gzip(&lines));
        remote.bodies.insert(
            settings(1).manifest_url,
            b"http://gdelt.test/0.gz\n".to_vec(),
        );

        let shutdown = Shutdown::new();
        let (batch_tx, batch_rx) = crossbeam_channel::bounded(2);
        // Room for a single task: the worker blocks on the second put.
        let (task_tx, task_rx) = mpsc::channel(1);
        let harvester = Harvester::new(Arc::new(remote), sources(), settings(1), shutdown.clone());
        let handle = thread::spawn(move || harvester.run(batch_tx, batch_rx, task_tx));

        thread::sleep(Duration::from_millis(200));
        shutdown.trigger();
        // The Fetcher exiting is what releases a blocked put.
        drop(task_rx);

        let stats = handle.join().unwrap().unwrap();
        assert!(stats.tasks < 50);
    }

    #[test]
    fn test_shutdown_cancels_window_fetches() {
        let manifest: String = (0..4).map(|i| format!("http://gdelt.test/{i}.gz\n")).collect();
        let remote = Arc::new(Stall {
            manifest: manifest.into_bytes(),
            ..Default::default()
        });

        let shutdown = Shutdown::new();
        let (batch_tx, batch_rx) = crossbeam_channel::bounded(4);
        let (task_tx, task_rx) = mpsc::channel(10);
        let harvester = Harvester::new(remote.clone(), sources(), settings(2), shutdown.clone());
        let handle = thread::spawn(move || harvester.run(batch_tx, batch_rx, task_tx));

        let deadline = Instant::now() + Duration::from_secs(5);
        while remote.started.load(Ordering::SeqCst) < 4 {
            assert!(Instant::now() < deadline, "window fetches never started");
            thread::sleep(Duration::from_millis(5));
        }
        shutdown.trigger();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "harvester did not stop");
            thread::sleep(Duration::from_millis(5));
        }
        let stats = handle.join().unwrap().unwrap();
        let (tasks, sentinels) = drain(task_rx);

        assert_eq!(remote.dropped.load(Ordering::SeqCst), 4);
        assert_eq!(stats.batches, 0);
        assert!(tasks.is_empty());
        assert_eq!(sentinels, 1);
    }
}
