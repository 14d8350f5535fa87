//! Stage 3: append scraped articles to a CSV file.
//!
//! Rows are `url, sentiment, article_text` with no header, so repeated runs
//! can keep appending to the same file. Records are buffered and written in
//! batches; the writer is flushed after every batch and once more at end of
//! stream.

use csv::{Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::models::{ArticleRecord, Message};

/// Records buffered before a write.
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open {path}: {error}")]
    Open {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("flush failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub rows: usize,
    pub flushes: usize,
}

/// Batched CSV writer; the last stage of the pipeline.
#[derive(Debug)]
pub struct Sink {
    path: PathBuf,
    batch_size: usize,
}

impl Sink {
    pub fn new(path: PathBuf, batch_size: usize) -> Self {
        Self {
            path,
            batch_size: batch_size.max(1),
        }
    }

    /// Drain `records` until end of stream. Blocks the calling thread.
    ///
    /// The file is opened in append mode when the Sink starts. A full batch is
    /// written and flushed as soon as it reaches the threshold; whatever is
    /// left is written when the stream ends or the queue closes.
    ///
    /// # Arguments
    ///
    /// * `records` - Output queue fed by the Fetcher
    ///
    /// # Returns
    ///
    /// Rows and flushes written, or the first open/write error.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), batch_size = self.batch_size))]
    pub fn run(
        self,
        mut records: mpsc::UnboundedReceiver<Message<ArticleRecord>>,
    ) -> Result<SinkStats, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|error| SinkError::Open {
                path: self.path.display().to_string(),
                error,
            })?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        let mut batch: Vec<ArticleRecord> = Vec::with_capacity(self.batch_size);
        let mut stats = SinkStats::default();

        loop {
            match records.blocking_recv() {
                Some(Message::Data(record)) => {
                    batch.push(record);
                    if batch.len() >= self.batch_size {
                        write_batch(&mut writer, &mut batch, &mut stats)?;
                    }
                }
                Some(Message::EndOfStream) => {
                    debug!(pending = batch.len(), "End of stream");
                    break;
                }
                None => {
                    warn!(pending = batch.len(), "Output queue closed without end-of-stream");
                    break;
                }
            }
        }

        if !batch.is_empty() {
            write_batch(&mut writer, &mut batch, &mut stats)?;
        }
        writer.flush()?;
        drop(writer);

        info!(rows = stats.rows, flushes = stats.flushes, "Sink closed");
        Ok(stats)
    }
}

fn write_batch(
    writer: &mut Writer<File>,
    batch: &mut Vec<ArticleRecord>,
    stats: &mut SinkStats,
) -> Result<(), SinkError> {
    for record in batch.iter() {
        writer.serialize(record)?;
    }
    writer.flush()?;
    stats.rows += batch.len();
    stats.flushes += 1;
    info!(rows = batch.len(), total = stats.rows, "Wrote batch to CSV");
    batch.clear();
    Ok(())
}
