//! Shutdown coordination shared by every pipeline stage.
//!
//! A [`Shutdown`] is triggered at most once, by the orchestrator when the
//! process receives SIGTERM, SIGINT or SIGHUP. Async code waits on the
//! wrapped [`CancellationToken`]; blocking code selects on [`Shutdown::closed`],
//! a channel that becomes ready (disconnected) once shutdown is triggered.
//! [`signals`] yields every termination signal, not only the first.

use crossbeam_channel::{Receiver, Sender};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone, Debug)]
pub struct Shutdown {
    token: CancellationToken,
    closed: Receiver<()>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            token: CancellationToken::new(),
            closed: rx,
            trigger: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
        match self.trigger.lock() {
            Ok(mut sender) => drop(sender.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once shutdown has been triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Ready (with a disconnect error) once shutdown has been triggered.
    pub fn closed(&self) -> &Receiver<()> {
        &self.closed
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Every SIGTERM, SIGINT or SIGHUP the process receives, by name.
///
/// The handlers stay installed for the life of the stream, so a second
/// signal during the drain is seen as well.
#[cfg(unix)]
pub fn signals() -> std::io::Result<BoxStream<'static, &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let handlers = (
        signal(SignalKind::terminate())?,
        signal(SignalKind::interrupt())?,
        signal(SignalKind::hangup())?,
    );
    let stream = stream::unfold(handlers, |(mut term, mut int, mut hup)| async move {
        let name = tokio::select! {
            Some(()) = term.recv() => "SIGTERM",
            Some(()) = int.recv() => "SIGINT",
            Some(()) = hup.recv() => "SIGHUP",
            else => return None,
        };
        info!(signal = name, "Received termination signal");
        Some((name, (term, int, hup)))
    });
    Ok(stream.boxed())
}

#[cfg(not(unix))]
pub fn signals() -> std::io::Result<BoxStream<'static, &'static str>> {
    let stream = stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok()?;
        info!(signal = "CTRL_C", "Received termination signal");
        Some(("CTRL_C", ()))
    });
    Ok(stream.boxed())
}
