//! # Reporter: periodic delivery of producer batches.
//!
//! The reporter owns the flush loop of one [`Producer`]: every
//! `flush_interval` it drains the buffer and hands the batch to an
//! [`EventSink`].
//!
//! ```text
//! loop {
//!   ├─► delay = flush_interval           (after a delivered or rejected batch)
//!   │   delay = backoff.next(failures-1) (after an unavailable sink)
//!   ├─► select! { token.cancelled() => break, sleep(delay) => {} }
//!   └─► flush_now()
//!         ├─ Ok                     ─► failures = 0
//!         ├─ Err(Unavailable)       ─► requeue batch, failures += 1
//!         └─ Err(Rejected)          ─► discard batch (counted as dropped)
//! }
//! final flush_now() once after cancellation
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::Config;
use crate::error::SinkError;
use crate::policies::BackoffPolicy;

use super::handle::Producer;
use super::shutdown::wait_for_shutdown_signal;
use super::sink::EventSink;

/// Flush loop of one producer.
pub struct Reporter {
    producer: Arc<Producer>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    backoff: BackoffPolicy,
}

impl Reporter {
    pub fn new(producer: Arc<Producer>, sink: Arc<dyn EventSink>, cfg: &Config) -> Self {
        Self {
            producer,
            sink,
            interval: cfg.flush_interval,
            backoff: cfg.flush_backoff,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    /// Delivers whatever is buffered right now. Returns the number of events sent.
    pub async fn flush_now(&self) -> Result<usize, SinkError> {
        let Some(batch) = self.producer.flush_batch() else {
            return Ok(0);
        };
        let events = batch.len();

        match self.sink.send_batch(&batch).await {
            Ok(()) => {
                debug!(
                    sink = self.sink.name(),
                    events,
                    dropped_status = batch.dropped.status,
                    dropped_profile = batch.dropped.profile,
                    "batch delivered"
                );
                Ok(events)
            }
            Err(err) if err.is_retryable() => {
                warn!(sink = self.sink.name(), events, error = %err, "sink unavailable; batch requeued");
                self.producer.requeue(batch);
                Err(err)
            }
            Err(err) => {
                warn!(sink = self.sink.name(), events, error = %err, label = err.as_label(), "batch rejected; events dropped");
                self.producer.discard(batch);
                Err(err)
            }
        }
    }

    /// Flushes periodically until `token` is cancelled, then flushes once more.
    pub async fn run(self, token: CancellationToken) {
        let mut failures: u32 = 0;
        loop {
            let delay = match failures {
                0 => self.interval,
                n => self.backoff.next(n - 1),
            };
            tokio::select! {
                _ = token.cancelled() => break,
                _ = time::sleep(delay) => {}
            }
            match self.flush_now().await {
                Err(err) if err.is_retryable() => failures = failures.saturating_add(1),
                _ => failures = 0,
            }
        }

        if let Err(err) = self.flush_now().await {
            warn!(sink = self.sink.name(), error = %err, "final flush failed");
        }
    }

    /// Runs until the process receives a termination signal.
    pub async fn run_until_signal(self) -> std::io::Result<()> {
        let token = CancellationToken::new();
        let stop = token.clone();
        let handle = tokio::spawn(self.run(token));

        let signal = wait_for_shutdown_signal().await;
        stop.cancel();
        if let Err(err) = handle.await {
            warn!(error = %err, "reporter task ended abnormally");
        }
        signal
    }

    /// Spawns the flush loop on the current runtime.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}
