//! Write results and detached write tasks.
//!
//! [`RecordHandle`] is a single-resolution future: it yields the outcome of
//! one `record` call exactly once. A sender that is dropped without
//! reporting counts as success.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::error::HistorianError;
use crate::metrics::HistorianMetrics;

/// Outcome of a history write.
pub type RecordResult = Result<(), HistorianError>;

/// Future resolving to the outcome of one `record` call.
#[derive(Debug)]
#[must_use = "dropping the handle discards the write outcome"]
pub struct RecordHandle {
    rx: oneshot::Receiver<RecordResult>,
}

/// Sending half of a [`RecordHandle`].
#[derive(Debug)]
pub struct RecordSender {
    tx: oneshot::Sender<RecordResult>,
}

impl RecordHandle {
    /// Creates a connected sender/handle pair.
    pub fn channel() -> (RecordSender, Self) {
        let (tx, rx) = oneshot::channel();
        (RecordSender { tx }, Self { rx })
    }

    /// Creates a handle that is already resolved with `result`.
    pub fn ready(result: RecordResult) -> Self {
        let (tx, handle) = Self::channel();
        tx.send(result);
        handle
    }

    /// Creates a handle that is already resolved with success.
    pub fn done() -> Self {
        Self::ready(Ok(()))
    }
}

impl RecordSender {
    /// Resolves the paired handle. A handle that was dropped is ignored.
    pub fn send(self, result: RecordResult) {
        let _ = self.tx.send(result);
    }
}

impl Future for RecordHandle {
    type Output = RecordResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_closed)) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Runs `write` on its own task, detached from the caller.
///
/// The task gets a fresh root span that follows from the caller's current
/// span, its own `timeout`, and panic recovery: a panic resolves the
/// handle with [`HistorianError::Panic`]. Dropping the returned handle
/// does not cancel the write.
///
/// The batch of `transitions` for `org_id` is counted as attempted before
/// `write` starts and as failed on any error, including a timeout or panic.
pub fn spawn_write<F>(
    metrics: &Arc<HistorianMetrics>,
    backend: &'static str,
    org_id: i64,
    transitions: usize,
    timeout: Duration,
    write: F,
) -> RecordHandle
where
    F: Future<Output = RecordResult> + Send + 'static,
{
    let (tx, handle) = RecordHandle::channel();
    let metrics = Arc::clone(metrics);

    let caller = tracing::Span::current();
    let span = tracing::info_span!(parent: None, "state_history_write", backend, org_id);
    span.follows_from(&caller);

    tokio::spawn(
        async move {
            let org = org_id.to_string();
            metrics.record_attempt(&org, backend, transitions);
            metrics.active_writes.inc();
            let started = Instant::now();
            let outcome = AssertUnwindSafe(tokio::time::timeout(timeout, write))
                .catch_unwind()
                .await;
            metrics.active_writes.dec();
            metrics
                .persist_duration
                .with_label_values(&[backend])
                .observe(started.elapsed().as_secs_f64());

            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(_elapsed)) => {
                    tracing::error!(backend, ?timeout, transitions, "state history write timed out");
                    Err(HistorianError::Timeout(timeout))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(backend, panic = %message, "state history write panicked");
                    Err(HistorianError::Panic(message))
                }
            };
            if result.is_err() {
                metrics.record_failure(&org, backend, transitions);
            }
            tx.send(result);
        }
        .instrument(span),
    );

    handle
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
