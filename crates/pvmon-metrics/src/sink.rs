//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metric line encoding and time-series export sinks."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pvmon_rt::{RetryPolicy, ShutdownListener};
use tracing::{error, warn};

use crate::errors::{Result, SinkError};
use crate::line::{encode_lines, MetricLine};

/// Destination for rendered metric lines.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, lines: &[MetricLine]) -> Result<()>;
}

#[async_trait]
impl<S: MetricsSink + ?Sized> MetricsSink for Arc<S> {
    async fn publish(&self, lines: &[MetricLine]) -> Result<()> {
        (**self).publish(lines).await
    }
}

/// Retries transient failures of the wrapped sink with exponential backoff.
/// Waiting between attempts is abandoned as soon as shutdown is signalled.
pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
    shutdown: ShutdownListener,
}

impl<S: MetricsSink> RetryingSink<S> {
    pub fn new(inner: S, policy: RetryPolicy, shutdown: ShutdownListener) -> Self {
        Self {
            inner,
            policy,
            shutdown,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: MetricsSink> MetricsSink for RetryingSink<S> {
    async fn publish(&self, lines: &[MetricLine]) -> Result<()> {
        let mut attempt = 1;
        loop {
            let err = match self.inner.publish(lines).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= self.policy.max_attempts {
                error!(
                    attempt,
                    lines = lines.len(),
                    error = %err,
                    "giving up on metrics publish"
                );
                return Err(err);
            }
            let delay = self.policy.backoff_delay(attempt);
            warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "metrics publish failed; retrying"
            );
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.triggered() => return Err(SinkError::Cancelled),
            }
            attempt += 1;
        }
    }
}

/// Writes the encoded lines to stdout instead of the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

#[async_trait]
impl MetricsSink for StdoutSink {
    async fn publish(&self, lines: &[MetricLine]) -> Result<()> {
        let body = encode_lines(lines);
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(body.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

/// Keeps every published line in memory. Can be told to fail a number of
/// upcoming publishes.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<MetricLine>>,
    publishes: AtomicUsize,
    failures: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` publishes with a retryable 503.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn lines(&self) -> Vec<MetricLine> {
        self.lines.lock().clone()
    }

    pub fn lines_named(&self, name: &str) -> Vec<MetricLine> {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.name == name)
            .cloned()
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn publish(&self, lines: &[MetricLine]) -> Result<()> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SinkError::Status {
                status: 503,
                body: "injected failure".to_owned(),
            });
        }
        self.lines.lock().extend_from_slice(lines);
        Ok(())
    }
}
