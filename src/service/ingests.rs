//! Retry queue for ingests that failed on a transient error.
//!
//! An entry keeps the items themselves, so a retry re-embeds and commits
//! them exactly as the original request would have.

use std::future::Future;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{PixdexError, Result};
use crate::ingest::IngestItem;
use crate::scope::Scope;
use crate::service::deletions::RetryReport;

/// An ingest waiting to be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingIngest {
    pub scope: Scope,
    pub items: Vec<IngestItem>,
    /// Failed retries so far, not counting the failure that queued it.
    pub attempts: u32,
    pub last_error: String,
    pub recorded_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct IngestQueue {
    max_attempts: u32,
    pending: Mutex<Vec<PendingIngest>>,
}

impl IngestQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failed ingest. Each failure is its own entry.
    pub fn record(&self, scope: Scope, items: Vec<IngestItem>, err: &PixdexError) {
        let count = items.len();
        self.pending.lock().push(PendingIngest {
            scope,
            items,
            attempts: 0,
            last_error: err.to_string(),
            recorded_at: Utc::now(),
            last_attempt_at: None,
        });
        info!("Recorded failed ingest for {scope} ({count} items)");
    }

    /// Snapshot of the queue in recording order.
    pub fn pending(&self) -> Vec<PendingIngest> {
        self.pending.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Run `ingest` once for every queued entry, one entry at a time.
    ///
    /// A failure that is not retryable, such as a scope deleted in the
    /// meantime, abandons the entry at once.
    pub async fn retry<F, Fut>(&self, mut ingest: F) -> RetryReport
    where
        F: FnMut(Scope, Vec<IngestItem>) -> Fut,
        Fut: Future<Output = Result<usize>>,
    {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return RetryReport::default();
        }
        info!("Retrying {} failed ingests", batch.len());

        let mut report = RetryReport::default();
        let mut keep = Vec::new();
        for mut entry in batch {
            entry.last_attempt_at = Some(Utc::now());
            match ingest(entry.scope, entry.items.clone()).await {
                Ok(added) => {
                    info!(
                        "Retried ingest into {} succeeded ({added} new vectors)",
                        entry.scope
                    );
                    report.succeeded += 1;
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        "Dropping ingest of {} items into {}: {e}",
                        entry.items.len(),
                        entry.scope
                    );
                    report.abandoned += 1;
                }
                Err(e) => {
                    entry.attempts += 1;
                    entry.last_error = e.to_string();
                    if entry.attempts >= self.max_attempts {
                        error!(
                            "Ingest into {} exhausted {} retries: {e}",
                            entry.scope, self.max_attempts
                        );
                        report.abandoned += 1;
                    } else {
                        warn!(
                            "Retry {}/{} of ingest into {} failed: {e}",
                            entry.attempts, self.max_attempts, entry.scope
                        );
                        report.failed += 1;
                        keep.push(entry);
                    }
                }
            }
        }

        let mut pending = self.pending.lock();
        keep.append(&mut pending);
        *pending = keep;

        info!(
            "Ingest retry pass: {} succeeded, {} failed, {} abandoned",
            report.succeeded, report.failed, report.abandoned
        );
        report
    }
}
