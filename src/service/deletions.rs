//! Retry queue for scope deletions that failed during teardown.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{PixdexError, Result};
use crate::scope::Scope;

/// A deletion waiting to be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDeletion {
    pub scope: Scope,
    /// Failed retries so far, not counting the failure that queued it.
    pub attempts: u32,
    pub last_error: String,
    pub recorded_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Outcome of one pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryReport {
    /// Deleted, or found already gone.
    pub succeeded: usize,
    /// Failed again and kept for the next pass.
    pub failed: usize,
    /// Failed for the last allowed time and dropped.
    pub abandoned: usize,
}

#[derive(Debug)]
pub struct DeletionQueue {
    max_attempts: u32,
    pending: Mutex<Vec<PendingDeletion>>,
}

impl DeletionQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failed deletion. A scope already queued keeps its entry and
    /// takes the newer error.
    pub fn record(&self, scope: Scope, err: &PixdexError) {
        let mut pending = self.pending.lock();
        if let Some(entry) = pending.iter_mut().find(|entry| entry.scope == scope) {
            entry.last_error = err.to_string();
            return;
        }
        pending.push(PendingDeletion {
            scope,
            attempts: 0,
            last_error: err.to_string(),
            recorded_at: Utc::now(),
            last_attempt_at: None,
        });
        info!("Recorded failed index deletion for {scope}");
    }

    /// Snapshot of the queue in recording order.
    pub fn pending(&self) -> Vec<PendingDeletion> {
        self.pending.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Run `delete` once for every queued scope.
    ///
    /// The queue is taken out for the pass, so a deletion recorded meanwhile
    /// waits for the next pass.
    pub fn retry<F>(&self, mut delete: F) -> RetryReport
    where
        F: FnMut(Scope) -> Result<()>,
    {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return RetryReport::default();
        }
        info!("Retrying {} failed index deletions", batch.len());

        let mut report = RetryReport::default();
        let mut keep = Vec::new();
        for mut entry in batch {
            entry.last_attempt_at = Some(Utc::now());
            match delete(entry.scope) {
                Ok(()) => report.succeeded += 1,
                Err(e) if e.is_not_found() => report.succeeded += 1,
                Err(e) => {
                    entry.attempts += 1;
                    entry.last_error = e.to_string();
                    if entry.attempts >= self.max_attempts {
                        error!(
                            "Index deletion for {} exhausted {} retries: {e}",
                            entry.scope, self.max_attempts
                        );
                        report.abandoned += 1;
                    } else {
                        warn!(
                            "Retry {}/{} of index deletion for {} failed: {e}",
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
            "Deletion retry pass: {} succeeded, {} failed, {} abandoned",
            report.succeeded, report.failed, report.abandoned
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_deduplicates_by_scope() {
        let queue = DeletionQueue::new(3);
        queue.record(Scope::new(1, 1), &PixdexError::storage("disk busy"));
        queue.record(Scope::new(1, 1), &PixdexError::storage("still busy"));
        queue.record(Scope::new(1, 2), &PixdexError::storage("disk busy"));

        let pending = queue.pending();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].last_error.contains("still busy"));
        assert_eq!(pending[0].attempts, 0);
    }

    #[test]
    fn test_not_found_counts_as_success() {
        let queue = DeletionQueue::new(3);
        queue.record(Scope::new(1, 1), &PixdexError::storage("disk busy"));

        let report = queue.retry(|scope| Err(PixdexError::NotFound(scope)));
        assert_eq!(report.succeeded, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_abandons_after_max_attempts() {
        let queue = DeletionQueue::new(2);
        queue.record(Scope::new(4, 4), &PixdexError::storage("disk busy"));

        let report = queue.retry(|_| Err(PixdexError::storage("disk busy")));
        assert_eq!(report.failed, 1);
        assert_eq!(queue.pending()[0].attempts, 1);
        assert!(queue.pending()[0].last_attempt_at.is_some());

        let report = queue.retry(|_| Err(PixdexError::storage("disk busy")));
        assert_eq!(report.abandoned, 1);
        assert!(queue.is_empty());

        assert_eq!(queue.retry(|_| Ok(())), RetryReport::default());
    }
}
