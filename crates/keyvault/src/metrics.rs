//! Per-store operation counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Remote operation kinds counted by [`StoreMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `PUT /secrets/{name}`
    Put,
    /// `GET /secrets/{name}`
    Get,
    /// `DELETE /secrets/{name}`
    Delete,
    /// One page of `GET /secrets`
    List,
}

/// Atomic counters for a [`KeyVaultBlobStore`](crate::KeyVaultBlobStore)
///
/// Counts raw remote outcomes: a 404 on delete is an error here even though
/// the store reports success.
///
/// ```rust,ignore
/// let metrics = store.metrics();
/// println!("{} gets, {:.1}% errors", metrics.get_count(), metrics.error_rate() * 100.0);
/// ```
#[derive(Debug, Default)]
pub struct StoreMetrics {
    put_count: AtomicU64,
    put_latency_sum_ms: AtomicU64,
    get_count: AtomicU64,
    get_latency_sum_ms: AtomicU64,
    delete_count: AtomicU64,
    list_count: AtomicU64,
    error_count: AtomicU64,
}

impl StoreMetrics {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished remote call
    pub fn record(&self, operation: Operation, duration: Duration, success: bool) {
        let latency_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

        match operation {
            Operation::Put => {
                self.put_count.fetch_add(1, Ordering::Relaxed);
                self.put_latency_sum_ms
                    .fetch_add(latency_ms, Ordering::Relaxed);
            }
            Operation::Get => {
                self.get_count.fetch_add(1, Ordering::Relaxed);
                self.get_latency_sum_ms
                    .fetch_add(latency_ms, Ordering::Relaxed);
            }
            Operation::Delete => {
                self.delete_count.fetch_add(1, Ordering::Relaxed);
            }
            Operation::List => {
                self.list_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        if !success {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Puts issued
    pub fn put_count(&self) -> u64 {
        self.put_count.load(Ordering::Relaxed)
    }

    /// Gets issued, including those answered with 404
    pub fn get_count(&self) -> u64 {
        self.get_count.load(Ordering::Relaxed)
    }

    /// Deletes issued
    pub fn delete_count(&self) -> u64 {
        self.delete_count.load(Ordering::Relaxed)
    }

    /// Listing pages fetched
    pub fn list_count(&self) -> u64 {
        self.list_count.load(Ordering::Relaxed)
    }

    /// Failed calls across all operations
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Mean put latency in milliseconds, 0 before the first put
    pub fn avg_put_latency_ms(&self) -> u64 {
        let count = self.put_count();
        if count == 0 {
            return 0;
        }
        self.put_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Mean get latency in milliseconds, 0 before the first get
    pub fn avg_get_latency_ms(&self) -> u64 {
        let count = self.get_count();
        if count == 0 {
            return 0;
        }
        self.get_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Errors over total calls, between 0.0 and 1.0
    pub fn error_rate(&self) -> f64 {
        let total = self.put_count() + self.get_count() + self.delete_count() + self.list_count();
        if total == 0 {
            return 0.0;
        }
        self.error_count() as f64 / total as f64
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.put_count,
            &self.put_latency_sum_ms,
            &self.get_count,
            &self.get_latency_sum_ms,
            &self.delete_count,
            &self.list_count,
            &self.error_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
