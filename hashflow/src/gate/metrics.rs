//! Call accounting for the hash gate.

use super::Primitive;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Counters kept by the gate.
#[derive(Debug, Default)]
pub struct GateMetrics {
    digest_calls: AtomicU64,
    checksum_calls: AtomicU64,
    failures: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    digest_in_flight: AtomicUsize,
    peak_digest_in_flight: AtomicUsize,
}

impl GateMetrics {
    /// Marks the start of a call and returns a guard that marks its end.
    ///
    /// The guard owns a handle to the metrics so it can travel with the call
    /// onto a blocking thread.
    pub(super) fn enter(self: &Arc<Self>, primitive: Primitive) -> InFlightGuard {
        match primitive {
            Primitive::Digest => {
                self.digest_calls.fetch_add(1, Ordering::Relaxed);
                let now = self.digest_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_digest_in_flight.fetch_max(now, Ordering::SeqCst);
            }
            Primitive::Checksum => {
                self.checksum_calls.fetch_add(1, Ordering::Relaxed);
            }
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard {
            metrics: Arc::clone(self),
            primitive,
        }
    }

    pub(super) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of digest calls started.
    #[must_use]
    pub fn digest_calls(&self) -> u64 {
        self.digest_calls.load(Ordering::Relaxed)
    }

    /// Number of checksum calls started.
    #[must_use]
    pub fn checksum_calls(&self) -> u64 {
        self.checksum_calls.load(Ordering::Relaxed)
    }

    /// Number of calls that returned an error.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Calls currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of calls ever running at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of digest calls ever running at once.
    #[must_use]
    pub fn peak_digest_in_flight(&self) -> usize {
        self.peak_digest_in_flight.load(Ordering::SeqCst)
    }

    /// Converts metrics to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "digest_calls": self.digest_calls(),
            "checksum_calls": self.checksum_calls(),
            "failures": self.failures(),
            "peak_in_flight": self.peak_in_flight(),
            "peak_digest_in_flight": self.peak_digest_in_flight(),
        })
    }
}

/// Decrements the in-flight counters when dropped.
pub(super) struct InFlightGuard {
    metrics: Arc<GateMetrics>,
    primitive: Primitive,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.primitive == Primitive::Digest {
            self.metrics.digest_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_tracking() {
        let metrics = Arc::new(GateMetrics::default());
        {
            let _a = metrics.enter(Primitive::Checksum);
            let _b = metrics.enter(Primitive::Digest);
            assert_eq!(metrics.in_flight(), 2);
        }
        let _c = metrics.enter(Primitive::Checksum);

        assert_eq!(metrics.in_flight(), 1);
        assert_eq!(metrics.peak_in_flight(), 2);
        assert_eq!(metrics.peak_digest_in_flight(), 1);
        assert_eq!(metrics.checksum_calls(), 2);
        assert_eq!(metrics.digest_calls(), 1);
    }

    #[test]
    fn test_guard_outlives_its_creator() {
        let metrics = Arc::new(GateMetrics::default());
        let guard = metrics.enter(Primitive::Digest);

        let handle = std::thread::spawn(move || drop(guard));
        handle.join().unwrap();

        assert_eq!(metrics.in_flight(), 0);
        assert_eq!(metrics.peak_digest_in_flight(), 1);
    }

    #[test]
    fn test_to_json() {
        let metrics = GateMetrics::default();
        metrics.record_failure();
        let json = metrics.to_json();
        assert_eq!(json["failures"], 1);
        assert_eq!(json["digest_calls"], 0);
    }
}
