//! Primitive and gate fixtures.

use crate::config::GateConfig;
use crate::errors::PrimitiveError;
use crate::gate::{HashGate, HashPrimitives, StubPrimitives};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps another primitive set and fails any call whose input contains a
/// marker.
#[derive(Debug)]
pub struct FailingPrimitives<P = StubPrimitives> {
    inner: P,
    marker: String,
    failures: AtomicUsize,
}

impl FailingPrimitives<StubPrimitives> {
    /// Fails on `marker`; otherwise behaves like [`StubPrimitives`].
    #[must_use]
    pub fn stub(marker: impl Into<String>) -> Self {
        Self::wrapping(StubPrimitives, marker)
    }
}

impl<P: HashPrimitives> FailingPrimitives<P> {
    /// Fails on `marker`; otherwise delegates to `inner`.
    #[must_use]
    pub fn wrapping(inner: P, marker: impl Into<String>) -> Self {
        Self {
            inner,
            marker: marker.into(),
            failures: AtomicUsize::new(0),
        }
    }

    /// Number of calls that were made to fail.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    fn check(&self, primitive: &str, data: &str) -> Result<(), PrimitiveError> {
        if data.contains(&self.marker) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(PrimitiveError::new(primitive, data, "injected failure"));
        }
        Ok(())
    }
}

impl<P: HashPrimitives> HashPrimitives for FailingPrimitives<P> {
    fn digest(&self, data: &str) -> Result<String, PrimitiveError> {
        self.check("digest", data)?;
        self.inner.digest(data)
    }

    fn checksum(&self, data: &str) -> Result<String, PrimitiveError> {
        self.check("checksum", data)?;
        self.inner.checksum(data)
    }
}

/// Stub primitives that hold every call on its thread for a fixed time and
/// record how many calls were running at once.
///
/// Clones share their counters, so one clone can be wrapped (for instance
/// by [`FailingPrimitives`]) while another is kept to read the peak.
#[derive(Debug, Clone)]
pub struct CountingPrimitives {
    hold: Duration,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl CountingPrimitives {
    /// Holds each call for `hold` before answering like [`StubPrimitives`].
    #[must_use]
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Calls running right now.
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were ever running at once.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn run_held<T>(&self, call: impl FnOnce() -> T) -> T {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.hold);
        let out = call();
        self.running.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

impl HashPrimitives for CountingPrimitives {
    fn digest(&self, data: &str) -> Result<String, PrimitiveError> {
        self.run_held(|| StubPrimitives.digest(data))
    }

    fn checksum(&self, data: &str) -> Result<String, PrimitiveError> {
        self.run_held(|| StubPrimitives.checksum(data))
    }
}

/// A gate over [`StubPrimitives`] with default limits.
#[must_use]
pub fn stub_gate() -> Arc<HashGate> {
    stub_gate_with(GateConfig::default())
}

/// A gate over [`StubPrimitives`] with the given limits.
#[must_use]
pub fn stub_gate_with(config: GateConfig) -> Arc<HashGate> {
    Arc::new(HashGate::new(Arc::new(StubPrimitives), config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_primitives_match_marker() {
        let primitives = FailingPrimitives::stub("7");

        assert_eq!(primitives.checksum("12").unwrap(), "C(12)");
        assert_eq!(primitives.digest("12").unwrap(), "12");
        assert!(primitives.checksum("17").is_err());
        assert!(primitives.digest("7").is_err());
        assert_eq!(primitives.failures(), 2);
    }

    #[test]
    fn test_counting_primitives_share_counters() {
        let counting = CountingPrimitives::new(Duration::from_millis(20));
        let clone = counting.clone();

        let threads: Vec<_> = (0..3)
            .map(|i| {
                let p = clone.clone();
                std::thread::spawn(move || p.checksum(&i.to_string()))
            })
            .collect();
        for t in threads {
            assert!(t.join().unwrap().is_ok());
        }

        assert_eq!(counting.running(), 0);
        assert!(counting.peak() >= 1);
        assert!(counting.peak() <= 3);
    }

    #[tokio::test]
    async fn test_stub_gate() {
        let gate = stub_gate();
        assert_eq!(gate.checksum("x".to_string()).await.unwrap(), "C(x)");
    }
}
