//! The hash primitive gate.
//!
//! Every digest and checksum call made by a stage goes through a
//! [`HashGate`], which caps how many calls run at once. Digest calls are
//! capped a second time by their own, usually smaller, ceiling.

mod metrics;
mod primitives;

pub use metrics::GateMetrics;
pub use primitives::{HashPrimitives, Md5Crc32, Primitive, StubPrimitives};

#[cfg(test)]
pub use primitives::MockHashPrimitives;

use crate::config::GateConfig;
use crate::errors::PrimitiveError;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{trace, warn};

/// Concurrency-limited access to a set of hash primitives.
pub struct HashGate {
    primitives: Arc<dyn HashPrimitives>,
    permits: Arc<Semaphore>,
    digest_permits: Arc<Semaphore>,
    config: GateConfig,
    metrics: Arc<GateMetrics>,
}

impl HashGate {
    /// Creates a gate in front of `primitives`.
    ///
    /// Ceilings of zero are raised to one.
    #[must_use]
    pub fn new(primitives: Arc<dyn HashPrimitives>, config: GateConfig) -> Self {
        let max_concurrent = clamp_ceiling("max_concurrent", config.max_concurrent);
        let digest_max = clamp_ceiling("digest_max_concurrent", config.digest_max_concurrent);

        Self {
            primitives,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            digest_permits: Arc::new(Semaphore::new(digest_max)),
            config,
            metrics: Arc::new(GateMetrics::default()),
        }
    }

    /// Creates a gate with default limits.
    #[must_use]
    pub fn with_defaults(primitives: Arc<dyn HashPrimitives>) -> Self {
        Self::new(primitives, GateConfig::default())
    }

    /// Returns the gate's configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Returns the gate's call counters.
    #[must_use]
    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    /// Computes `digest(data)` under the gate's limits.
    pub async fn digest(&self, data: String) -> Result<String, PrimitiveError> {
        self.call(Primitive::Digest, data).await
    }

    /// Computes `checksum(data)` under the gate's limits.
    pub async fn checksum(&self, data: String) -> Result<String, PrimitiveError> {
        self.call(Primitive::Checksum, data).await
    }

    async fn call(&self, primitive: Primitive, data: String) -> Result<String, PrimitiveError> {
        let closed = |data: &str| PrimitiveError::new(primitive.to_string(), data, "gate closed");

        // Digest permit first, then the shared one; always in this order.
        let digest_permit = match primitive {
            Primitive::Digest => Some(
                self.digest_permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| closed(&data))?,
            ),
            Primitive::Checksum => None,
        };
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| closed(&data))?;

        let in_flight = self.metrics.enter(primitive);
        trace!(%primitive, input = %data, "primitive call started");

        let delay = self.simulated_delay(primitive);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        // Aborting this future does not stop a blocking task, so the permits
        // and the in-flight guard go with the work and drop when it returns.
        let primitives = self.primitives.clone();
        let input = data.clone();
        let result = tokio::task::spawn_blocking(move || {
            // Tuple fields drop in order, so the counters fall before permits free up.
            let _held = (in_flight, permit, digest_permit);
            match primitive {
                Primitive::Digest => primitives.digest(&input),
                Primitive::Checksum => primitives.checksum(&input),
            }
        })
        .await
        .map_err(|e| PrimitiveError::new(primitive.to_string(), data.as_str(), e.to_string()))
        .and_then(|r| r);

        if let Err(ref e) = result {
            self.metrics.record_failure();
            warn!(%primitive, error = %e, "primitive call failed");
        }
        result
    }

    fn simulated_delay(&self, primitive: Primitive) -> Duration {
        let base = match primitive {
            Primitive::Digest => self.config.digest_latency_ms,
            Primitive::Checksum => self.config.checksum_latency_ms,
        };
        let jitter = if self.config.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter))
    }
}

impl std::fmt::Debug for HashGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashGate")
            .field("config", &self.config)
            .field("in_flight", &self.metrics.in_flight())
            .finish_non_exhaustive()
    }
}

fn clamp_ceiling(name: &str, value: usize) -> usize {
    if value == 0 {
        warn!(setting = name, "gate ceiling of 0 would deadlock; using 1");
        1
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CombineRule, OrderedCollector, SubTask};
    use crate::testing::{CountingPrimitives, FailingPrimitives};
    use futures::future::join_all;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_gate_forwards_to_primitives() {
        let gate = HashGate::with_defaults(Arc::new(StubPrimitives));

        assert_eq!(gate.digest("abc".to_string()).await.unwrap(), "abc");
        assert_eq!(gate.checksum("abc".to_string()).await.unwrap(), "C(abc)");
        assert_eq!(gate.metrics().digest_calls(), 1);
        assert_eq!(gate.metrics().checksum_calls(), 1);
        assert_eq!(gate.metrics().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_gate_surfaces_primitive_errors() {
        let mut mock = MockHashPrimitives::new();
        mock.expect_checksum()
            .returning(|data| Err(PrimitiveError::new("checksum", data, "overheated")));

        let gate = HashGate::with_defaults(Arc::new(mock));
        let err = gate.checksum("x".to_string()).await.unwrap_err();

        assert_eq!(err.reason, "overheated");
        assert_eq!(gate.metrics().failures(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gate_respects_ceiling() {
        let config = GateConfig::new()
            .with_max_concurrent(3)
            .with_latency(Duration::ZERO, Duration::from_millis(15));
        let gate = Arc::new(HashGate::new(Arc::new(StubPrimitives), config));

        let calls = (0..20).map(|i| {
            let gate = gate.clone();
            async move { gate.checksum(i.to_string()).await }
        });
        let results = join_all(calls).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(gate.metrics().peak_in_flight(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_digest_has_its_own_ceiling() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut mock = MockHashPrimitives::new();
        let (r, p) = (running.clone(), peak.clone());
        mock.expect_digest().returning(move |data| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            r.fetch_sub(1, Ordering::SeqCst);
            Ok(data.to_string())
        });

        let gate = Arc::new(HashGate::new(Arc::new(mock), GateConfig::default()));
        let calls = (0..8).map(|i| {
            let gate = gate.clone();
            async move { gate.digest(i.to_string()).await }
        });
        join_all(calls).await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(gate.metrics().peak_digest_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_zero_ceiling_is_raised() {
        let gate = HashGate::new(
            Arc::new(StubPrimitives),
            GateConfig::new().with_max_concurrent(0),
        );
        assert_eq!(gate.checksum("a".to_string()).await.unwrap(), "C(a)");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_aborted_call_holds_its_permit_until_the_work_returns() {
        let counting = CountingPrimitives::new(Duration::from_millis(80));
        let primitives = FailingPrimitives::wrapping(counting.clone(), "fail");
        let gate = Arc::new(HashGate::new(
            Arc::new(primitives),
            GateConfig::new().with_max_concurrent(2),
        ));

        let slow: SubTask = {
            let gate = gate.clone();
            async move { gate.checksum("slow".to_string()).await }.boxed()
        };
        // Fails only once the slow call is busy on its blocking thread.
        let failing: SubTask = {
            let gate = gate.clone();
            let counting = counting.clone();
            async move {
                while counting.running() == 0 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                gate.checksum("fail".to_string()).await
            }
            .boxed()
        };
        let err = OrderedCollector::new(0, CombineRule::Concat)
            .collect(vec![slow, failing])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "primitive");

        // The aborted slow call is still running; only one more may start.
        let calls = (0..2).map(|i| {
            let gate = gate.clone();
            async move { gate.checksum(i.to_string()).await }
        });
        let results = join_all(calls).await;

        assert!(results.iter().all(Result::is_ok));
        assert!(counting.peak() <= 2, "peak was {}", counting.peak());
        assert!(gate.metrics().peak_in_flight() <= 2);
        assert_eq!(gate.metrics().in_flight(), 0);
    }
}
