//! Configuration for pipelines and the hash gate.
//!
//! Every field has a default, so configs can be deserialized from partial
//! JSON or assembled from `HASHFLOW_*` environment variables.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Capacity of the queue between two adjacent stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCapacity {
    /// Writers suspend once `n` values are waiting.
    Bounded(usize),
    /// Writers never suspend.
    Unbounded,
}

impl Default for QueueCapacity {
    fn default() -> Self {
        Self::Bounded(64)
    }
}

/// Order in which fan-out stages emit finished items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// Emit each item as soon as its sub-tasks finish.
    #[default]
    Completion,
    /// Hold finished items back until all earlier items have been emitted.
    Input,
}

/// What a fan-out stage does when one item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailurePolicy {
    /// Record the failure, drop the item, keep streaming.
    #[default]
    SkipItem,
    /// Fail the stage, which cancels the whole run.
    FailFast,
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of each inter-stage queue.
    #[serde(default)]
    pub queue_capacity: QueueCapacity,
    /// Maximum items a fan-out stage processes at once.
    #[serde(default = "default_max_items_in_flight")]
    pub max_items_in_flight: usize,
    /// Emission order of fan-out stages.
    #[serde(default)]
    pub order: OrderPolicy,
    /// Per-item failure handling.
    #[serde(default)]
    pub failure_policy: ItemFailurePolicy,
    /// Deadline for collecting one item's task units. `None` waits forever.
    #[serde(default = "default_collect_timeout_ms")]
    pub collect_timeout_ms: Option<u64>,
}

fn default_max_items_in_flight() -> usize {
    32
}

#[allow(clippy::unnecessary_wraps)]
fn default_collect_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: QueueCapacity::default(),
            max_items_in_flight: default_max_items_in_flight(),
            order: OrderPolicy::default(),
            failure_policy: ItemFailurePolicy::default(),
            collect_timeout_ms: default_collect_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: QueueCapacity) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the in-flight item bound.
    #[must_use]
    pub fn with_max_items_in_flight(mut self, n: usize) -> Self {
        self.max_items_in_flight = n;
        self
    }

    /// Sets the emission order.
    #[must_use]
    pub fn with_order(mut self, order: OrderPolicy) -> Self {
        self.order = order;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: ItemFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the collect deadline.
    #[must_use]
    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Removes the collect deadline; a hung sub-task then stalls its item.
    #[must_use]
    pub fn without_collect_timeout(mut self) -> Self {
        self.collect_timeout_ms = None;
        self
    }

    /// Returns the collect deadline, if any.
    #[must_use]
    pub fn collect_timeout(&self) -> Option<Duration> {
        self.collect_timeout_ms.map(Duration::from_millis)
    }

    /// Overlays values from `HASHFLOW_*` environment variables.
    ///
    /// Recognised: `HASHFLOW_QUEUE_CAPACITY` (a number, or `unbounded`),
    /// `HASHFLOW_MAX_ITEMS_IN_FLIGHT`, `HASHFLOW_ORDER` (`completion`|`input`),
    /// `HASHFLOW_FAILURE_POLICY` (`skip_item`|`fail_fast`),
    /// `HASHFLOW_COLLECT_TIMEOUT_MS` (`0` disables the deadline). Unparseable
    /// values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(raw) = env_var("HASHFLOW_QUEUE_CAPACITY") {
            if raw.eq_ignore_ascii_case("unbounded") {
                config.queue_capacity = QueueCapacity::Unbounded;
            } else if let Ok(n) = raw.parse() {
                config.queue_capacity = QueueCapacity::Bounded(n);
            }
        }
        if let Some(n) = env_parse("HASHFLOW_MAX_ITEMS_IN_FLIGHT") {
            config.max_items_in_flight = n;
        }
        match env_var("HASHFLOW_ORDER").as_deref() {
            Some("completion") => config.order = OrderPolicy::Completion,
            Some("input") => config.order = OrderPolicy::Input,
            _ => {}
        }
        match env_var("HASHFLOW_FAILURE_POLICY").as_deref() {
            Some("skip_item") => config.failure_policy = ItemFailurePolicy::SkipItem,
            Some("fail_fast") => config.failure_policy = ItemFailurePolicy::FailFast,
            _ => {}
        }
        if let Some(ms) = env_parse::<u64>("HASHFLOW_COLLECT_TIMEOUT_MS") {
            config.collect_timeout_ms = (ms > 0).then_some(ms);
        }
        config
    }
}

/// Configuration for the hash primitive gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Ceiling on concurrent primitive calls of any kind.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Ceiling on concurrent digest calls.
    #[serde(default = "default_digest_max_concurrent")]
    pub digest_max_concurrent: usize,
    /// Simulated cost of one digest call.
    #[serde(default)]
    pub digest_latency_ms: u64,
    /// Simulated cost of one checksum call.
    #[serde(default)]
    pub checksum_latency_ms: u64,
    /// Random extra delay, up to this bound, added to each call.
    #[serde(default)]
    pub jitter_ms: u64,
}

fn default_max_concurrent() -> usize {
    64
}

fn default_digest_max_concurrent() -> usize {
    1
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            digest_max_concurrent: default_digest_max_concurrent(),
            digest_latency_ms: 0,
            checksum_latency_ms: 0,
            jitter_ms: 0,
        }
    }
}

impl GateConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overall ceiling.
    #[must_use]
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Sets the digest ceiling.
    #[must_use]
    pub fn with_digest_max_concurrent(mut self, n: usize) -> Self {
        self.digest_max_concurrent = n;
        self
    }

    /// Sets simulated per-call latencies.
    #[must_use]
    pub fn with_latency(mut self, digest: Duration, checksum: Duration) -> Self {
        self.digest_latency_ms = u64::try_from(digest.as_millis()).unwrap_or(u64::MAX);
        self.checksum_latency_ms = u64::try_from(checksum.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the jitter bound.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Overlays values from `HASHFLOW_GATE_*` environment variables.
    ///
    /// Recognised: `HASHFLOW_GATE_MAX_CONCURRENT`,
    /// `HASHFLOW_GATE_DIGEST_MAX_CONCURRENT`, `HASHFLOW_GATE_DIGEST_LATENCY_MS`,
    /// `HASHFLOW_GATE_CHECKSUM_LATENCY_MS`, `HASHFLOW_GATE_JITTER_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_parse("HASHFLOW_GATE_MAX_CONCURRENT") {
            config.max_concurrent = n;
        }
        if let Some(n) = env_parse("HASHFLOW_GATE_DIGEST_MAX_CONCURRENT") {
            config.digest_max_concurrent = n;
        }
        if let Some(ms) = env_parse("HASHFLOW_GATE_DIGEST_LATENCY_MS") {
            config.digest_latency_ms = ms;
        }
        if let Some(ms) = env_parse("HASHFLOW_GATE_CHECKSUM_LATENCY_MS") {
            config.checksum_latency_ms = ms;
        }
        if let Some(ms) = env_parse("HASHFLOW_GATE_JITTER_MS") {
            config.jitter_ms = ms;
        }
        config
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_var(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, QueueCapacity::Bounded(64));
        assert_eq!(config.max_items_in_flight, 32);
        assert_eq!(config.order, OrderPolicy::Completion);
        assert_eq!(config.failure_policy, ItemFailurePolicy::SkipItem);
        assert_eq!(config.collect_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_collect_timeout_is_finite_unless_disabled() {
        let from_json: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(from_json.collect_timeout(), Some(Duration::from_secs(30)));

        let explicit_null: PipelineConfig =
            serde_json::from_value(serde_json::json!({"collect_timeout_ms": null})).unwrap();
        assert!(explicit_null.collect_timeout().is_none());

        assert!(PipelineConfig::new().without_collect_timeout().collect_timeout().is_none());
    }

    #[test]
    fn test_pipeline_config_from_partial_json() {
        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "queue_capacity": "unbounded",
            "order": "input",
        }))
        .unwrap();

        assert_eq!(config.queue_capacity, QueueCapacity::Unbounded);
        assert_eq!(config.order, OrderPolicy::Input);
        assert_eq!(config.max_items_in_flight, 32);
    }

    #[test]
    fn test_bounded_capacity_json() {
        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "queue_capacity": {"bounded": 8},
            "failure_policy": "fail_fast",
            "collect_timeout_ms": 250,
        }))
        .unwrap();

        assert_eq!(config.queue_capacity, QueueCapacity::Bounded(8));
        assert_eq!(config.failure_policy, ItemFailurePolicy::FailFast);
        assert_eq!(config.collect_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_gate_config_builders() {
        let config = GateConfig::new()
            .with_max_concurrent(4)
            .with_digest_max_concurrent(2)
            .with_latency(Duration::from_millis(10), Duration::from_millis(20))
            .with_jitter(Duration::from_millis(3));

        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.digest_max_concurrent, 2);
        assert_eq!(config.digest_latency_ms, 10);
        assert_eq!(config.checksum_latency_ms, 20);
        assert_eq!(config.jitter_ms, 3);
    }

    #[test]
    fn test_gate_config_defaults_from_empty_json() {
        let config: GateConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GateConfig::default());
        assert_eq!(config.digest_max_concurrent, 1);
    }
}
