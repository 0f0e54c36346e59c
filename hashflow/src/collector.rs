//! Fan-out of one item into tagged sub-tasks, and the ordered fan-in.
//!
//! An [`OrderedCollector`] spawns one task per sub-computation, tags each
//! result with its position as a [`TaskUnit`], waits for all of them in
//! whatever order they finish, then sorts by tag and folds them with a
//! [`CombineRule`]. The folded value depends only on which units arrived,
//! never on when.

use crate::cancellation::CancellationToken;
use crate::errors::{CollectError, HashflowError, PrimitiveError};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::trace;

/// A sub-computation: resolves to the string for one tag.
pub type SubTask = BoxFuture<'static, Result<String, PrimitiveError>>;

/// The result of one sub-computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskUnit {
    /// Position of this unit in the fold.
    pub sequence: usize,
    /// The computed value.
    pub value: String,
}

impl TaskUnit {
    /// Creates a task unit.
    #[must_use]
    pub fn new(sequence: usize, value: impl Into<String>) -> Self {
        Self {
            sequence,
            value: value.into(),
        }
    }
}

/// How sorted unit values are combined into one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombineRule {
    /// Plain concatenation.
    Concat,
    /// Concatenation with a separator between adjacent values.
    Separated(String),
}

impl CombineRule {
    /// Joins values that are already in tag order.
    #[must_use]
    pub fn combine<S: AsRef<str>>(&self, values: &[S]) -> String {
        let sep = match self {
            Self::Concat => "",
            Self::Separated(sep) => sep.as_str(),
        };
        let mut out = String::with_capacity(
            values.iter().map(|v| v.as_ref().len()).sum::<usize>()
                + sep.len() * values.len().saturating_sub(1),
        );
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                out.push_str(sep);
            }
            out.push_str(value.as_ref());
        }
        out
    }
}

/// Sorts `units` by tag and folds them.
///
/// The tags must be exactly `0..expected`, each once.
pub fn fold_units(
    item: u64,
    expected: usize,
    mut units: Vec<TaskUnit>,
    rule: &CombineRule,
) -> Result<String, CollectError> {
    if units.len() != expected {
        return Err(CollectError::CountMismatch {
            item,
            expected,
            received: units.len(),
        });
    }

    units.sort_by_key(|u| u.sequence);
    for (position, unit) in units.iter().enumerate() {
        // Sorted and counted, so any gap means a duplicate or an out-of-range tag.
        if unit.sequence != position {
            return Err(CollectError::BadSequence {
                item,
                sequence: unit.sequence,
                expected,
            });
        }
    }

    let values: Vec<&str> = units.iter().map(|u| u.value.as_str()).collect();
    Ok(rule.combine(&values))
}

/// Aborts every spawned sub-task when dropped.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

enum Outcome {
    Gathered(Result<(), HashflowError>),
    Cancelled,
    TimedOut,
}

/// Collects the sub-task results of one item.
#[derive(Debug, Clone)]
pub struct OrderedCollector {
    item: u64,
    rule: CombineRule,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl OrderedCollector {
    /// Creates a collector for item `item`.
    #[must_use]
    pub fn new(item: u64, rule: CombineRule) -> Self {
        Self {
            item,
            rule,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Gives up once `timeout` elapses.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stops early when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs `subtasks` concurrently and folds their results in tag order.
    ///
    /// Sub-task `i` is tagged `i`. The first failure aborts the remaining
    /// sub-tasks; a partial fold is never returned.
    pub async fn collect(&self, subtasks: Vec<SubTask>) -> Result<String, HashflowError> {
        let expected = subtasks.len();
        let mut pending = FuturesUnordered::new();
        let mut aborts = Vec::with_capacity(expected);

        for (sequence, subtask) in subtasks.into_iter().enumerate() {
            let handle = tokio::spawn(async move {
                subtask.await.map(|value| TaskUnit::new(sequence, value))
            });
            aborts.push(handle.abort_handle());
            pending.push(handle);
        }
        let _guard = AbortOnDrop(aborts);

        let mut units = Vec::with_capacity(expected);
        let outcome = {
            let gather = async {
                while let Some(joined) = pending.next().await {
                    match joined {
                        Ok(Ok(unit)) => {
                            trace!(
                                item = self.item,
                                sequence = unit.sequence,
                                "task unit received"
                            );
                            units.push(unit);
                        }
                        Ok(Err(e)) => return Err(HashflowError::from(e)),
                        Err(_) => {
                            return Err(CollectError::CountMismatch {
                                item: self.item,
                                expected,
                                received: units.len(),
                            }
                            .into())
                        }
                    }
                }
                Ok(())
            };

            tokio::select! {
                result = gather => Outcome::Gathered(result),
                () = self.cancel.cancelled() => Outcome::Cancelled,
                () = deadline(self.timeout) => Outcome::TimedOut,
            }
        };

        match outcome {
            Outcome::Gathered(Ok(())) => Ok(fold_units(self.item, expected, units, &self.rule)?),
            Outcome::Gathered(Err(e)) => Err(e),
            Outcome::Cancelled => Err(HashflowError::Cancelled(
                self.cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
            )),
            Outcome::TimedOut => Err(CollectError::Timeout {
                item: self.item,
                expected,
                received: units.len(),
                timeout_ms: self
                    .timeout
                    .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            }
            .into()),
        }
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => futures::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn delayed(value: &str, ms: u64) -> SubTask {
        let value = value.to_string();
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(value)
        }
        .boxed()
    }

    #[test]
    fn test_fold_ignores_arrival_order() {
        let units = vec![
            TaskUnit::new(0, "a"),
            TaskUnit::new(1, "b"),
            TaskUnit::new(2, "c"),
        ];
        let mut reversed = units.clone();
        reversed.reverse();

        let rule = CombineRule::Separated("~".to_string());
        assert_eq!(fold_units(0, 3, units, &rule).unwrap(), "a~b~c");
        assert_eq!(fold_units(0, 3, reversed, &rule).unwrap(), "a~b~c");
    }

    #[test]
    fn test_fold_rejects_missing_units() {
        let err = fold_units(7, 3, vec![TaskUnit::new(0, "a")], &CombineRule::Concat).unwrap_err();
        assert_eq!(
            err,
            CollectError::CountMismatch {
                item: 7,
                expected: 3,
                received: 1
            }
        );
    }

    #[test]
    fn test_fold_rejects_duplicate_tags() {
        let units = vec![TaskUnit::new(0, "a"), TaskUnit::new(0, "b")];
        let err = fold_units(1, 2, units, &CombineRule::Concat).unwrap_err();
        assert!(matches!(err, CollectError::BadSequence { sequence: 0, .. }));
    }

    #[test]
    fn test_fold_rejects_out_of_range_tags() {
        let units = vec![TaskUnit::new(0, "a"), TaskUnit::new(5, "b")];
        let err = fold_units(1, 2, units, &CombineRule::Concat).unwrap_err();
        assert!(matches!(err, CollectError::BadSequence { sequence: 5, .. }));
    }

    #[test]
    fn test_combine_rules() {
        assert_eq!(CombineRule::Concat.combine(&["x", "y", "z"]), "xyz");
        assert_eq!(CombineRule::Separated("_".into()).combine(&["x", "y"]), "x_y");
        assert_eq!(CombineRule::Separated("_".into()).combine::<&str>(&[]), "");
    }

    #[tokio::test]
    async fn test_collect_orders_by_tag_not_completion() {
        // Tag 0 finishes last.
        let subtasks = vec![delayed("zero", 30), delayed("one", 15), delayed("two", 0)];
        let folded = OrderedCollector::new(0, CombineRule::Concat)
            .collect(subtasks)
            .await
            .unwrap();

        assert_eq!(folded, "zeroonetwo");
    }

    #[tokio::test]
    async fn test_collect_empty_fan_out() {
        let folded = OrderedCollector::new(0, CombineRule::Concat)
            .collect(Vec::new())
            .await
            .unwrap();
        assert_eq!(folded, "");
    }

    #[tokio::test]
    async fn test_failure_aborts_siblings() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let slow: SubTask = async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            Ok("slow".to_string())
        }
        .boxed();
        let failing: SubTask =
            async { Err(PrimitiveError::new("checksum", "x", "broken")) }.boxed();

        let err = OrderedCollector::new(3, CombineRule::Concat)
            .collect(vec![slow, failing])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "primitive");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_collect_times_out_instead_of_blocking() {
        let never: SubTask = futures::future::pending().boxed();
        let err = OrderedCollector::new(9, CombineRule::Concat)
            .with_timeout(Some(Duration::from_millis(20)))
            .collect(vec![delayed("fast", 0), never])
            .await
            .unwrap_err();

        match err {
            HashflowError::Collect(CollectError::Timeout {
                item,
                expected,
                received,
                ..
            }) => {
                assert_eq!(item, 9);
                assert_eq!(expected, 2);
                assert_eq!(received, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_subtask_is_a_count_mismatch() {
        let panics: SubTask = async {
            let missing: Option<String> = None;
            Ok(missing.expect("sub-task lost"))
        }
        .boxed();

        let err = OrderedCollector::new(2, CombineRule::Concat)
            .collect(vec![delayed("ok", 0), panics])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HashflowError::Collect(CollectError::CountMismatch { expected: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_collect_observes_cancellation() {
        let token = CancellationToken::new();
        token.cancel("shutting down");

        let never: SubTask = futures::future::pending().boxed();
        let err = OrderedCollector::new(0, CombineRule::Concat)
            .with_cancellation(token)
            .collect(vec![never])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Pipeline cancelled: shutting down");
    }
}
