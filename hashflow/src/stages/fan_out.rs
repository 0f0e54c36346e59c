//! Shared driver for stages that fan each item out into sub-tasks.
//!
//! The driver runs two loops side by side. The dispatch loop reads items,
//! waits for an in-flight slot, and spawns one collector task per item. The
//! emit loop receives finished items, applies the failure policy, and writes
//! results downstream in completion or input order.

use super::{next_input, send_output, Stage};
use crate::collector::{CombineRule, OrderedCollector, SubTask};
use crate::config::OrderPolicy;
use crate::context::StageContext;
use crate::core::{StageState, Value};
use crate::errors::HashflowError;
use crate::gate::HashGate;
use crate::queue::{QueueReceiver, QueueSender};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// A stage whose items each fan out into a fixed set of sub-tasks.
pub trait FanOut: Stage {
    /// How an item's sub-task results are folded.
    fn combine_rule(&self) -> CombineRule;

    /// Builds the sub-tasks for one item. Sub-task `i` is tagged `i`.
    ///
    /// Every primitive call a sub-task makes must go through `gate`.
    fn subtasks(&self, value: Value, gate: &Arc<HashGate>) -> Result<Vec<SubTask>, HashflowError>;
}

/// Releases items in the order the policy requires.
///
/// With [`OrderPolicy::Completion`] every item is released as it arrives.
/// With [`OrderPolicy::Input`] an item is held until all lower-indexed items
/// have been released.
#[derive(Debug)]
pub struct Resequencer<T> {
    policy: OrderPolicy,
    next: u64,
    held: BTreeMap<u64, T>,
}

impl<T> Resequencer<T> {
    /// Creates a resequencer expecting item 0 first.
    #[must_use]
    pub fn new(policy: OrderPolicy) -> Self {
        Self {
            policy,
            next: 0,
            held: BTreeMap::new(),
        }
    }

    /// Accepts item `index` and returns every item now ready, in order.
    pub fn push(&mut self, index: u64, item: T) -> Vec<T> {
        match self.policy {
            OrderPolicy::Completion => vec![item],
            OrderPolicy::Input => {
                self.held.insert(index, item);
                let mut ready = Vec::new();
                while let Some(item) = self.held.remove(&self.next) {
                    ready.push(item);
                    self.next += 1;
                }
                ready
            }
        }
    }

    /// Number of items waiting on an earlier one.
    #[must_use]
    pub fn held(&self) -> usize {
        self.held.len()
    }
}

/// A finished item: its index, its folded value, and its in-flight slot.
type Finished = (u64, Result<String, HashflowError>, OwnedSemaphorePermit);

/// Runs a fan-out stage to completion.
pub(crate) async fn run_fan_out<F>(
    stage: &F,
    ctx: StageContext,
    mut input: QueueReceiver,
    output: QueueSender,
) -> Result<(), HashflowError>
where
    F: FanOut + ?Sized,
{
    let slots = Arc::new(Semaphore::new(ctx.config().max_items_in_flight.max(1)));
    let (done_tx, done_rx) = mpsc::unbounded_channel::<Finished>();
    let rule = stage.combine_rule();

    let dispatch = async {
        // Moved in so the emit loop sees the channel close once every item is back.
        let done_tx = done_tx;
        let mut next_item: u64 = 0;

        while let Some(value) = next_input(&ctx, &mut input).await? {
            let slot = tokio::select! {
                slot = slots.clone().acquire_owned() => slot
                    .map_err(|_| HashflowError::Internal("item slots closed".to_string()))?,
                () = ctx.cancel_token().cancelled() => return Err(ctx.cancelled_error()),
            };
            let item = next_item;
            next_item += 1;

            match stage.subtasks(value, ctx.gate()) {
                Ok(subtasks) => {
                    let collector = OrderedCollector::new(item, rule.clone())
                        .with_timeout(ctx.config().collect_timeout())
                        .with_cancellation(ctx.cancel_token().clone());
                    let done_tx = done_tx.clone();
                    tokio::spawn(async move {
                        let folded = collector.collect(subtasks).await;
                        // The emit loop only goes away when the stage is failing.
                        let _ = done_tx.send((item, folded, slot));
                    });
                }
                Err(e) => {
                    let _ = done_tx.send((item, Err(e), slot));
                }
            }
        }

        ctx.transition(StageState::Draining);
        debug!(stage = %ctx.stage_name(), items = next_item, "input drained");
        Ok::<(), HashflowError>(())
    };

    let emit = emit_finished(&ctx, done_rx, &output);

    tokio::try_join!(dispatch, emit)?;
    Ok(())
}

async fn emit_finished(
    ctx: &StageContext,
    mut done: mpsc::UnboundedReceiver<Finished>,
    output: &QueueSender,
) -> Result<(), HashflowError> {
    let mut order = Resequencer::new(ctx.config().order);
    let mut emitted: u64 = 0;

    while let Some((item, folded, slot)) = done.recv().await {
        let value = match folded {
            Ok(value) => {
                debug!(stage = %ctx.stage_name(), item, result = %value, "item combined");
                Some(value)
            }
            Err(e) => {
                ctx.handle_item_failure(item, e)?;
                None
            }
        };

        // The slot stays taken until the item leaves the stage.
        for (value, _slot) in order.push(item, (value, slot)) {
            if let Some(value) = value {
                send_output(ctx, output, Value::Text(value)).await?;
                emitted += 1;
            }
        }
    }

    debug!(stage = %ctx.stage_name(), emitted, held = order.held(), "emit loop finished");
    Ok(())
}
