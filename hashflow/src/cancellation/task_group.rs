//! Join barrier over the stage tasks of one run.

use super::CancellationToken;
use crate::errors::HashflowError;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type StageHandle = JoinHandle<Result<(), HashflowError>>;

/// A group of stage tasks with structured cancellation.
///
/// The first task to fail cancels the group's token; `wait` joins every
/// task and reports that first failure.
#[derive(Debug)]
pub struct StageTaskGroup {
    cancel_token: CancellationToken,
    handles: Mutex<Vec<(String, StageHandle)>>,
}

impl StageTaskGroup {
    /// Creates a group driven by `cancel_token`.
    #[must_use]
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Returns the group's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Spawns a named task in the group.
    pub fn spawn<Fut>(&self, name: impl Into<String>, task: Fut)
    where
        Fut: Future<Output = Result<(), HashflowError>> + Send + 'static,
    {
        self.handles.lock().push((name.into(), tokio::spawn(task)));
    }

    /// Returns the number of tasks not yet joined.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Waits for every task to finish.
    ///
    /// Tasks are joined in completion order so that a failure cancels the
    /// rest without waiting on earlier-spawned tasks. A real failure is
    /// preferred over a cancellation it caused.
    pub async fn wait(&self) -> Result<(), HashflowError> {
        let handles = std::mem::take(&mut *self.handles.lock());
        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .map(|(name, handle)| async move { (name, handle.await) })
            .collect();

        let mut first_error: Option<HashflowError> = None;
        while let Some((name, joined)) = pending.next().await {
            let error = match joined {
                Ok(Ok(())) => {
                    debug!(task = %name, "task finished");
                    continue;
                }
                Ok(Err(e)) => e,
                Err(join_error) => {
                    HashflowError::stage_failed(&name, format!("task join error: {join_error}"))
                }
            };

            match first_error {
                None => {
                    warn!(task = %name, error = %error, "task failed; cancelling group");
                    self.cancel_token.cancel(error.to_string());
                    first_error = Some(error);
                }
                // A task that only saw the cancellation finished first; keep the cause.
                Some(HashflowError::Cancelled(_))
                    if !matches!(error, HashflowError::Cancelled(_)) =>
                {
                    warn!(task = %name, error = %error, "task failed");
                    first_error = Some(error);
                }
                Some(_) => {
                    debug!(task = %name, error = %error, "secondary failure after cancellation");
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
