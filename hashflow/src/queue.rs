//! Queues between adjacent stages.
//!
//! Each queue has exactly one writer and one reader. Dropping the
//! [`QueueSender`] closes the queue; the reader sees `None` once everything
//! sent before the close has been drained.

use crate::config::QueueCapacity;
use crate::core::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// The value could not be delivered because the reader is gone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("queue closed: reader dropped")]
pub struct QueueClosed(pub Value);

/// Writing half of a stage queue.
#[derive(Debug)]
pub enum QueueSender {
    /// Backed by a bounded channel; `send` suspends when full.
    Bounded(mpsc::Sender<Value>),
    /// Backed by an unbounded channel.
    Unbounded(mpsc::UnboundedSender<Value>),
}

impl QueueSender {
    /// Sends a value, waiting for room if the queue is bounded and full.
    pub async fn send(&self, value: Value) -> Result<(), QueueClosed> {
        match self {
            Self::Bounded(tx) => tx.send(value).await.map_err(|e| QueueClosed(e.0)),
            Self::Unbounded(tx) => tx.send(value).map_err(|e| QueueClosed(e.0)),
        }
    }

    /// Returns true if the reader has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Bounded(tx) => tx.is_closed(),
            Self::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// Reading half of a stage queue.
#[derive(Debug)]
pub enum QueueReceiver {
    /// Backed by a bounded channel.
    Bounded(mpsc::Receiver<Value>),
    /// Backed by an unbounded channel.
    Unbounded(mpsc::UnboundedReceiver<Value>),
}

impl QueueReceiver {
    /// Receives the next value, or `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<Value> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Creates a queue with the given capacity.
///
/// A bounded capacity of zero is treated as one.
#[must_use]
pub fn queue(capacity: QueueCapacity) -> (QueueSender, QueueReceiver) {
    match capacity {
        QueueCapacity::Bounded(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
        QueueCapacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
    }
}
