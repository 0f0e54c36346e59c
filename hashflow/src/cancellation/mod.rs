//! Run-scoped cancellation.
//!
//! This module provides:
//! - CancellationToken, shared by every task spawned for one run
//! - StageTaskGroup, the join barrier over a run's stage tasks

mod task_group;
mod token;

pub use task_group::StageTaskGroup;
pub use token::CancellationToken;
