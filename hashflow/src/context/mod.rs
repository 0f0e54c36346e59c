//! Run-scoped state handed to every stage.
//!
//! This module provides:
//! - StageContext, one per stage per run
//! - FailureLog, the record of items skipped during a run

mod failures;
mod stage;

pub use failures::{FailureLog, FailureRecord};
pub use stage::StageContext;
