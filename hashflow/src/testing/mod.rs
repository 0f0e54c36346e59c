//! Testing utilities for hashflow pipelines.
//!
//! This module provides:
//! - Primitive sets that fail on demand or count concurrent calls
//! - Helper stages for wiring and cancellation tests
//! - Gate fixtures

mod fixtures;
mod mocks;

pub use fixtures::{stub_gate, stub_gate_with, CountingPrimitives, FailingPrimitives};
pub use mocks::{FailingStage, RecordingStage, SlowStage};
