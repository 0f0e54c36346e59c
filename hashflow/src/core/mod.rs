//! Core domain model types for hashflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Boundary values passed between stages
//! - Stage lifecycle state

mod state;
mod value;

pub use state::{StageState, StageStateCell};
pub use value::{Value, ValueKind};
