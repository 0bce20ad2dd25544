//! Background maintenance of persona memories.
//!
//! The scheduler runs independently of any chat turn: on a fixed interval it
//! promotes qualifying mid-term slots into the long-term archive, prunes the
//! rest, and hands changed snapshots to the store.

mod scheduler;
mod stats;

pub use scheduler::{MaintenanceHandle, MaintenanceScheduler};
pub use stats::{FailureStage, MaintenanceCounters, MaintenanceStats, PersonaFailure, SweepReport};
