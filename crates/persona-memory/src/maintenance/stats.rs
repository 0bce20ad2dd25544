//! Sweep reports and cumulative maintenance counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::MemoryError;

/// Where a persona's maintenance failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Load,
    Persist,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Persist => write!(f, "persist"),
        }
    }
}

/// A persona the sweep could not finish
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaFailure {
    pub persona_id: String,
    pub stage: FailureStage,
    pub message: String,
}

impl PersonaFailure {
    pub fn new(persona_id: impl Into<String>, stage: FailureStage, error: &MemoryError) -> Self {
        Self {
            persona_id: persona_id.into(),
            stage,
            message: error.to_string(),
        }
    }
}

/// Result of one sweep over all registered personas
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Personas whose maintenance ran (including those whose write then failed)
    pub personas_processed: usize,
    pub slots_promoted: usize,
    pub slots_evicted: usize,
    /// Archive items dropped to stay within capacity
    pub long_term_dropped: usize,
    pub snapshots_persisted: usize,
    /// Personas whose tier sizes did not change
    pub writes_skipped: usize,
    pub failures: Vec<PersonaFailure>,
    pub elapsed_ms: u64,
}

impl SweepReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Cumulative counters, updated after every sweep
#[derive(Debug, Default)]
pub struct MaintenanceStats {
    sweeps: AtomicU64,
    personas_processed: AtomicU64,
    slots_promoted: AtomicU64,
    slots_evicted: AtomicU64,
    load_failures: AtomicU64,
    persist_failures: AtomicU64,
    last_sweep_ms: AtomicU64,
}

/// Point-in-time copy of [`MaintenanceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceCounters {
    pub sweeps: u64,
    pub personas_processed: u64,
    pub slots_promoted: u64,
    pub slots_evicted: u64,
    pub load_failures: u64,
    pub persist_failures: u64,
    pub last_sweep_ms: u64,
}

impl MaintenanceStats {
    pub fn record(&self, report: &SweepReport) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.personas_processed
            .fetch_add(report.personas_processed as u64, Ordering::Relaxed);
        self.slots_promoted
            .fetch_add(report.slots_promoted as u64, Ordering::Relaxed);
        self.slots_evicted
            .fetch_add(report.slots_evicted as u64, Ordering::Relaxed);
        for failure in &report.failures {
            let counter = match failure.stage {
                FailureStage::Load => &self.load_failures,
                FailureStage::Persist => &self.persist_failures,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        self.last_sweep_ms.store(report.elapsed_ms, Ordering::Relaxed);
    }

    pub fn counters(&self) -> MaintenanceCounters {
        MaintenanceCounters {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            personas_processed: self.personas_processed.load(Ordering::Relaxed),
            slots_promoted: self.slots_promoted.load(Ordering::Relaxed),
            slots_evicted: self.slots_evicted.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            last_sweep_ms: self.last_sweep_ms.load(Ordering::Relaxed),
        }
    }
}
