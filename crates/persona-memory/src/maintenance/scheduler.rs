//! MaintenanceScheduler - periodic promotion and pruning
//!
//! Each sweep walks every registered persona in id order:
//! load (strictly) → evaluate_for_promotion → insert_many → persist if any
//! tier changed size. The persona lock is held for the whole pass, so a
//! sweep never interleaves with a turn-driven mutation of the same persona.
//! A failing persona is logged and reported; the sweep moves on.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::stats::{FailureStage, MaintenanceCounters, MaintenanceStats, PersonaFailure, SweepReport};
use crate::config::PromotionPolicy;
use crate::registry::{PersonaHandle, PersonaRegistry};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Periodic maintenance over a persona registry
pub struct MaintenanceScheduler {
    registry: Arc<PersonaRegistry>,
    policy: PromotionPolicy,
    period: Duration,
    stats: MaintenanceStats,
}

impl MaintenanceScheduler {
    /// Create a scheduler using the registry's promotion policy and interval
    pub fn new(registry: Arc<PersonaRegistry>) -> Self {
        let config = registry.config();
        let policy = config.promotion.clone();
        let period = Duration::from_secs(config.maintenance.interval_secs).max(MIN_PERIOD);
        Self {
            registry,
            policy,
            period,
            stats: MaintenanceStats::default(),
        }
    }

    /// Override the sweep interval; periods shorter than 1 ms are raised to 1 ms
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period.max(MIN_PERIOD);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Cumulative counters across all sweeps
    pub fn stats(&self) -> MaintenanceCounters {
        self.stats.counters()
    }

    /// Run one sweep over every registered persona
    pub async fn run_sweep(&self) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        for handle in self.registry.handles().await {
            self.sweep_persona(&handle, &mut report).await;
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        self.stats.record(&report);

        info!(
            personas = report.personas_processed,
            promoted = report.slots_promoted,
            evicted = report.slots_evicted,
            persisted = report.snapshots_persisted,
            skipped = report.writes_skipped,
            failures = report.failures.len(),
            elapsed_ms = report.elapsed_ms,
            "Memory maintenance sweep complete"
        );
        report
    }

    async fn sweep_persona(&self, handle: &PersonaHandle, report: &mut SweepReport) {
        let persona_id = handle.persona_id();
        let mut state = handle.lock().await;

        let memory = match handle.load_strict(&mut state).await {
            Ok(memory) => memory,
            Err(e) => {
                warn!(persona_id, error = %e, "Skipping persona, memory could not be loaded");
                report
                    .failures
                    .push(PersonaFailure::new(persona_id, FailureStage::Load, &e));
                return;
            }
        };

        let outcome = memory.run_maintenance(&self.policy, handle.now());
        report.personas_processed += 1;
        report.slots_promoted += outcome.promoted;
        report.slots_evicted += outcome.evicted;
        report.long_term_dropped += outcome.long_term_dropped;

        if !outcome.changed {
            debug!(persona_id, "Tier sizes unchanged, skipping write");
            report.writes_skipped += 1;
            return;
        }

        match handle.persist(memory).await {
            Ok(()) => {
                debug!(
                    persona_id,
                    promoted = outcome.promoted,
                    evicted = outcome.evicted,
                    "Persisted maintained memory"
                );
                report.snapshots_persisted += 1;
            }
            Err(e) => {
                warn!(persona_id, error = %e, "Failed to persist maintained memory");
                report
                    .failures
                    .push(PersonaFailure::new(persona_id, FailureStage::Persist, &e));
            }
        }
    }

    /// Spawn the periodic sweep loop
    ///
    /// The first sweep runs one full period after start. Dropping the
    /// returned handle stops the loop as well.
    pub fn start(self: Arc<Self>) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let period = self.period;

        info!(interval_secs = period.as_secs(), "Starting memory maintenance");

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_sweep().await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Stopping memory maintenance");
                        break;
                    }
                }
            }
        });

        MaintenanceHandle { shutdown_tx, task }
    }
}

/// Handle to a running maintenance loop
pub struct MaintenanceHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stop the loop and wait for an in-progress sweep to finish
    pub async fn shutdown(self) {
        // The loop may already have exited
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Maintenance task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
