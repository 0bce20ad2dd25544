//! One persona's memory: the three tiers plus the operations that span them.
//!
//! `PersonaMemory` is plain synchronous state. Concurrency control lives in
//! the registry, which hands out exclusive access one caller at a time.

use chrono::{DateTime, Utc};

use super::{
    LongTermArchive, LongTermItem, LongTermStore, MemorySnapshot, MidTermSlot, MidTermStore,
    RetrievalEngine, RetrievalResult, ShortTermQueue, SlotCandidate, TurnInput, UpsertOutcome,
};
use crate::MemoryResult;
use crate::config::{MemoryConfig, PromotionPolicy};

/// Per-tier counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    pub short_term: usize,
    pub mid_term: usize,
    pub long_term: usize,
    /// Pinned mid-term slots
    pub pinned: usize,
}

/// Result of one maintenance pass over a persona
#[derive(Debug, Clone, Default)]
pub struct MaintenanceOutcome {
    pub promoted: usize,
    pub evicted: usize,
    pub long_term_dropped: usize,
    /// Whether any tier changed size
    pub changed: bool,
}

/// The three memory tiers of a single persona
#[derive(Debug, Clone)]
pub struct PersonaMemory {
    short_term: ShortTermQueue,
    mid_term: MidTermStore,
    long_term: LongTermArchive,
    retrieval: RetrievalEngine,
    merge_threshold: f32,
}

impl PersonaMemory {
    /// Create an empty memory sized by `config`
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            short_term: ShortTermQueue::new(config.short_term_capacity),
            mid_term: MidTermStore::new(config.mid_term_capacity),
            long_term: LongTermArchive::new(config.long_term_capacity),
            retrieval: RetrievalEngine::new(config.retrieval.clone()),
            merge_threshold: config.merge_threshold,
        }
    }

    /// Rebuild from a persisted document, repairing and re-bounding each tier
    pub fn from_snapshot(snapshot: MemorySnapshot, config: &MemoryConfig, now: DateTime<Utc>) -> Self {
        let slots: Vec<MidTermSlot> = snapshot
            .mid_term_slots
            .into_iter()
            .map(|mut slot| {
                slot.normalize();
                slot
            })
            .collect();
        let items: Vec<LongTermItem> = snapshot
            .long_term_store
            .items
            .into_iter()
            .map(|mut item| {
                item.normalize();
                item
            })
            .collect();

        Self {
            short_term: ShortTermQueue::from_turns(snapshot.short_term_history, config.short_term_capacity),
            mid_term: MidTermStore::from_slots(slots, config.mid_term_capacity, now),
            long_term: LongTermArchive::from_items(items, config.long_term_capacity),
            retrieval: RetrievalEngine::new(config.retrieval.clone()),
            merge_threshold: config.merge_threshold,
        }
    }

    /// Encode the current state as a persisted document
    pub fn to_snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            short_term_history: self.short_term.to_vec(),
            mid_term_slots: self.mid_term.slots().to_vec(),
            long_term_store: LongTermStore {
                items: self.long_term.items().to_vec(),
            },
        }
    }

    /// Append a dialogue turn to the short-term queue
    pub fn record_turn(&mut self, input: TurnInput, now: DateTime<Utc>) -> MemoryResult<()> {
        self.short_term.push(input, now)
    }

    /// Merge a summary into the most similar slot, or open a new one
    pub fn remember(&mut self, candidate: SlotCandidate, now: DateTime<Utc>) -> UpsertOutcome {
        self.mid_term.upsert_matching(candidate, self.merge_threshold, now)
    }

    /// Retrieve memories similar to `query`, recording access feedback
    pub fn recall(&mut self, query: &[f32], now: DateTime<Utc>) -> RetrievalResult {
        self.retrieval
            .retrieve(query, &mut self.mid_term, &mut self.long_term, now)
    }

    /// Promote qualifying slots into the archive and prune the rest
    pub fn run_maintenance(&mut self, policy: &PromotionPolicy, now: DateTime<Utc>) -> MaintenanceOutcome {
        let before = (self.mid_term.len(), self.long_term.size());

        let evaluation = self.mid_term.evaluate_for_promotion(now, policy);
        let promoted = evaluation.promoted.len();
        let long_term_dropped = self.long_term.insert_many(evaluation.promoted);

        let after = (self.mid_term.len(), self.long_term.size());
        MaintenanceOutcome {
            promoted,
            evicted: evaluation.evicted.len(),
            long_term_dropped,
            changed: before != after,
        }
    }

    /// Fold in changes made while the stored memory was unavailable
    ///
    /// `pending` is treated as newer: its turns go after ours, its slots and
    /// items join the tiers under the usual capacity rules.
    pub(crate) fn absorb(&mut self, pending: PersonaMemory, now: DateTime<Utc>) {
        self.short_term.extend(pending.short_term.to_vec());
        self.mid_term.absorb(pending.mid_term.slots().to_vec(), now);
        self.long_term.insert_many(pending.long_term.items().to_vec());
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            short_term: self.short_term.size(),
            mid_term: self.mid_term.len(),
            long_term: self.long_term.size(),
            pinned: self.mid_term.iter().filter(|slot| slot.user_pinned).count(),
        }
    }

    pub fn short_term(&self) -> &ShortTermQueue {
        &self.short_term
    }

    pub fn short_term_mut(&mut self) -> &mut ShortTermQueue {
        &mut self.short_term
    }

    pub fn mid_term(&self) -> &MidTermStore {
        &self.mid_term
    }

    pub fn mid_term_mut(&mut self) -> &mut MidTermStore {
        &mut self.mid_term
    }

    pub fn long_term(&self) -> &LongTermArchive {
        &self.long_term
    }

    pub fn long_term_mut(&mut self) -> &mut LongTermArchive {
        &mut self.long_term
    }
}
