//! Mid-term slot store.
//!
//! Holds summarized topic slots with their embeddings. New summaries either
//! merge into the most similar existing slot or open a new one; capacity is
//! enforced lazily after insertion by dropping the lowest-priority slots.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::embeddings::cosine_similarity;
use super::priority::compute_priority;
use super::{LongTermItem, MidTermSlot, SlotCandidate};
use crate::config::PromotionPolicy;

/// Result of a similarity search over the slots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotMatch {
    /// Position of the slot in store order
    pub index: usize,
    pub similarity: f32,
}

/// What an upsert did
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// Candidate folded into the slot at `index`
    Merged { index: usize },
    /// Candidate became a new slot; `evicted` lowest-priority slots were dropped
    Inserted { evicted: Vec<MidTermSlot> },
}

/// Result of [`MidTermStore::evaluate_for_promotion`]
#[derive(Debug, Clone, Default)]
pub struct PromotionOutcome {
    /// Slots moved out of the store, already converted
    pub promoted: Vec<LongTermItem>,
    /// Slots pruned for low priority
    pub evicted: Vec<MidTermSlot>,
    /// Slots still in the store
    pub retained: usize,
}

/// Bounded collection of summarized slots for one persona
#[derive(Debug, Clone)]
pub struct MidTermStore {
    slots: Vec<MidTermSlot>,
    max_slots: usize,
}

impl MidTermStore {
    pub fn new(max_slots: usize) -> Self {
        Self {
            slots: Vec::new(),
            max_slots,
        }
    }

    /// Rebuild from stored slots; over-capacity stores are pruned by priority
    pub fn from_slots(slots: Vec<MidTermSlot>, max_slots: usize, now: DateTime<Utc>) -> Self {
        let mut store = Self { slots, max_slots };
        store.enforce_capacity(now);
        store
    }

    /// Highest-similarity slot at or above `threshold`; ties go to the earlier slot
    pub fn find_best_match(&self, embedding: &[f32], threshold: f32) -> Option<SlotMatch> {
        let mut best: Option<SlotMatch> = None;

        for (index, slot) in self.slots.iter().enumerate() {
            let similarity = cosine_similarity(embedding, &slot.embedding);
            if best.is_none_or(|b| similarity > b.similarity) {
                best = Some(SlotMatch { index, similarity });
            }
        }

        best.filter(|m| m.similarity >= threshold)
    }

    /// Merge into the slot named by `match_hint`, or insert a new slot
    ///
    /// A hint that does not name an existing slot is treated as no hint.
    pub fn upsert(
        &mut self,
        candidate: SlotCandidate,
        match_hint: Option<usize>,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        if let Some(index) = match_hint.filter(|&index| index < self.slots.len()) {
            let slot = &mut self.slots[index];
            slot.summary = candidate.summary;
            slot.embedding = candidate.embedding;
            slot.access_count = slot.access_count.saturating_add(1);
            slot.last_accessed = now;
            slot.updated_at = now;
            slot.cluster_size = slot.cluster_size.saturating_add(1);
            slot.user_pinned |= candidate.user_pinned;

            tracing::debug!(
                index,
                cluster_size = slot.cluster_size,
                "Merged summary into existing slot"
            );
            return UpsertOutcome::Merged { index };
        }

        let mut slot = MidTermSlot::new(candidate, now);
        slot.priority = compute_priority(&slot, now);
        self.slots.push(slot);

        let evicted = self.enforce_capacity(now);
        if !evicted.is_empty() {
            tracing::debug!(
                evicted = evicted.len(),
                capacity = self.max_slots,
                "Mid-term store over capacity, dropped lowest-priority slots"
            );
        }
        UpsertOutcome::Inserted { evicted }
    }

    /// Look up the most similar slot, then upsert with it as the hint
    pub fn upsert_matching(
        &mut self,
        candidate: SlotCandidate,
        threshold: f32,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        let hint = self
            .find_best_match(&candidate.embedding, threshold)
            .map(|m| m.index);
        self.upsert(candidate, hint, now)
    }

    /// Append slots as they are, then truncate to capacity by priority
    pub(crate) fn absorb(&mut self, slots: Vec<MidTermSlot>, now: DateTime<Utc>) -> Vec<MidTermSlot> {
        self.slots.extend(slots);
        self.enforce_capacity(now)
    }

    /// Recompute and store the priority of every slot
    pub fn recompute_priorities(&mut self, now: DateTime<Utc>) {
        for slot in &mut self.slots {
            slot.priority = compute_priority(slot, now);
        }
    }

    /// Truncate to capacity, keeping the highest-priority slots
    fn enforce_capacity(&mut self, now: DateTime<Utc>) -> Vec<MidTermSlot> {
        if self.slots.len() <= self.max_slots {
            return Vec::new();
        }

        self.recompute_priorities(now);
        // Stable: equal priorities keep store order
        self.slots.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(Ordering::Equal)
        });
        self.slots.split_off(self.max_slots)
    }

    /// Split the store into promoted, pruned and retained slots
    ///
    /// A slot is promoted when it has been accessed or merged often enough,
    /// or is pinned. Of the rest, a slot is kept when pinned, when its
    /// priority reaches the retention floor, or when the store held no more
    /// than `capacity_grace_slots` slots at the start of the evaluation.
    pub fn evaluate_for_promotion(
        &mut self,
        now: DateTime<Utc>,
        policy: &PromotionPolicy,
    ) -> PromotionOutcome {
        let within_grace = self.slots.len() <= policy.capacity_grace_slots;
        let mut outcome = PromotionOutcome::default();
        let mut retained = Vec::with_capacity(self.slots.len());

        for mut slot in self.slots.drain(..) {
            slot.priority = compute_priority(&slot, now);

            let promote = slot.access_count >= policy.min_access_count
                || slot.user_pinned
                || slot.cluster_size >= policy.min_cluster_size;

            if promote {
                outcome.promoted.push(LongTermItem::promote(slot, now));
            } else if slot.user_pinned
                || slot.priority >= policy.retention_priority_floor
                || within_grace
            {
                retained.push(slot);
            } else {
                outcome.evicted.push(slot);
            }
        }

        self.slots = retained;
        outcome.retained = self.slots.len();
        outcome
    }

    /// Set or clear the user pin on a slot; returns false for an unknown index
    pub fn set_pinned(&mut self, index: usize, pinned: bool) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                slot.user_pinned = pinned;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&MidTermSlot> {
        self.slots.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut MidTermSlot> {
        self.slots.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MidTermSlot> {
        self.slots.iter()
    }

    pub fn slots(&self) -> &[MidTermSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }
}
