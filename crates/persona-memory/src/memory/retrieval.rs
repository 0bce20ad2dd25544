//! Top-K retrieval across the mid-term and long-term tiers.
//!
//! Each tier is ranked independently by cosine similarity to the query.
//! With feedback enabled, every returned memory records the access, so
//! memories that keep being retrieved drift toward promotion and retention.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::embeddings::cosine_similarity;
use super::{LongTermArchive, LongTermItem, MidTermSlot, MidTermStore};
use crate::config::RetrievalConfig;

/// Ceiling for the base relevance a slot can accumulate through feedback
pub const MAX_BASE_RELEVANCE: f64 = 2.0;

/// Multiplier applied to base relevance on each retrieval hit
const RELEVANCE_REINFORCEMENT: f64 = 1.05;

/// A mid-term slot returned by retrieval (state after feedback)
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedSlot {
    /// Position in the mid-term store at retrieval time
    pub index: usize,
    pub similarity: f32,
    pub slot: MidTermSlot,
}

/// A long-term item returned by retrieval (state after feedback)
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedItem {
    pub similarity: f32,
    pub item: LongTermItem,
}

/// Retrieval results, each list sorted by descending similarity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub mid_term: Vec<RetrievedSlot>,
    pub long_term: Vec<RetrievedItem>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.mid_term.is_empty() && self.long_term.is_empty()
    }

    /// Format the retrieved summaries as a prompt augmentation block
    ///
    /// Returns an empty string when nothing was retrieved.
    pub fn render_context(&self) -> String {
        let mut out = String::new();

        if !self.mid_term.is_empty() {
            out.push_str("Recent topics:\n");
            for hit in &self.mid_term {
                out.push_str(&format!("- [{}] {}\n", hit.slot.category, hit.slot.summary));
            }
        }

        if !self.long_term.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Long-term memories:\n");
            for hit in &self.long_term {
                out.push_str(&format!("- ({}) {}\n", hit.item.meta.date, hit.item.summary));
            }
        }

        out
    }
}

/// Similarity search over both summarized tiers
#[derive(Debug, Clone, Default)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Return the `top_k` most similar memories of each tier above the floor
    ///
    /// Ties keep tier order. Empty results are not an error.
    pub fn retrieve(
        &self,
        query: &[f32],
        mid_term: &mut MidTermStore,
        long_term: &mut LongTermArchive,
        now: DateTime<Utc>,
    ) -> RetrievalResult {
        let slot_hits = self.rank(mid_term.iter().map(|slot| slot.embedding.as_slice()), query);
        let item_hits = self.rank(long_term.items().iter().map(|item| item.embedding.as_slice()), query);

        let mut result = RetrievalResult::default();

        for (index, similarity) in slot_hits {
            let Some(slot) = mid_term.get_mut(index) else {
                continue;
            };
            if self.config.feedback {
                slot.access_count = slot.access_count.saturating_add(1);
                slot.last_accessed = now;
                slot.base_relevance = (slot.base_relevance * RELEVANCE_REINFORCEMENT).min(MAX_BASE_RELEVANCE);
            }
            result.mid_term.push(RetrievedSlot {
                index,
                similarity,
                slot: slot.clone(),
            });
        }

        for (index, similarity) in item_hits {
            let Some(item) = long_term.get_mut_at(index) else {
                continue;
            };
            if self.config.feedback {
                item.access_count = item.access_count.saturating_add(1);
                item.last_accessed = Some(now);
            }
            result.long_term.push(RetrievedItem {
                similarity,
                item: item.clone(),
            });
        }

        tracing::debug!(
            mid_term = result.mid_term.len(),
            long_term = result.long_term.len(),
            feedback = self.config.feedback,
            "Retrieved memories"
        );
        result
    }

    /// Indices and similarities of the top-K embeddings at or above the floor
    fn rank<'a>(
        &self,
        embeddings: impl Iterator<Item = &'a [f32]>,
        query: &[f32],
    ) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = embeddings
            .map(|embedding| cosine_similarity(query, embedding))
            .enumerate()
            .filter(|(_, similarity)| *similarity >= self.config.relevance_floor)
            .collect();

        // Stable: equal similarities keep tier order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.config.top_k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Category, SlotCandidate};
    use chrono::Duration;

    fn stores(now: DateTime<Utc>) -> (MidTermStore, LongTermArchive) {
        let mut mid = MidTermStore::new(20);
        mid.upsert(SlotCandidate::new("cooking pasta", vec![1.0, 0.1, 0.0, 0.0]), None, now);
        mid.upsert(
            SlotCandidate::new("rust borrow checker", vec![0.0, 1.0, 0.1, 0.0]).with_category(Category::Technical),
            None,
            now,
        );
        mid.upsert(SlotCandidate::new("marathon training", vec![0.0, 0.0, 0.1, 1.0]), None, now);

        let archive = LongTermArchive::from_items(
            vec![
                LongTermItem::new("learned lifetimes", vec![0.1, 0.9, 0.0, 0.0], Category::Technical, now),
                LongTermItem::new("favourite recipe", vec![0.9, 0.0, 0.0, 0.1], Category::Personal, now),
            ],
            100,
        );
        (mid, archive)
    }

    #[test]
    fn test_query_matches_second_slot() {
        let now = Utc::now();
        let (mut mid, mut long) = stores(now);
        let query = mid.get(1).unwrap().embedding.clone();

        let result = RetrievalEngine::default().retrieve(&query, &mut mid, &mut long, now);

        assert_eq!(result.mid_term[0].index, 1);
        assert_eq!(result.mid_term[0].slot.summary, "rust borrow checker");
        assert!(result.mid_term[0].similarity > 0.95);
        assert_eq!(result.long_term[0].item.summary, "learned lifetimes");
    }

    #[test]
    fn test_results_respect_floor_and_order() {
        let now = Utc::now();
        let (mut mid, mut long) = stores(now);
        let engine = RetrievalEngine::new(RetrievalConfig {
            top_k: 10,
            relevance_floor: 0.05,
            feedback: false,
        });

        let result = engine.retrieve(&[0.5, 0.5, 0.0, 0.0], &mut mid, &mut long, now);

        for hits in [
            result.mid_term.iter().map(|h| h.similarity).collect::<Vec<_>>(),
            result.long_term.iter().map(|h| h.similarity).collect::<Vec<_>>(),
        ] {
            assert!(hits.iter().all(|s| *s >= 0.05));
            assert!(hits.windows(2).all(|w| w[0] >= w[1]));
        }
        // marathon slot is orthogonal to the query
        assert_eq!(result.mid_term.len(), 2);
    }

    #[test]
    fn test_feedback_updates_returned_memories_only() {
        let created = Utc::now() - Duration::hours(6);
        let now = Utc::now();
        let (mut mid, mut long) = stores(created);
        let engine = RetrievalEngine::new(RetrievalConfig {
            top_k: 1,
            ..Default::default()
        });

        let result = engine.retrieve(&[1.0, 0.0, 0.0, 0.0], &mut mid, &mut long, now);
        assert_eq!(result.mid_term.len(), 1);

        let hit = mid.get(0).unwrap();
        assert_eq!(hit.access_count, 1);
        assert_eq!(hit.last_accessed, now);
        assert!((hit.base_relevance - 1.05).abs() < 1e-9);
        assert_eq!(result.mid_term[0].slot, *hit);

        let untouched = mid.get(1).unwrap();
        assert_eq!(untouched.access_count, 0);
        assert_eq!(untouched.last_accessed, created);

        let item = long.items().iter().find(|i| i.summary == "favourite recipe").unwrap();
        assert_eq!(item.access_count, 1);
        assert_eq!(item.last_accessed, Some(now));
    }

    #[test]
    fn test_base_relevance_capped() {
        let now = Utc::now();
        let (mut mid, mut long) = stores(now);
        let engine = RetrievalEngine::default();

        for _ in 0..40 {
            engine.retrieve(&[1.0, 0.1, 0.0, 0.0], &mut mid, &mut long, now);
        }
        assert_eq!(mid.get(0).unwrap().base_relevance, MAX_BASE_RELEVANCE);
    }

    #[test]
    fn test_no_matches_and_mismatched_dimensions() {
        let now = Utc::now();
        let (mut mid, mut long) = stores(now);
        let engine = RetrievalEngine::default();

        let result = engine.retrieve(&[1.0, 0.0], &mut mid, &mut long, now);
        assert!(result.is_empty());
        assert_eq!(result.render_context(), "");
        assert_eq!(mid.get(0).unwrap().access_count, 0);
    }

    #[test]
    fn test_ties_keep_tier_order() {
        let now = Utc::now();
        let earlier = now - Duration::hours(1);
        let mut mid = MidTermStore::from_slots(
            vec![
                MidTermSlot::new(SlotCandidate::new("older slot", vec![0.0, 1.0]), earlier),
                MidTermSlot::new(SlotCandidate::new("newer slot", vec![0.0, 1.0]), now),
            ],
            20,
            now,
        );
        let mut long = LongTermArchive::from_items(
            vec![
                LongTermItem::new("older item", vec![1.0, 0.0], Category::General, earlier),
                LongTermItem::new("newer item", vec![1.0, 0.0], Category::General, now),
            ],
            100,
        );
        let query = [1.0, 1.0];

        let engine = RetrievalEngine::new(RetrievalConfig {
            top_k: 10,
            relevance_floor: 0.0,
            feedback: false,
        });
        let result = engine.retrieve(&query, &mut mid, &mut long, now);
        assert_eq!(result.mid_term[0].similarity, result.mid_term[1].similarity);
        let indices: Vec<usize> = result.mid_term.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![0, 1]);
        let summaries: Vec<&str> = result.long_term.iter().map(|h| h.item.summary.as_str()).collect();
        assert_eq!(summaries, vec!["older item", "newer item"]);

        let engine = RetrievalEngine::new(RetrievalConfig {
            top_k: 1,
            relevance_floor: 0.0,
            feedback: false,
        });
        let result = engine.retrieve(&query, &mut mid, &mut long, now);
        assert_eq!(result.mid_term.len(), 1);
        assert_eq!(result.mid_term[0].slot.summary, "older slot");
        assert_eq!(result.long_term.len(), 1);
        assert_eq!(result.long_term[0].item.summary, "older item");
    }

    #[test]
    fn test_render_context() {
        let now = Utc::now();
        let (mut mid, mut long) = stores(now);
        let result = RetrievalEngine::default().retrieve(&[0.0, 1.0, 0.1, 0.0], &mut mid, &mut long, now);

        let context = result.render_context();
        assert!(context.starts_with("Recent topics:\n- [technical] rust borrow checker"));
        assert!(context.contains("Long-term memories:\n"));
        assert!(context.contains("learned lifetimes"));
    }
}
