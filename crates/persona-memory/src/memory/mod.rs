//! Tiered Conversational Memory
//!
//! Implements a three-tier memory per persona:
//! - Short-term: the last few raw dialogue turns (FIFO)
//! - Mid-term: summarized topics with embeddings (priority-based)
//! - Long-term: promoted summaries kept for the life of the persona (recency-based)
//!
//! # Architecture
//!
//! ```text
//!   turn ──► ShortTermQueue
//!                 │ (caller summarizes + embeds)
//!                 ▼
//!   summary ──► MidTermStore ──evaluate_for_promotion──► LongTermArchive
//!                 ▲    │                                     │
//!                 │    └──────────── RetrievalEngine ◄───────┘
//!              feedback                  ▲
//!                                   query embedding
//! ```
//!
//! Similar summaries merge into an existing slot instead of opening a new
//! one. Slots that are accessed often, pinned by the user, or that absorbed
//! several merges are promoted during maintenance. Retrieval searches the
//! two summarized tiers and feeds access counts back into them.

mod types;
mod short_term;
mod priority;
mod mid_term;
mod long_term;
mod retrieval;
mod snapshot;
mod persona;
pub mod embeddings;

// Re-export public types
pub use types::{
    Role, Turn, TurnInput, Category, SlotCandidate,
    MidTermSlot, LongTermItem, LongTermMeta,
};

pub use short_term::ShortTermQueue;
pub use priority::{compute_priority, MAX_PRIORITY};
pub use mid_term::{MidTermStore, SlotMatch, UpsertOutcome, PromotionOutcome};
pub use long_term::LongTermArchive;
pub use retrieval::{
    RetrievalEngine, RetrievalResult, RetrievedItem, RetrievedSlot, MAX_BASE_RELEVANCE,
};
pub use snapshot::{MemorySnapshot, LongTermStore};
pub use persona::{PersonaMemory, TierStats, MaintenanceOutcome};
pub use embeddings::{cosine_similarity, embed_or_fallback, fallback_embedding, Embedder};
