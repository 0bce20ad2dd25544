//! Persona Memory - Tiered Conversational Memory for Chat Personas
//!
//! This crate keeps a bounded, three-tier memory for every persona a chat
//! application hosts:
//!
//! - **short-term** - the last few raw dialogue turns (FIFO)
//! - **mid-term** - summarized topics with embeddings, merged by similarity
//!   and ranked by a priority score
//! - **long-term** - summaries promoted out of mid-term, kept newest-first
//!
//! Retrieval returns the most similar memories of each summarized tier and
//! feeds access counts back into them. A background maintenance sweep
//! promotes, prunes and persists every persona on a fixed interval.
//!
//! The crate performs no I/O of its own. Embedding and storage are external
//! collaborators behind the [`Embedder`] and [`SnapshotStore`] traits.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use persona_memory::{
//!     Category, InMemorySnapshotStore, MaintenanceScheduler, MemoryConfig,
//!     PersonaRegistry, TurnInput,
//! };
//!
//! async fn example() -> persona_memory::MemoryResult<()> {
//!     let store = Arc::new(InMemorySnapshotStore::new());
//!     let registry = Arc::new(PersonaRegistry::new(MemoryConfig::default(), store)?);
//!
//!     let persona = registry.open("ada").await;
//!     persona.record_turn(TurnInput::user("I just moved to Lisbon")).await?;
//!     persona
//!         .remember_text("User moved to Lisbon", Category::Personal, false)
//!         .await;
//!
//!     // Augment the next prompt
//!     let context = persona.recall_text("where does the user live?").await;
//!     println!("{}", context.render_context());
//!
//!     // Promote and persist every ten minutes
//!     let maintenance = Arc::new(MaintenanceScheduler::new(registry)).start();
//!     maintenance.shutdown().await;
//!     Ok(())
//! }
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// Memory tiers
// ─────────────────────────────────────────────────────────────────────────────

pub mod memory;

pub use memory::{
    Role, Turn, TurnInput, Category, SlotCandidate, MidTermSlot, LongTermItem, LongTermMeta,
    ShortTermQueue, MidTermStore, LongTermArchive, RetrievalEngine, RetrievalResult,
    UpsertOutcome, PromotionOutcome, MemorySnapshot, PersonaMemory, TierStats,
    Embedder, cosine_similarity, compute_priority,
};

// ─────────────────────────────────────────────────────────────────────────────
// Registry, persistence and maintenance
// ─────────────────────────────────────────────────────────────────────────────

pub mod clock;
pub mod persistence;
pub mod registry;
pub mod maintenance;

mod error;
mod config;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ConfigValidationError, MaintenanceConfig, MemoryConfig, PromotionPolicy, RetrievalConfig,
};
pub use error::{MemoryError, MemoryResult};
pub use persistence::{InMemorySnapshotStore, SnapshotStore};
pub use registry::{PersonaHandle, PersonaRegistry};
pub use maintenance::{MaintenanceCounters, MaintenanceHandle, MaintenanceScheduler, SweepReport};
