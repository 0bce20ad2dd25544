//! Persona Registry
//!
//! Maps persona ids to independently owned memories. Each persona sits
//! behind its own [`PersonaHandle`], a FIFO-fair async mutex, so at most one
//! mutation is in flight per persona while different personas proceed in
//! parallel. Retrieval records feedback and therefore takes the same lock.
//!
//! State is loaded from the [`SnapshotStore`] on first use. When the load
//! fails, turn-driven calls keep working on an empty memory marked degraded.
//! A degraded persona retries the load on each call and on every sweep; once
//! it succeeds, the unsaved changes are folded into the loaded memory. Until
//! then nothing is written, so a transient store error never overwrites a
//! stored document.
//!
//! Turn-driven mutations stay in memory until [`PersonaHandle::flush`] or the
//! next maintenance sweep that changes tier sizes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::MemoryConfig;
use crate::memory::{
    Category, Embedder, PersonaMemory, RetrievalResult, SlotCandidate, TierStats, Turn,
    TurnInput, UpsertOutcome, embed_or_fallback, fallback_embedding,
};
use crate::persistence::SnapshotStore;
use crate::{MemoryError, MemoryResult};

/// Collaborators shared by every persona of a registry
struct RegistryContext {
    config: MemoryConfig,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    embedder: Option<Arc<dyn Embedder>>,
}

/// Registry of persona memories
pub struct PersonaRegistry {
    context: Arc<RegistryContext>,
    personas: RwLock<HashMap<String, Arc<PersonaHandle>>>,
}

impl PersonaRegistry {
    /// Create a registry using the system clock and no embedder
    pub fn new(config: MemoryConfig, store: Arc<dyn SnapshotStore>) -> MemoryResult<Self> {
        Self::with_collaborators(config, store, Arc::new(SystemClock), None)
    }

    /// Create a registry with an explicit clock and optional embedder
    ///
    /// Without an embedder, text operations use the deterministic fallback
    /// embedding.
    pub fn with_collaborators(
        config: MemoryConfig,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self {
            context: Arc::new(RegistryContext {
                config,
                store,
                clock,
                embedder,
            }),
            personas: RwLock::new(HashMap::new()),
        })
    }

    /// Get the handle for a persona, registering it if needed
    ///
    /// Registration does not load anything; the snapshot is read on first use.
    pub async fn open(&self, persona_id: &str) -> Arc<PersonaHandle> {
        if let Some(handle) = self.personas.read().await.get(persona_id) {
            return Arc::clone(handle);
        }

        let mut personas = self.personas.write().await;
        let handle = personas.entry(persona_id.to_string()).or_insert_with(|| {
            debug!(persona_id, "Registered persona");
            Arc::new(PersonaHandle {
                persona_id: persona_id.to_string(),
                context: Arc::clone(&self.context),
                state: Mutex::new(PersonaState::default()),
            })
        });
        Arc::clone(handle)
    }

    /// Existing handle for a persona, without registering
    pub async fn get(&self, persona_id: &str) -> Option<Arc<PersonaHandle>> {
        self.personas.read().await.get(persona_id).cloned()
    }

    /// Registered persona ids, sorted
    pub async fn persona_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.personas.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Handles of all registered personas, sorted by id
    pub async fn handles(&self) -> Vec<Arc<PersonaHandle>> {
        let personas = self.personas.read().await;
        let mut handles: Vec<Arc<PersonaHandle>> = personas.values().cloned().collect();
        handles.sort_by(|a, b| a.persona_id.cmp(&b.persona_id));
        handles
    }

    /// Unregister a persona; outstanding handles keep working
    pub async fn remove(&self, persona_id: &str) -> Option<Arc<PersonaHandle>> {
        self.personas.write().await.remove(persona_id)
    }

    pub async fn len(&self) -> usize {
        self.personas.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.personas.read().await.is_empty()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.context.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.context.clock)
    }
}

/// Lock-protected state of one persona
#[derive(Default)]
pub(crate) struct PersonaState {
    memory: Option<PersonaMemory>,
    /// The stored document could not be read; `memory` holds only later changes
    degraded: bool,
}

impl PersonaState {
    fn needs_load(&self) -> bool {
        self.memory.is_none() || self.degraded
    }

    /// Install a freshly loaded memory, folding in any changes made while degraded
    fn adopt(&mut self, mut loaded: PersonaMemory, now: DateTime<Utc>) {
        if let Some(pending) = self.memory.take() {
            loaded.absorb(pending, now);
        }
        self.memory = Some(loaded);
        self.degraded = false;
    }
}

/// Serialization point for one persona's memory
pub struct PersonaHandle {
    persona_id: String,
    context: Arc<RegistryContext>,
    state: Mutex<PersonaState>,
}

impl PersonaHandle {
    pub fn persona_id(&self) -> &str {
        &self.persona_id
    }

    /// Append a dialogue turn; a turn without role or content is rejected
    pub async fn record_turn(&self, input: TurnInput) -> MemoryResult<()> {
        let mut state = self.lock().await;
        let now = self.now();
        self.load_lenient(&mut state).await.record_turn(input, now)
    }

    /// Short-term turns, oldest first
    pub async fn recent_turns(&self) -> Vec<Turn> {
        let mut state = self.lock().await;
        self.load_lenient(&mut state).await.short_term().to_vec()
    }

    pub async fn clear_turns(&self) {
        let mut state = self.lock().await;
        self.load_lenient(&mut state).await.short_term_mut().clear();
    }

    /// Merge a summary into the most similar slot or open a new one
    pub async fn remember(&self, candidate: SlotCandidate) -> UpsertOutcome {
        let mut state = self.lock().await;
        let now = self.now();
        self.load_lenient(&mut state).await.remember(candidate, now)
    }

    /// Embed a summary, then [`remember`](Self::remember) it
    ///
    /// Embedding happens before the persona lock is taken.
    pub async fn remember_text(
        &self,
        summary: impl Into<String>,
        category: Category,
        pinned: bool,
    ) -> UpsertOutcome {
        let summary = summary.into();
        let embedding = self.embed(&summary).await;

        let mut candidate = SlotCandidate::new(summary, embedding).with_category(category);
        candidate.user_pinned = pinned;
        self.remember(candidate).await
    }

    /// Retrieve memories similar to `query`, recording access feedback
    pub async fn recall(&self, query: &[f32]) -> RetrievalResult {
        let mut state = self.lock().await;
        let now = self.now();
        self.load_lenient(&mut state).await.recall(query, now)
    }

    /// Embed `text`, then [`recall`](Self::recall)
    pub async fn recall_text(&self, text: &str) -> RetrievalResult {
        let query = self.embed(text).await;
        self.recall(&query).await
    }

    /// Pin a mid-term slot so it is promoted on the next sweep
    pub async fn pin(&self, index: usize) -> bool {
        self.set_pinned(index, true).await
    }

    /// Set the pin flag of a mid-term slot; false if the index is out of range
    pub async fn set_pinned(&self, index: usize, pinned: bool) -> bool {
        let mut state = self.lock().await;
        self.load_lenient(&mut state).await.mid_term_mut().set_pinned(index, pinned)
    }

    pub async fn stats(&self) -> TierStats {
        let mut state = self.lock().await;
        self.load_lenient(&mut state).await.stats()
    }

    /// Copy of the current memory
    pub async fn snapshot(&self) -> PersonaMemory {
        let mut state = self.lock().await;
        self.load_lenient(&mut state).await.clone()
    }

    /// Persist the current memory
    ///
    /// A persona that was never touched has nothing new to write. A persona
    /// whose stored document could not be read is loaded first; if that still
    /// fails, nothing is written.
    pub async fn flush(&self) -> MemoryResult<()> {
        let mut state = self.lock().await;
        if state.memory.is_none() {
            return Ok(());
        }
        let memory = self.load_strict(&mut state).await?;
        self.persist(memory).await
    }

    /// Whether the stored snapshot has been read into memory
    pub async fn is_loaded(&self) -> bool {
        let state = self.state.lock().await;
        state.memory.is_some() && !state.degraded
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, PersonaState> {
        self.state.lock().await
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.context.clock.now()
    }

    /// Loaded memory, reading the store if needed and failing if it errors
    pub(crate) async fn load_strict<'a>(
        &self,
        state: &'a mut PersonaState,
    ) -> MemoryResult<&'a mut PersonaMemory> {
        if state.needs_load() {
            let loaded = self.read_store().await?;
            state.adopt(loaded, self.now());
        }
        Ok(state
            .memory
            .get_or_insert_with(|| PersonaMemory::new(&self.context.config)))
    }

    /// Loaded memory, continuing on unsaved state if the store errors
    ///
    /// A degraded persona retries the load on every call.
    async fn load_lenient<'a>(&self, state: &'a mut PersonaState) -> &'a mut PersonaMemory {
        if state.needs_load() {
            match self.read_store().await {
                Ok(loaded) => {
                    if state.degraded {
                        debug!(persona_id = %self.persona_id, "Store recovered, merged unsaved memory");
                    }
                    state.adopt(loaded, self.now());
                }
                Err(e) => {
                    if state.memory.is_none() {
                        warn!(
                            persona_id = %self.persona_id,
                            error = %e,
                            "Failed to load persona memory, starting empty"
                        );
                    }
                    state.degraded = true;
                }
            }
        }
        state
            .memory
            .get_or_insert_with(|| PersonaMemory::new(&self.context.config))
    }

    /// Write `memory` to the store; the caller holds the lock
    pub(crate) async fn persist(&self, memory: &PersonaMemory) -> MemoryResult<()> {
        self.context
            .store
            .persist(&self.persona_id, &memory.to_snapshot())
            .await
            .map_err(|e| match e {
                MemoryError::Persistence { .. } => e,
                other => MemoryError::persistence(&self.persona_id, other.to_string()),
            })
    }

    async fn read_store(&self) -> MemoryResult<PersonaMemory> {
        let config = &self.context.config;
        let loaded = self
            .context
            .store
            .load(&self.persona_id)
            .await
            .map_err(|e| match e {
                MemoryError::Persistence { .. } => e,
                other => MemoryError::persistence(&self.persona_id, other.to_string()),
            })?;

        Ok(match loaded {
            Some(snapshot) => {
                debug!(
                    persona_id = %self.persona_id,
                    records = snapshot.record_count(),
                    "Loaded persona memory"
                );
                PersonaMemory::from_snapshot(snapshot, config, self.now())
            }
            None => PersonaMemory::new(config),
        })
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        let dimensions = self.context.config.embedding_dimensions;
        match &self.context.embedder {
            Some(embedder) => embed_or_fallback(embedder.as_ref(), text, dimensions).await,
            None => fallback_embedding(text, dimensions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::Role;
    use crate::persistence::InMemorySnapshotStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct BrokenStore;

    #[async_trait]
    impl SnapshotStore for BrokenStore {
        async fn load(&self, persona_id: &str) -> MemoryResult<Option<crate::memory::MemorySnapshot>> {
            Err(MemoryError::persistence(persona_id, "store offline"))
        }

        async fn persist(&self, persona_id: &str, _: &crate::memory::MemorySnapshot) -> MemoryResult<()> {
            Err(MemoryError::persistence(persona_id, "store offline"))
        }
    }

    /// In-memory store whose first `load` calls fail
    #[derive(Default)]
    struct FlakyLoadStore {
        inner: InMemorySnapshotStore,
        failing_loads: AtomicU32,
    }

    impl FlakyLoadStore {
        fn failing(loads: u32) -> Self {
            Self {
                failing_loads: AtomicU32::new(loads),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl SnapshotStore for FlakyLoadStore {
        async fn load(&self, persona_id: &str) -> MemoryResult<Option<crate::memory::MemorySnapshot>> {
            let failing = self
                .failing_loads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(MemoryError::persistence(persona_id, "load timed out"));
            }
            self.inner.load(persona_id).await
        }

        async fn persist(&self, persona_id: &str, snapshot: &crate::memory::MemorySnapshot) -> MemoryResult<()> {
            self.inner.persist(persona_id, snapshot).await
        }
    }

    async fn seed_archive(store: &InMemorySnapshotStore, persona_id: &str, items: usize) {
        let items: Vec<serde_json::Value> = (0..items)
            .map(|i| json!({"id": format!("lt-{i}"), "summary": format!("archived {i}"), "embedding": [1.0, 0.0, 0.0, 0.0]}))
            .collect();
        store
            .insert_document(persona_id, json!({"longTermStore": {"items": items}}))
            .await;
    }

    /// Embeds by keyword so related texts land on the same axis
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
            let mut vector = vec![0.0; 4];
            for (axis, word) in ["tea", "rust", "run", "music"].iter().enumerate() {
                if text.contains(word) {
                    vector[axis] = 1.0;
                }
            }
            Ok(vector)
        }
    }

    fn registry(store: Arc<dyn SnapshotStore>) -> PersonaRegistry {
        PersonaRegistry::with_collaborators(
            MemoryConfig::default().with_dimensions(4),
            store,
            Arc::new(ManualClock::new(Utc::now())),
            Some(Arc::new(KeywordEmbedder)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_returns_same_handle() {
        let registry = registry(Arc::new(InMemorySnapshotStore::new()));
        let a = registry.open("ada").await;
        let b = registry.open("ada").await;
        registry.open("bob").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.persona_ids().await, vec!["ada", "bob"]);
        assert!(!a.is_loaded().await);

        registry.remove("bob").await;
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_record_turn_and_reject_invalid() {
        let registry = registry(Arc::new(InMemorySnapshotStore::new()));
        let handle = registry.open("ada").await;

        handle.record_turn(TurnInput::user("hi")).await.unwrap();
        handle.record_turn(TurnInput::assistant("hello")).await.unwrap();
        let err = handle
            .record_turn(TurnInput::from_parts(Some("user"), None))
            .await
            .unwrap_err();
        assert!(err.is_invalid_turn());

        let turns = handle.recent_turns().await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::Assistant);

        handle.clear_turns().await;
        assert_eq!(handle.stats().await.short_term, 0);
    }

    #[tokio::test]
    async fn test_lazy_load_from_store() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store
            .insert_document(
                "ada",
                json!({
                    "shortTermHistory": [{"role": "user", "content": "earlier", "ts": 1}],
                    "midTermSlots": [{"summary": "likes tea", "embedding": [1.0, 0.0, 0.0, 0.0]}]
                }),
            )
            .await;
        let registry = registry(store);
        let handle = registry.open("ada").await;

        let stats = handle.stats().await;
        assert_eq!(stats.short_term, 1);
        assert_eq!(stats.mid_term, 1);
        assert!(handle.is_loaded().await);
    }

    #[tokio::test]
    async fn test_broken_store_degrades_turn_path() {
        let registry = registry(Arc::new(BrokenStore));
        let handle = registry.open("ada").await;

        handle.record_turn(TurnInput::user("still works")).await.unwrap();
        assert_eq!(handle.stats().await.short_term, 1);

        let err = handle.flush().await.unwrap_err();
        assert!(err.is_persistence());
        assert!(!handle.is_loaded().await);
    }

    #[tokio::test]
    async fn test_flush_never_overwrites_unread_document() {
        let store = Arc::new(FlakyLoadStore::failing(u32::MAX));
        seed_archive(&store.inner, "ada", 5).await;
        let registry = registry(store.clone());
        let handle = registry.open("ada").await;

        handle.record_turn(TurnInput::user("while offline")).await.unwrap();
        assert!(handle.flush().await.unwrap_err().is_persistence());

        assert_eq!(store.inner.write_count(), 0);
        let document = store.inner.document("ada").await.unwrap();
        assert_eq!(document["longTermStore"]["items"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_degraded_memory_merges_once_store_recovers() {
        let store = Arc::new(FlakyLoadStore::failing(1));
        seed_archive(&store.inner, "ada", 5).await;
        let registry = registry(store.clone());
        let handle = registry.open("ada").await;

        handle.record_turn(TurnInput::user("while offline")).await.unwrap();
        assert!(!handle.is_loaded().await);

        let stats = handle.stats().await;
        assert!(handle.is_loaded().await);
        assert_eq!(stats.long_term, 5);
        assert_eq!(stats.short_term, 1);

        handle.flush().await.unwrap();
        let document = store.inner.document("ada").await.unwrap();
        assert_eq!(document["longTermStore"]["items"].as_array().unwrap().len(), 5);
        assert_eq!(document["shortTermHistory"][0]["content"], "while offline");
    }

    #[tokio::test]
    async fn test_remember_and_recall_text() {
        let registry = registry(Arc::new(InMemorySnapshotStore::new()));
        let handle = registry.open("ada").await;

        handle.remember_text("drinks green tea", Category::Personal, false).await;
        handle.remember_text("learning rust", Category::Technical, false).await;
        let outcome = handle.remember_text("tea in the morning", Category::Personal, false).await;
        assert_eq!(outcome, UpsertOutcome::Merged { index: 0 });

        let result = handle.recall_text("which tea?").await;
        assert_eq!(result.mid_term.len(), 1);
        assert_eq!(result.mid_term[0].slot.summary, "tea in the morning");
        assert_eq!(result.mid_term[0].slot.cluster_size, 2);

        assert!(handle.pin(1).await);
        assert!(!handle.pin(7).await);
        assert_eq!(handle.stats().await.pinned, 1);
    }

    #[tokio::test]
    async fn test_flush_writes_snapshot() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let registry = registry(store.clone());
        let handle = registry.open("ada").await;

        handle.flush().await.unwrap();
        assert_eq!(store.write_count(), 0);

        handle.record_turn(TurnInput::user("remember me")).await.unwrap();
        handle.flush().await.unwrap();

        let document = store.document("ada").await.unwrap();
        assert_eq!(document["shortTermHistory"][0]["content"], "remember me");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_serialized() {
        let registry = Arc::new(registry(Arc::new(InMemorySnapshotStore::new())));
        let mut tasks = Vec::new();
        for i in 0..50 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let handle = registry.open("ada").await;
                handle.record_turn(TurnInput::user(format!("turn {i}"))).await.unwrap();
                handle.remember(SlotCandidate::new("same topic", vec![0.0, 0.0, 1.0, 0.0])).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let memory = registry.open("ada").await.snapshot().await;
        assert_eq!(memory.short_term().size(), 10);
        assert_eq!(memory.mid_term().len(), 1);
        assert_eq!(memory.mid_term().get(0).unwrap().access_count, 49);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = PersonaRegistry::new(
            MemoryConfig::default().with_capacities(0, 20, 100),
            Arc::new(InMemorySnapshotStore::new()),
        );
        assert!(matches!(result, Err(MemoryError::Config(_))));
    }
}
