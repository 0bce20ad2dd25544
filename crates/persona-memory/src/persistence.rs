//! Snapshot persistence boundary.
//!
//! The memory core never touches a filesystem or network itself. Hosts
//! implement [`SnapshotStore`] over whatever backend they use; the registry
//! and maintenance sweep only ever call `load` and `persist`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::MemoryResult;
use crate::memory::MemorySnapshot;

/// External store holding one snapshot document per persona
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load a persona's snapshot, `None` if nothing was stored yet
    async fn load(&self, persona_id: &str) -> MemoryResult<Option<MemorySnapshot>>;

    /// Replace a persona's stored snapshot
    async fn persist(&self, persona_id: &str, snapshot: &MemorySnapshot) -> MemoryResult<()>;
}

/// In-process store keeping the encoded JSON documents in a map
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    documents: RwLock<HashMap<String, serde_json::Value>>,
    writes: AtomicU64,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw document, bypassing encoding
    pub async fn insert_document(&self, persona_id: impl Into<String>, document: serde_json::Value) {
        self.documents.write().await.insert(persona_id.into(), document);
    }

    /// Raw stored document for a persona
    pub async fn document(&self, persona_id: &str) -> Option<serde_json::Value> {
        self.documents.read().await.get(persona_id).cloned()
    }

    pub async fn contains(&self, persona_id: &str) -> bool {
        self.documents.read().await.contains_key(persona_id)
    }

    /// Number of successful `persist` calls
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, persona_id: &str) -> MemoryResult<Option<MemorySnapshot>> {
        let documents = self.documents.read().await;
        match documents.get(persona_id) {
            Some(document) => Ok(Some(MemorySnapshot::from_value(document.clone())?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, persona_id: &str, snapshot: &MemorySnapshot) -> MemoryResult<()> {
        let document = snapshot.to_value()?;
        self.documents
            .write()
            .await
            .insert(persona_id.to_string(), document);
        self.writes.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(persona_id, records = snapshot.record_count(), "Persisted memory snapshot");
        Ok(())
    }
}
