//! Persisted Memory Document
//!
//! One JSON document per persona:
//!
//! ```text
//! {
//!   "shortTermHistory": [ {role, content, ts} ... ],
//!   "midTermSlots":     [ {summary, embedding, priority, baseRelevance, accessCount,
//!                          lastAccessed, createdAt, ts, category,
//!                          userMarkedImportant, semanticClusterSize} ... ],
//!   "longTermStore":    { "items": [ {id, summary, embedding,
//!                                      meta: {timestamp, date, messageCount}} ... ] }
//! }
//! ```
//!
//! Decoding is lenient. Missing fields take defaults and a malformed record
//! is skipped with a warning, so one bad entry never blocks the rest of the
//! document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::{LongTermItem, MidTermSlot, Turn};
use crate::MemoryResult;

/// Wire form of one persona's memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    /// Oldest first
    #[serde(default, deserialize_with = "lenient_records")]
    pub short_term_history: Vec<Turn>,

    #[serde(default, deserialize_with = "lenient_records")]
    pub mid_term_slots: Vec<MidTermSlot>,

    #[serde(default, deserialize_with = "lenient_store")]
    pub long_term_store: LongTermStore,
}

/// Wrapper object around the archived items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTermStore {
    #[serde(default, deserialize_with = "lenient_records")]
    pub items: Vec<LongTermItem>,
}

impl MemorySnapshot {
    /// Decode a document; fails only if the document as a whole is not JSON
    pub fn from_json_str(source: &str) -> MemoryResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_value(value: serde_json::Value) -> MemoryResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> MemoryResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_string(&self) -> MemoryResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Number of records across all tiers
    pub fn record_count(&self) -> usize {
        self.short_term_history.len() + self.mid_term_slots.len() + self.long_term_store.items.len()
    }
}

fn lenient_records<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let records = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(records) => records,
        serde_json::Value::Null => return Ok(Vec::new()),
        other => {
            tracing::warn!(found = %json_kind(&other), "Expected a list of memory records, ignoring field");
            return Ok(Vec::new());
        }
    };

    Ok(records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(index, error = %e, "Skipping malformed memory record");
                None
            }
        })
        .collect())
}

fn lenient_store<'de, D>(deserializer: D) -> Result<LongTermStore, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(LongTermStore::default());
    }
    match serde_json::from_value(value) {
        Ok(store) => Ok(store),
        Err(e) => {
            tracing::warn!(error = %e, "Malformed long-term store, starting empty");
            Ok(LongTermStore::default())
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
