//! Memory Type Definitions
//!
//! Defines the records held by each tier. Field names follow the persisted
//! JSON document, so the same structs serialize straight into a snapshot.

use chrono::serde::{ts_milliseconds, ts_milliseconds_option};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker of a dialogue turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Convert from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single dialogue turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Load time when the stored turn has none
    #[serde(rename = "ts", default = "Utc::now", with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Caller-supplied turn, validated by [`ShortTermQueue::push`](super::ShortTermQueue::push)
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TurnInput {
    /// Create a complete turn input without a timestamp
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: Some(content.into()),
            timestamp: None,
        }
    }

    /// Shorthand for a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Shorthand for an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Build from loosely typed parts; an unknown role counts as missing
    pub fn from_parts(role: Option<&str>, content: Option<&str>) -> Self {
        Self {
            role: role.and_then(Role::from_str),
            content: content.map(str::to_string),
            timestamp: None,
        }
    }

    /// Keep an explicit timestamp instead of stamping on push
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Topic category of a summarized memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Personal,
    Technical,
    Project,
    Casual,
    #[default]
    General,
}

impl Category {
    /// Convert from string; unknown categories map to `General`
    pub fn from_str(s: &str) -> Self {
        match s {
            "personal" => Self::Personal,
            "technical" => Self::Technical,
            "project" => Self::Project,
            "casual" => Self::Casual,
            _ => Self::General,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Technical => "technical",
            Self::Project => "project",
            Self::Casual => "casual",
            Self::General => "general",
        }
    }

    /// Priority multiplier for this category
    pub fn weight(&self) -> f64 {
        match self {
            Self::Personal => 2.0,
            Self::Technical => 1.8,
            Self::Project => 1.7,
            Self::Casual | Self::General => 1.0,
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.as_str().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A condensed summary offered to the mid-term store
#[derive(Debug, Clone, PartialEq)]
pub struct SlotCandidate {
    pub summary: String,
    pub embedding: Vec<f32>,
    pub category: Category,
    pub user_pinned: bool,
}

impl SlotCandidate {
    pub fn new(summary: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            summary: summary.into(),
            embedding,
            category: Category::General,
            user_pinned: false,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.user_pinned = true;
        self
    }
}

/// Summarized topic slot in mid-term memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidTermSlot {
    pub summary: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub priority: f64,
    #[serde(default = "default_base_relevance")]
    pub base_relevance: f64,
    #[serde(default)]
    pub access_count: u32,
    #[serde(default, with = "ts_milliseconds")]
    pub last_accessed: DateTime<Utc>,
    #[serde(default, with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last time the slot's content changed
    #[serde(rename = "ts", default, with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub category: Category,
    #[serde(rename = "userMarkedImportant", default)]
    pub user_pinned: bool,
    #[serde(rename = "semanticClusterSize", default = "default_cluster_size")]
    pub cluster_size: u32,
}

pub(crate) fn default_base_relevance() -> f64 {
    1.0
}

pub(crate) fn default_cluster_size() -> u32 {
    1
}

fn new_item_id() -> String {
    Uuid::new_v4().to_string()
}

impl MidTermSlot {
    /// Create a fresh slot from a candidate
    pub fn new(candidate: SlotCandidate, now: DateTime<Utc>) -> Self {
        Self {
            summary: candidate.summary,
            embedding: candidate.embedding,
            priority: 0.0,
            base_relevance: default_base_relevance(),
            access_count: 0,
            last_accessed: now,
            created_at: now,
            updated_at: now,
            category: candidate.category,
            user_pinned: candidate.user_pinned,
            cluster_size: default_cluster_size(),
        }
    }

    /// Repair a slot decoded from an untrusted document
    pub fn normalize(&mut self) {
        if !self.priority.is_finite() || self.priority < 0.0 {
            self.priority = 0.0;
        }
        if !self.base_relevance.is_finite() || self.base_relevance < 0.0 {
            self.base_relevance = default_base_relevance();
        }
        self.cluster_size = self.cluster_size.max(1);
        if self.last_accessed < self.created_at {
            self.last_accessed = self.created_at;
        }
        if self.updated_at < self.created_at {
            self.updated_at = self.created_at;
        }
    }
}

/// Bookkeeping carried by archived items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTermMeta {
    /// Creation time of the underlying memory
    #[serde(default, with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Calendar date of `timestamp` (YYYY-MM-DD)
    #[serde(default)]
    pub date: String,
    /// Number of summaries folded into this memory
    #[serde(default)]
    pub message_count: u32,
}

impl LongTermMeta {
    fn at(timestamp: DateTime<Utc>, message_count: u32) -> Self {
        Self {
            timestamp,
            date: timestamp.format("%Y-%m-%d").to_string(),
            message_count,
        }
    }
}

/// Archived long-term memory. Never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTermItem {
    #[serde(default = "new_item_id")]
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub meta: LongTermMeta,
    #[serde(default)]
    pub category: Category,
    #[serde(
        default,
        with = "ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub promoted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_count: u32,
    #[serde(
        default,
        with = "ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_pinned: bool,
    #[serde(default = "default_cluster_size")]
    pub cluster_size: u32,
}

impl LongTermItem {
    /// Create an item for direct bulk insertion
    pub fn new(
        summary: impl Into<String>,
        embedding: Vec<f32>,
        category: Category,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_item_id(),
            summary: summary.into(),
            embedding,
            meta: LongTermMeta::at(created_at, 1),
            category,
            promoted_at: None,
            access_count: 0,
            last_accessed: None,
            user_pinned: false,
            cluster_size: 1,
        }
    }

    /// Convert a mid-term slot being promoted. Consumes the slot.
    pub fn promote(slot: MidTermSlot, now: DateTime<Utc>) -> Self {
        Self {
            id: new_item_id(),
            summary: slot.summary,
            embedding: slot.embedding,
            meta: LongTermMeta::at(slot.created_at, slot.cluster_size),
            category: slot.category,
            promoted_at: Some(now),
            access_count: slot.access_count,
            last_accessed: Some(slot.last_accessed),
            user_pinned: slot.user_pinned,
            cluster_size: slot.cluster_size.max(1),
        }
    }

    /// Creation time of the underlying memory
    pub fn created_at(&self) -> DateTime<Utc> {
        self.meta.timestamp
    }

    /// Ordering key for archive eviction: promotion time, else creation time
    pub fn recency(&self) -> DateTime<Utc> {
        self.promoted_at.unwrap_or(self.meta.timestamp)
    }

    /// Repair an item decoded from an untrusted document
    pub fn normalize(&mut self) {
        if self.id.trim().is_empty() {
            self.id = new_item_id();
        }
        self.cluster_size = self.cluster_size.max(1);
        if self.meta.date.is_empty() {
            self.meta.date = self.meta.timestamp.format("%Y-%m-%d").to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_role_conversion() {
        assert_eq!(Role::from_str("user"), Some(Role::User));
        assert_eq!(Role::from_str("system"), None);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_category_weights_and_fallback() {
        assert_eq!(Category::Personal.weight(), 2.0);
        assert_eq!(Category::Technical.weight(), 1.8);
        assert_eq!(Category::Project.weight(), 1.7);
        assert_eq!(Category::Casual.weight(), 1.0);
        assert_eq!(Category::from_str("gardening"), Category::General);

        let parsed: Category = serde_json::from_str("\"weird\"").unwrap();
        assert_eq!(parsed, Category::General);
        assert_eq!(serde_json::to_string(&Category::Project).unwrap(), "\"project\"");
    }

    #[test]
    fn test_slot_serializes_with_payload_keys() {
        let now = Utc::now();
        let slot = MidTermSlot::new(SlotCandidate::new("likes tea", vec![1.0, 0.0]).pinned(), now);
        let value = serde_json::to_value(&slot).unwrap();

        assert_eq!(value["userMarkedImportant"], true);
        assert_eq!(value["semanticClusterSize"], 1);
        assert_eq!(value["baseRelevance"], 1.0);
        assert_eq!(value["ts"], now.timestamp_millis());
        assert_eq!(value["category"], "general");
    }

    #[test]
    fn test_slot_defaults_and_normalize() {
        let mut slot: MidTermSlot = serde_json::from_value(serde_json::json!({
            "summary": "old topic",
            "priority": -3.0,
            "semanticClusterSize": 0,
            "createdAt": 1_700_000_000_000i64
        }))
        .unwrap();
        slot.normalize();

        assert_eq!(slot.priority, 0.0);
        assert_eq!(slot.base_relevance, 1.0);
        assert_eq!(slot.cluster_size, 1);
        assert_eq!(slot.last_accessed, slot.created_at);
        assert!(slot.embedding.is_empty());
    }

    #[test]
    fn test_promote_moves_fields() {
        let created = Utc::now() - Duration::days(3);
        let mut slot = MidTermSlot::new(
            SlotCandidate::new("project kickoff", vec![0.5; 4]).with_category(Category::Project),
            created,
        );
        slot.access_count = 6;
        slot.cluster_size = 2;

        let now = Utc::now();
        let item = LongTermItem::promote(slot, now);
        assert_eq!(item.summary, "project kickoff");
        assert_eq!(item.access_count, 6);
        assert_eq!(item.cluster_size, 2);
        assert_eq!(item.meta.message_count, 2);
        assert_eq!(item.created_at(), created);
        assert_eq!(item.recency(), now);
        assert!(!item.id.is_empty());
    }

    #[test]
    fn test_item_recency_falls_back_to_creation() {
        let created = Utc::now();
        let item = LongTermItem::new("note", vec![], Category::General, created);
        assert_eq!(item.recency(), created);
        assert_eq!(item.meta.date, created.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_item_normalize_assigns_missing_id() {
        let mut item: LongTermItem =
            serde_json::from_value(serde_json::json!({"id": " ", "summary": "blank id"})).unwrap();
        item.normalize();
        assert!(Uuid::parse_str(&item.id).is_ok());
    }
}
