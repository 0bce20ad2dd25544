//! Memory Configuration
//!
//! Tier capacities, similarity thresholds, promotion policy and the
//! maintenance interval. All fields have defaults, so a partial TOML document
//! is enough to override a single knob.

use serde::{Deserialize, Serialize};

/// Top-level memory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum raw turns kept per persona (default: 10)
    pub short_term_capacity: usize,

    /// Maximum summarized slots kept per persona (default: 20)
    pub mid_term_capacity: usize,

    /// Maximum archived items kept per persona (default: 100)
    pub long_term_capacity: usize,

    /// Length of every embedding vector (default: 1536)
    pub embedding_dimensions: usize,

    /// Minimum cosine similarity for a summary to merge into an existing slot (default: 0.85)
    pub merge_threshold: f32,

    /// Retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Promotion and retention policy
    pub promotion: PromotionPolicy,

    /// Maintenance sweep configuration
    pub maintenance: MaintenanceConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: 10,
            mid_term_capacity: 20,
            long_term_capacity: 100,
            embedding_dimensions: 1536,
            merge_threshold: 0.85,
            retrieval: RetrievalConfig::default(),
            promotion: PromotionPolicy::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results returned per tier (default: 3)
    pub top_k: usize,

    /// Minimum cosine similarity for a result (default: 0.5)
    pub relevance_floor: f32,

    /// Record access feedback on returned memories (default: true)
    pub feedback: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            relevance_floor: 0.5,
            feedback: true,
        }
    }
}

/// Rules deciding which mid-term slots are promoted, kept or pruned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionPolicy {
    /// Access count at which a slot is promoted (default: 5)
    pub min_access_count: u32,

    /// Cluster size at which a slot is promoted (default: 3)
    pub min_cluster_size: u32,

    /// Priority below which an unpinned slot may be pruned (default: 0.2)
    pub retention_priority_floor: f64,

    /// Pruning only applies once the store holds more slots than this (default: 15)
    pub capacity_grace_slots: usize,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            min_access_count: 5,
            min_cluster_size: 3,
            retention_priority_floor: 0.2,
            capacity_grace_slots: 15,
        }
    }
}

/// Maintenance sweep configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between sweeps (default: 600 = 10 minutes)
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

impl MemoryConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigValidationError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the tier capacities
    pub fn with_capacities(mut self, short_term: usize, mid_term: usize, long_term: usize) -> Self {
        self.short_term_capacity = short_term;
        self.mid_term_capacity = mid_term;
        self.long_term_capacity = long_term;
        self
    }

    /// Set the embedding dimensionality
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// Set retrieval configuration
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Set promotion policy
    pub fn with_promotion(mut self, promotion: PromotionPolicy) -> Self {
        self.promotion = promotion;
        self
    }

    /// Set maintenance configuration
    pub fn with_maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let capacities = [
            ("short_term_capacity", self.short_term_capacity),
            ("mid_term_capacity", self.mid_term_capacity),
            ("long_term_capacity", self.long_term_capacity),
            ("embedding_dimensions", self.embedding_dimensions),
            ("retrieval.top_k", self.retrieval.top_k),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(ConfigValidationError::invalid(field, "must be greater than 0"));
            }
        }

        if !(-1.0..=1.0).contains(&self.merge_threshold) {
            return Err(ConfigValidationError::invalid(
                "merge_threshold",
                "must be between -1 and 1",
            ));
        }

        if !(-1.0..=1.0).contains(&self.retrieval.relevance_floor) {
            return Err(ConfigValidationError::invalid(
                "retrieval.relevance_floor",
                "must be between -1 and 1",
            ));
        }

        if !self.promotion.retention_priority_floor.is_finite()
            || self.promotion.retention_priority_floor < 0.0
        {
            return Err(ConfigValidationError::invalid(
                "promotion.retention_priority_floor",
                "must be a non-negative number",
            ));
        }

        if self.promotion.capacity_grace_slots > self.mid_term_capacity {
            return Err(ConfigValidationError::invalid(
                "promotion.capacity_grace_slots",
                "must not exceed mid_term_capacity",
            ));
        }

        if self.maintenance.interval_secs == 0 {
            return Err(ConfigValidationError::invalid(
                "maintenance.interval_secs",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigValidationError {
    fn invalid(field: &str, message: &str) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
