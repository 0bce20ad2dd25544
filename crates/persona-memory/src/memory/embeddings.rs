//! Embedding Boundary and Vector Math
//!
//! The embedding model itself is an external collaborator. This module holds
//! the similarity math every tier shares, the [`Embedder`] contract, and a
//! deterministic fallback vector used when the embedder is unavailable.
//!
//! # Usage
//!
//! ```ignore
//! use persona_memory::memory::embeddings::{cosine_similarity, embed_or_fallback};
//!
//! let vector = embed_or_fallback(&embedder, "likes hiking", 1536).await;
//! let similarity = cosine_similarity(&vector, &slot.embedding);
//! ```

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::MemoryResult;

/// External text embedding function
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;
}

/// Compute cosine similarity between two vectors
///
/// Returns a value between -1.0 and 1.0. Vectors that are empty, differ in
/// length, have zero norm or hold non-finite components compare as 0.0; a
/// mismatch is never an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if !similarity.is_finite() {
        return 0.0;
    }
    similarity.clamp(-1.0, 1.0)
}

/// Deterministic unit vector derived from the SHA-256 of `text`
///
/// Identical text always maps to the identical vector, so fallback-embedded
/// summaries still merge with themselves.
pub fn fallback_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = Vec::with_capacity(dimensions);
    let mut block: u32 = 0;

    while vector.len() < dimensions {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(block.to_le_bytes());
        let digest = hasher.finalize();

        for chunk in digest.chunks_exact(4) {
            if vector.len() == dimensions {
                break;
            }
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            vector.push((raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
        }
        block += 1;
    }

    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

/// Embed `text`, substituting the fallback vector on failure, wrong length
/// or non-finite components
pub async fn embed_or_fallback<E>(embedder: &E, text: &str, dimensions: usize) -> Vec<f32>
where
    E: Embedder + ?Sized,
{
    match embedder.embed(text).await {
        Ok(vector) if vector.len() != dimensions => {
            tracing::warn!(
                expected = dimensions,
                actual = vector.len(),
                "Embedding has wrong dimensionality, using fallback vector"
            );
            fallback_embedding(text, dimensions)
        }
        Ok(vector) if vector.iter().any(|x| !x.is_finite()) => {
            tracing::warn!("Embedding has non-finite components, using fallback vector");
            fallback_embedding(text, dimensions)
        }
        Ok(vector) => vector,
        Err(e) => {
            tracing::warn!(error = %e, "Embedding failed, using fallback vector");
            fallback_embedding(text, dimensions)
        }
    }
}
