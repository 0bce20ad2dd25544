//! Long-term archive.
//!
//! Items arrive by promotion or bulk insert and are never merged. When the
//! archive overflows, the newest items by promotion time (creation time for
//! items that were never promoted) are kept and the rest are dropped. The
//! loss is silent and final.

use std::cmp::Reverse;

use super::LongTermItem;

/// Bounded archive of long-term items for one persona
#[derive(Debug, Clone)]
pub struct LongTermArchive {
    items: Vec<LongTermItem>,
    max_items: usize,
}

impl LongTermArchive {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items,
        }
    }

    /// Rebuild from stored items, applying the same retention rule
    pub fn from_items(items: Vec<LongTermItem>, max_items: usize) -> Self {
        let mut archive = Self::new(max_items);
        archive.insert_many(items);
        archive
    }

    /// Append items, then trim to capacity keeping the most recent
    ///
    /// Returns the number of items dropped.
    pub fn insert_many(&mut self, items: impl IntoIterator<Item = LongTermItem>) -> usize {
        self.items.extend(items);
        if self.items.len() <= self.max_items {
            return 0;
        }

        // Stable: items with equal recency keep insertion order
        self.items.sort_by_key(|item| Reverse(item.recency()));
        let dropped = self.items.len() - self.max_items;
        self.items.truncate(self.max_items);

        tracing::debug!(
            dropped,
            capacity = self.max_items,
            "Long-term archive over capacity, dropped oldest items"
        );
        dropped
    }

    pub fn get(&self, id: &str) -> Option<&LongTermItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub(crate) fn get_mut_at(&mut self, index: usize) -> Option<&mut LongTermItem> {
        self.items.get_mut(index)
    }

    /// Read-only view in archive order
    pub fn items(&self) -> &[LongTermItem] {
        &self.items
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }
}
