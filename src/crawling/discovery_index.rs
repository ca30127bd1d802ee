//! Shared discovery index
//!
//! The only structure written by many crawl tasks at once. Every mutation
//! goes through [`DiscoveryIndex::upsert`], which takes the write lock for the
//! whole read-modify-write, so concurrent upserts of the same key serialize.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{CanonicalKey, DiscoveryEntry};

/// Result of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First time the key was seen
    Inserted,
    /// Known key, new category appended
    CategoryAdded,
    /// Known key already listed under this category
    Unchanged,
}

/// Concurrency-safe map from canonical key to discovery entry
#[derive(Debug, Clone, Default)]
pub struct DiscoveryIndex {
    entries: Arc<RwLock<HashMap<CanonicalKey, DiscoveryEntry>>>,
}

impl DiscoveryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key` or merge `category` into its entry.
    ///
    /// The display name of an existing entry is never replaced.
    pub async fn upsert(&self, key: CanonicalKey, display_name: &str, category: &str) -> UpsertOutcome {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&key) {
            Some(entry) => {
                if entry.add_category(category) {
                    UpsertOutcome::CategoryAdded
                } else {
                    UpsertOutcome::Unchanged
                }
            }
            None => {
                entries.insert(key.clone(), DiscoveryEntry::new(key, display_name.trim(), category));
                UpsertOutcome::Inserted
            }
        }
    }

    pub async fn get(&self, key: &CanonicalKey) -> Option<DiscoveryEntry> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Freeze the current contents into a read-only, key-ordered view
    pub async fn snapshot(&self) -> DiscoverySnapshot {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        DiscoverySnapshot {
            entries: Arc::from(entries),
        }
    }
}

/// Immutable view handed from the crawl phase to the extraction phase
#[derive(Debug, Clone, Default)]
pub struct DiscoverySnapshot {
    entries: Arc<[DiscoveryEntry]>,
}

impl DiscoverySnapshot {
    pub fn from_entries(mut entries: Vec<DiscoveryEntry>) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            entries: Arc::from(entries),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[DiscoveryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
