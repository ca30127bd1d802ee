use serde::{Deserialize, Serialize};

use super::canonical_key::CanonicalKey;

/// Aggregate view of one item found during the discovery phase
///
/// `categories` keeps insertion order and never shrinks; the first entry is
/// the category the item was first seen under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEntry {
    pub key: CanonicalKey,
    pub display_name: String,
    pub categories: Vec<String>,
}

impl DiscoveryEntry {
    pub fn new(key: CanonicalKey, display_name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            key,
            display_name: display_name.into(),
            categories: vec![category.into()],
        }
    }

    /// Add a category unless already present. Returns true when it was new.
    pub fn add_category(&mut self, category: &str) -> bool {
        if self.has_category(category) {
            return false;
        }
        self.categories.push(category.to_string());
        true
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Category the item was first discovered under
    pub fn primary_category(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::canonical_key::normalize;

    #[test]
    fn categories_are_deduplicated_in_insertion_order() {
        let key = normalize("https://shop.test/p/1").unwrap();
        let mut entry = DiscoveryEntry::new(key, "Arroz", "almacen");

        assert!(entry.add_category("ofertas"));
        assert!(!entry.add_category("almacen"));
        assert!(entry.add_category("bebidas"));

        assert_eq!(entry.categories, vec!["almacen", "ofertas", "bebidas"]);
        assert_eq!(entry.primary_category(), Some("almacen"));
    }
}
