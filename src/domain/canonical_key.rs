//! Canonical item keys
//!
//! A catalog item is usually reachable through several locators that only
//! differ in tracking or pagination query parameters. [`normalize`] collapses
//! them to one [`CanonicalKey`] by keeping the first query parameter (the one
//! carrying the item id on the sites we harvest) and dropping the rest.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder value some listings emit instead of a real link
const NOT_AVAILABLE: &str = "N/A";

/// Normalized identifier for one catalog item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a raw locator to its canonical key.
///
/// Returns `None` for empty input and for the `N/A` placeholder. The
/// fragment is dropped, and of the query string only the first parameter
/// survives (cut at the first `&` and, for comma-joined values, at the
/// first `,`). The function is idempotent.
pub fn normalize(raw: &str) -> Option<CanonicalKey> {
    let without_fragment = raw.split_once('#').map_or(raw, |(head, _)| head).trim();

    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base.trim_end(), Some(query)),
        None => (without_fragment, None),
    };

    let first_param = query
        .and_then(|q| q.split('&').next())
        .and_then(|p| p.split(',').next())
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let key = match first_param {
        Some(param) => format!("{base}?{param}"),
        None => base.to_string(),
    };

    if key.is_empty() || key.eq_ignore_ascii_case(NOT_AVAILABLE) {
        return None;
    }

    Some(CanonicalKey(key))
}
