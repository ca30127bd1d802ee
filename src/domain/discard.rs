use serde::{Deserialize, Serialize};
use std::fmt;

use super::canonical_key::CanonicalKey;

/// Closed set of reasons an item is left out of the final output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscardReason {
    NoStructuredData,
    MissingPrice,
    MissingIdentifier,
    ParseError(String),
    TransportError(String),
}

impl DiscardReason {
    /// Reason code without the detail payload
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoStructuredData => "NO_STRUCTURED_DATA",
            Self::MissingPrice => "MISSING_PRICE",
            Self::MissingIdentifier => "MISSING_IDENTIFIER",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::TransportError(_) => "TRANSPORT_ERROR",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseError(detail) | Self::TransportError(detail) => {
                write!(f, "{}({detail})", self.code())
            }
            _ => f.write_str(self.code()),
        }
    }
}

/// One terminally rejected item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardRecord {
    pub key: CanonicalKey,
    pub reason: DiscardReason,
    pub category: String,
}

impl DiscardRecord {
    pub fn new(key: CanonicalKey, reason: DiscardReason, category: impl Into<String>) -> Self {
        Self {
            key,
            reason,
            category: category.into(),
        }
    }
}
