//! Collaborator contracts
//!
//! The harvesting engine only talks to the outside world through these
//! traits. Site-specific markup and API shapes stay behind them.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::product::NormalizedRecord;

/// Failure while talking to a listing or detail source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl SourceError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}

/// Failure reported by the ingestion sink for one request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink rejected request with status {status}")]
    Rejected { status: u16, body: String },

    #[error("sink unreachable: {0}")]
    Transport(String),
}

impl SinkError {
    /// Status column of the dispatch log: the HTTP code or `EXCEPTION`
    pub fn status_label(&self) -> String {
        match self {
            Self::Rejected { status, .. } => status.to_string(),
            Self::Transport(_) => "EXCEPTION".to_string(),
        }
    }

    /// Response body or transport message
    pub fn response(&self) -> &str {
        match self {
            Self::Rejected { body, .. } => body,
            Self::Transport(message) => message,
        }
    }
}

/// One item locator found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub locator: String,
    pub display_name: String,
}

impl ListingItem {
    pub fn new(locator: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            display_name: display_name.into(),
        }
    }
}

/// One page of a category listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub items: Vec<ListingItem>,
    /// Total item count reported by the source, if any
    pub total: Option<u64>,
    /// Running "items shown so far" counter, if the source reports one
    pub shown_so_far: Option<u64>,
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch page `page_index` (starting at 0) of `category`
    async fn fetch_page(&self, category: &str, page_index: u32) -> Result<ListingPage, SourceError>;
}

#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Fetch the structured metadata published for one item.
    ///
    /// `Ok(None)` means the page exists but carries no structured block.
    async fn fetch_detail(&self, locator: &str) -> Result<Option<Value>, SourceError>;
}

#[async_trait]
pub trait IngestionSink: Send + Sync {
    /// Deliver `records` as a single request. `Ok` only when the whole
    /// request was accepted.
    async fn deliver(&self, records: &[NormalizedRecord]) -> Result<(), SinkError>;
}
