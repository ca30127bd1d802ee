//! Test utilities for catalog-harvester
//!
//! In-memory collaborators that script listing pages, detail payloads and
//! sink responses, so the schedulers and the delivery engine can be
//! exercised without network access. Used by unit tests and the integration
//! tests under `tests/` (through the `test-utils` feature).

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::domain::{
    DetailSource, IngestionSink, ListingItem, ListingPage, ListingSource, NormalizedRecord,
    RecordDraft, SinkError, SourceError,
};

/// Build a valid record with the given identifier and price
pub fn record(identifier: &str, price: f64) -> NormalizedRecord {
    let draft = RecordDraft {
        identifier: Some(identifier.to_string()),
        name: Some(format!("Product {identifier}")),
        price: Some(json!(price)),
        currency: Some("UYU".to_string()),
        category: Some("general".to_string()),
        ..RecordDraft::default()
    };
    match NormalizedRecord::try_from(draft) {
        Ok(record) => record,
        Err(e) => panic!("test record {identifier} is invalid: {e}"),
    }
}

/// Listing page with items `range` under `https://shop.test/<prefix>/<n>`
///
/// Every locator carries a tracking parameter after the item id so the
/// normalizer has something to strip.
pub fn listing_page(prefix: &str, range: std::ops::Range<u32>, total: Option<u64>) -> ListingPage {
    let items = range
        .map(|i| {
            ListingItem::new(
                format!("https://shop.test/{prefix}/{i}?sku={i}&utm_source=listing"),
                format!("{prefix} item {i}"),
            )
        })
        .collect();
    ListingPage {
        items,
        total,
        shown_so_far: None,
    }
}

/// JSON-LD style product payload
pub fn product_payload(identifier: &str, price: &str) -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "Product",
        "name": format!("Product {identifier}"),
        "sku": identifier,
        "offers": {"@type": "Offer", "price": price, "priceCurrency": "UYU"}
    })
}

/// Listing source that replays a fixed script of pages per category
#[derive(Default)]
pub struct ScriptedListingSource {
    pages: HashMap<String, Vec<Result<ListingPage, SourceError>>>,
    repeat_last: bool,
    fetches: Mutex<HashMap<String, u32>>,
}

impl ScriptedListingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: &str, pages: Vec<Result<ListingPage, SourceError>>) -> Self {
        self.pages.insert(category.to_string(), pages);
        self
    }

    /// Keep returning the last scripted page once the script runs out
    #[must_use]
    pub const fn repeating_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub async fn fetch_count(&self, category: &str) -> u32 {
        self.fetches.lock().await.get(category).copied().unwrap_or(0)
    }

    pub async fn total_fetches(&self) -> u32 {
        self.fetches.lock().await.values().sum()
    }
}

#[async_trait]
impl ListingSource for ScriptedListingSource {
    async fn fetch_page(&self, category: &str, page_index: u32) -> Result<ListingPage, SourceError> {
        *self.fetches.lock().await.entry(category.to_string()).or_default() += 1;

        let Some(script) = self.pages.get(category) else {
            return Err(SourceError::Status {
                status: 404,
                url: format!("https://shop.test/{category}"),
            });
        };

        let page = script.get(page_index as usize).or_else(|| {
            if self.repeat_last { script.last() } else { None }
        });

        page.cloned().unwrap_or_else(|| Ok(ListingPage::default()))
    }
}

/// Detail source backed by a locator-to-response map
#[derive(Default)]
pub struct StaticDetailSource {
    responses: HashMap<String, Result<Option<Value>, SourceError>>,
    requested: Mutex<Vec<String>>,
}

impl StaticDetailSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, locator: &str, response: Result<Option<Value>, SourceError>) -> Self {
        self.responses.insert(locator.to_string(), response);
        self
    }

    pub async fn requested(&self) -> Vec<String> {
        self.requested.lock().await.clone()
    }
}

#[async_trait]
impl DetailSource for StaticDetailSource {
    async fn fetch_detail(&self, locator: &str) -> Result<Option<Value>, SourceError> {
        self.requested.lock().await.push(locator.to_string());
        self.responses.get(locator).cloned().unwrap_or(Ok(None))
    }
}

/// Sink that records every request and fails the ones it is told to
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<Vec<NormalizedRecord>>>,
    reject_calls: HashSet<usize>,
    unreachable_calls: HashSet<usize>,
    reject_identifiers: HashSet<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the given 1-based call with status 500
    pub fn rejecting_call(mut self, call: usize) -> Self {
        self.reject_calls.insert(call);
        self
    }

    /// Fail the given 1-based call at the transport level
    pub fn unreachable_on_call(mut self, call: usize) -> Self {
        self.unreachable_calls.insert(call);
        self
    }

    /// Answer 422 to any request containing this identifier
    pub fn rejecting_identifier(mut self, identifier: &str) -> Self {
        self.reject_identifiers.insert(identifier.to_string());
        self
    }

    pub async fn call_sizes(&self) -> Vec<usize> {
        self.calls.lock().await.iter().map(Vec::len).collect()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl IngestionSink for RecordingSink {
    async fn deliver(&self, records: &[NormalizedRecord]) -> Result<(), SinkError> {
        let call = {
            let mut calls = self.calls.lock().await;
            calls.push(records.to_vec());
            calls.len()
        };

        if self.unreachable_calls.contains(&call) {
            return Err(SinkError::Transport("connection refused".to_string()));
        }
        if self.reject_calls.contains(&call) {
            return Err(SinkError::Rejected {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        if records.iter().any(|r| self.reject_identifiers.contains(r.identifier())) {
            return Err(SinkError::Rejected {
                status: 422,
                body: "invalid product".to_string(),
            });
        }
        Ok(())
    }
}
