//! HTTP-backed listing and detail sources

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::config::SourceConfig;
use super::http_client::HttpClient;
use super::parsing::{ListingParser, ListingSelectors, ParsingResult, extract_json_ld};
use crate::domain::{DetailSource, ListingPage, ListingSource, SourceError};

/// Listing source that renders a URL template and parses the HTML
pub struct HtmlListingSource {
    client: Arc<HttpClient>,
    parser: ListingParser,
    url_template: String,
    page_number_offset: u32,
}

impl HtmlListingSource {
    pub fn new(client: Arc<HttpClient>, config: &SourceConfig) -> ParsingResult<Self> {
        let selectors = ListingSelectors {
            item: config.item_selector.clone(),
            link: config.link_selector.clone(),
            name: config.name_selector.clone(),
            counter_pattern: config.counter_pattern.clone(),
        };
        Ok(Self {
            client,
            parser: ListingParser::new(&selectors)?,
            url_template: config.listing_url_template.clone(),
            page_number_offset: config.page_number_offset,
        })
    }

    /// Listing URL for a category and a zero-based page index
    pub fn page_url(&self, category: &str, page_index: u32) -> String {
        let page = page_index.saturating_add(self.page_number_offset);
        self.url_template
            .replace("{category}", category.trim_matches('/'))
            .replace("{page}", &page.to_string())
    }
}

#[async_trait]
impl ListingSource for HtmlListingSource {
    async fn fetch_page(&self, category: &str, page_index: u32) -> Result<ListingPage, SourceError> {
        let url = self.page_url(category, page_index);
        let html = self.client.get_text(&url).await?;
        // Locators resolve against the page they were found on
        let page = self.parser.parse(&html, &url)?;
        debug!("{} -> {} items", url, page.items.len());
        Ok(page)
    }
}

/// Detail source reading the JSON-LD blocks of a product page
pub struct JsonLdDetailSource {
    client: Arc<HttpClient>,
}

impl JsonLdDetailSource {
    pub const fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DetailSource for JsonLdDetailSource {
    async fn fetch_detail(&self, locator: &str) -> Result<Option<Value>, SourceError> {
        let html = self.client.get_text(locator).await?;
        Ok(extract_json_ld(&html)?)
    }
}
