//! HTML parsing for listing and detail pages
//!
//! [`ListingParser`] turns a listing page into a [`ListingPage`] using
//! configured CSS selectors and an optional counter regex.
//! [`extract_json_ld`] pulls the structured product data out of a detail page.

#![allow(clippy::uninlined_format_args)]

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::domain::{ListingItem, ListingPage, SourceError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid counter pattern: {0}")]
    InvalidCounterPattern(String),

    #[error("Invalid page URL {url}: {reason}")]
    InvalidPageUrl { url: String, reason: String },

    #[error("Structured data block is not valid JSON: {0}")]
    InvalidJsonLd(String),
}

pub type ParsingResult<T> = Result<T, ParsingError>;

impl From<ParsingError> for SourceError {
    fn from(error: ParsingError) -> Self {
        Self::parse(error.to_string())
    }
}

fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Selector settings for [`ListingParser`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    pub item: String,
    pub link: Option<String>,
    pub name: Option<String>,
    pub counter_pattern: Option<String>,
}

/// Parser for category listing pages
#[derive(Debug, Clone)]
pub struct ListingParser {
    item_selector: Selector,
    link_selector: Option<Selector>,
    name_selector: Option<Selector>,
    counter: Option<Regex>,
}

impl ListingParser {
    pub fn new(selectors: &ListingSelectors) -> ParsingResult<Self> {
        let counter = selectors
            .counter_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| ParsingError::InvalidCounterPattern(e.to_string()))?;

        Ok(Self {
            item_selector: compile_selector(&selectors.item)?,
            link_selector: selectors.link.as_deref().map(compile_selector).transpose()?,
            name_selector: selectors.name.as_deref().map(compile_selector).transpose()?,
            counter,
        })
    }

    /// Extract items and counters from one listing page.
    ///
    /// Items without a resolvable link are skipped. Links are made absolute
    /// against `page_url`.
    pub fn parse(&self, html: &str, page_url: &str) -> ParsingResult<ListingPage> {
        let base = Url::parse(page_url).map_err(|e| ParsingError::InvalidPageUrl {
            url: page_url.to_string(),
            reason: e.to_string(),
        })?;
        let document = Html::parse_document(html);

        let items: Vec<ListingItem> = document
            .select(&self.item_selector)
            .filter_map(|element| self.parse_item(element, &base))
            .collect();

        let (shown_so_far, total) = self.parse_counter(&document);
        debug!(
            "Parsed listing page: {} items, shown={:?}, total={:?}",
            items.len(),
            shown_so_far,
            total
        );

        Ok(ListingPage {
            items,
            total,
            shown_so_far,
        })
    }

    fn parse_item(&self, element: ElementRef<'_>, base: &Url) -> Option<ListingItem> {
        let link = match &self.link_selector {
            Some(selector) => element.select(selector).next()?,
            None => element,
        };
        let href = link.value().attr("href")?.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }

        let locator = match base.join(href) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("Skipping unresolvable link '{}': {}", href, e);
                return None;
            }
        };

        let name_source = match &self.name_selector {
            Some(selector) => element.select(selector).next().unwrap_or(link),
            None => link,
        };
        let display_name = text_of(name_source)
            .or_else(|| link.value().attr("title").map(str::to_string))
            .unwrap_or_default();

        Some(ListingItem::new(locator, display_name))
    }

    fn parse_counter(&self, document: &Html) -> (Option<u64>, Option<u64>) {
        let Some(counter) = &self.counter else {
            return (None, None);
        };
        let text = document.root_element().text().collect::<String>();
        let Some(captures) = counter.captures(&text) else {
            return (None, None);
        };
        let group = |name: &str| captures.name(name).and_then(|m| m.as_str().parse::<u64>().ok());
        (group("shown"), group("total"))
    }
}

fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Parse every `application/ld+json` block on a detail page.
///
/// Returns `Ok(None)` when the page has no such block, the single parsed
/// value when there is one, and an array of all parsed values otherwise.
/// Blocks that are not valid JSON are skipped unless none are valid.
pub fn extract_json_ld(html: &str) -> ParsingResult<Option<Value>> {
    let document = Html::parse_document(html);
    let selector = compile_selector(r#"script[type="application/ld+json"]"#)?;

    let mut values = Vec::new();
    let mut last_error = None;
    for script in document.select(&selector) {
        let body = script.text().collect::<String>();
        if body.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(body.trim()) {
            Ok(value) => values.push(value),
            Err(e) => {
                debug!("Ignoring malformed structured data block: {}", e);
                last_error = Some(e.to_string());
            }
        }
    }

    match (values.len(), last_error) {
        (0, Some(error)) => Err(ParsingError::InvalidJsonLd(error)),
        (0, None) => Ok(None),
        (1, _) => Ok(values.pop()),
        _ => Ok(Some(Value::Array(values))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LISTING: &str = r##"
        <html><body>
          <span class="count">( 1 - 24 de 75 )</span>
          <div class="card"><a class="link" href="/leche-entera/p?sku=11&amp;utm=x"><span class="title">Leche   entera</span></a></div>
          <div class="card"><a class="link" href="https://shop.test/pan/p">Pan</a></div>
          <div class="card"><a class="link" href="#">Broken</a></div>
          <div class="card"><span class="title">No link</span></div>
        </body></html>
    "##;

    const PAGE_URL: &str = "https://shop.test/almacen?page=0";

    fn parser(counter: Option<&str>) -> ListingParser {
        ListingParser::new(&ListingSelectors {
            item: "div.card".into(),
            link: Some("a.link".into()),
            name: Some(".title".into()),
            counter_pattern: counter.map(str::to_string),
        })
        .unwrap()
    }

    #[test]
    fn extracts_absolute_locators_and_names() {
        let page = parser(None).parse(LISTING, PAGE_URL).unwrap();

        assert_eq!(
            page.items,
            vec![
                ListingItem::new("https://shop.test/leche-entera/p?sku=11&utm=x", "Leche entera"),
                ListingItem::new("https://shop.test/pan/p", "Pan"),
            ]
        );
        assert_eq!((page.shown_so_far, page.total), (None, None));
    }

    #[test]
    fn reads_counters_from_named_groups() {
        let page = parser(Some(crate::infrastructure::config::defaults::COUNTER_PATTERN))
            .parse(LISTING, PAGE_URL)
            .unwrap();
        assert_eq!(page.shown_so_far, Some(24));
        assert_eq!(page.total, Some(75));
    }

    #[test]
    fn rejects_invalid_selector() {
        let result = ListingParser::new(&ListingSelectors {
            item: "div[".into(),
            link: None,
            name: None,
            counter_pattern: None,
        });
        assert!(matches!(result, Err(ParsingError::InvalidSelector { .. })));
        assert!(matches!(
            parser(None).parse(LISTING, "not a url"),
            Err(ParsingError::InvalidPageUrl { .. })
        ));
    }

    #[test]
    fn json_ld_single_and_multiple_blocks() {
        let single = r#"<script type="application/ld+json">{"@type":"Product","sku":"1"}</script>"#;
        assert_eq!(extract_json_ld(single).unwrap(), Some(json!({"@type": "Product", "sku": "1"})));

        let multiple = r#"
            <script type="application/ld+json">{"@type":"BreadcrumbList"}</script>
            <script type="application/ld+json">{ broken </script>
            <script type="application/ld+json">{"@type":"Product"}</script>"#;
        assert_eq!(
            extract_json_ld(multiple).unwrap(),
            Some(json!([{"@type": "BreadcrumbList"}, {"@type": "Product"}]))
        );
    }

    #[test]
    fn json_ld_missing_or_broken() {
        assert_eq!(extract_json_ld("<html><p>nothing</p></html>").unwrap(), None);
        assert!(matches!(
            extract_json_ld(r#"<script type="application/ld+json">{oops</script>"#),
            Err(ParsingError::InvalidJsonLd(_))
        ));
    }
}
