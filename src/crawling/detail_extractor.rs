//! Detail extractor
//!
//! Turns one discovered item into either a [`NormalizedRecord`] or a
//! [`DiscardRecord`]. Nothing here returns an error to the caller: every
//! fault of the detail source is classified into a discard reason.

use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::domain::{
    DetailSource, DiscardReason, DiscardRecord, DiscoveryEntry, NormalizedRecord, RecordDraft, RecordError,
    SourceError,
};

/// Identifier fields, most specific first
const IDENTIFIER_FIELDS: [&str; 4] = ["gtin13", "gtin", "sku", "productID"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSettings {
    /// Lower bound of the random pause before each fetch
    pub delay_min: Duration,
    /// Upper bound of the random pause before each fetch
    pub delay_max: Duration,
    /// Currency used when an offer does not name one
    pub default_currency: String,
    /// Store identifier stamped on every record
    pub store_id: Option<String>,
    /// Carry every discovered category, not only the first one
    pub keep_all_categories: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            delay_min: Duration::from_millis(1500),
            delay_max: Duration::from_millis(3000),
            default_currency: "UYU".to_string(),
            store_id: None,
            keep_all_categories: false,
        }
    }
}

impl ExtractionSettings {
    fn jittered_delay(&self) -> Duration {
        let min = self.delay_min.as_millis();
        let max = self.delay_max.as_millis().max(min);
        let millis = if max == min {
            min
        } else {
            u128::from(fastrand::u64(0..=u64::try_from(max - min).unwrap_or(u64::MAX))) + min
        };
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

pub struct DetailExtractor {
    source: Arc<dyn DetailSource>,
    settings: ExtractionSettings,
}

impl DetailExtractor {
    pub fn new(source: Arc<dyn DetailSource>, settings: ExtractionSettings) -> Self {
        Self { source, settings }
    }

    /// Fetch, parse and validate one item
    pub async fn extract(&self, entry: &DiscoveryEntry) -> Result<NormalizedRecord, DiscardRecord> {
        let delay = self.settings.jittered_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let category = entry.primary_category().unwrap_or_default();
        let discard = |reason: DiscardReason| {
            debug!("Discarding {}: {}", entry.key, reason);
            DiscardRecord::new(entry.key.clone(), reason, category)
        };

        let payload = match self.source.fetch_detail(entry.key.as_str()).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Err(discard(DiscardReason::NoStructuredData)),
            Err(SourceError::Parse(detail)) => return Err(discard(DiscardReason::ParseError(detail))),
            Err(e) => return Err(discard(DiscardReason::TransportError(e.to_string()))),
        };

        build_record(&payload, entry, &self.settings).map_err(discard)
    }
}

/// Map a structured payload onto a record for `entry`
pub fn build_record(
    payload: &Value,
    entry: &DiscoveryEntry,
    settings: &ExtractionSettings,
) -> Result<NormalizedRecord, DiscardReason> {
    let product = find_product_node(payload).ok_or(DiscardReason::NoStructuredData)?;
    trace!("Product node for {}: {:?}", entry.key, product.keys().collect::<Vec<_>>());

    let offer = product.get("offers").and_then(find_offer);

    let mut categories = entry.categories.iter();
    let primary = categories.next().cloned();
    let other_categories = if settings.keep_all_categories {
        categories.cloned().collect()
    } else {
        Vec::new()
    };

    let draft = RecordDraft {
        identifier: IDENTIFIER_FIELDS
            .iter()
            .find_map(|field| product.get(*field).and_then(scalar_text)),
        name: product
            .get("name")
            .and_then(scalar_text)
            .or_else(|| Some(entry.display_name.clone())),
        description: product
            .get("description")
            .and_then(Value::as_str)
            .map(collapse_whitespace),
        brand: product.get("brand").and_then(named_text),
        price: offer.and_then(offer_price).cloned(),
        currency: offer
            .and_then(|o| o.get("priceCurrency"))
            .and_then(scalar_text)
            .or_else(|| Some(settings.default_currency.clone())),
        store_id: settings.store_id.clone(),
        image_url: product.get("image").and_then(image_url),
        category: primary,
        other_categories,
        source_url: Some(entry.key.as_str().to_string()),
    };

    NormalizedRecord::try_from(draft).map_err(|e| match e {
        RecordError::MissingPrice => DiscardReason::MissingPrice,
        RecordError::MissingIdentifier => DiscardReason::MissingIdentifier,
    })
}

/// Locate the first `Product` node in a JSON-LD payload, looking through
/// top-level arrays and `@graph` containers
fn find_product_node(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Array(items) => items.iter().find_map(find_product_node),
        Value::Object(map) if is_product(map) => Some(map),
        Value::Object(map) => map.get("@graph").and_then(find_product_node),
        _ => None,
    }
}

fn is_product(map: &Map<String, Value>) -> bool {
    match map.get("@type") {
        Some(Value::String(t)) => t == "Product",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("Product")),
        _ => false,
    }
}

/// First offer-like object carrying a price. Handles a plain offer, a list
/// of offers and an aggregate offer wrapping a nested `offers` list.
fn find_offer(offers: &Value) -> Option<&Map<String, Value>> {
    match offers {
        Value::Array(items) => items.iter().find_map(find_offer),
        Value::Object(map) if offer_price(map).is_some() => Some(map),
        Value::Object(map) => map.get("offers").and_then(find_offer),
        _ => None,
    }
}

fn offer_price(offer: &Map<String, Value>) -> Option<&Value> {
    ["price", "lowPrice"]
        .iter()
        .find_map(|field| offer.get(*field).filter(|v| !v.is_null()))
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Brand and similar fields: plain text or an object with `name`
fn named_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => map.get("name").and_then(scalar_text),
        Value::Array(items) => items.iter().find_map(named_text),
        other => scalar_text(other),
    }
}

/// Image: URL string, list of URLs, or an `ImageObject`
fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => scalar_text(value),
        Value::Array(items) => items.iter().find_map(image_url),
        Value::Object(map) => map.get("url").or_else(|| map.get("contentUrl")).and_then(scalar_text),
        _ => None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::normalize;
    use crate::test_utils::{StaticDetailSource, product_payload};
    use rstest::rstest;
    use serde_json::json;

    const URL: &str = "https://shop.test/p/arroz?sku=1";

    fn entry() -> DiscoveryEntry {
        let mut entry = DiscoveryEntry::new(normalize(URL).unwrap(), "Arroz (listado)", "almacen");
        entry.add_category("ofertas");
        entry
    }

    fn settings() -> ExtractionSettings {
        ExtractionSettings {
            delay_min: Duration::ZERO,
            delay_max: Duration::ZERO,
            store_id: Some("210000000012".into()),
            ..ExtractionSettings::default()
        }
    }

    fn extractor(source: StaticDetailSource) -> DetailExtractor {
        DetailExtractor::new(Arc::new(source), settings())
    }

    #[tokio::test]
    async fn builds_record_from_product_payload() {
        let source = StaticDetailSource::new().with(URL, Ok(Some(product_payload("SKU1", "199.99"))));

        let record = extractor(source).extract(&entry()).await.unwrap();

        assert!((record.price() - 199.99).abs() < f64::EPSILON);
        assert_eq!(record.identifier(), "SKU1");
        assert_eq!(record.category.as_deref(), Some("almacen"));
        assert!(record.other_categories.is_empty());
        assert_eq!(record.store_id.as_deref(), Some("210000000012"));
        assert_eq!(record.source_url.as_deref(), Some(URL));
    }

    #[tokio::test]
    async fn payload_without_price_is_discarded() {
        let payload = json!({"@type": "Product", "sku": "SKU1", "offers": {"@type": "Offer"}});
        let source = StaticDetailSource::new().with(URL, Ok(Some(payload)));

        let discard = extractor(source).extract(&entry()).await.unwrap_err();

        assert_eq!(discard.reason, DiscardReason::MissingPrice);
        assert_eq!(discard.category, "almacen");
        assert_eq!(discard.key.as_str(), URL);
    }

    #[rstest]
    #[case(Ok(None), DiscardReason::NoStructuredData)]
    #[case(Ok(Some(json!({"@type": "BreadcrumbList"}))), DiscardReason::NoStructuredData)]
    #[case(Err(SourceError::parse("bad json-ld")), DiscardReason::ParseError("bad json-ld".into()))]
    #[case(
        Err(SourceError::transport("timed out")),
        DiscardReason::TransportError("transport error: timed out".into())
    )]
    #[case(
        Err(SourceError::Status { status: 503, url: URL.into() }),
        DiscardReason::TransportError(format!("unexpected status 503 from {URL}"))
    )]
    #[case(
        Ok(Some(json!({"@type": "Product", "offers": {"price": "10"}}))),
        DiscardReason::MissingIdentifier
    )]
    #[case(
        Ok(Some(json!({"@type": "Product", "sku": "A", "offers": {"price": "gratis"}}))),
        DiscardReason::MissingPrice
    )]
    #[case(
        Ok(Some(json!({"@type": "Product", "sku": "A", "offers": {"price": -3}}))),
        DiscardReason::MissingPrice
    )]
    #[tokio::test]
    async fn classifies_failures(#[case] response: Result<Option<Value>, SourceError>, #[case] expected: DiscardReason) {
        let source = StaticDetailSource::new().with(URL, response);
        let discard = extractor(source).extract(&entry()).await.unwrap_err();
        assert_eq!(discard.reason, expected);
    }

    #[test]
    fn reads_nested_shapes() {
        let payload = json!([
            {"@type": "BreadcrumbList"},
            {
                "@graph": [{
                    "@type": ["Product", "Thing"],
                    "gtin13": 7_730_000_000_017_u64,
                    "sku": "ignored",
                    "name": "  Yerba 1kg ",
                    "description": "Yerba\nmate\r\n  tradicional ",
                    "brand": {"@type": "Brand", "name": "Canarias"},
                    "image": [{"@type": "ImageObject", "url": "https://cdn.test/y.jpg"}],
                    "offers": {
                        "@type": "AggregateOffer",
                        "offers": [{"@type": "Offer", "lowPrice": "$ 1.299,00", "priceCurrency": "UYU"}]
                    }
                }]
            }
        ]);

        let record = build_record(&payload, &entry(), &settings()).unwrap();

        assert_eq!(record.identifier(), "7730000000017");
        assert_eq!(record.name.as_deref(), Some("Yerba 1kg"));
        assert_eq!(record.description.as_deref(), Some("Yerba mate tradicional"));
        assert_eq!(record.brand.as_deref(), Some("Canarias"));
        assert_eq!(record.image_url.as_deref(), Some("https://cdn.test/y.jpg"));
        assert!((record.price() - 1299.0).abs() < f64::EPSILON);
        assert_eq!(record.currency.as_deref(), Some("UYU"));
    }

    #[test]
    fn falls_back_to_listing_name_and_default_currency() {
        let payload = json!({"@type": "Product", "productID": "P-9", "offers": [{"price": 5}]});
        let record = build_record(&payload, &entry(), &settings()).unwrap();

        assert_eq!(record.identifier(), "P-9");
        assert_eq!(record.name.as_deref(), Some("Arroz (listado)"));
        assert_eq!(record.currency.as_deref(), Some("UYU"));
    }

    #[test]
    fn keeps_other_categories_when_enabled() {
        let settings = ExtractionSettings {
            keep_all_categories: true,
            ..settings()
        };
        let record = build_record(&product_payload("S", "1"), &entry(), &settings).unwrap();

        assert_eq!(record.category.as_deref(), Some("almacen"));
        assert_eq!(record.other_categories, vec!["ofertas"]);
    }

    #[test]
    fn jittered_delay_stays_in_range() {
        let settings = ExtractionSettings {
            delay_min: Duration::from_millis(10),
            delay_max: Duration::from_millis(20),
            ..ExtractionSettings::default()
        };
        for _ in 0..100 {
            let delay = settings.jittered_delay();
            assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(20));
        }
    }
}
