//! Normalized product records
//!
//! [`NormalizedRecord`] is the unit delivered to the ingestion endpoint. It can
//! only be built from a [`RecordDraft`] carrying both an identifier and a
//! non-negative price, and that check also runs when records are read back
//! from disk.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Why a draft could not become a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("price is missing or not a non-negative number")]
    MissingPrice,

    #[error("identifier is missing")]
    MissingIdentifier,
}

/// Validated record in the ingestion wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordDraft")]
pub struct NormalizedRecord {
    #[serde(rename = "productEan")]
    identifier: String,

    #[serde(rename = "productName")]
    pub name: Option<String>,

    #[serde(rename = "productDescription")]
    pub description: Option<String>,

    #[serde(rename = "productBrand")]
    pub brand: Option<String>,

    #[serde(rename = "productPrice")]
    price: f64,

    #[serde(rename = "moneda")]
    pub currency: Option<String>,

    /// Sent as a JSON number when it is all digits
    #[serde(rename = "storeRut", serialize_with = "numeric_when_possible")]
    pub store_id: Option<String>,

    #[serde(rename = "productImageUrl")]
    pub image_url: Option<String>,

    /// Primary category label
    #[serde(rename = "categoryName")]
    pub category: Option<String>,

    #[serde(rename = "otherCategories", skip_serializing_if = "Vec::is_empty")]
    pub other_categories: Vec<String>,

    #[serde(rename = "urlProduct")]
    pub source_url: Option<String>,
}

impl NormalizedRecord {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub const fn price(&self) -> f64 {
        self.price
    }
}

/// Unvalidated record fields, as scraped or as read from an import file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    #[serde(rename = "productEan", alias = "idWeb", default, deserialize_with = "lenient_string")]
    pub identifier: Option<String>,

    #[serde(rename = "productName", default)]
    pub name: Option<String>,

    #[serde(rename = "productDescription", default)]
    pub description: Option<String>,

    #[serde(rename = "productBrand", default)]
    pub brand: Option<String>,

    /// Raw price as found: number or text
    #[serde(rename = "productPrice", default)]
    pub price: Option<Value>,

    #[serde(rename = "moneda", default)]
    pub currency: Option<String>,

    #[serde(rename = "storeRut", default, deserialize_with = "lenient_string")]
    pub store_id: Option<String>,

    #[serde(rename = "productImageUrl", default)]
    pub image_url: Option<String>,

    #[serde(rename = "categoryName", default)]
    pub category: Option<String>,

    #[serde(rename = "otherCategories", default, skip_serializing_if = "Vec::is_empty")]
    pub other_categories: Vec<String>,

    #[serde(rename = "urlProduct", default)]
    pub source_url: Option<String>,
}

impl RecordDraft {
    pub fn parsed_price(&self) -> Option<f64> {
        self.price.as_ref().and_then(parse_price)
    }

    pub fn has_identifier(&self) -> bool {
        self.identifier.as_deref().is_some_and(|id| !id.trim().is_empty())
    }
}

impl TryFrom<RecordDraft> for NormalizedRecord {
    type Error = RecordError;

    fn try_from(draft: RecordDraft) -> Result<Self, Self::Error> {
        // Price is checked first so a record missing both reports the price.
        let price = draft.parsed_price().ok_or(RecordError::MissingPrice)?;
        let identifier = draft
            .identifier
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(RecordError::MissingIdentifier)?;

        Ok(Self {
            identifier,
            name: non_empty(draft.name),
            description: non_empty(draft.description),
            brand: non_empty(draft.brand),
            price,
            currency: non_empty(draft.currency),
            store_id: non_empty(draft.store_id),
            image_url: non_empty(draft.image_url),
            category: non_empty(draft.category),
            other_categories: draft.other_categories,
            source_url: non_empty(draft.source_url),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accept identifiers published as JSON numbers as well as strings
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[allow(clippy::ref_option)]
fn numeric_when_possible<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let number = value
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok().filter(|n| n.to_string() == v));
    match (number, value) {
        (Some(n), _) => serializer.serialize_u64(n),
        (None, Some(v)) => serializer.serialize_str(v),
        (None, None) => serializer.serialize_none(),
    }
}

/// Parse a price published as a JSON number or as text.
///
/// Text may carry a currency prefix (`$`, `U$S`, `UYU`) and either `.` or
/// `,` as decimal separator. Negative and non-finite values yield `None`.
pub fn parse_price(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price_text(s),
        _ => None,
    }?;

    (parsed.is_finite() && parsed >= 0.0).then_some(parsed)
}

fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let canonical = match (last_dot, last_comma) {
        // Both present: the rightmost one is the decimal separator.
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(comma)) => {
            let decimals = cleaned.len() - comma - 1;
            if cleaned.matches(',').count() == 1 && decimals <= 2 {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (Some(_), None) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    canonical.parse::<f64>().ok()
}
