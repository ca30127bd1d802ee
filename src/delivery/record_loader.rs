//! Import file loading and validation
//!
//! A standalone import reads records produced by an earlier harvest (or by
//! any other tool) from a JSON array file or a directory of them. Each raw
//! object is checked for the mandatory fields before it may be dispatched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::{NormalizedRecord, RecordDraft};
use crate::infrastructure::json_store::{self, StoreResult};

const INVALID_SUFFIX: &str = "_errores.json";

/// Validation failure codes written next to invalid records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationCode {
    #[serde(rename = "SIN_NOMBRE")]
    MissingName,
    #[serde(rename = "SIN_PRECIO")]
    MissingPrice,
    #[serde(rename = "SIN_CATEGORIA")]
    MissingCategory,
    #[serde(rename = "SIN_EAN")]
    MissingIdentifier,
    #[serde(rename = "FORMATO_INVALIDO")]
    Malformed,
}

/// Raw object that failed validation, with the reasons attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidRecord {
    #[serde(flatten)]
    pub raw: serde_json::Map<String, Value>,
    #[serde(rename = "_errores")]
    pub errors: Vec<ValidationCode>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    pub valid: Vec<NormalizedRecord>,
    pub invalid: Vec<InvalidRecord>,
    /// Files that were unreadable or not JSON arrays
    pub skipped_files: Vec<PathBuf>,
}

/// Check one raw object against the import rules
pub fn validate(raw: &Value) -> Result<NormalizedRecord, Vec<ValidationCode>> {
    let Ok(draft) = RecordDraft::deserialize(raw) else {
        return Err(vec![ValidationCode::Malformed]);
    };

    let mut errors = Vec::new();
    if is_blank(draft.name.as_deref()) {
        errors.push(ValidationCode::MissingName);
    }
    if draft.parsed_price().is_none() {
        errors.push(ValidationCode::MissingPrice);
    }
    if is_blank(draft.category.as_deref()) {
        errors.push(ValidationCode::MissingCategory);
    }
    if !draft.has_identifier() {
        errors.push(ValidationCode::MissingIdentifier);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    NormalizedRecord::try_from(draft).map_err(|_| vec![ValidationCode::Malformed])
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Load and validate every record under `path` (a file or a directory of
/// `*.json` files).
///
/// In a directory, earlier `_errores` outputs and any file named in
/// `ignored` (discard ledgers, dispatch logs) are not read.
pub async fn load_records(path: &Path, ignored: &[String]) -> StoreResult<LoadedRecords> {
    let files = if tokio::fs::metadata(path)
        .await
        .map_err(|e| json_store::StoreError::io(path, e))?
        .is_dir()
    {
        json_store::list_json_files(path)
            .await?
            .into_iter()
            .filter(|f| !f.to_string_lossy().ends_with(INVALID_SUFFIX))
            .filter(|f| {
                f.file_name()
                    .is_none_or(|name| !ignored.iter().any(|i| name == i.as_str()))
            })
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    let mut loaded = LoadedRecords::default();
    for file in files {
        let items = match json_store::read_json::<Value>(&file).await {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("{} is not a JSON array, skipping", file.display());
                loaded.skipped_files.push(file);
                continue;
            }
            Err(e) => {
                warn!("Skipping unreadable import file: {}", e);
                loaded.skipped_files.push(file);
                continue;
            }
        };

        let before = loaded.valid.len();
        for item in items {
            match validate(&item) {
                Ok(record) => loaded.valid.push(record),
                Err(errors) => loaded.invalid.push(InvalidRecord {
                    raw: match item {
                        Value::Object(map) => map,
                        other => {
                            let mut map = serde_json::Map::new();
                            map.insert("value".to_string(), other);
                            map
                        }
                    },
                    errors,
                }),
            }
        }
        info!("Loaded {} valid records from {}", loaded.valid.len() - before, file.display());
    }

    Ok(loaded)
}

/// Path of the invalid-record file for an import source: `<stem>_errores.json`
pub fn invalid_records_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map_or_else(|| "import".into(), |s| s.to_string_lossy().into_owned());
    let dir = if source.extension().is_some() {
        source.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        source.to_path_buf()
    };
    dir.join(format!("{stem}{INVALID_SUFFIX}"))
}
