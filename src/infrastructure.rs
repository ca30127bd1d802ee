//! Infrastructure layer: configuration, logging, HTTP, parsing and storage
//!
//! Concrete implementations of the domain's collaborator traits live here,
//! next to the ambient services the rest of the crate relies on.

pub mod config;
pub mod http_client;
pub mod json_store;
pub mod logging;
pub mod parsing;
pub mod sources;

pub use config::{AppConfig, ConfigError, ConfigManager};
pub use http_client::{HttpClient, HttpClientConfig};
pub use json_store::{StoreError, StoreResult};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use parsing::{ListingParser, ListingSelectors, ParsingError, ParsingResult, extract_json_ld};
pub use sources::{HtmlListingSource, JsonLdDetailSource};
