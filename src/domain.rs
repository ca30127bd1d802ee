//! Domain module - core types and collaborator contracts
//!
//! Everything here is free of I/O. Crawling and delivery components are
//! built on these types; concrete sources and sinks live in infrastructure.
//!
//! Each module is its own file in the domain/ directory and the commonly
//! used items are re-exported here.

pub mod batch;
pub mod canonical_key;
pub mod discard;
pub mod discovery;
pub mod product;
pub mod services;

pub use batch::Batch;
pub use canonical_key::{CanonicalKey, normalize};
pub use discard::{DiscardReason, DiscardRecord};
pub use discovery::DiscoveryEntry;
pub use product::{NormalizedRecord, RecordDraft, RecordError};
pub use services::{
    DetailSource, IngestionSink, ListingItem, ListingPage, ListingSource, SinkError, SourceError,
};
