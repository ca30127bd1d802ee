//! Application layer
//!
//! Orchestrates the crawling and delivery engines into the runs exposed by
//! the command line.

pub mod pipeline;

pub use pipeline::{Collaborators, HarvestPipeline, HarvestReport, ImportReport, RunSummary, StepResult, StepStatus};
