//! Gene Set Enrichment Analysis pipeline.
//!
//! A compute invocation validates its input files, remaps probe identifiers,
//! runs the permutation engine and saves the analysis to a checkpoint; later
//! plot invocations restore that checkpoint and render charts from it.
pub mod algorithm;
pub mod checkpoint;
pub mod compute;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod plot;
pub mod remap;
pub mod stats;
pub mod units;
pub mod utils;
pub mod validate;

pub use checkpoint::AnalysisState;
pub use engine::{
    AnalysisMode, EngineParams, EnrichmentEngine, EnrichmentResult, PermutationEngine, ResultRecord,
    TermResult,
};
pub use error::{GseaError, Result, ValidationError};
pub use utils::Metric;
