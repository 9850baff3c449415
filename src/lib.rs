//! Clickstream Flux - Batch compute engine for curated clickstream datasets
//!
//! Flux turns raw NDJSON clickstream events into four date-partitioned datasets
//! through a deterministic pipeline: cleaning → deduplication → sessionization
//! → daily metrics and referrer funnels.
//!
//! ## Modules
//!
//! - **Pipeline**: `EtlPipeline` orchestrates every stage over decoded input
//! - **Storage**: NDJSON input reading and partition-replacing dataset writes
//! - **Generator**: Synthetic fixtures in the accepted input format

pub mod cleaner;
pub mod config;
pub mod dedup;
pub mod error;
pub mod generator;
pub mod io;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod schema;
pub mod sessionizer;
pub mod telemetry;
pub mod types;

pub use config::PipelineConfig;
pub use error::EtlError;
pub use pipeline::{clickstream_to_datasets, EtlPipeline, PipelineOutput, RunStats, RunSummary};

// Schema exports
pub use schema::{RawRecord, SCHEMA_VERSION};

/// Flux version reported by the CLI
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in run summaries
pub const PRODUCER_NAME: &str = "clickstream-flux";
