//! Storage boundary
//!
//! NDJSON in, date-partitioned NDJSON out. Failures here are fatal for the run;
//! nothing in this module interprets record contents.

pub mod reader;
pub mod writer;

pub use reader::{read_ndjson, read_ndjson_path, ReadOutcome};
pub use writer::{DatasetSummary, PartitionWriter};
