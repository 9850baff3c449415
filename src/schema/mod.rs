//! Clickstream input schema
//!
//! This module defines the untyped record shape read from NDJSON input and the
//! list of fields every record is expected to carry.

mod raw_record;

pub use raw_record::*;
