//! NDJSON input reader

use crate::error::EtlError;
use crate::schema::RawRecord;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Records decoded from an input stream
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    pub records: Vec<RawRecord>,
    /// Non-blank lines that were not a JSON object
    pub malformed_lines: usize,
}

/// Read newline-delimited JSON objects.
///
/// Blank lines are skipped. Lines that are not UTF-8, not valid JSON, or JSON but
/// not an object are counted and dropped; only I/O failures are errors.
pub fn read_ndjson<R: BufRead>(mut reader: R) -> Result<ReadOutcome, EtlError> {
    let mut outcome = ReadOutcome::default();
    let mut buffer = Vec::new();
    let mut line_num = 0usize;

    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        line_num += 1;

        let record = match std::str::from_utf8(&buffer) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => serde_json::from_str::<serde_json::Value>(line.trim())
                .ok()
                .and_then(RawRecord::from_value),
            Err(_) => None,
        };

        match record {
            Some(record) => outcome.records.push(record),
            None => {
                debug!(line = line_num, "skipping malformed input line");
                outcome.malformed_lines += 1;
            }
        }
    }

    Ok(outcome)
}

/// Read NDJSON from a file path, or stdin when the path is `-`
pub fn read_ndjson_path(path: &Path) -> Result<ReadOutcome, EtlError> {
    let outcome = if path.to_string_lossy() == "-" {
        read_ndjson(io::stdin().lock())?
    } else {
        read_ndjson(BufReader::new(File::open(path)?))?
    };

    info!(
        input = %path.display(),
        records = outcome.records.len(),
        malformed = outcome.malformed_lines,
        "input read"
    );
    Ok(outcome)
}
