//! Date-partitioned dataset writer
//!
//! Each dataset lives under `<base>/<dataset>/dt=YYYY-MM-DD/part-00000.ndjson`.
//! Partitions are written to staging directories first and then swapped in, so a
//! rerun replaces each partition wholesale and a failed write never leaves a
//! half-written partition behind. Partitions for dates absent from the run are
//! left untouched.

use crate::error::EtlError;
use crate::pipeline::PipelineOutput;
use crate::types::PartitionedRow;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const EVENTS_CLEAN: &str = "events_clean";
pub const SESSIONS: &str = "sessions";
pub const DAILY_METRICS: &str = "daily_metrics";
pub const FUNNEL_METRICS: &str = "funnel_metrics";

/// File name of the single part inside each partition
const PART_FILE: &str = "part-00000.ndjson";

/// What was written for one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub dataset: String,
    pub path: PathBuf,
    pub partitions: usize,
    pub rows: usize,
}

/// Writes datasets below a base directory
pub struct PartitionWriter {
    base: PathBuf,
}

impl PartitionWriter {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Directory of one date partition
    pub fn partition_dir(&self, dataset: &str, dt: NaiveDate) -> PathBuf {
        self.base.join(dataset).join(format!("dt={dt}"))
    }

    /// Write all four datasets of a run.
    ///
    /// Every partition of every dataset is staged before any is swapped in, so a
    /// failed write leaves all four datasets as they were.
    pub fn write_all(&self, output: &PipelineOutput) -> Result<Vec<DatasetSummary>, EtlError> {
        let mut staged = Vec::with_capacity(4);
        let results = [
            self.stage_dataset(EVENTS_CLEAN, &output.events_clean),
            self.stage_dataset(SESSIONS, &output.sessions),
            self.stage_dataset(DAILY_METRICS, &output.daily_metrics),
            self.stage_dataset(FUNNEL_METRICS, &output.funnel_metrics),
        ];
        let mut failure = None;
        for result in results {
            match result {
                Ok(dataset) => staged.push(dataset),
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure {
            staged.into_iter().for_each(StagedDataset::discard);
            return Err(e);
        }

        staged.into_iter().map(StagedDataset::commit).collect()
    }

    /// Replace every partition that has at least one row in `rows`
    pub fn write_dataset<T: PartitionedRow>(
        &self,
        dataset: &str,
        rows: &[T],
    ) -> Result<DatasetSummary, EtlError> {
        self.stage_dataset(dataset, rows)?.commit()
    }

    /// Write every partition of a dataset to its staging directory
    fn stage_dataset<T: PartitionedRow>(
        &self,
        dataset: &str,
        rows: &[T],
    ) -> Result<StagedDataset, EtlError> {
        let mut by_date: BTreeMap<NaiveDate, Vec<&T>> = BTreeMap::new();
        for row in rows {
            by_date.entry(row.partition_date()).or_default().push(row);
        }

        let dataset_dir = self.base.join(dataset);
        fs::create_dir_all(&dataset_dir).map_err(|e| output_error(dataset, &dataset_dir, e))?;

        let mut staged = StagedDataset {
            summary: DatasetSummary {
                dataset: dataset.to_string(),
                path: dataset_dir.clone(),
                partitions: by_date.len(),
                rows: rows.len(),
            },
            partitions: Vec::with_capacity(by_date.len()),
        };

        for (dt, partition_rows) in &by_date {
            let staging = dataset_dir.join(format!(".dt={dt}.staging-{}", Uuid::new_v4()));
            if let Err(e) = write_part(&staging, partition_rows) {
                let _ = fs::remove_dir_all(&staging);
                staged.discard();
                return Err(match e {
                    EtlError::Io(io) => output_error(dataset, &staging, io),
                    other => other,
                });
            }
            staged.partitions.push(StagedPartition {
                dt: *dt,
                staging,
                target: self.partition_dir(dataset, *dt),
                rows: partition_rows.len(),
            });
        }

        Ok(staged)
    }
}

/// A partition written to staging, waiting to replace its target
struct StagedPartition {
    dt: NaiveDate,
    staging: PathBuf,
    target: PathBuf,
    rows: usize,
}

struct StagedDataset {
    summary: DatasetSummary,
    partitions: Vec<StagedPartition>,
}

impl StagedDataset {
    /// Swap every staged partition into place
    fn commit(self) -> Result<DatasetSummary, EtlError> {
        let dataset = self.summary.dataset.as_str();
        for partition in &self.partitions {
            if partition.target.exists() {
                fs::remove_dir_all(&partition.target)
                    .map_err(|e| output_error(dataset, &partition.target, e))?;
            }
            fs::rename(&partition.staging, &partition.target)
                .map_err(|e| output_error(dataset, &partition.target, e))?;
            debug!(dataset, dt = %partition.dt, rows = partition.rows, "partition replaced");
        }

        info!(
            dataset,
            partitions = self.summary.partitions,
            rows = self.summary.rows,
            "dataset written"
        );
        Ok(self.summary)
    }

    /// Remove staged partitions without touching their targets
    fn discard(self) {
        for partition in &self.partitions {
            let _ = fs::remove_dir_all(&partition.staging);
        }
    }
}

fn write_part<T: Serialize>(dir: &Path, rows: &[&T]) -> Result<(), EtlError> {
    fs::create_dir_all(dir)?;
    let mut out = BufWriter::new(File::create(dir.join(PART_FILE))?);
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn output_error(dataset: &str, path: &Path, e: std::io::Error) -> EtlError {
    EtlError::OutputError {
        dataset: dataset.to_string(),
        message: format!("{}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DailyMetric;

    fn make_metric(day: u32, events: u64) -> DailyMetric {
        DailyMetric {
            dt: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            dau: 1,
            events,
            purchases: 0,
            checkouts: 0,
            add_to_carts: 0,
            views: events,
            checkout_rate: Some(0.0),
            purchase_rate: Some(0.0),
        }
    }

    fn read_part(writer: &PartitionWriter, day: u32) -> Vec<serde_json::Value> {
        let dt = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let path = writer.partition_dir(DAILY_METRICS, dt).join(PART_FILE);
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_writes_one_directory_per_date() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(dir.path());

        let summary = writer
            .write_dataset(DAILY_METRICS, &[make_metric(15, 3), make_metric(16, 4)])
            .unwrap();

        assert_eq!(summary.partitions, 2);
        assert_eq!(summary.rows, 2);
        assert!(dir.path().join("daily_metrics/dt=2024-01-15").is_dir());
        assert_eq!(read_part(&writer, 16)[0]["events"], 4);
    }

    #[test]
    fn test_rerun_replaces_partition_and_keeps_others() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(dir.path());

        writer
            .write_dataset(DAILY_METRICS, &[make_metric(15, 3), make_metric(16, 4)])
            .unwrap();
        writer
            .write_dataset(DAILY_METRICS, &[make_metric(15, 9)])
            .unwrap();

        let day_15 = read_part(&writer, 15);
        assert_eq!(day_15.len(), 1);
        assert_eq!(day_15[0]["events"], 9);
        assert_eq!(read_part(&writer, 16)[0]["events"], 4);

        // no staging directories left behind
        let leftovers = fs::read_dir(dir.path().join(DAILY_METRICS))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains("staging"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_failed_dataset_leaves_every_dataset_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(dir.path());
        writer
            .write_dataset(DAILY_METRICS, &[make_metric(15, 3)])
            .unwrap();

        // a plain file where the funnel dataset directory should be
        fs::write(dir.path().join(FUNNEL_METRICS), b"not a directory").unwrap();

        let output = PipelineOutput {
            daily_metrics: vec![make_metric(15, 9), make_metric(16, 1)],
            ..PipelineOutput::default()
        };
        let result = writer.write_all(&output);

        assert!(matches!(result, Err(EtlError::OutputError { .. })));
        assert_eq!(read_part(&writer, 15)[0]["events"], 3);
        let daily_entries: Vec<String> = fs::read_dir(dir.path().join(DAILY_METRICS))
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(daily_entries, vec!["dt=2024-01-15".to_string()]);
    }

    #[test]
    fn test_empty_dataset_creates_directory_only() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(dir.path());

        let summary = writer
            .write_dataset::<DailyMetric>(DAILY_METRICS, &[])
            .unwrap();

        assert_eq!(summary.partitions, 0);
        assert!(dir.path().join(DAILY_METRICS).is_dir());
    }
}
