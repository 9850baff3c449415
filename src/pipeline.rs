//! Pipeline orchestration
//!
//! This module provides the public API for Clickstream Flux. It runs the full
//! transformation from raw NDJSON records to the four curated datasets.

use crate::cleaner::{CleanReport, EventCleaner, Rejection};
use crate::config::PipelineConfig;
use crate::dedup::Deduplicator;
use crate::error::EtlError;
use crate::io::{read_ndjson, read_ndjson_path, DatasetSummary, PartitionWriter, ReadOutcome};
use crate::metrics::{DailyAggregator, FunnelAggregator};
use crate::partition::group_by_user;
use crate::schema::RawRecord;
use crate::sessionizer::Sessionizer;
use crate::types::{CleanEventRow, DailyMetric, FunnelMetric, PartitionedRow, Session};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use tracing::{debug, info, info_span};
use uuid::Uuid;

/// Counters describing one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub raw_records: usize,
    pub accepted: usize,
    pub rejected: BTreeMap<Rejection, usize>,
    pub duplicates_dropped: usize,
    pub outside_date_range: usize,
    pub clean_events: usize,
    pub users: usize,
    pub sessions: usize,
    pub dates: usize,
}

/// Everything a run produces, before it is written
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    /// Deduplicated events, sorted by `event_id`
    pub events_clean: Vec<CleanEventRow>,
    /// Sessions, sorted by `(user_id, session_index)`
    pub sessions: Vec<Session>,
    pub daily_metrics: Vec<DailyMetric>,
    pub funnel_metrics: Vec<FunnelMetric>,
    pub stats: RunStats,
}

/// Result of a run that was written to storage
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub stats: RunStats,
    pub datasets: Vec<DatasetSummary>,
}

/// Convert NDJSON text to the curated datasets with default settings (one-shot).
///
/// # Example
/// ```ignore
/// let output = clickstream_to_datasets(ndjson)?;
/// println!("{} sessions", output.sessions.len());
/// ```
pub fn clickstream_to_datasets(ndjson: &str) -> Result<PipelineOutput, EtlError> {
    let input = read_ndjson(Cursor::new(ndjson))?;
    EtlPipeline::new(PipelineConfig::default()).map(|pipeline| pipeline.process(input))
}

/// A configured pipeline
pub struct EtlPipeline {
    config: PipelineConfig,
    sessionizer: Sessionizer,
}

impl EtlPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, EtlError> {
        config.validate()?;
        Ok(Self {
            sessionizer: Sessionizer::new(config.session_gap_minutes),
            config,
        })
    }

    /// Run every stage over decoded input.
    ///
    /// Pipeline stages:
    /// 1. EventCleaner - validate and normalize raw records
    /// 2. Deduplicator - one event per `event_id`
    /// 3. Sessionizer - per-user sessions, users in parallel
    /// 4. DailyAggregator / FunnelAggregator - per-date metrics in parallel
    /// 5. Date range - keep rows whose partition is in the configured range
    ///
    /// Dedup and sessionization always see the full input, so a run limited to
    /// a date range emits the same rows for those partitions as a full run.
    pub fn process(&self, input: ReadOutcome) -> PipelineOutput {
        let _span = info_span!("pipeline").entered();
        let workers = self.config.workers;

        // Stage 1: clean
        let (cleaned, mut clean_report) = EventCleaner::clean_all(&input.records);
        clean_report.record_malformed(input.malformed_lines);
        log_clean_report(&clean_report);

        // Stage 2: dedup
        let deduped = Deduplicator::dedup(cleaned);
        debug!(
            kept = deduped.events.len(),
            dropped = deduped.duplicates_dropped,
            "dedup complete"
        );
        let events = deduped.events;

        // Stage 3: sessionize
        let users = group_by_user(&events);
        let sessions = self.sessionizer.sessionize_all(users, workers);
        debug!(sessions = sessions.len(), "sessionization complete");

        // Stage 4: aggregate
        let daily_metrics = DailyAggregator::aggregate(&events, workers);
        let funnel_metrics = FunnelAggregator::aggregate(&events, workers);

        // Stage 5: date range
        let deduped_count = events.len();
        let events_clean = self.in_range(events.into_iter().map(CleanEventRow::from).collect());
        let sessions = self.in_range(sessions);
        let daily_metrics = self.in_range(daily_metrics);
        let funnel_metrics = self.in_range(funnel_metrics);

        let users: HashSet<&str> = events_clean
            .iter()
            .map(|row| row.event.user_id.as_str())
            .collect();

        let stats = RunStats {
            raw_records: clean_report.total(),
            accepted: clean_report.accepted,
            rejected: clean_report.rejected,
            duplicates_dropped: deduped.duplicates_dropped,
            outside_date_range: deduped_count - events_clean.len(),
            clean_events: events_clean.len(),
            users: users.len(),
            sessions: sessions.len(),
            dates: daily_metrics.len(),
        };

        info!(
            raw = stats.raw_records,
            accepted = stats.accepted,
            duplicates = stats.duplicates_dropped,
            outside_range = stats.outside_date_range,
            events = stats.clean_events,
            sessions = stats.sessions,
            dates = stats.dates,
            "pipeline complete"
        );

        PipelineOutput {
            events_clean,
            sessions,
            daily_metrics,
            funnel_metrics,
            stats,
        }
    }

    fn in_range<T: PartitionedRow>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter()
            .filter(|row| self.config.includes_date(row.partition_date()))
            .collect()
    }

    /// Convenience wrapper for records already in memory
    pub fn process_records(&self, records: Vec<RawRecord>) -> PipelineOutput {
        self.process(ReadOutcome {
            records,
            malformed_lines: 0,
        })
    }

    /// Read the configured input, process it and replace the affected partitions
    pub fn run(&self) -> Result<RunSummary, EtlError> {
        let input_path = self
            .config
            .input
            .as_deref()
            .ok_or_else(|| EtlError::InvalidConfig("input path is required".to_string()))?;
        let output_path = self
            .config
            .output
            .as_deref()
            .ok_or_else(|| EtlError::InvalidConfig("output path is required".to_string()))?;

        let run_id = Uuid::new_v4();
        info!(%run_id, input = %input_path.display(), output = %output_path.display(), "run started");

        let input = read_ndjson_path(input_path)?;
        let output = self.process(input);
        let datasets = PartitionWriter::new(output_path).write_all(&output)?;

        Ok(RunSummary {
            run_id,
            stats: output.stats,
            datasets,
        })
    }
}

fn log_clean_report(report: &CleanReport) {
    for (reason, count) in &report.rejected {
        debug!(reason = reason.as_str(), count, "records rejected");
    }
    debug!(
        accepted = report.accepted,
        rejected = report.total_rejected(),
        "cleaning complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn line(id: &str, user: &str, time: &str, event_type: &str, referrer: &str) -> String {
        serde_json::json!({
            "event_id": id,
            "user_id": user,
            "event_time": time,
            "event_type": event_type,
            "page_url": "/",
            "referrer": referrer,
            "device": "mobile",
            "country": "US"
        })
        .to_string()
    }

    fn sample_ndjson() -> String {
        [
            line("e1", "U1", "2024-01-15T10:00:00Z", "view", "google"),
            line("e2", "U1", "2024-01-15T10:10:00Z", "add_to_cart", "google"),
            line("e3", "U1", "2024-01-15T10:50:00Z", "checkout", "google"),
            line("e4", "U1", "2024-01-15T11:25:00Z", "purchase", "google"),
            // duplicate id with a different payload
            line("e4", "U1", "2024-01-15T11:26:00Z", "view", "bing"),
            line("e5", "U2", "2024-01-16T08:00:00Z", "view", "direct"),
            line("e6", "U2", "not-a-time", "view", "direct"),
            line("e7", "U2", "2024-01-16T08:05:00Z", "refund", "direct"),
            "{broken".to_string(),
        ]
        .join("\n")
    }

    #[test]
    fn test_end_to_end_datasets() {
        let output = clickstream_to_datasets(&sample_ndjson()).unwrap();

        assert_eq!(output.stats.raw_records, 9);
        assert_eq!(output.stats.accepted, 6);
        assert_eq!(output.stats.rejected[&Rejection::InvalidEventTime], 1);
        assert_eq!(output.stats.rejected[&Rejection::InvalidEventType], 1);
        assert_eq!(output.stats.rejected[&Rejection::MalformedLine], 1);
        assert_eq!(output.stats.duplicates_dropped, 1);
        assert_eq!(output.events_clean.len(), 5);

        // the earlier of the two e4 records survives
        let e4 = output
            .events_clean
            .iter()
            .find(|row| row.event.event_id == "e4")
            .unwrap();
        assert_eq!(e4.event.event_type, EventType::Purchase);

        let u1: Vec<(&str, u32)> = output
            .sessions
            .iter()
            .filter(|s| s.user_id == "U1")
            .map(|s| (s.session_id.as_str(), s.events_in_session))
            .collect();
        assert_eq!(
            u1,
            vec![("U1-000000", 2), ("U1-000001", 1), ("U1-000002", 1)]
        );
        assert_eq!(output.stats.sessions, 4);
        assert_eq!(output.stats.users, 2);

        assert_eq!(output.daily_metrics.len(), 2);
        let day_one = &output.daily_metrics[0];
        assert_eq!(day_one.dt, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(day_one.views, 1);
        assert_eq!(day_one.checkout_rate, Some(1.0));

        assert_eq!(output.funnel_metrics.len(), 2);
        assert_eq!(output.funnel_metrics[0].referrer.as_deref(), Some("google"));
        assert_eq!(output.funnel_metrics[0].users_purchase, 1);
    }

    #[test]
    fn test_every_event_belongs_to_one_session() {
        let output = clickstream_to_datasets(&sample_ndjson()).unwrap();

        let session_events: u32 = output.sessions.iter().map(|s| s.events_in_session).sum();
        assert_eq!(session_events as usize, output.events_clean.len());
    }

    #[test]
    fn test_worker_count_does_not_change_output() {
        let input = read_ndjson(Cursor::new(sample_ndjson())).unwrap();

        let serial = EtlPipeline::new(PipelineConfig::new().with_workers(1))
            .unwrap()
            .process(input.clone());
        let parallel = EtlPipeline::new(PipelineConfig::new().with_workers(6))
            .unwrap()
            .process(input);

        assert_eq!(serial.sessions, parallel.sessions);
        assert_eq!(serial.daily_metrics, parallel.daily_metrics);
        assert_eq!(serial.funnel_metrics, parallel.funnel_metrics);
        assert_eq!(serial.stats, parallel.stats);
    }

    #[test]
    fn test_date_range_filter() {
        let input = read_ndjson(Cursor::new(sample_ndjson())).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let pipeline =
            EtlPipeline::new(PipelineConfig::new().with_date_range(Some(day), Some(day))).unwrap();

        let output = pipeline.process(input);

        assert_eq!(output.stats.outside_date_range, 4);
        assert_eq!(output.events_clean.len(), 1);
        assert!(output.events_clean.iter().all(|row| row.dt == day));
        assert_eq!(output.daily_metrics.len(), 1);
    }

    #[test]
    fn test_empty_input_produces_empty_datasets() {
        let output = clickstream_to_datasets("").unwrap();

        assert!(output.events_clean.is_empty());
        assert!(output.sessions.is_empty());
        assert!(output.daily_metrics.is_empty());
        assert!(output.funnel_metrics.is_empty());
        assert_eq!(output.stats, RunStats::default());
    }

    #[test]
    fn test_process_records() {
        let record = RawRecord::default()
            .with_field("event_id", "e1")
            .with_field("user_id", "u1")
            .with_field("event_time", "2024-01-15T23:59:59Z")
            .with_field("event_type", "view");

        let output = EtlPipeline::new(PipelineConfig::default())
            .unwrap()
            .process_records(vec![record]);

        assert_eq!(output.sessions.len(), 1);
        assert_eq!(
            output.sessions[0].session_start,
            Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = EtlPipeline::new(PipelineConfig::new().with_session_gap_minutes(0));
        assert!(matches!(result, Err(EtlError::InvalidConfig(_))));
    }

    #[test]
    fn test_run_writes_all_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("events.jsonl");
        std::fs::write(&input_path, sample_ndjson()).unwrap();
        let output_path = dir.path().join("curated");

        let config = PipelineConfig::new()
            .with_input(&input_path)
            .with_output(&output_path)
            .with_workers(2);
        let summary = EtlPipeline::new(config).unwrap().run().unwrap();

        let names: Vec<&str> = summary.datasets.iter().map(|d| d.dataset.as_str()).collect();
        assert_eq!(
            names,
            vec!["events_clean", "sessions", "daily_metrics", "funnel_metrics"]
        );
        assert!(output_path
            .join("sessions/dt=2024-01-15/part-00000.ndjson")
            .is_file());
        assert!(output_path
            .join("events_clean/dt=2024-01-16/part-00000.ndjson")
            .is_file());

        // rerunning replaces rather than appends
        let rerun = EtlPipeline::new(
            PipelineConfig::new()
                .with_input(&input_path)
                .with_output(&output_path),
        )
        .unwrap()
        .run()
        .unwrap();
        assert_eq!(rerun.stats, summary.stats);
        let lines = std::fs::read_to_string(
            output_path.join("events_clean/dt=2024-01-15/part-00000.ndjson"),
        )
        .unwrap()
        .lines()
        .count();
        assert_eq!(lines, 4);
    }

    fn read_dataset(base: &std::path::Path, dataset: &str) -> Vec<(String, serde_json::Value)> {
        let mut rows = Vec::new();
        let mut partitions: Vec<_> = std::fs::read_dir(base.join(dataset))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        partitions.sort();
        for partition in partitions {
            let name = partition.file_name().unwrap().to_string_lossy().to_string();
            let content = std::fs::read_to_string(partition.join("part-00000.ndjson")).unwrap();
            for l in content.lines() {
                rows.push((name.clone(), serde_json::from_str(l).unwrap()));
            }
        }
        rows
    }

    fn assert_unique(rows: &[(String, serde_json::Value)], key: &str) {
        let mut seen = std::collections::HashSet::new();
        for (partition, row) in rows {
            let value = row[key].as_str().unwrap().to_string();
            assert!(seen.insert(value.clone()), "{key} {value} repeated in {partition}");
        }
    }

    #[test]
    fn test_date_range_rerun_keeps_keys_unique() {
        let ndjson = [
            line("a1", "U1", "2024-01-15T10:00:00Z", "view", "google"),
            line("a2", "U1", "2024-01-16T09:00:00Z", "view", "google"),
            line("a3", "U1", "2024-01-16T09:05:00Z", "purchase", "google"),
            line("b1", "U2", "2024-01-15T12:00:00Z", "view", "direct"),
            line("b2", "U2", "2024-01-16T12:00:00Z", "checkout", "direct"),
            // same id on both days
            line("x", "U2", "2024-01-15T13:00:00Z", "view", "direct"),
            line("x", "U2", "2024-01-16T13:00:00Z", "view", "direct"),
        ]
        .join("\n");

        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("events.jsonl");
        std::fs::write(&input_path, ndjson).unwrap();
        let output_path = dir.path().join("curated");
        let config = PipelineConfig::new()
            .with_input(&input_path)
            .with_output(&output_path);

        EtlPipeline::new(config.clone()).unwrap().run().unwrap();
        let full_sessions = read_dataset(&output_path, "sessions");
        let full_events = read_dataset(&output_path, "events_clean");

        let day = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let rerun = EtlPipeline::new(config.with_date_range(Some(day), Some(day)))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(rerun.stats.sessions, 2);

        let sessions = read_dataset(&output_path, "sessions");
        let events = read_dataset(&output_path, "events_clean");
        assert_unique(&sessions, "session_id");
        assert_unique(&events, "event_id");

        // the rewritten partitions match what the full run produced
        assert_eq!(sessions, full_sessions);
        assert_eq!(events, full_events);
    }

    #[test]
    fn test_session_crossing_midnight_is_written_once() {
        let ndjson = [
            line("n1", "U1", "2024-01-15T23:50:00Z", "view", "google"),
            line("n2", "U1", "2024-01-16T00:10:00Z", "purchase", "google"),
        ]
        .join("\n");

        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("events.jsonl");
        std::fs::write(&input_path, ndjson).unwrap();
        let output_path = dir.path().join("curated");
        let config = PipelineConfig::new()
            .with_input(&input_path)
            .with_output(&output_path);

        EtlPipeline::new(config).unwrap().run().unwrap();

        let sessions = read_dataset(&output_path, "sessions");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].0, "dt=2024-01-15");
        assert_eq!(sessions[0].1["session_id"], "U1-000000");
        assert_eq!(sessions[0].1["events_in_session"], 2);
        assert_eq!(sessions[0].1["session_duration_sec"], 1200);

        let events = read_dataset(&output_path, "events_clean");
        let partitions: Vec<&str> = events.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(partitions, vec!["dt=2024-01-15", "dt=2024-01-16"]);
    }

    #[test]
    fn test_run_requires_paths() {
        let pipeline = EtlPipeline::new(PipelineConfig::default()).unwrap();
        assert!(matches!(pipeline.run(), Err(EtlError::InvalidConfig(_))));
    }
}
