//! Record validation and normalization
//!
//! Turns untyped [`RawRecord`]s into [`Event`]s. A record that cannot become an
//! event is rejected with a reason; rejection never aborts a run.

use crate::schema::RawRecord;
use crate::types::{Event, EventType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Naive timestamp layouts accepted in addition to RFC 3339, read as UTC
const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Why a raw record was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The input line was not a JSON object
    MalformedLine,
    MissingEventId,
    MissingUserId,
    MissingEventTime,
    InvalidEventTime,
    InvalidEventType,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::MalformedLine => "malformed_line",
            Rejection::MissingEventId => "missing_event_id",
            Rejection::MissingUserId => "missing_user_id",
            Rejection::MissingEventTime => "missing_event_time",
            Rejection::InvalidEventTime => "invalid_event_time",
            Rejection::InvalidEventType => "invalid_event_type",
        }
    }
}

/// Accept/reject tally for a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub accepted: usize,
    pub rejected: BTreeMap<Rejection, usize>,
}

impl CleanReport {
    pub fn record(&mut self, outcome: Result<(), Rejection>) {
        match outcome {
            Ok(()) => self.accepted += 1,
            Err(reason) => *self.rejected.entry(reason).or_insert(0) += 1,
        }
    }

    /// Count lines the reader could not decode
    pub fn record_malformed(&mut self, count: usize) {
        if count > 0 {
            *self.rejected.entry(Rejection::MalformedLine).or_insert(0) += count;
        }
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn total(&self) -> usize {
        self.accepted + self.total_rejected()
    }
}

/// Validator for raw clickstream records
pub struct EventCleaner;

impl EventCleaner {
    /// Validate one record
    pub fn clean(record: &RawRecord) -> Result<Event, Rejection> {
        let event_id = record.text("event_id").ok_or(Rejection::MissingEventId)?;
        let user_id = record.text("user_id").ok_or(Rejection::MissingUserId)?;
        let raw_time = record
            .text("event_time")
            .ok_or(Rejection::MissingEventTime)?;
        let event_time = parse_event_time(&raw_time).ok_or(Rejection::InvalidEventTime)?;
        let event_type = record
            .text("event_type")
            .as_deref()
            .and_then(EventType::parse)
            .ok_or(Rejection::InvalidEventType)?;

        Ok(Event {
            event_id,
            user_id,
            event_time,
            event_type,
            page_url: record.text("page_url"),
            referrer: record.text("referrer"),
            device: record.text("device"),
            country: record.text("country"),
        })
    }

    /// Validate a batch, keeping accepted events in input order
    pub fn clean_all(records: &[RawRecord]) -> (Vec<Event>, CleanReport) {
        let mut report = CleanReport::default();
        let mut events = Vec::with_capacity(records.len());

        for record in records {
            match Self::clean(record) {
                Ok(event) => {
                    report.record(Ok(()));
                    events.push(event);
                }
                Err(reason) => report.record(Err(reason)),
            }
        }

        (events, report)
    }
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// Offsets are honoured; timestamps without an offset are taken as UTC, and a
/// bare date means midnight UTC.
pub fn parse_event_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn make_record() -> RawRecord {
        RawRecord::from_value(json!({
            "event_id": "ev_000000001",
            "user_id": "user_000001",
            "event_time": "2024-01-15T10:00:00Z",
            "event_type": "view",
            "page_url": "/product/sku_00042",
            "referrer": "google",
            "device": "mobile",
            "country": "US"
        }))
        .unwrap()
    }

    #[test]
    fn test_clean_valid_record() {
        let event = EventCleaner::clean(&make_record()).unwrap();

        assert_eq!(event.event_id, "ev_000000001");
        assert_eq!(event.user_id, "user_000001");
        assert_eq!(
            event.event_time,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
        );
        assert_eq!(event.event_type, EventType::View);
        assert_eq!(event.referrer.as_deref(), Some("google"));
    }

    #[test]
    fn test_missing_mandatory_fields_reject() {
        let cases = [
            ("event_id", Rejection::MissingEventId),
            ("user_id", Rejection::MissingUserId),
            ("event_time", Rejection::MissingEventTime),
            ("event_type", Rejection::InvalidEventType),
        ];

        for (field, expected) in cases {
            let record = make_record().with_field(field, Value::Null);
            assert_eq!(EventCleaner::clean(&record), Err(expected), "field {field}");
        }
    }

    #[test]
    fn test_missing_optional_fields_become_none() {
        let record = RawRecord::from_value(json!({
            "event_id": "ev_1",
            "user_id": "u1",
            "event_time": "2024-01-15T10:00:00Z",
            "event_type": "checkout"
        }))
        .unwrap();

        let event = EventCleaner::clean(&record).unwrap();
        assert_eq!(event.page_url, None);
        assert_eq!(event.referrer, None);
        assert_eq!(event.device, None);
        assert_eq!(event.country, None);
    }

    #[test]
    fn test_unparseable_time_rejects() {
        let record = make_record().with_field("event_time", "yesterday at noon");
        assert_eq!(
            EventCleaner::clean(&record),
            Err(Rejection::InvalidEventTime)
        );
    }

    #[test]
    fn test_unknown_event_type_rejects() {
        for value in ["refund", "VIEW", ""] {
            let record = make_record().with_field("event_type", value);
            assert_eq!(
                EventCleaner::clean(&record),
                Err(Rejection::InvalidEventType)
            );
        }
    }

    #[test]
    fn test_parse_event_time_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();

        assert_eq!(parse_event_time("2024-01-15T10:00:00Z"), Some(expected));
        assert_eq!(parse_event_time("2024-01-15T12:00:00+02:00"), Some(expected));
        assert_eq!(parse_event_time("2024-01-15T10:00:00"), Some(expected));
        assert_eq!(parse_event_time("2024-01-15 10:00:00"), Some(expected));
        assert_eq!(
            parse_event_time("2024-01-15"),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_event_time("2024-13-45T10:00:00Z"), None);
    }

    #[test]
    fn test_clean_all_report() {
        let records = vec![
            make_record(),
            make_record().with_field("user_id", Value::Null),
            make_record().with_field("event_type", "refund"),
            make_record().with_field("event_type", "refund"),
        ];

        let (events, mut report) = EventCleaner::clean_all(&records);
        report.record_malformed(2);

        assert_eq!(events.len(), 1);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected[&Rejection::MissingUserId], 1);
        assert_eq!(report.rejected[&Rejection::InvalidEventType], 2);
        assert_eq!(report.rejected[&Rejection::MalformedLine], 2);
        assert_eq!(report.total(), 6);
    }
}
