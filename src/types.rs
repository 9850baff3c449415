//! Core types for the Clickstream Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: cleaned events, sessions, and the two metric tables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interaction types accepted by the cleaner, in funnel order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    View,
    AddToCart,
    Checkout,
    Purchase,
}

impl EventType {
    /// All recognized types, in funnel order
    pub const ALL: [EventType; 4] = [
        EventType::View,
        EventType::AddToCart,
        EventType::Checkout,
        EventType::Purchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::AddToCart => "add_to_cart",
            EventType::Checkout => "checkout",
            EventType::Purchase => "purchase",
        }
    }

    /// Exact, case-sensitive lookup
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "view" => Some(EventType::View),
            "add_to_cart" => Some(EventType::AddToCart),
            "checkout" => Some(EventType::Checkout),
            "purchase" => Some(EventType::Purchase),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated interaction event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub user_id: String,
    /// Event timestamp (UTC)
    pub event_time: DateTime<Utc>,
    pub event_type: EventType,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub device: Option<String>,
    pub country: Option<String>,
}

impl Event {
    /// UTC calendar date of the event, used as the partition key
    pub fn dt(&self) -> NaiveDate {
        self.event_time.date_naive()
    }
}

/// Rows that belong to exactly one date partition
pub trait PartitionedRow: Serialize {
    fn partition_date(&self) -> NaiveDate;
}

/// One row of the `events_clean` dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanEventRow {
    #[serde(flatten)]
    pub event: Event,
    pub dt: NaiveDate,
}

impl From<Event> for CleanEventRow {
    fn from(event: Event) -> Self {
        let dt = event.dt();
        Self { event, dt }
    }
}

impl PartitionedRow for CleanEventRow {
    fn partition_date(&self) -> NaiveDate {
        self.dt
    }
}

/// A maximal run of one user's events without an inactivity gap above the threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// `user_id` joined with the zero-padded session index
    pub session_id: String,
    pub user_id: String,
    /// 0-based position of the session in the user's timeline
    pub session_index: u32,
    /// Date of `session_start`
    pub dt: NaiveDate,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub events_in_session: u32,
    pub made_purchase: bool,
    pub reached_checkout: bool,
    pub added_to_cart: bool,
    pub session_duration_sec: i64,
}

impl PartitionedRow for Session {
    fn partition_date(&self) -> NaiveDate {
        self.dt
    }
}

/// Activity and conversion counts for one UTC date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub dt: NaiveDate,
    /// Distinct active users
    pub dau: u64,
    pub events: u64,
    pub purchases: u64,
    pub checkouts: u64,
    pub add_to_carts: u64,
    pub views: u64,
    /// checkouts / views, `None` when there are no views
    pub checkout_rate: Option<f64>,
    /// purchases / views, `None` when there are no views
    pub purchase_rate: Option<f64>,
}

impl PartitionedRow for DailyMetric {
    fn partition_date(&self) -> NaiveDate {
        self.dt
    }
}

/// Stage membership counts for one (date, referrer) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelMetric {
    pub dt: NaiveDate,
    pub referrer: Option<String>,
    pub users_view: u64,
    pub users_add_to_cart: u64,
    pub users_checkout: u64,
    pub users_purchase: u64,
    pub view_to_cart: Option<f64>,
    pub cart_to_checkout: Option<f64>,
    pub checkout_to_purchase: Option<f64>,
}

impl PartitionedRow for FunnelMetric {
    fn partition_date(&self) -> NaiveDate {
        self.dt
    }
}
