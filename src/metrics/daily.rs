//! Daily activity and conversion metrics

use crate::metrics::ratio;
use crate::partition::{group_by_date, parallel_map};
use crate::types::{DailyMetric, Event, EventType};
use chrono::NaiveDate;
use std::collections::HashSet;

/// Aggregator for the `daily_metrics` table
pub struct DailyAggregator;

impl DailyAggregator {
    /// Compute one row per UTC date, sorted by date
    pub fn aggregate(events: &[Event], workers: usize) -> Vec<DailyMetric> {
        let partitions: Vec<(NaiveDate, Vec<&Event>)> = group_by_date(events).into_iter().collect();
        parallel_map(partitions, workers, |(dt, events)| {
            Self::aggregate_date(dt, &events)
        })
    }

    /// Compute the row for a single date partition
    pub fn aggregate_date(dt: NaiveDate, events: &[&Event]) -> DailyMetric {
        let mut users: HashSet<&str> = HashSet::new();
        let mut views = 0u64;
        let mut add_to_carts = 0u64;
        let mut checkouts = 0u64;
        let mut purchases = 0u64;

        for event in events {
            users.insert(event.user_id.as_str());
            match event.event_type {
                EventType::View => views += 1,
                EventType::AddToCart => add_to_carts += 1,
                EventType::Checkout => checkouts += 1,
                EventType::Purchase => purchases += 1,
            }
        }

        DailyMetric {
            dt,
            dau: users.len() as u64,
            events: events.len() as u64,
            purchases,
            checkouts,
            add_to_carts,
            views,
            checkout_rate: ratio(checkouts, views),
            purchase_rate: ratio(purchases, views),
        }
    }
}
