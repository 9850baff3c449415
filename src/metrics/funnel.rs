//! Referrer funnel metrics
//!
//! A user counts toward a stage when they have at least one event of that type
//! for the (date, referrer) group. Stages are independent memberships, not an
//! ordered path, so later stages may count more users than earlier ones.

use crate::metrics::ratio;
use crate::partition::{group_by_date, parallel_map};
use crate::types::{Event, EventType, FunnelMetric};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

/// Distinct users per funnel stage
#[derive(Default)]
struct StageMembers<'a> {
    view: HashSet<&'a str>,
    add_to_cart: HashSet<&'a str>,
    checkout: HashSet<&'a str>,
    purchase: HashSet<&'a str>,
}

impl<'a> StageMembers<'a> {
    fn add(&mut self, event: &'a Event) {
        let user = event.user_id.as_str();
        match event.event_type {
            EventType::View => self.view.insert(user),
            EventType::AddToCart => self.add_to_cart.insert(user),
            EventType::Checkout => self.checkout.insert(user),
            EventType::Purchase => self.purchase.insert(user),
        };
    }

    fn into_metric(self, dt: NaiveDate, referrer: Option<String>) -> FunnelMetric {
        let users_view = self.view.len() as u64;
        let users_add_to_cart = self.add_to_cart.len() as u64;
        let users_checkout = self.checkout.len() as u64;
        let users_purchase = self.purchase.len() as u64;

        FunnelMetric {
            dt,
            referrer,
            users_view,
            users_add_to_cart,
            users_checkout,
            users_purchase,
            view_to_cart: ratio(users_add_to_cart, users_view),
            cart_to_checkout: ratio(users_checkout, users_add_to_cart),
            checkout_to_purchase: ratio(users_purchase, users_checkout),
        }
    }
}

/// Aggregator for the `funnel_metrics` table
pub struct FunnelAggregator;

impl FunnelAggregator {
    /// Compute one row per (date, referrer), sorted with a null referrer first
    pub fn aggregate(events: &[Event], workers: usize) -> Vec<FunnelMetric> {
        let partitions: Vec<(NaiveDate, Vec<&Event>)> = group_by_date(events).into_iter().collect();
        parallel_map(partitions, workers, |(dt, events)| {
            Self::aggregate_date(dt, &events)
        })
        .into_iter()
        .flatten()
        .collect()
    }

    /// Compute every referrer row of a single date partition
    pub fn aggregate_date<'a>(dt: NaiveDate, events: &[&'a Event]) -> Vec<FunnelMetric> {
        let mut by_referrer: BTreeMap<Option<&'a str>, StageMembers<'a>> = BTreeMap::new();
        for &event in events {
            by_referrer
                .entry(event.referrer.as_deref())
                .or_default()
                .add(event);
        }

        by_referrer
            .into_iter()
            .map(|(referrer, members)| members.into_metric(dt, referrer.map(str::to_string)))
            .collect()
    }
}
