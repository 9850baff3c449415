//! Event deduplication
//!
//! Collapses events that share an `event_id`. The surviving event is chosen by a
//! content-based total order, so the result does not depend on input order or
//! on how the input was partitioned.

use crate::types::Event;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Result of a deduplication pass
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// One event per `event_id`, sorted by `event_id`
    pub events: Vec<Event>,
    pub duplicates_dropped: usize,
}

/// Keeps the first occurrence of every `event_id` under [`precedence`]
pub struct Deduplicator;

impl Deduplicator {
    pub fn dedup(events: Vec<Event>) -> DedupOutcome {
        let total = events.len();
        let mut by_id: BTreeMap<String, Event> = BTreeMap::new();

        for event in events {
            match by_id.entry(event.event_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(event);
                }
                Entry::Occupied(mut slot) => {
                    if precedence(&event, slot.get()) == Ordering::Less {
                        slot.insert(event);
                    }
                }
            }
        }

        let events: Vec<Event> = by_id.into_values().collect();
        DedupOutcome {
            duplicates_dropped: total - events.len(),
            events,
        }
    }
}

/// Total order among events sharing an id: earliest `event_time`, then the
/// remaining payload fields lexicographically (absent values first)
pub fn precedence(a: &Event, b: &Event) -> Ordering {
    a.event_time
        .cmp(&b.event_time)
        .then_with(|| a.user_id.cmp(&b.user_id))
        .then_with(|| a.event_type.cmp(&b.event_type))
        .then_with(|| a.page_url.cmp(&b.page_url))
        .then_with(|| a.referrer.cmp(&b.referrer))
        .then_with(|| a.device.cmp(&b.device))
        .then_with(|| a.country.cmp(&b.country))
}
