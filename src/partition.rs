//! Explicit grouping contracts and the scoped worker pool
//!
//! The sessionizer needs every event of a user in one time-ordered list; the
//! aggregators need events grouped by UTC date. Both groupings happen here so
//! that no stage relies on an implicit ordering of its input.

use crate::types::Event;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::thread;

/// All events of one user, sorted by `(event_time, event_id)`
#[derive(Debug, Clone)]
pub struct UserEvents<'a> {
    pub user_id: &'a str,
    pub events: Vec<&'a Event>,
}

/// Colocate each user's events and sort them in time order.
///
/// Users are returned in `user_id` order.
pub fn group_by_user(events: &[Event]) -> Vec<UserEvents<'_>> {
    let mut by_user: BTreeMap<&str, Vec<&Event>> = BTreeMap::new();
    for event in events {
        by_user.entry(event.user_id.as_str()).or_default().push(event);
    }

    by_user
        .into_iter()
        .map(|(user_id, mut events)| {
            sort_timeline(&mut events);
            UserEvents { user_id, events }
        })
        .collect()
}

/// Group events by the UTC date of `event_time`
pub fn group_by_date(events: &[Event]) -> BTreeMap<NaiveDate, Vec<&Event>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&Event>> = BTreeMap::new();
    for event in events {
        by_date.entry(event.dt()).or_default().push(event);
    }
    by_date
}

/// Stable time order with `event_id` as the tie-break
pub fn sort_timeline(events: &mut [&Event]) {
    events.sort_by(|a, b| {
        a.event_time
            .cmp(&b.event_time)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
}

/// Map `f` over `items` using up to `workers` scoped threads.
///
/// Items are split into contiguous chunks, each owned by exactly one worker, and
/// results come back in input order.
pub fn parallel_map<T, R, F>(items: Vec<T>, workers: usize, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.into_iter().map(f).collect();
    }

    let chunk_size = items.len().div_ceil(workers);
    let mut chunks: Vec<Vec<T>> = Vec::with_capacity(workers);
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }

    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| scope.spawn(move || chunk.into_iter().map(f).collect::<Vec<R>>()))
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}
