//! Inactivity-gap sessionization
//!
//! Walks one user's time-ordered events and cuts a new session whenever the gap
//! to the previous event exceeds the threshold. The scan is a two-state machine:
//! before the first event there is no open session, afterwards exactly one
//! session is open and accumulating.

use crate::partition::{parallel_map, sort_timeline, UserEvents};
use crate::types::{Event, EventType, Session};
use chrono::{DateTime, Utc};

/// Default inactivity threshold
pub const DEFAULT_SESSION_GAP_MINUTES: u32 = 30;

/// Width of the zero-padded index in `session_id`
const SESSION_INDEX_WIDTH: usize = 6;

/// Build the deterministic session identifier
pub fn session_id(user_id: &str, session_index: u32) -> String {
    format!("{user_id}-{session_index:0width$}", width = SESSION_INDEX_WIDTH)
}

/// Running aggregates of the open session
struct SessionAccumulator {
    session_index: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    events: u32,
    made_purchase: bool,
    reached_checkout: bool,
    added_to_cart: bool,
}

impl SessionAccumulator {
    fn open(session_index: u32, event: &Event) -> Self {
        let mut acc = Self {
            session_index,
            start: event.event_time,
            end: event.event_time,
            events: 0,
            made_purchase: false,
            reached_checkout: false,
            added_to_cart: false,
        };
        acc.add(event);
        acc
    }

    fn add(&mut self, event: &Event) {
        self.start = self.start.min(event.event_time);
        self.end = self.end.max(event.event_time);
        self.events += 1;
        match event.event_type {
            EventType::Purchase => self.made_purchase = true,
            EventType::Checkout => self.reached_checkout = true,
            EventType::AddToCart => self.added_to_cart = true,
            EventType::View => {}
        }
    }

    fn finish(self, user_id: &str) -> Session {
        Session {
            session_id: session_id(user_id, self.session_index),
            user_id: user_id.to_string(),
            session_index: self.session_index,
            dt: self.start.date_naive(),
            session_start: self.start,
            session_end: self.end,
            events_in_session: self.events,
            made_purchase: self.made_purchase,
            reached_checkout: self.reached_checkout,
            added_to_cart: self.added_to_cart,
            session_duration_sec: self.end.timestamp() - self.start.timestamp(),
        }
    }
}

enum ScanState {
    AwaitingFirstEvent,
    InsideSession {
        previous_time: DateTime<Utc>,
        open: SessionAccumulator,
    },
}

/// Splits user timelines into sessions
#[derive(Debug, Clone, Copy)]
pub struct Sessionizer {
    gap_threshold_sec: i64,
}

impl Default for Sessionizer {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_GAP_MINUTES)
    }
}

impl Sessionizer {
    /// Create a sessionizer with an inactivity threshold in minutes
    pub fn new(gap_minutes: u32) -> Self {
        Self {
            gap_threshold_sec: i64::from(gap_minutes) * 60,
        }
    }

    /// A gap strictly greater than the threshold opens a new session
    fn is_boundary(&self, previous: DateTime<Utc>, current: DateTime<Utc>) -> bool {
        current.timestamp() - previous.timestamp() > self.gap_threshold_sec
    }

    /// Sessionize one user's events.
    ///
    /// All events must belong to the same user. They are put in
    /// `(event_time, event_id)` order before scanning.
    pub fn sessionize_user(&self, events: &[&Event]) -> Vec<Session> {
        let mut ordered = events.to_vec();
        sort_timeline(&mut ordered);

        let Some(user_id) = ordered.first().map(|e| e.user_id.clone()) else {
            return Vec::new();
        };

        let mut sessions = Vec::new();
        let mut state = ScanState::AwaitingFirstEvent;

        for event in ordered {
            state = match state {
                ScanState::AwaitingFirstEvent => ScanState::InsideSession {
                    previous_time: event.event_time,
                    open: SessionAccumulator::open(0, event),
                },
                ScanState::InsideSession {
                    previous_time,
                    mut open,
                } => {
                    if self.is_boundary(previous_time, event.event_time) {
                        let next_index = open.session_index + 1;
                        sessions.push(open.finish(&user_id));
                        ScanState::InsideSession {
                            previous_time: event.event_time,
                            open: SessionAccumulator::open(next_index, event),
                        }
                    } else {
                        open.add(event);
                        ScanState::InsideSession {
                            previous_time: event.event_time,
                            open,
                        }
                    }
                }
            };
        }

        if let ScanState::InsideSession { open, .. } = state {
            sessions.push(open.finish(&user_id));
        }

        sessions
    }

    /// Sessionize every user on up to `workers` threads.
    ///
    /// Output is ordered by `(user_id, session_index)` whatever the worker count.
    pub fn sessionize_all(&self, users: Vec<UserEvents<'_>>, workers: usize) -> Vec<Session> {
        parallel_map(users, workers, |user| self.sessionize_user(&user.events))
            .into_iter()
            .flatten()
            .collect()
    }
}
