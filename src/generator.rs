//! Synthetic clickstream fixtures
//!
//! Produces NDJSON in the exact input format the cleaner accepts. Event types
//! follow a per-user Markov chain: the next type is drawn from a weight vector
//! chosen by the user's previous type, which yields a funnel where views
//! dominate and purchases are rare and mostly follow a checkout.

use crate::error::EtlError;
use crate::types::EventType;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const DEVICES: [&str; 3] = ["mobile", "desktop", "tablet"];
const COUNTRIES: [&str; 7] = ["US", "CA", "GB", "DE", "IN", "BR", "AU"];
const PAGES: [&str; 7] = [
    "/",
    "/search",
    "/product",
    "/cart",
    "/checkout",
    "/purchase",
    "/category",
];
const REFERRERS: [&str; 6] = ["google", "bing", "direct", "newsletter", "twitter", "reddit"];
const PRODUCT_COUNT: u32 = 5000;
const CATEGORY_COUNT: u32 = 50;
const SECONDS_PER_DAY: i64 = 86_400;

/// Transition weights over (view, add_to_cart, checkout, purchase)
fn transition_weights(previous: Option<EventType>) -> [f64; 4] {
    match previous {
        None => [0.92, 0.06, 0.015, 0.005],
        Some(EventType::View) => [0.80, 0.17, 0.02, 0.01],
        Some(EventType::AddToCart) => [0.50, 0.15, 0.30, 0.05],
        Some(EventType::Checkout) => [0.30, 0.05, 0.25, 0.40],
        Some(EventType::Purchase) => [0.90, 0.07, 0.02, 0.01],
    }
}

/// Generator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Output file (`-` for stdout)
    pub out: PathBuf,
    /// Number of days covered, starting at `start_date`
    pub days: u32,
    pub users: u32,
    pub events: u64,
    /// First day; defaults to today (UTC) minus `days`
    pub start_date: Option<NaiveDate>,
    /// Fixed seed for reproducible fixtures
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            out: PathBuf::from("-"),
            days: 3,
            users: 20_000,
            events: 500_000,
            start_date: None,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), EtlError> {
        if self.days == 0 {
            return Err(EtlError::InvalidConfig("days must be at least 1".to_string()));
        }
        if self.users == 0 {
            return Err(EtlError::InvalidConfig("users must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Midnight UTC of the first generated day
    pub fn start(&self) -> DateTime<Utc> {
        let first_day = self.start_date.unwrap_or_else(|| {
            Utc::now().date_naive() - Duration::days(i64::from(self.days))
        });
        first_day.and_time(chrono::NaiveTime::MIN).and_utc()
    }
}

/// One generated input line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedEvent {
    pub event_id: String,
    pub user_id: String,
    pub event_time: String,
    pub event_type: EventType,
    pub page_url: String,
    pub referrer: &'static str,
    pub device: &'static str,
    pub country: &'static str,
}

/// Streams synthetic events
pub struct FixtureGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    start: DateTime<Utc>,
    user_ids: Vec<String>,
    previous_by_user: HashMap<u32, EventType>,
    transitions: [WeightedIndex<f64>; 5],
}

impl FixtureGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self, EtlError> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let build = |previous| {
            WeightedIndex::new(transition_weights(previous))
                .map_err(|e| EtlError::InvalidConfig(format!("transition weights: {e}")))
        };
        let transitions = [
            build(None)?,
            build(Some(EventType::View))?,
            build(Some(EventType::AddToCart))?,
            build(Some(EventType::Checkout))?,
            build(Some(EventType::Purchase))?,
        ];

        Ok(Self {
            start: config.start(),
            user_ids: (0..config.users).map(|i| format!("user_{i:06}")).collect(),
            previous_by_user: HashMap::new(),
            rng,
            transitions,
            config,
        })
    }

    fn next_event_type(&mut self, previous: Option<EventType>) -> EventType {
        let slot = match previous {
            None => 0,
            Some(EventType::View) => 1,
            Some(EventType::AddToCart) => 2,
            Some(EventType::Checkout) => 3,
            Some(EventType::Purchase) => 4,
        };
        EventType::ALL[self.transitions[slot].sample(&mut self.rng)]
    }

    fn page_url(&mut self) -> String {
        match PAGES[self.rng.gen_range(0..PAGES.len())] {
            "/product" => format!("/product/sku_{:05}", self.rng.gen_range(0..PRODUCT_COUNT)),
            "/category" => format!("/category/{}", self.rng.gen_range(1..=CATEGORY_COUNT)),
            page => page.to_string(),
        }
    }

    /// Generate the event with sequence number `index`
    pub fn next_event(&mut self, index: u64) -> GeneratedEvent {
        let user = self.rng.gen_range(0..self.config.users);
        let day_offset = self.rng.gen_range(0..self.config.days);
        let second = self.rng.gen_range(0..SECONDS_PER_DAY);
        let event_time = self.start
            + Duration::days(i64::from(day_offset))
            + Duration::seconds(second);

        let previous = self.previous_by_user.get(&user).copied();
        let event_type = self.next_event_type(previous);
        self.previous_by_user.insert(user, event_type);

        GeneratedEvent {
            event_id: format!("ev_{index:09}"),
            user_id: self.user_ids[user as usize].clone(),
            event_time: event_time.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            event_type,
            page_url: self.page_url(),
            referrer: REFERRERS[self.rng.gen_range(0..REFERRERS.len())],
            device: DEVICES[self.rng.gen_range(0..DEVICES.len())],
            country: COUNTRIES[self.rng.gen_range(0..COUNTRIES.len())],
        }
    }

    /// Write `config.events` lines of NDJSON
    pub fn write_ndjson<W: Write>(&mut self, out: W) -> Result<u64, EtlError> {
        let mut out = BufWriter::new(out);
        for index in 0..self.config.events {
            let event = self.next_event(index);
            serde_json::to_writer(&mut out, &event)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(self.config.events)
    }

    /// Write to the configured output path
    pub fn write_to_configured_output(&mut self) -> Result<u64, EtlError> {
        let out = self.config.out.clone();
        let written = if is_stdout(&out) {
            self.write_ndjson(io::stdout().lock())?
        } else {
            self.write_ndjson(File::create(&out)?)?
        };

        info!(events = written, out = %out.display(), "fixtures written");
        Ok(written)
    }
}

fn is_stdout(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}
