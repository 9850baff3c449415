//! Derived metric tables
//!
//! Both aggregators consume the deduplicated event set grouped by UTC date and
//! share the same null-on-zero ratio rule.

pub mod daily;
pub mod funnel;

pub use daily::DailyAggregator;
pub use funnel::FunnelAggregator;

/// `numerator / denominator`, or `None` when the denominator is zero
pub fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}
