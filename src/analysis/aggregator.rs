//! Premium calculation and time-bucket aggregation.

use super::symbol::parse_option_symbol;
use crate::models::{PeriodSummary, Tick};
use chrono::{TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use tracing::debug;

/// Shares represented by one listed option contract.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

const MS_PER_MINUTE: i64 = 60_000;

/// Premium = volume x VWAP x contract multiplier.
pub fn calculate_premium(volume: i64, vwap: f64) -> f64 {
    volume as f64 * vwap * CONTRACT_MULTIPLIER
}

/// Round an epoch-millisecond timestamp down to the start of its bucket.
///
/// Buckets align to the wall-clock minute-of-day in `tz`, so a 5 minute period
/// always starts at :00, :05, :10 ... regardless of when the first tick arrived.
pub fn round_down_to_period(timestamp_ms: i64, period_minutes: u32, tz: &Tz) -> i64 {
    let period = period_minutes.max(1) as i64;
    let local = Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_default()
        .with_timezone(tz);

    let minute_of_day = local.hour() as i64 * 60 + local.minute() as i64;
    let rounded = (minute_of_day / period) * period;

    let into_minute_ms =
        local.second() as i64 * 1000 + (local.timestamp_subsec_millis() as i64).min(999);
    timestamp_ms - (minute_of_day - rounded) * MS_PER_MINUTE - into_minute_ms
}

/// `[start, end)` of the bucket containing `timestamp_ms`.
pub fn bucket_bounds(timestamp_ms: i64, period_minutes: u32, tz: &Tz) -> (i64, i64) {
    let start = round_down_to_period(timestamp_ms, period_minutes, tz);
    (start, start + period_ms(period_minutes))
}

pub fn period_ms(period_minutes: u32) -> i64 {
    period_minutes.max(1) as i64 * MS_PER_MINUTE
}

/// Fold `tick` into the bucket map, keyed by bucket start.
///
/// Returns the key it landed in, or `None` when the symbol could not be decoded.
pub fn accumulate(
    buckets: &mut BTreeMap<i64, PeriodSummary>,
    tick: &Tick,
    period_minutes: u32,
    tz: &Tz,
) -> Option<i64> {
    let identity = match parse_option_symbol(&tick.symbol) {
        Ok(id) => id,
        Err(e) => {
            debug!(symbol = %tick.symbol, error = %e, "skipping tick with unparsable symbol");
            return None;
        }
    };

    let premium = calculate_premium(tick.volume, tick.vwap);
    let (start, end) = bucket_bounds(tick.start_timestamp, period_minutes, tz);

    buckets
        .entry(start)
        .or_insert_with(|| PeriodSummary::empty(start, end, tz))
        .add(identity.option_type, tick.volume, premium);

    Some(start)
}

/// Aggregate ticks into one summary per bucket, oldest first.
///
/// Order of `ticks` does not matter; malformed symbols are skipped.
pub fn aggregate_premiums(ticks: &[Tick], period_minutes: u32, tz: &Tz) -> Vec<PeriodSummary> {
    let mut buckets = BTreeMap::new();
    for tick in ticks {
        accumulate(&mut buckets, tick, period_minutes, tz);
    }
    buckets.into_values().collect()
}
