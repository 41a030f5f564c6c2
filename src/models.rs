use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Wire value for a call/put (or put/call) ratio whose denominator is zero.
/// Clients depend on -1 rather than a JSON-incompatible infinity.
pub const INFINITE_RATIO: f64 = -1.0;

/// One per-second option contract aggregate as written to the daily log files.
///
/// Every field defaults when absent so partially populated records still parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tick {
    #[serde(rename = "ev")]
    pub event_type: String,
    #[serde(rename = "sym")]
    pub symbol: String,
    #[serde(rename = "v")]
    pub volume: i64,
    #[serde(rename = "av")]
    pub accumulated_volume: i64,
    #[serde(rename = "op")]
    pub official_open_price: f64,
    #[serde(rename = "vw")]
    pub vwap: f64,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "a")]
    pub aggregate_vwap: f64,
    #[serde(rename = "z")]
    pub average_size: i64,
    /// Window start, epoch milliseconds (inclusive).
    #[serde(rename = "s")]
    pub start_timestamp: i64,
    /// Window end, epoch milliseconds (exclusive).
    #[serde(rename = "e")]
    pub end_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

/// Decoded form of an OCC-style contract symbol such as `O:AAPL230616C00150000`.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionIdentity {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
}

/// Whether a bucket can still receive ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketStatus {
    InProgress,
    Completed,
}

impl BucketStatus {
    /// A bucket is completed once wall-clock time reaches its end.
    pub fn at(period_end_ms: i64, now_ms: i64) -> Self {
        if now_ms >= period_end_ms {
            BucketStatus::Completed
        } else {
            BucketStatus::InProgress
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BucketStatus::InProgress => "in-progress",
            BucketStatus::Completed => "completed",
        }
    }
}

/// Premium totals for the half-open bucket `[period_start, period_end)`.
///
/// `total_premium == call_premium + put_premium` after every mutation, and
/// `call_put_ratio` follows [`call_put_ratio`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub period_start: DateTime<FixedOffset>,
    pub period_end: DateTime<FixedOffset>,
    pub call_premium: f64,
    pub put_premium: f64,
    pub total_premium: f64,
    pub call_put_ratio: f64,
    pub call_volume: i64,
    pub put_volume: i64,
}

impl PeriodSummary {
    pub fn empty(start_ms: i64, end_ms: i64, tz: &Tz) -> Self {
        Self {
            period_start: millis_to_local(start_ms, tz),
            period_end: millis_to_local(end_ms, tz),
            call_premium: 0.0,
            put_premium: 0.0,
            total_premium: 0.0,
            call_put_ratio: 0.0,
            call_volume: 0,
            put_volume: 0,
        }
    }

    pub fn start_ms(&self) -> i64 {
        self.period_start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.period_end.timestamp_millis()
    }

    pub fn status_at(&self, now_ms: i64) -> BucketStatus {
        BucketStatus::at(self.end_ms(), now_ms)
    }

    /// Accumulate one contract's premium and volume into the matching side.
    pub fn add(&mut self, option_type: OptionType, volume: i64, premium: f64) {
        match option_type {
            OptionType::Call => {
                self.call_premium += premium;
                self.call_volume += volume;
            }
            OptionType::Put => {
                self.put_premium += premium;
                self.put_volume += volume;
            }
        }
        self.total_premium = self.call_premium + self.put_premium;
        self.call_put_ratio = call_put_ratio(self.call_premium, self.put_premium);
    }

    /// Inverse ratio used by put-side alert rules, with the same sentinel convention.
    pub fn put_call_ratio(&self) -> f64 {
        call_put_ratio(self.put_premium, self.call_premium)
    }
}

/// `numerator / denominator`, or [`INFINITE_RATIO`] when only the numerator is
/// non-zero, or 0 when both are zero.
pub fn call_put_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else if numerator > 0.0 {
        INFINITE_RATIO
    } else {
        0.0
    }
}

/// Render an epoch-millisecond instant in the reference timezone, keeping the offset.
pub fn millis_to_local(ms: i64, tz: &Tz) -> DateTime<FixedOffset> {
    let utc = Utc.timestamp_millis_opt(ms).single().unwrap_or_default();
    let local = utc.with_timezone(tz);
    local.with_timezone(&local.offset().fix())
}
