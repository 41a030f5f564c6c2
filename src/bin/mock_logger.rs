//! Synthetic tick generator for local development.
//!
//! Appends one fake aggregate per `O:TESTING…` contract to today's daily log on a
//! fixed interval, so the service has a growing file to stream from.
//!
//! Usage:
//!   cargo run --bin mock_logger -- --log-dir ./logs --interval 5

use anyhow::{anyhow, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::Parser;
use optflow_backend::logs::{today, DailyLogWriter};
use optflow_backend::models::Tick;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

const EXPIRATION_DAYS: [i64; 10] = [30, 60, 90, 120, 150, 180, 210, 240, 270, 300];
const STRIKES: [f64; 10] = [100.0, 110.0, 120.0, 130.0, 140.0, 150.0, 160.0, 170.0, 180.0, 190.0];

#[derive(Parser, Debug)]
#[command(name = "mock_logger")]
#[command(about = "Write synthetic option ticks into daily log files")]
struct Args {
    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    log_dir: PathBuf,

    /// Seconds between batches
    #[arg(long, default_value = "5")]
    interval: u64,

    #[arg(long, env = "REFERENCE_TZ", default_value = "America/Los_Angeles")]
    timezone: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mock_logger=info".into()),
        )
        .init();

    let args = Args::parse();
    let tz: Tz = args
        .timezone
        .parse()
        .map_err(|e| anyhow!("unknown timezone {}: {}", args.timezone, e))?;

    let writer = DailyLogWriter::new(&args.log_dir, tz);
    let contracts = contract_symbols(today(&tz));
    let mut rng = StdRng::from_entropy();
    info!(
        contracts = contracts.len(),
        log_dir = %writer.log_dir().display(),
        "mock logger started, press Ctrl+C to stop"
    );

    let mut ticker = interval(Duration::from_secs(args.interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now_ms = Utc::now().timestamp_millis();
                let mut failed = 0usize;
                for symbol in &contracts {
                    let tick = fake_tick(symbol, now_ms, &mut rng);
                    if let Err(e) = writer.write(&tick) {
                        failed += 1;
                        warn!(symbol = %symbol, error = %e, "failed to write tick");
                    }
                }
                info!(written = contracts.len() - failed, failed, "generated batch");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down mock logger");
                return Ok(());
            }
        }
    }
}

/// Calls and puts for every expiration/strike pair, e.g. `O:TESTING240415C00150000`.
fn contract_symbols(today: NaiveDate) -> Vec<String> {
    let mut symbols = Vec::with_capacity(EXPIRATION_DAYS.len() * STRIKES.len() * 2);
    for days in EXPIRATION_DAYS {
        let expiry = (today + ChronoDuration::days(days)).format("%y%m%d");
        for strike in STRIKES {
            let strike = (strike * 1000.0).round() as i64;
            for side in ['C', 'P'] {
                symbols.push(format!("O:TESTING{}{}{:08}", expiry, side, strike));
            }
        }
    }
    symbols
}

/// A plausible one-second aggregate ending at `end_ms`.
fn fake_tick(symbol: &str, end_ms: i64, rng: &mut impl Rng) -> Tick {
    let base = 150.0 + rng.gen_range(-20.0..20.0);
    let open: f64 = base + rng.gen_range(-1.0..1.0);
    let close: f64 = open + rng.gen_range(-1.0..1.0);
    let high = (open + rng.gen_range(0.0..3.0)).max(close);
    let low = (open - rng.gen_range(0.0..3.0)).min(close);
    let volume = rng.gen_range(100..10_000i64);
    let vwap = (open + high + low + close) / 4.0;

    Tick {
        event_type: "A".to_string(),
        symbol: symbol.to_string(),
        volume,
        accumulated_volume: volume + rng.gen_range(0..100_000i64),
        official_open_price: open + rng.gen_range(-0.25..0.25),
        vwap,
        open,
        high,
        low,
        close,
        aggregate_vwap: vwap + rng.gen_range(-0.05..0.05),
        average_size: volume / rng.gen_range(1..=10i64),
        start_timestamp: end_ms - 1000,
        end_timestamp: end_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optflow_backend::analysis::parse_option_symbol;
    use optflow_backend::models::OptionType;

    #[test]
    fn test_contract_symbols_parse() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let symbols = contract_symbols(today);
        assert_eq!(symbols.len(), 200);
        assert_eq!(symbols[0], "O:TESTING240414C00100000");
        assert_eq!(symbols[1], "O:TESTING240414P00100000");

        let identity = parse_option_symbol(&symbols[1]).unwrap();
        assert_eq!(identity.underlying, "TESTING");
        assert_eq!(identity.option_type, OptionType::Put);
        assert_eq!(identity.strike, 100.0);
    }

    #[test]
    fn test_fake_tick_is_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let tick = fake_tick("O:TESTING240414C00100000", 10_000, &mut rng);
            assert!(tick.low <= tick.open && tick.open <= tick.high);
            assert!(tick.low <= tick.close && tick.close <= tick.high);
            assert!((100..10_000).contains(&tick.volume));
            assert_eq!(tick.end_timestamp - tick.start_timestamp, 1000);
        }
    }
}
