//! Unusually large trades relative to the day's premium distribution.
//!
//! Calls and puts are measured separately. A trade is reported when its premium
//! is at least `--multiple` times the `--percentile` of its side.
//!
//! Usage:
//!   cargo run --bin optflow-outliers -- --input ./logs/AAPL_2024-03-15.jsonl
//!   cargo run --bin optflow-outliers -- --log-dir ./logs --percentile 95 --multiple 20

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::Parser;
use optflow_backend::analysis::{find_outliers, format_count, format_currency, Outlier, OutlierReport, PremiumStats};
use optflow_backend::logs::{parse_log_file_name, read_tick_export};
use optflow_backend::models::millis_to_local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "optflow-outliers")]
#[command(about = "Find option trades whose premium dwarfs the daily distribution")]
struct Args {
    /// Tick export to read (JSONL or a JSON array)
    #[arg(long, conflicts_with = "log_dir", required_unless_present = "log_dir")]
    input: Option<PathBuf>,

    /// Scan every daily log in this directory, one report per file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Baseline percentile, 0-100
    #[arg(long, default_value = "90")]
    percentile: f64,

    /// Report trades at or above this multiple of the baseline
    #[arg(long, default_value = "10")]
    multiple: f64,

    #[arg(long, env = "REFERENCE_TZ", default_value = "America/Los_Angeles")]
    timezone: String,
}

/// One outlier from a daily log, tagged with where it came from.
struct Finding {
    ticker: String,
    date: NaiveDate,
    outlier: Outlier,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optflow_outliers=info,optflow_backend=warn".into()),
        )
        .init();

    let args = Args::parse();
    if !(0.0..=100.0).contains(&args.percentile) {
        bail!("--percentile must be between 0 and 100");
    }
    if args.multiple <= 0.0 {
        bail!("--multiple must be greater than 0");
    }
    let tz: Tz = args
        .timezone
        .parse()
        .map_err(|e| anyhow!("unknown timezone {}: {}", args.timezone, e))?;
    let p = args.percentile / 100.0;

    match (&args.input, &args.log_dir) {
        (Some(input), _) => {
            println!("Reading input file: {}", input.display());
            let ticks = read_tick_export(input)?;
            println!("Loaded {} ticks\n", ticks.len());
            let report = find_outliers(&ticks, p, args.multiple);
            print_report(&report, &args, &tz);
        }
        (None, Some(log_dir)) => {
            let findings = scan_log_dir(log_dir, p, args.multiple)?;
            print_findings(&findings, &args, &tz);
        }
        (None, None) => bail!("either --input or --log-dir is required"),
    }

    Ok(())
}

fn scan_log_dir(log_dir: &Path, p: f64, multiple: f64) -> Result<Vec<Finding>> {
    let mut files: Vec<(PathBuf, String, NaiveDate)> = fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {}", log_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| {
            let (ticker, date) = parse_log_file_name(&path)?;
            Some((path, ticker, date))
        })
        .collect();
    files.sort();
    info!(files = files.len(), log_dir = %log_dir.display(), "scanning daily logs");

    let mut findings = Vec::new();
    for (path, ticker, date) in files {
        let ticks = match read_tick_export(&path) {
            Ok(ticks) => ticks,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable log");
                continue;
            }
        };
        let report = find_outliers(&ticks, p, multiple);
        println!(
            "{} {}: {} ticks, {} call / {} put outliers",
            ticker,
            date,
            ticks.len(),
            report.calls.outliers.len(),
            report.puts.outliers.len()
        );
        for outlier in report.calls.outliers.into_iter().chain(report.puts.outliers) {
            findings.push(Finding {
                ticker: ticker.clone(),
                date,
                outlier,
            });
        }
    }

    findings.sort_by(|a, b| b.outlier.trade.premium.total_cmp(&a.outlier.trade.premium));
    Ok(findings)
}

fn print_report(report: &OutlierReport, args: &Args, tz: &Tz) {
    for (label, side) in [("CALLS", &report.calls), ("PUTS", &report.puts)] {
        println!("{}", label);
        print_stats(&side.stats, args.percentile);
        if side.outliers.is_empty() {
            println!("  no trades at or above {}x P{}\n", args.multiple, args.percentile);
            continue;
        }
        println!(
            "\n  {:<10}  {:>10}  {:>18}  {:>10}  {:>10}  {:<8}  {:>8}",
            "Expiration", "Strike", "Premium", "Volume", "VWAP", "Time", "Multiple"
        );
        for o in &side.outliers {
            println!(
                "  {:<10}  {:>10.3}  {:>18}  {:>10}  {:>10.4}  {:<8}  {:>7.1}x",
                o.trade.identity.expiration.format("%Y-%m-%d"),
                o.trade.identity.strike,
                format!("${}", format_currency(o.trade.premium)),
                format_count(o.trade.tick.volume),
                o.trade.tick.vwap,
                millis_to_local(o.trade.tick.start_timestamp, tz).format("%H:%M:%S"),
                o.multiple
            );
        }
        println!();
    }
}

fn print_stats(stats: &PremiumStats, selected: f64) {
    println!("  transactions: {}", stats.count);
    println!(
        "  P25 ${}  P50 ${}  P75 ${}  P90 ${}  P99 ${}",
        format_currency(stats.p25),
        format_currency(stats.p50),
        format_currency(stats.p75),
        format_currency(stats.p90),
        format_currency(stats.p99)
    );
    println!("  P{} ${}", selected, format_currency(stats.selected));
}

fn print_findings(findings: &[Finding], args: &Args, tz: &Tz) {
    println!(
        "\nFound {} trades at or above {}x P{}\n",
        findings.len(),
        args.multiple,
        args.percentile
    );
    if findings.is_empty() {
        return;
    }
    println!(
        "{:<8}  {:<4}  {:<10}  {:>10}  {:>18}  {:>10}  {:<10}  {:<8}  {:>8}",
        "Ticker", "Type", "Expiration", "Strike", "Premium", "Volume", "Date", "Time", "Multiple"
    );
    for f in findings {
        let trade = &f.outlier.trade;
        println!(
            "{:<8}  {:<4}  {:<10}  {:>10.3}  {:>18}  {:>10}  {:<10}  {:<8}  {:>7.1}x",
            f.ticker,
            trade.identity.option_type.as_str().to_uppercase(),
            trade.identity.expiration.format("%Y-%m-%d"),
            trade.identity.strike,
            format!("${}", format_currency(trade.premium)),
            format_count(trade.tick.volume),
            f.date,
            millis_to_local(trade.tick.start_timestamp, tz).format("%H:%M:%S"),
            f.outlier.multiple
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optflow_backend::logs::DailyLogWriter;
    use optflow_backend::models::Tick;

    fn tick(symbol: &str, volume: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            volume,
            vwap: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_scan_log_dir_reports_each_file_separately() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DailyLogWriter::new(dir.path(), chrono_tz::America::Los_Angeles);
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();

        // AAPL: nine small calls and one huge one.
        for _ in 0..9 {
            writer.write_for_date(&tick("O:AAPL240419C00150000", 1), date).unwrap();
        }
        writer.write_for_date(&tick("O:AAPL240419C00160000", 40), date).unwrap();
        // MSFT alone would be its own baseline.
        writer.write_for_date(&tick("O:MSFT240419C00300000", 40), date).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let findings = scan_log_dir(dir.path(), 0.5, 10.0).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].ticker, "AAPL");
        assert_eq!(findings[0].date, date);
        assert_eq!(findings[0].outlier.trade.premium, 4_000.0);
        assert_eq!(findings[0].outlier.multiple, 40.0);
    }
}
