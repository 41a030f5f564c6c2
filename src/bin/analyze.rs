//! Batch premium replay.
//!
//! Aggregates one tick export (JSONL log or JSON array) or every log for a date
//! into fixed-width buckets and prints a table.
//!
//! Usage:
//!   cargo run --bin optflow-analyze -- --input ./logs/AAPL_2024-03-15.jsonl --period 5
//!   cargo run --bin optflow-analyze -- --date 2024-03-15 --ticker AAPL --output out.json

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use clap::Parser;
use optflow_backend::analysis::{aggregate_premiums, format_currency, format_ratio};
use optflow_backend::logs::{analyze_date, analyze_ticker_and_date, parse_date, read_tick_export};
use optflow_backend::models::PeriodSummary;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "optflow-analyze")]
#[command(about = "Aggregate option premiums by time period from recorded ticks")]
struct Args {
    /// Tick export to read (JSONL or a JSON array)
    #[arg(long, conflicts_with = "date", required_unless_present = "date")]
    input: Option<PathBuf>,

    /// Analyze the daily logs for this date (YYYY-MM-DD) instead of a single file
    #[arg(long)]
    date: Option<String>,

    /// Only this ticker's log when --date is used
    #[arg(long, requires = "date")]
    ticker: Option<String>,

    #[arg(long, env = "LOG_DIR", default_value = "./logs")]
    log_dir: PathBuf,

    /// Bucket width in minutes
    #[arg(long, default_value = "5")]
    period: u32,

    #[arg(long, env = "REFERENCE_TZ", default_value = "America/Los_Angeles")]
    timezone: String,

    /// Also write the summaries as pretty JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optflow_analyze=info,optflow_backend=warn".into()),
        )
        .init();

    let args = Args::parse();
    if args.period == 0 {
        bail!("--period must be greater than 0");
    }
    let tz: Tz = args
        .timezone
        .parse()
        .map_err(|e| anyhow!("unknown timezone {}: {}", args.timezone, e))?;

    let summaries = match (&args.input, &args.date) {
        (Some(input), _) => {
            println!("Reading input file: {}", input.display());
            let ticks = read_tick_export(input)?;
            println!("Loaded {} ticks", ticks.len());
            aggregate_premiums(&ticks, args.period, &tz)
        }
        (None, Some(date)) => {
            let date = parse_date(date).ok_or_else(|| anyhow!("invalid date {}, expected YYYY-MM-DD", date))?;
            match &args.ticker {
                Some(ticker) => analyze_ticker_and_date(
                    &args.log_dir,
                    &ticker.to_uppercase(),
                    date,
                    args.period,
                    &tz,
                )?,
                None => analyze_date(&args.log_dir, date, args.period, &tz)?,
            }
        }
        (None, None) => bail!("either --input or --date is required"),
    };

    println!(
        "Found {} time periods ({}-minute buckets)\n",
        summaries.len(),
        args.period
    );
    print_table(&summaries);

    if let Some(output) = &args.output {
        write_json(&summaries, output)?;
        info!(path = %output.display(), "wrote summaries");
        println!("\nSuccessfully wrote results to {}", output.display());
    }

    Ok(())
}

fn print_table(summaries: &[PeriodSummary]) {
    println!(
        "{:<19}  {:>20}  {:>19}  {:>21}  {:>14}",
        "Time Period", "Call Premium", "Put Premium", "Total Premium", "Call/Put Ratio"
    );
    println!(
        "{:<19}  {:>20}  {:>19}  {:>21}  {:>14}",
        "-".repeat(19),
        "-".repeat(12),
        "-".repeat(11),
        "-".repeat(13),
        "-".repeat(14)
    );
    for s in summaries {
        println!(
            "{:<19}  {:>20}  {:>19}  {:>21}  {:>14}",
            s.period_start.format("%Y-%m-%d %H:%M:%S"),
            format!("${}", format_currency(s.call_premium)),
            format!("${}", format_currency(s.put_premium)),
            format!("${}", format_currency(s.total_premium)),
            format_ratio(s.call_put_ratio)
        );
    }
}

fn write_json(summaries: &[PeriodSummary], path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summaries)
        .context("Failed to write JSON output")
}
