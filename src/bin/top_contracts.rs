//! Largest contracts by total premium in one tick export.
//!
//! Usage:
//!   cargo run --bin optflow-top-contracts -- --input ./logs/AAPL_2024-03-15.jsonl --top 10
//!   cargo run --bin optflow-top-contracts -- --input ticks.json --output top.json

use anyhow::{bail, Context, Result};
use clap::Parser;
use optflow_backend::analysis::{format_count, format_currency, top_contracts, ContractSummary};
use optflow_backend::logs::read_tick_export;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "optflow-top-contracts")]
#[command(about = "Rank option contracts by total premium")]
struct Args {
    /// Tick export to read (JSONL or a JSON array)
    #[arg(long)]
    input: PathBuf,

    /// How many contracts to show
    #[arg(long, default_value = "5")]
    top: usize,

    /// Also write the ranking as pretty JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optflow_top_contracts=info,optflow_backend=warn".into()),
        )
        .init();

    let args = Args::parse();
    if args.top == 0 {
        bail!("--top must be greater than 0");
    }

    println!("Reading input file: {}", args.input.display());
    let ticks = read_tick_export(&args.input)?;
    println!("Loaded {} ticks", ticks.len());

    let top = top_contracts(&ticks, args.top);
    println!("\nTop {} contracts by total premium\n", top.len());
    print_table(&top);

    if let Some(output) = &args.output {
        write_json(&top, output)?;
        info!(path = %output.display(), "wrote ranking");
        println!("\nSuccessfully wrote results to {}", output.display());
    }

    Ok(())
}

fn print_table(contracts: &[ContractSummary]) {
    println!(
        "{:>4}  {:<10}  {:<10}  {:>10}  {:<4}  {:>18}  {:>12}  {:>12}",
        "Rank", "Underlying", "Expiration", "Strike", "Type", "Total Premium", "Total Volume", "Transactions"
    );
    println!("{}", "-".repeat(98));
    for (i, c) in contracts.iter().enumerate() {
        println!(
            "{:>4}  {:<10}  {:<10}  {:>10.3}  {:<4}  {:>18}  {:>12}  {:>12}",
            i + 1,
            c.identity.underlying,
            c.identity.expiration.format("%Y-%m-%d"),
            c.identity.strike,
            c.option_type.as_str().to_uppercase(),
            format!("${}", format_currency(c.total_premium)),
            format_count(c.total_volume),
            c.transaction_count
        );
    }
}

fn write_json(contracts: &[ContractSummary], path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), contracts)
        .context("Failed to write JSON output")
}
