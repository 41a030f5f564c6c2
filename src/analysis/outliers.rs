//! Premium distribution and outlier trades.
//!
//! Calls and puts are measured separately. A trade is an outlier when its
//! premium reaches `multiple` times the chosen percentile of its side.

use super::aggregator::calculate_premium;
use super::symbol::parse_option_symbol;
use crate::models::{OptionIdentity, OptionType, Tick};

/// Linearly interpolated percentile of an ascending slice, `p` in `[0, 1]`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let Some(last) = sorted.last() else {
        return 0.0;
    };
    let index = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = lower + 1;
    if upper >= sorted.len() {
        return *last;
    }
    let weight = index - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PremiumStats {
    pub count: usize,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p99: f64,
    /// The percentile the outlier cutoff is derived from.
    pub selected: f64,
}

impl PremiumStats {
    pub fn from_premiums(premiums: &[f64], selected_percentile: f64) -> Self {
        let mut sorted = premiums.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            count: sorted.len(),
            p25: percentile(&sorted, 0.25),
            p50: percentile(&sorted, 0.50),
            p75: percentile(&sorted, 0.75),
            p90: percentile(&sorted, 0.90),
            p99: percentile(&sorted, 0.99),
            selected: percentile(&sorted, selected_percentile),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PremiumTrade {
    pub tick: Tick,
    pub identity: OptionIdentity,
    pub premium: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outlier {
    pub trade: PremiumTrade,
    /// Premium divided by the selected percentile.
    pub multiple: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideReport {
    pub stats: PremiumStats,
    /// Largest premium first.
    pub outliers: Vec<Outlier>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlierReport {
    pub calls: SideReport,
    pub puts: SideReport,
}

impl OutlierReport {
    pub fn is_empty(&self) -> bool {
        self.calls.outliers.is_empty() && self.puts.outliers.is_empty()
    }
}

/// Percentile statistics per side and the trades at or above
/// `multiple x P(percentile)`. `percentile` is in `[0, 1]`.
pub fn find_outliers(ticks: &[Tick], percentile: f64, multiple: f64) -> OutlierReport {
    let mut calls = Vec::new();
    let mut puts = Vec::new();
    for tick in ticks {
        let Ok(identity) = parse_option_symbol(&tick.symbol) else {
            continue;
        };
        let trade = PremiumTrade {
            premium: calculate_premium(tick.volume, tick.vwap),
            tick: tick.clone(),
            identity,
        };
        match trade.identity.option_type {
            OptionType::Call => calls.push(trade),
            OptionType::Put => puts.push(trade),
        }
    }

    OutlierReport {
        calls: side_report(calls, percentile, multiple),
        puts: side_report(puts, percentile, multiple),
    }
}

fn side_report(trades: Vec<PremiumTrade>, percentile: f64, multiple: f64) -> SideReport {
    let premiums: Vec<f64> = trades.iter().map(|t| t.premium).collect();
    let stats = PremiumStats::from_premiums(&premiums, percentile);

    // A zero baseline would flag every trade.
    if stats.selected <= 0.0 {
        return SideReport {
            stats,
            outliers: Vec::new(),
        };
    }

    let cutoff = stats.selected * multiple;
    let mut outliers: Vec<Outlier> = trades
        .into_iter()
        .filter(|t| t.premium >= cutoff)
        .map(|trade| Outlier {
            multiple: trade.premium / stats.selected,
            trade,
        })
        .collect();
    outliers.sort_by(|a, b| b.trade.premium.total_cmp(&a.trade.premium));

    SideReport { stats, outliers }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, volume: i64, vwap: f64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            volume,
            vwap,
            ..Default::default()
        }
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&sorted, 0.0), 10.0);
        assert_eq!(percentile(&sorted, 0.5), 30.0);
        assert_eq!(percentile(&sorted, 1.0), 50.0);
        // index 0.9 * 4 = 3.6
        assert!((percentile(&sorted, 0.9) - 46.0).abs() < 1e-9);
        assert!((percentile(&sorted, 0.25) - 20.0).abs() < 1e-9);
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(percentile(&[7.0], 0.99), 7.0);
    }

    #[test]
    fn test_stats_sort_their_input() {
        let stats = PremiumStats::from_premiums(&[300.0, 100.0, 200.0], 0.5);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.p50, 200.0);
        assert_eq!(stats.selected, 200.0);
        assert!((stats.p25 - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_outliers_per_side() {
        let mut ticks: Vec<Tick> = (0..9)
            .map(|_| tick("O:AAPL230616C00150000", 1, 1.0))
            .collect();
        ticks.push(tick("O:AAPL230616C00160000", 50, 1.0));
        ticks.push(tick("O:AAPL230616P00140000", 2, 1.0));

        let report = find_outliers(&ticks, 0.5, 10.0);
        assert_eq!(report.calls.stats.count, 10);
        assert_eq!(report.calls.stats.selected, 100.0);
        assert_eq!(report.calls.outliers.len(), 1);

        let outlier = &report.calls.outliers[0];
        assert_eq!(outlier.trade.premium, 5_000.0);
        assert_eq!(outlier.multiple, 50.0);
        assert_eq!(outlier.trade.identity.strike, 160.0);

        // A single put is its own percentile and never 10x itself.
        assert_eq!(report.puts.stats.count, 1);
        assert!(report.puts.outliers.is_empty());
        assert!(!report.is_empty());
    }

    #[test]
    fn test_zero_baseline_flags_nothing() {
        let ticks = vec![
            tick("O:AAPL230616C00150000", 0, 1.0),
            tick("O:AAPL230616C00150000", 0, 1.0),
            tick("O:AAPL230616C00150000", 10, 1.0),
        ];
        let report = find_outliers(&ticks, 0.5, 2.0);
        assert_eq!(report.calls.stats.selected, 0.0);
        assert!(report.is_empty());
    }
}
