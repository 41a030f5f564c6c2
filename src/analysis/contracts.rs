//! Per-contract premium totals.

use super::aggregator::calculate_premium;
use super::symbol::parse_option_symbol;
use crate::models::{OptionIdentity, OptionType, Tick};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractSummary {
    pub symbol: String,
    pub option_type: OptionType,
    pub total_premium: f64,
    pub total_volume: i64,
    pub transaction_count: usize,
    #[serde(skip)]
    pub identity: OptionIdentity,
}

/// Every contract seen in `ticks`, largest total premium first.
///
/// Ties are broken by symbol so the ranking is stable across runs.
pub fn rank_contracts(ticks: &[Tick]) -> Vec<ContractSummary> {
    let mut by_symbol: HashMap<&str, ContractSummary> = HashMap::new();

    for tick in ticks {
        let Ok(identity) = parse_option_symbol(&tick.symbol) else {
            continue;
        };
        let premium = calculate_premium(tick.volume, tick.vwap);
        let entry = by_symbol
            .entry(tick.symbol.as_str())
            .or_insert_with(|| ContractSummary {
                symbol: tick.symbol.clone(),
                option_type: identity.option_type,
                total_premium: 0.0,
                total_volume: 0,
                transaction_count: 0,
                identity,
            });
        entry.total_premium += premium;
        entry.total_volume += tick.volume;
        entry.transaction_count += 1;
    }

    let mut ranked: Vec<ContractSummary> = by_symbol.into_values().collect();
    ranked.sort_by(|a, b| {
        b.total_premium
            .total_cmp(&a.total_premium)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    ranked
}

/// The `n` contracts with the most premium.
pub fn top_contracts(ticks: &[Tick], n: usize) -> Vec<ContractSummary> {
    let mut ranked = rank_contracts(ticks);
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tick(symbol: &str, volume: i64, vwap: f64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            volume,
            vwap,
            ..Default::default()
        }
    }

    #[test]
    fn test_rank_contracts_groups_by_symbol() {
        let ticks = vec![
            tick("O:AAPL230616C00150000", 10, 1.0),
            tick("O:AAPL230616P00140000", 5, 4.0),
            tick("O:AAPL230616C00150000", 20, 1.0),
            tick("garbage", 1_000, 1_000.0),
        ];
        let ranked = rank_contracts(&ticks);
        assert_eq!(ranked.len(), 2);

        assert_eq!(ranked[0].symbol, "O:AAPL230616C00150000");
        assert_eq!(ranked[0].total_premium, 3_000.0);
        assert_eq!(ranked[0].total_volume, 30);
        assert_eq!(ranked[0].transaction_count, 2);
        assert_eq!(ranked[0].option_type, OptionType::Call);
        assert_eq!(ranked[0].identity.strike, 150.0);

        assert_eq!(ranked[1].total_premium, 2_000.0);
        assert_eq!(ranked[1].option_type, OptionType::Put);
        assert_eq!(
            ranked[1].identity.expiration,
            NaiveDate::from_ymd_opt(2023, 6, 16).unwrap()
        );
    }

    #[test]
    fn test_top_contracts_truncates_and_breaks_ties() {
        let ticks = vec![
            tick("O:MSFT230616C00300000", 1, 1.0),
            tick("O:AAPL230616C00150000", 1, 1.0),
            tick("O:TSLA230616P00200000", 3, 1.0),
        ];
        let top = top_contracts(&ticks, 2);
        let symbols: Vec<&str> = top.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["O:TSLA230616P00200000", "O:AAPL230616C00150000"]);

        assert_eq!(top_contracts(&ticks, 10).len(), 3);
        assert!(top_contracts(&[], 5).is_empty());
    }

    #[test]
    fn test_summary_json_omits_identity() {
        let top = top_contracts(&[tick("O:AAPL230616C00150000", 1, 2.0)], 1);
        let value = serde_json::to_value(&top[0]).unwrap();
        assert_eq!(value["option_type"], "call");
        assert_eq!(value["total_premium"], 200.0);
        assert!(value.get("identity").is_none());
    }
}
