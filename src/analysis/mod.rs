pub mod aggregator;
pub mod contracts;
pub mod format;
pub mod outliers;
pub mod symbol;

pub use aggregator::{accumulate, aggregate_premiums, bucket_bounds, calculate_premium, period_ms, round_down_to_period, CONTRACT_MULTIPLIER};
pub use contracts::{rank_contracts, top_contracts, ContractSummary};
pub use format::{format_count, format_currency, format_ratio};
pub use outliers::{find_outliers, percentile, Outlier, OutlierReport, PremiumStats, SideReport};
pub use symbol::{parse_option_symbol, underlying_symbol, SymbolError};
