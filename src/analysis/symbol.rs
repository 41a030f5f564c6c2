//! Option contract symbol decoding.
//!
//! Format: `O:{UNDERLYING}{YYMMDD}{C|P}{STRIKE}` where the strike is eight digits
//! carrying three implied decimals, e.g. `O:AAPL230616C00150000` is the AAPL
//! 2023-06-16 150.000 call. The underlying has variable length, so the type marker
//! is located by scanning from the right for a `C`/`P` followed by a digit.

use crate::models::{OptionIdentity, OptionType};
use chrono::NaiveDate;

const SYMBOL_PREFIX: &str = "O:";
const EXPIRATION_LEN: usize = 6;
const MIN_SYMBOL_LEN: usize = 7;
const STRIKE_SCALE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    TooShort(String),
    MissingTypeMarker(String),
    MissingExpiration(String),
    InvalidExpiration(String),
    InvalidStrike(String),
    EmptyUnderlying(String),
}

impl std::fmt::Display for SymbolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolError::TooShort(s) => write!(f, "invalid option symbol format: {}", s),
            SymbolError::MissingTypeMarker(s) => {
                write!(f, "could not determine option type from symbol: {}", s)
            }
            SymbolError::MissingExpiration(s) => {
                write!(f, "no room for expiration before type marker: {}", s)
            }
            SymbolError::InvalidExpiration(s) => write!(f, "invalid expiration date in: {}", s),
            SymbolError::InvalidStrike(s) => write!(f, "invalid strike in: {}", s),
            SymbolError::EmptyUnderlying(s) => write!(f, "missing underlying in: {}", s),
        }
    }
}

impl std::error::Error for SymbolError {}

/// Decode a contract symbol into underlying, expiration, strike and type.
pub fn parse_option_symbol(symbol: &str) -> Result<OptionIdentity, SymbolError> {
    let body = symbol.strip_prefix(SYMBOL_PREFIX).unwrap_or(symbol);
    if body.len() < MIN_SYMBOL_LEN {
        return Err(SymbolError::TooShort(symbol.to_string()));
    }

    let (marker, option_type) =
        find_type_marker(body).ok_or_else(|| SymbolError::MissingTypeMarker(symbol.to_string()))?;

    let expiration_start = marker
        .checked_sub(EXPIRATION_LEN)
        .ok_or_else(|| SymbolError::MissingExpiration(symbol.to_string()))?;

    let underlying = &body[..expiration_start];
    if underlying.is_empty() {
        return Err(SymbolError::EmptyUnderlying(symbol.to_string()));
    }

    let expiration = NaiveDate::parse_from_str(&body[expiration_start..marker], "%y%m%d")
        .map_err(|_| SymbolError::InvalidExpiration(symbol.to_string()))?;

    let strike_digits = &body[marker + 1..];
    if !strike_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SymbolError::InvalidStrike(symbol.to_string()));
    }
    let strike = strike_digits
        .parse::<u64>()
        .map_err(|_| SymbolError::InvalidStrike(symbol.to_string()))? as f64
        / STRIKE_SCALE;

    Ok(OptionIdentity {
        underlying: underlying.to_string(),
        expiration,
        strike,
        option_type,
    })
}

/// Underlying ticker for a contract symbol, upper-cased for file naming and subscriptions.
pub fn underlying_symbol(symbol: &str) -> Result<String, SymbolError> {
    parse_option_symbol(symbol).map(|id| id.underlying.to_ascii_uppercase())
}

/// Rightmost `C`/`P` that is immediately followed by an ASCII digit.
fn find_type_marker(body: &str) -> Option<(usize, OptionType)> {
    let bytes = body.as_bytes();
    (0..bytes.len().saturating_sub(1)).rev().find_map(|i| {
        if !bytes[i + 1].is_ascii_digit() {
            return None;
        }
        match bytes[i] {
            b'C' => Some((i, OptionType::Call)),
            b'P' => Some((i, OptionType::Put)),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call_symbol() {
        let id = parse_option_symbol("O:AAPL230616C00150000").unwrap();
        assert_eq!(id.underlying, "AAPL");
        assert_eq!(id.expiration, NaiveDate::from_ymd_opt(2023, 6, 16).unwrap());
        assert_eq!(id.strike, 150.0);
        assert_eq!(id.option_type, OptionType::Call);
    }

    #[test]
    fn test_parse_put_with_fractional_strike() {
        let id = parse_option_symbol("O:SPY240119P00472500").unwrap();
        assert_eq!(id.underlying, "SPY");
        assert_eq!(id.option_type, OptionType::Put);
        assert_eq!(id.strike, 472.5);
    }

    #[test]
    fn test_prefix_is_optional() {
        let id = parse_option_symbol("TSLA231215C00250000").unwrap();
        assert_eq!(id.underlying, "TSLA");
    }

    #[test]
    fn test_underlying_containing_marker_letters() {
        // 'C' and 'P' inside the underlying are not followed by a digit.
        let id = parse_option_symbol("O:CPRT240621P00055000").unwrap();
        assert_eq!(id.underlying, "CPRT");
        assert_eq!(id.option_type, OptionType::Put);
    }

    #[test]
    fn test_missing_marker_fails() {
        assert_eq!(
            parse_option_symbol("O:AAPLXYZ12345"),
            Err(SymbolError::MissingTypeMarker("O:AAPLXYZ12345".to_string()))
        );
    }

    #[test]
    fn test_too_short_fails() {
        assert!(matches!(
            parse_option_symbol("O:C1"),
            Err(SymbolError::TooShort(_))
        ));
    }

    #[test]
    fn test_marker_without_expiration_room_fails() {
        assert!(matches!(
            parse_option_symbol("O:AB1C0015"),
            Err(SymbolError::MissingExpiration(_))
        ));
    }

    #[test]
    fn test_invalid_expiration_fails() {
        assert!(matches!(
            parse_option_symbol("O:AAPL231345C00150000"),
            Err(SymbolError::InvalidExpiration(_))
        ));
    }

    #[test]
    fn test_underlying_symbol_uppercases() {
        assert_eq!(underlying_symbol("O:aapl230616C00150000").unwrap(), "AAPL");
    }
}
