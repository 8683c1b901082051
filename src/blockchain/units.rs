// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Amount and RPC quantity conversions.

use alloy::primitives::U256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Invalid amount format: {0}")]
    Format(String),

    #[error("Too many decimal places (max {0})")]
    TooManyDecimals(u8),

    #[error("Amount overflow")]
    Overflow,
}

/// Parse a human-readable amount (e.g. `"1.5"`) to the smallest unit.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, AmountError> {
    let parts: Vec<&str> = amount.split('.').collect();
    if parts.len() > 2 || parts[0].is_empty() {
        return Err(AmountError::Format(amount.to_string()));
    }

    let whole = U256::from_str_radix(parts[0], 10)
        .map_err(|_| AmountError::Format(amount.to_string()))?;

    let fraction = match parts.get(1) {
        Some(dec) if dec.len() > decimals as usize => {
            return Err(AmountError::TooManyDecimals(decimals))
        }
        Some(dec) => {
            // Pad with zeros to match decimals
            let padded = format!("{:0<width$}", dec, width = decimals as usize);
            U256::from_str_radix(&padded, 10)
                .map_err(|_| AmountError::Format(amount.to_string()))?
        }
        None => U256::ZERO,
    };

    let multiplier = U256::from(10u64).pow(U256::from(decimals));
    whole
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(fraction))
        .ok_or(AmountError::Overflow)
}

/// Format a smallest-unit amount as a human-readable decimal string.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        return whole.to_string();
    }
    let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
    format!("{}.{}", whole, decimal_str.trim_end_matches('0'))
}

/// Parse a JSON-RPC quantity: `0x`-prefixed hex, or a plain decimal string.
pub fn parse_quantity(raw: &str) -> Result<U256, AmountError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some("") => Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(raw, 10),
    };
    parsed.map_err(|_| AmountError::Format(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_whole() {
        let result = parse_amount("1", 18).unwrap();
        assert_eq!(result, U256::from(1_000_000_000_000_000_000u64));
    }

    #[test]
    fn test_parse_amount_decimal() {
        let result = parse_amount("1.5", 18).unwrap();
        assert_eq!(result, U256::from(1_500_000_000_000_000_000u64));

        // 1.5 USDC = 1_500_000 (6 decimals)
        assert_eq!(parse_amount("1.5", 6).unwrap(), U256::from(1_500_000u64));
    }

    #[test]
    fn test_parse_amount_large() {
        // beyond u128 once scaled
        let result = parse_amount("1000000000000000000000", 18).unwrap();
        assert_eq!(result, U256::from(10u64).pow(U256::from(39u64)));
    }

    #[test]
    fn test_parse_amount_errors() {
        assert!(matches!(parse_amount("1.2.3", 18), Err(AmountError::Format(_))));
        assert!(matches!(parse_amount("abc", 18), Err(AmountError::Format(_))));
        assert_eq!(
            parse_amount("0.1234567", 6),
            Err(AmountError::TooManyDecimals(6))
        );
    }

    #[test]
    fn test_format_amount() {
        let one_and_half = U256::from(1_500_000_000_000_000_000u64);
        assert_eq!(format_amount(one_and_half, 18), "1.5");
        assert_eq!(format_amount(U256::from(1_000_000u64), 6), "1");
        assert_eq!(format_amount(U256::ZERO, 18), "0");
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x32").unwrap(), U256::from(50u64));
        assert_eq!(parse_quantity("50").unwrap(), U256::from(50u64));
        assert_eq!(parse_quantity("0x").unwrap(), U256::ZERO);
        assert!(parse_quantity("0xzz").is_err());
    }
}
