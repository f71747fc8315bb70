use alloy::primitives::U256;
use rust_decimal::Decimal;
use thiserror::Error;

/// Basis points in one whole (100%).
pub const BPS_SCALE: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is negative")]
    Negative,

    #[error("amount not representable in {0} decimals")]
    PrecisionLoss(u8),

    #[error("invalid decimal string: {0}")]
    InvalidFormat(String),

    #[error("amount overflows 256 bits")]
    Overflow,
}

pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Convert a decimal value into the token's smallest unit.
///
/// Fails if the value is negative or carries more fractional digits than the
/// token has decimals.
pub fn to_raw(value: Decimal, decimals: u8) -> Result<U256, AmountError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AmountError::Negative);
    }

    let mantissa = value.mantissa().unsigned_abs();
    let scale = value.scale();

    if scale <= decimals as u32 {
        let factor = pow10(decimals - scale as u8);
        U256::from(mantissa)
            .checked_mul(factor)
            .ok_or(AmountError::Overflow)
    } else {
        let divisor = 10u128.pow(scale - decimals as u32);
        if mantissa % divisor != 0 {
            return Err(AmountError::PrecisionLoss(decimals));
        }
        Ok(U256::from(mantissa / divisor))
    }
}

/// Render a raw amount as a plain decimal string with no trailing zeros.
pub fn format_raw(raw: U256, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let scale = pow10(decimals);
    let whole = raw / scale;
    let frac = raw % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac_str = format!("{frac:0>width$}", width = decimals as usize);
    let trimmed = frac_str.trim_end_matches('0');
    format!("{whole}.{trimmed}")
}

/// Parse a plain decimal string into the token's smallest unit. Inverse of
/// [`format_raw`] for every amount representable in `decimals` digits.
pub fn parse_raw(s: &str, decimals: u8) -> Result<U256, AmountError> {
    let s = s.trim();
    if s.is_empty() || s.starts_with('-') {
        return Err(AmountError::InvalidFormat(s.to_string()));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };

    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(AmountError::InvalidFormat(s.to_string()));
    }
    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::InvalidFormat(s.to_string()));
    }

    // Fractional digits past the token's precision must be zero.
    let (kept, excess) = if frac.len() > decimals as usize {
        frac.split_at(decimals as usize)
    } else {
        (frac, "")
    };
    if excess.chars().any(|c| c != '0') {
        return Err(AmountError::PrecisionLoss(decimals));
    }

    let whole_part = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| AmountError::Overflow)?
    };

    let frac_part = if kept.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{kept:0<width$}", width = decimals as usize);
        U256::from_str_radix(&padded, 10).map_err(|_| AmountError::Overflow)?
    };

    whole_part
        .checked_mul(pow10(decimals))
        .and_then(|w| w.checked_add(frac_part))
        .ok_or(AmountError::Overflow)
}

/// `amount × bps / 10_000`, truncating toward zero.
pub fn apply_bps(amount: U256, bps: u64) -> U256 {
    amount * U256::from(bps) / U256::from(BPS_SCALE)
}

/// `amount × pct / 100` via basis points, truncating toward zero.
pub fn percent_of(amount: U256, pct: u32) -> U256 {
    apply_bps(amount, pct as u64 * 100)
}

/// Lossy conversion for display and PnL arithmetic; `None` when the value
/// exceeds `Decimal` range.
pub fn raw_to_decimal(raw: U256, decimals: u8) -> Option<Decimal> {
    let s = format_raw(raw, decimals);
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_to_raw_usdc() {
        // 1000.00 at 6 decimals
        let d = Decimal::from_str("1000.00").unwrap();
        assert_eq!(to_raw(d, 6).unwrap(), U256::from(1_000_000_000u64));
    }

    #[test]
    fn test_to_raw_precision_loss() {
        let d = Decimal::from_str("0.0000001").unwrap(); // 7 digits at 6 decimals
        assert_eq!(to_raw(d, 6), Err(AmountError::PrecisionLoss(6)));
    }

    #[test]
    fn test_to_raw_negative() {
        let d = Decimal::from_str("-1").unwrap();
        assert_eq!(to_raw(d, 6), Err(AmountError::Negative));
    }

    #[test]
    fn test_format_trims_trailing_zeros() {
        assert_eq!(format_raw(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_raw(U256::from(1_000_000u64), 6), "1");
        assert_eq!(format_raw(U256::ZERO, 18), "0");
        assert_eq!(format_raw(U256::from(1u64), 6), "0.000001");
    }

    #[test]
    fn test_round_trip_law() {
        // parse(format(toRaw(x, d), d), d) == toRaw(x, d)
        for (s, d) in [
            ("1000.00", 6u8),
            ("0.000001", 6),
            ("123456.789", 9),
            ("0.001", 18),
            ("42", 0),
            ("7", 18),
        ] {
            let x = Decimal::from_str(s).unwrap();
            let raw = to_raw(x, d).unwrap();
            assert_eq!(parse_raw(&format_raw(raw, d), d).unwrap(), raw, "{s}@{d}");
        }
    }

    #[test]
    fn test_parse_excess_zeros_ok() {
        assert_eq!(parse_raw("1.50000000", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_raw("1.0000001", 6), Err(AmountError::PrecisionLoss(6)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_raw("", 6).is_err());
        assert!(parse_raw("-5", 6).is_err());
        assert!(parse_raw("1.2.3", 6).is_err());
        assert!(parse_raw("abc", 6).is_err());
        assert!(parse_raw(".", 6).is_err());
    }

    #[test]
    fn test_percent_of_truncates() {
        // 20% of 1000 USDC (raw 1_000_000_000) = 200_000_000
        assert_eq!(
            percent_of(U256::from(1_000_000_000u64), 20),
            U256::from(200_000_000u64)
        );
        // Truncation toward zero: 33% of 10 = 3
        assert_eq!(percent_of(U256::from(10u64), 33), U256::from(3u64));
    }

    #[test]
    fn test_apply_bps() {
        // 50 bps of 10_000 = 50
        assert_eq!(apply_bps(U256::from(10_000u64), 50), U256::from(50u64));
    }
}
