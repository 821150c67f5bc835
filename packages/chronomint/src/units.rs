//! Fixed-point token amounts
//!
//! Conversions between integer base units and decimal strings are exact:
//! amounts never pass through floating point. Display helpers round in
//! integer arithmetic as well.

use alloy::primitives::U256;
use thiserror::Error;

/// Payment token (USDC) decimal places
pub const PAYMENT_DECIMALS: u8 = 6;

/// Reward token (CHRONO) decimal places
pub const REWARD_DECIMALS: u8 = 18;

/// Native currency (TEMPO) decimal places
pub const NATIVE_DECIMALS: u8 = 18;

const BASIS_POINTS: u64 = 10_000;

/// Amount parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("amount is empty")]
    Empty,
    #[error("invalid amount: {0:?}")]
    Invalid(String),
    #[error("too many decimal places: {given} given, token supports {max}")]
    TooManyDecimals { given: usize, max: u8 },
    #[error("amount does not fit in 256 bits")]
    Overflow,
}

/// Parse a decimal string ("12.5") into base units at `decimals` precision
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, UnitsError> {
    let amount = amount.trim();
    if amount.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (int_part, frac_part) = amount.split_once('.').unwrap_or((amount, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(UnitsError::Invalid(amount.to_string()));
    }

    if frac_part.len() > decimals as usize {
        return Err(UnitsError::TooManyDecimals {
            given: frac_part.len(),
            max: decimals,
        });
    }

    let mut digits = String::with_capacity(int_part.len() + decimals as usize);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    digits.extend(std::iter::repeat('0').take(decimals as usize - frac_part.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| UnitsError::Overflow)
}

/// Parse user input, treating anything unparseable as zero
pub fn parse_units_or_zero(amount: &str, decimals: u8) -> U256 {
    parse_units(amount, decimals).unwrap_or(U256::ZERO)
}

/// Format base units as a canonical decimal string.
///
/// Trailing fractional zeros are trimmed but at least one fractional digit is
/// kept, so `1_000_000` at 6 decimals is `"1.0"`. `parse_units` reads every
/// output back to the same integer.
pub fn format_units(raw: U256, decimals: u8) -> String {
    let (int_part, frac_part) = split_digits(raw, decimals as usize);
    let frac = frac_part.trim_end_matches('0');
    let frac = if frac.is_empty() { "0" } else { frac };
    format!("{}.{}", int_part, frac)
}

/// Format base units for display: rounded half-up to `frac_digits` places,
/// thousands grouped with commas (e.g. `"1,250.00"`).
pub fn format_display(raw: U256, decimals: u8, frac_digits: u8) -> String {
    let value = rescale_rounded(raw, decimals, frac_digits);
    let (int_part, frac_part) = split_digits(value, frac_digits as usize);
    let grouped = group_thousands(&int_part);
    if frac_part.is_empty() {
        grouped
    } else {
        format!("{}.{}", grouped, frac_part)
    }
}

/// Convert an amount between precisions (exact when scaling up, truncating down)
pub fn rescale(raw: U256, from_decimals: u8, to_decimals: u8) -> U256 {
    if to_decimals >= from_decimals {
        raw.saturating_mul(pow10(to_decimals - from_decimals))
    } else {
        raw / pow10(from_decimals - to_decimals)
    }
}

/// CHRONO base units received for `cost` USDC base units at `rate` CHRONO per USDC
pub fn reward_for_payment(cost: U256, rate: U256) -> U256 {
    rescale(cost.saturating_mul(rate), PAYMENT_DECIMALS, REWARD_DECIMALS)
}

/// Progress in basis points, clamped to 100%. Zero when `cap` is zero.
pub fn progress_basis_points(raised: U256, cap: U256) -> u64 {
    if cap.is_zero() {
        return 0;
    }
    let bps = raised.saturating_mul(U256::from(BASIS_POINTS)) / cap;
    u64::try_from(bps).unwrap_or(BASIS_POINTS).min(BASIS_POINTS)
}

/// Progress percentage (0.0 ..= 100.0), two decimal places of precision
pub fn progress_percent(raised: U256, cap: U256) -> f64 {
    progress_basis_points(raised, cap) as f64 / 100.0
}

/// Progress percentage label, e.g. `"65.0%"`
pub fn format_progress(raised: U256, cap: U256) -> String {
    format!("{:.1}%", progress_percent(raised, cap))
}

/// Shorten a hex string to `0x1234...abcd`
pub fn shorten_hex(value: &str) -> String {
    if value.len() <= 10 || !value.is_ascii() {
        return value.to_string();
    }
    format!("{}...{}", &value[..6], &value[value.len() - 4..])
}

fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

fn rescale_rounded(raw: U256, from_decimals: u8, to_decimals: u8) -> U256 {
    if to_decimals >= from_decimals {
        return rescale(raw, from_decimals, to_decimals);
    }
    let scale = pow10(from_decimals - to_decimals);
    let half = scale / U256::from(2u64);
    raw.saturating_add(half) / scale
}

/// Split the decimal digits of `raw` into integer and fractional parts
fn split_digits(raw: U256, decimals: usize) -> (String, String) {
    let mut digits = raw.to_string();
    if digits.len() <= decimals {
        let pad = "0".repeat(decimals + 1 - digits.len());
        digits = pad + &digits;
    }
    let frac = digits.split_off(digits.len() - decimals);
    (digits, frac)
}

fn group_thousands(int_part: &str) -> String {
    let len = int_part.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units_payment_token() {
        assert_eq!(parse_units("100", 6).unwrap(), U256::from(100_000_000u64));
        assert_eq!(parse_units("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_units("0.000001", 6).unwrap(), U256::from(1u64));
        assert_eq!(parse_units(".5", 6).unwrap(), U256::from(500_000u64));
        assert_eq!(parse_units("7.", 6).unwrap(), U256::from(7_000_000u64));
        assert_eq!(parse_units("0", 6).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_parse_units_reward_token() {
        assert_eq!(
            parse_units("1.5", 18).unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert_eq!(
            parse_units("1250", 18).unwrap(),
            U256::from(1_250_000_000_000_000_000_000u128)
        );
    }

    #[test]
    fn test_parse_units_rejects_bad_input() {
        assert_eq!(parse_units("", 6), Err(UnitsError::Empty));
        assert_eq!(parse_units("   ", 6), Err(UnitsError::Empty));
        assert!(matches!(parse_units("abc", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units("-1", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units("1.2.3", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units("1e6", 6), Err(UnitsError::Invalid(_))));
        assert!(matches!(parse_units(".", 6), Err(UnitsError::Invalid(_))));
        assert_eq!(
            parse_units("0.0000001", 6),
            Err(UnitsError::TooManyDecimals { given: 7, max: 6 })
        );
    }

    #[test]
    fn test_parse_units_overflow() {
        let huge = "9".repeat(90);
        assert_eq!(parse_units(&huge, 18), Err(UnitsError::Overflow));
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(1_000_000u64), 6), "1.0");
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(1u64), 6), "0.000001");
        assert_eq!(format_units(U256::ZERO, 18), "0.0");
        assert_eq!(
            format_units(U256::from(12_560_000_000_000_000_000u128), 18),
            "12.56"
        );
    }

    #[test]
    fn test_decimal_round_trip_is_exact() {
        for decimals in [PAYMENT_DECIMALS, REWARD_DECIMALS] {
            for amount in ["0.1", "1.0", "0.000001", "6500.0", "123456789.654321", "500.75"] {
                let raw = parse_units(amount, decimals).unwrap();
                assert_eq!(format_units(raw, decimals), amount, "decimals={decimals}");
                assert_eq!(parse_units(&format_units(raw, decimals), decimals).unwrap(), raw);
            }
        }

        let max = U256::MAX;
        assert_eq!(parse_units(&format_units(max, 18), 18).unwrap(), max);
    }

    #[test]
    fn test_reward_for_payment() {
        assert_eq!(
            reward_for_payment(parse_units("2.5", 6).unwrap(), U256::from(100u64)),
            parse_units("250", 18).unwrap()
        );
        assert_eq!(reward_for_payment(U256::ZERO, U256::from(100u64)), U256::ZERO);
    }

    #[test]
    fn test_format_display_rounds_and_groups() {
        let chrono = parse_units("1250", 18).unwrap();
        assert_eq!(format_display(chrono, 18, 2), "1,250.00");

        let usdc = parse_units("500.755", 6).unwrap();
        assert_eq!(format_display(usdc, 6, 2), "500.76");

        let usdc = parse_units("1234567.004", 6).unwrap();
        assert_eq!(format_display(usdc, 6, 2), "1,234,567.00");

        assert_eq!(format_display(U256::ZERO, 18, 2), "0.00");
        assert_eq!(format_display(U256::from(999u64), 0, 0), "999");
        assert_eq!(format_display(U256::from(1000u64), 0, 0), "1,000");
    }

    #[test]
    fn test_rescale() {
        let usdc = parse_units("2", PAYMENT_DECIMALS).unwrap();
        assert_eq!(
            rescale(usdc, PAYMENT_DECIMALS, REWARD_DECIMALS),
            parse_units("2", REWARD_DECIMALS).unwrap()
        );
        assert_eq!(rescale(U256::from(1_999_999u64), 6, 0), U256::from(1u64));
    }

    #[test]
    fn test_progress() {
        let raised = parse_units("6500", 6).unwrap();
        let cap = parse_units("10000", 6).unwrap();
        assert_eq!(progress_basis_points(raised, cap), 6500);
        assert_eq!(format_progress(raised, cap), "65.0%");

        assert_eq!(progress_percent(raised, U256::ZERO), 0.0);
        assert_eq!(format_progress(cap * U256::from(3u64), cap), "100.0%");
        assert_eq!(format_progress(U256::ZERO, cap), "0.0%");
    }

    #[test]
    fn test_shorten_hex() {
        let hash = "0x1a2b000000000000000000000000000000000000000000000000000000c3d4";
        assert_eq!(shorten_hex(hash), "0x1a2b...c3d4");
        assert_eq!(shorten_hex("0x1234"), "0x1234");
    }
}
