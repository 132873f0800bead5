//! Exact decimal-percent parsing.
//!
//! RULE: No probability ever passes through binary floating point on its
//! way to a weight. Rates are parsed digit by digit into integer units
//! (`UNITS_PER_PERCENT` per 1%). Digits past the seventh fractional place
//! are truncated, never rounded.
//!
//! Accepted shape: optional surrounding whitespace, optional leading `-`,
//! one or more digits, optionally `.` followed by one or more digits.

use crate::types::{Weight, FRACTION_DIGITS, UNITS_PER_PERCENT};
use serde::{Deserialize, Serialize};

/// Why a rate string was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Did not match `-?digits(.digits)?`.
    Malformed,
    /// Well-formed, but too large to hold as a 64-bit weight.
    OutOfRange,
}

/// Classification of one rate string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedRate {
    /// A non-negative weight (possibly zero).
    Weight(Weight),
    /// A well-formed negative rate; carries its magnitude in units.
    Negative(Weight),
    Invalid(InvalidReason),
}

impl ParsedRate {
    /// The weight this rate contributes to a draw. Negative and invalid
    /// rates contribute nothing.
    pub fn weight(self) -> Weight {
        match self {
            Self::Weight(w) => w,
            Self::Negative(_) | Self::Invalid(_) => 0,
        }
    }
}

pub fn parse_rate(text: &str) -> ParsedRate {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (unsigned, None),
    };

    if !is_digits(int_part) || frac_part.is_some_and(|f| !is_digits(f)) {
        return ParsedRate::Invalid(InvalidReason::Malformed);
    }

    // Pad with zeros or truncate to exactly FRACTION_DIGITS places.
    let frac_digits = frac_part.unwrap_or("").as_bytes();
    let frac_units = (0..FRACTION_DIGITS).fold(0u64, |acc, i| {
        let digit = frac_digits.get(i).map_or(0, |b| u64::from(b - b'0'));
        acc * 10 + digit
    });

    let units = int_part
        .parse::<u64>()
        .ok()
        .and_then(|whole| whole.checked_mul(UNITS_PER_PERCENT))
        .and_then(|whole| whole.checked_add(frac_units));

    match units {
        None => ParsedRate::Invalid(InvalidReason::OutOfRange),
        Some(0) => ParsedRate::Weight(0),
        Some(w) if negative => ParsedRate::Negative(w),
        Some(w) => ParsedRate::Weight(w),
    }
}

/// Parse a percent string into fixed-point units, clamping negative and
/// invalid input to zero. Use [`parse_rate`] to tell those cases apart.
pub fn parse_to_fixed_point(text: &str) -> Weight {
    parse_rate(text).weight()
}

/// Render fixed-point units as a percent with exactly seven decimals.
pub fn format_percent(units: Weight) -> String {
    format!(
        "{}.{:0width$}",
        units / UNITS_PER_PERCENT,
        units % UNITS_PER_PERCENT,
        width = FRACTION_DIGITS
    )
}

/// Display-only conversion. Never feed the result back into a decision.
pub fn units_to_percent_f64(units: Weight) -> f64 {
    units as f64 / UNITS_PER_PERCENT as f64
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_scale_by_units_per_percent() {
        assert_eq!(parse_rate("50"), ParsedRate::Weight(500_000_000));
        assert_eq!(parse_rate("100"), ParsedRate::Weight(1_000_000_000));
        assert_eq!(parse_rate("0"), ParsedRate::Weight(0));
    }

    #[test]
    fn short_fractions_are_right_padded() {
        assert_eq!(parse_rate("0.5"), ParsedRate::Weight(5_000_000));
        assert_eq!(parse_rate("12.30"), ParsedRate::Weight(123_000_000));
        assert_eq!(parse_rate("0.0000001"), ParsedRate::Weight(1));
    }

    #[test]
    fn long_fractions_are_truncated_not_rounded() {
        assert_eq!(parse_rate("12.3456789"), ParsedRate::Weight(123_456_789));
        assert_eq!(parse_rate("12.34567891"), ParsedRate::Weight(123_456_789));
        assert_eq!(parse_rate("0.00000009"), ParsedRate::Weight(0));
        assert_eq!(parse_rate("1.99999999999"), ParsedRate::Weight(19_999_999));
    }

    #[test]
    fn leading_and_trailing_zeros_are_harmless() {
        assert_eq!(parse_rate("007.5"), ParsedRate::Weight(75_000_000));
        assert_eq!(parse_rate("7.5000000000"), ParsedRate::Weight(75_000_000));
        assert_eq!(parse_rate("  7.5 "), ParsedRate::Weight(75_000_000));
    }

    #[test]
    fn negative_rates_are_classified_separately() {
        assert_eq!(parse_rate("-5"), ParsedRate::Negative(50_000_000));
        assert_eq!(parse_rate("-0.0000001"), ParsedRate::Negative(1));
        assert_eq!(parse_to_fixed_point("-5"), 0);
        // Negative zero is just zero.
        assert_eq!(parse_rate("-0.000"), ParsedRate::Weight(0));
    }

    #[test]
    fn malformed_strings_are_invalid() {
        for text in [
            "", " ", "abc", ".5", "5.", "+5", "--5", "5..0", "5.0.1", "1e-7", "12,5", "5%",
            "0x10", "NaN", "inf", "- 5", "5 0",
        ] {
            assert_eq!(
                parse_rate(text),
                ParsedRate::Invalid(InvalidReason::Malformed),
                "{text:?} should be malformed"
            );
            assert_eq!(parse_to_fixed_point(text), 0);
        }
    }

    #[test]
    fn huge_values_are_out_of_range() {
        assert_eq!(
            parse_rate("99999999999999999999"),
            ParsedRate::Invalid(InvalidReason::OutOfRange)
        );
        // Fits u64 as an integer but not once scaled.
        assert_eq!(
            parse_rate("18446744073709"),
            ParsedRate::Invalid(InvalidReason::OutOfRange)
        );
    }

    #[test]
    fn format_always_prints_seven_decimals() {
        assert_eq!(format_percent(0), "0.0000000");
        assert_eq!(format_percent(1), "0.0000001");
        assert_eq!(format_percent(999_999_999), "99.9999999");
        assert_eq!(format_percent(1_000_000_000), "100.0000000");
    }
}
