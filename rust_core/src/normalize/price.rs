//! American odds normalization.
//!
//! A raw provider price goes through a fixed transform, applied exactly once:
//! 1. strip formatting (whitespace, thousands separators, a leading currency symbol)
//! 2. parse the sign (unsigned means positive)
//! 3. reduce the magnitude by 25%, truncating toward zero
//! 4. floor the magnitude to a multiple of 5
//! 5. cap the magnitude at 20000
//! 6. reapply the sign
//!
//! Rounding acts on the magnitude, so `-310` becomes `-230`, not `-235`.
//! Feeding an output back through [`normalize_price`] would reduce it twice;
//! callers only ever pass provider text.

use crate::error::PairError;
use crate::models::{NormalizedPrice, Sign};
use regex::Regex;
use std::sync::OnceLock;

/// Largest magnitude ever sent downstream
pub const MAX_MAGNITUDE: u32 = 20_000;

/// Reduction factor as an exact fraction (0.75)
const REDUCTION_NUM: u64 = 3;
const REDUCTION_DEN: u64 = 4;

const ROUNDING_STEP: u64 = 5;

/// Magnitudes with more digits than this cannot be real prices
const MAX_DIGITS: usize = 12;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([+-]?)(\d+)$").expect("static price regex"))
}

fn candidate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d{1,6}$").expect("static price candidate regex"))
}

/// Remove presentation noise and map typographic signs to ASCII.
fn clean_token(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| match c {
            '\u{2212}' | '\u{2013}' | '\u{2012}' => '-',
            '\u{FF0B}' => '+',
            other => other,
        })
        .collect();

    // A currency symbol may lead the token or follow the sign ("-$110")
    let (sign, rest) = match mapped.chars().next() {
        Some(c @ ('+' | '-')) => (Some(c), &mapped[1..]),
        _ => (None, mapped.as_str()),
    };
    let rest = rest.strip_prefix(CURRENCY_SYMBOLS).unwrap_or(rest);

    match sign {
        Some(c) => format!("{}{}", c, rest),
        None => rest.to_string(),
    }
}

/// Whether `text` looks like a bare price (optional sign, 1-6 digits).
///
/// Used by the text-pattern extraction strategy to spot price nodes.
pub fn is_price_token(text: &str) -> bool {
    candidate_regex().is_match(&clean_token(text))
}

/// Reduce, floor to a multiple of 5, and cap a price magnitude.
pub fn transform_magnitude(magnitude: u64) -> u32 {
    // Integer arithmetic: truncation toward zero happens once, at the end
    let reduced = magnitude.saturating_mul(REDUCTION_NUM) / REDUCTION_DEN;
    let rounded = reduced - reduced % ROUNDING_STEP;
    rounded.min(MAX_MAGNITUDE as u64) as u32
}

/// Parse and transform a raw provider price.
///
/// Magnitudes that reduce to 0 (raw "0" through "6", such as "+3") are
/// rejected with `PairError::InvalidPrice`.
pub fn normalize_price(price_text: &str) -> Result<NormalizedPrice, PairError> {
    let invalid = || PairError::InvalidPrice {
        raw: price_text.to_string(),
    };

    let cleaned = clean_token(price_text);
    let caps = token_regex().captures(&cleaned).ok_or_else(invalid)?;

    let sign = match &caps[1] {
        "-" => Sign::Negative,
        _ => Sign::Positive,
    };
    let digits = &caps[2];
    if digits.len() > MAX_DIGITS {
        return Err(invalid());
    }
    let magnitude: u64 = digits.parse().map_err(|_| invalid())?;

    let final_magnitude = transform_magnitude(magnitude);
    if final_magnitude == 0 {
        // Nothing priceable survives the reduction (e.g. "0" or "+3")
        return Err(invalid());
    }

    let signed = |m: i64| match sign {
        Sign::Positive => m,
        Sign::Negative => -m,
    };

    Ok(NormalizedPrice {
        value: signed(final_magnitude as i64) as i32,
        sign,
        original: signed(magnitude.min(i32::MAX as u64) as i64) as i32,
    })
}
