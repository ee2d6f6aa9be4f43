//! Fixed-point handling of fee amounts.
//!
//! Fees are stored as integers scaled by 1000 (three decimal places).
//! Extra fractional digits are truncated toward zero.

/// Scale applied to decimal fee amounts before storage.
pub const FEE_SCALE: i64 = 1000;

const FEE_DECIMALS: usize = 3;

/// Parse a decimal string such as `"1.5"` or `"-0.25"` into thousandths.
///
/// Returns `None` for anything that is not a plain decimal number or that
/// overflows an `i64`.
pub fn parse_scaled(value: &str) -> Option<i64> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut fraction: String = fraction.chars().take(FEE_DECIMALS).collect();
    while fraction.len() < FEE_DECIMALS {
        fraction.push('0');
    }
    let fraction: i64 = fraction.parse().ok()?;

    let scaled = whole.checked_mul(FEE_SCALE)?.checked_add(fraction)?;
    Some(if negative { -scaled } else { scaled })
}
