// =============================================================================
// normalizers/money.rs - MARKET VALUES AND TRANSFER FEES
// =============================================================================
//
// Amounts arrive in whatever the locale of the page prefers:
//
//   "€1.50m"   "€850k"   "€1.20bn"   "1,50 Mio. €"   "850 Tsd. €"   "€15,000"
//
// Everything comes out as whole euros in a u64. The arithmetic is done on the
// digit string, never through a float, so "€1.15m" is 1_150_000 and not
// 1_149_999.
//
// "-", "?" and an empty cell are the site's way of saying "unknown". They are
// absent, which is not the same thing as zero: "€0" is a real value.
// =============================================================================

use std::sync::LazyLock;

use regex::Regex;

use super::Normalized;
use crate::models::TransferFee;

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d[\d.,]*)\s*(k|th\.?|tsd\.?|m|mio\.?|mill?\.?|bn|b|mrd\.?)?$").expect("amount pattern compiles")
});

fn is_unknown_marker(text: &str) -> bool {
    matches!(text, "" | "-" | "--" | "?" | "unknown" | "unbekannt")
}

fn magnitude(suffix: Option<&str>) -> u128 {
    match suffix.map(|s| s.trim_end_matches('.')) {
        None => 1,
        Some("k" | "th" | "tsd") => 1_000,
        Some("m" | "mio" | "mil" | "mill") => 1_000_000,
        Some(_) => 1_000_000_000,
    }
}

/// Split "1.234,5" style digits into integer and fraction digit strings.
fn split_number(number: &str, scaled: bool) -> Option<(String, String)> {
    let last_comma = number.rfind(',');
    let last_point = number.rfind('.');

    let decimal_at = match (last_comma, last_point) {
        (Some(c), Some(p)) => Some(c.max(p)),
        (Some(i), None) | (None, Some(i)) => {
            let sep = number.as_bytes()[i];
            let repeated = number.bytes().filter(|b| *b == sep).count() > 1;
            let tail = number.len() - i - 1;
            if repeated || (tail == 3 && !scaled) {
                None
            } else {
                Some(i)
            }
        }
        (None, None) => None,
    };

    let (int_part, frac_part) = match decimal_at {
        Some(i) => (&number[..i], &number[i + 1..]),
        None => (number, ""),
    };

    if frac_part.contains(['.', ',']) {
        return None;
    }
    let int_digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    if int_digits.is_empty() {
        return None;
    }
    Some((int_digits, frac_part.to_string()))
}

/// Parse an amount of money to whole euros. `None` for anything unreadable,
/// including the "unknown" markers.
pub fn parse_amount(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .to_lowercase()
        .replace(['€', '$', '£', '\u{a0}'], " ")
        .replace("eur", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if is_unknown_marker(&cleaned) {
        return None;
    }

    let caps = AMOUNT.captures(&cleaned)?;
    let suffix = caps.get(2).map(|m| m.as_str());
    let multiplier = magnitude(suffix);
    let (int_digits, frac_digits) = split_number(&caps[1], suffix.is_some())?;

    let mantissa: u128 = format!("{}{}", int_digits, frac_digits).parse().ok()?;
    let scale = 10u128.checked_pow(frac_digits.len() as u32)?;
    let euros = mantissa.checked_mul(multiplier)? / scale;
    u64::try_from(euros).ok()
}

/// Market value in euros, or `None` when the site does not know it.
pub fn parse_market_value(raw: &str) -> Option<u64> {
    parse_amount(raw)
}

/// Market value as an assembler field. Unknown markers are `Absent`.
pub fn market_value(raw: Option<&str>) -> Normalized<u64> {
    match raw.map(str::trim) {
        None => Normalized::Absent,
        Some(text) if is_unknown_marker(&text.to_lowercase()) => Normalized::Absent,
        Some(text) => Normalized::from_raw(Some(text), parse_amount),
    }
}

/// Read the fee column of a transfer history row.
pub fn parse_transfer_fee(raw: &str) -> Option<TransferFee> {
    let lower = raw.trim().to_lowercase();

    if lower.contains("end of loan") || lower.contains("leihende") || lower.contains("leih-ende") {
        return Some(TransferFee::EndOfLoan);
    }
    for prefix in ["loan fee:", "leihgebühr:"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return Some(TransferFee::Loan(parse_amount(rest)));
        }
    }
    if lower.contains("loan") || lower.contains("leihe") {
        return Some(TransferFee::Loan(None));
    }
    if lower.contains("free transfer") || lower.contains("ablösefrei") || lower == "free" {
        return Some(TransferFee::FreeTransfer);
    }
    parse_amount(&lower).map(TransferFee::Amount)
}

/// Transfer fee as an assembler field. Unknown markers are `Absent`.
pub fn transfer_fee(raw: Option<&str>) -> Normalized<TransferFee> {
    match raw.map(str::trim) {
        Some(text) if is_unknown_marker(&text.to_lowercase()) => Normalized::Absent,
        other => Normalized::from_raw(other, parse_transfer_fee),
    }
}
