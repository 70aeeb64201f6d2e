// Utility helpers for parsing and basic statistics.
//
// This module centralizes the "dirty" number handling of the SISSER extract
// so the rest of the code can assume clean, typed values.
use num_format::{Locale, ToFormattedString};

/// Outcome of coercing one cell to a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coerced {
    Value(f64),
    /// The cell was empty; null without a warning.
    Empty,
    /// The cell had text that is not a number.
    Invalid,
}

impl Coerced {
    pub fn value(self) -> Option<f64> {
        match self {
            Coerced::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Parse a locale-formatted numeric string into `f64`.
///
/// - Trims whitespace.
/// - When the text contains a `,`, it is the decimal separator and a `.` may
///   only appear before it as a thousands separator between 3-digit groups:
///   `"1.234,56"` and `"1234,56"` both give `1234.56`, while `"1,234.56"`
///   and `"1.2.3,4"` are invalid.
/// - Without a `,` the text is parsed as-is, so cells that were already
///   numeric (`"1234.56"`) survive.
/// - Non-finite results (`"NaN"`, `"inf"`) are rejected.
pub fn coerce_decimal_comma(s: Option<&str>) -> Coerced {
    let Some(s) = s.map(str::trim) else {
        return Coerced::Empty;
    };
    if s.is_empty() {
        return Coerced::Empty;
    }
    let normalized = if s.contains(',') {
        match normalize_decimal_comma(s) {
            Some(n) => n,
            None => return Coerced::Invalid,
        }
    } else {
        s.to_string()
    };
    match normalized.parse::<f64>() {
        Ok(v) if v.is_finite() => Coerced::Value(v),
        _ => Coerced::Invalid,
    }
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn normalize_decimal_comma(s: &str) -> Option<String> {
    let (whole, fraction) = s.split_once(',')?;
    if fraction.contains([',', '.']) {
        return None;
    }
    let (sign, digits) = match whole.strip_prefix(['-', '+']) {
        Some(rest) => (&whole[..1], rest),
        None => ("", whole),
    };
    if digits.contains('.') {
        let mut groups = digits.split('.');
        let lead = groups.next()?;
        if lead.is_empty() || lead.len() > 3 || !is_digits(lead) {
            return None;
        }
        if !groups.all(|g| g.len() == 3 && is_digits(g)) {
            return None;
        }
    }
    Some(format!("{}{}.{}", sign, digits.replace('.', ""), fraction))
}

pub fn parse_decimal_comma(s: Option<&str>) -> Option<f64> {
    coerce_decimal_comma(s).value()
}

/// Trim a text cell, mapping blanks to `None`.
pub fn clean_text(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

/// Pearson correlation of paired samples.
///
/// Returns `None` with fewer than two pairs or when either side has zero
/// variance, where the coefficient is undefined.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    // Floating error can push |r| a hair past 1.
    Some(r.clamp(-1.0, 1.0))
}

pub fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Used for counts in console messages (e.g., `9,855 rows loaded`).
    n.to_formatted_string(&Locale::en)
}
