//! Numeric canonicalization of free-form answers.
//!
//! Generated text states its answer last ("The answer is $1,234.56 dollars."),
//! so the final numeric token is isolated by scanning from the end.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for input that holds no usable number.
pub const BUG: &str = "bug";

/// A canonical answer: `"1,234.56"`-style decimal string or the `"bug"` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalAnswer(String);

impl CanonicalAnswer {
    /// The `"bug"` sentinel.
    pub fn bug() -> Self {
        Self(BUG.to_string())
    }

    /// Whether this is the `"bug"` sentinel.
    pub fn is_bug(&self) -> bool {
        self.0 == BUG
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalAnswer {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize any displayable value.
///
/// Returns the last number in the text formatted with thousands separators
/// and two fraction digits, or [`CanonicalAnswer::bug`] when none parses.
pub fn canonicalize(input: impl fmt::Display) -> CanonicalAnswer {
    let text = input.to_string();
    let fragment = trailing_number(&text);

    match fragment.parse::<f64>() {
        Ok(value) if value.is_finite() => CanonicalAnswer(format_grouped(value)),
        _ => CanonicalAnswer::bug(),
    }
}

/// Collect the trailing numeric token, scanning right to left.
fn trailing_number(text: &str) -> String {
    let mut reversed = String::new();
    let mut found_digit = false;
    let mut found_point = false;

    for c in text.chars().rev() {
        // ASCII digits only; other Unicode digits end the scan.
        if c.is_ascii_digit() {
            found_digit = true;
            reversed.push(c);
        } else if !found_digit {
            continue;
        } else if c == '.' && !found_point {
            found_point = true;
            reversed.push(c);
        } else if c == ',' {
            continue;
        } else if c == '-' {
            reversed.push(c);
            break;
        } else {
            break;
        }
    }

    reversed.chars().rev().filter(|&c| c != ',').collect()
}

/// Format as `-1,234.50`.
fn format_grouped(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{sign}{grouped}.{frac_part}")
}
