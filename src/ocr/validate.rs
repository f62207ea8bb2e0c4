//! Plausibility filter for raw OCR text.
//!
//! The instrument shows CO2 in ppm with a resolution of 10, so a genuine
//! reading is 3 or 4 digits and always ends in zero. Anything else is OCR
//! noise: stray glyphs, partial reads, or decorative segments read as digits.

use std::fmt;

/// A reading that passed every plausibility rule.
///
/// Only `validate` can build one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValidatedReading(String);

impl ValidatedReading {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The reading as an integer ppm value.
    pub fn ppm(&self) -> u32 {
        // At most 4 ASCII digits, always fits
        self.0.bytes().fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
    }
}

impl fmt::Display for ValidatedReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Applies the rules in order; the first failing rule rejects.
///
/// 1. trim surrounding whitespace
/// 2. reject empty text or any non-digit
/// 3. reject unless exactly 3 or 4 characters
/// 4. reject unless the last digit is `0`
pub fn validate(raw: &str) -> Option<ValidatedReading> {
    let text = raw.trim();

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if text.len() != 3 && text.len() != 4 {
        return None;
    }

    if !text.ends_with('0') {
        return None;
    }

    Some(ValidatedReading(text.to_string()))
}

#[cfg(test)]
pub(crate) fn reading(text: &str) -> ValidatedReading {
    validate(text).unwrap_or_else(|| panic!("'{}' should be a valid reading", text))
}
