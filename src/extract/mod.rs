//! Field extraction.
//!
//! Crops card slots and metadata regions, runs recognition with the
//! digit-only fallback where numbers are expected, and validates values.
//! A field that stays unresolved is reported, never fatal.

mod card;
pub mod digits;
mod metadata;
mod section;

use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::ocr::Recognizers;

pub use metadata::MetadataValues;

/// Which step produced a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Primary recognizer on the intended sub-region
    Primary,
    /// Primary recognizer retried on the whole card slot
    FullSlot,
    /// Digit-only recognizer
    DigitFallback,
    /// Nothing usable, domain default applied
    Default,
}

/// A recognized value with provenance.
#[derive(Clone, Debug, PartialEq)]
pub struct RawValue<T> {
    pub value: T,
    pub confidence: f32,
    pub source: ValueSource,
    pub low_confidence: bool,
}

impl<T> RawValue<T> {
    pub fn new(value: T, confidence: f32, source: ValueSource) -> Self {
        Self {
            value,
            confidence,
            source,
            low_confidence: matches!(source, ValueSource::FullSlot | ValueSource::Default),
        }
    }
}

/// Token patterns shared by the card and metadata extractors.
struct Patterns {
    /// Whole token is digits
    digits: Regex,
    /// Quantity badge: `3`, `x3`, `X3`, `×3`
    quantity: Regex,
    /// Quantity badge embedded in a name line
    inline_quantity: Regex,
    /// Only digits, spaces and badge letters
    badge_noise: Regex,
    /// Date token, captured in group 1
    date: Regex,
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            digits: Regex::new(r"^[0-9]+$")?,
            quantity: Regex::new(r"^[xX×]?([0-9]+)$")?,
            inline_quantity: Regex::new(r"\s*[xX×][0-9]+\s*")?,
            badge_noise: Regex::new(r"^[0-9\sxX×]+$")?,
            date: Regex::new(r"(?:^|[^0-9])([0-9]{4}-[0-9]{2}-[0-9]{2})(?:[^0-9]|$)")?,
        })
    }

    /// First `YYYY-MM-DD` token not glued to other digits.
    fn date_in<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.date
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

/// Runs recognition over card slots and metadata regions.
pub struct FieldExtractor<P, S> {
    config: Arc<AppConfig>,
    recognizers: Recognizers<P, S>,
    patterns: Patterns,
}

impl<P, S> FieldExtractor<P, S> {
    pub fn new(config: Arc<AppConfig>, recognizers: Recognizers<P, S>) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            recognizers,
            patterns: Patterns::new()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_token_boundaries() {
        let p = Patterns::new().unwrap();
        assert_eq!(p.date_in("2025-03-14"), Some("2025-03-14"));
        assert_eq!(p.date_in("日期 2025-03-14"), Some("2025-03-14"));
        assert_eq!(p.date_in("(2025-03-14)"), Some("2025-03-14"));
        assert_eq!(p.date_in("12025-03-149"), None);
        assert_eq!(p.date_in("2025-03-149"), None);
        assert_eq!(p.date_in("no date"), None);
    }
}
