use chrono::NaiveDate;
use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, warn};

use super::digits::read_digits;
use super::{FieldExtractor, RawValue, ValueSource};
use crate::config::{MetadataFieldConfig, MetadataKey, ValuePolicy};
use crate::error::FieldExtractionFailure;
use crate::layout::PixelRect;
use crate::ocr::preprocess::crop_pixels;
use crate::ocr::{Hypothesis, PageSegmentation, RecognitionMode, Recognizer};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(u32),
}

/// Tournament header values; `None` for fields that stayed unresolved.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataValues {
    pub player: Option<String>,
    pub deck_name: Option<String>,
    pub placement: Option<u32>,
    pub event: Option<String>,
    pub date: Option<String>,
}

impl MetadataValues {
    fn set(&mut self, key: MetadataKey, value: FieldValue) {
        let text = |v: FieldValue| match v {
            FieldValue::Text(t) => t,
            FieldValue::Number(n) => n.to_string(),
        };
        match key {
            MetadataKey::Player => self.player = Some(text(value)),
            MetadataKey::DeckName => self.deck_name = Some(text(value)),
            MetadataKey::Event => self.event = Some(text(value)),
            MetadataKey::Date => self.date = Some(text(value)),
            MetadataKey::Placement => {
                self.placement = match value {
                    FieldValue::Number(n) => Some(n),
                    FieldValue::Text(t) => t.parse().ok(),
                }
            }
        }
    }
}

impl<P: Recognizer, S: Recognizer> FieldExtractor<P, S> {
    /// Reads every configured metadata field inside the header region.
    /// Unresolved fields stay `None` and are returned as failures.
    pub fn extract_metadata(
        &self,
        img: &RgbaImage,
        metadata: &PixelRect,
    ) -> (MetadataValues, Vec<FieldExtractionFailure>) {
        let mut values = MetadataValues::default();
        let mut failures = Vec::new();

        for field in &self.config.extraction.metadata_fields {
            match self.extract_metadata_field(img, metadata, field) {
                Ok(raw) => {
                    debug!(
                        "Metadata {} = {:?} ({:?})",
                        field.field.as_str(),
                        raw.value,
                        raw.source
                    );
                    values.set(field.field, raw.value);
                }
                Err(failure) => {
                    warn!("{}", failure);
                    failures.push(failure);
                }
            }
        }

        (values, failures)
    }

    /// Crops one field by its relative region and validates it by policy.
    pub fn extract_metadata_field(
        &self,
        img: &RgbaImage,
        metadata: &PixelRect,
        field: &MetadataFieldConfig,
    ) -> Result<RawValue<FieldValue>, FieldExtractionFailure> {
        let name = field.field.as_str();
        let crop = crop_pixels(img, &field.region.to_pixels(metadata));

        let primary = match self
            .recognizers
            .primary
            .recognize(&crop, RecognitionMode::Text(PageSegmentation::SingleLine))
        {
            Ok(lines) => Hypothesis::join(&lines),
            Err(e) => {
                warn!("Metadata {} recognition failed: {}", name, e);
                None
            }
        };

        match field.policy {
            ValuePolicy::FreeText => primary
                .map(|h| RawValue::new(FieldValue::Text(h.text), h.confidence, ValueSource::Primary))
                .ok_or_else(|| FieldExtractionFailure::new(name, "no text recognized")),

            ValuePolicy::Date => {
                let h = primary.ok_or_else(|| FieldExtractionFailure::new(name, "no text recognized"))?;
                let found = self
                    .patterns
                    .date_in(&h.text)
                    .filter(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok())
                    .ok_or_else(|| {
                        FieldExtractionFailure::new(name, format!("`{}` is not a YYYY-MM-DD date", h.text))
                    })?;
                Ok(RawValue::new(
                    FieldValue::Text(found.to_string()),
                    h.confidence,
                    ValueSource::Primary,
                ))
            }

            ValuePolicy::Numeric => {
                if let Some(h) = &primary {
                    let compact: String = h.text.split_whitespace().collect();
                    if self.patterns.digits.is_match(&compact) {
                        if let Ok(n) = compact.parse::<u32>() {
                            return Ok(RawValue::new(FieldValue::Number(n), h.confidence, ValueSource::Primary));
                        }
                    }
                }

                let cfg = &self.config.extraction;
                read_digits(
                    &self.recognizers.secondary,
                    &crop,
                    &cfg.digit_strategies,
                    cfg.digit_upscale,
                    &self.patterns.digits,
                    |_| true,
                )
                .map(|r| RawValue::new(FieldValue::Number(r.value), r.confidence, ValueSource::DigitFallback))
                .ok_or_else(|| FieldExtractionFailure::new(name, "no digits recognized"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::layout::RelativeRect;
    use crate::layout::fixtures::fill;
    use crate::ocr::Recognizers;
    use crate::ocr::testing::ScriptedRecognizer;
    use image::Rgba;
    use std::sync::Arc;

    const DECK: [u8; 3] = [250, 0, 0];
    const PLACE: [u8; 3] = [0, 250, 0];
    const DATE: [u8; 3] = [0, 0, 250];
    const PLAYER: [u8; 3] = [250, 250, 0];

    fn field(key: MetadataKey, x: f32, policy: ValuePolicy) -> MetadataFieldConfig {
        MetadataFieldConfig {
            field: key,
            region: RelativeRect::new(x, 0.0, 0.25, 1.0),
            policy,
        }
    }

    /// A 200x40 header split into four 50px columns.
    fn header() -> RgbaImage {
        let mut img = RgbaImage::new(200, 40);
        for (i, c) in [DECK, PLACE, DATE, PLAYER].iter().enumerate() {
            fill(&mut img, i as u32 * 50, 0, 50, 40, Rgba([c[0], c[1], c[2], 255]));
        }
        img
    }

    fn extractor(primary: ScriptedRecognizer, secondary: ScriptedRecognizer) -> FieldExtractor<ScriptedRecognizer, ScriptedRecognizer> {
        let mut config = AppConfig::default();
        config.extraction.metadata_fields = vec![
            field(MetadataKey::DeckName, 0.0, ValuePolicy::FreeText),
            field(MetadataKey::Placement, 0.25, ValuePolicy::Numeric),
            field(MetadataKey::Date, 0.5, ValuePolicy::Date),
            field(MetadataKey::Player, 0.75, ValuePolicy::FreeText),
        ];
        FieldExtractor::new(Arc::new(config), Recognizers::new(primary, secondary)).unwrap()
    }

    fn bbox() -> PixelRect {
        PixelRect::new(0, 0, 200, 40)
    }

    #[test]
    fn test_all_fields_resolved() {
        let ex = extractor(
            ScriptedRecognizer::new()
                .text(DECK, "金克丝")
                .text(PLACE, "3")
                .text(DATE, "日期 2025-03-14")
                .text(PLAYER, "Alice"),
            ScriptedRecognizer::new(),
        );
        let (values, failures) = ex.extract_metadata(&header(), &bbox());

        assert!(failures.is_empty());
        assert_eq!(values.deck_name.as_deref(), Some("金克丝"));
        assert_eq!(values.placement, Some(3));
        assert_eq!(values.date.as_deref(), Some("2025-03-14"));
        assert_eq!(values.player.as_deref(), Some("Alice"));
        assert_eq!(values.event, None);
    }

    #[test]
    fn test_invalid_date_left_null_without_fallback() {
        let ex = extractor(
            ScriptedRecognizer::new()
                .text(DECK, "金克丝")
                .text(PLACE, "1")
                .text(DATE, "2025-13-40")
                .text(PLAYER, "Alice"),
            ScriptedRecognizer::new().digits(DATE, "20251340"),
        );
        let (values, failures) = ex.extract_metadata(&header(), &bbox());

        assert_eq!(values.date, None);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, "date");
        assert_eq!(ex.recognizers.secondary.call_count(), 0);
    }

    #[test]
    fn test_date_inside_longer_number_rejected() {
        let ex = extractor(
            ScriptedRecognizer::new()
                .text(DECK, "金克丝")
                .text(PLACE, "1")
                .text(DATE, "12025-03-149")
                .text(PLAYER, "Alice"),
            ScriptedRecognizer::new(),
        );
        let (values, failures) = ex.extract_metadata(&header(), &bbox());

        assert_eq!(values.date, None);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, "date");
    }

    #[test]
    fn test_numeric_field_uses_digit_fallback() {
        let ex = extractor(
            ScriptedRecognizer::new().text(DECK, "金克丝").text(PLACE, "第S名"),
            ScriptedRecognizer::new().digits(PLACE, "5"),
        );
        let field = field(MetadataKey::Placement, 0.25, ValuePolicy::Numeric);
        let raw = ex.extract_metadata_field(&header(), &bbox(), &field).unwrap();
        assert_eq!(raw.value, FieldValue::Number(5));
        assert_eq!(raw.source, ValueSource::DigitFallback);
    }

    #[test]
    fn test_failures_are_not_fatal() {
        let ex = extractor(ScriptedRecognizer::new().fail_on(DECK), ScriptedRecognizer::new());
        let (values, failures) = ex.extract_metadata(&header(), &bbox());
        assert_eq!(values, MetadataValues::default());
        assert_eq!(failures.len(), 4);
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let values = MetadataValues {
            deck_name: Some("金克丝".into()),
            placement: Some(2),
            ..Default::default()
        };
        let json = serde_json::to_value(&values).unwrap();
        assert_eq!(json["deckName"], "金克丝");
        assert_eq!(json["placement"], 2);
        assert!(json["player"].is_null());
    }
}
