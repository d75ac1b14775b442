use image::RgbaImage;
use tracing::{debug, warn};

use super::digits::read_digits;
use super::{FieldExtractor, RawValue, ValueSource};
use crate::error::FieldExtractionFailure;
use crate::layout::{CardSlot, PixelRect};
use crate::ocr::preprocess::{crop_pixels, split_horizontal};
use crate::ocr::{Hypothesis, PageSegmentation, RecognitionMode, Recognizer};

/// Name and quantity read from one card slot.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedCard {
    /// `Err` when neither the name region nor the whole slot gave a name
    pub name: Result<RawValue<String>, FieldExtractionFailure>,
    pub quantity: RawValue<u32>,
}

impl<P: Recognizer, S: Recognizer> FieldExtractor<P, S> {
    /// Reads one card slot: the left part of the tile holds the name,
    /// the right part the quantity badge.
    pub fn extract_card(&self, img: &RgbaImage, slot: &CardSlot) -> ExtractedCard {
        let (name_rect, qty_rect) =
            split_horizontal(&slot.bbox, self.config.extraction.name_split_ratio);

        ExtractedCard {
            name: self.extract_name(img, &name_rect, &slot.bbox),
            quantity: self.extract_quantity(img, &qty_rect),
        }
    }

    fn extract_name(
        &self,
        img: &RgbaImage,
        name_rect: &PixelRect,
        slot_rect: &PixelRect,
    ) -> Result<RawValue<String>, FieldExtractionFailure> {
        let attempts = [
            (name_rect, ValueSource::Primary),
            (slot_rect, ValueSource::FullSlot),
        ];

        for (rect, source) in attempts {
            let crop = crop_pixels(img, rect);
            let lines = match self
                .recognizers
                .primary
                .recognize(&crop, RecognitionMode::Text(PageSegmentation::SingleLine))
            {
                Ok(lines) => lines,
                Err(e) => {
                    warn!("Name recognition failed at {:?}: {}", rect, e);
                    continue;
                }
            };

            if let Some(name) = self.clean_name(&lines) {
                let confidence = Hypothesis::join(&lines).map_or(0.0, |h| h.confidence);
                if source == ValueSource::FullSlot {
                    debug!("Name recovered from full slot: {}", name);
                }
                return Ok(RawValue::new(name, confidence, source));
            }
        }

        Err(FieldExtractionFailure::new(
            "card_name",
            "no usable text in name region or full slot",
        ))
    }

    /// Drops section captions and quantity badges from recognized lines and
    /// concatenates what remains until it is long enough to be a name.
    pub(crate) fn clean_name(&self, lines: &[Hypothesis]) -> Option<String> {
        let cfg = &self.config.extraction;
        let mut accumulated = String::new();

        for line in lines {
            let text = line.text.trim();
            if cfg.ignored_labels.iter().any(|label| label == text) {
                continue;
            }
            if self.patterns.quantity.is_match(text) {
                continue;
            }

            let cleaned = self.patterns.inline_quantity.replace_all(text, " ");
            let cleaned = cleaned.trim();
            if cleaned.is_empty() || self.patterns.badge_noise.is_match(cleaned) {
                continue;
            }

            accumulated.push_str(cleaned);
            if accumulated.chars().count() >= cfg.min_name_chars {
                return Some(accumulated);
            }
        }

        None
    }

    fn extract_quantity(&self, img: &RgbaImage, qty_rect: &PixelRect) -> RawValue<u32> {
        let rules = &self.config.rules;
        let crop = crop_pixels(img, qty_rect);

        match self
            .recognizers
            .primary
            .recognize(&crop, RecognitionMode::Text(PageSegmentation::SingleWord))
        {
            Ok(lines) => {
                if let Some(h) = Hypothesis::join(&lines) {
                    if let Some(qty) = self.parse_quantity(&h.text) {
                        if rules.quantity_in_range(qty) {
                            return RawValue::new(qty, h.confidence, ValueSource::Primary);
                        }
                        debug!("Quantity {} out of range, trying digit fallback", qty);
                    } else {
                        debug!("Quantity text {:?} not numeric, trying digit fallback", h.text);
                    }
                }
            }
            Err(e) => warn!("Quantity recognition failed: {}", e),
        }

        let cfg = &self.config.extraction;
        if let Some(reading) = read_digits(
            &self.recognizers.secondary,
            &crop,
            &cfg.digit_strategies,
            cfg.digit_upscale,
            &self.patterns.digits,
            |v| rules.quantity_in_range(v),
        ) {
            debug!(
                "Digit fallback read quantity {} ({:?})",
                reading.value, reading.strategy
            );
            return RawValue::new(reading.value, reading.confidence, ValueSource::DigitFallback);
        }

        let default = 1u32.clamp(rules.quantity_min, rules.quantity_max);
        warn!("Quantity unresolved, defaulting to {}", default);
        RawValue::new(default, 0.0, ValueSource::Default)
    }

    /// `3`, `x3`, `X3` and `×3` all read as 3.
    fn parse_quantity(&self, text: &str) -> Option<u32> {
        let compact: String = text.split_whitespace().collect();
        let caps = self.patterns.quantity.captures(&compact)?;
        caps.get(1)?.as_str().parse().ok()
    }
}
