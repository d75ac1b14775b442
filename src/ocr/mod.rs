//! Text recognition.
//!
//! The pipeline talks to recognizers through [`Recognizer`]. The shipped
//! provider drives a local Tesseract install; tests use scripted doubles.

pub mod engine;
pub mod preprocess;
pub mod setup;

pub use engine::TesseractRecognizer;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::RecognitionError;

/// Tesseract page segmentation modes used by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegmentation {
    Block,
    SingleLine,
    SingleWord,
    SingleChar,
    RawLine,
}

impl PageSegmentation {
    /// The `--psm` value.
    pub fn psm(self) -> u8 {
        match self {
            PageSegmentation::Block => 6,
            PageSegmentation::SingleLine => 7,
            PageSegmentation::SingleWord => 8,
            PageSegmentation::SingleChar => 10,
            PageSegmentation::RawLine => 13,
        }
    }
}

/// What a region is expected to contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Free text, any alphabet
    Text(PageSegmentation),
    /// Output alphabet restricted to `0-9`
    Digits(PageSegmentation),
}

impl RecognitionMode {
    pub fn segmentation(self) -> PageSegmentation {
        match self {
            RecognitionMode::Text(ps) | RecognitionMode::Digits(ps) => ps,
        }
    }
}

/// One recognized line with its confidence (0-100).
#[derive(Clone, Debug, PartialEq)]
pub struct Hypothesis {
    pub text: String,
    pub confidence: f32,
}

impl Hypothesis {
    #[cfg(test)]
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// Joins lines in reading order into one hypothesis with the mean confidence.
    pub fn join(lines: &[Hypothesis]) -> Option<Hypothesis> {
        let lines: Vec<&Hypothesis> = lines.iter().filter(|h| !h.text.trim().is_empty()).collect();
        if lines.is_empty() {
            return None;
        }
        let text = lines
            .iter()
            .map(|h| h.text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        let confidence = lines.iter().map(|h| h.confidence).sum::<f32>() / lines.len() as f32;
        Some(Hypothesis { text, confidence })
    }
}

/// Maps an image region to text hypotheses, best first or in reading order.
pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        region: &RgbaImage,
        mode: RecognitionMode,
    ) -> Result<Vec<Hypothesis>, RecognitionError>;
}

impl<R: Recognizer + ?Sized> Recognizer for Arc<R> {
    fn recognize(
        &self,
        region: &RgbaImage,
        mode: RecognitionMode,
    ) -> Result<Vec<Hypothesis>, RecognitionError> {
        (**self).recognize(region, mode)
    }
}

impl<R: Recognizer + ?Sized> Recognizer for &R {
    fn recognize(
        &self,
        region: &RgbaImage,
        mode: RecognitionMode,
    ) -> Result<Vec<Hypothesis>, RecognitionError> {
        (**self).recognize(region, mode)
    }
}

/// The general-purpose provider and the digit-only fallback.
#[derive(Clone, Debug)]
pub struct Recognizers<P, S> {
    pub primary: P,
    pub secondary: S,
}

impl<P: Recognizer, S: Recognizer> Recognizers<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}
