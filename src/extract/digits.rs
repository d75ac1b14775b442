use image::RgbaImage;
use regex::Regex;
use tracing::debug;

use crate::ocr::preprocess::prepare_digits;
use crate::ocr::{PageSegmentation, RecognitionMode, Recognizer};

/// A token read by the digit-only recognizer.
#[derive(Clone, Debug, PartialEq)]
pub struct DigitReading {
    /// Always matches `^[0-9]+$`
    pub digits: String,
    pub value: u32,
    pub confidence: f32,
    pub strategy: PageSegmentation,
}

/// Runs the digit-only recognizer over `crop` with each page segmentation
/// strategy in turn and returns the first all-digit token that `accept`s.
///
/// Recognizer errors on one strategy move on to the next.
pub fn read_digits<R: Recognizer + ?Sized>(
    recognizer: &R,
    crop: &RgbaImage,
    strategies: &[PageSegmentation],
    upscale: u32,
    digits_pattern: &Regex,
    accept: impl Fn(u32) -> bool,
) -> Option<DigitReading> {
    if crop.width() == 0 || crop.height() == 0 {
        return None;
    }
    let prepared = prepare_digits(crop, upscale);

    for &strategy in strategies {
        let hypotheses = match recognizer.recognize(&prepared, RecognitionMode::Digits(strategy)) {
            Ok(h) => h,
            Err(e) => {
                debug!("Digit recognition ({:?}) failed: {}", strategy, e);
                continue;
            }
        };

        for hypothesis in hypotheses {
            let token: String = hypothesis.text.split_whitespace().collect();
            if !digits_pattern.is_match(&token) {
                continue;
            }
            let Ok(value) = token.parse::<u32>() else {
                continue;
            };
            if accept(value) {
                return Some(DigitReading {
                    digits: token,
                    value,
                    confidence: hypothesis.confidence,
                    strategy,
                });
            }
        }
    }

    None
}
