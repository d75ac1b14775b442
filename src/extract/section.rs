use image::RgbaImage;
use tracing::{debug, warn};

use super::FieldExtractor;
use crate::config::ExtractionConfig;
use crate::layout::{PixelRect, SectionKind};
use crate::ocr::preprocess::crop_pixels;
use crate::ocr::{Hypothesis, PageSegmentation, RecognitionMode, Recognizer};

/// Checked in this order; main deck last since its caption is the most
/// generic.
const CAPTION_PRIORITY: [SectionKind; 5] = [
    SectionKind::Legend,
    SectionKind::Battlefield,
    SectionKind::Rune,
    SectionKind::SideDeck,
    SectionKind::MainDeck,
];

/// Top strip of a panel where the section caption is printed.
pub(crate) fn header_rect(panel: &PixelRect, cfg: &ExtractionConfig) -> PixelRect {
    let scaled = (panel.height as f32 * cfg.section_header_percent / 100.0) as u32;
    let height = scaled
        .clamp(cfg.section_header_min_px, cfg.section_header_max_px)
        .min(panel.height);
    let inset = if panel.width > 10 { 5 } else { 0 };
    PixelRect::new(panel.x + inset, panel.y, panel.width - 2 * inset, height)
}

/// Section named by the caption text, if any keyword appears in it.
pub(crate) fn caption_kind(text: &str, cfg: &ExtractionConfig) -> Option<SectionKind> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    CAPTION_PRIORITY.into_iter().find(|kind| {
        cfg.section_captions
            .get(kind)
            .is_some_and(|words| words.iter().any(|w| !w.is_empty() && compact.contains(w.as_str())))
    })
}

impl<P: Recognizer, S: Recognizer> FieldExtractor<P, S> {
    /// Reads a panel's header caption. `None` when nothing recognizable is
    /// printed there or recognition fails.
    pub fn classify_section(&self, img: &RgbaImage, panel: &PixelRect) -> Option<SectionKind> {
        let rect = header_rect(panel, &self.config.extraction);
        let crop = crop_pixels(img, &rect);
        let lines = match self
            .recognizers
            .primary
            .recognize(&crop, RecognitionMode::Text(PageSegmentation::SingleLine))
        {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Section header recognition failed at y={}: {}", panel.y, e);
                return None;
            }
        };

        let text = Hypothesis::join(&lines).map(|h| h.text).unwrap_or_default();
        let kind = caption_kind(&text, &self.config.extraction);
        debug!("Panel at y={}: header {:?} -> {:?}", panel.y, text, kind);
        kind
    }
}
