//! Single-image job: validate, decode, segment, extract, resolve, assemble.
//!
//! Stages run strictly in order. Only validation, decoding and segmentation
//! failures abort the job; every later problem becomes a warning on the
//! record.

pub mod decklist;
pub mod intake;

use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::error::{JobError, SegmentationError, ValidationError};
use crate::extract::FieldExtractor;
use crate::layout::{self, SectionKind};
use crate::matcher::{MatchResult, Resolver};
use crate::ocr::{Recognizer, Recognizers};
use crate::persistence::{DeckPublisher, PersistenceOutcome};

pub use decklist::{
    DeckAssembler, DeckStats, DecklistMetadata, DecklistRecord, ResolvedCard, summarize,
};

/// Result of one successful job.
#[derive(Clone, Debug)]
pub struct JobOutcome {
    pub record: DecklistRecord,
    /// `None` when no publisher is configured
    pub persistence: Option<PersistenceOutcome>,
}

/// Shared by every worker of a batch; holds no per-job state.
pub struct Pipeline<P, S> {
    config: Arc<AppConfig>,
    extractor: FieldExtractor<P, S>,
    resolver: Resolver,
    publisher: Option<Arc<dyn DeckPublisher>>,
}

impl<P: Recognizer, S: Recognizer> Pipeline<P, S> {
    pub fn new(
        config: Arc<AppConfig>,
        catalog: Arc<Catalog>,
        recognizers: Recognizers<P, S>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            extractor: FieldExtractor::new(config.clone(), recognizers)?,
            resolver: Resolver::new(catalog, config.clone()),
            config,
            publisher: None,
        })
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn DeckPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Pre-processing checks on the raw payload.
    pub fn validate(&self, bytes: &[u8]) -> Result<image::ImageFormat, ValidationError> {
        intake::validate(bytes, &self.config.intake)
    }

    /// Runs the whole job for one payload, including optional persistence.
    pub fn process(&self, bytes: &[u8], filename: &str) -> Result<JobOutcome, JobError> {
        let start = Instant::now();
        let format = self.validate(bytes)?;

        let img = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| JobError::Decode(e.to_string()))?
            .to_rgba8();
        debug!("{}: decoded {}x{} {:?}", filename, img.width(), img.height(), format);

        let record = self.process_image(&img)?;
        info!(
            "{}: {}/{} instances matched ({}) in {:.2}s",
            filename,
            record.stats.matched_instances,
            record.stats.total_instances,
            summarize(&record),
            start.elapsed().as_secs_f64()
        );

        let persistence = self
            .publisher
            .as_ref()
            .map(|p| PersistenceOutcome::from_publish(p.publish(&record)));

        Ok(JobOutcome { record, persistence })
    }

    /// Segment, extract and resolve an already decoded screenshot.
    pub fn process_image(&self, img: &RgbaImage) -> Result<DecklistRecord, JobError> {
        let seg_cfg = &self.config.segmentation;
        let segmentation =
            layout::segment_with(img, seg_cfg, |panel| self.extractor.classify_section(img, panel))?;
        let mut warnings = Vec::new();

        if segmentation.metadata.low_confidence {
            warnings.push("metadata boundary not detected, used fallback".to_string());
        }
        for section in segmentation.sections.iter().filter(|s| s.low_confidence) {
            warnings.push(format!("{} panel has no detected bottom edge", section.kind));
        }

        let (metadata, failures) = self
            .extractor
            .extract_metadata(img, &segmentation.metadata.bbox);
        warnings.extend(failures.iter().map(|f| f.to_string()));

        let slots: Vec<_> = segmentation
            .sections
            .iter()
            .flat_map(|section| layout::find_card_slots(img, section, seg_cfg))
            .collect();
        if slots.is_empty() {
            return Err(SegmentationError::NoCardSlots {
                sections: segmentation.sections.len(),
            }
            .into());
        }
        debug!("Found {} card slot(s)", slots.len());

        let mut cards = Vec::with_capacity(slots.len());
        for slot in &slots {
            let extracted = self.extractor.extract_card(img, slot);
            let (raw_name, matched) = match extracted.name {
                Ok(name) => {
                    let matched = self.resolver.resolve(&name.value, Some(slot.section));
                    (name.value, matched)
                }
                Err(failure) => {
                    warnings.push(format!("{} slot at y={}: {}", slot.section, slot.bbox.y, failure));
                    (String::new(), MatchResult::unmatched())
                }
            };
            if !matched.is_matched() && !raw_name.is_empty() {
                warn!("Unmatched card in {}: {:?}", slot.section, raw_name);
            }
            cards.push(ResolvedCard {
                section: slot.section,
                raw_name,
                quantity: extracted.quantity,
                matched,
            });
        }

        let legend_name = self.canonical_legend_name(metadata.deck_name.as_deref(), &cards);
        Ok(DeckAssembler::new(&self.config).assemble(metadata, legend_name, cards, warnings))
    }

    /// Deck names are usually the legend's name; fall back to the card in
    /// the legend panel.
    fn canonical_legend_name(&self, deck_name: Option<&str>, cards: &[ResolvedCard]) -> Option<String> {
        deck_name
            .map(|name| self.resolver.resolve(name, Some(SectionKind::Legend)))
            .and_then(|m| m.entry)
            .or_else(|| {
                cards
                    .iter()
                    .filter(|c| c.section == SectionKind::Legend)
                    .find_map(|c| c.matched.entry.clone())
            })
            .map(|e| e.canonical_name)
    }
}
