//! Runtime configuration.
//!
//! Loads settings from config.json at startup. Holds the calibration
//! constants for segmentation, extraction and matching, the deck rules,
//! intake limits and the batch worker settings.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::layout::{RelativeRect, Rgb, SectionKind};
use crate::ocr::PageSegmentation;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<Arc<AppConfig>> = OnceLock::new();

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub segmentation: SegmentationConfig,
    pub extraction: ExtractionConfig,
    pub matching: MatchingConfig,
    pub rules: RulesConfig,
    pub intake: IntakeConfig,
    pub batch: BatchConfig,
    pub recognition: RecognitionConfig,
    /// Card catalog CSV, relative paths resolve against the executable directory
    pub catalog_path: PathBuf,
    pub persistence: PersistenceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationConfig::default(),
            extraction: ExtractionConfig::default(),
            matching: MatchingConfig::default(),
            rules: RulesConfig::default(),
            intake: IntakeConfig::default(),
            batch: BatchConfig::default(),
            recognition: RecognitionConfig::default(),
            catalog_path: PathBuf::from("resources").join("card_mappings.csv"),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Pixel heuristics for finding panels and card tiles.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Background of the tournament header at the top
    pub metadata_color: Rgb,
    /// Background of a deck panel
    pub panel_color: Rgb,
    /// Page background between panels
    pub backdrop_color: Rgb,
    /// Color of the gutters between card tiles
    pub gap_color: Rgb,
    /// Euclidean RGB distance under which two colors match
    pub color_tolerance: f32,
    /// Consecutive matching pixels needed to confirm a transition
    pub confirm_run: u32,
    /// Top margin skipped before scanning (status bar)
    pub skip_top_percent: f32,
    /// Horizontal offset of the sampled column
    pub sample_x_percent: f32,
    /// Metadata boundary used when no transition is confirmed
    pub fallback_boundary_percent: f32,
    pub min_section_height_px: u32,
    /// Fraction of a row that must be gap color for it to count as a gutter
    pub gap_row_coverage: f32,
    pub min_slot_height_px: u32,
    /// Taller tiles are treated as merged and split
    pub max_slot_height_px: u32,
    /// Tiles narrower than this fraction of the panel are header text, not cards
    pub min_slot_width_ratio: f32,
    /// Overlapping tiles above this IoU collapse into one
    pub merge_iou: f32,
    /// Kinds assigned to detected panels, top to bottom
    pub section_order: Vec<SectionKind>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            metadata_color: Rgb::new(0x1e, 0x30, 0x44),
            panel_color: Rgb::new(0x1b, 0x4e, 0x63),
            backdrop_color: Rgb::new(0x01, 0x39, 0x50),
            gap_color: Rgb::new(0x1b, 0x4e, 0x63),
            color_tolerance: 30.0,
            confirm_run: 5,
            skip_top_percent: 10.0,
            sample_x_percent: 5.0,
            fallback_boundary_percent: 20.0,
            min_section_height_px: 40,
            gap_row_coverage: 0.97,
            min_slot_height_px: 20,
            max_slot_height_px: 150,
            min_slot_width_ratio: 0.2,
            merge_iou: 0.5,
            section_order: SectionKind::CANONICAL_ORDER.to_vec(),
        }
    }
}

/// How a metadata value is validated after recognition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuePolicy {
    FreeText,
    /// Strict `YYYY-MM-DD`, no fallback
    Date,
    /// All digits, digit-only fallback on failure
    Numeric,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    Player,
    DeckName,
    Event,
    Date,
    Placement,
}

impl MetadataKey {
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataKey::Player => "player",
            MetadataKey::DeckName => "deck_name",
            MetadataKey::Event => "event",
            MetadataKey::Date => "date",
            MetadataKey::Placement => "placement",
        }
    }
}

/// A metadata field: where it sits inside the header and how it is validated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataFieldConfig {
    pub field: MetadataKey,
    /// Fractions of the metadata region
    pub region: RelativeRect,
    pub policy: ValuePolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Fraction of the tile width given to the name
    pub name_split_ratio: f32,
    /// Page segmentation modes tried in order by the digit-only fallback
    pub digit_strategies: Vec<PageSegmentation>,
    /// Scale factor applied to crops before digit-only recognition
    pub digit_upscale: u32,
    /// Header captions that leak into name crops
    pub ignored_labels: Vec<String>,
    pub min_name_chars: usize,
    pub metadata_fields: Vec<MetadataFieldConfig>,
    /// Caption keywords that name a panel from its header strip
    pub section_captions: BTreeMap<SectionKind, Vec<String>>,
    /// Header strip height as a percentage of the panel, clamped to the pixel bounds below
    pub section_header_percent: f32,
    pub section_header_min_px: u32,
    pub section_header_max_px: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            name_split_ratio: 0.70,
            digit_strategies: vec![
                PageSegmentation::SingleChar,
                PageSegmentation::SingleWord,
                PageSegmentation::SingleLine,
            ],
            digit_upscale: 4,
            ignored_labels: ["传奇牌", "主牌组", "战场牌", "符文牌", "备牌"]
                .into_iter()
                .map(String::from)
                .collect(),
            min_name_chars: 2,
            metadata_fields: default_metadata_fields(),
            section_captions: default_section_captions(),
            section_header_percent: 20.0,
            section_header_min_px: 50,
            section_header_max_px: 140,
        }
    }
}

fn default_section_captions() -> BTreeMap<SectionKind, Vec<String>> {
    [
        (SectionKind::Legend, "传奇"),
        (SectionKind::MainDeck, "主牌"),
        (SectionKind::Battlefield, "战场"),
        (SectionKind::Rune, "符文"),
        (SectionKind::SideDeck, "备牌"),
    ]
    .into_iter()
    .map(|(kind, word)| (kind, vec![word.to_string()]))
    .collect()
}

fn default_metadata_fields() -> Vec<MetadataFieldConfig> {
    vec![
        MetadataFieldConfig {
            field: MetadataKey::DeckName,
            region: RelativeRect::new(0.05, 0.10, 0.60, 0.25),
            policy: ValuePolicy::FreeText,
        },
        MetadataFieldConfig {
            field: MetadataKey::Player,
            region: RelativeRect::new(0.05, 0.40, 0.45, 0.20),
            policy: ValuePolicy::FreeText,
        },
        MetadataFieldConfig {
            field: MetadataKey::Placement,
            region: RelativeRect::new(0.70, 0.10, 0.25, 0.25),
            policy: ValuePolicy::Numeric,
        },
        MetadataFieldConfig {
            field: MetadataKey::Event,
            region: RelativeRect::new(0.05, 0.65, 0.60, 0.20),
            policy: ValuePolicy::FreeText,
        },
        MetadataFieldConfig {
            field: MetadataKey::Date,
            region: RelativeRect::new(0.65, 0.65, 0.30, 0.20),
            policy: ValuePolicy::Date,
        },
    ]
}

/// String similarity used by the fuzzy tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    TokenSort,
    Ratio,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum fuzzy score (0-100) for a candidate to be accepted
    pub fuzzy_threshold: f64,
    /// Characters separating a base name from its tagline
    pub separators: Vec<char>,
    /// Character offsets at which a missing separator is re-inserted
    pub repair_offsets: Vec<usize>,
    pub scorer: Scorer,
    /// Catalog card type preferred for slots of each section
    pub section_types: BTreeMap<SectionKind, String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 85.0,
            separators: vec![',', '，'],
            repair_offsets: vec![1, 2, 3],
            scorer: Scorer::TokenSort,
            section_types: BTreeMap::from([
                (SectionKind::Legend, "Legend".to_string()),
                (SectionKind::Battlefield, "Battlefield".to_string()),
                (SectionKind::Rune, "Rune".to_string()),
            ]),
        }
    }
}

/// Copy limits for one section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionRule {
    pub max_copies: Option<u32>,
    pub max_entries: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub quantity_min: u32,
    pub quantity_max: u32,
    pub sections: BTreeMap<SectionKind, SectionRule>,
    /// Side-deck cards that resolve to the rune type move to the rune section
    pub reroute_runes_from_side_deck: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            quantity_min: 1,
            quantity_max: 12,
            sections: BTreeMap::from([
                (
                    SectionKind::Legend,
                    SectionRule {
                        max_copies: Some(1),
                        max_entries: Some(1),
                    },
                ),
                (
                    SectionKind::Battlefield,
                    SectionRule {
                        max_copies: Some(1),
                        max_entries: Some(3),
                    },
                ),
            ]),
            reroute_runes_from_side_deck: true,
        }
    }
}

impl RulesConfig {
    pub fn quantity_in_range(&self, qty: u32) -> bool {
        (self.quantity_min..=self.quantity_max).contains(&qty)
    }

    pub fn rule_for(&self, kind: SectionKind) -> Option<&SectionRule> {
        self.sections.get(&kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptedFormat {
    Png,
    Jpeg,
}

impl AcceptedFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            AcceptedFormat::Png => "png",
            AcceptedFormat::Jpeg => "jpeg",
        }
    }

    pub fn as_image_format(self) -> image::ImageFormat {
        match self {
            AcceptedFormat::Png => image::ImageFormat::Png,
            AcceptedFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub max_file_size_mb: f64,
    pub accepted_formats: Vec<AcceptedFormat>,
    pub max_batch_size: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 10.0,
            accepted_formats: vec![AcceptedFormat::Png, AcceptedFormat::Jpeg],
            max_batch_size: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker pool size in parallel mode
    pub concurrency: usize,
    pub parallel: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            parallel: false,
        }
    }
}

/// One Tesseract invocation profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TesseractProfile {
    /// Tesseract language code, e.g. `chi_sim`
    pub language: String,
    /// Overrides executable discovery
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Overrides tessdata discovery
    #[serde(default)]
    pub tessdata: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// General-purpose provider used for names, quantities and metadata
    pub primary: TesseractProfile,
    /// Digit-only provider used as the numeric fallback
    pub secondary: TesseractProfile,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            primary: TesseractProfile {
                language: "chi_sim+eng".to_string(),
                executable: None,
                tessdata: None,
            },
            secondary: TesseractProfile {
                language: "eng".to_string(),
                executable: None,
                tessdata: None,
            },
        }
    }
}

/// Optional deck API that receives finished decklists.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub owner: Option<String>,
    pub format_id: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            owner: None,
            format_id: 1,
        }
    }
}

impl AppConfig {
    /// Rejects values no screenshot could be processed with.
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segmentation;
        if seg.color_tolerance <= 0.0 {
            return Err(anyhow!("segmentation.color_tolerance must be positive"));
        }
        if seg.confirm_run == 0 {
            return Err(anyhow!("segmentation.confirm_run must be at least 1"));
        }
        if !(0.0..=1.0).contains(&seg.gap_row_coverage) {
            return Err(anyhow!("segmentation.gap_row_coverage must be within 0..=1"));
        }
        if seg.min_slot_height_px > seg.max_slot_height_px {
            return Err(anyhow!(
                "segmentation.min_slot_height_px exceeds max_slot_height_px"
            ));
        }
        if seg.section_order.is_empty() {
            return Err(anyhow!("segmentation.section_order is empty"));
        }
        if seg.section_order.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(anyhow!(
                "segmentation.section_order must list each section once, in the order \
                 legend, main_deck, battlefield, rune, side_deck"
            ));
        }

        let ratio = self.extraction.name_split_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(anyhow!(
                "extraction.name_split_ratio must be between 0 and 1 (got {})",
                ratio
            ));
        }
        if self.extraction.digit_upscale == 0 {
            return Err(anyhow!("extraction.digit_upscale must be at least 1"));
        }
        let header = self.extraction.section_header_percent;
        if !(header > 0.0 && header <= 100.0) {
            return Err(anyhow!(
                "extraction.section_header_percent must be within (0, 100] (got {})",
                header
            ));
        }
        if self.extraction.section_header_min_px > self.extraction.section_header_max_px {
            return Err(anyhow!(
                "extraction.section_header_min_px exceeds section_header_max_px"
            ));
        }

        if !(0.0..=100.0).contains(&self.matching.fuzzy_threshold) {
            return Err(anyhow!("matching.fuzzy_threshold must be within 0..=100"));
        }
        if self.matching.separators.is_empty() {
            return Err(anyhow!("matching.separators is empty"));
        }

        if self.rules.quantity_min > self.rules.quantity_max {
            return Err(anyhow!(
                "rules.quantity_min ({}) exceeds quantity_max ({})",
                self.rules.quantity_min,
                self.rules.quantity_max
            ));
        }

        if self.intake.accepted_formats.is_empty() {
            return Err(anyhow!("intake.accepted_formats is empty"));
        }
        if self.intake.max_file_size_mb <= 0.0 {
            return Err(anyhow!("intake.max_file_size_mb must be positive"));
        }
        if self.batch.concurrency == 0 {
            return Err(anyhow!("batch.concurrency must be at least 1"));
        }

        Ok(())
    }

    /// Catalog path, resolving relative paths against the executable directory
    /// when they don't exist relative to the working directory.
    pub fn resolved_catalog_path(&self) -> PathBuf {
        if self.catalog_path.is_absolute() || self.catalog_path.exists() {
            self.catalog_path.clone()
        } else {
            crate::paths::get_exe_dir().join(&self.catalog_path)
        }
    }
}

/// Loads configuration from an explicit path, or from config.json next to
/// the executable, or returns defaults.
///
/// An explicit path must exist and parse. The implicit file falls back to
/// defaults with a warning.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let config = match explicit {
        Some(path) => {
            tracing::info!("Loading config from: {}", path.display());
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        }
        None => load_implicit_config(),
    };

    config.validate()?;
    Ok(config)
}

fn load_implicit_config() -> AppConfig {
    let config_path = crate::paths::get_default_config_path();

    tracing::debug!("Looking for config at: {}", config_path.display());

    if !config_path.exists() {
        tracing::info!("config.json not found. Using default config.");
        return AppConfig::default();
    }

    match fs::read_to_string(&config_path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Config loaded from config.json");
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse config.json: {}. Using defaults.", e);
                AppConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config.json: {}. Using defaults.", e);
            AppConfig::default()
        }
    }
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config(config: AppConfig) {
    let _ = CONFIG.set(Arc::new(config));
}

/// Returns the global configuration.
/// Panics if called before init_config().
pub fn get_config() -> Arc<AppConfig> {
    CONFIG
        .get()
        .cloned()
        .expect("Config not initialized. Call init_config() first.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.matching.fuzzy_threshold, 85.0);
        assert_eq!(config.intake.max_batch_size, 10);
        assert_eq!(config.segmentation.section_order.len(), 5);
        assert_eq!(config.extraction.metadata_fields.len(), 5);
    }

    #[test]
    fn test_bundled_config_matches_defaults() {
        let config: AppConfig = serde_json::from_str(include_str!("../config.json")).unwrap();
        config.validate().unwrap();
        let defaults = AppConfig::default();
        assert_eq!(config.segmentation.panel_color, defaults.segmentation.panel_color);
        assert_eq!(config.matching.section_types, defaults.matching.section_types);
        assert_eq!(config.rules.sections, defaults.rules.sections);
        assert_eq!(config.catalog_path, defaults.catalog_path);
        assert!(config.persistence.base_url.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r##"{
                "matching": { "fuzzy_threshold": 90 },
                "segmentation": { "panel_color": "#102030" },
                "batch": { "parallel": true }
            }"##,
        );
        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(config.matching.fuzzy_threshold, 90.0);
        assert_eq!(config.matching.separators, vec![',', '，']);
        assert_eq!(config.segmentation.panel_color, Rgb::new(0x10, 0x20, 0x30));
        assert_eq!(config.segmentation.confirm_run, 5);
        assert!(config.batch.parallel);
        assert_eq!(config.batch.concurrency, 2);
    }

    #[test]
    fn test_section_keys_are_snake_case() {
        let file = write_config(
            r#"{
                "rules": { "sections": { "side_deck": { "max_copies": 3, "max_entries": null } } },
                "matching": { "section_types": { "rune": "Rune" } }
            }"#,
        );
        let config = load_config(Some(file.path())).unwrap();

        assert_eq!(
            config.rules.rule_for(SectionKind::SideDeck),
            Some(&SectionRule {
                max_copies: Some(3),
                max_entries: None
            })
        );
        assert!(config.rules.rule_for(SectionKind::Legend).is_none());
        assert_eq!(config.matching.section_types.len(), 1);
    }

    #[test]
    fn test_explicit_malformed_file_is_error() {
        let file = write_config("{ not json");
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/deckscan/config.json"))).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.extraction.name_split_ratio = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rules.quantity_min = 5;
        config.rules.quantity_max = 4;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.batch.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.matching.fuzzy_threshold = 120.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.extraction.section_header_min_px = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_section_order_must_follow_canonical_order() {
        let mut config = AppConfig::default();
        config.segmentation.section_order = vec![SectionKind::Legend, SectionKind::Rune];
        config.validate().unwrap();

        config.segmentation.section_order = vec![SectionKind::Rune, SectionKind::Legend];
        assert!(config.validate().is_err());

        config.segmentation.section_order =
            vec![SectionKind::Legend, SectionKind::MainDeck, SectionKind::MainDeck];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_quantity_range() {
        let rules = RulesConfig::default();
        assert!(rules.quantity_in_range(1));
        assert!(rules.quantity_in_range(12));
        assert!(!rules.quantity_in_range(0));
        assert!(!rules.quantity_in_range(13));
    }
}
