//! Decklist record assembled from resolved card slots.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::extract::{MetadataValues, RawValue, ValueSource};
use crate::layout::SectionKind;
use crate::matcher::{MatchResult, MatchStrategy};

/// One card line of the output.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEntry {
    pub raw_name: String,
    pub canonical_name: Option<String>,
    pub quantity: u32,
    pub id: Option<String>,
    pub card_type: Option<String>,
    pub domain: Option<String>,
    pub cost: Option<u32>,
    pub rarity: Option<String>,
    pub match_confidence: f64,
    pub match_strategy: MatchStrategy,
    pub section: SectionKind,
    pub quantity_source: ValueSource,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecklistMetadata {
    pub player: Option<String>,
    pub deck_name: Option<String>,
    pub placement: Option<u32>,
    pub event: Option<String>,
    pub date: Option<String>,
    pub canonical_legend_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckStats {
    pub total_instances: u32,
    pub matched_instances: u32,
    /// `None` when no card instances were found
    pub accuracy_pct: Option<f64>,
}

impl DeckStats {
    pub fn new(total_instances: u32, matched_instances: u32) -> Self {
        let accuracy_pct = (total_instances > 0).then(|| {
            let pct = matched_instances as f64 / total_instances as f64 * 100.0;
            (pct.clamp(0.0, 100.0) * 100.0).round() / 100.0
        });
        Self {
            total_instances,
            matched_instances,
            accuracy_pct,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecklistRecord {
    pub metadata: DecklistMetadata,
    pub legend: Vec<CardEntry>,
    pub main_deck: Vec<CardEntry>,
    pub battlefields: Vec<CardEntry>,
    pub runes: Vec<CardEntry>,
    pub side_deck: Vec<CardEntry>,
    pub unmatched: Vec<CardEntry>,
    pub stats: DeckStats,
    /// Non-fatal problems met while processing
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DecklistRecord {
    pub fn section(&self, kind: SectionKind) -> &[CardEntry] {
        match kind {
            SectionKind::Legend => &self.legend,
            SectionKind::MainDeck => &self.main_deck,
            SectionKind::Battlefield => &self.battlefields,
            SectionKind::Rune => &self.runes,
            SectionKind::SideDeck => &self.side_deck,
        }
    }

    fn section_mut(&mut self, kind: SectionKind) -> &mut Vec<CardEntry> {
        match kind {
            SectionKind::Legend => &mut self.legend,
            SectionKind::MainDeck => &mut self.main_deck,
            SectionKind::Battlefield => &mut self.battlefields,
            SectionKind::Rune => &mut self.runes,
            SectionKind::SideDeck => &mut self.side_deck,
        }
    }

    /// All matched entries, in canonical section order.
    pub fn matched_entries(&self) -> impl Iterator<Item = &CardEntry> {
        SectionKind::CANONICAL_ORDER
            .into_iter()
            .flat_map(move |kind| self.section(kind).iter())
    }
}

/// A card slot after extraction and resolution.
#[derive(Clone, Debug)]
pub struct ResolvedCard {
    pub section: SectionKind,
    pub raw_name: String,
    pub quantity: RawValue<u32>,
    pub matched: MatchResult,
}

/// Applies section rules and builds the record.
pub struct DeckAssembler<'a> {
    config: &'a AppConfig,
}

impl<'a> DeckAssembler<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    pub fn assemble(
        &self,
        metadata: MetadataValues,
        canonical_legend_name: Option<String>,
        cards: Vec<ResolvedCard>,
        mut warnings: Vec<String>,
    ) -> DecklistRecord {
        let mut record = DecklistRecord {
            metadata: DecklistMetadata {
                player: metadata.player,
                deck_name: metadata.deck_name,
                placement: metadata.placement,
                event: metadata.event,
                date: metadata.date,
                canonical_legend_name,
            },
            ..Default::default()
        };

        for card in cards {
            let section = self.target_section(&card);
            let entry = card_entry(card, section);
            if entry.id.is_some() {
                push_collapsed(record.section_mut(section), entry);
            } else {
                push_collapsed(&mut record.unmatched, entry);
            }
        }

        for kind in SectionKind::CANONICAL_ORDER {
            let Some(rule) = self.config.rules.rule_for(kind) else {
                continue;
            };
            let entries = record.section_mut(kind);

            if let Some(max_copies) = rule.max_copies {
                for entry in entries.iter_mut().filter(|e| e.quantity > max_copies) {
                    debug!(
                        "Clamping {} x{} to {} in {}",
                        entry.raw_name, entry.quantity, max_copies, kind
                    );
                    entry.quantity = max_copies;
                }
            }
            if let Some(max_entries) = rule.max_entries {
                if entries.len() > max_entries {
                    let message = format!(
                        "{} has {} entries, keeping the first {}",
                        kind,
                        entries.len(),
                        max_entries
                    );
                    warn!("{}", message);
                    entries.truncate(max_entries);
                    warnings.push(message);
                }
            }
        }

        let matched: u32 = record.matched_entries().map(|e| e.quantity).sum();
        let unmatched: u32 = record.unmatched.iter().map(|e| e.quantity).sum();
        record.stats = DeckStats::new(matched + unmatched, matched);
        record.warnings = warnings;
        record
    }

    /// Side-deck cards that resolve to a rune belong with the runes.
    fn target_section(&self, card: &ResolvedCard) -> SectionKind {
        if card.section != SectionKind::SideDeck || !self.config.rules.reroute_runes_from_side_deck {
            return card.section;
        }
        let rune_type = self
            .config
            .matching
            .section_types
            .get(&SectionKind::Rune)
            .map(String::as_str)
            .unwrap_or("Rune");
        match &card.matched.entry {
            Some(entry) if entry.card_type.eq_ignore_ascii_case(rune_type) => {
                debug!("Rerouting {} from side deck to runes", entry.canonical_name);
                SectionKind::Rune
            }
            _ => card.section,
        }
    }
}

fn card_entry(card: ResolvedCard, section: SectionKind) -> CardEntry {
    let ResolvedCard {
        raw_name,
        quantity,
        matched,
        ..
    } = card;
    let entry = matched.entry;
    CardEntry {
        raw_name,
        canonical_name: entry.as_ref().map(|e| e.canonical_name.clone()),
        quantity: quantity.value,
        id: entry.as_ref().map(|e| e.id.clone()),
        card_type: entry.as_ref().map(|e| e.card_type.clone()),
        domain: entry.as_ref().map(|e| e.domain.clone()),
        cost: entry.as_ref().and_then(|e| e.cost),
        rarity: entry.as_ref().map(|e| e.rarity.clone()),
        match_confidence: matched.confidence,
        match_strategy: matched.strategy,
        section,
        quantity_source: quantity.source,
    }
}

/// Scroll-stitched screenshots can show a card twice; keep one entry with
/// the larger quantity. Unreadable names are never merged.
fn push_collapsed(entries: &mut Vec<CardEntry>, entry: CardEntry) {
    if !entry.raw_name.is_empty() {
        let wanted = collapse_key(&entry);
        if let Some(existing) = entries.iter_mut().find(|e| collapse_key(e) == wanted) {
            if entry.quantity > existing.quantity {
                existing.quantity = entry.quantity;
                existing.quantity_source = entry.quantity_source;
            }
            return;
        }
    }
    entries.push(entry);
}

fn collapse_key(entry: &CardEntry) -> (SectionKind, String) {
    (entry.section, entry.raw_name.split_whitespace().collect())
}

/// Per-section entry counts, for log lines.
pub fn summarize(record: &DecklistRecord) -> String {
    SectionKind::CANONICAL_ORDER
        .iter()
        .map(|&kind| format!("{}={}", kind, record.section(kind).len()))
        .chain(std::iter::once(format!("unmatched={}", record.unmatched.len())))
        .collect::<Vec<_>>()
        .join(" ")
}
