//! Card identity resolution.
//!
//! Maps a recognized localized name to a catalog entry through an ordered
//! cascade. The first tier with a hit wins:
//!
//! 1. exact full name
//! 2. exact base name (tagline stripped on both sides)
//! 3. delimiter repair (separator re-inserted at small offsets)
//! 4. fuzzy base name
//! 5. fuzzy full name
//!
//! Exact tiers score 100. Fuzzy tiers only accept candidates at or above
//! `matching.fuzzy_threshold`; anything else is unmatched with confidence 0.

pub mod similarity;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::{AppConfig, Scorer};
use crate::layout::SectionKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    ExactFull,
    BaseName,
    DelimiterRepair,
    FuzzyBase,
    FuzzyFull,
    Unmatched,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchResult {
    pub entry: Option<CatalogEntry>,
    pub strategy: MatchStrategy,
    /// 0-100; exactly 0 when unmatched
    pub confidence: f64,
}

impl MatchResult {
    fn hit(entry: &CatalogEntry, strategy: MatchStrategy, confidence: f64) -> Self {
        Self {
            entry: Some(entry.clone()),
            strategy,
            confidence,
        }
    }

    pub fn unmatched() -> Self {
        Self {
            entry: None,
            strategy: MatchStrategy::Unmatched,
            confidence: 0.0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.entry.is_some()
    }
}

/// Lookup keys for one catalog name, shared by every entry printed under it.
struct Keyed {
    key: String,
    indices: Vec<usize>,
}

/// Resolver over an immutable catalog. Cheap to share between workers.
pub struct Resolver {
    catalog: Arc<Catalog>,
    config: Arc<AppConfig>,
    /// Compact full name -> entry indices
    by_full: BTreeMap<String, Vec<usize>>,
    /// Compact base name -> entry indices
    by_base: BTreeMap<String, Vec<usize>>,
    /// Spaced names for the fuzzy tiers, in key order
    fuzzy_full: Vec<Keyed>,
    fuzzy_base: Vec<Keyed>,
}

impl Resolver {
    pub fn new(catalog: Arc<Catalog>, config: Arc<AppConfig>) -> Self {
        let mut by_full: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut by_base: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut spaced_full: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut spaced_base: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        {
            let norm = Normalizer::new(&config.matching.separators);
            for (i, entry) in catalog.entries().iter().enumerate() {
                let compact = norm.compact(&entry.localized_name);
                let spaced = norm.spaced(&entry.localized_name);
                by_base.entry(norm.base(&compact)).or_default().push(i);
                spaced_base.entry(norm.base(&spaced)).or_default().push(i);
                by_full.entry(compact).or_default().push(i);
                spaced_full.entry(spaced).or_default().push(i);
            }
        }

        let keyed = |map: BTreeMap<String, Vec<usize>>| {
            map.into_iter()
                .filter(|(key, _)| !key.is_empty())
                .map(|(key, indices)| Keyed { key, indices })
                .collect::<Vec<_>>()
        };

        debug!(
            "Resolver indexed {} entries ({} full names, {} base names)",
            catalog.len(),
            by_full.len(),
            by_base.len()
        );

        Self {
            catalog,
            config,
            by_full,
            by_base,
            fuzzy_full: keyed(spaced_full),
            fuzzy_base: keyed(spaced_base),
        }
    }

    /// Resolves a recognized name. `section_hint` is the parent section of
    /// the card slot and only influences tie-breaks.
    pub fn resolve(&self, raw: &str, section_hint: Option<SectionKind>) -> MatchResult {
        let cfg = &self.config.matching;
        let norm = Normalizer::new(&cfg.separators);
        let compact = norm.compact(raw);
        if compact.is_empty() {
            return MatchResult::unmatched();
        }

        // 1. Exact full name
        if let Some(entry) = self.pick(self.by_full.get(&compact), section_hint) {
            return MatchResult::hit(entry, MatchStrategy::ExactFull, 100.0);
        }

        // 2. Exact base name
        let base = norm.base(&compact);
        if let Some(entry) = self.pick(self.by_base.get(&base), section_hint) {
            return MatchResult::hit(entry, MatchStrategy::BaseName, 100.0);
        }

        // 3. Separator dropped by the recognizer
        if !compact.contains(norm.separator) {
            let chars: Vec<char> = compact.chars().collect();
            if chars.len() >= 3 {
                for &offset in &cfg.repair_offsets {
                    if offset == 0 || offset >= chars.len() {
                        continue;
                    }
                    let repaired: String = chars[..offset]
                        .iter()
                        .chain(std::iter::once(&norm.separator))
                        .chain(&chars[offset..])
                        .collect();
                    if let Some(entry) = self.pick(self.by_full.get(&repaired), section_hint) {
                        debug!("Repaired {:?} as {:?}", raw, repaired);
                        return MatchResult::hit(entry, MatchStrategy::DelimiterRepair, 100.0);
                    }
                }
            }
        }

        // 4/5. Fuzzy
        let spaced = norm.spaced(raw);
        let tiers = [
            (norm.base(&spaced), &self.fuzzy_base, MatchStrategy::FuzzyBase),
            (spaced.clone(), &self.fuzzy_full, MatchStrategy::FuzzyFull),
        ];
        for (query, keyed, strategy) in tiers {
            if let Some((entry, score)) = self.best_fuzzy(&query, keyed, section_hint) {
                return MatchResult::hit(entry, strategy, score);
            }
        }

        debug!("No catalog match for {:?}", raw);
        MatchResult::unmatched()
    }

    /// Highest-scoring entry at or above the threshold. Candidates sharing
    /// the top score go through the usual tie-break.
    fn best_fuzzy(
        &self,
        query: &str,
        keyed: &[Keyed],
        section_hint: Option<SectionKind>,
    ) -> Option<(&CatalogEntry, f64)> {
        if query.is_empty() {
            return None;
        }
        let cfg = &self.config.matching;

        let mut best = f64::MIN;
        let mut tied: Vec<usize> = Vec::new();
        for k in keyed {
            let score = round2(match cfg.scorer {
                Scorer::TokenSort => similarity::token_sort_ratio(query, &k.key),
                Scorer::Ratio => similarity::ratio(query, &k.key),
            });
            if score > best {
                best = score;
                tied.clear();
            }
            if score == best {
                tied.extend_from_slice(&k.indices);
            }
        }

        if best < cfg.fuzzy_threshold {
            return None;
        }
        self.pick(Some(&tied), section_hint).map(|e| (e, best))
    }

    /// Tie-break: entries whose card type matches the section's preferred
    /// type first, then the smallest id.
    fn pick(&self, indices: Option<&Vec<usize>>, section_hint: Option<SectionKind>) -> Option<&CatalogEntry> {
        let preferred = section_hint.and_then(|s| self.config.matching.section_types.get(&s));
        let entries = self.catalog.entries();

        indices?
            .iter()
            .filter_map(|&i| entries.get(i))
            .min_by(|a, b| {
                let a_pref = preferred.is_some_and(|t| t.eq_ignore_ascii_case(&a.card_type));
                let b_pref = preferred.is_some_and(|t| t.eq_ignore_ascii_case(&b.card_type));
                b_pref.cmp(&a_pref).then_with(|| a.id.cmp(&b.id))
            })
    }
}

fn round2(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Name normalization shared by the index and queries.
struct Normalizer<'a> {
    separators: &'a [char],
    /// Every separator is rewritten to this one
    separator: char,
}

impl<'a> Normalizer<'a> {
    fn new(separators: &'a [char]) -> Self {
        Self {
            separators,
            separator: separators.first().copied().unwrap_or(','),
        }
    }

    fn unify(&self, c: char) -> char {
        if self.separators.contains(&c) {
            self.separator
        } else {
            c
        }
    }

    /// Lowercased, separators unified, whitespace removed.
    fn compact(&self, s: &str) -> String {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .map(|c| self.unify(c))
            .collect()
    }

    /// Lowercased, separators unified, whitespace runs collapsed to one space.
    fn spaced(&self, s: &str) -> String {
        let unified: String = s
            .chars()
            .flat_map(char::to_lowercase)
            .map(|c| self.unify(c))
            .collect();
        unified.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Part before the first separator.
    fn base(&self, normalized: &str) -> String {
        normalized
            .split(self.separator)
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}
