//! Card catalog.
//!
//! Immutable reference table mapping localized card names to canonical
//! entries. Loaded once at startup and shared read-only between workers.

mod csv_reader;

use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::error::CatalogError;

/// One printed card.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Name as printed on localized screenshots, including tagline
    pub localized_name: String,
    /// English name
    pub canonical_name: String,
    /// Set code and number, e.g. `OGN-039`
    pub id: String,
    pub card_type: String,
    pub domain: String,
    pub cost: Option<u32>,
    pub rarity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Loads the catalog CSV.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let entries = csv_reader::read_catalog(path)?;
        info!("Loaded {} catalog entries from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
