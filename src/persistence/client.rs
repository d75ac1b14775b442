//! Deck API client.
//!
//! Maps a finished decklist to the remote deck schema, resolves remote
//! card ids and creates the deck.

use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use super::DeckPublisher;
use crate::config::PersistenceConfig;
use crate::error::DownstreamError;
use crate::layout::SectionKind;
use crate::pipeline::{DeckStats, DecklistMetadata, DecklistRecord};

/// A card line before remote id resolution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeckCard {
    pub card_number: String,
    pub name: String,
    pub quantity: u32,
    pub section: &'static str,
}

/// Deck body before remote id resolution.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeckPayload {
    pub name: String,
    pub legend: String,
    pub owner: String,
    pub format_id: u32,
    pub size: u32,
    pub cards: Vec<DeckCard>,
    pub metadata: DecklistMetadata,
    pub stats: DeckStats,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResolvedCard {
    pub card_id: Value,
    pub quantity: u32,
    pub section: &'static str,
}

#[derive(Serialize)]
struct CreateDeckRequest<'a> {
    name: &'a str,
    legend: &'a str,
    owner: &'a str,
    format_id: u32,
    size: u32,
    cards: Vec<ResolvedCard>,
}

#[derive(Deserialize)]
struct RemoteCard {
    id: Value,
}

#[derive(Deserialize)]
struct CreatedDeck {
    id: Value,
}

/// Section names used by the deck API.
pub fn section_key(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Legend => "legend",
        SectionKind::MainDeck => "main_deck",
        SectionKind::Battlefield => "battlefields",
        SectionKind::Rune => "runes",
        SectionKind::SideDeck => "side_deck",
    }
}

/// Builds the deck body from a decklist. Unmatched cards are left out.
pub fn map_to_deck_schema(record: &DecklistRecord, owner: Option<&str>, format_id: u32) -> DeckPayload {
    let legend = record
        .legend
        .first()
        .and_then(|e| e.canonical_name.as_deref())
        .map(|name| name.split(',').next().unwrap_or(name).trim().to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    let meta = &record.metadata;
    let name = match meta.placement {
        Some(placement) => format!(
            "{} - #{} {}",
            legend,
            placement,
            meta.event.as_deref().unwrap_or("Tournament")
        ),
        None => format!("{} Deck", legend),
    };

    let cards: Vec<DeckCard> = record
        .matched_entries()
        .filter_map(|e| {
            Some(DeckCard {
                card_number: e.id.clone()?,
                name: e.canonical_name.clone()?,
                quantity: e.quantity,
                section: section_key(e.section),
            })
        })
        .collect();

    DeckPayload {
        name,
        legend,
        owner: owner
            .or(meta.player.as_deref())
            .unwrap_or("Unknown")
            .to_string(),
        format_id,
        size: cards.iter().map(|c| c.quantity).sum(),
        cards,
        metadata: meta.clone(),
        stats: record.stats.clone(),
    }
}

pub struct DeckApiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    owner: Option<String>,
    format_id: u32,
}

impl DeckApiClient {
    /// Returns `None` when no base URL is configured.
    pub fn from_config(cfg: &PersistenceConfig) -> Result<Option<Self>, DownstreamError> {
        let Some(base_url) = cfg.base_url.as_deref() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent("deckscan")
            .build()?;

        info!("Deck API client initialized: {}", base_url);
        Ok(Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            owner: cfg.owner.clone(),
            format_id: cfg.format_id,
        }))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    /// First card returned by a lookup endpoint.
    fn lookup(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<Value>, DownstreamError> {
        let response = self
            .authorized(self.client.get(self.url(path)).query(query))
            .send()?;
        if !response.status().is_success() {
            return Err(DownstreamError::Status {
                status: response.status().as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        let cards: Vec<RemoteCard> = response.json()?;
        Ok(cards.into_iter().next().map(|c| c.id))
    }

    fn card_id(&self, card: &DeckCard) -> Option<Value> {
        match self.lookup("cards", &[("card_number", card.card_number.as_str())]) {
            Ok(Some(id)) => return Some(id),
            Ok(None) => {}
            Err(e) => warn!("Card lookup by number {} failed: {}", card.card_number, e),
        }
        match self.lookup("cards/search", &[("q", card.name.as_str())]) {
            Ok(found) => found,
            Err(e) => {
                warn!("Card lookup by name {:?} failed: {}", card.name, e);
                None
            }
        }
    }

    /// Resolves remote ids by card number, then by name. Cards that resolve
    /// neither way are dropped with a warning.
    pub fn resolve_card_ids(&self, cards: &[DeckCard]) -> Vec<ResolvedCard> {
        cards
            .iter()
            .filter_map(|card| match self.card_id(card) {
                Some(card_id) => Some(ResolvedCard {
                    card_id,
                    quantity: card.quantity,
                    section: card.section,
                }),
                None => {
                    warn!("Could not resolve card: {} ({})", card.name, card.card_number);
                    None
                }
            })
            .collect()
    }

    /// Posts the deck and returns the remote id.
    pub fn create_deck(&self, payload: &DeckPayload, cards: Vec<ResolvedCard>) -> Result<String, DownstreamError> {
        info!("Creating deck: {}", payload.name);
        let body = CreateDeckRequest {
            name: &payload.name,
            legend: &payload.legend,
            owner: &payload.owner,
            format_id: payload.format_id,
            size: payload.size,
            cards,
        };

        let response = self
            .authorized(self.client.post(self.url("decks")).json(&body))
            .send()?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            warn!("Deck creation failed with {}: {}", status, body);
            return Err(DownstreamError::Status { status, body });
        }

        let created: CreatedDeck = response.json()?;
        let id = match created.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        info!("Deck created with id {}", id);
        Ok(id)
    }
}

impl DeckPublisher for DeckApiClient {
    fn publish(&self, record: &DecklistRecord) -> Result<String, DownstreamError> {
        let payload = map_to_deck_schema(record, self.owner.as_deref(), self.format_id);
        let cards = self.resolve_card_ids(&payload.cards);
        if cards.is_empty() {
            return Err(DownstreamError::NoResolvableCards);
        }
        self.create_deck(&payload, cards)
    }
}
