//! Optional downstream persistence of finished decklists.
//!
//! A failure here is reported next to the result and never turns a
//! successful job into a failed one.

pub mod client;

use serde::Serialize;
use tracing::warn;

use crate::error::DownstreamError;
use crate::pipeline::DecklistRecord;

pub use client::DeckApiClient;

/// Accepts a finished decklist and returns the identifier it was stored under.
pub trait DeckPublisher: Send + Sync {
    fn publish(&self, record: &DecklistRecord) -> Result<String, DownstreamError>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PersistenceOutcome {
    Saved {
        #[serde(rename = "deckId")]
        deck_id: String,
    },
    Failed {
        error: String,
    },
}

impl PersistenceOutcome {
    pub fn from_publish(result: Result<String, DownstreamError>) -> Self {
        match result {
            Ok(deck_id) => PersistenceOutcome::Saved { deck_id },
            Err(e) => {
                warn!("Persistence failed: {}", e);
                PersistenceOutcome::Failed { error: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_shape() {
        let saved = PersistenceOutcome::from_publish(Ok("42".into()));
        assert_eq!(serde_json::to_value(&saved).unwrap(), serde_json::json!({"deckId": "42"}));

        let failed = PersistenceOutcome::from_publish(Err(DownstreamError::NoResolvableCards));
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"error": "no cards could be resolved by the deck API"})
        );
    }
}
