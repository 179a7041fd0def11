//! Card image references.
//!
//! Links point at Scryfall's named-card endpoint with `format=image`, which
//! redirects to the card image. The link is built locally and resolved by
//! whoever renders it, so syncing never costs an extra request per card.
//! The trade-off is that a misspelt name yields a link that 404s instead of
//! a fuzzy match.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::decklist::{CardEntry, Decklist};

const NAMED_CARD_ENDPOINT: &str = "https://api.scryfall.com/cards/named";

/// Canonical form of a card name: NFC, straight quotes, trimmed.
pub fn normalize(name: &str) -> String {
    name.nfc()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Image lookup URL for a card, or an empty string when there is no name.
pub fn build_reference(name: &str) -> String {
    let normalized = normalize(name);
    if normalized.is_empty() {
        return String::new();
    }
    format!(
        "{}?exact={}&format=image",
        NAMED_CARD_ENDPOINT,
        urlencoding::encode(&normalized)
    )
}

/// A decklist entry annotated with its image link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedCard {
    pub name: String,
    pub quantity: u32,
    pub image_url: String,
}

impl From<&CardEntry> for EnrichedCard {
    fn from(entry: &CardEntry) -> Self {
        Self {
            name: entry.name.clone(),
            quantity: entry.quantity,
            image_url: build_reference(&entry.name),
        }
    }
}

/// The structured payload stored in the cache row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayload {
    pub main: Vec<EnrichedCard>,
    pub side: Vec<EnrichedCard>,
}

pub fn enrich(deck: &Decklist) -> CardPayload {
    CardPayload {
        main: deck.main.iter().map(EnrichedCard::from).collect(),
        side: deck.side.iter().map(EnrichedCard::from).collect(),
    }
}
