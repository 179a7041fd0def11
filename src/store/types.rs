//! Rows exchanged with the cache store.

use serde::{Deserialize, Serialize};

use super::error::StoreError;
use crate::scryfall::CardPayload;
use crate::types::DeckId;

/// One row of the cache table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheRow {
    pub deck_id: DeckId,
    /// Decklist text re-serialized from the parsed record, one
    /// `"<qty> <name>"` line per card with a blank line before the sideboard.
    pub decklist: String,
    pub cards: CardPayload,
}

/// Result of a successful cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The row was already cached; as good as written.
    AlreadyExists,
}

/// An element of the missing-IDs response. The procedure may return bare
/// integers or rows keyed by `deck_id` (preferred) or `id`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdRow {
    Bare(u64),
    Keyed {
        #[serde(default)]
        deck_id: Option<u64>,
        #[serde(default)]
        id: Option<u64>,
    },
}

/// Decode a JSON array of identifiers in either accepted shape.
pub(crate) fn decode_ids(body: &str) -> Result<Vec<DeckId>, StoreError> {
    let rows: Vec<IdRow> = serde_json::from_str(body).map_err(|e| {
        StoreError::Decode(format!(
            "expected an array of integers or of objects with deck_id/id ({e})"
        ))
    })?;

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            IdRow::Bare(id) => Ok(DeckId(id)),
            IdRow::Keyed { deck_id, id } => deck_id.or(id).map(DeckId).ok_or_else(|| {
                StoreError::Decode(format!("row {i} has neither deck_id nor id"))
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decklist, scryfall};

    #[test]
    fn test_decode_bare_integers() {
        assert_eq!(
            decode_ids("[7, 9, 9]").unwrap(),
            vec![DeckId(7), DeckId(9), DeckId(9)]
        );
    }

    #[test]
    fn test_decode_keyed_rows() {
        let ids = decode_ids(r#"[{"deck_id": 1}, {"id": 2}, {"deck_id": 3, "id": 99}]"#).unwrap();
        assert_eq!(ids, vec![DeckId(1), DeckId(2), DeckId(3)]);
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_ids("[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_row_without_key_fails() {
        let err = decode_ids(r#"[{"deck_id": 1}, {"name": "x"}]"#).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_decode_wrong_shape_fails() {
        assert!(matches!(
            decode_ids(r#"{"deck_id": 1}"#),
            Err(StoreError::Decode(_))
        ));
        assert!(matches!(decode_ids(r#"["7"]"#), Err(StoreError::Decode(_))));
        assert!(matches!(decode_ids("[-1]"), Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_cache_row_serialization() {
        let raw = "4 Lightning Bolt\n\n1 Brainstorm";
        let row = CacheRow {
            deck_id: DeckId(42),
            decklist: raw.to_string(),
            cards: scryfall::enrich(&decklist::parse(raw)),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["deck_id"], 42);
        assert_eq!(json["decklist"], raw);
        assert_eq!(json["cards"]["main"][0]["name"], "Lightning Bolt");
        assert_eq!(json["cards"]["side"][0]["quantity"], 1);
    }
}
