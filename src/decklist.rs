//! Plain-text decklist parsing.
//!
//! MTGGoldfish's download endpoints return one card per line
//! (`"4 Lightning Bolt"`), with the sideboard separated from the main deck
//! by a blank line.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static QUANTITY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(.+)$").expect("valid quantity regex"));

/// One line of a decklist. Repeated names stay separate entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEntry {
    pub name: String,
    pub quantity: u32,
}

/// A parsed decklist: main deck and sideboard, each in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decklist {
    pub main: Vec<CardEntry>,
    pub side: Vec<CardEntry>,
}

impl Decklist {
    pub fn card_count(&self) -> usize {
        self.main.len() + self.side.len()
    }

    /// Render back to the download format: `"<qty> <name>"` lines, with a
    /// blank line before the sideboard.
    pub fn to_text(&self) -> String {
        let render = |entries: &[CardEntry]| {
            entries
                .iter()
                .map(|e| format!("{} {}", e.quantity, e.name))
                .collect::<Vec<_>>()
                .join("\n")
        };
        if self.side.is_empty() {
            render(&self.main)
        } else {
            format!("{}\n\n{}", render(&self.main), render(&self.side))
        }
    }
}

fn parse_line(line: &str) -> Option<CardEntry> {
    if let Some(caps) = QUANTITY_LINE.captures(line) {
        // A zero or overflowing count is not a quantity; keep the whole line.
        if let Ok(quantity @ 1..) = caps[1].parse::<u32>() {
            let name = caps[2].trim();
            if !name.is_empty() {
                return Some(CardEntry {
                    name: name.to_string(),
                    quantity,
                });
            }
        }
    }
    let name = line.trim();
    if name.is_empty() {
        return None;
    }
    Some(CardEntry {
        name: name.to_string(),
        quantity: 1,
    })
}

/// Split raw decklist text into main deck and sideboard.
///
/// The first blank line after at least one main-deck line switches to the
/// sideboard; leading blank lines and any later blank lines are ignored.
/// `\r\n` and bare `\r` line endings are treated like `\n`.
pub fn parse(raw: &str) -> Decklist {
    let mut deck = Decklist::default();
    let mut in_side = false;

    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !deck.main.is_empty() {
                in_side = true;
            }
            continue;
        }
        let Some(entry) = parse_line(line) else {
            continue;
        };
        if in_side {
            deck.side.push(entry);
        } else {
            deck.main.push(entry);
        }
    }

    deck
}
