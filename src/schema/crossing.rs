//! Crossing and jump tables.
//!
//! The crossing table says how two objects that sit next to each other in an
//! object-name-list are joined. An entry is either [`CrossingEntry::Shared`]
//! (both objects live in the same row, no join needed) or a pair of field names
//! forming an equality predicate `previous.source = current.target`. A missing
//! entry means the objects are not adjacent.
//!
//! The jump table records entity pairs connected by exactly one relationship so
//! that `Genome Feature` can stand for `Genome GenomeHasFeature Feature`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::metadata::{RelationshipMeta, FIELD_FROM_LINK, FIELD_ID, FIELD_TO_LINK};

/// Join instruction between two adjacent objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrossingEntry {
    Shared,
    Join { source: String, target: String },
}

impl CrossingEntry {
    fn join(source: &str, target: &str) -> Self {
        CrossingEntry::Join {
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// Pairwise join instructions keyed by (previous object, current object).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossingTable {
    entries: BTreeMap<String, BTreeMap<String, CrossingEntry>>,
}

impl CrossingTable {
    pub fn get(&self, from: &str, to: &str) -> Option<&CrossingEntry> {
        self.entries.get(from).and_then(|targets| targets.get(to))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate `(from, to, entry)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &CrossingEntry)> {
        self.entries.iter().flat_map(|(from, targets)| {
            targets
                .iter()
                .map(move |(to, entry)| (from.as_str(), to.as_str(), entry))
        })
    }

    fn insert(&mut self, from: &str, to: &str, entry: CrossingEntry) {
        self.entries
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string(), entry);
    }

    fn insert_if_absent(&mut self, from: &str, to: &str, entry: CrossingEntry) {
        self.entries
            .entry(from.to_string())
            .or_default()
            .entry(to.to_string())
            .or_insert(entry);
    }

    /// Add the entries contributed by one relationship and its converse.
    ///
    /// Obverse entries are written unconditionally; the reverse-direction
    /// entries only fill gaps, which matters for recursive relationships whose
    /// source and target are the same entity.
    pub(crate) fn add_relationship(&mut self, rel: &RelationshipMeta) {
        let (r, c) = (rel.name.as_str(), rel.converse.as_str());
        let (f, t) = (rel.from.as_str(), rel.to.as_str());
        let target_side = |source: &str, target: &str| {
            if rel.embedded {
                CrossingEntry::Shared
            } else {
                CrossingEntry::join(source, target)
            }
        };

        self.insert(f, r, CrossingEntry::join(FIELD_ID, FIELD_FROM_LINK));
        self.insert(r, t, target_side(FIELD_TO_LINK, FIELD_ID));
        self.insert_if_absent(t, r, target_side(FIELD_ID, FIELD_TO_LINK));
        self.insert_if_absent(r, f, CrossingEntry::join(FIELD_FROM_LINK, FIELD_ID));

        self.insert(t, c, target_side(FIELD_ID, FIELD_FROM_LINK));
        self.insert(c, f, CrossingEntry::join(FIELD_TO_LINK, FIELD_ID));
        self.insert_if_absent(f, c, CrossingEntry::join(FIELD_ID, FIELD_TO_LINK));
        self.insert_if_absent(c, t, target_side(FIELD_FROM_LINK, FIELD_ID));
    }
}

/// Unambiguous single-relationship shortcuts between entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JumpTable {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl JumpTable {
    /// The relationship (or converse) name connecting `from` to `to`.
    pub fn get(&self, from: &str, to: &str) -> Option<&str> {
        self.entries
            .get(from)
            .and_then(|targets| targets.get(to))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(from, to, relationship)` shortcut, ordered by entity names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.entries.iter().flat_map(|(from, targets)| {
            targets
                .iter()
                .map(move |(to, via)| (from.as_str(), to.as_str(), via.as_str()))
        })
    }

    /// Build from every relationship, keeping only entity pairs joined by exactly
    /// one relationship. Ambiguous pairs are dropped.
    pub(crate) fn build<'a>(relationships: impl IntoIterator<Item = &'a RelationshipMeta>) -> Self {
        let mut candidates: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for rel in relationships {
            if rel.from == rel.to {
                continue;
            }
            candidates
                .entry((rel.from.clone(), rel.to.clone()))
                .or_default()
                .push(rel.name.clone());
            candidates
                .entry((rel.to.clone(), rel.from.clone()))
                .or_default()
                .push(rel.converse.clone());
        }

        let mut table = JumpTable::default();
        for ((from, to), mut via) in candidates {
            if via.len() == 1 {
                if let Some(name) = via.pop() {
                    table.entries.entry(from).or_default().insert(to, name);
                }
            } else {
                debug!(from = %from, to = %to, paths = ?via, "Ambiguous jump omitted");
            }
        }
        table
    }
}
