use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt,
    str::FromStr,
    sync::{Arc, Mutex},
};

use crate::store::{ChallengeState, LeaderboardStore};

// ── Constants ──────────────────────────────────────────────────────────

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:17880";
pub const MATCH_ID_SEPARATOR: char = ':';
pub const LEGACY_MATCH_SEPARATOR: char = '-';
pub const LEGACY_MATCH_MARKER: &str = "match";
pub const DRAW_SUFFIX: &str = "_draw";
pub const LOG_FILE_NAME: &str = "bracket-challenge.log";

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedLeaderboardStore = Arc<Mutex<LeaderboardStore>>;
pub type SharedChallengeState = Arc<ChallengeState>;

// ── Entrant input ──────────────────────────────────────────────────────

/// A named first-round entrant. Seeds are kept as written in the draw
/// (`"1"`, `"WC"`, `"Q"`); an empty seed means unseeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entrant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

impl Entrant {
    pub fn new(name: impl Into<String>) -> Self {
        Entrant {
            name: name.into(),
            seed: None,
        }
    }

    pub fn seeded(seed: impl Into<String>, name: impl Into<String>) -> Self {
        let seed = seed.into();
        Entrant {
            name: name.into(),
            seed: if seed.trim().is_empty() { None } else { Some(seed) },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matchup {
    pub players: [Entrant; 2],
}

impl Matchup {
    pub fn new(a: Entrant, b: Entrant) -> Self {
        Matchup { players: [a, b] }
    }
}

/// Ordered first-round matchups for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryEntrants {
    pub name: String,
    pub matchups: Vec<Matchup>,
}

// ── Match identifiers ──────────────────────────────────────────────────

/// Composite key of a match: `category:round:index`, round 1-based and
/// index 0-based within the round.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchId {
    pub category: String,
    pub round: u32,
    pub index: u32,
}

impl MatchId {
    pub fn new(category: impl Into<String>, round: u32, index: u32) -> Self {
        MatchId {
            category: category.into(),
            round,
            index,
        }
    }

    /// The match in the next round this one feeds, and the slot it fills.
    pub fn child(&self) -> (MatchId, usize) {
        (
            MatchId::new(self.category.clone(), self.round + 1, self.index / 2),
            (self.index % 2) as usize,
        )
    }

    /// Feeder of `slot` in the previous round. `None` for round 1.
    pub fn feeder(&self, slot: usize) -> Option<MatchId> {
        if self.round <= 1 {
            return None;
        }
        Some(MatchId::new(
            self.category.clone(),
            self.round - 1,
            self.index * 2 + slot as u32,
        ))
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.category,
            self.round,
            self.index,
            sep = MATCH_ID_SEPARATOR
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchIdError {
    #[error("match id {0:?} must have the form category:round:index")]
    Shape(String),
    #[error("match id {raw:?} has an invalid round {round:?}")]
    Round { raw: String, round: String },
    #[error("match id {raw:?} has an invalid index {index:?}")]
    Index { raw: String, index: String },
    #[error("match key {raw:?} names unknown round label {label:?} for category {category:?}")]
    UnknownRoundLabel {
        raw: String,
        category: String,
        label: String,
    },
}

impl FromStr for MatchId {
    type Err = MatchIdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let mut parts = trimmed.split(MATCH_ID_SEPARATOR);
        let (Some(category), Some(round), Some(index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(MatchIdError::Shape(raw.to_string()));
        };
        if category.is_empty() {
            return Err(MatchIdError::Shape(raw.to_string()));
        }
        let round_value = round
            .parse::<u32>()
            .ok()
            .filter(|r| *r >= 1)
            .ok_or_else(|| MatchIdError::Round {
                raw: raw.to_string(),
                round: round.to_string(),
            })?;
        let index_value = index.parse::<u32>().map_err(|_| MatchIdError::Index {
            raw: raw.to_string(),
            index: index.to_string(),
        })?;
        Ok(MatchId::new(category, round_value, index_value))
    }
}

impl Serialize for MatchId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Round labels ───────────────────────────────────────────────────────

/// Label of a round holding `matches` matches: `f`, `sf`, `qf`, then `r16`, `r32`, ...
pub fn round_label(matches: usize) -> String {
    match matches {
        0 | 1 => "f".to_string(),
        2 => "sf".to_string(),
        4 => "qf".to_string(),
        n => format!("r{}", n * 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_id_round_trips_through_display() {
        let id: MatchId = "mens:2:3".parse().unwrap();
        assert_eq!(id, MatchId::new("mens", 2, 3));
        assert_eq!(id.to_string(), "mens:2:3");
    }

    #[test]
    fn test_match_id_rejects_bad_shapes() {
        assert!(matches!("mens:2".parse::<MatchId>(), Err(MatchIdError::Shape(_))));
        assert!(matches!("mens:0:1".parse::<MatchId>(), Err(MatchIdError::Round { .. })));
        assert!(matches!("mens:1:x".parse::<MatchId>(), Err(MatchIdError::Index { .. })));
        assert!(matches!(":1:1".parse::<MatchId>(), Err(MatchIdError::Shape(_))));
        assert!(matches!("a:1:1:1".parse::<MatchId>(), Err(MatchIdError::Shape(_))));
    }

    #[test]
    fn test_child_and_feeder_linkage() {
        let id = MatchId::new("womens", 1, 5);
        let (child, slot) = id.child();
        assert_eq!(child, MatchId::new("womens", 2, 2));
        assert_eq!(slot, 1);
        assert_eq!(child.feeder(1), Some(id));
        assert_eq!(child.feeder(0), Some(MatchId::new("womens", 1, 4)));
        assert_eq!(MatchId::new("womens", 1, 0).feeder(0), None);
    }

    #[test]
    fn test_round_labels() {
        assert_eq!(round_label(1), "f");
        assert_eq!(round_label(2), "sf");
        assert_eq!(round_label(4), "qf");
        assert_eq!(round_label(8), "r16");
        assert_eq!(round_label(64), "r128");
    }

    #[test]
    fn test_match_id_serializes_as_string_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(MatchId::new("mens", 1, 0), "A".to_string());
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"mens:1:0":"A"}"#);
        let back: std::collections::BTreeMap<MatchId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_seeded_entrant_drops_blank_seed() {
        assert_eq!(Entrant::seeded("", "A").seed, None);
        assert_eq!(Entrant::seeded("WC", "A").seed.as_deref(), Some("WC"));
    }
}
