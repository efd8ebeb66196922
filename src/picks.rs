use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use tracing::warn;

use crate::bracket::Tree;
use crate::types::MatchId;

/// Sparse match -> declared winner mapping. Used both for a participant's
/// predictions and for the actual results.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickSet {
    winners: BTreeMap<MatchId, String>,
}

impl PickSet {
    pub fn new() -> Self {
        PickSet::default()
    }

    pub fn insert(&mut self, id: MatchId, winner: impl Into<String>) -> Option<String> {
        self.winners.insert(id, winner.into())
    }

    pub fn remove(&mut self, id: &MatchId) -> Option<String> {
        self.winners.remove(id)
    }

    pub fn get(&self, id: &MatchId) -> Option<&str> {
        self.winners.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &MatchId) -> bool {
        self.winners.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.winners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.winners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MatchId, &str)> {
        self.winners.iter().map(|(id, winner)| (id, winner.as_str()))
    }
}

impl FromIterator<(MatchId, String)> for PickSet {
    fn from_iter<I: IntoIterator<Item = (MatchId, String)>>(iter: I) -> Self {
        PickSet {
            winners: iter.into_iter().collect(),
        }
    }
}

impl Extend<(MatchId, String)> for PickSet {
    fn extend<I: IntoIterator<Item = (MatchId, String)>>(&mut self, iter: I) {
        self.winners.extend(iter);
    }
}

/// A pick as stored in documents: either a bare name or a `[seed, name]` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPick {
    Name(String),
    Seeded(Vec<String>),
}

impl RawPick {
    pub fn winner_name(&self) -> Option<&str> {
        let name = match self {
            RawPick::Name(name) => name.as_str(),
            RawPick::Seeded(parts) => parts.last()?.as_str(),
        };
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

impl From<&str> for RawPick {
    fn from(name: &str) -> Self {
        RawPick::Name(name.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PickWarning {
    MalformedKey { key: String, reason: String },
    UnknownMatch { key: String, id: MatchId },
    EmptyWinner { key: String },
    DuplicateMatch { key: String, id: MatchId },
    UnknownContestant { id: MatchId, winner: String },
}

impl fmt::Display for PickWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickWarning::MalformedKey { key, reason } => write!(f, "ignored pick {key:?}: {reason}"),
            PickWarning::UnknownMatch { key, id } => {
                write!(f, "ignored pick {key:?}: match {id} is not in the bracket")
            }
            PickWarning::EmptyWinner { key } => write!(f, "ignored pick {key:?}: winner is blank"),
            PickWarning::DuplicateMatch { key, id } => {
                write!(f, "ignored pick {key:?}: match {id} already has a pick")
            }
            PickWarning::UnknownContestant { id, winner } => {
                write!(f, "pick for {id} names {winner:?}, who is not in that draw")
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedPicks {
    pub picks: PickSet,
    pub warnings: Vec<PickWarning>,
}

/// Validate raw document picks against the bracket. Bad keys and blank
/// winners are dropped with a warning; winners outside the draw are kept
/// (they propagate as orphaned) but still reported.
pub fn pick_set_from_raw(tree: &Tree, raw: &BTreeMap<String, RawPick>) -> ParsedPicks {
    let mut parsed = ParsedPicks::default();
    for (key, pick) in raw {
        let id = match tree.resolve_match_key(key) {
            Ok(id) => id,
            Err(e) => {
                parsed.warnings.push(PickWarning::MalformedKey {
                    key: key.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if tree.get(&id).is_none() {
            parsed.warnings.push(PickWarning::UnknownMatch { key: key.clone(), id });
            continue;
        }
        let Some(winner) = pick.winner_name() else {
            parsed.warnings.push(PickWarning::EmptyWinner { key: key.clone() });
            continue;
        };
        if parsed.picks.contains(&id) {
            parsed.warnings.push(PickWarning::DuplicateMatch { key: key.clone(), id });
            continue;
        }
        if !tree.contains_entrant(&id.category, winner) {
            parsed.warnings.push(PickWarning::UnknownContestant {
                id: id.clone(),
                winner: winner.to_string(),
            });
        }
        parsed.picks.insert(id, winner);
    }
    parsed
}

pub fn log_pick_warnings(source: &str, warnings: &[PickWarning]) {
    for warning in warnings {
        warn!("{source}: {warning}");
    }
}
