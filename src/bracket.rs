use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use crate::types::{
  round_label, CategoryEntrants, Entrant, MatchId, MatchIdError, LEGACY_MATCH_MARKER,
  LEGACY_MATCH_SEPARATOR, MATCH_ID_SEPARATOR,
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEntrantsError {
  #[error("tournament data has no categories")]
  NoCategories,
  #[error("category name {0:?} must be non-empty and contain no ':' or whitespace")]
  InvalidCategoryName(String),
  #[error("category {0:?} appears more than once")]
  DuplicateCategory(String),
  #[error("category {0:?} has no first-round matchups")]
  EmptyCategory(String),
  #[error("category {category:?} has {matchups} first-round matchups; a single-elimination draw needs a power of two")]
  NotPowerOfTwo { category: String, matchups: usize },
  #[error("category {category:?} matchup {matchup} has an entrant with an empty name")]
  EmptyEntrantName { category: String, matchup: usize },
  #[error("category {category:?} lists entrant {name:?} more than once")]
  DuplicateEntrant { category: String, name: String },
  #[error("category {category:?} round {round} has {found} matches, expected {expected}")]
  RoundShape {
    category: String,
    round: u32,
    expected: usize,
    found: usize,
  },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SlotSource {
  Entrant(Entrant),
  #[serde(rename_all = "camelCase")]
  Winner {
    feeder: MatchId,
    #[serde(skip)]
    position: usize,
  },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchNode {
  pub id: MatchId,
  pub label: String,
  pub slots: [SlotSource; 2],
  pub next: Option<MatchId>,
  pub next_slot: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
  pub round: u32,
  pub label: String,
  #[serde(skip)]
  start: usize,
  pub match_count: usize,
}

impl Round {
  pub fn positions(&self) -> Range<usize> {
    self.start..self.start + self.match_count
  }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBracket {
  pub name: String,
  pub rounds: Vec<Round>,
  pub entrants: Vec<Entrant>,
}

impl CategoryBracket {
  pub fn total_rounds(&self) -> u32 {
    self.rounds.len() as u32
  }

  pub fn round(&self, round: u32) -> Option<&Round> {
    round.checked_sub(1).and_then(|idx| self.rounds.get(idx as usize))
  }

  pub fn round_by_label(&self, label: &str) -> Option<&Round> {
    self.rounds.iter().find(|r| r.label.eq_ignore_ascii_case(label))
  }
}

/// Immutable single-elimination bracket for every category. Matches live in
/// one arena ordered by category, round, index; every derived slot points at
/// an earlier arena position, so a forward walk is a topological order.
#[derive(Clone, Debug)]
pub struct Tree {
  categories: Vec<CategoryBracket>,
  matches: Vec<MatchNode>,
  index: HashMap<MatchId, usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryLayout<'a> {
  pub name: &'a str,
  pub rounds: Vec<RoundLayout<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundLayout<'a> {
  pub round: u32,
  pub label: &'a str,
  pub matches: &'a [MatchNode],
}

pub fn build_tree(entrants: &[CategoryEntrants]) -> Result<Tree, MalformedEntrantsError> {
  if entrants.is_empty() {
    return Err(MalformedEntrantsError::NoCategories);
  }

  let mut tree = Tree {
    categories: Vec::with_capacity(entrants.len()),
    matches: Vec::new(),
    index: HashMap::new(),
  };
  let mut seen = HashSet::new();
  for category in entrants {
    let name = category.name.trim();
    if name.is_empty() || name.contains(MATCH_ID_SEPARATOR) || name.contains(char::is_whitespace) {
      return Err(MalformedEntrantsError::InvalidCategoryName(category.name.clone()));
    }
    if !seen.insert(name.to_string()) {
      return Err(MalformedEntrantsError::DuplicateCategory(name.to_string()));
    }
    build_category(&mut tree, name, category)?;
  }
  Ok(tree)
}

fn build_category(
  tree: &mut Tree,
  name: &str,
  category: &CategoryEntrants,
) -> Result<(), MalformedEntrantsError> {
  let matchups = category.matchups.len();
  if matchups == 0 {
    return Err(MalformedEntrantsError::EmptyCategory(name.to_string()));
  }
  if !matchups.is_power_of_two() {
    return Err(MalformedEntrantsError::NotPowerOfTwo {
      category: name.to_string(),
      matchups,
    });
  }

  let entrants = normalize_entrants(name, category)?;

  let mut rounds = Vec::new();
  let label = round_label(matchups);
  let start = tree.matches.len();
  let mut prev = Vec::with_capacity(matchups);
  for (i, pair) in entrants.chunks(2).enumerate() {
    let pos = push_match(
      tree,
      MatchId::new(name, 1, i as u32),
      label.clone(),
      [SlotSource::Entrant(pair[0].clone()), SlotSource::Entrant(pair[1].clone())],
    );
    prev.push(pos);
  }
  rounds.push(Round {
    round: 1,
    label,
    start,
    match_count: prev.len(),
  });

  let mut round = 1u32;
  while prev.len() > 1 {
    round += 1;
    let expected = prev.len() / 2;
    let label = round_label(expected);
    let start = tree.matches.len();
    let mut ids = Vec::with_capacity(expected);
    for (i, feeders) in prev.chunks_exact(2).enumerate() {
      let slots = [
        winner_slot(tree, feeders[0]),
        winner_slot(tree, feeders[1]),
      ];
      let pos = push_match(tree, MatchId::new(name, round, i as u32), label.clone(), slots);
      link_child(tree, feeders[0], pos, 0);
      link_child(tree, feeders[1], pos, 1);
      ids.push(pos);
    }
    if ids.len() != expected || ids.len() * 2 != prev.len() {
      return Err(MalformedEntrantsError::RoundShape {
        category: name.to_string(),
        round,
        expected,
        found: ids.len(),
      });
    }
    rounds.push(Round {
      round,
      label,
      start,
      match_count: ids.len(),
    });
    prev = ids;
  }

  tree.categories.push(CategoryBracket {
    name: name.to_string(),
    rounds,
    entrants,
  });
  Ok(())
}

fn normalize_entrants(
  name: &str,
  category: &CategoryEntrants,
) -> Result<Vec<Entrant>, MalformedEntrantsError> {
  let mut used = HashSet::new();
  let mut out = Vec::with_capacity(category.matchups.len() * 2);
  for (matchup_idx, matchup) in category.matchups.iter().enumerate() {
    for player in &matchup.players {
      let player_name = player.name.trim();
      if player_name.is_empty() {
        return Err(MalformedEntrantsError::EmptyEntrantName {
          category: name.to_string(),
          matchup: matchup_idx,
        });
      }
      if !used.insert(player_name.to_string()) {
        return Err(MalformedEntrantsError::DuplicateEntrant {
          category: name.to_string(),
          name: player_name.to_string(),
        });
      }
      let seed = player
        .seed
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
      out.push(Entrant {
        name: player_name.to_string(),
        seed,
      });
    }
  }
  Ok(out)
}

fn winner_slot(tree: &Tree, position: usize) -> SlotSource {
  SlotSource::Winner {
    feeder: tree.matches[position].id.clone(),
    position,
  }
}

fn push_match(tree: &mut Tree, id: MatchId, label: String, slots: [SlotSource; 2]) -> usize {
  let position = tree.matches.len();
  tree.index.insert(id.clone(), position);
  tree.matches.push(MatchNode {
    id,
    label,
    slots,
    next: None,
    next_slot: None,
  });
  position
}

fn link_child(tree: &mut Tree, parent: usize, child: usize, slot: usize) {
  let child_id = tree.matches[child].id.clone();
  if let Some(node) = tree.matches.get_mut(parent) {
    node.next = Some(child_id);
    node.next_slot = Some(slot);
  }
}

impl Tree {
  pub fn categories(&self) -> &[CategoryBracket] {
    &self.categories
  }

  pub fn category(&self, name: &str) -> Option<&CategoryBracket> {
    self.categories.iter().find(|c| c.name == name)
  }

  pub fn total_rounds(&self, category: &str) -> Option<u32> {
    self.category(category).map(CategoryBracket::total_rounds)
  }

  pub fn rounds(&self, category: &str) -> &[Round] {
    self.category(category).map(|c| c.rounds.as_slice()).unwrap_or(&[])
  }

  /// First-round entrants of `category` in draw order.
  pub fn entrants(&self, category: &str) -> &[Entrant] {
    self.category(category).map(|c| c.entrants.as_slice()).unwrap_or(&[])
  }

  pub fn matches(&self) -> &[MatchNode] {
    &self.matches
  }

  pub fn len(&self) -> usize {
    self.matches.len()
  }

  pub fn is_empty(&self) -> bool {
    self.matches.is_empty()
  }

  pub fn position(&self, id: &MatchId) -> Option<usize> {
    self.index.get(id).copied()
  }

  pub fn get(&self, id: &MatchId) -> Option<&MatchNode> {
    self.position(id).and_then(|pos| self.matches.get(pos))
  }

  pub fn final_match(&self, category: &str) -> Option<&MatchNode> {
    let round = self.category(category)?.rounds.last()?;
    self.matches.get(round.start)
  }

  pub fn contains_entrant(&self, category: &str, name: &str) -> bool {
    self
      .category(category)
      .map(|c| c.entrants.iter().any(|e| e.name == name))
      .unwrap_or(false)
  }

  pub fn seed_of(&self, category: &str, name: &str) -> Option<&str> {
    self
      .category(category)?
      .entrants
      .iter()
      .find(|e| e.name == name)
      .and_then(|e| e.seed.as_deref())
  }

  /// Seeded entrants per category, name -> seed.
  pub fn seed_map(&self) -> BTreeMap<String, BTreeMap<String, String>> {
    self
      .categories
      .iter()
      .map(|category| {
        let seeds = category
          .entrants
          .iter()
          .filter_map(|e| e.seed.clone().map(|seed| (e.name.clone(), seed)))
          .collect();
        (category.name.clone(), seeds)
      })
      .collect()
  }

  pub fn layout(&self) -> Vec<CategoryLayout<'_>> {
    self
      .categories
      .iter()
      .map(|category| CategoryLayout {
        name: &category.name,
        rounds: category
          .rounds
          .iter()
          .map(|round| RoundLayout {
            round: round.round,
            label: &round.label,
            matches: &self.matches[round.positions()],
          })
          .collect(),
      })
      .collect()
  }

  /// Parse a pick key in canonical (`mens:2:0`) or legacy (`mens-r16-match-0`)
  /// form. Does not check that the match exists.
  pub fn resolve_match_key(&self, raw: &str) -> Result<MatchId, MatchIdError> {
    let trimmed = raw.trim();
    if trimmed.contains(MATCH_ID_SEPARATOR) {
      return trimmed.parse();
    }

    let mut parts = trimmed.rsplitn(4, LEGACY_MATCH_SEPARATOR);
    let (Some(index), Some(marker), Some(label), Some(category)) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err(MatchIdError::Shape(raw.to_string()));
    };
    if marker != LEGACY_MATCH_MARKER || category.is_empty() {
      return Err(MatchIdError::Shape(raw.to_string()));
    }
    let index = index.parse::<u32>().map_err(|_| MatchIdError::Index {
      raw: raw.to_string(),
      index: index.to_string(),
    })?;
    let round = self
      .category(category)
      .and_then(|c| c.round_by_label(label))
      .map(|r| r.round)
      .ok_or_else(|| MatchIdError::UnknownRoundLabel {
        raw: raw.to_string(),
        category: category.to_string(),
        label: label.to_string(),
      })?;
    Ok(MatchId::new(category, round, index))
  }
}
