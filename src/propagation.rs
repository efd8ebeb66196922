use serde::Serialize;
use std::collections::BTreeSet;

use crate::bracket::{SlotSource, Tree};
use crate::picks::PickSet;
use crate::types::MatchId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStatus {
  /// A contestant slot is unresolved and nothing is declared.
  Pending,
  /// A contestant slot is unresolved but a winner is declared.
  Blocked,
  /// Both contestants known, no winner declared.
  Open,
  /// Both contestants known and the declared winner is one of them.
  Decided,
  /// Both contestants known and the declared winner is neither.
  Orphaned,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
  pub id: MatchId,
  pub label: String,
  pub contestants: [Option<String>; 2],
  pub declared: Option<String>,
  pub status: MatchStatus,
}

impl MatchView {
  pub fn is_valid(&self) -> bool {
    matches!(self.status, MatchStatus::Open | MatchStatus::Decided)
  }

  pub fn winner(&self) -> Option<&str> {
    match self.status {
      MatchStatus::Decided => self.declared.as_deref(),
      _ => None,
    }
  }

  pub fn loser(&self) -> Option<&str> {
    let winner = self.winner()?;
    self
      .contestants
      .iter()
      .flatten()
      .map(String::as_str)
      .find(|name| *name != winner)
  }

  pub fn has_contestant(&self, name: &str) -> bool {
    self.contestants.iter().flatten().any(|c| c == name)
  }

  pub fn contestants_known(&self) -> bool {
    self.contestants.iter().all(Option::is_some)
  }
}

/// Eligible contestants and status of every match for one pick set. Borrowed
/// from the tree, never stored.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagatedView<'t> {
  #[serde(skip)]
  tree: &'t Tree,
  matches: Vec<MatchView>,
}

pub fn propagate<'t>(tree: &'t Tree, picks: &PickSet) -> PropagatedView<'t> {
  let mut matches: Vec<MatchView> = Vec::with_capacity(tree.len());
  for node in tree.matches() {
    let contestants = [
      resolve_slot(&node.slots[0], &matches),
      resolve_slot(&node.slots[1], &matches),
    ];
    let declared = picks.get(&node.id).map(str::to_string);
    let status = classify(&contestants, declared.as_deref());
    matches.push(MatchView {
      id: node.id.clone(),
      label: node.label.clone(),
      contestants,
      declared,
      status,
    });
  }
  PropagatedView { tree, matches }
}

fn resolve_slot(source: &SlotSource, resolved: &[MatchView]) -> Option<String> {
  match source {
    SlotSource::Entrant(entrant) => Some(entrant.name.clone()),
    SlotSource::Winner { position, .. } => resolved
      .get(*position)
      .and_then(MatchView::winner)
      .map(str::to_string),
  }
}

fn classify(contestants: &[Option<String>; 2], declared: Option<&str>) -> MatchStatus {
  let known = contestants.iter().all(Option::is_some);
  match (known, declared) {
    (false, None) => MatchStatus::Pending,
    (false, Some(_)) => MatchStatus::Blocked,
    (true, None) => MatchStatus::Open,
    (true, Some(winner)) => {
      if contestants.iter().flatten().any(|c| c == winner) {
        MatchStatus::Decided
      } else {
        MatchStatus::Orphaned
      }
    }
  }
}

impl<'t> PropagatedView<'t> {
  pub fn tree(&self) -> &'t Tree {
    self.tree
  }

  pub fn matches(&self) -> &[MatchView] {
    &self.matches
  }

  pub fn get(&self, id: &MatchId) -> Option<&MatchView> {
    self.tree.position(id).and_then(|pos| self.matches.get(pos))
  }

  pub fn at(&self, position: usize) -> Option<&MatchView> {
    self.matches.get(position)
  }

  pub fn winner(&self, id: &MatchId) -> Option<&str> {
    self.get(id).and_then(MatchView::winner)
  }

  pub fn champion(&self, category: &str) -> Option<&str> {
    let node = self.tree.final_match(category)?;
    self.winner(&node.id)
  }

  pub fn orphaned(&self) -> impl Iterator<Item = &MatchView> {
    self
      .matches
      .iter()
      .filter(|m| m.status == MatchStatus::Orphaned)
  }

  pub fn decided_count(&self) -> usize {
    self
      .matches
      .iter()
      .filter(|m| m.status == MatchStatus::Decided)
      .count()
  }

  /// Entrants of `category` who lost a decided match.
  pub fn eliminated(&self, category: &str) -> BTreeSet<String> {
    self
      .matches
      .iter()
      .filter(|m| m.id.category == category)
      .filter_map(MatchView::loser)
      .map(str::to_string)
      .collect()
  }

  pub fn is_alive(&self, category: &str, name: &str) -> bool {
    if !self.tree.contains_entrant(category, name) {
      return false;
    }
    !self
      .matches
      .iter()
      .filter(|m| m.id.category == category)
      .any(|m| m.loser() == Some(name))
  }
}
