use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::bracket::Tree;
use crate::picks::PickSet;
use crate::propagation::{propagate, MatchStatus, MatchView, PropagatedView};
use crate::types::{round_label, MatchId};

/// Points awarded for a correct pick in `round` of a bracket with
/// `total_rounds` rounds.
pub trait RoundWeights {
    fn points_for(&self, round: u32, total_rounds: u32) -> u32;
}

impl<F> RoundWeights for F
where
    F: Fn(u32, u32) -> u32,
{
    fn points_for(&self, round: u32, total_rounds: u32) -> u32 {
        self(round, total_rounds)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PointSchedule {
    /// 1, 2, 4, 8, ... from the first round.
    #[default]
    Doubling,
    /// Points by round ordinal; the last value repeats for deeper brackets.
    PerRound { points: Vec<u32> },
    /// Points by round label (`r32`, `r16`, `qf`, `sf`, `f`). Unlisted rounds score 0.
    ByLabel { points: BTreeMap<String, u32> },
}

impl PointSchedule {
    /// Rejects schedules where a later round is worth less than an earlier
    /// one, or where a perfect bracket would not fit in a `u32` total.
    pub fn validate(&self, total_rounds: u32) -> Result<(), String> {
        let mut previous = 0u32;
        let mut perfect = 0u64;
        for round in 1..=total_rounds {
            let points = self.points_for(round, total_rounds);
            if points < previous {
                return Err(format!(
                    "point schedule decreases at round {round} ({points} after {previous})"
                ));
            }
            previous = points;
            let matches = 1u64.checked_shl(total_rounds - round).unwrap_or(u64::MAX);
            perfect = perfect.saturating_add(matches.saturating_mul(u64::from(points)));
        }
        if perfect > u64::from(u32::MAX) {
            return Err(format!(
                "point schedule totals {perfect} for a perfect bracket, above {}",
                u32::MAX
            ));
        }
        Ok(())
    }
}

impl RoundWeights for PointSchedule {
    fn points_for(&self, round: u32, total_rounds: u32) -> u32 {
        if round == 0 {
            return 0;
        }
        match self {
            PointSchedule::Doubling => 1u32.checked_shl(round - 1).unwrap_or(u32::MAX),
            PointSchedule::PerRound { points } => points
                .get(round as usize - 1)
                .or_else(|| points.last())
                .copied()
                .unwrap_or(0),
            PointSchedule::ByLabel { points } => {
                let matches = 1usize
                    .checked_shl(total_rounds.saturating_sub(round))
                    .unwrap_or(usize::MAX);
                let label = round_label(matches);
                points
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(&label))
                    .map(|(_, value)| *value)
                    .unwrap_or(0)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PickOutcome {
    Correct,
    Wrong,
    /// The participant's pick is consistent but the result is not in yet.
    Pending,
    /// The participant has no consistent pick for this match.
    Unresolved,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchScore {
    pub id: MatchId,
    pub label: String,
    pub picked: Option<String>,
    pub actual: Option<String>,
    pub outcome: PickOutcome,
    pub points: u32,
    pub potential: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundScore {
    pub category: String,
    pub round: u32,
    pub label: String,
    pub weight: u32,
    pub correct: u32,
    pub wrong: u32,
    pub pending: u32,
    pub unresolved: u32,
    pub points: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub total: u32,
    pub max_possible: u32,
    pub correct: u32,
    pub rounds: Vec<RoundScore>,
}

pub fn score<W: RoundWeights + ?Sized>(
    tree: &Tree,
    actual: &PickSet,
    participant: &PickSet,
    weights: &W,
) -> ScoreRecord {
    let actual_view = propagate(tree, actual);
    score_against(&actual_view, participant, weights)
}

/// Score one participant against an already propagated actual view.
pub fn score_against<W: RoundWeights + ?Sized>(
    actual_view: &PropagatedView<'_>,
    participant: &PickSet,
    weights: &W,
) -> ScoreRecord {
    ScoringBasis::new(actual_view).score(participant, weights).0
}

/// Per-match comparison of two views built from the same tree, in arena order.
pub fn match_outcomes<W: RoundWeights + ?Sized>(
    actual_view: &PropagatedView<'_>,
    participant_view: &PropagatedView<'_>,
    weights: &W,
) -> Vec<MatchScore> {
    ScoringBasis::new(actual_view).outcomes(participant_view, weights)
}

/// Everything derived from the actual results that every participant is
/// scored against. Build once per recompute.
pub struct ScoringBasis<'v, 't> {
    actual_view: &'v PropagatedView<'t>,
    total_rounds: HashMap<&'t str, u32>,
    eliminated: HashMap<&'t str, BTreeSet<String>>,
}

impl<'v, 't> ScoringBasis<'v, 't> {
    pub fn new(actual_view: &'v PropagatedView<'t>) -> Self {
        let tree = actual_view.tree();
        ScoringBasis {
            actual_view,
            total_rounds: tree
                .categories()
                .iter()
                .map(|c| (c.name.as_str(), c.total_rounds()))
                .collect(),
            eliminated: tree
                .categories()
                .iter()
                .map(|c| (c.name.as_str(), actual_view.eliminated(&c.name)))
                .collect(),
        }
    }

    /// Record and per-match detail for one pick set, propagating it once.
    pub fn score<W: RoundWeights + ?Sized>(
        &self,
        participant: &PickSet,
        weights: &W,
    ) -> (ScoreRecord, Vec<MatchScore>) {
        let participant_view = propagate(self.actual_view.tree(), participant);
        let outcomes = self.outcomes(&participant_view, weights);
        let record = record_from_outcomes(self.actual_view.tree(), &outcomes, weights);
        (record, outcomes)
    }

    pub fn outcomes<W: RoundWeights + ?Sized>(
        &self,
        participant_view: &PropagatedView<'_>,
        weights: &W,
    ) -> Vec<MatchScore> {
        let tree = self.actual_view.tree();
        let mut out = Vec::with_capacity(tree.len());
        for (pos, node) in tree.matches().iter().enumerate() {
            let (Some(actual), Some(picked)) = (self.actual_view.at(pos), participant_view.at(pos)) else {
                continue;
            };
            let category = node.id.category.as_str();
            let weight = weights.points_for(
                node.id.round,
                self.total_rounds.get(category).copied().unwrap_or(node.id.round),
            );
            let outcome = compare(actual, picked);
            let potential = match (outcome, picked.winner()) {
                (PickOutcome::Pending, Some(name)) => {
                    let out_of_draw = self
                        .eliminated
                        .get(category)
                        .map(|set| set.contains(name))
                        .unwrap_or(false);
                    let cannot_reach = actual.contestants_known() && !actual.has_contestant(name);
                    if out_of_draw || cannot_reach {
                        0
                    } else {
                        weight
                    }
                }
                _ => 0,
            };
            out.push(MatchScore {
                id: node.id.clone(),
                label: node.label.clone(),
                picked: picked.declared.clone(),
                actual: actual.winner().map(str::to_string),
                outcome,
                points: if outcome == PickOutcome::Correct { weight } else { 0 },
                potential,
            });
        }
        out
    }
}

fn compare(actual: &MatchView, picked: &MatchView) -> PickOutcome {
    let Some(picked_winner) = picked.winner() else {
        return PickOutcome::Unresolved;
    };
    if actual.status != MatchStatus::Decided {
        return PickOutcome::Pending;
    }
    match actual.winner() {
        Some(winner) if winner == picked_winner => PickOutcome::Correct,
        _ => PickOutcome::Wrong,
    }
}

/// Sums saturate so an oversized schedule caps at `u32::MAX` instead of
/// wrapping.
fn record_from_outcomes<W: RoundWeights + ?Sized>(
    tree: &Tree,
    outcomes: &[MatchScore],
    weights: &W,
) -> ScoreRecord {
    let mut record = ScoreRecord::default();
    let mut potential = 0u32;
    for category in tree.categories() {
        for round in &category.rounds {
            let mut entry = RoundScore {
                category: category.name.clone(),
                round: round.round,
                label: round.label.clone(),
                weight: weights.points_for(round.round, category.total_rounds()),
                correct: 0,
                wrong: 0,
                pending: 0,
                unresolved: 0,
                points: 0,
            };
            for outcome in outcomes.get(round.positions()).unwrap_or_default() {
                match outcome.outcome {
                    PickOutcome::Correct => entry.correct += 1,
                    PickOutcome::Wrong => entry.wrong += 1,
                    PickOutcome::Pending => entry.pending += 1,
                    PickOutcome::Unresolved => entry.unresolved += 1,
                }
                entry.points = entry.points.saturating_add(outcome.points);
                potential = potential.saturating_add(outcome.potential);
            }
            record.total = record.total.saturating_add(entry.points);
            record.correct += entry.correct;
            record.rounds.push(entry);
        }
    }
    record.max_possible = record.total.saturating_add(potential);
    record
}
