use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap, fmt::Write as _};

use crate::bracket::Tree;
use crate::picks::PickSet;
use crate::propagation::{propagate, PropagatedView};
use crate::scoring::{RoundWeights, ScoreRecord, ScoringBasis};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub picks: PickSet,
}

impl Participant {
    pub fn new(id: impl Into<String>, picks: PickSet) -> Self {
        Participant {
            id: id.into(),
            display_name: None,
            full_name: None,
            submitted_at: None,
            locked: true,
            picks,
        }
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// Secondary ordering for participants with equal totals. Participant id is
/// always the final key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TieBreak {
    ParticipantId,
    /// Earlier submissions first; participants without a timestamp last.
    #[default]
    SubmissionOrder,
}

impl TieBreak {
    fn compare(self, a: &Participant, b: &Participant) -> Ordering {
        match self {
            TieBreak::ParticipantId => Ordering::Equal,
            TieBreak::SubmissionOrder => match (a.submitted_at, b.submitted_at) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderboardOptions {
    pub tie_break: TieBreak,
    pub include_unlocked: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub participant_id: String,
    pub name: String,
    pub full_name: Option<String>,
    pub record: ScoreRecord,
    /// Passed through for the viewer.
    pub picks: PickSet,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    pub entries: Vec<LeaderboardEntry>,
    pub actual_results: PickSet,
    pub eliminated: BTreeMap<String, Vec<String>>,
    pub champions: BTreeMap<String, String>,
    pub seed_map: BTreeMap<String, BTreeMap<String, String>>,
    pub decided_matches: usize,
    pub total_matches: usize,
}

pub fn aggregate<W: RoundWeights + ?Sized>(
    tree: &Tree,
    actual: &PickSet,
    participants: &[Participant],
    weights: &W,
    tie_break: TieBreak,
) -> Vec<LeaderboardEntry> {
    let actual_view = propagate(tree, actual);
    rank_participants(&actual_view, participants.iter(), weights, tie_break)
}

fn rank_participants<'a, W: RoundWeights + ?Sized>(
    actual_view: &PropagatedView<'_>,
    participants: impl Iterator<Item = &'a Participant>,
    weights: &W,
    tie_break: TieBreak,
) -> Vec<LeaderboardEntry> {
    let basis = ScoringBasis::new(actual_view);
    let mut scored: Vec<(&Participant, ScoreRecord)> = participants
        .map(|p| (p, basis.score(&p.picks, weights).0))
        .collect();
    scored.sort_by(|(a, a_record), (b, b_record)| {
        b_record
            .total
            .cmp(&a_record.total)
            .then_with(|| tie_break.compare(a, b))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut entries = Vec::with_capacity(scored.len());
    let mut rank = 0u32;
    let mut last_total = None;
    for (i, (participant, record)) in scored.into_iter().enumerate() {
        if last_total != Some(record.total) {
            rank = i as u32 + 1;
            last_total = Some(record.total);
        }
        entries.push(LeaderboardEntry {
            rank,
            participant_id: participant.id.clone(),
            name: participant.name().to_string(),
            full_name: participant.full_name.clone(),
            record,
            picks: participant.picks.clone(),
        });
    }
    entries
}

/// Full leaderboard for the current results. Pure: the same inputs always
/// produce the same snapshot.
pub fn recompute_all<W: RoundWeights + ?Sized>(
    tree: &Tree,
    actual: &PickSet,
    participants: &[Participant],
    weights: &W,
    options: &LeaderboardOptions,
) -> LeaderboardSnapshot {
    let actual_view = propagate(tree, actual);
    let included = participants
        .iter()
        .filter(|p| options.include_unlocked || p.locked);
    let entries = rank_participants(&actual_view, included, weights, options.tie_break);

    let mut eliminated = BTreeMap::new();
    let mut champions = BTreeMap::new();
    for category in tree.categories() {
        eliminated.insert(
            category.name.clone(),
            actual_view.eliminated(&category.name).into_iter().collect(),
        );
        if let Some(champion) = actual_view.champion(&category.name) {
            champions.insert(category.name.clone(), champion.to_string());
        }
    }

    LeaderboardSnapshot {
        entries,
        actual_results: actual.clone(),
        eliminated,
        champions,
        seed_map: tree.seed_map(),
        decided_matches: actual_view.decided_count(),
        total_matches: tree.len(),
    }
}

pub fn render_scoreboard(snapshot: &LeaderboardSnapshot) -> String {
    let name_width = snapshot
        .entries
        .iter()
        .map(|e| e.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = String::new();
    let header = format!("{:<6}{:<width$}  {:>7}  {:>7}", "RANK", "NAME", "SCORE", "MAX", width = name_width);
    let _ = writeln!(out, "{header}");
    let _ = writeln!(out, "{}", "-".repeat(header.len()));
    for entry in &snapshot.entries {
        let _ = writeln!(
            out,
            "{:<6}{:<width$}  {:>7}  {:>7}",
            entry.rank,
            entry.name,
            entry.record.total,
            entry.record.max_possible,
            width = name_width
        );
    }
    let _ = writeln!(out, "{}", "-".repeat(header.len()));
    let _ = write!(
        out,
        "{} of {} matches decided",
        snapshot.decided_matches, snapshot.total_matches
    );
    out
}

/// `Name,Current Score` rows sorted by name, for score history exports.
pub fn render_scores_csv(snapshot: &LeaderboardSnapshot) -> String {
    let mut rows: Vec<&LeaderboardEntry> = snapshot.entries.iter().collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.participant_id.cmp(&b.participant_id)));

    let mut out = String::from("Name,Current Score\n");
    for entry in rows {
        let _ = writeln!(out, "{},{}", csv_field(&entry.name), entry.record.total);
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
