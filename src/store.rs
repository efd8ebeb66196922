use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tracing::{debug, info};

use crate::bracket::Tree;
use crate::leaderboard::{recompute_all, LeaderboardOptions, LeaderboardSnapshot, Participant};
use crate::picks::{log_pick_warnings, pick_set_from_raw, PickSet, PickWarning, RawPick};
use crate::scoring::PointSchedule;
use crate::types::SharedLeaderboardStore;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedLeaderboard {
    pub version: u64,
    /// Input generation the snapshot was computed from.
    pub generation: u64,
    pub results_revision: u64,
    pub published_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: LeaderboardSnapshot,
}

/// Holds the most recently published leaderboard. Written only with fresh
/// snapshots; never edited in place.
#[derive(Debug, Default)]
pub struct LeaderboardStore {
    current: Option<Arc<PublishedLeaderboard>>,
    version: u64,
}

impl LeaderboardStore {
    pub fn new() -> Self {
        LeaderboardStore::default()
    }

    pub fn current(&self) -> Option<Arc<PublishedLeaderboard>> {
        self.current.clone()
    }

    /// Returns `None` unless `inputs` is newer than the published snapshot's
    /// inputs.
    pub fn publish(
        &mut self,
        inputs: &ChallengeInputs,
        snapshot: LeaderboardSnapshot,
        now: DateTime<Utc>,
    ) -> Option<Arc<PublishedLeaderboard>> {
        if let Some(current) = &self.current {
            if current.generation >= inputs.generation {
                return None;
            }
        }
        self.version += 1;
        let published = Arc::new(PublishedLeaderboard {
            version: self.version,
            generation: inputs.generation,
            results_revision: inputs.results_revision,
            published_at: now,
            snapshot,
        });
        self.current = Some(published.clone());
        Some(published)
    }
}

/// Consistent copy of everything a leaderboard is computed from. Every
/// change to results or participants bumps `generation`.
#[derive(Clone, Debug, Default)]
pub struct ChallengeInputs {
    pub generation: u64,
    pub results_revision: u64,
    pub actual: PickSet,
    pub participants: Arc<Vec<Participant>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsUpdate {
    pub results_revision: u64,
    pub warnings: Vec<PickWarning>,
    pub leaderboard: Option<Arc<PublishedLeaderboard>>,
}

/// Mutable inputs of one tournament challenge: the actual results, the
/// participants and the published leaderboard.
pub struct ChallengeState {
    tree: Arc<Tree>,
    schedule: PointSchedule,
    options: LeaderboardOptions,
    inputs: Mutex<ChallengeInputs>,
    leaderboard: SharedLeaderboardStore,
}

impl ChallengeState {
    pub fn new(
        tree: Arc<Tree>,
        schedule: PointSchedule,
        options: LeaderboardOptions,
        leaderboard: SharedLeaderboardStore,
    ) -> Self {
        ChallengeState {
            tree,
            schedule,
            options,
            inputs: Mutex::new(ChallengeInputs::default()),
            leaderboard,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn schedule(&self) -> &PointSchedule {
        &self.schedule
    }

    pub fn leaderboard(&self) -> Option<Arc<PublishedLeaderboard>> {
        let guard = self.leaderboard.lock().unwrap_or_else(|e| e.into_inner());
        guard.current()
    }

    pub fn inputs(&self) -> ChallengeInputs {
        let guard = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    pub fn actual_results(&self) -> (u64, PickSet) {
        let guard = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        (guard.results_revision, guard.actual.clone())
    }

    pub fn participants(&self) -> Arc<Vec<Participant>> {
        let guard = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
        guard.participants.clone()
    }

    pub fn participant(&self, id: &str) -> Option<Participant> {
        self.participants().iter().find(|p| p.id == id).cloned()
    }

    /// Validate raw results at the boundary, replace the current results and
    /// republish.
    pub fn replace_results_raw(&self, raw: &BTreeMap<String, RawPick>) -> ResultsUpdate {
        let parsed = pick_set_from_raw(&self.tree, raw);
        log_pick_warnings("results", &parsed.warnings);
        let (results_revision, leaderboard) = self.replace_results(parsed.picks);
        ResultsUpdate {
            results_revision,
            warnings: parsed.warnings,
            leaderboard,
        }
    }

    pub fn replace_results(&self, picks: PickSet) -> (u64, Option<Arc<PublishedLeaderboard>>) {
        let revision = {
            let mut guard = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
            guard.generation += 1;
            guard.results_revision += 1;
            guard.actual = picks;
            guard.results_revision
        };
        info!("results revision {revision} stored");
        (revision, self.recompute())
    }

    pub fn replace_participants(&self, participants: Vec<Participant>) -> Option<Arc<PublishedLeaderboard>> {
        {
            let mut guard = self.inputs.lock().unwrap_or_else(|e| e.into_inner());
            guard.generation += 1;
            guard.participants = Arc::new(participants);
        }
        self.recompute()
    }

    /// Recompute from a consistent copy of the inputs and publish. Returns the
    /// leaderboard current after the attempt.
    pub fn recompute(&self) -> Option<Arc<PublishedLeaderboard>> {
        let inputs = self.inputs();
        let snapshot = recompute_all(
            &self.tree,
            &inputs.actual,
            &inputs.participants,
            &self.schedule,
            &self.options,
        );
        let entries = snapshot.entries.len();

        let mut guard = self.leaderboard.lock().unwrap_or_else(|e| e.into_inner());
        match guard.publish(&inputs, snapshot, Utc::now()) {
            Some(published) => {
                info!(
                    "leaderboard v{} published: {entries} participants, results revision {}",
                    published.version, inputs.results_revision
                );
                Some(published)
            }
            None => {
                debug!("skipped leaderboard for input generation {}; already current", inputs.generation);
                guard.current()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sixteen_entrant_tree, top_slot_picks};
    use crate::types::MatchId;
    use std::thread;

    fn empty_snapshot() -> LeaderboardSnapshot {
        LeaderboardSnapshot {
            entries: Vec::new(),
            actual_results: PickSet::new(),
            eliminated: BTreeMap::new(),
            champions: BTreeMap::new(),
            seed_map: BTreeMap::new(),
            decided_matches: 0,
            total_matches: 0,
        }
    }

    fn inputs_at(generation: u64, results_revision: u64) -> ChallengeInputs {
        ChallengeInputs {
            generation,
            results_revision,
            ..ChallengeInputs::default()
        }
    }

    fn make_state_with(store: SharedLeaderboardStore) -> ChallengeState {
        ChallengeState::new(
            Arc::new(sixteen_entrant_tree()),
            PointSchedule::Doubling,
            LeaderboardOptions::default(),
            store,
        )
    }

    fn make_state() -> ChallengeState {
        make_state_with(Arc::new(Mutex::new(LeaderboardStore::new())))
    }

    #[test]
    fn test_store_ignores_older_or_same_generation() {
        let mut store = LeaderboardStore::new();
        let now = Utc::now();
        assert!(store.publish(&inputs_at(3, 2), empty_snapshot(), now).is_some());
        assert!(store.publish(&inputs_at(2, 2), empty_snapshot(), now).is_none());
        assert!(store.publish(&inputs_at(3, 2), empty_snapshot(), now).is_none());
        let current = store.current().unwrap();
        assert_eq!(current.generation, 3);
        assert_eq!(current.version, 1);
        let next = store.publish(&inputs_at(4, 2), empty_snapshot(), now).unwrap();
        assert_eq!(next.version, 2);
    }

    #[test]
    fn test_stale_participant_snapshot_cannot_overwrite_newer_one() {
        let store: SharedLeaderboardStore = Arc::new(Mutex::new(LeaderboardStore::new()));
        let state = make_state_with(store.clone());
        let before = state.inputs();
        let stale = recompute_all(
            state.tree(),
            &before.actual,
            &before.participants,
            state.schedule(),
            &LeaderboardOptions::default(),
        );

        state.replace_participants(vec![Participant::new("alice", PickSet::new())]);
        let published = {
            let mut guard = store.lock().unwrap();
            guard.publish(&before, stale, Utc::now())
        };
        assert!(published.is_none());
        let current = state.leaderboard().unwrap();
        assert_eq!(current.snapshot.entries.len(), 1);
        assert_eq!(current.snapshot.entries[0].participant_id, "alice");
    }

    #[test]
    fn test_replace_results_bumps_revision_and_publishes() {
        let state = make_state();
        let actual = top_slot_picks(state.tree());
        state.replace_participants(vec![Participant::new("alice", actual.clone())]);
        assert_eq!(state.leaderboard().unwrap().snapshot.entries[0].record.total, 0);

        let (revision, published) = state.replace_results(actual);
        assert_eq!(revision, 1);
        let published = published.unwrap();
        assert_eq!(published.results_revision, 1);
        assert_eq!(published.generation, 2);
        assert_eq!(published.snapshot.entries[0].record.total, 32);
    }

    #[test]
    fn test_raw_results_report_warnings() {
        let state = make_state();
        let mut raw = BTreeMap::new();
        raw.insert("mens-r16-match-0".to_string(), RawPick::from("mens-p0"));
        raw.insert("mens:7:0".to_string(), RawPick::from("mens-p0"));
        let update = state.replace_results_raw(&raw);
        assert_eq!(update.results_revision, 1);
        assert_eq!(update.warnings.len(), 1);
        let (_, actual) = state.actual_results();
        assert_eq!(actual.get(&MatchId::new("mens", 1, 0)), Some("mens-p0"));
        assert_eq!(update.leaderboard.as_ref().unwrap().snapshot.decided_matches, 1);

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["resultsRevision"], 1);
        assert_eq!(json["leaderboard"]["decidedMatches"], 1);
        assert_eq!(json["warnings"][0]["kind"], "unknownMatch");
    }

    #[test]
    fn test_concurrent_triggers_converge() {
        let state = Arc::new(make_state());
        let actual = top_slot_picks(state.tree());
        state.replace_participants(vec![Participant::new("bob", PickSet::new())]);

        thread::scope(|scope| {
            let results = state.clone();
            let picks = actual.clone();
            scope.spawn(move || {
                results.replace_results(picks);
            });
            let people = state.clone();
            let picks = actual.clone();
            scope.spawn(move || {
                people.replace_participants(vec![
                    Participant::new("alice", picks),
                    Participant::new("bob", PickSet::new()),
                ]);
            });
            for _ in 0..4 {
                let state = state.clone();
                scope.spawn(move || {
                    state.recompute();
                });
            }
        });

        let inputs = state.inputs();
        let expected = recompute_all(
            state.tree(),
            &inputs.actual,
            &inputs.participants,
            state.schedule(),
            &LeaderboardOptions::default(),
        );
        let current = state.leaderboard().unwrap();
        assert_eq!(current.generation, 3);
        assert_eq!(current.snapshot, expected);
        assert_eq!(current.snapshot.entries[0].participant_id, "alice");
        assert_eq!(current.snapshot.entries[0].record.total, 32);
    }

    #[test]
    fn test_recompute_without_changes_keeps_version() {
        let state = make_state();
        state.replace_participants(vec![Participant::new("alice", PickSet::new())]);
        let first = state.leaderboard().unwrap();
        let again = state.recompute().unwrap();
        assert_eq!(again.version, first.version);
    }

    #[test]
    fn test_participant_lookup() {
        let state = make_state();
        state.replace_participants(vec![Participant::new("alice", PickSet::new())]);
        assert!(state.participant("alice").is_some());
        assert!(state.participant("bob").is_none());
    }
}
