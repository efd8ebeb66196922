use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::bracket::{build_tree, Tree};
use crate::leaderboard::Participant;
use crate::picks::{log_pick_warnings, pick_set_from_raw, RawPick};
use crate::types::{CategoryEntrants, Entrant, Matchup, DRAW_SUFFIX};

// ── Tournament data ────────────────────────────────────────────────────

/// One player as written in tournament data: `[seed, name]`, a bare name, or
/// an object.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawEntrant {
    Seeded(Vec<String>),
    Name(String),
    Full(Entrant),
}

impl RawEntrant {
    fn into_entrant(self) -> Option<Entrant> {
        match self {
            RawEntrant::Seeded(mut parts) => {
                let name = parts.pop()?;
                let seed = parts.pop().unwrap_or_default();
                Some(Entrant::seeded(seed, name))
            }
            RawEntrant::Name(name) => Some(Entrant::new(name)),
            RawEntrant::Full(entrant) => Some(entrant),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MatchupDocument {
    pub players: Vec<RawEntrant>,
}

/// Keyed by `<category>_draw` or plain `<category>`.
pub type TournamentDocument = BTreeMap<String, Vec<MatchupDocument>>;

pub fn categories_from_document(doc: TournamentDocument) -> Result<Vec<CategoryEntrants>, String> {
    let mut categories = Vec::with_capacity(doc.len());
    for (key, matchups) in doc {
        let name = key.strip_suffix(DRAW_SUFFIX).unwrap_or(&key).to_string();
        let mut out = Vec::with_capacity(matchups.len());
        for (i, matchup) in matchups.into_iter().enumerate() {
            let count = matchup.players.len();
            let mut players = matchup.players.into_iter().filter_map(RawEntrant::into_entrant);
            match (players.next(), players.next(), players.next()) {
                (Some(a), Some(b), None) if count == 2 => out.push(Matchup::new(a, b)),
                _ => {
                    return Err(format!(
                        "category {name} matchup {i} needs exactly two players, found {count}"
                    ))
                }
            }
        }
        categories.push(CategoryEntrants { name, matchups: out });
    }
    Ok(categories)
}

pub fn load_tournament_entrants(path: &Path) -> Result<Vec<CategoryEntrants>, String> {
    let doc: TournamentDocument = read_json(path, "tournament data")?;
    categories_from_document(doc)
}

pub fn load_tournament_tree(path: &Path) -> Result<Tree, String> {
    let entrants = load_tournament_entrants(path)?;
    let tree = build_tree(&entrants).map_err(|e| format!("tournament data {}: {e}", path.display()))?;
    info!(
        "bracket loaded from {}: {} categories, {} matches",
        path.display(),
        tree.categories().len(),
        tree.len()
    );
    Ok(tree)
}

// ── Results ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ResultsDocument {
    #[serde(default)]
    pub winners: BTreeMap<String, RawPick>,
}

/// A missing results file means no results yet.
pub fn load_results(path: &Path) -> Result<ResultsDocument, String> {
    if !path.exists() {
        info!("no results at {}; starting empty", path.display());
        return Ok(ResultsDocument::default());
    }
    read_json(path, "results")
}

// ── Participants ───────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picks: BTreeMap<String, RawPick>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `None` when the document has neither an id nor a nickname.
pub fn participant_from_document(tree: &Tree, doc: ParticipantDocument) -> Option<Participant> {
    let nickname = non_blank(&doc.nickname);
    let id = non_blank(&doc.id).or_else(|| nickname.clone())?;
    let parsed = pick_set_from_raw(tree, &doc.picks);
    log_pick_warnings(&format!("participant {id}"), &parsed.warnings);
    Some(Participant {
        id,
        display_name: nickname,
        full_name: non_blank(&doc.full_name),
        submitted_at: doc.submitted_at,
        locked: doc.is_locked,
        picks: parsed.picks,
    })
}

/// Load participants from a JSON list, or from a directory holding one JSON
/// document per participant. Duplicate ids keep the first occurrence.
pub fn load_participants(tree: &Tree, path: &Path) -> Result<Vec<Participant>, String> {
    let docs: Vec<(String, ParticipantDocument)> = if path.is_dir() {
        let mut files: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|e| format!("read participants dir {}: {e}", path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .collect();
        files.sort();
        let mut docs = Vec::with_capacity(files.len());
        for file in files {
            let doc = read_json(&file, "participant")?;
            docs.push((file.display().to_string(), doc));
        }
        docs
    } else if path.is_file() {
        let list: Vec<ParticipantDocument> = read_json(path, "participants")?;
        list.into_iter()
            .enumerate()
            .map(|(i, doc)| (format!("{}[{i}]", path.display()), doc))
            .collect()
    } else {
        return Err(format!("participants not found at {}", path.display()));
    };

    let mut seen = HashSet::new();
    let mut participants = Vec::with_capacity(docs.len());
    for (source, doc) in docs {
        let Some(participant) = participant_from_document(tree, doc) else {
            warn!("{source}: participant has no id or nickname; skipped");
            continue;
        };
        if !seen.insert(participant.id.clone()) {
            warn!("{source}: duplicate participant id {}; skipped", participant.id);
            continue;
        }
        participants.push(participant);
    }
    info!("loaded {} participants from {}", participants.len(), path.display());
    Ok(participants)
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, String> {
    let data = fs::read_to_string(path).map_err(|e| format!("read {what} {}: {e}", path.display()))?;
    serde_json::from_str(&data).map_err(|e| format!("parse {what} {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchId;
    use serde_json::json;

    fn write_json(path: &Path, value: &serde_json::Value) {
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn tournament_json() -> serde_json::Value {
        json!({
            "mens_draw": [
                { "players": [["1", "Sinner"], ["", "Qualifier A"]] },
                { "players": [["WC", "Local Hope"], ["4", "Zverev"]] }
            ],
            "womens_draw": [
                { "players": [["1", "Sabalenka"], ["2", "Swiatek"]] }
            ]
        })
    }

    #[test]
    fn test_tournament_document_builds_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tournament_data.json");
        write_json(&path, &tournament_json());

        let tree = load_tournament_tree(&path).unwrap();
        let names: Vec<&str> = tree.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["mens", "womens"]);
        assert_eq!(tree.seed_of("mens", "Local Hope"), Some("WC"));
        assert_eq!(tree.seed_of("mens", "Qualifier A"), None);
        assert_eq!(tree.final_match("mens").unwrap().id, MatchId::new("mens", 2, 0));
    }

    #[test]
    fn test_matchup_with_wrong_player_count_is_rejected() {
        let doc: TournamentDocument = serde_json::from_value(json!({
            "mens": [{ "players": [["1", "A"], ["2", "B"], ["3", "C"]] }]
        }))
        .unwrap();
        let err = categories_from_document(doc).unwrap_err();
        assert!(err.contains("exactly two players"));
    }

    #[test]
    fn test_odd_draw_surfaces_bracket_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tournament_data.json");
        write_json(
            &path,
            &json!({ "mens_draw": [
                { "players": ["A", "B"] },
                { "players": ["C", "D"] },
                { "players": ["E", "F"] }
            ]}),
        );
        let err = load_tournament_tree(&path).unwrap_err();
        assert!(err.contains("power of two"), "{err}");
    }

    #[test]
    fn test_missing_results_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let results = load_results(&dir.path().join("results.json")).unwrap();
        assert!(results.winners.is_empty());
    }

    #[test]
    fn test_participants_from_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let tournament = dir.path().join("tournament_data.json");
        write_json(&tournament, &tournament_json());
        let tree = load_tournament_tree(&tournament).unwrap();

        let path = dir.path().join("participants.json");
        write_json(
            &path,
            &json!([
                {
                    "nickname": "ace",
                    "fullName": "Ace Picker",
                    "isLocked": true,
                    "submittedAt": "2024-08-25T10:00:00Z",
                    "picks": {
                        "mens-sf-match-0": ["1", "Sinner"],
                        "mens:2:0": "Sinner",
                        "mens:5:0": "Sinner"
                    }
                },
                { "nickname": "ace", "isLocked": true, "picks": {} },
                { "fullName": "No Name" },
                { "id": "u-2", "nickname": "late", "picks": {} }
            ]),
        );
        let participants = load_participants(&tree, &path).unwrap();
        let ids: Vec<&str> = participants.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ace", "u-2"]);
        let ace = &participants[0];
        assert!(ace.locked);
        assert_eq!(ace.full_name.as_deref(), Some("Ace Picker"));
        assert!(ace.submitted_at.is_some());
        assert_eq!(ace.picks.len(), 2);
        assert_eq!(ace.picks.get(&MatchId::new("mens", 1, 0)), Some("Sinner"));
        assert_eq!(participants[1].name(), "late");
        assert!(!participants[1].locked);
    }

    #[test]
    fn test_participants_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tournament = dir.path().join("tournament_data.json");
        write_json(&tournament, &tournament_json());
        let tree = load_tournament_tree(&tournament).unwrap();

        let entries = dir.path().join("entries");
        fs::create_dir_all(&entries).unwrap();
        write_json(&entries.join("b.json"), &json!({ "id": "bea", "isLocked": true }));
        write_json(&entries.join("a.json"), &json!({ "id": "abe", "isLocked": true }));
        fs::write(entries.join("notes.txt"), "ignored").unwrap();

        let participants = load_participants(&tree, &entries).unwrap();
        let ids: Vec<&str> = participants.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["abe", "bea"]);
    }

    #[test]
    fn test_missing_participants_path_is_an_error() {
        let tree = crate::test_support::sixteen_entrant_tree();
        let err = load_participants(&tree, Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.starts_with("participants not found"));
    }
}
