pub mod types;
pub mod config;
pub mod bracket;
pub mod picks;
pub mod propagation;
pub mod scoring;
pub mod leaderboard;
pub mod store;
pub mod documents;
pub mod roster;
#[cfg(test)]
mod test_support;

use types::*;
use config::*;
use documents::{load_participants, load_results, load_tournament_entrants, load_tournament_tree, ResultsDocument};
use leaderboard::{render_scoreboard, render_scores_csv};
use propagation::propagate;
use roster::{diff_rosters, render_roster_diff};
use scoring::{MatchScore, ScoreRecord, ScoringBasis};
use store::{ChallengeState, LeaderboardStore, PublishedLeaderboard};

use serde::Serialize;
use serde_json::json;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use axum::{
    extract::{Path as AxumPath, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, get_service, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

// ── Tracing ────────────────────────────────────────────────────────────

/// Daily rolling file log under `logs_dir`. Keep the guard alive for the
/// lifetime of the process or buffered lines are lost.
pub fn init_tracing(logs_dir: &Path) -> WorkerGuard {
    fs::create_dir_all(logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    guard
}

// ── Loading ────────────────────────────────────────────────────────────

/// Build the challenge state from the configured documents and publish the
/// first leaderboard.
pub fn load_challenge(config: &ChallengeConfig) -> Result<SharedChallengeState, String> {
    if config.tournament_data_path.trim().is_empty() {
        return Err("tournamentDataPath is not configured".to_string());
    }
    let tree = load_tournament_tree(&resolve_repo_path(&config.tournament_data_path))?;
    for category in tree.categories() {
        config
            .points
            .validate(category.total_rounds())
            .map_err(|e| format!("points for category {}: {e}", category.name))?;
    }

    let leaderboard: SharedLeaderboardStore = Arc::new(Mutex::new(LeaderboardStore::new()));
    let state: SharedChallengeState = Arc::new(ChallengeState::new(
        Arc::new(tree),
        config.points.clone(),
        config.leaderboard.clone(),
        leaderboard,
    ));

    if !config.participants_path.trim().is_empty() {
        let participants = load_participants(state.tree(), &resolve_repo_path(&config.participants_path))?;
        state.replace_participants(participants);
    }
    if !config.results_path.trim().is_empty() {
        let results = load_results(&resolve_repo_path(&config.results_path))?;
        state.replace_results_raw(&results.winners);
    }
    if state.leaderboard().is_none() {
        state.recompute();
    }
    Ok(state)
}

fn published_leaderboard(config: &ChallengeConfig) -> Result<Arc<PublishedLeaderboard>, String> {
    load_challenge(config)?
        .leaderboard()
        .ok_or_else(|| "leaderboard was not published".to_string())
}

pub fn scoreboard_text(config: &ChallengeConfig) -> Result<String, String> {
    Ok(render_scoreboard(&published_leaderboard(config)?.snapshot))
}

pub fn scores_csv_text(config: &ChallengeConfig) -> Result<String, String> {
    Ok(render_scores_csv(&published_leaderboard(config)?.snapshot))
}

/// Roster diff between the configured tournament data and `document`.
pub fn validate_roster(config: &ChallengeConfig, document: &Path) -> Result<String, String> {
    if config.tournament_data_path.trim().is_empty() {
        return Err("tournamentDataPath is not configured".to_string());
    }
    let tree = load_tournament_tree(&resolve_repo_path(&config.tournament_data_path))?;
    let incoming = load_tournament_entrants(document)?;
    Ok(render_roster_diff(&diff_rosters(&tree, &incoming)))
}

// ── HTTP service ───────────────────────────────────────────────────────

pub fn router(state: SharedChallengeState, viewer_dir: Option<PathBuf>) -> Router {
    let app = Router::new()
        .route("/leaderboard.json", get(get_leaderboard_json))
        .route("/bracket.json", get(get_bracket_json))
        .route("/results.json", get(get_results_json))
        .route("/results", put(put_results))
        .route("/participants/:id/score", get(get_participant_score))
        .with_state(state);
    match viewer_dir {
        Some(dir) => app.fallback_service(get_service(ServeDir::new(dir))),
        None => app,
    }
}

pub async fn serve(config: ChallengeConfig) -> Result<(), String> {
    log_config_warnings(&config);
    let state = load_challenge(&config)?;
    let viewer_dir = Some(config.viewer_dir.trim())
        .filter(|dir| !dir.is_empty())
        .map(resolve_repo_path)
        .filter(|dir| dir.is_dir());
    let app = router(state, viewer_dir);

    let addr = config.bind_addr.as_str();
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("bracket server failed to bind {addr}: {e}");
            return Err(format!("bind {addr}: {e}"));
        }
    };
    info!("bracket server listening at http://{addr}/");
    axum::serve(listener, app).await.map_err(|e| {
        error!("bracket server error: {e}");
        format!("server error: {e}")
    })
}

fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response {
    let body = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    (
        status,
        [
            ("Content-Type", "application/json"),
            ("Cache-Control", "no-store"),
            ("Pragma", "no-cache"),
            ("Expires", "0"),
        ],
        body,
    )
        .into_response()
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_response(status, &json!({ "error": message.into() }))
}

async fn get_leaderboard_json(AxumState(state): AxumState<SharedChallengeState>) -> Response {
    match state.leaderboard() {
        Some(published) => json_response(StatusCode::OK, published.as_ref()),
        None => error_response(StatusCode::NOT_FOUND, "leaderboard not published yet"),
    }
}

async fn get_bracket_json(AxumState(state): AxumState<SharedChallengeState>) -> Response {
    json_response(StatusCode::OK, &json!({ "categories": state.tree().layout() }))
}

async fn get_results_json(AxumState(state): AxumState<SharedChallengeState>) -> Response {
    let (revision, actual) = state.actual_results();
    let view = propagate(state.tree(), &actual);
    let champions: Vec<_> = state
        .tree()
        .categories()
        .iter()
        .filter_map(|c| view.champion(&c.name).map(|name| json!({ "category": c.name, "champion": name })))
        .collect();
    json_response(
        StatusCode::OK,
        &json!({
            "resultsRevision": revision,
            "matches": view.matches(),
            "champions": champions,
        }),
    )
}

async fn put_results(AxumState(state): AxumState<SharedChallengeState>, body: String) -> Response {
    let document: ResultsDocument = match serde_json::from_str(&body) {
        Ok(document) => document,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("parse results: {e}")),
    };
    let update = tokio::task::spawn_blocking(move || state.replace_results_raw(&document.winners)).await;
    match update {
        Ok(update) => json_response(StatusCode::OK, &update),
        Err(e) => {
            error!("results update failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("results update failed: {e}"))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantScorePayload {
    participant_id: String,
    name: String,
    results_revision: u64,
    record: ScoreRecord,
    matches: Vec<MatchScore>,
}

async fn get_participant_score(
    AxumState(state): AxumState<SharedChallengeState>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let Some(participant) = state.participant(&id) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown participant {id}"));
    };
    let (revision, actual) = state.actual_results();
    let actual_view = propagate(state.tree(), &actual);
    let (record, matches) = ScoringBasis::new(&actual_view).score(&participant.picks, state.schedule());
    let payload = ParticipantScorePayload {
        name: participant.name().to_string(),
        results_revision: revision,
        record,
        matches,
        participant_id: participant.id,
    };
    json_response(StatusCode::OK, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaderboard::{LeaderboardOptions, Participant};
    use crate::scoring::PointSchedule;
    use crate::test_support::{sixteen_entrant_tree, top_slot_picks};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn make_state() -> SharedChallengeState {
        Arc::new(ChallengeState::new(
            Arc::new(sixteen_entrant_tree()),
            PointSchedule::Doubling,
            LeaderboardOptions::default(),
            Arc::new(Mutex::new(LeaderboardStore::new())),
        ))
    }

    async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_leaderboard_missing_before_first_publish() {
        let app = router(make_state(), None);
        let (status, body) = send(app, "GET", "/leaderboard.json", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_put_results_publishes_and_reports_unknown_matches() {
        let state = make_state();
        state.replace_participants(vec![Participant::new("alice", top_slot_picks(state.tree()))]);

        let body = r#"{ "winners": { "mens-r16-match-0": ["1", "mens-p0"], "mens:9:0": "mens-p0" } }"#;
        let (status, update) = send(router(state.clone(), None), "PUT", "/results", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(update["resultsRevision"], 1);
        assert_eq!(update["warnings"].as_array().unwrap().len(), 1);
        assert_eq!(update["leaderboard"]["decidedMatches"], 1);
        assert_eq!(update["leaderboard"]["entries"][0]["record"]["total"], 1);

        let (status, leaderboard) = send(router(state, None), "GET", "/leaderboard.json", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(leaderboard["resultsRevision"], 1);
        assert_eq!(leaderboard["entries"][0]["participantId"], "alice");
    }

    #[tokio::test]
    async fn test_put_results_rejects_bad_body() {
        let (status, body) = send(router(make_state(), None), "PUT", "/results", "{ nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("parse results"));
    }

    #[tokio::test]
    async fn test_participant_score() {
        let state = make_state();
        let picks = top_slot_picks(state.tree());
        state.replace_participants(vec![Participant::new("alice", picks.clone())]);
        state.replace_results(picks);

        let (status, body) = send(router(state.clone(), None), "GET", "/participants/alice/score", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["total"], 32);
        assert_eq!(body["matches"].as_array().unwrap().len(), 15);

        let (status, _) = send(router(state, None), "GET", "/participants/nobody/score", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bracket_and_results_views() {
        let state = make_state();
        let (status, bracket) = send(router(state.clone(), None), "GET", "/bracket.json", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bracket["categories"][0]["rounds"].as_array().unwrap().len(), 4);

        let (status, results) = send(router(state, None), "GET", "/results.json", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results["resultsRevision"], 0);
        let matches = results["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 15);
        assert_eq!(matches[0]["status"], "open");
        assert_eq!(matches[14]["status"], "pending");
    }

    #[tokio::test]
    async fn test_viewer_files_served_as_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        let app = router(make_state(), Some(dir.path().to_path_buf()));
        let request = Request::builder().uri("/index.html").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    fn write_challenge(dir: &Path, points: Value) -> ChallengeConfig {
        let tournament = dir.join("tournament_data.json");
        fs::write(
            &tournament,
            json!({ "mens_draw": [
                { "players": [["1", "Sinner"], ["", "Qualifier"]] },
                { "players": [["2", "Alcaraz"], ["", "Wildcard"]] }
            ]})
            .to_string(),
        )
        .unwrap();
        let participants = dir.join("participants.json");
        fs::write(
            &participants,
            json!([
                { "nickname": "ace", "isLocked": true, "picks": {
                    "mens-sf-match-0": "Sinner", "mens-sf-match-1": "Alcaraz", "mens-f-match-0": "Sinner"
                }},
                { "nickname": "draft", "isLocked": false, "picks": {} }
            ])
            .to_string(),
        )
        .unwrap();
        let results = dir.join("results.json");
        fs::write(&results, json!({ "winners": { "mens-sf-match-0": "Sinner" } }).to_string()).unwrap();

        ChallengeConfig {
            tournament_data_path: tournament.display().to_string(),
            participants_path: participants.display().to_string(),
            results_path: results.display().to_string(),
            points: serde_json::from_value(points).unwrap(),
            ..ChallengeConfig::default()
        }
    }

    #[test]
    fn test_load_challenge_publishes_locked_participants() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_challenge(dir.path(), json!({ "kind": "doubling" }));
        let state = load_challenge(&config).unwrap();
        let published = state.leaderboard().unwrap();
        assert_eq!(published.results_revision, 1);
        assert_eq!(published.snapshot.entries.len(), 1);
        assert_eq!(published.snapshot.entries[0].participant_id, "ace");
        assert_eq!(published.snapshot.entries[0].record.total, 1);

        let text = scoreboard_text(&config).unwrap();
        assert!(text.contains("ace"));
        assert_eq!(scores_csv_text(&config).unwrap(), "Name,Current Score\nace,1\n");
    }

    #[test]
    fn test_load_challenge_rejects_decreasing_points() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_challenge(dir.path(), json!({ "kind": "perRound", "points": [4, 2] }));
        let err = load_challenge(&config).err().unwrap();
        assert!(err.contains("decreases"), "{err}");
    }

    #[test]
    fn test_validate_roster_against_configured_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_challenge(dir.path(), json!({ "kind": "doubling" }));
        let updated = dir.path().join("updated.json");
        fs::write(
            &updated,
            json!({ "mens_draw": [
                { "players": [["1", "Sinner"], ["", "Qualifier"]] },
                { "players": [["2", "Alcarez"], ["", "Lucky Loser"]] }
            ]})
            .to_string(),
        )
        .unwrap();
        let report = validate_roster(&config, &updated).unwrap();
        assert!(report.contains("\"Alcaraz\" -> \"Alcarez\""), "{report}");
        assert!(report.contains("+ Lucky Loser"));
        assert!(report.contains("- Wildcard"));
    }
}
