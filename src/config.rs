use crate::leaderboard::LeaderboardOptions;
use crate::scoring::PointSchedule;
use crate::types::DEFAULT_BIND_ADDR;
use serde::{Deserialize, Serialize};
use std::{
  env, fs,
  path::{Path, PathBuf},
};
use tracing::{debug, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChallengeConfig {
  pub tournament_id: String,
  pub tournament_data_path: String,
  pub results_path: String,
  pub participants_path: String,
  pub viewer_dir: String,
  pub bind_addr: String,
  pub points: PointSchedule,
  pub leaderboard: LeaderboardOptions,
}

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  env_default("BRACKET_CONFIG_PATH")
    .map(|raw| resolve_repo_path(&raw))
    .unwrap_or_else(|| repo_root().join("config.json"))
}

pub fn logs_dir() -> PathBuf {
  repo_root().join("logs")
}

/// Trimmed value of `key`, or `None` when unset or blank.
pub fn env_default(key: &str) -> Option<String> {
  let value = env::var(key).ok()?;
  let value = value.trim();
  (!value.is_empty()).then(|| value.to_string())
}

pub fn env_flag_true(key: &str) -> bool {
  env_default(key)
    .map(|value| ["1", "true", "yes", "on"].iter().any(|t| value.eq_ignore_ascii_case(t)))
    .unwrap_or(false)
}

pub fn apply_env_defaults(mut config: ChallengeConfig) -> ChallengeConfig {
  if config.tournament_id.trim().is_empty() {
    if let Some(value) = env_default("BRACKET_TOURNAMENT_ID") {
      config.tournament_id = value;
    }
  }
  if config.tournament_data_path.trim().is_empty() {
    if let Some(value) = env_default("BRACKET_TOURNAMENT_DATA") {
      config.tournament_data_path = value;
    }
  }
  if config.results_path.trim().is_empty() {
    if let Some(value) = env_default("BRACKET_RESULTS_PATH") {
      config.results_path = value;
    }
  }
  if config.participants_path.trim().is_empty() {
    if let Some(value) = env_default("BRACKET_PARTICIPANTS_PATH") {
      config.participants_path = value;
    }
  }
  if config.viewer_dir.trim().is_empty() {
    if let Some(value) = env_default("BRACKET_VIEWER_DIR") {
      config.viewer_dir = value;
    }
  }
  if config.bind_addr.trim().is_empty() {
    config.bind_addr = env_default("BRACKET_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
  }
  if env_flag_true("BRACKET_INCLUDE_UNLOCKED") {
    config.leaderboard.include_unlocked = true;
  }
  config
}

pub fn load_config_from(path: &Path) -> Result<ChallengeConfig, String> {
  if !path.is_file() {
    return Ok(apply_env_defaults(ChallengeConfig::default()));
  }
  let data = fs::read_to_string(path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config = serde_json::from_str::<ChallengeConfig>(&data)
    .map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(apply_env_defaults(config))
}

pub fn load_config_inner() -> Result<ChallengeConfig, String> {
  load_config_from(&config_path())
}

pub fn load_env_file() {
  let path = repo_root().join(".env");
  let loaded = load_env_file_from(&path);
  if loaded > 0 {
    debug!("loaded {loaded} variables from {}", path.display());
  }
}

/// Export `KEY=value` lines from `path` without touching variables that are
/// already set. Returns how many were exported.
pub fn load_env_file_from(path: &Path) -> usize {
  let Ok(contents) = fs::read_to_string(path) else {
    return 0;
  };
  let mut loaded = 0;
  for (key, value) in contents.lines().filter_map(parse_env_line) {
    if env::var_os(&key).is_none() {
      env::set_var(key, value);
      loaded += 1;
    }
  }
  loaded
}

/// One `.env` line: blank lines and `#` comments yield `None`, an `export `
/// prefix is allowed, values may be quoted, and unquoted values end at `#`.
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let line = line.trim();
  if line.starts_with('#') {
    return None;
  }
  let line = line.strip_prefix("export ").unwrap_or(line);
  let (key, value) = line.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let value = value.trim();
  let unquoted = ['"', '\'']
    .iter()
    .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)));
  let value = match unquoted {
    Some(inner) => inner,
    None => value.split('#').next().unwrap_or_default().trim_end(),
  };
  Some((key.to_string(), value.to_string()))
}

pub fn log_config_warnings(config: &ChallengeConfig) {
  if config.tournament_data_path.trim().is_empty() {
    warn!("tournamentDataPath is empty; set it in config.json or BRACKET_TOURNAMENT_DATA");
  } else if !resolve_repo_path(&config.tournament_data_path).is_file() {
    warn!("tournament data not found at {}", config.tournament_data_path);
  }
  if config.results_path.trim().is_empty() {
    warn!("resultsPath is empty; starting with no results");
  }
  if config.participants_path.trim().is_empty() {
    warn!("participantsPath is empty; leaderboard will have no entries");
  }
  if !config.viewer_dir.trim().is_empty() && !resolve_repo_path(&config.viewer_dir).is_dir() {
    warn!("viewer directory {} does not exist", config.viewer_dir);
  }
}
