use crate::error::{Error, Result};
use crate::types::*;
use chrono::Local;
use std::{
    env,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Base directory for config, logs and relative data paths.
pub fn home_dir() -> PathBuf {
  match env_default("MATCHCALLER_HOME") {
    Some(raw) => PathBuf::from(raw),
    None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
  }
}

pub fn resolve_home_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    home_dir().join(path)
  }
}

pub fn config_path() -> PathBuf {
  match env_default("MATCHCALLER_CONFIG") {
    Some(raw) => resolve_home_path(&raw),
    None => home_dir().join("config.json"),
  }
}

pub fn logs_dir() -> PathBuf {
  home_dir().join("logs")
}

pub fn data_dir(config: &AppConfig) -> PathBuf {
  let trimmed = config.data_dir.trim();
  if trimmed.is_empty() {
    resolve_home_path(DEFAULT_DATA_DIR)
  } else {
    resolve_home_path(trimmed)
  }
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn apply_env_defaults(config: AppConfig) -> AppConfig {
  apply_overrides(config, env_default)
}

/// Environment values win over the file; `lookup` stands in for the process env.
pub fn apply_overrides<F>(mut config: AppConfig, lookup: F) -> AppConfig
where
  F: Fn(&str) -> Option<String>,
{
  if let Some(value) = lookup("STARTGG_TOKEN") {
    config.startgg_token = value;
  }
  if let Some(value) = lookup("MATCHCALLER_DATA_DIR") {
    config.data_dir = value;
  }
  if let Some(value) = lookup("MATCHCALLER_SPEED") {
    match value.parse::<f64>() {
      Ok(speed) if speed.is_finite() && speed > 0.0 => config.speed_multiplier = speed,
      _ => tracing::warn!("ignoring MATCHCALLER_SPEED={value}: not a positive number"),
    }
  }
  config
}

pub fn load_config_inner() -> Result<AppConfig> {
  let config = load_config_from(&config_path())?;
  Ok(apply_env_defaults(config))
}

/// Reads a config file; a missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
  if !path.is_file() {
    return Ok(AppConfig::default());
  }
  let data = fs::read_to_string(path).map_err(|source| Error::Io {
    path: path.to_path_buf(),
    source,
  })?;
  let config = serde_json::from_str::<AppConfig>(&data)
    .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
  validate_policy(&config.simulation).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
  Ok(config)
}

/// Rejects pacing values that would make the replay meaningless.
pub fn validate_policy(policy: &SimulationPolicy) -> Result<(), String> {
  if policy.max_concurrent == 0 || policy.pool_divisor == 0 {
    return Err("simulation.maxConcurrent and simulation.poolDivisor must be at least 1".to_string());
  }
  let windows = [
    ("leadInSecs", policy.lead_in_secs),
    ("inProgressWindowSecs", policy.in_progress_window_secs),
    ("openingWindowSecs", policy.opening_window_secs),
  ];
  for (name, value) in windows {
    if !(0..=MAX_POLICY_WINDOW_SECS).contains(&value) {
      return Err(format!(
        "simulation.{name} must be between 0 and {MAX_POLICY_WINDOW_SECS}, got {value}"
      ));
    }
  }
  for gate in &policy.phase_gates {
    if !(0.0..=1.0).contains(&gate.min_completed_ratio) {
      return Err(format!(
        "simulation.phaseGates: {} needs a minCompletedRatio between 0 and 1, got {}",
        gate.phase, gate.min_completed_ratio
      ));
    }
  }
  Ok(())
}

/// Loads `<home>/.env` without overriding variables already set.
pub fn load_env_file() {
  let env_path = home_dir().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for (key, value) in contents.lines().filter_map(parse_env_line) {
    if env::var_os(&key).is_none() {
      env::set_var(key, value);
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let raw_value = raw_value.trim();
  let value = ['"', '\'']
    .iter()
    .find_map(|quote| {
      raw_value
        .strip_prefix(*quote)
        .and_then(|rest| rest.strip_suffix(*quote))
    })
    .unwrap_or_else(|| match raw_value.find('#') {
      Some(idx) => raw_value[..idx].trim_end(),
      None => raw_value,
    });
  Some((key.to_string(), value.to_string()))
}

pub fn now_secs() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs() as i64
}

pub fn startgg_log_path() -> PathBuf {
  logs_dir().join("startgg_api.log")
}

pub fn append_startgg_log(label: &str, payload: &str) {
  let dir = logs_dir();
  if fs::create_dir_all(&dir).is_err() {
    return;
  }
  let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
  let entry = format!("[{timestamp}] {label}\n{payload}\n\n");
  if let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(startgg_log_path()) {
    let _ = file.write_all(entry.as_bytes());
  }
}
