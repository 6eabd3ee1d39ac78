use crate::error::{Error, Result};
use crate::timeline::Timeline;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::{
  collections::{BTreeMap, HashMap},
  fs,
  path::{Path, PathBuf},
};
use tracing::warn;

pub const TBD_TAG: &str = "TBD";
pub const DEFAULT_POOL_NAME: &str = "Pool";

pub type MatchId = u64;

/// True for the "TBD" sentinel and for blank tags.
pub fn is_unresolved_tag(tag: &str) -> bool {
  let trimmed = tag.trim();
  trimmed.is_empty() || trimmed == TBD_TAG
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
  pub tag: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<u64>,
}

impl Player {
  pub fn tbd() -> Self {
    Player { tag: TBD_TAG.to_string(), id: None }
  }

  pub fn is_unresolved(&self) -> bool {
    is_unresolved_tag(&self.tag)
  }
}

/// Where a player slot gets its occupant from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntrantSource {
  #[serde(rename = "type")]
  pub kind: String,
  #[serde(
    rename = "typeId",
    default,
    deserialize_with = "de_lenient_id",
    skip_serializing_if = "Option::is_none"
  )]
  pub type_id: Option<String>,
}

/// A slot reference to another match, as read from the snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetReference {
  Set(MatchId),
  /// The slot claims a set source but the id is not a usable match id.
  Malformed(String),
}

impl EntrantSource {
  pub fn set(id: MatchId) -> Self {
    EntrantSource { kind: "set".to_string(), type_id: Some(id.to_string()) }
  }

  pub fn set_reference(&self) -> Option<SetReference> {
    if !self.kind.trim().eq_ignore_ascii_case("set") {
      return None;
    }
    let raw = self.type_id.as_deref()?.trim();
    if raw.is_empty() {
      return None;
    }
    Some(match raw.parse::<MatchId>() {
      Ok(id) => SetReference::Set(id),
      Err(_) => SetReference::Malformed(raw.to_string()),
    })
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Match {
  #[serde(deserialize_with = "de_match_id")]
  pub id: MatchId,
  #[serde(default)]
  pub display_name: Option<String>,
  #[serde(default)]
  pub phase_group: Option<String>,
  #[serde(default)]
  pub phase_name: Option<String>,
  #[serde(default)]
  pub round: Option<i32>,
  pub player1: Player,
  pub player2: Player,
  /// Historical start.gg state code at clone time.
  #[serde(default)]
  pub state: Option<i32>,
  #[serde(default)]
  pub created_at: Option<i64>,
  #[serde(default)]
  pub updated_at: Option<i64>,
  #[serde(default)]
  pub started_at: Option<i64>,
  #[serde(default)]
  pub completed_at: Option<i64>,
  #[serde(default)]
  pub winner_id: Option<u64>,
  #[serde(default)]
  pub entrant1_source: Option<EntrantSource>,
  #[serde(default)]
  pub entrant2_source: Option<EntrantSource>,
  #[serde(default)]
  pub station: Option<u32>,
  #[serde(default)]
  pub stream: Option<String>,
}

impl Match {
  pub fn has_unresolved_player(&self) -> bool {
    self.player1.is_unresolved() || self.player2.is_unresolved()
  }

  pub fn pool_name(&self) -> &str {
    self
      .phase_group
      .as_deref()
      .or(self.phase_name.as_deref())
      .filter(|name| !name.trim().is_empty())
      .unwrap_or(DEFAULT_POOL_NAME)
  }

  pub fn phase(&self) -> &str {
    self.phase_name.as_deref().unwrap_or("")
  }

  pub fn round_label(&self) -> String {
    if let Some(name) = self.display_name.as_ref().filter(|name| !name.trim().is_empty()) {
      return name.clone();
    }
    match self.round {
      Some(round) => format!("Round {round}"),
      None => "Unknown Match".to_string(),
    }
  }

  pub fn set_references(&self) -> impl Iterator<Item = SetReference> + '_ {
    [self.entrant1_source.as_ref(), self.entrant2_source.as_ref()]
      .into_iter()
      .flatten()
      .filter_map(EntrantSource::set_reference)
  }

  /// Seeded matches take both players directly and are open from the first tick.
  pub fn is_seeded(&self) -> bool {
    self.set_references().next().is_none()
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TournamentMetadata {
  pub event_name: String,
  pub tournament_name: String,
  pub total_matches: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_slug: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tournament_slug: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cloned_at: Option<i64>,
}

/// Immutable capture of every match in a finished event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TournamentSnapshot {
  pub metadata: TournamentMetadata,
  pub duration_minutes: i64,
  pub matches: Vec<Match>,
  #[serde(skip)]
  index: HashMap<MatchId, usize>,
}

impl TournamentSnapshot {
  pub fn new(metadata: TournamentMetadata, duration_minutes: i64, matches: Vec<Match>) -> Result<Self> {
    let mut snapshot = TournamentSnapshot {
      metadata,
      duration_minutes,
      matches,
      index: HashMap::new(),
    };
    snapshot.build_index()?;
    Ok(snapshot)
  }

  pub fn load(path: &Path) -> Result<Self> {
    let data = fs::read_to_string(path).map_err(|source| Error::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json_str(&data, path)
  }

  pub fn from_json_str(data: &str, origin: &Path) -> Result<Self> {
    let mut snapshot: TournamentSnapshot = serde_json::from_str(data).map_err(|source| Error::Parse {
      path: PathBuf::from(origin),
      source,
    })?;
    snapshot.build_index()?;
    if snapshot.metadata.total_matches != snapshot.matches.len() {
      warn!(
        "snapshot {} declares {} matches but contains {}",
        origin.display(),
        snapshot.metadata.total_matches,
        snapshot.matches.len()
      );
    }
    Ok(snapshot)
  }

  fn build_index(&mut self) -> Result<()> {
    let mut index = HashMap::with_capacity(self.matches.len());
    for (idx, item) in self.matches.iter().enumerate() {
      if index.insert(item.id, idx).is_some() {
        return Err(Error::InvalidSnapshot(format!("duplicate match id {}", item.id)));
      }
    }
    self.index = index;
    Ok(())
  }

  pub fn get(&self, id: MatchId) -> Option<&Match> {
    self.index.get(&id).and_then(|idx| self.matches.get(*idx))
  }

  pub fn contains(&self, id: MatchId) -> bool {
    self.index.contains_key(&id)
  }

  pub fn summary(&self) -> SnapshotSummary {
    let mut state_counts = BTreeMap::new();
    let mut phase_counts = BTreeMap::new();
    let mut seeded_matches = 0;
    for item in &self.matches {
      if item.is_seeded() {
        seeded_matches += 1;
      }
      *state_counts.entry(item.state.unwrap_or(0)).or_insert(0) += 1;
      let phase = item.phase_name.clone().unwrap_or_else(|| "Unknown Phase".to_string());
      *phase_counts.entry(phase).or_insert(0) += 1;
    }
    let timeline = Timeline::build(self, 0).ok();
    SnapshotSummary {
      state_counts,
      phase_counts,
      seeded_matches,
      timeline_events: timeline.as_ref().map(Timeline::len).unwrap_or(0),
      first_event: timeline.as_ref().and_then(Timeline::first_event_time),
      last_event: timeline.as_ref().and_then(Timeline::last_event_time),
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotSummary {
  /// Keyed by historical start.gg state code; 0 when absent.
  pub state_counts: BTreeMap<i32, usize>,
  pub phase_counts: BTreeMap<String, usize>,
  /// Matches with no set feeding into them.
  pub seeded_matches: usize,
  pub timeline_events: usize,
  pub first_event: Option<i64>,
  pub last_event: Option<i64>,
}

/// Human label for a historical start.gg set state code.
pub fn state_code_label(code: i32) -> String {
  match code {
    1 => "Created/Waiting".to_string(),
    2 => "Ready/In Progress".to_string(),
    3 => "Completed".to_string(),
    6 => "In Progress".to_string(),
    7 => "Invalid".to_string(),
    other => format!("Unknown ({other})"),
  }
}

fn de_match_id<'de, D>(deserializer: D) -> Result<MatchId, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::Number(num) => num
      .as_u64()
      .ok_or_else(|| de::Error::custom(format!("match id {num} is not a non-negative integer"))),
    Value::String(raw) => raw
      .trim()
      .parse::<MatchId>()
      .map_err(|_| de::Error::custom(format!("match id \"{raw}\" is not numeric"))),
    other => Err(de::Error::custom(format!("match id must be a number or string, got {other}"))),
  }
}

fn de_lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match Option::<Value>::deserialize(deserializer)? {
    Some(Value::String(raw)) => Some(raw),
    Some(Value::Number(num)) => Some(num.to_string()),
    _ => None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_json() -> String {
    r#"{
      "metadata": { "event_name": "Melee Singles", "tournament_name": "The Big House", "total_matches": 3 },
      "duration_minutes": 95,
      "matches": [
        { "id": 10, "display_name": "Winners Round 1", "phase_group": "A1", "phase_name": "Bracket",
          "player1": { "tag": "Alice" }, "player2": { "tag": "Bob" }, "state": 3,
          "started_at": 1000, "completed_at": 1600 },
        { "id": "11", "phase_name": "Bracket", "round": 2,
          "player1": { "tag": "Alice", "id": 7 }, "player2": { "tag": "TBD" }, "state": 3,
          "entrant1_source": { "type": "set", "typeId": "10" },
          "entrant2_source": { "type": "seed", "typeId": 4 } },
        { "id": 12, "phase_name": "Top 8",
          "player1": { "tag": "" }, "player2": { "tag": "Carol" },
          "entrant1_source": { "type": "set", "typeId": "preview_12_1" } }
      ]
    }"#
    .to_string()
  }

  #[test]
  fn test_load_accepts_numeric_and_string_ids() {
    let snapshot = TournamentSnapshot::from_json_str(&sample_json(), Path::new("mem.json")).unwrap();
    assert_eq!(snapshot.matches.len(), 3);
    assert!(snapshot.contains(11));
    assert_eq!(snapshot.get(11).unwrap().player1.id, Some(7));
    assert_eq!(snapshot.metadata.event_name, "Melee Singles");
  }

  #[test]
  fn test_missing_required_field_fails_fast() {
    let data = r#"{ "metadata": { "event_name": "x", "tournament_name": "y", "total_matches": 1 },
      "duration_minutes": 1, "matches": [ { "id": 1, "player1": { "tag": "A" } } ] }"#;
    let err = TournamentSnapshot::from_json_str(data, Path::new("broken.json")).unwrap_err();
    assert!(matches!(err, Error::Parse { .. }));
    assert!(err.to_string().contains("broken.json"));
  }

  #[test]
  fn test_non_numeric_match_id_is_rejected() {
    let data = r#"{ "metadata": { "event_name": "x", "tournament_name": "y", "total_matches": 1 },
      "duration_minutes": 1,
      "matches": [ { "id": "abc", "player1": { "tag": "A" }, "player2": { "tag": "B" } } ] }"#;
    assert!(TournamentSnapshot::from_json_str(data, Path::new("ids.json")).is_err());
  }

  #[test]
  fn test_duplicate_ids_are_rejected() {
    let data = r#"{ "metadata": { "event_name": "x", "tournament_name": "y", "total_matches": 2 },
      "duration_minutes": 1,
      "matches": [
        { "id": 1, "player1": { "tag": "A" }, "player2": { "tag": "B" } },
        { "id": "1", "player1": { "tag": "C" }, "player2": { "tag": "D" } } ] }"#;
    let err = TournamentSnapshot::from_json_str(data, Path::new("dup.json")).unwrap_err();
    assert!(matches!(err, Error::InvalidSnapshot(_)));
  }

  #[test]
  fn test_set_references_and_seeding() {
    let snapshot = TournamentSnapshot::from_json_str(&sample_json(), Path::new("mem.json")).unwrap();
    assert!(snapshot.get(10).unwrap().is_seeded());

    let refs: Vec<_> = snapshot.get(11).unwrap().set_references().collect();
    assert_eq!(refs, vec![SetReference::Set(10)]);

    let refs: Vec<_> = snapshot.get(12).unwrap().set_references().collect();
    assert_eq!(refs, vec![SetReference::Malformed("preview_12_1".to_string())]);
  }

  #[test]
  fn test_unresolved_players_and_labels() {
    let snapshot = TournamentSnapshot::from_json_str(&sample_json(), Path::new("mem.json")).unwrap();
    assert!(!snapshot.get(10).unwrap().has_unresolved_player());
    assert!(snapshot.get(11).unwrap().has_unresolved_player());
    assert!(snapshot.get(12).unwrap().has_unresolved_player());

    assert_eq!(snapshot.get(10).unwrap().pool_name(), "A1");
    assert_eq!(snapshot.get(11).unwrap().pool_name(), "Bracket");
    assert_eq!(snapshot.get(11).unwrap().round_label(), "Round 2");
  }

  #[test]
  fn test_summary_counts_states_and_phases() {
    let snapshot = TournamentSnapshot::from_json_str(&sample_json(), Path::new("mem.json")).unwrap();
    let summary = snapshot.summary();
    assert_eq!(summary.state_counts.get(&3), Some(&2));
    assert_eq!(summary.state_counts.get(&0), Some(&1));
    assert_eq!(summary.phase_counts.get("Bracket"), Some(&2));
    assert_eq!(summary.phase_counts.get("Top 8"), Some(&1));
    assert_eq!(summary.seeded_matches, 1);
    assert_eq!(summary.timeline_events, 2);
    assert_eq!(summary.first_event, Some(1000));
    assert_eq!(summary.last_event, Some(1600));
  }
}
