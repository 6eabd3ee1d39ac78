use crate::error::{Error, Result};
use crate::snapshot::{MatchId, TournamentSnapshot};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
  Started,
  Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineEvent {
  pub timestamp: i64,
  pub kind: EventKind,
  pub match_id: MatchId,
}

/// Bounds of simulated time for one replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimClock {
  pub start_time: i64,
  pub end_time: i64,
}

impl SimClock {
  pub fn clamp(&self, t: i64) -> i64 {
    t.clamp(self.start_time, self.end_time)
  }

  pub fn span(&self) -> i64 {
    self.end_time.saturating_sub(self.start_time)
  }

  pub fn progress_at(&self, t: i64) -> f64 {
    let span = self.span();
    if span <= 0 {
      return 1.0;
    }
    (t.saturating_sub(self.start_time) as f64 / span as f64).clamp(0.0, 1.0)
  }

  pub fn time_at_progress(&self, fraction: f64) -> i64 {
    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    self.start_time.saturating_add((self.span() as f64 * fraction).round() as i64)
  }
}

/// Sorted start/completion events, built once per load.
#[derive(Clone, Debug)]
pub struct Timeline {
  events: Vec<TimelineEvent>,
  by_match: HashMap<MatchId, Vec<usize>>,
  clock: SimClock,
}

impl Timeline {
  /// Matches with an unresolved player never contribute events.
  pub fn build(snapshot: &TournamentSnapshot, lead_in_secs: i64) -> Result<Self> {
    let mut events = Vec::new();
    for item in &snapshot.matches {
      if item.has_unresolved_player() {
        continue;
      }
      if let Some(ts) = item.started_at {
        events.push(TimelineEvent { timestamp: ts, kind: EventKind::Started, match_id: item.id });
      }
      if let Some(ts) = item.completed_at {
        events.push(TimelineEvent { timestamp: ts, kind: EventKind::Completed, match_id: item.id });
      }
    }
    Self::from_events(events, lead_in_secs)
  }

  pub fn from_events(mut events: Vec<TimelineEvent>, lead_in_secs: i64) -> Result<Self> {
    events.sort_by_key(|event| event.timestamp);
    let (first, last) = match (events.first(), events.last()) {
      (Some(first), Some(last)) => (first.timestamp, last.timestamp),
      _ => return Err(Error::EmptyTimeline),
    };
    let mut by_match: HashMap<MatchId, Vec<usize>> = HashMap::new();
    for (idx, event) in events.iter().enumerate() {
      by_match.entry(event.match_id).or_default().push(idx);
    }
    Ok(Timeline {
      events,
      by_match,
      clock: SimClock { start_time: first.saturating_sub(lead_in_secs.max(0)), end_time: last },
    })
  }

  pub fn events(&self) -> &[TimelineEvent] {
    &self.events
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  pub fn clock(&self) -> SimClock {
    self.clock
  }

  pub fn first_event_time(&self) -> Option<i64> {
    self.events.first().map(|event| event.timestamp)
  }

  pub fn last_event_time(&self) -> Option<i64> {
    self.events.last().map(|event| event.timestamp)
  }

  /// Events for one match in timeline order.
  pub fn events_for(&self, match_id: MatchId) -> impl Iterator<Item = &TimelineEvent> + '_ {
    self
      .by_match
      .get(&match_id)
      .into_iter()
      .flatten()
      .filter_map(|idx| self.events.get(*idx))
  }

  pub fn started_at(&self, match_id: MatchId) -> Option<i64> {
    self
      .events_for(match_id)
      .find(|event| event.kind == EventKind::Started)
      .map(|event| event.timestamp)
  }

  pub fn completed_at(&self, match_id: MatchId) -> Option<i64> {
    self
      .events_for(match_id)
      .find(|event| event.kind == EventKind::Completed)
      .map(|event| event.timestamp)
  }

  /// Ids with a completion event at or before `now`.
  pub fn completed_ids(&self, now: i64) -> HashSet<MatchId> {
    let reached = self.events.partition_point(|event| event.timestamp <= now);
    self.events[..reached]
      .iter()
      .filter(|event| event.kind == EventKind::Completed)
      .map(|event| event.match_id)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::snapshot::{Match, Player, TournamentMetadata};

  fn make_match(id: MatchId, p1: &str, p2: &str, started: Option<i64>, completed: Option<i64>) -> Match {
    Match {
      id,
      display_name: Some(format!("Match {id}")),
      phase_group: Some("A".to_string()),
      phase_name: Some("Bracket".to_string()),
      round: Some(1),
      player1: Player { tag: p1.to_string(), id: None },
      player2: Player { tag: p2.to_string(), id: None },
      state: Some(3),
      created_at: None,
      updated_at: None,
      started_at: started,
      completed_at: completed,
      winner_id: None,
      entrant1_source: None,
      entrant2_source: None,
      station: None,
      stream: None,
    }
  }

  fn make_snapshot(matches: Vec<Match>) -> TournamentSnapshot {
    let metadata = TournamentMetadata {
      event_name: "Singles".to_string(),
      tournament_name: "Weekly".to_string(),
      total_matches: matches.len(),
      event_slug: None,
      tournament_slug: None,
      cloned_at: None,
    };
    TournamentSnapshot::new(metadata, 0, matches).unwrap()
  }

  #[test]
  fn test_build_sorts_and_sets_clock() {
    let snapshot = make_snapshot(vec![
      make_match(1, "A", "B", Some(5000), Some(5600)),
      make_match(2, "C", "D", Some(4000), None),
    ]);
    let timeline = Timeline::build(&snapshot, 3600).unwrap();
    let stamps: Vec<i64> = timeline.events().iter().map(|event| event.timestamp).collect();
    assert_eq!(stamps, vec![4000, 5000, 5600]);
    assert_eq!(timeline.clock(), SimClock { start_time: 400, end_time: 5600 });
  }

  #[test]
  fn test_tbd_and_blank_players_are_skipped() {
    let snapshot = make_snapshot(vec![
      make_match(1, "A", "TBD", Some(100), Some(200)),
      make_match(2, " ", "B", Some(100), Some(200)),
      make_match(3, "A", "B", Some(300), None),
    ]);
    let timeline = Timeline::build(&snapshot, 3600).unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline.events()[0].match_id, 3);
  }

  #[test]
  fn test_empty_timeline_is_an_error() {
    let snapshot = make_snapshot(vec![make_match(1, "A", "B", None, None)]);
    assert!(matches!(Timeline::build(&snapshot, 3600), Err(Error::EmptyTimeline)));
  }

  #[test]
  fn test_same_timestamp_keeps_start_before_completion() {
    let snapshot = make_snapshot(vec![make_match(1, "A", "B", Some(100), Some(100))]);
    let timeline = Timeline::build(&snapshot, 3600).unwrap();
    let kinds: Vec<EventKind> = timeline.events_for(1).map(|event| event.kind).collect();
    assert_eq!(kinds, vec![EventKind::Started, EventKind::Completed]);
  }

  #[test]
  fn test_completed_ids_respects_now() {
    let snapshot = make_snapshot(vec![
      make_match(1, "A", "B", Some(100), Some(400)),
      make_match(2, "C", "D", Some(100), Some(900)),
    ]);
    let timeline = Timeline::build(&snapshot, 3600).unwrap();
    assert!(timeline.completed_ids(399).is_empty());
    assert_eq!(timeline.completed_ids(400), HashSet::from([1]));
    assert_eq!(timeline.completed_ids(10_000), HashSet::from([1, 2]));
    assert_eq!(timeline.completed_at(2), Some(900));
    assert_eq!(timeline.started_at(2), Some(100));
  }

  #[test]
  fn test_extreme_lead_in_saturates() {
    let snapshot = make_snapshot(vec![make_match(1, "A", "B", Some(-100), Some(500))]);
    let timeline = Timeline::build(&snapshot, i64::MIN).unwrap();
    assert_eq!(timeline.clock().start_time, -100);
    let timeline = Timeline::build(&snapshot, i64::MAX).unwrap();
    assert_eq!(timeline.clock().start_time, i64::MIN);
    assert_eq!(timeline.clock().span(), i64::MAX);
    assert_eq!(timeline.clock().progress_at(500), 1.0);
  }

  #[test]
  fn test_clock_progress_is_bounded() {
    let clock = SimClock { start_time: 0, end_time: 100 };
    assert_eq!(clock.progress_at(-50), 0.0);
    assert_eq!(clock.progress_at(50), 0.5);
    assert_eq!(clock.progress_at(500), 1.0);
    assert_eq!(clock.time_at_progress(2.0), 100);
    assert_eq!(clock.time_at_progress(-1.0), 0);
    assert_eq!(clock.clamp(-7), 0);
  }
}
