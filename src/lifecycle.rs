use crate::snapshot::MatchId;
use crate::timeline::{EventKind, Timeline};
use serde::Serialize;

/// Lifecycle of a match at a point in simulated time.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MatchState {
  Waiting,
  Ready,
  InProgress,
  Completed,
}

impl MatchState {
  /// Reads a start.gg set state code; 2 is "called", which reads as ready.
  pub fn from_code(code: i32) -> Option<Self> {
    match code {
      1 => Some(MatchState::Waiting),
      2 => Some(MatchState::Ready),
      3 => Some(MatchState::Completed),
      6 => Some(MatchState::InProgress),
      _ => None,
    }
  }

  /// Lower sorts first when filling a pool.
  pub fn priority(self) -> u8 {
    match self {
      MatchState::InProgress => 0,
      MatchState::Ready => 1,
      MatchState::Waiting => 2,
      MatchState::Completed => 4,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      MatchState::Waiting => "Waiting",
      MatchState::Ready => "Ready",
      MatchState::InProgress => "In Progress",
      MatchState::Completed => "Completed",
    }
  }
}

/// Priority given to matches that still lack a player.
pub const MISSING_PLAYER_PRIORITY: u8 = 3;

/// Completion is terminal: a reached completion event wins even when the
/// recorded start sorts after it.
pub fn state_of(match_id: MatchId, timeline: &Timeline, now: i64, in_progress_window_secs: i64) -> MatchState {
  let mut latest_start = None;
  for event in timeline.events_for(match_id).filter(|event| event.timestamp <= now) {
    match event.kind {
      EventKind::Completed => return MatchState::Completed,
      EventKind::Started => latest_start = Some(event.timestamp),
    }
  }
  match latest_start {
    None => MatchState::Waiting,
    Some(started) if now.saturating_sub(started) < in_progress_window_secs => MatchState::InProgress,
    Some(_) => MatchState::Ready,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::timeline::TimelineEvent;

  fn timeline_for(events: Vec<(i64, EventKind, MatchId)>) -> Timeline {
    Timeline::from_events(
      events
        .into_iter()
        .map(|(timestamp, kind, match_id)| TimelineEvent { timestamp, kind, match_id })
        .collect(),
      3600,
    )
    .unwrap()
  }

  #[test]
  fn test_no_events_means_waiting() {
    let timeline = timeline_for(vec![(1000, EventKind::Started, 1)]);
    assert_eq!(state_of(2, &timeline, 5000, 600), MatchState::Waiting);
    assert_eq!(state_of(1, &timeline, 999, 600), MatchState::Waiting);
  }

  #[test]
  fn test_started_is_in_progress_then_ready() {
    let timeline = timeline_for(vec![(1000, EventKind::Started, 1)]);
    assert_eq!(state_of(1, &timeline, 1000, 600), MatchState::InProgress);
    assert_eq!(state_of(1, &timeline, 1599, 600), MatchState::InProgress);
    assert_eq!(state_of(1, &timeline, 1600, 600), MatchState::Ready);
  }

  #[test]
  fn test_completion_wins_once_reached() {
    let timeline = timeline_for(vec![(1000, EventKind::Started, 1), (1400, EventKind::Completed, 1)]);
    assert_eq!(state_of(1, &timeline, 1200, 600), MatchState::InProgress);
    assert_eq!(state_of(1, &timeline, 1400, 600), MatchState::Completed);
  }

  #[test]
  fn test_completion_stays_terminal_with_out_of_order_start() {
    let timeline = timeline_for(vec![(1500, EventKind::Started, 1), (1400, EventKind::Completed, 1)]);
    assert_eq!(state_of(1, &timeline, 1450, 600), MatchState::Completed);
    assert_eq!(state_of(1, &timeline, 1550, 600), MatchState::Completed);
  }

  #[test]
  fn test_codes_and_priorities() {
    assert_eq!(MatchState::from_code(6), Some(MatchState::InProgress));
    assert_eq!(MatchState::from_code(2), Some(MatchState::Ready));
    assert_eq!(MatchState::from_code(7), None);
    assert!(MatchState::InProgress.priority() < MatchState::Ready.priority());
    assert!(MatchState::Waiting.priority() < MISSING_PLAYER_PRIORITY);
  }
}
