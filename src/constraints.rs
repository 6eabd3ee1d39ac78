use crate::lifecycle::{MatchState, MISSING_PLAYER_PRIORITY};
use crate::timeline::SimClock;
use crate::types::{MatchView, SimulationPolicy};
use std::cmp::Reverse;
use std::collections::HashMap;

const UNKNOWN_POOL: &str = "Unknown Pool";

fn sort_priority(view: &MatchView) -> u8 {
  if view.player1.is_unresolved() || view.player2.is_unresolved() {
    MISSING_PLAYER_PRIORITY
  } else {
    view.state.priority()
  }
}

/// Per-pool cap on concurrently visible matches once the opening window is over.
pub fn max_concurrent(pool_size: usize, policy: &SimulationPolicy) -> usize {
  let divisor = policy.pool_divisor.max(1);
  let floor = policy.min_concurrent.min(policy.max_concurrent);
  (pool_size / divisor).clamp(floor, policy.max_concurrent)
}

/// Throttles available matches the way an organizer paces a pool. Pools come
/// back in the order they first appear in `available`.
pub fn apply_constraints(
  available: Vec<MatchView>,
  now: i64,
  clock: SimClock,
  policy: &SimulationPolicy,
) -> Vec<MatchView> {
  let mut pool_index: HashMap<String, usize> = HashMap::new();
  let mut pools: Vec<Vec<MatchView>> = Vec::new();
  for view in available {
    let key = if view.pool_name.trim().is_empty() {
      UNKNOWN_POOL.to_string()
    } else {
      view.pool_name.clone()
    };
    let idx = *pool_index.entry(key).or_insert_with(|| {
      pools.push(Vec::new());
      pools.len() - 1
    });
    pools[idx].push(view);
  }

  let opening = now <= clock.start_time.saturating_add(policy.opening_window_secs);
  let mut out = Vec::new();
  for mut pool in pools {
    let pool_size = pool.len();
    pool.sort_by_key(|view| (sort_priority(view), Reverse(view.updated_at)));

    let (in_progress, waiting): (Vec<MatchView>, Vec<MatchView>) =
      pool.into_iter().partition(|view| view.state == MatchState::InProgress);
    let capacity = if opening {
      waiting.len()
    } else {
      max_concurrent(pool_size, policy).saturating_sub(in_progress.len())
    };
    out.extend(in_progress);
    out.extend(
      waiting
        .into_iter()
        .filter(|view| matches!(view.state, MatchState::Ready | MatchState::Waiting))
        .take(capacity),
    );
  }
  out
}
