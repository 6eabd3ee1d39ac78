use crate::error::{Error, Result};
use crate::simulator::BracketSimulator;
use crate::startgg::fetch_live_state;
use crate::types::{AppConfig, MatchView, TournamentState};
use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  thread::sleep,
  time::{Duration, Instant},
};
use tracing::{debug, warn};

const STOP_CHECK_SLICE: Duration = Duration::from_millis(100);

/// Anything that can be polled for the current bracket state.
pub trait SetFeed {
  fn fetch_sets(&self) -> Result<TournamentState>;

  /// True once further fetches cannot change the state.
  fn is_exhausted(&self) -> bool {
    false
  }
}

/// Replay-backed feed: every fetch moves the simulator forward one real second.
pub struct SimulatedFeed {
  sim: Arc<BracketSimulator>,
}

impl SimulatedFeed {
  pub fn new(sim: Arc<BracketSimulator>) -> Self {
    SimulatedFeed { sim }
  }
}

impl SetFeed for SimulatedFeed {
  fn fetch_sets(&self) -> Result<TournamentState> {
    Ok(self.sim.advance(1.0))
  }

  fn is_exhausted(&self) -> bool {
    self.sim.current_time() >= self.sim.clock().end_time
  }
}

pub struct LiveFeed {
  config: AppConfig,
  event_slug: String,
}

impl LiveFeed {
  pub fn new(config: AppConfig, event_slug: impl Into<String>) -> Self {
    LiveFeed { config, event_slug: event_slug.into() }
  }
}

impl SetFeed for LiveFeed {
  fn fetch_sets(&self) -> Result<TournamentState> {
    fetch_live_state(&self.config, &self.event_slug).map_err(Error::Startgg)
  }
}

/// Polls `feed` every `interval`, calling `on_change` when the visible sets
/// change. Fetch errors are logged and retried on the next poll.
pub fn poll_feed<F>(feed: &dyn SetFeed, interval: Duration, stop: &AtomicBool, mut on_change: F)
where
  F: FnMut(&TournamentState),
{
  let mut last_sets: Option<Vec<MatchView>> = None;
  while !stop.load(Ordering::SeqCst) {
    match feed.fetch_sets() {
      Ok(state) => {
        debug!("feed returned {} sets", state.sets.len());
        if last_sets.as_ref() != Some(&state.sets) {
          on_change(&state);
          last_sets = Some(state.sets);
        }
      }
      Err(e) => warn!("feed fetch failed: {e}"),
    }
    if feed.is_exhausted() {
      break;
    }
    let deadline = Instant::now() + interval;
    while !stop.load(Ordering::SeqCst) {
      let now = Instant::now();
      if now >= deadline {
        break;
      }
      sleep(STOP_CHECK_SLICE.min(deadline - now));
    }
  }
}
