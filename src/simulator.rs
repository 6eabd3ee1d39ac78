use crate::availability::AvailabilityResolver;
use crate::constraints::apply_constraints;
use crate::error::Result;
use crate::snapshot::TournamentSnapshot;
use crate::timeline::{SimClock, Timeline};
use crate::types::{MatchView, SimulationContext, SimulationPolicy, SimulationProgress, TournamentState};
use chrono::{DateTime, Local};
use std::{
  future::Future,
  path::Path,
  sync::{
    atomic::{AtomicBool, AtomicI64, Ordering},
    Arc,
  },
  time::Duration,
};
use tracing::{debug, info, warn};

/// Real seconds per driver tick.
const TICK: Duration = Duration::from_secs(1);

/// Source of real-time waits for the driver loop.
pub trait WallClock: Send + Sync {
  fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

pub struct TokioClock;

impl WallClock for TokioClock {
  fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
    tokio::time::sleep(duration)
  }
}

/// Replays a captured tournament along a virtual clock.
pub struct BracketSimulator {
  snapshot: Arc<TournamentSnapshot>,
  timeline: Arc<Timeline>,
  resolver: AvailabilityResolver,
  policy: SimulationPolicy,
  speed: f64,
  current_time: AtomicI64,
  running: AtomicBool,
  stop_requested: AtomicBool,
}

impl BracketSimulator {
  pub fn load(path: &Path, speed: f64, policy: SimulationPolicy) -> Result<Self> {
    let snapshot = TournamentSnapshot::load(path)?;
    info!(
      "loaded {} ({}, {} matches) from {}",
      snapshot.metadata.event_name,
      snapshot.metadata.tournament_name,
      snapshot.matches.len(),
      path.display()
    );
    Self::from_snapshot(snapshot, speed, policy)
  }

  pub fn from_snapshot(snapshot: TournamentSnapshot, speed: f64, policy: SimulationPolicy) -> Result<Self> {
    let timeline = Timeline::build(&snapshot, policy.lead_in_secs)?;
    let resolver = AvailabilityResolver::new(&snapshot, &timeline, &policy);
    let clock = timeline.clock();
    info!(
      "timeline has {} events spanning {}s ({} blocked matches)",
      timeline.len(),
      clock.span(),
      resolver.graph().blocked_count()
    );
    let speed = if speed.is_finite() && speed > 0.0 {
      speed
    } else {
      warn!("invalid speed multiplier {speed}, using 1.0");
      1.0
    };
    Ok(BracketSimulator {
      snapshot: Arc::new(snapshot),
      timeline: Arc::new(timeline),
      resolver,
      policy,
      speed,
      current_time: AtomicI64::new(clock.start_time),
      running: AtomicBool::new(false),
      stop_requested: AtomicBool::new(false),
    })
  }

  pub fn snapshot(&self) -> &TournamentSnapshot {
    &self.snapshot
  }

  pub fn timeline(&self) -> &Timeline {
    &self.timeline
  }

  pub fn clock(&self) -> SimClock {
    self.timeline.clock()
  }

  pub fn speed(&self) -> f64 {
    self.speed
  }

  pub fn current_time(&self) -> i64 {
    self.current_time.load(Ordering::SeqCst)
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::SeqCst)
  }

  /// Visible matches at `now`. Pure: does not touch the clock.
  pub fn state_at(&self, now: i64) -> TournamentState {
    let clock = self.clock();
    let available = self.resolver.available_matches(&self.snapshot, &self.timeline, now);
    let sets = apply_constraints(available, now, clock, &self.policy);
    TournamentState {
      event_name: self.snapshot.metadata.event_name.clone(),
      tournament_name: self.snapshot.metadata.tournament_name.clone(),
      sets,
      context: SimulationContext { current_time: now, start_time: clock.start_time },
    }
  }

  pub fn get_current_state(&self) -> TournamentState {
    self.state_at(self.current_time())
  }

  /// Steps the clock by `real_secs * speed` and returns the state at the new time.
  pub fn advance(&self, real_secs: f64) -> TournamentState {
    let now = self.advance_clock(real_secs);
    self.state_at(now)
  }

  /// Moves simulated time forward by `real_secs * speed`, never past the end,
  /// and returns the new time. A positive step always moves at least one
  /// simulated second.
  pub fn advance_clock(&self, real_secs: f64) -> i64 {
    let mut delta = (real_secs * self.speed).round() as i64;
    if delta <= 0 && real_secs > 0.0 {
      delta = 1;
    }
    let clock = self.clock();
    let previous = self
      .current_time
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(clock.clamp(t.saturating_add(delta))))
      .unwrap_or_else(|t| t);
    clock.clamp(previous.saturating_add(delta))
  }

  pub fn jump_to_time(&self, t: i64) -> i64 {
    let target = self.clock().clamp(t);
    self.current_time.store(target, Ordering::SeqCst);
    info!("jumped to {}", target);
    target
  }

  pub fn jump_to_progress(&self, fraction: f64) -> i64 {
    self.jump_to_time(self.clock().time_at_progress(fraction))
  }

  pub fn get_simulation_progress(&self) -> SimulationProgress {
    let clock = self.clock();
    let current = self.current_time();
    SimulationProgress {
      progress: clock.progress_at(current),
      current_time: current,
      start_time: clock.start_time,
      end_time: clock.end_time,
      current_time_str: format_ctime(current),
      active_matches: self.state_at(current).sets.len(),
    }
  }

  /// Takes effect at the next tick, or before the first one if the driver
  /// has not started yet.
  pub fn stop_simulation(&self) {
    self.stop_requested.store(true, Ordering::SeqCst);
    if self.running.swap(false, Ordering::SeqCst) {
      info!("simulation stop requested at {}", self.current_time());
    }
  }

  /// Drives the replay until the end state has been emitted or a stop is
  /// requested. `on_change` runs only when the visible set differs from the
  /// last emitted one.
  pub async fn start_simulation<F, Fut, C>(&self, mut on_change: F, clock: &C)
  where
    F: FnMut(TournamentState) -> Fut,
    Fut: Future<Output = ()>,
    C: WallClock,
  {
    if self.stop_requested.swap(false, Ordering::SeqCst) {
      info!("simulation stopped before it started");
      return;
    }
    self.running.store(true, Ordering::SeqCst);
    info!("simulation started at {}x from {}", self.speed, self.current_time());
    let end_time = self.clock().end_time;
    let mut last_sets: Option<Vec<MatchView>> = None;

    while !self.stop_requested.load(Ordering::SeqCst) {
      let now = self.current_time();
      let state = self.state_at(now);
      debug!("tick at {} with {} visible matches", now, state.sets.len());
      if last_sets.as_ref() != Some(&state.sets) {
        last_sets = Some(state.sets.clone());
        on_change(state).await;
      }
      if now >= end_time {
        info!("simulation reached the end of the timeline");
        break;
      }
      self.advance_clock(TICK.as_secs_f64());
      clock.sleep(TICK).await;
    }
    self.running.store(false, Ordering::SeqCst);
    self.stop_requested.store(false, Ordering::SeqCst);
  }
}

/// `Sat Jun  1 14:05:09 2024` style, in local time.
pub fn format_ctime(t: i64) -> String {
  match DateTime::from_timestamp(t, 0) {
    Some(utc) => utc.with_timezone(&Local).format("%a %b %e %H:%M:%S %Y").to_string(),
    None => t.to_string(),
  }
}
