use crate::lifecycle::{state_of, MatchState};
use crate::snapshot::{Match, MatchId, SetReference, TournamentSnapshot};
use crate::timeline::Timeline;
use crate::types::{MatchView, PhaseGate, SimulationPolicy};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

/// Direct set-to-set prerequisites, checked once at load.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
  prerequisites: HashMap<MatchId, Vec<MatchId>>,
  blocked: HashSet<MatchId>,
}

impl DependencyGraph {
  /// Matches with a dangling or malformed reference, and every match on a
  /// dependency cycle, are blocked for the whole replay.
  pub fn build(snapshot: &TournamentSnapshot) -> Self {
    let mut prerequisites: HashMap<MatchId, Vec<MatchId>> = HashMap::new();
    let mut blocked = HashSet::new();

    for item in &snapshot.matches {
      let mut deps = Vec::new();
      for reference in item.set_references() {
        match reference {
          SetReference::Set(target) if snapshot.contains(target) => deps.push(target),
          SetReference::Set(target) => {
            warn!("match {} depends on unknown match {}; it will never become available", item.id, target);
            blocked.insert(item.id);
          }
          SetReference::Malformed(raw) => {
            warn!("match {} has malformed set source {:?}; it will never become available", item.id, raw);
            blocked.insert(item.id);
          }
        }
      }
      if !deps.is_empty() {
        prerequisites.insert(item.id, deps);
      }
    }

    let mut cyclic: Vec<MatchId> = prerequisites
      .keys()
      .copied()
      .filter(|id| reaches_itself(*id, &prerequisites))
      .collect();
    if !cyclic.is_empty() {
      cyclic.sort_unstable();
      warn!("dependency cycle through matches {:?}; they will never become available", cyclic);
      blocked.extend(cyclic);
    }

    DependencyGraph { prerequisites, blocked }
  }

  pub fn prerequisites(&self, id: MatchId) -> &[MatchId] {
    self.prerequisites.get(&id).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn is_blocked(&self, id: MatchId) -> bool {
    self.blocked.contains(&id)
  }

  pub fn blocked_count(&self) -> usize {
    self.blocked.len()
  }
}

fn reaches_itself(start: MatchId, prerequisites: &HashMap<MatchId, Vec<MatchId>>) -> bool {
  let mut seen = HashSet::new();
  let mut queue: VecDeque<MatchId> = prerequisites.get(&start).into_iter().flatten().copied().collect();
  while let Some(next) = queue.pop_front() {
    if next == start {
      return true;
    }
    if seen.insert(next) {
      queue.extend(prerequisites.get(&next).into_iter().flatten().copied());
    }
  }
  false
}

/// When a phase gate opens, given the recorded completions of its prerequisite phase.
#[derive(Clone, Debug, PartialEq)]
struct GateSchedule {
  phase: String,
  /// `None` when the prerequisite phase never completes enough matches.
  opens_at: Option<i64>,
}

impl GateSchedule {
  fn compute(gate: &PhaseGate, snapshot: &TournamentSnapshot, timeline: &Timeline) -> Self {
    let prerequisite: Vec<&Match> = snapshot
      .matches
      .iter()
      .filter(|item| item.phase_name.as_deref() == Some(gate.prerequisite_phase.as_str()))
      .collect();
    let required = (prerequisite.len() as f64 * gate.min_completed_ratio).ceil().max(0.0) as usize;
    let opens_at = if required == 0 {
      Some(i64::MIN)
    } else {
      let mut completions: Vec<i64> = prerequisite
        .iter()
        .filter_map(|item| timeline.completed_at(item.id))
        .collect();
      completions.sort_unstable();
      completions.get(required - 1).copied()
    };
    GateSchedule { phase: gate.phase.clone(), opens_at }
  }
}

/// Decides which matches are unlocked at a given simulated time.
#[derive(Clone, Debug)]
pub struct AvailabilityResolver {
  graph: DependencyGraph,
  gates: Vec<GateSchedule>,
  in_progress_window_secs: i64,
}

impl AvailabilityResolver {
  pub fn new(snapshot: &TournamentSnapshot, timeline: &Timeline, policy: &SimulationPolicy) -> Self {
    AvailabilityResolver {
      graph: DependencyGraph::build(snapshot),
      gates: policy
        .phase_gates
        .iter()
        .map(|gate| GateSchedule::compute(gate, snapshot, timeline))
        .collect(),
      in_progress_window_secs: policy.in_progress_window_secs,
    }
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  /// Latest opening time over every gate on `phase`; `None` means never.
  fn gate_opens_at(&self, phase: &str) -> Option<i64> {
    let mut opens = i64::MIN;
    for gate in self.gates.iter().filter(|gate| gate.phase == phase) {
      opens = opens.max(gate.opens_at?);
    }
    Some(opens)
  }

  /// Unlocked, uncompleted matches with known players, in snapshot order.
  pub fn available_matches(&self, snapshot: &TournamentSnapshot, timeline: &Timeline, now: i64) -> Vec<MatchView> {
    let completed = timeline.completed_ids(now);
    let start_time = timeline.clock().start_time;
    let mut out = Vec::new();

    for item in &snapshot.matches {
      if completed.contains(&item.id) || item.has_unresolved_player() || self.graph.is_blocked(item.id) {
        continue;
      }
      let gate_open = match self.gate_opens_at(item.phase()) {
        Some(opens) if opens <= now => opens,
        _ => continue,
      };
      let deps = self.graph.prerequisites(item.id);
      if deps.iter().any(|dep| !completed.contains(dep)) {
        continue;
      }

      let state = state_of(item.id, timeline, now, self.in_progress_window_secs);
      let started_at = timeline.started_at(item.id).filter(|ts| *ts <= now);
      let updated_at = match (state, started_at) {
        (MatchState::InProgress | MatchState::Ready, Some(started)) => started,
        _ => deps
          .iter()
          .filter_map(|dep| timeline.completed_at(*dep))
          .fold(start_time.max(gate_open), i64::max),
      };

      out.push(MatchView {
        id: item.id,
        display_name: item.round_label(),
        pool_name: item.pool_name().to_string(),
        phase_name: item.phase().to_string(),
        round: item.round,
        player1: item.player1.clone(),
        player2: item.player2.clone(),
        state,
        updated_at,
        started_at,
        station: item.station,
        stream: item.stream.clone(),
      });
    }
    out
  }
}
