use crate::lifecycle::MatchState;
use crate::snapshot::{is_unresolved_tag, TBD_TAG};
use crate::types::{MatchView, SimulationContext, TournamentState, CONSOLE_PREVIEW_SETS};

const TAG_WIDTH: usize = 12;
const LONE_TAG_WIDTH: usize = 24;

pub fn format_duration(secs: i64) -> String {
  if secs < 60 {
    return format!("{secs}s");
  }
  if secs < 3600 {
    let (minutes, seconds) = (secs / 60, secs % 60);
    return if seconds > 0 { format!("{minutes}m {seconds}s") } else { format!("{minutes}m") };
  }
  let (hours, minutes) = (secs / 3600, (secs % 3600) / 60);
  if minutes > 0 {
    format!("{hours}h {minutes}m")
  } else {
    format!("{hours}h")
  }
}

/// How long a match has sat in its current state, measured against `ctx`.
pub fn time_since_ready(view: &MatchView, ctx: &SimulationContext) -> String {
  let since = match view.state {
    MatchState::Ready => Some(view.started_at.unwrap_or(view.updated_at)),
    MatchState::InProgress => view.started_at,
    MatchState::Waiting => Some(view.updated_at),
    MatchState::Completed => None,
  };
  match since {
    Some(ts) if ts > 0 && ctx.current_time >= ts => format_duration(ctx.current_time - ts),
    _ => "-".to_string(),
  }
}

fn truncate(tag: &str, width: usize) -> String {
  tag.chars().take(width).collect()
}

/// `A vs B`, with any unresolved side moved to the right.
pub fn match_name(view: &MatchView) -> String {
  let (p1, p2) = (view.player1.tag.trim(), view.player2.tag.trim());
  match (is_unresolved_tag(p1), is_unresolved_tag(p2)) {
    (true, false) if p1.is_empty() => format!("{} vs {TBD_TAG}", truncate(p2, LONE_TAG_WIDTH)),
    (true, false) => format!("{} vs {TBD_TAG}", truncate(p2, TAG_WIDTH)),
    (false, true) if p2.is_empty() => format!("{} vs {TBD_TAG}", truncate(p1, LONE_TAG_WIDTH)),
    _ => format!("{} vs {}", truncate(p1, TAG_WIDTH), truncate(p2, TAG_WIDTH)),
  }
}

pub fn status_text(view: &MatchView) -> String {
  let status = if view.state == MatchState::Ready && view.started_at.is_some() {
    MatchState::InProgress.label()
  } else {
    view.state.label()
  };
  match (view.station, view.stream.as_deref()) {
    (Some(station), _) if station > 0 => format!("{status} (Station {station})"),
    (_, Some(stream)) if !stream.is_empty() => format!("{status} (Stream: {stream})"),
    _ => status.to_string(),
  }
}

/// Short multi-line rendering used by the console consumers.
pub fn console_summary(state: &TournamentState) -> String {
  let mut out = format!(
    "{} / {}: {} active matches\n",
    state.tournament_name,
    state.event_name,
    state.sets.len()
  );
  for view in state.sets.iter().take(CONSOLE_PREVIEW_SETS) {
    out.push_str(&format!(
      "  [{}] {} - {} | {} | {}\n",
      view.pool_name,
      view.display_name,
      match_name(view),
      status_text(view),
      time_since_ready(view, &state.context)
    ));
  }
  if state.sets.len() > CONSOLE_PREVIEW_SETS {
    out.push_str(&format!("  ... and {} more\n", state.sets.len() - CONSOLE_PREVIEW_SETS));
  }
  out
}
