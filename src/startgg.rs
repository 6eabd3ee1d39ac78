use crate::config::*;
use crate::lifecycle::MatchState;
use crate::snapshot::{EntrantSource, Match, Player, TournamentMetadata, TournamentSnapshot, TBD_TAG};
use crate::types::*;
use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    thread::sleep,
    time::Duration,
};
use tracing::{info, warn};

// ── GraphQL query constants ────────────────────────────────────────────

pub const STARTGG_EVENT_ID_QUERY: &str = r#"
query EventBySlug($slug: String!) {
  event(slug: $slug) {
    id
    name
  }
}
"#;

pub const STARTGG_CLONE_SETS_QUERY: &str = r#"
query CompleteEventData($eventId: ID!, $page: Int!, $perPage: Int!, $states: [Int]) {
  event(id: $eventId) {
    id
    name
    startAt
    tournament { name slug }
    sets(page: $page, perPage: $perPage, sortType: CALL_ORDER, filters: { state: $states }) {
      pageInfo { total totalPages }
      nodes {
        id
        fullRoundText
        identifier
        state
        round
        createdAt
        updatedAt
        startedAt
        completedAt
        winnerId
        slots {
          prereqId
          prereqType
          entrant { id participants { gamerTag } }
        }
        phaseGroup { id displayIdentifier phase { name } }
        station { number }
        stream { streamName }
      }
    }
  }
}
"#;

pub const STARTGG_LIVE_SETS_QUERY: &str = r#"
query EventSets($slug: String!, $page: Int!, $perPage: Int!, $states: [Int]) {
  event(slug: $slug) {
    name
    startAt
    tournament { name }
    sets(page: $page, perPage: $perPage, sortType: CALL_ORDER, filters: { state: $states }) {
      pageInfo { totalPages }
      nodes {
        id
        fullRoundText
        identifier
        state
        round
        updatedAt
        startedAt
        slots { entrant { id participants { gamerTag } } }
        phaseGroup { displayIdentifier phase { name } }
        station { number }
        stream { streamName }
      }
    }
  }
}
"#;

pub const STARTGG_ACTIVE_TOURNAMENTS_QUERY: &str = r#"
query TournamentsInWindow($perPage: Int!, $afterDate: Timestamp!, $beforeDate: Timestamp!, $setsPerEvent: Int!, $states: [Int]) {
  tournaments(query: {
    perPage: $perPage
    page: 1
    filter: { afterDate: $afterDate, beforeDate: $beforeDate, published: true }
  }) {
    nodes {
      name
      slug
      startAt
      events {
        name
        slug
        state
        sets(page: 1, perPage: $setsPerEvent, filters: { state: $states }) {
          nodes { id state phaseGroup { displayIdentifier } }
        }
      }
    }
  }
}
"#;

const USER_AGENT: &str = "matchcaller";

// ── Functions ──────────────────────────────────────────────────────────

pub fn startgg_token_from_config(config: &AppConfig) -> Result<String, String> {
  let trimmed = config.startgg_token.trim();
  if !trimmed.is_empty() {
    return Ok(trimmed.to_string());
  }
  env_default("STARTGG_TOKEN")
    .ok_or_else(|| "Start.gg API token is not set (config startggToken, --token or STARTGG_TOKEN).".to_string())
}

pub fn parse_startgg_link_info(link: &str) -> StartggLinkInfo {
  let trimmed = link.trim();
  if trimmed.is_empty() {
    return StartggLinkInfo::default();
  }
  let without_hash = trimmed.split('#').next().unwrap_or(trimmed);
  let without_query = without_hash.split('?').next().unwrap_or(without_hash);
  let path = match without_query.find("start.gg") {
    Some(idx) => &without_query[idx + "start.gg".len()..],
    None => without_query,
  };
  let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
  if segments.is_empty() {
    return StartggLinkInfo::default();
  }

  let tournament_slug = match segments.iter().position(|s| *s == "tournament") {
    Some(idx) => segments.get(idx + 1).map(|slug| slug.to_string()),
    None if segments.len() == 1 => Some(segments[0].to_string()),
    None => None,
  };
  let event_slug = match (tournament_slug.as_ref(), segments.iter().position(|s| *s == "event")) {
    (Some(tournament), Some(idx)) => segments
      .get(idx + 1)
      .map(|event| format!("tournament/{tournament}/event/{event}")),
    _ => None,
  };

  StartggLinkInfo { tournament_slug, event_slug }
}

/// Accepts either a bare event slug or a full event link.
pub fn normalize_event_slug(raw: &str) -> Result<String, String> {
  let trimmed = raw.trim().trim_matches('/');
  if trimmed.is_empty() {
    return Err("Event slug is empty.".to_string());
  }
  if trimmed.contains("start.gg") {
    return parse_startgg_link_info(trimmed)
      .event_slug
      .ok_or_else(|| format!("Link {trimmed} does not point at an event."));
  }
  Ok(trimmed.to_string())
}

pub fn startgg_graphql_request<T: DeserializeOwned>(
  config: &AppConfig,
  query: &str,
  variables: Value,
) -> Result<T, String> {
  let token = startgg_token_from_config(config)?;
  let client = reqwest::blocking::Client::builder()
    .timeout(Duration::from_secs(15))
    .build()
    .map_err(|e| format!("Start.gg client setup failed: {e}"))?;
  let request_log = {
    let vars = serde_json::to_string_pretty(&variables).unwrap_or_else(|_| variables.to_string());
    format!(
      "url: {STARTGG_API_URL}\nAuthorization: Bearer [redacted]\nUser-Agent: {USER_AGENT}\nquery:\n{query}\nvariables:\n{vars}"
    )
  };
  append_startgg_log("Start.gg request", &request_log);
  let body_json = json!({ "query": query, "variables": variables });
  let mut last_send_err = String::new();
  let mut resp = None;
  for attempt in 0..3u32 {
    if attempt > 0 {
      sleep(Duration::from_millis(500 * u64::from(attempt)));
    }
    match client
      .post(STARTGG_API_URL)
      .header("Authorization", format!("Bearer {token}"))
      .header("User-Agent", USER_AGENT)
      .json(&body_json)
      .send()
    {
      Ok(r) => {
        resp = Some(r);
        break;
      }
      Err(e) => {
        last_send_err = format!("Start.gg request failed (attempt {}): {e}", attempt + 1);
        append_startgg_log("Start.gg error", &last_send_err);
      }
    }
  }
  let resp = resp.ok_or_else(|| last_send_err.clone())?;
  let status = resp.status();
  let body = resp.text().map_err(|e| {
    append_startgg_log("Start.gg error", &format!("read failed: {e}"));
    format!("Start.gg read failed: {e}")
  })?;
  append_startgg_log("Start.gg response", &format!("status: {status}\nbody:\n{body}"));
  if !status.is_success() {
    return Err(format!("Start.gg error {status}: {body}"));
  }
  let parsed: StartggGraphqlResponse<T> = serde_json::from_str(&body).map_err(|e| {
    append_startgg_log("Start.gg error", &format!("parse failed: {e}"));
    format!("Start.gg parse failed: {e}")
  })?;
  if let Some(errors) = parsed.errors {
    let message = errors
      .into_iter()
      .filter_map(|err| err.message)
      .collect::<Vec<_>>()
      .join(", ");
    if !message.is_empty() {
      append_startgg_log("Start.gg error", &format!("graphql error: {message}"));
      return Err(format!("Start.gg error: {message}"));
    }
  }
  parsed
    .data
    .ok_or_else(|| "Start.gg response missing data.".to_string())
}

pub fn fetch_event_id(config: &AppConfig, event_slug: &str) -> Result<(u64, String), String> {
  let data: StartggEventIdData =
    startgg_graphql_request(config, STARTGG_EVENT_ID_QUERY, json!({ "slug": event_slug }))?;
  let event = data
    .event
    .ok_or_else(|| format!("Start.gg event {event_slug} not found."))?;
  let id = event
    .id
    .as_ref()
    .and_then(value_to_u64)
    .ok_or_else(|| format!("Start.gg event {event_slug} has no usable id."))?;
  Ok((id, event.name.unwrap_or_default()))
}

/// Pages through every set of an event; returns the event header of the
/// first page alongside all set nodes.
fn fetch_event_sets_paged(
  config: &AppConfig,
  query: &str,
  base_variables: Value,
  per_page: i32,
) -> Result<(StartggEventSetsNode, Vec<StartggSetNode>), String> {
  let mut header: Option<StartggEventSetsNode> = None;
  let mut out = Vec::new();
  let mut page = 1;
  loop {
    let mut variables = base_variables.clone();
    variables["page"] = json!(page);
    variables["perPage"] = json!(per_page);
    let data: StartggEventSetsData = startgg_graphql_request(config, query, variables)?;
    let Some(mut event) = data.event else {
      break;
    };
    let Some(sets) = event.sets.take() else {
      header.get_or_insert(event);
      break;
    };
    let count = sets.nodes.as_ref().map(Vec::len).unwrap_or(0);
    if let Some(nodes) = sets.nodes {
      out.extend(nodes);
    }
    info!("fetched sets page {} ({} sets, {} so far)", page, count, out.len());
    header.get_or_insert(event);
    let total_pages = sets
      .page_info
      .as_ref()
      .and_then(|info| info.total_pages)
      .unwrap_or(page);
    if page >= total_pages {
      break;
    }
    page += 1;
    sleep(Duration::from_millis(STARTGG_PAGE_DELAY_MS));
  }
  let header = header.ok_or_else(|| "Start.gg event not found.".to_string())?;
  Ok((header, out))
}

fn slot_tag(slot: Option<&StartggSetSlotNode>) -> String {
  slot
    .and_then(|slot| slot.entrant.as_ref())
    .and_then(|entrant| entrant.participants.as_ref())
    .and_then(|participants| participants.first())
    .and_then(|participant| participant.gamer_tag.clone())
    .filter(|tag| !tag.trim().is_empty())
    .unwrap_or_else(|| TBD_TAG.to_string())
}

fn slot_player(slot: Option<&StartggSetSlotNode>) -> Player {
  Player {
    tag: slot_tag(slot),
    id: slot
      .and_then(|slot| slot.entrant.as_ref())
      .and_then(|entrant| entrant.id.as_ref())
      .and_then(value_to_u64),
  }
}

fn slot_source(slot: Option<&StartggSetSlotNode>) -> Option<EntrantSource> {
  let slot = slot?;
  let kind = slot.prereq_type.as_ref()?.trim().to_string();
  if kind.is_empty() {
    return None;
  }
  Some(EntrantSource {
    kind,
    type_id: slot.prereq_id.as_ref().and_then(value_to_string),
  })
}

/// Converts one fetched set into a snapshot record. Sets without a usable
/// numeric id (start.gg preview sets) are dropped.
pub fn set_node_to_match(node: &StartggSetNode) -> Option<Match> {
  let id = node.id.as_ref().and_then(value_to_u64)?;
  let slots = node.slots.as_deref().unwrap_or(&[]);
  let phase_group = node.phase_group.as_ref();
  Some(Match {
    id,
    display_name: node
      .full_round_text
      .clone()
      .filter(|text| !text.trim().is_empty())
      .or_else(|| node.round.map(|round| format!("Round {round}"))),
    phase_group: phase_group.and_then(|group| group.display_identifier.clone()),
    phase_name: phase_group
      .and_then(|group| group.phase.as_ref())
      .and_then(|phase| phase.name.clone()),
    round: node.round,
    player1: slot_player(slots.first()),
    player2: slot_player(slots.get(1)),
    state: node.state.as_ref().and_then(value_to_i64).map(|state| state as i32),
    created_at: node.created_at,
    updated_at: node.updated_at,
    started_at: node.started_at,
    completed_at: node.completed_at,
    winner_id: node.winner_id.as_ref().and_then(value_to_u64),
    entrant1_source: slot_source(slots.first()),
    entrant2_source: slot_source(slots.get(1)),
    station: node.station.as_ref().and_then(|station| station.number),
    stream: node.stream.as_ref().and_then(|stream| stream.stream_name.clone()),
  })
}

pub fn build_snapshot_from_sets(
  event_slug: &str,
  event: &StartggEventSetsNode,
  sets: &[StartggSetNode],
  cloned_at: i64,
) -> Result<TournamentSnapshot, String> {
  let mut matches: Vec<Match> = sets.iter().filter_map(set_node_to_match).collect();
  matches.sort_by_key(|item| item.created_at.unwrap_or(0));

  let timestamps: Vec<i64> = matches
    .iter()
    .flat_map(|item| [item.created_at, item.updated_at, item.started_at, item.completed_at])
    .flatten()
    .filter(|ts| *ts > 0)
    .collect();
  let duration_minutes = match (timestamps.iter().min(), timestamps.iter().max()) {
    (Some(min), Some(max)) => (max - min) / 60,
    _ => 0,
  };

  let tournament = event.tournament.as_ref();
  let metadata = TournamentMetadata {
    event_name: event.name.clone().unwrap_or_else(|| event_slug.to_string()),
    tournament_name: tournament.and_then(|t| t.name.clone()).unwrap_or_default(),
    total_matches: matches.len(),
    event_slug: Some(event_slug.to_string()),
    tournament_slug: tournament.and_then(|t| t.slug.clone()),
    cloned_at: Some(cloned_at),
  };
  TournamentSnapshot::new(metadata, duration_minutes, matches).map_err(|e| e.to_string())
}

pub fn snapshot_filename(event_slug: &str, at: DateTime<Local>) -> String {
  let clean_slug = event_slug.replace(['/', '-'], "_");
  format!("tournament_{clean_slug}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Captures every set of a finished event into `<data dir>/tournament_*.json`.
pub fn clone_tournament(config: &AppConfig, event_slug: &str) -> Result<PathBuf, String> {
  let event_slug = normalize_event_slug(event_slug)?;
  info!("cloning tournament event {}", event_slug);
  let (event_id, event_name) = fetch_event_id(config, &event_slug)?;
  info!("resolved {} to event {} ({})", event_slug, event_id, event_name);

  let (event, sets) = fetch_event_sets_paged(
    config,
    STARTGG_CLONE_SETS_QUERY,
    json!({ "eventId": event_id, "states": STARTGG_CLONE_STATES }),
    STARTGG_CLONE_SETS_PER_PAGE,
  )?;
  let snapshot = build_snapshot_from_sets(&event_slug, &event, &sets, now_secs())?;

  let dir = data_dir(config);
  fs::create_dir_all(&dir).map_err(|e| format!("create {}: {e}", dir.display()))?;
  let path = dir.join(snapshot_filename(&event_slug, Local::now()));
  let payload = serde_json::to_string_pretty(&snapshot).map_err(|e| e.to_string())?;
  fs::write(&path, payload).map_err(|e| format!("write {}: {e}", path.display()))?;
  info!(
    "cloned {} matches spanning {} minutes to {}",
    snapshot.matches.len(),
    snapshot.duration_minutes,
    path.display()
  );
  Ok(path)
}

#[derive(Deserialize)]
struct SnapshotHeader {
  metadata: TournamentMetadata,
  duration_minutes: i64,
}

/// Cloned snapshots in `dir`, newest clone first. Unreadable files are skipped.
pub fn list_cloned_tournaments(dir: &Path) -> Vec<ClonedTournament> {
  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) => {
      warn!("cannot list {}: {e}", dir.display());
      return Vec::new();
    }
  };
  let mut out = Vec::new();
  for entry in entries.flatten() {
    let path = entry.path();
    let filename = entry.file_name().to_string_lossy().to_string();
    if !filename.starts_with("tournament_") || !filename.ends_with(".json") {
      continue;
    }
    let header = fs::read_to_string(&path)
      .map_err(|e| e.to_string())
      .and_then(|data| serde_json::from_str::<SnapshotHeader>(&data).map_err(|e| e.to_string()));
    match header {
      Ok(header) => out.push(ClonedTournament {
        filename,
        path,
        metadata: header.metadata,
        duration_minutes: header.duration_minutes,
      }),
      Err(e) => warn!("could not read {}: {e}", path.display()),
    }
  }
  out.sort_by_key(|item| std::cmp::Reverse(item.metadata.cloned_at.unwrap_or(0)));
  out
}

fn live_pool_name(raw: &str) -> String {
  let trimmed = raw.trim();
  let single_letter = trimmed.chars().count() == 1 && trimmed.chars().all(|c| c.is_ascii_alphabetic());
  if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
    format!("Pool {trimmed}")
  } else if single_letter {
    format!("Pool {}", trimmed.to_ascii_uppercase())
  } else {
    trimmed.to_string()
  }
}

/// Maps an active start.gg set onto a visible match; `None` for sets with an
/// unresolved player or an inactive state.
pub fn live_set_view(node: &StartggSetNode, now: i64) -> Option<MatchView> {
  let id = node.id.as_ref().and_then(value_to_u64)?;
  let slots = node.slots.as_deref().unwrap_or(&[]);
  let player1 = slot_player(slots.first());
  let player2 = slot_player(slots.get(1));
  if player1.is_unresolved() || player2.is_unresolved() {
    return None;
  }
  let code = node.state.as_ref().and_then(value_to_i64)?;
  let state = match MatchState::from_code(i32::try_from(code).ok()?)? {
    MatchState::Ready if node.started_at.is_some() => MatchState::InProgress,
    MatchState::Completed => return None,
    state => state,
  };

  let phase_group = node.phase_group.as_ref();
  let phase_name = phase_group
    .and_then(|group| group.phase.as_ref())
    .and_then(|phase| phase.name.clone())
    .unwrap_or_default();
  let pool_name = phase_group
    .and_then(|group| group.display_identifier.as_deref())
    .map(live_pool_name)
    .filter(|name| !name.is_empty())
    .unwrap_or_else(|| "Unknown Pool".to_string());
  let round_text = node
    .full_round_text
    .clone()
    .or_else(|| node.identifier.clone())
    .or_else(|| node.round.map(|round| format!("Round {round}")));
  let bracket = if phase_name.is_empty() { "Unknown Bracket" } else { phase_name.as_str() };
  let display_name = match round_text {
    Some(text) => format!("{bracket} - {text}"),
    None => bracket.to_string(),
  };

  Some(MatchView {
    id,
    display_name,
    pool_name,
    phase_name,
    round: node.round,
    player1,
    player2,
    state,
    updated_at: node.updated_at.unwrap_or(now),
    started_at: node.started_at,
    station: node.station.as_ref().and_then(|station| station.number),
    stream: node.stream.as_ref().and_then(|stream| stream.stream_name.clone()),
  })
}

/// Current active sets of a running event.
pub fn fetch_live_state(config: &AppConfig, event_slug: &str) -> Result<TournamentState, String> {
  let event_slug = normalize_event_slug(event_slug)?;
  let (event, sets) = fetch_event_sets_paged(
    config,
    STARTGG_LIVE_SETS_QUERY,
    json!({ "slug": event_slug, "states": STARTGG_ACTIVE_STATES }),
    STARTGG_LIVE_SETS_PER_PAGE,
  )?;
  let now = now_secs();
  let views: Vec<MatchView> = sets.iter().filter_map(|node| live_set_view(node, now)).collect();
  info!("live feed: {} of {} active sets are playable", views.len(), sets.len());
  Ok(TournamentState {
    event_name: event.name.unwrap_or_else(|| event_slug.clone()),
    tournament_name: event.tournament.and_then(|t| t.name).unwrap_or_default(),
    sets: views,
    context: SimulationContext {
      current_time: now,
      start_time: event.start_at.unwrap_or(now),
    },
  })
}

fn event_is_active(state: Option<&Value>) -> bool {
  match state {
    Some(Value::String(name)) if name.eq_ignore_ascii_case("ACTIVE") => true,
    Some(value) => value_to_i64(value) == Some(2),
    None => false,
  }
}

/// Events that look like they are being run right now: started within the
/// last 8 hours or starting within 4, with several pools or a few active sets.
pub fn active_event_candidates(tournaments: &[StartggTournamentNode], now: i64) -> Vec<ActiveEventCandidate> {
  let mut out = Vec::new();
  for tournament in tournaments {
    let Some(start_at) = tournament.start_at else {
      continue;
    };
    if start_at < now - ACTIVE_START_MAX_AGE_SECS || start_at > now + ACTIVE_START_MAX_LEAD_SECS {
      continue;
    }
    for event in tournament.events.as_deref().unwrap_or(&[]) {
      let sets = event
        .sets
        .as_ref()
        .and_then(|conn| conn.nodes.as_deref())
        .unwrap_or(&[]);
      let active: Vec<&StartggSetNode> = sets
        .iter()
        .filter(|node| {
          node
            .state
            .as_ref()
            .and_then(value_to_i64)
            .is_some_and(|code| STARTGG_ACTIVE_STATES.iter().any(|state| i64::from(*state) == code))
        })
        .collect();
      let pools: BTreeSet<&str> = active
        .iter()
        .filter_map(|node| node.phase_group.as_ref()?.display_identifier.as_deref())
        .filter(|name| !name.trim().is_empty())
        .collect();
      let running = (event_is_active(event.state.as_ref()) && !active.is_empty()) || active.len() >= 5;
      if !running || (pools.len() < 2 && active.len() < 3) {
        continue;
      }
      let Some(event_slug) = event.slug.as_deref().and_then(|slug| normalize_event_slug(slug).ok()) else {
        continue;
      };
      out.push(ActiveEventCandidate {
        tournament_name: tournament.name.clone().unwrap_or_default(),
        event_name: event.name.clone().unwrap_or_default(),
        event_slug,
        pool_count: pools.len(),
        active_matches: active.len(),
        start_at,
      });
    }
  }
  out
}

/// Prefers more pools, then more active sets, then the most recent start.
pub fn pick_active_event(candidates: Vec<ActiveEventCandidate>) -> Option<ActiveEventCandidate> {
  candidates
    .into_iter()
    .max_by_key(|candidate| (candidate.pool_count, candidate.active_matches, candidate.start_at))
}

/// Searches tournaments from 12 hours ago to 6 hours ahead for an event
/// with play under way.
pub fn find_active_event(config: &AppConfig) -> Result<ActiveEventCandidate, String> {
  let now = now_secs();
  let data: StartggTournamentsData = startgg_graphql_request(
    config,
    STARTGG_ACTIVE_TOURNAMENTS_QUERY,
    json!({
      "perPage": STARTGG_ACTIVE_SEARCH_PER_PAGE,
      "afterDate": now - ACTIVE_SEARCH_LOOKBACK_SECS,
      "beforeDate": now + ACTIVE_SEARCH_LOOKAHEAD_SECS,
      "setsPerEvent": STARTGG_ACTIVE_SEARCH_SETS,
      "states": STARTGG_ACTIVE_STATES,
    }),
  )?;
  let tournaments = data.tournaments.and_then(|conn| conn.nodes).unwrap_or_default();
  let candidates = active_event_candidates(&tournaments, now);
  info!(
    "active search: {} tournaments in window, {} running events",
    tournaments.len(),
    candidates.len()
  );
  let picked = pick_active_event(candidates)
    .ok_or_else(|| "No running event with active sets across several pools was found.".to_string())?;
  info!(
    "picked {} - {} ({} pools, {} active sets)",
    picked.tournament_name, picked.event_name, picked.pool_count, picked.active_matches
  );
  Ok(picked)
}

pub fn strip_short_link_prefix(raw: &str) -> &str {
  let trimmed = raw.trim();
  ["https://start.gg/", "http://start.gg/", "start.gg/"]
    .iter()
    .find_map(|prefix| trimmed.strip_prefix(prefix))
    .unwrap_or(trimmed)
}

/// Tournament slug from the page a short link redirected to.
pub fn slug_from_resolved_url(url: &str) -> Option<String> {
  if let Some(slug) = parse_startgg_link_info(url).tournament_slug {
    if url.contains("/tournament/") {
      return Some(slug);
    }
  }
  let segments: Vec<&str> = url.split('/').collect();
  segments
    .len()
    .checked_sub(2)
    .and_then(|idx| segments.get(idx))
    .map(|segment| segment.to_string())
    .filter(|segment| !segment.is_empty())
}

/// Follows a start.gg short link (`start.gg/abbey`) to its tournament slug.
pub fn resolve_short_link(raw: &str) -> Result<String, String> {
  let short = strip_short_link_prefix(raw).trim_matches('/');
  if short.is_empty() {
    return Err("Short link is empty.".to_string());
  }
  let url = format!("{STARTGG_SITE_URL}/{short}");
  let client = reqwest::blocking::Client::builder()
    .timeout(Duration::from_secs(15))
    .build()
    .map_err(|e| format!("HTTP client setup failed: {e}"))?;
  let resp = client
    .get(&url)
    .header("User-Agent", USER_AGENT)
    .send()
    .map_err(|e| format!("Resolve {url} failed: {e}"))?;
  let final_url = resp.url().to_string();
  info!("{} redirected to {}", url, final_url);
  slug_from_resolved_url(&final_url).ok_or_else(|| format!("No tournament slug in {final_url}"))
}

pub fn value_to_i64(value: &Value) -> Option<i64> {
  match value {
    Value::Number(num) => num.as_i64(),
    Value::String(raw) => raw.trim().parse::<i64>().ok(),
    _ => None,
  }
}

pub fn value_to_u64(value: &Value) -> Option<u64> {
  value_to_i64(value).and_then(|num| u64::try_from(num).ok())
}

pub fn value_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(raw) => Some(raw.clone()),
    Value::Number(num) => Some(num.to_string()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn set_node(value: Value) -> StartggSetNode {
    serde_json::from_value(value).unwrap()
  }

  fn event_header() -> StartggEventSetsNode {
    serde_json::from_value(json!({
      "id": 1234,
      "name": "Melee Singles",
      "tournament": { "name": "Abbey Tavern 114", "slug": "tournament/melee-abbey-tavern-114" }
    }))
    .unwrap()
  }

  #[test]
  fn test_set_node_to_match_maps_slots_and_prereqs() {
    let node = set_node(json!({
      "id": 555,
      "fullRoundText": "Winners Semi-Final",
      "state": 3,
      "round": 3,
      "createdAt": 100, "startedAt": 200, "completedAt": 800,
      "winnerId": "77",
      "slots": [
        { "prereqType": "set", "prereqId": "554", "entrant": { "id": 77, "participants": [ { "gamerTag": "Zain" } ] } },
        { "prereqType": "seed", "prereqId": 9, "entrant": null }
      ],
      "phaseGroup": { "displayIdentifier": "B2", "phase": { "name": "Bracket" } },
      "station": { "number": 4 }
    }));
    let item = set_node_to_match(&node).unwrap();
    assert_eq!(item.id, 555);
    assert_eq!(item.player1, Player { tag: "Zain".to_string(), id: Some(77) });
    assert_eq!(item.player2.tag, TBD_TAG);
    assert_eq!(item.phase_group.as_deref(), Some("B2"));
    assert_eq!(item.phase_name.as_deref(), Some("Bracket"));
    assert_eq!(item.winner_id, Some(77));
    assert_eq!(item.station, Some(4));
    assert_eq!(item.entrant1_source, Some(EntrantSource::set(554)));
    assert_eq!(item.entrant2_source.as_ref().map(|s| s.kind.as_str()), Some("seed"));
  }

  #[test]
  fn test_preview_sets_are_dropped() {
    let node = set_node(json!({ "id": "preview_1_2", "slots": [] }));
    assert!(set_node_to_match(&node).is_none());
  }

  #[test]
  fn test_build_snapshot_sorts_and_measures_duration() {
    let sets = vec![
      set_node(json!({ "id": 2, "createdAt": 500, "completedAt": 4100 })),
      set_node(json!({ "id": 1, "createdAt": 100, "startedAt": 200 })),
    ];
    let snapshot = build_snapshot_from_sets("tournament/x/event/y", &event_header(), &sets, 42).unwrap();
    let ids: Vec<u64> = snapshot.matches.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(snapshot.duration_minutes, 66);
    assert_eq!(snapshot.metadata.total_matches, 2);
    assert_eq!(snapshot.metadata.cloned_at, Some(42));
    assert_eq!(snapshot.metadata.tournament_name, "Abbey Tavern 114");
  }

  #[test]
  fn test_snapshot_filename() {
    let at = Local.with_ymd_and_hms(2024, 6, 1, 14, 5, 9).unwrap();
    assert_eq!(
      snapshot_filename("tournament/big-house/event/melee-singles", at),
      "tournament_tournament_big_house_event_melee_singles_20240601_140509.json"
    );
  }

  #[test]
  fn test_list_cloned_tournaments_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, cloned_at: i64| {
      let body = json!({
        "metadata": { "event_name": name, "tournament_name": "T", "total_matches": 0, "cloned_at": cloned_at },
        "duration_minutes": 5,
        "matches": []
      });
      fs::write(dir.path().join(format!("tournament_{name}.json")), body.to_string()).unwrap();
    };
    write("old", 100);
    write("new", 300);
    write("mid", 200);
    fs::write(dir.path().join("tournament_broken.json"), "{").unwrap();
    fs::write(dir.path().join("notes.json"), "{}").unwrap();

    let listed = list_cloned_tournaments(dir.path());
    let names: Vec<&str> = listed.iter().map(|t| t.metadata.event_name.as_str()).collect();
    assert_eq!(names, vec!["new", "mid", "old"]);
    assert_eq!(listed[0].duration_minutes, 5);
  }

  #[test]
  fn test_live_set_view_state_mapping() {
    let base = |state: i64, started: Option<i64>| {
      set_node(json!({
        "id": 9, "state": state, "startedAt": started, "updatedAt": 50, "fullRoundText": "Losers Round 1",
        "slots": [
          { "entrant": { "participants": [ { "gamerTag": "Mango" } ] } },
          { "entrant": { "participants": [ { "gamerTag": "Leffen" } ] } }
        ],
        "phaseGroup": { "displayIdentifier": "3", "phase": { "name": "Pools" } }
      }))
    };
    let view = live_set_view(&base(1, None), 1000).unwrap();
    assert_eq!(view.state, MatchState::Waiting);
    assert_eq!(view.pool_name, "Pool 3");
    assert_eq!(view.display_name, "Pools - Losers Round 1");
    assert_eq!(live_set_view(&base(2, None), 1000).unwrap().state, MatchState::Ready);
    assert_eq!(live_set_view(&base(2, Some(40)), 1000).unwrap().state, MatchState::InProgress);
    assert_eq!(live_set_view(&base(6, None), 1000).unwrap().state, MatchState::InProgress);
    assert!(live_set_view(&base(3, None), 1000).is_none());

    let tbd = set_node(json!({ "id": 10, "state": 1, "slots": [ { "entrant": null } ] }));
    assert!(live_set_view(&tbd, 1000).is_none());
  }

  #[test]
  fn test_active_event_selection() {
    let now = 1_700_000_000;
    let sets = |pools: &[&str], state: i64| {
      let nodes: Vec<Value> = pools
        .iter()
        .enumerate()
        .map(|(idx, pool)| json!({ "id": idx, "state": state, "phaseGroup": { "displayIdentifier": pool } }))
        .collect();
      json!({ "nodes": nodes })
    };
    let data: StartggTournamentsData = serde_json::from_value(json!({
      "tournaments": { "nodes": [
        {
          "name": "Yesterday Weekly", "slug": "tournament/old", "startAt": now - 9 * 3600,
          "events": [ { "name": "Singles", "slug": "tournament/old/event/singles", "state": "ACTIVE",
                        "sets": sets(&["A", "B", "C"], 2) } ]
        },
        {
          "name": "Local Monthly", "slug": "tournament/monthly", "startAt": now - 2 * 3600,
          "events": [
            { "name": "Singles", "slug": "tournament/monthly/event/singles", "state": "ACTIVE",
              "sets": sets(&["1", "2"], 6) },
            { "name": "Doubles", "slug": "tournament/monthly/event/doubles", "state": "CREATED",
              "sets": sets(&["1", "2"], 1) },
            { "name": "Ladder", "slug": "tournament/monthly/event/ladder", "state": 2,
              "sets": sets(&["A"], 2) },
            { "name": "Finished", "slug": "tournament/monthly/event/done", "state": "ACTIVE",
              "sets": sets(&["A", "B"], 3) }
          ]
        },
        {
          "name": "Regional", "slug": "tournament/regional", "startAt": now + 3600,
          "events": [ { "name": "Melee", "slug": "https://start.gg/tournament/regional/event/melee/overview",
                        "state": "CREATED", "sets": sets(&["A1", "A2", "B1", "B1", "B2"], 1) } ]
        },
        { "name": "No date", "events": [] }
      ] }
    }))
    .unwrap();
    let tournaments = data.tournaments.and_then(|conn| conn.nodes).unwrap();

    let candidates = active_event_candidates(&tournaments, now);
    let slugs: Vec<&str> = candidates.iter().map(|c| c.event_slug.as_str()).collect();
    assert_eq!(
      slugs,
      vec!["tournament/monthly/event/singles", "tournament/regional/event/melee"]
    );
    assert_eq!(candidates[1].pool_count, 4);
    assert_eq!(candidates[1].active_matches, 5);

    let picked = pick_active_event(candidates).unwrap();
    assert_eq!(picked.event_name, "Melee");
    assert_eq!(picked.tournament_name, "Regional");
    assert!(pick_active_event(Vec::new()).is_none());
  }

  #[test]
  fn test_short_link_helpers() {
    assert_eq!(strip_short_link_prefix("https://start.gg/abbey"), "abbey");
    assert_eq!(strip_short_link_prefix("start.gg/abbey"), "abbey");
    assert_eq!(strip_short_link_prefix(" abbey "), "abbey");
    assert_eq!(
      slug_from_resolved_url("https://www.start.gg/tournament/melee-abbey-tavern-114/details"),
      Some("melee-abbey-tavern-114".to_string())
    );
    assert_eq!(
      normalize_event_slug("https://start.gg/tournament/genesis-10/event/melee-singles/overview").unwrap(),
      "tournament/genesis-10/event/melee-singles"
    );
    assert!(normalize_event_slug("  ").is_err());
  }
}
