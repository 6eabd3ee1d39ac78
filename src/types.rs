use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lifecycle::MatchState;
use crate::snapshot::{MatchId, Player};

// ── Constants ──────────────────────────────────────────────────────────

pub const STARTGG_API_URL: &str = "https://api.start.gg/gql/alpha";
pub const STARTGG_SITE_URL: &str = "https://start.gg";
pub const STARTGG_CLONE_SETS_PER_PAGE: i32 = 50;
pub const STARTGG_LIVE_SETS_PER_PAGE: i32 = 100;
pub const STARTGG_CLONE_STATES: [i32; 5] = [1, 2, 3, 6, 7];
pub const STARTGG_ACTIVE_STATES: [i32; 3] = [1, 2, 6];
pub const STARTGG_PAGE_DELAY_MS: u64 = 200;
pub const STARTGG_POLL_INTERVAL_MS: u64 = 30_000;
pub const STARTGG_ACTIVE_SEARCH_PER_PAGE: i32 = 75;
pub const STARTGG_ACTIVE_SEARCH_SETS: i32 = 5;
pub const ACTIVE_SEARCH_LOOKBACK_SECS: i64 = 12 * 3600;
pub const ACTIVE_SEARCH_LOOKAHEAD_SECS: i64 = 6 * 3600;
pub const ACTIVE_START_MAX_AGE_SECS: i64 = 8 * 3600;
pub const ACTIVE_START_MAX_LEAD_SECS: i64 = 4 * 3600;
pub const DEFAULT_DATA_DIR: &str = "simulator_data";
pub const DEFAULT_SPEED_MULTIPLIER: f64 = 60.0;
pub const CONSOLE_PREVIEW_SETS: usize = 5;
/// Upper bound for any configured lead-in or window, one week.
pub const MAX_POLICY_WINDOW_SECS: i64 = 7 * 24 * 3600;

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub startgg_token: String,
    pub data_dir: String,
    pub speed_multiplier: f64,
    pub poll_interval_ms: u64,
    pub simulation: SimulationPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            startgg_token: String::new(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            speed_multiplier: DEFAULT_SPEED_MULTIPLIER,
            poll_interval_ms: STARTGG_POLL_INTERVAL_MS,
            simulation: SimulationPolicy::default(),
        }
    }
}

/// Organizer pacing knobs. The defaults are rough guesses at how a real
/// event is run and are worth revisiting with people who run brackets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationPolicy {
    /// Seconds between "doors open" and the first recorded event.
    pub lead_in_secs: i64,
    /// A started match counts as in progress for this long, then reads as ready.
    pub in_progress_window_secs: i64,
    /// Every open match is shown while this much of the event has elapsed.
    pub opening_window_secs: i64,
    pub min_concurrent: usize,
    pub max_concurrent: usize,
    pub pool_divisor: usize,
    pub phase_gates: Vec<PhaseGate>,
}

impl Default for SimulationPolicy {
    fn default() -> Self {
        Self {
            lead_in_secs: 3600,
            in_progress_window_secs: 600,
            opening_window_secs: 7200,
            min_concurrent: 2,
            max_concurrent: 4,
            pool_divisor: 3,
            phase_gates: vec![
                PhaseGate {
                    phase: "Top 8".to_string(),
                    prerequisite_phase: "Bracket".to_string(),
                    min_completed_ratio: 0.75,
                },
                PhaseGate {
                    phase: "Top 24".to_string(),
                    prerequisite_phase: "Bracket".to_string(),
                    min_completed_ratio: 0.5,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseGate {
    pub phase: String,
    pub prerequisite_phase: String,
    pub min_completed_ratio: f64,
}

// ── Bracket state payloads ─────────────────────────────────────────────

/// One visible match as handed to consumers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    pub id: MatchId,
    pub display_name: String,
    pub pool_name: String,
    pub phase_name: String,
    pub round: Option<i32>,
    pub player1: Player,
    pub player2: Player,
    pub state: MatchState,
    pub updated_at: i64,
    pub started_at: Option<i64>,
    pub station: Option<u32>,
    pub stream: Option<String>,
}

/// Time reference for every duration shown alongside a state.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationContext {
    pub current_time: i64,
    pub start_time: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TournamentState {
    pub event_name: String,
    pub tournament_name: String,
    pub sets: Vec<MatchView>,
    pub context: SimulationContext,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationProgress {
    pub progress: f64,
    pub current_time: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub current_time_str: String,
    pub active_matches: usize,
}

// ── Cloned snapshot listing ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ClonedTournament {
    pub filename: String,
    pub path: std::path::PathBuf,
    pub metadata: crate::snapshot::TournamentMetadata,
    pub duration_minutes: i64,
}

// ── Start.gg link parsing ──────────────────────────────────────────────

#[derive(Default, Debug)]
pub struct StartggLinkInfo {
    pub tournament_slug: Option<String>,
    pub event_slug: Option<String>,
}

/// An in-progress event picked by the active-event search.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEventCandidate {
    pub tournament_name: String,
    pub event_name: String,
    pub event_slug: String,
    pub pool_count: usize,
    pub active_matches: usize,
    pub start_at: i64,
}

// ── Start.gg GraphQL response types ────────────────────────────────────

#[derive(Deserialize)]
pub struct StartggGraphqlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<StartggGraphqlError>>,
}

#[derive(Deserialize)]
pub struct StartggGraphqlError {
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggEventIdData {
    pub event: Option<StartggEventIdNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggEventIdNode {
    pub id: Option<Value>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggEventSetsData {
    pub event: Option<StartggEventSetsNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggEventSetsNode {
    pub id: Option<Value>,
    pub name: Option<String>,
    pub start_at: Option<i64>,
    pub tournament: Option<StartggTournamentRef>,
    pub sets: Option<StartggSetConnection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggTournamentRef {
    pub name: Option<String>,
    pub slug: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggSetConnection {
    pub nodes: Option<Vec<StartggSetNode>>,
    pub page_info: Option<StartggPageInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggPageInfo {
    pub total: Option<i64>,
    pub total_pages: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggSetNode {
    pub id: Option<Value>,
    pub full_round_text: Option<String>,
    pub identifier: Option<String>,
    pub state: Option<Value>,
    pub round: Option<i32>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub winner_id: Option<Value>,
    pub slots: Option<Vec<StartggSetSlotNode>>,
    pub phase_group: Option<StartggPhaseGroupNode>,
    pub station: Option<StartggStationNode>,
    pub stream: Option<StartggStreamNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggSetSlotNode {
    pub entrant: Option<StartggEntrantStub>,
    pub prereq_id: Option<Value>,
    pub prereq_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggEntrantStub {
    pub id: Option<Value>,
    pub participants: Option<Vec<StartggParticipantNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggParticipantNode {
    pub gamer_tag: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggPhaseGroupNode {
    pub id: Option<Value>,
    pub display_identifier: Option<String>,
    pub phase: Option<StartggPhaseNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggPhaseNode {
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggStationNode {
    pub number: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggStreamNode {
    pub stream_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggTournamentsData {
    pub tournaments: Option<StartggTournamentConnection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggTournamentConnection {
    pub nodes: Option<Vec<StartggTournamentNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggTournamentNode {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub start_at: Option<i64>,
    pub events: Option<Vec<StartggEventSummaryNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartggEventSummaryNode {
    pub name: Option<String>,
    pub slug: Option<String>,
    /// Activity state; start.gg returns either the enum name or its number.
    pub state: Option<Value>,
    pub sets: Option<StartggSetConnection>,
}
