use crate::config::{data_dir, now_secs};
use crate::display::console_summary;
use crate::error::{Error, Result};
use crate::feed::{poll_feed, LiveFeed, SimulatedFeed};
use crate::simulator::{format_ctime, BracketSimulator, TokioClock};
use crate::snapshot::{state_code_label, TournamentSnapshot};
use crate::startgg;
use crate::types::{AppConfig, TournamentState};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{info, warn};

/// Live and replayed start.gg bracket state.
#[derive(Parser, Debug)]
#[command(name = "matchcaller")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Only write logs to the log file, not to stderr.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture every set of a finished event into a snapshot file.
    #[command(name = "clone")]
    CloneEvent {
        /// Event slug, e.g. tournament/genesis-10/event/melee-singles, or an event link.
        #[arg(short, long)]
        slug: String,

        /// start.gg API token (falls back to config and STARTGG_TOKEN).
        #[arg(short, long)]
        token: Option<String>,
    },

    /// List cloned snapshots, newest first.
    List,

    /// Replay a snapshot on a virtual clock.
    Simulate {
        /// Snapshot file, or a file name inside the data directory.
        file: PathBuf,

        /// Simulated seconds per real second.
        #[arg(long)]
        speed: Option<f64>,

        /// Start at this fraction of the timeline (0.0 - 1.0).
        #[arg(long)]
        jump: Option<f64>,

        /// Serve /state.json and /progress.json on this address.
        #[arg(long)]
        serve: Option<String>,

        /// Drive the replay through the polling feed instead of the push loop.
        #[arg(long)]
        poll: bool,
    },

    /// Print statistics about a snapshot.
    Analyze {
        /// Snapshot file, or a file name inside the data directory.
        file: PathBuf,
    },

    /// Poll a running event and print its active sets.
    Live {
        #[arg(short, long, required_unless_present = "find_active")]
        slug: Option<String>,

        /// Search start.gg for an event being played right now.
        #[arg(long, conflicts_with = "slug")]
        find_active: bool,

        #[arg(short, long)]
        token: Option<String>,

        /// Poll interval in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Resolve a start.gg short link to its tournament slug.
    Resolve {
        /// Short link such as start.gg/abbey.
        link: String,
    },
}

pub fn execute(command: Commands, mut config: AppConfig) -> Result<()> {
    match command {
        Commands::CloneEvent { slug, token } => {
            if let Some(token) = token {
                config.startgg_token = token;
            }
            let path = startgg::clone_tournament(&config, &slug).map_err(Error::Startgg)?;
            println!("Cloned to {}", path.display());
            Ok(())
        }
        Commands::List => {
            list(&config);
            Ok(())
        }
        Commands::Simulate { file, speed, jump, serve, poll } => {
            let path = resolve_snapshot_path(&file, &config);
            let speed = speed.unwrap_or(config.speed_multiplier);
            simulate(&path, speed, jump, serve, poll, config)
        }
        Commands::Analyze { file } => analyze(&resolve_snapshot_path(&file, &config)),
        Commands::Live { slug, find_active, token, interval_ms } => {
            if let Some(token) = token {
                config.startgg_token = token;
            }
            let slug = match slug {
                Some(slug) if !find_active => slug,
                _ => {
                    let picked = startgg::find_active_event(&config).map_err(Error::Startgg)?;
                    println!(
                        "Following {} - {} ({} pools, {} active sets)",
                        picked.tournament_name, picked.event_name, picked.pool_count, picked.active_matches
                    );
                    picked.event_slug
                }
            };
            let interval = Duration::from_millis(interval_ms.unwrap_or(config.poll_interval_ms));
            live(config, slug, interval)
        }
        Commands::Resolve { link } => {
            let slug = startgg::resolve_short_link(&link).map_err(Error::Startgg)?;
            println!("{slug}");
            Ok(())
        }
    }
}

/// Paths that do not exist as given are looked up in the data directory.
pub fn resolve_snapshot_path(raw: &Path, config: &AppConfig) -> PathBuf {
    if raw.is_file() || raw.is_absolute() {
        return raw.to_path_buf();
    }
    let candidate = data_dir(config).join(raw);
    if candidate.is_file() {
        candidate
    } else {
        raw.to_path_buf()
    }
}

fn list(config: &AppConfig) {
    let dir = data_dir(config);
    let tournaments = startgg::list_cloned_tournaments(&dir);
    if tournaments.is_empty() {
        println!("No cloned tournaments in {}", dir.display());
        return;
    }
    for item in tournaments {
        let cloned = item
            .metadata
            .cloned_at
            .map(format_ctime)
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{}\n  {} / {}: {} matches, {} minutes, cloned {}",
            item.filename,
            item.metadata.tournament_name,
            item.metadata.event_name,
            item.metadata.total_matches,
            item.duration_minutes,
            cloned
        );
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config(format!("tokio runtime: {e}")))
}

fn simulate(
    path: &Path,
    speed: f64,
    jump: Option<f64>,
    serve: Option<String>,
    poll: bool,
    config: AppConfig,
) -> Result<()> {
    let sim = Arc::new(BracketSimulator::load(path, speed, config.simulation)?);
    if let Some(fraction) = jump {
        sim.jump_to_progress(fraction);
    }
    let stop = Arc::new(AtomicBool::new(false));
    runtime()?.block_on(async {
        if let Some(addr) = serve {
            tokio::spawn(crate::server::serve(sim.clone(), addr));
        }
        {
            let sim = sim.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.store(true, Ordering::SeqCst);
                    sim.stop_simulation();
                }
            });
        }
        if poll {
            let feed_sim = sim.clone();
            let worker = tokio::task::spawn_blocking(move || {
                let feed = SimulatedFeed::new(feed_sim.clone());
                poll_feed(&feed, Duration::from_secs(1), &stop, |state| {
                    print_progress(&feed_sim, state);
                });
            });
            if let Err(e) = worker.await {
                warn!("simulated feed worker stopped: {e}");
            }
        } else {
            let progress_sim = sim.clone();
            sim.start_simulation(
                |state| {
                    print_progress(&progress_sim, &state);
                    async {}
                },
                &TokioClock,
            )
            .await;
        }
    });
    info!("simulation finished at {}", format_ctime(sim.current_time()));
    Ok(())
}

fn print_progress(sim: &BracketSimulator, state: &TournamentState) {
    let progress = sim.get_simulation_progress();
    println!(
        "[{:5.1}%] {}\n{}",
        progress.progress * 100.0,
        progress.current_time_str,
        console_summary(state)
    );
}

fn analyze(path: &Path) -> Result<()> {
    let snapshot = TournamentSnapshot::load(path)?;
    let summary = snapshot.summary();
    println!(
        "{} / {}: {} matches over {} minutes",
        snapshot.metadata.tournament_name,
        snapshot.metadata.event_name,
        snapshot.matches.len(),
        snapshot.duration_minutes
    );
    println!("States:");
    for (code, count) in &summary.state_counts {
        println!("  {}: {count}", state_code_label(*code));
    }
    println!("Phases:");
    for (phase, count) in &summary.phase_counts {
        println!("  {phase}: {count}");
    }
    println!("Seeded matches: {}", summary.seeded_matches);
    println!("Timeline: {} events", summary.timeline_events);
    if let (Some(first), Some(last)) = (summary.first_event, summary.last_event) {
        println!("  first: {}", format_ctime(first));
        println!("  last:  {}", format_ctime(last));
    }
    Ok(())
}

fn live(config: AppConfig, slug: String, interval: Duration) -> Result<()> {
    let slug = startgg::normalize_event_slug(&slug).map_err(Error::Startgg)?;
    startgg::startgg_token_from_config(&config).map_err(Error::Startgg)?;
    let stop = Arc::new(AtomicBool::new(false));
    runtime()?.block_on(async {
        {
            let stop = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stop.store(true, Ordering::SeqCst);
                }
            });
        }
        let worker = tokio::task::spawn_blocking(move || {
            let feed = LiveFeed::new(config, slug);
            poll_feed(&feed, interval, &stop, |state| {
                println!("[{}]\n{}", format_ctime(now_secs()), console_summary(state));
            });
        });
        if let Err(e) = worker.await {
            warn!("live feed worker stopped: {e}");
        }
    });
    Ok(())
}
