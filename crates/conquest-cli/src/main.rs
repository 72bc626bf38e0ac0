//! Conquest CLI - drive the reconciliation engine from recorded pushes.
//!
//! - `conquest diff` - print the moves inferred between two snapshots
//! - `conquest replay` - run a recorded session headlessly and log every cue

mod event_log;
mod shell;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use conquest_protocol::{decode_regions, decode_snapshot, PlayerSlot, RegionGraph, Snapshot};
use conquest_reconcile::{
    detect, BannerState, ReconcileConfig, ReconcileEvent, Reconciler, ReconcilerHandle,
};
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::event_log::EventLog;
use crate::shell::{CliHooks, TracingEffects};

#[derive(Parser)]
#[command(name = "conquest")]
#[command(about = "Snapshot reconciliation for turn-based conquest games", version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the moves inferred between two server pushes
    Diff {
        before: PathBuf,
        after: PathBuf,

        /// Adjacency list used when the pushes carry none
        #[arg(long)]
        regions: Option<PathBuf>,
    },

    /// Replay a JSONL log of server pushes through a full session
    Replay {
        /// One push per line; the first line is the loaded game
        log: PathBuf,

        /// Seat of the viewing player
        #[arg(long, default_value_t = 0)]
        local_slot: u8,

        /// Timing configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Adjacency list used when the pushes carry none
        #[arg(long)]
        regions: Option<PathBuf>,

        /// Append session events to this JSONL file
        #[arg(long)]
        events: Option<PathBuf>,

        /// Skip presentation delays
        #[arg(long)]
        instant: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Diff {
            before,
            after,
            regions,
        } => diff(&before, &after, regions.as_deref()),
        Commands::Replay {
            log,
            local_slot,
            config,
            regions,
            events,
            instant,
        } => {
            let mut config = ReconcileConfig::load_or_default(config.as_deref())?;
            if instant {
                config = config.instant();
            }
            replay(
                &log,
                PlayerSlot(local_slot),
                config,
                regions.as_deref(),
                events.as_deref(),
            )
            .await
        }
    }
}

fn diff(before: &Path, after: &Path, regions: Option<&Path>) -> Result<()> {
    let before = read_snapshot(before)?;
    let after = read_snapshot(after)?;
    let regions = read_regions(regions)?;

    let moves = detect(&before, &after, &regions);
    println!("{}", serde_json::to_string_pretty(&moves)?);
    Ok(())
}

async fn replay(
    log: &Path,
    local: PlayerSlot,
    config: ReconcileConfig,
    regions: Option<&Path>,
    events: Option<&Path>,
) -> Result<()> {
    let mut snapshots = read_log(log)?.into_iter();
    let Some(loaded) = snapshots.next() else {
        bail!("{} contains no snapshots", log.display());
    };
    let regions = read_regions(regions)?;

    let (reconciler, handle) =
        Reconciler::new(config, local, Arc::new(TracingEffects), Arc::new(CliHooks));
    let event_log = events.map(|path| EventLog::new(path, handle.session_id().to_string()));
    let (stop, stopped) = oneshot::channel();
    let observer = tokio::spawn(observe(handle.clone(), handle.subscribe(), event_log, stopped));
    let session = reconciler.with_regions(regions).spawn();

    info!(log = %log.display(), local = %local, "replaying session");
    handle.load_game(loaded);
    let mut pushed = 0usize;
    for snapshot in snapshots {
        handle.on_snapshot_received(snapshot);
        pushed += 1;
    }
    handle.settled().await;

    let _ = stop.send(());
    let observed = observer.await??;
    handle.shutdown();
    session.await?;

    let committed = handle
        .committed()
        .context("session ended without a committed state")?;
    info!(pushed, observed, turn = committed.turn_number, "replay finished");
    println!("{}", serde_json::to_string_pretty(committed.as_ref())?);
    Ok(())
}

/// Follow session events: log them, and dismiss my-turn banners since nobody
/// is watching.
async fn observe(
    handle: ReconcilerHandle,
    mut events: broadcast::Receiver<ReconcileEvent>,
    log: Option<EventLog>,
    mut stop: oneshot::Receiver<()>,
) -> Result<usize> {
    let mut seen = 0;
    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(event) => {
                    record(&handle, &event, log.as_ref())?;
                    seen += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event observer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut stop => {
                while let Ok(event) = events.try_recv() {
                    record(&handle, &event, log.as_ref())?;
                    seen += 1;
                }
                break;
            }
        }
    }
    Ok(seen)
}

fn record(handle: &ReconcilerHandle, event: &ReconcileEvent, log: Option<&EventLog>) -> Result<()> {
    match event {
        ReconcileEvent::PlayerEliminated(player) => info!(player = %player, "player eliminated"),
        ReconcileEvent::GameEnded(result) => info!(?result, "game over"),
        ReconcileEvent::StateCommitted(snapshot) => info!(
            turn = snapshot.turn_number,
            current = %snapshot.current_player,
            "state committed"
        ),
        ReconcileEvent::BannerChanged(BannerState::ShowingMyTurnBanner) => {
            info!("your turn");
            handle.banner_complete();
        }
        ReconcileEvent::BannerChanged(state) => info!(banner = ?state, "banner"),
    }
    if let Some(log) = log {
        log.append(event)?;
    }
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    decode_snapshot(&json).with_context(|| format!("failed to decode {}", path.display()))
}

fn read_regions(path: Option<&Path>) -> Result<RegionGraph> {
    let Some(path) = path else {
        return Ok(RegionGraph::new());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    decode_regions(&json).with_context(|| format!("failed to decode {}", path.display()))
}

fn read_log(path: &Path) -> Result<Vec<Snapshot>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            decode_snapshot(line)
                .with_context(|| format!("{}:{}: bad snapshot", path.display(), index + 1))
        })
        .collect()
}
