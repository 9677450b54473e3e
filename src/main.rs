use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tee_sheet::config::EngineConfig;
use tee_sheet::display::write_sheet_to_file;
use tee_sheet::parser::load_roster;
use tee_sheet::roster::StatusChanges;
use tee_sheet::store::{load_state, save_state};
use tee_sheet::{Engine, SharedEngine};

#[derive(Parser, Debug)]
#[command(name = "tee-sheet")]
#[command(about = "Allocate a weekly golf roster into groups and tee times")]
struct Args {
    /// Engine configuration (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// State file carrying the roster and published sheet between runs
    #[arg(short, long, default_value = "tee-sheet-state.json")]
    state: PathBuf,

    /// Random seed for the neutral-block shuffle (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Also write the sheet to this file
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current sheet, publishing a fresh one if none is locked
    Show {
        /// Extracted roster (CSV: name,guests,preference)
        #[arg(short, long)]
        roster: Option<PathBuf>,
    },
    /// Generate and lock a new sheet
    Publish {
        #[arg(short, long)]
        roster: Option<PathBuf>,
    },
    /// Discard the locked sheet and draw again
    Randomize {
        #[arg(short, long)]
        roster: Option<PathBuf>,
    },
    /// Print the playing list and reserves
    List {
        #[arg(short, long)]
        roster: Option<PathBuf>,
    },
    /// Start a new week
    Reset,
}

fn log_status_changes(changes: &StatusChanges) {
    if !changes.promoted.is_empty() {
        info!(promoted = ?changes.promoted, "Moved up from reserves");
    }
    if !changes.demoted.is_empty() {
        info!(demoted = ?changes.demoted, "Moved to reserves");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config = config.with_random_seed(seed);
    }

    let state = load_state(&args.state, &config)?;
    let (engine, changes) = Engine::resume(config, state);
    log_status_changes(&changes);
    let engine = SharedEngine::new(engine);

    let roster = match &args.command {
        Command::Show { roster }
        | Command::Publish { roster }
        | Command::Randomize { roster }
        | Command::List { roster } => roster.clone(),
        Command::Reset => None,
    };
    if let Some(path) = roster {
        let players = load_roster(&path)?;
        info!(players = players.len(), path = %path.display(), "Loaded roster");
        let outcome = engine
            .run(|engine| engine.refresh_from_extraction(players, &[]))
            .await?;
        log_status_changes(&outcome.changes);
        for warning in &outcome.warnings {
            warn!(%warning, "Placement warning");
        }
    }

    let output = match args.command {
        Command::Show { .. } => Some(engine.run(|engine| engine.show()).await?),
        Command::Publish { .. } => Some(engine.run(|engine| engine.publish()).await?),
        Command::Randomize { .. } => Some(engine.run(|engine| engine.randomize()).await?),
        Command::List { .. } => {
            println!("{}", engine.run(|engine| engine.participant_list()).await);
            None
        }
        Command::Reset => {
            engine.run(|engine| engine.weekly_reset()).await;
            println!("Weekly reset complete");
            None
        }
    };

    if let Some(sheet) = output {
        for warning in &sheet.warnings {
            warn!(%warning, "Placement warning");
        }
        println!("{}", sheet.rendered);
        if let Some(path) = &args.out {
            write_sheet_to_file(&sheet.rendered, path)?;
            info!(path = %path.display(), "Sheet written");
        }
    }

    save_state(&args.state, &engine.snapshot().await)?;
    Ok(())
}
