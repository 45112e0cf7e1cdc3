use anyhow::{Context, Result};
use chrono::Local;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use faceoff::audio::ConsoleAudio;
use faceoff::config::{ConfigStore, FileConfigStore};
use faceoff::drill::{DrillType, RangeKey};
use faceoff::history::{HistoryDb, HistoryStore, MemoryHistory};
use faceoff::logging;
use faceoff::runtime::{apply, DriverEvent, FixedTicker, Flow, Runner, StdinControlSource};
use faceoff::sequencer::{Sequencer, Timing};
use faceoff::session::Status;
use faceoff::settings::{DrillSettings, LiveSettings, Settings, SettingsStore, MAX_REPS};

const TICK_RATE_MS: u64 = 100;
const CUE_LENGTH_MS: u64 = 400;

/// audio-cued face-off drills for lacrosse practice
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Runs timed face-off drills with spoken-style cues and a whistle, randomizing the waits between commands so the athlete cannot anticipate them. Completed sessions are kept in a local practice history."
)]
struct Cli {
    /// settings file to use instead of the platform default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// practice history database to use instead of the platform default
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// more diagnostics on stderr (-v info, -vv debug, -vvv trace)
    #[clap(short = 'v', long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// run a practice session (default)
    Run(RunArgs),
    /// list the available drills
    Drills,
    /// inspect or edit drill timing
    Settings {
        #[clap(subcommand)]
        action: SettingsAction,
    },
    /// practice history summary
    Stats {
        /// number of recent sessions to list
        #[clap(long, default_value_t = 10)]
        recent: usize,

        /// delete every recorded session
        #[clap(long)]
        clear: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// drill to run; defaults to the selected drill in settings
    #[clap(short = 'd', long, value_parser = DrillType::from_str)]
    drill: Option<DrillType>,

    /// number of reps for this run only (1-50)
    #[clap(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=MAX_REPS as i64))]
    reps: Option<u32>,

    /// pause before the first cue, in milliseconds
    #[clap(long)]
    lead_in_ms: Option<u64>,

    /// do not record the session in the practice history
    #[clap(long)]
    no_history: bool,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// print the current settings
    Show {
        /// print raw JSON
        #[clap(long)]
        json: bool,
    },
    /// restore defaults for one drill, or for everything
    Reset {
        #[clap(value_parser = DrillType::from_str)]
        drill: Option<DrillType>,
    },
    /// make a drill the default for `run`
    Select {
        #[clap(value_parser = DrillType::from_str)]
        drill: DrillType,
    },
    /// set a delay range in seconds, e.g. `set-range down-set-whistle down 0.5 2`
    SetRange {
        #[clap(value_parser = DrillType::from_str)]
        drill: DrillType,
        #[clap(value_parser = RangeKey::from_str)]
        key: RangeKey,
        min: f64,
        max: f64,
    },
    /// set the number of reps for a drill
    SetReps {
        #[clap(value_parser = DrillType::from_str)]
        drill: DrillType,
        reps: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };

    match cli.command {
        None => run(&store, cli.db, RunArgs::default()),
        Some(Command::Run(args)) => run(&store, cli.db, args),
        Some(Command::Drills) => {
            list_drills(&store.load());
            Ok(())
        }
        Some(Command::Settings { action }) => edit_settings(&store, action),
        Some(Command::Stats { recent, clear }) => stats(cli.db, recent, clear),
    }
}

fn open_history(db: Option<PathBuf>) -> Result<HistoryDb> {
    let db = match db {
        Some(path) => HistoryDb::open(&path)
            .with_context(|| format!("opening history at {}", path.display()))?,
        None => HistoryDb::open_default().context("opening practice history")?,
    };
    Ok(db)
}

fn run(store: &FileConfigStore, db: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let mut settings = store.load();
    let drill = args.drill.unwrap_or(settings.selected_drill);
    if let Some(reps) = args.reps {
        settings
            .drills
            .entry(drill)
            .or_insert_with(|| DrillSettings::defaults_for(drill))
            .number_of_reps = reps;
    }
    let settings = Arc::new(LiveSettings::loaded(settings));

    let history: Arc<dyn HistoryStore> = if args.no_history {
        Arc::new(MemoryHistory::new())
    } else {
        match open_history(db) {
            Ok(db) => Arc::new(db),
            Err(err) => {
                warn!("{err:#}; this session will not be saved");
                Arc::new(MemoryHistory::new())
            }
        }
    };

    let mut timing = Timing::default();
    if let Some(ms) = args.lead_in_ms {
        timing.lead_in = Duration::from_millis(ms);
    }

    let sequencer = Sequencer::new(
        drill,
        Arc::new(ConsoleAudio::stdout(Duration::from_millis(CUE_LENGTH_MS))),
        settings.clone(),
        history,
        timing,
    );

    let reps = settings
        .drill_settings(drill)
        .map_or(0, |s| s.number_of_reps);
    println!("{} ({reps} reps): {}", drill.name(), drill.description());
    println!("commands: p pause, r resume, x reset, s restart, g start, q quit");

    let updates = sequencer.subscribe();
    sequencer.start()?;

    let mut runner = Runner::new(
        StdinControlSource::new(),
        updates,
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let mut last_line = String::new();
    loop {
        match runner.step() {
            DriverEvent::Update(view) => {
                let line = view.headline();
                if line != last_line {
                    println!("{line}");
                    last_line = line;
                }
                if view.status == Status::Complete {
                    break;
                }
            }
            DriverEvent::Control(control) => match apply(&sequencer, control) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(err) => eprintln!("{err}"),
            },
            DriverEvent::Tick => {
                // nobody left to send commands and nothing in flight
                if runner.controls_closed() && !sequencer.is_active() {
                    let line = sequencer.state().headline();
                    if line != last_line {
                        println!("{line}");
                    }
                    break;
                }
            }
        }
    }
    Ok(())
}

fn list_drills(settings: &Settings) {
    for drill in DrillType::ALL {
        let marker = if drill == settings.selected_drill { "*" } else { " " };
        println!("{marker} {:<18} {}", drill.to_string(), drill.description());
    }
}

fn edit_settings(store: &FileConfigStore, action: SettingsAction) -> Result<()> {
    let live = LiveSettings::loaded(store.load());

    match action {
        SettingsAction::Show { json } => {
            let settings = live.snapshot().unwrap_or_default();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                print_settings(&settings);
            }
            return Ok(());
        }
        SettingsAction::Reset { drill: Some(drill) } => live.reset_drill_to_defaults(drill)?,
        SettingsAction::Reset { drill: None } => live.reset_all()?,
        SettingsAction::Select { drill } => live.select_drill(drill)?,
        SettingsAction::SetRange {
            drill,
            key,
            min,
            max,
        } => live.update_range(drill, key, min, max)?,
        SettingsAction::SetReps { drill, reps } => live.set_reps(drill, reps)?,
    }

    let settings = live.snapshot().unwrap_or_default();
    store
        .save(&settings)
        .with_context(|| format!("writing {}", store.path().display()))?;
    print_settings(&settings);
    Ok(())
}

fn print_settings(settings: &Settings) {
    for drill in DrillType::ALL {
        let marker = if drill == settings.selected_drill { "*" } else { " " };
        let drill_settings = settings.drill(drill);
        println!(
            "{marker} {} ({}): {} reps",
            drill.name(),
            drill,
            drill_settings.number_of_reps
        );
        for key in drill.range_keys() {
            if let Some(range) = drill_settings.range(key) {
                println!("    {:<14} {:.1}s - {:.1}s", key.to_string(), range.min, range.max);
            }
        }
    }
}

fn stats(db: Option<PathBuf>, recent: usize, clear: bool) -> Result<()> {
    let db = open_history(db)?;
    if clear {
        db.clear_all()?;
        println!("practice history cleared");
        return Ok(());
    }
    let stats = db.statistics(Local::now().date_naive())?;

    println!("sessions:        {}", stats.total_sessions);
    println!("reps:            {}", stats.total_reps);
    println!("practice time:   {}", format_duration(stats.total_duration_secs));
    println!("days practiced:  {}", stats.total_days);
    println!("current streak:  {} days", stats.current_streak);

    let sessions = db.recent_sessions(recent)?;
    if !sessions.is_empty() {
        println!();
        for entry in sessions {
            println!(
                "{}  {:<18} {:>3} reps  {}",
                entry.timestamp.format("%Y-%m-%d %H:%M"),
                entry.drill.to_string(),
                entry.reps,
                format_duration(entry.duration_secs)
            );
        }
    }
    Ok(())
}

fn format_duration(secs: u64) -> String {
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, _) => format!("{h}h {m}m"),
    }
}
