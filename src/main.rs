//! twinmon - smart-home replay monitor
//!
//! Replays normalized sensor logs through the digital-twin house model and the
//! configured runtime verifiers, printing one verdict per monitor per event.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use twinmon_core::{ChainDefinition, ChainDefinitionRaw, GuardExpr, SensorEvent};
use twinmon_replay::render::{render_json, render_table};
use twinmon_replay::{
    Config, EventReader, LineSink, MonitorConfig, Replay, ReplayError, StateFormat,
};

#[derive(Parser)]
#[command(name = "twinmon")]
#[command(about = "Replay smart-home sensor logs through runtime verifiers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event log
    Replay {
        /// YAML configuration file
        #[arg(short, long, env = "TWINMON_CONFIG")]
        config: Option<PathBuf>,

        /// Event log (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Verdict output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the final house snapshot
        #[arg(long)]
        show_state: bool,

        /// Print the snapshot as JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration and list its monitors
    Check {
        /// YAML configuration file
        config: PathBuf,
    },

    /// Evaluate a guard expression against one event
    Guard {
        /// Guard expression over `event.*` fields
        expr: String,

        /// Event JSON
        event: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            config,
            input,
            output,
            show_state,
            json,
        } => replay(config, input, output, show_state, json),
        Commands::Check { config } => check(config),
        Commands::Guard { expr, event } => guard(&expr, &event),
    };

    if let Err(e) = result {
        eprintln!("{} [{}]: {}", "Error".red().bold(), e.error_code(), e);
        std::process::exit(1);
    }
}

fn replay(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    show_state: bool,
    json: bool,
) -> Result<(), ReplayError> {
    let mut config = Config::load(config_path.as_deref())?;
    if input.is_some() {
        config.replay.input = input;
    }
    if output.is_some() {
        config.replay.output = output;
    }
    if show_state {
        config.replay.show_state = true;
    }
    if json {
        config.replay.state_format = StateFormat::Json;
    }
    config.validate()?;

    let mut replay = Replay::from_config(&config.monitors)?;
    if config.monitors.is_empty() {
        tracing::warn!("no monitors configured, only folding house state");
    }

    let reader: Box<dyn BufRead> = match &config.replay.input {
        Some(path) => {
            tracing::info!("Reading events from {}", path.display());
            let file = File::open(path).map_err(|source| ReplayError::Open {
                path: path.clone(),
                source,
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    let writer: Box<dyn Write> = match &config.replay.output {
        Some(path) => {
            let file = File::create(path).map_err(|source| ReplayError::Open {
                path: path.clone(),
                source,
            })?;
            Box::new(file)
        }
        None => Box::new(io::stdout().lock()),
    };

    let mut events = EventReader::new(reader, config.replay.timestamp_sentinel);
    let mut sink = LineSink::new(BufWriter::new(writer));
    let stats = replay.run(&mut events, &mut sink)?.clone();
    drop(sink);

    let source = events.stats();
    tracing::info!(
        events = stats.events,
        skipped = source.skipped,
        sentinel_timestamps = source.sentinel_timestamps,
        out_of_order = stats.regressions,
        "Replay finished"
    );
    for (name, violations) in &stats.violations {
        tracing::info!(monitor = %name, violations, "Monitor summary");
    }

    if config.replay.show_state {
        let rendered = match config.replay.state_format {
            StateFormat::Table => render_table(replay.house(), true),
            StateFormat::Json => render_json(replay.house())? + "\n",
        };
        let mut stdout = io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        stdout.flush()?;
    }

    Ok(())
}

fn check(path: PathBuf) -> Result<(), ReplayError> {
    let config = Config::from_file(&path)?;
    config.validate()?;

    if config.monitors.is_empty() {
        println!("{}", "No monitors configured".yellow());
        return Ok(());
    }

    for monitor in &config.monitors {
        match monitor {
            MonitorConfig::Chain { name, steps, meta } => {
                let raw = ChainDefinitionRaw {
                    steps: steps.clone(),
                    meta: meta.clone(),
                };
                let definition = ChainDefinition::from_raw(name, raw)?;
                println!(
                    "{} chain {} ({} steps, checksum: {})",
                    "OK".green(),
                    name.cyan(),
                    definition.len(),
                    definition.checksum
                );
            }
            MonitorConfig::Invariant { name, guard } => {
                GuardExpr::parse_rooted(guard, "house")?;
                println!("{} invariant {}: {}", "OK".green(), name.cyan(), guard);
            }
        }
    }

    // Full compilation, as a replay would do it.
    Replay::from_config(&config.monitors)?;
    Ok(())
}

fn guard(expr: &str, event_json: &str) -> Result<(), ReplayError> {
    let guard = GuardExpr::parse_rooted(expr, "event")?;
    let event: SensorEvent = serde_json::from_str(event_json)?;

    if guard.evaluate(&event) {
        println!("{}", "true".green());
    } else {
        println!("{}", "false".red());
    }
    Ok(())
}
