//! Axon Core - multi-agent active inference runtime
//!
//! The main entry point for ax-core, handling:
//! - Scheduler runs at a configured tick rate
//! - Stepwise advancement for scripted experiments
//! - Agent inspection and population save/load

use std::path::PathBuf;
use std::process::ExitCode as ProcessExit;

use clap::{Args, Parser, Subcommand};

use ax_common::{AgentId, Error, OutputFormat, Result};
use ax_config::{load_settings, validate_settings, Settings};
use ax_core::agent::{AgentSpec, Position};
use ax_core::exit_codes::ExitCode;
use ax_core::logging::{init_logging, LogConfig};
use ax_core::sched::Scheduler;
use ax_core::world::{GridWorld, InMemoryBus, JsonStore, PersistenceStore};
use ax_math::DetRng;
use ax_telemetry::{TraceWriter, WriterConfig};

/// Axon Core - active inference agents on a cooperative scheduler
#[derive(Parser)]
#[command(name = "ax-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the settings file (TOML)
    #[arg(long, global = true, env = "AXON_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding persisted agent state
    #[arg(long, global = true, default_value = "axon-state")]
    state_dir: PathBuf,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Override the master seed
    #[arg(long, global = true, env = "SEED")]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler loop
    Run {
        /// Stop after this many ticks (default: run until stopped)
        #[arg(long)]
        ticks: Option<u64>,
        /// Write a JSONL trace of the run
        #[arg(long)]
        trace_dir: Option<PathBuf>,
    },
    /// Advance the population by N ticks and print a summary
    Step {
        #[arg(long, short = 'n', default_value_t = 1)]
        n: u64,
    },
    /// Replay episodic memory through one batch parameter-learning pass
    Learn,
    /// Print one agent's state summary
    Inspect {
        /// Agent id (numeric)
        #[arg(long)]
        agent: u64,
    },
    /// Export the population to a directory
    Save {
        #[arg(long)]
        path: PathBuf,
    },
    /// Import a population from a directory
    Load {
        #[arg(long)]
        path: PathBuf,
    },
}

fn main() -> ProcessExit {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_env(cli.global.verbose));

    let code = match dispatch(&cli) {
        Ok(()) => ExitCode::Ok,
        Err(err) => {
            // One line per error: agent id (when known), kind, cause.
            eprintln!("error[{}] {}: {err}", err.code(), err.category());
            ExitCode::from(&err)
        }
    };
    ProcessExit::from(code.code() as u8)
}

fn dispatch(cli: &Cli) -> Result<()> {
    let settings = resolve_settings(&cli.global)?;
    match &cli.command {
        Commands::Run { ticks, trace_dir } => run(cli, settings, *ticks, trace_dir.as_deref()),
        Commands::Step { n } => step(cli, settings, *n),
        Commands::Learn => learn(cli, settings),
        Commands::Inspect { agent } => inspect(cli, AgentId(*agent)),
        Commands::Save { path } => export(cli, path),
        Commands::Load { path } => import(cli, settings, path),
    }
}

fn resolve_settings(global: &GlobalOpts) -> Result<Settings> {
    let (mut settings, source) =
        load_settings(global.config.as_deref()).map_err(|e| Error::Config(e.to_string()))?;
    if let Some(seed) = global.seed {
        settings.seed = seed;
    }
    if let Err(issues) = validate_settings(&settings) {
        let joined: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
        return Err(Error::Config(format!(
            "settings from {source} are invalid: {}",
            joined.join("; ")
        )));
    }
    tracing::info!(%source, seed = settings.seed, "settings resolved");
    Ok(settings)
}

/// Build the scheduler: world and bus from settings, population from
/// the state dir when it has agents, otherwise from the config.
fn build_scheduler(cli: &Cli, settings: Settings) -> Result<Scheduler> {
    let mut rng = DetRng::fork(settings.seed, 0x60d);
    let world = GridWorld::generate(&settings.world, &mut rng);
    let mut scheduler = Scheduler::new(
        settings,
        Box::new(world),
        Box::new(InMemoryBus::new()),
    );

    let store = JsonStore::open(&cli.global.state_dir)?;
    let restored = scheduler.load_all(&store)?;
    if restored == 0 {
        populate(&mut scheduler, &mut rng)?;
    } else {
        tracing::info!(restored, "population restored from state dir");
    }
    Ok(scheduler)
}

fn populate(scheduler: &mut Scheduler, rng: &mut DetRng) -> Result<usize> {
    let population = scheduler.settings().population.clone();
    let world = scheduler.settings().world.clone();
    let mut created = 0;
    for entry in &population {
        let model = match &entry.model_file {
            Some(path) => Some(ax_core::model::load_model_file(path)?.model),
            None => None,
        };
        for i in 0..entry.count {
            let position = Position::new(
                rng.below(world.width.max(1) as usize) as f64,
                rng.below(world.height.max(1) as usize) as f64,
                0.0,
            );
            scheduler.create(&AgentSpec {
                name: format!("{}-{}", entry.preset, i),
                preset: entry.preset.clone(),
                position,
                model: model.clone(),
            })?;
            created += 1;
        }
    }
    if created == 0 {
        // An empty population section still yields a runnable world.
        scheduler.create(&AgentSpec {
            name: "generic-0".into(),
            preset: "generic".into(),
            position: Position::new(0.0, 0.0, 0.0),
            model: None,
        })?;
        created = 1;
    }
    Ok(created)
}

fn run(
    cli: &Cli,
    settings: Settings,
    ticks: Option<u64>,
    trace_dir: Option<&std::path::Path>,
) -> Result<()> {
    let mut scheduler = build_scheduler(cli, settings)?;
    if let Some(dir) = trace_dir {
        // Old traces are pruned before a new one opens.
        let pruned = ax_telemetry::retention::enforce_default(dir)
            .map_err(|e| Error::Persistence(e.to_string()))?;
        if !pruned.is_empty() {
            tracing::info!(pruned = pruned.len(), "trace retention enforced");
        }
        let config = WriterConfig::new(dir.to_path_buf(), scheduler.run_id().to_string());
        let trace =
            TraceWriter::open(config).map_err(|e| Error::Persistence(e.to_string()))?;
        scheduler = scheduler.with_trace(trace);
    }

    let report = scheduler.run(ticks)?;

    let mut store = JsonStore::open(&cli.global.state_dir)?;
    scheduler.save_all(&mut store)?;
    print_payload(cli, &report, |r| {
        format!("run {} finished after {} ticks", r.run_id, r.ticks)
    })
}

fn step(cli: &Cli, settings: Settings, n: u64) -> Result<()> {
    let mut scheduler = build_scheduler(cli, settings)?;
    let mut last = None;
    for _ in 0..n {
        last = Some(scheduler.tick()?);
    }
    let mut store = JsonStore::open(&cli.global.state_dir)?;
    scheduler.save_all(&mut store)?;

    match last {
        Some(report) => print_payload(cli, &report, |r| {
            format!(
                "tick {}: {} agents, {} actions, {} errors",
                r.tick, r.agents_updated, r.actions_applied, r.errors
            )
        }),
        None => Ok(()),
    }
}

fn learn(cli: &Cli, settings: Settings) -> Result<()> {
    let mut scheduler = build_scheduler(cli, settings)?;
    let replayed = scheduler.batch_learn()?;
    let mut store = JsonStore::open(&cli.global.state_dir)?;
    scheduler.save_all(&mut store)?;
    print_payload(
        cli,
        &serde_json::json!({"experiences_replayed": replayed}),
        |_| format!("replayed {replayed} experiences"),
    )
}

fn inspect(cli: &Cli, id: AgentId) -> Result<()> {
    let store = JsonStore::open(&cli.global.state_dir)?;
    let snapshot = store.load_agent(id)?;
    // Summaries come from a live agent; rebuild one with defaults
    // compatible with the snapshot's own model.
    let settings = Settings::default();
    let agent = ax_core::agent::CognitiveAgent::restore(snapshot, &settings)?;
    print_payload(cli, &agent.summary(), |s| {
        format!(
            "{} [{}] status={} energy={:.1} entropy={:.3}",
            s.id, s.name, s.status, s.energy, s.belief_entropy
        )
    })
}

fn export(cli: &Cli, path: &std::path::Path) -> Result<()> {
    let source = JsonStore::open(&cli.global.state_dir)?;
    let mut target = JsonStore::open(path)?;
    let ids = source.list_agents()?;
    for &id in &ids {
        target.save_agent(&source.load_agent(id)?)?;
    }
    print_payload(cli, &serde_json::json!({"exported": ids.len()}), |_| {
        format!("exported {} agents", ids.len())
    })
}

fn import(cli: &Cli, settings: Settings, path: &std::path::Path) -> Result<()> {
    let source = JsonStore::open(path)?;
    let mut target = JsonStore::open(&cli.global.state_dir)?;
    let ids = source.list_agents()?;
    for &id in &ids {
        let snapshot = source.load_agent(id)?;
        // Validate against the current settings before accepting.
        ax_core::agent::CognitiveAgent::restore(snapshot.clone(), &settings)?;
        target.save_agent(&snapshot)?;
    }
    print_payload(cli, &serde_json::json!({"imported": ids.len()}), |_| {
        format!("imported {} agents", ids.len())
    })
}

fn print_payload<T: serde::Serialize>(
    cli: &Cli,
    payload: &T,
    text: impl Fn(&T) -> String,
) -> Result<()> {
    match cli.global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            println!("{}", serde_json::to_string_pretty(payload)?);
        }
        OutputFormat::Text | OutputFormat::Summary => {
            println!("{}", text(payload));
        }
    }
    Ok(())
}
