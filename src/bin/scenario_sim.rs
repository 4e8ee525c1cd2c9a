use clap::Parser;
use rasim_rs::engine::{Engine, TraceRecorder};
use rasim_rs::scenario::{self, ScenarioError, ScenarioSpec};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "scenario-sim",
    about = "Run scenario.json on the rasim-rs windowed simulation kernel"
)]
struct Args {
    /// Path to scenario.json
    #[arg(long)]
    scenario: PathBuf,

    /// Run until this tick (overrides `until` in the scenario)
    #[arg(long)]
    until: Option<i64>,

    /// Window length in ticks (overrides `window` in the scenario)
    #[arg(long)]
    window: Option<i64>,

    /// Worker threads (0 = one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Output trace JSON file (every event and response, in canonical order)
    #[arg(long)]
    trace_json: Option<PathBuf>,

    /// Also run a forked copy of the engine and check that both agree
    #[arg(long)]
    fork_check: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("scenario_sim: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ScenarioError> {
    let mut spec = ScenarioSpec::load(&args.scenario)?;
    if let Some(until) = args.until {
        spec.until = until;
    }
    if let Some(window) = args.window {
        spec.window = window;
    }
    if let Some(threads) = args.threads {
        spec.engine.get_or_insert_with(Default::default).threads = threads;
    }
    if spec.window <= 0 || spec.until <= 0 {
        return Err(ScenarioError::Invalid(
            "window and until must be positive".into(),
        ));
    }

    let recorder = TraceRecorder::new();
    let mut builder = spec.builder()?;
    if args.trace_json.is_some() {
        builder.add_observer(Box::new(recorder.clone()));
    }
    let mut engine = builder.build()?;
    let mut replica: Option<Engine> = if args.fork_check {
        Some(engine.fork()?)
    } else {
        None
    };

    println!(
        "scenario nodes={} window={} until={} digest={:016x}",
        spec.nodes.len(),
        spec.window,
        spec.until,
        engine.configuration_digest()
    );

    let mut windows = 0usize;
    for target in spec.window_targets() {
        engine.evaluate(target)?;
        if let Some(replica) = replica.as_mut() {
            replica.evaluate(target)?;
        }
        windows += 1;
    }

    let summaries = scenario::summarize(&spec, &engine);
    for summary in &summaries {
        println!("{}", summary.line());
    }
    println!("done clock={} windows={}", engine.clock(), windows);

    if let Some(replica) = replica {
        let forked = scenario::summarize(&spec, &replica);
        if forked != summaries {
            return Err(ScenarioError::Invalid(
                "forked engine diverged from the original".into(),
            ));
        }
        println!("fork_check ok");
    }

    if let Some(path) = args.trace_json {
        let json = recorder.to_json()?;
        fs::write(&path, json)?;
        eprintln!("wrote {} trace records to {}", recorder.len(), path.display());
    }
    Ok(())
}
