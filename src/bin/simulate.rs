use clap::{Parser, ValueEnum};
use rescue_sim::batch::{run_batch, BatchAggregator};
use rescue_sim::config::SimConfig;
use rescue_sim::constants::{DEFAULT_RUNS, DEFAULT_SEED};
use rescue_sim::engine::Simulation;
use rescue_sim::error::{SimError, SimResult};
use rescue_sim::metrics::RunMetrics;
use rescue_sim::types::{StepReport, VictimState};
use rescue_sim::world::WorldGrid;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Single,
    Batch,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, value_enum)]
    mode: Mode,
    /// Step budget per run; overrides the config file.
    #[arg(long)]
    steps: Option<u32>,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    #[arg(long, default_value_t = DEFAULT_RUNS)]
    runs: usize,
    #[arg(long, default_value = "out")]
    out: PathBuf,
    /// JSON file with `SimConfig` fields; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    verbose: bool,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    step: u32,
    message: String,
}

#[derive(Clone, Debug)]
struct SingleRunOutcome {
    metrics: RunMetrics,
    anomalies: Vec<String>,
    anomaly_records: Vec<AnomalyRecord>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "configuration rejected");
            std::process::exit(2);
        }
    };

    let result = match cli.mode {
        Mode::Single => run_single(&config, cli.seed, &cli.out).map(|outcome| {
            info!(
                seed = outcome.metrics.seed,
                rescue_rate = outcome.metrics.rescue_rate,
                "single run outputs written"
            );
            for record in &outcome.anomaly_records {
                warn!(step = record.step, message = %record.message, "anomaly detected");
            }
            !outcome.anomalies.is_empty()
        }),
        Mode::Batch => run_batch_mode(&config, cli.seed, cli.runs, &cli.out).map(|_| false),
    };

    match result {
        Ok(false) => {}
        Ok(true) => std::process::exit(1),
        Err(error @ SimError::InvalidConfiguration(_)) => {
            error!(%error, "configuration rejected");
            std::process::exit(2);
        }
        Err(error) if error.is_invariant_violation() => {
            error!(%error, "simulation aborted on invariant violation");
            std::process::exit(1);
        }
        Err(error) => {
            error!(%error, "simulation failed");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(cli: &Cli) -> SimResult<SimConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => SimConfig::load(path).map_err(|error| {
            SimError::invalid_config(format!("cannot read {}: {error}", path.display()))
        })?,
        None => SimConfig::default(),
    };
    if let Some(steps) = cli.steps {
        config.max_steps = steps;
    }
    config.validate()?;
    Ok(config)
}

fn run_single(config: &SimConfig, seed: u64, out: &Path) -> SimResult<SingleRunOutcome> {
    fs::create_dir_all(out)?;
    let mut sim = Simulation::new(config.clone(), seed)?;
    fs::write(out.join("map_initial.txt"), sim.render_ascii())?;

    let mut trace = BufWriter::new(File::create(out.join("trace.jsonl"))?);
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut previous_rescued = 0usize;

    let metrics = loop {
        let report = sim.step()?;
        writeln!(trace, "{}", serde_json::to_string(&report)?)?;

        let rescued = count_state(&report, VictimState::Rescued);
        for message in collect_step_anomalies(&report, sim.grid(), previous_rescued) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                report.step,
                message,
            );
        }
        previous_rescued = rescued;

        if let Some(metrics) = sim.metrics() {
            info!(
                step = report.step,
                reason = metrics.termination_reason.key(),
                rescued = metrics.rescued,
                lost = metrics.lost,
                "single run finished"
            );
            break metrics;
        }
    };
    trace.flush()?;

    write_json(&out.join("step_metrics.json"), sim.step_metrics())?;
    write_json(&out.join("metrics.json"), &metrics)?;
    fs::write(out.join("map_final.txt"), sim.render_ascii())?;
    println!("{}", serde_json::to_string(&metrics)?);

    Ok(SingleRunOutcome {
        metrics,
        anomalies,
        anomaly_records,
    })
}

fn run_batch_mode(config: &SimConfig, seed: u64, runs: usize, out: &Path) -> SimResult<()> {
    fs::create_dir_all(out)?;
    let cancel = AtomicBool::new(false);
    let results = run_batch(config, seed, runs, &cancel)?;

    let mut aggregator = BatchAggregator::new();
    let mut lines = BufWriter::new(File::create(out.join("batch_results.jsonl"))?);
    for metrics in results {
        writeln!(lines, "{}", serde_json::to_string(&metrics)?)?;
        aggregator.add(metrics);
    }
    lines.flush()?;

    let summary = aggregator.summary();
    summary.write(&out.join("batch_summary.json"))?;
    info!(
        runs = summary.runs,
        rescued_mean = summary.rescued.mean,
        rescue_rate_mean = summary.rescue_rate.mean,
        reasons = ?summary.termination_reasons,
        "batch summary written"
    );
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn count_state(report: &StepReport, state: VictimState) -> usize {
    report
        .victims
        .iter()
        .filter(|victim| victim.state == state)
        .count()
}

fn collect_step_anomalies(
    report: &StepReport,
    grid: &WorldGrid,
    previous_rescued: usize,
) -> Vec<String> {
    let mut anomalies = Vec::new();
    for agent in &report.agents {
        if !grid.is_passable(agent.cell) {
            anomalies.push(format!("agent on blocked cell: {} at {}", agent.id, agent.cell));
        }
    }

    let mut holders: BTreeMap<_, _> = BTreeMap::new();
    for victim in &report.victims {
        if !grid.is_passable(victim.cell) {
            anomalies.push(format!("victim on blocked cell: {} at {}", victim.id, victim.cell));
        }
        if let Some(agent) = victim.assigned_agent {
            if let Some(other) = holders.insert(agent, victim.id) {
                anomalies.push(format!("agent {agent} holds both {other} and {}", victim.id));
            }
            if victim.state.is_terminal() {
                anomalies.push(format!("terminal victim still assigned: {}", victim.id));
            }
        }
    }

    let rescued = count_state(report, VictimState::Rescued);
    if rescued < previous_rescued {
        anomalies.push(format!(
            "rescued count decreased: {previous_rescued} -> {rescued}"
        ));
    }
    anomalies
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    step: u32,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        step,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> SimResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text)?;
    Ok(())
}
