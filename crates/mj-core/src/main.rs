//! mjc: Markov jump and reward statistics from the command line.
//!
//! Reads a JSON model file, prints one JSON document on stdout. Logs and
//! error reports go to stderr; the process exit code follows
//! [`mj_core::exit_codes::ExitCode`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use mj_config::{load_config, Config, ModelSpec};
use mj_core::error::check_time;
use mj_core::exit_codes::ExitCode;
use mj_core::jumps::{fill_registration_matrix, fill_reward_register, fill_single_transition, make_rate_register};
use mj_core::logging::{init_logging, targets, LogConfig, LogFormat, LogLevel};
use mj_core::reward::Times;
use mj_core::{
    MarkovJumpsCore, Result, SericolaSeriesMarkovReward,
    TwoStateOccupancyMarkovReward, UniformizedSimulator,
};
use mj_math::{
    uniformized_exponential, validate_generator, DefaultEigenSystem, EigenError, EigenSystem,
    TruncationRule,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Markov jump counts, reward distributions and conditioned path simulation
#[derive(Parser)]
#[command(name = "mjc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Engine configuration file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transition probabilities P(t) = exp(Qt)
    Cprob(ModelTimeArgs),

    /// Joint density of accumulated reward and end state
    Pdf(RewardArgs),

    /// Joint distribution of accumulated reward and end state
    Cdf(RewardArgs),

    /// Expected labeled transition counts or accumulated reward
    Jumps(JumpsArgs),

    /// Two-state occupancy density of state 1, from 0 to 0
    Occupancy(RewardArgs),

    /// Simulate sample paths
    Simulate(SimulateArgs),
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct ModelTimeArgs {
    /// Model file (JSON)
    #[arg(long, short = 'm')]
    model: PathBuf,

    /// Branch length
    #[arg(long, short = 't')]
    time: f64,
}

#[derive(Args, Debug)]
struct RewardArgs {
    #[command(flatten)]
    base: ModelTimeArgs,

    /// Accumulated reward values to evaluate
    #[arg(long, short = 'x', value_delimiter = ',', required = true)]
    reward: Vec<f64>,

    /// Truncate each query at its own Poisson depth
    #[arg(long)]
    parsimonious: bool,
}

#[derive(Args, Debug)]
struct JumpsArgs {
    #[command(flatten)]
    base: ModelTimeArgs,

    /// Count only FROM:TO transitions (repeatable); default counts all jumps
    #[arg(long = "transition", value_parser = parse_transition)]
    transitions: Vec<(usize, usize)>,

    /// Expected accumulated reward instead of jump counts
    #[arg(long, conflicts_with = "transitions")]
    rewards: bool,

    /// Report E[N · 1{X(t) = j}] instead of conditioning on the end state
    #[arg(long)]
    joint: bool,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Model file (JSON)
    #[arg(long, short = 'm')]
    model: PathBuf,

    /// Branch length
    #[arg(long, short = 't')]
    time: f64,

    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Condition on this ending state; unconditioned when absent
    #[arg(long)]
    end: Option<usize>,

    /// Number of paths
    #[arg(long, short = 'n', default_value_t = 1)]
    count: usize,

    /// RNG seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Site index used in the annotation strings
    #[arg(long, default_value_t = 0)]
    site: usize,
}

fn parse_transition(s: &str) -> std::result::Result<(usize, usize), String> {
    let (from, to) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FROM:TO, got '{s}'"))?;
    let from = from.trim().parse().map_err(|e| format!("bad FROM in '{s}': {e}"))?;
    let to = to.trim().parse().map_err(|e| format!("bad TO in '{s}': {e}"))?;
    Ok((from, to))
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Ok
            };
            std::process::exit(code.as_i32());
        }
    };

    let mut log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    if cli.global.quiet {
        log_config.level = LogLevel::Error;
    } else if cli.global.log_level.is_none() {
        log_config.level = log_config.level.raised_by(cli.global.verbose);
    }
    init_logging(&log_config);

    let exit_code = match run(&cli) {
        Ok(payload) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).unwrap_or_default()
            );
            ExitCode::Ok
        }
        Err(err) => {
            let code = ExitCode::from(&err);
            eprintln!("{}", json!({ "error": err.to_json(), "exit_code": code.as_i32() }));
            code
        }
    };
    std::process::exit(exit_code.as_i32());
}

fn run(cli: &Cli) -> Result<Value> {
    let (config, source) = load_config(cli.global.config.as_deref())?;
    debug!(target: targets::CLI, %source, "configuration resolved");

    match &cli.command {
        Commands::Cprob(args) => run_cprob(&config, args),
        Commands::Pdf(args) => run_reward(&config, args, RewardQuery::Pdf),
        Commands::Cdf(args) => run_reward(&config, args, RewardQuery::Cdf),
        Commands::Jumps(args) => run_jumps(&config, args),
        Commands::Occupancy(args) => run_occupancy(&config, args),
        Commands::Simulate(args) => run_simulate(&config, args),
    }
}

// ============================================================================
// Command implementations
// ============================================================================

struct LoadedModel {
    spec: ModelSpec,
    q: Vec<f64>,
    dim: usize,
}

fn load_model(path: &std::path::Path, config: &Config) -> Result<LoadedModel> {
    let spec = ModelSpec::from_file(path)?;
    let q = spec.flat_generator();
    let dim = spec.dim();
    validate_generator(&q, dim, config.engine.generator_tolerance)?;
    info!(target: targets::CLI, dim, path = %path.display(), "model loaded");
    Ok(LoadedModel { spec, q, dim })
}

fn rows(flat: &[f64], dim: usize) -> Vec<Vec<f64>> {
    flat.chunks(dim).map(<[f64]>::to_vec).collect()
}

fn labels(model: &LoadedModel) -> Vec<String> {
    (0..model.dim).map(|i| model.spec.label(i)).collect()
}

fn transition_matrix(model: &LoadedModel, config: &Config, time: f64) -> Result<Vec<f64>> {
    match DefaultEigenSystem::default().decompose(&model.q, model.dim) {
        Ok(eigen) => Ok(eigen.exponential(time)),
        Err(EigenError::ComplexSpectrum { .. }) => {
            debug!(target: targets::CLI, "complex spectrum; using uniformization");
            let mut p = vec![0.0; model.dim * model.dim];
            let rule = TruncationRule::new(config.engine.epsilon);
            uniformized_exponential(&model.q, model.dim, time, &rule, &mut p)?;
            Ok(p)
        }
        Err(e) => Err(e.into()),
    }
}

fn run_cprob(config: &Config, args: &ModelTimeArgs) -> Result<Value> {
    check_time(args.time)?;
    let model = load_model(&args.model, config)?;
    let p = transition_matrix(&model, config, args.time)?;
    Ok(json!({
        "time": args.time,
        "labels": labels(&model),
        "probabilities": rows(&p, model.dim),
    }))
}

#[derive(Debug, Clone, Copy)]
enum RewardQuery {
    Pdf,
    Cdf,
}

fn run_reward(config: &Config, args: &RewardArgs, query: RewardQuery) -> Result<Value> {
    let model = load_model(&args.base.model, config)?;
    let rates = model.spec.require_rewards()?;
    let mut engine =
        SericolaSeriesMarkovReward::with_config(&model.q, rates, model.dim, &config.engine)?;
    let time = args.base.time;

    let (name, values) = match query {
        RewardQuery::Pdf => (
            "density",
            engine.compute_pdf_batch(&args.reward, Times::Shared(time), args.parsimonious)?,
        ),
        RewardQuery::Cdf => ("distribution", engine.compute_cdf_batch(&args.reward, time)?),
    };
    debug!(target: targets::CLI, engine = %engine, "reward query done");

    let block = model.dim * model.dim;
    let results: Vec<Value> = args
        .reward
        .iter()
        .zip(values.chunks(block))
        .map(|(x, m)| {
            let mut entry = serde_json::Map::new();
            entry.insert("reward".into(), json!(x));
            entry.insert(name.into(), json!(rows(m, model.dim)));
            Value::Object(entry)
        })
        .collect();
    Ok(json!({
        "time": time,
        "labels": labels(&model),
        "rates": rates,
        "results": results,
    }))
}

fn run_jumps(config: &Config, args: &JumpsArgs) -> Result<Value> {
    check_time(args.base.time)?;
    let model = load_model(&args.base.model, config)?;
    let dim = model.dim;

    let mut register = vec![0.0; dim * dim];
    let mut rate_register = vec![0.0; dim * dim];
    if args.rewards {
        fill_reward_register(&mut rate_register, dim, model.spec.require_rewards()?)?;
    } else {
        if args.transitions.is_empty() {
            fill_registration_matrix(&mut register, dim);
        } else {
            for &(from, to) in &args.transitions {
                fill_single_transition(&mut register, dim, from, to)?;
            }
        }
        make_rate_register(&model.q, &register, &mut rate_register)?;
    }

    let eigen = DefaultEigenSystem::default().decompose(&model.q, dim)?;
    let mut core = MarkovJumpsCore::new(dim)?;
    let mut out = vec![0.0; dim * dim];
    if args.joint {
        core.compute_joint_stat_markov_jumps(&eigen, &rate_register, args.base.time, &mut out)?;
    } else {
        let p = eigen.exponential(args.base.time);
        core.compute_cond_stat_markov_jumps(&eigen, &rate_register, &p, args.base.time, &mut out)?;
    }

    Ok(json!({
        "time": args.base.time,
        "labels": labels(&model),
        "statistic": if args.rewards { "reward" } else { "jumps" },
        "conditional": !args.joint,
        "expectations": rows(&out, dim),
    }))
}

fn run_occupancy(config: &Config, args: &RewardArgs) -> Result<Value> {
    check_time(args.base.time)?;
    let model = load_model(&args.base.model, config)?;
    let engine = TwoStateOccupancyMarkovReward::with_config(&model.q, &config.two_state)?;
    let densities = args
        .reward
        .iter()
        .map(|&x| engine.occupancy_density(x, args.base.time))
        .collect::<Result<Vec<f64>>>()?;
    let p = engine.transition_probabilities(args.base.time);
    Ok(json!({
        "time": args.base.time,
        "rewards": args.reward,
        "density": densities,
        "atom_at_zero": (-engine.rates().0 * args.base.time).exp(),
        "probability": p[0],
    }))
}

fn run_simulate(config: &Config, args: &SimulateArgs) -> Result<Value> {
    let model = load_model(&args.model, config)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut paths = Vec::with_capacity(args.count);

    match args.end {
        Some(end) => {
            let mut simulator =
                UniformizedSimulator::with_config(&model.q, model.dim, &config.simulation)?;
            for _ in 0..args.count {
                let history = simulator.simulate(0.0, args.start, args.time, end, &mut rng)?;
                paths.push(path_json(&history, args.site)?);
            }
        }
        None => {
            for _ in 0..args.count {
                let history = mj_core::uniformization::simulate_unconditional_on_ending_state(
                    0.0, args.start, args.time, &model.q, model.dim, &mut rng,
                )?;
                paths.push(path_json(&history, args.site)?);
            }
        }
    }

    Ok(json!({
        "time": args.time,
        "labels": labels(&model),
        "seed": args.seed,
        "conditioned_on": args.end,
        "paths": paths,
    }))
}

fn path_json(history: &mj_core::StateHistory, site: usize) -> Result<Value> {
    Ok(json!({
        "history": serde_json::to_value(history)?,
        "jumps": history.number_of_jumps()?,
        "annotation": history.annotation(site)?,
    }))
}
