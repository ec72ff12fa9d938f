//! Baseline evaluation CLI for the Hironaka game
//!
//! Plays the baseline host/agent pairings over random batches and reports
//! the host-strength metric rho for each, then collects one exploratory
//! rollout into a replay buffer.

use std::path::PathBuf;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use hironaka_rl_env::{
    collect_rollout, evaluate_rho, random_points, AgentPolicy, AllCoordHostPolicy,
    ChooseFirstAgentPolicy, CyclingAgentPolicy, FusedStep, GameConfig, HostPolicy,
    RandomAgentPolicy, RandomHostPolicy, ReplayBuffer, Role,
};

/// Baseline evaluation for the Hironaka host/agent game
#[derive(Parser, Debug)]
#[command(name = "hironaka")]
#[command(about = "Evaluate baseline host/agent pairings", long_about = None)]
struct Args {
    /// Coordinate dimension
    #[arg(long, default_value_t = 3)]
    dimension: usize,

    /// Point-slot capacity per game
    #[arg(long, default_value_t = 20)]
    max_points: usize,

    /// Simultaneous games per batch
    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    /// Maximum initial coordinate value
    #[arg(long, default_value_t = 50)]
    max_value: u32,

    /// Evaluation horizon (host moves per batch)
    #[arg(long, default_value_t = 100)]
    max_steps: usize,

    /// Exploration rate for the rollout phase
    #[arg(long, default_value_t = 0.2)]
    exploration_rate: f32,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// YAML config file; replaces the game options above
    #[arg(long)]
    config: Option<PathBuf>,
}

fn game_config(args: &Args) -> Result<GameConfig, Box<dyn std::error::Error>> {
    match &args.config {
        Some(path) => Ok(GameConfig::from_yaml_file(path)?),
        None => {
            let config = GameConfig {
                dimension: args.dimension,
                max_num_points: args.max_points,
                padding_value: -1.0,
                value_threshold: Some(1e8),
                masked: true,
                scale_observation: true,
                exploration_rate: args.exploration_rate,
            };
            config.validate()?;
            Ok(config)
        }
    }
}

fn run_pairing<H: HostPolicy, A: AgentPolicy>(
    label: (&str, &str),
    engine: &FusedStep<H, A>,
    config: &GameConfig,
    args: &Args,
    rng: &mut StdRng,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut points = random_points(config, args.batch_size, args.max_value, rng)?;
    let rho = evaluate_rho(
        engine,
        &mut points,
        args.max_steps,
        &config.step_options(),
        rng,
    )?;
    println!("{:<14} {:<14} {:>8.4}", label.0, label.1, rho);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = game_config(&args)?;
    let d = config.dimension;
    let mut rng = StdRng::seed_from_u64(args.seed);

    eprintln!("Hironaka baseline evaluation:");
    eprintln!("  dimension: {}", config.dimension);
    eprintln!("  max points: {}", config.max_num_points);
    eprintln!("  batch size: {}", args.batch_size);
    eprintln!("  horizon: {} host moves", args.max_steps);

    println!("{:<14} {:<14} {:>8}", "host", "agent", "rho");
    run_pairing(
        ("random", "random"),
        &FusedStep::new(d, RandomHostPolicy::new(args.seed), RandomAgentPolicy::new(args.seed + 1)),
        &config,
        &args,
        &mut rng,
    )?;
    run_pairing(
        ("random", "choose-first"),
        &FusedStep::new(d, RandomHostPolicy::new(args.seed + 2), ChooseFirstAgentPolicy),
        &config,
        &args,
        &mut rng,
    )?;
    run_pairing(
        ("all-coord", "random"),
        &FusedStep::new(d, AllCoordHostPolicy, RandomAgentPolicy::new(args.seed + 3)),
        &config,
        &args,
        &mut rng,
    )?;
    run_pairing(
        ("all-coord", "choose-first"),
        &FusedStep::new(d, AllCoordHostPolicy, ChooseFirstAgentPolicy),
        &config,
        &args,
        &mut rng,
    )?;
    run_pairing(
        ("all-coord", "cycling"),
        &FusedStep::new(d, AllCoordHostPolicy, CyclingAgentPolicy::new()),
        &config,
        &args,
        &mut rng,
    )?;

    // One exploratory rollout per side, the way a training loop would feed
    // its buffers.
    let engine = FusedStep::new(
        d,
        RandomHostPolicy::new(args.seed + 10),
        RandomAgentPolicy::new(args.seed + 11),
    );
    let mut buffer = ReplayBuffer::new(100_000);
    for role in [Role::Host, Role::Agent] {
        let mut points = random_points(&config, args.batch_size, args.max_value, &mut rng)?;
        let steps = collect_rollout(
            &engine,
            &mut points,
            role,
            args.max_steps,
            &config.step_options(),
            &mut buffer,
            &mut rng,
        )?;
        eprintln!(
            "{role} rollout: {steps} steps, {} transitions in buffer",
            buffer.len()
        );
    }

    Ok(())
}
