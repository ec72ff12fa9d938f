//! Trace a single Hironaka game move by move.
//!
//! Plays one random game with the random host against the masked greedy
//! random agent and prints the live points after every move.

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use hironaka_engine::PointSet;
use hironaka_rl_env::{
    random_points, FusedStep, GameConfig, RandomAgentPolicy, RandomHostPolicy, StepOptions,
};

/// Single-game trace
#[derive(Parser, Debug)]
#[command(name = "trace")]
#[command(about = "Print a Hironaka game move by move", long_about = None)]
struct Args {
    /// Coordinate dimension
    #[arg(long, default_value_t = 3)]
    dimension: usize,

    /// Point-slot capacity
    #[arg(long, default_value_t = 10)]
    max_points: usize,

    /// Maximum initial coordinate value
    #[arg(long, default_value_t = 10)]
    max_value: u32,

    /// Move limit
    #[arg(long, default_value_t = 50)]
    max_steps: usize,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn print_points(points: &hironaka_engine::PointsBatch) {
    let live = points.effective_counts()[0];
    for p in 0..live {
        let coords: Vec<String> = (0..points.dimension())
            .map(|k| format!("{:.3}", points.points()[[0, p, k]]))
            .collect();
        println!("    ({})", coords.join(", "));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = GameConfig {
        dimension: args.dimension,
        max_num_points: args.max_points,
        padding_value: -1.0,
        value_threshold: Some(1e8),
        masked: true,
        scale_observation: true,
        exploration_rate: 0.0,
    };
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut points = random_points(&config, 1, args.max_value, &mut rng)?;
    let engine = FusedStep::new(
        config.dimension,
        RandomHostPolicy::new(args.seed + 1),
        RandomAgentPolicy::new(args.seed + 2),
    );
    let options = StepOptions {
        exploration_rate: 0.0,
        ..config.step_options()
    };

    println!("initial position ({} points):", points.effective_counts()[0]);
    print_points(&points);

    for step in 1..=args.max_steps {
        if points.all_ended() {
            println!("game over after {} moves", step - 1);
            return Ok(());
        }
        if points.exceeds_threshold() {
            println!("coordinates diverged after {} moves", step - 1);
            return Ok(());
        }

        let (coords, _) = engine.host_move(&points, 0.0, &mut rng)?;
        let subset: Vec<usize> = (0..config.dimension)
            .filter(|&k| coords[[0, k]] != 0.0)
            .collect();
        let axes = engine.agent_move(&mut points, &coords, &options, &mut rng)?;

        println!(
            "move {step}: host picks {subset:?}, agent picks axis {} -> {} points",
            axes[0],
            points.effective_counts()[0]
        );
        print_points(&points);
    }

    println!("move limit reached with the game still live");
    Ok(())
}
