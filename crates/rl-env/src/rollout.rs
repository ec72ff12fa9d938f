//! Rollout collection and host-strength evaluation.

use hironaka_engine::{random_batch, PointSet, PointsBatch};
use rand::Rng;

use crate::config::GameConfig;
use crate::fused_step::FusedStep;
use crate::policy::{AgentPolicy, HostPolicy};
use crate::replay_buffer::ReplayBuffer;
use crate::types::{Role, StepError, StepOptions};

/// Fresh training batch per the configuration: uniform integer coordinates
/// in `[0, max_value]`, reduced, and rescaled when scaled observations are
/// configured.
pub fn random_points(
    config: &GameConfig,
    batch_size: usize,
    max_value: u32,
    rng: &mut impl Rng,
) -> Result<PointsBatch, StepError> {
    let mut points = random_batch(
        batch_size,
        config.max_num_points,
        config.dimension,
        max_value,
        &config.points_options(),
        rng,
    )?;
    points.reduce();
    if config.scale_observation {
        points.rescale();
    }
    Ok(points)
}

/// Roll a batch forward, feeding `sample_for` experience into the buffer.
///
/// Stops after `max_steps`, when every game has ended, or when the batch
/// exceeds its divergence ceiling. Returns the number of steps taken.
pub fn collect_rollout<H: HostPolicy, A: AgentPolicy>(
    engine: &FusedStep<H, A>,
    points: &mut PointsBatch,
    sample_for: Role,
    max_steps: usize,
    options: &StepOptions,
    buffer: &mut ReplayBuffer,
    rng: &mut impl Rng,
) -> Result<usize, StepError> {
    let mut steps = 0;
    while steps < max_steps && !points.all_ended() && !points.exceeds_threshold() {
        let experience = engine.step(points, sample_for, options, rng)?;
        buffer.add_experience(&experience);
        steps += 1;
    }
    Ok(steps)
}

/// Host strength under greedy play: (games live on entry) / (host moves
/// spent).
///
/// A game ending at step i (1-based) contributes i moves; a game still alive
/// after `max_steps` contributes the full `max_steps`. Elements already
/// ended on entry are excluded from both sides. 1.0 means every game ended
/// in one move; the floor of 1 / max_steps means no game ended at all.
pub fn evaluate_rho<H: HostPolicy, A: AgentPolicy>(
    engine: &FusedStep<H, A>,
    points: &mut PointsBatch,
    max_steps: usize,
    options: &StepOptions,
    rng: &mut impl Rng,
) -> Result<f32, StepError> {
    let count_ended =
        |points: &PointsBatch| points.ended_mask().iter().filter(|&&e| e).count();

    let n = points.batch_size();
    let initial_ended = count_ended(points);
    let greedy = StepOptions {
        exploration_rate: 0.0,
        ..*options
    };

    let mut total_steps = 0usize;
    let mut prev_ended = initial_ended;
    for i in 0..max_steps {
        if points.all_ended() {
            break;
        }
        engine.step(points, Role::Host, &greedy, rng)?;
        let ended_now = count_ended(points);
        total_steps += (ended_now - prev_ended) * (i + 1);
        prev_ended = ended_now;
    }
    total_steps += (n - prev_ended) * max_steps;

    if total_steps == 0 {
        return Ok(0.0);
    }
    Ok((n - initial_ended) as f32 / total_steps as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{
        AllCoordHostPolicy, ChooseFirstAgentPolicy, CyclingAgentPolicy, RandomAgentPolicy,
        RandomHostPolicy,
    };
    use hironaka_engine::{PointsBatch, PointsOptions};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> GameConfig {
        GameConfig {
            dimension: 3,
            max_num_points: 10,
            padding_value: -1.0,
            value_threshold: Some(1e8),
            masked: true,
            scale_observation: false,
            exploration_rate: 0.2,
        }
    }

    #[test]
    fn test_random_points_are_reduced() {
        let mut rng = StdRng::seed_from_u64(1);
        let points = random_points(&config(), 8, 5, &mut rng).unwrap();
        assert_eq!(points.batch_size(), 8);
        // Reduction is idempotent, so a reduced batch is a fixed point.
        let again = points.reduced();
        assert_eq!(again.points(), points.points());
    }

    #[test]
    fn test_collect_rollout_fills_buffer_and_stops_when_done() {
        let mut rng = StdRng::seed_from_u64(2);
        let config = config();
        let mut points = random_points(&config, 6, 5, &mut rng).unwrap();
        let engine = FusedStep::new(3, RandomHostPolicy::new(3), RandomAgentPolicy::new(4));
        let mut buffer = ReplayBuffer::new(10_000);

        let steps = collect_rollout(
            &engine,
            &mut points,
            Role::Host,
            200,
            &config.step_options(),
            &mut buffer,
            &mut rng,
        )
        .unwrap();

        assert!(steps > 0);
        assert!(!buffer.is_empty());
        if steps < 200 {
            assert!(points.all_ended() || points.exceeds_threshold());
        }
    }

    #[test]
    fn test_evaluate_rho_on_known_depth_three_game() {
        let game = vec![
            vec![0.0, 1.0, 0.0, 1.0],
            vec![0.0, 2.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 1.0],
            vec![1.0, 0.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0, 0.0],
            vec![2.0, 0.0, 0.0, 0.0],
        ];
        let mut points =
            PointsBatch::from_ragged(&[game], 8, &PointsOptions::default()).unwrap();
        let engine = FusedStep::new(4, AllCoordHostPolicy, CyclingAgentPolicy::new());
        let mut rng = StdRng::seed_from_u64(0);
        let options = StepOptions {
            masked: true,
            scale_observation: false,
            exploration_rate: 0.0,
        };

        // One game, ends after exactly three moves: rho = 1 / 3.
        let rho = evaluate_rho(&engine, &mut points, 20, &options, &mut rng).unwrap();
        assert!((rho - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_rho_charges_survivors_the_full_horizon() {
        // The unit triangle against an agent stuck on axis 0 settles into a
        // two-point state that never terminates. One live game charged the
        // whole horizon: rho = 1 / 5.
        let games = vec![vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ]];
        let mut points =
            PointsBatch::from_ragged(&games, 4, &PointsOptions::default()).unwrap();
        let engine = FusedStep::new(3, AllCoordHostPolicy, ChooseFirstAgentPolicy);
        let mut rng = StdRng::seed_from_u64(0);
        let options = StepOptions {
            masked: true,
            scale_observation: false,
            exploration_rate: 0.0,
        };

        let rho = evaluate_rho(&engine, &mut points, 5, &options, &mut rng).unwrap();
        assert!((rho - 0.2).abs() < 1e-6);
        assert!(!points.all_ended());
    }

    #[test]
    fn test_evaluate_rho_all_ended_batch_is_zero() {
        let games = vec![vec![vec![1.0, 2.0, 3.0]]];
        let mut points =
            PointsBatch::from_ragged(&games, 4, &PointsOptions::default()).unwrap();
        let engine = FusedStep::new(3, AllCoordHostPolicy, CyclingAgentPolicy::new());
        let mut rng = StdRng::seed_from_u64(0);

        let rho =
            evaluate_rho(&engine, &mut points, 10, &StepOptions::default(), &mut rng).unwrap();
        assert_eq!(rho, 0.0);
    }
}
