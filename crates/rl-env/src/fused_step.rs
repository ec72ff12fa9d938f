//! Fused step engine: one host move and one agent move applied to the whole
//! batch in a single transition, yielding training experience for one side.
//!
//! The sampling side explores with the configured rate; the counter-party
//! always plays greedily. Elements that were already ended going into the
//! step stay frozen and are filtered out of the returned experience.

use hironaka_engine::{PointSet, PointsBatch};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;

use crate::action_encoder::HostActionEncoder;
use crate::policy::{AgentPolicy, HostPolicy};
use crate::types::{
    ActionId, Experience, Reward, Role, RoleObservations, StepError, StepOptions,
};

/// Caller-supplied reward override:
/// (role, observations, next observations, dones) -> per-element rewards.
pub type RewardFn =
    Box<dyn Fn(Role, &RoleObservations, &RoleObservations, &[bool]) -> Array1<Reward>>;

/// Index of the first maximum in a row. Ties resolve to the lowest index so
/// arg-max is deterministic for equal logits.
pub(crate) fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in row.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

/// Arg-max restricted to the axes of a 0/1 subset row. Logits outside the
/// subset are multiplied away before the `f32::MIN` penalty is added, so
/// even an arbitrarily large logit on a masked axis cannot win.
pub(crate) fn masked_argmax(logits: ArrayView1<f32>, coords: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, (&l, &c)) in logits.iter().zip(coords.iter()).enumerate() {
        let v = l * c + (1.0 - c) * f32::MIN;
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

/// A host policy and an agent policy fused around one action encoder.
pub struct FusedStep<H, A> {
    host: H,
    agent: A,
    encoder: HostActionEncoder,
    reward_fn: Option<RewardFn>,
}

impl<H: HostPolicy, A: AgentPolicy> FusedStep<H, A> {
    pub fn new(dimension: usize, host: H, agent: A) -> Self {
        Self {
            host,
            agent,
            encoder: HostActionEncoder::new(dimension),
            reward_fn: None,
        }
    }

    /// Replace the default terminal reward with a caller-supplied function.
    pub fn with_reward_fn(mut self, reward_fn: RewardFn) -> Self {
        self.reward_fn = Some(reward_fn);
        self
    }

    pub fn encoder(&self) -> &HostActionEncoder {
        &self.encoder
    }

    /// The host's subset decisions for the current state. Non-mutating.
    ///
    /// With probability `exploration_rate`, an element's logit row is
    /// replaced by uniform noise before the arg-max, which amounts to a
    /// uniformly random (always decodable) subset id for that element.
    pub fn host_move(
        &self,
        points: &PointsBatch,
        exploration_rate: f32,
        rng: &mut impl Rng,
    ) -> Result<(Array2<f32>, Vec<ActionId>), StepError> {
        let observations = points.sorted_features();
        let mut logits = self.host.host_logits(&observations)?;
        let b = points.batch_size();
        let space = self.encoder.action_space_size();
        if logits.dim() != (b, space) {
            return Err(StepError::PolicyShape(format!(
                "host logits must be ({b}, {space}), got {:?}",
                logits.dim()
            )));
        }

        for bi in 0..b {
            if rng.random::<f32>() < exploration_rate {
                for v in logits.row_mut(bi) {
                    *v = rng.random::<f32>();
                }
            }
        }

        let actions: Vec<ActionId> = logits
            .outer_iter()
            .map(|row| argmax(row) as ActionId)
            .collect();
        let coords = self.encoder.decode_batch(&actions);
        Ok((coords, actions))
    }

    /// The agent's axis decisions given the host's subsets; mutates the
    /// batch in place (shift, reduce, optional rescale).
    ///
    /// An exploring element draws its axis uniformly over all axes without
    /// re-applying the legality mask; `shift` treats an out-of-subset axis
    /// as a no-op for that element, so the draw is harmless when it misses.
    pub fn agent_move(
        &self,
        points: &mut PointsBatch,
        coords: &Array2<f32>,
        options: &StepOptions,
        rng: &mut impl Rng,
    ) -> Result<Vec<usize>, StepError> {
        let observations = points.sorted_features();
        let logits = self.agent.agent_logits(&observations, coords)?;
        let b = points.batch_size();
        let d = points.dimension();
        if logits.dim() != (b, d) {
            return Err(StepError::PolicyShape(format!(
                "agent logits must be ({b}, {d}), got {:?}",
                logits.dim()
            )));
        }

        let mut axes: Vec<usize> = if options.masked {
            logits
                .outer_iter()
                .zip(coords.outer_iter())
                .map(|(row, subset)| masked_argmax(row, subset))
                .collect()
        } else {
            logits.outer_iter().map(argmax).collect()
        };
        for axis in axes.iter_mut() {
            if rng.random::<f32>() < options.exploration_rate {
                *axis = rng.random_range(0..d);
            }
        }

        points.shift(coords, &axes)?;
        points.reduce();
        if options.scale_observation {
            points.rescale();
        }
        Ok(axes)
    }

    /// One fused transition for the whole batch, producing experience for
    /// `sample_for`. Errors with `EpisodeDone` if no element is live.
    pub fn step(
        &self,
        points: &mut PointsBatch,
        sample_for: Role,
        options: &StepOptions,
        rng: &mut impl Rng,
    ) -> Result<Experience, StepError> {
        let alive: Vec<usize> = points
            .ended_mask()
            .iter()
            .enumerate()
            .filter(|(_, &ended)| !ended)
            .map(|(i, _)| i)
            .collect();
        if alive.is_empty() {
            return Err(StepError::EpisodeDone);
        }

        let observations = points.sorted_features();

        let host_er = if sample_for == Role::Host {
            options.exploration_rate
        } else {
            0.0
        };
        let agent_options = StepOptions {
            exploration_rate: if sample_for == Role::Agent {
                options.exploration_rate
            } else {
                0.0
            },
            ..*options
        };

        let (coords, host_actions) = self.host_move(points, host_er, rng)?;
        let axes = self.agent_move(points, &coords, &agent_options, rng)?;

        let ended_after = points.ended_mask();
        let dones: Vec<bool> = alive.iter().map(|&i| ended_after[i]).collect();
        let next_features = points.sorted_features();

        let (obs, next_obs, actions) = match sample_for {
            Role::Host => (
                RoleObservations::Host(observations.select(Axis(0), &alive)),
                RoleObservations::Host(next_features.select(Axis(0), &alive)),
                Array1::from(
                    alive
                        .iter()
                        .map(|&i| host_actions[i])
                        .collect::<Vec<ActionId>>(),
                ),
            ),
            Role::Agent => {
                // The agent's next observation includes the host's next
                // subsets, drawn at the same exploration rate.
                let (next_coords, _) = self.host_move(points, options.exploration_rate, rng)?;
                (
                    RoleObservations::Agent {
                        points: observations.select(Axis(0), &alive),
                        coords: coords.select(Axis(0), &alive),
                    },
                    RoleObservations::Agent {
                        points: next_features.select(Axis(0), &alive),
                        coords: next_coords.select(Axis(0), &alive),
                    },
                    Array1::from(
                        alive
                            .iter()
                            .map(|&i| axes[i] as ActionId)
                            .collect::<Vec<ActionId>>(),
                    ),
                )
            }
        };

        let rewards = match &self.reward_fn {
            Some(reward_fn) => reward_fn(sample_for, &obs, &next_obs, &dones),
            None => default_rewards(sample_for, &dones),
        };
        if rewards.len() != dones.len() {
            return Err(StepError::PolicyShape(format!(
                "reward function returned {} rewards for {} elements",
                rewards.len(),
                dones.len()
            )));
        }

        Ok(Experience {
            role: sample_for,
            observations: obs,
            actions,
            rewards,
            dones,
            next_observations: next_obs,
        })
    }
}

/// Default terminal reward: the host earns +1 and the agent -1 exactly on
/// elements that ended during this step; everything else is 0.
fn default_rewards(role: Role, dones: &[bool]) -> Array1<Reward> {
    let sign = match role {
        Role::Host => 1.0,
        Role::Agent => -1.0,
    };
    Array1::from(
        dones
            .iter()
            .map(|&done| if done { sign } else { 0.0 })
            .collect::<Vec<Reward>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{
        AllCoordHostPolicy, CyclingAgentPolicy, RandomAgentPolicy, RandomHostPolicy,
    };
    use hironaka_engine::{PointsBatch, PointsOptions};
    use ndarray::{s, Array3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn six_point_game() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 1.0, 0.0, 1.0],
            vec![0.0, 2.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 1.0],
            vec![1.0, 0.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0, 0.0],
            vec![2.0, 0.0, 0.0, 0.0],
        ]
    }

    fn greedy_options() -> StepOptions {
        StepOptions {
            masked: true,
            scale_observation: false,
            exploration_rate: 0.0,
        }
    }

    /// Host pinned to a fixed subset id.
    struct FixedSubsetHost(ActionId);

    impl HostPolicy for FixedSubsetHost {
        fn host_logits(
            &self,
            observations: &Array3<f32>,
        ) -> Result<Array2<f32>, StepError> {
            let (b, _, d) = observations.dim();
            let space = 1usize << d;
            Ok(Array2::from_shape_fn((b, space), |(_, id)| {
                if id as ActionId == self.0 {
                    1.0
                } else {
                    0.0
                }
            }))
        }
    }

    /// Agent with identical logits on every axis, to observe tie-breaking.
    struct IndifferentAgent;

    impl AgentPolicy for IndifferentAgent {
        fn agent_logits(
            &self,
            observations: &Array3<f32>,
            _coords: &Array2<f32>,
        ) -> Result<Array2<f32>, StepError> {
            let (b, _, d) = observations.dim();
            Ok(Array2::from_elem((b, d), 0.5))
        }
    }

    #[test]
    fn test_step_on_all_ended_batch_is_an_error() {
        let games = vec![vec![vec![1.0, 2.0]]];
        let mut points = PointsBatch::from_ragged(&games, 4, &PointsOptions::default()).unwrap();
        let engine = FusedStep::new(2, RandomHostPolicy::new(0), RandomAgentPolicy::new(1));
        let mut rng = StdRng::seed_from_u64(0);

        let result = engine.step(&mut points, Role::Host, &greedy_options(), &mut rng);
        assert!(matches!(result, Err(StepError::EpisodeDone)));
    }

    #[test]
    fn test_greedy_play_ends_six_point_game_in_three_steps() {
        // One live game and one already-ended single-point game: the ended
        // element stays byte-identical and never appears in the experience.
        let games = vec![six_point_game(), vec![vec![3.0, 7.0, 0.0, 5.0]]];
        let mut points = PointsBatch::from_ragged(&games, 8, &PointsOptions::default()).unwrap();
        let frozen = points.points().slice(s![1, .., ..]).to_owned();

        let engine = FusedStep::new(4, AllCoordHostPolicy, CyclingAgentPolicy::new());
        let mut rng = StdRng::seed_from_u64(0);
        let options = greedy_options();

        for step in 1..=3 {
            let experience = engine
                .step(&mut points, Role::Host, &options, &mut rng)
                .unwrap();
            assert_eq!(experience.len(), 1, "only the live element is sampled");
            assert_eq!(experience.dones, vec![step == 3]);
            assert_eq!(experience.rewards[0], if step == 3 { 1.0 } else { 0.0 });
            assert_eq!(points.points().slice(s![1, .., ..]), frozen);
        }
        assert!(points.all_ended());
    }

    #[test]
    fn test_agent_sampling_rewards_and_coords_observation() {
        let games = vec![six_point_game()];
        let mut points = PointsBatch::from_ragged(&games, 8, &PointsOptions::default()).unwrap();
        let engine = FusedStep::new(4, AllCoordHostPolicy, CyclingAgentPolicy::new());
        let mut rng = StdRng::seed_from_u64(0);
        let options = greedy_options();

        for step in 1..=3 {
            let experience = engine
                .step(&mut points, Role::Agent, &options, &mut rng)
                .unwrap();
            assert_eq!(experience.rewards[0], if step == 3 { -1.0 } else { 0.0 });
            match (&experience.observations, &experience.next_observations) {
                (
                    RoleObservations::Agent { coords, .. },
                    RoleObservations::Agent {
                        coords: next_coords,
                        ..
                    },
                ) => {
                    assert_eq!(coords.dim(), (1, 4));
                    assert_eq!(coords.row(0).to_vec(), vec![1.0, 1.0, 1.0, 1.0]);
                    assert_eq!(next_coords.dim(), (1, 4));
                }
                _ => panic!("agent experience must carry coords"),
            }
        }
    }

    #[test]
    fn test_masked_agent_stays_inside_host_subset() {
        let encoder = HostActionEncoder::new(3);
        let subset = encoder.encode(&[0.0, 1.0, 1.0]).unwrap();
        let engine = FusedStep::new(3, FixedSubsetHost(subset), RandomAgentPolicy::new(9));
        let mut rng = StdRng::seed_from_u64(9);
        let options = greedy_options();

        for seed in 0..10 {
            let mut batch_rng = StdRng::seed_from_u64(seed);
            let mut points =
                hironaka_engine::random_batch(6, 5, 3, 5, &PointsOptions::default(), &mut batch_rng)
                    .unwrap();
            points.reduce();

            let live: Vec<usize> = points
                .ended_mask()
                .iter()
                .enumerate()
                .filter(|(_, &e)| !e)
                .map(|(i, _)| i)
                .collect();
            if live.is_empty() {
                continue;
            }
            let (coords, _) = engine.host_move(&points, 0.0, &mut rng).unwrap();
            let axes = engine
                .agent_move(&mut points, &coords, &options, &mut rng)
                .unwrap();
            for &bi in &live {
                assert!(
                    axes[bi] == 1 || axes[bi] == 2,
                    "greedy masked axis must stay in the subset, got {}",
                    axes[bi]
                );
            }
        }
    }

    #[test]
    fn test_masked_argmax_ignores_huge_logits_outside_subset() {
        // Adding the penalty alone would let f32::MAX cancel it back to 0;
        // the multiply-then-penalise form keeps the axis out of reach.
        let logits = ndarray::arr1(&[f32::MAX, -1.0, -2.0]);
        let subset = ndarray::arr1(&[0.0, 1.0, 1.0]);
        assert_eq!(masked_argmax(logits.view(), subset.view()), 1);

        let full = ndarray::arr1(&[1.0, 1.0, 1.0]);
        assert_eq!(masked_argmax(logits.view(), full.view()), 0);
    }

    #[test]
    fn test_equal_logits_break_ties_to_lowest_axis() {
        let games = vec![six_point_game()];
        let mut points = PointsBatch::from_ragged(&games, 8, &PointsOptions::default()).unwrap();
        let engine = FusedStep::new(4, AllCoordHostPolicy, IndifferentAgent);
        let mut rng = StdRng::seed_from_u64(0);

        let (coords, _) = engine.host_move(&points, 0.0, &mut rng).unwrap();
        let axes = engine
            .agent_move(&mut points, &coords, &greedy_options(), &mut rng)
            .unwrap();
        assert_eq!(axes, vec![0]);
    }

    #[test]
    fn test_full_exploration_unmasked_noise_is_harmless() {
        // Exploration replaces every decision; the agent's random axis may
        // fall outside the host subset, which must leave that element
        // unchanged rather than corrupt it.
        let engine = FusedStep::new(3, RandomHostPolicy::new(4), RandomAgentPolicy::new(5));
        let options = StepOptions {
            masked: true,
            scale_observation: true,
            exploration_rate: 1.0,
        };
        let mut rng = StdRng::seed_from_u64(17);
        let mut points =
            hironaka_engine::random_batch(8, 6, 3, 5, &PointsOptions::default(), &mut rng).unwrap();
        points.reduce();

        let mut previous = points.effective_counts();
        for _ in 0..20 {
            if points.all_ended() {
                break;
            }
            let experience = engine
                .step(&mut points, Role::Agent, &options, &mut rng)
                .unwrap();
            assert!(experience.len() <= 8);
            let counts = points.effective_counts();
            for (now, before) in counts.iter().zip(previous.iter()) {
                assert!(now <= before, "point counts can never grow");
            }
            previous = counts;
        }
    }

    #[test]
    fn test_custom_reward_fn_overrides_default() {
        let games = vec![six_point_game()];
        let mut points = PointsBatch::from_ragged(&games, 8, &PointsOptions::default()).unwrap();
        let engine = FusedStep::new(4, AllCoordHostPolicy, CyclingAgentPolicy::new())
            .with_reward_fn(Box::new(|_, _, _, dones| {
                Array1::from_elem(dones.len(), 0.5)
            }));
        let mut rng = StdRng::seed_from_u64(0);

        let experience = engine
            .step(&mut points, Role::Host, &greedy_options(), &mut rng)
            .unwrap();
        assert_eq!(experience.rewards[0], 0.5);
    }

    #[test]
    fn test_policy_shape_mismatch_is_reported() {
        struct BadHost;
        impl HostPolicy for BadHost {
            fn host_logits(
                &self,
                observations: &Array3<f32>,
            ) -> Result<Array2<f32>, StepError> {
                let (b, _, _) = observations.dim();
                Ok(Array2::zeros((b, 3)))
            }
        }

        let games = vec![six_point_game()];
        let mut points = PointsBatch::from_ragged(&games, 8, &PointsOptions::default()).unwrap();
        let engine = FusedStep::new(4, BadHost, RandomAgentPolicy::new(0));
        let mut rng = StdRng::seed_from_u64(0);

        let result = engine.step(&mut points, Role::Host, &greedy_options(), &mut rng);
        assert!(matches!(result, Err(StepError::PolicyShape(_))));
    }
}
