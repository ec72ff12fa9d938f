//! Single-game gym-style environments.
//!
//! One side of the game is the trainable surface; the fixed counter-party
//! policy lives inside the environment. Each environment drives a batch of
//! one so observations come out as plain 2-D arrays.

use hironaka_engine::{PointSet, PointsBatch};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::action_encoder::HostActionEncoder;
use crate::config::GameConfig;
use crate::fused_step::{argmax, masked_argmax};
use crate::policy::{AgentPolicy, HostPolicy};
use crate::rollout::random_points;
use crate::types::{ActionId, Reward, StepError};

/// The result of one environment step.
pub struct EnvStep<O> {
    pub observation: O,
    pub reward: Reward,
    pub done: bool,
}

/// The reset/step surface shared by both single-game environments.
pub trait Environment {
    type Observation;
    type Action;

    /// Start a fresh episode and return its first observation.
    fn reset(&mut self) -> Result<Self::Observation, StepError>;

    /// Apply one action for the trainable side (the counter-party responds
    /// inside). Errors with `EpisodeDone` when no live episode exists.
    fn step(&mut self, action: &Self::Action) -> Result<EnvStep<Self::Observation>, StepError>;
}

/// Environment for training a host against a fixed agent.
///
/// Actions are 0/1 membership vectors over the coordinates; subsets of
/// weight < 2 are rejected since they cannot shrink the game. The host is
/// rewarded +1 when the game terminates.
pub struct HostEnv<A: AgentPolicy> {
    agent: A,
    config: GameConfig,
    max_value: u32,
    points: Option<PointsBatch>,
    rng: StdRng,
}

impl<A: AgentPolicy> HostEnv<A> {
    pub fn new(config: GameConfig, agent: A, max_value: u32, seed: u64) -> Self {
        Self {
            agent,
            config,
            max_value,
            points: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn observation(points: &PointsBatch) -> Array2<f32> {
        points.sorted_features().index_axis(Axis(0), 0).to_owned()
    }
}

impl<A: AgentPolicy> Environment for HostEnv<A> {
    type Observation = Array2<f32>;
    type Action = Vec<u8>;

    fn reset(&mut self) -> Result<Self::Observation, StepError> {
        let points = random_points(&self.config, 1, self.max_value, &mut self.rng)?;
        let observation = Self::observation(&points);
        self.points = Some(points);
        Ok(observation)
    }

    fn step(&mut self, action: &Vec<u8>) -> Result<EnvStep<Self::Observation>, StepError> {
        let points = self.points.as_mut().ok_or(StepError::EpisodeDone)?;
        if points.all_ended() || points.exceeds_threshold() {
            return Err(StepError::EpisodeDone);
        }

        let d = self.config.dimension;
        if action.len() != d {
            return Err(StepError::InvalidAction(format!(
                "subset vector has {} entries, expected {d}",
                action.len()
            )));
        }
        let weight = action.iter().filter(|&&b| b != 0).count();
        if weight < 2 {
            return Err(StepError::InvalidAction(format!(
                "host subset must pick at least two axes, got {weight}"
            )));
        }
        let coords =
            Array2::from_shape_fn((1, d), |(_, k)| if action[k] != 0 { 1.0 } else { 0.0 });

        // Counter-party: greedy masked agent choice.
        let observations = points.sorted_features();
        let logits = self.agent.agent_logits(&observations, &coords)?;
        if logits.dim() != (1, d) {
            return Err(StepError::PolicyShape(format!(
                "agent logits must be (1, {d}), got {:?}",
                logits.dim()
            )));
        }
        let axis = masked_argmax(logits.row(0), coords.row(0));

        points.shift(&coords, &[axis])?;
        points.reduce();
        if self.config.scale_observation {
            points.rescale();
        }

        let ended = points.all_ended();
        let done = ended || points.exceeds_threshold();
        Ok(EnvStep {
            observation: Self::observation(points),
            reward: if ended { 1.0 } else { 0.0 },
            done,
        })
    }
}

/// Environment for training an agent against a fixed host.
///
/// Observations carry the point features together with the host's current
/// subset; the action is an axis index, which must belong to the subset.
/// The agent is rewarded -1 when the game terminates.
pub struct AgentEnv<H: HostPolicy> {
    host: H,
    config: GameConfig,
    max_value: u32,
    encoder: HostActionEncoder,
    points: Option<PointsBatch>,
    coords: Option<Array2<f32>>,
    rng: StdRng,
}

impl<H: HostPolicy> AgentEnv<H> {
    pub fn new(config: GameConfig, host: H, max_value: u32, seed: u64) -> Self {
        let encoder = HostActionEncoder::new(config.dimension);
        Self {
            host,
            config,
            max_value,
            encoder,
            points: None,
            coords: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn host_subset(&self, points: &PointsBatch) -> Result<Array2<f32>, StepError> {
        let observations = points.sorted_features();
        let logits = self.host.host_logits(&observations)?;
        let space = self.encoder.action_space_size();
        if logits.dim() != (1, space) {
            return Err(StepError::PolicyShape(format!(
                "host logits must be (1, {space}), got {:?}",
                logits.dim()
            )));
        }
        let action = argmax(logits.row(0)) as ActionId;
        Ok(self.encoder.decode_batch(&[action]))
    }

    fn observation(points: &PointsBatch, coords: &Array2<f32>) -> (Array2<f32>, Array1<f32>) {
        (
            points.sorted_features().index_axis(Axis(0), 0).to_owned(),
            coords.row(0).to_owned(),
        )
    }
}

impl<H: HostPolicy> Environment for AgentEnv<H> {
    type Observation = (Array2<f32>, Array1<f32>);
    type Action = usize;

    fn reset(&mut self) -> Result<Self::Observation, StepError> {
        let points = random_points(&self.config, 1, self.max_value, &mut self.rng)?;
        let coords = self.host_subset(&points)?;
        let observation = Self::observation(&points, &coords);
        self.points = Some(points);
        self.coords = Some(coords);
        Ok(observation)
    }

    fn step(&mut self, action: &usize) -> Result<EnvStep<Self::Observation>, StepError> {
        let d = self.config.dimension;
        {
            let points = self.points.as_mut().ok_or(StepError::EpisodeDone)?;
            let coords = self.coords.as_ref().ok_or(StepError::EpisodeDone)?;
            if points.all_ended() || points.exceeds_threshold() {
                return Err(StepError::EpisodeDone);
            }

            if *action >= d {
                return Err(StepError::InvalidAction(format!(
                    "axis {action} out of range for dimension {d}"
                )));
            }
            if coords[[0, *action]] == 0.0 {
                return Err(StepError::InvalidAction(format!(
                    "axis {action} is outside the host's subset"
                )));
            }

            points.shift(coords, &[*action])?;
            points.reduce();
            if self.config.scale_observation {
                points.rescale();
            }
        }

        let points = self.points.as_ref().ok_or(StepError::EpisodeDone)?;
        let ended = points.all_ended();
        let done = ended || points.exceeds_threshold();
        let next_coords = self.host_subset(points)?;
        let observation = Self::observation(points, &next_coords);
        self.coords = Some(next_coords);
        Ok(EnvStep {
            observation,
            reward: if ended { -1.0 } else { 0.0 },
            done,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{AllCoordHostPolicy, CyclingAgentPolicy};

    fn config(dimension: usize) -> GameConfig {
        GameConfig {
            dimension,
            max_num_points: 10,
            padding_value: -1.0,
            value_threshold: Some(1e8),
            masked: true,
            scale_observation: true,
            exploration_rate: 0.0,
        }
    }

    #[test]
    fn test_host_env_step_before_reset_fails() {
        let mut env = HostEnv::new(config(3), CyclingAgentPolicy::new(), 5, 0);
        assert!(matches!(
            env.step(&vec![1, 1, 1]),
            Err(StepError::EpisodeDone)
        ));
    }

    #[test]
    fn test_host_env_rejects_small_subsets() {
        let mut env = HostEnv::new(config(3), CyclingAgentPolicy::new(), 5, 1);
        env.reset().unwrap();

        assert!(matches!(
            env.step(&vec![0, 1, 0]),
            Err(StepError::InvalidAction(_))
        ));
        assert!(matches!(
            env.step(&vec![1, 1]),
            Err(StepError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_host_env_episode_ends_with_positive_reward() {
        let mut env = HostEnv::new(config(3), CyclingAgentPolicy::new(), 5, 7);
        let observation = env.reset().unwrap();
        assert_eq!(observation.dim(), (10, 3));

        let mut last_reward = 0.0;
        let mut finished = false;
        for _ in 0..300 {
            let step = env.step(&vec![1, 1, 1]).unwrap();
            assert_eq!(step.observation.dim(), (10, 3));
            last_reward = step.reward;
            if step.done {
                finished = true;
                break;
            }
            assert_eq!(step.reward, 0.0);
        }
        assert!(finished, "full-subset host should end the game");
        assert_eq!(last_reward, 1.0);
        assert!(matches!(
            env.step(&vec![1, 1, 1]),
            Err(StepError::EpisodeDone)
        ));
    }

    #[test]
    fn test_agent_env_validates_axis() {
        let mut env = AgentEnv::new(config(3), AllCoordHostPolicy, 5, 2);
        let (points, coords) = env.reset().unwrap();
        assert_eq!(points.dim(), (10, 3));
        assert_eq!(coords.to_vec(), vec![1.0, 1.0, 1.0]);

        assert!(matches!(env.step(&7), Err(StepError::InvalidAction(_))));
    }

    #[test]
    fn test_agent_env_episode_ends_with_negative_reward() {
        let mut env = AgentEnv::new(config(3), AllCoordHostPolicy, 5, 3);
        env.reset().unwrap();

        let mut last_reward = 0.0;
        let mut finished = false;
        for i in 0..300usize {
            let step = env.step(&(i % 3)).unwrap();
            last_reward = step.reward;
            if step.done {
                finished = true;
                break;
            }
        }
        assert!(finished, "cycling agent against the full subset must lose");
        assert_eq!(last_reward, -1.0);
        assert!(matches!(env.step(&0), Err(StepError::EpisodeDone)));
    }
}
