//! Core RL types for the Hironaka environment

use std::fmt;
use std::str::FromStr;

use hironaka_engine::PointsError;
use ndarray::{Array1, Array2, Array3};
use thiserror::Error;

/// Discrete action identifier.
///
/// For the host this is an encoded coordinate subset in
/// `0..2^dimension`; for the agent it is an axis index in `0..dimension`.
pub type ActionId = u32;

/// Reward value (float)
pub type Reward = f32;

/// Which side of the game a policy or an experience batch belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Role {
    Host,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

impl FromStr for Role {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Role::Host),
            "agent" => Ok(Role::Agent),
            other => Err(StepError::InvalidRole(other.to_string())),
        }
    }
}

/// Step behaviour knobs, shared by the fused step engine and the
/// single-game environments.
#[derive(Copy, Clone, Debug)]
pub struct StepOptions {
    /// Restrict the greedy agent choice to axes inside the host's subset.
    pub masked: bool,

    /// Rescale each element after every move so its maximum coordinate is 1.
    pub scale_observation: bool,

    /// Per-element probability that the sampling side's decision is replaced
    /// by a uniformly random one.
    pub exploration_rate: f32,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            masked: true,
            scale_observation: true,
            exploration_rate: 0.2,
        }
    }
}

/// Error types for stepping the environment
#[derive(Debug, Error)]
pub enum StepError {
    /// A role string failed to parse
    #[error("unknown role: {0:?} (expected \"host\" or \"agent\")")]
    InvalidRole(String),

    /// A policy (or reward function) returned an array of the wrong shape
    #[error("policy output shape mismatch: {0}")]
    PolicyShape(String),

    /// step() called with no live game left
    #[error("episode already finished")]
    EpisodeDone,

    /// The submitted action is malformed or illegal in the current state
    #[error("illegal action: {0}")]
    InvalidAction(String),

    /// Underlying engine error
    #[error(transparent)]
    Points(#[from] PointsError),
}

/// Batched observations, shaped for the role that consumes them.
#[derive(Clone, Debug)]
pub enum RoleObservations {
    /// The host sees the sorted point features: (batch, max_points, dimension).
    Host(Array3<f32>),

    /// The agent additionally sees the host's chosen subsets:
    /// `coords` is (batch, dimension) with 0/1 entries.
    Agent {
        points: Array3<f32>,
        coords: Array2<f32>,
    },
}

impl RoleObservations {
    /// Number of batch elements covered.
    pub fn len(&self) -> usize {
        match self {
            RoleObservations::Host(points) => points.dim().0,
            RoleObservations::Agent { points, .. } => points.dim().0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One fused step's training yield: per-element observations, actions,
/// rewards and termination flags for every element that was live going into
/// the step (pre-ended elements are filtered out).
#[derive(Clone, Debug)]
pub struct Experience {
    pub role: Role,
    pub observations: RoleObservations,
    pub actions: Array1<ActionId>,
    pub rewards: Array1<Reward>,
    pub dones: Vec<bool>,
    pub next_observations: RoleObservations,
}

impl Experience {
    /// Number of live elements sampled.
    pub fn len(&self) -> usize {
        self.dones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("host".parse::<Role>().unwrap(), Role::Host);
        assert_eq!("agent".parse::<Role>().unwrap(), Role::Agent);
        assert_eq!(Role::Host.to_string(), "host");
        assert_eq!(Role::Agent.to_string(), "agent");
    }

    #[test]
    fn test_role_parse_rejects_garbage() {
        assert!(matches!(
            "HOST".parse::<Role>(),
            Err(StepError::InvalidRole(_))
        ));
        assert!(matches!("".parse::<Role>(), Err(StepError::InvalidRole(_))));
    }

    #[test]
    fn test_default_step_options() {
        let options = StepOptions::default();
        assert!(options.masked);
        assert!(options.scale_observation);
        assert_eq!(options.exploration_rate, 0.2);
    }
}
