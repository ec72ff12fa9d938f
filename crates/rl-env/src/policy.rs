//! Policy seams and baseline players.
//!
//! A policy maps batched observations to raw per-action preferences
//! (logits); the step engine turns logits into moves by arg-max, after
//! masking and exploration. The baselines here are the classical fixed
//! opponents used for evaluation and as in-environment counter-parties.

use std::cell::{Cell, RefCell};

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::StepError;

/// Host-side decision function.
pub trait HostPolicy {
    /// Map a (batch, max_points, dimension) observation to
    /// (batch, 2^dimension) subset logits.
    fn host_logits(&self, observations: &Array3<f32>) -> Result<Array2<f32>, StepError>;
}

/// Agent-side decision function.
pub trait AgentPolicy {
    /// Map a (batch, max_points, dimension) observation plus the host's
    /// (batch, dimension) subsets to (batch, dimension) axis logits.
    fn agent_logits(
        &self,
        observations: &Array3<f32>,
        coords: &Array2<f32>,
    ) -> Result<Array2<f32>, StepError>;
}

/// Uniformly random host restricted to legal subsets (weight >= 2), so its
/// arg-max never lands on a move that cannot shrink the game.
pub struct RandomHostPolicy {
    rng: RefCell<StdRng>,
}

impl RandomHostPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl HostPolicy for RandomHostPolicy {
    fn host_logits(&self, observations: &Array3<f32>) -> Result<Array2<f32>, StepError> {
        let (b, _, d) = observations.dim();
        let space = 1usize << d;
        let mut rng = self.rng.borrow_mut();
        Ok(Array2::from_shape_fn((b, space), |(_, id)| {
            if (id as u32).count_ones() >= 2 {
                rng.random::<f32>()
            } else {
                f32::MIN
            }
        }))
    }
}

/// Host that always picks the full coordinate set.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllCoordHostPolicy;

impl HostPolicy for AllCoordHostPolicy {
    fn host_logits(&self, observations: &Array3<f32>) -> Result<Array2<f32>, StepError> {
        let (b, _, d) = observations.dim();
        let space = 1usize << d;
        Ok(Array2::from_shape_fn((b, space), |(_, id)| {
            if id == space - 1 {
                1.0
            } else {
                0.0
            }
        }))
    }
}

/// Uniformly random agent. Legality comes from downstream masking.
pub struct RandomAgentPolicy {
    rng: RefCell<StdRng>,
}

impl RandomAgentPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl AgentPolicy for RandomAgentPolicy {
    fn agent_logits(
        &self,
        observations: &Array3<f32>,
        _coords: &Array2<f32>,
    ) -> Result<Array2<f32>, StepError> {
        let (b, _, d) = observations.dim();
        let mut rng = self.rng.borrow_mut();
        Ok(Array2::from_shape_fn((b, d), |_| rng.random::<f32>()))
    }
}

/// Agent that prefers the lowest axis index; after masking this picks the
/// first axis of the host's subset.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChooseFirstAgentPolicy;

impl AgentPolicy for ChooseFirstAgentPolicy {
    fn agent_logits(
        &self,
        observations: &Array3<f32>,
        _coords: &Array2<f32>,
    ) -> Result<Array2<f32>, StepError> {
        let (b, _, d) = observations.dim();
        Ok(Array2::from_shape_fn((b, d), |(_, k)| (d - k) as f32))
    }
}

/// Agent that walks through the axes round-robin, advancing one axis per
/// call; every batch element gets the same axis. Deterministic and, unlike
/// `ChooseFirstAgentPolicy`, guaranteed to touch every axis, which makes it
/// the baseline of choice for termination checks.
#[derive(Debug, Default)]
pub struct CyclingAgentPolicy {
    counter: Cell<usize>,
}

impl CyclingAgentPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentPolicy for CyclingAgentPolicy {
    fn agent_logits(
        &self,
        observations: &Array3<f32>,
        _coords: &Array2<f32>,
    ) -> Result<Array2<f32>, StepError> {
        let (b, _, d) = observations.dim();
        let axis = self.counter.get() % d;
        self.counter.set(self.counter.get() + 1);
        Ok(Array2::from_shape_fn(
            (b, d),
            |(_, k)| if k == axis { 1.0 } else { 0.0 },
        ))
    }
}
