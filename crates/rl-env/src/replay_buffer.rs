//! Replay buffer for fused-step experience.
//!
//! A ring buffer of per-element transitions. Batched experiences from the
//! step engine are split into individual transitions on the way in, so the
//! trainer can sample uniformly across steps and batch positions.

use ndarray::{s, Array1, Array2};
use rand::Rng;

use crate::types::{ActionId, Experience, Reward, Role, RoleObservations};

/// Per-element observation as stored in the buffer.
#[derive(Clone, Debug)]
pub enum SampleObservation {
    /// (max_points, dimension) sorted point features.
    Host(Array2<f32>),

    /// Features plus the host's subset for this element.
    Agent {
        points: Array2<f32>,
        coords: Array1<f32>,
    },
}

/// One stored transition for a single batch element.
#[derive(Clone, Debug)]
pub struct Transition {
    pub role: Role,
    pub observation: SampleObservation,
    pub action: ActionId,
    pub reward: Reward,
    pub done: bool,
    pub next_observation: SampleObservation,
}

/// Ring buffer for storing transitions.
///
/// When the buffer reaches capacity, new transitions overwrite the oldest
/// ones.
pub struct ReplayBuffer {
    capacity: usize,
    data: Vec<Transition>,
    write_index: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            data: Vec::with_capacity(capacity),
            write_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Add a single transition, overwriting the oldest when full.
    pub fn push(&mut self, transition: Transition) {
        if self.data.len() < self.capacity {
            self.data.push(transition);
            if self.data.len() == self.capacity {
                self.write_index = 0;
            }
        } else {
            self.data[self.write_index] = transition;
            self.write_index = (self.write_index + 1) % self.capacity;
        }
    }

    /// Add many transitions.
    pub fn extend<I: IntoIterator<Item = Transition>>(&mut self, it: I) {
        for transition in it {
            self.push(transition);
        }
    }

    /// Split a batched experience into per-element transitions and absorb
    /// them.
    pub fn add_experience(&mut self, experience: &Experience) {
        for idx in 0..experience.len() {
            let (observation, next_observation) = match (
                &experience.observations,
                &experience.next_observations,
            ) {
                (RoleObservations::Host(obs), RoleObservations::Host(next)) => (
                    SampleObservation::Host(obs.slice(s![idx, .., ..]).to_owned()),
                    SampleObservation::Host(next.slice(s![idx, .., ..]).to_owned()),
                ),
                (
                    RoleObservations::Agent { points, coords },
                    RoleObservations::Agent {
                        points: next_points,
                        coords: next_coords,
                    },
                ) => (
                    SampleObservation::Agent {
                        points: points.slice(s![idx, .., ..]).to_owned(),
                        coords: coords.row(idx).to_owned(),
                    },
                    SampleObservation::Agent {
                        points: next_points.slice(s![idx, .., ..]).to_owned(),
                        coords: next_coords.row(idx).to_owned(),
                    },
                ),
                // The step engine always pairs matching variants.
                _ => unreachable!("experience with mismatched observation variants"),
            };
            self.push(Transition {
                role: experience.role,
                observation,
                action: experience.actions[idx],
                reward: experience.rewards[idx],
                done: experience.dones[idx],
                next_observation,
            });
        }
    }

    /// Uniformly sample `batch_size` transitions with replacement.
    ///
    /// # Panics
    /// Panics if the buffer is empty.
    pub fn sample<'a>(&'a self, rng: &mut impl Rng, batch_size: usize) -> Vec<&'a Transition> {
        assert!(!self.is_empty(), "Cannot sample from empty replay buffer");
        let len = self.data.len();
        (0..batch_size)
            .map(|_| &self.data[rng.random_range(0..len)])
            .collect()
    }
}
