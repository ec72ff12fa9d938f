//! Action encoding: host coordinate subset ↔ ActionId
//!
//! Fixed action space of size 2^dimension, covering every coordinate subset
//! regardless of legality (the legal ones have at least two members).

use ndarray::{Array1, Array2, Axis};

use crate::types::{ActionId, StepError};

/// Encodes/decodes between host subset choices and discrete ActionIds.
///
/// Packing scheme: coordinate 0 maps to the most significant bit, so the
/// subset {0} in dimension 3 is id 0b100 = 4 and the all-coordinates subset
/// is id 2^dimension - 1.
///
/// The full decode table (2^dimension x dimension) is built once at
/// construction; decoding a batch of ids is a row gather.
#[derive(Clone, Debug)]
pub struct HostActionEncoder {
    dimension: usize,
    table: Array2<f32>,
}

impl HostActionEncoder {
    pub fn new(dimension: usize) -> Self {
        let size = 1usize << dimension;
        let table = Array2::from_shape_fn((size, dimension), |(id, k)| {
            if (id >> (dimension - 1 - k)) & 1 == 1 {
                1.0
            } else {
                0.0
            }
        });
        Self { dimension, table }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Total size of the discrete action space (2^dimension).
    pub fn action_space_size(&self) -> usize {
        self.table.dim().0
    }

    /// Encode a 0/1 subset vector into a discrete ActionId.
    pub fn encode(&self, coords: &[f32]) -> Result<ActionId, StepError> {
        if coords.len() != self.dimension {
            return Err(StepError::InvalidAction(format!(
                "subset vector has {} entries, expected {}",
                coords.len(),
                self.dimension
            )));
        }
        let mut id: ActionId = 0;
        for &c in coords {
            id = (id << 1) | u32::from(c != 0.0);
        }
        Ok(id)
    }

    /// Decode an ActionId into its 0/1 subset vector.
    pub fn decode(&self, action: ActionId) -> Result<Array1<f32>, StepError> {
        if action as usize >= self.action_space_size() {
            return Err(StepError::InvalidAction(format!(
                "action id {action} out of range for dimension {}",
                self.dimension
            )));
        }
        Ok(self.table.row(action as usize).to_owned())
    }

    /// Decode a batch of ActionIds into a (batch, dimension) subset array.
    ///
    /// Hot path: performs no bounds or legality checks. Callers guarantee
    /// the ids come from `encode` or an arg-max over `action_space_size()`
    /// logits.
    pub fn decode_batch(&self, actions: &[ActionId]) -> Array2<f32> {
        let indices: Vec<usize> = actions.iter().map(|&a| a as usize).collect();
        self.table.select(Axis(0), &indices)
    }

    /// Mask over the action space: true for subsets with at least two
    /// members (the only moves that shrink a game).
    pub fn legal_mask(&self) -> Array1<bool> {
        Array1::from_shape_fn(self.action_space_size(), |id| {
            (id as u32).count_ones() >= 2
        })
    }
}
