//! RL Environment module for the Hironaka game
//!
//! This module provides:
//! - Host action encoding/decoding (coordinate subset ↔ ActionId)
//! - Policy seams (logits contracts) and baseline players
//! - The fused step engine: paired host/agent moves over a whole batch,
//!   yielding experience for one side per step
//! - Single-game environments for training one side against a fixed
//!   counter-party
//! - Replay buffer, rollout collection and host-strength evaluation
//! - YAML configuration and hyperparameter schedules

mod action_encoder;
mod config;
mod environment;
mod fused_step;
mod policy;
mod replay_buffer;
mod rollout;
mod scheduler;
mod types;

pub use action_encoder::*;
pub use config::*;
pub use environment::*;
pub use fused_step::{FusedStep, RewardFn};
pub use policy::*;
pub use replay_buffer::*;
pub use rollout::*;
pub use scheduler::*;
pub use types::*;
