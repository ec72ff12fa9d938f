//! Hironaka Game Engine and RL Environment
//!
//! A batched state engine for the Hironaka host/agent game, designed for RL
//! training.
//!
//! This crate re-exports the engine and rl-env crates for convenience.

pub use hironaka_engine::*;
pub use hironaka_rl_env as rl_env;
