use ndarray::{Array2, ArrayView1};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::replay_buffer::TransitionBatch;
use super::base::AgentCore;

/// Algorithm-specific half of an [`Agent`](super::Agent).
///
/// The shared [`AgentCore`] owns networks, optimizers and memory; a policy
/// decides how actions are chosen and how the core's networks are trained.
pub trait Policy: Sized {
    /// Build the policy's own state (exploration schedule and the like).
    fn new(config: &AgentConfig) -> Result<Self>;

    /// Choose an action for `state`.
    fn select_action(&mut self, core: &mut AgentCore, state: ArrayView1<f32>) -> Result<usize>;

    /// Regression targets for a sampled batch, shape `(batch, 1)`.
    /// Training-mode passes draw from the core's random source.
    fn compute_target(&self, core: &mut AgentCore, batch: &TransitionBatch) -> Result<Array2<f32>>;

    /// One optimization step. `Ok(None)` when there is not enough data yet.
    fn update(&mut self, core: &mut AgentCore, epoch: usize) -> Result<Option<f32>>;
}
