use ndarray::{Array1, Array2};
use rand::Rng;
use rand::seq::index;
use serde::{Serialize, Deserialize};
use std::collections::VecDeque;

use crate::error::{DqnError, Result};

/// One observed `(state, action, next_state, reward, done)` step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Array1<f32>,
    pub action: usize,
    pub next_state: Array1<f32>,
    pub reward: f32,
    pub done: bool,
}

impl Transition {
    pub fn new(state: Array1<f32>, action: usize, next_state: Array1<f32>, reward: f32, done: bool) -> Self {
        Transition { state, action, next_state, reward, done }
    }
}

/// A sampled minibatch stacked into arrays, one row per transition.
#[derive(Clone, Debug)]
pub struct TransitionBatch {
    pub states: Array2<f32>,
    pub actions: Vec<usize>,
    pub next_states: Array2<f32>,
    pub rewards: Array1<f32>,
    pub dones: Vec<bool>,
}

impl TransitionBatch {
    pub fn from_transitions(transitions: &[&Transition]) -> Result<Self> {
        let first = transitions.first().ok_or(DqnError::InsufficientData { requested: 1, available: 0 })?;
        let n_state = first.state.len();
        let batch_size = transitions.len();

        let mut states = Array2::zeros((batch_size, n_state));
        let mut next_states = Array2::zeros((batch_size, n_state));
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Array1::zeros(batch_size);
        let mut dones = Vec::with_capacity(batch_size);

        for (i, transition) in transitions.iter().enumerate() {
            if transition.state.len() != n_state || transition.next_state.len() != n_state {
                return Err(DqnError::dimension_mismatch(
                    format!("states of length {}", n_state),
                    format!("{} and {}", transition.state.len(), transition.next_state.len()),
                ));
            }
            states.row_mut(i).assign(&transition.state);
            next_states.row_mut(i).assign(&transition.next_state);
            actions.push(transition.action);
            rewards[i] = transition.reward;
            dones.push(transition.done);
        }

        Ok(TransitionBatch { states, actions, next_states, rewards, dones })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Fixed-capacity experience memory.
///
/// Pushing into a full buffer evicts the oldest transition. Sampling is
/// uniform and without replacement within one draw.
#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DqnError::configuration("n_memory", "capacity must be greater than 0"));
        }
        Ok(ReplayBuffer {
            buffer: VecDeque::with_capacity(capacity.min(1 << 16)),
            capacity,
        })
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Draw `batch_size` distinct transitions uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&Transition>> {
        if self.buffer.len() < batch_size {
            return Err(DqnError::InsufficientData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }
        Ok(index::sample(rng, self.buffer.len(), batch_size)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect())
    }

    /// Sample and stack `batch_size` transitions.
    pub fn sample_batch<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<TransitionBatch> {
        TransitionBatch::from_transitions(&self.sample(batch_size, rng)?)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Stored transitions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }
}
