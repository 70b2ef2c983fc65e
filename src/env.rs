//! Environment interface used by the [`Trainer`](crate::trainer::Trainer).

use ndarray::{array, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{DqnError, Result};

/// Outcome of one environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct Step<I> {
    pub next_state: Array1<f32>,
    pub reward: f32,
    /// The episode reached a terminal state
    pub terminated: bool,
    /// The episode was cut short (time limit and the like)
    pub truncated: bool,
    pub info: I,
}

impl<I> Step<I> {
    pub fn new(next_state: Array1<f32>, reward: f32, terminated: bool, truncated: bool, info: I) -> Self {
        Step { next_state, reward, terminated, truncated, info }
    }

    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// A discrete-action environment with vector observations.
pub trait Environment {
    /// Auxiliary information returned with each observation.
    type Info;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<(Array1<f32>, Self::Info)>;

    /// Apply `action` to the current episode.
    fn step(&mut self, action: usize) -> Result<Step<Self::Info>>;
}

/// Two one-hot states and two actions. Action 0 pays +1, action 1 pays -1;
/// either one ends the episode.
#[derive(Clone, Debug)]
pub struct TwoStates {
    state: Array1<f32>,
    rng: StdRng,
}

impl TwoStates {
    pub fn new(seed: u64) -> Self {
        TwoStates { state: array![1.0, 0.0], rng: StdRng::seed_from_u64(seed) }
    }
}

impl Environment for TwoStates {
    type Info = ();

    fn reset(&mut self) -> Result<(Array1<f32>, ())> {
        self.state = if self.rng.gen_bool(0.5) { array![1.0, 0.0] } else { array![0.0, 1.0] };
        Ok((self.state.clone(), ()))
    }

    fn step(&mut self, action: usize) -> Result<Step<()>> {
        let reward = match action {
            0 => 1.0,
            1 => -1.0,
            _ => return Err(DqnError::InvalidAction { action, max_actions: 2 }),
        };
        Ok(Step::new(self.state.clone(), reward, true, false, ()))
    }
}
