//! # Agents
//!
//! An [`Agent`] pairs the algorithm-independent [`AgentCore`] (hyperparameters,
//! networks, optimizers, losses, replay memory) with a [`Policy`] that decides
//! how actions are selected and how the networks learn. [`DqnAgent`] is the
//! deep Q-learning agent, with optional double-DQN targets.
//!
//! ```rust,no_run
//! use deepq::agent::DqnAgent;
//! use deepq::config::AgentConfig;
//! use ndarray::array;
//!
//! let config = AgentConfig::new(4, 2).with_layers(vec![4, 64, 2]);
//! let mut agent = DqnAgent::new(config).unwrap();
//! let action = agent.act(array![0.1, 0.2, -0.3, 0.4].view()).unwrap();
//! assert!(action < 2);
//! ```

pub mod base;
pub mod traits;

mod dqn;
pub use dqn::{DqnPolicy, EpsilonGreedy};
pub use base::{AgentCore, AgentState};
pub use traits::Policy;

use ndarray::ArrayView1;
use serde_json::Value;
use std::path::Path;

use crate::config::AgentConfig;
use crate::env::Environment;
use crate::error::{DqnError, Result};
use crate::replay_buffer::Transition;
use crate::storage;
use crate::trainer::{Trainer, TrainerOptions, TrainingResults};

/// A learning agent: shared core plus a pluggable policy.
#[derive(Debug)]
pub struct Agent<P: Policy> {
    pub(crate) core: AgentCore,
    pub(crate) policy: P,
}

/// Deep Q-network agent.
pub type DqnAgent = Agent<DqnPolicy>;

impl<P: Policy> Agent<P> {
    pub fn new(config: AgentConfig) -> Result<Self> {
        let policy = P::new(&config)?;
        let core = AgentCore::new(config)?;
        Ok(Agent { core, policy })
    }

    /// Build an agent from a parameter document, see [`AgentConfig::from_value`].
    pub fn from_value(parameters: Value) -> Result<Self> {
        Self::new(AgentConfig::from_value(parameters)?)
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    pub fn config(&self) -> &AgentConfig {
        self.core.config()
    }

    pub fn in_training(&self) -> bool {
        self.core.in_training()
    }

    /// Choose an action for `state`. Exploration only happens while training.
    pub fn act(&mut self, state: ArrayView1<f32>) -> Result<usize> {
        self.policy.select_action(&mut self.core, state)
    }

    pub fn add_memory(&mut self, transition: Transition) -> Result<()> {
        self.core.add_memory(transition)
    }

    /// Run one optimization step; `Ok(None)` while memory holds fewer than
    /// `batch_size` transitions.
    pub fn run_optimization_step(&mut self, epoch: usize) -> Result<Option<f32>> {
        self.policy.update(&mut self.core, epoch)
    }

    pub fn evaluate_stopping_criterion(&self, returns: &[f32]) -> (bool, f32, f32) {
        self.core.evaluate_stopping_criterion(returns)
    }

    pub fn number_of_parameters(&self, name: &str) -> Result<usize> {
        self.core.number_of_parameters(name)
    }

    pub fn get_state(&self) -> Result<AgentState> {
        self.core.get_state()
    }

    /// Replace this agent with the one described by `state`.
    ///
    /// Fails with [`DqnError::IncompatibleState`] when the stored state and
    /// action dimensions differ from this agent's. Everything else, including
    /// the replay memory and the exploration schedule, is reinitialized from
    /// the stored parameters.
    pub fn load_state(&mut self, state: &AgentState) -> Result<()> {
        self.core.check_parameter_compatibility(&state.parameters)?;
        let core = AgentCore::from_state(state, self.core.config())?;
        let policy = P::new(core.config())?;
        self.core = core;
        self.policy = policy;
        Ok(())
    }

    /// Load a snapshot from a checkpoint file written during training.
    ///
    /// Picks `episode` if given, otherwise the latest snapshot. Returns the
    /// episode that was loaded.
    pub fn load_from_checkpoint<Q: AsRef<Path>>(&mut self, path: Q, episode: Option<usize>) -> Result<usize> {
        let checkpoint = storage::load_checkpoint(path)?;
        let (episode, state) = match episode {
            Some(episode) => checkpoint
                .get_key_value(&episode)
                .ok_or_else(|| DqnError::configuration("episode", format!("no snapshot for episode {}", episode)))?,
            None => checkpoint
                .iter()
                .next_back()
                .ok_or_else(|| DqnError::configuration("episode", "checkpoint holds no snapshots"))?,
        };
        self.load_state(state)?;
        Ok(*episode)
    }

    /// Train on `env`, see [`Trainer::train`].
    pub fn train<E: Environment>(&mut self, env: &mut E, options: TrainerOptions) -> Result<TrainingResults> {
        Trainer::new(options).train(self, env)
    }
}
