//! # deepq - Deep Q-learning agents
//!
//! deepq trains value-based reinforcement learning agents on episodic,
//! discrete-action environments. An agent combines a replay memory, a policy
//! network and a soft-updated target network, and learns with vanilla or
//! double-DQN targets under an epsilon-greedy exploration schedule.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deepq::agent::DqnAgent;
//! use deepq::env::TwoStates;
//! use deepq::trainer::TrainerOptions;
//! use serde_json::json;
//!
//! let mut agent = DqnAgent::from_value(json!({
//!     "n_state": 2,
//!     "n_actions": 2,
//!     "neural_networks": {"policy_net": {"layers": [2, 16, 2]}},
//!     "solving_threshold_min": 0.5,
//!     "solving_threshold_mean": 0.5,
//!     "doubledqn": true,
//! })).unwrap();
//!
//! let options = TrainerOptions::default()
//!     .verbose(true)
//!     .model_path("model.bin")
//!     .results_path("results.json");
//! let results = agent.train(&mut TwoStates::new(0), options).unwrap();
//! println!("solved: {}", results.training_completed);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - ReLU and linear activations
//! - [`agent`] - Agent core, the `Policy` trait and the DQN policy
//! - [`config`] - Typed hyperparameters and the JSON parameter document
//! - [`env`] - Environment interface
//! - [`error`] - Error types and result handling
//! - [`layers`] - Dense and dropout layers, weight initialization
//! - [`loss`] - Regression losses
//! - [`network`] - Feed-forward action-value networks
//! - [`optimizer`] - SGD, Adam and RMSprop
//! - [`replay_buffer`] - Experience replay
//! - [`storage`] - Checkpoint and results files
//! - [`trainer`] - Episode loop

pub mod activations;
pub mod agent;
pub mod config;
pub mod env;
pub mod error;
pub mod layers;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod replay_buffer;
pub mod storage;
pub mod trainer;

pub use agent::{Agent, DqnAgent};
pub use config::AgentConfig;
pub use error::{DqnError, Result};

#[cfg(test)]
mod tests;
