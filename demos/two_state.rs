//! Trains a double-DQN agent on the two-state toy problem.
//!
//! Run with `cargo run --example two_state`; set `RUST_LOG=debug` to also see
//! checkpoint writes.

use deepq::agent::DqnAgent;
use deepq::env::TwoStates;
use deepq::storage;
use deepq::trainer::{TrainerOptions, TrainingResults};
use deepq::Result;
use ndarray::array;
use serde_json::json;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut agent = DqnAgent::from_value(json!({
        "n_state": 2,
        "n_actions": 2,
        "neural_networks": {"policy_net": {"layers": [2, 16, 2]}},
        "optimizers": {"policy_net": {"optimizer": "Adam", "optimizer_args": {"lr": 0.01}}},
        "n_memory": 1000,
        "batch_size": 16,
        "training_stride": 1,
        "saving_stride": 50,
        "n_episodes_max": 2000,
        "solving_threshold_min": 0.5,
        "solving_threshold_mean": 0.5,
        "epsilon_1": 0.05,
        "d_epsilon": 0.02,
        "doubleDQN": true,
    }))?;

    let dir = std::env::temp_dir().join("deepq-two-state");
    std::fs::create_dir_all(&dir)?;
    let model_path = dir.join("model.bin");
    let results_path = dir.join("results.json");

    let options = TrainerOptions::default()
        .verbose(true)
        .model_path(&model_path)
        .results_path(&results_path);
    let results = agent.train(&mut TwoStates::new(0), options)?;

    println!("solved: {}", results.training_completed);
    println!("episodes: {}", results.episode_returns.len());
    for (name, state) in [("first", array![1.0, 0.0]), ("second", array![0.0, 1.0])] {
        println!("greedy action in {} state: {}", name, agent.act(state.view())?);
    }

    let checkpoint = storage::load_checkpoint(&model_path)?;
    println!("checkpoint episodes: {:?}", checkpoint.keys().collect::<Vec<_>>());
    let saved = TrainingResults::load(&results_path)?;
    println!("saved results cover {} episodes in {}", saved.episode_returns.len(), dir.display());
    Ok(())
}
