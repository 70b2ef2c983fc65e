use deepq::{
    agent::DqnAgent,
    config::AgentConfig,
    optimizer::OptimizerConfig,
    env::TwoStates,
    storage,
    trainer::{TrainerOptions, TrainingResults},
    DqnError,
};
use ndarray::array;
use serde_json::json;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn two_state_config(seed: u64) -> AgentConfig {
    let mut config = AgentConfig::new(2, 2).with_layers(vec![2, 16, 2]).with_seed(seed);
    config.optimizers.insert(
        "policy_net".to_string(),
        OptimizerConfig::Adam { lr: 0.01, betas: (0.9, 0.999), eps: 1e-8 },
    );
    config.n_memory = 1000;
    config.batch_size = 16;
    config.training_stride = 1;
    config.saving_stride = 50;
    config.n_episodes_max = 2000;
    config.n_solving_episodes = 20;
    config.solving_threshold_min = 0.5;
    config.solving_threshold_mean = 0.5;
    config.epsilon_1 = 0.05;
    config.d_epsilon = 0.02;
    config.doubledqn = true;
    config
}

#[test]
fn test_two_state_agent_learns_rewarding_action() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("model.bin");
    let results_path = dir.path().join("results.json");

    let mut agent = DqnAgent::new(two_state_config(0)).unwrap();
    let options = TrainerOptions::default()
        .verbose(true)
        .model_path(&model_path)
        .results_path(&results_path);
    let results = agent.train(&mut TwoStates::new(0), options).unwrap();

    assert!(results.training_completed);
    assert!(!agent.in_training());
    assert_eq!(agent.act(array![1.0, 0.0].view()).unwrap(), 0);
    assert_eq!(agent.act(array![0.0, 1.0].view()).unwrap(), 0);

    let n_episodes = results.episode_returns.len();
    assert_eq!(results.episode_durations, vec![1; n_episodes]);
    assert_eq!(*results.steps_simulated.last().unwrap(), n_episodes);
    assert!(results.episode_returns[n_episodes - 20..].iter().all(|&r| r == 1.0));

    // The results file is written after the stopping criterion was met
    let saved = TrainingResults::load(&results_path).unwrap();
    assert_eq!(saved, results);

    let checkpoint = storage::load_checkpoint(&model_path).unwrap();
    assert_eq!(checkpoint.keys().next(), Some(&0));
    assert_eq!(checkpoint.keys().next_back(), Some(&(n_episodes - 1)));

    let mut reloaded = DqnAgent::new(two_state_config(99)).unwrap();
    let episode = reloaded.load_from_checkpoint(&model_path, None).unwrap();
    assert_eq!(episode, n_episodes - 1);
    assert_eq!(reloaded.act(array![1.0, 0.0].view()).unwrap(), 0);
    assert_eq!(reloaded.act(array![0.0, 1.0].view()).unwrap(), 0);
    assert_eq!(reloaded.get_state().unwrap(), agent.get_state().unwrap());

    let first = reloaded.load_from_checkpoint(&model_path, Some(0)).unwrap();
    assert_eq!(first, 0);
    assert!(matches!(
        reloaded.load_from_checkpoint(&model_path, Some(n_episodes + 10)),
        Err(DqnError::Configuration { .. })
    ));
}

#[test]
fn test_unsolvable_threshold_runs_all_episodes() {
    init_logger();
    let mut config = two_state_config(1);
    config.n_episodes_max = 30;
    config.solving_threshold_min = 2.0;
    let mut agent = DqnAgent::new(config).unwrap();

    let results = agent.train(&mut TwoStates::new(1), TrainerOptions::default()).unwrap();
    assert!(!results.training_completed);
    assert_eq!(results.episode_returns.len(), 30);
    assert_eq!(results.training_epochs, (1..=30).collect::<Vec<_>>());
}

#[test]
fn test_parameter_document_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parameters.json");
    std::fs::write(
        &path,
        json!({
            "N_STATE": 2,
            "N_ACTIONS": 2,
            "neural_networks": {"policy_net": {"layers": [2, 8, 2], "dropout": true, "p_dropout": 0.2}},
            "losses": {"policy_net": {"loss": "SmoothL1Loss"}},
            "target_net_update_tau": 0.5,
        })
        .to_string(),
    )
    .unwrap();

    let config = AgentConfig::from_file(&path).unwrap();
    assert_eq!(config.neural_networks["target_net"].layers, vec![2, 8, 2]);
    assert!(config.neural_networks["target_net"].dropout);
    assert_eq!(config.target_net_update_tau, 0.5);
    let agent = DqnAgent::new(config).unwrap();
    assert_eq!(agent.number_of_parameters("policy_net").unwrap(), 2 * 8 + 8 + 8 * 2 + 2);

    std::fs::write(&path, json!({"n_state": 2, "n_actions": 2, "target_net_update_tau": 2.0}).to_string()).unwrap();
    assert!(matches!(AgentConfig::from_file(&path), Err(DqnError::Configuration { .. })));
}
