//! # Agent configuration
//!
//! [`AgentConfig`] is the typed hyperparameter set of an agent. It can be built
//! directly ([`AgentConfig::new`] gives the defaults for a state/action size) or
//! from a JSON parameter document with [`AgentConfig::from_value`], which
//! lowercases the top-level keys and deep-merges the document onto the
//! defaults, so a document only needs to name what it overrides:
//!
//! ```
//! use deepq::config::AgentConfig;
//! use serde_json::json;
//!
//! let config = AgentConfig::from_value(json!({
//!     "N_STATE": 4,
//!     "n_actions": 2,
//!     "optimizers": {"policy_net": {"optimizer_args": {"lr": 0.0005}}},
//!     "doubleDQN": true,
//! })).unwrap();
//! assert_eq!(config.batch_size, 32);
//! assert!(config.doubledqn);
//! ```

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{DqnError, Result};
use crate::loss::LossConfig;
use crate::optimizer::OptimizerConfig;

pub const POLICY_NET: &str = "policy_net";
pub const TARGET_NET: &str = "target_net";

fn default_p_dropout() -> f32 {
    0.5
}

/// Architecture of one named network.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NetworkConfig {
    /// Layer widths `[n_state, hidden..., n_actions]`
    pub layers: Vec<usize>,
    #[serde(default)]
    pub dropout: bool,
    #[serde(default = "default_p_dropout")]
    pub p_dropout: f32,
}

impl NetworkConfig {
    pub fn new(layers: Vec<usize>) -> Self {
        NetworkConfig { layers, dropout: false, p_dropout: default_p_dropout() }
    }

    pub fn with_dropout(mut self, p_dropout: f32) -> Self {
        self.dropout = true;
        self.p_dropout = p_dropout;
        self
    }
}

/// Hyperparameters of a (double) DQN agent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AgentConfig {
    pub n_state: usize,
    pub n_actions: usize,
    pub neural_networks: BTreeMap<String, NetworkConfig>,
    pub optimizers: BTreeMap<String, OptimizerConfig>,
    pub losses: BTreeMap<String, LossConfig>,
    /// Replay memory capacity
    pub n_memory: usize,
    /// Environment steps between two optimization steps
    pub training_stride: usize,
    pub batch_size: usize,
    /// Episodes between two checkpoints
    pub saving_stride: usize,
    pub n_episodes_max: usize,
    /// Window of recent episodes the stopping criterion looks at
    pub n_solving_episodes: usize,
    pub solving_threshold_min: f32,
    pub solving_threshold_mean: f32,
    pub discount_factor: f32,
    /// Optimization steps between two target network updates
    pub target_net_update_stride: usize,
    /// Soft update rate in `[0, 1]`; 1 copies the policy network
    pub target_net_update_tau: f32,
    /// Initial exploration probability
    pub epsilon: f32,
    /// Exploration floor
    pub epsilon_1: f32,
    /// Linear exploration decay per optimization step
    pub d_epsilon: f32,
    pub doubledqn: bool,
    /// Seed for weight initialization, dropout masks, exploration and replay
    /// sampling
    #[serde(default)]
    pub seed: Option<u64>,
}

impl AgentConfig {
    /// Default hyperparameters for the given state and action sizes.
    pub fn new(n_state: usize, n_actions: usize) -> Self {
        let layers = vec![n_state, 128, 32, n_actions];
        let mut neural_networks = BTreeMap::new();
        neural_networks.insert(POLICY_NET.to_string(), NetworkConfig::new(layers.clone()));
        neural_networks.insert(TARGET_NET.to_string(), NetworkConfig::new(layers));

        let mut optimizers = BTreeMap::new();
        optimizers.insert(POLICY_NET.to_string(), OptimizerConfig::default());

        let mut losses = BTreeMap::new();
        losses.insert(POLICY_NET.to_string(), LossConfig::default());

        AgentConfig {
            n_state,
            n_actions,
            neural_networks,
            optimizers,
            losses,
            n_memory: 20000,
            training_stride: 5,
            batch_size: 32,
            saving_stride: 100,
            n_episodes_max: 10000,
            n_solving_episodes: 20,
            solving_threshold_min: 200.0,
            solving_threshold_mean: 230.0,
            discount_factor: 0.99,
            target_net_update_stride: 1,
            target_net_update_tau: 1e-2,
            epsilon: 1.0,
            epsilon_1: 0.1,
            d_epsilon: 0.00005,
            doubledqn: false,
            seed: None,
        }
    }

    /// Replace both the policy and the target architecture.
    pub fn with_layers(mut self, layers: Vec<usize>) -> Self {
        for name in [POLICY_NET, TARGET_NET] {
            self.neural_networks.insert(name.to_string(), NetworkConfig::new(layers.clone()));
        }
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build a configuration from a parameter document.
    ///
    /// Top-level keys are lowercased, then the document is merged onto the
    /// defaults for its `n_state`/`n_actions`: nested maps are merged key by
    /// key and the document wins at every level. A `target_net` the document
    /// does not describe copies the merged `policy_net` architecture.
    pub fn from_value(parameters: Value) -> Result<Self> {
        let Value::Object(document) = parameters else {
            return Err(DqnError::configuration("parameters", "expected a map of parameters"));
        };
        let document: Map<String, Value> = document
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();

        let n_state = required_dimension(&document, "n_state")?;
        let n_actions = required_dimension(&document, "n_actions")?;
        let user_sets_target = document
            .get("neural_networks")
            .and_then(|networks| networks.get(TARGET_NET))
            .is_some();

        let mut merged = serde_json::to_value(AgentConfig::new(n_state, n_actions))?;
        deep_merge(&mut merged, Value::Object(document));

        if !user_sets_target {
            if let Some(networks) = merged.get_mut("neural_networks").and_then(Value::as_object_mut) {
                if let Some(policy) = networks.get(POLICY_NET).cloned() {
                    networks.insert(TARGET_NET.to_string(), policy);
                }
            }
        }

        let config: AgentConfig = serde_json::from_value(merged)
            .map_err(|e| DqnError::configuration("parameters", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The full parameter document, as embedded in agent checkpoints.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Check every hyperparameter, failing on the first invalid one.
    pub fn validate(&self) -> Result<()> {
        if self.n_state == 0 {
            return Err(DqnError::configuration("n_state", "must be positive"));
        }
        if self.n_actions == 0 {
            return Err(DqnError::configuration("n_actions", "must be positive"));
        }

        for name in [POLICY_NET, TARGET_NET] {
            if !self.neural_networks.contains_key(name) {
                return Err(DqnError::configuration(
                    format!("neural_networks.{}", name),
                    "network is required",
                ));
            }
        }
        for (name, network) in &self.neural_networks {
            self.validate_network(name, network)?;
        }
        if self.neural_networks[POLICY_NET].layers != self.neural_networks[TARGET_NET].layers {
            return Err(DqnError::configuration(
                "neural_networks.target_net",
                "target network must have the same layers as the policy network",
            ));
        }

        for (name, optimizer) in &self.optimizers {
            self.require_network("optimizers", name)?;
            optimizer.validate(name)?;
        }
        for (name, loss) in &self.losses {
            self.require_network("losses", name)?;
            loss.validate(name)?;
        }
        if !self.optimizers.contains_key(POLICY_NET) {
            return Err(DqnError::configuration("optimizers.policy_net", "optimizer is required"));
        }
        if !self.losses.contains_key(POLICY_NET) {
            return Err(DqnError::configuration("losses.policy_net", "loss is required"));
        }

        for (name, value) in [
            ("n_memory", self.n_memory),
            ("training_stride", self.training_stride),
            ("batch_size", self.batch_size),
            ("saving_stride", self.saving_stride),
            ("n_episodes_max", self.n_episodes_max),
            ("n_solving_episodes", self.n_solving_episodes),
            ("target_net_update_stride", self.target_net_update_stride),
        ] {
            if value == 0 {
                return Err(DqnError::configuration(name, "must be greater than 0"));
            }
        }
        if self.batch_size > self.n_memory {
            return Err(DqnError::configuration(
                "batch_size",
                format!("{} exceeds the replay memory size n_memory = {}", self.batch_size, self.n_memory),
            ));
        }

        if !(0.0..=1.0).contains(&self.target_net_update_tau) {
            return Err(DqnError::configuration(
                "target_net_update_tau",
                format!("has to be between 0 and 1, but value {} has been passed", self.target_net_update_tau),
            ));
        }
        for (name, value) in [
            ("discount_factor", self.discount_factor),
            ("epsilon", self.epsilon),
            ("epsilon_1", self.epsilon_1),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DqnError::configuration(name, format!("has to be between 0 and 1, got {}", value)));
            }
        }
        if !(self.d_epsilon >= 0.0 && self.d_epsilon.is_finite()) {
            return Err(DqnError::configuration("d_epsilon", format!("must be non-negative, got {}", self.d_epsilon)));
        }
        if self.solving_threshold_min.is_nan() || self.solving_threshold_mean.is_nan() {
            return Err(DqnError::configuration("solving_threshold", "thresholds must be numbers"));
        }
        Ok(())
    }

    fn validate_network(&self, name: &str, network: &NetworkConfig) -> Result<()> {
        let key = format!("neural_networks.{}", name);
        let layers = &network.layers;
        if layers.len() < 2 || layers.contains(&0) {
            return Err(DqnError::configuration(
                key,
                format!("layers need at least two positive widths, got {:?}", layers),
            ));
        }
        if layers[0] != self.n_state || layers[layers.len() - 1] != self.n_actions {
            return Err(DqnError::configuration(
                key,
                format!(
                    "layers {:?} must start with n_state = {} and end with n_actions = {}",
                    layers, self.n_state, self.n_actions
                ),
            ));
        }
        if network.dropout && !(0.0..1.0).contains(&network.p_dropout) {
            return Err(DqnError::configuration(
                key,
                format!("p_dropout must be in [0, 1), got {}", network.p_dropout),
            ));
        }
        Ok(())
    }

    fn require_network(&self, section: &str, name: &str) -> Result<()> {
        if self.neural_networks.contains_key(name) {
            Ok(())
        } else {
            Err(DqnError::configuration(
                format!("{}.{}", section, name),
                "no network with this name",
            ))
        }
    }
}

fn required_dimension(document: &Map<String, Value>, key: &str) -> Result<usize> {
    let value = document
        .get(key)
        .ok_or_else(|| DqnError::configuration(key, "required parameter is missing"))?;
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| DqnError::configuration(key, format!("expected a non-negative integer, got {}", value)))
}

/// Merge `overrides` into `base`; maps merge recursively, anything else is
/// replaced by the override.
pub fn deep_merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::new(8, 4);
        config.validate().unwrap();
        assert_eq!(config.neural_networks[POLICY_NET].layers, vec![8, 128, 32, 4]);
        assert_eq!(config.neural_networks[TARGET_NET].layers, vec![8, 128, 32, 4]);
        assert_eq!(config.optimizers[POLICY_NET], OptimizerConfig::default());
        assert_eq!(config.losses[POLICY_NET], LossConfig::Mse);
    }

    #[test]
    fn test_missing_dimensions() {
        let err = AgentConfig::from_value(json!({"n_state": 4})).unwrap_err();
        assert!(matches!(err, DqnError::Configuration { ref name, .. } if name == "n_actions"));

        let err = AgentConfig::from_value(json!({"n_actions": 2})).unwrap_err();
        assert!(matches!(err, DqnError::Configuration { ref name, .. } if name == "n_state"));
    }

    #[test]
    fn test_top_level_keys_are_lowercased() {
        let config = AgentConfig::from_value(json!({
            "N_State": 3,
            "N_ACTIONS": 2,
            "Batch_Size": 7,
        }))
        .unwrap();
        assert_eq!(config.n_state, 3);
        assert_eq!(config.batch_size, 7);
    }

    #[test]
    fn test_deep_merge_keeps_nested_defaults() {
        let config = AgentConfig::from_value(json!({
            "n_state": 2,
            "n_actions": 2,
            "optimizers": {"policy_net": {"optimizer_args": {"lr": 0.25}}},
        }))
        .unwrap();
        match &config.optimizers[POLICY_NET] {
            OptimizerConfig::RmsProp { lr, alpha, .. } => {
                assert_eq!(*lr, 0.25);
                assert_eq!(*alpha, 0.99);
            }
            other => panic!("unexpected optimizer {:?}", other),
        }
        assert_eq!(config.losses[POLICY_NET], LossConfig::Mse);
    }

    #[test]
    fn test_optimizer_kind_switch() {
        let config = AgentConfig::from_value(json!({
            "n_state": 2,
            "n_actions": 2,
            "optimizers": {"policy_net": {"optimizer": "Adam", "optimizer_args": {"lr": 0.01}}},
            "losses": {"policy_net": {"loss": "HuberLoss"}},
        }))
        .unwrap();
        assert!(matches!(config.optimizers[POLICY_NET], OptimizerConfig::Adam { lr, .. } if lr == 0.01));
        assert_eq!(config.losses[POLICY_NET], LossConfig::Huber { delta: 1.0 });
    }

    #[test]
    fn test_unknown_optimizer_kind() {
        let err = AgentConfig::from_value(json!({
            "n_state": 2,
            "n_actions": 2,
            "optimizers": {"policy_net": {"optimizer": "Adagrad"}},
        }))
        .unwrap_err();
        assert!(matches!(err, DqnError::Configuration { .. }));
    }

    #[test]
    fn test_target_net_follows_custom_policy_layers() {
        let config = AgentConfig::from_value(json!({
            "n_state": 2,
            "n_actions": 3,
            "neural_networks": {"policy_net": {"layers": [2, 16, 3]}},
        }))
        .unwrap();
        assert_eq!(config.neural_networks[TARGET_NET].layers, vec![2, 16, 3]);
    }

    #[test]
    fn test_tau_out_of_range() {
        for tau in [-0.1, 1.5] {
            let err = AgentConfig::from_value(json!({
                "n_state": 2,
                "n_actions": 2,
                "target_net_update_tau": tau,
            }))
            .unwrap_err();
            assert!(matches!(err, DqnError::Configuration { ref name, .. } if name == "target_net_update_tau"));
        }
        for tau in [0.0, 1.0] {
            let mut config = AgentConfig::new(2, 2);
            config.target_net_update_tau = tau;
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_batch_must_fit_in_memory() {
        let err = AgentConfig::from_value(json!({
            "n_state": 2,
            "n_actions": 2,
            "n_memory": 16,
            "batch_size": 17,
        }))
        .unwrap_err();
        assert!(matches!(err, DqnError::Configuration { ref name, .. } if name == "batch_size"));

        let mut config = AgentConfig::new(2, 2);
        config.n_memory = 16;
        config.batch_size = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dangling_optimizer_reference() {
        let mut config = AgentConfig::new(2, 2);
        config.optimizers.insert("value_net".to_string(), OptimizerConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layer_widths_must_match_dimensions() {
        let config = AgentConfig::new(4, 2).with_layers(vec![3, 8, 2]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        let config = AgentConfig::new(6, 3).with_layers(vec![6, 10, 3]).with_seed(11);
        config.to_file(&path).unwrap();
        assert_eq!(AgentConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_deep_merge_replaces_non_maps() {
        let mut base = json!({"a": {"b": 1, "c": [1, 2]}, "d": 3});
        deep_merge(&mut base, json!({"a": {"c": [9]}, "e": true}));
        assert_eq!(base, json!({"a": {"b": 1, "c": [9]}, "d": 3, "e": true}));
    }
}
