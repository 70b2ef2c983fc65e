use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::{AgentConfig, POLICY_NET};
use crate::error::{DqnError, Result};
use crate::loss::LossWrapper;
use crate::network::{NetworkState, NeuralNetwork};
use crate::optimizer::OptimizerWrapper;
use crate::replay_buffer::{ReplayBuffer, Transition, TransitionBatch};

/// Full snapshot of an agent: hyperparameters, weights and optimizer moments.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AgentState {
    /// Parameter document the agent was built from
    #[serde(with = "json_document")]
    pub parameters: Value,
    pub networks: BTreeMap<String, NetworkState>,
    pub optimizers: BTreeMap<String, OptimizerWrapper>,
}

/// Parameter documents are stored as JSON text so that binary checkpoints
/// keep them self-describing.
mod json_document {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        let text = String::deserialize(deserializer)?;
        serde_json::from_str(&text).map_err(D::Error::custom)
    }
}

/// Look up a network by name in an ensemble borrowed apart from the rest of
/// the core.
pub(crate) fn named_network<'a>(networks: &'a BTreeMap<String, NeuralNetwork>, name: &str) -> Result<&'a NeuralNetwork> {
    networks
        .get(name)
        .ok_or_else(|| DqnError::configuration(format!("neural_networks.{}", name), "no network with this name"))
}

/// Algorithm-independent agent state: hyperparameters, the network, optimizer
/// and loss ensembles, replay memory and the random source.
#[derive(Debug)]
pub struct AgentCore {
    pub(crate) config: AgentConfig,
    pub(crate) networks: BTreeMap<String, NeuralNetwork>,
    pub(crate) optimizers: BTreeMap<String, OptimizerWrapper>,
    pub(crate) losses: BTreeMap<String, LossWrapper>,
    pub(crate) memory: ReplayBuffer,
    pub(crate) rng: StdRng,
    in_training: bool,
}

impl AgentCore {
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let networks = config
            .neural_networks
            .iter()
            .map(|(name, spec)| Ok((name.clone(), NeuralNetwork::from_config(spec, &mut rng)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let mut optimizers = BTreeMap::new();
        for (name, spec) in &config.optimizers {
            let network = networks
                .get(name)
                .ok_or_else(|| DqnError::configuration(format!("optimizers.{}", name), "no network with this name"))?;
            optimizers.insert(name.clone(), OptimizerWrapper::from_config(spec, network));
        }

        let losses = config
            .losses
            .iter()
            .map(|(name, spec)| (name.clone(), LossWrapper::from_config(spec)))
            .collect();

        let memory = ReplayBuffer::new(config.n_memory)?;

        Ok(AgentCore {
            config,
            networks,
            optimizers,
            losses,
            memory,
            rng,
            in_training: false,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn network(&self, name: &str) -> Result<&NeuralNetwork> {
        named_network(&self.networks, name)
    }

    pub fn network_mut(&mut self, name: &str) -> Result<&mut NeuralNetwork> {
        self.networks
            .get_mut(name)
            .ok_or_else(|| DqnError::configuration(format!("neural_networks.{}", name), "no network with this name"))
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn in_training(&self) -> bool {
        self.in_training
    }

    pub(crate) fn set_in_training(&mut self, in_training: bool) {
        self.in_training = in_training;
    }

    pub fn number_of_parameters(&self, name: &str) -> Result<usize> {
        Ok(self.network(name)?.num_parameters())
    }

    pub(crate) fn check_state_input(&self, state: ArrayView1<f32>) -> Result<()> {
        if state.len() != self.config.n_state {
            return Err(DqnError::dimension_mismatch(
                format!("state of length {}", self.config.n_state),
                format!("state of length {}", state.len()),
            ));
        }
        Ok(())
    }

    /// Store a transition, evicting the oldest one when memory is full.
    pub fn add_memory(&mut self, transition: Transition) -> Result<()> {
        self.check_state_input(transition.state.view())?;
        self.check_state_input(transition.next_state.view())?;
        if transition.action >= self.config.n_actions {
            return Err(DqnError::InvalidAction {
                action: transition.action,
                max_actions: self.config.n_actions,
            });
        }
        self.memory.push(transition);
        Ok(())
    }

    /// Draw a minibatch of `batch_size` transitions from memory.
    pub fn sample_batch(&mut self) -> Result<TransitionBatch> {
        self.memory.sample_batch(self.config.batch_size, &mut self.rng)
    }

    pub fn get_state(&self) -> Result<AgentState> {
        Ok(AgentState {
            parameters: self.config.to_value()?,
            networks: self
                .networks
                .iter()
                .map(|(name, network)| (name.clone(), network.state_dict()))
                .collect(),
            optimizers: self.optimizers.clone(),
        })
    }

    /// Compare the dimensions of a parameter document with this agent.
    ///
    /// A dimension the document does not mention is accepted.
    pub fn check_parameter_compatibility(&self, parameters: &Value) -> Result<()> {
        for (key, expected) in [("n_state", self.config.n_state), ("n_actions", self.config.n_actions)] {
            let provided = match parameters.get(key) {
                Some(value) => value,
                None => continue,
            };
            if provided.as_u64() != Some(expected as u64) {
                return Err(DqnError::incompatible_state(key, provided, expected));
            }
        }
        Ok(())
    }

    /// Rebuild a core from a snapshot: full initialization from the embedded
    /// parameters, then weights and optimizer moments are restored.
    pub fn from_state(state: &AgentState, fallback: &AgentConfig) -> Result<Self> {
        let mut parameters = state.parameters.clone();
        if let Value::Object(document) = &mut parameters {
            document.entry("n_state").or_insert_with(|| fallback.n_state.into());
            document.entry("n_actions").or_insert_with(|| fallback.n_actions.into());
        }
        let mut core = AgentCore::new(AgentConfig::from_value(parameters)?)?;

        for (name, weights) in &state.networks {
            core.network_mut(name)?.load_state_dict(weights)?;
        }
        for (name, optimizer) in &state.optimizers {
            optimizer.check_network(core.network(name)?)?;
            if !core.optimizers.contains_key(name) {
                return Err(DqnError::configuration(format!("optimizers.{}", name), "agent has no optimizer with this name"));
            }
            core.optimizers.insert(name.clone(), optimizer.clone());
        }
        Ok(core)
    }

    /// `(solved, min, mean)` over the last `n_solving_episodes` returns.
    ///
    /// With fewer returns than the window nothing is solved and both
    /// statistics are reported as 0.
    pub fn evaluate_stopping_criterion(&self, returns: &[f32]) -> (bool, f32, f32) {
        let n = self.config.n_solving_episodes;
        if n == 0 || returns.len() < n {
            return (false, 0.0, 0.0);
        }
        let recent = &returns[returns.len() - n..];
        let min = recent.iter().copied().fold(f32::INFINITY, f32::min);
        let mean = recent.iter().sum::<f32>() / n as f32;
        let solved = min > self.config.solving_threshold_min && mean > self.config.solving_threshold_mean;
        (solved, min, mean)
    }

    pub(crate) fn policy_net(&self) -> Result<&NeuralNetwork> {
        self.network(POLICY_NET)
    }
}
