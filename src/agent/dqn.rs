use log::debug;
use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::config::{AgentConfig, POLICY_NET, TARGET_NET};
use crate::error::{DqnError, Result};
use crate::layers::Mode;
use crate::loss::Loss;
use crate::optimizer::Optimizer;
use crate::replay_buffer::TransitionBatch;
use super::base::{named_network, AgentCore};
use super::traits::Policy;

/// Linearly decaying exploration rate with a floor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct EpsilonGreedy {
    pub epsilon: f32,
    pub epsilon_min: f32,
    pub d_epsilon: f32,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f32, epsilon_min: f32, d_epsilon: f32) -> Self {
        EpsilonGreedy { epsilon, epsilon_min, d_epsilon }
    }

    pub fn decay(&mut self) {
        self.epsilon = (self.epsilon - self.d_epsilon).max(self.epsilon_min);
    }
}

/// Deep Q-learning with a soft-updated target network and optional
/// double-DQN targets.
///
/// Vanilla targets bootstrap from `max_a target_net(s')[a]`. Double targets
/// let `policy_net` pick the next action and `target_net` evaluate it, which
/// reduces the overestimation of the max operator.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DqnPolicy {
    pub exploration: EpsilonGreedy,
    pub double_dqn: bool,
    pub discount_factor: f32,
    pub target_update_stride: usize,
    pub tau: f32,
}

impl DqnPolicy {
    pub fn epsilon(&self) -> f32 {
        self.exploration.epsilon
    }

    /// Blend `policy_net` into `target_net` with rate `tau`.
    pub fn update_target_network(&self, core: &mut AgentCore) -> Result<()> {
        let mut target = core
            .networks
            .remove(TARGET_NET)
            .ok_or_else(|| DqnError::configuration("neural_networks.target_net", "network is required"))?;
        let result = core.policy_net().and_then(|policy| target.soft_update_from(policy, self.tau));
        core.networks.insert(TARGET_NET.to_string(), target);
        result
    }
}

/// Index of the largest value; ties go to the first index.
pub(crate) fn greedy_action(q_values: ArrayView1<f32>) -> Result<usize> {
    if q_values.iter().any(|q| q.is_nan()) {
        return Err(DqnError::Numerical(format!("action values contain NaN: {}", q_values)));
    }
    let mut best = 0;
    for (i, &q) in q_values.iter().enumerate() {
        if q > q_values[best] {
            best = i;
        }
    }
    Ok(best)
}

impl Policy for DqnPolicy {
    fn new(config: &AgentConfig) -> Result<Self> {
        Ok(DqnPolicy {
            exploration: EpsilonGreedy::new(config.epsilon, config.epsilon_1, config.d_epsilon),
            double_dqn: config.doubledqn,
            discount_factor: config.discount_factor,
            target_update_stride: config.target_net_update_stride,
            tau: config.target_net_update_tau,
        })
    }

    fn select_action(&mut self, core: &mut AgentCore, state: ArrayView1<f32>) -> Result<usize> {
        core.check_state_input(state)?;
        let epsilon = if core.in_training() { self.exploration.epsilon } else { 0.0 };
        if epsilon > 0.0 && core.rng.gen::<f32>() < epsilon {
            let n_actions = core.config.n_actions;
            return Ok(core.rng.gen_range(0..n_actions));
        }
        let q_values = named_network(&core.networks, POLICY_NET)?.forward(state, Mode::Eval, &mut core.rng);
        greedy_action(q_values.view())
    }

    fn compute_target(&self, core: &mut AgentCore, batch: &TransitionBatch) -> Result<Array2<f32>> {
        let target_net = named_network(&core.networks, TARGET_NET)?;
        let next_q = target_net.forward_batch(batch.next_states.view(), Mode::Eval, &mut core.rng);

        let bootstrap: Vec<f32> = if self.double_dqn {
            let selector = named_network(&core.networks, POLICY_NET)?.forward_batch(
                batch.next_states.view(),
                Mode::Train,
                &mut core.rng,
            );
            selector
                .outer_iter()
                .zip(next_q.outer_iter())
                .map(|(select_row, eval_row)| Ok(eval_row[greedy_action(select_row)?]))
                .collect::<Result<_>>()?
        } else {
            next_q
                .outer_iter()
                .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
                .collect()
        };

        let mut targets = Array2::zeros((batch.len(), 1));
        for (i, q_next) in bootstrap.into_iter().enumerate() {
            targets[[i, 0]] = if batch.dones[i] {
                batch.rewards[i]
            } else {
                q_next * self.discount_factor + batch.rewards[i]
            };
        }
        Ok(targets)
    }

    fn update(&mut self, core: &mut AgentCore, epoch: usize) -> Result<Option<f32>> {
        let batch_size = core.config.batch_size;
        if core.memory.len() < batch_size {
            debug!("Skipping optimization step {}: {} of {} transitions stored", epoch, core.memory.len(), batch_size);
            return Ok(None);
        }

        let batch = core.sample_batch()?;
        let targets = self.compute_target(core, &batch)?;

        let loss_fn = core
            .losses
            .get(POLICY_NET)
            .ok_or_else(|| DqnError::configuration("losses.policy_net", "loss is required"))?;
        let policy = core
            .networks
            .get_mut(POLICY_NET)
            .ok_or_else(|| DqnError::configuration("neural_networks.policy_net", "network is required"))?;

        let (q_values, trace) = policy.forward_traced(batch.states.view(), Mode::Train, &mut core.rng);
        let mut predictions = Array2::zeros((batch.len(), 1));
        for (i, &action) in batch.actions.iter().enumerate() {
            predictions[[i, 0]] = q_values[[i, action]];
        }

        let loss = loss_fn.compute_batch(predictions.view(), targets.view());
        if !loss.is_finite() {
            return Err(DqnError::Numerical(format!("non-finite loss {} at optimization step {}", loss, epoch)));
        }

        let prediction_errors = loss_fn.gradient_batch(predictions.view(), targets.view());
        let mut output_errors = Array2::zeros(q_values.raw_dim());
        for ((i, &action), error) in batch.actions.iter().enumerate().zip(prediction_errors.index_axis(Axis(1), 0)) {
            output_errors[[i, action]] = *error;
        }
        let gradients = policy.backward(&trace, output_errors.view())?;

        core.optimizers
            .get_mut(POLICY_NET)
            .ok_or_else(|| DqnError::configuration("optimizers.policy_net", "optimizer is required"))?
            .step(policy, &gradients)?;

        self.exploration.decay();

        if epoch % self.target_update_stride == 0 {
            self.update_target_network(core)?;
        }
        Ok(Some(loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activations::Activation;
    use crate::layers::DenseLayer;
    use crate::network::NeuralNetwork;
    use ndarray::{array, Array1};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn linear_network(weights: Array2<f32>) -> NeuralNetwork {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = DenseLayer::new(2, 2, Activation::Linear, &mut rng)
            .with_weights(weights)
            .unwrap()
            .with_biases(Array1::zeros(2))
            .unwrap();
        NeuralNetwork::from_layers(vec![layer]).unwrap()
    }

    fn core_with_disagreeing_networks() -> AgentCore {
        let config = AgentConfig::new(2, 2).with_layers(vec![2, 2]).with_seed(1);
        let mut core = AgentCore::new(config).unwrap();
        core.networks.insert(POLICY_NET.to_string(), linear_network(array![[1.0, 0.0], [0.0, 1.0]]));
        core.networks.insert(TARGET_NET.to_string(), linear_network(array![[0.0, 1.0], [1.0, 0.0]]));
        core
    }

    fn batch(done: bool) -> TransitionBatch {
        TransitionBatch {
            states: array![[0.0, 1.0]],
            actions: vec![0],
            next_states: array![[1.0, 0.0]],
            rewards: array![0.5],
            dones: vec![done],
        }
    }

    #[test]
    fn test_epsilon_decay_floor() {
        let mut exploration = EpsilonGreedy::new(1.0, 0.1, 0.1);
        for _ in 0..9 {
            exploration.decay();
        }
        assert_eq!(exploration.epsilon, 0.1);
        for _ in 0..11 {
            exploration.decay();
        }
        assert_eq!(exploration.epsilon, 0.1);
    }

    #[test]
    fn test_greedy_action_ties_go_first() {
        assert_eq!(greedy_action(array![1.0, 3.0, 3.0].view()).unwrap(), 1);
        assert_eq!(greedy_action(array![2.0, 2.0].view()).unwrap(), 0);
        assert!(greedy_action(array![f32::NAN, 1.0].view()).is_err());
    }

    #[test]
    fn test_double_and_vanilla_targets_differ() {
        let mut core = core_with_disagreeing_networks();
        let mut policy = DqnPolicy::new(core.config()).unwrap();
        policy.discount_factor = 0.5;

        policy.double_dqn = false;
        let vanilla = policy.compute_target(&mut core, &batch(false)).unwrap();
        policy.double_dqn = true;
        let double = policy.compute_target(&mut core, &batch(false)).unwrap();

        // target_net(s') = [0, 1]; policy_net picks action 0
        assert_eq!(vanilla[[0, 0]], 1.0 * 0.5 + 0.5);
        assert_eq!(double[[0, 0]], 0.0 * 0.5 + 0.5);
    }

    #[test]
    fn test_terminal_target_is_reward() {
        let mut core = core_with_disagreeing_networks();
        let mut policy = DqnPolicy::new(core.config()).unwrap();
        for double_dqn in [false, true] {
            policy.double_dqn = double_dqn;
            let targets = policy.compute_target(&mut core, &batch(true)).unwrap();
            assert_eq!(targets.dim(), (1, 1));
            assert_eq!(targets[[0, 0]], 0.5);
        }
    }

    #[test]
    fn test_soft_update_extremes() {
        let mut core = core_with_disagreeing_networks();
        let mut policy = DqnPolicy::new(core.config()).unwrap();

        policy.tau = 0.0;
        let before = core.network(TARGET_NET).unwrap().clone();
        policy.update_target_network(&mut core).unwrap();
        assert_eq!(core.network(TARGET_NET).unwrap(), &before);

        policy.tau = 1.0;
        policy.update_target_network(&mut core).unwrap();
        assert_eq!(
            core.network(TARGET_NET).unwrap().state_dict(),
            core.network(POLICY_NET).unwrap().state_dict()
        );
    }

    #[test]
    fn test_idle_agent_acts_greedily() {
        let mut core = core_with_disagreeing_networks();
        let mut policy = DqnPolicy::new(core.config()).unwrap();
        assert_eq!(policy.epsilon(), 1.0);
        for _ in 0..20 {
            assert_eq!(policy.select_action(&mut core, array![0.0, 1.0].view()).unwrap(), 1);
            assert_eq!(policy.select_action(&mut core, array![1.0, 0.0].view()).unwrap(), 0);
        }
        assert!(policy.select_action(&mut core, array![1.0].view()).is_err());
    }

    #[test]
    fn test_update_skips_until_batch_available() {
        let mut core = core_with_disagreeing_networks();
        let mut policy = DqnPolicy::new(core.config()).unwrap();
        assert_eq!(policy.update(&mut core, 0).unwrap(), None);
        assert_eq!(policy.epsilon(), 1.0);
    }
}
