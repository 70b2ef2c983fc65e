//! # Optimizers
//!
//! Gradient-step rules for [`NeuralNetwork`] parameters. Every optimizer keeps
//! one moment buffer per layer, shaped like that layer's weights and biases, so
//! its state can be checkpointed and restored together with the network.
//!
//! The set of optimizers is closed: [`OptimizerConfig`] names the kind and its
//! arguments, [`OptimizerWrapper::from_config`] builds the matching state.

use ndarray::{Array1, Array2, Zip};
use serde::{Serialize, Deserialize};

use crate::error::{DqnError, Result};
use crate::layers::LayerGradients;
use crate::network::NeuralNetwork;

pub trait Optimizer {
    /// Apply one update to `network` using freshly computed `gradients`
    /// (one entry per dense layer, in layer order).
    fn step(&mut self, network: &mut NeuralNetwork, gradients: &[LayerGradients]) -> Result<()>;

    fn learning_rate(&self) -> f32;
}

fn default_lr() -> f32 {
    1e-3
}

fn default_rmsprop_alpha() -> f32 {
    0.99
}

fn default_eps() -> f32 {
    1e-8
}

fn default_betas() -> (f32, f32) {
    (0.9, 0.999)
}

/// Optimizer kind and arguments, e.g.
/// `{"optimizer": "RMSprop", "optimizer_args": {"lr": 0.001}}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "optimizer", content = "optimizer_args")]
pub enum OptimizerConfig {
    #[serde(rename = "SGD")]
    Sgd {
        #[serde(default = "default_lr")]
        lr: f32,
        #[serde(default)]
        momentum: f32,
    },
    #[serde(rename = "Adam")]
    Adam {
        #[serde(default = "default_lr")]
        lr: f32,
        #[serde(default = "default_betas")]
        betas: (f32, f32),
        #[serde(default = "default_eps")]
        eps: f32,
    },
    #[serde(rename = "RMSprop")]
    RmsProp {
        #[serde(default = "default_lr")]
        lr: f32,
        #[serde(default = "default_rmsprop_alpha")]
        alpha: f32,
        #[serde(default = "default_eps")]
        eps: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::RmsProp {
            lr: default_lr(),
            alpha: default_rmsprop_alpha(),
            eps: default_eps(),
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self, name: &str) -> Result<()> {
        let (lr, extra_ok) = match self {
            OptimizerConfig::Sgd { lr, momentum } => (*lr, (0.0..1.0).contains(momentum)),
            OptimizerConfig::Adam { lr, betas, eps } => {
                (*lr, (0.0..1.0).contains(&betas.0) && (0.0..1.0).contains(&betas.1) && *eps > 0.0)
            }
            OptimizerConfig::RmsProp { lr, alpha, eps } => (*lr, (0.0..1.0).contains(alpha) && *eps > 0.0),
        };
        if !(lr > 0.0 && lr.is_finite()) {
            return Err(DqnError::configuration(
                format!("optimizers.{}", name),
                format!("learning rate must be positive, got {}", lr),
            ));
        }
        if !extra_ok {
            return Err(DqnError::configuration(
                format!("optimizers.{}", name),
                format!("optimizer arguments out of range: {:?}", self),
            ));
        }
        Ok(())
    }
}

/// Optimizer state bound to one network.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
    RMSProp(RMSProp),
}

impl OptimizerWrapper {
    pub fn from_config(config: &OptimizerConfig, network: &NeuralNetwork) -> Self {
        match *config {
            OptimizerConfig::Sgd { lr, momentum } => OptimizerWrapper::SGD(SGD::new(network, lr, momentum)),
            OptimizerConfig::Adam { lr, betas, eps } => {
                OptimizerWrapper::Adam(Adam::new(network, lr, betas.0, betas.1, eps))
            }
            OptimizerConfig::RmsProp { lr, alpha, eps } => {
                OptimizerWrapper::RMSProp(RMSProp::new(network, lr, alpha, eps))
            }
        }
    }

    /// Check that restored moment buffers fit `network`.
    pub fn check_network(&self, network: &NeuralNetwork) -> Result<()> {
        let (weights, biases) = match self {
            OptimizerWrapper::SGD(optimizer) => (&optimizer.velocity_weights, &optimizer.velocity_biases),
            OptimizerWrapper::Adam(optimizer) => (&optimizer.m_weights, &optimizer.m_biases),
            OptimizerWrapper::RMSProp(optimizer) => (&optimizer.v_weights, &optimizer.v_biases),
        };
        let expected: Vec<_> = network.parameters().map(|(w, b)| (w.dim(), b.dim())).collect();
        let actual: Vec<_> = weights.iter().zip(biases).map(|(w, b)| (w.dim(), b.dim())).collect();
        if expected != actual || weights.len() != biases.len() {
            return Err(DqnError::dimension_mismatch(format!("{:?}", expected), format!("{:?}", actual)));
        }
        Ok(())
    }
}

impl Optimizer for OptimizerWrapper {
    fn step(&mut self, network: &mut NeuralNetwork, gradients: &[LayerGradients]) -> Result<()> {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.step(network, gradients),
            OptimizerWrapper::Adam(optimizer) => optimizer.step(network, gradients),
            OptimizerWrapper::RMSProp(optimizer) => optimizer.step(network, gradients),
        }
    }

    fn learning_rate(&self) -> f32 {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.learning_rate(),
            OptimizerWrapper::Adam(optimizer) => optimizer.learning_rate(),
            OptimizerWrapper::RMSProp(optimizer) => optimizer.learning_rate(),
        }
    }
}

fn zeros_like_weights(network: &NeuralNetwork) -> Vec<Array2<f32>> {
    network.parameters().map(|(w, _)| Array2::zeros(w.dim())).collect()
}

fn zeros_like_biases(network: &NeuralNetwork) -> Vec<Array1<f32>> {
    network.parameters().map(|(_, b)| Array1::zeros(b.dim())).collect()
}

fn check_gradients(network: &NeuralNetwork, moments: &[Array2<f32>], gradients: &[LayerGradients]) -> Result<()> {
    if gradients.len() != network.num_layers() || moments.len() != network.num_layers() {
        return Err(DqnError::dimension_mismatch(
            format!("{} layer gradients", network.num_layers()),
            format!("{} gradients for {} moment buffers", gradients.len(), moments.len()),
        ));
    }
    for ((weights, biases), grads) in network.parameters().zip(gradients) {
        if weights.dim() != grads.weights.dim() || biases.dim() != grads.biases.dim() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", weights.dim()),
                format!("{:?}", grads.weights.dim()),
            ));
        }
    }
    Ok(())
}

/// Stochastic gradient descent with optional momentum
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SGD {
    pub lr: f32,
    pub momentum: f32,
    velocity_weights: Vec<Array2<f32>>,
    velocity_biases: Vec<Array1<f32>>,
}

impl SGD {
    pub fn new(network: &NeuralNetwork, lr: f32, momentum: f32) -> SGD {
        SGD {
            lr,
            momentum,
            velocity_weights: zeros_like_weights(network),
            velocity_biases: zeros_like_biases(network),
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, network: &mut NeuralNetwork, gradients: &[LayerGradients]) -> Result<()> {
        check_gradients(network, &self.velocity_weights, gradients)?;
        let (lr, momentum) = (self.lr, self.momentum);
        for (i, (weights, biases)) in network.parameters_mut().enumerate() {
            let vw = &mut self.velocity_weights[i];
            Zip::from(&mut *weights).and(&mut *vw).and(&gradients[i].weights).for_each(|w, v, &g| {
                *v = momentum * *v + g;
                *w -= lr * *v;
            });
            let vb = &mut self.velocity_biases[i];
            Zip::from(&mut *biases).and(&mut *vb).and(&gradients[i].biases).for_each(|b, v, &g| {
                *v = momentum * *v + g;
                *b -= lr * *v;
            });
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}

/// Adam with bias-corrected moment estimates
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Adam {
    pub lr: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m_weights: Vec<Array2<f32>>,
    v_weights: Vec<Array2<f32>>,
    m_biases: Vec<Array1<f32>>,
    v_biases: Vec<Array1<f32>>,
    /// Number of steps taken so far
    pub t: i32,
}

impl Adam {
    pub fn new(network: &NeuralNetwork, lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            lr,
            beta1,
            beta2,
            epsilon,
            m_weights: zeros_like_weights(network),
            v_weights: zeros_like_weights(network),
            m_biases: zeros_like_biases(network),
            v_biases: zeros_like_biases(network),
            t: 0,
        }
    }

    pub fn default(network: &NeuralNetwork) -> Self {
        Self::new(network, default_lr(), 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, network: &mut NeuralNetwork, gradients: &[LayerGradients]) -> Result<()> {
        check_gradients(network, &self.m_weights, gradients)?;
        self.t += 1;
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);
        let correction1 = 1.0 - beta1.powi(self.t);
        let correction2 = 1.0 - beta2.powi(self.t);
        let step_size = self.lr / correction1;

        for (i, (weights, biases)) in network.parameters_mut().enumerate() {
            Zip::from(&mut *weights)
                .and(&mut self.m_weights[i])
                .and(&mut self.v_weights[i])
                .and(&gradients[i].weights)
                .for_each(|w, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *w -= step_size * *m / ((*v / correction2).sqrt() + eps);
                });
            Zip::from(&mut *biases)
                .and(&mut self.m_biases[i])
                .and(&mut self.v_biases[i])
                .and(&gradients[i].biases)
                .for_each(|b, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *b -= step_size * *m / ((*v / correction2).sqrt() + eps);
                });
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}

/// RMSProp optimizer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RMSProp {
    pub lr: f32,
    /// Smoothing constant of the squared-gradient average
    pub alpha: f32,
    pub epsilon: f32,
    v_weights: Vec<Array2<f32>>,
    v_biases: Vec<Array1<f32>>,
}

impl RMSProp {
    pub fn new(network: &NeuralNetwork, lr: f32, alpha: f32, epsilon: f32) -> Self {
        RMSProp {
            lr,
            alpha,
            epsilon,
            v_weights: zeros_like_weights(network),
            v_biases: zeros_like_biases(network),
        }
    }

    pub fn default(network: &NeuralNetwork) -> Self {
        Self::new(network, default_lr(), default_rmsprop_alpha(), default_eps())
    }
}

impl Optimizer for RMSProp {
    fn step(&mut self, network: &mut NeuralNetwork, gradients: &[LayerGradients]) -> Result<()> {
        check_gradients(network, &self.v_weights, gradients)?;
        let (lr, alpha, eps) = (self.lr, self.alpha, self.epsilon);
        for (i, (weights, biases)) in network.parameters_mut().enumerate() {
            Zip::from(&mut *weights)
                .and(&mut self.v_weights[i])
                .and(&gradients[i].weights)
                .for_each(|w, v, &g| {
                    *v = alpha * *v + (1.0 - alpha) * g * g;
                    *w -= lr * g / (v.sqrt() + eps);
                });
            Zip::from(&mut *biases)
                .and(&mut self.v_biases[i])
                .and(&gradients[i].biases)
                .for_each(|b, v, &g| {
                    *v = alpha * *v + (1.0 - alpha) * g * g;
                    *b -= lr * g / (v.sqrt() + eps);
                });
        }
        Ok(())
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}
