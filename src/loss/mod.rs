//! # Loss functions
//!
//! Regression losses between the gathered Q-values and their TD targets.

pub mod functions;

use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};

use crate::error::{DqnError, Result};
pub use functions::{HuberLoss, L1Loss, Loss, SmoothL1Loss, MSE};

fn default_delta() -> f32 {
    1.0
}

/// Loss kind, e.g. `{"loss": "MSELoss"}` or `{"loss": "HuberLoss", "delta": 2.0}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(tag = "loss")]
pub enum LossConfig {
    #[default]
    #[serde(rename = "MSELoss")]
    Mse,
    #[serde(rename = "HuberLoss")]
    Huber {
        #[serde(default = "default_delta")]
        delta: f32,
    },
    #[serde(rename = "SmoothL1Loss")]
    SmoothL1 {
        #[serde(default = "default_delta")]
        beta: f32,
    },
    #[serde(rename = "L1Loss")]
    L1,
}

impl LossConfig {
    pub fn validate(&self, name: &str) -> Result<()> {
        match self {
            LossConfig::Huber { delta: value } | LossConfig::SmoothL1 { beta: value } if *value <= 0.0 => {
                Err(DqnError::configuration(
                    format!("losses.{}", name),
                    format!("loss threshold must be positive, got {}", value),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum LossWrapper {
    Mse(MSE),
    Huber(HuberLoss),
    SmoothL1(SmoothL1Loss),
    L1(L1Loss),
}

impl LossWrapper {
    pub fn from_config(config: &LossConfig) -> Self {
        match *config {
            LossConfig::Mse => LossWrapper::Mse(MSE),
            LossConfig::Huber { delta } => LossWrapper::Huber(HuberLoss::new(delta)),
            LossConfig::SmoothL1 { beta } => LossWrapper::SmoothL1(SmoothL1Loss { beta }),
            LossConfig::L1 => LossWrapper::L1(L1Loss),
        }
    }
}

impl Loss for LossWrapper {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        match self {
            LossWrapper::Mse(loss) => loss.compute_batch(predictions, targets),
            LossWrapper::Huber(loss) => loss.compute_batch(predictions, targets),
            LossWrapper::SmoothL1(loss) => loss.compute_batch(predictions, targets),
            LossWrapper::L1(loss) => loss.compute_batch(predictions, targets),
        }
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        match self {
            LossWrapper::Mse(loss) => loss.gradient_batch(predictions, targets),
            LossWrapper::Huber(loss) => loss.gradient_batch(predictions, targets),
            LossWrapper::SmoothL1(loss) => loss.gradient_batch(predictions, targets),
            LossWrapper::L1(loss) => loss.gradient_batch(predictions, targets),
        }
    }
}
