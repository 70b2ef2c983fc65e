use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};

/// Trait defining the interface for loss functions
///
/// Both methods reduce by the mean over every element of the batch.
pub trait Loss: Send + Sync {
    /// Compute the loss for a batch of predictions and targets
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32;

    /// Compute the gradient of the loss with respect to the predictions
    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32>;
}

fn element_count(predictions: &ArrayView2<f32>) -> f32 {
    predictions.len().max(1) as f32
}

/// Mean Squared Error loss
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct MSE;

impl Loss for MSE {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        let diff = &predictions - &targets;
        diff.mapv(|x| x * x).sum() / element_count(&predictions)
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        (&predictions - &targets) * (2.0 / element_count(&predictions))
    }
}

/// Huber loss: quadratic within `delta`, linear beyond
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct HuberLoss {
    pub delta: f32,
}

impl HuberLoss {
    pub fn new(delta: f32) -> Self {
        HuberLoss { delta }
    }
}

impl Loss for HuberLoss {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        let diff = &predictions - &targets;
        diff.mapv(|x| {
            let abs_x = x.abs();
            if abs_x <= self.delta {
                0.5 * x * x
            } else {
                self.delta * (abs_x - 0.5 * self.delta)
            }
        }).sum() / element_count(&predictions)
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        let n = element_count(&predictions);
        (&predictions - &targets).mapv(|x| {
            if x.abs() <= self.delta {
                x / n
            } else {
                self.delta * x.signum() / n
            }
        })
    }
}

/// Smooth L1 loss: Huber loss divided by `beta`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SmoothL1Loss {
    pub beta: f32,
}

impl Loss for SmoothL1Loss {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        let diff = &predictions - &targets;
        diff.mapv(|x| {
            let abs_x = x.abs();
            if abs_x < self.beta {
                0.5 * x * x / self.beta
            } else {
                abs_x - 0.5 * self.beta
            }
        }).sum() / element_count(&predictions)
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        let n = element_count(&predictions);
        (&predictions - &targets).mapv(|x| {
            if x.abs() < self.beta {
                x / (self.beta * n)
            } else {
                x.signum() / n
            }
        })
    }
}

/// Mean absolute error
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Default)]
pub struct L1Loss;

impl Loss for L1Loss {
    fn compute_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
        (&predictions - &targets).mapv(f32::abs).sum() / element_count(&predictions)
    }

    fn gradient_batch(&self, predictions: ArrayView2<f32>, targets: ArrayView2<f32>) -> Array2<f32> {
        let n = element_count(&predictions);
        (&predictions - &targets).mapv(|x| if x == 0.0 { 0.0 } else { x.signum() / n })
    }
}
