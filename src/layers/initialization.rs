use ndarray::{Array1, Array2};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Uniform;

/// Weight initialization strategies
#[derive(Debug, Clone, PartialEq)]
pub enum WeightInit {
    /// Uniform in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]` for weights and biases,
    /// the usual default for fully connected layers
    FanInUniform,

    /// Uniform distribution with custom range, zero biases
    Uniform { min: f32, max: f32 },
}

impl WeightInit {
    /// Initialize weights for a layer of shape `(fan_in, fan_out)`
    pub fn initialize_weights<R: Rng + ?Sized>(&self, shape: (usize, usize), rng: &mut R) -> Array2<f32> {
        match self {
            WeightInit::FanInUniform => {
                let bound = fan_in_bound(shape.0);
                Array2::random_using(shape, Uniform::new_inclusive(-bound, bound), rng)
            }
            WeightInit::Uniform { min, max } => {
                Array2::random_using(shape, Uniform::new_inclusive(*min, *max), rng)
            }
        }
    }

    /// Initialize biases for a layer
    pub fn initialize_biases<R: Rng + ?Sized>(&self, fan_in: usize, size: usize, rng: &mut R) -> Array1<f32> {
        match self {
            WeightInit::FanInUniform => {
                let bound = fan_in_bound(fan_in);
                Array1::random_using(size, Uniform::new_inclusive(-bound, bound), rng)
            }
            WeightInit::Uniform { .. } => Array1::zeros(size),
        }
    }
}

fn fan_in_bound(fan_in: usize) -> f32 {
    1.0 / (fan_in.max(1) as f32).sqrt()
}
