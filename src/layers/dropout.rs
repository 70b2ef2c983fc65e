use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Serialize, Deserialize};
use crate::error::{DqnError, Result};
use super::Mode;

/// Dropout stage
///
/// Randomly sets units to 0 with probability `dropout_rate` during training and
/// scales the survivors by `1 / (1 - dropout_rate)`, so inference needs no
/// rescaling.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DropoutLayer {
    /// Probability of dropping a unit
    pub dropout_rate: f32,
}

impl DropoutLayer {
    pub fn new(dropout_rate: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&dropout_rate) {
            return Err(DqnError::configuration(
                "p_dropout",
                format!("dropout rate must be in [0, 1), got {}", dropout_rate),
            ));
        }
        Ok(DropoutLayer { dropout_rate })
    }

    /// Apply dropout to a batch.
    ///
    /// Returns the output and, in [`Mode::Train`], the mask that was applied so
    /// the backward pass can route gradients through the same units. Masks
    /// are drawn from `rng`; [`Mode::Eval`] leaves it untouched.
    pub fn forward_batch<R: Rng + ?Sized>(
        &self,
        inputs: ArrayView2<f32>,
        mode: Mode,
        rng: &mut R,
    ) -> (Array2<f32>, Option<Array2<f32>>) {
        if mode == Mode::Eval || self.dropout_rate == 0.0 {
            return (inputs.to_owned(), None);
        }

        let mask = self.sample_mask(inputs.dim(), rng);
        (&inputs * &mask, Some(mask))
    }

    fn sample_mask<R: Rng + ?Sized>(&self, dim: (usize, usize), rng: &mut R) -> Array2<f32> {
        let scale = 1.0 / (1.0 - self.dropout_rate);
        Array2::from_shape_fn(dim, |_| {
            if rng.gen::<f32>() >= self.dropout_rate { scale } else { 0.0 }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_eval_mode_is_identity() {
        let dropout = DropoutLayer::new(0.5).unwrap();
        let inputs = Array2::from_elem((3, 4), 2.0);
        let mut rng = StdRng::seed_from_u64(0);
        let (outputs, mask) = dropout.forward_batch(inputs.view(), Mode::Eval, &mut rng);
        assert_eq!(outputs, inputs);
        assert!(mask.is_none());
    }

    #[test]
    fn test_train_mode_scales_survivors() {
        let dropout = DropoutLayer::new(0.5).unwrap();
        let inputs = Array2::from_elem((8, 8), 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        let (outputs, mask) = dropout.forward_batch(inputs.view(), Mode::Train, &mut rng);
        let mask = mask.unwrap();
        assert_eq!(outputs, mask);
        assert!(outputs.iter().all(|&v| v == 0.0 || v == 2.0));
    }

    #[test]
    fn test_masks_follow_the_seed() {
        let dropout = DropoutLayer::new(0.3).unwrap();
        let inputs = Array2::from_elem((16, 16), 1.0);
        let draw = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            dropout.forward_batch(inputs.view(), Mode::Train, &mut rng).1.unwrap()
        };
        assert_eq!(draw(7), draw(7));
        assert_ne!(draw(7), draw(8));
    }

    #[test]
    fn test_invalid_rate() {
        assert!(DropoutLayer::new(1.0).is_err());
        assert!(DropoutLayer::new(-0.1).is_err());
    }
}
