pub mod dense;
pub mod dropout;
pub mod initialization;

pub use dense::{DenseLayer, LayerGradients};
pub use dropout::DropoutLayer;
pub use initialization::WeightInit;

use serde::{Serialize, Deserialize};

/// Whether a forward pass is part of an optimization step or pure inference.
///
/// Only affects stochastic stages (dropout). Passed explicitly to every forward
/// call instead of being stored on the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Train,
    Eval,
}
