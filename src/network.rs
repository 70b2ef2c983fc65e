use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::config::NetworkConfig;
use crate::error::{DqnError, Result};
use crate::layers::{DenseLayer, DropoutLayer, LayerGradients, Mode};

/// One affine transformation, its nonlinearity and an optional dropout stage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Block {
    pub dense: DenseLayer,
    pub dropout: Option<DropoutLayer>,
}

/// Intermediate values of a batched forward pass, consumed by
/// [`NeuralNetwork::backward`].
#[derive(Clone, Debug)]
pub struct ForwardTrace {
    blocks: Vec<BlockTrace>,
}

#[derive(Clone, Debug)]
struct BlockTrace {
    inputs: Array2<f32>,
    pre_activation: Array2<f32>,
    mask: Option<Array2<f32>>,
}

/// Trainable parameters of a network, in layer order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NetworkState {
    pub weights: Vec<Array2<f32>>,
    pub biases: Vec<Array1<f32>>,
}

/// A feed-forward network used as action-value approximator.
///
/// Built from layer widths `[L0, L1, ..., Lk]`: k dense layers, ReLU after all
/// but the last one, optionally followed by dropout. Forward passes never
/// mutate the network; whether dropout is active is decided by the [`Mode`]
/// passed to each call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NeuralNetwork {
    blocks: Vec<Block>,
}

impl NeuralNetwork {
    /// Create a new network with the given layer widths.
    ///
    /// `dropout` is the drop probability applied after every dense layer, or
    /// `None` to disable dropout.
    pub fn new<R: Rng + ?Sized>(layer_sizes: &[usize], dropout: Option<f32>, rng: &mut R) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(DqnError::configuration(
                "layers",
                "a network needs at least an input and an output width",
            ));
        }
        if let Some(pos) = layer_sizes.iter().position(|&size| size == 0) {
            return Err(DqnError::configuration(
                "layers",
                format!("layer width at position {} must be positive", pos),
            ));
        }

        let n_layers = layer_sizes.len() - 1;
        let blocks = layer_sizes
            .windows(2)
            .enumerate()
            .map(|(i, window)| {
                let activation = if i + 1 == n_layers { Activation::Linear } else { Activation::Relu };
                let dropout = dropout.map(DropoutLayer::new).transpose()?;
                Ok(Block {
                    dense: DenseLayer::new(window[0], window[1], activation, rng),
                    dropout,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NeuralNetwork { blocks })
    }

    pub fn from_config<R: Rng + ?Sized>(config: &NetworkConfig, rng: &mut R) -> Result<Self> {
        let dropout = if config.dropout { Some(config.p_dropout) } else { None };
        Self::new(&config.layers, dropout, rng)
    }

    /// Assemble a network from explicit dense layers without dropout.
    pub fn from_layers(layers: Vec<DenseLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(DqnError::configuration("layers", "a network needs at least one layer"));
        }
        for pair in layers.windows(2) {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(DqnError::dimension_mismatch(
                    pair[0].output_size().to_string(),
                    pair[1].input_size().to_string(),
                ));
            }
        }
        let blocks = layers.into_iter().map(|dense| Block { dense, dropout: None }).collect();
        Ok(NeuralNetwork { blocks })
    }

    /// Forward pass for a single input vector.
    pub fn forward<R: Rng + ?Sized>(&self, input: ArrayView1<f32>, mode: Mode, rng: &mut R) -> Array1<f32> {
        let output = self.forward_batch(input.insert_axis(Axis(0)), mode, rng);
        output.index_axis_move(Axis(0), 0)
    }

    /// Forward pass for a batch of input rows. Dropout masks come from `rng`.
    pub fn forward_batch<R: Rng + ?Sized>(&self, inputs: ArrayView2<f32>, mode: Mode, rng: &mut R) -> Array2<f32> {
        let mut current = inputs.to_owned();
        for block in &self.blocks {
            let (_, mut output) = block.dense.forward_batch(current.view());
            if let Some(dropout) = &block.dropout {
                output = dropout.forward_batch(output.view(), mode, rng).0;
            }
            current = output;
        }
        current
    }

    /// Forward pass that records what the backward pass needs.
    pub fn forward_traced<R: Rng + ?Sized>(
        &self,
        inputs: ArrayView2<f32>,
        mode: Mode,
        rng: &mut R,
    ) -> (Array2<f32>, ForwardTrace) {
        let mut current = inputs.to_owned();
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let (pre_activation, mut output) = block.dense.forward_batch(current.view());
            let mut mask = None;
            if let Some(dropout) = &block.dropout {
                let (dropped, applied) = dropout.forward_batch(output.view(), mode, rng);
                output = dropped;
                mask = applied;
            }
            blocks.push(BlockTrace { inputs: current, pre_activation, mask });
            current = output;
        }
        (current, ForwardTrace { blocks })
    }

    /// Backpropagate `output_errors` (gradient of the loss with respect to the
    /// network outputs) through a recorded forward pass.
    ///
    /// Returns one [`LayerGradients`] per dense layer, in layer order.
    pub fn backward(&self, trace: &ForwardTrace, output_errors: ArrayView2<f32>) -> Result<Vec<LayerGradients>> {
        if trace.blocks.len() != self.blocks.len() {
            return Err(DqnError::dimension_mismatch(
                format!("trace of {} blocks", self.blocks.len()),
                format!("trace of {} blocks", trace.blocks.len()),
            ));
        }
        let expected = (trace.blocks[0].inputs.nrows(), self.output_size());
        if output_errors.dim() != expected {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", expected),
                format!("{:?}", output_errors.dim()),
            ));
        }

        let mut gradients = Vec::with_capacity(self.blocks.len());
        let mut current_error = output_errors.to_owned();
        for (block, record) in self.blocks.iter().zip(&trace.blocks).rev() {
            if let Some(mask) = &record.mask {
                current_error *= mask;
            }
            let (input_error, layer_gradients) = block.dense.backward_batch(
                record.inputs.view(),
                record.pre_activation.view(),
                current_error.view(),
            );
            gradients.push(layer_gradients);
            current_error = input_error;
        }
        gradients.reverse();
        Ok(gradients)
    }

    pub fn layers(&self) -> impl Iterator<Item = &DenseLayer> {
        self.blocks.iter().map(|block| &block.dense)
    }

    /// Trainable parameters as `(weights, biases)` pairs, in layer order.
    pub fn parameters(&self) -> impl Iterator<Item = (&Array2<f32>, &Array1<f32>)> {
        self.blocks.iter().map(|block| (&block.dense.weights, &block.dense.biases))
    }

    pub fn parameters_mut(&mut self) -> impl Iterator<Item = (&mut Array2<f32>, &mut Array1<f32>)> {
        self.blocks.iter_mut().map(|block| (&mut block.dense.weights, &mut block.dense.biases))
    }

    pub fn num_parameters(&self) -> usize {
        self.layers().map(DenseLayer::num_parameters).sum()
    }

    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }

    /// Layer widths `[L0, ..., Lk]` this network was built from.
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.input_size()];
        sizes.extend(self.layers().map(DenseLayer::output_size));
        sizes
    }

    pub fn input_size(&self) -> usize {
        self.blocks.first().map_or(0, |block| block.dense.input_size())
    }

    pub fn output_size(&self) -> usize {
        self.blocks.last().map_or(0, |block| block.dense.output_size())
    }

    pub fn state_dict(&self) -> NetworkState {
        NetworkState {
            weights: self.parameters().map(|(w, _)| w.clone()).collect(),
            biases: self.parameters().map(|(_, b)| b.clone()).collect(),
        }
    }

    /// Overwrite all parameters. Shapes must match exactly.
    pub fn load_state_dict(&mut self, state: &NetworkState) -> Result<()> {
        if state.weights.len() != self.blocks.len() || state.biases.len() != self.blocks.len() {
            return Err(DqnError::dimension_mismatch(
                format!("{} layers", self.blocks.len()),
                format!("{} weight / {} bias tensors", state.weights.len(), state.biases.len()),
            ));
        }
        for (block, (weights, biases)) in self.blocks.iter().zip(state.weights.iter().zip(&state.biases)) {
            if block.dense.weights.dim() != weights.dim() || block.dense.biases.dim() != biases.dim() {
                return Err(DqnError::dimension_mismatch(
                    format!("{:?}", block.dense.weights.dim()),
                    format!("{:?}", weights.dim()),
                ));
            }
        }
        for (block, (weights, biases)) in self.blocks.iter_mut().zip(state.weights.iter().zip(&state.biases)) {
            block.dense.weights.assign(weights);
            block.dense.biases.assign(biases);
        }
        Ok(())
    }

    /// Blend parameters toward `source`: `self = tau * source + (1 - tau) * self`.
    pub fn soft_update_from(&mut self, source: &NeuralNetwork, tau: f32) -> Result<()> {
        if self.layer_sizes() != source.layer_sizes() {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", self.layer_sizes()),
                format!("{:?}", source.layer_sizes()),
            ));
        }
        for ((target_w, target_b), (source_w, source_b)) in self.parameters_mut().zip(source.parameters()) {
            target_w.zip_mut_with(source_w, |t, &s| *t = tau * s + (1.0 - tau) * *t);
            target_b.zip_mut_with(source_b, |t, &s| *t = tau * s + (1.0 - tau) * *t);
        }
        Ok(())
    }
}
