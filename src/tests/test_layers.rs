use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use crate::activations::Activation;
use crate::layers::{DenseLayer, WeightInit};

fn layer(activation: Activation) -> DenseLayer {
    let mut rng = StdRng::seed_from_u64(0);
    DenseLayer::new(2, 2, activation, &mut rng)
        .with_weights(array![[1.0, -1.0], [2.0, 0.5]])
        .unwrap()
        .with_biases(array![0.5, -3.0])
        .unwrap()
}

#[test]
fn test_dense_forward_batch() {
    let dense = layer(Activation::Relu);
    let (pre_activation, output) = dense.forward_batch(array![[1.0, 1.0], [0.0, 2.0]].view());
    assert_eq!(pre_activation, array![[3.5, -3.5], [4.5, -2.0]]);
    assert_eq!(output, array![[3.5, 0.0], [4.5, 0.0]]);
}

#[test]
fn test_dense_backward_batch() {
    let dense = layer(Activation::Relu);
    let inputs = array![[1.0, 1.0], [0.0, 2.0]];
    let (pre_activation, _) = dense.forward_batch(inputs.view());
    let (input_errors, gradients) =
        dense.backward_batch(inputs.view(), pre_activation.view(), Array2::ones((2, 2)).view());

    // The second unit is inactive for both rows
    assert_eq!(gradients.weights, array![[1.0, 0.0], [3.0, 0.0]]);
    assert_eq!(gradients.biases, array![2.0, 0.0]);
    assert_eq!(input_errors, array![[1.0, 2.0], [1.0, 2.0]]);
}

#[test]
fn test_dense_rejects_wrong_shapes() {
    let dense = layer(Activation::Linear);
    assert!(dense.clone().with_weights(Array2::zeros((3, 2))).is_err());
    assert!(dense.with_biases(array![1.0]).is_err());
}

#[test]
fn test_dense_parameter_count() {
    let mut rng = StdRng::seed_from_u64(4);
    let dense = DenseLayer::new_with_init(16, 8, Activation::Relu, &WeightInit::FanInUniform, &mut rng);
    assert_eq!((dense.input_size(), dense.output_size()), (16, 8));
    assert_eq!(dense.num_parameters(), 16 * 8 + 8);
}

#[test]
fn test_linear_derivative_is_one() {
    let derivative = Activation::Linear.derivative_batch(array![[-2.0, 0.0, 3.0]].view());
    assert_eq!(derivative, array![[1.0, 1.0, 1.0]]);
}
