//! Components to build a neural network

use std::sync::atomic::{self, AtomicUsize};

use rand_distr::{Distribution, Normal};
use thiserror::Error;

use crate::values::Value;

/// Errors for the neural network
#[derive(Debug, Error)]
pub enum NNError {
    #[error("Input size mismatch")]
    InputSizeMismatch { expected: usize, got: usize },
}

/// Weight initialization scheme for a linear layer
#[derive(Debug, Clone, Copy, Default)]
pub enum Init {
    /// Scaled for ReLU stacks, keeps the output variance close to the input variance
    #[default]
    He,
    /// Scaled for sigmoid or softmax stacks
    Xavier,
}

impl Init {
    fn std_dev(&self, n_inputs: usize) -> f32 {
        match self {
            Init::He => (2.0 / n_inputs as f32).sqrt(),
            Init::Xavier => (1.0 / n_inputs as f32).sqrt(),
        }
    }
}

/// Represents the torch.nn.Module. NNs should implement this trait.
/// <https://github.com/pytorch/pytorch/blob/v2.6.0/torch/nn/modules/module.py#L402>
pub trait Module {
    fn zero_grad(&mut self) {
        for p in self.parameters().iter_mut() {
            p.zero_grad();
        }
    }

    fn parameters(&self) -> Vec<Value>;
    fn forward(&self, inputs: &[Value]) -> Result<Vec<Value>, NNError>;
}

/// A single neuron in a linear layer
pub struct Neuron {
    /// weights of the neuron
    pub weights: Vec<Value>,
    /// bias of the neuron
    pub bias: Value,
}

impl Neuron {
    fn new(n_inputs: usize, init: Init) -> Self {
        // Keeping initial weights small avoids exploding or vanishing gradients
        // (or even just activation values for that matter, e.g. softmax)
        let std = init.std_dev(n_inputs);
        let normal = Normal::new(0.0, std).unwrap();
        let weights = (0..n_inputs)
            .map(|_| Value::new(normal.sample(&mut rand::rng())))
            .collect();
        Self {
            weights,
            bias: Value::new(normal.sample(&mut rand::rng())),
        }
    }

    // Testing utility for a deterministic and simple neuron
    #[cfg(test)]
    fn new_ones(n_inputs: usize) -> Self {
        Self {
            weights: (0..n_inputs).map(|_| Value::new(1.0)).collect(),
            bias: Value::new(1.0),
        }
    }

    pub fn parameters(&self) -> Vec<Value> {
        self.weights
            .iter()
            .chain(std::iter::once(&self.bias))
            .cloned()
            .collect()
    }

    pub fn forward(&self, inputs: &[Value]) -> Result<Value, NNError> {
        if inputs.len() != self.weights.len() {
            return Err(NNError::InputSizeMismatch {
                expected: self.weights.len(),
                got: inputs.len(),
            });
        }
        let output = self
            .weights
            .iter()
            .zip(inputs.iter())
            .map(|(w, i)| w * i)
            .sum::<Value>();
        let output = &output + &self.bias;
        Ok(output)
    }
}

/// A fully connected layer, the analogue of torch.nn.Linear
pub struct Linear {
    neurons: Vec<Neuron>,
    n_output_nans: AtomicUsize,
    n_parameters_nans: AtomicUsize,
}

impl Linear {
    /// Creates a new layer with the given number of inputs and outputs,
    /// He-initialized
    pub fn new(n_inputs: usize, n_outputs: usize) -> Self {
        Self::with_init(n_inputs, n_outputs, Init::He)
    }

    /// Creates a new layer with an explicit weight initialization scheme
    pub fn with_init(n_inputs: usize, n_outputs: usize, init: Init) -> Self {
        let neurons = (0..n_outputs).map(|_| Neuron::new(n_inputs, init)).collect();
        Self {
            neurons,
            n_output_nans: AtomicUsize::new(0),
            n_parameters_nans: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    fn new_ones(n_inputs: usize, n_outputs: usize) -> Self {
        let neurons = (0..n_outputs).map(|_| Neuron::new_ones(n_inputs)).collect();
        Self {
            neurons,
            n_output_nans: AtomicUsize::new(0),
            n_parameters_nans: AtomicUsize::new(0),
        }
    }
}

impl Module for Linear {
    /// Returns all the parameters in the layer
    fn parameters(&self) -> Vec<Value> {
        self.neurons.iter().flat_map(|n| n.parameters()).collect()
    }

    /// Computes forward pass for a layer
    fn forward(&self, inputs: &[Value]) -> Result<Vec<Value>, NNError> {
        let outputs = self
            .neurons
            .iter()
            .map(|n| n.forward(inputs))
            .collect::<Result<Vec<_>, _>>()?;
        let n_output_nans = outputs.iter().filter(|v| v.data().is_nan()).count();
        self.n_output_nans
            .store(n_output_nans, atomic::Ordering::Relaxed);
        let n_parameters_nans = self
            .parameters()
            .iter()
            .filter(|v| v.data().is_nan())
            .count();
        self.n_parameters_nans
            .store(n_parameters_nans, atomic::Ordering::Relaxed);
        log::debug!(
            "n_output_nans: {}, n_parameters_nans: {}",
            n_output_nans,
            n_parameters_nans
        );
        Ok(outputs)
    }
}

/// Applies ReLU element-wise, works for arbitrary number of inputs
#[derive(Default)]
pub struct ReLU {
    n_dead_neurons: AtomicUsize,
}

impl ReLU {
    pub fn new() -> Self {
        Self {
            n_dead_neurons: AtomicUsize::new(0),
        }
    }

    /// Returns the number of dead neurons in the layer (used for debugging)
    pub fn n_dead_neurons(&self) -> usize {
        self.n_dead_neurons.load(atomic::Ordering::Relaxed)
    }
}

impl Module for ReLU {
    fn parameters(&self) -> Vec<Value> {
        vec![]
    }

    fn forward(&self, inputs: &[Value]) -> Result<Vec<Value>, NNError> {
        let n_dead_neurons = inputs.iter().filter(|v| v.data() <= 0.0).count();
        self.n_dead_neurons
            .store(n_dead_neurons, atomic::Ordering::Relaxed);
        Ok(inputs.iter().map(|v| v.relu()).collect())
    }
}

/// Applies the logistic sigmoid element-wise
#[derive(Default)]
pub struct Sigmoid {}

impl Sigmoid {
    pub fn new() -> Self {
        Self {}
    }
}

impl Module for Sigmoid {
    fn parameters(&self) -> Vec<Value> {
        vec![]
    }

    fn forward(&self, inputs: &[Value]) -> Result<Vec<Value>, NNError> {
        Ok(inputs.iter().map(|v| v.sigmoid()).collect())
    }
}

/// Normalizes a set of raw scores into a probability distribution
#[derive(Default)]
pub struct Softmax {}

impl Softmax {
    pub fn new() -> Self {
        Self {}
    }
}

impl Module for Softmax {
    fn parameters(&self) -> Vec<Value> {
        vec![]
    }

    fn forward(&self, inputs: &[Value]) -> Result<Vec<Value>, NNError> {
        let exp_sum = inputs.iter().map(|v| v.exp()).sum::<Value>();
        // Note: Large weights can cause overflow in the exponential function, leading to dividing by `inf`, for example
        // which causes the softmax to return NaN, so it is important to initialize the weights properly
        Ok(inputs.iter().map(|v| v.exp() / exp_sum.clone()).collect())
    }
}

/// Log of the softmax, shifted by the row maximum so the exponentials cannot overflow
#[derive(Default)]
pub struct LogSoftmax {}

impl LogSoftmax {
    pub fn new() -> Self {
        Self {}
    }
}

impl Module for LogSoftmax {
    fn parameters(&self) -> Vec<Value> {
        vec![]
    }

    fn forward(&self, inputs: &[Value]) -> Result<Vec<Value>, NNError> {
        // softmax is shift invariant, and the shift is constant with respect to
        // the graph, so subtracting the max leaves the gradients unchanged
        let max = inputs.iter().map(|v| v.data()).fold(f32::NEG_INFINITY, f32::max);
        let max = Value::new(max);
        let shifted: Vec<Value> = inputs.iter().map(|v| v - &max).collect();
        let log_sum = shifted.iter().map(|v| v.exp()).sum::<Value>().ln();
        Ok(shifted.iter().map(|v| v - &log_sum).collect())
    }
}

/// An ordered stack of modules, the analogue of torch.nn.Sequential.
/// The forward pass threads the inputs through each member in turn.
pub struct Sequential {
    modules: Vec<Box<dyn Module>>,
}

impl Sequential {
    pub fn new(modules: Vec<Box<dyn Module>>) -> Self {
        Self { modules }
    }

    pub fn push(&mut self, module: Box<dyn Module>) {
        self.modules.push(module);
    }
}

impl Module for Sequential {
    fn parameters(&self) -> Vec<Value> {
        self.modules.iter().flat_map(|m| m.parameters()).collect()
    }

    fn forward(&self, inputs: &[Value]) -> Result<Vec<Value>, NNError> {
        let mut outputs = inputs.to_vec();
        for module in &self.modules {
            outputs = module.forward(&outputs)?;
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use crate::assert_eq_float;

    use super::*;

    #[test]
    fn test_linear_forward() {
        let layer = Linear::new_ones(2, 3);
        let inputs = vec![Value::new(1.0), Value::new(2.0)];
        let outputs = layer.forward(&inputs).unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(outputs[0].data(), 4.0);
        assert_eq!(outputs[1].data(), 4.0);
        assert_eq!(outputs[2].data(), 4.0);
    }

    #[test]
    fn test_dim_mismatch() {
        let layer = Linear::new_ones(2, 3);
        let inputs = vec![Value::new(1.0)];
        let outputs = layer.forward(&inputs).unwrap_err();
        assert!(matches!(
            outputs,
            NNError::InputSizeMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_softmax() {
        let softmax = Softmax::new();
        let inputs = vec![Value::new(1.0), Value::new(2.0)];
        let mut outputs = softmax.forward(&inputs).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq_float!(outputs[0].data(), 0.2689414);
        assert_eq_float!(outputs[1].data(), 0.7310585);

        // Softmax(x1, x2) = (exp(x1) / (exp(x1) + exp(x2)), exp(x2) / (exp(x1) + exp(x2)))
        // Let s1 = exp(x1) / (exp(x1) + exp(x2)) and s2 = exp(x2) / (exp(x1) + exp(x2))
        // d s1 / dx1 = s1 * (1 - s1)
        // d s1 / dx2 = -s1 * s2
        outputs[0].backward();
        let s1 = outputs[0].data();
        let s2 = outputs[1].data();
        assert_eq_float!(inputs[0].grad(), s1 * (1.0 - s1));
        assert_eq_float!(inputs[1].grad(), -s1 * s2);

        // Note that `inputs[i].zero_grad()` (zeroing leaf nodes) is insufficient because there are many intermediate nodes
        // created to compute the output that will not be zeroed out! Printing `outputs[0]` will show these intermediate nodes.
        outputs[0].zero_grad();
        // d s2 / dx1 = -s1 * s2
        // d s2 / dx2 = s2 * (1 - s2)
        outputs[1].backward();
        assert_eq_float!(inputs[0].grad(), -s1 * s2);
        assert_eq_float!(inputs[1].grad(), s2 * (1.0 - s2));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let softmax = Softmax::new();
        let inputs = vec![Value::new(-1.0), Value::new(0.5), Value::new(3.0)];
        let outputs = softmax.forward(&inputs).unwrap();
        let total: f32 = outputs.iter().map(|v| v.data()).sum();
        assert_eq_float!(total, 1.0);
        assert!(outputs.iter().all(|v| v.data() > 0.0));
    }

    #[test]
    fn test_log_softmax_matches_softmax() {
        let inputs = vec![Value::new(1.0), Value::new(2.0)];
        let log_probs = LogSoftmax::new().forward(&inputs).unwrap();
        let probs = Softmax::new().forward(&inputs).unwrap();
        for (lp, p) in log_probs.iter().zip(probs.iter()) {
            assert_eq_float!(lp.data().exp(), p.data());
        }
    }

    #[test]
    fn test_log_softmax_large_scores() {
        // naive exp would overflow f32 here
        let inputs = vec![Value::new(1000.0), Value::new(1001.0)];
        let log_probs = LogSoftmax::new().forward(&inputs).unwrap();
        let total: f32 = log_probs.iter().map(|v| v.data().exp()).sum();
        assert_eq_float!(total, 1.0);
    }

    #[test]
    fn test_sigmoid_module() {
        let sigmoid = Sigmoid::new();
        let inputs = vec![Value::new(0.0), Value::new(100.0)];
        let outputs = sigmoid.forward(&inputs).unwrap();
        assert_eq_float!(outputs[0].data(), 0.5);
        assert_eq_float!(outputs[1].data(), 1.0);
    }

    #[test]
    fn test_sequential_forward() {
        let model = Sequential::new(vec![
            Box::new(Linear::new_ones(2, 3)),
            Box::new(ReLU::new()),
            Box::new(Linear::new_ones(3, 1)),
        ]);
        let inputs = vec![Value::new(1.0), Value::new(2.0)];
        // each first-layer output is 1*1 + 1*2 + 1 = 4, second layer sums three 4s plus bias
        let outputs = model.forward(&inputs).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].data(), 13.0);
        // 2 * 3 weights + 3 biases, then 3 weights + 1 bias
        assert_eq!(model.parameters().len(), 13);
    }

    #[test]
    fn test_sequential_zero_grad() {
        let mut model = Sequential::new(vec![Box::new(Linear::new_ones(2, 1))]);
        let inputs = vec![Value::new(1.0), Value::new(2.0)];
        let outputs = model.forward(&inputs).unwrap();
        outputs[0].backward();
        assert!(model.parameters().iter().any(|p| p.grad() != 0.0));

        model.zero_grad();
        assert!(model.parameters().iter().all(|p| p.grad() == 0.0));
    }

    #[test]
    fn test_relu_dead_neurons() {
        let relu = ReLU::new();
        let inputs = vec![Value::new(-1.0), Value::new(0.0), Value::new(2.0)];
        let outputs = relu.forward(&inputs).unwrap();
        assert_eq!(relu.n_dead_neurons(), 2);
        assert_eq!(outputs[0].data(), 0.0);
        assert_eq!(outputs[2].data(), 2.0);
    }
}
