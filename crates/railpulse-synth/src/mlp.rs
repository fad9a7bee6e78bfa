//! Small dense networks with manual backpropagation and Adam updates.
//!
//! Batches are matrices with one sample per column.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

const LEAKY_SLOPE: f64 = 0.2;
const ADAM_BETA1: f64 = 0.5;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    LeakyRelu,
    Linear,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::LeakyRelu => {
                if x > 0.0 {
                    x
                } else {
                    LEAKY_SLOPE * x
                }
            }
            Activation::Linear => x,
        }
    }

    fn derivative(self, x: f64) -> f64 {
        match self {
            Activation::LeakyRelu => {
                if x > 0.0 {
                    1.0
                } else {
                    LEAKY_SLOPE
                }
            }
            Activation::Linear => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gradient {
    pub weights: DMatrix<f64>,
    pub bias: DVector<f64>,
}

#[derive(Debug, Clone)]
struct Dense {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
    activation: Activation,
    m: Gradient,
    v: Gradient,
}

impl Dense {
    fn new<R>(inputs: usize, outputs: usize, activation: Activation, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        // Xavier normal initialization
        #[expect(clippy::cast_precision_loss)]
        let std_dev = (2.0 / (inputs + outputs) as f64).sqrt();
        let weights = DMatrix::from_fn(outputs, inputs, |_, _| {
            let z: f64 = StandardNormal.sample(rng);
            z * std_dev
        });
        let zeros = Gradient {
            weights: DMatrix::zeros(outputs, inputs),
            bias: DVector::zeros(outputs),
        };
        Self {
            weights,
            bias: DVector::zeros(outputs),
            activation,
            m: zeros.clone(),
            v: zeros,
        }
    }

    fn pre_activation(&self, input: &DMatrix<f64>) -> DMatrix<f64> {
        let mut z = &self.weights * input;
        for j in 0..z.ncols() {
            for i in 0..z.nrows() {
                z[(i, j)] += self.bias[i];
            }
        }
        z
    }
}

/// Inputs and pre-activations of every layer from one forward pass.
#[derive(Debug, Clone)]
pub struct Trace {
    inputs: Vec<DMatrix<f64>>,
    pre_activations: Vec<DMatrix<f64>>,
}

#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Dense>,
    step: i32,
}

impl Mlp {
    /// Builds a network with layer widths `sizes` (input first). Hidden layers use
    /// `hidden`, the last layer uses `output`.
    #[must_use]
    pub fn new<R>(sizes: &[usize], hidden: Activation, output: Activation, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        assert!(sizes.len() >= 2);
        let last = sizes.len() - 2;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let activation = if i == last { output } else { hidden };
                Dense::new(w[0], w[1], activation, rng)
            })
            .collect();
        Self { layers, step: 0 }
    }

    #[must_use]
    pub fn forward(&self, input: &DMatrix<f64>) -> DMatrix<f64> {
        self.forward_traced(input).0
    }

    #[must_use]
    pub fn forward_traced(&self, input: &DMatrix<f64>) -> (DMatrix<f64>, Trace) {
        let mut trace = Trace {
            inputs: vec![],
            pre_activations: vec![],
        };
        let mut current = input.clone();
        for layer in &self.layers {
            let z = layer.pre_activation(&current);
            let activation = layer.activation;
            let next = z.map(|v| activation.apply(v));
            trace.inputs.push(current);
            trace.pre_activations.push(z);
            current = next;
        }
        (current, trace)
    }

    /// Backpropagates `grad_output` (loss gradient w.r.t. the output) through the pass
    /// recorded in `trace`. Returns the per-layer gradients and the gradient w.r.t. the
    /// input.
    #[must_use]
    pub fn backward(&self, trace: &Trace, grad_output: DMatrix<f64>) -> (Vec<Gradient>, DMatrix<f64>) {
        let mut grads = Vec::with_capacity(self.layers.len());
        let mut grad = grad_output;
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let activation = layer.activation;
            let delta = grad.zip_map(&trace.pre_activations[i], |g, z| g * activation.derivative(z));
            grads.push(Gradient {
                weights: &delta * trace.inputs[i].transpose(),
                bias: delta.column_sum(),
            });
            grad = layer.weights.tr_mul(&delta);
        }
        grads.reverse();
        (grads, grad)
    }

    /// One Adam step with learning rate `lr`.
    pub fn apply(&mut self, grads: &[Gradient], lr: f64) {
        assert_eq!(grads.len(), self.layers.len());
        self.step = self.step.saturating_add(1);
        let correction1 = 1.0 - ADAM_BETA1.powi(self.step);
        let correction2 = 1.0 - ADAM_BETA2.powi(self.step);
        let update = |param: &mut f64, m: &mut f64, v: &mut f64, g: f64| {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = *m / correction1;
            let v_hat = *v / correction2;
            *param -= lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
        };
        for (layer, grad) in self.layers.iter_mut().zip(grads) {
            for (((w, m), v), g) in layer
                .weights
                .iter_mut()
                .zip(layer.m.weights.iter_mut())
                .zip(layer.v.weights.iter_mut())
                .zip(grad.weights.iter())
            {
                update(w, m, v, *g);
            }
            for (((b, m), v), g) in layer
                .bias
                .iter_mut()
                .zip(layer.m.bias.iter_mut())
                .zip(layer.v.bias.iter_mut())
                .zip(grad.bias.iter())
            {
                update(b, m, v, *g);
            }
        }
    }

    #[cfg(test)]
    fn weight_mut(&mut self, layer: usize, row: usize, col: usize) -> &mut f64 {
        &mut self.layers[layer].weights[(row, col)]
    }
}
