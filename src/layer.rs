use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::{Activation, Error, Result};

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// All weights and biases zero.
    Zeros,
    /// Xavier/Glorot uniform, `limit = sqrt(6 / (in + out))`.
    Xavier,
    /// He/Kaiming uniform, `limit = sqrt(6 / in)`.
    He,
}

/// A fully connected layer of perceptrons.
#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl Layer {
    #[inline]
    pub fn new(in_dim: usize, out_dim: usize, activation: Activation) -> Self {
        let weights = vec![0.0; in_dim * out_dim];
        let biases = vec![0.0; out_dim];
        Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases,
        }
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        activation.validate()?;

        let mut layer = Self::new(in_dim, out_dim, activation);
        let limit = match init {
            Init::Zeros => return Ok(layer),
            Init::Xavier => (6.0 / (in_dim + out_dim) as f64).sqrt(),
            Init::He => (6.0 / in_dim as f64).sqrt(),
        };

        let dist = Uniform::new(-limit, limit);
        for w in &mut layer.weights {
            *w = dist.sample(rng);
        }
        Ok(layer)
    }

    /// Build a layer from explicit parameters.
    ///
    /// `weights` is row-major with shape `(out_dim, in_dim)`.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f64>,
        biases: Vec<f64>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }
        activation.validate()?;

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f64] {
        &mut self.biases
    }

    /// Weight of the connection from input `i` into neuron `o`.
    #[inline]
    pub fn weight(&self, o: usize, i: usize) -> f64 {
        self.weights[o * self.in_dim + i]
    }

    /// Number of trainable parameters: one bias plus `in_dim` weights per neuron.
    #[inline]
    pub fn parameters_number(&self) -> usize {
        self.out_dim * (self.in_dim + 1)
    }

    /// Writes the parameters neuron by neuron as `[bias, w_0, .., w_{in-1}]`.
    ///
    /// Shape contract: `out.len() == self.parameters_number()`.
    pub fn write_parameters(&self, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.parameters_number());

        let stride = self.in_dim + 1;
        for o in 0..self.out_dim {
            let dst = &mut out[o * stride..(o + 1) * stride];
            dst[0] = self.biases[o];
            dst[1..].copy_from_slice(&self.weights[o * self.in_dim..(o + 1) * self.in_dim]);
        }
    }

    /// Inverse of [`Layer::write_parameters`].
    pub fn read_parameters(&mut self, src: &[f64]) {
        debug_assert_eq!(src.len(), self.parameters_number());

        let stride = self.in_dim + 1;
        for o in 0..self.out_dim {
            let row = &src[o * stride..(o + 1) * stride];
            self.biases[o] = row[0];
            self.weights[o * self.in_dim..(o + 1) * self.in_dim].copy_from_slice(&row[1..]);
        }
    }

    /// Forward pass for a single sample.
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`
    /// - `outputs.len() == self.out_dim`
    #[inline]
    pub fn forward(&self, inputs: &[f64], outputs: &mut [f64]) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);

        for o in 0..self.out_dim {
            outputs[o] = self.activation.calculate(self.combination(inputs, o));
        }
    }

    /// Forward pass that also writes the activation derivative of every neuron.
    #[inline]
    pub fn forward_with_derivatives(
        &self,
        inputs: &[f64],
        outputs: &mut [f64],
        derivatives: &mut [f64],
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);
        debug_assert_eq!(derivatives.len(), self.out_dim);

        for o in 0..self.out_dim {
            let y = self.activation.calculate(self.combination(inputs, o));
            outputs[o] = y;
            derivatives[o] = self.activation.derivative_from_output(y);
        }
    }

    #[inline]
    fn combination(&self, inputs: &[f64], o: usize) -> f64 {
        let mut sum = self.biases[o];
        let row = o * self.in_dim;
        for i in 0..self.in_dim {
            sum = self.weights[row + i].mul_add(inputs[i], sum);
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn parameters_round_trip_through_flat_layout() {
        let layer = Layer::from_parts(
            2,
            2,
            Activation::Identity,
            vec![1.0, 2.0, 3.0, 4.0],
            vec![0.5, -0.5],
        )
        .unwrap();

        let mut flat = vec![0.0; layer.parameters_number()];
        layer.write_parameters(&mut flat);
        assert_eq!(flat, vec![0.5, 1.0, 2.0, -0.5, 3.0, 4.0]);

        let mut other = Layer::new(2, 2, Activation::Identity);
        other.read_parameters(&flat);
        assert_eq!(other.weights(), layer.weights());
        assert_eq!(other.biases(), layer.biases());
    }

    #[test]
    fn derivatives_follow_activation() {
        let layer = Layer::from_parts(1, 1, Activation::Tanh, vec![1.0], vec![0.0]).unwrap();
        let mut y = [0.0];
        let mut d = [0.0];
        layer.forward_with_derivatives(&[0.5], &mut y, &mut d);
        assert!((y[0] - 0.5_f64.tanh()).abs() < 1e-12);
        assert!((d[0] - (1.0 - y[0] * y[0])).abs() < 1e-12);
    }

    #[test]
    fn xavier_init_stays_within_limit() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Layer::new_with_rng(3, 4, Init::Xavier, Activation::Tanh, &mut rng).unwrap();
        let limit = (6.0 / 7.0_f64).sqrt();
        assert!(layer.weights().iter().all(|w| w.abs() <= limit));
        assert!(layer.biases().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn from_parts_rejects_bad_shapes() {
        assert!(Layer::from_parts(2, 1, Activation::Tanh, vec![1.0], vec![0.0]).is_err());
        assert!(Layer::from_parts(1, 1, Activation::Tanh, vec![f64::NAN], vec![0.0]).is_err());
    }
}
