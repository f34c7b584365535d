use crate::{Activation, Error, Init, Layer, OutputsUnscaling, Result};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A feed-forward multilayer perceptron.
///
/// `layers` holds the hidden layers in order followed by the output layer. The raw
/// output layer activations go through [`OutputsUnscaling`] before they are returned
/// by [`Mlp::forward`].
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
    outputs_unscaling: OutputsUnscaling,
}

/// Reusable buffers for `Mlp::forward` and `Mlp::forward_with_derivatives`.
///
/// The output of the most recent forward pass lives inside `Scratch`.
#[derive(Debug, Clone)]
pub struct Scratch {
    layer_outputs: Vec<Vec<f64>>,
    layer_derivatives: Vec<Vec<f64>>,
    // Unscaled network output.
    output: Vec<f64>,
}

impl Mlp {
    /// Random network with `tanh` hidden layers and a linear output layer.
    ///
    /// `sizes` lists the input dimension, every hidden layer size and the output dimension.
    pub fn new_with_seed(sizes: &[usize], seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(sizes, &mut rng)
    }

    pub fn new_with_rng<R: Rng + ?Sized>(sizes: &[usize], rng: &mut R) -> Result<Self> {
        if sizes.len() < 2 {
            return Err(Error::InvalidConfig(
                "sizes must include input and output dims".to_owned(),
            ));
        }
        if sizes.contains(&0) {
            return Err(Error::InvalidConfig(
                "all layer sizes must be > 0".to_owned(),
            ));
        }

        let last = sizes.len() - 2;
        let mut layers = Vec::with_capacity(sizes.len() - 1);
        for (idx, w) in sizes.windows(2).enumerate() {
            let activation = if idx == last {
                Activation::Identity
            } else {
                Activation::Tanh
            };
            layers.push(Layer::new_with_rng(w[0], w[1], Init::Xavier, activation, rng)?);
        }
        Self::from_layers(layers)
    }

    /// Build a network from explicit layers (hidden layers first, output layer last).
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        let Some(output_layer) = layers.last() else {
            return Err(Error::InvalidConfig(
                "mlp must have at least one layer".to_owned(),
            ));
        };
        for (idx, pair) in layers.windows(2).enumerate() {
            if pair[1].in_dim() != pair[0].out_dim() {
                return Err(Error::InvalidShape(format!(
                    "layer {} in_dim {} does not match previous out_dim {}",
                    idx + 1,
                    pair[1].in_dim(),
                    pair[0].out_dim()
                )));
            }
        }

        let outputs_unscaling = OutputsUnscaling::none(output_layer.out_dim());
        Ok(Self {
            layers,
            outputs_unscaling,
        })
    }

    #[inline]
    pub fn inputs_number(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn outputs_number(&self) -> usize {
        self.output_layer().out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn hidden_layers_number(&self) -> usize {
        self.layers.len() - 1
    }

    pub fn hidden_layer_sizes(&self) -> Vec<usize> {
        self.hidden_layers().iter().map(Layer::out_dim).collect()
    }

    #[inline]
    pub fn hidden_layers(&self) -> &[Layer] {
        &self.layers[..self.layers.len() - 1]
    }

    #[inline]
    pub fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    #[inline]
    pub fn outputs_unscaling(&self) -> &OutputsUnscaling {
        &self.outputs_unscaling
    }

    pub fn set_outputs_unscaling(&mut self, unscaling: OutputsUnscaling) -> Result<()> {
        if unscaling.outputs_number() != self.outputs_number() {
            return Err(Error::InvalidShape(format!(
                "unscaling has {} outputs, model has {}",
                unscaling.outputs_number(),
                self.outputs_number()
            )));
        }
        unscaling.validate()?;
        self.outputs_unscaling = unscaling;
        Ok(())
    }

    pub fn parameters_number(&self) -> usize {
        self.layers.iter().map(Layer::parameters_number).sum()
    }

    /// All parameters, hidden layers first then the output layer.
    pub fn parameters(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.parameters_number()];
        let mut offset = 0;
        for layer in &self.layers {
            let n = layer.parameters_number();
            layer.write_parameters(&mut out[offset..offset + n]);
            offset += n;
        }
        out
    }

    pub fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        if parameters.len() != self.parameters_number() {
            return Err(Error::InvalidShape(format!(
                "parameters len {} does not match model parameters_number {}",
                parameters.len(),
                self.parameters_number()
            )));
        }

        let mut offset = 0;
        for layer in &mut self.layers {
            let n = layer.parameters_number();
            layer.read_parameters(&parameters[offset..offset + n]);
            offset += n;
        }
        Ok(())
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    /// Forward pass for a single sample.
    ///
    /// Writes intermediate activations into `scratch` and returns the unscaled output.
    ///
    /// Shape contract:
    /// - `input.len() == self.inputs_number()`
    /// - `scratch` must be built for this `Mlp`
    pub fn forward<'a>(&self, input: &[f64], scratch: &'a mut Scratch) -> &'a [f64] {
        self.assert_shapes(input, scratch);

        for (idx, layer) in self.layers.iter().enumerate() {
            let (left, right) = scratch.layer_outputs.split_at_mut(idx);
            let layer_input: &[f64] = if idx == 0 { input } else { &left[idx - 1] };
            layer.forward(layer_input, &mut right[0]);
        }

        self.unscale_into(scratch)
    }

    /// Forward pass that also records every layer's activation derivatives.
    ///
    /// Same shape contract as [`Mlp::forward`]. Read the results back through
    /// [`Scratch::activations`], [`Scratch::derivatives`] or [`Scratch::trace`].
    pub fn forward_with_derivatives<'a>(
        &self,
        input: &[f64],
        scratch: &'a mut Scratch,
    ) -> &'a [f64] {
        self.assert_shapes(input, scratch);

        for (idx, layer) in self.layers.iter().enumerate() {
            let (left, right) = scratch.layer_outputs.split_at_mut(idx);
            let layer_input: &[f64] = if idx == 0 { input } else { &left[idx - 1] };
            layer.forward_with_derivatives(
                layer_input,
                &mut right[0],
                &mut scratch.layer_derivatives[idx],
            );
        }

        self.unscale_into(scratch)
    }

    /// Shape-checked, non-panicking inference.
    pub fn predict_into(&self, input: &[f64], scratch: &mut Scratch, out: &mut [f64]) -> Result<()> {
        if input.len() != self.inputs_number() {
            return Err(Error::InvalidShape(format!(
                "input len {} does not match model inputs_number {}",
                input.len(),
                self.inputs_number()
            )));
        }
        if out.len() != self.outputs_number() {
            return Err(Error::InvalidShape(format!(
                "output len {} does not match model outputs_number {}",
                out.len(),
                self.outputs_number()
            )));
        }
        if !scratch.matches(self) {
            return Err(Error::InvalidShape(
                "scratch was not built for this model".to_owned(),
            ));
        }

        out.copy_from_slice(self.forward(input, scratch));
        Ok(())
    }

    /// Allocating convenience wrapper around [`Mlp::predict_into`].
    pub fn calculate_outputs(&self, input: &[f64]) -> Result<Vec<f64>> {
        let mut scratch = self.scratch();
        let mut out = vec![0.0; self.outputs_number()];
        self.predict_into(input, &mut scratch, &mut out)?;
        Ok(out)
    }

    fn unscale_into<'a>(&self, scratch: &'a mut Scratch) -> &'a [f64] {
        let last = self.layers.len() - 1;
        self.outputs_unscaling
            .unscale(&scratch.layer_outputs[last], &mut scratch.output);
        &scratch.output
    }

    fn assert_shapes(&self, input: &[f64], scratch: &Scratch) {
        assert_eq!(
            input.len(),
            self.inputs_number(),
            "input len {} does not match model inputs_number {}",
            input.len(),
            self.inputs_number()
        );
        assert!(
            scratch.matches(self),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );
    }
}

impl Scratch {
    pub fn new(mlp: &Mlp) -> Self {
        let mut layer_outputs = Vec::with_capacity(mlp.layers.len());
        let mut layer_derivatives = Vec::with_capacity(mlp.layers.len());
        for layer in &mlp.layers {
            layer_outputs.push(vec![0.0; layer.out_dim()]);
            layer_derivatives.push(vec![0.0; layer.out_dim()]);
        }
        Self {
            layer_outputs,
            layer_derivatives,
            output: vec![0.0; mlp.outputs_number()],
        }
    }

    /// Returns true if this scratch was built for a model with the same layer sizes.
    pub fn matches(&self, mlp: &Mlp) -> bool {
        self.layer_outputs.len() == mlp.layers.len()
            && self.layer_derivatives.len() == mlp.layers.len()
            && self.output.len() == mlp.outputs_number()
            && mlp.layers.iter().enumerate().all(|(idx, layer)| {
                self.layer_outputs[idx].len() == layer.out_dim()
                    && self.layer_derivatives[idx].len() == layer.out_dim()
            })
    }

    /// Unscaled output of the most recent forward pass.
    #[inline]
    pub fn output(&self) -> &[f64] {
        &self.output
    }

    #[inline]
    pub fn layers_number(&self) -> usize {
        self.layer_outputs.len()
    }

    /// Activations of layer `idx` (before unscaling for the output layer).
    #[inline]
    pub fn activations(&self, idx: usize) -> &[f64] {
        &self.layer_outputs[idx]
    }

    /// Activation derivatives of layer `idx`.
    ///
    /// Only meaningful after [`Mlp::forward_with_derivatives`].
    #[inline]
    pub fn derivatives(&self, idx: usize) -> &[f64] {
        &self.layer_derivatives[idx]
    }

    /// The `2H + 2` alternating sequence `[a_0, d_0, .., a_{H-1}, d_{H-1}, a_out, d_out]`.
    pub fn trace(&self) -> Vec<&[f64]> {
        self.layer_outputs
            .iter()
            .zip(&self.layer_derivatives)
            .flat_map(|(a, d)| [a.as_slice(), d.as_slice()])
            .collect()
    }
}
