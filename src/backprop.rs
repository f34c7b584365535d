//! Backpropagation shared by every loss functional.
//!
//! The loss variants differ only in how they turn an instance's output error into
//! output-layer sensitivities (`dL/dz` of the output neurons). Everything after that,
//! the propagation to the hidden layers and the accumulation of the per-layer
//! bias/weight gradients, lives here once.

use crate::{Error, Mlp, Result, Scratch};

/// Per-layer error (sensitivity) buffers, one per layer including the output layer.
///
/// Allocate once per gradient evaluation and reuse across instances.
#[derive(Debug, Clone)]
pub struct LayerErrors {
    errors: Vec<Vec<f64>>,
}

impl LayerErrors {
    pub fn new(mlp: &Mlp) -> Self {
        Self {
            errors: mlp.layers().iter().map(|l| vec![0.0; l.out_dim()]).collect(),
        }
    }

    /// Output layer sensitivities; the loss writes into this before [`accumulate_gradient`].
    #[inline]
    pub fn output_errors_mut(&mut self) -> &mut [f64] {
        self.errors
            .last_mut()
            .expect("mlp must have at least one layer")
            .as_mut_slice()
    }

    #[inline]
    pub fn output_errors(&self) -> &[f64] {
        self.errors
            .last()
            .expect("mlp must have at least one layer")
            .as_slice()
    }

    /// Sensitivities of hidden layer `idx`, valid after [`accumulate_gradient`].
    #[inline]
    pub fn hidden_errors(&self, idx: usize) -> &[f64] {
        &self.errors[idx]
    }
}

/// Propagate the output errors already stored in `errors` back through the hidden
/// layers and add this instance's contribution to `gradient`.
///
/// `scratch` must hold the result of [`Mlp::forward_with_derivatives`] for `input`.
/// `gradient` uses the same layout as [`Mlp::parameters`].
pub fn accumulate_gradient(
    mlp: &Mlp,
    input: &[f64],
    scratch: &Scratch,
    errors: &mut LayerErrors,
    gradient: &mut [f64],
) -> Result<()> {
    check_shapes(mlp, input, scratch, errors, gradient)?;

    let layers = mlp.layers();

    // Hidden errors, from the last hidden layer toward the input.
    for idx in (0..layers.len() - 1).rev() {
        let next = &layers[idx + 1];
        let (left, right) = errors.errors.split_at_mut(idx + 1);
        let current = &mut left[idx];
        let next_errors = &right[0];
        let derivatives = scratch.derivatives(idx);

        for (j, e) in current.iter_mut().enumerate() {
            let mut sum = 0.0_f64;
            for (k, &next_error) in next_errors.iter().enumerate() {
                sum = next.weight(k, j).mul_add(next_error, sum);
            }
            *e = derivatives[j] * sum;
        }
    }

    // Bias and weight gradients, neuron by neuron as `[bias, w_0 .. w_{in-1}]`.
    let mut offset = 0;
    for (idx, layer) in layers.iter().enumerate() {
        let layer_input: &[f64] = if idx == 0 {
            input
        } else {
            scratch.activations(idx - 1)
        };
        let stride = layer.in_dim() + 1;

        for (o, &error) in errors.errors[idx].iter().enumerate() {
            let row = &mut gradient[offset + o * stride..offset + (o + 1) * stride];
            row[0] += error;
            for (g, &x) in row[1..].iter_mut().zip(layer_input) {
                *g = error.mul_add(x, *g);
            }
        }
        offset += layer.parameters_number();
    }

    Ok(())
}

fn check_shapes(
    mlp: &Mlp,
    input: &[f64],
    scratch: &Scratch,
    errors: &LayerErrors,
    gradient: &[f64],
) -> Result<()> {
    if input.len() != mlp.inputs_number() {
        return Err(Error::InvalidShape(format!(
            "input len {} does not match model inputs_number {}",
            input.len(),
            mlp.inputs_number()
        )));
    }
    if !scratch.matches(mlp) {
        return Err(Error::InvalidShape(format!(
            "forward trace has {} layers, model has {}",
            scratch.layers_number(),
            mlp.num_layers()
        )));
    }
    let errors_match = errors.errors.len() == mlp.num_layers()
        && errors
            .errors
            .iter()
            .zip(mlp.layers())
            .all(|(e, l)| e.len() == l.out_dim());
    if !errors_match {
        return Err(Error::InvalidShape(
            "layer error buffers were not built for this model".to_owned(),
        ));
    }
    if gradient.len() != mlp.parameters_number() {
        return Err(Error::InvalidShape(format!(
            "gradient len {} does not match model parameters_number {}",
            gradient.len(),
            mlp.parameters_number()
        )));
    }
    Ok(())
}
