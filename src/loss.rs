//! Loss functionals.
//!
//! A loss functional binds a model and a dataset and measures how well the model
//! maps the dataset's inputs to its targets, as a function of the model parameters.
//! Training algorithms only see the [`ObjectiveFunctional`] trait:
//!
//! - `loss()` over the training subset
//! - `validation_loss()` over the validation subset (zero when it is empty)
//! - `gradient()` of the training loss with respect to every parameter
//!
//! All variants share the backward pass in [`crate::backprop`]; each one only decides
//! how the loss is aggregated and how an instance's output error is scaled.

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::backprop::{LayerErrors, accumulate_gradient};
use crate::{Dataset, Error, Mlp, Result, Subset};

/// Smallest normalization coefficient or loss value that may be divided by.
pub const MIN_DIVISOR: f64 = 1e-99;

/// Scalar objective minimized by the training algorithms.
pub trait ObjectiveFunctional {
    fn parameters_number(&self) -> usize;

    fn parameters(&self) -> Vec<f64>;

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()>;

    /// Loss over the training instances at the current parameters.
    fn loss(&self) -> Result<f64>;

    /// Loss over the validation instances; `0.0` when there are none.
    fn validation_loss(&self) -> Result<f64>;

    /// Gradient of [`ObjectiveFunctional::loss`], laid out like the parameters.
    fn gradient(&self) -> Result<Vec<f64>>;

    /// Training loss at `parameters`. The current parameters are restored afterwards.
    fn loss_at(&mut self, parameters: &[f64]) -> Result<f64> {
        let saved = self.parameters();
        self.set_parameters(parameters)?;
        let loss = self.loss();
        self.set_parameters(&saved)?;
        loss
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Supported loss functions.
pub enum Loss {
    /// `sum_i ||y_i - t_i||^2`.
    SumSquaredError,
    /// Sum squared error divided by `sum_i ||t_i - mean(t)||^2`.
    ///
    /// A value of 1 means the model does no better than predicting the target mean.
    #[default]
    NormalizedSquaredError,
    /// `sqrt(sum_i ||y_i - t_i||^2 / n)`.
    RootMeanSquaredError,
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SumSquaredError" => Ok(Loss::SumSquaredError),
            "NormalizedSquaredError" => Ok(Loss::NormalizedSquaredError),
            "RootMeanSquaredError" => Ok(Loss::RootMeanSquaredError),
            other => Err(Error::ConfigurationMismatch(format!(
                "unknown loss functional: {other}"
            ))),
        }
    }
}

/// Squared Euclidean distance between a prediction and its target.
///
/// Shape contract: `pred.len() == target.len()`.
#[inline]
pub fn squared_error(pred: &[f64], target: &[f64]) -> f64 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );

    let mut sum_sq = 0.0_f64;
    for (&y, &t) in pred.iter().zip(target) {
        let diff = y - t;
        sum_sq = diff.mul_add(diff, sum_sq);
    }
    sum_sq
}

/// A [`Loss`] bound to a model and the dataset it is trained on.
///
/// The functional borrows the model mutably so training can update its parameters
/// in place; drop the functional to get the trained model back.
#[derive(Debug)]
pub struct LossFunctional<'a> {
    loss: Loss,
    mlp: &'a mut Mlp,
    data: &'a Dataset,
}

impl<'a> LossFunctional<'a> {
    pub fn new(loss: Loss, mlp: &'a mut Mlp, data: &'a Dataset) -> Result<Self> {
        if mlp.inputs_number() != data.input_dim() {
            return Err(Error::ConfigurationMismatch(format!(
                "model inputs_number {} does not match dataset input variables {}",
                mlp.inputs_number(),
                data.input_dim()
            )));
        }
        if mlp.outputs_number() != data.target_dim() {
            return Err(Error::ConfigurationMismatch(format!(
                "model outputs_number {} does not match dataset target variables {}",
                mlp.outputs_number(),
                data.target_dim()
            )));
        }
        Ok(Self { loss, mlp, data })
    }

    #[inline]
    pub fn kind(&self) -> Loss {
        self.loss
    }

    #[inline]
    pub fn mlp(&self) -> &Mlp {
        &*self.mlp
    }

    #[inline]
    pub fn dataset(&self) -> &Dataset {
        self.data
    }

    /// `sum_i ||t_i - mean||^2` over `subset`, with the mean taken over the same subset.
    pub fn normalization_coefficient(&self, subset: Subset) -> f64 {
        let mean = self.data.target_mean(subset);
        (0..self.data.subset_len(subset))
            .map(|i| squared_error(self.data.subset_target(subset, i), &mean))
            .sum()
    }

    /// Sum squared error of the model over `subset`.
    pub fn sum_squared_error(&self, subset: Subset) -> f64 {
        let mut scratch = self.mlp.scratch();
        let mut total = 0.0_f64;
        for i in 0..self.data.subset_len(subset) {
            let output = self.mlp.forward(self.data.subset_input(subset, i), &mut scratch);
            total += squared_error(output, self.data.subset_target(subset, i));
        }
        total
    }

    fn subset_loss(&self, subset: Subset) -> Result<f64> {
        let n = self.data.subset_len(subset);
        match self.loss {
            Loss::SumSquaredError => Ok(self.sum_squared_error(subset)),
            Loss::NormalizedSquaredError => {
                let coefficient = self.checked_coefficient(subset)?;
                Ok(self.sum_squared_error(subset) / coefficient)
            }
            Loss::RootMeanSquaredError => {
                if n == 0 {
                    return Err(Error::DegenerateNumeric(format!(
                        "root mean squared error needs at least one {subset:?} instance"
                    )));
                }
                Ok((self.sum_squared_error(subset) / n as f64).sqrt())
            }
        }
    }

    fn checked_coefficient(&self, subset: Subset) -> Result<f64> {
        if self.data.subset_len(subset) == 0 {
            return Err(Error::DegenerateNumeric(format!(
                "normalized squared error needs at least one {subset:?} instance"
            )));
        }
        let coefficient = self.normalization_coefficient(subset);
        if coefficient < MIN_DIVISOR {
            return Err(Error::DegenerateNumeric(format!(
                "{subset:?} normalization coefficient {coefficient:e} is too small"
            )));
        }
        Ok(coefficient)
    }

    /// Factor `c` such that the output error of an instance is
    /// `c * (y - t) * unscaling slope * activation derivative`.
    ///
    /// `None` means the gradient is exactly zero.
    fn output_error_factor(&self) -> Result<Option<f64>> {
        match self.loss {
            Loss::SumSquaredError => Ok(Some(2.0)),
            Loss::NormalizedSquaredError => {
                let coefficient = self.checked_coefficient(Subset::Training)?;
                Ok(Some(2.0 / coefficient))
            }
            Loss::RootMeanSquaredError => {
                let loss = self.subset_loss(Subset::Training)?;
                if loss == 0.0 {
                    // Every output matches its target.
                    return Ok(None);
                }
                if loss < MIN_DIVISOR {
                    return Err(Error::DegenerateNumeric(format!(
                        "root mean squared error {loss:e} is too small to differentiate"
                    )));
                }
                let n = self.data.training_len() as f64;
                Ok(Some(1.0 / (n * loss)))
            }
        }
    }
}

impl ObjectiveFunctional for LossFunctional<'_> {
    fn parameters_number(&self) -> usize {
        self.mlp.parameters_number()
    }

    fn parameters(&self) -> Vec<f64> {
        self.mlp.parameters()
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        self.mlp.set_parameters(parameters)
    }

    fn loss(&self) -> Result<f64> {
        self.subset_loss(Subset::Training)
    }

    fn validation_loss(&self) -> Result<f64> {
        if self.data.validation_len() == 0 {
            return Ok(0.0);
        }
        self.subset_loss(Subset::Validation)
    }

    fn gradient(&self) -> Result<Vec<f64>> {
        let mut gradient = vec![0.0; self.mlp.parameters_number()];
        let Some(factor) = self.output_error_factor()? else {
            return Ok(gradient);
        };

        let mlp: &Mlp = &*self.mlp;
        let unscaling = mlp.outputs_unscaling();
        let last = mlp.num_layers() - 1;
        let mut scratch = mlp.scratch();
        let mut errors = LayerErrors::new(mlp);

        for i in 0..self.data.training_len() {
            let input = self.data.training_input(i);
            let target = self.data.training_target(i);
            mlp.forward_with_derivatives(input, &mut scratch);

            let output = scratch.output();
            let derivatives = scratch.derivatives(last);
            let output_errors = errors.output_errors_mut();
            for k in 0..output_errors.len() {
                output_errors[k] = factor
                    * (output[k] - target[k])
                    * unscaling.derivative_multiplier(k)
                    * derivatives[k];
            }

            accumulate_gradient(mlp, input, &scratch, &mut errors, &mut gradient)?;
        }

        Ok(gradient)
    }
}
