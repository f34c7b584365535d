//! Activation functions.
//!
//! Every neuron of a layer applies the same function to its combination
//! `z = b + w . x`. The derivative-augmented forward pass keeps `dy/dz` next to
//! `y`, and since all supported functions have a derivative that can be written
//! in terms of `y` alone, the combinations are never stored.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
/// Element-wise activation function of a layer.
pub enum Activation {
    /// `tanh(z)`.
    Tanh,
    /// `max(z, 0)`.
    ReLU,
    /// `z` for positive combinations, `alpha * z` otherwise.
    LeakyReLU { alpha: f64 },
    /// Logistic function `1 / (1 + exp(-z))`.
    Sigmoid,
    /// Linear output.
    Identity,
}

impl Activation {
    /// Reject parameters that would make the derivative meaningless.
    pub fn validate(self) -> Result<()> {
        if let Activation::LeakyReLU { alpha } = self {
            if !(alpha.is_finite() && alpha >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                )));
            }
        }
        Ok(())
    }

    /// Tagged name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Activation::Tanh => "HyperbolicTangent",
            Activation::ReLU => "RectifiedLinear",
            Activation::LeakyReLU { .. } => "LeakyReLU",
            Activation::Sigmoid => "Logistic",
            Activation::Identity => "Linear",
        }
    }

    /// Activation of a single combination.
    #[inline]
    pub fn calculate(self, combination: f64) -> f64 {
        match self {
            Activation::Tanh => combination.tanh(),
            Activation::ReLU => combination.max(0.0),
            Activation::LeakyReLU { alpha } if combination <= 0.0 => alpha * combination,
            Activation::LeakyReLU { .. } | Activation::Identity => combination,
            Activation::Sigmoid => logistic(combination),
        }
    }

    /// `dy/dz` written in terms of the activation `y`.
    #[inline]
    pub fn derivative_from_output(self, activation: f64) -> f64 {
        match self {
            Activation::Tanh => 1.0 - activation * activation,
            Activation::Sigmoid => activation * (1.0 - activation),
            Activation::ReLU if activation > 0.0 => 1.0,
            Activation::ReLU => 0.0,
            Activation::LeakyReLU { alpha } if activation <= 0.0 => alpha,
            Activation::LeakyReLU { .. } | Activation::Identity => 1.0,
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Activation {
    type Err = Error;

    /// `LeakyReLU` parses with `alpha = 0.01`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HyperbolicTangent" | "Tanh" => Ok(Activation::Tanh),
            "Logistic" | "Sigmoid" => Ok(Activation::Sigmoid),
            "Linear" | "Identity" => Ok(Activation::Identity),
            "RectifiedLinear" | "ReLU" => Ok(Activation::ReLU),
            "LeakyReLU" => Ok(Activation::LeakyReLU { alpha: 0.01 }),
            other => Err(Error::ConfigurationMismatch(format!(
                "unknown activation function: {other}"
            ))),
        }
    }
}

#[inline]
fn logistic(z: f64) -> f64 {
    // exp of a non-positive argument only, so large |z| cannot overflow.
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
