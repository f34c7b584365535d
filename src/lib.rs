//! Line-search training for small multi-layer perceptrons.
//!
//! `rust-mlp-train` trains a dense feed-forward network by minimizing a loss functional
//! over its whole parameter vector with second-order-flavoured batch methods:
//!
//! - [`ConjugateGradient`] (Polak-Ribiere or Fletcher-Reeves, with Powell-Beale and
//!   periodic restarts)
//! - [`QuasiNewtonMethod`] (DFP or BFGS inverse Hessian approximation)
//!
//! Both share one epoch loop: a unit-norm training direction, a bracketing line search
//! along it, and a fixed set of stopping criteria. See [`training`].
//!
//! # Loss functionals
//!
//! [`LossFunctional`] binds an [`Mlp`] and a [`Dataset`] and implements
//! [`ObjectiveFunctional`] for one of three [`Loss`] variants: sum squared error,
//! normalized squared error and root mean squared error. Gradients come from a single
//! shared backward pass ([`backprop`]).
//!
//! # Panics vs `Result`
//!
//! - Low-level hot path (panics on misuse): [`Mlp::forward`],
//!   [`Mlp::forward_with_derivatives`]. Shape mismatches are
//!   programmer error and panic via `assert!`.
//! - Everything reachable from `train()` and the loss functionals validates its inputs
//!   and returns [`Result`].
//!
//! # Data layout
//!
//! - Scalars are `f64`.
//! - [`Dataset`] stores instances contiguously in row-major layout.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//! - The flat parameter vector lists every layer in order, each neuron as
//!   `[bias, w_0, .., w_{in-1}]`.
//!
//! # Logging
//!
//! Training reports progress and stopping conditions through [`tracing`]. No subscriber
//! is installed by the library.
//!
//! # Quick start
//!
//! ```rust
//! use rust_mlp_train::{Activation, Dataset, Loss, LossFunctional, MlpBuilder, QuasiNewtonMethod};
//!
//! # fn main() -> rust_mlp_train::Result<()> {
//! let xs: Vec<Vec<f64>> = (0..8).map(|i| vec![-1.0 + 2.0 * i as f64 / 7.0]).collect();
//! let data = Dataset::from_rows(&xs, &xs)?;
//!
//! let mut mlp = MlpBuilder::new(1)?
//!     .add_layer(3, Activation::Tanh)?
//!     .add_layer(1, Activation::Identity)?
//!     .build_with_seed(0)?;
//!
//! let mut objective = LossFunctional::new(Loss::NormalizedSquaredError, &mut mlp, &data)?;
//! let mut qn = QuasiNewtonMethod::default();
//! qn.config_mut().stopping.max_epochs = 50;
//! qn.config_mut().display = false;
//!
//! let report = qn.train(&mut objective)?;
//! assert!(report.epochs <= 51);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod backprop;
pub mod builder;
pub mod conjugate_gradient;
pub mod data;
pub mod error;
pub mod history;
pub mod layer;
pub mod line_search;
pub mod loss;
pub(crate) mod matmul;
pub mod matrix;
pub mod mlp;
pub mod quasi_newton;
pub mod scaling;
pub mod training;
pub mod vector;

#[cfg(feature = "serde")]
pub mod serde_model;

#[cfg(test)]
mod test_support;

pub use activation::Activation;
pub use builder::MlpBuilder;
pub use conjugate_gradient::{
    ConjugateDirectionMethod, ConjugateGradient, POWELL_BEALE_RESTART_THRESHOLD,
};
pub use data::{Dataset, Subset};
pub use error::{Error, Result};
pub use history::{HistoryReservation, MAX_RESERVED_EPOCHS, TrainingHistory};
pub use layer::{Init, Layer};
pub use line_search::{LineSearch, TrainingRateMethod};
pub use loss::{Loss, LossFunctional, ObjectiveFunctional};
pub use matrix::Matrix;
pub use mlp::{Mlp, Scratch};
pub use quasi_newton::{InverseHessianMethod, QuasiNewtonMethod};
pub use scaling::{OutputsUnscaling, ScalingMethod, VariableStatistics};
pub use training::{StoppingCondition, StoppingCriteria, Thresholds, TrainingConfig, TrainingReport};

/// Shape-safe inference.
///
/// Thin wrapper around [`Mlp::predict_into`].
pub fn predict_into(
    mlp: &Mlp,
    input: &[f64],
    scratch: &mut Scratch,
    out: &mut [f64],
) -> Result<()> {
    mlp.predict_into(input, scratch, out)
}
