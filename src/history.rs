//! Per-epoch training history.
//!
//! Each sequence is recorded only when its reservation flag is set. Reserved
//! sequences are sized once to `max_epochs + 1` entries when training starts and
//! truncated to the number of epochs actually run when it stops.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Matrix;

/// Largest `max_epochs` accepted while any sequence is reserved, since reserved
/// sequences are allocated up front.
pub const MAX_RESERVED_EPOCHS: usize = 1 << 24;

/// Which sequences of [`TrainingHistory`] to record.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryReservation {
    pub parameters: bool,
    pub parameters_norm: bool,
    pub loss: bool,
    pub validation_loss: bool,
    pub gradient: bool,
    pub gradient_norm: bool,
    pub training_direction: bool,
    pub training_rate: bool,
    pub elapsed_time: bool,
    /// Only recorded by the quasi-Newton method.
    pub inverse_hessian: bool,
}

impl HistoryReservation {
    /// Reserve every sequence.
    pub fn all() -> Self {
        Self {
            parameters: true,
            parameters_norm: true,
            loss: true,
            validation_loss: true,
            gradient: true,
            gradient_norm: true,
            training_direction: true,
            training_rate: true,
            elapsed_time: true,
            inverse_hessian: true,
        }
    }

    /// Whether at least one sequence is reserved.
    pub fn any(&self) -> bool {
        *self != Self::default()
    }

    /// Reserve the scalar sequences only.
    pub fn scalars() -> Self {
        Self {
            parameters_norm: true,
            loss: true,
            validation_loss: true,
            gradient_norm: true,
            training_rate: true,
            elapsed_time: true,
            ..Self::default()
        }
    }
}

/// Values recorded at the end of one epoch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EpochRecord<'a> {
    pub parameters: &'a [f64],
    pub parameters_norm: f64,
    pub loss: f64,
    pub validation_loss: f64,
    pub gradient: &'a [f64],
    pub gradient_norm: f64,
    pub training_direction: &'a [f64],
    pub training_rate: f64,
    pub elapsed_time: f64,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub parameters: Vec<Vec<f64>>,
    pub parameters_norm: Vec<f64>,
    pub loss: Vec<f64>,
    pub validation_loss: Vec<f64>,
    pub gradient: Vec<Vec<f64>>,
    pub gradient_norm: Vec<f64>,
    pub training_direction: Vec<Vec<f64>>,
    pub training_rate: Vec<f64>,
    pub elapsed_time: Vec<f64>,
    pub inverse_hessian: Vec<Matrix>,
}

fn sized<T: Clone>(reserved: bool, len: usize, fill: T) -> Vec<T> {
    if reserved { vec![fill; len] } else { Vec::new() }
}

fn put<T>(seq: &mut [T], epoch: usize, value: impl FnOnce() -> T) {
    if let Some(slot) = seq.get_mut(epoch) {
        *slot = value();
    }
}

impl TrainingHistory {
    /// Allocate the reserved sequences for `max_epochs + 1` entries.
    ///
    /// Training rejects `max_epochs > MAX_RESERVED_EPOCHS` before calling this when
    /// anything is reserved.
    pub fn with_reservation(reserve: &HistoryReservation, max_epochs: usize) -> Self {
        let len = max_epochs.saturating_add(1);
        Self {
            parameters: sized(reserve.parameters, len, Vec::new()),
            parameters_norm: sized(reserve.parameters_norm, len, 0.0),
            loss: sized(reserve.loss, len, 0.0),
            validation_loss: sized(reserve.validation_loss, len, 0.0),
            gradient: sized(reserve.gradient, len, Vec::new()),
            gradient_norm: sized(reserve.gradient_norm, len, 0.0),
            training_direction: sized(reserve.training_direction, len, Vec::new()),
            training_rate: sized(reserve.training_rate, len, 0.0),
            elapsed_time: sized(reserve.elapsed_time, len, 0.0),
            inverse_hessian: sized(reserve.inverse_hessian, len, Matrix::zeros(0, 0)),
        }
    }

    pub(crate) fn record(&mut self, epoch: usize, r: &EpochRecord<'_>) {
        put(&mut self.parameters, epoch, || r.parameters.to_vec());
        put(&mut self.parameters_norm, epoch, || r.parameters_norm);
        put(&mut self.loss, epoch, || r.loss);
        put(&mut self.validation_loss, epoch, || r.validation_loss);
        put(&mut self.gradient, epoch, || r.gradient.to_vec());
        put(&mut self.gradient_norm, epoch, || r.gradient_norm);
        put(&mut self.training_direction, epoch, || {
            r.training_direction.to_vec()
        });
        put(&mut self.training_rate, epoch, || r.training_rate);
        put(&mut self.elapsed_time, epoch, || r.elapsed_time);
    }

    pub(crate) fn record_inverse_hessian(&mut self, epoch: usize, matrix: &Matrix) {
        put(&mut self.inverse_hessian, epoch, || matrix.clone());
    }

    /// Keep the first `len` entries of every reserved sequence.
    pub fn truncate(&mut self, len: usize) {
        self.parameters.truncate(len);
        self.parameters_norm.truncate(len);
        self.loss.truncate(len);
        self.validation_loss.truncate(len);
        self.gradient.truncate(len);
        self.gradient_norm.truncate(len);
        self.training_direction.truncate(len);
        self.training_rate.truncate(len);
        self.elapsed_time.truncate(len);
        self.inverse_hessian.truncate(len);
    }
}
