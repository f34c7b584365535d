//! Conjugate gradient training.
//!
//! Directions are built from the current gradient and the previous direction:
//!
//! `d = normalize(-g / ||g|| + beta * d_old)`
//!
//! with `beta` from the Polak-Ribiere or Fletcher-Reeves formula. The method falls back to
//! steepest descent on the first epoch, every `restart_period` epochs, and whenever
//! consecutive gradients are far from orthogonal (Powell-Beale restart).

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::loss::ObjectiveFunctional;
use crate::training::{self, DirectionRule, EpochState};
use crate::vector::{add_scaled, dot, normalize, steepest_descent_direction};
use crate::{Error, Result, TrainingConfig, TrainingHistory, TrainingReport};

/// Restart when `|g_old . g| >= POWELL_BEALE_RESTART_THRESHOLD * (g . g)`.
pub const POWELL_BEALE_RESTART_THRESHOLD: f64 = 0.2;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConjugateDirectionMethod {
    #[default]
    PolakRibiere,
    FletcherReeves,
}

impl FromStr for ConjugateDirectionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PolakRibiere" => Ok(ConjugateDirectionMethod::PolakRibiere),
            "FletcherReeves" => Ok(ConjugateDirectionMethod::FletcherReeves),
            other => Err(Error::ConfigurationMismatch(format!(
                "unknown training direction method: {other}"
            ))),
        }
    }
}

fn clamp_unit(beta: f64) -> f64 {
    beta.clamp(0.0, 1.0)
}

/// `beta = (g . g) / (g_old . g_old)`, clamped to `[0, 1]`.
pub fn fletcher_reeves_parameter(old_gradient: &[f64], gradient: &[f64]) -> f64 {
    let denominator = dot(old_gradient, old_gradient);
    if denominator == 0.0 {
        return 0.0;
    }
    clamp_unit(dot(gradient, gradient) / denominator)
}

/// `beta = ((g - g_old) . g) / (g_old . g_old)`, clamped to `[0, 1]`.
pub fn polak_ribiere_parameter(old_gradient: &[f64], gradient: &[f64]) -> f64 {
    let denominator = dot(old_gradient, old_gradient);
    if denominator == 0.0 {
        return 0.0;
    }
    let numerator = dot(gradient, gradient) - dot(old_gradient, gradient);
    clamp_unit(numerator / denominator)
}

#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    config: TrainingConfig,
    method: ConjugateDirectionMethod,
    restart_threshold: f64,
    restart_period: Option<usize>,
    history: TrainingHistory,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

impl ConjugateGradient {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            method: ConjugateDirectionMethod::default(),
            restart_threshold: POWELL_BEALE_RESTART_THRESHOLD,
            restart_period: None,
            history: TrainingHistory::default(),
        }
    }

    pub fn with_method(mut self, method: ConjugateDirectionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TrainingConfig {
        &mut self.config
    }

    pub fn method(&self) -> ConjugateDirectionMethod {
        self.method
    }

    pub fn set_method(&mut self, method: ConjugateDirectionMethod) {
        self.method = method;
    }

    pub fn restart_threshold(&self) -> f64 {
        self.restart_threshold
    }

    pub fn set_restart_threshold(&mut self, threshold: f64) {
        self.restart_threshold = threshold;
    }

    /// Restart period in epochs; `None` restarts every `parameters_number` epochs.
    pub fn restart_period(&self) -> Option<usize> {
        self.restart_period
    }

    pub fn set_restart_period(&mut self, period: Option<usize>) {
        self.restart_period = period;
    }

    /// History of the last call to [`ConjugateGradient::train`].
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    pub fn conjugate_parameter(&self, old_gradient: &[f64], gradient: &[f64]) -> f64 {
        match self.method {
            ConjugateDirectionMethod::PolakRibiere => {
                polak_ribiere_parameter(old_gradient, gradient)
            }
            ConjugateDirectionMethod::FletcherReeves => {
                fletcher_reeves_parameter(old_gradient, gradient)
            }
        }
    }

    fn restarts_at(&self, epoch: usize, old_gradient: &[f64], gradient: &[f64]) -> bool {
        if epoch == 0 || old_gradient.len() != gradient.len() {
            return true;
        }
        let period = self.restart_period.unwrap_or(gradient.len());
        if epoch.checked_rem(period) == Some(0) {
            return true;
        }
        dot(old_gradient, gradient).abs() >= self.restart_threshold * dot(gradient, gradient)
    }

    /// Unit-norm training direction for `epoch`.
    ///
    /// `old_gradient` and `old_direction` belong to the previous epoch and are ignored
    /// on restart epochs.
    pub fn training_direction(
        &self,
        epoch: usize,
        old_gradient: &[f64],
        gradient: &[f64],
        old_direction: &[f64],
    ) -> Vec<f64> {
        let steepest = steepest_descent_direction(gradient);
        if self.restarts_at(epoch, old_gradient, gradient) || old_direction.len() != gradient.len()
        {
            return steepest;
        }

        let beta = self.conjugate_parameter(old_gradient, gradient);
        let mut direction = add_scaled(&steepest, beta, old_direction);
        normalize(&mut direction);
        direction
    }

    /// Train `objective` in place until a stopping criterion fires.
    pub fn train<O: ObjectiveFunctional + ?Sized>(
        &mut self,
        objective: &mut O,
    ) -> Result<TrainingReport> {
        if !(self.restart_threshold.is_finite() && self.restart_threshold >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "restart threshold must be finite and >= 0, got {}",
                self.restart_threshold
            )));
        }

        let mut history = TrainingHistory::default();
        let result = training::run(
            "conjugate gradient",
            &self.config,
            objective,
            &mut Rule(&*self),
            &mut history,
        );
        self.history = history;
        result
    }
}

struct Rule<'a>(&'a ConjugateGradient);

impl DirectionRule for Rule<'_> {
    fn direction(&mut self, epoch: usize, state: &EpochState<'_>) -> Vec<f64> {
        self.0
            .training_direction(epoch, state.old_gradient, state.gradient, state.old_direction)
    }
}
