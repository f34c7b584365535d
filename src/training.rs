//! The epoch loop shared by the line-search training algorithms.
//!
//! Every epoch:
//!
//! 1. checks the parameters norm against the divergence threshold
//! 2. evaluates loss, validation loss and gradient
//! 3. asks the algorithm for a unit-norm training direction, falling back to steepest
//!    descent when that direction does not go downhill
//! 4. runs the line search, retrying from steepest descent if the rate collapses
//! 5. records history and evaluates the stopping criteria in a fixed order
//! 6. moves the parameters by `rate * direction`
//!
//! Algorithms plug in through [`DirectionRule`]; see [`crate::ConjugateGradient`] and
//! [`crate::QuasiNewtonMethod`].

use std::fmt;
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::history::{EpochRecord, MAX_RESERVED_EPOCHS};
use crate::loss::ObjectiveFunctional;
use crate::vector::{axpy, dot, norm, scaled, steepest_descent_direction};
use crate::{Error, HistoryReservation, LineSearch, Result, TrainingHistory};

/// Training rates below this are treated as a failed line search.
pub const MIN_TRAINING_RATE: f64 = 1e-99;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingCriteria {
    /// Stop when the norm of the parameters increment is at most this.
    pub min_parameters_increment_norm: f64,
    /// Stop when the loss decreased by at most this since the previous epoch.
    pub min_loss_improvement: f64,
    pub loss_goal: f64,
    pub gradient_norm_goal: f64,
    pub max_epochs: usize,
    /// Wall-clock budget in seconds, checked once per epoch.
    pub max_training_time: f64,
    /// Stop as soon as the validation loss increases.
    pub early_stopping: bool,
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        Self {
            min_parameters_increment_norm: 0.0,
            min_loss_improvement: 0.0,
            loss_goal: -1e99,
            gradient_norm_goal: 0.0,
            max_epochs: 1000,
            max_training_time: 1000.0,
            early_stopping: false,
        }
    }
}

/// Diagnostic thresholds.
///
/// Crossing a warning threshold, or the gradient norm and training rate error
/// thresholds, is only logged. Crossing `error_parameters_norm` aborts training.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning_parameters_norm: f64,
    pub warning_gradient_norm: f64,
    pub warning_training_rate: f64,
    pub error_parameters_norm: f64,
    pub error_gradient_norm: f64,
    pub error_training_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning_parameters_norm: 1e6,
            warning_gradient_norm: 1e6,
            warning_training_rate: 1e6,
            error_parameters_norm: 1e10,
            error_gradient_norm: 1e10,
            error_training_rate: 1e10,
        }
    }
}

/// Configuration shared by every line-search training algorithm.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub stopping: StoppingCriteria,
    pub thresholds: Thresholds,
    pub line_search: LineSearch,
    /// Initial training rate of the first epoch and of line-search retries.
    pub first_training_rate: f64,
    /// Log progress every `display_period` epochs.
    pub display: bool,
    pub display_period: usize,
    pub reserve: HistoryReservation,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            stopping: StoppingCriteria::default(),
            thresholds: Thresholds::default(),
            line_search: LineSearch::default(),
            first_training_rate: 1e-2,
            display: true,
            display_period: 100,
            reserve: HistoryReservation::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        self.line_search.validate()?;

        if !(self.first_training_rate.is_finite() && self.first_training_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "first training rate must be finite and > 0, got {}",
                self.first_training_rate
            )));
        }
        if self.reserve.any() && self.stopping.max_epochs > MAX_RESERVED_EPOCHS {
            return Err(Error::InvalidConfig(format!(
                "max epochs must be <= {MAX_RESERVED_EPOCHS} when history is reserved, got {}",
                self.stopping.max_epochs
            )));
        }
        if self.display_period == 0 {
            return Err(Error::InvalidConfig("display period must be > 0".to_owned()));
        }
        if self.stopping.max_training_time.is_nan() || self.stopping.max_training_time < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "max training time must be >= 0, got {}",
                self.stopping.max_training_time
            )));
        }
        let s = &self.stopping;
        if [s.min_parameters_increment_norm, s.min_loss_improvement, s.loss_goal, s.gradient_norm_goal]
            .iter()
            .any(|v| v.is_nan())
        {
            return Err(Error::InvalidConfig(
                "stopping criteria must not be NaN".to_owned(),
            ));
        }
        let t = &self.thresholds;
        let all_positive = [
            t.warning_parameters_norm,
            t.warning_gradient_norm,
            t.warning_training_rate,
            t.error_parameters_norm,
            t.error_gradient_norm,
            t.error_training_rate,
        ]
        .iter()
        .all(|&v| v > 0.0);
        if !all_positive {
            return Err(Error::InvalidConfig("thresholds must be > 0".to_owned()));
        }
        Ok(())
    }
}

/// Why training stopped. Criteria are checked in declaration order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingCondition {
    MinimumParametersIncrementNorm,
    MinimumLossImprovement,
    LossGoal,
    ValidationLossIncreased,
    GradientNormGoal,
    MaximumEpochs,
    MaximumTrainingTime,
}

impl fmt::Display for StoppingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            StoppingCondition::MinimumParametersIncrementNorm => {
                "minimum parameters increment norm reached"
            }
            StoppingCondition::MinimumLossImprovement => "minimum loss improvement reached",
            StoppingCondition::LossGoal => "loss goal reached",
            StoppingCondition::ValidationLossIncreased => "validation loss increased",
            StoppingCondition::GradientNormGoal => "gradient norm goal reached",
            StoppingCondition::MaximumEpochs => "maximum number of epochs reached",
            StoppingCondition::MaximumTrainingTime => "maximum training time reached",
        };
        f.write_str(msg)
    }
}

/// Summary of a finished training run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub stopping_condition: StoppingCondition,
    /// Epochs run, including the one on which training stopped.
    pub epochs: usize,
    pub final_parameters_norm: f64,
    pub final_loss: f64,
    pub final_validation_loss: f64,
    pub final_gradient_norm: f64,
    /// Seconds.
    pub elapsed_time: f64,
}

/// Quantities available to a direction rule at the start of an epoch.
///
/// The `old_*` vectors are those of the previous epoch and are empty at epoch 0.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EpochState<'a> {
    pub parameters: &'a [f64],
    pub old_parameters: &'a [f64],
    pub gradient: &'a [f64],
    pub old_gradient: &'a [f64],
    pub old_direction: &'a [f64],
}

/// The algorithm-specific part of an epoch.
pub(crate) trait DirectionRule {
    /// Unit-norm training direction for `epoch`.
    fn direction(&mut self, epoch: usize, state: &EpochState<'_>) -> Vec<f64>;

    /// Record algorithm-specific history for `epoch`.
    fn record(&self, _epoch: usize, _history: &mut TrainingHistory) {}
}

struct Stop<'a> {
    config: &'a TrainingConfig,
    epoch: usize,
    increment_norm: f64,
    loss_improvement: f64,
    loss: f64,
    validation_loss_increment: f64,
    gradient_norm: f64,
    elapsed_time: f64,
}

impl Stop<'_> {
    fn condition(&self) -> Option<StoppingCondition> {
        let s = &self.config.stopping;
        if self.increment_norm <= s.min_parameters_increment_norm {
            Some(StoppingCondition::MinimumParametersIncrementNorm)
        } else if self.epoch > 0 && self.loss_improvement <= s.min_loss_improvement {
            Some(StoppingCondition::MinimumLossImprovement)
        } else if self.loss <= s.loss_goal {
            Some(StoppingCondition::LossGoal)
        } else if s.early_stopping && self.epoch > 0 && self.validation_loss_increment > 0.0 {
            Some(StoppingCondition::ValidationLossIncreased)
        } else if self.gradient_norm <= s.gradient_norm_goal {
            Some(StoppingCondition::GradientNormGoal)
        } else if self.epoch >= s.max_epochs {
            Some(StoppingCondition::MaximumEpochs)
        } else if self.elapsed_time >= s.max_training_time {
            Some(StoppingCondition::MaximumTrainingTime)
        } else {
            None
        }
    }
}

/// Run the epoch loop until a stopping criterion fires.
///
/// On return the objective holds the parameters of the last epoch and `history`
/// holds one entry per recorded epoch for every reserved sequence, also when
/// training fails.
pub(crate) fn run<O, D>(
    algorithm: &'static str,
    config: &TrainingConfig,
    objective: &mut O,
    rule: &mut D,
    history: &mut TrainingHistory,
) -> Result<TrainingReport>
where
    O: ObjectiveFunctional + ?Sized,
    D: DirectionRule,
{
    config.validate()?;
    *history = TrainingHistory::with_reservation(&config.reserve, config.stopping.max_epochs);

    let mut recorded = 0usize;
    let result = run_epochs(algorithm, config, objective, rule, history, &mut recorded);
    if result.is_err() {
        history.truncate(recorded);
    }
    result
}

fn run_epochs<O, D>(
    algorithm: &'static str,
    config: &TrainingConfig,
    objective: &mut O,
    rule: &mut D,
    history: &mut TrainingHistory,
    recorded: &mut usize,
) -> Result<TrainingReport>
where
    O: ObjectiveFunctional + ?Sized,
    D: DirectionRule,
{
    let start = Instant::now();
    let thresholds = &config.thresholds;
    let line_search = &config.line_search;

    let mut parameters = objective.parameters();
    let mut old_parameters: Vec<f64> = Vec::new();
    let mut old_gradient: Vec<f64> = Vec::new();
    let mut old_direction: Vec<f64> = Vec::new();
    let mut old_rate = 0.0_f64;
    let mut old_loss = 0.0_f64;
    let mut old_validation_loss = 0.0_f64;
    let mut next_loss: Option<f64> = None;

    let mut epoch = 0usize;
    loop {
        let parameters_norm = norm(&parameters);
        if parameters_norm >= thresholds.error_parameters_norm {
            return Err(Error::Divergence {
                norm: parameters_norm,
                limit: thresholds.error_parameters_norm,
            });
        }
        if parameters_norm >= thresholds.warning_parameters_norm {
            warn!(algorithm, epoch, parameters_norm, "parameters norm is above the warning threshold");
        }

        let loss = match next_loss {
            Some(loss) => loss,
            None => objective.loss()?,
        };
        let validation_loss = objective.validation_loss()?;
        let validation_loss_increment = if epoch == 0 {
            0.0
        } else {
            validation_loss - old_validation_loss
        };

        let gradient = objective.gradient()?;
        let gradient_norm = norm(&gradient);
        if gradient_norm >= thresholds.error_gradient_norm {
            error!(algorithm, epoch, gradient_norm, "gradient norm is above the error threshold");
        } else if gradient_norm >= thresholds.warning_gradient_norm {
            warn!(algorithm, epoch, gradient_norm, "gradient norm is above the warning threshold");
        }

        let state = EpochState {
            parameters: &parameters,
            old_parameters: &old_parameters,
            gradient: &gradient,
            old_gradient: &old_gradient,
            old_direction: &old_direction,
        };
        let mut direction = rule.direction(epoch, &state);

        let slope = if gradient_norm > 0.0 {
            dot(&gradient, &direction) / gradient_norm
        } else {
            0.0
        };
        if slope >= 0.0 {
            debug!(algorithm, epoch, slope, "training direction is not a descent direction; using steepest descent");
            direction = steepest_descent_direction(&gradient);
        }

        let initial_rate = if epoch == 0 {
            config.first_training_rate
        } else {
            old_rate
        };
        let (mut rate, mut new_loss) =
            line_search.compute(objective, &parameters, loss, &direction, initial_rate)?;

        if epoch != 0 && rate < MIN_TRAINING_RATE {
            debug!(algorithm, epoch, rate, "training rate collapsed; retrying from steepest descent");
            direction = steepest_descent_direction(&gradient);
            (rate, new_loss) = line_search.compute(
                objective,
                &parameters,
                loss,
                &direction,
                config.first_training_rate,
            )?;
        }

        if rate >= thresholds.error_training_rate {
            error!(algorithm, epoch, rate, "training rate is above the error threshold");
        } else if rate >= thresholds.warning_training_rate {
            warn!(algorithm, epoch, rate, "training rate is above the warning threshold");
        }

        let increment = scaled(rate, &direction);
        let increment_norm = norm(&increment);
        let elapsed_time = start.elapsed().as_secs_f64();

        history.record(
            epoch,
            &EpochRecord {
                parameters: &parameters,
                parameters_norm,
                loss,
                validation_loss,
                gradient: &gradient,
                gradient_norm,
                training_direction: &direction,
                training_rate: rate,
                elapsed_time,
            },
        );
        rule.record(epoch, history);
        *recorded = epoch + 1;

        let stop = Stop {
            config,
            epoch,
            increment_norm,
            loss_improvement: old_loss - loss,
            loss,
            validation_loss_increment,
            gradient_norm,
            elapsed_time,
        };
        if let Some(condition) = stop.condition() {
            info!(
                algorithm,
                epoch,
                %condition,
                parameters_norm,
                loss,
                validation_loss,
                gradient_norm,
                rate,
                elapsed_time,
                "training stopped"
            );
            history.truncate(epoch + 1);
            return Ok(TrainingReport {
                stopping_condition: condition,
                epochs: epoch + 1,
                final_parameters_norm: parameters_norm,
                final_loss: loss,
                final_validation_loss: validation_loss,
                final_gradient_norm: gradient_norm,
                elapsed_time,
            });
        }

        if config.display && epoch % config.display_period == 0 {
            info!(
                algorithm,
                epoch,
                parameters_norm,
                loss,
                validation_loss,
                gradient_norm,
                rate,
                elapsed_time,
                "training progress"
            );
        }

        old_parameters.clone_from(&parameters);
        // Same arithmetic as the line search trial point.
        axpy(rate, &direction, &mut parameters);
        objective.set_parameters(&parameters)?;

        old_gradient = gradient;
        old_direction = direction;
        old_rate = rate;
        old_loss = loss;
        old_validation_loss = validation_loss;
        next_loss = Some(new_loss);
        epoch += 1;
    }
}
