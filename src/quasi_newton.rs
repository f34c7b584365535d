//! Quasi-Newton training.
//!
//! Keeps an approximation `H` of the inverse Hessian, starting from the identity and
//! refined every epoch by a rank-two DFP or BFGS update. The training direction is
//! `normalize(-H g)`.

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loss::{MIN_DIVISOR, ObjectiveFunctional};
use crate::training::{self, DirectionRule, EpochState};
use crate::vector::{dot, normalize, scaled, sub};
use crate::{Error, Matrix, Result, TrainingConfig, TrainingHistory, TrainingReport};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InverseHessianMethod {
    Dfp,
    #[default]
    Bfgs,
}

impl FromStr for InverseHessianMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DFP" | "Dfp" => Ok(InverseHessianMethod::Dfp),
            "BFGS" | "Bfgs" => Ok(InverseHessianMethod::Bfgs),
            other => Err(Error::ConfigurationMismatch(format!(
                "unknown inverse Hessian approximation method: {other}"
            ))),
        }
    }
}

/// Curvature terms shared by both updates.
struct Secant {
    s: Vec<f64>,
    hy: Vec<f64>,
    sy: f64,
    yhy: f64,
}

impl Secant {
    /// `None` when either curvature product is too small to divide by.
    fn new(
        old_parameters: &[f64],
        parameters: &[f64],
        old_gradient: &[f64],
        gradient: &[f64],
        old_inverse_hessian: &Matrix,
    ) -> Option<Self> {
        let n = parameters.len();
        assert_eq!(old_parameters.len(), n, "old parameters len mismatch");
        assert_eq!(gradient.len(), n, "gradient len mismatch");
        assert_eq!(old_gradient.len(), n, "old gradient len mismatch");
        assert!(
            old_inverse_hessian.rows() == n && old_inverse_hessian.cols() == n,
            "inverse Hessian must be {n}x{n}"
        );

        let s = sub(parameters, old_parameters);
        let y = sub(gradient, old_gradient);
        let hy = old_inverse_hessian.mul_vec(&y);
        let sy = dot(&s, &y);
        let yhy = dot(&y, &hy);

        if sy <= MIN_DIVISOR || yhy <= MIN_DIVISOR {
            debug!(sy, yhy, "skipping inverse Hessian update");
            return None;
        }
        Some(Self { s, hy, sy, yhy })
    }

    fn dfp(&self, old_inverse_hessian: &Matrix) -> Matrix {
        let mut h = old_inverse_hessian.clone();
        h.add_outer(1.0 / self.sy, &self.s);
        h.add_outer(-1.0 / self.yhy, &self.hy);
        h
    }
}

/// Davidon-Fletcher-Powell update of the inverse Hessian approximation.
///
/// `H + s s^T / (s^T y) - (H y)(H y)^T / (y^T H y)` with `s` the parameters increment
/// and `y` the gradient increment. Returns the old matrix when a curvature product is
/// not positive.
///
/// # Panics
/// Panics if the vector lengths and the matrix order disagree.
pub fn dfp_inverse_hessian(
    old_parameters: &[f64],
    parameters: &[f64],
    old_gradient: &[f64],
    gradient: &[f64],
    old_inverse_hessian: &Matrix,
) -> Matrix {
    match Secant::new(
        old_parameters,
        parameters,
        old_gradient,
        gradient,
        old_inverse_hessian,
    ) {
        Some(secant) => secant.dfp(old_inverse_hessian),
        None => old_inverse_hessian.clone(),
    }
}

/// Broyden-Fletcher-Goldfarb-Shanno update of the inverse Hessian approximation.
///
/// The DFP update plus `(y^T H y) u u^T` with `u = s / (s^T y) - H y / (y^T H y)`.
/// Returns the old matrix when a curvature product is not positive.
///
/// # Panics
/// Panics if the vector lengths and the matrix order disagree.
pub fn bfgs_inverse_hessian(
    old_parameters: &[f64],
    parameters: &[f64],
    old_gradient: &[f64],
    gradient: &[f64],
    old_inverse_hessian: &Matrix,
) -> Matrix {
    let Some(secant) = Secant::new(
        old_parameters,
        parameters,
        old_gradient,
        gradient,
        old_inverse_hessian,
    ) else {
        return old_inverse_hessian.clone();
    };

    let mut h = secant.dfp(old_inverse_hessian);
    let mut u = scaled(1.0 / secant.sy, &secant.s);
    for (ui, &hyi) in u.iter_mut().zip(&secant.hy) {
        *ui -= hyi / secant.yhy;
    }
    h.add_outer(secant.yhy, &u);
    h
}

#[derive(Debug, Clone)]
pub struct QuasiNewtonMethod {
    config: TrainingConfig,
    method: InverseHessianMethod,
    inverse_hessian: Matrix,
    history: TrainingHistory,
}

impl Default for QuasiNewtonMethod {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

impl QuasiNewtonMethod {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            method: InverseHessianMethod::default(),
            inverse_hessian: Matrix::zeros(0, 0),
            history: TrainingHistory::default(),
        }
    }

    pub fn with_method(mut self, method: InverseHessianMethod) -> Self {
        self.method = method;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TrainingConfig {
        &mut self.config
    }

    pub fn method(&self) -> InverseHessianMethod {
        self.method
    }

    pub fn set_method(&mut self, method: InverseHessianMethod) {
        self.method = method;
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Inverse Hessian approximation at the last epoch of the last run.
    pub fn inverse_hessian(&self) -> &Matrix {
        &self.inverse_hessian
    }

    pub fn inverse_hessian_approximation(
        &self,
        old_parameters: &[f64],
        parameters: &[f64],
        old_gradient: &[f64],
        gradient: &[f64],
        old_inverse_hessian: &Matrix,
    ) -> Matrix {
        let update: fn(&[f64], &[f64], &[f64], &[f64], &Matrix) -> Matrix = match self.method {
            InverseHessianMethod::Dfp => dfp_inverse_hessian,
            InverseHessianMethod::Bfgs => bfgs_inverse_hessian,
        };
        update(
            old_parameters,
            parameters,
            old_gradient,
            gradient,
            old_inverse_hessian,
        )
    }

    pub fn train<O: ObjectiveFunctional + ?Sized>(
        &mut self,
        objective: &mut O,
    ) -> Result<TrainingReport> {
        let mut rule = Rule {
            method: &*self,
            inverse_hessian: Matrix::zeros(0, 0),
        };
        let mut history = TrainingHistory::default();
        let result = training::run(
            "quasi-Newton",
            &self.config,
            objective,
            &mut rule,
            &mut history,
        );
        let inverse_hessian = rule.inverse_hessian;
        self.inverse_hessian = inverse_hessian;
        self.history = history;
        result
    }
}

/// Unit-norm `-H g`.
pub fn quasi_newton_direction(inverse_hessian: &Matrix, gradient: &[f64]) -> Vec<f64> {
    let mut direction = inverse_hessian.mul_vec(gradient);
    direction.iter_mut().for_each(|d| *d = -*d);
    normalize(&mut direction);
    direction
}

struct Rule<'a> {
    method: &'a QuasiNewtonMethod,
    inverse_hessian: Matrix,
}

impl DirectionRule for Rule<'_> {
    fn direction(&mut self, epoch: usize, state: &EpochState<'_>) -> Vec<f64> {
        let n = state.parameters.len();
        let fresh = epoch == 0
            || state.old_parameters.len() != n
            || self.inverse_hessian.rows() != n;
        self.inverse_hessian = if fresh {
            Matrix::identity(n)
        } else {
            self.method.inverse_hessian_approximation(
                state.old_parameters,
                state.parameters,
                state.old_gradient,
                state.gradient,
                &self.inverse_hessian,
            )
        };
        quasi_newton_direction(&self.inverse_hessian, state.gradient)
    }

    fn record(&self, epoch: usize, history: &mut TrainingHistory) {
        history.record_inverse_hessian(epoch, &self.inverse_hessian);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Quadratic;
    use crate::vector::norm;

    fn spd() -> Matrix {
        Matrix::from_rows(&[
            vec![2.0, 0.1, 0.0],
            vec![0.1, 1.0, 0.0],
            vec![0.0, 0.0, 0.5],
        ])
        .unwrap()
    }

    const OLD_PARAMETERS: [f64; 3] = [0.0, 0.0, 0.0];
    const PARAMETERS: [f64; 3] = [1.0, 0.5, -0.2];
    const OLD_GRADIENT: [f64; 3] = [0.2, -0.1, 0.0];
    const GRADIENT: [f64; 3] = [1.0, 0.2, 0.1];

    fn updates() -> [(&'static str, Matrix); 2] {
        let h = spd();
        [
            (
                "dfp",
                dfp_inverse_hessian(&OLD_PARAMETERS, &PARAMETERS, &OLD_GRADIENT, &GRADIENT, &h),
            ),
            (
                "bfgs",
                bfgs_inverse_hessian(&OLD_PARAMETERS, &PARAMETERS, &OLD_GRADIENT, &GRADIENT, &h),
            ),
        ]
    }

    #[test]
    fn updates_satisfy_the_secant_equation() {
        let y = sub(&GRADIENT, &OLD_GRADIENT);
        let s = sub(&PARAMETERS, &OLD_PARAMETERS);
        for (name, h) in updates() {
            let hy = h.mul_vec(&y);
            for (a, b) in hy.iter().zip(&s) {
                assert!((a - b).abs() < 1e-12, "{name}: {hy:?} != {s:?}");
            }
        }
    }

    #[test]
    fn updates_stay_symmetric_and_descending() {
        for (name, h) in updates() {
            assert!(h.is_symmetric(1e-12), "{name}");
            let d = quasi_newton_direction(&h, &GRADIENT);
            assert!(dot(&d, &GRADIENT) < 0.0, "{name}");
        }
    }

    #[test]
    fn non_positive_curvature_keeps_the_old_matrix() {
        let h = spd();
        // s . y < 0
        let (s, y) = ([1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]);
        let updated = bfgs_inverse_hessian(&[0.0; 3], &s, &[0.0; 3], &y, &h);
        assert_eq!(updated, h);

        // s = 0
        let updated = dfp_inverse_hessian(&[1.0; 3], &[1.0; 3], &[0.0; 3], &[1.0; 3], &h);
        assert_eq!(updated, h);
    }

    #[test]
    fn identity_gives_steepest_descent() {
        let d = quasi_newton_direction(&Matrix::identity(2), &[3.0, 4.0]);
        assert!((d[0] + 0.6).abs() < 1e-15);
        assert!((d[1] + 0.8).abs() < 1e-15);
        assert!((norm(&d) - 1.0).abs() < 1e-15);
    }

    #[test]
    fn parses_method_names() {
        assert_eq!(
            "DFP".parse::<InverseHessianMethod>().unwrap(),
            InverseHessianMethod::Dfp
        );
        assert_eq!(
            "BFGS".parse::<InverseHessianMethod>().unwrap(),
            InverseHessianMethod::Bfgs
        );
        assert!("SR1".parse::<InverseHessianMethod>().is_err());
    }

    #[test]
    fn minimizes_a_skewed_quadratic() {
        let (minimizer, minimum) = Quadratic::skewed_solution();
        for method in [InverseHessianMethod::Dfp, InverseHessianMethod::Bfgs] {
            let mut q = Quadratic::skewed();
            let mut qn = QuasiNewtonMethod::default().with_method(method);
            qn.config_mut().display = false;
            qn.config_mut().stopping.max_epochs = 200;
            qn.config_mut().reserve.inverse_hessian = true;
            qn.config_mut().reserve.training_direction = true;

            let report = qn.train(&mut q).unwrap();

            assert!(report.final_loss - minimum < 1e-6, "{method:?}: {report:?}");
            for (p, m) in q.parameters.iter().zip(minimizer) {
                assert!((p - m).abs() < 1e-2, "{method:?}: {:?}", q.parameters);
            }

            let history = qn.history();
            assert_eq!(history.inverse_hessian.len(), report.epochs);
            assert_eq!(history.inverse_hessian[0], Matrix::identity(3));
            for h in &history.inverse_hessian {
                assert!(h.is_symmetric(1e-9));
            }
            for d in &history.training_direction {
                let n = norm(d);
                assert!(n == 0.0 || (n - 1.0).abs() < 1e-9);
            }
            assert_eq!(qn.inverse_hessian().rows(), 3);
        }
    }
}
