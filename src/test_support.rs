//! Analytic objectives for unit tests of the training machinery.

use crate::loss::ObjectiveFunctional;
use crate::vector::dot;
use crate::{Matrix, Result};

/// `f(p) = 0.5 p^T A p - b^T p`, minimized at `A^{-1} b`.
#[derive(Debug, Clone)]
pub(crate) struct Quadratic {
    pub a: Matrix,
    pub b: Vec<f64>,
    pub parameters: Vec<f64>,
}

impl Quadratic {
    pub fn new(a: Matrix, b: Vec<f64>, start: Vec<f64>) -> Self {
        Self {
            a,
            b,
            parameters: start,
        }
    }

    /// Spherical bowl `||p - center||^2` (up to a constant).
    pub fn bowl(center: &[f64], start: Vec<f64>) -> Self {
        let n = center.len();
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 2.0 } else { 0.0 }).collect())
            .collect();
        let a = Matrix::from_rows(&rows).expect("rows are rectangular");
        let b = center.iter().map(|c| 2.0 * c).collect();
        Self::new(a, b, start)
    }

    /// Ill-conditioned, non-diagonal 3x3 problem.
    pub fn skewed() -> Self {
        let a = Matrix::from_rows(&[
            vec![4.0, 1.0, 0.5],
            vec![1.0, 3.0, 0.2],
            vec![0.5, 0.2, 0.3],
        ])
        .expect("rows are rectangular");
        Self::new(a, vec![1.0, -2.0, 0.5], vec![2.0, 2.0, -2.0])
    }

    /// Minimizer and minimum value of [`Quadratic::skewed`].
    pub fn skewed_solution() -> ([f64; 3], f64) {
        (
            [0.235_521_235_521_235_5, -0.868_725_868_725_868_8, 1.853_281_853_281_853_6],
            -1.449_806_949_806_95,
        )
    }
}

impl ObjectiveFunctional for Quadratic {
    fn parameters_number(&self) -> usize {
        self.parameters.len()
    }

    fn parameters(&self) -> Vec<f64> {
        self.parameters.clone()
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        self.parameters.copy_from_slice(parameters);
        Ok(())
    }

    fn loss(&self) -> Result<f64> {
        let ap = self.a.mul_vec(&self.parameters);
        Ok(0.5 * dot(&self.parameters, &ap) - dot(&self.b, &self.parameters))
    }

    fn validation_loss(&self) -> Result<f64> {
        Ok(0.0)
    }

    fn gradient(&self) -> Result<Vec<f64>> {
        let ap = self.a.mul_vec(&self.parameters);
        Ok(ap.iter().zip(&self.b).map(|(x, y)| x - y).collect())
    }
}

/// One-dimensional `f(p) = (1 - p)^2` for `p < 1`, exactly `0` from `p = 1` on.
#[derive(Debug, Clone)]
pub(crate) struct Plateau {
    pub parameters: Vec<f64>,
}

impl Plateau {
    pub fn new(start: f64) -> Self {
        Self {
            parameters: vec![start],
        }
    }
}

impl ObjectiveFunctional for Plateau {
    fn parameters_number(&self) -> usize {
        1
    }

    fn parameters(&self) -> Vec<f64> {
        self.parameters.clone()
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> Result<()> {
        self.parameters.copy_from_slice(parameters);
        Ok(())
    }

    fn loss(&self) -> Result<f64> {
        let gap = (1.0 - self.parameters[0]).max(0.0);
        Ok(gap * gap)
    }

    fn validation_loss(&self) -> Result<f64> {
        Ok(0.0)
    }

    fn gradient(&self) -> Result<Vec<f64>> {
        Ok(vec![-2.0 * (1.0 - self.parameters[0]).max(0.0)])
    }
}
