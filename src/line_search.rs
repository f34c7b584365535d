//! One-dimensional minimization of the loss along a training direction.
//!
//! Given parameters `p`, a direction `d` and the current loss `f(p)`, the line search
//! looks for the training rate `r >= 0` minimizing `f(p + r d)`:
//!
//! 1. Bracketing: starting from an initial rate, expand by `bracketing_factor` while the
//!    loss keeps decreasing, or contract by it until the loss drops below `f(p)`. This
//!    yields three rates `a < b < c` with `f(b) < f(a)` and `f(b) < f(c)`.
//! 2. Refinement inside the bracket by golden section or Brent's method, down to an
//!    interval of width `training_rate_tolerance`.
//!
//! When no rate above the tolerance improves the loss, the search returns rate `0`
//! and the current loss. On a loss plateau the smallest rate reaching the plateau
//! is returned.

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::loss::ObjectiveFunctional;
use crate::vector::add_scaled;
use crate::{Error, Result};

/// Fraction of the larger sub-interval probed by a golden section step.
const GOLDEN_SECTION: f64 = 0.381_966_011_250_105_1;

/// Cap on bracket expansions.
const MAX_BRACKETING_STEPS: usize = 100;

/// Cap on refinement iterations.
const MAX_REFINEMENT_STEPS: usize = 200;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrainingRateMethod {
    /// Take the initial rate as is.
    Fixed,
    GoldenSection,
    #[default]
    Brent,
}

impl FromStr for TrainingRateMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Fixed" => Ok(TrainingRateMethod::Fixed),
            "GoldenSection" => Ok(TrainingRateMethod::GoldenSection),
            "BrentMethod" | "Brent" => Ok(TrainingRateMethod::Brent),
            other => Err(Error::ConfigurationMismatch(format!(
                "unknown training rate method: {other}"
            ))),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSearch {
    pub method: TrainingRateMethod,
    pub bracketing_factor: f64,
    pub training_rate_tolerance: f64,
}

impl Default for LineSearch {
    fn default() -> Self {
        Self {
            method: TrainingRateMethod::Brent,
            bracketing_factor: 1.5,
            training_rate_tolerance: 1e-6,
        }
    }
}

/// A training rate and the loss it produces.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    rate: f64,
    loss: f64,
}

#[derive(Debug, Clone, Copy)]
enum Bracket {
    /// No rate above the tolerance improves the loss.
    None,
    /// Loss still strictly decreasing at the last finite expansion; take that point.
    Unbounded(Point),
    Triplet(Point, Point, Point),
}

impl LineSearch {
    pub fn validate(&self) -> Result<()> {
        if !(self.bracketing_factor.is_finite() && self.bracketing_factor > 1.0) {
            return Err(Error::InvalidConfig(format!(
                "bracketing factor must be finite and > 1, got {}",
                self.bracketing_factor
            )));
        }
        if !(self.training_rate_tolerance.is_finite() && self.training_rate_tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "training rate tolerance must be finite and > 0, got {}",
                self.training_rate_tolerance
            )));
        }
        Ok(())
    }

    /// Returns `(rate, loss at parameters + rate * direction)`.
    ///
    /// `loss` must be the objective's loss at `parameters`. The objective's parameters
    /// are left unchanged.
    pub fn compute<O: ObjectiveFunctional + ?Sized>(
        &self,
        objective: &mut O,
        parameters: &[f64],
        loss: f64,
        direction: &[f64],
        initial_rate: f64,
    ) -> Result<(f64, f64)> {
        if direction.iter().all(|&d| d == 0.0) || !(initial_rate.is_finite() && initial_rate > 0.0)
        {
            return Ok((0.0, loss));
        }

        let mut eval = |rate: f64| evaluate(&mut *objective, parameters, direction, rate);

        if self.method == TrainingRateMethod::Fixed {
            let p = eval(initial_rate)?;
            return Ok((p.rate, p.loss));
        }

        let best = match self.bracket(&mut eval, loss, initial_rate)? {
            Bracket::None => return Ok((0.0, loss)),
            Bracket::Unbounded(p) => p,
            Bracket::Triplet(a, b, c) => match self.method {
                TrainingRateMethod::GoldenSection => self.golden_section(&mut eval, a, b, c)?,
                _ => self.brent(&mut eval, a, b, c)?,
            },
        };
        Ok((best.rate, best.loss))
    }

    fn bracket<F>(&self, eval: &mut F, loss: f64, initial_rate: f64) -> Result<Bracket>
    where
        F: FnMut(f64) -> Result<Point>,
    {
        let factor = self.bracketing_factor;
        let mut a = Point { rate: 0.0, loss };
        let mut b = eval(initial_rate)?;

        if b.loss < a.loss {
            if !(b.rate * factor).is_finite() {
                return Ok(Bracket::Unbounded(b));
            }
            let mut c = eval(b.rate * factor)?;
            let mut steps = 0;
            // An equal loss closes the bracket, so plateaus are never walked across.
            while c.loss < b.loss {
                steps += 1;
                let rate = c.rate * factor;
                if steps >= MAX_BRACKETING_STEPS || !rate.is_finite() {
                    return Ok(Bracket::Unbounded(c));
                }
                a = b;
                b = c;
                c = eval(rate)?;
            }
            return Ok(Bracket::Triplet(a, b, c));
        }

        let mut c = b;
        loop {
            let rate = c.rate / factor;
            if rate < self.training_rate_tolerance {
                return Ok(Bracket::None);
            }
            b = eval(rate)?;
            if b.loss < a.loss {
                return Ok(Bracket::Triplet(a, b, c));
            }
            c = b;
        }
    }

    fn golden_section<F>(&self, eval: &mut F, a: Point, b: Point, c: Point) -> Result<Point>
    where
        F: FnMut(f64) -> Result<Point>,
    {
        let (mut a, mut b, mut c) = (a, b, c);
        for _ in 0..MAX_REFINEMENT_STEPS {
            if c.rate - a.rate <= self.training_rate_tolerance {
                break;
            }

            let rate = if b.rate - a.rate > c.rate - b.rate {
                b.rate - GOLDEN_SECTION * (b.rate - a.rate)
            } else {
                b.rate + GOLDEN_SECTION * (c.rate - b.rate)
            };
            let u = eval(rate)?;

            if improves(u, b) {
                if u.rate < b.rate {
                    c = b;
                } else {
                    a = b;
                }
                b = u;
            } else if u.rate < b.rate {
                a = u;
            } else {
                c = u;
            }
        }
        Ok(b)
    }

    /// Brent's method: parabolic interpolation with golden section safeguards.
    fn brent<F>(&self, eval: &mut F, a: Point, b: Point, c: Point) -> Result<Point>
    where
        F: FnMut(f64) -> Result<Point>,
    {
        let tol1 = 0.5 * self.training_rate_tolerance;
        let tol2 = self.training_rate_tolerance;

        let (mut lo, mut hi) = (a.rate, c.rate);
        let mut x = b;
        let mut w = b;
        let mut v = b;
        let mut d = 0.0_f64;
        let mut e = 0.0_f64;

        for _ in 0..MAX_REFINEMENT_STEPS {
            let xm = 0.5 * (lo + hi);
            if (x.rate - xm).abs() <= tol2 - 0.5 * (hi - lo) {
                break;
            }

            let mut golden = true;
            if e.abs() > tol1 {
                let r = (x.rate - w.rate) * (x.loss - v.loss);
                let mut q = (x.rate - v.rate) * (x.loss - w.loss);
                let mut p = (x.rate - v.rate) * q - (x.rate - w.rate) * r;
                q = 2.0 * (q - r);
                if q > 0.0 {
                    p = -p;
                }
                q = q.abs();

                let previous = e;
                let acceptable = p.abs() < (0.5 * q * previous).abs()
                    && p > q * (lo - x.rate)
                    && p < q * (hi - x.rate);
                if acceptable {
                    e = d;
                    d = p / q;
                    let u = x.rate + d;
                    if u - lo < tol2 || hi - u < tol2 {
                        d = tol1.copysign(xm - x.rate);
                    }
                    golden = false;
                }
            }
            if golden {
                e = if x.rate >= xm { lo - x.rate } else { hi - x.rate };
                d = GOLDEN_SECTION * e;
            }

            let step = if d.abs() >= tol1 { d } else { tol1.copysign(d) };
            let u = eval(x.rate + step)?;

            if improves(u, x) {
                if u.rate >= x.rate {
                    lo = x.rate;
                } else {
                    hi = x.rate;
                }
                v = w;
                w = x;
                x = u;
            } else {
                if u.rate < x.rate {
                    lo = u.rate;
                } else {
                    hi = u.rate;
                }
                if u.loss <= w.loss || w.rate == x.rate {
                    v = w;
                    w = u;
                } else if u.loss <= v.loss || v.rate == x.rate || v.rate == w.rate {
                    v = u;
                }
            }
        }
        Ok(x)
    }
}

/// Lower loss wins; on equal loss the smaller rate wins.
fn improves(candidate: Point, incumbent: Point) -> bool {
    candidate.loss < incumbent.loss
        || (candidate.loss == incumbent.loss && candidate.rate < incumbent.rate)
}

fn evaluate<O: ObjectiveFunctional + ?Sized>(
    objective: &mut O,
    parameters: &[f64],
    direction: &[f64],
    rate: f64,
) -> Result<Point> {
    let trial = add_scaled(parameters, rate, direction);
    let loss = objective.loss_at(&trial)?;
    // Overflowing trial points rank as arbitrarily bad.
    let loss = if loss.is_nan() { f64::INFINITY } else { loss };
    Ok(Point { rate, loss })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Plateau, Quadratic};
    use crate::vector::{norm, steepest_descent_direction};

    fn search(method: TrainingRateMethod) -> LineSearch {
        LineSearch {
            method,
            ..LineSearch::default()
        }
    }

    fn toward_center() -> (Quadratic, Vec<f64>, f64, Vec<f64>) {
        // Minimum along the direction sits at distance 5 from the origin.
        let q = Quadratic::bowl(&[3.0, 4.0], vec![0.0, 0.0]);
        let params = q.parameters();
        let loss = q.loss().unwrap();
        let direction = steepest_descent_direction(&q.gradient().unwrap());
        (q, params, loss, direction)
    }

    #[test]
    fn brent_finds_the_minimizing_rate() {
        let (mut q, params, loss, direction) = toward_center();
        let (rate, new_loss) = search(TrainingRateMethod::Brent)
            .compute(&mut q, &params, loss, &direction, 0.01)
            .unwrap();
        assert!((rate - 5.0).abs() < 1e-4, "rate={rate}");
        assert!((new_loss - -25.0).abs() < 1e-6);
        assert_eq!(q.parameters(), params);
    }

    #[test]
    fn golden_section_finds_the_minimizing_rate() {
        let (mut q, params, loss, direction) = toward_center();
        let (rate, new_loss) = search(TrainingRateMethod::GoldenSection)
            .compute(&mut q, &params, loss, &direction, 0.01)
            .unwrap();
        assert!((rate - 5.0).abs() < 1e-4, "rate={rate}");
        assert!(new_loss < loss);
    }

    #[test]
    fn overshooting_initial_rate_is_contracted() {
        let (mut q, params, loss, direction) = toward_center();
        let (rate, new_loss) = search(TrainingRateMethod::Brent)
            .compute(&mut q, &params, loss, &direction, 1000.0)
            .unwrap();
        assert!((rate - 5.0).abs() < 1e-4, "rate={rate}");
        assert!(new_loss < loss);
    }

    #[test]
    fn fixed_rate_is_taken_as_is() {
        let (mut q, params, loss, direction) = toward_center();
        let (rate, new_loss) = search(TrainingRateMethod::Fixed)
            .compute(&mut q, &params, loss, &direction, 2.0)
            .unwrap();
        assert_eq!(rate, 2.0);
        assert!((new_loss - (9.0 - 25.0)).abs() < 1e-9);
    }

    #[test]
    fn uphill_direction_yields_zero_rate() {
        let (mut q, params, loss, direction) = toward_center();
        let uphill: Vec<f64> = direction.iter().map(|d| -d).collect();
        assert!((norm(&uphill) - 1.0).abs() < 1e-12);

        let (rate, new_loss) = LineSearch::default()
            .compute(&mut q, &params, loss, &uphill, 0.01)
            .unwrap();
        assert_eq!(rate, 0.0);
        assert_eq!(new_loss, loss);
    }

    #[test]
    fn zero_direction_yields_zero_rate() {
        let (mut q, params, loss, _) = toward_center();
        let (rate, new_loss) = LineSearch::default()
            .compute(&mut q, &params, loss, &[0.0, 0.0], 0.01)
            .unwrap();
        assert_eq!((rate, new_loss), (0.0, loss));
    }

    #[test]
    fn plateau_stops_expansion_at_its_edge() {
        for method in [TrainingRateMethod::Brent, TrainingRateMethod::GoldenSection] {
            let mut q = Plateau::new(0.0);
            let params = q.parameters();
            let loss = q.loss().unwrap();
            let (rate, new_loss) = search(method)
                .compute(&mut q, &params, loss, &[1.0], 0.01)
                .unwrap();
            assert_eq!(new_loss, 0.0, "{method:?}");
            assert!((rate - 1.0).abs() < 1e-3, "{method:?}: rate={rate}");
        }
    }

    #[test]
    fn improvement_prefers_smaller_rate_on_ties() {
        let near = Point { rate: 1.0, loss: 0.0 };
        let far = Point { rate: 2.0, loss: 0.0 };
        assert!(improves(near, far));
        assert!(!improves(far, near));
        assert!(improves(Point { rate: 3.0, loss: -1.0 }, near));
    }

    #[test]
    fn validate_rejects_non_expanding_factor() {
        let bad = LineSearch {
            bracketing_factor: 1.0,
            ..LineSearch::default()
        };
        assert!(bad.validate().is_err());
        assert!(LineSearch::default().validate().is_ok());
    }

    #[test]
    fn parses_method_names() {
        assert_eq!(
            "BrentMethod".parse::<TrainingRateMethod>().unwrap(),
            TrainingRateMethod::Brent
        );
        assert!("Armijo".parse::<TrainingRateMethod>().is_err());
    }
}
