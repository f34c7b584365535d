//! Output unscaling.
//!
//! A network can be trained to produce outputs in a scaled range and then map them
//! back to the original units of the target variables. The loss functionals compare
//! the unscaled outputs against the targets, so the backward pass needs the slope of
//! the unscaling map for every output.

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingMethod {
    #[default]
    None,
    MeanStandardDeviation,
    MinimumMaximum,
}

impl FromStr for ScalingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "None" | "NoScaling" | "NoUnscaling" => Ok(ScalingMethod::None),
            "MeanStandardDeviation" => Ok(ScalingMethod::MeanStandardDeviation),
            "MinimumMaximum" => Ok(ScalingMethod::MinimumMaximum),
            other => Err(Error::ConfigurationMismatch(format!(
                "unknown scaling method: {other}"
            ))),
        }
    }
}

/// Basic statistics of one variable.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableStatistics {
    pub minimum: f64,
    pub maximum: f64,
    pub mean: f64,
    pub standard_deviation: f64,
}

impl Default for VariableStatistics {
    fn default() -> Self {
        Self {
            minimum: -1.0,
            maximum: 1.0,
            mean: 0.0,
            standard_deviation: 1.0,
        }
    }
}

impl VariableStatistics {
    /// Statistics of a sample. The standard deviation uses the `n - 1` denominator
    /// and is zero for fewer than two values.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut n = 0usize;
        let mut minimum = f64::INFINITY;
        let mut maximum = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for v in values {
            n += 1;
            minimum = minimum.min(v);
            maximum = maximum.max(v);
            sum += v;
            sum_sq = v.mul_add(v, sum_sq);
        }

        if n == 0 {
            return Self {
                minimum: 0.0,
                maximum: 0.0,
                mean: 0.0,
                standard_deviation: 0.0,
            };
        }

        let mean = sum / n as f64;
        let standard_deviation = if n > 1 {
            ((sum_sq - n as f64 * mean * mean) / (n - 1) as f64)
                .max(0.0)
                .sqrt()
        } else {
            0.0
        };

        Self {
            minimum,
            maximum,
            mean,
            standard_deviation,
        }
    }
}

/// Maps the raw output layer activations to target units.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct OutputsUnscaling {
    method: ScalingMethod,
    statistics: Vec<VariableStatistics>,
}

impl OutputsUnscaling {
    /// No unscaling for `outputs_number` outputs.
    pub fn none(outputs_number: usize) -> Self {
        Self {
            method: ScalingMethod::None,
            statistics: vec![VariableStatistics::default(); outputs_number],
        }
    }

    pub fn new(method: ScalingMethod, statistics: Vec<VariableStatistics>) -> Result<Self> {
        let unscaling = Self { method, statistics };
        unscaling.validate()?;
        Ok(unscaling)
    }

    pub fn validate(&self) -> Result<()> {
        for (i, s) in self.statistics.iter().enumerate() {
            let finite = [s.minimum, s.maximum, s.mean, s.standard_deviation]
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return Err(Error::InvalidData(format!(
                    "output {i} statistics must be finite"
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn method(&self) -> ScalingMethod {
        self.method
    }

    #[inline]
    pub fn statistics(&self) -> &[VariableStatistics] {
        &self.statistics
    }

    #[inline]
    pub fn outputs_number(&self) -> usize {
        self.statistics.len()
    }

    /// Writes the unscaled outputs into `out`.
    #[inline]
    pub fn unscale(&self, scaled: &[f64], out: &mut [f64]) {
        debug_assert_eq!(scaled.len(), self.statistics.len());
        debug_assert_eq!(out.len(), self.statistics.len());

        match self.method {
            ScalingMethod::None => out.copy_from_slice(scaled),
            ScalingMethod::MeanStandardDeviation => {
                for ((o, &s), st) in out.iter_mut().zip(scaled).zip(&self.statistics) {
                    *o = st.standard_deviation.mul_add(s, st.mean);
                }
            }
            ScalingMethod::MinimumMaximum => {
                for ((o, &s), st) in out.iter_mut().zip(scaled).zip(&self.statistics) {
                    *o = 0.5 * (s + 1.0) * (st.maximum - st.minimum) + st.minimum;
                }
            }
        }
    }

    /// Slope `d(unscaled)/d(scaled)` of output `idx`.
    #[inline]
    pub fn derivative_multiplier(&self, idx: usize) -> f64 {
        match self.method {
            ScalingMethod::None => 1.0,
            ScalingMethod::MeanStandardDeviation => self.statistics[idx].standard_deviation,
            ScalingMethod::MinimumMaximum => {
                let st = &self.statistics[idx];
                0.5 * (st.maximum - st.minimum)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_of_small_sample() {
        let s = VariableStatistics::from_values([1.0, 2.0, 3.0]);
        assert_eq!(s.minimum, 1.0);
        assert_eq!(s.maximum, 3.0);
        assert!((s.mean - 2.0).abs() < 1e-12);
        assert!((s.standard_deviation - 1.0).abs() < 1e-12);
    }

    #[test]
    fn minimum_maximum_maps_unit_interval_to_range() {
        let u = OutputsUnscaling::new(
            ScalingMethod::MinimumMaximum,
            vec![VariableStatistics {
                minimum: 10.0,
                maximum: 20.0,
                mean: 15.0,
                standard_deviation: 3.0,
            }],
        )
        .unwrap();

        let mut out = [0.0];
        u.unscale(&[-1.0], &mut out);
        assert_eq!(out[0], 10.0);
        u.unscale(&[1.0], &mut out);
        assert_eq!(out[0], 20.0);
        assert_eq!(u.derivative_multiplier(0), 5.0);
    }

    #[test]
    fn mean_standard_deviation_slope_is_std() {
        let u = OutputsUnscaling::new(
            ScalingMethod::MeanStandardDeviation,
            vec![VariableStatistics {
                minimum: 0.0,
                maximum: 1.0,
                mean: 2.0,
                standard_deviation: 4.0,
            }],
        )
        .unwrap();
        let mut out = [0.0];
        u.unscale(&[0.5], &mut out);
        assert_eq!(out[0], 4.0);
        assert_eq!(u.derivative_multiplier(0), 4.0);
    }

    #[test]
    fn unknown_method_name_is_a_configuration_mismatch() {
        let err = "Logarithmic".parse::<ScalingMethod>().unwrap_err();
        assert!(matches!(err, Error::ConfigurationMismatch(_)));
    }
}
