//! Contiguous dataset storage.
//!
//! A `Dataset` keeps every instance's inputs and targets in row-major buffers and
//! partitions the instances into training, validation and testing subsets. The loss
//! functionals only ever read through the subset accessors.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{Error, Result, VariableStatistics};

/// Instance subset of a [`Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Training,
    Validation,
    Testing,
}

/// A supervised dataset: inputs (X) and targets (Y).
///
/// Stored as contiguous buffers with row-major layout:
/// - `inputs.len() == len * input_dim`
/// - `targets.len() == len * target_dim`
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Vec<f64>,
    targets: Vec<f64>,
    len: usize,
    input_dim: usize,
    target_dim: usize,
    training: Vec<usize>,
    validation: Vec<usize>,
    testing: Vec<usize>,
}

impl Dataset {
    /// Build a dataset from flat buffers. Every instance starts in the training subset.
    ///
    /// `inputs` is `(len, input_dim)` and `targets` is `(len, target_dim)`.
    pub fn from_flat(
        inputs: Vec<f64>,
        targets: Vec<f64>,
        input_dim: usize,
        target_dim: usize,
    ) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        if target_dim == 0 {
            return Err(Error::InvalidData("target_dim must be > 0".to_owned()));
        }
        if inputs.len() % input_dim != 0 {
            return Err(Error::InvalidData(format!(
                "inputs length {} is not divisible by input_dim {input_dim}",
                inputs.len()
            )));
        }

        let len = inputs.len() / input_dim;
        if targets.len() != len * target_dim {
            return Err(Error::InvalidData(format!(
                "targets length {} does not match len * target_dim ({len} * {target_dim})",
                targets.len()
            )));
        }
        if inputs.iter().chain(&targets).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "dataset values must be finite".to_owned(),
            ));
        }

        Ok(Self {
            inputs,
            targets,
            len,
            input_dim,
            target_dim,
            training: (0..len).collect(),
            validation: Vec::new(),
            testing: Vec::new(),
        })
    }

    /// Build a dataset from per-instance rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> Result<Self> {
        if inputs.len() != targets.len() {
            return Err(Error::InvalidData(format!(
                "inputs/targets length mismatch: {} vs {}",
                inputs.len(),
                targets.len()
            )));
        }
        if inputs.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }

        let input_dim = inputs[0].len();
        let target_dim = targets[0].len();
        let mut inputs_flat = Vec::with_capacity(inputs.len() * input_dim);
        let mut targets_flat = Vec::with_capacity(targets.len() * target_dim);

        for (i, (x, t)) in inputs.iter().zip(targets).enumerate() {
            if x.len() != input_dim {
                return Err(Error::InvalidData(format!(
                    "input row {i} has len {}, expected {input_dim}",
                    x.len()
                )));
            }
            if t.len() != target_dim {
                return Err(Error::InvalidData(format!(
                    "target row {i} has len {}, expected {target_dim}",
                    t.len()
                )));
            }
            inputs_flat.extend_from_slice(x);
            targets_flat.extend_from_slice(t);
        }

        Self::from_flat(inputs_flat, targets_flat, input_dim, target_dim)
    }

    /// Assign explicit instance indices to each subset.
    ///
    /// Indices must be in range and appear in at most one subset. Instances left out
    /// of all three subsets are unused.
    pub fn set_subsets(
        &mut self,
        training: Vec<usize>,
        validation: Vec<usize>,
        testing: Vec<usize>,
    ) -> Result<()> {
        let mut seen = vec![false; self.len];
        for &idx in training.iter().chain(&validation).chain(&testing) {
            if idx >= self.len {
                return Err(Error::InvalidData(format!(
                    "instance index {idx} out of range for {} instances",
                    self.len
                )));
            }
            if seen[idx] {
                return Err(Error::InvalidData(format!(
                    "instance index {idx} assigned to more than one subset"
                )));
            }
            seen[idx] = true;
        }

        self.training = training;
        self.validation = validation;
        self.testing = testing;
        Ok(())
    }

    /// Split instances in their stored order with the given ratios.
    ///
    /// Ratios are normalized by their sum; testing takes the rounding remainder.
    pub fn split_sequential(
        &mut self,
        training_ratio: f64,
        validation_ratio: f64,
        testing_ratio: f64,
    ) -> Result<()> {
        let order: Vec<usize> = (0..self.len).collect();
        self.split_ordered(order, training_ratio, validation_ratio, testing_ratio)
    }

    /// Split instances after a seeded shuffle.
    pub fn split_random_with_seed(
        &mut self,
        training_ratio: f64,
        validation_ratio: f64,
        testing_ratio: f64,
        seed: u64,
    ) -> Result<()> {
        let mut order: Vec<usize> = (0..self.len).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
        self.split_ordered(order, training_ratio, validation_ratio, testing_ratio)
    }

    fn split_ordered(
        &mut self,
        order: Vec<usize>,
        training_ratio: f64,
        validation_ratio: f64,
        testing_ratio: f64,
    ) -> Result<()> {
        let ratios = [training_ratio, validation_ratio, testing_ratio];
        if ratios.iter().any(|r| !(r.is_finite() && *r >= 0.0)) {
            return Err(Error::InvalidConfig(
                "split ratios must be finite and >= 0".to_owned(),
            ));
        }
        let total: f64 = ratios.iter().sum();
        if total <= 0.0 {
            return Err(Error::InvalidConfig(
                "split ratios must not all be zero".to_owned(),
            ));
        }

        let training_len = (self.len as f64 * training_ratio / total).round() as usize;
        let validation_len = ((self.len as f64 * validation_ratio / total).round() as usize)
            .min(self.len - training_len.min(self.len));
        let training_len = training_len.min(self.len);

        let mut rest = order;
        let mut tail = rest.split_off(training_len);
        let testing = tail.split_off(validation_len);

        self.training = rest;
        self.validation = tail;
        self.testing = testing;
        Ok(())
    }

    #[inline]
    /// Returns the total number of instances.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    /// Number of input variables.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    /// Number of target variables.
    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    #[inline]
    pub fn subset_indices(&self, subset: Subset) -> &[usize] {
        match subset {
            Subset::Training => &self.training,
            Subset::Validation => &self.validation,
            Subset::Testing => &self.testing,
        }
    }

    #[inline]
    pub fn subset_len(&self, subset: Subset) -> usize {
        self.subset_indices(subset).len()
    }

    #[inline]
    pub fn training_len(&self) -> usize {
        self.training.len()
    }

    #[inline]
    pub fn validation_len(&self) -> usize {
        self.validation.len()
    }

    #[inline]
    pub fn testing_len(&self) -> usize {
        self.testing.len()
    }

    /// Returns the `idx`-th input row over all instances.
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn input(&self, idx: usize) -> &[f64] {
        let start = idx * self.input_dim;
        &self.inputs[start..start + self.input_dim]
    }

    /// Returns the `idx`-th target row over all instances.
    ///
    /// Panics if `idx >= len`.
    #[inline]
    pub fn target(&self, idx: usize) -> &[f64] {
        let start = idx * self.target_dim;
        &self.targets[start..start + self.target_dim]
    }

    /// Input row of the `i`-th instance of `subset`.
    #[inline]
    pub fn subset_input(&self, subset: Subset, i: usize) -> &[f64] {
        self.input(self.subset_indices(subset)[i])
    }

    #[inline]
    pub fn subset_target(&self, subset: Subset, i: usize) -> &[f64] {
        self.target(self.subset_indices(subset)[i])
    }

    #[inline]
    pub fn training_input(&self, i: usize) -> &[f64] {
        self.subset_input(Subset::Training, i)
    }

    #[inline]
    pub fn training_target(&self, i: usize) -> &[f64] {
        self.subset_target(Subset::Training, i)
    }

    #[inline]
    pub fn validation_input(&self, i: usize) -> &[f64] {
        self.subset_input(Subset::Validation, i)
    }

    #[inline]
    pub fn validation_target(&self, i: usize) -> &[f64] {
        self.subset_target(Subset::Validation, i)
    }

    /// Minimum, maximum, mean and standard deviation of every target variable over `subset`.
    pub fn target_statistics(&self, subset: Subset) -> Vec<VariableStatistics> {
        let indices = self.subset_indices(subset);
        (0..self.target_dim)
            .map(|j| VariableStatistics::from_values(indices.iter().map(|&i| self.target(i)[j])))
            .collect()
    }

    /// Minimum, maximum, mean and standard deviation of every input variable over `subset`.
    pub fn input_statistics(&self, subset: Subset) -> Vec<VariableStatistics> {
        let indices = self.subset_indices(subset);
        (0..self.input_dim)
            .map(|j| VariableStatistics::from_values(indices.iter().map(|&i| self.input(i)[j])))
            .collect()
    }

    /// Mean of every target variable over `subset`. All zeros for an empty subset.
    pub fn target_mean(&self, subset: Subset) -> Vec<f64> {
        let indices = self.subset_indices(subset);
        let mut mean = vec![0.0; self.target_dim];
        if indices.is_empty() {
            return mean;
        }
        for &i in indices {
            for (m, &t) in mean.iter_mut().zip(self.target(i)) {
                *m += t;
            }
        }
        let inv_n = 1.0 / indices.len() as f64;
        for m in &mut mean {
            *m *= inv_n;
        }
        mean
    }

    #[inline]
    pub fn training_target_mean(&self) -> Vec<f64> {
        self.target_mean(Subset::Training)
    }

    #[inline]
    pub fn validation_target_mean(&self) -> Vec<f64> {
        self.target_mean(Subset::Validation)
    }
}
