//! Weighted row samples.
//!
//! A [`Sample`] assigns a non-negative weight (multiplicity) to every row of a
//! dataset. Rows with zero weight are invisible to estimation: the
//! [`SampleIter`] skips them and they do not count towards
//! [`Sample::effective_count`].

use crate::{DmError, Result};

/// Immutable vector of row weights with cached aggregates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    weights: Vec<f64>,
    weight_sum: f64,
    effective_count: usize,
}

impl Sample {
    /// Build a sample from per-row weights.
    ///
    /// # Errors
    ///
    /// Returns an error if any weight is negative, NaN or infinite.
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if let Some((row, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(DmError::InvalidInput(format!(
                "sample: weight of row {} is {}, must be finite and >= 0",
                row, w
            )));
        }
        Ok(Self::from_checked(weights))
    }

    /// Every row with weight 1.
    pub fn uniform(n_rows: usize) -> Self {
        Self::from_checked(vec![1.0; n_rows])
    }

    fn from_checked(weights: Vec<f64>) -> Self {
        let weight_sum = weights.iter().sum();
        let effective_count = weights.iter().filter(|&&w| w > 0.0).count();
        Self {
            weights,
            weight_sum,
            effective_count,
        }
    }

    /// Number of rows, including zero-weight ones.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the sample spans no rows at all.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight of `row`.
    pub fn weight(&self, row: usize) -> f64 {
        self.weights[row]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Sum of all weights.
    pub fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    /// Number of rows with a positive weight.
    pub fn effective_count(&self) -> usize {
        self.effective_count
    }

    /// Largest single weight, 0 for an empty sample.
    pub fn max_weight(&self) -> f64 {
        self.weights.iter().cloned().fold(0.0, f64::max)
    }

    /// Iterate `(row, weight)` over the rows with positive weight.
    ///
    /// Each call starts a fresh traversal.
    pub fn iter(&self) -> SampleIter<'_> {
        SampleIter {
            weights: &self.weights,
            row: 0,
        }
    }

    /// Multiply each weight by the matching factor.
    ///
    /// Factors of rows whose weight is already zero are ignored, so a
    /// posterior vector with NaN entries for those rows is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ or a factor of a weighted row is
    /// negative or not finite.
    pub fn reweighted(&self, factors: &[f64]) -> Result<Self> {
        if factors.len() != self.weights.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.weights.len(),
                found: factors.len(),
            });
        }
        let mut weights = Vec::with_capacity(self.weights.len());
        for (row, (&w, &f)) in self.weights.iter().zip(factors).enumerate() {
            if w == 0.0 {
                weights.push(0.0);
                continue;
            }
            if !f.is_finite() || f < 0.0 {
                return Err(DmError::InvalidInput(format!(
                    "sample: factor of row {} is {}, must be finite and >= 0",
                    row, f
                )));
            }
            weights.push(w * f);
        }
        Ok(Self::from_checked(weights))
    }

    /// Zero the weight of every row for which `keep` returns false.
    pub fn restricted<F>(&self, keep: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        let weights = self
            .weights
            .iter()
            .enumerate()
            .map(|(row, &w)| if keep(row) { w } else { 0.0 })
            .collect();
        Self::from_checked(weights)
    }

    /// Zero the weight of every row whose value is missing.
    pub fn without_missing<F>(&self, is_missing: F) -> Self
    where
        F: Fn(usize) -> bool,
    {
        self.restricted(|row| !is_missing(row))
    }
}

/// Restartable iterator over positively weighted rows.
#[derive(Debug, Clone)]
pub struct SampleIter<'a> {
    weights: &'a [f64],
    row: usize,
}

impl<'a> Iterator for SampleIter<'a> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.row < self.weights.len() {
            let row = self.row;
            self.row += 1;
            let w = self.weights[row];
            if w > 0.0 {
                return Some((row, w));
            }
        }
        None
    }
}

impl<'a> IntoIterator for &'a Sample {
    type Item = (usize, f64);
    type IntoIter = SampleIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn aggregates() {
        let s = Sample::new(vec![1.0, 0.0, 2.5, 0.5]).unwrap();
        assert_eq!(s.len(), 4);
        assert!((s.weight_sum() - 4.0).abs() < 1e-12);
        assert_eq!(s.effective_count(), 3);
        assert!((s.max_weight() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_weights() {
        assert!(Sample::new(vec![1.0, -0.1]).is_err());
        assert!(Sample::new(vec![f64::NAN]).is_err());
        assert!(Sample::new(vec![f64::INFINITY]).is_err());
    }

    #[test]
    fn iter_skips_zero_and_restarts() {
        let s = Sample::new(vec![0.0, 1.0, 0.0, 3.0]).unwrap();
        let first: Vec<_> = s.iter().collect();
        assert_eq!(first, vec![(1, 1.0), (3, 3.0)]);
        let second: Vec<_> = s.iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn reweighted_ignores_nan_on_empty_rows() {
        let s = Sample::new(vec![2.0, 0.0, 1.0]).unwrap();
        let r = s.reweighted(&[0.5, f64::NAN, 0.0]).unwrap();
        assert_eq!(r.weights(), &[1.0, 0.0, 0.0]);
        assert_eq!(r.effective_count(), 1);
        assert!(s.reweighted(&[f64::NAN, 1.0, 1.0]).is_err());
        assert!(s.reweighted(&[1.0]).is_err());
    }

    #[test]
    fn restricted_zeroes_rows() {
        let s = Sample::uniform(5);
        let r = s.restricted(|row| row % 2 == 0);
        assert_eq!(r.effective_count(), 3);
        assert!((r.weight_sum() - 3.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn aggregates_match_iteration(ws in proptest::collection::vec(0.0..10.0f64, 0..50)) {
            let s = Sample::new(ws).unwrap();
            let sum: f64 = s.iter().map(|(_, w)| w).sum();
            prop_assert!((sum - s.weight_sum()).abs() < 1e-9);
            prop_assert_eq!(s.iter().count(), s.effective_count());
            prop_assert!(s.iter().all(|(_, w)| w > 0.0));
        }
    }
}
