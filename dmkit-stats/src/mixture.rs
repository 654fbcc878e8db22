//! Finite mixtures fitted by expectation-maximization.
//!
//! A [`Mixture`] owns its [`Component`]s, each of which carries a
//! distribution, a mixing probability and one posterior membership per
//! dataset row. [`Mixture::estimate`] alternates posterior updates and
//! per-component re-estimation on the posterior-reweighted sample until the
//! entropy fitness stops improving.

use core::cmp::Ordering;

use tracing::debug;

use dmkit_core::{DmError, Result, Summarizable};

use crate::analysis::Analysis;
use crate::distribution::{
    quantile_by_bisection, Categorical, Distribution, MultiNormal, Univariate, DEFAULT_SEED,
};
use crate::special::log_sum_exp;

/// Minimum fitness improvement for another EM iteration.
pub const EM_TOLERANCE: f64 = 1e-4;
/// Hard cap on EM iterations.
pub const EM_MAX_ITERATIONS: usize = 1000;

/// One weighted member of a [`Mixture`].
#[derive(Debug, Clone)]
pub struct Component<D> {
    pub distribution: D,
    pub probability: f64,
    /// Membership of each dataset row; NaN for rows never weighted.
    pub posteriors: Vec<f64>,
}

impl<D: Distribution> Component<D> {
    pub fn new(distribution: D, probability: f64, n_rows: usize) -> Self {
        Self {
            distribution,
            probability,
            posteriors: vec![f64::NAN; n_rows],
        }
    }
}

/// Mixture of distributions of one family.
#[derive(Debug, Clone)]
pub struct Mixture<D> {
    components: Vec<Component<D>>,
    fitness_trace: Vec<f64>,
    selector: Categorical,
}

impl<D: Distribution> Default for Mixture<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Distribution> Mixture<D> {
    pub fn new() -> Self {
        let mut selector = Categorical::new();
        selector.set_seed(DEFAULT_SEED + 1);
        Self {
            components: Vec::new(),
            fitness_trace: Vec::new(),
            selector,
        }
    }

    /// Register a component with posteriors sized to `n_rows`.
    pub fn add_component(&mut self, distribution: D, probability: f64, n_rows: usize) {
        self.components
            .push(Component::new(distribution, probability, n_rows));
    }

    pub fn components(&self) -> &[Component<D>] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [Component<D>] {
        &mut self.components
    }

    pub fn component(&self, i: usize) -> &Component<D> {
        &self.components[i]
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.probability).collect()
    }

    /// Fitness after each iteration of the last [`estimate`](Distribution::estimate).
    pub fn fitness_trace(&self) -> &[f64] {
        &self.fitness_trace
    }

    fn check_rows(&self, analysis: &Analysis<'_>) -> Result<()> {
        let n = analysis.n_rows();
        if let Some(c) = self.components.iter().find(|c| c.posteriors.len() != n) {
            return Err(DmError::DimensionMismatch {
                expected: n,
                found: c.posteriors.len(),
            });
        }
        Ok(())
    }

    fn expectation(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        if self.components.len() == 1 {
            let c = &mut self.components[0];
            for (row, _) in analysis.sample().iter() {
                c.posteriors[row] = 1.0;
            }
            return Ok(());
        }
        let mut logs = vec![0.0; self.components.len()];
        for (row, _) in analysis.sample().iter() {
            for (l, c) in logs.iter_mut().zip(&self.components) {
                *l = c.probability.ln() + c.distribution.log_density_row(analysis, row)?;
            }
            let norm = log_sum_exp(&logs);
            for (l, c) in logs.iter().zip(self.components.iter_mut()) {
                // A row no component can explain keeps the prior.
                c.posteriors[row] = if norm.is_finite() {
                    (l - norm).exp()
                } else {
                    c.probability
                };
            }
        }
        Ok(())
    }

    fn maximization(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let mut masses = vec![0.0; self.components.len()];
        for i in (0..self.components.len()).rev() {
            let c = &mut self.components[i];
            let sample = analysis.sample().reweighted(&c.posteriors)?;
            masses[i] = sample.weight_sum();
            let sub = analysis.with_sample(sample)?;
            c.distribution.estimate(&sub)?;
        }
        let total: f64 = masses.iter().sum();
        if !(total > 0.0) {
            return Err(DmError::Degenerate(
                "mixture: components carry no posterior mass".into(),
            ));
        }
        for (c, m) in self.components.iter_mut().zip(masses) {
            c.probability = m / total;
        }
        Ok(())
    }

    fn sort_components(&mut self) {
        self.components.sort_by(|a, b| {
            let (x, y) = (a.distribution.sorting_value(), b.distribution.sorting_value());
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => x.total_cmp(&y),
            }
        });
    }

    /// Remove component `i`, handing its posterior mass to the survivors in
    /// proportion to theirs.
    ///
    /// Refuses (returns `false`) for the sole component, a component of
    /// probability 1, or one that owns some row entirely.
    pub fn delete_component(&mut self, i: usize) -> bool {
        if self.components.len() < 2 || i >= self.components.len() {
            return false;
        }
        let victim = &self.components[i];
        if victim.probability >= 1.0 || victim.posteriors.iter().any(|&p| p >= 1.0) {
            return false;
        }
        let removed = self.components.remove(i);
        let rest = 1.0 - removed.probability;
        for c in &mut self.components {
            c.probability /= rest;
        }
        for (row, &p) in removed.posteriors.iter().enumerate() {
            if p.is_nan() {
                continue;
            }
            let keep = 1.0 - p;
            for c in &mut self.components {
                c.posteriors[row] /= keep;
            }
        }
        true
    }

    /// Fold component `j` into `i`: probabilities and posteriors add up.
    /// The distribution of `i` is kept unchanged.
    pub fn merge_components(&mut self, i: usize, j: usize) -> Result<()> {
        let k = self.components.len();
        if i == j || i >= k || j >= k {
            return Err(DmError::InvalidInput(format!(
                "mixture: cannot merge components {} and {} of {}",
                i, j, k
            )));
        }
        let absorbed = self.components.remove(j);
        let target = if j < i { i - 1 } else { i };
        let c = &mut self.components[target];
        c.probability += absorbed.probability;
        for (p, q) in c.posteriors.iter_mut().zip(absorbed.posteriors) {
            *p += q;
        }
        Ok(())
    }

    /// Merge every pair of components whose parameters agree within
    /// `delta`; returns the number of merges.
    pub fn merge_similar(&mut self, delta: f64) -> usize {
        let mut merged = 0;
        'scan: loop {
            for i in 0..self.components.len() {
                for j in (i + 1)..self.components.len() {
                    if self.components[i]
                        .distribution
                        .similar(&self.components[j].distribution, delta)
                        && self.merge_components(i, j).is_ok()
                    {
                        merged += 1;
                        continue 'scan;
                    }
                }
            }
            return merged;
        }
    }

    /// `1 − mean(max posterior)` over the weighted rows.
    pub fn confusion(&self, analysis: &Analysis<'_>) -> f64 {
        let sample = analysis.sample();
        let w = sample.weight_sum();
        if w <= 0.0 || self.components.is_empty() {
            return 0.0;
        }
        let sure: f64 = sample
            .iter()
            .map(|(row, w)| {
                let best = self
                    .components
                    .iter()
                    .map(|c| c.posteriors[row])
                    .fold(0.0, f64::max);
                w * best
            })
            .sum();
        1.0 - sure / w
    }

    /// Shared density mass of components `i` and `j`, at most 0.5.
    ///
    /// # Errors
    ///
    /// Returns an error if `i` or `j` is not a component index.
    pub fn overlap(&self, analysis: &Analysis<'_>, i: usize, j: usize) -> Result<f64> {
        let k = self.components.len();
        if i >= k || j >= k {
            return Err(DmError::InvalidInput(format!(
                "mixture: overlap of components {} and {} out of {}",
                i, j, k
            )));
        }
        let (a, b) = (&self.components[i], &self.components[j]);
        let mut shared = 0.0;
        let mut total = 0.0;
        for (row, w) in analysis.sample().iter() {
            let fa = a.probability * a.distribution.density_row(analysis, row)?;
            let fb = b.probability * b.distribution.density_row(analysis, row)?;
            if fa.is_nan() || fb.is_nan() {
                continue;
            }
            shared += w * fa.min(fb);
            total += w * (fa + fb);
        }
        Ok(if total > 0.0 { shared / total } else { 0.0 })
    }

    fn pick_component(&mut self) -> Option<usize> {
        let probs = self.probabilities();
        self.selector.set_parameters(probs).ok()?;
        Some(self.selector.random_category())
    }
}

impl<D: Distribution> Distribution for Mixture<D> {
    fn name(&self) -> &'static str {
        "Mixture"
    }

    fn dim(&self) -> usize {
        self.components.first().map_or(1, |c| c.distribution.dim())
    }

    fn is_parameterized(&self) -> bool {
        !self.components.is_empty()
            && self
                .components
                .iter()
                .all(|c| c.probability.is_finite() && c.distribution.is_parameterized())
    }

    fn param_count(&self) -> usize {
        self.components.len().saturating_sub(1)
            + self
                .components
                .iter()
                .map(|c| c.distribution.param_count())
                .sum::<usize>()
    }

    /// Run EM to convergence.
    ///
    /// When the mixture is not yet parameterized (fresh components, or right
    /// after a split) the first E-step is skipped and the stored posteriors
    /// drive the first M-step.
    ///
    /// # Errors
    ///
    /// [`DmError::Degenerate`] if the components end up with no posterior
    /// mass; contract errors from the component estimators propagate.
    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        if self.components.is_empty() {
            return Err(DmError::InvalidInput("mixture: no components".into()));
        }
        self.check_rows(analysis)?;
        self.fitness_trace.clear();
        let skip_first = !self.is_parameterized() && self.components.len() > 1;
        let mut previous = f64::INFINITY;
        for iteration in 0..EM_MAX_ITERATIONS {
            if iteration > 0 || !skip_first {
                self.expectation(analysis)?;
            }
            self.maximization(analysis)?;
            let fitness = self.fitness(analysis)?;
            self.fitness_trace.push(fitness);
            debug!(iteration, fitness, components = self.components.len(), "em step");
            if !(fitness < previous - EM_TOLERANCE) {
                break;
            }
            previous = fitness;
        }
        self.sort_components();
        Ok(())
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        if !self.is_parameterized() {
            return Ok(f64::NAN);
        }
        let mut logs = Vec::with_capacity(self.components.len());
        for c in &self.components {
            logs.push(c.probability.ln() + c.distribution.log_density_row(analysis, row)?);
        }
        Ok(log_sum_exp(&logs))
    }

    /// Selector gets `seed + 1`, component `i` gets `seed + 2 + i`.
    fn set_seed(&mut self, seed: u64) {
        self.selector.set_seed(seed.wrapping_add(1));
        for (i, c) in self.components.iter_mut().enumerate() {
            c.distribution.set_seed(seed.wrapping_add(2 + i as u64));
        }
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        self.components.len() == other.components.len()
            && self.components.iter().zip(&other.components).all(|(a, b)| {
                (a.probability - b.probability).abs() <= delta
                    && a.distribution.similar(&b.distribution, delta)
            })
    }

    fn sorting_value(&self) -> f64 {
        self.components
            .first()
            .map_or(f64::NAN, |c| c.distribution.sorting_value())
    }
}

impl<D: Univariate> Univariate for Mixture<D> {
    fn pdf(&self, x: f64) -> f64 {
        self.components
            .iter()
            .map(|c| c.probability * c.distribution.pdf(x))
            .sum()
    }

    fn cdf(&self, x: f64) -> f64 {
        self.components
            .iter()
            .map(|c| c.probability * c.distribution.cdf(x))
            .sum()
    }

    /// Bisection between the smallest and largest component quantile.
    fn quantile(&self, p: f64) -> f64 {
        if !(0.0..=1.0).contains(&p) || self.components.is_empty() {
            return f64::NAN;
        }
        let qs: Vec<f64> = self
            .components
            .iter()
            .map(|c| c.distribution.quantile(p))
            .collect();
        let lo = qs.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = qs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            return lo;
        }
        quantile_by_bisection(|x| self.cdf(x), lo, hi, p)
    }

    fn random(&mut self) -> f64 {
        match self.pick_component() {
            Some(i) => self.components[i].distribution.random(),
            None => f64::NAN,
        }
    }

    fn mean(&self) -> f64 {
        self.components
            .iter()
            .map(|c| c.probability * c.distribution.mean())
            .sum()
    }

    fn variance(&self) -> f64 {
        let mean = self.mean();
        self.components
            .iter()
            .map(|c| {
                let m = c.distribution.mean();
                c.probability * (c.distribution.variance() + m * m)
            })
            .sum::<f64>()
            - mean * mean
    }
}

impl Mixture<MultiNormal> {
    /// Draw one vector from a randomly selected component.
    pub fn random_vector(&mut self) -> Vec<f64> {
        match self.pick_component() {
            Some(i) => self.components[i].distribution.random_vector(),
            None => vec![f64::NAN; self.dim()],
        }
    }
}

impl<D: Distribution> Summarizable for Mixture<D> {
    fn summary(&self) -> String {
        let probs: Vec<String> = self
            .components
            .iter()
            .map(|c| format!("{:.3}", c.probability))
            .collect();
        format!(
            "Mixture: {} components, probabilities [{}]",
            self.components.len(),
            probs.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Normal;
    use dmkit_core::{RealColumn, Sample};
    use proptest::prelude::*;

    const TOL: f64 = 1e-6;

    fn two_blobs(n: usize, gap: f64) -> RealColumn {
        let mut g = Normal::standard();
        g.set_seed(11);
        let mut values = g.simulate(n);
        g.set_seed(12);
        values.extend(g.simulate(n).into_iter().map(|v| v + gap));
        RealColumn::from_reals("x", &values).unwrap()
    }

    fn seeded_mixture(col: &RealColumn, centers: &[f64]) -> Mixture<Normal> {
        let mut m = Mixture::new();
        for &c in centers {
            m.add_component(Normal::with_params(c, 1.0).unwrap(), 1.0 / centers.len() as f64, col.len());
        }
        m
    }

    #[test]
    fn em_separates_two_blobs() {
        let col = two_blobs(300, 10.0);
        let a = Analysis::real(Sample::uniform(col.len()), &col).unwrap();
        let mut m = seeded_mixture(&col, &[3.0, 6.0]);
        m.estimate(&a).unwrap();
        assert!(m.is_parameterized());
        let c0 = &m.component(0).distribution;
        let c1 = &m.component(1).distribution;
        assert!(c0.loc().abs() < 0.3, "loc0 = {}", c0.loc());
        assert!((c1.loc() - 10.0).abs() < 0.3, "loc1 = {}", c1.loc());
        let sum: f64 = m.probabilities().iter().sum();
        assert!((sum - 1.0).abs() < TOL);
        assert!((m.component(0).probability - 0.5).abs() < 0.02);
    }

    #[test]
    fn posteriors_sum_to_one_and_fitness_never_worsens() {
        let col = two_blobs(100, 3.0);
        let a = Analysis::real(Sample::uniform(col.len()), &col).unwrap();
        let mut m = seeded_mixture(&col, &[-1.0, 1.0, 4.0]);
        m.estimate(&a).unwrap();
        for row in 0..col.len() {
            let s: f64 = m.components().iter().map(|c| c.posteriors[row]).sum();
            assert!((s - 1.0).abs() < TOL);
        }
        let trace = m.fitness_trace();
        assert!(!trace.is_empty());
        for w in trace.windows(2) {
            assert!(w[1] <= w[0] + 1e-9, "{:?}", trace);
        }
    }

    #[test]
    fn estimate_is_idempotent() {
        let col = two_blobs(200, 8.0);
        let a = Analysis::real(Sample::uniform(col.len()), &col).unwrap();
        let mut m = seeded_mixture(&col, &[0.0, 8.0]);
        m.estimate(&a).unwrap();
        let first = m.clone();
        m.estimate(&a).unwrap();
        assert!(m.similar(&first, 1e-3));
    }

    #[test]
    fn delete_conserves_posterior_mass() {
        let col = two_blobs(50, 2.0);
        let a = Analysis::real(Sample::uniform(col.len()), &col).unwrap();
        let mut m = seeded_mixture(&col, &[-1.0, 1.0, 3.0]);
        m.estimate(&a).unwrap();
        assert!(m.delete_component(1));
        assert_eq!(m.len(), 2);
        let sum: f64 = m.probabilities().iter().sum();
        assert!((sum - 1.0).abs() < TOL);
        for row in 0..col.len() {
            let s: f64 = m.components().iter().map(|c| c.posteriors[row]).sum();
            assert!((s - 1.0).abs() < TOL);
        }
    }

    #[test]
    fn delete_refuses_sole_or_owning_component() {
        let col = RealColumn::from_reals("x", &[0.0, 1.0]).unwrap();
        let mut m = seeded_mixture(&col, &[0.0]);
        m.components_mut()[0].posteriors = vec![1.0, 1.0];
        assert!(!m.delete_component(0));

        let mut m = seeded_mixture(&col, &[0.0, 1.0]);
        m.components_mut()[0].posteriors = vec![1.0, 0.5];
        m.components_mut()[1].posteriors = vec![0.0, 0.5];
        assert!(!m.delete_component(0));
        assert!(m.delete_component(1));
    }

    #[test]
    fn merge_preserves_total_probability() {
        let col = two_blobs(50, 0.5);
        let a = Analysis::real(Sample::uniform(col.len()), &col).unwrap();
        let mut m = seeded_mixture(&col, &[0.0, 0.5]);
        m.estimate(&a).unwrap();
        assert!(m.overlap(&a, 0, 1).unwrap() > 0.1);
        m.merge_components(1, 0).unwrap();
        assert_eq!(m.len(), 1);
        assert!((m.component(0).probability - 1.0).abs() < TOL);
        assert!(m.merge_components(0, 0).is_err());
    }

    #[test]
    fn merge_similar_collapses_twins() {
        let col = RealColumn::from_reals("x", &[0.0, 1.0, 2.0]).unwrap();
        let mut m = seeded_mixture(&col, &[1.0, 1.0, 5.0]);
        assert_eq!(m.merge_similar(1e-9), 1);
        assert_eq!(m.len(), 2);
        assert!((m.probabilities().iter().sum::<f64>() - 1.0).abs() < TOL);
    }

    #[test]
    fn overlap_is_bounded() {
        let col = two_blobs(50, 1.0);
        let a = Analysis::real(Sample::uniform(col.len()), &col).unwrap();
        let m = seeded_mixture(&col, &[0.0, 0.0]);
        let o = m.overlap(&a, 0, 1).unwrap();
        assert!((o - 0.5).abs() < TOL);
        assert!(m.confusion(&a) >= 0.0);
    }

    #[test]
    fn overlap_rejects_unknown_component() {
        let col = two_blobs(10, 1.0);
        let a = Analysis::real(Sample::uniform(col.len()), &col).unwrap();
        let m = seeded_mixture(&col, &[0.0, 1.0]);
        assert!(matches!(m.overlap(&a, 0, 2), Err(DmError::InvalidInput(_))));
        assert!(m.overlap(&a, 5, 1).is_err());
    }

    #[test]
    fn seed_derivation_wraps_at_max() {
        let col = RealColumn::from_reals("x", &[0.0]).unwrap();
        let mut m = seeded_mixture(&col, &[0.0, 5.0]);
        m.set_seed(u64::MAX);
        // component 0 gets MAX + 2, which wraps to 1
        let mut expected = Normal::with_params(0.0, 1.0).unwrap();
        expected.set_seed(1);
        assert_eq!(m.components_mut()[0].distribution.simulate(5), expected.simulate(5));
        m.set_seed(u64::MAX - 1);
        assert_eq!(m.simulate(3).len(), 3);
    }

    #[test]
    fn all_zero_mass_is_degenerate() {
        let col = RealColumn::from_reals("x", &[0.0, 1.0]).unwrap();
        let a = Analysis::real(Sample::uniform(2), &col).unwrap();
        let mut m: Mixture<Normal> = Mixture::new();
        m.add_component(Normal::new(), 0.5, 2);
        m.add_component(Normal::new(), 0.5, 2);
        for c in m.components_mut() {
            c.posteriors = vec![0.0, 0.0];
        }
        assert!(matches!(m.estimate(&a), Err(DmError::Degenerate(_))));
    }

    #[test]
    fn univariate_view() {
        let col = RealColumn::from_reals("x", &[0.0]).unwrap();
        let mut m = seeded_mixture(&col, &[-2.0, 2.0]);
        assert!(m.mean().abs() < TOL);
        assert!((m.variance() - 5.0).abs() < TOL);
        assert!(m.quantile(0.5).abs() < 1e-6);
        assert!((m.cdf(0.0) - 0.5).abs() < TOL);
        m.set_seed(3);
        let a = m.simulate(10);
        m.set_seed(3);
        assert_eq!(a, m.simulate(10));
    }

    proptest! {
        #[test]
        fn fitted_probabilities_sum_to_one(shift in 0.5..6.0f64) {
            let col = two_blobs(40, shift);
            let a = Analysis::real(Sample::uniform(col.len()), &col).unwrap();
            let mut m = seeded_mixture(&col, &[0.0, shift]);
            if m.estimate(&a).is_ok() {
                let sum: f64 = m.probabilities().iter().sum();
                prop_assert!((sum - 1.0).abs() < TOL);
            }
        }
    }
}
