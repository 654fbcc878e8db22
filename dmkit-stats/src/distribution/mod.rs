//! Probability distributions with weighted maximum-likelihood estimation.
//!
//! Every family implements [`Distribution`], the capability interface used by
//! mixtures and model selection: estimation from an [`Analysis`], per-row
//! log-density, seeding, and the entropy-based fitness. One-dimensional
//! families additionally implement [`Univariate`] (pdf, cdf, quantile,
//! random variates).
//!
//! A distribution is either parameterized or not. Estimation from a
//! degenerate sample (too few observations, zero spread) leaves it
//! unparameterized, and densities of an unparameterized distribution are NaN.
//! Contract violations (wrong column type, values outside the support,
//! malformed parameters) are reported as errors.

mod continuous;
mod discrete;
mod kernel;
mod multinormal;

pub use continuous::{Beta, Cauchy, Chi2, Exponential, Normal};
pub use discrete::{Bernoulli, Binomial, Categorical, Geometric, Zipf};
pub use kernel::UniKernel;
pub use multinormal::MultiNormal;

use core::fmt::Debug;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dmkit_core::Result;

use crate::analysis::Analysis;

/// Seed of a freshly constructed distribution.
pub const DEFAULT_SEED: u64 = 1;

pub(crate) fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Uniform draw from the open interval (0, 1).
pub(crate) fn open_unit<R: Rng>(rng: &mut R) -> f64 {
    loop {
        let u: f64 = rng.gen();
        if u > 0.0 {
            return u;
        }
    }
}

/// Model of one variable (or one vector of variables) fitted to an [`Analysis`].
pub trait Distribution: Clone + Debug {
    /// Family name.
    fn name(&self) -> &'static str;

    /// Number of coordinates of an observation.
    fn dim(&self) -> usize {
        1
    }

    /// Whether parameters are set and consistent.
    fn is_parameterized(&self) -> bool;

    /// Number of free parameters.
    fn param_count(&self) -> usize;

    /// Replace the parameters by their weighted maximum-likelihood estimate.
    ///
    /// A degenerate sample leaves the distribution unparameterized and
    /// returns `Ok(())`.
    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()>;

    /// Log-density of the observation in `row`; `0.0` when it is missing.
    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64>;

    /// Reseed the random generator (and those of owned sub-distributions).
    fn set_seed(&mut self, seed: u64);

    /// Whether the parameters of `self` and `other` agree within `delta`.
    fn similar(&self, other: &Self, delta: f64) -> bool;

    /// Key used to order mixture components; NaN sorts last.
    fn sorting_value(&self) -> f64 {
        f64::NAN
    }

    fn density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        Ok(self.log_density_row(analysis, row)?.exp())
    }

    /// Σ w · log f(x) over positively weighted rows; NaN if unparameterized or
    /// if any weighted row has NaN density.
    fn log_likelihood(&self, analysis: &Analysis<'_>) -> Result<f64> {
        if !self.is_parameterized() {
            return Ok(f64::NAN);
        }
        let mut sum = 0.0;
        for (row, w) in analysis.sample().iter() {
            let l = self.log_density_row(analysis, row)?;
            if l.is_nan() {
                return Ok(f64::NAN);
            }
            sum += w * l;
        }
        Ok(sum)
    }

    /// Estimated entropy, `-log_likelihood / W`.
    fn entropy_estimate(&self, analysis: &Analysis<'_>) -> Result<f64> {
        let w = analysis.sample().weight_sum();
        if w <= 0.0 {
            return Ok(f64::NAN);
        }
        Ok(-self.log_likelihood(analysis)? / w)
    }

    /// Entropy fitness: estimated entropy plus the penalty
    /// `param_count · ln W / (2W)`. Lower is better.
    fn fitness(&self, analysis: &Analysis<'_>) -> Result<f64> {
        let w = analysis.sample().weight_sum();
        let entropy = self.entropy_estimate(analysis)?;
        if w <= 0.0 {
            return Ok(entropy);
        }
        Ok(entropy + self.param_count() as f64 * w.ln() / (2.0 * w))
    }

    /// Positively weighted row with the highest density.
    fn mode_row(&self, analysis: &Analysis<'_>) -> Result<Option<usize>> {
        extreme_row(self, analysis, |a, b| a > b)
    }

    /// Positively weighted row with the lowest density.
    fn weakest_row(&self, analysis: &Analysis<'_>) -> Result<Option<usize>> {
        extreme_row(self, analysis, |a, b| a < b)
    }
}

fn extreme_row<D, F>(d: &D, analysis: &Analysis<'_>, better: F) -> Result<Option<usize>>
where
    D: Distribution + ?Sized,
    F: Fn(f64, f64) -> bool,
{
    let mut best: Option<(usize, f64)> = None;
    for (row, _) in analysis.sample().iter() {
        let l = d.log_density_row(analysis, row)?;
        if l.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if !better(l, b) => {}
            _ => best = Some((row, l)),
        }
    }
    Ok(best.map(|(row, _)| row))
}

/// One-dimensional distribution with closed-form or numeric pdf, cdf and
/// quantile.
pub trait Univariate: Distribution {
    /// Density (or probability mass) at `x`.
    fn pdf(&self, x: f64) -> f64;

    fn log_pdf(&self, x: f64) -> f64 {
        self.pdf(x).ln()
    }

    fn cdf(&self, x: f64) -> f64;

    /// Smallest `x` with `cdf(x) >= p`, for `p` in [0, 1]; NaN otherwise.
    fn quantile(&self, p: f64) -> f64;

    /// Draw one variate, advancing the generator.
    fn random(&mut self) -> f64;

    fn mean(&self) -> f64;

    fn variance(&self) -> f64;

    fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `n` independent variates.
    fn simulate(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.random()).collect()
    }
}

/// Log-density of a real-valued row under a [`Univariate`] family.
pub(crate) fn real_row_log_density<D: Univariate>(
    d: &D,
    analysis: &Analysis<'_>,
    row: usize,
) -> Result<f64> {
    Ok(match analysis.real_value(row)? {
        Some(x) => d.log_pdf(x),
        None => 0.0,
    })
}

/// Quantile of a continuous family on `[lo, hi]` by bisection on `cdf - p`.
pub(crate) fn quantile_by_bisection<F>(cdf: F, lo: f64, hi: f64, p: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return lo;
    }
    if p == 1.0 {
        return hi;
    }
    let tol = 1e-12 * (hi - lo).abs().max(1.0);
    crate::roots::bisect_clamped(|x| cdf(x) - p, lo, hi, crate::roots::RootOptions::with_tol(tol))
        .unwrap_or(f64::NAN)
}

/// Relative closeness used by [`Distribution::similar`].
pub(crate) fn close(a: f64, b: f64, delta: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= delta * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
pub(crate) mod test_util {
    use dmkit_core::{RealColumn, RealKind};

    pub fn column(values: &[f64]) -> RealColumn {
        RealColumn::from_values("x", RealKind::Real, values.iter().map(|&v| Some(v)).collect())
            .unwrap()
    }

    /// Deterministic LCG in [0, 1).
    pub fn lcg(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 11) as f64 / (1u64 << 53) as f64
            })
            .collect()
    }
}
