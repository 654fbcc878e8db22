//! Multivariate normal distribution over a space of real columns.

use core::f64::consts::PI;

use tracing::debug;

use dmkit_core::{DmError, Result};

use super::{close, Distribution, Normal, Univariate, DEFAULT_SEED};
use crate::analysis::Analysis;
use crate::eigen::SymmetricEigen;
use crate::linalg::{dot, Matrix};

/// N(μ, Σ) with an optional per-dimension variance floor.
///
/// The floor is enforced on the covariance before factorization: when any
/// eigenvalue falls below it the covariance is rebuilt from its
/// eigenvectors with the eigenvalues clipped, which keeps it positive
/// definite.
#[derive(Debug, Clone)]
pub struct MultiNormal {
    mu: Vec<f64>,
    sigma: Matrix,
    variance_min: Vec<f64>,
    /// Lower Cholesky factor of `sigma`.
    chol: Matrix,
    sigma_inv: Matrix,
    /// `0.5 · (d·ln 2π + ln det Σ)`; infinite when unparameterized.
    coefficient: f64,
    z: Vec<Normal>,
}

impl MultiNormal {
    /// Unparameterized distribution of dimension `dim`.
    pub fn new(dim: usize) -> Self {
        let mut mn = Self {
            mu: vec![f64::NAN; dim],
            sigma: Matrix::zeros(dim, dim),
            variance_min: vec![0.0; dim],
            chol: Matrix::zeros(dim, dim),
            sigma_inv: Matrix::zeros(dim, dim),
            coefficient: f64::INFINITY,
            z: vec![Normal::standard(); dim],
        };
        mn.set_seed(DEFAULT_SEED);
        mn
    }

    /// Parameterized N(mu, sigma).
    pub fn with_params(mu: Vec<f64>, sigma: Matrix) -> Result<Self> {
        let mut mn = Self::new(mu.len());
        mn.set_parameters(mu, sigma)?;
        Ok(mn)
    }

    /// Set the per-dimension variance floor; applied on the next
    /// `set_parameters` or `estimate`.
    pub fn with_variance_min(mut self, floor: Vec<f64>) -> Result<Self> {
        self.set_variance_min(floor)?;
        Ok(self)
    }

    pub fn set_variance_min(&mut self, floor: Vec<f64>) -> Result<()> {
        if floor.len() != self.mu.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.mu.len(),
                found: floor.len(),
            });
        }
        if floor.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(DmError::InvalidInput(
                "multinormal: variance floor must be finite and >= 0".into(),
            ));
        }
        self.variance_min = floor;
        Ok(())
    }

    /// Validate, inflate and factor.
    ///
    /// # Errors
    ///
    /// Returns an error on dimension mismatch or non-finite input. A
    /// covariance that cannot be factored leaves the distribution
    /// unparameterized.
    pub fn set_parameters(&mut self, mu: Vec<f64>, sigma: Matrix) -> Result<()> {
        let d = self.mu.len();
        if mu.len() != d {
            return Err(DmError::DimensionMismatch {
                expected: d,
                found: mu.len(),
            });
        }
        if sigma.rows() != d || sigma.cols() != d {
            return Err(DmError::DimensionMismatch {
                expected: d,
                found: sigma.rows(),
            });
        }
        if mu.iter().any(|v| !v.is_finite()) || !sigma.is_finite() {
            return Err(DmError::InvalidInput(
                "multinormal: parameters must be finite".into(),
            ));
        }
        self.mu = mu;
        self.sigma = sigma;
        self.sigma.symmetrize();
        self.inflate();
        self.factor();
        Ok(())
    }

    fn inflate(&mut self) {
        if self.variance_min.iter().all(|&v| v == 0.0) {
            return;
        }
        match SymmetricEigen::new(&self.sigma) {
            Some(eig) => {
                let violated = eig
                    .values
                    .iter()
                    .zip(&self.variance_min)
                    .any(|(l, m)| l < m);
                if violated {
                    let clipped: Vec<f64> = eig
                        .values
                        .iter()
                        .zip(&self.variance_min)
                        .map(|(&l, &m)| l.max(m))
                        .collect();
                    debug!(dim = self.mu.len(), "covariance inflated to variance floor");
                    self.sigma = eig.restore_with(&clipped);
                    self.sigma.symmetrize();
                }
            }
            None => {
                for (i, &m) in self.variance_min.iter().enumerate() {
                    if self.sigma[(i, i)] < m {
                        self.sigma[(i, i)] = m;
                    }
                }
            }
        }
    }

    fn factor(&mut self) {
        let d = self.mu.len();
        self.coefficient = f64::INFINITY;
        let chol = match self.sigma.cholesky() {
            Some(l) => l,
            None => return,
        };
        let (inv, det) = match self.sigma.inverse_with_determinant() {
            Some(r) => r,
            None => return,
        };
        if !(det > 0.0) || !det.is_finite() {
            return;
        }
        self.chol = chol;
        self.sigma_inv = inv;
        self.coefficient = 0.5 * (d as f64 * (2.0 * PI).ln() + det.ln());
    }

    pub fn mu(&self) -> &[f64] {
        &self.mu
    }

    pub fn sigma(&self) -> &Matrix {
        &self.sigma
    }

    pub fn variance_min(&self) -> &[f64] {
        &self.variance_min
    }

    /// Lower Cholesky factor of the covariance.
    pub fn cholesky(&self) -> &Matrix {
        &self.chol
    }

    pub fn sigma_inv(&self) -> &Matrix {
        &self.sigma_inv
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// `Σ + μμᵀ`.
    pub fn raw_second_moment(&self) -> Matrix {
        let d = self.mu.len();
        let mut m = self.sigma.clone();
        for i in 0..d {
            for j in 0..d {
                m[(i, j)] += self.mu[i] * self.mu[j];
            }
        }
        m
    }

    /// Moment-matched single normal of the two-component mixture
    /// `pa·a + pb·b`. The variance floor of `a` is kept.
    pub fn merged(a: &MultiNormal, pa: f64, b: &MultiNormal, pb: f64) -> Result<MultiNormal> {
        let d = a.dim();
        if b.dim() != d {
            return Err(DmError::DimensionMismatch {
                expected: d,
                found: b.dim(),
            });
        }
        let total = pa + pb;
        if !(total > 0.0) {
            return Err(DmError::Degenerate(
                "multinormal: merged probabilities sum to zero".into(),
            ));
        }
        let (fa, fb) = (pa / total, pb / total);
        let mu: Vec<f64> = a.mu.iter().zip(&b.mu).map(|(x, y)| fa * x + fb * y).collect();
        let mut sigma = a.raw_second_moment();
        sigma.scale(fa);
        sigma.add_scaled(&b.raw_second_moment(), fb)?;
        for i in 0..d {
            for j in 0..d {
                sigma[(i, j)] -= mu[i] * mu[j];
            }
        }
        let mut out = MultiNormal::new(d);
        out.variance_min = a.variance_min.clone();
        out.set_parameters(mu, sigma)?;
        Ok(out)
    }

    /// Squared Mahalanobis distance of a complete vector.
    pub fn mahalanobis(&self, x: &[f64]) -> f64 {
        let diff: Vec<f64> = x.iter().zip(&self.mu).map(|(a, b)| a - b).collect();
        let d = diff.len();
        (0..d)
            .map(|i| diff[i] * dot(self.sigma_inv.row(i), &diff))
            .sum()
    }

    /// Log-density of a complete vector; NaN if unparameterized.
    pub fn log_pdf(&self, x: &[f64]) -> f64 {
        if !self.is_parameterized() || x.len() != self.mu.len() {
            return f64::NAN;
        }
        -self.coefficient - 0.5 * self.mahalanobis(x)
    }

    /// Log-density of the marginal over the observed coordinates.
    fn marginal_log_pdf(&self, x: &[Option<f64>]) -> f64 {
        let observed: Vec<usize> = (0..x.len()).filter(|&i| x[i].is_some()).collect();
        let k = observed.len();
        if k == 0 {
            return 0.0;
        }
        let mut sub = Matrix::zeros(k, k);
        for (a, &i) in observed.iter().enumerate() {
            for (b, &j) in observed.iter().enumerate() {
                sub[(a, b)] = self.sigma[(i, j)];
            }
        }
        let diff: Vec<f64> = observed
            .iter()
            .map(|&i| x[i].unwrap_or(f64::NAN) - self.mu[i])
            .collect();
        let (inv, det) = match sub.inverse_with_determinant() {
            Some(r) if r.1 > 0.0 => r,
            _ => return f64::NAN,
        };
        let quad: f64 = (0..k).map(|a| diff[a] * dot(inv.row(a), &diff)).sum();
        -0.5 * (k as f64 * (2.0 * PI).ln() + det.ln()) - 0.5 * quad
    }

    /// Draw one vector `μ + L·z`.
    pub fn random_vector(&mut self) -> Vec<f64> {
        if !self.is_parameterized() {
            return vec![f64::NAN; self.mu.len()];
        }
        let z: Vec<f64> = self.z.iter_mut().map(|n| n.random()).collect();
        let d = self.mu.len();
        (0..d)
            .map(|i| self.mu[i] + dot(&self.chol.row(i)[..=i], &z[..=i]))
            .collect()
    }

    /// `n` vectors.
    pub fn simulate_vectors(&mut self, n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|_| self.random_vector()).collect()
    }
}

impl Distribution for MultiNormal {
    fn name(&self) -> &'static str {
        "MultiNormal"
    }

    fn dim(&self) -> usize {
        self.mu.len()
    }

    fn is_parameterized(&self) -> bool {
        self.coefficient.is_finite()
    }

    fn param_count(&self) -> usize {
        let d = self.mu.len();
        d + d * (d + 1) / 2
    }

    /// Weighted mean and covariance with missing cells skipped per cell:
    /// every mean entry and every covariance entry is normalized by the
    /// weight of the rows observed in it.
    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let d = self.mu.len();
        if analysis.dim() != d {
            return Err(DmError::DimensionMismatch {
                expected: d,
                found: analysis.dim(),
            });
        }
        self.coefficient = f64::INFINITY;
        self.mu = vec![f64::NAN; d];

        let mut sum = vec![0.0; d];
        let mut sum_w = vec![0.0; d];
        let mut cross = Matrix::zeros(d, d);
        let mut cross_w = Matrix::zeros(d, d);
        let mut x = vec![None; d];
        for (row, w) in analysis.sample().iter() {
            analysis.fill_vector(row, &mut x)?;
            for i in 0..d {
                let xi = match x[i] {
                    Some(v) => v,
                    None => continue,
                };
                sum[i] += w * xi;
                sum_w[i] += w;
                for j in 0..=i {
                    if let Some(xj) = x[j] {
                        cross[(i, j)] += w * xi * xj;
                        cross_w[(i, j)] += w;
                    }
                }
            }
        }
        if analysis.sample().effective_count() == 0 {
            return Ok(());
        }
        // A dimension with no observed cell gets mean and covariance 0; only
        // a variance floor can make such an estimate usable.
        let mu: Vec<f64> = sum
            .iter()
            .zip(&sum_w)
            .map(|(s, w)| if *w > 0.0 { s / w } else { 0.0 })
            .collect();
        let mut sigma = Matrix::zeros(d, d);
        for i in 0..d {
            for j in 0..=i {
                if cross_w[(i, j)] <= 0.0 {
                    continue;
                }
                let c = cross[(i, j)] / cross_w[(i, j)] - mu[i] * mu[j];
                sigma[(i, j)] = c;
                sigma[(j, i)] = c;
            }
        }
        self.set_parameters(mu, sigma)
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        if !self.is_parameterized() {
            return Ok(f64::NAN);
        }
        let x = analysis.vector(row)?;
        if x.len() != self.mu.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.mu.len(),
                found: x.len(),
            });
        }
        if x.iter().all(Option::is_some) {
            let full: Vec<f64> = x.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            return Ok(self.log_pdf(&full));
        }
        Ok(self.marginal_log_pdf(&x))
    }

    fn set_seed(&mut self, seed: u64) {
        for (i, z) in self.z.iter_mut().enumerate() {
            z.set_seed(seed.wrapping_add(i as u64 + 1));
        }
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        self.mu.len() == other.mu.len()
            && self.mu.iter().zip(&other.mu).all(|(a, b)| close(*a, *b, delta))
            && self
                .sigma
                .as_slice()
                .iter()
                .zip(other.sigma.as_slice())
                .all(|(a, b)| close(*a, *b, delta))
    }

    fn sorting_value(&self) -> f64 {
        self.mu.first().copied().unwrap_or(f64::NAN)
    }
}
