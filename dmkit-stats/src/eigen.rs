//! Symmetric eigen-decomposition and explained-variance axis selection.
//!
//! [`SymmetricEigen`] returns every eigenpair of a real symmetric matrix via
//! cyclic Jacobi rotations. [`Eigens`] sorts them and keeps the leading axes
//! allowed by an [`EigensConfig`]; it is shared by principal components,
//! canonical analysis, covariance inflation and MDS.

use dmkit_core::{DmError, Result, Summarizable};

use crate::linalg::Matrix;

const MAX_SWEEPS: usize = 100;
const OFF_DIAGONAL_EPS: f64 = 1e-14;
/// Explained fractions at or below this are rounding noise.
const NEGLIGIBLE_FRACTION: f64 = 1e-12;

// ── Full decomposition ─────────────────────────────────────────────────────

/// All eigenpairs of a symmetric matrix, in no particular order.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues.
    pub values: Vec<f64>,
    /// Eigenvectors as columns, `n × n`, orthonormal.
    pub vectors: Matrix,
}

impl SymmetricEigen {
    /// Decompose `matrix`; only its lower triangle is read.
    ///
    /// `None` if the matrix is not square or has non-finite entries.
    pub fn new(matrix: &Matrix) -> Option<Self> {
        if !matrix.is_square() || !matrix.is_finite() {
            return None;
        }
        let n = matrix.rows();
        let mut a = matrix.clone();
        for i in 0..n {
            for j in 0..i {
                a[(j, i)] = a[(i, j)];
            }
        }
        let mut v = Matrix::identity(n);
        let scale = a.max_abs().max(f64::MIN_POSITIVE);

        for _ in 0..MAX_SWEEPS {
            let mut off = 0.0;
            for p in 0..n {
                for q in (p + 1)..n {
                    off += a[(p, q)] * a[(p, q)];
                }
            }
            if off.sqrt() <= OFF_DIAGONAL_EPS * scale {
                break;
            }
            for p in 0..n {
                for q in (p + 1)..n {
                    let apq = a[(p, q)];
                    if apq.abs() <= f64::MIN_POSITIVE {
                        continue;
                    }
                    let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * apq);
                    let t = if theta.abs() > 1e150 {
                        0.5 / theta
                    } else {
                        theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                    };
                    let c = 1.0 / (t * t + 1.0).sqrt();
                    let s = t * c;
                    rotate_columns(&mut a, p, q, c, s);
                    rotate_rows(&mut a, p, q, c, s);
                    a[(p, q)] = 0.0;
                    a[(q, p)] = 0.0;
                    rotate_columns(&mut v, p, q, c, s);
                }
            }
        }

        Some(Self {
            values: a.diagonal(),
            vectors: v,
        })
    }

    /// `V · diag(values) · Vᵀ`.
    pub fn restore_with(&self, values: &[f64]) -> Matrix {
        restore(&self.vectors, values)
    }
}

fn rotate_columns(m: &mut Matrix, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..m.rows() {
        let mkp = m[(k, p)];
        let mkq = m[(k, q)];
        m[(k, p)] = c * mkp - s * mkq;
        m[(k, q)] = s * mkp + c * mkq;
    }
}

fn rotate_rows(m: &mut Matrix, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..m.cols() {
        let mpk = m[(p, k)];
        let mqk = m[(q, k)];
        m[(p, k)] = c * mpk - s * mqk;
        m[(q, k)] = s * mpk + c * mqk;
    }
}

fn restore(vectors: &Matrix, values: &[f64]) -> Matrix {
    let n = vectors.rows();
    let mut out = Matrix::zeros(n, n);
    for (k, &lambda) in values.iter().enumerate() {
        if lambda == 0.0 {
            continue;
        }
        for i in 0..n {
            let vik = vectors[(i, k)] * lambda;
            for j in 0..n {
                out[(i, j)] += vik * vectors[(j, k)];
            }
        }
    }
    out
}

// ── Axis selection ─────────────────────────────────────────────────────────

/// Which eigenpairs [`Eigens`] keeps.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EigensConfig {
    /// Maximum number of axes.
    pub out_dim_max: usize,
    /// Stop once the cumulative explained fraction reaches this value.
    pub total_explained_max: f64,
    /// Drop axes explaining less than this fraction.
    pub explained_min: f64,
    /// Rank by `|λ|` and keep negative eigenvalues (non-Euclidean inputs).
    pub by_magnitude: bool,
}

impl Default for EigensConfig {
    fn default() -> Self {
        Self {
            out_dim_max: usize::MAX,
            total_explained_max: 1.0,
            explained_min: 0.0,
            by_magnitude: false,
        }
    }
}

/// Leading eigenpairs of a symmetric matrix with explained fractions.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Eigens {
    /// Retained eigenvalues, descending (by magnitude if so configured).
    pub values: Vec<f64>,
    /// Retained eigenvectors as columns, `n × values.len()`.
    pub basis: Matrix,
    /// Σ |λ| over all eigenvalues of the input.
    pub total: f64,
}

impl Eigens {
    /// # Errors
    ///
    /// Returns an error if `matrix` is not square. A matrix that cannot be
    /// decomposed (non-finite entries) yields zero axes.
    pub fn new(matrix: &Matrix, config: &EigensConfig) -> Result<Self> {
        if !matrix.is_square() {
            return Err(DmError::DimensionMismatch {
                expected: matrix.rows(),
                found: matrix.cols(),
            });
        }
        let n = matrix.rows();
        let empty = |total: f64| Self {
            values: Vec::new(),
            basis: Matrix::zeros(n, 0),
            total,
        };
        let full = match SymmetricEigen::new(matrix) {
            Some(e) => e,
            None => return Ok(empty(0.0)),
        };

        let total: f64 = full.values.iter().map(|v| v.abs()).sum();
        if total <= 0.0 || !total.is_finite() {
            return Ok(empty(0.0));
        }

        let mut order: Vec<usize> = (0..n).collect();
        if config.by_magnitude {
            order.sort_by(|&a, &b| full.values[b].abs().total_cmp(&full.values[a].abs()));
        } else {
            order.sort_by(|&a, &b| full.values[b].total_cmp(&full.values[a]));
        }

        let mut kept = Vec::new();
        let mut cumulative = 0.0;
        for &k in &order {
            let lambda = full.values[k];
            let frac = lambda.abs() / total;
            if kept.len() >= config.out_dim_max
                || cumulative >= config.total_explained_max
                || frac < config.explained_min
                || frac <= NEGLIGIBLE_FRACTION
                || (!config.by_magnitude && lambda < 0.0)
            {
                break;
            }
            kept.push(k);
            cumulative += frac;
        }

        let mut basis = Matrix::zeros(n, kept.len());
        for (col, &k) in kept.iter().enumerate() {
            for i in 0..n {
                basis[(i, col)] = full.vectors[(i, k)];
            }
        }
        Ok(Self {
            values: kept.iter().map(|&k| full.values[k]).collect(),
            basis,
            total,
        })
    }

    /// Dimension of the input matrix.
    pub fn dim(&self) -> usize {
        self.basis.rows()
    }

    /// Number of retained axes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Eigenvector of axis `i`.
    pub fn vector(&self, i: usize) -> Vec<f64> {
        self.basis.column(i)
    }

    /// `|λ_i|` as a fraction of Σ |λ|.
    pub fn explained_fraction(&self, i: usize) -> f64 {
        self.values[i].abs() / self.total
    }

    /// Cumulative explained fraction of the retained axes.
    pub fn explained_variance_fraction(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        self.values.iter().map(|v| v.abs()).sum::<f64>() / self.total
    }

    /// `V · diag(λ) · Vᵀ` over the retained axes.
    pub fn restore(&self) -> Matrix {
        restore(&self.basis, &self.values)
    }
}

impl Summarizable for Eigens {
    fn summary(&self) -> String {
        format!(
            "Eigens: {} of {} axes, {:.1}% explained",
            self.len(),
            self.dim(),
            self.explained_variance_fraction() * 100.0
        )
    }
}
