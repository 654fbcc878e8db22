//! Canonical discriminant projection of a fitted clustering.
//!
//! The between-cluster scatter `B` (cluster means weighted by mixing
//! probability) is whitened by the pooled within-cluster covariance
//! `W = L·Lᵀ`: with `C = (Lᵀ)⁻¹`, the eigenvectors `U` of `Cᵀ·B·C` give the
//! canonical basis `C·U`, which maximizes between-cluster relative to
//! within-cluster variance.

use dmkit_core::{Column, Dataset, DmError, RealColumn, RealKind, Result, Sample, Summarizable};
use dmkit_stats::linalg::norm;
use dmkit_stats::{Analysis, Eigens, EigensConfig, Matrix};

use crate::clustering::Clustering;

/// Minimum explained fraction of a canonical axis.
const EXPLAINED_MIN: f64 = 1e-3;

/// Canonical axes of a [`Clustering`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Canonical {
    columns: Vec<String>,
    /// Probability-weighted mean of the cluster means.
    between_mean: Vec<f64>,
    between: Matrix,
    within: Matrix,
    /// `C · U`, `dim × out_dim`.
    basis: Matrix,
    /// `basis` with unit-length columns.
    basis_norm: Matrix,
    eigen_values: Vec<f64>,
}

impl Canonical {
    /// # Errors
    ///
    /// Propagates dimension errors only; a within-cluster covariance that is
    /// not positive definite gives zero output dimensions.
    pub fn new(clustering: &Clustering<'_>) -> Result<Self> {
        let analysis = clustering.analysis();
        let d = analysis.dim();
        let columns = analysis
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let components = clustering.mixture().components();
        let mut between_mean = vec![0.0; d];
        let mut within = Matrix::zeros(d, d);
        for c in components {
            for (m, mu) in between_mean.iter_mut().zip(c.distribution.mu()) {
                *m += c.probability * mu;
            }
            within.add_scaled(c.distribution.sigma(), c.probability)?;
        }
        let mut between = Matrix::zeros(d, d);
        for c in components {
            let diff: Vec<f64> = c
                .distribution
                .mu()
                .iter()
                .zip(&between_mean)
                .map(|(a, b)| a - b)
                .collect();
            for i in 0..d {
                for j in 0..d {
                    between[(i, j)] += c.probability * diff[i] * diff[j];
                }
            }
        }

        let mut out = Self {
            columns,
            between_mean,
            between,
            within,
            basis: Matrix::zeros(d, 0),
            basis_norm: Matrix::zeros(d, 0),
            eigen_values: Vec::new(),
        };
        let k = components.len();
        if k < 2 {
            return Ok(out);
        }
        let c = match out
            .within
            .cholesky()
            .and_then(|l| l.lower_triangular_inverse())
        {
            Some(l_inv) => l_inv.transpose(),
            None => return Ok(out),
        };

        let mut whitened = c.transpose().matmul(&out.between)?.matmul(&c)?;
        whitened.symmetrize();
        let eigens = Eigens::new(
            &whitened,
            &EigensConfig {
                out_dim_max: k - 1,
                total_explained_max: 1.0,
                explained_min: EXPLAINED_MIN,
                by_magnitude: false,
            },
        )?;
        let basis = c.matmul(&eigens.basis)?;
        let mut basis_norm = basis.clone();
        for j in 0..basis.cols() {
            let len = norm(&basis.column(j));
            if len > 0.0 {
                for i in 0..d {
                    basis_norm[(i, j)] /= len;
                }
            }
        }
        out.basis = basis;
        out.basis_norm = basis_norm;
        out.eigen_values = eigens.values;
        Ok(out)
    }

    /// Number of canonical axes.
    pub fn out_dim(&self) -> usize {
        self.eigen_values.len()
    }

    pub fn eigen_values(&self) -> &[f64] {
        &self.eigen_values
    }

    pub fn basis(&self) -> &Matrix {
        &self.basis
    }

    pub fn basis_norm(&self) -> &Matrix {
        &self.basis_norm
    }

    pub fn between_mean(&self) -> &[f64] {
        &self.between_mean
    }

    /// Between-cluster scatter.
    pub fn between(&self) -> &Matrix {
        &self.between
    }

    /// Pooled within-cluster covariance.
    pub fn within(&self) -> &Matrix {
        &self.within
    }

    /// Canonical coordinates of `x`: centered by the between mean, then
    /// multiplied by the normalized basis.
    pub fn project(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.between_mean.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.between_mean.len(),
                found: x.len(),
            });
        }
        let centered: Vec<f64> = x.iter().zip(&self.between_mean).map(|(a, m)| a - m).collect();
        self.basis_norm.transpose_mul_vec(&centered)
    }

    /// Coordinates of `row`; `None` if any cell is missing.
    pub fn project_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<Option<Vec<f64>>> {
        let x: Option<Vec<f64>> = analysis.vector(row)?.into_iter().collect();
        x.map(|x| self.project(&x)).transpose()
    }

    /// Publish the canonical coordinates as `<prefix>1`, `<prefix>2`, ...
    /// Returns the names used.
    pub fn create_space(&self, prefix: &str, ds: &mut Dataset) -> Result<Vec<String>> {
        let names: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let rows = {
            let analysis = Analysis::space(Sample::uniform(ds.len()), ds.space(&names)?)?;
            (0..ds.len())
                .map(|row| self.project_row(&analysis, row))
                .collect::<Result<Vec<_>>>()?
        };
        let mut created = Vec::with_capacity(self.out_dim());
        for k in 0..self.out_dim() {
            let name = ds.find_new_column_name(&format!("{}{}", prefix, k + 1));
            let values = rows.iter().map(|r| r.as_ref().map(|p| p[k])).collect();
            ds.add_column(Column::Real(RealColumn::from_values(&name, RealKind::Real, values)?))?;
            created.push(name);
        }
        Ok(created)
    }
}

impl Summarizable for Canonical {
    fn summary(&self) -> String {
        let values: Vec<String> = self.eigen_values.iter().map(|v| format!("{:.3}", v)).collect();
        format!(
            "Canonical: {} axes, eigenvalues [{}]",
            self.out_dim(),
            values.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::ClusteringConfig;
    use dmkit_stats::{Distribution, Normal, Univariate};

    fn three_blobs() -> (Vec<f64>, Vec<f64>) {
        let mut g = Normal::standard();
        g.set_seed(31);
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)] {
            xs.extend(g.simulate(200).into_iter().map(|v| v + cx));
            ys.extend(g.simulate(200).into_iter().map(|v| v + cy));
        }
        (xs, ys)
    }

    #[test]
    fn axes_whiten_within_covariance() {
        let (xs, ys) = three_blobs();
        let x = RealColumn::from_reals("x", &xs).unwrap();
        let y = RealColumn::from_reals("y", &ys).unwrap();
        let config = ClusteringConfig::default();
        let clustering = Clustering::new(Sample::uniform(xs.len()), vec![&x, &y], &config).unwrap();
        assert_eq!(clustering.out_dim(), 3);
        let can = Canonical::new(&clustering).unwrap();
        assert_eq!(can.out_dim(), 2);
        assert!(can.eigen_values()[0] >= can.eigen_values()[1]);

        // Bᵀ W B = I for the unnormalized basis.
        let b = can.basis();
        let m = b.transpose().matmul(can.within()).unwrap().matmul(b).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((m[(i, j)] - expected).abs() < 1e-6, "{:?}", m);
            }
        }
        for j in 0..2 {
            assert!((norm(&can.basis_norm().column(j)) - 1.0).abs() < 1e-9);
        }
        let origin = can.project(can.between_mean()).unwrap();
        assert!(origin.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn two_clusters_give_one_axis() {
        let mut g = Normal::standard();
        g.set_seed(4);
        let mut xs = g.simulate(300);
        xs.extend(g.simulate(300).into_iter().map(|v| v + 10.0));
        let x = RealColumn::from_reals("x", &xs).unwrap();
        let mut ds = Dataset::with_rows(xs.len());
        ds.add_column(Column::Real(x)).unwrap();
        let can = {
            let clustering = Clustering::new(
                ds.sample(),
                ds.space(&["x"]).unwrap(),
                &ClusteringConfig::default(),
            )
            .unwrap();
            assert_eq!(clustering.out_dim(), 2);
            Canonical::new(&clustering).unwrap()
        };
        assert_eq!(can.out_dim(), 1);
        let names = can.create_space("CC_", &mut ds).unwrap();
        assert_eq!(names, vec!["CC_1".to_string()]);
        let cc = ds.real("CC_1").unwrap();
        let (a, b) = (cc.get(0).unwrap(), cc.get(599).unwrap());
        assert!(a.signum() != b.signum());
    }

    #[test]
    fn single_cluster_has_no_axes() {
        let mut g = Normal::standard();
        g.set_seed(2);
        let xs = g.simulate(200);
        let x = RealColumn::from_reals("x", &xs).unwrap();
        let clustering =
            Clustering::new(Sample::uniform(200), vec![&x], &ClusteringConfig::default()).unwrap();
        let can = Canonical::new(&clustering).unwrap();
        assert_eq!(can.out_dim(), 0);
        assert!(can.project(&[1.0]).unwrap().is_empty());
        assert!(can.summary().contains("0 axes"));
    }
}
