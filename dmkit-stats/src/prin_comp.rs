//! Principal components of a weighted real space.
//!
//! The covariance comes from a [`MultiNormal`] fit (so missing cells are
//! skipped per cell) and is decomposed by [`Eigens`]; rows project onto the
//! retained eigenvectors after centering.

use dmkit_core::{Column, Dataset, DmError, RealColumn, RealKind, Result, Sample, Summarizable};

use crate::analysis::Analysis;
use crate::distribution::{Distribution, MultiNormal};
use crate::eigen::{Eigens, EigensConfig};
use crate::linalg::Matrix;

/// Axis selection for [`PrinComp`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrinCompConfig {
    /// Maximum number of components.
    pub out_dim_max: usize,
    /// Stop once this cumulative fraction of variance is explained.
    pub total_explained_max: f64,
    /// Drop components explaining less than this fraction.
    pub explained_min: f64,
}

impl Default for PrinCompConfig {
    fn default() -> Self {
        Self {
            out_dim_max: usize::MAX,
            total_explained_max: 1.0,
            explained_min: 0.0,
        }
    }
}

impl PrinCompConfig {
    fn eigens(&self) -> EigensConfig {
        EigensConfig {
            out_dim_max: self.out_dim_max,
            total_explained_max: self.total_explained_max,
            explained_min: self.explained_min,
            by_magnitude: false,
        }
    }
}

/// Fitted principal components.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrinComp {
    columns: Vec<String>,
    mean: Vec<f64>,
    variances: Vec<f64>,
    eigens: Eigens,
}

impl PrinComp {
    /// Fit on the columns of `space` weighted by `sample`.
    pub fn new(sample: Sample, space: Vec<&RealColumn>, config: &PrinCompConfig) -> Result<Self> {
        let analysis = Analysis::space(sample, space)?;
        let mut mn = MultiNormal::new(analysis.dim());
        mn.estimate(&analysis)?;
        let names = analysis.column_names().into_iter().map(String::from).collect();
        Self::from_multi_normal(&mn, names, config)
    }

    /// Components of an already fitted normal. The covariance is used even
    /// when it is singular; an unestimated normal yields zero axes.
    pub fn from_multi_normal(
        mn: &MultiNormal,
        columns: Vec<String>,
        config: &PrinCompConfig,
    ) -> Result<Self> {
        if columns.len() != mn.dim() {
            return Err(DmError::DimensionMismatch {
                expected: mn.dim(),
                found: columns.len(),
            });
        }
        let d = mn.dim();
        let mean = mn.mu().to_vec();
        let eigens = if mean.iter().all(|m| m.is_finite()) {
            Eigens::new(mn.sigma(), &config.eigens())?
        } else {
            Eigens::new(&Matrix::zeros(d, d), &config.eigens())?
        };
        Ok(Self {
            columns,
            mean,
            variances: mn.sigma().diagonal(),
            eigens,
        })
    }

    pub fn eigens(&self) -> &Eigens {
        &self.eigens
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Number of retained components.
    pub fn out_dim(&self) -> usize {
        self.eigens.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Coordinates of `x` on the retained axes.
    pub fn project(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() != self.mean.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.mean.len(),
                found: x.len(),
            });
        }
        let centered: Vec<f64> = x.iter().zip(&self.mean).map(|(a, m)| a - m).collect();
        self.eigens.basis.transpose_mul_vec(&centered)
    }

    /// Coordinates of `row`; `None` if any cell is missing.
    pub fn project_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<Option<Vec<f64>>> {
        let v = analysis.vector(row)?;
        let x: Option<Vec<f64>> = v.into_iter().collect();
        x.map(|x| self.project(&x)).transpose()
    }

    /// Squared Mahalanobis distance of `row` within the retained axes.
    pub fn chi2(&self, analysis: &Analysis<'_>, row: usize) -> Result<Option<f64>> {
        Ok(self.project_row(analysis, row)?.map(|p| {
            p.iter()
                .zip(&self.eigens.values)
                .map(|(c, l)| c * c / l)
                .sum()
        }))
    }

    /// `loadings[i][k] = basis[i][k] · √λ_k`: coordinates of attribute `i`
    /// on axis `k`.
    pub fn attribute_loadings(&self) -> Vec<Vec<f64>> {
        let b = &self.eigens.basis;
        (0..b.rows())
            .map(|i| {
                self.eigens
                    .values
                    .iter()
                    .enumerate()
                    .map(|(k, l)| b[(i, k)] * l.max(0.0).sqrt())
                    .collect()
            })
            .collect()
    }

    /// Fraction of the variance of attribute `i` reproduced by the retained
    /// axes.
    pub fn attribute_quality(&self, i: usize) -> f64 {
        let v = self.variances[i];
        if v <= 0.0 {
            return f64::NAN;
        }
        self.attribute_loadings()[i].iter().map(|x| x * x).sum::<f64>() / v
    }

    /// Publish the projections as real columns `<prefix>1`, `<prefix>2`, ...
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

impl Summarizable for PrinComp {
    fn summary(&self) -> String {
        format!(
            "PrinComp: {} of {} axes, {:.1}% variance explained",
            self.out_dim(),
            self.mean.len(),
            self.eigens.explained_variance_fraction() * 100.0
        )
    }
}
