//! Metric multidimensional scaling of a similarity matrix.
//!
//! The pair matrix is decomposed directly, without centering, so it should
//! already be a Gram matrix (see
//! [`distances_to_similarity`](crate::similarity::distances_to_similarity)).
//! Axes are ranked by eigenvalue magnitude. A negative eigenvalue marks a
//! non-Euclidean axis whose coordinate is imaginary.

use dmkit_core::{Column, Dataset, DmError, PairMatrix, RealColumn, RealKind, Result, Sample};

use crate::eigen::{Eigens, EigensConfig};
use crate::linalg::Matrix;

/// Axis selection for [`Mds`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MdsConfig {
    pub out_dim_max: usize,
    pub total_explained_max: f64,
    pub explained_min: f64,
}

impl Default for MdsConfig {
    fn default() -> Self {
        Self {
            out_dim_max: usize::MAX,
            total_explained_max: 1.0,
            explained_min: 0.0,
        }
    }
}

/// Coordinates of the sampled rows on the leading axes of a similarity
/// matrix.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mds {
    n_rows: usize,
    /// Dataset row of each matrix index.
    rows: Vec<usize>,
    /// Matrix index of each dataset row.
    index: Vec<Option<usize>>,
    eigens: Eigens,
}

impl Mds {
    /// Decompose `similarity` restricted to the rows of `sample`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sizes differ or a sampled pair is missing.
    pub fn new(sample: &Sample, similarity: &PairMatrix, config: &MdsConfig) -> Result<Self> {
        let n_rows = similarity.size();
        if sample.len() != n_rows {
            return Err(DmError::DimensionMismatch {
                expected: n_rows,
                found: sample.len(),
            });
        }
        let rows: Vec<usize> = sample.iter().map(|(row, _)| row).collect();
        let mut index = vec![None; n_rows];
        for (k, &row) in rows.iter().enumerate() {
            index[row] = Some(k);
        }
        let n = rows.len();
        let mut m = Matrix::zeros(n, n);
        for (a, &i) in rows.iter().enumerate() {
            for (b, &j) in rows.iter().enumerate() {
                m[(a, b)] = similarity.get(i, j).ok_or_else(|| {
                    DmError::InvalidInput(format!("mds: missing similarity at ({}, {})", i, j))
                })?;
            }
        }
        m.symmetrize();
        let eigens = Eigens::new(
            &m,
            &EigensConfig {
                out_dim_max: config.out_dim_max,
                total_explained_max: config.total_explained_max,
                explained_min: config.explained_min,
                by_magnitude: true,
            },
        )?;
        Ok(Self {
            n_rows,
            rows,
            index,
            eigens,
        })
    }

    pub fn out_dim(&self) -> usize {
        self.eigens.len()
    }

    pub fn eigens(&self) -> &Eigens {
        &self.eigens
    }

    /// Whether `axis` has a negative eigenvalue.
    pub fn is_imaginary(&self, axis: usize) -> bool {
        self.eigens.values[axis] < 0.0
    }

    /// Real (or imaginary) coordinate of `row` on `axis`; `None` for rows
    /// outside the sample. The real part of an imaginary axis is 0, and so
    /// is the imaginary part of a real one.
    pub fn coordinate(&self, row: usize, axis: usize, imaginary: bool) -> Option<f64> {
        let k = self.index.get(row).copied().flatten()?;
        let lambda = self.eigens.values[axis];
        let magnitude = if imaginary { -lambda } else { lambda };
        Some(self.eigens.basis[(k, axis)] * magnitude.max(0.0).sqrt())
    }

    /// Dataset rows covered, in matrix order.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Publish `<real_prefix><k>` for every axis and `<imaginary_prefix><k>`
    /// for the imaginary ones. Returns the names used.
    pub fn create_space(
        &self,
        real_prefix: &str,
        imaginary_prefix: &str,
        ds: &mut Dataset,
    ) -> Result<Vec<String>> {
        if real_prefix.is_empty() || imaginary_prefix.is_empty() || real_prefix == imaginary_prefix {
            return Err(DmError::InvalidInput(
                "mds: prefixes must be non-empty and distinct".into(),
            ));
        }
        if ds.len() != self.n_rows {
            return Err(DmError::DimensionMismatch {
                expected: self.n_rows,
                found: ds.len(),
            });
        }
        let mut created = Vec::new();
        for axis in 0..self.out_dim() {
            let mut parts = vec![(real_prefix, false)];
            if self.is_imaginary(axis) {
                parts.push((imaginary_prefix, true));
            }
            for (prefix, imaginary) in parts {
                let name = ds.find_new_column_name(&format!("{}{}", prefix, axis + 1));
                let values = (0..self.n_rows)
                    .map(|row| self.coordinate(row, axis, imaginary))
                    .collect();
                ds.add_column(Column::Real(RealColumn::from_values(&name, RealKind::Real, values)?))?;
                created.push(name);
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::{distances_to_similarity, squared_distances};

    const TOL: f64 = 1e-8;

    fn line_dataset() -> Dataset {
        let mut ds = Dataset::with_rows(4);
        let x = RealColumn::from_reals("x", &[0.0, 1.0, 2.0, 3.0]).unwrap();
        ds.add_column(Column::Real(x)).unwrap();
        ds
    }

    #[test]
    fn recovers_line_configuration() {
        let ds = line_dataset();
        let space = ds.space(&["x"]).unwrap();
        let sample = ds.sample();
        let d2 = squared_distances("d2", &sample, &space).unwrap();
        let s = distances_to_similarity("s", &sample, &d2).unwrap();
        let mds = Mds::new(&sample, &s, &MdsConfig::default()).unwrap();
        assert_eq!(mds.out_dim(), 1);
        assert!(!mds.is_imaginary(0));
        let c: Vec<f64> = (0..4).map(|r| mds.coordinate(r, 0, false).unwrap()).collect();
        // Distances are preserved up to reflection.
        for i in 0..4 {
            for j in 0..4 {
                let d = (c[i] - c[j]).abs();
                assert!((d - (i as f64 - j as f64).abs()).abs() < TOL);
            }
        }
        assert_eq!(mds.coordinate(0, 0, true), Some(0.0));
    }

    #[test]
    fn negative_eigenvalue_is_imaginary() {
        let mut s = PairMatrix::new("s", 2, false);
        s.set_symmetric(0, 1, Some(2.0)).unwrap();
        s.set(0, 0, Some(0.0)).unwrap();
        s.set(1, 1, Some(0.0)).unwrap();
        let mds = Mds::new(&Sample::uniform(2), &s, &MdsConfig::default()).unwrap();
        assert_eq!(mds.out_dim(), 2);
        let imaginary: Vec<bool> = (0..2).map(|a| mds.is_imaginary(a)).collect();
        assert!(imaginary.contains(&true) && imaginary.contains(&false));

        let mut ds = Dataset::with_rows(2);
        let names = mds.create_space("M", "I", &mut ds).unwrap();
        assert_eq!(names.len(), 3);
        assert!(mds.create_space("M", "M", &mut ds).is_err());
    }

    #[test]
    fn unsampled_rows_have_no_coordinate() {
        let ds = line_dataset();
        let sample = Sample::new(vec![1.0, 1.0, 0.0, 1.0]).unwrap();
        let space = ds.space(&["x"]).unwrap();
        let d2 = squared_distances("d2", &sample, &space).unwrap();
        let s = distances_to_similarity("s", &sample, &d2).unwrap();
        let mds = Mds::new(&sample, &s, &MdsConfig::default()).unwrap();
        assert!(mds.coordinate(2, 0, false).is_none());
        assert_eq!(mds.rows(), &[0, 1, 3]);
    }

    #[test]
    fn missing_pair_is_an_error() {
        let s = PairMatrix::new("s", 2, false);
        assert!(Mds::new(&Sample::uniform(2), &s, &MdsConfig::default()).is_err());
    }
}
