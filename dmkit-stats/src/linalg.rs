//! Dense row-major matrices: products, Cholesky, inversion.
//!
//! Failures of the factorizations are numeric, not contract violations, so
//! they are reported as `None`.

use core::ops::{Index, IndexMut};

use dmkit_core::{DmError, Result};

/// Pivot magnitude below which a matrix is treated as singular.
pub const SINGULAR_EPS: f64 = 1e-15;

/// Dense `rows × cols` matrix stored row-major.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Square matrix with `diag` on the diagonal.
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let mut m = Self::zeros(diag.len(), diag.len());
        for (i, &d) in diag.iter().enumerate() {
            m[(i, i)] = d;
        }
        m
    }

    /// # Errors
    ///
    /// Returns an error if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(DmError::DimensionMismatch {
                expected: rows * cols,
                found: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// # Errors
    ///
    /// Returns an error if the rows have different lengths.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for r in rows {
            if r.len() != cols {
                return Err(DmError::DimensionMismatch {
                    expected: cols,
                    found: r.len(),
                });
            }
            data.extend_from_slice(r);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self[(i, j)]).collect()
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols)).map(|i| self[(i, i)]).collect()
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                t[(j, i)] = self[(i, j)];
            }
        }
        t
    }

    /// `self · other`.
    ///
    /// # Errors
    ///
    /// Returns an error if the inner dimensions differ.
    pub fn matmul(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(DmError::DimensionMismatch {
                expected: self.cols,
                found: other.rows,
            });
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(i, k)];
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out.data[i * other.cols + j] += a * other[(k, j)];
                }
            }
        }
        Ok(out)
    }

    /// `self · v`.
    pub fn mul_vec(&self, v: &[f64]) -> Result<Vec<f64>> {
        if self.cols != v.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.cols,
                found: v.len(),
            });
        }
        Ok((0..self.rows)
            .map(|i| self.row(i).iter().zip(v).map(|(a, b)| a * b).sum())
            .collect())
    }

    /// `selfᵀ · v`.
    pub fn transpose_mul_vec(&self, v: &[f64]) -> Result<Vec<f64>> {
        if self.rows != v.len() {
            return Err(DmError::DimensionMismatch {
                expected: self.rows,
                found: v.len(),
            });
        }
        let mut out = vec![0.0; self.cols];
        for (i, &vi) in v.iter().enumerate() {
            for (o, a) in out.iter_mut().zip(self.row(i)) {
                *o += a * vi;
            }
        }
        Ok(out)
    }

    pub fn scale(&mut self, factor: f64) {
        for x in &mut self.data {
            *x *= factor;
        }
    }

    /// `self += factor · other`, shapes must agree.
    pub fn add_scaled(&mut self, other: &Matrix, factor: f64) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(DmError::DimensionMismatch {
                expected: self.data.len(),
                found: other.data.len(),
            });
        }
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += factor * b;
        }
        Ok(())
    }

    /// Replace both off-diagonal halves by their average.
    pub fn symmetrize(&mut self) {
        for i in 0..self.rows {
            for j in 0..i {
                let v = 0.5 * (self[(i, j)] + self[(j, i)]);
                self[(i, j)] = v;
                self[(j, i)] = v;
            }
        }
    }

    /// Largest absolute entry.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |m, x| m.max(x.abs()))
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Lower-triangular `L` with `L · Lᵀ = self`.
    ///
    /// `None` if the matrix is not square, not finite, or not
    /// positive-definite.
    pub fn cholesky(&self) -> Option<Matrix> {
        if !self.is_square() || !self.is_finite() {
            return None;
        }
        let n = self.rows;
        let mut l = Matrix::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l[(i, k)] * l[(j, k)];
                }
                if i == j {
                    let diag = self[(j, j)] - sum;
                    if diag <= 0.0 || !diag.is_finite() {
                        return None;
                    }
                    l[(j, j)] = diag.sqrt();
                } else {
                    l[(i, j)] = (self[(i, j)] - sum) / l[(j, j)];
                }
            }
        }
        Some(l)
    }

    /// Inverse of a lower-triangular matrix by forward substitution.
    pub fn lower_triangular_inverse(&self) -> Option<Matrix> {
        if !self.is_square() {
            return None;
        }
        let n = self.rows;
        let mut inv = Matrix::zeros(n, n);
        for col in 0..n {
            for i in col..n {
                let mut sum = if i == col { 1.0 } else { 0.0 };
                for k in col..i {
                    sum -= self[(i, k)] * inv[(k, col)];
                }
                let d = self[(i, i)];
                if d.abs() < SINGULAR_EPS {
                    return None;
                }
                inv[(i, col)] = sum / d;
            }
        }
        Some(inv)
    }

    /// Gauss–Jordan inverse with partial pivoting, plus the determinant.
    ///
    /// `None` if the matrix is not square or is singular.
    pub fn inverse_with_determinant(&self) -> Option<(Matrix, f64)> {
        if !self.is_square() {
            return None;
        }
        let n = self.rows;
        let cols = 2 * n;
        let mut aug = vec![0.0; n * cols];
        for i in 0..n {
            aug[i * cols..i * cols + n].copy_from_slice(self.row(i));
            aug[i * cols + n + i] = 1.0;
        }

        let mut det = 1.0;
        for col in 0..n {
            let mut max_row = col;
            let mut max_val = aug[col * cols + col].abs();
            for row in (col + 1)..n {
                let val = aug[row * cols + col].abs();
                if val > max_val {
                    max_val = val;
                    max_row = row;
                }
            }
            if max_val < SINGULAR_EPS || !max_val.is_finite() {
                return None;
            }
            if max_row != col {
                for j in 0..cols {
                    aug.swap(col * cols + j, max_row * cols + j);
                }
                det = -det;
            }
            let pivot = aug[col * cols + col];
            det *= pivot;
            for j in 0..cols {
                aug[col * cols + j] /= pivot;
            }
            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = aug[row * cols + col];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..cols {
                    let above = aug[col * cols + j];
                    aug[row * cols + j] -= factor * above;
                }
            }
        }

        let mut inv = Matrix::zeros(n, n);
        for i in 0..n {
            inv.data[i * n..(i + 1) * n].copy_from_slice(&aug[i * cols + n..(i + 1) * cols]);
        }
        Some((inv, det))
    }

    pub fn inverse(&self) -> Option<Matrix> {
        self.inverse_with_determinant().map(|(inv, _)| inv)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        &mut self.data[i * self.cols + j]
    }
}

/// Euclidean dot product.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    fn spd() -> Matrix {
        Matrix::from_rows(&[
            vec![4.0, 2.0, 0.6],
            vec![2.0, 5.0, 1.0],
            vec![0.6, 1.0, 3.0],
        ])
        .unwrap()
    }

    fn assert_close(a: &Matrix, b: &Matrix) {
        assert_eq!(a.rows(), b.rows());
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() < 1e-9, "{} vs {}", x, y);
        }
    }

    #[test]
    fn cholesky_reconstructs() {
        let a = spd();
        let l = a.cholesky().unwrap();
        assert_eq!(l[(0, 1)], 0.0);
        assert_close(&l.matmul(&l.transpose()).unwrap(), &a);
    }

    #[test]
    fn cholesky_rejects_indefinite() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 1.0]]).unwrap();
        assert!(a.cholesky().is_none());
        assert!(Matrix::zeros(2, 3).cholesky().is_none());
    }

    #[test]
    fn inverse_and_determinant() {
        let a = spd();
        let (inv, det) = a.inverse_with_determinant().unwrap();
        assert_close(&a.matmul(&inv).unwrap(), &Matrix::identity(3));
        let l = a.cholesky().unwrap();
        let det_chol: f64 = l.diagonal().iter().map(|d| d * d).product();
        assert!((det - det_chol).abs() < TOL * 100.0);
    }

    #[test]
    fn singular_inverse() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
        assert!(a.inverse().is_none());
    }

    #[test]
    fn triangular_inverse() {
        let l = spd().cholesky().unwrap();
        let li = l.lower_triangular_inverse().unwrap();
        assert_close(&l.matmul(&li).unwrap(), &Matrix::identity(3));
        assert_eq!(li[(0, 2)], 0.0);
    }

    #[test]
    fn vector_products() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(a.mul_vec(&[1.0, 1.0]).unwrap(), vec![3.0, 7.0, 11.0]);
        assert_eq!(a.transpose_mul_vec(&[1.0, 0.0, 1.0]).unwrap(), vec![6.0, 8.0]);
        assert!(a.mul_vec(&[1.0]).is_err());
        assert!((norm(&[3.0, 4.0]) - 5.0).abs() < TOL);
    }
}
