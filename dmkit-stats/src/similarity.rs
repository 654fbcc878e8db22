//! Builders of pair matrices over dataset rows.
//!
//! Only pairs of positively weighted rows are filled; every other cell is
//! missing.

use dmkit_core::{DmError, NominalColumn, PairMatrix, RealColumn, Result, Sample};

fn check_len(sample: &Sample, n: usize) -> Result<()> {
    if sample.len() != n {
        return Err(DmError::DimensionMismatch {
            expected: n,
            found: sample.len(),
        });
    }
    Ok(())
}

fn rows_len(columns: &[&RealColumn]) -> Result<usize> {
    let n = columns.first().map_or(0, |c| c.len());
    if let Some(c) = columns.iter().find(|c| c.len() != n) {
        return Err(DmError::DimensionMismatch {
            expected: n,
            found: c.len(),
        });
    }
    Ok(n)
}

/// Squared Euclidean distances; a pair with a missing cell is missing.
pub fn squared_distances(name: &str, sample: &Sample, space: &[&RealColumn]) -> Result<PairMatrix> {
    let n = rows_len(space)?;
    check_len(sample, n)?;
    let mut out = PairMatrix::new(name, n, true);
    let rows: Vec<usize> = sample.iter().map(|(r, _)| r).collect();
    for (a, &i) in rows.iter().enumerate() {
        out.set(i, i, Some(0.0))?;
        for &j in &rows[a + 1..] {
            let d: Option<f64> = space
                .iter()
                .map(|c| Some((c.get(i)? - c.get(j)?).powi(2)))
                .sum();
            out.set_symmetric(i, j, d)?;
        }
    }
    Ok(out)
}

/// Number of nominal columns on which two rows differ, among those where
/// both are present.
pub fn hamming_distances(
    name: &str,
    sample: &Sample,
    columns: &[&NominalColumn],
) -> Result<PairMatrix> {
    let n = columns.first().map_or(sample.len(), |c| c.len());
    check_len(sample, n)?;
    if let Some(c) = columns.iter().find(|c| c.len() != n) {
        return Err(DmError::DimensionMismatch {
            expected: n,
            found: c.len(),
        });
    }
    let mut out = PairMatrix::new(name, n, true);
    let rows: Vec<usize> = sample.iter().map(|(r, _)| r).collect();
    for (a, &i) in rows.iter().enumerate() {
        out.set(i, i, Some(0.0))?;
        for &j in &rows[a + 1..] {
            let d = columns
                .iter()
                .filter(|c| matches!((c.get(i), c.get(j)), (Some(x), Some(y)) if x != y))
                .count();
            out.set_symmetric(i, j, Some(d as f64))?;
        }
    }
    Ok(out)
}

/// Cross products of the rows centered at the weighted column means.
pub fn similarity(name: &str, sample: &Sample, space: &[&RealColumn]) -> Result<PairMatrix> {
    let n = rows_len(space)?;
    check_len(sample, n)?;
    let means: Vec<f64> = space
        .iter()
        .map(|c| {
            let (s, w) = sample
                .iter()
                .filter_map(|(r, w)| c.get(r).map(|x| (x * w, w)))
                .fold((0.0, 0.0), |(s, t), (x, w)| (s + x, t + w));
            if w > 0.0 {
                s / w
            } else {
                f64::NAN
            }
        })
        .collect();
    let mut out = PairMatrix::new(name, n, false);
    let rows: Vec<usize> = sample.iter().map(|(r, _)| r).collect();
    for (a, &i) in rows.iter().enumerate() {
        for &j in &rows[a..] {
            let s: Option<f64> = space
                .iter()
                .zip(&means)
                .map(|(c, m)| Some((c.get(i)? - m) * (c.get(j)? - m)))
                .sum();
            out.set_symmetric(i, j, s.filter(|v| v.is_finite()))?;
        }
    }
    Ok(out)
}

/// Gram matrix of the double-centred `−½·d²` with weighted row means.
///
/// # Errors
///
/// Returns an error if a sampled pair is missing.
pub fn distances_to_similarity(name: &str, sample: &Sample, d2: &PairMatrix) -> Result<PairMatrix> {
    let n = d2.size();
    check_len(sample, n)?;
    let total = sample.weight_sum();
    let rows: Vec<(usize, f64)> = sample.iter().collect();
    let cell = |i: usize, j: usize| {
        d2.get(i, j).ok_or_else(|| {
            DmError::InvalidInput(format!("{}: missing distance at ({}, {})", name, i, j))
        })
    };
    let mut row_mean = vec![0.0; n];
    for &(i, _) in &rows {
        let mut s = 0.0;
        for &(j, w) in &rows {
            s += w * cell(i, j)?;
        }
        row_mean[i] = s / total;
    }
    let grand = rows.iter().map(|&(i, w)| w * row_mean[i]).sum::<f64>() / total;
    let mut out = PairMatrix::new(name, n, false);
    for (a, &(i, _)) in rows.iter().enumerate() {
        for &(j, _) in &rows[a..] {
            let s = -0.5 * (cell(i, j)? - row_mean[i] - row_mean[j] + grand);
            out.set_symmetric(i, j, Some(s))?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn squared_distances_skip_missing() {
        let a = RealColumn::from_values(
            "a",
            dmkit_core::RealKind::Real,
            vec![Some(0.0), Some(3.0), None],
        )
        .unwrap();
        let b = RealColumn::from_reals("b", &[0.0, 4.0, 1.0]).unwrap();
        let d = squared_distances("d", &Sample::uniform(3), &[&a, &b]).unwrap();
        assert_eq!(d.get(0, 1), Some(25.0));
        assert_eq!(d.get(1, 0), Some(25.0));
        assert_eq!(d.get(0, 2), None);
        assert_eq!(d.get(2, 2), Some(0.0));
        assert!(d.is_positive());
    }

    #[test]
    fn hamming_counts_disagreements() {
        let c1 = NominalColumn::from_labels("c1", &[Some("a"), Some("b"), Some("a")]);
        let c2 = NominalColumn::from_labels("c2", &[Some("x"), Some("x"), None]);
        let d = hamming_distances("h", &Sample::uniform(3), &[&c1, &c2]).unwrap();
        assert_eq!(d.get(0, 1), Some(1.0));
        assert_eq!(d.get(0, 2), Some(0.0));
        assert_eq!(d.get(1, 2), Some(1.0));
    }

    #[test]
    fn double_centring_matches_centered_products() {
        let a = RealColumn::from_reals("a", &[1.0, 2.0, 4.0, 7.0]).unwrap();
        let b = RealColumn::from_reals("b", &[0.0, -1.0, 3.0, 2.0]).unwrap();
        let sample = Sample::uniform(4);
        let direct = similarity("s", &sample, &[&a, &b]).unwrap();
        let d2 = squared_distances("d2", &sample, &[&a, &b]).unwrap();
        let via = distances_to_similarity("s2", &sample, &d2).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let (x, y) = (direct.get(i, j).unwrap(), via.get(i, j).unwrap());
                assert!((x - y).abs() < TOL, "({}, {}) {} vs {}", i, j, x, y);
            }
        }
    }

    #[test]
    fn zero_weight_rows_are_left_missing() {
        let a = RealColumn::from_reals("a", &[1.0, 2.0, 3.0]).unwrap();
        let sample = Sample::new(vec![1.0, 0.0, 1.0]).unwrap();
        let d = squared_distances("d", &sample, &[&a]).unwrap();
        assert_eq!(d.get(0, 1), None);
        assert_eq!(d.get(0, 2), Some(4.0));
        assert!(squared_distances("d", &Sample::uniform(2), &[&a]).is_err());
    }
}
