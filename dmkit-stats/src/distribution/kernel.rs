//! Kernel-smoothed empirical density with a uniform background.
//!
//! The density is a mixture of a uniform component over the observed range,
//! carrying the weight of isolated points, and a rectangular kernel of
//! half-width `h` around every observation. `h` is chosen by a geometric
//! grid search, refined around the best value, that maximizes the
//! leave-one-in log-likelihood.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, trace};

use dmkit_core::{RealColumn, RealKind, Result};

use super::{close, seeded_rng, Distribution, Univariate, DEFAULT_SEED};
use crate::analysis::Analysis;

const REFINE_STEPS: i32 = 10;
const GRID_RESOLUTION: f64 = 0.01;
const HALF_WINDOW_REL_TOL: f64 = 1e-4;

/// Non-parametric one-dimensional density.
#[derive(Debug, Clone)]
pub struct UniKernel {
    /// `(value, weight)` sorted by value.
    points: Vec<(f64, f64)>,
    /// Running weight sums aligned with `points`.
    cumulative: Vec<f64>,
    min: f64,
    max: f64,
    mean: f64,
    variance: f64,
    half_window: f64,
    uniform_prob: f64,
    rng: StdRng,
}

impl Default for UniKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl UniKernel {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            cumulative: Vec::new(),
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            variance: f64::NAN,
            half_window: f64::NAN,
            uniform_prob: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn half_window(&self) -> f64 {
        self.half_window
    }

    /// Weight fraction assigned to the uniform background.
    pub fn uniform_prob(&self) -> f64 {
        self.uniform_prob
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Weight of the points with value <= `v`.
    fn weight_up_to(&self, v: f64) -> f64 {
        let k = self.points.partition_point(|p| p.0 <= v);
        if k == 0 {
            0.0
        } else {
            self.cumulative[k - 1]
        }
    }

    fn kernel_height(&self, half_window: f64) -> f64 {
        1.0 / (2.0 * half_window * self.total())
    }

    fn density_with(&self, x: f64, half_window: f64, uniform_prob: f64) -> f64 {
        let window = self.weight_up_to(x + half_window) - self.weight_up_to(x - half_window);
        let uniform = if x >= self.min && x <= self.max {
            1.0 / self.range()
        } else {
            0.0
        };
        uniform_prob * uniform + (1.0 - uniform_prob) * window * self.kernel_height(half_window)
    }

    /// Weight fraction of points whose neighbours are both at least
    /// `half_window` away.
    fn isolated_fraction(&self, half_window: f64) -> f64 {
        let n = self.points.len();
        let isolated: f64 = (0..n)
            .filter(|&i| {
                (i == 0 || self.points[i].0 - self.points[i - 1].0 >= half_window)
                    && (i + 1 == n || self.points[i + 1].0 - self.points[i].0 >= half_window)
            })
            .map(|i| self.points[i].1)
            .sum();
        isolated / self.total()
    }

    /// Log-likelihood with each point's own kernel contribution removed.
    fn leave_one_in_log_likelihood(&self, half_window: f64, uniform_prob: f64) -> f64 {
        let height = self.kernel_height(half_window);
        self.points
            .iter()
            .map(|&(x, w)| {
                let own = (1.0 - uniform_prob) * w * height;
                let d = (self.density_with(x, half_window, uniform_prob) - own).max(0.0);
                w * d.ln()
            })
            .sum()
    }

    /// Scan `lo·step, lo·step², ...` up to `hi`; returns the best
    /// `(half_window, uniform_prob)`.
    fn scan(&self, lo: f64, hi: f64, step: f64) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64, f64)> = None;
        let mut h = lo;
        while h <= hi {
            h *= step;
            let u = self.isolated_fraction(h);
            let ll = self.leave_one_in_log_likelihood(h, u);
            trace!(half_window = h, uniform_prob = u, log_likelihood = ll, "kernel scan");
            if best.map_or(true, |(_, _, b)| ll > b) {
                best = Some((h, u, ll));
            }
        }
        best.map(|(h, u, _)| (h, u))
    }

    /// Per-row density of `analysis` as a new positive column.
    pub fn density_column(&self, name: &str, analysis: &Analysis<'_>) -> Result<RealColumn> {
        let mut col = RealColumn::new(name, RealKind::Positive, analysis.n_rows());
        for row in 0..analysis.n_rows() {
            if let Some(x) = analysis.real_value(row)? {
                let d = self.pdf(x);
                col.set(row, if d.is_finite() { Some(d) } else { None })?;
            }
        }
        Ok(col)
    }
}

impl Distribution for UniKernel {
    fn name(&self) -> &'static str {
        "UniKernel"
    }

    fn is_parameterized(&self) -> bool {
        !self.half_window.is_nan()
    }

    fn param_count(&self) -> usize {
        2
    }

    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let mut points = analysis.weighted_reals()?;
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut acc = 0.0;
        self.cumulative = points
            .iter()
            .map(|&(_, w)| {
                acc += w;
                acc
            })
            .collect();
        self.points = points;
        self.half_window = f64::NAN;
        self.uniform_prob = f64::NAN;
        if self.points.is_empty() {
            return Ok(());
        }

        let total = self.total();
        self.min = self.points[0].0;
        self.max = self.points[self.points.len() - 1].0;
        self.mean = self.points.iter().map(|(x, w)| x * w).sum::<f64>() / total;
        self.variance = self
            .points
            .iter()
            .map(|(x, w)| w * (x - self.mean).powi(2))
            .sum::<f64>()
            / total;

        if self.range() <= 0.0 {
            // Point mass.
            self.half_window = 0.0;
            self.uniform_prob = 0.0;
            return Ok(());
        }

        let mut lo = GRID_RESOLUTION * self.variance.sqrt();
        let mut hi = 0.5 * self.range();
        let mut step = (hi / lo).powf(GRID_RESOLUTION);
        let mut best = None;
        while hi - lo > HALF_WINDOW_REL_TOL * hi && step > 1.0 {
            let (h, u) = match self.scan(lo, hi, step) {
                Some(b) => b,
                None => break,
            };
            best = Some((h, u));
            lo = h / step.powi(REFINE_STEPS);
            hi = h * step.powi(REFINE_STEPS);
            step = step.sqrt();
        }
        if let Some((h, u)) = best {
            self.half_window = h;
            self.uniform_prob = u;
            debug!(half_window = h, uniform_prob = u, "kernel estimate");
        }
        Ok(())
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        Ok(match analysis.real_value(row)? {
            Some(x) => self.log_pdf(x),
            None => 0.0,
        })
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        close(self.half_window, other.half_window, delta)
            && close(self.uniform_prob, other.uniform_prob, delta)
            && close(self.mean, other.mean, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.mean
    }
}

impl Univariate for UniKernel {
    fn pdf(&self, x: f64) -> f64 {
        if !self.is_parameterized() {
            return f64::NAN;
        }
        if self.half_window == 0.0 {
            return if x == self.min { f64::INFINITY } else { 0.0 };
        }
        self.density_with(x, self.half_window, self.uniform_prob)
    }

    fn cdf(&self, x: f64) -> f64 {
        if !self.is_parameterized() {
            return f64::NAN;
        }
        self.weight_up_to(x) / self.total()
    }

    fn quantile(&self, p: f64) -> f64 {
        if !(0.0..=1.0).contains(&p) || !self.is_parameterized() {
            return f64::NAN;
        }
        let target = p * self.total();
        let k = self.cumulative.partition_point(|&c| c < target - 1e-12 * self.total());
        self.points[k.min(self.points.len() - 1)].0
    }

    /// Draws from the smoothed density: the uniform background with
    /// probability `uniform_prob`, else a weighted point plus a uniform
    /// offset within the half-window.
    fn random(&mut self) -> f64 {
        if !self.is_parameterized() {
            return f64::NAN;
        }
        let u: f64 = self.rng.gen();
        if u < self.uniform_prob {
            return self.min + self.rng.gen::<f64>() * self.range();
        }
        let target = self.rng.gen::<f64>() * self.total();
        let k = self.cumulative.partition_point(|&c| c <= target);
        let x = self.points[k.min(self.points.len() - 1)].0;
        x + (2.0 * self.rng.gen::<f64>() - 1.0) * self.half_window
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn variance(&self) -> f64 {
        self.variance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_util::{column, lcg};
    use crate::distribution::Normal;
    use dmkit_core::Sample;

    #[test]
    fn point_mass_for_zero_range() {
        let col = column(&[3.0, 3.0, 3.0]);
        let a = Analysis::real(Sample::uniform(3), &col).unwrap();
        let mut k = UniKernel::new();
        k.estimate(&a).unwrap();
        assert!(k.is_parameterized());
        assert_eq!(k.half_window(), 0.0);
        assert_eq!(k.pdf(3.0), f64::INFINITY);
        assert_eq!(k.pdf(3.1), 0.0);
        assert_eq!(k.cdf(3.0), 1.0);
    }

    #[test]
    fn empty_sample_is_unparameterized() {
        let col = column(&[1.0, 2.0]);
        let a = Analysis::real(Sample::new(vec![0.0, 0.0]).unwrap(), &col).unwrap();
        let mut k = UniKernel::new();
        k.estimate(&a).unwrap();
        assert!(!k.is_parameterized());
        assert!(k.pdf(1.0).is_nan());
    }

    #[test]
    fn smooth_sample_density_integrates_to_one() {
        let draws: Vec<f64> = lcg(400, 21)
            .into_iter()
            .map(|u| Normal::standard().quantile(u.max(1e-9)))
            .collect();
        let col = column(&draws);
        let a = Analysis::real(Sample::uniform(draws.len()), &col).unwrap();
        let mut k = UniKernel::new();
        k.estimate(&a).unwrap();
        let h = k.half_window();
        assert!(h > 0.0 && h < 0.5 * k.range(), "h={}", h);
        assert!((0.0..=1.0).contains(&k.uniform_prob()));

        let lo = k.min - 2.0 * h;
        let hi = k.max + 2.0 * h;
        let n = 20_000;
        let dx = (hi - lo) / n as f64;
        let integral: f64 = (0..n).map(|i| k.pdf(lo + (i as f64 + 0.5) * dx) * dx).sum();
        assert!((integral - 1.0).abs() < 0.02, "integral={}", integral);
        assert!(k.pdf(0.0) > k.pdf(2.5));
    }

    #[test]
    fn cdf_and_quantile_are_empirical() {
        let col = column(&[1.0, 2.0, 3.0, 4.0]);
        let a = Analysis::real(Sample::uniform(4), &col).unwrap();
        let mut k = UniKernel::new();
        k.estimate(&a).unwrap();
        assert!((k.cdf(2.5) - 0.5).abs() < 1e-12);
        assert_eq!(k.quantile(0.5), 2.0);
        assert_eq!(k.quantile(0.51), 3.0);
        assert!((k.mean() - 2.5).abs() < 1e-12);
        let draws = k.simulate(100);
        assert!(draws
            .iter()
            .all(|&x| x >= 1.0 - k.half_window() && x <= 4.0 + k.half_window()));
    }

    #[test]
    fn density_column_marks_missing() {
        let col = dmkit_core::RealColumn::from_values(
            "x",
            RealKind::Real,
            vec![Some(0.0), None, Some(1.0), Some(1.5)],
        )
        .unwrap();
        let a = Analysis::real(Sample::uniform(4), &col).unwrap();
        let mut k = UniKernel::new();
        k.estimate(&a).unwrap();
        let d = k.density_column("density", &a).unwrap();
        assert!(d.get(0).is_some());
        assert!(d.get(1).is_none());
        assert_eq!(d.kind(), RealKind::Positive);
    }
}
