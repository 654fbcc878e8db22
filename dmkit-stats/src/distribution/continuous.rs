//! Continuous families: Normal, Exponential, Cauchy, Beta, Chi-square.
//!
//! `set_parameters` rejects non-finite input as a contract violation; a
//! non-positive scale (the degenerate case an estimator can produce) leaves
//! the distribution unparameterized instead.

use core::f64::consts::PI;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::trace;

use dmkit_core::{DmError, Result};

use super::{
    close, open_unit, quantile_by_bisection, real_row_log_density, seeded_rng, Distribution,
    Univariate, DEFAULT_SEED,
};
use crate::analysis::Analysis;
use crate::roots::{bisect, RootOptions};
use crate::special::{betai, digamma, erf, gammainc, ln_gamma, normal_quantile, trigamma};

fn check_finite(name: &str, values: &[f64]) -> Result<()> {
    if let Some(v) = values.iter().find(|v| !v.is_finite()) {
        return Err(DmError::InvalidInput(format!(
            "{}: parameter {} is not finite",
            name, v
        )));
    }
    Ok(())
}

/// Weighted observations, each required to lie in `[lo, hi]`.
fn observations_in(
    analysis: &Analysis<'_>,
    name: &str,
    lo: f64,
    hi: f64,
) -> Result<Vec<(f64, f64)>> {
    let obs = analysis.weighted_reals()?;
    if let Some(&(x, _)) = obs.iter().find(|(x, _)| *x < lo || *x > hi) {
        return Err(DmError::InvalidInput(format!(
            "{}: value {} outside the support [{}, {}]",
            name, x, lo, hi
        )));
    }
    Ok(obs)
}

fn weight_of(obs: &[(f64, f64)]) -> f64 {
    obs.iter().map(|(_, w)| w).sum()
}

fn weighted_mean(obs: &[(f64, f64)]) -> f64 {
    obs.iter().map(|(x, w)| x * w).sum::<f64>() / weight_of(obs)
}

/// Smallest value at which the cumulative weight reaches half the total.
fn weighted_median(obs: &[(f64, f64)]) -> f64 {
    let mut sorted = obs.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = 0.5 * weight_of(&sorted);
    let mut acc = 0.0;
    for &(x, w) in &sorted {
        acc += w;
        if acc >= half {
            return x;
        }
    }
    sorted.last().map_or(f64::NAN, |&(x, _)| x)
}

// ── Normal ─────────────────────────────────────────────────────────────────

/// Normal (Gaussian) distribution with location μ and scale σ.
#[derive(Debug, Clone)]
pub struct Normal {
    loc: f64,
    scale: f64,
    rng: StdRng,
}

impl Default for Normal {
    fn default() -> Self {
        Self::new()
    }
}

impl Normal {
    /// Unparameterized.
    pub fn new() -> Self {
        Self {
            loc: f64::NAN,
            scale: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    /// Parameterized N(loc, scale²). `scale` must be positive.
    pub fn with_params(loc: f64, scale: f64) -> Result<Self> {
        if scale <= 0.0 {
            return Err(DmError::InvalidInput(
                "normal: scale must be positive".into(),
            ));
        }
        let mut n = Self::new();
        n.set_parameters(loc, scale)?;
        Ok(n)
    }

    /// Standard normal N(0, 1).
    pub fn standard() -> Self {
        Self {
            loc: 0.0,
            scale: 1.0,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn set_parameters(&mut self, loc: f64, scale: f64) -> Result<()> {
        check_finite("normal", &[loc, scale])?;
        if scale > 0.0 {
            self.loc = loc;
            self.scale = scale;
        } else {
            self.loc = f64::NAN;
            self.scale = f64::NAN;
        }
        Ok(())
    }

    pub fn loc(&self) -> f64 {
        self.loc
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Distribution for Normal {
    fn name(&self) -> &'static str {
        "Normal"
    }

    fn is_parameterized(&self) -> bool {
        !self.scale.is_nan()
    }

    fn param_count(&self) -> usize {
        2
    }

    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let obs = analysis.weighted_reals()?;
        self.loc = f64::NAN;
        self.scale = f64::NAN;
        if obs.len() < 2 {
            return Ok(());
        }
        let mean = weighted_mean(&obs);
        let var = obs.iter().map(|(x, w)| w * (x - mean).powi(2)).sum::<f64>() / weight_of(&obs);
        self.set_parameters(mean, var.max(0.0).sqrt())
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        real_row_log_density(self, analysis, row)
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        close(self.loc, other.loc, delta) && close(self.scale, other.scale, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.loc
    }
}

impl Univariate for Normal {
    fn pdf(&self, x: f64) -> f64 {
        self.log_pdf(x).exp()
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        -0.5 * z * z - self.scale.ln() - 0.5 * (2.0 * PI).ln()
    }

    fn cdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        0.5 * (1.0 + erf(z / core::f64::consts::SQRT_2))
    }

    fn quantile(&self, p: f64) -> f64 {
        if !(0.0..=1.0).contains(&p) {
            return f64::NAN;
        }
        self.loc + self.scale * normal_quantile(p)
    }

    /// Marsaglia polar method.
    fn random(&mut self) -> f64 {
        loop {
            let a = 2.0 * self.rng.gen::<f64>() - 1.0;
            let b = 2.0 * self.rng.gen::<f64>() - 1.0;
            let d2 = a * a + b * b;
            if d2 > 0.0 && d2 < 1.0 {
                let f = (-2.0 * d2.ln() / d2).sqrt();
                return self.loc + self.scale * a * f;
            }
        }
    }

    fn mean(&self) -> f64 {
        self.loc
    }

    fn variance(&self) -> f64 {
        self.scale * self.scale
    }
}

// ── Exponential ────────────────────────────────────────────────────────────

/// Exponential distribution on `[0, ∞)` parameterized by its mean θ.
#[derive(Debug, Clone)]
pub struct Exponential {
    mean: f64,
    rng: StdRng,
}

impl Default for Exponential {
    fn default() -> Self {
        Self::new()
    }
}

impl Exponential {
    pub fn new() -> Self {
        Self {
            mean: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn with_mean(mean: f64) -> Result<Self> {
        let mut e = Self::new();
        e.set_parameters(mean)?;
        Ok(e)
    }

    pub fn set_parameters(&mut self, mean: f64) -> Result<()> {
        check_finite("exponential", &[mean])?;
        self.mean = if mean > 0.0 { mean } else { f64::NAN };
        Ok(())
    }

    /// Rate 1/θ.
    pub fn rate(&self) -> f64 {
        1.0 / self.mean
    }
}

impl Distribution for Exponential {
    fn name(&self) -> &'static str {
        "Exponential"
    }

    fn is_parameterized(&self) -> bool {
        !self.mean.is_nan()
    }

    fn param_count(&self) -> usize {
        1
    }

    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let obs = observations_in(analysis, "exponential", 0.0, f64::INFINITY)?;
        self.mean = f64::NAN;
        if obs.is_empty() {
            return Ok(());
        }
        self.set_parameters(weighted_mean(&obs))
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        real_row_log_density(self, analysis, row)
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        close(self.mean, other.mean, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.mean
    }
}

impl Univariate for Exponential {
    fn pdf(&self, x: f64) -> f64 {
        self.log_pdf(x).exp()
    }

    fn log_pdf(&self, x: f64) -> f64 {
        if self.mean.is_nan() {
            return f64::NAN;
        }
        if x < 0.0 {
            return f64::NEG_INFINITY;
        }
        -x / self.mean - self.mean.ln()
    }

    fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return if self.mean.is_nan() { f64::NAN } else { 0.0 };
        }
        -(-x / self.mean).exp_m1()
    }

    fn quantile(&self, p: f64) -> f64 {
        if !(0.0..=1.0).contains(&p) {
            return f64::NAN;
        }
        -self.mean * (-p).ln_1p()
    }

    fn random(&mut self) -> f64 {
        -self.mean * open_unit(&mut self.rng).ln()
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn variance(&self) -> f64 {
        self.mean * self.mean
    }
}

// ── Cauchy ─────────────────────────────────────────────────────────────────

/// Cauchy distribution with location and scale.
#[derive(Debug, Clone)]
pub struct Cauchy {
    loc: f64,
    scale: f64,
    rng: StdRng,
}

const CAUCHY_ITER_MAX: usize = 1000;
const CAUCHY_TOL: f64 = 1e-5;

impl Default for Cauchy {
    fn default() -> Self {
        Self::new()
    }
}

impl Cauchy {
    pub fn new() -> Self {
        Self {
            loc: f64::NAN,
            scale: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn with_params(loc: f64, scale: f64) -> Result<Self> {
        let mut c = Self::new();
        c.set_parameters(loc, scale)?;
        Ok(c)
    }

    pub fn set_parameters(&mut self, loc: f64, scale: f64) -> Result<()> {
        check_finite("cauchy", &[loc, scale])?;
        if scale > 0.0 {
            self.loc = loc;
            self.scale = scale;
        } else {
            self.loc = f64::NAN;
            self.scale = f64::NAN;
        }
        Ok(())
    }

    pub fn loc(&self) -> f64 {
        self.loc
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Scale solving Σ w·s²/(s² + (x - loc)²) = W/2, `None` when more than
    /// half of the mass sits at `loc`.
    fn scale_for(obs: &[(f64, f64)], loc: f64) -> Option<f64> {
        let half = 0.5 * weight_of(obs);
        let hi = obs.iter().fold(0.0_f64, |m, (x, _)| m.max((x - loc).abs()));
        if hi <= 0.0 {
            return None;
        }
        let f = |s: f64| {
            let s2 = s * s;
            obs.iter()
                .map(|&(x, w)| {
                    let d2 = (x - loc) * (x - loc);
                    if d2 == 0.0 {
                        w
                    } else {
                        w * s2 / (s2 + d2)
                    }
                })
                .sum::<f64>()
                - half
        };
        // Search ln s so the precision is relative to the root.
        let ln_hi = hi.ln();
        bisect(|t: f64| f(t.exp()), ln_hi - 60.0, ln_hi, RootOptions::with_tol(1e-10))
            .map(f64::exp)
    }
}

impl Distribution for Cauchy {
    fn name(&self) -> &'static str {
        "Cauchy"
    }

    fn is_parameterized(&self) -> bool {
        !self.scale.is_nan()
    }

    fn param_count(&self) -> usize {
        2
    }

    /// Alternates the scale root-find with a reweighted location update,
    /// starting from the weighted median.
    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let obs = analysis.weighted_reals()?;
        self.loc = f64::NAN;
        self.scale = f64::NAN;
        if obs.len() < 2 {
            return Ok(());
        }
        let mut loc = weighted_median(&obs);
        let mut scale = f64::INFINITY;
        for iter in 0..CAUCHY_ITER_MAX {
            let next_scale = match Self::scale_for(&obs, loc) {
                Some(s) => s,
                None => return Ok(()),
            };
            let s2 = next_scale * next_scale;
            let (num, den) = obs.iter().fold((0.0, 0.0), |(n, d), &(x, w)| {
                let u = w / (s2 + (x - loc) * (x - loc));
                (n + u * x, d + u)
            });
            let next_loc = num / den;
            let done = (next_loc - loc).abs() <= CAUCHY_TOL * next_scale.max(1.0)
                && (next_scale - scale).abs() <= CAUCHY_TOL * next_scale.max(1.0);
            loc = next_loc;
            scale = next_scale;
            trace!(iter, loc, scale, "cauchy estimate");
            if done {
                break;
            }
        }
        self.set_parameters(loc, scale)
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        real_row_log_density(self, analysis, row)
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        close(self.loc, other.loc, delta) && close(self.scale, other.scale, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.loc
    }
}

impl Univariate for Cauchy {
    fn pdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        1.0 / (PI * self.scale * (1.0 + z * z))
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        -(PI * self.scale).ln() - z.mul_add(z, 1.0).ln()
    }

    fn cdf(&self, x: f64) -> f64 {
        0.5 + ((x - self.loc) / self.scale).atan() / PI
    }

    fn quantile(&self, p: f64) -> f64 {
        if !(0.0..=1.0).contains(&p) {
            return f64::NAN;
        }
        if p == 0.0 {
            return f64::NEG_INFINITY;
        }
        if p == 1.0 {
            return f64::INFINITY;
        }
        self.loc + self.scale * (PI * (p - 0.5)).tan()
    }

    fn random(&mut self) -> f64 {
        let u = open_unit(&mut self.rng);
        self.quantile(u)
    }

    /// Undefined for the Cauchy distribution.
    fn mean(&self) -> f64 {
        f64::NAN
    }

    /// Undefined for the Cauchy distribution.
    fn variance(&self) -> f64 {
        f64::NAN
    }
}

// ── Beta ───────────────────────────────────────────────────────────────────

/// Beta(α, β) on `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Beta {
    alpha: f64,
    beta: f64,
    ln_norm: f64,
    rng: StdRng,
}

const BETA_ITER_MAX: usize = 200;

impl Default for Beta {
    fn default() -> Self {
        Self::new()
    }
}

impl Beta {
    pub fn new() -> Self {
        Self {
            alpha: f64::NAN,
            beta: f64::NAN,
            ln_norm: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn with_params(alpha: f64, beta: f64) -> Result<Self> {
        let mut b = Self::new();
        b.set_parameters(alpha, beta)?;
        Ok(b)
    }

    pub fn set_parameters(&mut self, alpha: f64, beta: f64) -> Result<()> {
        check_finite("beta", &[alpha, beta])?;
        if alpha > 0.0 && beta > 0.0 {
            self.alpha = alpha;
            self.beta = beta;
            self.ln_norm = ln_gamma(alpha + beta) - ln_gamma(alpha) - ln_gamma(beta);
        } else {
            self.alpha = f64::NAN;
            self.beta = f64::NAN;
            self.ln_norm = f64::NAN;
        }
        Ok(())
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}

impl Distribution for Beta {
    fn name(&self) -> &'static str {
        "Beta"
    }

    fn is_parameterized(&self) -> bool {
        !self.alpha.is_nan()
    }

    fn param_count(&self) -> usize {
        2
    }

    /// Method of moments start, then Newton on the digamma score equations.
    /// Observations at exactly 0 or 1 make the likelihood unbounded and leave
    /// the distribution unparameterized.
    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let obs = observations_in(analysis, "beta", 0.0, 1.0)?;
        self.set_parameters(0.0, 0.0)?;
        if obs.len() < 2 || obs.iter().any(|&(x, _)| x == 0.0 || x == 1.0) {
            return Ok(());
        }
        let w = weight_of(&obs);
        let m = weighted_mean(&obs);
        let v = obs.iter().map(|(x, wi)| wi * (x - m).powi(2)).sum::<f64>() / w;
        if v <= 0.0 {
            return Ok(());
        }
        let g1 = obs.iter().map(|(x, wi)| wi * x.ln()).sum::<f64>() / w;
        let g2 = obs.iter().map(|(x, wi)| wi * (1.0 - x).ln()).sum::<f64>() / w;

        let common = m * (1.0 - m) / v - 1.0;
        let (mut a, mut b) = if common > 0.0 {
            (m * common, (1.0 - m) * common)
        } else {
            (1.0, 1.0)
        };

        for _ in 0..BETA_ITER_MAX {
            let psi_ab = digamma(a + b);
            let f1 = digamma(a) - psi_ab - g1;
            let f2 = digamma(b) - psi_ab - g2;
            let t_ab = trigamma(a + b);
            let j11 = trigamma(a) - t_ab;
            let j22 = trigamma(b) - t_ab;
            let j12 = -t_ab;
            let det = j11 * j22 - j12 * j12;
            if det == 0.0 || !det.is_finite() {
                break;
            }
            let mut da = (j22 * f1 - j12 * f2) / det;
            let mut db = (j11 * f2 - j12 * f1) / det;
            if !da.is_finite() || !db.is_finite() {
                break;
            }
            // Halve the step until both parameters stay positive.
            while a - da <= 0.0 || b - db <= 0.0 {
                da *= 0.5;
                db *= 0.5;
            }
            a -= da;
            b -= db;
            if da.abs() <= 1e-10 * a && db.abs() <= 1e-10 * b {
                break;
            }
        }
        self.set_parameters(a, b)
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        real_row_log_density(self, analysis, row)
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        close(self.alpha, other.alpha, delta) && close(self.beta, other.beta, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.mean()
    }
}

impl Univariate for Beta {
    fn pdf(&self, x: f64) -> f64 {
        self.log_pdf(x).exp()
    }

    fn log_pdf(&self, x: f64) -> f64 {
        if self.alpha.is_nan() {
            return f64::NAN;
        }
        if !(0.0..=1.0).contains(&x) {
            return f64::NEG_INFINITY;
        }
        (self.alpha - 1.0) * x.ln() + (self.beta - 1.0) * (1.0 - x).ln() + self.ln_norm
    }

    fn cdf(&self, x: f64) -> f64 {
        if self.alpha.is_nan() {
            return f64::NAN;
        }
        betai(self.alpha, self.beta, x.clamp(0.0, 1.0)).unwrap_or(f64::NAN)
    }

    fn quantile(&self, p: f64) -> f64 {
        if self.alpha.is_nan() {
            return f64::NAN;
        }
        quantile_by_bisection(|x| self.cdf(x), 0.0, 1.0, p)
    }

    fn random(&mut self) -> f64 {
        let u = open_unit(&mut self.rng);
        self.quantile(u)
    }

    fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    fn variance(&self) -> f64 {
        let s = self.alpha + self.beta;
        self.alpha * self.beta / (s * s * (s + 1.0))
    }
}

// ── Chi-square ─────────────────────────────────────────────────────────────

/// Chi-square distribution with (real) degree `k`.
#[derive(Debug, Clone)]
pub struct Chi2 {
    k: f64,
    rng: StdRng,
}

const CHI2_DEGREE_MIN: f64 = 1e-6;
const CHI2_DEGREE_MAX: f64 = 1e6;

impl Default for Chi2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Chi2 {
    pub fn new() -> Self {
        Self {
            k: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn with_degree(k: f64) -> Result<Self> {
        let mut c = Self::new();
        c.set_parameters(k)?;
        Ok(c)
    }

    pub fn set_parameters(&mut self, k: f64) -> Result<()> {
        check_finite("chi2", &[k])?;
        self.k = if k > 0.0 { k } else { f64::NAN };
        Ok(())
    }

    pub fn degree(&self) -> f64 {
        self.k
    }
}

impl Distribution for Chi2 {
    fn name(&self) -> &'static str {
        "Chi2"
    }

    fn is_parameterized(&self) -> bool {
        !self.k.is_nan()
    }

    fn param_count(&self) -> usize {
        1
    }

    /// Solves ψ(k/2) = mean(ln x) - ln 2.
    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let obs = observations_in(analysis, "chi2", 0.0, f64::INFINITY)?;
        self.k = f64::NAN;
        if obs.is_empty() || obs.iter().any(|&(x, _)| x == 0.0) {
            return Ok(());
        }
        let goal = obs.iter().map(|(x, w)| w * x.ln()).sum::<f64>() / weight_of(&obs)
            - 2.0_f64.ln();
        let root = bisect(
            |k| digamma(0.5 * k) - goal,
            CHI2_DEGREE_MIN,
            CHI2_DEGREE_MAX,
            RootOptions::with_tol(1e-10),
        );
        match root {
            Some(k) => self.set_parameters(k),
            None => Ok(()),
        }
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        real_row_log_density(self, analysis, row)
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        close(self.k, other.k, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.k
    }
}

impl Univariate for Chi2 {
    fn pdf(&self, x: f64) -> f64 {
        self.log_pdf(x).exp()
    }

    fn log_pdf(&self, x: f64) -> f64 {
        if self.k.is_nan() {
            return f64::NAN;
        }
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let half_k = 0.5 * self.k;
        (half_k - 1.0) * x.ln() - 0.5 * x - half_k * 2.0_f64.ln() - ln_gamma(half_k)
    }

    fn cdf(&self, x: f64) -> f64 {
        if self.k.is_nan() {
            return f64::NAN;
        }
        if x <= 0.0 {
            return 0.0;
        }
        gammainc(0.5 * self.k, 0.5 * x).unwrap_or(f64::NAN)
    }

    fn quantile(&self, p: f64) -> f64 {
        if self.k.is_nan() || !(0.0..=1.0).contains(&p) {
            return f64::NAN;
        }
        if p == 1.0 {
            return f64::INFINITY;
        }
        let mut hi = 4.0 * self.k.max(1.0);
        for _ in 0..200 {
            if self.cdf(hi) >= p {
                break;
            }
            hi *= 2.0;
        }
        quantile_by_bisection(|x| self.cdf(x), 0.0, hi, p)
    }

    fn random(&mut self) -> f64 {
        let u = open_unit(&mut self.rng);
        self.quantile(u)
    }

    fn mean(&self) -> f64 {
        self.k
    }

    fn variance(&self) -> f64 {
        2.0 * self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_util::{column, lcg};
    use dmkit_core::{RealColumn, RealKind, Sample};

    const TOL: f64 = 1e-6;

    #[test]
    fn normal_standard_pdf_at_zero() {
        let n = Normal::standard();
        assert!((n.pdf(0.0) - 1.0 / (2.0 * PI).sqrt()).abs() < TOL);
        assert!((n.cdf(0.0) - 0.5).abs() < TOL);
        assert!((n.quantile(0.975) - 1.959963984540054).abs() < 1e-9);
    }

    #[test]
    fn normal_invalid_scale() {
        assert!(Normal::with_params(0.0, 0.0).is_err());
        assert!(Normal::with_params(0.0, -1.0).is_err());
        let mut n = Normal::new();
        assert!(n.set_parameters(f64::NAN, 1.0).is_err());
        n.set_parameters(1.0, 0.0).unwrap();
        assert!(!n.is_parameterized());
    }

    #[test]
    fn normal_round_trip() {
        let mut gen = Normal::with_params(3.0, 2.0).unwrap();
        gen.set_seed(42);
        let draws = gen.simulate(50_000);
        let col = column(&draws);
        let a = Analysis::real(Sample::uniform(draws.len()), &col).unwrap();
        let mut fit = Normal::new();
        fit.estimate(&a).unwrap();
        assert!((fit.loc() - 3.0).abs() < 0.03, "loc={}", fit.loc());
        assert!((fit.scale() - 2.0).abs() < 0.02, "scale={}", fit.scale());
    }

    #[test]
    fn normal_estimate_is_idempotent() {
        let col = column(&[1.0, 2.0, 4.0, 8.0]);
        let a = Analysis::real(Sample::new(vec![1.0, 2.0, 1.0, 0.5]).unwrap(), &col).unwrap();
        let mut n = Normal::new();
        n.estimate(&a).unwrap();
        let (l1, s1) = (n.loc(), n.scale());
        n.estimate(&a).unwrap();
        assert!((n.loc() - l1).abs() < 1e-12 && (n.scale() - s1).abs() < 1e-12);
    }

    #[test]
    fn normal_degenerate_samples() {
        let one = column(&[5.0]);
        let a = Analysis::real(Sample::uniform(1), &one).unwrap();
        let mut n = Normal::standard();
        n.estimate(&a).unwrap();
        assert!(!n.is_parameterized());
        assert!(n.log_likelihood(&a).unwrap().is_nan());

        let flat = column(&[2.0, 2.0, 2.0]);
        let a = Analysis::real(Sample::uniform(3), &flat).unwrap();
        n.estimate(&a).unwrap();
        assert!(!n.is_parameterized());
    }

    #[test]
    fn normal_missing_rows_skipped() {
        let col =
            RealColumn::from_values("x", RealKind::Real, vec![Some(0.0), None, Some(2.0)]).unwrap();
        let a = Analysis::real(Sample::uniform(3), &col).unwrap();
        let mut n = Normal::new();
        n.estimate(&a).unwrap();
        assert!((n.loc() - 1.0).abs() < TOL);
        assert!((n.scale() - 1.0).abs() < TOL);
        assert_eq!(n.log_density_row(&a, 1).unwrap(), 0.0);
    }

    #[test]
    fn fitness_penalizes_parameters() {
        let col = column(&[0.0, 1.0, 2.0, 3.0]);
        let a = Analysis::real(Sample::uniform(4), &col).unwrap();
        let mut n = Normal::new();
        n.estimate(&a).unwrap();
        let entropy = n.entropy_estimate(&a).unwrap();
        let fitness = n.fitness(&a).unwrap();
        assert!((fitness - entropy - 2.0 * 4.0_f64.ln() / 8.0).abs() < 1e-12);
        assert_eq!(n.mode_row(&a).unwrap(), Some(1));
        assert_eq!(n.weakest_row(&a).unwrap(), Some(0));
    }

    #[test]
    fn exponential_estimate() {
        let col = column(&[1.0, 2.0, 3.0]);
        let a = Analysis::real(Sample::uniform(3), &col).unwrap();
        let mut e = Exponential::new();
        e.estimate(&a).unwrap();
        assert!((e.mean() - 2.0).abs() < TOL);
        assert!((e.cdf(e.quantile(0.3)) - 0.3).abs() < 1e-12);
        let neg = column(&[-1.0]);
        let a = Analysis::real(Sample::uniform(1), &neg).unwrap();
        assert!(e.estimate(&a).is_err());
    }

    #[test]
    fn cauchy_symmetric_sample() {
        let col = column(&[-3.0, -1.0, 0.0, 1.0, 3.0]);
        let a = Analysis::real(Sample::uniform(5), &col).unwrap();
        let mut c = Cauchy::new();
        c.estimate(&a).unwrap();
        assert!(c.loc().abs() < 1e-4, "loc={}", c.loc());
        assert!(c.scale() > 0.5 && c.scale() < 2.0, "scale={}", c.scale());
        assert!((c.cdf(c.quantile(0.8)) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn cauchy_round_trip() {
        let truth = Cauchy::with_params(5.0, 0.5).unwrap();
        let draws: Vec<f64> = lcg(20_000, 9)
            .into_iter()
            .map(|u| truth.quantile(u.max(1e-12)))
            .collect();
        let col = column(&draws);
        let a = Analysis::real(Sample::uniform(draws.len()), &col).unwrap();
        let mut c = Cauchy::new();
        c.estimate(&a).unwrap();
        assert!((c.loc() - 5.0).abs() < 0.03, "loc={}", c.loc());
        assert!((c.scale() - 0.5).abs() < 0.03, "scale={}", c.scale());
    }

    #[test]
    fn cauchy_majority_at_one_point_is_degenerate() {
        let col = column(&[1.0, 1.0, 1.0, 7.0]);
        let a = Analysis::real(Sample::uniform(4), &col).unwrap();
        let mut c = Cauchy::new();
        c.estimate(&a).unwrap();
        assert!(!c.is_parameterized());
    }

    #[test]
    fn beta_round_trip() {
        let truth = Beta::with_params(2.0, 5.0).unwrap();
        let draws: Vec<f64> = lcg(5000, 5)
            .into_iter()
            .map(|u| truth.quantile(u.max(1e-9)))
            .collect();
        let col = column(&draws);
        let a = Analysis::real(Sample::uniform(draws.len()), &col).unwrap();
        let mut b = Beta::new();
        b.estimate(&a).unwrap();
        assert!((b.alpha() - 2.0).abs() < 0.15, "alpha={}", b.alpha());
        assert!((b.beta() - 5.0).abs() < 0.4, "beta={}", b.beta());
    }

    #[test]
    fn beta_uniform_cdf() {
        let b = Beta::with_params(1.0, 1.0).unwrap();
        assert!((b.cdf(0.3) - 0.3).abs() < 1e-10);
        assert!((b.quantile(0.7) - 0.7).abs() < 1e-9);
        assert!((b.pdf(0.4) - 1.0).abs() < 1e-10);
        let outside = column(&[0.5, 1.5]);
        let a = Analysis::real(Sample::uniform(2), &outside).unwrap();
        assert!(Beta::new().estimate(&a).is_err());
    }

    #[test]
    fn chi2_known_values() {
        let c = Chi2::with_degree(2.0).unwrap();
        assert!((c.cdf(5.991) - 0.95).abs() < 1e-3);
        assert!((c.quantile(0.95) - 5.991464547).abs() < 1e-6);
        assert!((c.mean() - 2.0).abs() < TOL);
    }

    #[test]
    fn chi2_round_trip() {
        let truth = Chi2::with_degree(4.0).unwrap();
        let draws: Vec<f64> = lcg(5000, 17)
            .into_iter()
            .map(|u| truth.quantile(u.max(1e-9)))
            .collect();
        let col = column(&draws);
        let a = Analysis::real(Sample::uniform(draws.len()), &col).unwrap();
        let mut c = Chi2::new();
        c.estimate(&a).unwrap();
        assert!((c.degree() - 4.0).abs() < 0.15, "k={}", c.degree());
    }

    #[test]
    fn random_is_reproducible() {
        let mut a = Normal::standard();
        let mut b = Normal::standard();
        a.set_seed(5);
        b.set_seed(5);
        assert_eq!(a.simulate(10), b.simulate(10));
        b.set_seed(6);
        assert_ne!(a.simulate(10), b.simulate(10));
    }
}
