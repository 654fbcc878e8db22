//! Discrete families: Bernoulli, Categorical, Binomial, Geometric, Zipf.

use rand::rngs::StdRng;
use rand::Rng;

use dmkit_core::{DmError, Result};

use super::{close, open_unit, seeded_rng, Distribution, Univariate, DEFAULT_SEED};
use crate::analysis::Analysis;
use crate::roots::{bisect_clamped, RootOptions};
use crate::special::{ln_factorial, zeta_sums};

const PROB_TOL: f64 = 1e-6;

/// Forward search caps for unbounded supports.
const QUANTILE_STEPS_MAX: u64 = 10_000_000;

fn check_prob(name: &str, p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(DmError::InvalidInput(format!(
            "{}: probability {} not in [0, 1]",
            name, p
        )));
    }
    Ok(())
}

/// `k · ln(q)` with `0 · ln 0 = 0`.
fn xlogy(k: f64, q: f64) -> f64 {
    if k == 0.0 {
        0.0
    } else {
        k * q.ln()
    }
}

/// Weighted non-missing integer observations, each checked against `[lo, hi]`.
fn weighted_integers(
    analysis: &Analysis<'_>,
    name: &str,
    lo: i64,
    hi: Option<i64>,
) -> Result<Vec<(i64, f64)>> {
    let mut out = Vec::new();
    for (row, w) in analysis.sample().iter() {
        if let Some(x) = analysis.integer_value(row)? {
            if x < lo || hi.map_or(false, |h| x > h) {
                return Err(DmError::InvalidInput(format!(
                    "{}: value {} at row {} outside the support",
                    name, x, row
                )));
            }
            out.push((x, w));
        }
    }
    Ok(out)
}

fn integer_row_log_density<D: Univariate>(
    d: &D,
    analysis: &Analysis<'_>,
    row: usize,
) -> Result<f64> {
    Ok(match analysis.integer_value(row)? {
        Some(k) => d.log_pdf(k as f64),
        None => 0.0,
    })
}

/// Integer value of `x`, if it has one.
fn as_integer(x: f64) -> Option<i64> {
    if x.fract() == 0.0 && x.abs() < 9.0e15 {
        Some(x as i64)
    } else {
        None
    }
}

// ── Bernoulli ──────────────────────────────────────────────────────────────

/// Success probability of a boolean variable.
#[derive(Debug, Clone)]
pub struct Bernoulli {
    p: f64,
    rng: StdRng,
}

impl Default for Bernoulli {
    fn default() -> Self {
        Self::new()
    }
}

impl Bernoulli {
    /// Unparameterized.
    pub fn new() -> Self {
        Self {
            p: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn with_p(p: f64) -> Result<Self> {
        let mut b = Self::new();
        b.set_parameters(p)?;
        Ok(b)
    }

    pub fn set_parameters(&mut self, p: f64) -> Result<()> {
        check_prob("bernoulli", p)?;
        self.p = p;
        Ok(())
    }

    pub fn p(&self) -> f64 {
        self.p
    }
}

impl Distribution for Bernoulli {
    fn name(&self) -> &'static str {
        "Bernoulli"
    }

    fn is_parameterized(&self) -> bool {
        !self.p.is_nan()
    }

    fn param_count(&self) -> usize {
        1
    }

    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let mut yes = 0.0;
        let mut total = 0.0;
        for (row, w) in analysis.sample().iter() {
            if let Some(b) = analysis.boolean_value(row)? {
                total += w;
                if b {
                    yes += w;
                }
            }
        }
        self.p = if total > 0.0 { yes / total } else { f64::NAN };
        Ok(())
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        Ok(match analysis.boolean_value(row)? {
            Some(true) => self.p.ln(),
            Some(false) => (1.0 - self.p).ln(),
            None => 0.0,
        })
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        close(self.p, other.p, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.p
    }
}

impl Univariate for Bernoulli {
    fn pdf(&self, x: f64) -> f64 {
        if x == 1.0 {
            self.p
        } else if x == 0.0 {
            1.0 - self.p
        } else {
            0.0
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            0.0
        } else if x < 1.0 {
            1.0 - self.p
        } else {
            1.0
        }
    }

    fn quantile(&self, q: f64) -> f64 {
        if !(0.0..=1.0).contains(&q) || self.p.is_nan() {
            f64::NAN
        } else if q <= 1.0 - self.p {
            0.0
        } else {
            1.0
        }
    }

    fn random(&mut self) -> f64 {
        let u: f64 = self.rng.gen();
        if u < self.p {
            1.0
        } else {
            0.0
        }
    }

    fn mean(&self) -> f64 {
        self.p
    }

    fn variance(&self) -> f64 {
        self.p * (1.0 - self.p)
    }
}

// ── Categorical ────────────────────────────────────────────────────────────

/// Probabilities of the categories of a nominal variable.
#[derive(Debug, Clone)]
pub struct Categorical {
    probs: Vec<f64>,
    cumulative: Vec<f64>,
    rng: StdRng,
}

impl Default for Categorical {
    fn default() -> Self {
        Self::new()
    }
}

impl Categorical {
    /// Unparameterized.
    pub fn new() -> Self {
        Self {
            probs: Vec::new(),
            cumulative: Vec::new(),
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn with_probs(probs: Vec<f64>) -> Result<Self> {
        let mut c = Self::new();
        c.set_parameters(probs)?;
        Ok(c)
    }

    /// # Errors
    ///
    /// Returns an error for an empty vector, a value outside [0, 1], or a sum
    /// differing from 1 by more than 1e-6.
    pub fn set_parameters(&mut self, probs: Vec<f64>) -> Result<()> {
        if probs.is_empty() {
            return Err(DmError::InvalidInput("categorical: no categories".into()));
        }
        for &p in &probs {
            check_prob("categorical", p)?;
        }
        let sum: f64 = probs.iter().sum();
        if (sum - 1.0).abs() > PROB_TOL {
            return Err(DmError::InvalidInput(format!(
                "categorical: probabilities sum to {}",
                sum
            )));
        }
        self.probs = probs;
        self.balance();
        Ok(())
    }

    /// Categorical over `lo..=hi` with masses taken from a discrete family.
    pub fn from_discrete<D: Univariate>(d: &D, lo: i64, hi: i64) -> Result<Self> {
        if hi < lo {
            return Err(DmError::InvalidInput(format!(
                "categorical: empty range {}..={}",
                lo, hi
            )));
        }
        let masses: Vec<f64> = (lo..=hi).map(|k| d.pdf(k as f64)).collect();
        let sum: f64 = masses.iter().sum();
        if !(sum > 0.0) || !sum.is_finite() {
            return Err(DmError::InvalidInput(
                "categorical: source has no mass in range".into(),
            ));
        }
        Self::with_probs(masses.into_iter().map(|m| m / sum).collect())
    }

    /// Rescale the probabilities to sum exactly to 1 and refresh the
    /// cumulative table.
    pub fn balance(&mut self) {
        let sum: f64 = self.probs.iter().sum();
        if sum > 0.0 {
            for p in &mut self.probs {
                *p /= sum;
            }
        }
        let mut acc = 0.0;
        self.cumulative = self
            .probs
            .iter()
            .map(|p| {
                acc += p;
                acc
            })
            .collect();
        if let Some(last) = self.cumulative.last_mut() {
            *last = 1.0;
        }
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn n_categories(&self) -> usize {
        self.probs.len()
    }

    /// The category with probability 1, if any.
    pub fn unique_category(&self) -> Option<usize> {
        self.probs.iter().position(|&p| p == 1.0)
    }

    /// Category with the highest probability (first on ties).
    pub fn most_probable(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &p) in self.probs.iter().enumerate() {
            if best.map_or(true, |b| p > self.probs[b]) {
                best = Some(i);
            }
        }
        best
    }

    /// Draw a category index.
    pub fn random_category(&mut self) -> usize {
        let u: f64 = self.rng.gen();
        self.cumulative
            .iter()
            .position(|&c| u < c)
            .unwrap_or(self.probs.len().saturating_sub(1))
    }
}

impl Distribution for Categorical {
    fn name(&self) -> &'static str {
        "Categorical"
    }

    fn is_parameterized(&self) -> bool {
        !self.probs.is_empty()
    }

    fn param_count(&self) -> usize {
        self.probs.len().saturating_sub(1)
    }

    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let k = analysis.n_categories()?;
        let mut counts = vec![0.0; k];
        for (row, w) in analysis.sample().iter() {
            if let Some(c) = analysis.category(row)? {
                counts[c] += w;
            }
        }
        let total: f64 = counts.iter().sum();
        if k == 0 || total <= 0.0 {
            self.probs.clear();
            self.cumulative.clear();
            return Ok(());
        }
        self.probs = counts;
        self.balance();
        Ok(())
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        if !self.is_parameterized() {
            return Ok(f64::NAN);
        }
        Ok(match analysis.category(row)? {
            Some(c) => self.probs.get(c).copied().unwrap_or(0.0).ln(),
            None => 0.0,
        })
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        self.probs.len() == other.probs.len()
            && self
                .probs
                .iter()
                .zip(&other.probs)
                .all(|(&a, &b)| close(a, b, delta))
    }

    fn sorting_value(&self) -> f64 {
        self.most_probable().map_or(f64::NAN, |i| i as f64)
    }
}

impl Univariate for Categorical {
    fn pdf(&self, x: f64) -> f64 {
        if !self.is_parameterized() {
            return f64::NAN;
        }
        match as_integer(x) {
            Some(k) if k >= 0 && (k as usize) < self.probs.len() => self.probs[k as usize],
            _ => 0.0,
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        if !self.is_parameterized() {
            return f64::NAN;
        }
        if x < 0.0 {
            return 0.0;
        }
        let k = x.floor() as usize;
        self.cumulative.get(k).copied().unwrap_or(1.0)
    }

    fn quantile(&self, q: f64) -> f64 {
        if !(0.0..=1.0).contains(&q) || !self.is_parameterized() {
            return f64::NAN;
        }
        self.cumulative
            .iter()
            .position(|&c| c >= q)
            .unwrap_or(self.probs.len() - 1) as f64
    }

    fn random(&mut self) -> f64 {
        self.random_category() as f64
    }

    fn mean(&self) -> f64 {
        self.probs.iter().enumerate().map(|(i, p)| i as f64 * p).sum()
    }

    fn variance(&self) -> f64 {
        let m = self.mean();
        self.probs
            .iter()
            .enumerate()
            .map(|(i, p)| p * (i as f64 - m).powi(2))
            .sum()
    }
}

// ── Binomial ───────────────────────────────────────────────────────────────

/// Binomial with a fixed number of trials `n`, optionally truncated to
/// `[lo, hi]` (the pmf is renormalised over the support).
#[derive(Debug, Clone)]
pub struct Binomial {
    n: u64,
    p: f64,
    lo: u64,
    hi: u64,
    ln_mass: f64,
    ln_coeffs: Vec<f64>,
    trial: Bernoulli,
}

const BINOMIAL_ITER_MAX: usize = 1000;
const BINOMIAL_TOL: f64 = 1e-5;

impl Binomial {
    /// Unparameterized, full support `0..=n`.
    pub fn new(n: u64) -> Self {
        let mut b = Self {
            n,
            p: f64::NAN,
            lo: 0,
            hi: n,
            ln_mass: 0.0,
            ln_coeffs: (0..=n)
                .map(|k| ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k))
                .collect(),
            trial: Bernoulli::new(),
        };
        b.set_seed(DEFAULT_SEED);
        b
    }

    /// Restrict the support to `lo..=hi`.
    pub fn truncated(n: u64, lo: u64, hi: u64) -> Result<Self> {
        if lo > hi || hi > n {
            return Err(DmError::InvalidInput(format!(
                "binomial: bad truncation {}..={} for n = {}",
                lo, hi, n
            )));
        }
        let mut b = Self::new(n);
        b.lo = lo;
        b.hi = hi;
        Ok(b)
    }

    pub fn set_parameters(&mut self, p: f64) -> Result<()> {
        check_prob("binomial", p)?;
        self.p = p;
        self.ln_mass = 0.0;
        if self.is_truncated() {
            let mass: f64 = (self.lo..=self.hi).map(|k| self.raw_log_pmf(k).exp()).sum();
            if !(mass > 0.0) {
                self.p = f64::NAN;
                return Ok(());
            }
            self.ln_mass = mass.ln();
        }
        self.trial.p = p;
        Ok(())
    }

    pub fn trials(&self) -> u64 {
        self.n
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    pub fn is_truncated(&self) -> bool {
        self.lo > 0 || self.hi < self.n
    }

    fn raw_log_pmf(&self, k: u64) -> f64 {
        self.ln_coeffs[k as usize] + xlogy(k as f64, self.p) + xlogy((self.n - k) as f64, 1.0 - self.p)
    }

    /// P(X = k) over the (possibly truncated) support.
    pub fn pmf(&self, k: u64) -> f64 {
        self.log_pmf(k).exp()
    }

    pub fn log_pmf(&self, k: u64) -> f64 {
        if self.p.is_nan() {
            return f64::NAN;
        }
        if k < self.lo || k > self.hi {
            return f64::NEG_INFINITY;
        }
        self.raw_log_pmf(k) - self.ln_mass
    }

    /// Mean of the untruncated score `x/p - (n-x)/(1-p)` over the support.
    fn truncation_score(&self, p: f64) -> f64 {
        let n = self.n as f64;
        let mut num = 0.0;
        let mut den = 0.0;
        for k in self.lo..=self.hi {
            let x = k as f64;
            let pmf = (self.ln_coeffs[k as usize] + xlogy(x, p) + xlogy(n - x, 1.0 - p)).exp();
            num += pmf * (x / p - (n - x) / (1.0 - p));
            den += pmf;
        }
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    }
}

impl Distribution for Binomial {
    fn name(&self) -> &'static str {
        "Binomial"
    }

    fn is_parameterized(&self) -> bool {
        !self.p.is_nan()
    }

    fn param_count(&self) -> usize {
        1
    }

    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let obs = weighted_integers(analysis, "binomial", self.lo as i64, Some(self.hi as i64))?;
        let w: f64 = obs.iter().map(|(_, w)| w).sum();
        self.p = f64::NAN;
        if w <= 0.0 || self.n == 0 {
            return Ok(());
        }
        let mean = obs.iter().map(|&(x, w)| x as f64 * w).sum::<f64>() / w;
        let n = self.n as f64;
        let mut p = mean / n;

        if self.is_truncated() && p > 0.0 && p < 1.0 {
            // Solve mean/p - (n-mean)/(1-p) = c(p), c being the expected score
            // over the support: c p² - (n + c) p + mean = 0.
            for _ in 0..BINOMIAL_ITER_MAX {
                let c = self.truncation_score(p);
                let b = n + c;
                let d = b * b - 4.0 * c * mean;
                if d < 0.0 || !c.is_finite() {
                    break;
                }
                let next = (2.0 * mean / (b + d.sqrt())).clamp(0.0, 1.0);
                let delta = (next - p).abs();
                p = next;
                if delta <= BINOMIAL_TOL || p <= 0.0 || p >= 1.0 {
                    break;
                }
            }
        }
        self.set_parameters(p.clamp(0.0, 1.0))
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        integer_row_log_density(self, analysis, row)
    }

    fn set_seed(&mut self, seed: u64) {
        self.trial.set_seed(seed.wrapping_add(1));
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        self.n == other.n && close(self.p, other.p, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.p
    }
}

impl Univariate for Binomial {
    fn pdf(&self, x: f64) -> f64 {
        match as_integer(x) {
            Some(k) if k >= 0 && k as u64 <= self.n => self.pmf(k as u64),
            _ if self.p.is_nan() => f64::NAN,
            _ => 0.0,
        }
    }

    fn log_pdf(&self, x: f64) -> f64 {
        match as_integer(x) {
            Some(k) if k >= 0 && k as u64 <= self.n => self.log_pmf(k as u64),
            _ if self.p.is_nan() => f64::NAN,
            _ => f64::NEG_INFINITY,
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        if self.p.is_nan() {
            return f64::NAN;
        }
        if x < self.lo as f64 {
            return 0.0;
        }
        if x >= self.hi as f64 {
            return 1.0;
        }
        let top = x.floor() as u64;
        // Sum the shorter tail.
        if top - self.lo <= self.hi - top {
            (self.lo..=top).map(|k| self.pmf(k)).sum::<f64>().min(1.0)
        } else {
            (1.0 - ((top + 1)..=self.hi).map(|k| self.pmf(k)).sum::<f64>()).max(0.0)
        }
    }

    fn quantile(&self, q: f64) -> f64 {
        if !(0.0..=1.0).contains(&q) || self.p.is_nan() {
            return f64::NAN;
        }
        let mut acc = 0.0;
        for k in self.lo..=self.hi {
            acc += self.pmf(k);
            if acc >= q - 1e-12 {
                return k as f64;
            }
        }
        self.hi as f64
    }

    fn random(&mut self) -> f64 {
        // Rejection for truncated supports; bounded number of attempts.
        let mut k = 0;
        for _ in 0..10_000 {
            k = (0..self.n).filter(|_| self.trial.random() == 1.0).count() as u64;
            if k >= self.lo && k <= self.hi {
                return k as f64;
            }
        }
        k.clamp(self.lo, self.hi) as f64
    }

    fn mean(&self) -> f64 {
        if !self.is_truncated() {
            return self.n as f64 * self.p;
        }
        (self.lo..=self.hi).map(|k| k as f64 * self.pmf(k)).sum()
    }

    fn variance(&self) -> f64 {
        if !self.is_truncated() {
            return self.n as f64 * self.p * (1.0 - self.p);
        }
        let m = self.mean();
        (self.lo..=self.hi)
            .map(|k| (k as f64 - m).powi(2) * self.pmf(k))
            .sum()
    }
}

// ── Geometric ──────────────────────────────────────────────────────────────

/// Number of trials up to and including the first success, support `{1, 2, ...}`.
#[derive(Debug, Clone)]
pub struct Geometric {
    p: f64,
    rng: StdRng,
}

impl Default for Geometric {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometric {
    pub fn new() -> Self {
        Self {
            p: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    pub fn with_p(p: f64) -> Result<Self> {
        let mut g = Self::new();
        g.set_parameters(p)?;
        Ok(g)
    }

    /// # Errors
    ///
    /// Returns an error unless `0 < p <= 1`.
    pub fn set_parameters(&mut self, p: f64) -> Result<()> {
        if !(p > 0.0 && p <= 1.0) {
            return Err(DmError::InvalidInput(format!(
                "geometric: probability {} not in (0, 1]",
                p
            )));
        }
        self.p = p;
        Ok(())
    }

    pub fn p(&self) -> f64 {
        self.p
    }
}

impl Distribution for Geometric {
    fn name(&self) -> &'static str {
        "Geometric"
    }

    fn is_parameterized(&self) -> bool {
        !self.p.is_nan()
    }

    fn param_count(&self) -> usize {
        1
    }

    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let obs = weighted_integers(analysis, "geometric", 1, None)?;
        let w: f64 = obs.iter().map(|(_, w)| w).sum();
        let s: f64 = obs.iter().map(|&(x, w)| x as f64 * w).sum();
        self.p = if w > 0.0 { w / s } else { f64::NAN };
        Ok(())
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        integer_row_log_density(self, analysis, row)
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        close(self.p, other.p, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.p
    }
}

impl Univariate for Geometric {
    fn pdf(&self, x: f64) -> f64 {
        self.log_pdf(x).exp()
    }

    fn log_pdf(&self, x: f64) -> f64 {
        if self.p.is_nan() {
            return f64::NAN;
        }
        match as_integer(x) {
            Some(k) if k >= 1 => self.p.ln() + xlogy((k - 1) as f64, 1.0 - self.p),
            _ => f64::NEG_INFINITY,
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        if self.p.is_nan() {
            return f64::NAN;
        }
        if x < 1.0 {
            return 0.0;
        }
        1.0 - (1.0 - self.p).powf(x.floor())
    }

    fn quantile(&self, q: f64) -> f64 {
        if !(0.0..=1.0).contains(&q) || self.p.is_nan() {
            return f64::NAN;
        }
        if q == 1.0 {
            return if self.p == 1.0 { 1.0 } else { f64::INFINITY };
        }
        if self.p == 1.0 || q == 0.0 {
            return 1.0;
        }
        let k = ((1.0 - q).ln() / (1.0 - self.p).ln()).ceil().max(1.0);
        // Guard against rounding just above an integer boundary.
        if k > 1.0 && self.cdf(k - 1.0) >= q {
            k - 1.0
        } else {
            k
        }
    }

    fn random(&mut self) -> f64 {
        let u = open_unit(&mut self.rng);
        self.quantile(u)
    }

    fn mean(&self) -> f64 {
        1.0 / self.p
    }

    fn variance(&self) -> f64 {
        (1.0 - self.p) / (self.p * self.p)
    }
}

// ── Zipf ───────────────────────────────────────────────────────────────────

/// Power law `P(x) ∝ x^{-α}` over the integers `lo..=hi` (`hi` unbounded by
/// default, which requires `α > 1`).
#[derive(Debug, Clone)]
pub struct Zipf {
    alpha: f64,
    lo: u64,
    hi: Option<u64>,
    ln_c: f64,
    rng: StdRng,
}

const ZIPF_ALPHA_MIN: f64 = 1.0 + 1e-5;
const ZIPF_ALPHA_MAX: f64 = 10.0;
const ZIPF_TOL: f64 = 1e-3;

impl Default for Zipf {
    fn default() -> Self {
        Self::new()
    }
}

impl Zipf {
    /// Unparameterized, support `{1, 2, ...}`.
    pub fn new() -> Self {
        Self {
            alpha: f64::NAN,
            lo: 1,
            hi: None,
            ln_c: f64::NAN,
            rng: seeded_rng(DEFAULT_SEED),
        }
    }

    /// Support `lo..=hi` (`hi = None` for unbounded), `lo >= 1`.
    pub fn with_support(lo: u64, hi: Option<u64>) -> Result<Self> {
        if lo == 0 || hi.map_or(false, |h| h < lo) {
            return Err(DmError::InvalidInput(format!(
                "zipf: bad support {}..{:?}",
                lo, hi
            )));
        }
        let mut z = Self::new();
        z.lo = lo;
        z.hi = hi;
        Ok(z)
    }

    /// # Errors
    ///
    /// Returns an error if `alpha` is not finite, or not above 1 on an
    /// unbounded support.
    pub fn set_parameters(&mut self, alpha: f64) -> Result<()> {
        if !alpha.is_finite() || (self.hi.is_none() && alpha <= 1.0) {
            return Err(DmError::InvalidInput(format!(
                "zipf: exponent {} not allowed",
                alpha
            )));
        }
        let (z, _) = zeta_sums(alpha, self.lo, self.hi);
        if !(z > 0.0) || !z.is_finite() {
            self.alpha = f64::NAN;
            self.ln_c = f64::NAN;
            return Ok(());
        }
        self.alpha = alpha;
        self.ln_c = -z.ln();
        Ok(())
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Upper tail mass `P(X >= k)`.
    fn tail(&self, k: u64) -> f64 {
        zeta_sums(self.alpha, k, self.hi).0 * self.ln_c.exp()
    }
}

impl Distribution for Zipf {
    fn name(&self) -> &'static str {
        "Zipf"
    }

    fn is_parameterized(&self) -> bool {
        !self.alpha.is_nan()
    }

    fn param_count(&self) -> usize {
        1
    }

    fn estimate(&mut self, analysis: &Analysis<'_>) -> Result<()> {
        let obs = weighted_integers(analysis, "zipf", self.lo as i64, self.hi.map(|h| h as i64))?;
        let w: f64 = obs.iter().map(|(_, w)| w).sum();
        self.alpha = f64::NAN;
        self.ln_c = f64::NAN;
        if w <= 0.0 {
            return Ok(());
        }
        // E_α[ln X] decreases in α; match it to the sample mean of ln x.
        let goal = obs.iter().map(|&(x, w)| (x as f64).ln() * w).sum::<f64>() / w;
        let (lo, hi) = (self.lo, self.hi);
        let moment = |alpha: f64| {
            let (z, zl) = zeta_sums(alpha, lo, hi);
            zl / z - goal
        };
        match bisect_clamped(moment, ZIPF_ALPHA_MIN, ZIPF_ALPHA_MAX, RootOptions::with_tol(ZIPF_TOL))
        {
            Some(alpha) => self.set_parameters(alpha),
            None => Ok(()),
        }
    }

    fn log_density_row(&self, analysis: &Analysis<'_>, row: usize) -> Result<f64> {
        integer_row_log_density(self, analysis, row)
    }

    fn set_seed(&mut self, seed: u64) {
        self.rng = seeded_rng(seed);
    }

    fn similar(&self, other: &Self, delta: f64) -> bool {
        self.lo == other.lo && self.hi == other.hi && close(self.alpha, other.alpha, delta)
    }

    fn sorting_value(&self) -> f64 {
        self.alpha
    }
}

impl Univariate for Zipf {
    fn pdf(&self, x: f64) -> f64 {
        self.log_pdf(x).exp()
    }

    fn log_pdf(&self, x: f64) -> f64 {
        if self.alpha.is_nan() {
            return f64::NAN;
        }
        match as_integer(x) {
            Some(k) if k >= self.lo as i64 && self.hi.map_or(true, |h| k <= h as i64) => {
                self.ln_c - self.alpha * x.ln()
            }
            _ => f64::NEG_INFINITY,
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        if self.alpha.is_nan() {
            return f64::NAN;
        }
        if x < self.lo as f64 {
            return 0.0;
        }
        if self.hi.map_or(false, |h| x >= h as f64) {
            return 1.0;
        }
        (1.0 - self.tail(x.floor() as u64 + 1)).clamp(0.0, 1.0)
    }

    fn quantile(&self, q: f64) -> f64 {
        if !(0.0..=1.0).contains(&q) || self.alpha.is_nan() {
            return f64::NAN;
        }
        let c = self.ln_c.exp();
        let last = self.hi.unwrap_or(self.lo.saturating_add(QUANTILE_STEPS_MAX));
        let mut acc = 0.0;
        for k in self.lo..=last {
            acc += c * (k as f64).powf(-self.alpha);
            if acc >= q - 1e-12 {
                return k as f64;
            }
        }
        last as f64
    }

    fn random(&mut self) -> f64 {
        let u = open_unit(&mut self.rng);
        self.quantile(u)
    }

    fn mean(&self) -> f64 {
        if self.hi.is_none() && self.alpha <= 2.0 {
            return f64::INFINITY;
        }
        zeta_sums(self.alpha - 1.0, self.lo, self.hi).0 * self.ln_c.exp()
    }

    fn variance(&self) -> f64 {
        if self.hi.is_none() && self.alpha <= 3.0 {
            return f64::INFINITY;
        }
        let m = self.mean();
        zeta_sums(self.alpha - 2.0, self.lo, self.hi).0 * self.ln_c.exp() - m * m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::test_util::lcg;
    use dmkit_core::{BoolColumn, IntColumn, NominalColumn, Sample};

    const TOL: f64 = 1e-6;

    fn ints(name: &str, values: &[i64]) -> IntColumn {
        IntColumn::new(name, values.iter().map(|&v| Some(v)).collect())
    }

    #[test]
    fn bernoulli_estimate_weighted() {
        let col = BoolColumn::new("b", vec![Some(true), Some(false), Some(true), None]);
        let sample = Sample::new(vec![1.0, 2.0, 1.0, 5.0]).unwrap();
        let a = Analysis::boolean(sample, &col).unwrap();
        let mut b = Bernoulli::new();
        b.estimate(&a).unwrap();
        assert!((b.p() - 0.5).abs() < TOL);
        assert_eq!(b.log_density_row(&a, 3).unwrap(), 0.0);
        assert!(Bernoulli::with_p(1.2).is_err());
    }

    #[test]
    fn bernoulli_all_missing_is_unparameterized() {
        let col = BoolColumn::new("b", vec![None, None]);
        let a = Analysis::boolean(Sample::uniform(2), &col).unwrap();
        let mut b = Bernoulli::with_p(0.3).unwrap();
        b.estimate(&a).unwrap();
        assert!(!b.is_parameterized());
    }

    #[test]
    fn categorical_probabilities_sum_to_one() {
        let col = NominalColumn::from_labels("c", &[Some("a"), Some("b"), Some("a"), Some("c")]);
        let a = Analysis::nominal(Sample::new(vec![1.0, 1.0, 2.0, 0.5]).unwrap(), &col).unwrap();
        let mut c = Categorical::new();
        c.estimate(&a).unwrap();
        let sum: f64 = c.probs().iter().sum();
        assert!((sum - 1.0).abs() < TOL);
        assert!((c.probs()[0] - 3.0 / 4.5).abs() < TOL);
        assert_eq!(c.param_count(), 2);
        assert_eq!(c.most_probable(), Some(0));
        assert_eq!(c.quantile(0.0), 0.0);
        assert_eq!(c.quantile(1.0), 2.0);
    }

    #[test]
    fn categorical_rejects_bad_probabilities() {
        assert!(Categorical::with_probs(vec![0.5, 0.4]).is_err());
        assert!(Categorical::with_probs(vec![]).is_err());
        assert!(Categorical::with_probs(vec![1.5, -0.5]).is_err());
        let c = Categorical::with_probs(vec![0.0, 1.0]).unwrap();
        assert_eq!(c.unique_category(), Some(1));
    }

    #[test]
    fn categorical_recovers_probabilities() {
        let truth = [0.2, 0.5, 0.3];
        let mut gen = Categorical::with_probs(truth.to_vec()).unwrap();
        gen.set_seed(7);
        let n = 20_000;
        let labels: Vec<Option<String>> = (0..n)
            .map(|_| Some(format!("k{}", gen.random_category())))
            .collect();
        let col = NominalColumn::from_labels("c", &labels);
        let a = Analysis::nominal(Sample::uniform(n), &col).unwrap();
        let mut fit = Categorical::new();
        fit.estimate(&a).unwrap();
        let tol = 4.0 / (n as f64).sqrt();
        for (k, &p) in truth.iter().enumerate() {
            let idx = col.find_category(&format!("k{}", k)).unwrap();
            assert!((fit.probs()[idx] - p).abs() < tol, "k={} p={}", k, fit.probs()[idx]);
        }
    }

    #[test]
    fn categorical_from_discrete() {
        let mut b = Binomial::new(4);
        b.set_parameters(0.5).unwrap();
        let c = Categorical::from_discrete(&b, 0, 4).unwrap();
        assert!((c.probs()[2] - 6.0 / 16.0).abs() < TOL);
    }

    #[test]
    fn binomial_pmf_and_cdf() {
        let mut b = Binomial::new(10);
        b.set_parameters(0.5).unwrap();
        assert!((b.pmf(5) - 0.24609375).abs() < 1e-9);
        let sum: f64 = (0..=10).map(|k| b.pmf(k)).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((b.cdf(5.0) - 0.623046875).abs() < 1e-9);
        assert_eq!(b.cdf(-1.0), 0.0);
        assert_eq!(b.cdf(10.0), 1.0);
        assert_eq!(b.quantile(0.5), 5.0);
        assert_eq!(b.pdf(2.5), 0.0);
    }

    #[test]
    fn binomial_estimate_full_support() {
        let col = ints("k", &[2, 3, 4, 3]);
        let a = Analysis::integer(Sample::uniform(4), &col).unwrap();
        let mut b = Binomial::new(10);
        b.estimate(&a).unwrap();
        assert!((b.p() - 0.3).abs() < TOL);
        let bad = ints("k", &[11]);
        let a = Analysis::integer(Sample::uniform(1), &bad).unwrap();
        assert!(b.estimate(&a).is_err());
    }

    #[test]
    fn binomial_truncated_estimate_matches_mean() {
        // With support 1..=n the fitted truncated mean equals the sample mean.
        let col = ints("k", &[1, 1, 2, 1, 3, 1, 2]);
        let a = Analysis::integer(Sample::uniform(7), &col).unwrap();
        let mut b = Binomial::truncated(5, 1, 5).unwrap();
        b.estimate(&a).unwrap();
        assert!(b.is_parameterized());
        let sample_mean = 11.0 / 7.0;
        assert!((b.mean() - sample_mean).abs() < 1e-3, "mean={}", b.mean());
        assert!(b.p() < sample_mean / 5.0);
        let total: f64 = (1..=5).map(|k| b.pmf(k)).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(b.pmf(0), 0.0);
    }

    #[test]
    fn binomial_random_is_reproducible() {
        let mut a = Binomial::new(20);
        a.set_parameters(0.4).unwrap();
        let mut b = a.clone();
        a.set_seed(11);
        b.set_seed(11);
        assert_eq!(a.simulate(50), b.simulate(50));
        let draws = a.simulate(2000);
        let mean = draws.iter().sum::<f64>() / 2000.0;
        assert!((mean - 8.0).abs() < 0.3, "mean={}", mean);
    }

    #[test]
    fn geometric_estimate_and_quantile() {
        let col = ints("k", &[1, 2, 3, 4]);
        let a = Analysis::integer(Sample::uniform(4), &col).unwrap();
        let mut g = Geometric::new();
        g.estimate(&a).unwrap();
        assert!((g.p() - 0.4).abs() < TOL);
        assert!((g.pdf(2.0) - 0.4 * 0.6).abs() < TOL);
        for &q in &[0.1, 0.4, 0.64, 0.9] {
            let k = g.quantile(q);
            assert!(g.cdf(k) >= q - 1e-12);
            assert!(k == 1.0 || g.cdf(k - 1.0) < q);
        }
        let zero = ints("k", &[0]);
        let a = Analysis::integer(Sample::uniform(1), &zero).unwrap();
        assert!(g.estimate(&a).is_err());
    }

    #[test]
    fn zipf_round_trip() {
        let mut truth = Zipf::new();
        truth.set_parameters(2.5).unwrap();
        let draws: Vec<i64> = lcg(5000, 3)
            .into_iter()
            .map(|u| truth.quantile(u.max(1e-12)) as i64)
            .collect();
        let col = ints("k", &draws);
        let a = Analysis::integer(Sample::uniform(draws.len()), &col).unwrap();
        let mut fit = Zipf::new();
        fit.estimate(&a).unwrap();
        assert!((fit.alpha() - 2.5).abs() < 0.1, "alpha={}", fit.alpha());
        let mass: f64 = (1..2000).map(|k| fit.pdf(k as f64)).sum();
        assert!(mass > 0.99 && mass <= 1.0 + 1e-9);
        assert!((fit.cdf(1.0) - fit.pdf(1.0)).abs() < 1e-9);
    }

    #[test]
    fn zipf_all_at_lower_bound_clamps() {
        let col = ints("k", &[1, 1, 1]);
        let a = Analysis::integer(Sample::uniform(3), &col).unwrap();
        let mut z = Zipf::new();
        z.estimate(&a).unwrap();
        assert!((z.alpha() - 10.0).abs() < 1e-2);
        assert!(Zipf::with_support(0, None).is_err());
        assert!(Zipf::new().set_parameters(1.0).is_err());
    }

    #[test]
    fn bounded_zipf_mass() {
        let mut z = Zipf::with_support(2, Some(6)).unwrap();
        z.set_parameters(0.5).unwrap();
        let total: f64 = (2..=6).map(|k| z.pdf(k as f64)).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(z.cdf(6.0), 1.0);
        assert_eq!(z.pdf(7.0), 0.0);
    }
}
