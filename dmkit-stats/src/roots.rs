//! Bracketing root finders for scalar functions.
//!
//! Non-convergence is not an error here: estimators that cannot bracket a
//! root leave their distribution unparameterized, so the finders report
//! failure as `None`.

/// Options for [`bisect`].
#[derive(Debug, Clone, Copy)]
pub struct RootOptions {
    /// Absolute width of the final bracket.
    pub tol: f64,
    /// Iteration cap.
    pub max_iter: usize,
}

impl Default for RootOptions {
    fn default() -> Self {
        Self {
            tol: 1e-10,
            max_iter: 200,
        }
    }
}

impl RootOptions {
    pub fn with_tol(tol: f64) -> Self {
        Self {
            tol,
            ..Self::default()
        }
    }
}

/// Bisection on `[a, b]`.
///
/// Returns `None` when `a > b`, when an endpoint evaluates to NaN, or when
/// `f(a)` and `f(b)` have the same strict sign. After `max_iter` halvings the
/// midpoint of the remaining bracket is returned.
pub fn bisect<F>(f: F, a: f64, b: f64, options: RootOptions) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    if a > b || a.is_nan() || b.is_nan() {
        return None;
    }
    let fa = f(a);
    let fb = f(b);
    if fa.is_nan() || fb.is_nan() {
        return None;
    }
    if fa == 0.0 {
        return Some(a);
    }
    if fb == 0.0 {
        return Some(b);
    }
    if (fa > 0.0) == (fb > 0.0) {
        return None;
    }

    let mut left = a;
    let mut right = b;
    let mut f_left = fa;
    for _ in 0..options.max_iter {
        let mid = 0.5 * (left + right);
        if right - left <= options.tol {
            return Some(mid);
        }
        let f_mid = f(mid);
        if f_mid == 0.0 {
            return Some(mid);
        }
        if (f_mid > 0.0) == (f_left > 0.0) {
            left = mid;
            f_left = f_mid;
        } else {
            right = mid;
        }
    }
    Some(0.5 * (left + right))
}

/// Like [`bisect`], but without a sign change returns the endpoint where
/// `|f|` is smaller. `None` only for NaN endpoints or an inverted interval.
pub fn bisect_clamped<F>(f: F, a: f64, b: f64, options: RootOptions) -> Option<f64>
where
    F: Fn(f64) -> f64,
{
    if let Some(root) = bisect(&f, a, b, options) {
        return Some(root);
    }
    if a > b {
        return None;
    }
    let fa = f(a);
    let fb = f(b);
    if fa.is_nan() || fb.is_nan() {
        return None;
    }
    Some(if fa.abs() <= fb.abs() { a } else { b })
}
