/// Convergence mechanics: change metrics and finiteness guards.

/// Largest absolute componentwise difference; 0 for empty slices.
#[inline]
pub fn max_abs_change(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// First `(index, value)` that is NaN or infinite.
#[inline]
pub fn first_non_finite(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .find(|(_, v)| !v.is_finite())
}

/// Strict tolerance test used by the loop: `change < tol`.
#[inline]
pub fn within(change: f64, tol: f64) -> bool {
    change < tol
}
