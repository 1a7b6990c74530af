/// Control mechanics: damped (convex) updates.

/// Damped update: x' = damping * target + (1 - damping) * x.
/// `damping = 1` returns `target` unchanged.
#[inline]
pub fn damp(x: f64, target: f64, damping: f64) -> f64 {
    damping * target + (1.0 - damping) * x
}

/// Elementwise [`damp`] over two equally long slices.
pub fn damp_all(old: &[f64], new: &[f64], damping: f64) -> Vec<f64> {
    old.iter()
        .zip(new)
        .map(|(&x, &target)| damp(x, target, damping))
        .collect()
}
