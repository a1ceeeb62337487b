/// Number of permuted statistics at least as extreme as the observed one.
///
/// Ties count against the null (`>=`).
#[inline]
pub fn count_at_least(observed: f64, permuted: &[f64]) -> usize {
    permuted.iter().filter(|&&p| p >= observed).count()
}

/// Empirical tail probability with `+1` smoothing in numerator and denominator.
///
/// The result is always in `(0, 1]`: with no permuted values it is exactly 1, and if
/// every permuted value falls strictly below `observed` it is `1 / (P + 1)`.
#[inline]
pub fn tail_probability(observed: f64, permuted: &[f64]) -> f64 {
    (count_at_least(observed, permuted) as f64 + 1.0) / (permuted.len() as f64 + 1.0)
}
