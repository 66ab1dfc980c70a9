pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Log-scaled normalization of `value` against an observed [min, max]
/// range, in [0,1]. Defined as exactly 0.5 when the range is degenerate
/// (max <= min) so single-point batches score neutrally.
pub fn log_norm(value: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return 0.5;
    }
    let numerator = (1.0 + value).ln() - (1.0 + min).ln();
    let denominator = (1.0 + max).ln() - (1.0 + min).ln();
    clamp(numerator / denominator, 0.0, 1.0)
}

pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_norm_is_half_for_degenerate_ranges() {
        assert_eq!(log_norm(100.0, 100.0, 100.0), 0.5);
        assert_eq!(log_norm(0.0, 7.0, 7.0), 0.5);
        assert_eq!(log_norm(1e9, 50.0, 10.0), 0.5);
    }

    #[test]
    fn log_norm_clamps_to_unit_interval() {
        assert_eq!(log_norm(0.0, 10.0, 1000.0), 0.0);
        assert_eq!(log_norm(1e12, 10.0, 1000.0), 1.0);
        let mid = log_norm(100.0, 10.0, 1000.0);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
