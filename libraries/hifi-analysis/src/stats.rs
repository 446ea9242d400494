//! Small statistics helpers shared by the analysis stages

/// Arithmetic mean; NaN for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; NaN for an empty slice
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Median (mean of the middle pair for even counts); NaN for an empty slice
///
/// NaN inputs propagate to the result.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Coefficient of variation (standard deviation over mean)
///
/// A zero-mean set is perfectly consistent when it has no spread and
/// infinitely inconsistent otherwise.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    let sd = std_dev(values);
    if m == 0.0 {
        if sd == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        sd / m
    }
}

/// Convert a power value to dB (`10 * log10(power)`)
pub fn power_to_db(power: f64) -> f64 {
    10.0 * power.log10()
}

/// Index of the frequency closest to `target_hz`
///
/// Ties resolve to the lower index. Returns `None` for an empty list.
pub fn closest_index(frequencies: &[f64], target_hz: f64) -> Option<usize> {
    frequencies
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - target_hz).abs().total_cmp(&(*b - target_hz).abs()))
        .map(|(i, _)| i)
}
