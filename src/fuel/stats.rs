/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bessel-corrected sample standard deviation. A single value has no spread.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.;
    }
    let avg = mean(values);
    let sum_sq = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Mean of the values that fall within one sample standard deviation of the raw mean.
///
/// Returns 0 for an empty input, or when nothing survives the filter (only possible
/// when the input contains non-finite values).
pub fn filtered_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.;
    }

    let avg = mean(values);
    let std_dev = sample_std_dev(values);
    let (min, max) = (avg - std_dev, avg + std_dev);

    let kept = values
        .iter()
        .copied()
        .filter(|v| *v >= min && *v <= max)
        .collect::<Vec<f64>>();

    mean(&kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_filtered_mean_empty() {
        assert_eq!(filtered_mean(&[]), 0.);
    }

    #[test]
    fn test_filtered_mean_single_value() {
        assert_eq!(filtered_mean(&[3.7]), 3.7);
    }

    #[test]
    fn test_filtered_mean_drops_outlier() {
        let avg = filtered_mean(&[3.0, 3.2, 9.0]);
        assert!((avg - 3.1).abs() < 1e-9, "got {avg}");
    }

    #[test]
    fn test_filtered_mean_identical_values() {
        assert!((filtered_mean(&[2.5, 2.5, 2.5, 2.5]) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_filtered_mean_two_values_keeps_both() {
        // with n = 2 both values sit exactly sd/sqrt(2) from the mean
        assert!((filtered_mean(&[2.0, 4.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_filtered_mean_is_idempotent() {
        let values = [2.9, 3.1, 3.0, 5.6, 3.05, 0.4];
        assert_eq!(filtered_mean(&values), filtered_mean(&values));
    }

    #[test]
    fn test_sample_std_dev() {
        assert_eq!(sample_std_dev(&[]), 0.);
        assert_eq!(sample_std_dev(&[1.0]), 0.);
        // 2, 4, 4, 4, 5, 5, 7, 9 -> sample variance 32 / 7
        let sd = sample_std_dev(&[2., 4., 4., 4., 5., 5., 7., 9.]);
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_filtered_mean_within_bounds(
            values in prop::collection::vec(0.0f64..50.0, 1..40),
        ) {
            let avg = filtered_mean(&values);
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(avg >= min - 1e-9);
            prop_assert!(avg <= max + 1e-9);
        }

        #[test]
        fn prop_filtered_mean_single_element(value in -100.0f64..100.0) {
            prop_assert_eq!(filtered_mean(&[value]), value);
        }
    }
}
