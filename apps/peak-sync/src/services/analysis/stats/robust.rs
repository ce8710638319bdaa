use statrs::statistics::Statistics;

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

/// Linearly interpolated quantile of the finite values; `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = finite(values);
    sorted.sort_by(f64::total_cmp);
    let last = sorted.len().checked_sub(1)?;

    let rank = q * last as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(last);
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    let finite = finite(values);
    (!finite.is_empty()).then(|| finite.iter().mean())
}

/// Sample standard deviation (n - 1 denominator); needs two finite values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let finite = finite(values);
    (finite.len() >= 2).then(|| finite.iter().std_dev())
}

pub fn max(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .max_by(f64::total_cmp)
}

pub fn min(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .min_by(f64::total_cmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_and_odd_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn quantile_interpolates_between_ranks() {
        let values = [50.0, 10.0, 40.0, 20.0, 30.0];
        assert_eq!(quantile(&values, 0.0), Some(10.0));
        assert_eq!(quantile(&values, 1.0), Some(50.0));
        assert!((quantile(&values, 0.9).unwrap() - 46.0).abs() < 1e-9);
        assert_eq!(quantile(&values, 1.5), None);
        assert_eq!(quantile(&[7.0], 0.3), Some(7.0));
    }

    #[test]
    fn std_dev_uses_sample_denominator() {
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(std_dev(&[3.0]), None);
    }

    #[test]
    fn non_finite_values_are_ignored() {
        assert_eq!(mean(&[1.0, f64::NAN, 3.0]), Some(2.0));
        assert_eq!(max(&[1.0, f64::NAN, 3.0]), Some(3.0));
        assert_eq!(min(&[f64::INFINITY, 4.0, 3.0]), Some(3.0));
        assert_eq!(max(&[f64::NAN]), None);
        assert_eq!(mean(&[]), None);
    }
}
