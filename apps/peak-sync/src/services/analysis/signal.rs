use crate::error::{AnalysisError, AnalysisResult};
use serde::Serialize;

/// Centered rolling mean over a step-aligned series.
///
/// Step `i` averages the present values in `[i - window/2, i + (window - 1)/2]`, clipped to
/// the series bounds, and is `None` when fewer than `min_periods` values are present.
pub fn rolling_mean_centered(
    values: &[Option<f64>],
    window: usize,
    min_periods: usize,
) -> AnalysisResult<Vec<Option<f64>>> {
    if window == 0 {
        return Err(AnalysisError::invalid_parameter(
            "window",
            "rolling window must be at least 1",
        ));
    }
    let min_periods = min_periods.clamp(1, window);
    let offset = (window - 1) / 2;
    let len = values.len();

    let out = (0..len)
        .map(|i| {
            let end = (i + 1 + offset).min(len);
            let start = (i + 1 + offset).saturating_sub(window);
            let mut sum = 0.0;
            let mut count = 0_usize;
            for value in values[start..end].iter().flatten() {
                if value.is_finite() {
                    sum += value;
                    count += 1;
                }
            }
            (count >= min_periods).then(|| sum / count as f64)
        })
        .collect();
    Ok(out)
}

/// Short-term relative rate of change with an explicit definedness mask.
///
/// `values[t]` is meaningful only where `defined[t]` is true; undefined steps hold `0.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateOfChange {
    pub values: Vec<f64>,
    pub defined: Vec<bool>,
}

impl RateOfChange {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        match self.defined.get(idx) {
            Some(true) => self.values.get(idx).copied(),
            _ => None,
        }
    }

    pub fn defined_count(&self) -> usize {
        self.defined.iter().filter(|d| **d).count()
    }
}

/// Relative step change of the `trend_window` centered mean of an already smoothed series.
///
/// The trend mean needs a full window, so the first and last `trend_window / 2` steps are
/// undefined. A step is also undefined when either operand is missing or the previous
/// level is zero.
pub fn rate_of_change(smoothed: &[Option<f64>], trend_window: usize) -> AnalysisResult<RateOfChange> {
    let trend = rolling_mean_centered(smoothed, trend_window, trend_window)?;
    let mut values = vec![0.0; trend.len()];
    let mut defined = vec![false; trend.len()];
    for t in 1..trend.len() {
        let (Some(prev), Some(curr)) = (trend[t - 1], trend[t]) else {
            continue;
        };
        if prev == 0.0 {
            continue;
        }
        let change = (curr - prev) / prev;
        if change.is_finite() {
            values[t] = change;
            defined[t] = true;
        }
    }
    Ok(RateOfChange { values, defined })
}

fn sign(value: f64) -> i8 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

/// Percentage of steps where both rates are defined and share a sign (zero counts as its own
/// sign). `None` when no step is defined on both sides.
pub fn trend_synchrony(a: &RateOfChange, b: &RateOfChange) -> Option<f64> {
    let steps = a.len().min(b.len());
    let mut compared = 0_u64;
    let mut agreeing = 0_u64;
    for t in 0..steps {
        let (Some(x), Some(y)) = (a.get(t), b.get(t)) else {
            continue;
        };
        compared += 1;
        if sign(x) == sign(y) {
            agreeing += 1;
        }
    }
    if compared == 0 {
        return None;
    }
    Some(agreeing as f64 / compared as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn centered_window_is_clipped_at_edges() {
        let smoothed = rolling_mean_centered(&present(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3, 1).unwrap();
        assert_eq!(
            smoothed,
            vec![Some(1.5), Some(2.0), Some(3.0), Some(4.0), Some(4.5)]
        );
    }

    #[test]
    fn even_window_leans_one_step_back() {
        // window 4 covers [i-2, i+1]
        let smoothed = rolling_mean_centered(&present(&[0.0, 0.0, 4.0, 0.0, 0.0]), 4, 1).unwrap();
        assert_eq!(smoothed[1], Some(4.0 / 3.0));
        assert_eq!(smoothed[3], Some(1.0));
        assert_eq!(smoothed[4], Some(4.0 / 3.0));
    }

    #[test]
    fn min_periods_masks_sparse_windows() {
        let values = vec![Some(1.0), None, None, None, Some(5.0)];
        let smoothed = rolling_mean_centered(&values, 3, 2).unwrap();
        assert_eq!(smoothed, vec![None, None, None, None, None]);
        let smoothed = rolling_mean_centered(&values, 3, 1).unwrap();
        assert_eq!(smoothed, vec![Some(1.0), Some(1.0), None, Some(5.0), Some(5.0)]);
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(rolling_mean_centered(&present(&[1.0]), 0, 1).is_err());
    }

    #[test]
    fn rate_of_change_masks_boundary_steps() {
        let smoothed = present(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let rate = rate_of_change(&smoothed, 3).unwrap();
        assert_eq!(
            rate.defined,
            vec![false, false, true, true, true, true, false]
        );
        assert!((rate.get(2).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(rate.get(0), None);
    }

    #[test]
    fn rate_of_change_skips_zero_base() {
        let smoothed = present(&[0.0, 0.0, 0.0, 2.0, 4.0]);
        let rate = rate_of_change(&smoothed, 1).unwrap();
        assert_eq!(rate.defined, vec![false, false, false, false, true]);
        assert_eq!(rate.get(4), Some(1.0));
    }

    #[test]
    fn trend_synchrony_only_counts_steps_defined_on_both_sides() {
        let a = RateOfChange {
            values: vec![0.0, 0.1, -0.2, 0.3, 0.0],
            defined: vec![false, true, true, true, true],
        };
        let b = RateOfChange {
            values: vec![0.5, 0.2, 0.4, 0.0, 0.0],
            defined: vec![true, true, true, false, true],
        };
        // compared steps 1, 2, 4 -> agree at 1 (+,+) and 4 (0,0)
        let pct = trend_synchrony(&a, &b).unwrap();
        assert!((pct - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn trend_synchrony_is_undefined_without_overlap() {
        let a = RateOfChange {
            values: vec![0.1, 0.0],
            defined: vec![true, false],
        };
        let b = RateOfChange {
            values: vec![0.0, 0.1],
            defined: vec![false, true],
        };
        assert_eq!(trend_synchrony(&a, &b), None);
    }

    #[test]
    fn identical_rates_fully_agree() {
        let smoothed = present(&[3.0, 4.0, 2.0, 5.0, 1.0, 6.0, 2.0, 2.0]);
        let rate = rate_of_change(&smoothed, 1).unwrap();
        assert_eq!(trend_synchrony(&rate, &rate), Some(100.0));
    }
}
