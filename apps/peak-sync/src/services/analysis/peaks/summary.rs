use super::matcher::match_peaks;
use crate::error::AnalysisResult;
use crate::services::analysis::types::{LagSummary, MatchedPair, WindowConfig};
use chrono::NaiveDate;
use statrs::statistics::Statistics;

/// Population moments of a lag sample: `(variance, mean, std)`.
///
/// Empty input has no moments. A single lag has zero spread around itself.
pub fn lag_moments(lags: &[i64]) -> Option<(f64, f64, f64)> {
    match lags {
        [] => None,
        [only] => Some((0.0, *only as f64, 0.0)),
        _ => {
            let values: Vec<f64> = lags.iter().map(|lag| *lag as f64).collect();
            let mean = values.iter().mean();
            let variance = values.iter().population_variance();
            Some((variance, mean, variance.sqrt()))
        }
    }
}

/// Match `master` against `slave` inside the search window, then keep only pairs inside the
/// reliable window for the statistics.
///
/// The search window decides which pairs exist at all; the reliable window separates the
/// tight matches from distant ones that would otherwise dominate the variance. Both sets
/// are returned so callers can report "how many matched" apart from "how tight".
pub fn summarize_lags(
    master: &[NaiveDate],
    slave: &[NaiveDate],
    windows: &WindowConfig,
) -> AnalysisResult<LagSummary> {
    let matched = match_peaks(master, slave, windows.search_window_days)?;
    let reliable = windows.effective_reliable_window();

    let (valid_pairs, discarded_pairs): (Vec<MatchedPair>, Vec<MatchedPair>) = match reliable {
        None => (matched.pairs.clone(), Vec::new()),
        Some(limit) => matched
            .pairs
            .iter()
            .copied()
            .partition(|pair| pair.lag_days.abs() <= limit),
    };
    let valid_lags: Vec<i64> = valid_pairs.iter().map(|pair| pair.lag_days).collect();
    let moments = lag_moments(&valid_lags);

    tracing::debug!(
        master_peaks = master.len(),
        slave_peaks = slave.len(),
        accepted = matched.len(),
        valid = valid_pairs.len(),
        discarded = discarded_pairs.len(),
        "lag summary computed"
    );

    Ok(LagSummary {
        pairs: matched.pairs,
        valid_pairs,
        discarded_pairs,
        valid_lags,
        variance: moments.map(|m| m.0),
        mean: moments.map(|m| m.1),
        std: moments.map(|m| m.2),
        search_window_days: windows.search_window_days,
        reliable_window_days: reliable,
    })
}

#[cfg(test)]
mod tests {
    use super::{lag_moments, summarize_lags};
    use crate::error::AnalysisError;
    use crate::services::analysis::types::WindowConfig;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn moments_follow_degenerate_rules() {
        assert_eq!(lag_moments(&[]), None);
        assert_eq!(lag_moments(&[7]), Some((0.0, 7.0, 0.0)));
        let (var, mean, std) = lag_moments(&[1, 2]).unwrap();
        assert!((var - 0.25).abs() < 1e-12);
        assert!((mean - 1.5).abs() < 1e-12);
        assert!((std - 0.5).abs() < 1e-12);
    }

    #[test]
    fn reliable_window_trims_distant_matches() {
        let master = [d(2020, 1, 1), d(2020, 3, 1), d(2020, 6, 1)];
        let slave = [d(2020, 1, 2), d(2020, 3, 3), d(2020, 7, 30)];
        let summary = summarize_lags(&master, &slave, &WindowConfig::new(120, Some(45))).unwrap();

        assert_eq!(summary.valid_lags, vec![1, 2]);
        assert_eq!(summary.discarded_pairs.len(), 1);
        assert_eq!(summary.discarded_pairs[0].lag_days, 59);
        assert!((summary.variance.unwrap() - 0.25).abs() < 1e-12);
        assert!((summary.mean.unwrap() - 1.5).abs() < 1e-12);
        assert!((summary.std.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn valid_and_discarded_partition_accepted_pairs() {
        let master = [d(2020, 1, 1), d(2020, 3, 1), d(2020, 6, 1), d(2020, 9, 1)];
        let slave = [d(2020, 1, 20), d(2020, 2, 1), d(2020, 6, 2), d(2020, 10, 20)];
        let summary = summarize_lags(&master, &slave, &WindowConfig::new(90, Some(10))).unwrap();

        let mut rejoined = summary.valid_pairs.clone();
        rejoined.extend(summary.discarded_pairs.iter().copied());
        rejoined.sort_by_key(|p| p.master);
        assert_eq!(rejoined, summary.pairs);
        assert!(summary
            .valid_pairs
            .iter()
            .all(|p| !summary.discarded_pairs.contains(p)));
    }

    #[test]
    fn oversized_reliable_window_behaves_like_search_window() {
        let master = [d(2020, 1, 1), d(2020, 3, 1), d(2020, 6, 1)];
        let slave = [d(2020, 1, 2), d(2020, 3, 3), d(2020, 7, 30)];
        let wide = summarize_lags(&master, &slave, &WindowConfig::new(60, Some(500))).unwrap();
        let exact = summarize_lags(&master, &slave, &WindowConfig::new(60, Some(60))).unwrap();

        assert_eq!(wide.valid_pairs, exact.valid_pairs);
        assert_eq!(wide.variance, exact.variance);
        assert_eq!(wide.reliable_window_days, Some(60));
    }

    #[test]
    fn untrimmed_summary_keeps_every_accepted_pair() {
        let master = [d(2020, 1, 1), d(2020, 6, 1)];
        let slave = [d(2020, 1, 2), d(2020, 7, 30)];
        let summary = summarize_lags(&master, &slave, &WindowConfig::untrimmed(90)).unwrap();
        assert_eq!(summary.valid_lags, vec![1, 59]);
        assert!(summary.discarded_pairs.is_empty());
        assert_eq!(summary.reliable_window_days, None);
    }

    #[test]
    fn no_pairs_means_undefined_statistics() {
        let summary =
            summarize_lags(&[d(2020, 1, 1)], &[d(2021, 1, 1)], &WindowConfig::default()).unwrap();
        assert!(summary.pairs.is_empty());
        assert_eq!(summary.variance, None);
        assert_eq!(summary.mean, None);
        assert_eq!(summary.std, None);
    }

    #[test]
    fn only_discarded_pairs_still_leave_statistics_undefined() {
        let summary =
            summarize_lags(&[d(2020, 1, 1)], &[d(2020, 2, 20)], &WindowConfig::default()).unwrap();
        assert_eq!(summary.pairs.len(), 1);
        assert_eq!(summary.discarded_pairs.len(), 1);
        assert_eq!(summary.variance, None);
    }

    #[test]
    fn identical_peaks_have_zero_variance() {
        let peaks = [d(2022, 1, 5), d(2022, 4, 1), d(2022, 8, 19)];
        let summary = summarize_lags(&peaks, &peaks, &WindowConfig::default()).unwrap();
        assert_eq!(summary.valid_lags, vec![0, 0, 0]);
        assert_eq!(summary.variance, Some(0.0));
    }

    #[test]
    fn negative_search_window_propagates() {
        let err = summarize_lags(&[], &[], &WindowConfig::new(-5, Some(45))).unwrap_err();
        assert_eq!(err, AnalysisError::InvalidWindow { window_days: -5 });
    }

    #[test]
    fn negative_reliable_window_clamps_to_zero() {
        let master = [d(2020, 1, 1), d(2020, 2, 1)];
        let slave = [d(2020, 1, 1), d(2020, 2, 3)];
        let summary = summarize_lags(&master, &slave, &WindowConfig::new(30, Some(-4))).unwrap();
        assert_eq!(summary.reliable_window_days, Some(0));
        assert_eq!(summary.valid_lags, vec![0]);
        assert_eq!(summary.discarded_pairs.len(), 1);
    }
}
