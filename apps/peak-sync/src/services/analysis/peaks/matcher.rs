use crate::error::{AnalysisError, AnalysisResult};
use crate::services::analysis::types::{MatchResult, MatchedPair};
use chrono::NaiveDate;

/// Greedy nearest-neighbour matching of master peaks against slave peaks.
///
/// Masters are visited in ascending order. For each one only the immediate predecessor and
/// successor still left in the slave pool are considered; the closer one wins, and on a tie
/// the predecessor (negative lag) wins. An accepted slave is removed from the pool, so no
/// slave is ever paired twice. Candidates further than `search_window_days` leave the master
/// unmatched and the pool untouched.
///
/// This is intentionally local: it is not a minimum-total-displacement assignment.
pub fn match_peaks(
    master: &[NaiveDate],
    slave: &[NaiveDate],
    search_window_days: i64,
) -> AnalysisResult<MatchResult> {
    if search_window_days < 0 {
        return Err(AnalysisError::InvalidWindow {
            window_days: search_window_days,
        });
    }
    if master.is_empty() || slave.is_empty() {
        return Ok(MatchResult::default());
    }

    let mut masters = master.to_vec();
    masters.sort();
    let mut pool = slave.to_vec();
    pool.sort();

    let mut pairs: Vec<MatchedPair> = Vec::with_capacity(masters.len().min(pool.len()));
    for master_ts in masters {
        if pool.is_empty() {
            break;
        }
        let Some(idx) = nearest_candidate(&pool, master_ts) else {
            continue;
        };
        let pair = MatchedPair::new(master_ts, pool[idx]);
        if pair.lag_days.abs() <= search_window_days {
            pool.remove(idx);
            pairs.push(pair);
        }
    }

    Ok(MatchResult { pairs })
}

fn nearest_candidate(pool: &[NaiveDate], target: NaiveDate) -> Option<usize> {
    let pos = pool.partition_point(|ts| *ts < target);
    let successor = (pos < pool.len()).then_some(pos);
    let predecessor = pos.checked_sub(1);

    [predecessor, successor]
        .into_iter()
        .flatten()
        .min_by_key(|idx| {
            let lag = (pool[*idx] - target).num_days();
            (lag.abs(), lag)
        })
}

#[cfg(test)]
mod tests {
    use super::match_peaks;
    use crate::error::AnalysisError;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn negative_window_is_rejected() {
        let err = match_peaks(&[d(2020, 1, 1)], &[d(2020, 1, 2)], -1).unwrap_err();
        assert_eq!(err, AnalysisError::InvalidWindow { window_days: -1 });
    }

    #[test]
    fn empty_sides_yield_empty_result() {
        assert!(match_peaks(&[], &[d(2020, 1, 2)], 10).unwrap().is_empty());
        assert!(match_peaks(&[d(2020, 1, 2)], &[], 10).unwrap().is_empty());
    }

    #[test]
    fn out_of_window_slave_is_excluded() {
        let master = [d(2020, 1, 1), d(2020, 1, 10), d(2020, 1, 20)];
        let slave = [d(2020, 1, 2), d(2020, 1, 11), d(2020, 4, 1)];
        let result = match_peaks(&master, &slave, 15).unwrap();
        assert_eq!(result.lags(), vec![1, 1]);
    }

    #[test]
    fn pairs_report_master_slave_and_lag() {
        let master = [d(2020, 3, 1), d(2020, 4, 15)];
        let slave = [d(2020, 3, 3), d(2020, 5, 10)];
        let result = match_peaks(&master, &slave, 40).unwrap();
        let got: Vec<(NaiveDate, NaiveDate, i64)> = result
            .pairs
            .iter()
            .map(|p| (p.master, p.slave, p.lag_days))
            .collect();
        assert_eq!(
            got,
            vec![
                (d(2020, 3, 1), d(2020, 3, 3), 2),
                (d(2020, 4, 15), d(2020, 5, 10), 25),
            ]
        );
    }

    #[test]
    fn input_order_does_not_matter() {
        let master = [d(2020, 4, 15), d(2020, 3, 1)];
        let slave = [d(2020, 5, 10), d(2020, 3, 3)];
        let result = match_peaks(&master, &slave, 40).unwrap();
        assert_eq!(result.lags(), vec![2, 25]);
    }

    #[test]
    fn equidistant_tie_prefers_preceding_slave() {
        let master = [d(2020, 1, 10)];
        let slave = [d(2020, 1, 13), d(2020, 1, 7)];
        let result = match_peaks(&master, &slave, 5).unwrap();
        assert_eq!(result.lags(), vec![-3]);
        assert_eq!(result.pairs[0].slave, d(2020, 1, 7));
    }

    #[test]
    fn consumed_slave_is_not_reused() {
        // Both masters are closest to the same slave; the second must fall back.
        let master = [d(2020, 1, 10), d(2020, 1, 11)];
        let slave = [d(2020, 1, 10), d(2020, 1, 20)];
        let result = match_peaks(&master, &slave, 30).unwrap();
        assert_eq!(result.lags(), vec![0, 9]);
    }

    #[test]
    fn greedy_order_is_not_globally_optimal() {
        // Pairing 01-04 with 01-02 would leave 01-05 for 01-06 (two matches); the greedy
        // pass hands 01-05 to the first master and strands the second.
        let master = [d(2020, 1, 4), d(2020, 1, 6)];
        let slave = [d(2020, 1, 2), d(2020, 1, 5)];
        let result = match_peaks(&master, &slave, 2).unwrap();
        assert_eq!(result.lags(), vec![1]);
        assert_eq!(result.pairs[0].master, d(2020, 1, 4));
    }

    #[test]
    fn rejected_candidate_leaves_pool_untouched() {
        let master = [d(2020, 1, 1), d(2020, 3, 1)];
        let slave = [d(2020, 3, 2)];
        let result = match_peaks(&master, &slave, 5).unwrap();
        assert_eq!(result.lags(), vec![1]);
    }

    #[test]
    fn identical_sequences_yield_zero_lags() {
        let peaks = [d(2021, 2, 1), d(2021, 5, 3), d(2021, 9, 30), d(2021, 12, 25)];
        let result = match_peaks(&peaks, &peaks, 0).unwrap();
        assert_eq!(result.lags(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn invariants_hold_on_dense_irregular_input() {
        let base = d(2020, 1, 1);
        let master: Vec<NaiveDate> = [0, 3, 4, 9, 30, 31, 32, 80, 200]
            .iter()
            .map(|off| base + chrono::Duration::days(*off))
            .collect();
        let slave: Vec<NaiveDate> = [1, 2, 5, 29, 29, 70, 150, 400]
            .iter()
            .map(|off| base + chrono::Duration::days(*off))
            .collect();
        let window = 20;
        let result = match_peaks(&master, &slave, window).unwrap();

        assert!(result.len() <= master.len().min(slave.len()));
        assert!(result.pairs.iter().all(|p| p.lag_days.abs() <= window));

        let masters: HashSet<NaiveDate> = result.pairs.iter().map(|p| p.master).collect();
        assert_eq!(masters.len(), result.len());

        // Duplicate slave dates may each be consumed once, never more.
        let used_29 = result
            .pairs
            .iter()
            .filter(|p| p.slave == base + chrono::Duration::days(29))
            .count();
        assert!(used_29 <= 2);
        let used_other: HashSet<NaiveDate> = result
            .pairs
            .iter()
            .map(|p| p.slave)
            .filter(|s| *s != base + chrono::Duration::days(29))
            .collect();
        assert_eq!(
            used_other.len(),
            result
                .pairs
                .iter()
                .filter(|p| p.slave != base + chrono::Duration::days(29))
                .count()
        );
    }
}
