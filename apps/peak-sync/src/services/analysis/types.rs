use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SEARCH_WINDOW_DAYS: i64 = 90;
pub const DEFAULT_RELIABLE_WINDOW_DAYS: i64 = 45;
pub const DEFAULT_MATRIX_LAG_RANGE_DAYS: i64 = 60;
pub const DEFAULT_COMPARISON_LAG_RANGE_DAYS: i64 = 90;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 30;
pub const DEFAULT_TREND_WINDOW: usize = 15;
pub const DEFAULT_MIN_PEAK_SPACING: usize = 30;

/// One master peak paired with one slave peak.
///
/// `lag_days` is `slave - master`; positive means the slave event trails the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub master: NaiveDate,
    pub slave: NaiveDate,
    pub lag_days: i64,
}

impl MatchedPair {
    pub fn new(master: NaiveDate, slave: NaiveDate) -> Self {
        Self {
            master,
            slave,
            lag_days: (slave - master).num_days(),
        }
    }
}

/// Pairs produced by one matching run, in master order.
///
/// Every master and every slave timestamp contributes to at most one pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub pairs: Vec<MatchedPair>,
}

impl MatchResult {
    pub fn lags(&self) -> Vec<i64> {
        self.pairs.iter().map(|pair| pair.lag_days).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub search_window_days: i64,
    /// `None` keeps every accepted pair in the statistics.
    pub reliable_window_days: Option<i64>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            search_window_days: DEFAULT_SEARCH_WINDOW_DAYS,
            reliable_window_days: Some(DEFAULT_RELIABLE_WINDOW_DAYS),
        }
    }
}

impl WindowConfig {
    pub fn new(search_window_days: i64, reliable_window_days: Option<i64>) -> Self {
        Self {
            search_window_days,
            reliable_window_days,
        }
    }

    pub fn untrimmed(search_window_days: i64) -> Self {
        Self::new(search_window_days, None)
    }

    /// Reliable window clamped into `[0, search_window_days]`.
    pub fn effective_reliable_window(&self) -> Option<i64> {
        let search = self.search_window_days.max(0);
        self.reliable_window_days.map(|days| days.clamp(0, search))
    }
}

/// Dual-window summary of one master/slave matching.
///
/// Statistics are `None` when no pair falls inside the reliable window; callers must not
/// treat that as zero (zero would read as perfect synchrony).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagSummary {
    pub pairs: Vec<MatchedPair>,
    pub valid_pairs: Vec<MatchedPair>,
    pub discarded_pairs: Vec<MatchedPair>,
    pub valid_lags: Vec<i64>,
    pub variance: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub search_window_days: i64,
    pub reliable_window_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestLag {
    pub lag_days: i64,
    /// `None` when no lag in the scanned range produced a usable correlation.
    pub correlation: Option<f64>,
}

/// Square matrix over a fixed ordering of series labels; `cells[row][col]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledMatrix<T> {
    pub labels: Vec<String>,
    pub cells: Vec<Vec<T>>,
}

impl<T: Clone> LabeledMatrix<T> {
    pub fn filled(labels: Vec<String>, value: T) -> Self {
        let n = labels.len();
        Self {
            labels,
            cells: vec![vec![value; n]; n],
        }
    }

    pub fn get(&self, row: &str, col: &str) -> Option<&T> {
        let row_idx = self.labels.iter().position(|label| label == row)?;
        let col_idx = self.labels.iter().position(|label| label == col)?;
        self.cells.get(row_idx).and_then(|row| row.get(col_idx))
    }
}
