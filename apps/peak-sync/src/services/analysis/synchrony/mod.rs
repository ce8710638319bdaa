pub mod cache;

pub use cache::{FeatureParams, SeriesFeatureCache, SeriesFeatures};

use crate::dataset::DailyDataset;
use crate::error::{AnalysisError, AnalysisResult};
use crate::services::analysis::peaks::{summarize_lags, PeakDetector};
use crate::services::analysis::signal::{trend_synchrony, RateOfChange};
use crate::services::analysis::stats::correlation::best_lag;
use crate::services::analysis::types::{LabeledMatrix, WindowConfig, DEFAULT_MATRIX_LAG_RANGE_DAYS};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynchronyParams {
    pub windows: WindowConfig,
    /// Best-lag scan covers `[-max_lag_days, max_lag_days]`.
    pub max_lag_days: i64,
    pub features: FeatureParams,
}

impl Default for SynchronyParams {
    fn default() -> Self {
        Self {
            windows: WindowConfig::default(),
            max_lag_days: DEFAULT_MATRIX_LAG_RANGE_DAYS,
            features: FeatureParams::default(),
        }
    }
}

impl SynchronyParams {
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.windows.search_window_days < 0 {
            return Err(AnalysisError::InvalidWindow {
                window_days: self.windows.search_window_days,
            });
        }
        if self.max_lag_days < 0 {
            return Err(AnalysisError::invalid_parameter(
                "max_lag_days",
                format!("lag range must be non-negative (got {})", self.max_lag_days),
            ));
        }
        if self.features.smoothing_window == 0 || self.features.trend_window == 0 {
            return Err(AnalysisError::invalid_parameter(
                "features",
                "smoothing and trend windows must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynchronyMatrices {
    /// Percent of steps whose rates of change share a sign.
    pub trend_synchrony: LabeledMatrix<Option<f64>>,
    /// Row is the master series, column the slave.
    pub lag_variance: LabeledMatrix<Option<f64>>,
    /// Lag (days) at which `row[t]` best correlates with `col[t - lag]`.
    pub best_lag: LabeledMatrix<i64>,
}

/// Pairwise synchrony over every series of `dataset`.
///
/// Per-series features come from `cache`, so each series is smoothed and peak-detected
/// once per distinct content. Undefined cells stay `None`.
pub fn synchrony_matrices(
    dataset: &DailyDataset,
    params: &SynchronyParams,
    detector: &dyn PeakDetector,
    cache: &mut SeriesFeatureCache,
) -> AnalysisResult<SynchronyMatrices> {
    params.validate()?;
    let labels = dataset.labels();
    let series_count = labels.len();
    let pair_count = series_count * series_count.saturating_sub(1);

    let features_started = Instant::now();
    let features = dataset
        .series
        .iter()
        .map(|s| {
            cache.get_or_compute(&s.label, &dataset.dates, &s.values, &params.features, detector)
        })
        .collect::<AnalysisResult<Vec<Arc<SeriesFeatures>>>>()?;
    tracing::info!(
        phase = "features",
        duration_ms = features_started.elapsed().as_millis() as u64,
        series_count,
        cache_hits = cache.hits(),
        cache_misses = cache.misses(),
        "series features ready"
    );

    let started = Instant::now();
    let rates: Vec<&RateOfChange> = features.iter().map(|f| &f.rate).collect();
    let trend = trend_synchrony_matrix(labels.clone(), &rates);
    tracing::info!(
        phase = "trend_synchrony",
        duration_ms = started.elapsed().as_millis() as u64,
        series_count,
        pair_count,
        "synchrony matrix computed"
    );

    let started = Instant::now();
    let peaks: Vec<&[NaiveDate]> = features.iter().map(|f| f.peaks.as_slice()).collect();
    let variance = lag_variance_matrix(labels.clone(), &peaks, &params.windows);
    tracing::info!(
        phase = "lag_variance",
        duration_ms = started.elapsed().as_millis() as u64,
        series_count,
        pair_count,
        "synchrony matrix computed"
    );

    let started = Instant::now();
    let raw: Vec<&[Option<f64>]> = dataset.series.iter().map(|s| s.values.as_slice()).collect();
    let lags = best_lag_matrix(labels, &raw, params.max_lag_days);
    tracing::info!(
        phase = "best_lag",
        duration_ms = started.elapsed().as_millis() as u64,
        series_count,
        pair_count,
        max_lag_days = params.max_lag_days,
        "synchrony matrix computed"
    );

    Ok(SynchronyMatrices {
        trend_synchrony: trend,
        lag_variance: variance,
        best_lag: lags,
    })
}

pub fn trend_synchrony_matrix(
    labels: Vec<String>,
    rates: &[&RateOfChange],
) -> LabeledMatrix<Option<f64>> {
    let mut matrix = LabeledMatrix::filled(labels, None);
    let n = rates.len().min(matrix.labels.len());
    for i in 0..n {
        matrix.cells[i][i] = Some(100.0);
        for j in (i + 1)..n {
            let pct = trend_synchrony(rates[i], rates[j]);
            matrix.cells[i][j] = pct;
            matrix.cells[j][i] = pct;
        }
    }
    matrix
}

/// Variance of reliable lags with row `i` as master and column `j` as slave.
///
/// Greedy matching depends on which side drives it, so the matrix is generally not
/// symmetric and every ordered pair is computed.
pub fn lag_variance_matrix(
    labels: Vec<String>,
    peaks: &[&[NaiveDate]],
    windows: &WindowConfig,
) -> LabeledMatrix<Option<f64>> {
    let mut matrix = LabeledMatrix::filled(labels, None);
    let n = peaks.len().min(matrix.labels.len());
    for i in 0..n {
        for j in 0..n {
            if i == j {
                matrix.cells[i][j] = Some(0.0);
                continue;
            }
            matrix.cells[i][j] = match summarize_lags(peaks[i], peaks[j], windows) {
                Ok(summary) => summary.variance,
                Err(err) => {
                    tracing::warn!(
                        master = %matrix.labels[i],
                        slave = %matrix.labels[j],
                        error = %err,
                        "lag variance cell skipped"
                    );
                    None
                }
            };
        }
    }
    matrix
}

pub fn best_lag_matrix(
    labels: Vec<String>,
    raw: &[&[Option<f64>]],
    max_lag_days: i64,
) -> LabeledMatrix<i64> {
    let mut matrix = LabeledMatrix::filled(labels, 0);
    let n = raw.len().min(matrix.labels.len());
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            match best_lag(raw[i], raw[j], max_lag_days) {
                Ok(best) => matrix.cells[i][j] = best.lag_days,
                Err(err) => tracing::warn!(
                    row = %matrix.labels[i],
                    col = %matrix.labels[j],
                    error = %err,
                    "best lag cell skipped"
                ),
            }
        }
    }
    matrix
}
