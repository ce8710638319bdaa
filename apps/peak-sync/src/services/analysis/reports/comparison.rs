use crate::config::AnalysisConfig;
use crate::dataset::DailyDataset;
use crate::error::AnalysisResult;
use crate::services::analysis::peaks::{summarize_lags, PeakDetector};
use crate::services::analysis::signal::trend_synchrony;
use crate::services::analysis::stats::correlation::best_lag;
use crate::services::analysis::synchrony::SeriesFeatureCache;
use crate::services::analysis::types::{BestLag, LagSummary};
use chrono::NaiveDate;
use serde::Serialize;
use std::time::Instant;

/// Running count of peaks seen by each date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CyclePoint {
    pub date: NaiveDate,
    pub master: usize,
    pub slave: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairComparison {
    pub master: String,
    pub slave: String,
    pub trend_synchrony: Option<f64>,
    pub lag_summary: LagSummary,
    pub best_lag: BestLag,
    pub master_peaks: Vec<NaiveDate>,
    pub slave_peaks: Vec<NaiveDate>,
    pub cycles: Vec<CyclePoint>,
}

pub fn compare_pair(
    dataset: &DailyDataset,
    master: &str,
    slave: &str,
    config: &AnalysisConfig,
    detector: &dyn PeakDetector,
    cache: &mut SeriesFeatureCache,
) -> AnalysisResult<PairComparison> {
    let started = Instant::now();
    let master_series = dataset.series(master)?;
    let slave_series = dataset.series(slave)?;
    let params = config.feature_params();

    let master_features = cache.get_or_compute(
        master,
        &dataset.dates,
        &master_series.values,
        &params,
        detector,
    )?;
    let slave_features =
        cache.get_or_compute(slave, &dataset.dates, &slave_series.values, &params, detector)?;

    let lag_summary = summarize_lags(
        &master_features.peaks,
        &slave_features.peaks,
        &config.windows(),
    )?;
    let best = best_lag(
        &master_series.values,
        &slave_series.values,
        config.comparison_lag_range_days,
    )?;
    let cycles = cumulative_cycles(
        &dataset.dates,
        &master_features.peaks,
        &slave_features.peaks,
    );

    tracing::info!(
        phase = "compare",
        duration_ms = started.elapsed().as_millis() as u64,
        master,
        slave,
        master_peaks = master_features.peaks.len(),
        slave_peaks = slave_features.peaks.len(),
        valid_pairs = lag_summary.valid_pairs.len(),
        "pair comparison computed"
    );

    Ok(PairComparison {
        master: master.to_string(),
        slave: slave.to_string(),
        trend_synchrony: trend_synchrony(&master_features.rate, &slave_features.rate),
        lag_summary,
        best_lag: best,
        master_peaks: master_features.peaks.clone(),
        slave_peaks: slave_features.peaks.clone(),
        cycles,
    })
}

/// Peaks counted up to and including each date of `dates`. Peak lists must be ascending.
pub fn cumulative_cycles(
    dates: &[NaiveDate],
    master_peaks: &[NaiveDate],
    slave_peaks: &[NaiveDate],
) -> Vec<CyclePoint> {
    dates
        .iter()
        .map(|date| CyclePoint {
            date: *date,
            master: master_peaks.partition_point(|p| p <= date),
            slave: slave_peaks.partition_point(|p| p <= date),
        })
        .collect()
}
