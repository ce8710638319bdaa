use crate::config::AnalysisConfig;
use crate::dataset::DailyDataset;
use crate::error::{AnalysisError, AnalysisResult};
use crate::services::analysis::peaks::{summarize_lags, PeakDetector};
use crate::services::analysis::signal::trend_synchrony;
use crate::services::analysis::stats::robust;
use crate::services::analysis::synchrony::SeriesFeatures;
use crate::services::analysis::types::WindowConfig;
use chrono::{Duration, Months, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl EventWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// Same length, ending the day before the event starts.
    PreviousPeriod,
    /// Same length, starting the day after the event ends.
    FollowingPeriod,
    /// Same calendar dates one year earlier; Feb 29 falls back to Feb 28.
    SamePeriodPreviousYear,
}

impl ReferenceMode {
    pub fn reference_for(&self, event: &EventWindow) -> AnalysisResult<EventWindow> {
        let out_of_range =
            || AnalysisError::invalid_parameter("reference", "reference period is out of range");
        let span = Duration::days(event.days());
        let window = match self {
            ReferenceMode::PreviousPeriod => {
                let end = event.start.pred_opt().ok_or_else(out_of_range)?;
                let start = event.start.checked_sub_signed(span).ok_or_else(out_of_range)?;
                EventWindow::new(start, end)
            }
            ReferenceMode::FollowingPeriod => {
                let start = event.end.succ_opt().ok_or_else(out_of_range)?;
                let end = event.end.checked_add_signed(span).ok_or_else(out_of_range)?;
                EventWindow::new(start, end)
            }
            ReferenceMode::SamePeriodPreviousYear => {
                let start = event
                    .start
                    .checked_sub_months(Months::new(12))
                    .ok_or_else(out_of_range)?;
                let end = event
                    .end
                    .checked_sub_months(Months::new(12))
                    .ok_or_else(out_of_range)?;
                EventWindow::new(start, end)
            }
        };
        Ok(window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodMetrics {
    pub trend_synchrony: Option<f64>,
    /// Variance of every matched lag, without reliable-window trimming.
    pub lag_variance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub max: Option<f64>,
}

impl PeriodSummary {
    pub fn from_values(values: &[Option<f64>]) -> Self {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        Self {
            mean: robust::mean(&present),
            median: robust::median(&present),
            max: robust::max(&present),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesContrast {
    pub label: String,
    pub event: PeriodSummary,
    pub reference: PeriodSummary,
    pub relative_change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventContrast {
    pub event: EventWindow,
    pub reference: EventWindow,
    pub mode: ReferenceMode,
    pub event_metrics: PeriodMetrics,
    pub reference_metrics: PeriodMetrics,
    pub series: Vec<SeriesContrast>,
}

/// Percent change of `event` over `reference`; undefined when either side is missing or
/// the reference is zero.
pub fn relative_change_pct(event: Option<f64>, reference: Option<f64>) -> Option<f64> {
    let (event, reference) = (event?, reference?);
    if reference == 0.0 {
        return None;
    }
    let pct = (event - reference) / reference * 100.0;
    pct.is_finite().then_some(pct)
}

/// Synchrony of `master`/`slave` inside an event window against a derived reference period.
///
/// Features are recomputed from each period's own slice, so smoothing never reaches across
/// the period boundary.
pub fn contrast_event(
    dataset: &DailyDataset,
    master: &str,
    slave: &str,
    window: EventWindow,
    mode: ReferenceMode,
    config: &AnalysisConfig,
    detector: &dyn PeakDetector,
) -> AnalysisResult<EventContrast> {
    let started = Instant::now();
    dataset.series(master)?;
    dataset.series(slave)?;
    let reference = mode.reference_for(&window)?;

    let event_slice = dataset.slice(window.start, window.end);
    let reference_slice = dataset.slice(reference.start, reference.end);

    let event_metrics = period_metrics(&event_slice, master, slave, config, detector)?;
    let reference_metrics = period_metrics(&reference_slice, master, slave, config, detector)?;

    let series = [master, slave]
        .into_iter()
        .map(|label| {
            let event = PeriodSummary::from_values(&event_slice.series(label)?.values);
            let reference = PeriodSummary::from_values(&reference_slice.series(label)?.values);
            Ok(SeriesContrast {
                label: label.to_string(),
                relative_change_pct: relative_change_pct(event.mean, reference.mean),
                event,
                reference,
            })
        })
        .collect::<AnalysisResult<Vec<_>>>()?;

    tracing::info!(
        phase = "event_contrast",
        duration_ms = started.elapsed().as_millis() as u64,
        master,
        slave,
        event_days = event_slice.dates.len(),
        reference_days = reference_slice.dates.len(),
        "event contrast computed"
    );

    Ok(EventContrast {
        event: window,
        reference,
        mode,
        event_metrics,
        reference_metrics,
        series,
    })
}

fn period_metrics(
    period: &DailyDataset,
    master: &str,
    slave: &str,
    config: &AnalysisConfig,
    detector: &dyn PeakDetector,
) -> AnalysisResult<PeriodMetrics> {
    let params = config.feature_params();
    let master_features =
        SeriesFeatures::compute(&period.dates, &period.series(master)?.values, &params, detector)?;
    let slave_features =
        SeriesFeatures::compute(&period.dates, &period.series(slave)?.values, &params, detector)?;

    let summary = summarize_lags(
        &master_features.peaks,
        &slave_features.peaks,
        &WindowConfig::untrimmed(config.search_window_days),
    )?;
    Ok(PeriodMetrics {
        trend_synchrony: trend_synchrony(&master_features.rate, &slave_features.rate),
        lag_variance: summary.variance,
    })
}
