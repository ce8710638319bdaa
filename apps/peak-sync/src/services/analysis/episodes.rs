use crate::error::{AnalysisError, AnalysisResult};
use crate::services::analysis::stats::robust;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximal run of consecutive steps strictly above a threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Episode {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub duration_days: i64,
    pub max: f64,
    pub mean: f64,
    /// Sum of the amounts by which each step exceeded the threshold.
    pub accumulated_excess: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method", content = "value")]
pub enum ThresholdMethod {
    /// Percentile in `[0, 100]` of the present values.
    Percentile(f64),
    Manual(f64),
}

impl ThresholdMethod {
    pub fn resolve(&self, values: &[Option<f64>]) -> AnalysisResult<f64> {
        match *self {
            ThresholdMethod::Manual(value) if value.is_finite() => Ok(value),
            ThresholdMethod::Manual(_) => Err(AnalysisError::invalid_parameter(
                "threshold",
                "manual threshold must be finite",
            )),
            ThresholdMethod::Percentile(p) => {
                if !(0.0..=100.0).contains(&p) {
                    return Err(AnalysisError::invalid_parameter(
                        "percentile",
                        format!("percentile must be within [0, 100] (got {p})"),
                    ));
                }
                let present: Vec<f64> = values.iter().flatten().copied().collect();
                robust::quantile(&present, p / 100.0).ok_or_else(|| {
                    AnalysisError::invalid_parameter("percentile", "series has no values")
                })
            }
        }
    }
}

struct OpenRun {
    start: NaiveDate,
    values: Vec<f64>,
}

impl OpenRun {
    fn close(self, end: NaiveDate, threshold: f64) -> Episode {
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = self.values.iter().sum::<f64>() / self.values.len() as f64;
        let accumulated_excess = self.values.iter().map(|v| v - threshold).sum();
        Episode {
            start: self.start,
            end,
            duration_days: (end - self.start).num_days() + 1,
            max,
            mean,
            accumulated_excess,
        }
    }
}

/// Runs above `threshold` over the present steps of a series.
///
/// Missing steps are skipped and never split a run. A run ends the day before the next
/// present value at or below the threshold; a run still open at the end closes on the last
/// present date.
pub fn detect_episodes(dates: &[NaiveDate], values: &[Option<f64>], threshold: f64) -> Vec<Episode> {
    let mut episodes = Vec::new();
    let mut run: Option<OpenRun> = None;
    let mut last_present: Option<NaiveDate> = None;

    let present = dates
        .iter()
        .zip(values)
        .filter_map(|(date, value)| value.filter(|v| v.is_finite()).map(|v| (*date, v)));
    for (date, value) in present {
        last_present = Some(date);
        if value > threshold {
            match run.as_mut() {
                Some(open) => open.values.push(value),
                None => {
                    run = Some(OpenRun {
                        start: date,
                        values: vec![value],
                    })
                }
            }
        } else if let Some(open) = run.take() {
            let end = date.pred_opt().unwrap_or(date).max(open.start);
            episodes.push(open.close(end, threshold));
        }
    }
    if let (Some(open), Some(end)) = (run, last_present) {
        episodes.push(open.close(end, threshold));
    }
    episodes
}

pub fn filter_episodes(episodes: Vec<Episode>, min_days: i64) -> Vec<Episode> {
    episodes
        .into_iter()
        .filter(|episode| episode.duration_days >= min_days)
        .collect()
}

fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

/// Days above `threshold` per calendar month (`YYYY-MM`). Every month from the first to the
/// last date gets an entry, including months without rows.
pub fn monthly_exceedances(
    dates: &[NaiveDate],
    values: &[Option<f64>],
    threshold: f64,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    let (Some(first), Some(last)) = (dates.iter().min(), dates.iter().max()) else {
        return counts;
    };

    let (mut year, mut month) = (first.year(), first.month());
    while (year, month) <= (last.year(), last.month()) {
        counts.insert(month_key(year, month), 0_usize);
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }

    for (date, value) in dates.iter().zip(values) {
        if value.is_some_and(|v| v > threshold) {
            *counts.entry(month_key(date.year(), date.month())).or_insert(0) += 1;
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeReport {
    pub series: String,
    pub threshold: f64,
    pub min_days: i64,
    pub episodes: Vec<Episode>,
    pub monthly_exceedances: BTreeMap<String, usize>,
}

pub fn episode_report(
    label: &str,
    dates: &[NaiveDate],
    values: &[Option<f64>],
    method: ThresholdMethod,
    min_days: i64,
) -> AnalysisResult<EpisodeReport> {
    let threshold = method.resolve(values)?;
    let episodes = filter_episodes(detect_episodes(dates, values, threshold), min_days);
    tracing::info!(
        phase = "episodes",
        series = label,
        threshold,
        episode_count = episodes.len(),
        "critical episodes detected"
    );
    Ok(EpisodeReport {
        series: label.to_string(),
        threshold,
        min_days,
        episodes,
        monthly_exceedances: monthly_exceedances(dates, values, threshold),
    })
}
