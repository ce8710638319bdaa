use crate::dataset::{DailyDataset, NamedSeries};
use crate::error::AnalysisResult;
use crate::services::analysis::reports::EventWindow;
use crate::services::analysis::stats::correlation::pearson_from_aligned;
use crate::services::analysis::stats::robust;
use crate::services::analysis::types::LabeledMatrix;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub label: String,
    /// Present observations inside the range.
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Sample standard deviation.
    pub std: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthMean {
    /// Calendar month, 1 = January.
    pub month: u32,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearMean {
    pub year: i32,
    pub mean: f64,
    /// Change against the previous listed year, in percent. `None` for the first year or when
    /// the previous mean is zero.
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesTrend {
    pub label: String,
    pub monthly_profile: Vec<MonthMean>,
    pub annual: Vec<YearMean>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Dates in range, present or not.
    pub record_count: usize,
    pub summaries: Vec<SeriesSummary>,
    pub trends: Vec<SeriesTrend>,
    /// Pairwise Pearson over dates where both series are present; only with two or more series.
    pub correlation: Option<LabeledMatrix<Option<f64>>>,
    pub highest_mean: Option<String>,
    pub highest_std: Option<String>,
}

/// Descriptive statistics, seasonal and yearly profiles and a correlation matrix for the
/// selected series over `[start, end]`.
///
/// Empty `labels` selects every series. Missing bounds default to the dataset's first and
/// last date, and reversed bounds are swapped.
pub fn explore_trends(
    dataset: &DailyDataset,
    labels: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> AnalysisResult<TrendReport> {
    let started = Instant::now();
    let selected = if labels.is_empty() {
        dataset.clone()
    } else {
        dataset.select(labels)?
    };
    let window = match (
        start.or(selected.dates.first().copied()),
        end.or(selected.dates.last().copied()),
    ) {
        (Some(start), Some(end)) => Some(EventWindow::new(start, end)),
        _ => None,
    };
    let scoped = match window {
        Some(window) => selected.slice(window.start, window.end),
        None => selected,
    };

    let summaries: Vec<SeriesSummary> = scoped.series.iter().map(summarize_series).collect();
    let trends = scoped
        .series
        .iter()
        .map(|series| SeriesTrend {
            label: series.label.clone(),
            monthly_profile: monthly_profile(&scoped.dates, &series.values),
            annual: annual_means(&scoped.dates, &series.values),
        })
        .collect();
    let correlation = (scoped.series.len() >= 2).then(|| correlation_matrix(&scoped.series));
    let highest_mean = arg_max(&summaries, |s| s.mean);
    let highest_std = arg_max(&summaries, |s| s.std);

    tracing::info!(
        phase = "trends",
        duration_ms = started.elapsed().as_millis() as u64,
        series_count = scoped.series.len(),
        record_count = scoped.dates.len(),
        "trend exploration computed"
    );

    Ok(TrendReport {
        start: window.map(|w| w.start),
        end: window.map(|w| w.end),
        record_count: scoped.dates.len(),
        summaries,
        trends,
        correlation,
        highest_mean,
        highest_std,
    })
}

fn summarize_series(series: &NamedSeries) -> SeriesSummary {
    let values = series.present_values();
    SeriesSummary {
        label: series.label.clone(),
        count: values.len(),
        mean: robust::mean(&values),
        median: robust::median(&values),
        std: robust::std_dev(&values),
        max: robust::max(&values),
        min: robust::min(&values),
    }
}

fn grouped_means<K: Ord>(
    dates: &[NaiveDate],
    values: &[Option<f64>],
    key: impl Fn(&NaiveDate) -> K,
) -> Vec<(K, f64)> {
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (date, value) in dates.iter().zip(values) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            groups.entry(key(date)).or_default().push(v);
        }
    }
    groups
        .into_iter()
        .filter_map(|(k, vals)| robust::mean(&vals).map(|m| (k, m)))
        .collect()
}

/// Mean per calendar month pooled across years; months without data are omitted.
pub fn monthly_profile(dates: &[NaiveDate], values: &[Option<f64>]) -> Vec<MonthMean> {
    grouped_means(dates, values, |d| d.month())
        .into_iter()
        .map(|(month, mean)| MonthMean { month, mean })
        .collect()
}

/// Mean per year with the percentage change from the previous year that has data.
pub fn annual_means(dates: &[NaiveDate], values: &[Option<f64>]) -> Vec<YearMean> {
    let mut previous: Option<f64> = None;
    grouped_means(dates, values, |d| d.year())
        .into_iter()
        .map(|(year, mean)| {
            let change_pct = previous
                .filter(|prev| *prev != 0.0)
                .map(|prev| (mean - prev) / prev * 100.0);
            previous = Some(mean);
            YearMean {
                year,
                mean,
                change_pct,
            }
        })
        .collect()
}

fn aligned_present(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .unzip()
}

/// Symmetric Pearson matrix. The diagonal is 1 when the series has spread, `None` otherwise.
pub fn correlation_matrix(series: &[NamedSeries]) -> LabeledMatrix<Option<f64>> {
    let labels = series.iter().map(|s| s.label.clone()).collect();
    let mut matrix = LabeledMatrix::filled(labels, None);
    for i in 0..series.len() {
        for j in i..series.len() {
            let (x, y) = aligned_present(&series[i].values, &series[j].values);
            let r = pearson_from_aligned(&x, &y).map(|r| if i == j { 1.0 } else { r });
            matrix.cells[i][j] = r;
            matrix.cells[j][i] = r;
        }
    }
    matrix
}

/// First label with the largest defined value.
fn arg_max(
    summaries: &[SeriesSummary],
    metric: impl Fn(&SeriesSummary) -> Option<f64>,
) -> Option<String> {
    let mut best: Option<(&str, f64)> = None;
    for summary in summaries {
        let Some(value) = metric(summary) else {
            continue;
        };
        if best.map_or(true, |(_, top)| value > top) {
            best = Some((summary.label.as_str(), value));
        }
    }
    best.map(|(label, _)| label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    fn dataset() -> DailyDataset {
        let dates = vec![
            d(2020, 1, 10),
            d(2020, 2, 10),
            d(2021, 1, 10),
            d(2021, 2, 10),
            d(2022, 1, 10),
        ];
        DailyDataset::new(
            dates,
            vec![
                NamedSeries::new(
                    "PM10",
                    vec![Some(10.0), Some(20.0), Some(20.0), Some(40.0), Some(15.0)],
                ),
                NamedSeries::new(
                    "NO2",
                    vec![Some(5.0), Some(10.0), Some(10.0), None, Some(7.5)],
                ),
                NamedSeries::new("O3", vec![Some(3.0), Some(3.0), None, Some(3.0), None]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn summaries_use_present_values_and_sample_std() {
        let report = explore_trends(&dataset(), &[], None, None).unwrap();

        assert_eq!(report.record_count, 5);
        assert_eq!(report.start, Some(d(2020, 1, 10)));
        assert_eq!(report.end, Some(d(2022, 1, 10)));

        let pm10 = &report.summaries[0];
        assert_eq!(pm10.count, 5);
        assert!((pm10.mean.unwrap() - 21.0).abs() < 1e-9);
        assert_eq!(pm10.median, Some(20.0));
        assert_eq!(pm10.max, Some(40.0));
        assert_eq!(pm10.min, Some(10.0));
        // deviations -11, -1, -1, 19, -6 -> 520 / 4
        assert!((pm10.std.unwrap() - 130.0_f64.sqrt()).abs() < 1e-9);

        let no2 = &report.summaries[1];
        assert_eq!(no2.count, 4);
        assert!((no2.mean.unwrap() - 8.125).abs() < 1e-9);

        assert_eq!(report.highest_mean.as_deref(), Some("PM10"));
        assert_eq!(report.highest_std.as_deref(), Some("PM10"));
    }

    #[test]
    fn monthly_profile_pools_years() {
        let data = dataset();
        let pm10 = data.series("PM10").unwrap();
        let profile = monthly_profile(&data.dates, &pm10.values);
        assert_eq!(
            profile,
            vec![
                MonthMean { month: 1, mean: 15.0 },
                MonthMean { month: 2, mean: 30.0 },
            ]
        );
    }

    #[test]
    fn annual_means_report_year_over_year_change() {
        let data = dataset();
        let pm10 = data.series("PM10").unwrap();
        let annual = annual_means(&data.dates, &pm10.values);

        let years: Vec<i32> = annual.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2020, 2021, 2022]);
        assert_eq!(annual[0].mean, 15.0);
        assert_eq!(annual[0].change_pct, None);
        assert_eq!(annual[1].mean, 30.0);
        assert_eq!(annual[1].change_pct, Some(100.0));
        assert_eq!(annual[2].change_pct, Some(-50.0));
    }

    #[test]
    fn year_change_from_zero_is_undefined() {
        let dates = vec![d(2020, 6, 1), d(2021, 6, 1)];
        let annual = annual_means(&dates, &[Some(0.0), Some(4.0)]);
        assert_eq!(annual[1].change_pct, None);
    }

    #[test]
    fn correlation_uses_pairwise_present_dates() {
        let report = explore_trends(&dataset(), &[], None, None).unwrap();
        let matrix = report.correlation.unwrap();

        assert_eq!(matrix.get("PM10", "PM10"), Some(&Some(1.0)));
        // NO2 is PM10 / 2 wherever both are present.
        let r = matrix.get("PM10", "NO2").copied().flatten().unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(matrix.get("NO2", "PM10"), matrix.get("PM10", "NO2"));
        // O3 is constant, so it has no correlation with anything, itself included.
        assert_eq!(matrix.get("O3", "O3"), Some(&None));
        assert_eq!(matrix.get("O3", "PM10"), Some(&None));
    }

    #[test]
    fn range_and_selection_scope_the_report() {
        let labels = vec!["NO2".to_string()];
        let report =
            explore_trends(&dataset(), &labels, Some(d(2021, 12, 31)), Some(d(2020, 2, 1)))
                .unwrap();

        assert_eq!(report.start, Some(d(2020, 2, 1)));
        assert_eq!(report.end, Some(d(2021, 12, 31)));
        assert_eq!(report.record_count, 3);
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.summaries[0].mean, Some(10.0));
        assert_eq!(report.summaries[0].std, Some(0.0));
        assert!(report.correlation.is_none());
    }

    #[test]
    fn empty_range_yields_empty_summaries() {
        let report =
            explore_trends(&dataset(), &[], Some(d(2030, 1, 1)), Some(d(2030, 12, 31))).unwrap();
        assert_eq!(report.record_count, 0);
        assert!(report.summaries.iter().all(|s| s.count == 0 && s.mean.is_none()));
        assert_eq!(report.highest_mean, None);
    }

    #[test]
    fn unknown_series_is_an_error() {
        let err = explore_trends(&dataset(), &["CO".to_string()], None, None).unwrap_err();
        assert_eq!(err, AnalysisError::unknown_series("CO"));
    }
}
