use crate::error::{AnalysisError, AnalysisResult};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

const DATE_FORMATS: [&str; 2] = ["%d/%m/%Y", "%Y-%m-%d"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedSeries {
    pub label: String,
    /// Aligned with [`DailyDataset::dates`]; `None` where the observation is missing.
    pub values: Vec<Option<f64>>,
}

impl NamedSeries {
    pub fn new(label: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }

    pub fn present_values(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().collect()
    }
}

/// Several labelled series over one strictly ascending daily axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyDataset {
    pub dates: Vec<NaiveDate>,
    pub series: Vec<NamedSeries>,
}

impl DailyDataset {
    pub fn new(dates: Vec<NaiveDate>, series: Vec<NamedSeries>) -> AnalysisResult<Self> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AnalysisError::invalid_parameter(
                "dates",
                "date axis must be strictly ascending",
            ));
        }
        let mut seen = HashSet::new();
        for s in &series {
            if !seen.insert(s.label.as_str()) {
                return Err(AnalysisError::invalid_parameter(
                    "series",
                    format!("duplicate series label {}", s.label),
                ));
            }
            if s.values.len() != dates.len() {
                return Err(AnalysisError::invalid_parameter(
                    "series",
                    format!(
                        "series {} has {} values for {} dates",
                        s.label,
                        s.values.len(),
                        dates.len()
                    ),
                ));
            }
        }
        Ok(Self { dates, series })
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open dataset {}", path.display()))?;
        Self::from_csv_reader(file).with_context(|| format!("failed to load dataset {}", path.display()))
    }

    /// First column holds the date (`dd/mm/YYYY` or `YYYY-mm-dd`), every other column is a
    /// series. Blank or non-numeric cells are missing observations.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers().context("failed to read CSV header")?.clone();
        if headers.len() < 2 {
            anyhow::bail!("dataset needs a date column and at least one series column");
        }
        let labels: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();
        let mut seen = HashSet::new();
        if let Some(dup) = labels.iter().find(|label| !seen.insert(label.as_str())) {
            anyhow::bail!("duplicate series column {dup:?} in dataset");
        }

        let mut rows: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record.with_context(|| format!("failed to read CSV row {}", line + 2))?;
            let raw_date = record.get(0).unwrap_or_default();
            let date = parse_date(raw_date)
                .with_context(|| format!("invalid date {raw_date:?} on row {}", line + 2))?;
            let values = (1..=labels.len())
                .map(|idx| {
                    record
                        .get(idx)
                        .and_then(|cell| cell.parse::<f64>().ok())
                        .filter(|v| v.is_finite())
                })
                .collect();
            rows.push((date, values));
        }
        rows.sort_by_key(|(date, _)| *date);
        if let Some(dup) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
            anyhow::bail!("duplicate date {} in dataset", dup[0].0);
        }

        let dates: Vec<NaiveDate> = rows.iter().map(|(date, _)| *date).collect();
        let series = labels
            .into_iter()
            .enumerate()
            .map(|(col, label)| NamedSeries::new(label, rows.iter().map(|(_, v)| v[col]).collect()))
            .collect();

        tracing::info!(
            rows = dates.len(),
            first = ?dates.first(),
            last = ?dates.last(),
            "dataset loaded"
        );
        Ok(Self::new(dates, series)?)
    }

    pub fn labels(&self) -> Vec<String> {
        self.series.iter().map(|s| s.label.clone()).collect()
    }

    pub fn series(&self, label: &str) -> AnalysisResult<&NamedSeries> {
        self.series
            .iter()
            .find(|s| s.label == label)
            .ok_or_else(|| AnalysisError::unknown_series(label))
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Rows whose date falls in `[start, end]`.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let from = self.dates.partition_point(|d| *d < start);
        let to = self.dates.partition_point(|d| *d <= end).max(from);
        Self {
            dates: self.dates[from..to].to_vec(),
            series: self
                .series
                .iter()
                .map(|s| NamedSeries::new(s.label.clone(), s.values[from..to].to_vec()))
                .collect(),
        }
    }

    /// Keep only the named series, in the given order.
    pub fn select(&self, labels: &[String]) -> AnalysisResult<Self> {
        let series = labels
            .iter()
            .map(|label| self.series(label).cloned())
            .collect::<AnalysisResult<Vec<_>>>()?;
        Ok(Self {
            dates: self.dates.clone(),
            series,
        })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
