use crate::error::AnalysisResult;
use crate::services::analysis::peaks::{detect_series_peaks, HeightThreshold, PeakDetector, PeakParams};
use crate::services::analysis::signal::{rate_of_change, rolling_mean_centered, RateOfChange};
use crate::services::analysis::types::{DEFAULT_SMOOTHING_WINDOW, DEFAULT_TREND_WINDOW};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureParams {
    pub smoothing_window: usize,
    pub trend_window: usize,
    pub peaks: PeakParams,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            trend_window: DEFAULT_TREND_WINDOW,
            peaks: PeakParams::default(),
        }
    }
}

/// Derived per-series inputs shared by every pair the series takes part in.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFeatures {
    pub smoothed: Vec<Option<f64>>,
    pub rate: RateOfChange,
    pub peaks: Vec<NaiveDate>,
}

impl SeriesFeatures {
    pub fn compute(
        dates: &[NaiveDate],
        values: &[Option<f64>],
        params: &FeatureParams,
        detector: &dyn PeakDetector,
    ) -> AnalysisResult<Self> {
        let smoothed = rolling_mean_centered(values, params.smoothing_window, 1)?;
        let rate = rate_of_change(&smoothed, params.trend_window)?;
        let peaks = detect_series_peaks(detector, dates, &smoothed, &params.peaks);
        Ok(Self {
            smoothed,
            rate,
            peaks,
        })
    }
}

struct CacheEntry {
    fingerprint: u64,
    features: Arc<SeriesFeatures>,
}

/// Label-keyed memo of [`SeriesFeatures`].
///
/// An entry is reused only while the fingerprint of its dates, values and feature
/// parameters is unchanged. Entries assume a single detector; call [`clear`] when swapping
/// detectors.
///
/// [`clear`]: SeriesFeatureCache::clear
#[derive(Default)]
pub struct SeriesFeatureCache {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl SeriesFeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(
        &mut self,
        label: &str,
        dates: &[NaiveDate],
        values: &[Option<f64>],
        params: &FeatureParams,
        detector: &dyn PeakDetector,
    ) -> AnalysisResult<Arc<SeriesFeatures>> {
        let fingerprint = fingerprint(dates, values, params);
        if let Some(entry) = self.entries.get(label) {
            if entry.fingerprint == fingerprint {
                self.hits += 1;
                return Ok(entry.features.clone());
            }
        }

        self.misses += 1;
        let features = Arc::new(SeriesFeatures::compute(dates, values, params, detector)?);
        self.entries.insert(
            label.to_string(),
            CacheEntry {
                fingerprint,
                features: features.clone(),
            },
        );
        Ok(features)
    }

    pub fn invalidate(&mut self, label: &str) -> bool {
        self.entries.remove(label).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

fn fingerprint(dates: &[NaiveDate], values: &[Option<f64>], params: &FeatureParams) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(&(params.smoothing_window as u64).to_le_bytes());
    hasher.update(&(params.trend_window as u64).to_le_bytes());
    hasher.update(&(params.peaks.min_spacing as u64).to_le_bytes());
    match params.peaks.height {
        HeightThreshold::SeriesMean => hasher.update(&[0]),
        HeightThreshold::Absolute(value) => {
            hasher.update(&[1]);
            hasher.update(&value.to_bits().to_le_bytes());
        }
    }
    hasher.update(&(dates.len() as u64).to_le_bytes());
    for date in dates {
        hasher.update(&date.num_days_from_ce().to_le_bytes());
    }
    for value in values {
        match value {
            Some(v) => {
                hasher.update(&[1]);
                hasher.update(&v.to_bits().to_le_bytes());
            }
            None => hasher.update(&[0]),
        }
    }
    hasher.digest()
}
