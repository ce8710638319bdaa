use crate::services::analysis::types::DEFAULT_MIN_PEAK_SPACING;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Source of peak timestamps for one smoothed series.
///
/// `smoothed` is aligned with `dates`; `None` marks a step without a value. Implementations
/// must return peak dates in ascending order.
pub trait PeakDetector {
    fn detect(
        &self,
        dates: &[NaiveDate],
        smoothed: &[Option<f64>],
        min_spacing: usize,
        min_height: f64,
    ) -> Vec<NaiveDate>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "value")]
pub enum HeightThreshold {
    /// Mean of the present smoothed values.
    SeriesMean,
    Absolute(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakParams {
    /// Minimum distance between kept peaks, in samples of the daily axis.
    pub min_spacing: usize,
    pub height: HeightThreshold,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            min_spacing: DEFAULT_MIN_PEAK_SPACING,
            height: HeightThreshold::SeriesMean,
        }
    }
}

impl PeakParams {
    pub fn resolve_height(&self, smoothed: &[Option<f64>]) -> Option<f64> {
        match self.height {
            HeightThreshold::Absolute(value) => Some(value),
            HeightThreshold::SeriesMean => {
                let present: Vec<f64> = smoothed
                    .iter()
                    .flatten()
                    .copied()
                    .filter(|v| v.is_finite())
                    .collect();
                if present.is_empty() {
                    None
                } else {
                    Some(present.iter().sum::<f64>() / present.len() as f64)
                }
            }
        }
    }
}

/// Run `detector` with the height threshold resolved against the series itself.
pub fn detect_series_peaks(
    detector: &dyn PeakDetector,
    dates: &[NaiveDate],
    smoothed: &[Option<f64>],
    params: &PeakParams,
) -> Vec<NaiveDate> {
    let Some(min_height) = params.resolve_height(smoothed) else {
        return Vec::new();
    };
    detector.detect(dates, smoothed, params.min_spacing, min_height)
}

/// Local maxima filtered by height, then thinned by spacing (tallest first).
///
/// Flat tops report their midpoint (rounded down). The first and last samples never qualify,
/// and neither does a missing sample or one next to a missing neighbour.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMaximaDetector;

impl PeakDetector for LocalMaximaDetector {
    fn detect(
        &self,
        dates: &[NaiveDate],
        smoothed: &[Option<f64>],
        min_spacing: usize,
        min_height: f64,
    ) -> Vec<NaiveDate> {
        let len = dates.len().min(smoothed.len());
        let values: Vec<f64> = smoothed[..len]
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();

        let candidates: Vec<usize> = local_maxima(&values)
            .into_iter()
            .filter(|idx| values[*idx] >= min_height)
            .collect();
        let kept = thin_by_spacing(&candidates, &values, min_spacing);

        kept.into_iter().map(|idx| dates[idx]).collect()
    }
}

fn local_maxima(values: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if values.len() < 3 {
        return peaks;
    }
    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                let right = ahead - 1;
                peaks.push((i + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

fn thin_by_spacing(peaks: &[usize], values: &[f64], min_spacing: usize) -> Vec<usize> {
    if min_spacing <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|a, b| values[peaks[*a]].total_cmp(&values[peaks[*b]]));

    let mut keep = vec![true; peaks.len()];
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < min_spacing {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < min_spacing {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(idx, kept)| kept.then_some(*idx))
        .collect()
}
