use crate::services::analysis::peaks::{HeightThreshold, PeakParams};
use crate::services::analysis::synchrony::{FeatureParams, SynchronyParams};
use crate::services::analysis::types::{
    WindowConfig, DEFAULT_COMPARISON_LAG_RANGE_DAYS, DEFAULT_MATRIX_LAG_RANGE_DAYS,
    DEFAULT_MIN_PEAK_SPACING, DEFAULT_RELIABLE_WINDOW_DAYS, DEFAULT_SEARCH_WINDOW_DAYS,
    DEFAULT_SMOOTHING_WINDOW, DEFAULT_TREND_WINDOW,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub(crate) fn config_override_path() -> Option<PathBuf> {
    env_optional_string("PEAK_SYNC_CONFIG_PATH").map(PathBuf::from)
}

/// JSON overrides layered on top of the environment. Absent keys keep the env value.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ConfigOverrides {
    #[serde(default)]
    search_window_days: Option<i64>,
    /// `null` is indistinguishable from absent; use `disable_reliable_window` to turn
    /// trimming off.
    #[serde(default)]
    reliable_window_days: Option<i64>,
    #[serde(default)]
    disable_reliable_window: Option<bool>,
    #[serde(default)]
    matrix_lag_range_days: Option<i64>,
    #[serde(default)]
    comparison_lag_range_days: Option<i64>,
    #[serde(default)]
    smoothing_window: Option<usize>,
    #[serde(default)]
    trend_window: Option<usize>,
    #[serde(default)]
    min_peak_spacing: Option<usize>,
    #[serde(default)]
    peak_height: Option<HeightThreshold>,
}

pub(crate) fn load_config_overrides(path: &Path) -> Option<ConfigOverrides> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config override file not found; using env defaults");
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read config overrides; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse config overrides; using env defaults"
            );
            None
        }
    }
}

fn apply_overrides(config: &mut AnalysisConfig, overrides: &ConfigOverrides) {
    if let Some(days) = overrides.search_window_days {
        config.search_window_days = days;
    }
    if let Some(days) = overrides.reliable_window_days {
        config.reliable_window_days = Some(days);
    }
    if overrides.disable_reliable_window == Some(true) {
        config.reliable_window_days = None;
    }
    if let Some(days) = overrides.matrix_lag_range_days {
        config.matrix_lag_range_days = days;
    }
    if let Some(days) = overrides.comparison_lag_range_days {
        config.comparison_lag_range_days = days;
    }
    if let Some(window) = overrides.smoothing_window {
        config.smoothing_window = window;
    }
    if let Some(window) = overrides.trend_window {
        config.trend_window = window;
    }
    if let Some(spacing) = overrides.min_peak_spacing {
        config.min_peak_spacing = spacing;
    }
    if let Some(height) = overrides.peak_height {
        config.peak_height = height;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfig {
    pub search_window_days: i64,
    pub reliable_window_days: Option<i64>,
    pub matrix_lag_range_days: i64,
    pub comparison_lag_range_days: i64,
    pub smoothing_window: usize,
    pub trend_window: usize,
    pub min_peak_spacing: usize,
    pub peak_height: HeightThreshold,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            search_window_days: DEFAULT_SEARCH_WINDOW_DAYS,
            reliable_window_days: Some(DEFAULT_RELIABLE_WINDOW_DAYS),
            matrix_lag_range_days: DEFAULT_MATRIX_LAG_RANGE_DAYS,
            comparison_lag_range_days: DEFAULT_COMPARISON_LAG_RANGE_DAYS,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            trend_window: DEFAULT_TREND_WINDOW,
            min_peak_spacing: DEFAULT_MIN_PEAK_SPACING,
            peak_height: HeightThreshold::SeriesMean,
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mut config = Self {
            search_window_days: env_i64("PEAK_SYNC_SEARCH_WINDOW_DAYS", defaults.search_window_days),
            reliable_window_days: env_optional_string("PEAK_SYNC_RELIABLE_WINDOW_DAYS")
                .map(|raw| parse_reliable_window(&raw))
                .unwrap_or(defaults.reliable_window_days),
            matrix_lag_range_days: env_i64(
                "PEAK_SYNC_MATRIX_LAG_RANGE_DAYS",
                defaults.matrix_lag_range_days,
            ),
            comparison_lag_range_days: env_i64(
                "PEAK_SYNC_COMPARISON_LAG_RANGE_DAYS",
                defaults.comparison_lag_range_days,
            ),
            smoothing_window: env_usize("PEAK_SYNC_SMOOTHING_WINDOW", defaults.smoothing_window),
            trend_window: env_usize("PEAK_SYNC_TREND_WINDOW", defaults.trend_window),
            min_peak_spacing: env_usize("PEAK_SYNC_MIN_PEAK_SPACING", defaults.min_peak_spacing),
            peak_height: env_optional_string("PEAK_SYNC_PEAK_HEIGHT")
                .and_then(|raw| parse_peak_height(&raw))
                .unwrap_or(defaults.peak_height),
        };

        if let Some(path) = config_override_path() {
            if let Some(overrides) = load_config_overrides(&path) {
                apply_overrides(&mut config, &overrides);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_window_days < 0 {
            anyhow::bail!(
                "search window must be non-negative (got {})",
                self.search_window_days
            );
        }
        if self.matrix_lag_range_days < 0 || self.comparison_lag_range_days < 0 {
            anyhow::bail!("lag ranges must be non-negative");
        }
        if self.smoothing_window == 0 || self.trend_window == 0 {
            anyhow::bail!("smoothing and trend windows must be at least 1");
        }
        if let HeightThreshold::Absolute(value) = self.peak_height {
            if !value.is_finite() {
                anyhow::bail!("peak height must be finite");
            }
        }
        Ok(())
    }

    pub fn windows(&self) -> WindowConfig {
        WindowConfig::new(self.search_window_days, self.reliable_window_days)
    }

    pub fn feature_params(&self) -> FeatureParams {
        FeatureParams {
            smoothing_window: self.smoothing_window,
            trend_window: self.trend_window,
            peaks: PeakParams {
                min_spacing: self.min_peak_spacing,
                height: self.peak_height,
            },
        }
    }

    pub fn synchrony_params(&self) -> SynchronyParams {
        SynchronyParams {
            windows: self.windows(),
            max_lag_days: self.matrix_lag_range_days,
            features: self.feature_params(),
        }
    }
}

/// `none`/`off` disables trimming; anything unparseable warns and keeps the default.
pub(crate) fn parse_reliable_window(raw: &str) -> Option<i64> {
    match raw.trim().to_lowercase().as_str() {
        "none" | "off" => None,
        value => match value.parse::<i64>() {
            Ok(days) => Some(days),
            Err(err) => {
                tracing::warn!(
                    value = raw,
                    error = %err,
                    default = DEFAULT_RELIABLE_WINDOW_DAYS,
                    "invalid PEAK_SYNC_RELIABLE_WINDOW_DAYS; using default"
                );
                Some(DEFAULT_RELIABLE_WINDOW_DAYS)
            }
        },
    }
}

/// `mean` or an absolute number.
pub(crate) fn parse_peak_height(raw: &str) -> Option<HeightThreshold> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("mean") {
        return Some(HeightThreshold::SeriesMean);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(HeightThreshold::Absolute)
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}
