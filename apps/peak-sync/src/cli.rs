use crate::config::AnalysisConfig;
use crate::services::analysis::reports::ReferenceMode;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "peak-sync",
    version,
    about = "Peak matching and synchrony metrics for daily series"
)]
pub struct Cli {
    /// CSV with the date in the first column and one series per remaining column.
    #[arg(long, global = true, default_value = "data.csv")]
    pub data: PathBuf,
    #[command(flatten)]
    pub overrides: ConfigArgs,
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags layered over `PEAK_SYNC_*` and the JSON override file.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    #[arg(long, global = true)]
    pub search_window_days: Option<i64>,
    #[arg(long, global = true, conflicts_with = "no_reliable_window")]
    pub reliable_window_days: Option<i64>,
    #[arg(long, global = true, default_value_t = false)]
    pub no_reliable_window: bool,
    #[arg(long, global = true)]
    pub lag_range_days: Option<i64>,
    #[arg(long, global = true)]
    pub smoothing_window: Option<usize>,
    #[arg(long, global = true)]
    pub trend_window: Option<usize>,
    #[arg(long, global = true)]
    pub min_peak_spacing: Option<usize>,
}

impl ConfigArgs {
    /// `--lag-range-days` applies to both the matrix and the pair comparison scans.
    pub fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(days) = self.search_window_days {
            config.search_window_days = days;
        }
        if let Some(days) = self.reliable_window_days {
            config.reliable_window_days = Some(days);
        }
        if self.no_reliable_window {
            config.reliable_window_days = None;
        }
        if let Some(days) = self.lag_range_days {
            config.matrix_lag_range_days = days;
            config.comparison_lag_range_days = days;
        }
        if let Some(window) = self.smoothing_window {
            config.smoothing_window = window;
        }
        if let Some(window) = self.trend_window {
            config.trend_window = window;
        }
        if let Some(spacing) = self.min_peak_spacing {
            config.min_peak_spacing = spacing;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trend synchrony, lag variance and best lag for every pair of series.
    Matrix(MatrixArgs),
    Compare(CompareArgs),
    /// Contrast an event window against a reference period.
    Event(EventArgs),
    /// Runs above a threshold for one series.
    Episodes(EpisodesArgs),
    /// Summary statistics, monthly and yearly profiles and correlations over a date range.
    Trends(TrendsArgs),
}

#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Restrict to these series (default: all).
    #[arg(long = "series", value_delimiter = ',')]
    pub series: Vec<String>,
    #[arg(long)]
    pub start: Option<NaiveDate>,
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    #[arg(long)]
    pub master: String,
    #[arg(long)]
    pub slave: String,
}

#[derive(Args, Debug)]
pub struct EventArgs {
    #[arg(long)]
    pub master: String,
    #[arg(long)]
    pub slave: String,
    #[arg(long)]
    pub start: NaiveDate,
    #[arg(long)]
    pub end: NaiveDate,
    #[arg(long, value_enum, default_value_t = ReferenceMode::PreviousPeriod)]
    pub reference: ReferenceMode,
}

#[derive(Args, Debug)]
pub struct EpisodesArgs {
    #[arg(long)]
    pub series: String,
    #[arg(long, conflicts_with = "threshold", required_unless_present = "threshold")]
    pub percentile: Option<f64>,
    #[arg(long)]
    pub threshold: Option<f64>,
    #[arg(long, default_value_t = 1)]
    pub min_days: i64,
}

#[derive(Args, Debug)]
pub struct TrendsArgs {
    /// Restrict to these series (default: all).
    #[arg(long = "series", value_delimiter = ',')]
    pub series: Vec<String>,
    #[arg(long)]
    pub start: Option<NaiveDate>,
    #[arg(long)]
    pub end: Option<NaiveDate>,
}
