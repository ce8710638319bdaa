pub mod comparison;
pub mod event_window;
pub mod trends;

pub use comparison::{compare_pair, cumulative_cycles, CyclePoint, PairComparison};
pub use event_window::{
    contrast_event, relative_change_pct, EventContrast, EventWindow, PeriodMetrics, PeriodSummary,
    ReferenceMode, SeriesContrast,
};
pub use trends::{explore_trends, MonthMean, SeriesSummary, SeriesTrend, TrendReport, YearMean};
