pub mod detect;
pub mod matcher;
pub mod summary;

pub use detect::{detect_series_peaks, HeightThreshold, LocalMaximaDetector, PeakDetector, PeakParams};
pub use matcher::match_peaks;
pub use summary::{lag_moments, summarize_lags};
