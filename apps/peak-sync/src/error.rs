use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("search window must be non-negative (got {window_days} days)")]
    InvalidWindow { window_days: i64 },
    #[error("unknown series: {label}")]
    UnknownSeries { label: String },
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },
}

impl AnalysisError {
    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    pub fn unknown_series(label: impl Into<String>) -> Self {
        Self::UnknownSeries {
            label: label.into(),
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
