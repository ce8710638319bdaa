use crate::error::{AnalysisError, AnalysisResult};
use crate::services::analysis::types::BestLag;

/// Pearson correlation between `a[t]` and `b[t - lag]` over the steps where both exist.
///
/// Needs at least two overlapping pairs and non-zero spread on both sides.
pub fn pearson_with_shift(a: &[Option<f64>], b: &[Option<f64>], lag: i64) -> Option<f64> {
    let mut xs: Vec<f64> = Vec::new();
    let mut ys: Vec<f64> = Vec::new();
    for (t, x) in a.iter().enumerate() {
        let Some(x) = x.filter(|v| v.is_finite()) else {
            continue;
        };
        let source = t as i64 - lag;
        if source < 0 {
            continue;
        }
        let Some(y) = b
            .get(source as usize)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
        else {
            continue;
        };
        xs.push(x);
        ys.push(y);
    }
    pearson_from_aligned(&xs, &ys)
}

pub fn pearson_from_aligned(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    let denom = (sxx * syy).sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return None;
    }
    let r = sxy / denom;
    Some(r.max(-1.0).min(1.0))
}

/// Brute-force scan of `[-max_lag, max_lag]` for the lag maximising Pearson correlation.
///
/// Lags are visited ascending and the running best (seeded at lag 0 with correlation -1)
/// is replaced only on a strictly greater value, so the most negative lag wins ties.
pub fn best_lag(a: &[Option<f64>], b: &[Option<f64>], max_lag: i64) -> AnalysisResult<BestLag> {
    if max_lag < 0 {
        return Err(AnalysisError::invalid_parameter(
            "max_lag",
            format!("lag range must be non-negative (got {max_lag})"),
        ));
    }

    let mut best_corr = -1.0_f64;
    let mut best = BestLag {
        lag_days: 0,
        correlation: None,
    };
    for lag in -max_lag..=max_lag {
        let Some(r) = pearson_with_shift(a, b, lag) else {
            continue;
        };
        if r > best_corr {
            best_corr = r;
            best = BestLag {
                lag_days: lag,
                correlation: Some(r),
            };
        }
    }
    Ok(best)
}
