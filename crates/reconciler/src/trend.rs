//! Linear trend of slippage over time.
//!
//! Fits ordinary least squares of `avg_slippage` against the zero-based
//! period index and tests the slope with a normal approximation to the t
//! distribution. The approximation understates p-values for short series;
//! the `confidence` label on the result reflects the sample size.

use drift_core::types::{ConfidenceLevel, PeriodSlippage, TrendInterpretation, TrendResult};
use tracing::debug;

use crate::stats::normal_cdf;

/// Significance level for calling a trend.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

pub struct TrendRegressor;

impl TrendRegressor {
    /// Fit the trend. `None` for an empty series.
    pub fn fit(periods: &[PeriodSlippage]) -> Option<TrendResult> {
        let values: Vec<f64> = periods.iter().map(|p| p.avg_slippage).collect();
        Self::fit_values(&values)
    }

    pub fn fit_values(values: &[f64]) -> Option<TrendResult> {
        if values.is_empty() {
            return None;
        }

        let n = values.len();
        let nf = n as f64;
        let mean_x = (nf - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / nf;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - mean_x;
            sxx += dx * dx;
            sxy += dx * (y - mean_y);
        }

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let intercept = mean_y - slope * mean_x;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (i, y) in values.iter().enumerate() {
            let predicted = intercept + slope * i as f64;
            ss_res += (y - predicted).powi(2);
            ss_tot += (y - mean_y).powi(2);
        }

        let r_squared = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            0.0
        };

        let residual_variance = if n > 2 { ss_res / (nf - 2.0) } else { 0.0 };
        let stderr = if sxx > 0.0 {
            (residual_variance / sxx).sqrt()
        } else {
            0.0
        };

        let t_stat = if stderr > 0.0 {
            slope / stderr
        } else if slope != 0.0 && n > 2 {
            // Residuals are exactly zero: a perfect fit
            slope.signum() * f64::INFINITY
        } else {
            0.0
        };
        let p_value = (2.0 * (1.0 - normal_cdf(t_stat.abs()))).clamp(0.0, 1.0);

        let interpretation = if p_value >= SIGNIFICANCE_LEVEL {
            TrendInterpretation::Stable
        } else if slope < 0.0 {
            TrendInterpretation::Improving
        } else if slope > 0.0 {
            TrendInterpretation::Degrading
        } else {
            TrendInterpretation::Stable
        };

        debug!(
            n,
            slope,
            p_value,
            r_squared,
            interpretation = interpretation.name(),
            "Fitted slippage trend"
        );

        Some(TrendResult {
            slope,
            intercept,
            r_squared,
            p_value,
            stderr,
            interpretation,
            confidence: ConfidenceLevel::from_sample_size(n),
            sample_size: n,
        })
    }
}
