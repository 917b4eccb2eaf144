//! Statistical primitives shared by the detectors.
//!
//! Sample statistics and the normal CDF come from `statrs`. Correlations
//! return `None` instead of NaN when a series has no variance or is too
//! short, so callers never compare against NaN.

use drift_core::types::CorrelationMethod;
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::{Data, Distribution, OrderStatistics};

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Data::new(values.to_vec()).mean().unwrap_or(0.0)
}

/// Sample standard deviation, 0 with fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    Data::new(values.to_vec())
        .std_dev()
        .filter(|s| s.is_finite())
        .unwrap_or(0.0)
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut data = Data::new(values.to_vec());
    data.median()
}

/// First and third quartiles.
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mut data = Data::new(values.to_vec());
    Some((data.lower_quartile(), data.upper_quartile()))
}

/// Tukey fences at 1.5 IQR beyond the quartiles.
pub fn iqr_fences(values: &[f64]) -> Option<(f64, f64)> {
    let (q1, q3) = quartiles(values)?;
    let iqr = q3 - q1;
    Some((q1 - 1.5 * iqr, q3 + 1.5 * iqr))
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(x: f64) -> f64 {
    if x == f64::INFINITY {
        return 1.0;
    }
    if x == f64::NEG_INFINITY {
        return 0.0;
    }
    Normal::new(0.0, 1.0).map(|n| n.cdf(x)).unwrap_or(0.5)
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return None;
    }

    let r = sxy / (sxx * syy).sqrt();
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// 1-based ranks with ties sharing their average rank.
pub fn rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Positions i..=j hold equal values
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    ranks
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() {
        return None;
    }
    pearson(&rank(x), &rank(y))
}

/// Kendall's tau-b, which corrects for ties on either side.
pub fn kendall_tau(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let mut concordant = 0i64;
    let mut discordant = 0i64;
    let mut ties_x = 0i64;
    let mut ties_y = 0i64;

    for i in 0..x.len() {
        for j in (i + 1)..x.len() {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            if dx == 0.0 && dy == 0.0 {
                continue;
            } else if dx == 0.0 {
                ties_x += 1;
            } else if dy == 0.0 {
                ties_y += 1;
            } else if (dx > 0.0) == (dy > 0.0) {
                concordant += 1;
            } else {
                discordant += 1;
            }
        }
    }

    let n0 = (concordant + discordant + ties_x) as f64;
    let n1 = (concordant + discordant + ties_y) as f64;
    let denominator = (n0 * n1).sqrt();
    if denominator == 0.0 {
        return None;
    }

    let tau = (concordant - discordant) as f64 / denominator;
    tau.is_finite().then_some(tau)
}

pub fn correlate(method: CorrelationMethod, x: &[f64], y: &[f64]) -> Option<f64> {
    match method {
        CorrelationMethod::Pearson => pearson(x, y),
        CorrelationMethod::Spearman => spearman(x, y),
        CorrelationMethod::Kendall => kendall_tau(x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(approx(mean(&values), 5.0));
        // Sample std dev: sqrt(32 / 7)
        assert!(approx(std_dev(&values), (32.0_f64 / 7.0).sqrt()));

        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
    }

    #[test]
    fn test_pearson_perfect_and_degenerate() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(pearson(&x, &[2.0, 4.0, 6.0, 8.0]).unwrap(), 1.0));
        assert!(approx(pearson(&x, &[8.0, 6.0, 4.0, 2.0]).unwrap(), -1.0));

        // Constant series has no variance
        assert_eq!(pearson(&x, &[5.0, 5.0, 5.0, 5.0]), None);
        assert_eq!(pearson(&[1.0], &[1.0]), None);
        assert_eq!(pearson(&x, &[1.0, 2.0]), None);
    }

    #[test]
    fn test_rank_averages_ties() {
        assert_eq!(rank(&[10.0, 30.0, 20.0, 20.0]), vec![1.0, 4.0, 2.5, 2.5]);
        assert!(rank(&[]).is_empty());
    }

    #[test]
    fn test_spearman_monotonic_nonlinear() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 8.0, 27.0, 64.0, 125.0];
        assert!(approx(spearman(&x, &y).unwrap(), 1.0));
        assert!(pearson(&x, &y).unwrap() < 1.0);
    }

    #[test]
    fn test_kendall_tau() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(kendall_tau(&x, &[1.0, 2.0, 3.0, 4.0]).unwrap(), 1.0));
        assert!(approx(kendall_tau(&x, &[4.0, 3.0, 2.0, 1.0]).unwrap(), -1.0));

        // Pairs: (1,2)+ (1,3)+ (1,4)+ (2,3)- (2,4)+ (3,4)+ => (5 - 1) / 6
        let tau = kendall_tau(&x, &[1.0, 3.0, 2.0, 4.0]).unwrap();
        assert!(approx(tau, 4.0 / 6.0));

        assert_eq!(kendall_tau(&x, &[2.0, 2.0, 2.0, 2.0]), None);
    }

    #[test]
    fn test_normal_cdf() {
        assert!(approx(normal_cdf(0.0), 0.5));
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert_eq!(normal_cdf(f64::INFINITY), 1.0);
        assert_eq!(normal_cdf(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_iqr_fences() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let (lower, upper) = iqr_fences(&values).unwrap();
        assert!(lower < 1.0);
        assert!(upper > 8.0);
        assert!(iqr_fences(&[]).is_none());
    }
}
