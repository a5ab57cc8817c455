//! Summary statistics over simulation sample sets.
//!
//! Percentiles and confidence intervals come from the empirical sample
//! distribution (linear interpolation between order statistics), never an
//! assumed normal, unless the sample count is below the configured minimum,
//! in which case the normal approximation is used and the result is flagged.

use crate::analysis::types::Interval;

/// z-scores for the normal-approximation fallback.
const Z_90: f64 = 1.6449;
const Z_95: f64 = 1.9600;
const Z_99: f64 = 2.5758;

/// Computed summary of one sample set.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub percentile_5: f64,
    pub percentile_95: f64,
    pub ci_90: Interval,
    pub ci_95: Interval,
    pub ci_99: Interval,
    pub probability_positive: f64,
    pub low_sample_approximation: bool,
}

/// Summarize a non-empty sample set.
///
/// `baseline` is the KPI's zero point for `probability_positive`.
/// Sorts the buffer in place.
pub fn summarize(samples: &mut [f64], baseline: f64, min_samples_for_empirical: usize) -> SampleStats {
    debug_assert!(!samples.is_empty());

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    // Population standard deviation.
    let variance = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let probability_positive = samples.iter().filter(|&&x| x > baseline).count() as f64 / n;

    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    if samples.len() < min_samples_for_empirical {
        // Too few samples for trustworthy tail quantiles: normal fallback.
        // The approximation's median is its mean, which also preserves
        // p5 ≤ median ≤ p95 by construction.
        return SampleStats {
            mean,
            median: mean,
            std_dev,
            percentile_5: mean - Z_90 * std_dev,
            percentile_95: mean + Z_90 * std_dev,
            ci_90: interval_around(mean, std_dev, Z_90),
            ci_95: interval_around(mean, std_dev, Z_95),
            ci_99: interval_around(mean, std_dev, Z_99),
            probability_positive,
            low_sample_approximation: true,
        };
    }

    SampleStats {
        mean,
        median: quantile(samples, 0.5),
        std_dev,
        percentile_5: quantile(samples, 0.05),
        percentile_95: quantile(samples, 0.95),
        ci_90: Interval {
            low: quantile(samples, 0.05),
            high: quantile(samples, 0.95),
        },
        ci_95: Interval {
            low: quantile(samples, 0.025),
            high: quantile(samples, 0.975),
        },
        ci_99: Interval {
            low: quantile(samples, 0.005),
            high: quantile(samples, 0.995),
        },
        probability_positive,
        low_sample_approximation: false,
    }
}

fn interval_around(mean: f64, std_dev: f64, z: f64) -> Interval {
    Interval {
        low: mean - z * std_dev,
        high: mean + z * std_dev,
    }
}

/// Linear-interpolated quantile of a sorted sample set.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((quantile(&sorted, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile(&sorted, 0.5) - 3.0).abs() < 1e-12);
        assert!((quantile(&sorted, 1.0) - 5.0).abs() < 1e-12);
        assert!((quantile(&sorted, 0.25) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empirical_percentile_ordering() {
        let mut samples: Vec<f64> = (0..1000).map(|i| (i as f64) * 0.01 - 5.0).collect();
        let stats = summarize(&mut samples, 0.0, 100);

        assert!(!stats.low_sample_approximation);
        assert!(stats.percentile_5 <= stats.median);
        assert!(stats.median <= stats.percentile_95);
        // Wider intervals nest the narrower ones.
        assert!(stats.ci_99.low <= stats.ci_95.low);
        assert!(stats.ci_95.low <= stats.ci_90.low);
        assert!(stats.ci_90.high <= stats.ci_95.high);
        assert!(stats.ci_95.high <= stats.ci_99.high);
    }

    #[test]
    fn test_low_sample_fallback_flagged() {
        let mut samples = vec![0.1, 0.2, 0.3];
        let stats = summarize(&mut samples, 0.0, 100);

        assert!(stats.low_sample_approximation);
        assert_eq!(stats.median, stats.mean);
        assert!(stats.percentile_5 <= stats.median);
        assert!(stats.median <= stats.percentile_95);
    }

    #[test]
    fn test_probability_positive_with_baseline() {
        let mut samples = vec![-1.0, 0.5, 1.0, 2.0];
        let stats = summarize(&mut samples, 0.75, 1);
        // Two of four samples exceed the 0.75 baseline.
        assert!((stats.probability_positive - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_population_std_dev() {
        let mut samples = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = summarize(&mut samples, 0.0, 1);
        // Classic population-σ example: σ = 2.
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
    }
}
