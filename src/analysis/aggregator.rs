//! Precision-weighted Bayesian blending of quality-scored evidence.
//!
//! Each evidence item is treated as an observation with precision
//! proportional to `quality_score² × recency_decay(age)`. Items are combined
//! by precision-weighted averaging (a Bayesian update under Gaussian-like
//! per-item belief); posterior confidence is a saturating function of total
//! precision, damped by disagreement among the sources.
//!
//! # Outlier handling
//!
//! A second pass down-weights (never discards) items whose value deviates
//! from the first-pass posterior by more than the configured threshold,
//! scaling their weight by `(threshold / deviation)²`. One low-quality
//! contradicting source can therefore shift the posterior only marginally,
//! while a genuine cluster of dissent still registers as lower concordance.
//!
//! # Determinism
//!
//! Pure function over (items, reference time, config): no wall clock, no
//! randomness, order-independent (all reductions are commutative sums).

use chrono::{DateTime, Utc};

use crate::analysis::config::AggregatorConfig;
use crate::analysis::types::EvidenceItem;
use crate::errors::ScoreError;

/// Posterior produced by blending one dimension's evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedValue {
    /// Precision-weighted posterior value in [0, 1]
    pub value: f64,
    /// Saturating posterior confidence in [0, 1), strictly below 1
    pub confidence: f64,
    /// Total effective precision after the outlier pass
    pub total_weight: f64,
    /// Source ids down-weighted as outliers on the second pass
    pub downweighted: Vec<String>,
}

/// Stateless evidence blender.
#[derive(Debug, Clone)]
pub struct EvidenceAggregator {
    config: AggregatorConfig,
}

impl EvidenceAggregator {
    /// Create with given configuration.
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(AggregatorConfig::default())
    }

    /// Blend a non-empty evidence collection into one (value, confidence).
    ///
    /// `label` names the dimension for error reporting. `now` is the analysis
    /// run's reference time; recency decay is computed against it so repeated
    /// runs over the same inputs reproduce identical outputs.
    pub fn aggregate(
        &self,
        label: &str,
        items: &[EvidenceItem],
        now: DateTime<Utc>,
    ) -> Result<AggregatedValue, ScoreError> {
        if items.is_empty() {
            return Err(ScoreError::InsufficientEvidence {
                dimension: label.to_string(),
            });
        }

        // First pass: precision weights and raw posterior.
        let weights: Vec<f64> = items.iter().map(|item| self.precision(item, now)).collect();
        let first_weight: f64 = weights.iter().sum();
        let first_posterior = if first_weight > f64::EPSILON {
            items
                .iter()
                .zip(&weights)
                .map(|(item, w)| w * item.raw_value.clamp(0.0, 1.0))
                .sum::<f64>()
                / first_weight
        } else {
            // All weights degenerate (zero quality): fall back to a plain mean
            items
                .iter()
                .map(|item| item.raw_value.clamp(0.0, 1.0))
                .sum::<f64>()
                / items.len() as f64
        };

        // Second pass: down-weight outliers relative to the first posterior.
        let threshold = self.config.outlier_threshold;
        let mut downweighted = Vec::new();
        let adjusted: Vec<f64> = items
            .iter()
            .zip(&weights)
            .map(|(item, w)| {
                let deviation = (item.raw_value.clamp(0.0, 1.0) - first_posterior).abs();
                if deviation > threshold && threshold > 0.0 {
                    downweighted.push(item.source_id.clone());
                    let damp = threshold / deviation;
                    w * damp * damp
                } else {
                    *w
                }
            })
            .collect();

        let total_weight: f64 = adjusted.iter().sum();
        let value = if total_weight > f64::EPSILON {
            items
                .iter()
                .zip(&adjusted)
                .map(|(item, w)| w * item.raw_value.clamp(0.0, 1.0))
                .sum::<f64>()
                / total_weight
        } else {
            first_posterior
        };

        // Tie-break order of the report is by source id, not input order.
        downweighted.sort();

        let confidence = self.confidence(value, items, &adjusted, total_weight);

        Ok(AggregatedValue {
            value: value.clamp(0.0, 1.0),
            confidence,
            total_weight,
            downweighted,
        })
    }

    /// Precision weight of one item: quality² × recency decay.
    fn precision(&self, item: &EvidenceItem, now: DateTime<Utc>) -> f64 {
        let quality = item.quality_score.clamp(0.0, 1.0);
        quality * quality * self.recency_decay(item.recency, now)
    }

    /// Exponential half-life decay, floored so old evidence never vanishes.
    fn recency_decay(&self, recency: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = (now - recency).num_seconds().max(0) as f64 / 86_400.0;
        let half_life = self.config.recency_half_life_days.max(f64::EPSILON);
        let decay = 0.5_f64.powf(age_days / half_life);
        decay.max(self.config.min_recency_weight)
    }

    /// Saturating confidence: 1 − exp(−W / scale), damped by weighted
    /// dispersion of the values around the posterior. Strictly below 1.
    fn confidence(
        &self,
        posterior: f64,
        items: &[EvidenceItem],
        adjusted: &[f64],
        total_weight: f64,
    ) -> f64 {
        if total_weight <= f64::EPSILON {
            return 0.0;
        }
        let scale = self.config.confidence_scale.max(f64::EPSILON);
        let saturation = 1.0 - (-total_weight / scale).exp();

        let variance = items
            .iter()
            .zip(adjusted)
            .map(|(item, w)| {
                let d = item.raw_value.clamp(0.0, 1.0) - posterior;
                w * d * d
            })
            .sum::<f64>()
            / total_weight;
        let concordance = (1.0 - variance.sqrt()).clamp(0.0, 1.0);

        (saturation * concordance).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{Dimension, Provenance, StrategicLayer};

    fn item(source_id: &str, value: f64, quality: f64, now: DateTime<Utc>) -> EvidenceItem {
        EvidenceItem {
            source_id: source_id.to_string(),
            dimension: Dimension::Layer(StrategicLayer::Consumer),
            raw_value: value,
            quality_score: quality,
            recency: now,
            provenance: Provenance::Scrape,
            summary: format!("evidence from {source_id}"),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_empty_input_fails() {
        let agg = EvidenceAggregator::with_defaults();
        let err = agg.aggregate("consumer", &[], now()).unwrap_err();
        assert!(matches!(err, ScoreError::InsufficientEvidence { .. }));
    }

    #[test]
    fn test_scenario_two_strong_one_weak_outlier() {
        // Qualities [0.9, 0.8, 0.2], values [0.8, 0.75, 0.1]: the low-quality
        // contradicting source must not drag the posterior away from the two
        // concordant high-quality items.
        let agg = EvidenceAggregator::with_defaults();
        let t = now();
        let items = vec![
            item("s1", 0.8, 0.9, t),
            item("s2", 0.75, 0.8, t),
            item("s3", 0.1, 0.2, t),
        ];

        let out = agg.aggregate("consumer", &items, t).unwrap();
        assert!(
            out.value > 0.77 && out.value < 0.78,
            "value {} outside expected band",
            out.value
        );
        assert!(out.confidence > 0.6, "confidence {} too low", out.confidence);
        assert_eq!(out.downweighted, vec!["s3".to_string()]);
    }

    #[test]
    fn test_order_independence() {
        let agg = EvidenceAggregator::with_defaults();
        let t = now();
        let mut items = vec![
            item("a", 0.9, 0.7, t),
            item("b", 0.4, 0.5, t),
            item("c", 0.6, 0.9, t),
            item("d", 0.2, 0.3, t),
        ];

        let forward = agg.aggregate("consumer", &items, t).unwrap();
        items.reverse();
        let backward = agg.aggregate("consumer", &items, t).unwrap();

        assert_eq!(forward.value, backward.value);
        assert_eq!(forward.confidence, backward.confidence);
    }

    #[test]
    fn test_confidence_monotone_in_count() {
        let agg = EvidenceAggregator::with_defaults();
        let t = now();

        // Concordant evidence, growing count.
        let mut previous = 0.0;
        for n in 1..=8 {
            let items: Vec<_> = (0..n).map(|i| item(&format!("s{i}"), 0.7, 0.8, t)).collect();
            let out = agg.aggregate("consumer", &items, t).unwrap();
            assert!(
                out.confidence >= previous,
                "confidence dropped at n={n}: {} < {previous}",
                out.confidence
            );
            previous = out.confidence;
        }
    }

    #[test]
    fn test_confidence_monotone_in_quality() {
        let agg = EvidenceAggregator::with_defaults();
        let t = now();

        let mut previous = 0.0;
        for q in [0.2, 0.4, 0.6, 0.8, 1.0] {
            let items = vec![item("a", 0.7, q, t), item("b", 0.7, q, t)];
            let out = agg.aggregate("consumer", &items, t).unwrap();
            assert!(
                out.confidence >= previous,
                "confidence dropped at q={q}: {} < {previous}",
                out.confidence
            );
            previous = out.confidence;
        }
    }

    #[test]
    fn test_confidence_never_reaches_one() {
        let agg = EvidenceAggregator::with_defaults();
        let t = now();
        let items: Vec<_> = (0..500)
            .map(|i| item(&format!("s{i}"), 0.8, 1.0, t))
            .collect();

        let out = agg.aggregate("consumer", &items, t).unwrap();
        assert!(out.confidence < 1.0);
        assert!(out.confidence > 0.99);
    }

    #[test]
    fn test_recency_decay_prefers_fresh_evidence() {
        let agg = EvidenceAggregator::with_defaults();
        let t = now();
        let stale = t - chrono::Duration::days(365);

        // Fresh says 0.8, stale says 0.2, same quality.
        let items = vec![
            EvidenceItem {
                recency: stale,
                ..item("old", 0.2, 0.8, t)
            },
            item("new", 0.8, 0.8, t),
        ];

        let out = agg.aggregate("consumer", &items, t).unwrap();
        assert!(out.value > 0.6, "fresh evidence should dominate: {}", out.value);
    }

    #[test]
    fn test_outlier_influence_is_bounded() {
        let agg = EvidenceAggregator::with_defaults();
        let t = now();

        let concordant: Vec<_> = (0..4).map(|i| item(&format!("s{i}"), 0.8, 0.8, t)).collect();
        let base = agg.aggregate("consumer", &concordant, t).unwrap();

        let mut with_outlier = concordant.clone();
        with_outlier.push(item("outlier", 0.0, 0.9, t));
        let shifted = agg.aggregate("consumer", &with_outlier, t).unwrap();

        // Even a high-quality contradicting source moves the posterior by
        // only a bounded amount once down-weighted.
        assert!((base.value - shifted.value).abs() < 0.1);
        assert_eq!(shifted.downweighted, vec!["outlier".to_string()]);
    }

    #[test]
    fn test_zero_quality_evidence_falls_back_to_mean() {
        let agg = EvidenceAggregator::with_defaults();
        let t = now();
        let items = vec![item("a", 0.4, 0.0, t), item("b", 0.6, 0.0, t)];

        let out = agg.aggregate("consumer", &items, t).unwrap();
        assert!((out.value - 0.5).abs() < 1e-9);
        assert_eq!(out.confidence, 0.0);
    }

    #[test]
    fn test_values_clamped_to_unit_interval() {
        let agg = EvidenceAggregator::with_defaults();
        let t = now();
        let items = vec![item("a", 1.7, 0.9, t), item("b", -0.3, 0.9, t)];

        let out = agg.aggregate("consumer", &items, t).unwrap();
        assert!((0.0..=1.0).contains(&out.value));
    }
}
