//! Per-layer and per-segment scoring over the evidence set.
//!
//! For each of the 10 fixed strategic layers, selects the evidence tagged for
//! that layer, blends it through the aggregator, and records the top-N
//! insights (evidence summaries ordered by quality descending, ties broken by
//! lower source id for determinism).
//!
//! A layer with zero evidence is not fatal: it is recorded at the
//! uninformative midpoint with confidence 0 and an explanatory insight, and
//! the session continues degraded. Segment-tagged evidence is aggregated the
//! same way into `SegmentScore`s for the pattern matcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::analysis::aggregator::EvidenceAggregator;
use crate::analysis::config::LayerScorerConfig;
use crate::analysis::types::{
    Dimension, EvidenceItem, LayerScore, SegmentScore, StrategicLayer,
};
use crate::errors::ScoreError;

/// Output of the layer-scoring stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoredLayers {
    /// One entry per catalog layer, in catalog order
    pub layer_scores: Vec<LayerScore>,
    /// One entry per segment seen in the evidence, sorted by name
    pub segment_scores: Vec<SegmentScore>,
    /// Explanations for layers that could not be scored
    pub notes: Vec<String>,
}

impl ScoredLayers {
    /// Whether any layer went unscored.
    pub fn is_degraded(&self) -> bool {
        !self.notes.is_empty()
    }

    /// Look up one layer's score.
    pub fn layer(&self, layer: StrategicLayer) -> Option<&LayerScore> {
        self.layer_scores.iter().find(|s| s.layer == layer)
    }
}

/// Scores the fixed layer set from tagged evidence.
#[derive(Debug, Clone)]
pub struct LayerScorer {
    config: LayerScorerConfig,
    aggregator: EvidenceAggregator,
}

impl LayerScorer {
    /// Create with given configuration.
    pub fn new(config: LayerScorerConfig, aggregator: EvidenceAggregator) -> Self {
        Self { config, aggregator }
    }

    /// Score every catalog layer and every segment present in the evidence.
    pub fn score(&self, evidence: &[EvidenceItem], now: DateTime<Utc>) -> ScoredLayers {
        let mut layer_scores = Vec::with_capacity(StrategicLayer::ALL.len());
        let mut notes = Vec::new();

        for layer in StrategicLayer::ALL {
            let tagged: Vec<&EvidenceItem> = evidence
                .iter()
                .filter(|item| item.dimension == Dimension::Layer(layer))
                .collect();

            match self.score_layer(layer, &tagged, now) {
                Some(score) => layer_scores.push(score),
                None => {
                    let reason = ScoreError::LayerUnscoreable {
                        layer: layer.name().to_string(),
                        reason: "no evidence tagged for this layer; scored at midpoint with zero confidence".to_string(),
                    }
                    .to_string();
                    debug!(target: "vantage::scoring", layer = %layer, "layer unscoreable");
                    notes.push(reason.clone());
                    layer_scores.push(LayerScore {
                        layer,
                        score: 0.5,
                        confidence: 0.0,
                        contributing_evidence_ids: Vec::new(),
                        insights: vec![reason],
                    });
                }
            }
        }

        let segment_scores = self.score_segments(evidence, now);

        ScoredLayers {
            layer_scores,
            segment_scores,
            notes,
        }
    }

    /// Score one layer. None when no evidence is tagged for it.
    fn score_layer(
        &self,
        layer: StrategicLayer,
        tagged: &[&EvidenceItem],
        now: DateTime<Utc>,
    ) -> Option<LayerScore> {
        if tagged.is_empty() {
            return None;
        }

        let owned: Vec<EvidenceItem> = tagged.iter().map(|&item| item.clone()).collect();
        // Non-empty input: the aggregator cannot fail here.
        let blended = self.aggregator.aggregate(layer.name(), &owned, now).ok()?;

        // Quality-descending, ties by lower source id.
        let mut ranked: Vec<&EvidenceItem> = tagged.to_vec();
        ranked.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        let insights: Vec<String> = ranked
            .iter()
            .take(self.config.top_n_insights)
            .map(|item| item.summary.clone())
            .collect();
        let contributing_evidence_ids: Vec<String> =
            ranked.iter().map(|item| item.source_id.clone()).collect();

        Some(LayerScore {
            layer,
            score: blended.value,
            confidence: blended.confidence,
            contributing_evidence_ids,
            insights,
        })
    }

    /// Aggregate segment-tagged evidence, grouped by segment name.
    fn score_segments(&self, evidence: &[EvidenceItem], now: DateTime<Utc>) -> Vec<SegmentScore> {
        let mut by_segment: BTreeMap<&str, Vec<EvidenceItem>> = BTreeMap::new();
        for item in evidence {
            if let Dimension::Segment(name) = &item.dimension {
                by_segment.entry(name.as_str()).or_default().push(item.clone());
            }
        }

        by_segment
            .into_iter()
            .filter_map(|(segment, items)| {
                let blended = self.aggregator.aggregate(segment, &items, now).ok()?;
                Some(SegmentScore {
                    segment: segment.to_string(),
                    score: blended.value,
                    confidence: blended.confidence,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::config::AggregatorConfig;
    use crate::analysis::types::Provenance;

    fn scorer() -> LayerScorer {
        LayerScorer::new(
            LayerScorerConfig::default(),
            EvidenceAggregator::new(AggregatorConfig::default()),
        )
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn layer_item(source_id: &str, layer: StrategicLayer, value: f64, quality: f64) -> EvidenceItem {
        EvidenceItem {
            source_id: source_id.to_string(),
            dimension: Dimension::Layer(layer),
            raw_value: value,
            quality_score: quality,
            recency: now(),
            provenance: Provenance::SearchIndex,
            summary: format!("{source_id} on {}", layer.name()),
        }
    }

    fn segment_item(source_id: &str, segment: &str, value: f64, quality: f64) -> EvidenceItem {
        EvidenceItem {
            source_id: source_id.to_string(),
            dimension: Dimension::Segment(segment.to_string()),
            raw_value: value,
            quality_score: quality,
            recency: now(),
            provenance: Provenance::SearchIndex,
            summary: format!("{source_id} on {segment}"),
        }
    }

    #[test]
    fn test_every_catalog_layer_present_in_output() {
        let evidence = vec![layer_item("s1", StrategicLayer::Consumer, 0.8, 0.9)];
        let scored = scorer().score(&evidence, now());

        assert_eq!(scored.layer_scores.len(), StrategicLayer::ALL.len());
        // Catalog order preserved
        for (score, layer) in scored.layer_scores.iter().zip(StrategicLayer::ALL) {
            assert_eq!(score.layer, layer);
        }
    }

    #[test]
    fn test_unscored_layer_marked_degraded_not_fatal() {
        let evidence = vec![layer_item("s1", StrategicLayer::Consumer, 0.8, 0.9)];
        let scored = scorer().score(&evidence, now());

        assert!(scored.is_degraded());
        let regulatory = scored.layer(StrategicLayer::Regulatory).unwrap();
        assert_eq!(regulatory.confidence, 0.0);
        assert_eq!(regulatory.score, 0.5);
        assert_eq!(regulatory.insights.len(), 1);
        assert!(regulatory.insights[0].contains("no evidence"));
    }

    #[test]
    fn test_insights_ordered_by_quality_then_source_id() {
        let evidence = vec![
            layer_item("b-mid", StrategicLayer::Market, 0.6, 0.7),
            layer_item("z-top", StrategicLayer::Market, 0.6, 0.9),
            layer_item("a-mid", StrategicLayer::Market, 0.6, 0.7),
        ];
        let scored = scorer().score(&evidence, now());
        let market = scored.layer(StrategicLayer::Market).unwrap();

        assert_eq!(
            market.insights,
            vec![
                "z-top on market".to_string(),
                "a-mid on market".to_string(),
                "b-mid on market".to_string(),
            ]
        );
    }

    #[test]
    fn test_top_n_insights_truncation() {
        let scorer = LayerScorer::new(
            LayerScorerConfig { top_n_insights: 2 },
            EvidenceAggregator::with_defaults(),
        );
        let evidence: Vec<_> = (0..5)
            .map(|i| layer_item(&format!("s{i}"), StrategicLayer::Product, 0.5, 0.5))
            .collect();

        let scored = scorer.score(&evidence, now());
        let product = scored.layer(StrategicLayer::Product).unwrap();
        assert_eq!(product.insights.len(), 2);
        // All contributors still recorded
        assert_eq!(product.contributing_evidence_ids.len(), 5);
    }

    #[test]
    fn test_segment_scores_sorted_by_name() {
        let evidence = vec![
            segment_item("s1", "smb", 0.7, 0.8),
            segment_item("s2", "enterprise", 0.4, 0.8),
            segment_item("s3", "enterprise", 0.5, 0.6),
        ];
        let scored = scorer().score(&evidence, now());

        let names: Vec<&str> = scored
            .segment_scores
            .iter()
            .map(|s| s.segment.as_str())
            .collect();
        assert_eq!(names, vec!["enterprise", "smb"]);
    }

    #[test]
    fn test_fully_covered_evidence_is_not_degraded() {
        let evidence: Vec<_> = StrategicLayer::ALL
            .iter()
            .enumerate()
            .map(|(i, &layer)| layer_item(&format!("s{i}"), layer, 0.6, 0.8))
            .collect();

        let scored = scorer().score(&evidence, now());
        assert!(!scored.is_degraded());
        assert!(scored.notes.is_empty());
    }
}
