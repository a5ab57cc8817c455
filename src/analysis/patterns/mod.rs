//! Pattern matching over the factor and segment vector.
//!
//! Every cataloged pattern's trigger predicate (a conjunction of threshold
//! clauses) is evaluated against the current factors and segment scores.
//! Confidence is not a step function of the predicate: each clause
//! contributes a margin term that grows with how far the value clears its
//! threshold, so a barely-met predicate scores strictly lower than a
//! wide-margin one.
//!
//! ```text
//! confidence = evidence_strength × predicate_margin
//!   evidence_strength = mean confidence of the involved factors/segments
//!   predicate_margin  = min over clauses of
//!                       floor + (1 − floor)(1 − exp(−excess / saturation))
//! ```
//!
//! Matches below the configured minimum confidence are excluded. The ranked
//! set is ordered confidence desc, then evidence_strength desc, then
//! pattern_id asc, reproducible for identical inputs. The full ranked set is
//! returned: simulation runs for every match, since several patterns can hold
//! for one topic at once.

pub mod catalog;

pub use catalog::{
    default_pattern_catalog, Archetype, ClauseOp, ClauseSubject, PatternCatalog, PatternSpec,
    TriggerClause,
};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use tracing::debug;

use crate::analysis::config::MatcherConfig;
use crate::analysis::factors::FactorSet;
use crate::analysis::types::{FactorId, PatternMatch, SegmentScore};

/// Output of the pattern-matching stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSet {
    /// Ranked matches, best first
    pub matches: Vec<PatternMatch>,
}

impl MatchSet {
    /// Look up a match by pattern id.
    pub fn get(&self, id: crate::analysis::types::PatternId) -> Option<&PatternMatch> {
        self.matches.iter().find(|m| m.pattern_id == id)
    }
}

/// Matches the pattern catalog against computed factors and segments.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    config: MatcherConfig,
    catalog: PatternCatalog,
}

impl PatternMatcher {
    /// Create with given configuration and catalog.
    pub fn new(config: MatcherConfig, catalog: PatternCatalog) -> Self {
        Self { config, catalog }
    }

    /// Evaluate every pattern and return the ranked set.
    pub fn match_patterns(&self, factors: &FactorSet, segments: &[SegmentScore]) -> MatchSet {
        let mut matches: Vec<PatternMatch> = self
            .catalog
            .specs()
            .iter()
            .filter_map(|spec| self.evaluate(spec, factors, segments))
            .filter(|m| m.confidence >= self.config.min_confidence)
            .collect();

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.evidence_strength
                        .partial_cmp(&a.evidence_strength)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.pattern_id.cmp(&b.pattern_id))
        });

        debug!(
            target: "vantage::scoring",
            matched = matches.len(),
            catalog = self.catalog.len(),
            "pattern matching complete"
        );

        MatchSet { matches }
    }

    /// Evaluate one pattern. None when the predicate does not hold (including
    /// clauses whose subject is unavailable, e.g. a failed factor).
    fn evaluate(
        &self,
        spec: &PatternSpec,
        factors: &FactorSet,
        segments: &[SegmentScore],
    ) -> Option<PatternMatch> {
        let mut margins: SmallVec<[f64; 4]> = SmallVec::new();
        let mut confidences: SmallVec<[f64; 4]> = SmallVec::new();
        let mut factors_triggered: Vec<FactorId> = Vec::new();
        let mut segments_involved: Vec<String> = Vec::new();

        for clause in &spec.clauses {
            let (value, confidence) = match &clause.subject {
                ClauseSubject::Factor(id) => {
                    let factor = factors.get(*id)?;
                    (factor.value, factor.confidence)
                }
                ClauseSubject::Segment(name) => {
                    let segment = segments.iter().find(|s| &s.segment == name)?;
                    (segment.score, segment.confidence)
                }
            };

            let excess = match clause.op {
                ClauseOp::Gte => value - clause.threshold,
                ClauseOp::Lte => clause.threshold - value,
            };
            if excess < 0.0 {
                return None;
            }

            margins.push(self.clause_margin(excess));
            confidences.push(confidence);
            match &clause.subject {
                ClauseSubject::Factor(id) => factors_triggered.push(*id),
                ClauseSubject::Segment(name) => segments_involved.push(name.clone()),
            }
        }

        // Weakest clause bounds the predicate margin.
        let predicate_margin = margins.iter().copied().fold(1.0_f64, f64::min);
        let evidence_strength = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        Some(PatternMatch {
            pattern_id: spec.id,
            confidence: (evidence_strength * predicate_margin).clamp(0.0, 1.0),
            segments_involved,
            factors_triggered,
            evidence_strength,
        })
    }

    /// Saturating margin contribution of one clause.
    fn clause_margin(&self, excess: f64) -> f64 {
        let floor = self.config.margin_floor.clamp(0.0, 1.0);
        let saturation = self.config.margin_saturation.max(f64::EPSILON);
        floor + (1.0 - floor) * (1.0 - (-excess / saturation).exp())
    }
}
