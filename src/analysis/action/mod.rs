//! Action-layer computation: the final aggregation stage.
//!
//! Each of the 18 cataloged action layers combines factor values, simulation
//! outlooks, and pattern-family signals into a bounded [0, 1] score with a
//! confidence propagated as the minimum over mandatory inputs: a layer never
//! claims more confidence than its weakest required signal. Recommendations
//! are selected from a template set keyed by score band.
//!
//! Missing optional inputs renormalize the remaining weights and leave an
//! insight note; a missing mandatory input fails that layer with
//! `ActionLayerIncomplete` (recorded, not fatal).

pub mod catalog;

pub use catalog::{
    default_action_catalog, ActionInput, ActionLayerCatalog, ActionLayerSpec, ActionTerm,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::factors::FactorSet;
use crate::analysis::patterns::{MatchSet, PatternCatalog};
use crate::analysis::types::{ActionLayerResult, Kpi, SimulationResult};
use crate::errors::ScoreError;

/// Score band boundaries for recommendation templates.
const CAUTION_BAND: f64 = 0.3;
const OPPORTUNITY_BAND: f64 = 0.7;
/// Below this confidence, results carry a directional-only qualifier.
const LOW_CONFIDENCE: f64 = 0.4;

/// Output of the action-layer stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Successfully computed layers, in catalog order
    pub layers: Vec<ActionLayerResult>,
    /// Per-layer failures, recorded and non-fatal
    pub failures: Vec<ScoreError>,
}

impl ActionOutput {
    /// Look up a layer by catalog name.
    pub fn get(&self, name: &str) -> Option<&ActionLayerResult> {
        self.layers.iter().find(|l| l.layer_name == name)
    }
}

/// Computes the action-layer catalog from upstream stage outputs.
#[derive(Debug, Clone)]
pub struct ActionLayerCalculator {
    catalog: ActionLayerCatalog,
}

impl ActionLayerCalculator {
    /// Create over a catalog.
    pub fn new(catalog: ActionLayerCatalog) -> Self {
        Self { catalog }
    }

    /// Compute every cataloged action layer.
    pub fn calculate(
        &self,
        factors: &FactorSet,
        matches: &MatchSet,
        simulations: &[SimulationResult],
        patterns: &PatternCatalog,
    ) -> ActionOutput {
        let mut layers = Vec::with_capacity(self.catalog.len());
        let mut failures = Vec::new();

        for spec in self.catalog.specs() {
            match self.calculate_layer(spec, factors, matches, simulations, patterns) {
                Ok(result) => layers.push(result),
                Err(failure) => {
                    debug!(target: "vantage::scoring", layer = %spec.name, %failure, "action layer failed");
                    failures.push(failure);
                }
            }
        }

        ActionOutput { layers, failures }
    }

    fn calculate_layer(
        &self,
        spec: &ActionLayerSpec,
        factors: &FactorSet,
        matches: &MatchSet,
        simulations: &[SimulationResult],
        patterns: &PatternCatalog,
    ) -> Result<ActionLayerResult, ScoreError> {
        let mut components: Vec<(String, f64)> = Vec::new();
        let mut insights: Vec<String> = Vec::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut confidence = f64::INFINITY;

        for term in &spec.terms {
            match resolve(&term.input, factors, matches, simulations, patterns) {
                Some((value, input_confidence)) => {
                    components.push((term.input.name(), value));
                    weighted_sum += term.weight * value;
                    weight_total += term.weight;
                    if term.mandatory {
                        confidence = confidence.min(input_confidence);
                    }
                }
                None if term.mandatory => {
                    return Err(ScoreError::ActionLayerIncomplete {
                        layer: spec.name.clone(),
                        missing: term.input.name(),
                    });
                }
                None => {
                    insights.push(format!(
                        "optional input {} unavailable; score computed without it",
                        term.input.name()
                    ));
                }
            }
        }

        if weight_total <= 0.0 {
            return Err(ScoreError::ActionLayerIncomplete {
                layer: spec.name.clone(),
                missing: "all inputs".to_string(),
            });
        }

        let score = (weighted_sum / weight_total).clamp(0.0, 1.0);
        let confidence = if confidence.is_finite() { confidence } else { 0.0 };

        let mut recommendations = vec![template_for(score, &spec.focus)];
        if confidence < LOW_CONFIDENCE {
            recommendations.push(
                "Confidence is limited; treat this assessment as directional until more evidence lands."
                    .to_string(),
            );
        }

        Ok(ActionLayerResult {
            layer_name: spec.name.clone(),
            score,
            confidence,
            components,
            insights,
            recommendations,
        })
    }
}

/// Resolve one action input to (value, confidence).
fn resolve(
    input: &ActionInput,
    factors: &FactorSet,
    matches: &MatchSet,
    simulations: &[SimulationResult],
    patterns: &PatternCatalog,
) -> Option<(f64, f64)> {
    match input {
        ActionInput::Factor(id) => factors.get(*id).map(|f| (f.value, f.confidence)),
        ActionInput::KpiOutlook(kpi) => kpi_outlook(*kpi, matches, simulations),
        ActionInput::PatternSignal(archetype) => matches
            .matches
            .iter()
            .filter(|m| {
                patterns
                    .get(m.pattern_id)
                    .is_some_and(|spec| spec.archetype == *archetype)
            })
            .map(|m| (m.confidence, m.confidence))
            .fold(None, |best, candidate| match best {
                Some((v, _)) if v >= candidate.0 => best,
                _ => Some(candidate),
            }),
    }
}

/// Mean probability_positive across simulations of one KPI, with the mean
/// contributing-match confidence as the input confidence.
fn kpi_outlook(
    kpi: Kpi,
    matches: &MatchSet,
    simulations: &[SimulationResult],
) -> Option<(f64, f64)> {
    let relevant: Vec<&SimulationResult> =
        simulations.iter().filter(|r| r.kpi == kpi).collect();
    if relevant.is_empty() {
        return None;
    }

    let value = relevant.iter().map(|r| r.probability_positive).sum::<f64>()
        / relevant.len() as f64;

    let confidences: Vec<f64> = relevant
        .iter()
        .filter_map(|r| matches.get(r.pattern_id).map(|m| m.confidence))
        .collect();
    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    Some((value, confidence))
}

/// Recommendation template keyed by score band.
fn template_for(score: f64, focus: &str) -> String {
    if score < CAUTION_BAND {
        format!("Hold: current evidence does not support committing to {focus}; revisit when the underlying signals strengthen.")
    } else if score > OPPORTUNITY_BAND {
        format!("Invest decisively in {focus}: the combined signal set supports committed action.")
    } else {
        format!("Proceed selectively on {focus}: pilot where signals are strongest and re-evaluate as evidence accumulates.")
    }
}
