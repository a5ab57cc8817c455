//! Factor calculation over the layer scores.
//!
//! The calculator resolves the catalog's dependency DAG once at construction
//! (arena indices + topological waves), then evaluates each analysis run
//! against it. Factors inside one wave share no dependency edge and are
//! evaluated in parallel; waves run in sequence, so a factor never runs
//! before its declared inputs.
//!
//! A formula failure (division by zero, degenerate weights) fails that single
//! factor; dependents of a failed factor fail in turn with a missing-input
//! reason, and the session continues degraded with the remaining factors.

pub mod catalog;
pub mod dag;

pub use catalog::{default_factor_catalog, FactorCatalog, FactorInput, FactorSpec, FormulaKind};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::layers::ScoredLayers;
use crate::analysis::types::{Factor, FactorId};
use crate::errors::{EngineError, ScoreError};

/// Denominators below this fail a ratio formula.
const RATIO_EPSILON: f64 = 1e-9;

/// Output of the factor-calculation stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorSet {
    /// Successfully computed factors, in catalog order
    pub factors: Vec<Factor>,
    /// Per-factor failures, recorded and non-fatal
    pub failures: Vec<ScoreError>,
}

impl FactorSet {
    /// Look up a computed factor.
    pub fn get(&self, id: FactorId) -> Option<&Factor> {
        self.factors.iter().find(|f| f.id == id)
    }

    /// A computed factor's value, if it succeeded.
    pub fn value(&self, id: FactorId) -> Option<f64> {
        self.get(id).map(|f| f.value)
    }

    /// Whether any factor failed.
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Evaluates the factor catalog against scored layers.
#[derive(Debug, Clone)]
pub struct FactorCalculator {
    catalog: FactorCatalog,
    waves: Vec<Vec<usize>>,
}

impl FactorCalculator {
    /// Resolve the catalog's dependency order. Fails on cycles or unknown
    /// references: a catalog defect, surfaced at load rather than per run.
    pub fn new(catalog: FactorCatalog) -> Result<Self, EngineError> {
        let order = dag::topo_order(&catalog).map_err(EngineError::InvalidCatalog)?;
        let waves = dag::waves(&catalog, &order);
        Ok(Self { catalog, waves })
    }

    /// Compute every factor. Pure given its inputs: identical layers and
    /// catalog reproduce bit-identical output.
    pub fn calculate(&self, layers: &ScoredLayers) -> FactorSet {
        let n = self.catalog.len();
        // Arena of (value, confidence) slots addressed by catalog index.
        let mut arena: Vec<Option<(f64, f64)>> = vec![None; n];
        let mut failures = Vec::new();

        for wave in &self.waves {
            // Factors in one wave are mutually independent; evaluate across
            // the wave in parallel, then commit results in index order.
            let results: Vec<(usize, Result<(f64, f64), String>)> = wave
                .par_iter()
                .map(|&idx| (idx, self.evaluate(idx, &arena, layers)))
                .collect();

            for (idx, result) in results {
                let spec = &self.catalog.specs()[idx];
                match result {
                    Ok((value, confidence)) => {
                        arena[idx] = Some((value, confidence));
                    }
                    Err(reason) => {
                        debug!(target: "vantage::scoring", factor = %spec.id, %reason, "factor failed");
                        failures.push(ScoreError::FormulaEvaluation {
                            factor_id: spec.id.to_string(),
                            formula_id: spec.slug.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        // Materialize in catalog order, re-resolving recorded inputs.
        let factors = self
            .catalog
            .specs()
            .iter()
            .enumerate()
            .filter_map(|(idx, spec)| {
                let (value, confidence) = arena[idx]?;
                let inputs = spec
                    .formula
                    .inputs()
                    .iter()
                    .filter_map(|input| {
                        self.resolve(input, &arena, layers)
                            .ok()
                            .map(|(v, _)| (input.name(), v))
                    })
                    .collect();
                Some(Factor {
                    id: spec.id,
                    value,
                    confidence,
                    formula_id: spec.slug.clone(),
                    inputs,
                })
            })
            .collect();

        FactorSet { factors, failures }
    }

    /// Evaluate one factor against the arena.
    fn evaluate(
        &self,
        idx: usize,
        arena: &[Option<(f64, f64)>],
        layers: &ScoredLayers,
    ) -> Result<(f64, f64), String> {
        let spec = &self.catalog.specs()[idx];

        let mut resolved: Vec<(f64, f64)> = Vec::new();
        for input in spec.formula.inputs() {
            resolved.push(self.resolve(input, arena, layers)?);
        }

        let value = match &spec.formula {
            FormulaKind::WeightedSum(terms) => {
                let total: f64 = terms.iter().map(|(_, w)| w).sum();
                if total <= 0.0 {
                    return Err("weighted sum has non-positive total weight".to_string());
                }
                terms
                    .iter()
                    .zip(&resolved)
                    .map(|((_, w), (v, _))| w * v)
                    .sum::<f64>()
                    / total
            }
            FormulaKind::Product(_) => resolved.iter().map(|(v, _)| v).product(),
            FormulaKind::Ratio { .. } => {
                let numerator = resolved[0].0;
                let denominator = resolved[1].0;
                if denominator.abs() < RATIO_EPSILON {
                    return Err("division by zero denominator".to_string());
                }
                numerator / denominator
            }
            FormulaKind::Complement(_) => 1.0 - resolved[0].0,
            FormulaKind::Gap { .. } => (resolved[0].0 - resolved[1].0 + 1.0) / 2.0,
            FormulaKind::Min(_) => resolved
                .iter()
                .map(|(v, _)| *v)
                .fold(f64::INFINITY, f64::min),
            FormulaKind::Max(_) => resolved
                .iter()
                .map(|(v, _)| *v)
                .fold(f64::NEG_INFINITY, f64::max),
        };

        if !value.is_finite() {
            return Err("formula produced a non-finite value".to_string());
        }

        // Confidence never exceeds the weakest input.
        let confidence = resolved
            .iter()
            .map(|(_, c)| *c)
            .fold(1.0_f64, f64::min)
            .clamp(0.0, 1.0);

        let (lo, hi) = spec.domain;
        Ok((value.clamp(lo, hi), confidence))
    }

    /// Resolve one input to (value, confidence).
    fn resolve(
        &self,
        input: &FactorInput,
        arena: &[Option<(f64, f64)>],
        layers: &ScoredLayers,
    ) -> Result<(f64, f64), String> {
        match input {
            FactorInput::Layer(layer) => layers
                .layer(*layer)
                .map(|s| (s.score, s.confidence))
                .ok_or_else(|| format!("layer '{layer}' missing from scored set")),
            FactorInput::Factor(id) => {
                let idx = self
                    .catalog
                    .index_of(*id)
                    .ok_or_else(|| format!("unknown factor {id}"))?;
                arena[idx].ok_or_else(|| format!("input factor {id} failed upstream"))
            }
        }
    }
}
