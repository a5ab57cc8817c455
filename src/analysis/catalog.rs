//! The versioned catalog bundle: formulas, patterns, action layers.
//!
//! Loaded once per version into an immutable structure behind `Arc` and never
//! mutated in place; a new catalog is published as a new version, and
//! in-flight sessions keep referencing the version they started with. Cache
//! fingerprints embed the version, so entries from different versions never
//! collide.

use serde::{Deserialize, Serialize};

use crate::analysis::action::{default_action_catalog, ActionInput, ActionLayerCatalog};
use crate::analysis::factors::{dag, default_factor_catalog, FactorCatalog};
use crate::analysis::patterns::{default_pattern_catalog, ClauseSubject, PatternCatalog};
use crate::analysis::types::CatalogVersion;
use crate::errors::EngineError;

/// Immutable catalog bundle for one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: CatalogVersion,
    pub factors: FactorCatalog,
    pub patterns: PatternCatalog,
    pub action_layers: ActionLayerCatalog,
}

impl Catalog {
    /// The compiled-in default catalog (version 1).
    pub fn default_v1() -> Self {
        Self {
            version: CatalogVersion(1),
            factors: default_factor_catalog(),
            patterns: default_pattern_catalog(),
            action_layers: default_action_catalog(),
        }
    }

    /// Self-validation at load time: dependency order, cross-references, and
    /// weight sanity. A catalog that fails here is unusable; better a
    /// descriptive load error than a runtime surprise mid-pipeline.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.factors.is_empty() {
            return Err(EngineError::InvalidCatalog(
                "factor catalog is empty".to_string(),
            ));
        }

        // Factor DAG must order cleanly (also catches unknown references).
        dag::topo_order(&self.factors).map_err(EngineError::InvalidCatalog)?;

        // Pattern clauses must reference cataloged factors.
        for pattern in self.patterns.specs() {
            for clause in &pattern.clauses {
                if let ClauseSubject::Factor(id) = &clause.subject {
                    if self.factors.index_of(*id).is_none() {
                        return Err(EngineError::InvalidCatalog(format!(
                            "pattern {} references unknown factor {id}",
                            pattern.id
                        )));
                    }
                }
                if !clause.threshold.is_finite() {
                    return Err(EngineError::InvalidCatalog(format!(
                        "pattern {} has a non-finite threshold",
                        pattern.id
                    )));
                }
            }
        }

        // Action layers must reference cataloged factors and carry weight.
        for layer in self.action_layers.specs() {
            let total: f64 = layer.terms.iter().map(|t| t.weight).sum();
            if total <= 0.0 {
                return Err(EngineError::InvalidCatalog(format!(
                    "action layer '{}' has non-positive total weight",
                    layer.name
                )));
            }
            for term in &layer.terms {
                if let ActionInput::Factor(id) = &term.input {
                    if self.factors.index_of(*id).is_none() {
                        return Err(EngineError::InvalidCatalog(format!(
                            "action layer '{}' references unknown factor {id}",
                            layer.name
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::patterns::{Archetype, ClauseOp, PatternSpec, TriggerClause};
    use crate::analysis::types::{FactorId, Kpi, PatternId};

    #[test]
    fn test_default_catalog_validates() {
        Catalog::default_v1().validate().unwrap();
    }

    #[test]
    fn test_dangling_pattern_reference_rejected() {
        let mut catalog = Catalog::default_v1();
        catalog.patterns = PatternCatalog::new(vec![PatternSpec {
            id: PatternId(1),
            name: "Broken".to_string(),
            archetype: Archetype::Growth,
            clauses: vec![TriggerClause {
                subject: ClauseSubject::Factor(FactorId(999)),
                op: ClauseOp::Gte,
                threshold: 0.5,
            }],
            effect_size_hint: 0.5,
            kpis: vec![Kpi::RevenueGrowth],
        }]);

        let err = catalog.validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidCatalog(msg) if msg.contains("F999")));
    }
}
