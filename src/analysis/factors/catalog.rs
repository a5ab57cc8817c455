//! The fixed factor catalog: F1..F28 and their registered formulas.
//!
//! Formula dispatch is a closed enum resolved at catalog-load time, with no
//! string-keyed lookup in the evaluation path. Inputs reference either a
//! strategic layer score or a previously computed factor; the dependency
//! graph is validated (unknown references, cycles) when the catalog loads.

use serde::{Deserialize, Serialize};

use crate::analysis::types::{FactorId, StrategicLayer};

/// One named input to a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorInput {
    /// A strategic layer's blended score
    Layer(StrategicLayer),
    /// Another factor's computed value
    Factor(FactorId),
}

impl FactorInput {
    /// Name used in a `Factor`'s recorded inputs.
    pub fn name(&self) -> String {
        match self {
            FactorInput::Layer(l) => l.name().to_string(),
            FactorInput::Factor(id) => id.to_string(),
        }
    }
}

/// Registered formula kinds.
///
/// All arithmetic is double precision; outputs are clamped to the factor's
/// declared domain after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    /// Weight-normalized sum: Σ(wᵢ·xᵢ) / Σwᵢ
    WeightedSum(Vec<(FactorInput, f64)>),
    /// Product of all inputs
    Product(Vec<FactorInput>),
    /// numerator / denominator. Denominator below epsilon fails the factor.
    Ratio {
        numerator: FactorInput,
        denominator: FactorInput,
    },
    /// 1 − x
    Complement(FactorInput),
    /// Centered difference: (a − b + 1) / 2, so equal inputs score 0.5
    Gap {
        minuend: FactorInput,
        subtrahend: FactorInput,
    },
    /// Minimum of all inputs
    Min(Vec<FactorInput>),
    /// Maximum of all inputs
    Max(Vec<FactorInput>),
}

impl FormulaKind {
    /// Every input the formula reads, in declaration order.
    pub fn inputs(&self) -> Vec<&FactorInput> {
        match self {
            FormulaKind::WeightedSum(terms) => terms.iter().map(|(input, _)| input).collect(),
            FormulaKind::Product(inputs) | FormulaKind::Min(inputs) | FormulaKind::Max(inputs) => {
                inputs.iter().collect()
            }
            FormulaKind::Ratio {
                numerator,
                denominator,
            } => vec![numerator, denominator],
            FormulaKind::Complement(input) => vec![input],
            FormulaKind::Gap {
                minuend,
                subtrahend,
            } => vec![minuend, subtrahend],
        }
    }
}

/// One catalog entry: a factor and its registered formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSpec {
    /// Catalog identifier (F1..F28)
    pub id: FactorId,
    /// Stable formula slug, recorded on computed factors for provenance
    pub slug: String,
    /// The registered formula
    pub formula: FormulaKind,
    /// Declared output domain (values clamped on output)
    pub domain: (f64, f64),
}

/// The versioned, read-only factor catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorCatalog {
    specs: Vec<FactorSpec>,
}

impl FactorCatalog {
    /// Build from specs. Validation happens in `Catalog::validate`.
    pub fn new(specs: Vec<FactorSpec>) -> Self {
        Self { specs }
    }

    /// Specs in catalog order.
    pub fn specs(&self) -> &[FactorSpec] {
        &self.specs
    }

    /// Arena index of a factor id.
    pub fn index_of(&self, id: FactorId) -> Option<usize> {
        self.specs.iter().position(|s| s.id == id)
    }

    /// Number of factors.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

// ============================================================================
// Default catalog (version 1)
// ============================================================================

fn layer(l: StrategicLayer) -> FactorInput {
    FactorInput::Layer(l)
}

fn factor(n: u16) -> FactorInput {
    FactorInput::Factor(FactorId(n))
}

fn spec(n: u16, slug: &str, formula: FormulaKind) -> FactorSpec {
    FactorSpec {
        id: FactorId(n),
        slug: slug.to_string(),
        formula,
        domain: (0.0, 1.0),
    }
}

/// The built-in F1..F28 catalog.
pub fn default_factor_catalog() -> FactorCatalog {
    use FormulaKind::*;
    use StrategicLayer::*;

    FactorCatalog::new(vec![
        spec(1, "market_momentum", WeightedSum(vec![(layer(Market), 0.6), (layer(Economic), 0.4)])),
        spec(2, "consumer_pull", WeightedSum(vec![(layer(Consumer), 0.7), (layer(Brand), 0.3)])),
        spec(3, "product_readiness", WeightedSum(vec![(layer(StrategicLayer::Product), 0.7), (layer(Technology), 0.3)])),
        spec(4, "competitive_intensity", WeightedSum(vec![(layer(Competition), 1.0)])),
        spec(5, "market_whitespace", Complement(factor(4))),
        spec(6, "regulatory_drag", Complement(layer(Regulatory))),
        spec(7, "channel_leverage", WeightedSum(vec![(layer(Channel), 0.6), (layer(Operations), 0.4)])),
        spec(8, "tech_differentiation", Gap { minuend: layer(Technology), subtrahend: layer(Competition) }),
        spec(9, "brand_equity", WeightedSum(vec![(layer(Brand), 0.8), (layer(Consumer), 0.2)])),
        spec(10, "demand_supply_balance", Ratio { numerator: factor(2), denominator: factor(4) }),
        spec(11, "execution_capacity", WeightedSum(vec![(layer(Operations), 0.5), (layer(Channel), 0.25), (layer(StrategicLayer::Product), 0.25)])),
        spec(12, "market_access", FormulaKind::Product(vec![factor(7), layer(Regulatory)])),
        spec(13, "innovation_runway", Gap { minuend: factor(8), subtrahend: factor(6) }),
        spec(14, "pricing_power", WeightedSum(vec![(factor(9), 0.5), (factor(5), 0.5)])),
        spec(15, "adoption_velocity", FormulaKind::Product(vec![factor(2), factor(3)])),
        spec(16, "moat_strength", WeightedSum(vec![(factor(8), 0.4), (factor(9), 0.3), (factor(12), 0.3)])),
        spec(17, "expansion_readiness", Min(vec![factor(3), factor(11)])),
        spec(18, "macro_tailwind", WeightedSum(vec![(layer(Economic), 0.7), (layer(Regulatory), 0.3)])),
        spec(19, "saturation_risk", Complement(factor(5))),
        spec(20, "disruption_exposure", Gap { minuend: layer(Competition), subtrahend: layer(Technology) }),
        spec(21, "demand_durability", WeightedSum(vec![(factor(2), 0.6), (factor(18), 0.4)])),
        spec(22, "scaling_efficiency", Ratio { numerator: factor(11), denominator: factor(4) }),
        spec(23, "strategic_fit", WeightedSum(vec![(factor(16), 0.4), (factor(17), 0.3), (factor(21), 0.3)])),
        spec(24, "entry_timing", FormulaKind::Product(vec![factor(1), factor(5)])),
        spec(25, "margin_resilience", WeightedSum(vec![(factor(14), 0.6), (factor(22), 0.4)])),
        spec(26, "portfolio_synergy", WeightedSum(vec![(factor(7), 0.4), (factor(9), 0.3), (factor(11), 0.3)])),
        spec(27, "risk_composite", Max(vec![factor(19), factor(20), factor(6)])),
        spec(28, "opportunity_score", WeightedSum(vec![(factor(24), 0.35), (factor(23), 0.35), (factor(25), 0.3)])),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_has_28_factors() {
        let catalog = default_factor_catalog();
        assert_eq!(catalog.len(), 28);
        for (i, spec) in catalog.specs().iter().enumerate() {
            assert_eq!(spec.id, FactorId(i as u16 + 1));
        }
    }

    #[test]
    fn test_slugs_are_unique() {
        let catalog = default_factor_catalog();
        let mut slugs: Vec<&str> = catalog.specs().iter().map(|s| s.slug.as_str()).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), catalog.len());
    }

    #[test]
    fn test_factor_references_point_backwards() {
        // The default catalog is authored so every factor reference points to
        // a lower id, which guarantees a topological order exists.
        let catalog = default_factor_catalog();
        for spec in catalog.specs() {
            for input in spec.formula.inputs() {
                if let FactorInput::Factor(dep) = input {
                    assert!(
                        dep.0 < spec.id.0,
                        "{} depends on {} (not backwards)",
                        spec.id,
                        dep
                    );
                }
            }
        }
    }

    #[test]
    fn test_input_names() {
        assert_eq!(layer(StrategicLayer::Market).name(), "market");
        assert_eq!(factor(12).name(), "F12");
    }
}
