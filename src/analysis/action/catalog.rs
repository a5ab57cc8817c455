//! The fixed action-layer catalog: 18 higher-order strategic assessments.
//!
//! Each action layer declares a weighted combination of factor values,
//! simulation outlooks, and pattern-family signals. Inputs are mandatory or
//! optional: optional inputs reduce completeness when absent, mandatory ones
//! fail the layer (recoverably) when absent.

use serde::{Deserialize, Serialize};

use crate::analysis::patterns::Archetype;
use crate::analysis::types::{FactorId, Kpi};

/// One input to an action layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionInput {
    /// A computed factor's value
    Factor(FactorId),
    /// Mean probability_positive across simulations of this KPI
    KpiOutlook(Kpi),
    /// Strongest match confidence among patterns of this archetype family
    PatternSignal(Archetype),
}

impl ActionInput {
    /// Name used in a result's recorded components.
    pub fn name(&self) -> String {
        match self {
            ActionInput::Factor(id) => id.to_string(),
            ActionInput::KpiOutlook(kpi) => format!("outlook:{kpi}"),
            ActionInput::PatternSignal(archetype) => {
                format!("signal:{}", format!("{archetype:?}").to_lowercase())
            }
        }
    }
}

/// One weighted term of an action layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTerm {
    pub input: ActionInput,
    pub weight: f64,
    /// Mandatory terms gate the layer; optional terms only reduce completeness
    pub mandatory: bool,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLayerSpec {
    /// Stable catalog name
    pub name: String,
    /// Short phrase spliced into recommendation templates
    pub focus: String,
    /// Weighted inputs
    pub terms: Vec<ActionTerm>,
}

/// The versioned, read-only action-layer catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLayerCatalog {
    specs: Vec<ActionLayerSpec>,
}

impl ActionLayerCatalog {
    /// Build from specs. Validation happens in `Catalog::validate`.
    pub fn new(specs: Vec<ActionLayerSpec>) -> Self {
        Self { specs }
    }

    /// Specs in catalog order.
    pub fn specs(&self) -> &[ActionLayerSpec] {
        &self.specs
    }

    /// Number of action layers.
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

fn factor(n: u16, weight: f64) -> ActionTerm {
    ActionTerm {
        input: ActionInput::Factor(FactorId(n)),
        weight,
        mandatory: true,
    }
}

fn outlook(kpi: Kpi, weight: f64) -> ActionTerm {
    ActionTerm {
        input: ActionInput::KpiOutlook(kpi),
        weight,
        mandatory: false,
    }
}

fn signal(archetype: Archetype, weight: f64) -> ActionTerm {
    ActionTerm {
        input: ActionInput::PatternSignal(archetype),
        weight,
        mandatory: false,
    }
}

fn layer(name: &str, focus: &str, terms: Vec<ActionTerm>) -> ActionLayerSpec {
    ActionLayerSpec {
        name: name.to_string(),
        focus: focus.to_string(),
        terms,
    }
}

/// The built-in 18-layer catalog.
pub fn default_action_catalog() -> ActionLayerCatalog {
    use Archetype::*;
    use Kpi::*;

    ActionLayerCatalog::new(vec![
        layer("market_entry", "market entry",
            vec![factor(24, 0.4), factor(5, 0.3), signal(Timing, 0.3)]),
        layer("product_investment", "product investment",
            vec![factor(3, 0.4), factor(13, 0.3), outlook(AdoptionRate, 0.3)]),
        layer("pricing_strategy", "pricing moves",
            vec![factor(14, 0.5), factor(25, 0.2), outlook(MarginUplift, 0.3)]),
        layer("brand_building", "brand building",
            vec![factor(9, 0.5), factor(2, 0.3), signal(Niche, 0.2)]),
        layer("channel_development", "channel development",
            vec![factor(7, 0.5), factor(12, 0.3), outlook(RevenueGrowth, 0.2)]),
        layer("partnership_strategy", "partnerships",
            vec![factor(26, 0.5), factor(7, 0.2), signal(Expansion, 0.3)]),
        layer("innovation_pipeline", "the innovation pipeline",
            vec![factor(13, 0.4), factor(8, 0.3), signal(Disruption, 0.3)]),
        layer("competitive_response", "competitive response",
            vec![factor(4, 0.4), factor(20, 0.3), signal(Defensive, 0.3)]),
        layer("risk_mitigation", "risk mitigation",
            vec![factor(27, 0.5), factor(6, 0.2), signal(Risk, 0.3)]),
        layer("regulatory_engagement", "regulatory engagement",
            vec![factor(6, 0.6), factor(12, 0.4)]),
        layer("capacity_planning", "capacity expansion",
            vec![factor(11, 0.4), factor(10, 0.3), outlook(MarketShareGain, 0.3)]),
        layer("customer_retention", "retention programs",
            vec![factor(21, 0.4), factor(2, 0.3), outlook(RetentionUplift, 0.3)]),
        layer("geographic_expansion", "geographic expansion",
            vec![factor(17, 0.4), factor(12, 0.3), signal(Expansion, 0.3)]),
        layer("acquisition_posture", "acquisitions",
            vec![factor(25, 0.3), factor(4, 0.3), factor(11, 0.2), signal(Expansion, 0.2)]),
        layer("margin_optimization", "margin optimization",
            vec![factor(22, 0.4), factor(25, 0.3), outlook(MarginUplift, 0.3)]),
        layer("demand_generation", "demand generation",
            vec![factor(15, 0.4), factor(1, 0.3), outlook(AdoptionRate, 0.3)]),
        layer("moat_reinforcement", "moat reinforcement",
            vec![factor(16, 0.5), factor(9, 0.2), signal(Defensive, 0.3)]),
        layer("portfolio_prioritization", "portfolio prioritization",
            vec![factor(28, 0.5), factor(23, 0.3), outlook(RevenueGrowth, 0.2)]),
    ])
}
