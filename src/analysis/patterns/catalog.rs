//! The fixed pattern catalog: P001..P041.
//!
//! Each pattern is a named strategic archetype with a trigger predicate (a
//! conjunction of threshold clauses over factors and segments), an effect
//! size hint for the simulator, and the outcome KPIs it forecasts. The
//! catalog is versioned, read-only at runtime, and validated at load.

use serde::{Deserialize, Serialize};

use crate::analysis::types::{FactorId, Kpi, PatternId};

/// Comparison direction of a trigger clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseOp {
    /// Value must be at or above the threshold
    Gte,
    /// Value must be at or below the threshold
    Lte,
}

/// What a trigger clause reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseSubject {
    /// A computed factor's value
    Factor(FactorId),
    /// A segment score (by collector-assigned segment name)
    Segment(String),
}

/// One threshold clause of a trigger predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerClause {
    pub subject: ClauseSubject,
    pub op: ClauseOp,
    pub threshold: f64,
}

/// Strategic archetype families. Action layers reference these to read the
/// strongest signal of a family across the matched set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Growth,
    Defensive,
    Niche,
    Disruption,
    Timing,
    Efficiency,
    Expansion,
    Risk,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    /// Catalog identifier (P001..P041)
    pub id: PatternId,
    /// Human-readable archetype name
    pub name: String,
    /// Archetype family
    pub archetype: Archetype,
    /// Conjunction of threshold clauses; all must hold to trigger
    pub clauses: Vec<TriggerClause>,
    /// Expected effect magnitude in [0, 1], scaled per-KPI by the simulator
    pub effect_size_hint: f64,
    /// KPIs simulated for a match of this pattern
    pub kpis: Vec<Kpi>,
}

/// The versioned, read-only pattern catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCatalog {
    specs: Vec<PatternSpec>,
}

impl PatternCatalog {
    /// Build from specs. Validation happens in `Catalog::validate`.
    pub fn new(specs: Vec<PatternSpec>) -> Self {
        Self { specs }
    }

    /// Specs in catalog order.
    pub fn specs(&self) -> &[PatternSpec] {
        &self.specs
    }

    /// Look up one pattern.
    pub fn get(&self, id: PatternId) -> Option<&PatternSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    /// Number of patterns.
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

fn gte(factor: u16, threshold: f64) -> TriggerClause {
    TriggerClause {
        subject: ClauseSubject::Factor(FactorId(factor)),
        op: ClauseOp::Gte,
        threshold,
    }
}

fn lte(factor: u16, threshold: f64) -> TriggerClause {
    TriggerClause {
        subject: ClauseSubject::Factor(FactorId(factor)),
        op: ClauseOp::Lte,
        threshold,
    }
}

fn seg_gte(segment: &str, threshold: f64) -> TriggerClause {
    TriggerClause {
        subject: ClauseSubject::Segment(segment.to_string()),
        op: ClauseOp::Gte,
        threshold,
    }
}

fn pattern(
    id: u16,
    name: &str,
    archetype: Archetype,
    effect_size_hint: f64,
    clauses: Vec<TriggerClause>,
    kpis: Vec<Kpi>,
) -> PatternSpec {
    PatternSpec {
        id: PatternId(id),
        name: name.to_string(),
        archetype,
        clauses,
        effect_size_hint,
        kpis,
    }
}

/// The built-in P001..P041 catalog.
pub fn default_pattern_catalog() -> PatternCatalog {
    use Archetype::*;
    use Kpi::*;

    PatternCatalog::new(vec![
        pattern(1, "Land Grab", Growth, 0.80,
            vec![gte(5, 0.60), gte(1, 0.60), gte(11, 0.50)],
            vec![MarketShareGain, RevenueGrowth]),
        pattern(2, "Fast Follower", Timing, 0.50,
            vec![gte(4, 0.50), gte(3, 0.60), gte(15, 0.40)],
            vec![MarketShareGain, AdoptionRate]),
        pattern(3, "Niche Domination", Niche, 0.60,
            vec![gte(16, 0.50), gte(2, 0.60), lte(5, 0.50)],
            vec![MarginUplift, RetentionUplift]),
        pattern(4, "Premium Positioning", Niche, 0.55,
            vec![gte(9, 0.70), gte(14, 0.60)],
            vec![MarginUplift, RevenueGrowth]),
        pattern(5, "Disruptive Entry", Disruption, 0.90,
            vec![gte(8, 0.65), gte(4, 0.50), gte(3, 0.50)],
            vec![MarketShareGain, AdoptionRate]),
        pattern(6, "Platform Play", Growth, 0.75,
            vec![gte(26, 0.60), gte(7, 0.60), gte(15, 0.40)],
            vec![RevenueGrowth, RetentionUplift]),
        pattern(7, "Channel Blitz", Expansion, 0.65,
            vec![gte(7, 0.70), gte(12, 0.55)],
            vec![MarketShareGain, RevenueGrowth]),
        pattern(8, "Brand Halo Extension", Growth, 0.55,
            vec![gte(9, 0.70), gte(26, 0.55)],
            vec![AdoptionRate, RevenueGrowth]),
        pattern(9, "First Mover Advantage", Timing, 0.85,
            vec![gte(24, 0.55), gte(5, 0.65), lte(4, 0.40)],
            vec![MarketShareGain, AdoptionRate]),
        pattern(10, "Counter-Positioning", Disruption, 0.70,
            vec![gte(8, 0.60), gte(14, 0.55), gte(4, 0.60)],
            vec![MarginUplift, MarketShareGain]),
        pattern(11, "Fortress Defense", Defensive, 0.45,
            vec![gte(16, 0.65), gte(19, 0.55)],
            vec![RetentionUplift, MarginUplift]),
        pattern(12, "Harvest and Hold", Defensive, 0.35,
            vec![gte(14, 0.60), gte(19, 0.60), lte(1, 0.45)],
            vec![MarginUplift, RetentionUplift]),
        pattern(13, "Adjacent Expansion", Expansion, 0.60,
            vec![gte(17, 0.60), gte(23, 0.55)],
            vec![RevenueGrowth, MarketShareGain]),
        pattern(14, "Geographic Rollout", Expansion, 0.65,
            vec![gte(17, 0.55), gte(12, 0.60), gte(18, 0.50)],
            vec![RevenueGrowth, MarketShareGain]),
        pattern(15, "Operational Excellence", Efficiency, 0.50,
            vec![gte(11, 0.70), gte(22, 0.60)],
            vec![MarginUplift, RetentionUplift]),
        pattern(16, "Cost Leadership", Efficiency, 0.55,
            vec![gte(22, 0.65), gte(4, 0.55)],
            vec![MarginUplift, MarketShareGain]),
        pattern(17, "Innovation Sprint", Disruption, 0.75,
            vec![gte(13, 0.60), gte(3, 0.55)],
            vec![AdoptionRate, RevenueGrowth]),
        pattern(18, "Regulatory Moat", Defensive, 0.50,
            vec![lte(6, 0.35), gte(12, 0.60)],
            vec![RetentionUplift, MarginUplift]),
        pattern(19, "Macro Rider", Timing, 0.60,
            vec![gte(18, 0.65), gte(1, 0.55)],
            vec![RevenueGrowth, MarketShareGain]),
        pattern(20, "Demand Shock Capture", Timing, 0.80,
            vec![gte(10, 0.70), gte(11, 0.50)],
            vec![RevenueGrowth, MarketShareGain]),
        pattern(21, "Category Creation", Disruption, 0.85,
            vec![gte(5, 0.70), gte(8, 0.55), gte(2, 0.55)],
            vec![AdoptionRate, MarketShareGain]),
        pattern(22, "Loyalty Flywheel", Growth, 0.55,
            vec![gte(2, 0.65), gte(9, 0.60), gte(21, 0.55)],
            vec![RetentionUplift, RevenueGrowth]),
        pattern(23, "Pricing Power Play", Efficiency, 0.60,
            vec![gte(14, 0.70), gte(25, 0.55)],
            vec![MarginUplift, RevenueGrowth]),
        pattern(24, "Ecosystem Lock-In", Defensive, 0.65,
            vec![gte(16, 0.60), gte(26, 0.60), gte(21, 0.50)],
            vec![RetentionUplift, MarginUplift]),
        pattern(25, "White Space Sprint", Growth, 0.75,
            vec![gte(5, 0.65), gte(15, 0.50), gte(24, 0.50)],
            vec![MarketShareGain, AdoptionRate]),
        pattern(26, "Segment Beachhead", Niche, 0.70,
            vec![gte(23, 0.55), seg_gte("enterprise", 0.60)],
            vec![MarketShareGain, RetentionUplift]),
        pattern(27, "SMB Volume Engine", Niche, 0.60,
            vec![gte(15, 0.50), seg_gte("smb", 0.60), gte(22, 0.50)],
            vec![AdoptionRate, RevenueGrowth]),
        pattern(28, "International Arbitrage", Expansion, 0.65,
            vec![gte(12, 0.55), seg_gte("international", 0.55), gte(18, 0.50)],
            vec![RevenueGrowth, MarketShareGain]),
        pattern(29, "Turnaround Bet", Risk, 0.55,
            vec![lte(1, 0.40), gte(3, 0.60), gte(11, 0.55)],
            vec![RevenueGrowth, MarginUplift]),
        pattern(30, "Defensive Retrenchment", Risk, 0.30,
            vec![gte(27, 0.65), lte(28, 0.45)],
            vec![MarginUplift, RetentionUplift]),
        pattern(31, "Disruption Hedge", Risk, 0.45,
            vec![gte(20, 0.60), gte(13, 0.45)],
            vec![RetentionUplift, MarketShareGain]),
        pattern(32, "Roll-Up Consolidation", Expansion, 0.70,
            vec![gte(25, 0.55), gte(4, 0.60), gte(11, 0.60)],
            vec![MarketShareGain, MarginUplift]),
        pattern(33, "Capacity Preemption", Timing, 0.60,
            vec![gte(10, 0.60), gte(17, 0.55), gte(1, 0.50)],
            vec![MarketShareGain, RevenueGrowth]),
        pattern(34, "Trust Premium", Niche, 0.50,
            vec![gte(9, 0.65), lte(6, 0.40)],
            vec![RetentionUplift, MarginUplift]),
        pattern(35, "Viral Adoption Loop", Growth, 0.80,
            vec![gte(15, 0.65), gte(2, 0.70)],
            vec![AdoptionRate, MarketShareGain]),
        pattern(36, "Partnership Leverage", Expansion, 0.55,
            vec![gte(26, 0.65), gte(7, 0.55)],
            vec![RevenueGrowth, AdoptionRate]),
        pattern(37, "Margin Fortress", Efficiency, 0.45,
            vec![gte(25, 0.65), gte(16, 0.55)],
            vec![MarginUplift, RetentionUplift]),
        pattern(38, "Window of Entry", Timing, 0.75,
            vec![gte(24, 0.65), gte(28, 0.55)],
            vec![MarketShareGain, RevenueGrowth]),
        pattern(39, "Saturation Escape", Risk, 0.50,
            vec![gte(19, 0.65), gte(17, 0.55)],
            vec![RevenueGrowth, MarketShareGain]),
        pattern(40, "Tech Leapfrog", Disruption, 0.85,
            vec![gte(8, 0.70), gte(13, 0.60)],
            vec![AdoptionRate, MarketShareGain]),
        pattern(41, "Compound Opportunity", Growth, 0.90,
            vec![gte(28, 0.70), gte(23, 0.60), lte(27, 0.50)],
            vec![RevenueGrowth, MarketShareGain, MarginUplift]),
    ])
}
