//! Core data model for the analysis engine.
//!
//! Everything here is a plain serde-derived value type. Derived entities form
//! a one-directional chain:
//!
//! ```text
//! EvidenceItem → LayerScore/SegmentScore → Factor → PatternMatch
//!                                → SimulationResult → ActionLayerResult
//! ```
//!
//! No entity is computed from a transitively-derived value without its
//! declared predecessor; the workflow stages enforce the ordering and the
//! cache fingerprints (keyed on catalog version + input content) enforce
//! freshness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::workflow::AnalysisStage;

// ============================================================================
// Identifiers
// ============================================================================

/// One of the 10 fixed strategic layers scored from evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategicLayer {
    Consumer,
    Market,
    Product,
    Technology,
    Competition,
    Brand,
    Economic,
    Regulatory,
    Channel,
    Operations,
}

impl StrategicLayer {
    /// All layers in canonical catalog order.
    pub const ALL: [StrategicLayer; 10] = [
        StrategicLayer::Consumer,
        StrategicLayer::Market,
        StrategicLayer::Product,
        StrategicLayer::Technology,
        StrategicLayer::Competition,
        StrategicLayer::Brand,
        StrategicLayer::Economic,
        StrategicLayer::Regulatory,
        StrategicLayer::Channel,
        StrategicLayer::Operations,
    ];

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            StrategicLayer::Consumer => "consumer",
            StrategicLayer::Market => "market",
            StrategicLayer::Product => "product",
            StrategicLayer::Technology => "technology",
            StrategicLayer::Competition => "competition",
            StrategicLayer::Brand => "brand",
            StrategicLayer::Economic => "economic",
            StrategicLayer::Regulatory => "regulatory",
            StrategicLayer::Channel => "channel",
            StrategicLayer::Operations => "operations",
        }
    }

    /// Parse a canonical name. Returns None for unknown names.
    pub fn from_name(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.name() == s)
    }
}

impl fmt::Display for StrategicLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifier of a factor in the fixed catalog (F1..F28).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct FactorId(pub u16);

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Identifier of a pattern in the fixed catalog (P001..P041).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct PatternId(pub u16);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:03}", self.0)
    }
}

/// Outcome KPIs a pattern's simulations forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kpi {
    /// Market share gained, in share points
    MarketShareGain,
    /// Year-over-year revenue growth, fractional
    RevenueGrowth,
    /// Adoption rate uplift, fractional
    AdoptionRate,
    /// Retention/churn improvement, fractional
    RetentionUplift,
    /// Gross margin uplift, fractional
    MarginUplift,
}

impl Kpi {
    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Kpi::MarketShareGain => "market_share_gain",
            Kpi::RevenueGrowth => "revenue_growth",
            Kpi::AdoptionRate => "adoption_rate",
            Kpi::RetentionUplift => "retention_uplift",
            Kpi::MarginUplift => "margin_uplift",
        }
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Monotonically published catalog version. Fingerprints embed it, so a new
/// catalog never reads another version's cache entries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CatalogVersion(pub u32);

impl fmt::Display for CatalogVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ============================================================================
// Evidence
// ============================================================================

/// Where an evidence item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Extracted from a crawled/scraped page
    Scrape,
    /// Returned by the search/embedding index
    SearchIndex,
    /// Curated data feed (industry reports, licensed datasets)
    CuratedFeed,
    /// Entered by an analyst
    AnalystInput,
}

/// The dimension an evidence item speaks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// One of the fixed strategic layers
    Layer(StrategicLayer),
    /// A market segment (free-form name supplied by the collector)
    Segment(String),
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Layer(l) => write!(f, "layer:{l}"),
            Dimension::Segment(s) => write!(f, "segment:{s}"),
        }
    }
}

/// One quality-scored observation produced by the upstream collector.
///
/// Immutable once created. `raw_value` and `quality_score` are both in
/// [0, 1]; out-of-range inputs are clamped at the aggregation boundary
/// rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Collector-assigned source identifier (stable across runs)
    pub source_id: String,
    /// Which layer or segment this evidence scores
    pub dimension: Dimension,
    /// Observed value in [0, 1]
    pub raw_value: f64,
    /// Collector's quality assessment in [0, 1]
    pub quality_score: f64,
    /// When the underlying content was published/observed
    pub recency: DateTime<Utc>,
    /// Source channel
    pub provenance: Provenance,
    /// Short human-readable summary used for insight selection
    pub summary: String,
}

// ============================================================================
// Derived entities
// ============================================================================

/// Aggregated score for one strategic layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerScore {
    /// Which layer
    pub layer: StrategicLayer,
    /// Blended score in [0, 1]
    pub score: f64,
    /// Posterior confidence in [0, 1]
    pub confidence: f64,
    /// Evidence items that contributed, by source_id
    pub contributing_evidence_ids: Vec<String>,
    /// Top insights, ordered by contributing quality desc (ties: lower source_id)
    pub insights: Vec<String>,
}

/// Aggregated score for one market segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentScore {
    /// Segment name as tagged by the collector
    pub segment: String,
    /// Blended score in [0, 1]
    pub score: f64,
    /// Posterior confidence in [0, 1]
    pub confidence: f64,
}

/// A derived factor value (fixed catalog F1..F28).
///
/// Recomputation is pure given `inputs`: same catalog version + same inputs
/// always reproduces the same bits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    /// Catalog identifier
    pub id: FactorId,
    /// Computed value, clamped to the declared domain (typically [0, 1])
    pub value: f64,
    /// Propagated confidence in [0, 1]
    pub confidence: f64,
    /// Slug of the registered formula that produced this value
    pub formula_id: String,
    /// Named inputs and the values actually used
    pub inputs: Vec<(String, f64)>,
}

/// One ranked pattern match for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Catalog identifier
    pub pattern_id: PatternId,
    /// Match confidence in [0, 1] (overlap × predicate margin)
    pub confidence: f64,
    /// Segments referenced by satisfied segment clauses
    pub segments_involved: Vec<String>,
    /// Factors whose clauses were satisfied
    pub factors_triggered: Vec<FactorId>,
    /// Evidence-strength component of the confidence (mean factor confidence)
    pub evidence_strength: f64,
}

/// Closed interval, used for confidence intervals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub low: f64,
    pub high: f64,
}

/// Summary statistics for one (pattern, KPI) simulation.
///
/// Immutable once produced for a given (session, config) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Pattern the simulation belongs to
    pub pattern_id: PatternId,
    /// KPI being forecast
    pub kpi: Kpi,
    /// Sample mean
    pub mean: f64,
    /// Sample median
    pub median: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// 5th percentile of the empirical distribution
    pub percentile_5: f64,
    /// 95th percentile of the empirical distribution
    pub percentile_95: f64,
    /// 90% confidence interval
    pub ci_90: Interval,
    /// 95% confidence interval
    pub ci_95: Interval,
    /// 99% confidence interval
    pub ci_99: Interval,
    /// Fraction of samples above the KPI baseline
    pub probability_positive: f64,
    /// Number of samples drawn
    pub sample_count: usize,
    /// True when intervals fell back to the normal approximation
    pub low_sample_approximation: bool,
}

/// One of the 18 higher-order strategic assessments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLayerResult {
    /// Catalog name of the action layer
    pub layer_name: String,
    /// Combined score in [0, 1]
    pub score: f64,
    /// Minimum confidence among mandatory inputs
    pub confidence: f64,
    /// Sub-metric name → value actually used
    pub components: Vec<(String, f64)>,
    /// Notes about missing optional inputs, completeness
    pub insights: Vec<String>,
    /// Templates selected by score band
    pub recommendations: Vec<String>,
}

// ============================================================================
// Session-facing aggregates
// ============================================================================

/// Everything a completed analysis produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub layer_scores: Vec<LayerScore>,
    pub segment_scores: Vec<SegmentScore>,
    pub factors: Vec<Factor>,
    pub pattern_matches: Vec<PatternMatch>,
    pub simulation_results: Vec<SimulationResult>,
    pub action_layers: Vec<ActionLayerResult>,
    /// True when any non-fatal entity-level failure occurred. Consumers must
    /// check this before trusting completeness.
    pub degraded: bool,
}

/// Progress snapshot returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub current_stage: AnalysisStage,
    /// Completed stages / total pipeline stages, in [0, 100]
    pub progress_percentage: f64,
    pub completed_stages: Vec<AnalysisStage>,
    /// Most granular known failures, newest last
    pub error_messages: Vec<String>,
    pub degraded: bool,
    /// Wall-clock milliseconds spent per completed stage
    pub stage_timings_ms: Vec<(String, u64)>,
}

/// Readiness snapshot returned by `get_formula_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaStatus {
    pub catalog_version: CatalogVersion,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_names_round_trip() {
        for layer in StrategicLayer::ALL {
            assert_eq!(StrategicLayer::from_name(layer.name()), Some(layer));
        }
        assert_eq!(StrategicLayer::from_name("unknown"), None);
    }

    #[test]
    fn test_id_display_formats() {
        assert_eq!(FactorId(7).to_string(), "F7");
        assert_eq!(PatternId(3).to_string(), "P003");
        assert_eq!(PatternId(41).to_string(), "P041");
        assert_eq!(CatalogVersion(2).to_string(), "v2");
    }

    #[test]
    fn test_dimension_display() {
        assert_eq!(
            Dimension::Layer(StrategicLayer::Consumer).to_string(),
            "layer:consumer"
        );
        assert_eq!(
            Dimension::Segment("smb".to_string()).to_string(),
            "segment:smb"
        );
    }

    #[test]
    fn test_pattern_id_ordering_is_catalog_order() {
        let mut ids = vec![PatternId(12), PatternId(3), PatternId(41)];
        ids.sort();
        assert_eq!(ids, vec![PatternId(3), PatternId(12), PatternId(41)]);
    }
}
