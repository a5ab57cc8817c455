//! Configuration types for the analysis engine.
//!
//! Every component takes a small config struct with documented defaults.
//! `EngineConfig` gathers them and can be deserialized from TOML, so a
//! deployment overrides only the fields it cares about.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{EngineError, Result};

// ============================================================================
// Evidence Aggregator
// ============================================================================

/// Configuration for the Bayesian evidence aggregator.
///
/// The outlier threshold and recency half-life are deliberately tunable:
/// the calibration intent differs per deployment and neither is a universal
/// constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Half-life of recency decay, in days. Evidence this old carries half
    /// the precision of fresh evidence.
    /// Default: 30.0
    pub recency_half_life_days: f64,

    /// Absolute deviation from the first-pass posterior beyond which an item
    /// is down-weighted on the second pass.
    /// Default: 0.35
    pub outlier_threshold: f64,

    /// Total precision weight at which confidence reaches ~0.63
    /// (confidence = 1 − exp(−W / scale), saturating below 1).
    /// Default: 1.0
    pub confidence_scale: f64,

    /// Floor on recency decay so ancient evidence never vanishes entirely.
    /// Default: 0.05
    pub min_recency_weight: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            recency_half_life_days: 30.0,
            outlier_threshold: 0.35,
            confidence_scale: 1.0,
            min_recency_weight: 0.05,
        }
    }
}

// ============================================================================
// Layer Scorer
// ============================================================================

/// Configuration for the layer scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerScorerConfig {
    /// How many insights to keep per layer.
    /// Default: 5
    pub top_n_insights: usize,
}

impl Default for LayerScorerConfig {
    fn default() -> Self {
        Self { top_n_insights: 5 }
    }
}

// ============================================================================
// Pattern Matcher
// ============================================================================

/// Configuration for the pattern matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Matches below this confidence are excluded from the ranked set.
    /// Default: 0.2
    pub min_confidence: f64,

    /// Threshold excess at which a clause's margin contribution saturates.
    /// Default: 0.15
    pub margin_saturation: f64,

    /// Margin factor for an exactly-at-threshold trigger. Keeps barely-met
    /// predicates above zero while scoring them strictly below wide margins.
    /// Default: 0.25
    pub margin_floor: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.2,
            margin_saturation: 0.15,
            margin_floor: 0.25,
        }
    }
}

// ============================================================================
// Monte Carlo Simulator
// ============================================================================

/// Configuration for the Monte Carlo simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Samples per (pattern, KPI) simulation.
    /// Default: 5000
    pub sample_count: usize,

    /// Below this sample count, intervals use the normal approximation and
    /// the result is flagged `low_sample_approximation`.
    /// Default: 100
    pub min_samples_for_empirical: usize,

    /// Master seed. 0 = fresh entropy per session (production);
    /// non-zero = fully reproducible runs (tests, replays).
    /// Default: 0
    pub seed: u64,

    /// Baseline relative spread of outcome distributions before confidence
    /// tightening.
    /// Default: 0.5
    pub base_relative_spread: f64,

    /// Fraction of the spread removed at full match confidence.
    /// Default: 0.5
    pub confidence_tightening: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sample_count: 5_000,
            min_samples_for_empirical: 100,
            seed: 0,
            base_relative_spread: 0.5,
            confidence_tightening: 0.5,
        }
    }
}

// ============================================================================
// Multi-Level Cache
// ============================================================================

/// Configuration for the two-tier cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity of the in-process LRU tier, in entries.
    /// Default: 256
    pub process_tier_capacity: usize,

    /// Whether the shared tier is consulted at all. Disabling it degrades
    /// every lookup to process-tier-or-compute.
    /// Default: true
    pub shared_tier_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            process_tier_capacity: 256,
            shared_tier_enabled: true,
        }
    }
}

// ============================================================================
// Workflow Orchestrator
// ============================================================================

/// Configuration for the workflow orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum retries per stage on transient failures.
    /// Default: 3
    pub max_stage_retries: u32,

    /// Initial backoff between retries, in milliseconds. Doubles per attempt.
    /// Default: 250
    pub retry_backoff_ms: u64,

    /// Cap on a single backoff sleep, in milliseconds.
    /// Default: 5000
    pub max_backoff_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_stage_retries: 3,
            retry_backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}

// ============================================================================
// Engine aggregate
// ============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub aggregator: AggregatorConfig,
    pub layers: LayerScorerConfig,
    pub matcher: MatcherConfig,
    pub simulator: SimulatorConfig,
    pub cache: CacheConfig,
    pub workflow: WorkflowConfig,
}

impl EngineConfig {
    /// Parse from a TOML string. Absent sections keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| EngineError::InvalidCatalog(format!("engine config parse error: {e}")))
    }

    /// Load from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EngineError::storage_unavailable(format!("config read: {e}")))?;
        Self::from_toml_str(&raw)
    }
}
