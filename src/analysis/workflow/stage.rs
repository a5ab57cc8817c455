//! Workflow stages and transition rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline state of one analysis session.
///
/// ```text
/// CREATED → EVIDENCE_READY → LAYER_SCORING → FACTOR_CALCULATION
///         → PATTERN_MATCHING → SIMULATION → ACTION_LAYERS → COMPLETED
/// ```
///
/// `FAILED` is reachable from any non-terminal state once retries are
/// exhausted on a stage-fatal error; `CANCELLED` on explicit cancellation
/// between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStage {
    Created,
    EvidenceReady,
    LayerScoring,
    FactorCalculation,
    PatternMatching,
    Simulation,
    ActionLayers,
    Completed,
    Failed,
    Cancelled,
}

/// The working stages, in execution order. `Created` precedes them and
/// `Completed` follows; the terminal failure states sit outside the pipeline.
pub const WORK_STAGES: [AnalysisStage; 6] = [
    AnalysisStage::EvidenceReady,
    AnalysisStage::LayerScoring,
    AnalysisStage::FactorCalculation,
    AnalysisStage::PatternMatching,
    AnalysisStage::Simulation,
    AnalysisStage::ActionLayers,
];

impl AnalysisStage {
    /// Canonical persisted name.
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisStage::Created => "CREATED",
            AnalysisStage::EvidenceReady => "EVIDENCE_READY",
            AnalysisStage::LayerScoring => "LAYER_SCORING",
            AnalysisStage::FactorCalculation => "FACTOR_CALCULATION",
            AnalysisStage::PatternMatching => "PATTERN_MATCHING",
            AnalysisStage::Simulation => "SIMULATION",
            AnalysisStage::ActionLayers => "ACTION_LAYERS",
            AnalysisStage::Completed => "COMPLETED",
            AnalysisStage::Failed => "FAILED",
            AnalysisStage::Cancelled => "CANCELLED",
        }
    }

    /// Position in the forward pipeline. Terminal failure states have none.
    pub fn pipeline_index(&self) -> Option<usize> {
        match self {
            AnalysisStage::Created => Some(0),
            AnalysisStage::EvidenceReady => Some(1),
            AnalysisStage::LayerScoring => Some(2),
            AnalysisStage::FactorCalculation => Some(3),
            AnalysisStage::PatternMatching => Some(4),
            AnalysisStage::Simulation => Some(5),
            AnalysisStage::ActionLayers => Some(6),
            AnalysisStage::Completed => Some(7),
            AnalysisStage::Failed | AnalysisStage::Cancelled => None,
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisStage::Completed | AnalysisStage::Failed | AnalysisStage::Cancelled
        )
    }

    /// Progress through the pipeline in [0, 100].
    pub fn progress_percentage(&self) -> f64 {
        match self.pipeline_index() {
            Some(idx) => idx as f64 / 7.0 * 100.0,
            None => 0.0,
        }
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_indices_are_strictly_increasing() {
        let mut previous = AnalysisStage::Created.pipeline_index().unwrap();
        for stage in WORK_STAGES {
            let idx = stage.pipeline_index().unwrap();
            assert!(idx > previous);
            previous = idx;
        }
        assert!(AnalysisStage::Completed.pipeline_index().unwrap() > previous);
    }

    #[test]
    fn test_terminal_states() {
        assert!(AnalysisStage::Completed.is_terminal());
        assert!(AnalysisStage::Failed.is_terminal());
        assert!(AnalysisStage::Cancelled.is_terminal());
        for stage in WORK_STAGES {
            assert!(!stage.is_terminal());
        }
    }

    #[test]
    fn test_progress_endpoints() {
        assert_eq!(AnalysisStage::Created.progress_percentage(), 0.0);
        assert_eq!(AnalysisStage::Completed.progress_percentage(), 100.0);
    }

    #[test]
    fn test_serde_names_match_wire_format() {
        let json = serde_json::to_string(&AnalysisStage::EvidenceReady).unwrap();
        assert_eq!(json, "\"EVIDENCE_READY\"");
        let parsed: AnalysisStage = serde_json::from_str("\"ACTION_LAYERS\"").unwrap();
        assert_eq!(parsed, AnalysisStage::ActionLayers);
    }
}
