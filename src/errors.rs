use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entity-level scoring failures.
///
/// These are recoverable: they are recorded on the owning session and the
/// pipeline continues in degraded mode. They are deterministic, so the
/// orchestrator never retries them.
///
/// Serializable: entity-level failures travel inside cached stage outputs.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoreError {
    /// No evidence at all for a dimension
    #[error("insufficient evidence for dimension '{dimension}'")]
    InsufficientEvidence { dimension: String },

    /// A layer could not be scored (zero evidence tagged for it)
    #[error("layer '{layer}' unscoreable: {reason}")]
    LayerUnscoreable { layer: String, reason: String },

    /// A formula failed for one factor (division by zero, domain violation)
    #[error("formula '{formula_id}' failed for factor {factor_id}: {reason}")]
    FormulaEvaluation {
        factor_id: String,
        formula_id: String,
        reason: String,
    },

    /// An action layer is missing a mandatory input
    #[error("action layer '{layer}' incomplete: missing mandatory input {missing}")]
    ActionLayerIncomplete { layer: String, missing: String },
}

/// Simulation failures. Per-KPI and non-fatal.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimError {
    /// A (pattern, KPI) simulation was skipped (e.g. malformed effect size)
    #[error("simulation skipped for pattern {pattern_id}, kpi '{kpi}': {reason}")]
    Skipped {
        pattern_id: String,
        kpi: String,
        reason: String,
    },
}

/// Failures at the storage / catalog boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backing store (evidence, state, shared cache) unreachable
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stage exceeded its time budget
    #[error("stage timed out after {timeout_ms}ms")]
    StageTimeout { timeout_ms: u64 },

    /// No formula/pattern catalog could be loaded. Fatal: without a catalog
    /// no computation is possible.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
}

impl StoreError {
    /// Whether retrying with backoff can plausibly change the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::StageTimeout { .. }
        )
    }
}

/// Main engine error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Entity-level scoring failure
    #[error("scoring: {0}")]
    Score(#[from] ScoreError),

    /// Simulation failure
    #[error("simulation: {0}")]
    Sim(#[from] SimError),

    /// Storage/catalog boundary failure
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Unknown session identifier
    #[error("session '{0}' not found")]
    SessionNotFound(String),

    /// Session was cancelled by the caller. Terminal, not a failure.
    #[error("session '{0}' was cancelled")]
    SessionCancelled(String),

    /// `get_results` called before the session completed
    #[error("results not ready: session '{session_id}' is at stage {stage}")]
    ResultsNotReady { session_id: String, stage: String },

    /// Catalog failed self-validation at load
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// A stage-fatal failure after retries were exhausted
    #[error("session '{session_id}' failed at stage {stage}: {reason}")]
    StageFailed {
        session_id: String,
        stage: String,
        reason: String,
    },
}

// Convenience constructors for common error patterns
impl EngineError {
    /// Create an `InsufficientEvidence` error for a dimension.
    pub fn insufficient_evidence(dimension: impl Into<String>) -> Self {
        EngineError::Score(ScoreError::InsufficientEvidence {
            dimension: dimension.into(),
        })
    }

    /// Create a `FormulaEvaluation` error.
    pub fn formula_evaluation(
        factor_id: impl Into<String>,
        formula_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EngineError::Score(ScoreError::FormulaEvaluation {
            factor_id: factor_id.into(),
            formula_id: formula_id.into(),
            reason: reason.into(),
        })
    }

    /// Create a storage-unavailable error.
    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        EngineError::Store(StoreError::Unavailable(msg.into()))
    }

    /// Create a catalog-unavailable error.
    pub fn catalog_unavailable(msg: impl Into<String>) -> Self {
        EngineError::Store(StoreError::CatalogUnavailable(msg.into()))
    }

    /// Whether this error should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_transient())
    }

    /// Whether this error aborts the whole session (vs. degrading it).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::CatalogUnavailable(_))
                | EngineError::InvalidCatalog(_)
                | EngineError::StageFailed { .. }
        )
    }
}

/// Crate-wide result alias.
pub(crate) type Result<T, E = EngineError> = std::result::Result<T, E>;
