//! Trait seams to the external collaborators.
//!
//! The engine core never talks to concrete storage: evidence retrieval, the
//! formula/pattern catalog, workflow state persistence, and the shared cache
//! tier are all reached through these async traits. In-memory implementations
//! (`memory`) back the tests and lightweight embeddings; production wires
//! real stores here.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analysis::catalog::Catalog;
use crate::analysis::types::{CatalogVersion, EvidenceItem};
use crate::analysis::workflow::AnalysisStage;
use crate::errors::StoreError;

/// Stage completion status persisted with each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage finished cleanly
    Completed,
    /// Stage finished with recorded entity-level failures
    Degraded,
    /// Stage-fatal failure; the session is terminal
    Failed,
    /// Session cancelled before this stage ran
    Cancelled,
}

/// One persisted workflow transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: AnalysisStage,
    pub status: StageStatus,
    /// Wall-clock milliseconds the stage took
    pub elapsed_ms: u64,
    /// Free-form stage metadata (counts, notes) for dashboards
    pub metadata: serde_json::Value,
}

/// Evidence retrieval from the upstream collector.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Current evidence collection for a session. May grow across collector
    /// runs; the engine fingerprints the content it actually received.
    async fn fetch(&self, session_id: &str) -> Result<Vec<EvidenceItem>, StoreError>;
}

/// Versioned catalog retrieval.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Load a catalog version (None = latest). The returned bundle is
    /// immutable and shared.
    async fn load(&self, version: Option<CatalogVersion>) -> Result<Arc<Catalog>, StoreError>;
}

/// Workflow state persistence.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist one stage transition. Called before the next stage starts.
    async fn save_stage(&self, session_id: &str, record: StageRecord) -> Result<(), StoreError>;

    /// Last successfully completed (or degraded) stage, for resume.
    async fn load_stage(&self, session_id: &str) -> Result<Option<AnalysisStage>, StoreError>;

    /// Full transition history, oldest first.
    async fn load_history(&self, session_id: &str) -> Result<Vec<StageRecord>, StoreError>;
}

/// The shared cache tier visible across worker processes.
///
/// Best-effort: every error is swallowed by the multi-level cache and
/// degrades a lookup to recomputation, never correctness.
#[async_trait]
pub trait SharedCacheTier: Send + Sync {
    /// Fetch a serialized value by fingerprint.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Conditional write: first writer wins. Racing sessions computing the
    /// same fingerprint converge on one value.
    async fn set_if_absent(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Drop every entry under a key prefix (e.g. one session's keys).
    async fn invalidate_prefix(&self, prefix: &str) -> Result<(), StoreError>;
}
