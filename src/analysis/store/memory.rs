//! In-memory store implementations.
//!
//! These back the test suite and lightweight embeddings. They are fully
//! functional (not mocks): the memory state store keeps real transition
//! history, and the memory cache tier honors first-writer-wins semantics.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::analysis::catalog::Catalog;
use crate::analysis::store::{
    CatalogStore, EvidenceStore, SharedCacheTier, StageRecord, StageStatus, StateStore,
};
use crate::analysis::types::{CatalogVersion, EvidenceItem};
use crate::analysis::workflow::AnalysisStage;
use crate::errors::StoreError;

// ============================================================================
// Evidence
// ============================================================================

/// Evidence store backed by a per-session map.
#[derive(Debug, Default)]
pub struct MemoryEvidenceStore {
    items: RwLock<HashMap<String, Vec<EvidenceItem>>>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a session's evidence set.
    pub fn insert(&self, session_id: &str, items: Vec<EvidenceItem>) {
        self.items.write().insert(session_id.to_string(), items);
    }

    /// Append one item (simulates a collector run landing more evidence).
    pub fn push(&self, session_id: &str, item: EvidenceItem) {
        self.items
            .write()
            .entry(session_id.to_string())
            .or_default()
            .push(item);
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn fetch(&self, session_id: &str) -> Result<Vec<EvidenceItem>, StoreError> {
        Ok(self.items.read().get(session_id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog store serving one fixed, compiled-in bundle.
#[derive(Debug)]
pub struct StaticCatalogStore {
    catalog: Arc<Catalog>,
}

impl StaticCatalogStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    /// The built-in version-1 catalog.
    pub fn default_v1() -> Self {
        Self::new(Catalog::default_v1())
    }
}

#[async_trait]
impl CatalogStore for StaticCatalogStore {
    async fn load(&self, version: Option<CatalogVersion>) -> Result<Arc<Catalog>, StoreError> {
        match version {
            None => Ok(Arc::clone(&self.catalog)),
            Some(v) if v == self.catalog.version => Ok(Arc::clone(&self.catalog)),
            Some(v) => Err(StoreError::CatalogUnavailable(format!(
                "version {v} not served (have {})",
                self.catalog.version
            ))),
        }
    }
}

// ============================================================================
// Workflow state
// ============================================================================

/// State store keeping full transition history per session.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    history: RwLock<HashMap<String, Vec<StageRecord>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted transitions for a session (test observability).
    pub fn transition_count(&self, session_id: &str) -> usize {
        self.history
            .read()
            .get(session_id)
            .map(|h| h.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_stage(&self, session_id: &str, record: StageRecord) -> Result<(), StoreError> {
        self.history
            .write()
            .entry(session_id.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn load_stage(&self, session_id: &str) -> Result<Option<AnalysisStage>, StoreError> {
        Ok(self.history.read().get(session_id).and_then(|records| {
            records
                .iter()
                .rev()
                .find(|r| matches!(r.status, StageStatus::Completed | StageStatus::Degraded))
                .map(|r| r.stage)
        }))
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<StageRecord>, StoreError> {
        Ok(self.history.read().get(session_id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Shared cache tier
// ============================================================================

/// Shared cache tier backed by a process-local map.
///
/// Stands in for an external shared store in tests and single-process
/// deployments; honors the first-writer-wins contract.
#[derive(Debug, Default)]
pub struct MemoryCacheTier {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCacheTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries (test observability).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the tier is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SharedCacheTier for MemoryCacheTier {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set_if_absent(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries
            .write()
            .entry(key.to_string())
            .or_insert(value);
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.entries.write().retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}
