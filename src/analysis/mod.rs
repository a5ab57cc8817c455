//! The strategic scoring and simulation engine.
//!
//! Turns quality-scored evidence about a research topic into a quantitative
//! strategic assessment, through a pipeline of pluggable components:
//! - **EvidenceAggregator**: Bayesian blending of quality-weighted evidence
//! - **LayerScorer**: scores the 10 strategic layers (+ segments)
//! - **FactorCalculator**: derives the F1..F28 factor catalog over a DAG
//! - **PatternMatcher**: ranks the P001..P041 archetype catalog
//! - **MonteCarloSimulator**: forecasts outcome KPIs per matched pattern
//! - **ActionLayerCalculator**: aggregates 18 strategic recommendations
//! - **MultiLevelCache** + **Orchestrator**: memoized, resumable execution
//!
//! `AnalysisEngine` is the facade the API layer talks to.

pub mod action;
pub mod aggregator;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod factors;
pub mod infra;
pub mod layers;
pub mod patterns;
pub mod simulation;
pub mod store;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod tests;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::analysis::cache::{fingerprint, CacheStats, MultiLevelCache};
use crate::analysis::config::EngineConfig;
use crate::analysis::store::{CatalogStore, EvidenceStore, SharedCacheTier, StateStore};
use crate::analysis::types::{AnalysisResults, CatalogVersion, FormulaStatus, SessionStatus};
use crate::analysis::workflow::{AnalysisStage, Orchestrator, SessionHandle};
use crate::errors::{EngineError, Result};

/// Engine facade: session registry plus the orchestrator.
///
/// One engine instance serves many concurrent sessions; sessions share the
/// cache and the immutable catalogs and nothing else.
pub struct AnalysisEngine {
    orchestrator: Orchestrator,
    state: Arc<dyn StateStore>,
    catalogs: Arc<dyn CatalogStore>,
    cache: Arc<MultiLevelCache>,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl AnalysisEngine {
    /// Wire the engine to its external collaborators.
    pub fn new(
        config: EngineConfig,
        evidence: Arc<dyn EvidenceStore>,
        state: Arc<dyn StateStore>,
        catalogs: Arc<dyn CatalogStore>,
        shared_tier: Option<Arc<dyn SharedCacheTier>>,
    ) -> Self {
        let cache = Arc::new(MultiLevelCache::new(&config.cache, shared_tier));
        let orchestrator = Orchestrator::new(
            config,
            evidence,
            Arc::clone(&state),
            Arc::clone(&catalogs),
            Arc::clone(&cache),
        );
        Self {
            orchestrator,
            state,
            catalogs,
            cache,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Run (or resume) an analysis for a session. Idempotent: a session past
    /// CREATED resumes at its persisted cursor rather than restarting.
    pub async fn run_analysis(&self, session_id: &str) -> Result<String> {
        let handle = self.handle_or_create(session_id);
        self.orchestrator.run(&handle).await?;
        Ok(session_id.to_string())
    }

    /// Progress snapshot for a session.
    ///
    /// Falls back to persisted workflow state for sessions this process has
    /// not driven (e.g. after a restart).
    pub async fn get_status(&self, session_id: &str) -> Result<SessionStatus> {
        if let Some(handle) = self.handle(session_id) {
            return Ok(handle.status());
        }

        let history = self
            .state
            .load_history(session_id)
            .await
            .map_err(EngineError::Store)?;
        if history.is_empty() {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }

        let current_stage = self
            .state
            .load_stage(session_id)
            .await
            .map_err(EngineError::Store)?
            .unwrap_or(AnalysisStage::Created);
        let completed_stages: Vec<AnalysisStage> = history
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    store::StageStatus::Completed | store::StageStatus::Degraded
                )
            })
            .map(|r| r.stage)
            .collect();
        let degraded = history
            .iter()
            .any(|r| r.status == store::StageStatus::Degraded);

        Ok(SessionStatus {
            session_id: session_id.to_string(),
            current_stage,
            progress_percentage: current_stage.progress_percentage(),
            completed_stages,
            error_messages: Vec::new(),
            degraded,
            stage_timings_ms: history
                .iter()
                .map(|r| (r.stage.name().to_string(), r.elapsed_ms))
                .collect(),
        })
    }

    /// Compiled results. Fails with `ResultsNotReady` before COMPLETED.
    pub async fn get_results(&self, session_id: &str) -> Result<AnalysisResults> {
        let handle = self
            .handle(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        handle.results()
    }

    /// Catalog readiness probe for health checks.
    pub async fn get_formula_status(&self) -> FormulaStatus {
        match self.catalogs.load(None).await {
            Ok(catalog) => FormulaStatus {
                catalog_version: catalog.version,
                available: catalog.validate().is_ok(),
            },
            Err(_) => FormulaStatus {
                catalog_version: CatalogVersion(0),
                available: false,
            },
        }
    }

    /// Request cancellation of a session. The in-flight stage (if any)
    /// finishes; the orchestrator halts before the next one.
    pub fn cancel(&self, session_id: &str) -> Result<()> {
        let handle = self
            .handle(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        handle.cancel();
        info!(target: "vantage::workflow", session = session_id, "cancellation requested");
        Ok(())
    }

    /// Drop a session's cache entries. Call when the upstream collector
    /// appends evidence mid-run; the next `run_analysis` recomputes against
    /// the fresh evidence set. (Catalog version changes need no explicit
    /// invalidation; fingerprints embed the version.)
    pub async fn invalidate_session(&self, session_id: &str) {
        self.cache
            .invalidate_prefix(&fingerprint::session_prefix(session_id))
            .await;
    }

    /// Cache observability counters.
    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    fn handle(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(session_id).cloned()
    }

    fn handle_or_create(&self, session_id: &str) -> Arc<SessionHandle> {
        if let Some(handle) = self.handle(session_id) {
            return handle;
        }
        let mut sessions = self.sessions.write();
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionHandle::new(session_id))),
        )
    }
}
