//! Workflow orchestration: the resumable, retryable stage machine.
//!
//! One orchestrator drives one session's pipeline at a time; independent
//! sessions run concurrently and share only the cache and the immutable
//! catalogs. Every stage transition is persisted through the `StateStore`
//! before the next stage starts, so a crashed process resumes at the last
//! completed stage: stages already persisted are not re-persisted, and their
//! recomputation is served by the cache.
//!
//! Retry policy: transient store failures back off exponentially up to the
//! configured limit. Deterministic evaluation failures are never retried;
//! they are recorded and the stage proceeds degraded. Cancellation is
//! observed between stages; an in-flight stage always runs to completion.

pub mod stage;

pub use stage::{AnalysisStage, WORK_STAGES};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::analysis::action::ActionLayerCalculator;
use crate::analysis::aggregator::EvidenceAggregator;
use crate::analysis::cache::{fingerprint, MultiLevelCache};
use crate::analysis::catalog::Catalog;
use crate::analysis::config::EngineConfig;
use crate::analysis::factors::FactorCalculator;
use crate::analysis::layers::LayerScorer;
use crate::analysis::patterns::PatternMatcher;
use crate::analysis::simulation::{session_entropy, MonteCarloSimulator};
use crate::analysis::store::{
    CatalogStore, EvidenceStore, StageRecord, StageStatus, StateStore,
};
use crate::analysis::types::{AnalysisResults, SessionStatus};
use crate::errors::{EngineError, StoreError};

/// Outputs accumulated as the pipeline advances.
#[derive(Debug, Default)]
struct PartialResults {
    scored: Option<crate::analysis::layers::ScoredLayers>,
    factors: Option<crate::analysis::factors::FactorSet>,
    matches: Option<crate::analysis::patterns::MatchSet>,
    simulations: Option<crate::analysis::simulation::SimOutput>,
    actions: Option<crate::analysis::action::ActionOutput>,
}

/// Shared, concurrently observable state of one analysis session.
///
/// Mutated only by the orchestrator; `get_status` readers see a consistent
/// snapshot at any point.
pub struct SessionHandle {
    id: String,
    stage: RwLock<AnalysisStage>,
    completed: RwLock<Vec<AnalysisStage>>,
    errors: RwLock<Vec<String>>,
    timings: RwLock<Vec<(String, u64)>>,
    degraded: AtomicBool,
    cancelled: AtomicBool,
    /// Serializes concurrent `run_analysis` calls on one session.
    run_lock: tokio::sync::Mutex<()>,
    /// Per-session entropy for the simulator's production seeding.
    entropy: u64,
    /// Reference time for recency decay; fixed at creation so reruns over the
    /// same evidence reproduce identical scores.
    reference_time: DateTime<Utc>,
    results: RwLock<PartialResults>,
}

impl SessionHandle {
    /// Create a fresh handle.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage: RwLock::new(AnalysisStage::Created),
            completed: RwLock::new(Vec::new()),
            errors: RwLock::new(Vec::new()),
            timings: RwLock::new(Vec::new()),
            degraded: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            run_lock: tokio::sync::Mutex::new(()),
            entropy: session_entropy(),
            reference_time: Utc::now(),
            results: RwLock::new(PartialResults::default()),
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current stage.
    pub fn stage(&self) -> AnalysisStage {
        *self.stage.read()
    }

    /// Request cancellation. Observed between stages.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether any non-fatal entity-level failure was recorded.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Progress snapshot.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id.clone(),
            current_stage: self.stage(),
            progress_percentage: self.stage().progress_percentage(),
            completed_stages: self.completed.read().clone(),
            error_messages: self.errors.read().clone(),
            degraded: self.is_degraded(),
            stage_timings_ms: self.timings.read().clone(),
        }
    }

    /// Compiled results. Fails with `ResultsNotReady` before COMPLETED.
    pub fn results(&self) -> Result<AnalysisResults, EngineError> {
        let stage = self.stage();
        if stage != AnalysisStage::Completed {
            return Err(EngineError::ResultsNotReady {
                session_id: self.id.clone(),
                stage: stage.to_string(),
            });
        }

        let partial = self.results.read();
        let scored = partial.scored.clone().unwrap_or_default();
        Ok(AnalysisResults {
            layer_scores: scored.layer_scores,
            segment_scores: scored.segment_scores,
            factors: partial
                .factors
                .clone()
                .map(|f| f.factors)
                .unwrap_or_default(),
            pattern_matches: partial
                .matches
                .clone()
                .map(|m| m.matches)
                .unwrap_or_default(),
            simulation_results: partial
                .simulations
                .clone()
                .map(|s| s.results)
                .unwrap_or_default(),
            action_layers: partial
                .actions
                .clone()
                .map(|a| a.layers)
                .unwrap_or_default(),
            degraded: self.is_degraded(),
        })
    }

    fn set_stage(&self, stage: AnalysisStage) {
        *self.stage.write() = stage;
    }

    fn mark_completed(&self, stage: AnalysisStage, elapsed_ms: u64) {
        self.completed.write().push(stage);
        self.timings.write().push((stage.name().to_string(), elapsed_ms));
    }

    fn record_errors(&self, messages: impl IntoIterator<Item = String>) {
        let mut errors = self.errors.write();
        let before = errors.len();
        errors.extend(messages);
        if errors.len() > before {
            self.degraded.store(true, Ordering::SeqCst);
        }
    }
}

/// Drives session pipelines against the external stores.
pub struct Orchestrator {
    config: EngineConfig,
    evidence: Arc<dyn EvidenceStore>,
    state: Arc<dyn StateStore>,
    catalogs: Arc<dyn CatalogStore>,
    cache: Arc<MultiLevelCache>,
}

impl Orchestrator {
    /// Create over the external store seams.
    pub fn new(
        config: EngineConfig,
        evidence: Arc<dyn EvidenceStore>,
        state: Arc<dyn StateStore>,
        catalogs: Arc<dyn CatalogStore>,
        cache: Arc<MultiLevelCache>,
    ) -> Self {
        Self {
            config,
            evidence,
            state,
            catalogs,
            cache,
        }
    }

    /// Run (or resume) a session's pipeline to a terminal state.
    ///
    /// Idempotent: a completed session returns immediately; an in-progress
    /// session resumes at the persisted stage cursor. A concurrent call on
    /// the same handle returns without doing duplicate work.
    pub async fn run(&self, session: &SessionHandle) -> Result<(), EngineError> {
        let Ok(_guard) = session.run_lock.try_lock() else {
            // Another caller is already driving this session.
            return Ok(());
        };

        match session.stage() {
            AnalysisStage::Completed => return Ok(()),
            AnalysisStage::Cancelled => {
                return Err(EngineError::SessionCancelled(session.id.clone()))
            }
            AnalysisStage::Failed => {
                return Err(EngineError::StageFailed {
                    session_id: session.id.clone(),
                    stage: AnalysisStage::Failed.to_string(),
                    reason: "session previously failed".to_string(),
                })
            }
            _ => {}
        }

        // Catalog is load-bearing for every stage: unavailability is fatal.
        let catalog = match self
            .with_retry("catalog load", || self.catalogs.load(None))
            .await
        {
            Ok(catalog) => catalog,
            Err(e) => {
                self.fail(session, AnalysisStage::Created, &e).await;
                return Err(e);
            }
        };
        if let Err(e) = catalog.validate() {
            self.fail(session, AnalysisStage::Created, &e).await;
            return Err(e);
        }

        // Resume cursor: the last persisted completed/degraded stage.
        let resume_idx = match self
            .with_retry("load stage cursor", || self.state.load_stage(&session.id))
            .await
        {
            Ok(cursor) => cursor.and_then(|s| s.pipeline_index()).unwrap_or(0),
            Err(e) => {
                self.fail(session, AnalysisStage::Created, &e).await;
                return Err(e);
            }
        };
        if resume_idx > 0 {
            info!(
                target: "vantage::workflow",
                session = %session.id,
                resume_from = resume_idx,
                "resuming session at persisted cursor"
            );
        }

        self.drive(session, &catalog, resume_idx).await
    }

    /// Execute the pipeline from the resume point.
    async fn drive(
        &self,
        session: &SessionHandle,
        catalog: &Catalog,
        resume_idx: usize,
    ) -> Result<(), EngineError> {
        let version = catalog.version;

        // Components are built once per run from the immutable catalog.
        let aggregator = EvidenceAggregator::new(self.config.aggregator.clone());
        let scorer = LayerScorer::new(self.config.layers.clone(), aggregator);
        let factor_calc = match FactorCalculator::new(catalog.factors.clone()) {
            Ok(calc) => calc,
            Err(e) => {
                self.fail(session, AnalysisStage::FactorCalculation, &e).await;
                return Err(e);
            }
        };
        let matcher = PatternMatcher::new(self.config.matcher.clone(), catalog.patterns.clone());
        let simulator = MonteCarloSimulator::new(self.config.simulator.clone());
        let action_calc = ActionLayerCalculator::new(catalog.action_layers.clone());

        // === EVIDENCE_READY ===
        // Evidence content is needed on every run (it keys the fingerprints),
        // so it is fetched even when resuming past this stage.
        self.check_cancelled(session, AnalysisStage::EvidenceReady).await?;
        let started = Instant::now();
        let mut evidence = match self
            .with_retry("fetch evidence", || self.evidence.fetch(&session.id))
            .await
        {
            Ok(items) => items,
            Err(e) => {
                self.fail(session, AnalysisStage::EvidenceReady, &e).await;
                return Err(e);
            }
        };
        // Canonical order: fingerprints must not depend on collector ordering.
        evidence.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        let evidence_hash = fingerprint::content_hash(&evidence);
        self.complete_stage(
            session,
            AnalysisStage::EvidenceReady,
            StageStatus::Completed,
            started.elapsed().as_millis() as u64,
            json!({ "evidence_count": evidence.len() }),
            resume_idx,
        )
        .await?;

        // === LAYER_SCORING ===
        self.check_cancelled(session, AnalysisStage::LayerScoring).await?;
        let started = Instant::now();
        let key = fingerprint::stage_key(&session.id, "layer_scoring", version, &evidence_hash);
        let scored = match self.cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let computed = scorer.score(&evidence, session.reference_time);
                self.cache.put(&key, &computed).await;
                computed
            }
        };

        // Zero evidence for every layer leaves nothing to analyze: stage-fatal.
        if scored.notes.len() == scored.layer_scores.len() {
            let e = EngineError::StageFailed {
                session_id: session.id.clone(),
                stage: AnalysisStage::LayerScoring.to_string(),
                reason: "zero evidence for every layer".to_string(),
            };
            self.fail(session, AnalysisStage::LayerScoring, &e).await;
            return Err(e);
        }

        session.record_errors(scored.notes.iter().cloned());
        let status = stage_status(scored.notes.is_empty());
        session.results.write().scored = Some(scored.clone());
        self.complete_stage(
            session,
            AnalysisStage::LayerScoring,
            status,
            started.elapsed().as_millis() as u64,
            json!({
                "layers_scored": scored.layer_scores.len() - scored.notes.len(),
                "segments_scored": scored.segment_scores.len(),
            }),
            resume_idx,
        )
        .await?;

        // === FACTOR_CALCULATION ===
        self.check_cancelled(session, AnalysisStage::FactorCalculation).await?;
        let started = Instant::now();
        let key =
            fingerprint::stage_key(&session.id, "factor_calculation", version, &evidence_hash);
        let factors = match self.cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let computed = factor_calc.calculate(&scored);
                self.cache.put(&key, &computed).await;
                computed
            }
        };

        session.record_errors(factors.failures.iter().map(|e| e.to_string()));
        let status = stage_status(factors.failures.is_empty());
        session.results.write().factors = Some(factors.clone());
        self.complete_stage(
            session,
            AnalysisStage::FactorCalculation,
            status,
            started.elapsed().as_millis() as u64,
            json!({ "factors_computed": factors.factors.len() }),
            resume_idx,
        )
        .await?;

        // === PATTERN_MATCHING ===
        self.check_cancelled(session, AnalysisStage::PatternMatching).await?;
        let started = Instant::now();
        let key =
            fingerprint::stage_key(&session.id, "pattern_matching", version, &evidence_hash);
        let matches = match self.cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let computed = matcher.match_patterns(&factors, &scored.segment_scores);
                self.cache.put(&key, &computed).await;
                computed
            }
        };

        session.results.write().matches = Some(matches.clone());
        self.complete_stage(
            session,
            AnalysisStage::PatternMatching,
            StageStatus::Completed,
            started.elapsed().as_millis() as u64,
            json!({ "patterns_matched": matches.matches.len() }),
            resume_idx,
        )
        .await?;

        // === SIMULATION ===
        self.check_cancelled(session, AnalysisStage::Simulation).await?;
        let started = Instant::now();
        let master_seed = simulator.master_seed(session.entropy);
        let sim_input_hash = fingerprint::content_hash(&(evidence_hash.as_str(), master_seed));
        let key = fingerprint::stage_key(&session.id, "simulation", version, &sim_input_hash);
        let simulations = match self.cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let computed = simulator.simulate(&matches.matches, &catalog.patterns, &factors, master_seed);
                self.cache.put(&key, &computed).await;
                computed
            }
        };

        session.record_errors(simulations.notes.iter().map(|e| e.to_string()));
        let status = stage_status(simulations.notes.is_empty());
        session.results.write().simulations = Some(simulations.clone());
        self.complete_stage(
            session,
            AnalysisStage::Simulation,
            status,
            started.elapsed().as_millis() as u64,
            json!({ "simulations_run": simulations.results.len() }),
            resume_idx,
        )
        .await?;

        // === ACTION_LAYERS ===
        self.check_cancelled(session, AnalysisStage::ActionLayers).await?;
        let started = Instant::now();
        let key = fingerprint::stage_key(&session.id, "action_layers", version, &sim_input_hash);
        let actions = match self.cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let computed =
                    action_calc.calculate(&factors, &matches, &simulations.results, &catalog.patterns);
                self.cache.put(&key, &computed).await;
                computed
            }
        };

        session.record_errors(actions.failures.iter().map(|e| e.to_string()));
        let status = stage_status(actions.failures.is_empty());
        session.results.write().actions = Some(actions.clone());
        self.complete_stage(
            session,
            AnalysisStage::ActionLayers,
            status,
            started.elapsed().as_millis() as u64,
            json!({ "action_layers_computed": actions.layers.len() }),
            resume_idx,
        )
        .await?;

        // === COMPLETED ===
        session.set_stage(AnalysisStage::Completed);
        let already_persisted = AnalysisStage::Completed
            .pipeline_index()
            .is_some_and(|idx| idx <= resume_idx);
        if !already_persisted {
            let record = StageRecord {
                stage: AnalysisStage::Completed,
                status: stage_status(!session.is_degraded()),
                elapsed_ms: 0,
                metadata: json!({ "degraded": session.is_degraded() }),
            };
            self.persist(session, record).await?;
        }
        info!(
            target: "vantage::workflow",
            session = %session.id,
            degraded = session.is_degraded(),
            "analysis completed"
        );
        Ok(())
    }

    /// Mark one stage done: advance the handle, persist the transition
    /// (unless this run resumed past it), and record timing.
    async fn complete_stage(
        &self,
        session: &SessionHandle,
        stage: AnalysisStage,
        status: StageStatus,
        elapsed_ms: u64,
        metadata: serde_json::Value,
        resume_idx: usize,
    ) -> Result<(), EngineError> {
        session.set_stage(stage);
        session.mark_completed(stage, elapsed_ms);

        let already_persisted =
            stage.pipeline_index().is_some_and(|idx| idx <= resume_idx);
        if already_persisted {
            return Ok(());
        }

        let record = StageRecord {
            stage,
            status,
            elapsed_ms,
            metadata,
        };
        self.persist(session, record).await
    }

    /// Persist one transition with retry; storage loss after retries is
    /// session-fatal (progress could no longer be resumed truthfully).
    async fn persist(&self, session: &SessionHandle, record: StageRecord) -> Result<(), EngineError> {
        let stage = record.stage;
        match self
            .with_retry("persist stage", || {
                self.state.save_stage(&session.id, record.clone())
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(session, stage, &e).await;
                Err(e)
            }
        }
    }

    /// Observe the cancellation flag before starting a stage.
    async fn check_cancelled(
        &self,
        session: &SessionHandle,
        upcoming: AnalysisStage,
    ) -> Result<(), EngineError> {
        if !session.is_cancelled() {
            return Ok(());
        }

        session.set_stage(AnalysisStage::Cancelled);
        let record = StageRecord {
            stage: upcoming,
            status: StageStatus::Cancelled,
            elapsed_ms: 0,
            metadata: json!({}),
        };
        // Best-effort: cancellation must not hang on a dead store.
        if let Err(e) = self.state.save_stage(&session.id, record).await {
            warn!(target: "vantage::workflow", session = %session.id, error = %e, "failed to persist cancellation");
        }
        info!(target: "vantage::workflow", session = %session.id, stage = %upcoming, "session cancelled");
        Err(EngineError::SessionCancelled(session.id.clone()))
    }

    /// Transition to FAILED and record the reason.
    async fn fail(&self, session: &SessionHandle, stage: AnalysisStage, error: &EngineError) {
        warn!(
            target: "vantage::workflow",
            session = %session.id,
            %stage,
            error = %error,
            "session failed"
        );
        session.record_errors([format!("{stage}: {error}")]);
        session.set_stage(AnalysisStage::Failed);

        let record = StageRecord {
            stage,
            status: StageStatus::Failed,
            elapsed_ms: 0,
            metadata: json!({ "error": error.to_string() }),
        };
        // Best-effort: the store may be the thing that is down.
        if let Err(e) = self.state.save_stage(&session.id, record).await {
            warn!(target: "vantage::workflow", session = %session.id, error = %e, "failed to persist failure record");
        }
    }

    /// Retry a store operation with exponential backoff on transient errors.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let workflow = &self.config.workflow;
        let mut backoff_ms = workflow.retry_backoff_ms;
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < workflow.max_stage_retries => {
                    attempt += 1;
                    warn!(
                        target: "vantage::workflow",
                        operation = what,
                        attempt,
                        backoff_ms,
                        error = %e,
                        "transient store failure; backing off"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(workflow.max_backoff_ms);
                }
                Err(e) => return Err(EngineError::Store(e)),
            }
        }
    }
}

fn stage_status(clean: bool) -> StageStatus {
    if clean {
        StageStatus::Completed
    } else {
        StageStatus::Degraded
    }
}
