//! Full-pipeline behavior: completion, resume, retry, cancellation, caching.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::analysis::cache::MultiLevelCache;
use crate::analysis::store::memory::{MemoryStateStore, StaticCatalogStore};
use crate::analysis::store::{EvidenceStore, StageRecord, StageStatus, StateStore};
use crate::analysis::tests::{fast_config, full_evidence, rig};
use crate::analysis::types::EvidenceItem;
use crate::analysis::workflow::{AnalysisStage, Orchestrator, SessionHandle};
use crate::errors::{EngineError, StoreError};

#[tokio::test]
async fn test_full_pipeline_completes() {
    let rig = rig(fast_config());
    rig.evidence.insert("s1", full_evidence());

    let id = rig.engine.run_analysis("s1").await.unwrap();
    assert_eq!(id, "s1");

    let status = rig.engine.get_status("s1").await.unwrap();
    assert_eq!(status.current_stage, AnalysisStage::Completed);
    assert_eq!(status.progress_percentage, 100.0);
    assert!(!status.degraded);
    assert!(status.error_messages.is_empty());
    assert_eq!(status.completed_stages.len(), 6);

    let results = rig.engine.get_results("s1").await.unwrap();
    assert_eq!(results.layer_scores.len(), 10);
    assert_eq!(results.segment_scores.len(), 2);
    assert_eq!(results.factors.len(), 28);
    assert!(results.pattern_matches.len() >= 4, "expected a rich match set");
    assert!(!results.simulation_results.is_empty());
    assert_eq!(results.action_layers.len(), 18);
    assert!(!results.degraded);

    // The ranked set respects the documented order.
    for pair in results.pattern_matches.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
}

#[tokio::test]
async fn test_results_not_ready_before_completion() {
    let handle = SessionHandle::new("fresh");
    let err = handle.results().unwrap_err();
    assert!(matches!(err, EngineError::ResultsNotReady { .. }));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let rig = rig(fast_config());
    assert!(matches!(
        rig.engine.get_status("nope").await.unwrap_err(),
        EngineError::SessionNotFound(_)
    ));
    assert!(matches!(
        rig.engine.get_results("nope").await.unwrap_err(),
        EngineError::SessionNotFound(_)
    ));
    assert!(matches!(
        rig.engine.cancel("nope").unwrap_err(),
        EngineError::SessionNotFound(_)
    ));
}

#[tokio::test]
async fn test_rerun_of_completed_session_is_idempotent() {
    let rig = rig(fast_config());
    rig.evidence.insert("s1", full_evidence());

    rig.engine.run_analysis("s1").await.unwrap();
    let transitions = rig.state.transition_count("s1");
    assert_eq!(transitions, 7); // six work stages + COMPLETED

    rig.engine.run_analysis("s1").await.unwrap();
    assert_eq!(rig.state.transition_count("s1"), transitions, "no duplicate work");
}

#[tokio::test]
async fn test_resume_skips_persisted_stages() {
    // A session whose cursor sits at the end of SIMULATION resumes at
    // ACTION_LAYERS, not LAYER_SCORING.
    let rig = rig(fast_config());
    rig.evidence.insert("s1", full_evidence());

    let done = [
        AnalysisStage::EvidenceReady,
        AnalysisStage::LayerScoring,
        AnalysisStage::FactorCalculation,
        AnalysisStage::PatternMatching,
        AnalysisStage::Simulation,
    ];
    for stage in done {
        rig.state
            .save_stage(
                "s1",
                StageRecord {
                    stage,
                    status: StageStatus::Completed,
                    elapsed_ms: 1,
                    metadata: json!({}),
                },
            )
            .await
            .unwrap();
    }

    rig.engine.run_analysis("s1").await.unwrap();

    let history = rig.state.load_history("s1").await.unwrap();
    assert_eq!(history.len(), 7); // 5 pre-seeded + ACTION_LAYERS + COMPLETED
    let layer_scoring_records = history
        .iter()
        .filter(|r| r.stage == AnalysisStage::LayerScoring)
        .count();
    assert_eq!(layer_scoring_records, 1, "LAYER_SCORING was re-persisted");
    assert_eq!(history.last().unwrap().stage, AnalysisStage::Completed);
}

#[tokio::test]
async fn test_cancellation_between_stages() {
    let rig = rig(fast_config());
    rig.evidence.insert("s1", full_evidence());

    let orchestrator = Orchestrator::new(
        fast_config(),
        rig.evidence.clone(),
        rig.state.clone(),
        Arc::new(StaticCatalogStore::default_v1()),
        Arc::new(MultiLevelCache::new(&fast_config().cache, None)),
    );

    let handle = SessionHandle::new("s1");
    handle.cancel();
    let err = orchestrator.run(&handle).await.unwrap_err();

    assert!(matches!(err, EngineError::SessionCancelled(_)));
    assert_eq!(handle.stage(), AnalysisStage::Cancelled);
    let history = rig.state.load_history("s1").await.unwrap();
    assert_eq!(history.last().unwrap().status, StageStatus::Cancelled);
}

/// Evidence store that fails transiently before recovering.
struct FlakyEvidenceStore {
    inner: Vec<EvidenceItem>,
    failures_left: AtomicU32,
}

#[async_trait]
impl EvidenceStore for FlakyEvidenceStore {
    async fn fetch(&self, _session_id: &str) -> Result<Vec<EvidenceItem>, StoreError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("blip".to_string()));
        }
        Ok(self.inner.clone())
    }
}

#[tokio::test]
async fn test_transient_evidence_failure_is_retried() {
    let evidence = Arc::new(FlakyEvidenceStore {
        inner: full_evidence(),
        failures_left: AtomicU32::new(2),
    });
    let state = Arc::new(MemoryStateStore::new());
    let engine = crate::analysis::AnalysisEngine::new(
        fast_config(), // 3 retries, millisecond backoff
        evidence,
        state.clone(),
        Arc::new(StaticCatalogStore::default_v1()),
        None,
    );

    engine.run_analysis("s1").await.unwrap();
    let status = engine.get_status("s1").await.unwrap();
    assert_eq!(status.current_stage, AnalysisStage::Completed);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_session() {
    let evidence = Arc::new(FlakyEvidenceStore {
        inner: full_evidence(),
        failures_left: AtomicU32::new(u32::MAX),
    });
    let state = Arc::new(MemoryStateStore::new());
    let engine = crate::analysis::AnalysisEngine::new(
        fast_config(),
        evidence,
        state.clone(),
        Arc::new(StaticCatalogStore::default_v1()),
        None,
    );

    let err = engine.run_analysis("s1").await.unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Unavailable(_))));

    let status = engine.get_status("s1").await.unwrap();
    assert_eq!(status.current_stage, AnalysisStage::Failed);
    assert!(!status.error_messages.is_empty());

    let history = state.load_history("s1").await.unwrap();
    assert_eq!(history.last().unwrap().status, StageStatus::Failed);
}

#[tokio::test]
async fn test_resume_across_engine_instances_hits_shared_cache() {
    // Simulates a crashed worker: a second engine instance sharing the state
    // store and shared cache tier picks the session up without recomputing
    // from scratch.
    let first = rig(fast_config());
    first.evidence.insert("s1", full_evidence());
    first.engine.run_analysis("s1").await.unwrap();
    let results_a = first.engine.get_results("s1").await.unwrap();
    let transitions = first.state.transition_count("s1");

    let second = crate::analysis::AnalysisEngine::new(
        fast_config(),
        first.evidence.clone(),
        first.state.clone(),
        Arc::new(StaticCatalogStore::default_v1()),
        Some(first.shared.clone()),
    );
    second.run_analysis("s1").await.unwrap();
    let results_b = second.get_results("s1").await.unwrap();

    // No new transitions were persisted, the stage outputs came from the
    // shared tier, and the compiled results are identical.
    assert_eq!(first.state.transition_count("s1"), transitions);
    assert!(second.cache_stats().shared_hits.load(Ordering::Relaxed) >= 4);
    assert_eq!(results_a, results_b);
}

#[tokio::test]
async fn test_formula_status_reports_catalog() {
    let rig = rig(fast_config());
    let status = rig.engine.get_formula_status().await;
    assert!(status.available);
    assert_eq!(status.catalog_version.0, 1);
}

#[tokio::test]
async fn test_session_invalidation_clears_cached_stages() {
    let rig = rig(fast_config());
    rig.evidence.insert("s1", full_evidence());
    rig.engine.run_analysis("s1").await.unwrap();
    assert!(rig.shared.len() >= 4);

    rig.engine.invalidate_session("s1").await;
    assert_eq!(rig.shared.len(), 0);
}
