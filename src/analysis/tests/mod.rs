//! Cross-component pipeline and scenario tests.
//!
//! These exercise the engine through its public facade against the in-memory
//! stores: full pipeline runs, resume/idempotency, retry and failure paths,
//! cancellation, cache behavior, and the end-to-end degradation scenarios.

mod pipeline;

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::analysis::config::EngineConfig;
use crate::analysis::store::memory::{
    MemoryCacheTier, MemoryEvidenceStore, MemoryStateStore, StaticCatalogStore,
};
use crate::analysis::types::{Dimension, EvidenceItem, Provenance, StrategicLayer};
use crate::analysis::AnalysisEngine;

/// Engine wired to in-memory stores, with the stores exposed for inspection.
pub(crate) struct TestRig {
    pub engine: AnalysisEngine,
    pub evidence: Arc<MemoryEvidenceStore>,
    pub state: Arc<MemoryStateStore>,
    pub shared: Arc<MemoryCacheTier>,
}

/// Deterministic, fast configuration for tests.
pub(crate) fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.simulator.seed = 42;
    config.simulator.sample_count = 500;
    config.workflow.retry_backoff_ms = 1;
    config.workflow.max_backoff_ms = 4;
    config
}

pub(crate) fn rig(config: EngineConfig) -> TestRig {
    let evidence = Arc::new(MemoryEvidenceStore::new());
    let state = Arc::new(MemoryStateStore::new());
    let shared = Arc::new(MemoryCacheTier::new());
    let engine = AnalysisEngine::new(
        config,
        evidence.clone(),
        state.clone(),
        Arc::new(StaticCatalogStore::default_v1()),
        Some(shared.clone()),
    );
    TestRig {
        engine,
        evidence,
        state,
        shared,
    }
}

pub(crate) fn item(
    source_id: &str,
    dimension: Dimension,
    value: f64,
    quality: f64,
    age_days: i64,
) -> EvidenceItem {
    EvidenceItem {
        source_id: source_id.to_string(),
        dimension: dimension.clone(),
        raw_value: value,
        quality_score: quality,
        recency: Utc::now() - Duration::days(age_days),
        provenance: Provenance::SearchIndex,
        summary: format!("{source_id} on {dimension}"),
    }
}

/// A realistic evidence set: strong demand-side layers, weak competition,
/// light regulatory drag, two scored segments. Every layer is covered by two
/// concordant items, so a clean run completes without degradation.
pub(crate) fn full_evidence() -> Vec<EvidenceItem> {
    let mut items = Vec::new();
    for (i, layer) in StrategicLayer::ALL.into_iter().enumerate() {
        let base = match layer {
            StrategicLayer::Competition => 0.3,
            StrategicLayer::Regulatory => 0.8,
            _ => 0.7,
        };
        items.push(item(
            &format!("src-{i:02}a"),
            Dimension::Layer(layer),
            base + 0.05,
            0.85,
            2,
        ));
        items.push(item(
            &format!("src-{i:02}b"),
            Dimension::Layer(layer),
            base - 0.05,
            0.75,
            8,
        ));
    }
    items.push(item(
        "seg-ent",
        Dimension::Segment("enterprise".to_string()),
        0.78,
        0.85,
        3,
    ));
    items.push(item(
        "seg-smb",
        Dimension::Segment("smb".to_string()),
        0.65,
        0.8,
        3,
    ));
    items
}
