#![deny(unreachable_pub)]

// Core modules
mod errors;

// Feature modules
pub mod analysis;

// Re-exports
pub use analysis::aggregator::{AggregatedValue, EvidenceAggregator};
pub use analysis::cache::{CacheStats, MultiLevelCache};
pub use analysis::config::EngineConfig;
pub use analysis::infra::logging::{init_logging, LogFormat, LoggingConfig};
pub use analysis::store::memory::{
    MemoryCacheTier, MemoryEvidenceStore, MemoryStateStore, StaticCatalogStore,
};
pub use analysis::store::{CatalogStore, EvidenceStore, SharedCacheTier, StateStore};
pub use analysis::types::*;
pub use analysis::workflow::AnalysisStage;
pub use analysis::AnalysisEngine;
pub use errors::{EngineError, ScoreError, SimError, StoreError};
