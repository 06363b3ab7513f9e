//! Resolution services for the Beneficiary Resolver
//!
//! This crate holds the staged resolution pipeline and everything it leans
//! on: the retry/timeout executor, the research provider chain, conflict
//! resolution, source trust, confidence scoring, the cache and knowledge
//! stores, per-run metrics and configuration.

pub mod confidence;
pub mod config;
pub mod conflict;
pub mod executor;
pub mod factors;
pub mod metrics;
pub mod pipeline;
pub mod provider_chain;
pub mod stores;
pub mod trust;

pub use confidence::ConfidenceAggregator;
pub use config::PipelineConfig;
pub use conflict::{ConflictResolution, ConflictResolver, RoleConflict, DEFAULT_TIE_RATIO};
pub use executor::{classify_error, ErrorClass, ExecutionReport, RetryPolicy, RetryTimeoutExecutor};
pub use factors::{compute_factors, FactorInputs};
pub use metrics::{MetricsSink, NoopMetricsSink, PipelineMetrics, TracingMetricsSink};
pub use pipeline::{ResolutionPipeline, StageOutcome};
pub use provider_chain::{AttemptOutcome, ChainRun, ProviderAttempt, ResearchProviderChain};
pub use stores::{
    bigram_similarity, CacheTtlPolicy, InMemoryKnowledgeStore, JsonStaticMappings, KnowledgeEntry,
    KnowledgeMatch, KnowledgeStore, SqliteKnowledgeStore, StaticMapping, StaticMappingStore,
    StoreError,
};
pub use trust::{ConsistencyCheck, SourceDomainRegistry, SourceTrustEvaluator, StaticDomainRegistry};
