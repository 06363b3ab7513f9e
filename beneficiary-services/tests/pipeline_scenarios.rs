//! End-to-end resolution scenarios against in-memory stores and scripted providers

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use beneficiary_core::{
    BeneficiaryError, OwnershipEntity, OwnershipRole, ProviderFindings, ProviderResult,
    ResearchRequest, ResultType, SourceRecord, SourceTier, StageStatus, VerificationStatus,
};
use beneficiary_research::{ResearchContext, ResearchProvider};
use beneficiary_services::{
    InMemoryKnowledgeStore, JsonStaticMappings, KnowledgeEntry, KnowledgeStore, MetricsSink,
    PipelineConfig, PipelineMetrics, ResearchProviderChain, ResolutionPipeline, RetryPolicy,
    StaticDomainRegistry, StaticMapping,
};
use parking_lot::Mutex;

enum Script {
    Answer {
        owner: &'static str,
        confidence: f64,
        sources: Vec<&'static str>,
    },
    Chain {
        owner: &'static str,
        entities: Vec<(&'static str, OwnershipRole)>,
        sources: Vec<&'static str>,
    },
    Hang,
    Fail(BeneficiaryError),
    Panic,
}

struct ScriptedProvider {
    name: &'static str,
    script: Script,
    calls: AtomicU32,
    contexts: Mutex<Vec<ResearchContext>>,
}

impl ScriptedProvider {
    fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            calls: AtomicU32::new(0),
            contexts: Mutex::new(Vec::new()),
        })
    }

    fn answering(name: &'static str, owner: &'static str, confidence: f64) -> Arc<Self> {
        Self::new(
            name,
            Script::Answer {
                owner,
                confidence,
                sources: vec!["https://www.sec.gov/acme-10k", "https://www.reuters.com/acme"],
            },
        )
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResearchProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn research(
        &self,
        request: &ResearchRequest,
        context: &ResearchContext,
    ) -> Result<ProviderResult, BeneficiaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().push(context.clone());

        match &self.script {
            Script::Answer {
                owner,
                confidence,
                sources,
            } => {
                let mut findings = ProviderFindings::new(self.name, *owner);
                findings.confidence = *confidence;
                findings.beneficiary_country = "United States".to_string();
                findings.ownership_structure_type = "Public Company".to_string();
                findings.reasoning = format!(
                    "{} is a wholly owned subsidiary of {} since its 2019 acquisition.",
                    request.brand, owner
                );
                findings.sources = sources
                    .iter()
                    .map(|url| SourceRecord::new(*url, 0.9))
                    .collect();
                findings.ownership_chain = vec![
                    OwnershipEntity::new(request.brand.as_str(), OwnershipRole::Brand),
                    OwnershipEntity::new(*owner, OwnershipRole::UltimateOwner)
                        .with_source(SourceRecord::new(sources[0], 0.9)),
                ];
                Ok(ProviderResult::Success(findings))
            }
            Script::Chain {
                owner,
                entities,
                sources,
            } => {
                let records: Vec<SourceRecord> = sources
                    .iter()
                    .map(|url| SourceRecord::new(*url, 0.9))
                    .collect();
                let mut findings = ProviderFindings::new(self.name, *owner);
                findings.confidence = 0.9;
                findings.beneficiary_country = "United States".to_string();
                findings.ownership_structure_type = "Public Company".to_string();
                findings.reasoning = format!(
                    "{} is a wholly owned subsidiary of {} through {} intermediate holding companies since its 2019 acquisition.",
                    request.brand,
                    owner,
                    entities.len().saturating_sub(2)
                );
                findings.sources = records.clone();
                findings.ownership_chain = entities
                    .iter()
                    .map(|(name, role)| {
                        records
                            .iter()
                            .cloned()
                            .fold(OwnershipEntity::new(*name, *role), |e, source| e.with_source(source))
                    })
                    .collect();
                Ok(ProviderResult::Success(findings))
            }
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ProviderResult::miss("unreachable"))
            }
            Script::Fail(error) => Err(error.clone()),
            Script::Panic => panic!("provider blew up"),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    runs: Mutex<Vec<PipelineMetrics>>,
}

impl MetricsSink for RecordingSink {
    fn record(&self, metrics: &PipelineMetrics) {
        self.runs.lock().push(metrics.clone());
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_timeout(Duration::from_millis(200))
        .with_max_retries(2)
        .with_base_delay(Duration::from_millis(10))
}

fn registry() -> Arc<StaticDomainRegistry> {
    Arc::new(
        StaticDomainRegistry::new()
            .with_domain("sec.gov", SourceTier::Verified)
            .with_domain("reuters.com", SourceTier::HighlyTrusted),
    )
}

fn acme_mappings() -> Arc<JsonStaticMappings> {
    Arc::new(JsonStaticMappings::new().with_mapping(StaticMapping {
        brand: "Acme".to_string(),
        financial_beneficiary: "Globex Corp".to_string(),
        beneficiary_country: "United States".to_string(),
        ownership_structure_type: "Private Company".to_string(),
        ownership_flow: Vec::new(),
        sources: vec!["https://www.sec.gov/globex".to_string()],
    }))
}

fn pipeline_with(
    store: Arc<InMemoryKnowledgeStore>,
    providers: &[Arc<ScriptedProvider>],
) -> ResolutionPipeline {
    let chain = providers.iter().fold(ResearchProviderChain::new(), |chain, p| {
        chain.with_provider(p.clone(), fast_policy())
    });
    ResolutionPipeline::new(store, acme_mappings(), registry(), chain)
}

#[tokio::test]
async fn static_mapping_answers_without_calling_providers() {
    let provider = ScriptedProvider::answering("web_search", "Initech", 0.9);
    let pipeline = pipeline_with(Arc::new(InMemoryKnowledgeStore::new()), &[provider.clone()]);

    let result = pipeline.resolve(&ResearchRequest::new("Acme")).await;

    assert_eq!(result.result_type, ResultType::StaticMapping);
    assert_eq!(result.financial_beneficiary, "Globex Corp");
    assert_eq!(result.confidence_score, 95);
    assert_eq!(result.verification_status, VerificationStatus::Verified);
    assert_eq!(result.ownership_flow.len(), 2);
    assert_eq!(result.sources[0].tier, SourceTier::Verified);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn all_providers_timing_out_yields_unknown_error() {
    let first = ScriptedProvider::new("reasoning", Script::Hang);
    let second = ScriptedProvider::new("web_search", Script::Hang);
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let sink = Arc::new(RecordingSink::default());
    let pipeline =
        pipeline_with(store.clone(), &[first.clone(), second.clone()]).with_metrics(sink.clone());

    let result = pipeline.resolve(&ResearchRequest::new("Zorblex")).await;

    assert_eq!(result.financial_beneficiary, "Unknown");
    assert_eq!(result.confidence_score, 20);
    assert_eq!(result.result_type, ResultType::Error);
    // Timeouts are transient: one call plus two retries each
    assert_eq!(first.calls(), 3);
    assert_eq!(second.calls(), 3);

    let providers = result.trace.stage("providers").unwrap();
    assert_eq!(providers.status, StageStatus::Error);
    assert_eq!(providers.reasoning.len(), 2);

    // Error results are never cached
    assert_eq!(store.cached_len(), 0);

    let runs = sink.runs.lock();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].provider_calls, 6);
    assert_eq!(runs[0].result_type, ResultType::Error);
}

#[tokio::test]
async fn permanent_failure_is_tried_once_then_next_provider_answers() {
    let broken = ScriptedProvider::new("reasoning", Script::Fail(BeneficiaryError::auth("bad key")));
    let search = ScriptedProvider::answering("web_search", "Initech", 0.85);
    let pipeline = pipeline_with(
        Arc::new(InMemoryKnowledgeStore::new()),
        &[broken.clone(), search.clone()],
    );

    let result = pipeline.resolve(&ResearchRequest::new("Widgetco")).await;

    assert_eq!(broken.calls(), 1);
    assert_eq!(search.calls(), 1);
    assert_eq!(result.result_type, ResultType::Provider("web_search".into()));
    assert_eq!(result.financial_beneficiary, "Initech");
    assert!(result.confidence_score <= 100);
    assert!(!result.confidence_breakdown.is_empty());
    assert_eq!(result.ownership_flow.last().unwrap().name, "Initech");
    assert!(result.trace.stage("confidence").is_some());
}

#[tokio::test]
async fn warm_cache_returns_identical_results() {
    let provider = ScriptedProvider::answering("web_search", "Initech", 0.9);
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let pipeline = pipeline_with(store.clone(), &[provider.clone()]);
    let request = ResearchRequest::new("Widgetco");

    let fresh = pipeline.resolve(&request).await;
    assert!(fresh.confidence_score >= 50, "score {}", fresh.confidence_score);
    assert_eq!(store.cached_len(), 1);

    let first = pipeline.resolve(&request).await;
    let second = pipeline.resolve(&request).await;

    assert_eq!(first.result_type, ResultType::Cache);
    assert_eq!(first.financial_beneficiary, fresh.financial_beneficiary);
    assert_eq!(first.confidence_score, fresh.confidence_score);
    assert_eq!(first.without_timings(), second.without_timings());
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn follow_up_context_bypasses_cache() {
    let provider = ScriptedProvider::answering("web_search", "Initech", 0.9);
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let pipeline = pipeline_with(store.clone(), &[provider.clone()]);

    pipeline.resolve(&ResearchRequest::new("Widgetco")).await;
    let result = pipeline
        .resolve(&ResearchRequest::new("Widgetco").with_follow_up("Was it sold in 2024?"))
        .await;

    assert_eq!(provider.calls(), 2);
    assert_ne!(result.result_type, ResultType::Cache);
    let cache = result.trace.stage("cache").unwrap();
    assert_eq!(cache.status, StageStatus::Partial);
}

#[tokio::test]
async fn confident_knowledge_match_is_terminal() {
    let provider = ScriptedProvider::answering("web_search", "Initech", 0.9);
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let mut entry = KnowledgeEntry::from_result(&beneficiary_core::ResolutionResult::unknown(
        &ResearchRequest::new("Widget Co"),
        88,
        ResultType::Provider("web_search".into()),
    ));
    entry.financial_beneficiary = "Initech".to_string();
    store.upsert_knowledge(entry).await.unwrap();

    let pipeline = pipeline_with(store, &[provider.clone()]);
    let result = pipeline.resolve(&ResearchRequest::new("widget-co")).await;

    assert_eq!(result.result_type, ResultType::KnowledgeBase);
    assert_eq!(result.financial_beneficiary, "Initech");
    assert_eq!(result.confidence_score, 88);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn weak_knowledge_match_becomes_provider_context() {
    let provider = ScriptedProvider::answering("web_search", "Initech", 0.9);
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let mut entry = KnowledgeEntry::from_result(&beneficiary_core::ResolutionResult::unknown(
        &ResearchRequest::new("Widgetco"),
        60,
        ResultType::Provider("web_search".into()),
    ));
    entry.financial_beneficiary = "Initech".to_string();
    store.upsert_knowledge(entry).await.unwrap();

    let pipeline = pipeline_with(store, &[provider.clone()]);
    let result = pipeline.resolve(&ResearchRequest::new("Widgetco")).await;

    assert_eq!(result.result_type, ResultType::Provider("web_search".into()));
    let contexts = provider.contexts.lock();
    assert_eq!(contexts.len(), 1);
    assert!(contexts[0].related_knowledge[0].starts_with("Widgetco -> Initech"));
}

#[tokio::test]
async fn confident_direct_reasoning_skips_research() {
    let direct = ScriptedProvider::answering("direct", "Initech", 0.82);
    let search = ScriptedProvider::answering("web_search", "Initech", 0.9);
    let pipeline = pipeline_with(Arc::new(InMemoryKnowledgeStore::new()), &[search.clone()])
        .with_direct_reasoner(direct.clone(), fast_policy());

    let result = pipeline.resolve(&ResearchRequest::new("Widgetco")).await;

    assert_eq!(result.result_type, ResultType::DirectReasoning);
    assert_eq!(direct.calls(), 1);
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn unsure_direct_reasoning_falls_through() {
    let direct = ScriptedProvider::answering("direct", "Initech", 0.6);
    let search = ScriptedProvider::answering("web_search", "Initech", 0.9);
    let pipeline = pipeline_with(Arc::new(InMemoryKnowledgeStore::new()), &[search.clone()])
        .with_direct_reasoner(direct.clone(), fast_policy());

    let result = pipeline.resolve(&ResearchRequest::new("Widgetco")).await;

    assert_eq!(result.result_type, ResultType::Provider("web_search".into()));
    assert_eq!(
        result.trace.stage("direct_reasoning").unwrap().status,
        StageStatus::Partial
    );
    assert_eq!(search.calls(), 1);
}

#[tokio::test]
async fn self_referential_answer_is_penalized() {
    let provider = ScriptedProvider::new(
        "web_search",
        Script::Answer {
            owner: "Widgetco",
            confidence: 0.9,
            sources: vec!["https://www.sec.gov/widgetco"],
        },
    );
    let baseline = ScriptedProvider::answering("web_search", "Initech", 0.9);

    let penalized = pipeline_with(Arc::new(InMemoryKnowledgeStore::new()), &[provider])
        .resolve(&ResearchRequest::new("Widgetco"))
        .await;
    let normal = pipeline_with(Arc::new(InMemoryKnowledgeStore::new()), &[baseline])
        .resolve(&ResearchRequest::new("Widgetco"))
        .await;

    assert!(penalized.confidence_score < normal.confidence_score);
    assert!(penalized
        .warnings
        .iter()
        .any(|w| w.contains("its own beneficiary")));
    assert!(penalized
        .ownership_flow
        .iter()
        .all(|e| e.role == OwnershipRole::Brand || e.name != "Widgetco"));
}

#[tokio::test]
async fn warning_limit_withholds_beneficiary() {
    let provider = ScriptedProvider::new(
        "web_search",
        Script::Answer {
            owner: "Widgetco",
            confidence: 0.9,
            sources: vec!["https://www.sec.gov/widgetco"],
        },
    );
    let pipeline = pipeline_with(Arc::new(InMemoryKnowledgeStore::new()), &[provider])
        .with_config(PipelineConfig::default().with_max_warnings(2));

    let result = pipeline.resolve(&ResearchRequest::new("Widgetco")).await;

    assert!(result.warnings.len() >= 2);
    assert_eq!(result.financial_beneficiary, "Unknown");
    assert_eq!(result.verification_status, VerificationStatus::Unverified);
}

#[tokio::test]
async fn provider_panic_becomes_error_result() {
    let provider = ScriptedProvider::new("reasoning", Script::Panic);
    let pipeline = pipeline_with(Arc::new(InMemoryKnowledgeStore::new()), &[provider]);

    let result = pipeline.resolve(&ResearchRequest::new("Zorblex")).await;

    assert_eq!(result.result_type, ResultType::Error);
    assert_eq!(result.confidence_score, 20);
    assert!(result.reasoning.contains("provider blew up"));
    assert_eq!(result.trace.error_count(), 1);
}

#[tokio::test]
async fn multi_level_chain_keeps_every_parent() {
    let provider = ScriptedProvider::new(
        "web_search",
        Script::Chain {
            owner: "Globex Corp",
            entities: vec![
                ("Widgetco", OwnershipRole::Brand),
                ("Widgetco Holdings", OwnershipRole::Parent),
                ("Globex Europe", OwnershipRole::Parent),
                ("Globex Corp", OwnershipRole::UltimateOwner),
            ],
            sources: vec!["https://www.sec.gov/globex-10k", "https://www.reuters.com/globex"],
        },
    );
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let pipeline = pipeline_with(store.clone(), &[provider]);

    let request = ResearchRequest::new("Widgetco");
    let result = pipeline.resolve(&request).await;

    let flow: Vec<&str> = result.ownership_flow.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        flow,
        vec!["Widgetco", "Widgetco Holdings", "Globex Europe", "Globex Corp"]
    );
    assert!(result.warnings.is_empty());
    assert!(result.conflict_notes.is_empty());
    assert_eq!(result.financial_beneficiary, "Globex Corp");

    let cached = store.lookup(&request.cache_key()).await.unwrap().unwrap();
    assert_eq!(cached.ownership_flow.len(), 4);
}

#[tokio::test]
async fn withheld_answer_is_not_written_back() {
    // Self-owned chain entry, self-referential owner and no sources
    let provider = ScriptedProvider::new(
        "web_search",
        Script::Chain {
            owner: "Widgetco",
            entities: vec![
                ("Widgetco", OwnershipRole::Brand),
                ("Widgetco", OwnershipRole::UltimateOwner),
            ],
            sources: Vec::new(),
        },
    );
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let pipeline = pipeline_with(store.clone(), &[provider.clone()]);

    let request = ResearchRequest::new("Widgetco");
    let result = pipeline.resolve(&request).await;

    assert_eq!(result.warnings.len(), 3);
    assert_eq!(result.financial_beneficiary, "Unknown");
    assert!(result.confidence_score <= 20);
    assert_eq!(result.verification_status, VerificationStatus::Unverified);

    assert!(store.lookup(&request.cache_key()).await.unwrap().is_none());
    assert!(store
        .search_similar("Widgetco", None, 3)
        .await
        .unwrap()
        .is_empty());

    pipeline.resolve(&request).await;
    assert_eq!(provider.calls(), 2);
}
