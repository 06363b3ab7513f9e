//! Staged brand ownership resolution
//!
//! A run walks a fixed sequence of stages, cheapest first:
//!
//! 1. cache
//! 2. static mapping
//! 3. knowledge base
//! 4. direct reasoning
//! 5. research providers
//!
//! Each stage either produces a terminal answer or misses and hands over to
//! the next one. Answers that come from a provider go through conflict
//! resolution, source trust evaluation and confidence aggregation before
//! they are returned. If nothing answers, the result is an "Unknown" error
//! result. `resolve` never fails: panics are caught and reported the same way.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use beneficiary_core::{
    dedup_sources, is_unknown_beneficiary, normalize_name, ExecutionTrace, OwnershipEntity,
    OwnershipRole, ProviderFindings, ProviderResult, ResearchRequest, ResolutionResult,
    ResultType, SourceRecord, StageStatus, VerificationStatus, UNKNOWN_BENEFICIARY,
};
use beneficiary_research::{ResearchContext, ResearchProvider};
use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::confidence::ConfidenceAggregator;
use crate::conflict::ConflictResolver;
use crate::executor::{RetryPolicy, RetryTimeoutExecutor};
use crate::factors::{compute_factors, consistency_check, FactorInputs};
use crate::metrics::{MetricsSink, NoopMetricsSink, PipelineMetrics};
use crate::provider_chain::{ChainEntry, ProviderAttempt, ResearchProviderChain};
use crate::stores::{
    KnowledgeEntry, KnowledgeMatch, KnowledgeStore, StaticMapping, StaticMappingStore,
};
use crate::trust::{ConsistencyCheck, SourceDomainRegistry, SourceTrustEvaluator};

pub const STAGE_CACHE: &str = "cache";
pub const STAGE_STATIC_MAPPING: &str = "static_mapping";
pub const STAGE_KNOWLEDGE_BASE: &str = "knowledge_base";
pub const STAGE_DIRECT_REASONING: &str = "direct_reasoning";
pub const STAGE_PROVIDERS: &str = "providers";
pub const STAGE_VALIDATION: &str = "validation";
pub const STAGE_CONFIDENCE: &str = "confidence";
pub const STAGE_PIPELINE: &str = "pipeline";

/// What a stage produced
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// The run ends with this answer
    Terminal(T),
    Miss,
}

pub struct ResolutionPipeline {
    knowledge: Arc<dyn KnowledgeStore>,
    static_mappings: Arc<dyn StaticMappingStore>,
    trust: SourceTrustEvaluator<Arc<dyn SourceDomainRegistry>>,
    direct: Option<ChainEntry>,
    chain: ResearchProviderChain,
    aggregator: ConfidenceAggregator,
    metrics: Arc<dyn MetricsSink>,
    config: PipelineConfig,
}

impl ResolutionPipeline {
    pub fn new(
        knowledge: Arc<dyn KnowledgeStore>,
        static_mappings: Arc<dyn StaticMappingStore>,
        registry: Arc<dyn SourceDomainRegistry>,
        chain: ResearchProviderChain,
    ) -> Self {
        Self {
            knowledge,
            static_mappings,
            trust: SourceTrustEvaluator::new(registry),
            direct: None,
            chain,
            aggregator: ConfidenceAggregator::new(),
            metrics: Arc::new(NoopMetricsSink),
            config: PipelineConfig::default(),
        }
    }

    /// Provider asked once before the research chain, without outside sources
    pub fn with_direct_reasoner(
        mut self,
        provider: Arc<dyn ResearchProvider>,
        policy: RetryPolicy,
    ) -> Self {
        self.direct = Some(ChainEntry {
            provider,
            executor: RetryTimeoutExecutor::new(policy),
        });
        self
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Names of the research providers, in the order they are tried
    pub fn provider_names(&self) -> Vec<String> {
        self.chain.provider_names()
    }

    pub fn has_direct_reasoner(&self) -> bool {
        self.direct.is_some()
    }

    #[instrument(skip(self, request), fields(brand = %request.brand))]
    pub async fn resolve(&self, request: &ResearchRequest) -> ResolutionResult {
        let started = Instant::now();
        let mut metrics = PipelineMetrics::new(request.brand.clone());

        let outcome = AssertUnwindSafe(self.run(request, &mut metrics))
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Resolution panicked: {}", message);
                let mut trace = ExecutionTrace::new();
                let mut stage = trace.start_stage(STAGE_PIPELINE);
                stage.reason(format!("panic: {}", message));
                trace.push(stage.finish(StageStatus::Error));
                self.fallback_result(request, trace, format!("Internal error: {}", message))
            }
        };

        metrics.result_type = result.result_type.clone();
        metrics.confidence_score = result.confidence_score;
        metrics.record_trace(&result.trace);
        metrics.total_duration_ms = started.elapsed().as_millis() as u64;
        self.metrics.record(&metrics);

        info!(
            result_type = %result.result_type,
            beneficiary = %result.financial_beneficiary,
            confidence = result.confidence_score,
            "Resolved"
        );
        result
    }

    async fn run(&self, request: &ResearchRequest, metrics: &mut PipelineMetrics) -> ResolutionResult {
        let key = request.cache_key();
        let mut trace = ExecutionTrace::new();

        if let StageOutcome::Terminal(mut cached) = self.cache_stage(request, &key, &mut trace).await {
            metrics.cache_hit = true;
            cached.trace = trace;
            return cached;
        }

        if let StageOutcome::Terminal(mut result) = self.static_mapping_stage(request, &mut trace).await {
            result.trace = trace;
            self.write_back(&key, &result).await;
            return result;
        }

        let (outcome, related_knowledge) = self.knowledge_stage(request, &mut trace).await;
        if let StageOutcome::Terminal(mut result) = outcome {
            result.trace = trace;
            self.write_back(&key, &result).await;
            return result;
        }

        let context = ResearchContext { related_knowledge };
        let mut attempt_beneficiaries = Vec::new();

        let accepted = match self
            .direct_reasoning_stage(request, &context, &mut trace, metrics, &mut attempt_beneficiaries)
            .await
        {
            StageOutcome::Terminal(findings) => Some((findings, ResultType::DirectReasoning)),
            StageOutcome::Miss => match self
                .providers_stage(request, &context, &mut trace, metrics, &mut attempt_beneficiaries)
                .await
            {
                StageOutcome::Terminal(findings) => {
                    let result_type = ResultType::Provider(findings.provider.clone());
                    Some((findings, result_type))
                }
                StageOutcome::Miss => None,
            },
        };

        let Some((findings, result_type)) = accepted else {
            warn!("No provider produced an ownership chain");
            return self.fallback_result(
                request,
                trace,
                "No provider produced an ownership chain".to_string(),
            );
        };

        let mut result = self.assess(request, findings, result_type, &attempt_beneficiaries, &mut trace);
        result.trace = trace;
        self.write_back(&key, &result).await;
        result
    }

    async fn cache_stage(
        &self,
        request: &ResearchRequest,
        key: &str,
        trace: &mut ExecutionTrace,
    ) -> StageOutcome<ResolutionResult> {
        let mut stage = trace.start_stage(STAGE_CACHE);
        stage.reason(format!("key {}", key));

        if request.has_follow_up() {
            stage.decide("bypassed: follow-up context requires fresh research");
            trace.push(stage.finish(StageStatus::Partial));
            return StageOutcome::Miss;
        }

        match self.knowledge.lookup(key).await {
            Ok(Some(mut cached)) => {
                debug!(key, "Cache hit");
                cached.result_type = ResultType::Cache;
                stage.decide("hit");
                trace.push(stage.finish(StageStatus::Success));
                StageOutcome::Terminal(cached)
            }
            Ok(None) => {
                stage.decide("miss");
                trace.push(stage.finish(StageStatus::Partial));
                StageOutcome::Miss
            }
            Err(e) => {
                warn!(key, "Cache lookup failed: {}", e);
                stage.reason(format!("lookup failed: {}", e));
                trace.push(stage.finish(StageStatus::Error));
                StageOutcome::Miss
            }
        }
    }

    async fn static_mapping_stage(
        &self,
        request: &ResearchRequest,
        trace: &mut ExecutionTrace,
    ) -> StageOutcome<ResolutionResult> {
        let mut stage = trace.start_stage(STAGE_STATIC_MAPPING);

        match self.static_mappings.lookup(&request.brand).await {
            Ok(Some(mapping)) => {
                stage.reason(format!("mapped to {}", mapping.financial_beneficiary));
                stage.decide("hit");
                trace.push(stage.finish(StageStatus::Success));
                StageOutcome::Terminal(self.result_from_static(request, mapping))
            }
            Ok(None) => {
                stage.decide("miss");
                trace.push(stage.finish(StageStatus::Partial));
                StageOutcome::Miss
            }
            Err(e) => {
                warn!("Static mapping lookup failed: {}", e);
                stage.reason(format!("lookup failed: {}", e));
                trace.push(stage.finish(StageStatus::Error));
                StageOutcome::Miss
            }
        }
    }

    /// Also returns summaries of near matches for the research stages
    async fn knowledge_stage(
        &self,
        request: &ResearchRequest,
        trace: &mut ExecutionTrace,
    ) -> (StageOutcome<ResolutionResult>, Vec<String>) {
        let mut stage = trace.start_stage(STAGE_KNOWLEDGE_BASE);

        let matches = match self
            .knowledge
            .search_similar(
                &request.brand,
                request.product_name.as_deref(),
                self.config.related_knowledge_limit.max(1),
            )
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Knowledge search failed: {}", e);
                stage.reason(format!("search failed: {}", e));
                trace.push(stage.finish(StageStatus::Error));
                return (StageOutcome::Miss, Vec::new());
            }
        };

        let Some(best) = matches.first() else {
            stage.decide("no similar entries");
            trace.push(stage.finish(StageStatus::Partial));
            return (StageOutcome::Miss, Vec::new());
        };

        stage.reason(format!(
            "best match {} ({:.2} similarity, confidence {})",
            best.entry.brand, best.similarity, best.entry.confidence_score
        ));

        let confident = best.similarity > self.config.kb_min_similarity
            && best.entry.confidence_score > self.config.kb_min_confidence;
        if confident && request.has_follow_up() {
            stage.decide("confident match not served: follow-up context requires fresh research");
        } else if confident {
            stage.decide("served from knowledge base");
            let result = self.result_from_knowledge(request, best);
            trace.push(stage.finish(StageStatus::Success));
            return (StageOutcome::Terminal(result), Vec::new());
        }

        stage.decide(format!("{} match(es) kept as research context", matches.len()));
        trace.push(stage.finish(StageStatus::Partial));
        let related = matches.iter().map(|m| m.entry.summary()).collect();
        (StageOutcome::Miss, related)
    }

    async fn direct_reasoning_stage(
        &self,
        request: &ResearchRequest,
        context: &ResearchContext,
        trace: &mut ExecutionTrace,
        metrics: &mut PipelineMetrics,
        attempt_beneficiaries: &mut Vec<Option<String>>,
    ) -> StageOutcome<ProviderFindings> {
        let Some(direct) = &self.direct else {
            return StageOutcome::Miss;
        };
        let mut stage = trace.start_stage(STAGE_DIRECT_REASONING);

        let provider = Arc::clone(&direct.provider);
        let report = direct
            .executor
            .execute_with_report(|| {
                let provider = Arc::clone(&provider);
                async move { provider.research(request, context).await }
            })
            .await;
        metrics.provider_calls += report.attempts;
        metrics.providers_tried.push(direct.provider.name().to_string());

        let findings = match report.value {
            Some(ProviderResult::Success(findings)) => findings,
            Some(other) => {
                stage.reason(other.rejection_reason().unwrap_or_default());
                trace.push(stage.finish(StageStatus::Partial));
                return StageOutcome::Miss;
            }
            None => {
                let error = report
                    .last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no answer".to_string());
                stage.reason(format!("gave up after {} attempt(s): {}", report.attempts, error));
                trace.push(stage.finish(StageStatus::Error));
                return StageOutcome::Miss;
            }
        };

        attempt_beneficiaries.push(Some(findings.financial_beneficiary.clone()));
        let score = findings.confidence_score();
        stage.reason(format!("{} with confidence {}", findings.financial_beneficiary, score));

        if score > self.config.direct_reasoning_threshold && !findings.is_unknown() {
            stage.decide("accepted");
            trace.push(stage.finish(StageStatus::Success));
            StageOutcome::Terminal(findings)
        } else {
            stage.decide(format!(
                "not above {}, continuing with research providers",
                self.config.direct_reasoning_threshold
            ));
            trace.push(stage.finish(StageStatus::Partial));
            StageOutcome::Miss
        }
    }

    async fn providers_stage(
        &self,
        request: &ResearchRequest,
        context: &ResearchContext,
        trace: &mut ExecutionTrace,
        metrics: &mut PipelineMetrics,
        attempt_beneficiaries: &mut Vec<Option<String>>,
    ) -> StageOutcome<ProviderFindings> {
        let mut stage = trace.start_stage(STAGE_PROVIDERS);
        if self.chain.is_empty() {
            stage.reason("no research providers configured");
            trace.push(stage.finish(StageStatus::Error));
            return StageOutcome::Miss;
        }

        let run = self.chain.run(request, context).await;
        metrics.record_attempts(&run.attempts);
        attempt_beneficiaries.extend(run.attempt_beneficiaries());
        for attempt in &run.attempts {
            stage.reason(describe_attempt(attempt));
        }

        match run.result {
            ProviderResult::Success(findings) if !findings.ownership_chain.is_empty() => {
                stage.decide(format!("accepted {}", findings.provider));
                trace.push(stage.finish(StageStatus::Success));
                StageOutcome::Terminal(findings)
            }
            other => {
                stage.decide(
                    other
                        .rejection_reason()
                        .unwrap_or_else(|| "no provider accepted".to_string()),
                );
                trace.push(stage.finish(StageStatus::Error));
                StageOutcome::Miss
            }
        }
    }

    /// Validate, merge and score provider findings
    fn assess(
        &self,
        request: &ResearchRequest,
        mut findings: ProviderFindings,
        result_type: ResultType,
        attempt_beneficiaries: &[Option<String>],
        trace: &mut ExecutionTrace,
    ) -> ResolutionResult {
        let mut stage = trace.start_stage(STAGE_VALIDATION);
        let brand = request.normalized_brand();
        let mut warnings = Vec::new();

        findings.ownership_chain.retain(|entity| {
            let self_owned = entity.role != OwnershipRole::Brand && entity.normalized_name() == brand;
            if self_owned {
                warnings.push(format!(
                    "Dropped {} as {}: a brand cannot be its own owner",
                    entity.name, entity.role
                ));
            }
            !self_owned
        });

        let self_referential = normalize_name(&findings.financial_beneficiary) == brand;
        if self_referential {
            warnings.push(format!(
                "{} is reported as its own beneficiary",
                findings.financial_beneficiary
            ));
        }

        let mut resolution = ConflictResolver::new(self.config.tie_ratio).resolve(&findings.ownership_chain);
        if resolution.entities.is_empty() {
            stage.decide("chain empty after validation, rebuilt from beneficiary");
            resolution.entities = default_chain(
                &request.brand,
                &findings.financial_beneficiary,
                &findings.beneficiary_country,
            );
        }
        for conflict in resolution.conflicts.iter().filter(|c| c.ambiguous) {
            warnings.push(format!(
                "Ambiguous {}: {} and {} are nearly equally supported",
                conflict.role, conflict.winner, conflict.runner_up
            ));
        }

        let mut sources = dedup_sources(
            findings
                .sources
                .iter()
                .cloned()
                .chain(resolution.sources.iter().cloned()),
        );
        self.trust.classify_sources(&mut sources);
        if sources.is_empty() {
            warnings.push("No sources support this answer".to_string());
        }

        let consistency = consistency_check(&findings, &resolution, attempt_beneficiaries);
        let accepted = normalize_name(&findings.financial_beneficiary);
        let confirmations = attempt_beneficiaries
            .iter()
            .flatten()
            .filter(|b| normalize_name(b) == accepted)
            .count();
        let urls: Vec<String> = sources.iter().map(|s| s.url.clone()).collect();
        let verification = self.trust.evaluate(&urls, consistency, confirmations >= 2);

        stage.reason(format!(
            "{} entities, {} sources, consistency {:.2}, {} confirmation(s)",
            resolution.entities.len(),
            sources.len(),
            consistency.score,
            confirmations
        ));
        for warning in &warnings {
            stage.reason(warning.clone());
        }
        let status = if warnings.is_empty() {
            StageStatus::Success
        } else {
            StageStatus::Partial
        };
        trace.push(stage.finish(status));

        let mut stage = trace.start_stage(STAGE_CONFIDENCE);
        let factors = compute_factors(&FactorInputs {
            findings: &findings,
            resolution: &resolution,
            attempt_beneficiaries,
            source_quality: self.trust.source_quality_score(&sources),
            consistency,
            trace: &*trace,
        });
        let assessment = self.aggregator.aggregate(&factors);
        stage.reason(format!("aggregated {} ({})", assessment.score, assessment.level));

        let mut score = assessment.score;
        if self_referential {
            score /= 2;
            stage.decide(format!("halved to {} for self-referential beneficiary", score));
        }

        let mut result = ResolutionResult::unknown(request, score, result_type);
        result.financial_beneficiary = findings.financial_beneficiary;
        result.beneficiary_country = findings.beneficiary_country;
        result.ownership_structure_type = findings.ownership_structure_type;
        result.confidence_breakdown = assessment.breakdown;
        result.conflict_notes = resolution.notes();
        result.ownership_flow = resolution.entities;
        result.sources = sources;
        result.verification_status = verification;
        result.reasoning = findings.reasoning;

        if warnings.len() >= self.config.max_warnings {
            let withheld = result.confidence_score.min(self.config.fallback_confidence);
            stage.decide(format!(
                "{} warnings, beneficiary withheld at {}",
                warnings.len(),
                withheld
            ));
            result.set_confidence(withheld);
            result.financial_beneficiary = UNKNOWN_BENEFICIARY.to_string();
            result.beneficiary_country = UNKNOWN_BENEFICIARY.to_string();
            result.verification_status = VerificationStatus::Unverified;
        }
        result.warnings = warnings;
        trace.push(stage.finish(StageStatus::Success));
        result
    }

    fn result_from_static(&self, request: &ResearchRequest, mapping: StaticMapping) -> ResolutionResult {
        let mut sources = dedup_sources(
            mapping
                .sources
                .iter()
                .map(|url| SourceRecord::new(url.as_str(), 1.0)),
        );
        self.trust.classify_sources(&mut sources);

        let mut result = ResolutionResult::unknown(
            request,
            self.config.static_mapping_confidence,
            ResultType::StaticMapping,
        );
        result.ownership_flow = if mapping.ownership_flow.is_empty() {
            default_chain(
                &request.brand,
                &mapping.financial_beneficiary,
                &mapping.beneficiary_country,
            )
        } else {
            mapping.ownership_flow
        };
        result.reasoning = format!(
            "{} is listed in the curated brand mappings as owned by {}",
            request.brand, mapping.financial_beneficiary
        );
        result.financial_beneficiary = mapping.financial_beneficiary;
        result.beneficiary_country = mapping.beneficiary_country;
        result.ownership_structure_type = mapping.ownership_structure_type;
        result.sources = sources;
        result.verification_status = VerificationStatus::Verified;
        result
    }

    fn result_from_knowledge(&self, request: &ResearchRequest, best: &KnowledgeMatch) -> ResolutionResult {
        let entry = &best.entry;
        let mut sources = entry.sources.clone();
        self.trust.classify_sources(&mut sources);
        let urls: Vec<String> = sources.iter().map(|s| s.url.clone()).collect();

        let mut result = ResolutionResult::unknown(
            request,
            entry.confidence_score,
            ResultType::KnowledgeBase,
        );
        result.financial_beneficiary = entry.financial_beneficiary.clone();
        result.beneficiary_country = entry.beneficiary_country.clone();
        result.ownership_structure_type = entry.ownership_structure_type.clone();
        result.ownership_flow = if entry.ownership_flow.is_empty() {
            default_chain(
                &request.brand,
                &entry.financial_beneficiary,
                &entry.beneficiary_country,
            )
        } else {
            entry.ownership_flow.clone()
        };
        result.verification_status =
            self.trust
                .evaluate(&urls, ConsistencyCheck::new(1.0, 0), false);
        result.sources = sources;
        result.reasoning = format!(
            "Matched stored resolution for {} ({:.2} similarity, recorded {})",
            entry.brand,
            best.similarity,
            entry.updated_at.format("%Y-%m-%d")
        );
        result
    }

    fn fallback_result(
        &self,
        request: &ResearchRequest,
        trace: ExecutionTrace,
        reasoning: String,
    ) -> ResolutionResult {
        let mut result = ResolutionResult::unknown(
            request,
            self.config.fallback_confidence,
            ResultType::Error,
        );
        result.reasoning = reasoning;
        result.trace = trace;
        result
    }

    /// Only named owners are stored. Failures are logged and otherwise ignored
    async fn write_back(&self, key: &str, result: &ResolutionResult) {
        if matches!(result.result_type, ResultType::Error | ResultType::Cache) || result.is_unknown() {
            debug!(key, "Nothing to write back");
            return;
        }

        if result.confidence_score >= self.config.cache_write_floor {
            match self.knowledge.upsert(key, result).await {
                Ok(()) => debug!(key, "Result cached"),
                Err(e) => warn!(key, "Failed to cache result: {}", e),
            }
        }

        if result.confidence_score >= self.config.knowledge_write_floor {
            if let Err(e) = self
                .knowledge
                .upsert_knowledge(KnowledgeEntry::from_result(result))
                .await
            {
                warn!(key, "Failed to update knowledge base: {}", e);
            }
        }
    }
}

/// Brand -> owner chain for answers that came without one
fn default_chain(brand: &str, owner: &str, country: &str) -> Vec<OwnershipEntity> {
    let mut chain = vec![OwnershipEntity::new(brand, OwnershipRole::Brand)];
    let owner_is_brand = normalize_name(owner) == normalize_name(brand);
    if !owner_is_brand && !is_unknown_beneficiary(owner) {
        let mut entity = OwnershipEntity::new(owner, OwnershipRole::UltimateOwner);
        if !is_unknown_beneficiary(country) {
            entity = entity.with_country(country);
        }
        chain.push(entity);
    }
    chain
}

fn describe_attempt(attempt: &ProviderAttempt) -> String {
    let mut line = format!(
        "{}: {:?} after {} call(s) in {}ms",
        attempt.provider, attempt.outcome, attempt.calls, attempt.elapsed_ms
    );
    if let Some(reason) = &attempt.reason {
        line.push_str(&format!(" ({})", reason));
    }
    line
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
