//! Ordered research providers, first acceptable answer wins

use std::sync::Arc;

use beneficiary_core::{ProviderResult, ResearchRequest};
use beneficiary_research::{ResearchContext, ResearchProvider};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::executor::{RetryPolicy, RetryTimeoutExecutor};

/// One provider wrapped with its own retry policy
pub struct ChainEntry {
    pub provider: Arc<dyn ResearchProvider>,
    pub executor: RetryTimeoutExecutor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    Exhausted,
}

/// What happened when one provider was tried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
    /// Executor attempts, retries included
    pub calls: u32,
    pub elapsed_ms: u64,
    /// Owner the provider named, if it produced findings
    pub beneficiary: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChainRun {
    pub result: ProviderResult,
    pub attempts: Vec<ProviderAttempt>,
}

impl ChainRun {
    pub fn attempt_beneficiaries(&self) -> Vec<Option<String>> {
        self.attempts.iter().map(|a| a.beneficiary.clone()).collect()
    }

    pub fn total_calls(&self) -> u32 {
        self.attempts.iter().map(|a| a.calls).sum()
    }
}

#[derive(Default)]
pub struct ResearchProviderChain {
    entries: Vec<ChainEntry>,
}

impl ResearchProviderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider; earlier providers are tried first
    pub fn with_provider(mut self, provider: Arc<dyn ResearchProvider>, policy: RetryPolicy) -> Self {
        self.entries.push(ChainEntry {
            provider,
            executor: RetryTimeoutExecutor::new(policy),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    /// Try providers in order and stop at the first accepted result
    #[instrument(skip_all, fields(brand = %request.brand, providers = self.entries.len()))]
    pub async fn run(&self, request: &ResearchRequest, context: &ResearchContext) -> ChainRun {
        let mut attempts = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let name = entry.provider.name().to_string();
            let provider = Arc::clone(&entry.provider);
            let report = entry
                .executor
                .execute_with_report(|| {
                    let provider = Arc::clone(&provider);
                    async move { provider.research(request, context).await }
                })
                .await;

            let calls = report.attempts;
            let elapsed_ms = report.elapsed.as_millis() as u64;

            let Some(result) = report.value else {
                let reason = report
                    .last_error
                    .map(|e| format!("exhausted after {} attempt(s): {}", calls, e))
                    .unwrap_or_else(|| "exhausted".to_string());
                warn!(provider = %name, "{}", reason);
                attempts.push(ProviderAttempt {
                    provider: name,
                    outcome: AttemptOutcome::Exhausted,
                    calls,
                    elapsed_ms,
                    beneficiary: None,
                    reason: Some(reason),
                });
                continue;
            };

            let beneficiary = result.findings().map(|f| f.financial_beneficiary.clone());
            if result.is_accepted() {
                info!(provider = %name, calls, "Provider accepted");
                attempts.push(ProviderAttempt {
                    provider: name,
                    outcome: AttemptOutcome::Accepted,
                    calls,
                    elapsed_ms,
                    beneficiary,
                    reason: None,
                });
                return ChainRun { result, attempts };
            }

            let reason = result.rejection_reason();
            info!(provider = %name, reason = ?reason, "Provider rejected");
            attempts.push(ProviderAttempt {
                provider: name,
                outcome: AttemptOutcome::Rejected,
                calls,
                elapsed_ms,
                beneficiary,
                reason,
            });
        }

        ChainRun {
            result: ProviderResult::miss("all providers exhausted"),
            attempts,
        }
    }
}
