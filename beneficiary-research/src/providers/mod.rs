//! Research providers
//!
//! Each provider turns a [`ResearchRequest`] into a normalized
//! [`ProviderResult`]. Providers return `Err` only for upstream failures the
//! caller may retry; anything they ran to completion comes back as `Ok`.

mod legacy_scrape;
mod reasoning;
mod web_search;

pub use legacy_scrape::LegacyScrapeProvider;
pub use reasoning::ReasoningProvider;
pub use web_search::{WebSearchConfig, WebSearchProvider};

use async_trait::async_trait;
use beneficiary_core::{
    dedup_sources, is_unknown_beneficiary, normalize_name, role_for_position, BeneficiaryError,
    OwnershipEntity, OwnershipRole, ProviderFindings, ProviderResult, ResearchRequest,
    SourceRecord,
};

use crate::parser::OwnershipRecord;

/// What the pipeline already knows when a provider runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchContext {
    /// One line per related knowledge-base match, best first
    pub related_knowledge: Vec<String>,
}

#[async_trait]
pub trait ResearchProvider: Send + Sync {
    /// Stable identifier, also used as the result type of accepted answers
    fn name(&self) -> &str;

    async fn research(
        &self,
        request: &ResearchRequest,
        context: &ResearchContext,
    ) -> Result<ProviderResult, BeneficiaryError>;
}

/// Normalize a parsed record into a provider result
///
/// Unparseable or "Unknown" answers become a miss. When the model named an
/// owner but gave no flow, a brand -> owner chain is synthesized.
pub fn findings_from_record(
    provider: &str,
    request: &ResearchRequest,
    record: OwnershipRecord,
) -> ProviderResult {
    if let Some(error) = record.parse_error.as_deref() {
        return ProviderResult::miss(format!("unparseable response ({})", error));
    }
    if is_unknown_beneficiary(&record.financial_beneficiary) {
        return ProviderResult::miss("owner could not be determined");
    }

    let confidence = f64::from(record.confidence_score) / 100.0;
    let country = known(&record.beneficiary_country);

    let mut chain: Vec<OwnershipEntity> = {
        let len = record.ownership_flow.len();
        record
            .ownership_flow
            .iter()
            .enumerate()
            .filter(|(_, entry)| !is_unknown_beneficiary(&entry.name))
            .map(|(i, entry)| {
                let mut entity = OwnershipEntity::new(
                    entry.name.trim(),
                    entry.role.unwrap_or_else(|| role_for_position(i, len)),
                );
                entity.country = entry.country.as_deref().and_then(known);
                entity.sources = entry
                    .sources
                    .iter()
                    .map(|url| SourceRecord::new(url.as_str(), confidence))
                    .collect();
                entity
            })
            .collect()
    };

    if chain.is_empty() {
        if normalize_name(&record.financial_beneficiary) != request.normalized_brand() {
            chain.push(OwnershipEntity::new(request.brand.trim(), OwnershipRole::Brand));
        }
        let mut owner =
            OwnershipEntity::new(record.financial_beneficiary.trim(), OwnershipRole::UltimateOwner);
        owner.country = country.clone();
        chain.push(owner);
    }

    let top_level = record
        .sources
        .iter()
        .map(|url| SourceRecord::new(url.as_str(), confidence));
    let per_entity = chain.iter().flat_map(|e| e.sources.iter().cloned());
    let sources = dedup_sources(top_level.chain(per_entity).collect::<Vec<_>>());

    let mut findings = ProviderFindings::new(provider, record.financial_beneficiary.trim());
    findings.beneficiary_country = country.unwrap_or_else(|| record.beneficiary_country.clone());
    findings.ownership_structure_type = record.ownership_structure_type;
    findings.ownership_chain = chain;
    findings.confidence = confidence;
    findings.reasoning = record.reasoning;
    findings.sources = sources;
    findings.current_ownership_verified = record.current_ownership_verified;
    findings
        .notes
        .push(format!("parsed via {:?} strategy", record.parse_strategy));

    ProviderResult::Success(findings)
}

fn known(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!is_unknown_beneficiary(trimmed)).then(|| trimmed.to_string())
}
