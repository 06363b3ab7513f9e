//! Source trust tiers and verification status

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use beneficiary_core::{domain_of, BeneficiaryError, SourceRecord, SourceTier, VerificationStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Maps a domain to its authority tier
pub trait SourceDomainRegistry: Send + Sync {
    /// `None` means the domain is not known to be trustworthy
    fn classify(&self, domain: &str) -> Option<SourceTier>;
}

impl<R: SourceDomainRegistry + ?Sized> SourceDomainRegistry for Arc<R> {
    fn classify(&self, domain: &str) -> Option<SourceTier> {
        (**self).classify(domain)
    }
}

/// Domain registry backed by a fixed table
///
/// Lookups fall back through parent domains, so `news.example.com` inherits
/// the tier of `example.com`.
#[derive(Debug, Clone, Default)]
pub struct StaticDomainRegistry {
    tiers: HashMap<String, SourceTier>,
}

impl StaticDomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(mut self, domain: &str, tier: SourceTier) -> Self {
        self.insert(domain, tier);
        self
    }

    pub fn insert(&mut self, domain: &str, tier: SourceTier) {
        let key = domain.trim().trim_start_matches("www.").to_lowercase();
        self.tiers.insert(key, tier);
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Parse `{"domain": tier}` JSON where tier is 1-4
    pub fn from_json(json: &str) -> Result<Self, BeneficiaryError> {
        let raw: HashMap<String, u8> = serde_json::from_str(json)
            .map_err(|e| BeneficiaryError::config(format!("Invalid domain registry: {}", e)))?;

        let mut registry = Self::new();
        for (domain, rank) in raw {
            let tier = SourceTier::from_rank(rank).ok_or_else(|| {
                BeneficiaryError::config(format!("Invalid tier {} for domain {}", rank, domain))
            })?;
            registry.insert(&domain, tier);
        }
        Ok(registry)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BeneficiaryError> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            BeneficiaryError::config(format!(
                "Failed to read domain registry {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        let registry = Self::from_json(&json)?;
        info!("Loaded {} source domains", registry.len());
        Ok(registry)
    }

    /// A small built-in table of regulators and business press
    pub fn builtin() -> Self {
        use SourceTier::*;
        [
            ("sec.gov", Verified),
            ("companieshouse.gov.uk", Verified),
            ("find-and-update.company-information.service.gov.uk", Verified),
            ("opencorporates.com", HighlyTrusted),
            ("reuters.com", HighlyTrusted),
            ("bloomberg.com", HighlyTrusted),
            ("ft.com", HighlyTrusted),
            ("wsj.com", HighlyTrusted),
            ("forbes.com", Trusted),
            ("cnbc.com", Trusted),
            ("bbc.co.uk", Trusted),
            ("en.wikipedia.org", Trusted),
        ]
        .into_iter()
        .fold(Self::new(), |registry, (domain, tier)| {
            registry.with_domain(domain, tier)
        })
    }
}

impl SourceDomainRegistry for StaticDomainRegistry {
    fn classify(&self, domain: &str) -> Option<SourceTier> {
        let mut candidate = domain.trim().trim_start_matches("www.").to_lowercase();
        loop {
            if let Some(tier) = self.tiers.get(&candidate) {
                return Some(*tier);
            }
            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent.to_string(),
                _ => return None,
            }
        }
    }
}

/// How well the evidence agrees with itself
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsistencyCheck {
    /// 0.0 - 1.0
    pub score: f64,
    pub conflict_count: usize,
}

impl ConsistencyCheck {
    pub fn new(score: f64, conflict_count: usize) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            conflict_count,
        }
    }
}

pub const VERIFIED_MIN_CONSISTENCY: f64 = 0.8;
pub const SINGLE_SOURCE_MIN_CONSISTENCY: f64 = 0.9;

/// Applies the corroboration rules; holds no state beyond the registry
pub struct SourceTrustEvaluator<R: SourceDomainRegistry> {
    registry: R,
}

impl<R: SourceDomainRegistry> SourceTrustEvaluator<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Tier for a URL; unknown domains are unofficial
    pub fn tier_of(&self, url: &str) -> SourceTier {
        domain_of(url)
            .and_then(|domain| self.registry.classify(&domain))
            .unwrap_or(SourceTier::Unofficial)
    }

    pub fn evaluate(
        &self,
        sources: &[String],
        consistency: ConsistencyCheck,
        multiple_confirmations: bool,
    ) -> VerificationStatus {
        let tiers: Vec<SourceTier> = sources.iter().map(|url| self.tier_of(url)).collect();
        let verified = tiers.iter().filter(|t| **t == SourceTier::Verified).count();
        let trusted = tiers.iter().filter(|t| t.is_trusted()).count();

        let status = if verified >= 1
            && consistency.score >= VERIFIED_MIN_CONSISTENCY
            && multiple_confirmations
        {
            VerificationStatus::Verified
        } else if (multiple_confirmations && sources.len() >= 2)
            || (verified >= 1 && consistency.score >= SINGLE_SOURCE_MIN_CONSISTENCY)
            || trusted >= 2
        {
            VerificationStatus::HighlyLikely
        } else {
            VerificationStatus::Unverified
        };

        debug!(
            sources = sources.len(),
            verified,
            trusted,
            consistency = consistency.score,
            ?status,
            "Verification evaluated"
        );
        status
    }

    /// Assign each source its registry tier
    pub fn classify_sources(&self, sources: &mut [SourceRecord]) {
        for source in sources.iter_mut() {
            source.tier = self.tier_of(&source.url);
        }
    }

    /// Tier-weighted quality of a source set, 0-100
    pub fn source_quality_score(&self, sources: &[SourceRecord]) -> f64 {
        if sources.is_empty() {
            return 0.0;
        }
        let total: f64 = sources
            .iter()
            .map(|s| tier_weight(self.tier_of(&s.url)))
            .sum();
        // More independent sources earn a small bonus
        let breadth_bonus = ((sources.len() as f64 - 1.0) * 5.0).clamp(0.0, 15.0);
        (total / sources.len() as f64 + breadth_bonus).clamp(0.0, 100.0)
    }
}

fn tier_weight(tier: SourceTier) -> f64 {
    match tier {
        SourceTier::Verified => 100.0,
        SourceTier::HighlyTrusted => 85.0,
        SourceTier::Trusted => 65.0,
        SourceTier::Unofficial => 30.0,
    }
}
