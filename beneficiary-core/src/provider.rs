//! Normalized output of a research provider

use serde::{Deserialize, Serialize};

use crate::ownership::{OwnershipEntity, SourceRecord};
use crate::request::normalize_name;

/// Beneficiary placeholder used whenever no owner could be established
pub const UNKNOWN_BENEFICIARY: &str = "Unknown";

/// Everything a provider found, in normalized form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFindings {
    pub provider: String,
    pub financial_beneficiary: String,
    pub beneficiary_country: String,
    pub ownership_structure_type: String,
    pub ownership_chain: Vec<OwnershipEntity>,
    /// Provider's own confidence (0.0 - 1.0)
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
    #[serde(default)]
    pub notes: Vec<String>,
    /// Whether the provider checked the ownership is still current, if it said
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_ownership_verified: Option<bool>,
}

impl ProviderFindings {
    pub fn new(provider: impl Into<String>, financial_beneficiary: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            financial_beneficiary: financial_beneficiary.into(),
            beneficiary_country: UNKNOWN_BENEFICIARY.to_string(),
            ownership_structure_type: UNKNOWN_BENEFICIARY.to_string(),
            ownership_chain: Vec::new(),
            confidence: 0.0,
            reasoning: String::new(),
            sources: Vec::new(),
            notes: Vec::new(),
            current_ownership_verified: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        is_unknown_beneficiary(&self.financial_beneficiary)
    }

    /// Provider confidence on the 0-100 scale
    pub fn confidence_score(&self) -> u8 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Outcome of one provider invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProviderResult {
    Success(ProviderFindings),
    /// The provider ran but found nothing usable
    Miss { reason: String },
    /// The provider could not run to completion
    Failed { error: String },
}

impl ProviderResult {
    pub fn miss(reason: impl Into<String>) -> Self {
        ProviderResult::Miss {
            reason: reason.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        ProviderResult::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProviderResult::Success(_))
    }

    /// Success with a non-empty ownership chain
    pub fn is_accepted(&self) -> bool {
        matches!(self, ProviderResult::Success(f) if !f.ownership_chain.is_empty())
    }

    pub fn findings(&self) -> Option<&ProviderFindings> {
        match self {
            ProviderResult::Success(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_findings(self) -> Option<ProviderFindings> {
        match self {
            ProviderResult::Success(f) => Some(f),
            _ => None,
        }
    }

    /// Human-readable reason for a non-accepted result
    pub fn rejection_reason(&self) -> Option<String> {
        match self {
            ProviderResult::Success(f) if f.ownership_chain.is_empty() => {
                Some("succeeded with an empty ownership chain".to_string())
            }
            ProviderResult::Success(_) => None,
            ProviderResult::Miss { reason } => Some(format!("miss: {}", reason)),
            ProviderResult::Failed { error } => Some(format!("failed: {}", error)),
        }
    }
}

pub fn is_unknown_beneficiary(name: &str) -> bool {
    let normalized = normalize_name(name);
    normalized.is_empty()
        || matches!(
            normalized.as_str(),
            "unknown" | "n a" | "na" | "none" | "null" | "unclear" | "not found"
        )
}
