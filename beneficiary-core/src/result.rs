//! Terminal output of a resolution run

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::confidence::{BreakdownEntry, ConfidenceLevel};
use crate::ownership::{OwnershipEntity, SourceRecord};
use crate::provider::{is_unknown_beneficiary, UNKNOWN_BENEFICIARY};
use crate::request::ResearchRequest;
use crate::trace::ExecutionTrace;

/// Which resolver produced a result
///
/// Serializes as a plain string; provider names pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Cache,
    StaticMapping,
    KnowledgeBase,
    DirectReasoning,
    Error,
    #[serde(untagged)]
    Provider(String),
}

impl ResultType {
    pub fn as_str(&self) -> &str {
        match self {
            ResultType::Cache => "cache",
            ResultType::StaticMapping => "static_mapping",
            ResultType::KnowledgeBase => "knowledge_base",
            ResultType::DirectReasoning => "direct_reasoning",
            ResultType::Error => "error",
            ResultType::Provider(name) => name,
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How well the answer is corroborated by trusted sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    HighlyLikely,
    Unverified,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        VerificationStatus::Unverified
    }
}

/// The pipeline's answer. Never mutated once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub financial_beneficiary: String,
    pub beneficiary_country: String,
    pub ownership_structure_type: String,
    /// 0 - 100
    pub confidence_score: u8,
    pub confidence_level: ConfidenceLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confidence_breakdown: Vec<BreakdownEntry>,
    pub ownership_flow: Vec<OwnershipEntity>,
    pub sources: Vec<SourceRecord>,
    pub verification_status: VerificationStatus,
    pub result_type: ResultType,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub conflict_notes: Vec<String>,
    #[serde(default)]
    pub trace: ExecutionTrace,
}

impl ResolutionResult {
    /// An "Unknown" answer with every field populated with defaults
    pub fn unknown(request: &ResearchRequest, confidence_score: u8, result_type: ResultType) -> Self {
        let confidence_score = confidence_score.min(100);
        Self {
            brand: request.brand.clone(),
            product_name: request.product_name.clone(),
            financial_beneficiary: UNKNOWN_BENEFICIARY.to_string(),
            beneficiary_country: UNKNOWN_BENEFICIARY.to_string(),
            ownership_structure_type: UNKNOWN_BENEFICIARY.to_string(),
            confidence_score,
            confidence_level: ConfidenceLevel::from_score(confidence_score),
            confidence_breakdown: Vec::new(),
            ownership_flow: Vec::new(),
            sources: Vec::new(),
            verification_status: VerificationStatus::Unverified,
            result_type,
            reasoning: String::new(),
            warnings: Vec::new(),
            conflict_notes: Vec::new(),
            trace: ExecutionTrace::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        is_unknown_beneficiary(&self.financial_beneficiary)
    }

    /// Set the score and keep the level in step with it
    pub fn set_confidence(&mut self, score: u8) {
        self.confidence_score = score.min(100);
        self.confidence_level = ConfidenceLevel::from_score(self.confidence_score);
    }

    /// Copy with trace timings zeroed, for comparing repeated runs
    pub fn without_timings(&self) -> Self {
        let mut copy = self.clone();
        copy.trace = self.trace.without_timings();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_type_serializes_as_plain_string() {
        assert_eq!(
            serde_json::to_string(&ResultType::StaticMapping).unwrap(),
            "\"static_mapping\""
        );
        assert_eq!(
            serde_json::to_string(&ResultType::Provider("web_search".into())).unwrap(),
            "\"web_search\""
        );
        let parsed: ResultType = serde_json::from_str("\"knowledge_base\"").unwrap();
        assert_eq!(parsed, ResultType::KnowledgeBase);
        let parsed: ResultType = serde_json::from_str("\"legacy_scrape\"").unwrap();
        assert_eq!(parsed, ResultType::Provider("legacy_scrape".into()));
    }

    #[test]
    fn test_unknown_result_is_well_formed() {
        let request = ResearchRequest::new("Zorblex");
        let result = ResolutionResult::unknown(&request, 20, ResultType::Error);
        assert!(result.is_unknown());
        assert_eq!(result.confidence_score, 20);
        assert_eq!(result.confidence_level, ConfidenceLevel::VeryLow);
        assert_eq!(result.verification_status, VerificationStatus::Unverified);
        assert_eq!(result.result_type.as_str(), "error");
    }

    #[test]
    fn test_result_json_round_trip() {
        let request = ResearchRequest::new("Acme").with_product("Anvil");
        let mut result = ResolutionResult::unknown(&request, 0, ResultType::Cache);
        result.set_confidence(91);
        let json = serde_json::to_string(&result).unwrap();
        let back: ResolutionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.confidence_level, ConfidenceLevel::VeryHigh);
    }
}
