//! Confidence factor, level and breakdown definitions

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One independent evidence signal feeding the weighted confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFactor {
    SourceQuality,
    EvidenceStrength,
    AgentAgreement,
    ReasoningQuality,
    DataConsistency,
    ExecutionReliability,
    CurrentOwnershipValidation,
}

impl ConfidenceFactor {
    pub const ALL: [ConfidenceFactor; 7] = [
        ConfidenceFactor::SourceQuality,
        ConfidenceFactor::EvidenceStrength,
        ConfidenceFactor::AgentAgreement,
        ConfidenceFactor::ReasoningQuality,
        ConfidenceFactor::DataConsistency,
        ConfidenceFactor::ExecutionReliability,
        ConfidenceFactor::CurrentOwnershipValidation,
    ];

    /// Default weight of this factor; the seven defaults sum to 1.0
    pub fn default_weight(&self) -> f64 {
        match self {
            ConfidenceFactor::SourceQuality => 0.25,
            ConfidenceFactor::EvidenceStrength => 0.20,
            ConfidenceFactor::AgentAgreement => 0.15,
            ConfidenceFactor::ReasoningQuality => 0.10,
            ConfidenceFactor::DataConsistency => 0.15,
            ConfidenceFactor::ExecutionReliability => 0.10,
            ConfidenceFactor::CurrentOwnershipValidation => 0.05,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ConfidenceFactor::SourceQuality => "Source quality",
            ConfidenceFactor::EvidenceStrength => "Evidence strength",
            ConfidenceFactor::AgentAgreement => "Agent agreement",
            ConfidenceFactor::ReasoningQuality => "Reasoning quality",
            ConfidenceFactor::DataConsistency => "Data consistency",
            ConfidenceFactor::ExecutionReliability => "Execution reliability",
            ConfidenceFactor::CurrentOwnershipValidation => "Current ownership validation",
        }
    }
}

impl fmt::Display for ConfidenceFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Sub-scores (0-100) and their weights
///
/// A factor without a score is absent: its weight is ignored and the
/// remaining weights are renormalized when aggregating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub scores: BTreeMap<ConfidenceFactor, f64>,
    pub weights: BTreeMap<ConfidenceFactor, f64>,
}

impl Default for ConfidenceFactors {
    fn default() -> Self {
        Self {
            scores: BTreeMap::new(),
            weights: ConfidenceFactor::ALL
                .iter()
                .map(|f| (*f, f.default_weight()))
                .collect(),
        }
    }
}

impl ConfidenceFactors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a factor's score, clamped to 0-100
    pub fn with_score(mut self, factor: ConfidenceFactor, score: f64) -> Self {
        self.set(factor, score);
        self
    }

    pub fn with_weight(mut self, factor: ConfidenceFactor, weight: f64) -> Self {
        self.weights.insert(factor, weight.max(0.0));
        self
    }

    pub fn set(&mut self, factor: ConfidenceFactor, score: f64) {
        let score = if score.is_finite() { score.clamp(0.0, 100.0) } else { 0.0 };
        self.scores.insert(factor, score);
    }

    pub fn score(&self, factor: ConfidenceFactor) -> Option<f64> {
        self.scores.get(&factor).copied()
    }

    pub fn weight(&self, factor: ConfidenceFactor) -> f64 {
        self.weights.get(&factor).copied().unwrap_or(0.0)
    }
}

/// Coarse confidence bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "Very High")]
    VeryHigh,
    High,
    Medium,
    Low,
    #[serde(rename = "Very Low")]
    VeryLow,
}

impl ConfidenceLevel {
    /// Bucket a 0-100 score: >=85 Very High, >=70 High, >=50 Medium, >=30 Low
    pub fn from_score(score: u8) -> Self {
        match score {
            85..=u8::MAX => ConfidenceLevel::VeryHigh,
            70..=84 => ConfidenceLevel::High,
            50..=69 => ConfidenceLevel::Medium,
            30..=49 => ConfidenceLevel::Low,
            _ => ConfidenceLevel::VeryLow,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "Very High",
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::VeryLow => "Very Low",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One line of the explainable breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub factor: ConfidenceFactor,
    /// Raw factor score (0-100)
    pub score: f64,
    /// Normalized weight as a percentage
    pub weight_pct: f64,
    /// score x normalized weight
    pub contribution: f64,
}

/// Aggregated confidence with its explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub score: u8,
    pub level: ConfidenceLevel,
    pub breakdown: Vec<BreakdownEntry>,
}

impl ConfidenceAssessment {
    /// Sum of all contributions; equals `score` within one rounding unit
    pub fn contribution_total(&self) -> f64 {
        self.breakdown.iter().map(|e| e.contribution).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let total: f64 = ConfidenceFactor::ALL.iter().map(|f| f.default_weight()).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_level_buckets() {
        assert_eq!(ConfidenceLevel::from_score(100), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_score(85), ConfidenceLevel::VeryHigh);
        assert_eq!(ConfidenceLevel::from_score(84), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(70), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(50), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(30), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(29), ConfidenceLevel::VeryLow);
    }

    #[test]
    fn test_scores_are_clamped() {
        let factors = ConfidenceFactors::new()
            .with_score(ConfidenceFactor::SourceQuality, 140.0)
            .with_score(ConfidenceFactor::AgentAgreement, -3.0)
            .with_score(ConfidenceFactor::ReasoningQuality, f64::NAN);
        assert_eq!(factors.score(ConfidenceFactor::SourceQuality), Some(100.0));
        assert_eq!(factors.score(ConfidenceFactor::AgentAgreement), Some(0.0));
        assert_eq!(factors.score(ConfidenceFactor::ReasoningQuality), Some(0.0));
    }

    #[test]
    fn test_level_serializes_with_spaces() {
        assert_eq!(
            serde_json::to_string(&ConfidenceLevel::VeryHigh).unwrap(),
            "\"Very High\""
        );
    }
}
