//! Weighted confidence aggregation

use beneficiary_core::{
    BreakdownEntry, ConfidenceAssessment, ConfidenceFactor, ConfidenceFactors, ConfidenceLevel,
};

/// Combines factor sub-scores into one explainable score
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceAggregator;

impl ConfidenceAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Σ(score × weight) / Σ(weights present), rounded and clamped
    ///
    /// Factors without a score, or with zero weight, are left out of both
    /// sums and of the breakdown.
    pub fn aggregate(&self, factors: &ConfidenceFactors) -> ConfidenceAssessment {
        let present: Vec<(ConfidenceFactor, f64, f64)> = ConfidenceFactor::ALL
            .iter()
            .filter_map(|factor| {
                let score = factors.score(*factor)?;
                let weight = factors.weight(*factor);
                (weight > 0.0).then_some((*factor, score, weight))
            })
            .collect();

        let total_weight: f64 = present.iter().map(|(_, _, w)| w).sum();
        if total_weight <= 0.0 {
            return ConfidenceAssessment {
                score: 0,
                level: ConfidenceLevel::from_score(0),
                breakdown: Vec::new(),
            };
        }

        let breakdown: Vec<BreakdownEntry> = present
            .into_iter()
            .map(|(factor, score, weight)| {
                let normalized = weight / total_weight;
                BreakdownEntry {
                    factor,
                    score,
                    weight_pct: normalized * 100.0,
                    contribution: score * normalized,
                }
            })
            .collect();

        let raw: f64 = breakdown.iter().map(|e| e.contribution).sum();
        let score = raw.round().clamp(0.0, 100.0) as u8;

        ConfidenceAssessment {
            score,
            level: ConfidenceLevel::from_score(score),
            breakdown,
        }
    }
}
