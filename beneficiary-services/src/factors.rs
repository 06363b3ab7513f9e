//! Sub-score computation for each confidence factor
//!
//! Every function here produces an independent 0-100 signal. They are
//! deliberately simple heuristics over text and counts.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use beneficiary_core::{
    normalize_name, ConfidenceFactor, ConfidenceFactors, ExecutionTrace, ProviderFindings,
};
use chrono::{Datelike, Utc};
use regex::Regex;

use crate::conflict::ConflictResolution;
use crate::trust::ConsistencyCheck;

/// Stages slower than this count against execution reliability
pub const ANOMALOUS_STAGE_MS: u64 = 30_000;

const DIRECT_OWNERSHIP: &[&str] = &[
    "owned by",
    "wholly owned",
    "subsidiary of",
    "acquired",
    "parent company",
    "holding company",
    "majority stake",
    "division of",
];
const RECENCY: &[&str] = &["as of", "currently", "today", "recent", "latest"];
const HEDGING: &[&str] = &[
    "may ",
    "might",
    "possibly",
    "perhaps",
    "unclear",
    "reportedly",
    "believed",
    "uncertain",
    "speculat",
    "not sure",
    "unconfirmed",
];

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("Invalid year regex"));
static SPECIFIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\b\d+(\.\d+)?\s*%|\b(inc|ltd|plc|s\.a|ag|gmbh|corp|llc|n\.v|co)\b\.?|https?://)")
        .expect("Invalid specificity regex")
});

fn count_markers(lower: &str, markers: &[&str]) -> usize {
    markers.iter().filter(|m| lower.contains(*m)).count()
}

/// Direct ownership language and recent dates raise it; hedging lowers it
pub fn evidence_strength(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let direct = count_markers(&lower, DIRECT_OWNERSHIP) as f64;

    let this_year = Utc::now().year();
    let recent_years = YEAR_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .filter(|year| *year >= this_year - 3 && *year <= this_year)
        .count();
    let recency = (count_markers(&lower, RECENCY) + recent_years.min(1)) as f64;

    let hedging = count_markers(&lower, HEDGING) as f64;

    let score = 50.0 + (direct * 15.0).min(30.0) + (recency * 10.0).min(20.0)
        - (hedging * 10.0).min(40.0);
    score.clamp(0.0, 100.0)
}

/// Fraction of provider attempts that succeeded and named the accepted owner
pub fn agent_agreement(accepted: &str, attempt_beneficiaries: &[Option<String>]) -> f64 {
    if attempt_beneficiaries.is_empty() {
        return 0.0;
    }
    let accepted = normalize_name(accepted);
    let agreeing = attempt_beneficiaries
        .iter()
        .flatten()
        .filter(|b| normalize_name(b) == accepted)
        .count();
    100.0 * agreeing as f64 / attempt_beneficiaries.len() as f64
}

/// Longer, more specific explanations score higher
pub fn reasoning_quality(reasoning: &str) -> f64 {
    let words = reasoning.split_whitespace().count();
    let base = match words {
        0 => 10.0,
        1..=19 => 40.0,
        20..=59 => 60.0,
        _ => 75.0,
    };
    let specifics = SPECIFIC_RE.find_iter(reasoning).count() + YEAR_RE.find_iter(reasoning).count();
    (base + (specifics as f64 * 5.0).min(25.0)).clamp(0.0, 100.0)
}

/// Agreement of the evidence with itself
///
/// Distinct owners named across attempts, ambiguous role conflicts and a
/// chain that ends somewhere other than the named beneficiary all count.
pub fn consistency_check(
    findings: &ProviderFindings,
    resolution: &ConflictResolution,
    attempt_beneficiaries: &[Option<String>],
) -> ConsistencyCheck {
    let distinct: BTreeSet<String> = attempt_beneficiaries
        .iter()
        .flatten()
        .map(|b| normalize_name(b))
        .chain(std::iter::once(normalize_name(&findings.financial_beneficiary)))
        .collect();
    let disagreements = distinct.len().saturating_sub(1);
    let ambiguous = resolution.conflicts.iter().filter(|c| c.ambiguous).count();

    let chain_mismatch = resolution
        .entities
        .last()
        .is_some_and(|owner| owner.normalized_name() != normalize_name(&findings.financial_beneficiary));

    let score = 1.0
        - 0.25 * disagreements as f64
        - 0.2 * ambiguous as f64
        - if chain_mismatch { 0.2 } else { 0.0 };

    ConsistencyCheck::new(
        score,
        disagreements + ambiguous + usize::from(chain_mismatch),
    )
}

pub fn data_consistency(consistency: ConsistencyCheck) -> f64 {
    (consistency.score * 100.0 - 15.0 * consistency.conflict_count as f64).clamp(0.0, 100.0)
}

/// Penalize error stages and stages that ran unusually long
pub fn execution_reliability(trace: &ExecutionTrace) -> f64 {
    let errors = trace.error_count() as f64;
    let slow = trace
        .stages()
        .iter()
        .filter(|s| s.duration_ms > ANOMALOUS_STAGE_MS)
        .count() as f64;
    (100.0 - 20.0 * errors - 10.0 * slow).clamp(0.0, 100.0)
}

/// Present only when the provider said whether it checked current ownership
pub fn current_ownership_validation(verified: Option<bool>) -> Option<f64> {
    verified.map(|v| if v { 90.0 } else { 40.0 })
}

/// Everything the factor functions read
pub struct FactorInputs<'a> {
    pub findings: &'a ProviderFindings,
    pub resolution: &'a ConflictResolution,
    pub attempt_beneficiaries: &'a [Option<String>],
    pub source_quality: f64,
    pub consistency: ConsistencyCheck,
    pub trace: &'a ExecutionTrace,
}

pub fn compute_factors(inputs: &FactorInputs<'_>) -> ConfidenceFactors {
    let findings = inputs.findings;
    let evidence_text = format!("{} {}", findings.reasoning, findings.notes.join(" "));

    let mut factors = ConfidenceFactors::new()
        .with_score(ConfidenceFactor::SourceQuality, inputs.source_quality)
        .with_score(ConfidenceFactor::EvidenceStrength, evidence_strength(&evidence_text))
        .with_score(
            ConfidenceFactor::AgentAgreement,
            agent_agreement(&findings.financial_beneficiary, inputs.attempt_beneficiaries),
        )
        .with_score(
            ConfidenceFactor::ReasoningQuality,
            reasoning_quality(&findings.reasoning),
        )
        .with_score(
            ConfidenceFactor::DataConsistency,
            data_consistency(inputs.consistency),
        )
        .with_score(
            ConfidenceFactor::ExecutionReliability,
            execution_reliability(inputs.trace),
        );

    if let Some(score) = current_ownership_validation(findings.current_ownership_verified) {
        factors.set(ConfidenceFactor::CurrentOwnershipValidation, score);
    }
    factors
}
