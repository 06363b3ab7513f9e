//! Core types for the Beneficiary Resolver
//!
//! This crate defines the shared data structures used across the resolver,
//! including research requests, ownership chains, provider results and the
//! final confidence-scored resolution.

pub mod confidence;
pub mod error;
pub mod ownership;
pub mod provider;
pub mod request;
pub mod result;
pub mod trace;

pub use confidence::{
    BreakdownEntry, ConfidenceAssessment, ConfidenceFactor, ConfidenceFactors, ConfidenceLevel,
};
pub use error::{BeneficiaryError, BeneficiaryResult};
pub use ownership::{
    dedup_sources, domain_of, normalize_url, role_for_position, OwnershipEntity, OwnershipRole,
    SourceRecord, SourceTier,
};
pub use provider::{is_unknown_beneficiary, ProviderFindings, ProviderResult, UNKNOWN_BENEFICIARY};
pub use request::{normalize_name, ResearchRequest};
pub use result::{ResolutionResult, ResultType, VerificationStatus};
pub use trace::{ExecutionTrace, Stage, StageRecorder, StageStatus};
