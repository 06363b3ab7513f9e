//! Merging of competing ownership-chain claims

use beneficiary_core::{dedup_sources, OwnershipEntity, OwnershipRole, SourceRecord};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Runner-up within this fraction of the winner's confidence is a conflict
pub const DEFAULT_TIE_RATIO: f64 = 0.8;

const ROLE_ORDER: [OwnershipRole; 3] = [
    OwnershipRole::Brand,
    OwnershipRole::Parent,
    OwnershipRole::UltimateOwner,
];

/// Two or more entities claiming the brand or ultimate-owner slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConflict {
    pub role: OwnershipRole,
    pub winner: String,
    pub winner_confidence: f64,
    pub runner_up: String,
    pub runner_up_confidence: f64,
    /// Runner-up is close enough that the pick is ambiguous
    pub ambiguous: bool,
}

impl RoleConflict {
    pub fn note(&self) -> String {
        format!(
            "{} conflict: chose {} ({:.2}) over {} ({:.2}){}",
            self.role,
            self.winner,
            self.winner_confidence,
            self.runner_up,
            self.runner_up_confidence,
            if self.ambiguous { ", ambiguous" } else { "" }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConflictResolution {
    pub entities: Vec<OwnershipEntity>,
    pub conflicts: Vec<RoleConflict>,
    pub has_conflict: bool,
    /// Every source on the resolved chain, deduplicated by URL
    pub sources: Vec<SourceRecord>,
}

impl ConflictResolution {
    pub fn notes(&self) -> Vec<String> {
        self.conflicts.iter().map(RoleConflict::note).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    tie_ratio: f64,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TIE_RATIO)
    }
}

impl ConflictResolver {
    pub fn new(tie_ratio: f64) -> Self {
        Self {
            tie_ratio: tie_ratio.clamp(0.0, 1.0),
        }
    }

    /// Resolve the chain, ordered brand -> parents -> ultimate owner
    ///
    /// Brand and ultimate owner are single slots: among competing entities
    /// the highest mean source confidence wins, first seen on equal
    /// confidence. Parents are successive levels and all survive in input
    /// order. Repeats of the same name merge into one entity in every role.
    pub fn resolve(&self, entities: &[OwnershipEntity]) -> ConflictResolution {
        let mut resolved = Vec::new();
        let mut conflicts = Vec::new();

        for role in ROLE_ORDER {
            let merged = merge_repeats(entities.iter().filter(|e| e.role == role));
            if merged.is_empty() {
                continue;
            }
            if role == OwnershipRole::Parent {
                resolved.extend(merged);
                continue;
            }

            let mut candidates: Vec<(OwnershipEntity, f64)> = merged
                .into_iter()
                .map(|e| {
                    let confidence = e.mean_source_confidence();
                    (e, confidence)
                })
                .collect();
            // Stable sort keeps first-seen order among equals
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

            let mut candidates = candidates.into_iter();
            let Some((winner, winner_confidence)) = candidates.next() else {
                continue;
            };
            if let Some((runner_up, runner_up_confidence)) = candidates.next() {
                let ambiguous = runner_up_confidence >= winner_confidence * self.tie_ratio;
                debug!(
                    %role,
                    winner = %winner.name,
                    runner_up = %runner_up.name,
                    ambiguous,
                    "Resolved role conflict"
                );
                conflicts.push(RoleConflict {
                    role,
                    winner: winner.name.clone(),
                    winner_confidence,
                    runner_up: runner_up.name,
                    runner_up_confidence,
                    ambiguous,
                });
            }
            resolved.push(winner);
        }

        let sources = dedup_sources(
            resolved
                .iter()
                .flat_map(|e| e.sources.iter().cloned())
                .collect::<Vec<_>>(),
        );
        for entity in resolved.iter_mut() {
            entity.sources = dedup_sources(std::mem::take(&mut entity.sources));
        }

        ConflictResolution {
            has_conflict: conflicts.iter().any(|c| c.ambiguous),
            entities: resolved,
            conflicts,
            sources,
        }
    }
}

/// Collapse entities sharing a normalized name, keeping first-seen order
fn merge_repeats<'a>(entities: impl Iterator<Item = &'a OwnershipEntity>) -> Vec<OwnershipEntity> {
    let mut merged: Vec<OwnershipEntity> = Vec::new();
    for entity in entities {
        let key = entity.normalized_name();
        match merged.iter_mut().find(|m| m.normalized_name() == key) {
            Some(existing) => {
                existing.sources.extend(entity.sources.iter().cloned());
                if existing.country.is_none() {
                    existing.country = entity.country.clone();
                }
            }
            None => merged.push(entity.clone()),
        }
    }
    merged
}
