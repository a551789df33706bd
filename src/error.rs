// SPDX-License-Identifier: MIT
//! Error taxonomy for the engine and its storage port.
//!
//! Callers branch on these variants: a [`StoreError::Conflict`] is retryable,
//! a [`EngineError::DeletionBlocked`] wants a cascade decision, validation
//! variants never reach the engine at runtime.

use thiserror::Error;

/// Errors surfaced by [`crate::store::AchievementStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer committed the record first; retry with fresh state.
    #[error("concurrent update conflict on ({user_id}, {achievement_id})")]
    Conflict {
        user_id: String,
        achievement_id: String,
    },

    /// The record targeted by a guarded update does not exist.
    #[error("record not found: {what}")]
    NotFound { what: String },

    #[error("serialization failure")]
    Serialization(#[from] serde_json::Error),

    /// Backend failure, kept opaque so the port stays backend-agnostic.
    #[error("store backend failure")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("definition not found: {id}")]
    DefinitionNotFound { id: String },

    #[error("definition {id} already exists")]
    DefinitionExists { id: String },

    #[error("definition {id} has no conditions")]
    MissingConditions { id: String },

    #[error("definition {id} has no rewards")]
    MissingRewards { id: String },

    #[error("definition {id} references unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { id: String, prerequisite: String },

    #[error("prerequisite cycle through {id}")]
    PrerequisiteCycle { id: String },

    /// Deletion refused while dependent user records exist. Pass the cascade
    /// flag to force-delete the dependents along with the definition.
    #[error("definition {id} still has {dependents} dependent user record(s)")]
    DeletionBlocked { id: String, dependents: u64 },

    /// Reward collection requested on a record with no completed cycle.
    #[error("({user_id}, {achievement_id}) has no completed cycle to collect rewards for")]
    RewardsNotEarned {
        user_id: String,
        achievement_id: String,
    },

    /// Transient failure: conflict retries exhausted without a clean commit.
    #[error("gave up after {attempts} conflicting update(s) on ({user_id}, {achievement_id})")]
    ConflictRetriesExhausted {
        user_id: String,
        achievement_id: String,
        attempts: u32,
    },
}

impl EngineError {
    /// Whether the caller may simply retry on the next relevant event.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::ConflictRetriesExhausted { .. }
                | EngineError::Store(StoreError::Conflict { .. })
        )
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
