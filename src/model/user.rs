// SPDX-License-Identifier: MIT
//! Per-user achievement records and their state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::{AchievementDefinition, DefinitionSnapshot};

/// Lifecycle state of one (user, achievement) record.
///
/// `Locked → Available → InProgress → Completed`, with
/// `Completed → Available` only for repeatable definitions and `Expired`
/// reachable from any non-completed state once the definition's active
/// window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementStatus {
    Locked,
    Available,
    InProgress,
    Completed,
    Expired,
}

impl AchievementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementStatus::Locked => "locked",
            AchievementStatus::Available => "available",
            AchievementStatus::InProgress => "in_progress",
            AchievementStatus::Completed => "completed",
            AchievementStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "locked" => AchievementStatus::Locked,
            "available" => AchievementStatus::Available,
            "in_progress" => AchievementStatus::InProgress,
            "completed" => AchievementStatus::Completed,
            "expired" => AchievementStatus::Expired,
            _ => return None,
        })
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// `repeatable` opens the `Completed → Available` edge. Self-transitions
    /// are not transitions and return false.
    pub fn can_transition(&self, to: AchievementStatus, repeatable: bool) -> bool {
        use AchievementStatus::*;
        match (*self, to) {
            (Locked, Available) => true,
            (Available, InProgress) | (Available, Completed) => true,
            (InProgress, Completed) => true,
            (Completed, Available) => repeatable,
            // Expiry from any non-completed state.
            (Locked, Expired) | (Available, Expired) | (InProgress, Expired) => true,
            _ => false,
        }
    }
}

/// Progress toward one achievement. Integers are floored; the percentage is
/// clamped to `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: i64,
    pub target: i64,
    pub percentage: u32,
    pub last_updated: DateTime<Utc>,
}

impl Progress {
    pub fn zero(target: i64) -> Self {
        Self {
            current: 0,
            target,
            percentage: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percentage >= 100
    }
}

/// The mutable per-user record tracking progress against one definition.
///
/// Created once (at onboarding or lazily on first relevant event), mutated
/// exclusively by the check engine through revision-guarded transactions,
/// and hard-deleted only by user-data erasure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: String,
    pub achievement_id: String,
    pub status: AchievementStatus,
    pub progress: Progress,
    pub completion_count: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub rewards_collected: bool,
    pub rewards_collected_at: Option<DateTime<Utc>>,
    /// Definition fields frozen at initialization time.
    pub snapshot: DefinitionSnapshot,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, incremented by every committed update.
    pub revision: u64,
}

impl UserAchievement {
    /// Initialize a record for `user_id` against `def`.
    ///
    /// Starts `Locked` when the definition has unmet prerequisites
    /// (`prerequisites_met == false`), otherwise `Available`.
    pub fn initialize(
        user_id: impl Into<String>,
        def: &AchievementDefinition,
        prerequisites_met: bool,
    ) -> Self {
        let now = Utc::now();
        let target: i64 = def.conditions.iter().map(|c| c.value.floor() as i64).sum();
        let status = if def.prerequisites.is_empty() || prerequisites_met {
            AchievementStatus::Available
        } else {
            AchievementStatus::Locked
        };
        Self {
            user_id: user_id.into(),
            achievement_id: def.id.clone(),
            status,
            progress: Progress::zero(target),
            completion_count: 0,
            completed_at: None,
            rewards_collected: false,
            rewards_collected_at: None,
            snapshot: def.snapshot(),
            first_seen_at: now,
            last_updated_at: now,
            revision: 0,
        }
    }

    /// Mark the pending rewards as collected.
    pub fn collect_rewards(&mut self) {
        self.rewards_collected = true;
        self.rewards_collected_at = Some(Utc::now());
        self.last_updated_at = Utc::now();
    }
}
