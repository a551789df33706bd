// SPDX-License-Identifier: MIT
//! Check events, check results, and the append-only event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::definition::{Rarity, Reward};
use super::notification::Notification;
use super::stats::UserStats;
use super::user::AchievementStatus;

/// Event type strings accepted by the check engine's trigger gating.
pub mod event_type {
    pub const QUESTION_ANSWERED: &str = "question_answered";
    pub const SESSION_END: &str = "session_end";
    pub const EXAM_COMPLETED: &str = "exam_completed";
    pub const STREAK_UPDATED: &str = "streak_updated";
    pub const STUDY_MILESTONE: &str = "study_milestone";
    pub const DAILY_CHECK: &str = "daily_check";
    pub const WEEKLY_CHECK: &str = "weekly_check";
    pub const MONTHLY_CHECK: &str = "monthly_check";
    pub const MANUAL: &str = "manual";
}

/// Event kind strings written to the achievement event log.
pub mod event_kind {
    pub const COMPLETED: &str = "achievement_completed";
    pub const UNLOCKED: &str = "achievement_unlocked";
    pub const EXPIRED: &str = "achievement_expired";
    pub const USER_DATA_ERASED: &str = "user_data_erased";
}

/// One inbound behavioral event driving a check pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckEvent {
    pub user_id: String,
    pub event_type: String,
    /// Arbitrary event payload, recorded into the event log on completions.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Which system produced the event, e.g. `"exam_grader"`.
    pub source: String,
    /// Explicit achievement ids to check, bypassing trigger gating.
    #[serde(default)]
    pub force_achievement_ids: Vec<String>,
}

impl CheckEvent {
    pub fn new(
        user_id: impl Into<String>,
        event_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            event_type: event_type.into(),
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
            source: source.into(),
            force_achievement_ids: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// A manual force-check event for an explicit id list.
    pub fn forced(user_id: impl Into<String>, ids: Vec<String>) -> Self {
        let mut ev = Self::new(user_id, event_type::MANUAL, "manual");
        ev.force_achievement_ids = ids;
        ev
    }

    pub fn is_forced(&self) -> bool {
        !self.force_achievement_ids.is_empty()
    }
}

/// One record's progress movement within a check pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressDelta {
    pub achievement_id: String,
    pub current_before: i64,
    pub current_after: i64,
    pub percentage_before: u32,
    pub percentage_after: u32,
    pub status_before: AchievementStatus,
    pub status_after: AchievementStatus,
}

/// A completion detected by a check pass, with the rewards now pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedAchievement {
    pub achievement_id: String,
    pub name: String,
    pub rarity: Rarity,
    pub rewards: Vec<Reward>,
    pub completion_count: u32,
}

/// An achievement unlocked by the prerequisite cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockedAchievement {
    pub achievement_id: String,
    pub name: String,
}

/// Summary of one check pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub user_id: String,
    /// How many candidate achievements were examined.
    pub examined: u32,
    pub deltas: Vec<ProgressDelta>,
    pub completed: Vec<CompletedAchievement>,
    pub unlocked: Vec<UnlockedAchievement>,
    pub notifications: Vec<Notification>,
    /// Stats snapshot refreshed at the end of the pass. `None` only when the
    /// aggregation itself failed (logged, non-fatal).
    pub stats: Option<UserStats>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl CheckResult {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            examined: 0,
            deltas: Vec::new(),
            completed: Vec::new(),
            unlocked: Vec::new(),
            notifications: Vec::new(),
            stats: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }
}

/// One append-only event log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: String,
    pub user_id: String,
    pub achievement_id: Option<String>,
    /// One of the [`event_kind`] constants.
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl EventLogEntry {
    pub fn new(
        user_id: impl Into<String>,
        achievement_id: Option<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            achievement_id,
            kind: kind.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}
