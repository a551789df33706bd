//! Storage port for the achievement engine.
//!
//! The engine is written once against [`AchievementStore`]; each persistence
//! backend supplies an adapter. The port's one non-obvious contract is
//! [`AchievementStore::commit_check_update`]: the record write, its
//! notifications, and its event log entry must land in a single transaction,
//! guarded by the record revision — a lost race surfaces as
//! [`StoreError::Conflict`] and nothing is written.

pub mod sqlite;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{
    AchievementDefinition, EventLogEntry, LeaderboardView, Notification, TriggerType,
    UserAchievement, UserStats,
};

pub use sqlite::SqliteStore;

/// One atomic update to a single (user, achievement) record.
#[derive(Debug, Clone)]
pub struct CheckUpdate {
    /// Desired new record state. `record.revision` must already be advanced
    /// past `expected_revision`.
    pub record: UserAchievement,
    /// Revision observed when the record was read; `None` inserts a fresh
    /// row instead (conflicting with any concurrent insert).
    pub expected_revision: Option<u64>,
    /// Notifications committed with the record (completion, milestone,
    /// unlock).
    pub notifications: Vec<Notification>,
    /// Event log entry committed with the record.
    pub event: Option<EventLogEntry>,
}

impl CheckUpdate {
    /// An update carrying just the new record state.
    pub fn record_only(record: UserAchievement, expected_revision: Option<u64>) -> Self {
        Self {
            record,
            expected_revision,
            notifications: Vec::new(),
            event: None,
        }
    }
}

/// Counts removed by a user-data erasure, per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErasureReport {
    pub achievements: u64,
    pub notifications: u64,
    pub stats: u64,
    pub events: u64,
}

/// Durable catalog + per-user record store.
#[async_trait]
pub trait AchievementStore: Send + Sync {
    // Catalog.
    async fn insert_definition(&self, def: &AchievementDefinition) -> Result<(), StoreError>;
    async fn get_definition(&self, id: &str) -> Result<Option<AchievementDefinition>, StoreError>;
    async fn list_definitions(&self) -> Result<Vec<AchievementDefinition>, StoreError>;
    async fn update_definition(&self, def: &AchievementDefinition) -> Result<(), StoreError>;
    async fn delete_definition(&self, id: &str) -> Result<(), StoreError>;
    /// User records referencing `id` (any status).
    async fn count_dependent_records(&self, id: &str) -> Result<u64, StoreError>;
    /// Force-cascade: remove all user records referencing `id`.
    async fn delete_dependent_records(&self, id: &str) -> Result<u64, StoreError>;

    // User achievement records.
    async fn get_user_achievement(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> Result<Option<UserAchievement>, StoreError>;
    async fn list_user_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserAchievement>, StoreError>;
    /// Insert a fresh record; returns `false` when it already existed.
    async fn insert_user_achievement(&self, record: &UserAchievement)
        -> Result<bool, StoreError>;
    /// The single-record transaction described in the module docs.
    async fn commit_check_update(&self, update: &CheckUpdate) -> Result<(), StoreError>;
    /// Users holding available/in-progress records whose definition has the
    /// given trigger type — the sweep-check working set.
    async fn list_users_with_pending(
        &self,
        trigger: TriggerType,
    ) -> Result<Vec<String>, StoreError>;
    /// `(achievement_id, users_completed)` pairs, most completed first.
    async fn completed_user_counts(&self) -> Result<Vec<(String, u64)>, StoreError>;

    // Notifications.
    async fn insert_notification(&self, notification: &Notification) -> Result<(), StoreError>;
    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: Option<u32>,
    ) -> Result<Vec<Notification>, StoreError>;
    /// Returns `false` when the notification did not exist or was read.
    async fn mark_notification_read(&self, id: &str) -> Result<bool, StoreError>;
    /// Returns the number of notifications flipped to read.
    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64, StoreError>;

    // Stats snapshots.
    async fn put_user_stats(&self, stats: &UserStats) -> Result<(), StoreError>;
    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, StoreError>;
    async fn list_all_user_stats(&self) -> Result<Vec<UserStats>, StoreError>;

    // Leaderboard cache.
    async fn get_leaderboard(&self, view_id: &str) -> Result<Option<LeaderboardView>, StoreError>;
    async fn put_leaderboard(&self, view: &LeaderboardView) -> Result<(), StoreError>;

    // Append-only event log.
    async fn append_event(&self, entry: &EventLogEntry) -> Result<(), StoreError>;
    async fn list_events(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<EventLogEntry>, StoreError>;

    /// Remove all rows for `user_id` across user records, notifications,
    /// stats, and events. Per-record atomic only; the whole batch is not.
    async fn erase_user(&self, user_id: &str) -> Result<ErasureReport, StoreError>;
}
