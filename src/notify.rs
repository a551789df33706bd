// SPDX-License-Identifier: MIT
//! Notification emitter — append-only creation plus the two mark-read
//! mutations. Completion and milestone notifications are built here but
//! committed inside the check engine's record transaction; unlock
//! notifications ride the cascade's transaction.

use std::sync::Arc;

use crate::error::EngineError;
use crate::model::{
    AchievementDefinition, Notification, NotificationKind, Reward, UserAchievement,
};
use crate::store::AchievementStore;

/// Human summary of a reward list, e.g. `"500 XP, 1 badge"`.
fn reward_summary(rewards: &[Reward]) -> String {
    let mut parts = Vec::new();
    let xp: u64 = rewards.iter().map(Reward::xp_value).sum();
    let points: u64 = rewards.iter().map(Reward::points_value).sum();
    if xp > 0 {
        parts.push(format!("{xp} XP"));
    }
    if points > 0 {
        parts.push(format!("{points} points"));
    }
    let other = rewards
        .iter()
        .filter(|r| !matches!(r, Reward::Xp(_) | Reward::Points(_)))
        .count();
    if other > 0 {
        parts.push(format!("{other} item(s)"));
    }
    if parts.is_empty() {
        "your reward".to_string()
    } else {
        parts.join(", ")
    }
}

/// Completion notification for a freshly completed record.
///
/// Rare-tier completions are flagged important.
pub fn completion_notification(record: &UserAchievement) -> Notification {
    let snap = &record.snapshot;
    let mut n = Notification::new(
        &record.user_id,
        &record.achievement_id,
        NotificationKind::Completed,
        format!("Achievement completed: {}", snap.name),
        format!("You earned {}.", reward_summary(&snap.rewards)),
    )
    .with_snapshot(serde_json::json!({
        "achievementId": record.achievement_id,
        "name": snap.name,
        "rarity": snap.rarity,
        "completionCount": record.completion_count,
    }));
    if snap.rarity.is_rare_tier() {
        n = n.important();
    }
    n
}

/// Milestone notification for an upward threshold crossing.
pub fn milestone_notification(record: &UserAchievement, threshold: u32) -> Notification {
    Notification::new(
        &record.user_id,
        &record.achievement_id,
        NotificationKind::Milestone,
        format!("{threshold}% toward {}", record.snapshot.name),
        format!(
            "Keep going — {}/{}.",
            record.progress.current, record.progress.target
        ),
    )
    .with_snapshot(serde_json::json!({
        "current": record.progress.current,
        "target": record.progress.target,
        "percentage": record.progress.percentage,
    }))
}

/// Unlock notification emitted by the prerequisite cascade.
pub fn unlock_notification(user_id: &str, def: &AchievementDefinition) -> Notification {
    Notification::new(
        user_id,
        &def.id,
        NotificationKind::Unlocked,
        format!("New achievement available: {}", def.name),
        "Unlocked by completing its prerequisites.",
    )
}

/// Read/mark surface over the notification collection.
#[derive(Clone)]
pub struct NotificationEmitter {
    store: Arc<dyn AchievementStore>,
}

impl NotificationEmitter {
    pub fn new(store: Arc<dyn AchievementStore>) -> Self {
        Self { store }
    }

    /// Append one notification outside any record transaction.
    pub async fn emit(&self, notification: &Notification) -> Result<(), EngineError> {
        self.store
            .insert_notification(notification)
            .await
            .map_err(EngineError::from)
    }

    pub async fn list(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: Option<u32>,
    ) -> Result<Vec<Notification>, EngineError> {
        Ok(self.store.list_notifications(user_id, unread_only, limit).await?)
    }

    /// Mark one notification read. `Ok(false)` when it was already read.
    pub async fn mark_read(&self, id: &str) -> Result<bool, EngineError> {
        Ok(self.store.mark_notification_read(id).await?)
    }

    /// Mark every unread notification for `user_id` read; returns the count.
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, EngineError> {
        Ok(self.store.mark_all_notifications_read(user_id).await?)
    }

    pub fn store(&self) -> &Arc<dyn AchievementStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AchievementCondition, Category, ConditionKind, Rarity, TriggerType,
    };

    fn record(rarity: Rarity) -> UserAchievement {
        let mut def = AchievementDefinition::new(
            "exam_ace",
            "Exam Ace",
            Category::ExamPerformance,
            rarity,
            TriggerType::ExamCompletion,
            vec![AchievementCondition::new(ConditionKind::Threshold, "examAverageScore", 90.0)],
            vec![Reward::Xp(500), Reward::Badge("ace".into())],
        );
        def.description = "Average 90% across exams".into();
        let mut rec = UserAchievement::initialize("u1", &def, true);
        rec.completion_count = 1;
        rec
    }

    #[test]
    fn completion_notification_flags_rare_tiers() {
        let n = completion_notification(&record(Rarity::Epic));
        assert!(n.important);
        assert_eq!(n.kind, NotificationKind::Completed);
        assert!(n.message.contains("500 XP"));
        assert!(n.message.contains("1 item(s)"));

        let n = completion_notification(&record(Rarity::Common));
        assert!(!n.important);
    }

    #[test]
    fn milestone_notification_carries_progress() {
        let mut rec = record(Rarity::Common);
        rec.progress.current = 45;
        rec.progress.target = 90;
        rec.progress.percentage = 50;
        let n = milestone_notification(&rec, 50);
        assert_eq!(n.kind, NotificationKind::Milestone);
        assert!(n.title.starts_with("50%"));
        assert_eq!(n.snapshot.as_ref().unwrap()["percentage"], 50);
    }
}
