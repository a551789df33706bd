// SPDX-License-Identifier: MIT
//! Prerequisite unlock cascade.
//!
//! Contract: ONE level per check pass. An unlock performed here can itself
//! satisfy another definition's prerequisites, but that deeper unlock waits
//! for the next triggering event — chains resolve one edge per pass.

use std::collections::HashMap;

use tracing::warn;

use crate::error::EngineError;
use crate::model::{
    event_kind, AchievementDefinition, AchievementStatus, EventLogEntry, Notification,
    UnlockedAchievement, UserAchievement,
};
use crate::notify;
use crate::store::{AchievementStore, CheckUpdate};

/// Whether every prerequisite of `def` is completed in `records`.
pub fn prerequisites_met(
    def: &AchievementDefinition,
    records: &HashMap<String, UserAchievement>,
) -> bool {
    def.prerequisites.iter().all(|id| {
        records
            .get(id)
            .map_or(false, |r| {
                r.status == AchievementStatus::Completed || r.completion_count > 0
            })
    })
}

/// Unlock definitions gated on any of `completed_ids`.
///
/// For each active definition listing a newly-completed id as prerequisite,
/// if the user's record is absent or `Locked` and all prerequisites are now
/// completed, the record transitions to `Available` with an unlock
/// notification and event committed atomically. Failures on one definition
/// are logged and do not stop the rest.
pub async fn resolve_unlocks(
    store: &dyn AchievementStore,
    user_id: &str,
    completed_ids: &[String],
    definitions: &[AchievementDefinition],
    records: &mut HashMap<String, UserAchievement>,
) -> Result<(Vec<UnlockedAchievement>, Vec<Notification>), EngineError> {
    let mut unlocked = Vec::new();
    let mut notifications = Vec::new();

    for def in definitions {
        if !def.active || def.prerequisites.is_empty() {
            continue;
        }
        if !def.prerequisites.iter().any(|p| completed_ids.contains(p)) {
            continue;
        }
        let existing = records.get(&def.id);
        if existing.map_or(false, |r| r.status != AchievementStatus::Locked) {
            continue;
        }
        if !prerequisites_met(def, records) {
            continue;
        }

        let (record, expected_revision) = match existing {
            Some(rec) => {
                let mut updated = rec.clone();
                updated.status = AchievementStatus::Available;
                updated.last_updated_at = chrono::Utc::now();
                updated.revision = rec.revision + 1;
                (updated, Some(rec.revision))
            }
            None => (UserAchievement::initialize(user_id, def, true), None),
        };

        let notification = notify::unlock_notification(user_id, def);
        let event = EventLogEntry::new(
            user_id,
            Some(def.id.clone()),
            event_kind::UNLOCKED,
            serde_json::json!({ "via": completed_ids }),
        );
        let update = CheckUpdate {
            record: record.clone(),
            expected_revision,
            notifications: vec![notification.clone()],
            event: Some(event),
        };

        match store.commit_check_update(&update).await {
            Ok(()) => {
                unlocked.push(UnlockedAchievement {
                    achievement_id: def.id.clone(),
                    name: def.name.clone(),
                });
                notifications.push(notification);
                records.insert(def.id.clone(), record);
            }
            Err(e) => {
                // A conflict here means a concurrent pass already unlocked it.
                warn!(
                    user_id,
                    achievement_id = %def.id,
                    err = %e,
                    "unlock cascade commit failed, continuing"
                );
            }
        }
    }

    Ok((unlocked, notifications))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AchievementCondition, Category, ConditionKind, Rarity, Reward, TriggerType,
    };

    fn def(id: &str, prereqs: Vec<String>) -> AchievementDefinition {
        let mut d = AchievementDefinition::new(
            id,
            id.to_uppercase(),
            Category::Mastery,
            Rarity::Common,
            TriggerType::Immediate,
            vec![AchievementCondition::new(ConditionKind::Count, "cardsMastered", 1.0)],
            vec![Reward::Xp(10)],
        );
        d.prerequisites = prereqs;
        d
    }

    #[test]
    fn prerequisites_require_all_completed() {
        let gated = def("b", vec!["a".into(), "c".into()]);
        let mut records = HashMap::new();

        let mut rec_a = UserAchievement::initialize("u", &def("a", vec![]), true);
        rec_a.status = AchievementStatus::Completed;
        rec_a.completion_count = 1;
        records.insert("a".to_string(), rec_a);
        assert!(!prerequisites_met(&gated, &records), "c still missing");

        // A repeatable prerequisite that cycled back to Available still counts
        // once it has completed at least one cycle.
        let mut rec_c = UserAchievement::initialize("u", &def("c", vec![]), true);
        rec_c.status = AchievementStatus::Available;
        rec_c.completion_count = 1;
        records.insert("c".to_string(), rec_c);
        assert!(prerequisites_met(&gated, &records));
    }
}
