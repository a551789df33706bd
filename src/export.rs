// SPDX-License-Identifier: MIT
//! Per-user data export (JSON or flattened tabular) and erasure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::model::{event_kind, EventLogEntry, Notification, UserAchievement, UserStats};
use crate::store::{AchievementStore, ErasureReport};

/// Everything the engine holds about one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserExport {
    pub user_id: String,
    pub exported_at: DateTime<Utc>,
    pub achievements: Vec<UserAchievement>,
    pub notifications: Vec<Notification>,
    pub stats: Option<UserStats>,
    pub events: Vec<EventLogEntry>,
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl UserExport {
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Store(crate::error::StoreError::Serialization(e)))
    }

    /// Flattened tabular form: one CSV row per achievement record.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "achievement_id,name,category,rarity,status,current,target,percentage,\
             completion_count,completed_at,rewards_collected,first_seen_at\n",
        );
        for rec in &self.achievements {
            let row = [
                csv_field(&rec.achievement_id),
                csv_field(&rec.snapshot.name),
                rec.snapshot.category.as_str().to_string(),
                rec.snapshot.rarity.as_str().to_string(),
                rec.status.as_str().to_string(),
                rec.progress.current.to_string(),
                rec.progress.target.to_string(),
                rec.progress.percentage.to_string(),
                rec.completion_count.to_string(),
                rec.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                rec.rewards_collected.to_string(),
                rec.first_seen_at.to_rfc3339(),
            ];
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}

#[derive(Clone)]
pub struct DataExporter {
    store: Arc<dyn AchievementStore>,
}

impl DataExporter {
    pub fn new(store: Arc<dyn AchievementStore>) -> Self {
        Self { store }
    }

    pub async fn export(&self, user_id: &str) -> Result<UserExport, EngineError> {
        Ok(UserExport {
            user_id: user_id.to_string(),
            exported_at: Utc::now(),
            achievements: self.store.list_user_achievements(user_id).await?,
            notifications: self.store.list_notifications(user_id, false, None).await?,
            stats: self.store.get_user_stats(user_id).await?,
            events: self.store.list_events(user_id, None).await?,
        })
    }

    /// Remove all of a user's rows, then log a content-free erasure event as
    /// the audit trail. The batch is per-record atomic only.
    pub async fn erase(&self, user_id: &str) -> Result<ErasureReport, EngineError> {
        let report = self.store.erase_user(user_id).await?;
        self.store
            .append_event(&EventLogEntry::new(
                user_id,
                None,
                event_kind::USER_DATA_ERASED,
                serde_json::json!({
                    "achievements": report.achievements,
                    "notifications": report.notifications,
                    "stats": report.stats,
                    "events": report.events,
                }),
            ))
            .await?;
        info!(
            user_id,
            achievements = report.achievements,
            notifications = report.notifications,
            "user data erased"
        );
        Ok(report)
    }
}
