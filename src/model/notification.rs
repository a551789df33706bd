// SPDX-License-Identifier: MIT
//! User-facing notifications — append-only, mutated only by mark-read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Completed,
    Progress,
    Milestone,
    Unlocked,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Completed => "completed",
            NotificationKind::Progress => "progress",
            NotificationKind::Milestone => "milestone",
            NotificationKind::Unlocked => "unlocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "completed" => NotificationKind::Completed,
            "progress" => NotificationKind::Progress,
            "milestone" => NotificationKind::Milestone,
            "unlocked" => NotificationKind::Unlocked,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub achievement_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// True for rare-tier completions; dashboards surface these prominently.
    pub important: bool,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    /// Optional embedded achievement/progress snapshot for rendering without
    /// a second lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        achievement_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            achievement_id: achievement_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            important: false,
            read: false,
            read_at: None,
            snapshot: None,
            created_at: Utc::now(),
        }
    }

    pub fn important(mut self) -> Self {
        self.important = true;
        self
    }

    pub fn with_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_notification_is_unread() {
        let n = Notification::new("u1", "a1", NotificationKind::Completed, "t", "m");
        assert!(!n.read);
        assert!(n.read_at.is_none());
        assert!(!n.important);
    }

    #[test]
    fn kind_string_roundtrip() {
        for k in [
            NotificationKind::Completed,
            NotificationKind::Progress,
            NotificationKind::Milestone,
            NotificationKind::Unlocked,
        ] {
            assert_eq!(NotificationKind::parse(k.as_str()), Some(k));
        }
    }
}
