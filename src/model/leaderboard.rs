// SPDX-License-Identifier: MIT
//! Cached ranked leaderboard views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::Category;

/// Which ranking a view represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "category", rename_all = "snake_case")]
pub enum LeaderboardKind {
    /// Ranked by total XP, tie-break by completed count.
    Global,
    /// Ranked by completions within the category.
    Category(Category),
    /// Ranked by completions within the current ISO week, XP tie-break.
    Weekly,
}

impl LeaderboardKind {
    /// Stable cache key for this view.
    pub fn view_id(&self) -> String {
        match self {
            LeaderboardKind::Global => "global".to_string(),
            LeaderboardKind::Category(c) => format!("category:{}", c.as_str()),
            LeaderboardKind::Weekly => "weekly".to_string(),
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            LeaderboardKind::Category(c) => Some(*c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub display_name: String,
    pub score: u64,
    /// 1-based rank within the view.
    pub rank: u32,
    pub completions: u32,
    pub rare_completions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardView {
    pub id: String,
    pub kind: LeaderboardKind,
    pub entries: Vec<LeaderboardEntry>,
    pub last_updated: DateTime<Utc>,
    /// Advisory next-recompute time; reads after it trigger a refresh.
    pub next_update: DateTime<Utc>,
}

impl LeaderboardView {
    /// Whether the view is still inside its freshness window at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.last_updated <= window
    }
}
