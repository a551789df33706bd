// SPDX-License-Identifier: MIT
//! Per-user summary statistics, recomputed after every check pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::definition::{Category, Rarity};

/// Per-category counts within one user's stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: u32,
    pub completed: u32,
}

/// One of the user's most recent completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentCompletion {
    pub achievement_id: String,
    pub name: String,
    pub rarity: Rarity,
    pub completed_at: DateTime<Utc>,
}

/// Cached summary of one user's achievement standing.
///
/// Recomputed idempotently by the stats aggregator; ranks are filled by an
/// O(n) comparison against all other users' cached snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    /// Shown on leaderboards; falls back to the user id when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub total: u32,
    pub completed: u32,
    pub in_progress: u32,
    /// Total XP earned across completions (× completion count for
    /// repeatables).
    pub xp: u64,
    pub points: u64,
    pub by_category: HashMap<Category, CategoryStats>,
    /// Completed counts per rarity tier.
    pub by_rarity: HashMap<Rarity, u32>,
    pub global_rank: Option<u32>,
    pub category_ranks: HashMap<Category, u32>,
    /// Completions whose `completed_at` falls within the current ISO week.
    pub weekly_completions: u32,
    pub recent_completions: Vec<RecentCompletion>,
    pub updated_at: DateTime<Utc>,
}

impl UserStats {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            total: 0,
            completed: 0,
            in_progress: 0,
            xp: 0,
            points: 0,
            by_category: HashMap::new(),
            by_rarity: HashMap::new(),
            global_rank: None,
            category_ranks: HashMap::new(),
            weekly_completions: 0,
            recent_completions: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Completed count at rare tier or above.
    pub fn rare_completions(&self) -> u32 {
        self.by_rarity
            .iter()
            .filter(|(r, _)| r.is_rare_tier())
            .map(|(_, n)| n)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rare_completions_counts_rare_and_above() {
        let mut s = UserStats::empty("u1");
        s.by_rarity.insert(Rarity::Common, 4);
        s.by_rarity.insert(Rarity::Rare, 2);
        s.by_rarity.insert(Rarity::Mythical, 1);
        assert_eq!(s.rare_completions(), 3);
    }

    #[test]
    fn stats_roundtrip_json() {
        let mut s = UserStats::empty("u1");
        s.by_category
            .insert(Category::Accuracy, CategoryStats { total: 3, completed: 1 });
        s.xp = 500;
        let json = serde_json::to_string(&s).unwrap();
        let back: UserStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back.xp, 500);
        assert_eq!(back.by_category[&Category::Accuracy].completed, 1);
    }
}
