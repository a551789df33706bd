// SPDX-License-Identifier: MIT
//! Aggregate metrics for administrative/reporting callers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::Rarity;
use crate::store::AchievementStore;

/// Users bucketed by how many achievements they have completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementBuckets {
    /// 0 completions.
    pub inactive: u32,
    /// 1–4 completions.
    pub casual: u32,
    /// 5–14 completions.
    pub engaged: u32,
    /// 15+ completions.
    pub hardcore: u32,
}

impl EngagementBuckets {
    fn bucket(&mut self, completed: u32) {
        match completed {
            0 => self.inactive += 1,
            1..=4 => self.casual += 1,
            5..=14 => self.engaged += 1,
            _ => self.hardcore += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularAchievement {
    pub achievement_id: String,
    pub name: String,
    /// How many users have completed it at least once.
    pub completed_users: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminMetrics {
    pub catalog_size: u32,
    pub active_definitions: u32,
    pub tracked_users: u32,
    /// Fraction of (user, definition) slots completed, per rarity tier.
    pub completion_rates_by_rarity: HashMap<Rarity, f64>,
    pub most_popular: Vec<PopularAchievement>,
    pub engagement: EngagementBuckets,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AdminReporter {
    store: Arc<dyn AchievementStore>,
    /// How many entries `most_popular` retains.
    top_n: usize,
}

impl AdminReporter {
    pub fn new(store: Arc<dyn AchievementStore>) -> Self {
        Self { store, top_n: 10 }
    }

    pub async fn metrics(&self) -> Result<AdminMetrics, EngineError> {
        let definitions = self.store.list_definitions().await?;
        let all_stats = self.store.list_all_user_stats().await?;
        let counts = self.store.completed_user_counts().await?;

        let names: HashMap<&str, &str> = definitions
            .iter()
            .map(|d| (d.id.as_str(), d.name.as_str()))
            .collect();
        let most_popular = counts
            .iter()
            .take(self.top_n)
            .map(|(id, n)| PopularAchievement {
                achievement_id: id.clone(),
                name: names.get(id.as_str()).unwrap_or(&"(deleted)").to_string(),
                completed_users: *n,
            })
            .collect();

        let mut engagement = EngagementBuckets::default();
        for stats in &all_stats {
            engagement.bucket(stats.completed);
        }

        // Rate = completions at a tier / (tracked users × definitions at that
        // tier). Tiers with no definitions report no rate at all.
        let users = all_stats.len() as u64;
        let mut defs_per_rarity: HashMap<Rarity, u64> = HashMap::new();
        for def in &definitions {
            *defs_per_rarity.entry(def.rarity).or_insert(0) += 1;
        }
        let mut completions_per_rarity: HashMap<Rarity, u64> = HashMap::new();
        for stats in &all_stats {
            for (rarity, n) in &stats.by_rarity {
                *completions_per_rarity.entry(*rarity).or_insert(0) += *n as u64;
            }
        }
        let mut completion_rates_by_rarity = HashMap::new();
        for (rarity, def_count) in &defs_per_rarity {
            let slots = users * def_count;
            let rate = if slots == 0 {
                0.0
            } else {
                *completions_per_rarity.get(rarity).unwrap_or(&0) as f64 / slots as f64
            };
            completion_rates_by_rarity.insert(*rarity, rate);
        }

        Ok(AdminMetrics {
            catalog_size: definitions.len() as u32,
            active_definitions: definitions.iter().filter(|d| d.active).count() as u32,
            tracked_users: all_stats.len() as u32,
            completion_rates_by_rarity,
            most_popular,
            engagement,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_bucket_edges() {
        let mut b = EngagementBuckets::default();
        for n in [0, 1, 4, 5, 14, 15, 40] {
            b.bucket(n);
        }
        assert_eq!(b.inactive, 1);
        assert_eq!(b.casual, 2);
        assert_eq!(b.engaged, 2);
        assert_eq!(b.hardcore, 2);
    }
}
