// SPDX-License-Identifier: MIT
//! Stats aggregator — recomputes one user's summary after a check pass.
//!
//! The recompute is idempotent: the same record set yields the same counts,
//! breakdowns, and ranks. Ranks compare against all other users' cached
//! snapshots (an O(n) scan, acceptable at the target data scale); other
//! users' ranks refresh on their own next pass.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};

use crate::error::EngineError;
use crate::model::{AchievementStatus, RecentCompletion, Reward, UserStats};
use crate::store::AchievementStore;

/// Whether `at` falls in the same ISO week as `now`.
fn in_current_week(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let a = at.iso_week();
    let b = now.iso_week();
    a.year() == b.year() && a.week() == b.week()
}

#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn AchievementStore>,
    /// How many recent completions the snapshot retains.
    recent_limit: usize,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn AchievementStore>, recent_limit: usize) -> Self {
        Self { store, recent_limit }
    }

    /// Recompute and persist `user_id`'s stats snapshot.
    pub async fn recompute(&self, user_id: &str) -> Result<UserStats, EngineError> {
        let now = Utc::now();
        let records = self.store.list_user_achievements(user_id).await?;

        let mut stats = UserStats::empty(user_id);
        stats.updated_at = now;
        if let Some(previous) = self.store.get_user_stats(user_id).await? {
            stats.display_name = previous.display_name;
        }

        let mut recent: Vec<RecentCompletion> = Vec::new();
        for rec in &records {
            stats.total += 1;
            let category = stats.by_category.entry(rec.snapshot.category).or_default();
            category.total += 1;

            if rec.status == AchievementStatus::InProgress {
                stats.in_progress += 1;
            }

            // A record counts as completed once it has finished any cycle,
            // even if a repeatable has since cycled back to Available.
            if rec.completion_count == 0 {
                continue;
            }
            stats.completed += 1;
            category.completed += 1;
            *stats.by_rarity.entry(rec.snapshot.rarity).or_insert(0) += 1;

            let cycles = rec.completion_count as u64;
            stats.xp += rec.snapshot.rewards.iter().map(Reward::xp_value).sum::<u64>() * cycles;
            stats.points +=
                rec.snapshot.rewards.iter().map(Reward::points_value).sum::<u64>() * cycles;

            if let Some(at) = rec.completed_at {
                if in_current_week(at, now) {
                    stats.weekly_completions += 1;
                }
                recent.push(RecentCompletion {
                    achievement_id: rec.achievement_id.clone(),
                    name: rec.snapshot.name.clone(),
                    rarity: rec.snapshot.rarity,
                    completed_at: at,
                });
            }
        }

        recent.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        recent.truncate(self.recent_limit);
        stats.recent_completions = recent;

        self.fill_ranks(&mut stats).await?;

        self.store.put_user_stats(&stats).await?;
        Ok(stats)
    }

    /// Global rank by (XP, completed count); per-category rank by completed
    /// count within the category. 1-based; ties share a rank.
    async fn fill_ranks(&self, stats: &mut UserStats) -> Result<(), EngineError> {
        let others: Vec<UserStats> = self
            .store
            .list_all_user_stats()
            .await?
            .into_iter()
            .filter(|s| s.user_id != stats.user_id)
            .collect();

        let ahead = others
            .iter()
            .filter(|o| (o.xp, o.completed) > (stats.xp, stats.completed))
            .count() as u32;
        stats.global_rank = Some(ahead + 1);

        stats.category_ranks.clear();
        for (category, own) in &stats.by_category {
            let ahead = others
                .iter()
                .filter(|o| {
                    o.by_category
                        .get(category)
                        .map_or(0, |c| c.completed)
                        > own.completed
                })
                .count() as u32;
            stats.category_ranks.insert(*category, ahead + 1);
        }
        Ok(())
    }
}
