// SPDX-License-Identifier: MIT
//! Leaderboard cache — global, per-category, and weekly ranked views with
//! per-kind freshness windows.
//!
//! Reads inside the window return the cached view byte-for-byte. Stale reads
//! recompute synchronously from the stats snapshots, write back, and return
//! the fresh view. Recompute is idempotent and safe under concurrent
//! readers — last writer wins, convergence is eventual.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;

use crate::config::LeaderboardConfig;
use crate::error::EngineError;
use crate::model::{Category, LeaderboardEntry, LeaderboardKind, LeaderboardView, UserStats};
use crate::store::AchievementStore;

fn freshness_window(config: &LeaderboardConfig, kind: &LeaderboardKind) -> Duration {
    let secs = match kind {
        LeaderboardKind::Global => config.global_freshness_secs,
        LeaderboardKind::Category(_) => config.category_freshness_secs,
        LeaderboardKind::Weekly => config.weekly_freshness_secs,
    };
    Duration::seconds(secs as i64)
}

/// Rank the stats snapshots into one view. Zero-score users stay off the
/// board; ties break on the secondary score, then user id for stability.
fn build_view(
    config: &LeaderboardConfig,
    kind: LeaderboardKind,
    stats: &[UserStats],
) -> LeaderboardView {
    let mut scored: Vec<(&UserStats, u64, u64)> = stats
        .iter()
        .filter_map(|s| {
            let (score, tie_break) = match kind {
                LeaderboardKind::Global => (s.xp, s.completed as u64),
                LeaderboardKind::Category(c) => (
                    s.by_category.get(&c).map_or(0, |cs| cs.completed as u64),
                    s.xp,
                ),
                LeaderboardKind::Weekly => (s.weekly_completions as u64, s.xp),
            };
            (score > 0).then_some((s, score, tie_break))
        })
        .collect();
    scored.sort_by(|a, b| (b.1, b.2).cmp(&(a.1, a.2)).then(a.0.user_id.cmp(&b.0.user_id)));
    scored.truncate(config.max_entries);

    let entries = scored
        .into_iter()
        .enumerate()
        .map(|(i, (s, score, _))| LeaderboardEntry {
            user_id: s.user_id.clone(),
            display_name: s.display_name.clone().unwrap_or_else(|| s.user_id.clone()),
            score,
            rank: i as u32 + 1,
            completions: s.completed,
            rare_completions: s.rare_completions(),
        })
        .collect();

    let now = Utc::now();
    LeaderboardView {
        id: kind.view_id(),
        kind,
        entries,
        last_updated: now,
        next_update: now + freshness_window(config, &kind),
    }
}

#[derive(Clone)]
pub struct LeaderboardCache {
    store: Arc<dyn AchievementStore>,
    config: LeaderboardConfig,
}

impl LeaderboardCache {
    pub fn new(store: Arc<dyn AchievementStore>, config: LeaderboardConfig) -> Self {
        Self { store, config }
    }

    /// Read a view, recomputing first when the cached copy is stale or
    /// absent. Reads never hold record locks — only stats snapshots are
    /// consulted.
    pub async fn get(&self, kind: LeaderboardKind) -> Result<LeaderboardView, EngineError> {
        let view_id = kind.view_id();
        let window = freshness_window(&self.config, &kind);
        let now = Utc::now();

        if let Some(cached) = self.store.get_leaderboard(&view_id).await? {
            if cached.is_fresh(now, window) {
                return Ok(cached);
            }
            debug!(view_id, "leaderboard stale, recomputing");
        }
        self.recompute(kind).await
    }

    /// Recompute one view from the stats snapshots and write it back.
    pub async fn recompute(&self, kind: LeaderboardKind) -> Result<LeaderboardView, EngineError> {
        let stats = self.store.list_all_user_stats().await?;
        let view = build_view(&self.config, kind, &stats);
        self.store.put_leaderboard(&view).await?;
        Ok(view)
    }

    /// Recompute every view kind — the admin bulk entry point. Category
    /// views are rebuilt for all categories.
    pub async fn recompute_all(&self) -> Result<Vec<LeaderboardView>, EngineError> {
        let stats = self.store.list_all_user_stats().await?;
        let mut kinds = vec![LeaderboardKind::Global, LeaderboardKind::Weekly];
        kinds.extend(Category::all().into_iter().map(LeaderboardKind::Category));

        let mut views = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let view = build_view(&self.config, kind, &stats);
            self.store.put_leaderboard(&view).await?;
            views.push(view);
        }
        Ok(views)
    }
}
