// SPDX-License-Identifier: MIT
//! Laurel — achievement evaluation engine for the study platform.
//!
//! Ingests behavioral events, evaluates them against a catalog of
//! achievement definitions, advances per-user progress, detects completions
//! and cascading unlocks, emits notifications, and maintains cached ranked
//! leaderboards. HTTP routing, auth, the dashboard, and the metric-producing
//! trackers are external collaborators — this crate talks to them through
//! the [`store::AchievementStore`] and [`metrics::MetricProvider`] ports.

pub mod admin;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod leaderboard;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod retry;
pub mod stats;
pub mod store;

use std::sync::Arc;

use admin::AdminReporter;
use catalog::Catalog;
use config::EngineConfig;
use engine::CheckEngine;
use export::DataExporter;
use leaderboard::LeaderboardCache;
use metrics::MetricProvider;
use notify::NotificationEmitter;
use stats::StatsAggregator;
use store::AchievementStore;

pub use error::{EngineError, StoreError};

/// Everything a calling system needs, wired against one store and one
/// metric provider. Cheap to clone.
#[derive(Clone)]
pub struct EngineContext {
    pub engine: CheckEngine,
    pub catalog: Catalog,
    pub leaderboards: LeaderboardCache,
    pub notifications: NotificationEmitter,
    pub stats: StatsAggregator,
    pub admin: AdminReporter,
    pub export: DataExporter,
    pub config: Arc<EngineConfig>,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn AchievementStore>,
        metrics: Arc<dyn MetricProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine: CheckEngine::new(Arc::clone(&store), metrics, config.clone()),
            catalog: Catalog::new(Arc::clone(&store)),
            leaderboards: LeaderboardCache::new(Arc::clone(&store), config.leaderboard.clone()),
            notifications: NotificationEmitter::new(Arc::clone(&store)),
            stats: StatsAggregator::new(Arc::clone(&store), config.recent_completions),
            admin: AdminReporter::new(Arc::clone(&store)),
            export: DataExporter::new(store),
            config: Arc::new(config),
        }
    }
}
