//! Engine configuration.
//!
//! Everything tunable lives in an explicit [`EngineConfig`] handed to the
//! engine at construction — no module-level singletons. Table names and
//! freshness windows default to the named constants below; all sections are
//! loadable from a `[laurel]`-style TOML file.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_DEFINITIONS_TABLE: &str = "achievement_definitions";
const DEFAULT_USER_ACHIEVEMENTS_TABLE: &str = "user_achievements";
const DEFAULT_NOTIFICATIONS_TABLE: &str = "notifications";
const DEFAULT_USER_STATS_TABLE: &str = "user_stats";
const DEFAULT_EVENTS_TABLE: &str = "achievement_events";
const DEFAULT_LEADERBOARDS_TABLE: &str = "leaderboards";

const DEFAULT_GLOBAL_FRESHNESS_SECS: u64 = 3600;
const DEFAULT_CATEGORY_FRESHNESS_SECS: u64 = 7200;
const DEFAULT_WEEKLY_FRESHNESS_SECS: u64 = 1800;
const DEFAULT_LEADERBOARD_SIZE: usize = 100;

// ─── CollectionConfig ─────────────────────────────────────────────────────────

/// Logical collection (table) names.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub definitions: String,
    pub user_achievements: String,
    pub notifications: String,
    pub user_stats: String,
    pub events: String,
    pub leaderboards: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            definitions: DEFAULT_DEFINITIONS_TABLE.to_string(),
            user_achievements: DEFAULT_USER_ACHIEVEMENTS_TABLE.to_string(),
            notifications: DEFAULT_NOTIFICATIONS_TABLE.to_string(),
            user_stats: DEFAULT_USER_STATS_TABLE.to_string(),
            events: DEFAULT_EVENTS_TABLE.to_string(),
            leaderboards: DEFAULT_LEADERBOARDS_TABLE.to_string(),
        }
    }
}

// ─── LeaderboardConfig ────────────────────────────────────────────────────────

/// Freshness windows per view kind, in seconds, plus the entry cap.
///
/// These are design defaults, not hard constants — deployments tune them.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub global_freshness_secs: u64,
    pub category_freshness_secs: u64,
    pub weekly_freshness_secs: u64,
    /// Maximum entries retained per cached view.
    pub max_entries: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            global_freshness_secs: DEFAULT_GLOBAL_FRESHNESS_SECS,
            category_freshness_secs: DEFAULT_CATEGORY_FRESHNESS_SECS,
            weekly_freshness_secs: DEFAULT_WEEKLY_FRESHNESS_SECS,
            max_entries: DEFAULT_LEADERBOARD_SIZE,
        }
    }
}

// ─── ConflictRetryConfig ──────────────────────────────────────────────────────

/// Bounded retry for store transaction conflicts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConflictRetryConfig {
    /// Maximum commit attempts per record (including the first).
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on the delay between attempts, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the previous delay on each retry.
    pub multiplier: f64,
}

impl Default for ConflictRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 250,
            multiplier: 2.0,
        }
    }
}

impl ConflictRetryConfig {
    /// A config suitable for quick unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 1,
            multiplier: 1.0,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

// ─── EngineConfig ─────────────────────────────────────────────────────────────

/// Top-level configuration passed to the engine at construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub collections: CollectionConfig,
    pub leaderboard: LeaderboardConfig,
    pub conflict_retry: ConflictRetryConfig,
    /// Percentage thresholds that emit a milestone notification when crossed
    /// upward. Empty disables milestone notifications.
    pub milestones: Vec<u32>,
    /// How many recent completions a stats snapshot retains.
    pub recent_completions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collections: CollectionConfig::default(),
            leaderboard: LeaderboardConfig::default(),
            conflict_retry: ConflictRetryConfig::default(),
            milestones: vec![50],
            recent_completions: 5,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file; missing sections fall back to defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read engine config {}", path.display()))?;
        let config: EngineConfig =
            toml::from_str(&raw).with_context(|| format!("parse engine config {}", path.display()))?;
        Ok(config)
    }
}
