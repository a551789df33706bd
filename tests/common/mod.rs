//! Shared fixtures for the integration tests: a tempdir-backed SQLite store
//! wired to an in-memory metric provider.

use std::sync::Arc;

use laurel::config::{ConflictRetryConfig, EngineConfig};
use laurel::metrics::{MetricProvider, StaticMetrics};
use laurel::model::{
    AchievementCondition, AchievementDefinition, Category, ConditionKind, Rarity, Reward,
    TriggerType,
};
use laurel::store::{AchievementStore, SqliteStore};
use laurel::EngineContext;

pub struct TestCtx {
    /// Held so the on-disk database outlives the test body.
    #[allow(dead_code)]
    pub dir: tempfile::TempDir,
    pub ctx: EngineContext,
    pub metrics: Arc<StaticMetrics>,
}

pub async fn setup() -> TestCtx {
    setup_with_config(EngineConfig {
        conflict_retry: ConflictRetryConfig::instant(),
        ..EngineConfig::default()
    })
    .await
}

#[allow(dead_code)]
pub async fn setup_with_config(config: EngineConfig) -> TestCtx {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn AchievementStore> =
        Arc::new(SqliteStore::open(dir.path()).await.unwrap());
    let metrics = Arc::new(StaticMetrics::new());
    let provider: Arc<dyn MetricProvider> = metrics.clone();
    let ctx = EngineContext::new(store, provider, config);
    TestCtx { dir, ctx, metrics }
}

/// An always-active immediate achievement over one Count condition.
#[allow(dead_code)]
pub fn questions_def(id: &str, target: f64) -> AchievementDefinition {
    AchievementDefinition::new(
        id,
        format!("Answer {target} questions"),
        Category::StudyVolume,
        Rarity::Common,
        TriggerType::Immediate,
        vec![AchievementCondition::new(
            ConditionKind::Count,
            "totalQuestionsAnswered",
            target,
        )],
        vec![Reward::Xp(100)],
    )
}

/// A repeatable streak achievement.
#[allow(dead_code)]
pub fn streak_def(id: &str, days: f64) -> AchievementDefinition {
    let mut def = AchievementDefinition::new(
        id,
        format!("{days}-day streak"),
        Category::StudyStreak,
        Rarity::Uncommon,
        TriggerType::Immediate,
        vec![AchievementCondition::new(
            ConditionKind::Streak,
            "currentStreak",
            days,
        )],
        vec![Reward::Points(50)],
    );
    def.repeatable = true;
    def
}
