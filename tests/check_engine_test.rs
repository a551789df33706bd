//! Integration tests for the check engine: progress scenarios, state
//! machine edges, gating, cascades, and concurrency.

mod common;

use common::{questions_def, setup, streak_def};
use laurel::metrics::MetricField;
use laurel::model::{AchievementStatus, NotificationKind, Rarity, TriggerType};
use laurel::store::AchievementStore as _;

// ── Progress scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn partial_then_full_progress_completes_once() {
    let t = setup().await;
    t.ctx.catalog.create(questions_def("centurion", 100.0)).await.unwrap();

    // 40/100 → in progress, no completion.
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 40.0).await;
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.examined, 1);
    assert_eq!(result.deltas.len(), 1);
    let delta = &result.deltas[0];
    assert_eq!(delta.current_after, 40);
    assert_eq!(delta.percentage_after, 40);
    assert_eq!(delta.status_after, AchievementStatus::InProgress);
    assert!(result.completed.is_empty());

    // 100/100 → completed with exactly one completion notification.
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 100.0).await;
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.completed.len(), 1);
    assert_eq!(result.completed[0].achievement_id, "centurion");
    assert_eq!(result.completed[0].completion_count, 1);
    let completions: Vec<_> = result
        .notifications
        .iter()
        .filter(|n| n.kind == NotificationKind::Completed)
        .collect();
    assert_eq!(completions.len(), 1);

    let rec = t
        .ctx
        .engine
        .store()
        .get_user_achievement("u1", "centurion")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.status, AchievementStatus::Completed);
    assert_eq!(rec.progress.percentage, 100);
    assert!(rec.completed_at.is_some());
}

#[tokio::test]
async fn rechecking_with_unchanged_metrics_is_idempotent() {
    let t = setup().await;
    t.ctx.catalog.create(questions_def("centurion", 100.0)).await.unwrap();
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 40.0).await;

    let first = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(first.deltas.len(), 1);
    let stats_first = first.stats.unwrap();

    let second = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert!(second.deltas.is_empty(), "no progress delta on unchanged metrics");
    assert!(second.notifications.is_empty(), "no notification on unchanged metrics");
    let stats_second = second.stats.unwrap();
    assert_eq!(stats_second.xp, stats_first.xp);
    assert_eq!(stats_second.completed, stats_first.completed);
    assert_eq!(stats_second.in_progress, stats_first.in_progress);

    let all = t.ctx.notifications.list("u1", false, None).await.unwrap();
    assert!(all.is_empty(), "40% crosses no default milestone and completes nothing");
}

#[tokio::test]
async fn milestone_notification_on_upward_crossing_only() {
    let t = setup().await;
    t.ctx.catalog.create(questions_def("centurion", 100.0)).await.unwrap();

    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 40.0).await;
    t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();

    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 60.0).await;
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    let milestones: Vec<_> = result
        .notifications
        .iter()
        .filter(|n| n.kind == NotificationKind::Milestone)
        .collect();
    assert_eq!(milestones.len(), 1, "crossed 50% once");

    // Further progress below the next threshold emits nothing new.
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 70.0).await;
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert!(result.notifications.is_empty());
}

// ── State machine edges ──────────────────────────────────────────────────────

#[tokio::test]
async fn completed_never_regresses_for_non_repeatable() {
    let t = setup().await;
    t.ctx.catalog.create(questions_def("centurion", 100.0)).await.unwrap();
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 120.0).await;
    t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();

    // Metric regresses (e.g. data correction) — the completion stands.
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 10.0).await;
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.examined, 0, "completed non-repeatable is not a candidate");

    let rec = t
        .ctx
        .engine
        .store()
        .get_user_achievement("u1", "centurion")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.status, AchievementStatus::Completed);
    assert_eq!(rec.completion_count, 1);
}

#[tokio::test]
async fn repeatable_cycles_and_counts_completions() {
    let t = setup().await;
    t.ctx.catalog.create(streak_def("week_streak", 7.0)).await.unwrap();

    // Cycle 1.
    t.metrics.set("u1", MetricField::CurrentStreak, 7.0).await;
    let result = t.ctx.engine.streak_updated("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.completed.len(), 1);
    assert_eq!(result.completed[0].completion_count, 1);

    // Streak breaks → record reopens.
    t.metrics.set("u1", MetricField::CurrentStreak, 1.0).await;
    t.ctx.engine.streak_updated("u1", serde_json::json!({})).await.unwrap();
    let rec = t
        .ctx
        .engine
        .store()
        .get_user_achievement("u1", "week_streak")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.status, AchievementStatus::Available);
    assert_eq!(rec.completion_count, 1, "count survives the cycle");

    // Cycle 2.
    t.metrics.set("u1", MetricField::CurrentStreak, 7.0).await;
    let result = t.ctx.engine.streak_updated("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.completed.len(), 1);
    assert_eq!(result.completed[0].completion_count, 2);

    let completions = t
        .ctx
        .notifications
        .list("u1", false, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Completed)
        .count();
    assert_eq!(completions, 2, "one notification per completed cycle");
}

#[tokio::test]
async fn time_boxed_achievement_expires_after_window_end() {
    let t = setup().await;
    let def = questions_def("seasonal", 50.0);
    t.ctx.catalog.create(def.clone()).await.unwrap();

    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 10.0).await;
    t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();

    // Close the window retroactively.
    let mut ended = t.ctx.catalog.get("seasonal").await.unwrap();
    ended.ends_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
    t.ctx.catalog.update(ended).await.unwrap();

    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.examined, 0, "expired records are never examined");

    let rec = t
        .ctx
        .engine
        .store()
        .get_user_achievement("u1", "seasonal")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.status, AchievementStatus::Expired);
}

// ── Trigger gating ───────────────────────────────────────────────────────────

#[tokio::test]
async fn trigger_gating_skips_unmatched_event_types() {
    let t = setup().await;
    let mut def = questions_def("exam_related", 10.0);
    def.trigger = TriggerType::ExamCompletion;
    t.ctx.catalog.create(def).await.unwrap();
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 10.0).await;

    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.examined, 0, "exam-completion achievement ignores question events");

    let result = t.ctx.engine.exam_completed("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.examined, 1);
    assert_eq!(result.completed.len(), 1);
}

#[tokio::test]
async fn force_check_bypasses_gating() {
    let t = setup().await;
    let mut def = questions_def("hidden_manual", 10.0);
    def.trigger = TriggerType::Manual;
    t.ctx.catalog.create(def).await.unwrap();
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 10.0).await;

    // Manual achievements never match by event type...
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.examined, 0);

    // ...but an explicit force-check examines them.
    let result = t
        .ctx
        .engine
        .force_check("u1", vec!["hidden_manual".to_string()])
        .await
        .unwrap();
    assert_eq!(result.examined, 1);
    assert_eq!(result.completed.len(), 1);
}

#[tokio::test]
async fn sweep_checks_users_with_pending_records() {
    let t = setup().await;
    let mut def = questions_def("daily_grind", 5.0);
    def.trigger = TriggerType::DailyCheck;
    t.ctx.catalog.create(def).await.unwrap();

    t.ctx.engine.initialize_user("u1").await.unwrap();
    t.ctx.engine.initialize_user("u2").await.unwrap();
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 5.0).await;

    let results = t.ctx.engine.run_sweep(TriggerType::DailyCheck).await.unwrap();
    assert_eq!(results.len(), 2, "both users hold pending daily records");
    let completed_users: Vec<&str> = results
        .iter()
        .filter(|r| !r.completed.is_empty())
        .map(|r| r.user_id.as_str())
        .collect();
    assert_eq!(completed_users, vec!["u1"]);

    // Non-sweep triggers are refused politely.
    let none = t.ctx.engine.run_sweep(TriggerType::Immediate).await.unwrap();
    assert!(none.is_empty());
}

// ── Prerequisite cascade ─────────────────────────────────────────────────────

#[tokio::test]
async fn completing_prerequisite_unlocks_dependent_once() {
    let t = setup().await;
    t.ctx.catalog.create(questions_def("first_steps", 10.0)).await.unwrap();
    let mut gated = questions_def("long_road", 1000.0);
    gated.prerequisites = vec!["first_steps".to_string()];
    t.ctx.catalog.create(gated).await.unwrap();

    // Before the prerequisite completes, the dependent is locked.
    t.ctx.engine.initialize_user("u1").await.unwrap();
    let rec = t
        .ctx
        .engine
        .store()
        .get_user_achievement("u1", "long_road")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.status, AchievementStatus::Locked);

    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 10.0).await;
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.completed.len(), 1);
    assert_eq!(result.unlocked.len(), 1);
    assert_eq!(result.unlocked[0].achievement_id, "long_road");

    let rec = t
        .ctx
        .engine
        .store()
        .get_user_achievement("u1", "long_road")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.status, AchievementStatus::Available);

    let unlock_notifications = t
        .ctx
        .notifications
        .list("u1", false, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Unlocked && n.achievement_id == "long_road")
        .count();
    assert_eq!(unlock_notifications, 1, "exactly one unlock notification");

    // Re-running the pass unlocks nothing further.
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert!(result.unlocked.is_empty());
}

#[tokio::test]
async fn deep_chains_unlock_one_level_per_pass() {
    let t = setup().await;
    t.ctx.catalog.create(questions_def("a", 10.0)).await.unwrap();
    let mut b = questions_def("b", 10.0);
    b.prerequisites = vec!["a".to_string()];
    t.ctx.catalog.create(b).await.unwrap();
    let mut c = questions_def("c", 10.0);
    c.prerequisites = vec!["b".to_string()];
    t.ctx.catalog.create(c).await.unwrap();

    // One pass completes a AND the now-available b will only complete on the
    // next pass; c stays locked until b completes.
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 10.0).await;
    let first = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(first.completed.len(), 1);
    assert_eq!(first.unlocked.len(), 1);
    assert_eq!(first.unlocked[0].achievement_id, "b");

    let second = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(second.completed.len(), 1, "b completes on the next pass");
    assert_eq!(second.unlocked.len(), 1);
    assert_eq!(second.unlocked[0].achievement_id, "c");
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_passes_commit_exactly_one_completion() {
    let t = setup().await;
    t.ctx.catalog.create(questions_def("centurion", 100.0)).await.unwrap();
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 100.0).await;

    let engine_a = t.ctx.engine.clone();
    let engine_b = t.ctx.engine.clone();
    let (ra, rb) = tokio::join!(
        engine_a.question_answered("u1", serde_json::json!({})),
        engine_b.streak_updated("u1", serde_json::json!({})),
    );
    ra.unwrap();
    rb.unwrap();

    let rec = t
        .ctx
        .engine
        .store()
        .get_user_achievement("u1", "centurion")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.completion_count, 1, "exactly one completion transition");

    let completions = t
        .ctx
        .notifications
        .list("u1", false, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Completed)
        .count();
    assert_eq!(completions, 1, "exactly one completion notification");
}

// ── Failure tolerance ────────────────────────────────────────────────────────

#[tokio::test]
async fn metric_provider_failure_degrades_to_zero() {
    use laurel::config::{ConflictRetryConfig, EngineConfig};
    use laurel::metrics::{FailingMetrics, MetricProvider};
    use laurel::store::{AchievementStore, SqliteStore};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn AchievementStore> = Arc::new(SqliteStore::open(dir.path()).await.unwrap());
    let provider: Arc<dyn MetricProvider> = Arc::new(FailingMetrics);
    let ctx = laurel::EngineContext::new(
        store,
        provider,
        EngineConfig {
            conflict_retry: ConflictRetryConfig::instant(),
            ..EngineConfig::default()
        },
    );

    ctx.catalog.create(questions_def("centurion", 100.0)).await.unwrap();
    let result = ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    assert_eq!(result.examined, 1, "the pass still runs");
    assert!(result.deltas.is_empty(), "all metrics read as zero");
    assert!(result.completed.is_empty());
}

#[tokio::test]
async fn rewards_collection_flow() {
    let t = setup().await;
    t.ctx.catalog.create(questions_def("centurion", 100.0)).await.unwrap();
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 100.0).await;
    t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();

    let rec = t.ctx.engine.collect_rewards("u1", "centurion").await.unwrap();
    assert!(rec.rewards_collected);
    assert!(rec.rewards_collected_at.is_some());

    // Collecting twice is a no-op, not an error.
    let again = t.ctx.engine.collect_rewards("u1", "centurion").await.unwrap();
    assert_eq!(again.revision, rec.revision);

    // Collecting on a never-completed achievement is refused.
    t.ctx.catalog.create(questions_def("unfinished", 999.0)).await.unwrap();
    t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    let err = t.ctx.engine.collect_rewards("u1", "unfinished").await.unwrap_err();
    assert!(matches!(err, laurel::EngineError::RewardsNotEarned { .. }));
}

#[tokio::test]
async fn completion_of_rare_tier_is_important() {
    let t = setup().await;
    let mut def = questions_def("legend", 10.0);
    def.rarity = Rarity::Legendary;
    t.ctx.catalog.create(def).await.unwrap();
    t.metrics.set("u1", MetricField::TotalQuestionsAnswered, 10.0).await;
    let result = t.ctx.engine.question_answered("u1", serde_json::json!({})).await.unwrap();
    let n = result
        .notifications
        .iter()
        .find(|n| n.kind == NotificationKind::Completed)
        .unwrap();
    assert!(n.important, "legendary completions are flagged important");
}
