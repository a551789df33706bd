// SPDX-License-Identifier: MIT
//! Check engine — one evaluation pass per inbound event.
//!
//! A pass: snapshot metrics → lazily initialize missing records → expire
//! overdue ones → evaluate each candidate and commit its transition
//! (revision-guarded, bounded conflict retry) → resolve one level of
//! prerequisite unlocks → refresh the user's stats. Failures on a single
//! achievement never abort the pass; failures reaching the store itself do.

pub mod cascade;
pub mod evaluator;
pub mod progress;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, StoreError};
use crate::metrics::{MetricProvider, MetricSnapshot};
use crate::model::{
    event_kind, event_type, AchievementDefinition, AchievementStatus, CheckEvent, CheckResult,
    CompletedAchievement, EventLogEntry, ProgressDelta, TriggerType, UserAchievement, UserStats,
};
use crate::notify;
use crate::retry::retry_on_conflict;
use crate::stats::StatsAggregator;
use crate::store::{AchievementStore, CheckUpdate};

/// Whether an achievement with `trigger` is examined for `event_type`.
///
/// Immediate achievements are always examined; `Manual` only via an
/// explicit force-check list (which bypasses this function entirely).
fn trigger_matches(trigger: TriggerType, event: &str) -> bool {
    match trigger {
        TriggerType::Immediate => true,
        TriggerType::SessionEnd => event == event_type::SESSION_END,
        TriggerType::ExamCompletion => event == event_type::EXAM_COMPLETED,
        TriggerType::DailyCheck => event == event_type::DAILY_CHECK,
        TriggerType::WeeklyCheck => event == event_type::WEEKLY_CHECK,
        TriggerType::MonthlyCheck => event == event_type::MONTHLY_CHECK,
        TriggerType::Manual => false,
    }
}

fn sweep_event_type(trigger: TriggerType) -> Option<&'static str> {
    match trigger {
        TriggerType::DailyCheck => Some(event_type::DAILY_CHECK),
        TriggerType::WeeklyCheck => Some(event_type::WEEKLY_CHECK),
        TriggerType::MonthlyCheck => Some(event_type::MONTHLY_CHECK),
        _ => None,
    }
}

struct StepOutcome {
    before: UserAchievement,
    after: UserAchievement,
    notifications: Vec<crate::model::Notification>,
}

/// The orchestrator. Cheap to clone; all state lives behind the store.
#[derive(Clone)]
pub struct CheckEngine {
    store: Arc<dyn AchievementStore>,
    metrics: Arc<dyn MetricProvider>,
    stats: StatsAggregator,
    config: EngineConfig,
}

impl CheckEngine {
    pub fn new(
        store: Arc<dyn AchievementStore>,
        metrics: Arc<dyn MetricProvider>,
        config: EngineConfig,
    ) -> Self {
        let stats = StatsAggregator::new(Arc::clone(&store), config.recent_completions);
        Self {
            store,
            metrics,
            stats,
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn AchievementStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─── Event entry points ───────────────────────────────────────────────────

    pub async fn question_answered(
        &self,
        user_id: &str,
        payload: serde_json::Value,
    ) -> Result<CheckResult, EngineError> {
        self.check(
            &CheckEvent::new(user_id, event_type::QUESTION_ANSWERED, "session_tracker")
                .with_payload(payload),
        )
        .await
    }

    pub async fn exam_completed(
        &self,
        user_id: &str,
        payload: serde_json::Value,
    ) -> Result<CheckResult, EngineError> {
        self.check(
            &CheckEvent::new(user_id, event_type::EXAM_COMPLETED, "exam_grader")
                .with_payload(payload),
        )
        .await
    }

    pub async fn streak_updated(
        &self,
        user_id: &str,
        payload: serde_json::Value,
    ) -> Result<CheckResult, EngineError> {
        self.check(
            &CheckEvent::new(user_id, event_type::STREAK_UPDATED, "streak_tracker")
                .with_payload(payload),
        )
        .await
    }

    pub async fn study_milestone(
        &self,
        user_id: &str,
        payload: serde_json::Value,
    ) -> Result<CheckResult, EngineError> {
        self.check(
            &CheckEvent::new(user_id, event_type::STUDY_MILESTONE, "study_tracker")
                .with_payload(payload),
        )
        .await
    }

    /// Manual force-check of an explicit achievement id list.
    pub async fn force_check(
        &self,
        user_id: &str,
        achievement_ids: Vec<String>,
    ) -> Result<CheckResult, EngineError> {
        self.check(&CheckEvent::forced(user_id, achievement_ids)).await
    }

    /// Scheduled sweep: one check pass per user holding pending records of
    /// the given trigger type. Per-user failures are logged and skipped.
    pub async fn run_sweep(&self, trigger: TriggerType) -> Result<Vec<CheckResult>, EngineError> {
        let Some(event) = sweep_event_type(trigger) else {
            warn!(trigger = trigger.as_str(), "not a sweep trigger type");
            return Ok(Vec::new());
        };
        let users = self.store.list_users_with_pending(trigger).await?;
        let mut results = Vec::with_capacity(users.len());
        for user_id in users {
            match self.check(&CheckEvent::new(&user_id, event, "scheduler")).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(user_id = %user_id, err = %e, "sweep check failed for user, continuing")
                }
            }
        }
        Ok(results)
    }

    // ─── Record lifecycle ─────────────────────────────────────────────────────

    /// Create records for every active definition the user does not have yet
    /// (onboarding). Returns how many were created.
    pub async fn initialize_user(&self, user_id: &str) -> Result<u32, EngineError> {
        let definitions = self.store.list_definitions().await?;
        let mut records = self.load_records(user_id).await?;
        let before = records.len();
        self.ensure_records(user_id, &definitions, &mut records, Utc::now())
            .await?;
        Ok((records.len() - before) as u32)
    }

    /// Flip a completed record's pending rewards to collected.
    pub async fn collect_rewards(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> Result<UserAchievement, EngineError> {
        let store = self.store.as_ref();
        retry_on_conflict(
            &self.config.conflict_retry,
            user_id,
            achievement_id,
            move || async move {
                let Some(rec) = store.get_user_achievement(user_id, achievement_id).await? else {
                    return Err(EngineError::Store(StoreError::NotFound {
                        what: format!("user achievement ({user_id}, {achievement_id})"),
                    }));
                };
                if rec.completion_count == 0 {
                    return Err(EngineError::RewardsNotEarned {
                        user_id: user_id.to_string(),
                        achievement_id: achievement_id.to_string(),
                    });
                }
                if rec.rewards_collected {
                    return Ok(rec);
                }
                let mut updated = rec.clone();
                updated.collect_rewards();
                updated.revision = rec.revision + 1;
                store
                    .commit_check_update(&CheckUpdate::record_only(
                        updated.clone(),
                        Some(rec.revision),
                    ))
                    .await?;
                Ok(updated)
            },
        )
        .await
    }

    /// Set the display name surfaced on leaderboards.
    pub async fn set_display_name(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<(), EngineError> {
        let mut stats = self
            .store
            .get_user_stats(user_id)
            .await?
            .unwrap_or_else(|| UserStats::empty(user_id));
        stats.display_name = Some(display_name.to_string());
        stats.updated_at = Utc::now();
        self.store.put_user_stats(&stats).await?;
        Ok(())
    }

    // ─── The check pass ───────────────────────────────────────────────────────

    pub async fn check(&self, event: &CheckEvent) -> Result<CheckResult, EngineError> {
        let started = Instant::now();
        let user_id = event.user_id.clone();
        debug!(user_id = %user_id, event_type = %event.event_type, forced = event.is_forced(), "check pass started");

        let metrics = match self.metrics.snapshot(&user_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(user_id = %user_id, err = %e, "metric provider failed, evaluating with empty snapshot");
                MetricSnapshot::new()
            }
        };

        let definitions = self.store.list_definitions().await?;
        let mut records = self.load_records(&user_id).await?;
        let now = Utc::now();
        self.ensure_records(&user_id, &definitions, &mut records, now)
            .await?;
        self.expire_overdue(&user_id, &definitions, &mut records, now)
            .await;

        let mut result = CheckResult::empty(&user_id);

        for def in &definitions {
            let Some(rec) = records.get(&def.id) else { continue };
            if event.is_forced() {
                if !event.force_achievement_ids.contains(&def.id) {
                    continue;
                }
            } else if !def.active || !trigger_matches(def.trigger, &event.event_type) {
                continue;
            }
            if !def.window_open(now) || def.window_ended(now) {
                continue;
            }
            let eligible = match rec.status {
                AchievementStatus::Available | AchievementStatus::InProgress => true,
                AchievementStatus::Completed => def.allows_another_completion(rec.completion_count),
                AchievementStatus::Locked | AchievementStatus::Expired => false,
            };
            if !eligible {
                continue;
            }

            result.examined += 1;
            let store = self.store.as_ref();
            let config = &self.config;
            let metrics_ref = &metrics;
            let step = retry_on_conflict(
                &config.conflict_retry,
                &user_id,
                &def.id,
                move || attempt_step(store, config, event, def, metrics_ref),
            )
            .await;

            match step {
                Ok(Some(outcome)) => {
                    result.deltas.push(ProgressDelta {
                        achievement_id: def.id.clone(),
                        current_before: outcome.before.progress.current,
                        current_after: outcome.after.progress.current,
                        percentage_before: outcome.before.progress.percentage,
                        percentage_after: outcome.after.progress.percentage,
                        status_before: outcome.before.status,
                        status_after: outcome.after.status,
                    });
                    if outcome.after.status == AchievementStatus::Completed
                        && outcome.before.status != AchievementStatus::Completed
                    {
                        result.completed.push(CompletedAchievement {
                            achievement_id: def.id.clone(),
                            name: def.name.clone(),
                            rarity: outcome.after.snapshot.rarity,
                            rewards: outcome.after.snapshot.rewards.clone(),
                            completion_count: outcome.after.completion_count,
                        });
                    }
                    result.notifications.extend(outcome.notifications);
                    records.insert(def.id.clone(), outcome.after);
                }
                Ok(None) => {}
                Err(e) => {
                    // Partial-failure semantics: skip this achievement, keep
                    // going with the rest of the pass.
                    warn!(
                        user_id = %user_id,
                        achievement_id = %def.id,
                        err = %e,
                        "achievement evaluation failed, continuing pass"
                    );
                }
            }
        }

        if !result.completed.is_empty() {
            let completed_ids: Vec<String> = result
                .completed
                .iter()
                .map(|c| c.achievement_id.clone())
                .collect();
            let (unlocked, notifications) = cascade::resolve_unlocks(
                self.store.as_ref(),
                &user_id,
                &completed_ids,
                &definitions,
                &mut records,
            )
            .await?;
            result.unlocked = unlocked;
            result.notifications.extend(notifications);
        }

        match self.stats.recompute(&user_id).await {
            Ok(stats) => result.stats = Some(stats),
            Err(e) => warn!(user_id = %user_id, err = %e, "stats recompute failed"),
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        result.timestamp = Utc::now();
        info!(
            user_id = %user_id,
            examined = result.examined,
            completed = result.completed.len(),
            unlocked = result.unlocked.len(),
            duration_ms = result.duration_ms,
            "check pass finished"
        );
        Ok(result)
    }

    async fn load_records(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, UserAchievement>, EngineError> {
        Ok(self
            .store
            .list_user_achievements(user_id)
            .await?
            .into_iter()
            .map(|r| (r.achievement_id.clone(), r))
            .collect())
    }

    /// Lazily create records for active, window-open definitions.
    async fn ensure_records(
        &self,
        user_id: &str,
        definitions: &[AchievementDefinition],
        records: &mut HashMap<String, UserAchievement>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        for def in definitions {
            if !def.active
                || records.contains_key(&def.id)
                || !def.window_open(now)
                || def.window_ended(now)
            {
                continue;
            }
            let met = cascade::prerequisites_met(def, records);
            let record = UserAchievement::initialize(user_id, def, met);
            if self.store.insert_user_achievement(&record).await? {
                records.insert(def.id.clone(), record);
            } else if let Some(existing) =
                self.store.get_user_achievement(user_id, &def.id).await?
            {
                // Raced with a concurrent pass; adopt its row.
                records.insert(def.id.clone(), existing);
            }
        }
        Ok(())
    }

    /// Move non-completed records past their window end to `Expired`.
    /// Best-effort: a conflict means another pass already expired the row.
    async fn expire_overdue(
        &self,
        user_id: &str,
        definitions: &[AchievementDefinition],
        records: &mut HashMap<String, UserAchievement>,
        now: DateTime<Utc>,
    ) {
        for def in definitions {
            if !def.window_ended(now) {
                continue;
            }
            let Some(rec) = records.get(&def.id) else { continue };
            if matches!(
                rec.status,
                AchievementStatus::Completed | AchievementStatus::Expired
            ) {
                continue;
            }
            let mut expired = rec.clone();
            expired.status = AchievementStatus::Expired;
            expired.last_updated_at = now;
            expired.revision = rec.revision + 1;
            let update = CheckUpdate {
                record: expired.clone(),
                expected_revision: Some(rec.revision),
                notifications: Vec::new(),
                event: Some(EventLogEntry::new(
                    user_id,
                    Some(def.id.clone()),
                    event_kind::EXPIRED,
                    serde_json::json!({ "endedAt": def.ends_at }),
                )),
            };
            match self.store.commit_check_update(&update).await {
                Ok(()) => {
                    records.insert(def.id.clone(), expired);
                }
                Err(e) => {
                    warn!(user_id, achievement_id = %def.id, err = %e, "expiry commit failed");
                }
            }
        }
    }
}

/// One evaluate-and-commit attempt against the freshest record state.
async fn attempt_step(
    store: &dyn AchievementStore,
    config: &EngineConfig,
    event: &CheckEvent,
    def: &AchievementDefinition,
    metrics: &MetricSnapshot,
) -> Result<Option<StepOutcome>, EngineError> {
    let user_id = &event.user_id;
    let Some(rec) = store.get_user_achievement(user_id, &def.id).await? else {
        return Ok(None); // erased mid-pass
    };
    match rec.status {
        AchievementStatus::Locked | AchievementStatus::Expired => return Ok(None),
        AchievementStatus::Completed if !def.allows_another_completion(rec.completion_count) => {
            return Ok(None)
        }
        _ => {}
    }

    let now = Utc::now();
    let new_progress = progress::calculate(user_id, def, metrics);

    let mut updated = rec.clone();
    updated.progress = new_progress;
    let mut notifications = Vec::new();
    let mut event_entry = None;

    match rec.status {
        AchievementStatus::Completed => {
            // Repeatable cycle re-entry: once the metric falls below target
            // again, the record reopens for its next completion.
            if new_progress.percentage < 100 {
                updated.status = AchievementStatus::Available;
            }
        }
        AchievementStatus::Available | AchievementStatus::InProgress => {
            if new_progress.percentage >= 100 {
                updated.status = AchievementStatus::Completed;
                updated.completion_count = rec.completion_count + 1;
                updated.completed_at = Some(now);
                updated.rewards_collected = false;
                updated.rewards_collected_at = None;
                notifications.push(notify::completion_notification(&updated));
                event_entry = Some(EventLogEntry::new(
                    user_id.clone(),
                    Some(def.id.clone()),
                    event_kind::COMPLETED,
                    serde_json::json!({
                        "eventType": event.event_type,
                        "source": event.source,
                        "completionCount": updated.completion_count,
                    }),
                ));
            } else {
                if rec.status == AchievementStatus::Available && new_progress.current > 0 {
                    updated.status = AchievementStatus::InProgress;
                }
                for &threshold in &config.milestones {
                    if rec.progress.percentage < threshold
                        && new_progress.percentage >= threshold
                    {
                        notifications.push(notify::milestone_notification(&updated, threshold));
                    }
                }
            }
        }
        AchievementStatus::Locked | AchievementStatus::Expired => {}
    }

    // Idempotency: an unchanged record writes nothing and notifies no one.
    let unchanged = updated.status == rec.status
        && updated.progress.current == rec.progress.current
        && updated.progress.percentage == rec.progress.percentage;
    if unchanged {
        return Ok(None);
    }

    updated.last_updated_at = now;
    updated.revision = rec.revision + 1;

    store
        .commit_check_update(&CheckUpdate {
            record: updated.clone(),
            expected_revision: Some(rec.revision),
            notifications: notifications.clone(),
            event: event_entry,
        })
        .await?;

    Ok(Some(StepOutcome {
        before: rec,
        after: updated,
        notifications,
    }))
}
