//! SQLite adapter for the storage port — WAL mode, crash-safe, bootstrapped
//! with idempotent `CREATE TABLE IF NOT EXISTS` statements on open.
//!
//! Conditions, rewards, snapshots, and stats payloads live in JSON columns;
//! classification enums and timestamps are stored as TEXT (RFC 3339).
//! Concurrency control is optimistic: every user-achievement row carries a
//! `revision` counter and the check-update transaction only applies when the
//! revision it read is still current.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

use crate::config::CollectionConfig;
use crate::error::StoreError;
use crate::model::{
    AchievementDefinition, AchievementStatus, Category, EventLogEntry, LeaderboardView,
    Notification, NotificationKind, Progress, Rarity, TriggerType, UserAchievement, UserStats,
};

use super::{AchievementStore, CheckUpdate, ErasureReport};

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from stalling a check pass indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Backend(anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        ))),
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::Error::new(e))
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(anyhow!("bad timestamp {s}: {e}")))
}

fn parse_opt_ts(s: &Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.as_deref().map(parse_ts).transpose()
}

// ─── Row types ────────────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct DefinitionRow {
    id: String,
    name: String,
    description: String,
    category: String,
    rarity: String,
    trigger_type: String,
    conditions: String,
    rewards: String,
    hidden: bool,
    repeatable: bool,
    max_completions: Option<i64>,
    prerequisites: String,
    starts_at: Option<String>,
    ends_at: Option<String>,
    tags: String,
    active: bool,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl DefinitionRow {
    fn into_model(self) -> Result<AchievementDefinition, StoreError> {
        Ok(AchievementDefinition {
            category: Category::parse(&self.category)
                .ok_or_else(|| StoreError::Backend(anyhow!("unknown category {}", self.category)))?,
            rarity: Rarity::parse(&self.rarity)
                .ok_or_else(|| StoreError::Backend(anyhow!("unknown rarity {}", self.rarity)))?,
            trigger: TriggerType::parse(&self.trigger_type).ok_or_else(|| {
                StoreError::Backend(anyhow!("unknown trigger type {}", self.trigger_type))
            })?,
            conditions: serde_json::from_str(&self.conditions)?,
            rewards: serde_json::from_str(&self.rewards)?,
            prerequisites: serde_json::from_str(&self.prerequisites)?,
            tags: serde_json::from_str(&self.tags)?,
            starts_at: parse_opt_ts(&self.starts_at)?,
            ends_at: parse_opt_ts(&self.ends_at)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            max_completions: self.max_completions.map(|v| v as u32),
            version: self.version as u32,
            id: self.id,
            name: self.name,
            description: self.description,
            hidden: self.hidden,
            repeatable: self.repeatable,
            active: self.active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserAchievementRow {
    user_id: String,
    achievement_id: String,
    status: String,
    current_value: i64,
    target_value: i64,
    percentage: i64,
    progress_updated_at: String,
    completion_count: i64,
    completed_at: Option<String>,
    rewards_collected: bool,
    rewards_collected_at: Option<String>,
    snapshot: String,
    first_seen_at: String,
    last_updated_at: String,
    revision: i64,
}

impl UserAchievementRow {
    fn into_model(self) -> Result<UserAchievement, StoreError> {
        Ok(UserAchievement {
            status: AchievementStatus::parse(&self.status)
                .ok_or_else(|| StoreError::Backend(anyhow!("unknown status {}", self.status)))?,
            progress: Progress {
                current: self.current_value,
                target: self.target_value,
                percentage: self.percentage as u32,
                last_updated: parse_ts(&self.progress_updated_at)?,
            },
            completed_at: parse_opt_ts(&self.completed_at)?,
            rewards_collected_at: parse_opt_ts(&self.rewards_collected_at)?,
            snapshot: serde_json::from_str(&self.snapshot)?,
            first_seen_at: parse_ts(&self.first_seen_at)?,
            last_updated_at: parse_ts(&self.last_updated_at)?,
            completion_count: self.completion_count as u32,
            revision: self.revision as u64,
            user_id: self.user_id,
            achievement_id: self.achievement_id,
            rewards_collected: self.rewards_collected,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    achievement_id: String,
    kind: String,
    title: String,
    message: String,
    important: bool,
    is_read: bool,
    read_at: Option<String>,
    snapshot: Option<String>,
    created_at: String,
}

impl NotificationRow {
    fn into_model(self) -> Result<Notification, StoreError> {
        Ok(Notification {
            kind: NotificationKind::parse(&self.kind)
                .ok_or_else(|| StoreError::Backend(anyhow!("unknown notification kind {}", self.kind)))?,
            read_at: parse_opt_ts(&self.read_at)?,
            snapshot: self
                .snapshot
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: parse_ts(&self.created_at)?,
            id: self.id,
            user_id: self.user_id,
            achievement_id: self.achievement_id,
            title: self.title,
            message: self.message,
            important: self.important,
            read: self.is_read,
        })
    }
}

// ─── Store ────────────────────────────────────────────────────────────────────

/// SQLite-backed [`AchievementStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    tables: CollectionConfig,
}

impl SqliteStore {
    /// Open (or create) `laurel.db` under `data_dir` with default table names.
    pub async fn open(data_dir: &Path) -> Result<Self, StoreError> {
        Self::open_with(data_dir, CollectionConfig::default()).await
    }

    pub async fn open_with(
        data_dir: &Path,
        tables: CollectionConfig,
    ) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| StoreError::Backend(anyhow!("create data dir: {e}")))?;
        let db_path = data_dir.join("laurel.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))
                .map_err(backend)?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.map_err(backend)?;
        let store = Self { pool, tables };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn bootstrap(&self) -> Result<(), StoreError> {
        let t = &self.tables;
        let stmts = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    description     TEXT NOT NULL DEFAULT '',
                    category        TEXT NOT NULL,
                    rarity          TEXT NOT NULL,
                    trigger_type    TEXT NOT NULL,
                    conditions      TEXT NOT NULL,
                    rewards         TEXT NOT NULL,
                    hidden          INTEGER NOT NULL DEFAULT 0,
                    repeatable      INTEGER NOT NULL DEFAULT 0,
                    max_completions INTEGER,
                    prerequisites   TEXT NOT NULL DEFAULT '[]',
                    starts_at       TEXT,
                    ends_at         TEXT,
                    tags            TEXT NOT NULL DEFAULT '[]',
                    active          INTEGER NOT NULL DEFAULT 1,
                    version         INTEGER NOT NULL DEFAULT 1,
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                )",
                t.definitions
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    user_id              TEXT NOT NULL,
                    achievement_id       TEXT NOT NULL,
                    status               TEXT NOT NULL,
                    current_value        INTEGER NOT NULL DEFAULT 0,
                    target_value         INTEGER NOT NULL DEFAULT 0,
                    percentage           INTEGER NOT NULL DEFAULT 0,
                    progress_updated_at  TEXT NOT NULL,
                    completion_count     INTEGER NOT NULL DEFAULT 0,
                    completed_at         TEXT,
                    rewards_collected    INTEGER NOT NULL DEFAULT 0,
                    rewards_collected_at TEXT,
                    snapshot             TEXT NOT NULL,
                    first_seen_at        TEXT NOT NULL,
                    last_updated_at      TEXT NOT NULL,
                    revision             INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (user_id, achievement_id)
                )",
                t.user_achievements
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_achievement ON {0} (achievement_id)",
                t.user_achievements
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id             TEXT PRIMARY KEY,
                    user_id        TEXT NOT NULL,
                    achievement_id TEXT NOT NULL,
                    kind           TEXT NOT NULL,
                    title          TEXT NOT NULL,
                    message        TEXT NOT NULL,
                    important      INTEGER NOT NULL DEFAULT 0,
                    is_read        INTEGER NOT NULL DEFAULT 0,
                    read_at        TEXT,
                    snapshot       TEXT,
                    created_at     TEXT NOT NULL
                )",
                t.notifications
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_user_read ON {0} (user_id, is_read, created_at)",
                t.notifications
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    user_id    TEXT PRIMARY KEY,
                    payload    TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                t.user_stats
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id           TEXT PRIMARY KEY,
                    payload      TEXT NOT NULL,
                    last_updated TEXT NOT NULL
                )",
                t.leaderboards
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id             TEXT PRIMARY KEY,
                    user_id        TEXT NOT NULL,
                    achievement_id TEXT,
                    kind           TEXT NOT NULL,
                    payload        TEXT NOT NULL,
                    created_at     TEXT NOT NULL
                )",
                t.events
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_user ON {0} (user_id, created_at)",
                t.events
            ),
        ];
        for stmt in &stmts {
            sqlx::query(stmt).execute(&self.pool).await.map_err(backend)?;
        }
        Ok(())
    }
}

#[async_trait]
impl AchievementStore for SqliteStore {
    // ─── Catalog ──────────────────────────────────────────────────────────────

    async fn insert_definition(&self, def: &AchievementDefinition) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, name, description, category, rarity, trigger_type,
                conditions, rewards, hidden, repeatable, max_completions, prerequisites,
                starts_at, ends_at, tags, active, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.definitions
        );
        sqlx::query(&sql)
            .bind(&def.id)
            .bind(&def.name)
            .bind(&def.description)
            .bind(def.category.as_str())
            .bind(def.rarity.as_str())
            .bind(def.trigger.as_str())
            .bind(serde_json::to_string(&def.conditions)?)
            .bind(serde_json::to_string(&def.rewards)?)
            .bind(def.hidden)
            .bind(def.repeatable)
            .bind(def.max_completions.map(|v| v as i64))
            .bind(serde_json::to_string(&def.prerequisites)?)
            .bind(def.starts_at.map(|t| t.to_rfc3339()))
            .bind(def.ends_at.map(|t| t.to_rfc3339()))
            .bind(serde_json::to_string(&def.tags)?)
            .bind(def.active)
            .bind(def.version as i64)
            .bind(def.created_at.to_rfc3339())
            .bind(def.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_definition(&self, id: &str) -> Result<Option<AchievementDefinition>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", self.tables.definitions);
        let row: Option<DefinitionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(DefinitionRow::into_model).transpose()
    }

    async fn list_definitions(&self) -> Result<Vec<AchievementDefinition>, StoreError> {
        let sql = format!("SELECT * FROM {} ORDER BY id", self.tables.definitions);
        with_timeout(async {
            let rows: Vec<DefinitionRow> = sqlx::query_as(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
            rows.into_iter().map(DefinitionRow::into_model).collect()
        })
        .await
    }

    async fn update_definition(&self, def: &AchievementDefinition) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET name = ?, description = ?, category = ?, rarity = ?,
                trigger_type = ?, conditions = ?, rewards = ?, hidden = ?, repeatable = ?,
                max_completions = ?, prerequisites = ?, starts_at = ?, ends_at = ?,
                tags = ?, active = ?, version = ?, updated_at = ?
             WHERE id = ?",
            self.tables.definitions
        );
        let result = sqlx::query(&sql)
            .bind(&def.name)
            .bind(&def.description)
            .bind(def.category.as_str())
            .bind(def.rarity.as_str())
            .bind(def.trigger.as_str())
            .bind(serde_json::to_string(&def.conditions)?)
            .bind(serde_json::to_string(&def.rewards)?)
            .bind(def.hidden)
            .bind(def.repeatable)
            .bind(def.max_completions.map(|v| v as i64))
            .bind(serde_json::to_string(&def.prerequisites)?)
            .bind(def.starts_at.map(|t| t.to_rfc3339()))
            .bind(def.ends_at.map(|t| t.to_rfc3339()))
            .bind(serde_json::to_string(&def.tags)?)
            .bind(def.active)
            .bind(def.version as i64)
            .bind(def.updated_at.to_rfc3339())
            .bind(&def.id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                what: format!("definition {}", def.id),
            });
        }
        Ok(())
    }

    async fn delete_definition(&self, id: &str) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.tables.definitions);
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                what: format!("definition {id}"),
            });
        }
        Ok(())
    }

    async fn count_dependent_records(&self, id: &str) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE achievement_id = ?",
            self.tables.user_achievements
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count as u64)
    }

    async fn delete_dependent_records(&self, id: &str) -> Result<u64, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE achievement_id = ?",
            self.tables.user_achievements
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }

    // ─── User achievement records ─────────────────────────────────────────────

    async fn get_user_achievement(
        &self,
        user_id: &str,
        achievement_id: &str,
    ) -> Result<Option<UserAchievement>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE user_id = ? AND achievement_id = ?",
            self.tables.user_achievements
        );
        let row: Option<UserAchievementRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(achievement_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(UserAchievementRow::into_model).transpose()
    }

    async fn list_user_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserAchievement>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE user_id = ? ORDER BY achievement_id",
            self.tables.user_achievements
        );
        with_timeout(async {
            let rows: Vec<UserAchievementRow> = sqlx::query_as(&sql)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
            rows.into_iter().map(UserAchievementRow::into_model).collect()
        })
        .await
    }

    async fn insert_user_achievement(
        &self,
        record: &UserAchievement,
    ) -> Result<bool, StoreError> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (user_id, achievement_id, status, current_value,
                target_value, percentage, progress_updated_at, completion_count,
                completed_at, rewards_collected, rewards_collected_at, snapshot,
                first_seen_at, last_updated_at, revision)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.user_achievements
        );
        let result = sqlx::query(&sql)
            .bind(&record.user_id)
            .bind(&record.achievement_id)
            .bind(record.status.as_str())
            .bind(record.progress.current)
            .bind(record.progress.target)
            .bind(record.progress.percentage as i64)
            .bind(record.progress.last_updated.to_rfc3339())
            .bind(record.completion_count as i64)
            .bind(record.completed_at.map(|t| t.to_rfc3339()))
            .bind(record.rewards_collected)
            .bind(record.rewards_collected_at.map(|t| t.to_rfc3339()))
            .bind(serde_json::to_string(&record.snapshot)?)
            .bind(record.first_seen_at.to_rfc3339())
            .bind(record.last_updated_at.to_rfc3339())
            .bind(record.revision as i64)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit_check_update(&self, update: &CheckUpdate) -> Result<(), StoreError> {
        let rec = &update.record;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        match update.expected_revision {
            Some(expected) => {
                let sql = format!(
                    "UPDATE {} SET status = ?, current_value = ?, target_value = ?,
                        percentage = ?, progress_updated_at = ?, completion_count = ?,
                        completed_at = ?, rewards_collected = ?, rewards_collected_at = ?,
                        snapshot = ?, last_updated_at = ?, revision = ?
                     WHERE user_id = ? AND achievement_id = ? AND revision = ?",
                    self.tables.user_achievements
                );
                let result = sqlx::query(&sql)
                    .bind(rec.status.as_str())
                    .bind(rec.progress.current)
                    .bind(rec.progress.target)
                    .bind(rec.progress.percentage as i64)
                    .bind(rec.progress.last_updated.to_rfc3339())
                    .bind(rec.completion_count as i64)
                    .bind(rec.completed_at.map(|t| t.to_rfc3339()))
                    .bind(rec.rewards_collected)
                    .bind(rec.rewards_collected_at.map(|t| t.to_rfc3339()))
                    .bind(serde_json::to_string(&rec.snapshot)?)
                    .bind(rec.last_updated_at.to_rfc3339())
                    .bind(rec.revision as i64)
                    .bind(&rec.user_id)
                    .bind(&rec.achievement_id)
                    .bind(expected as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                if result.rows_affected() == 0 {
                    tx.rollback().await.map_err(backend)?;
                    return Err(StoreError::Conflict {
                        user_id: rec.user_id.clone(),
                        achievement_id: rec.achievement_id.clone(),
                    });
                }
            }
            None => {
                let sql = format!(
                    "INSERT INTO {} (user_id, achievement_id, status, current_value,
                        target_value, percentage, progress_updated_at, completion_count,
                        completed_at, rewards_collected, rewards_collected_at, snapshot,
                        first_seen_at, last_updated_at, revision)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    self.tables.user_achievements
                );
                let result = sqlx::query(&sql)
                    .bind(&rec.user_id)
                    .bind(&rec.achievement_id)
                    .bind(rec.status.as_str())
                    .bind(rec.progress.current)
                    .bind(rec.progress.target)
                    .bind(rec.progress.percentage as i64)
                    .bind(rec.progress.last_updated.to_rfc3339())
                    .bind(rec.completion_count as i64)
                    .bind(rec.completed_at.map(|t| t.to_rfc3339()))
                    .bind(rec.rewards_collected)
                    .bind(rec.rewards_collected_at.map(|t| t.to_rfc3339()))
                    .bind(serde_json::to_string(&rec.snapshot)?)
                    .bind(rec.first_seen_at.to_rfc3339())
                    .bind(rec.last_updated_at.to_rfc3339())
                    .bind(rec.revision as i64)
                    .execute(&mut *tx)
                    .await;
                match result {
                    Ok(_) => {}
                    Err(e) => {
                        let unique = e
                            .as_database_error()
                            .map(|d| d.is_unique_violation())
                            .unwrap_or(false);
                        tx.rollback().await.map_err(backend)?;
                        if unique {
                            return Err(StoreError::Conflict {
                                user_id: rec.user_id.clone(),
                                achievement_id: rec.achievement_id.clone(),
                            });
                        }
                        return Err(backend(e));
                    }
                }
            }
        }

        for n in &update.notifications {
            let sql = format!(
                "INSERT INTO {} (id, user_id, achievement_id, kind, title, message,
                    important, is_read, read_at, snapshot, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                self.tables.notifications
            );
            sqlx::query(&sql)
                .bind(&n.id)
                .bind(&n.user_id)
                .bind(&n.achievement_id)
                .bind(n.kind.as_str())
                .bind(&n.title)
                .bind(&n.message)
                .bind(n.important)
                .bind(n.read)
                .bind(n.read_at.map(|t| t.to_rfc3339()))
                .bind(n.snapshot.as_ref().map(serde_json::to_string).transpose()?)
                .bind(n.created_at.to_rfc3339())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        if let Some(entry) = &update.event {
            let sql = format!(
                "INSERT INTO {} (id, user_id, achievement_id, kind, payload, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                self.tables.events
            );
            sqlx::query(&sql)
                .bind(&entry.id)
                .bind(&entry.user_id)
                .bind(entry.achievement_id.as_deref())
                .bind(&entry.kind)
                .bind(serde_json::to_string(&entry.payload)?)
                .bind(entry.created_at.to_rfc3339())
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn list_users_with_pending(
        &self,
        trigger: TriggerType,
    ) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT DISTINCT ua.user_id
               FROM {} ua JOIN {} d ON ua.achievement_id = d.id
              WHERE d.trigger_type = ? AND d.active = 1
                AND ua.status IN ('available', 'in_progress')
           ORDER BY ua.user_id",
            self.tables.user_achievements, self.tables.definitions
        );
        sqlx::query_scalar(&sql)
            .bind(trigger.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)
    }

    async fn completed_user_counts(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let sql = format!(
            "SELECT achievement_id, COUNT(*) AS cnt
               FROM {}
              WHERE completion_count > 0
           GROUP BY achievement_id
           ORDER BY cnt DESC",
            self.tables.user_achievements
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(|(id, n)| (id, n as u64)).collect())
    }

    // ─── Notifications ────────────────────────────────────────────────────────

    async fn insert_notification(&self, n: &Notification) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, user_id, achievement_id, kind, title, message,
                important, is_read, read_at, snapshot, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.tables.notifications
        );
        sqlx::query(&sql)
            .bind(&n.id)
            .bind(&n.user_id)
            .bind(&n.achievement_id)
            .bind(n.kind.as_str())
            .bind(&n.title)
            .bind(&n.message)
            .bind(n.important)
            .bind(n.read)
            .bind(n.read_at.map(|t| t.to_rfc3339()))
            .bind(n.snapshot.as_ref().map(serde_json::to_string).transpose()?)
            .bind(n.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: Option<u32>,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut sql = format!(
            "SELECT * FROM {} WHERE user_id = ?",
            self.tables.notifications
        );
        if unread_only {
            sql.push_str(" AND is_read = 0");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        let rows: Vec<NotificationRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(NotificationRow::into_model).collect()
    }

    async fn mark_notification_read(&self, id: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET is_read = 1, read_at = ? WHERE id = ? AND is_read = 0",
            self.tables.notifications
        );
        let result = sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE {} SET is_read = 1, read_at = ? WHERE user_id = ? AND is_read = 0",
            self.tables.notifications
        );
        let result = sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected())
    }

    // ─── Stats snapshots ──────────────────────────────────────────────────────

    async fn put_user_stats(&self, stats: &UserStats) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (user_id, payload, updated_at) VALUES (?, ?, ?)",
            self.tables.user_stats
        );
        sqlx::query(&sql)
            .bind(&stats.user_id)
            .bind(serde_json::to_string(stats)?)
            .bind(stats.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>, StoreError> {
        let sql = format!(
            "SELECT payload FROM {} WHERE user_id = ?",
            self.tables.user_stats
        );
        let payload: Option<String> = sqlx::query_scalar(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    async fn list_all_user_stats(&self) -> Result<Vec<UserStats>, StoreError> {
        let sql = format!("SELECT payload FROM {}", self.tables.user_stats);
        with_timeout(async {
            let payloads: Vec<String> = sqlx::query_scalar(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
            payloads
                .iter()
                .map(|p| serde_json::from_str(p).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    // ─── Leaderboard cache ────────────────────────────────────────────────────

    async fn get_leaderboard(&self, view_id: &str) -> Result<Option<LeaderboardView>, StoreError> {
        let sql = format!(
            "SELECT payload FROM {} WHERE id = ?",
            self.tables.leaderboards
        );
        let payload: Option<String> = sqlx::query_scalar(&sql)
            .bind(view_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    async fn put_leaderboard(&self, view: &LeaderboardView) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} (id, payload, last_updated) VALUES (?, ?, ?)",
            self.tables.leaderboards
        );
        sqlx::query(&sql)
            .bind(&view.id)
            .bind(serde_json::to_string(view)?)
            .bind(view.last_updated.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    // ─── Event log ────────────────────────────────────────────────────────────

    async fn append_event(&self, entry: &EventLogEntry) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, user_id, achievement_id, kind, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            self.tables.events
        );
        sqlx::query(&sql)
            .bind(&entry.id)
            .bind(&entry.user_id)
            .bind(entry.achievement_id.as_deref())
            .bind(&entry.kind)
            .bind(serde_json::to_string(&entry.payload)?)
            .bind(entry.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_events(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<EventLogEntry>, StoreError> {
        let mut sql = format!(
            "SELECT id, user_id, achievement_id, kind, payload, created_at
               FROM {} WHERE user_id = ? ORDER BY created_at DESC",
            self.tables.events
        );
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        let rows: Vec<(String, String, Option<String>, String, String, String)> =
            sqlx::query_as(&sql)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        rows.into_iter()
            .map(|(id, user_id, achievement_id, kind, payload, created_at)| {
                Ok(EventLogEntry {
                    id,
                    user_id,
                    achievement_id,
                    kind,
                    payload: serde_json::from_str(&payload)?,
                    created_at: parse_ts(&created_at)?,
                })
            })
            .collect()
    }

    // ─── Erasure ──────────────────────────────────────────────────────────────

    async fn erase_user(&self, user_id: &str) -> Result<ErasureReport, StoreError> {
        // Each DELETE is atomic on its own; the batch deliberately is not.
        // Partial application is acceptable and continued on the next call.
        let mut report = ErasureReport::default();

        let sql = format!("DELETE FROM {} WHERE user_id = ?", self.tables.user_achievements);
        report.achievements = sqlx::query(&sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();

        let sql = format!("DELETE FROM {} WHERE user_id = ?", self.tables.notifications);
        report.notifications = sqlx::query(&sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();

        let sql = format!("DELETE FROM {} WHERE user_id = ?", self.tables.user_stats);
        report.stats = sqlx::query(&sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();

        let sql = format!("DELETE FROM {} WHERE user_id = ?", self.tables.events);
        report.events = sqlx::query(&sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected();

        Ok(report)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AchievementCondition, Category, ConditionKind, Rarity, Reward, TriggerType,
    };

    async fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    fn sample_def(id: &str) -> AchievementDefinition {
        AchievementDefinition::new(
            id,
            "Centurion",
            Category::StudyVolume,
            Rarity::Rare,
            TriggerType::Immediate,
            vec![AchievementCondition::new(
                ConditionKind::Count,
                "totalQuestionsAnswered",
                100.0,
            )],
            vec![Reward::Xp(500)],
        )
    }

    #[tokio::test]
    async fn definition_roundtrip() {
        let (_dir, store) = store().await;
        let mut def = sample_def("centurion");
        def.prerequisites = vec!["first_answer".into()];
        def.tags = vec!["volume".into()];
        store.insert_definition(&def).await.unwrap();

        let back = store.get_definition("centurion").await.unwrap().unwrap();
        assert_eq!(back.name, "Centurion");
        assert_eq!(back.category, Category::StudyVolume);
        assert_eq!(back.rarity, Rarity::Rare);
        assert_eq!(back.conditions.len(), 1);
        assert_eq!(back.rewards, vec![Reward::Xp(500)]);
        assert_eq!(back.prerequisites, vec!["first_answer".to_string()]);

        assert!(store.get_definition("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn guarded_update_conflicts_on_stale_revision() {
        let (_dir, store) = store().await;
        let def = sample_def("centurion");
        store.insert_definition(&def).await.unwrap();

        let rec = UserAchievement::initialize("u1", &def, true);
        assert!(store.insert_user_achievement(&rec).await.unwrap());
        assert!(
            !store.insert_user_achievement(&rec).await.unwrap(),
            "second insert is ignored"
        );

        // First writer wins.
        let mut fresh = store.get_user_achievement("u1", "centurion").await.unwrap().unwrap();
        let observed = fresh.revision;
        fresh.progress.current = 40;
        fresh.progress.percentage = 40;
        fresh.revision = observed + 1;
        store
            .commit_check_update(&CheckUpdate::record_only(fresh.clone(), Some(observed)))
            .await
            .unwrap();

        // Second writer observed the same revision and must lose.
        let mut stale = fresh.clone();
        stale.progress.current = 50;
        let err = store
            .commit_check_update(&CheckUpdate::record_only(stale, Some(observed)))
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err:?}");

        let stored = store.get_user_achievement("u1", "centurion").await.unwrap().unwrap();
        assert_eq!(stored.progress.current, 40, "losing write must not apply");
    }

    #[tokio::test]
    async fn notifications_mark_read_flow() {
        let (_dir, store) = store().await;
        let n = Notification::new("u1", "a1", NotificationKind::Completed, "Done", "msg");
        store.insert_notification(&n).await.unwrap();

        let unread = store.list_notifications("u1", true, None).await.unwrap();
        assert_eq!(unread.len(), 1);

        assert!(store.mark_notification_read(&n.id).await.unwrap());
        assert!(!store.mark_notification_read(&n.id).await.unwrap(), "second mark is a no-op");
        assert!(store.list_notifications("u1", true, None).await.unwrap().is_empty());
        assert_eq!(store.list_notifications("u1", false, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn erase_user_reports_counts() {
        let (_dir, store) = store().await;
        let def = sample_def("centurion");
        store.insert_definition(&def).await.unwrap();
        let rec = UserAchievement::initialize("u1", &def, true);
        store.insert_user_achievement(&rec).await.unwrap();
        store
            .insert_notification(&Notification::new(
                "u1",
                "centurion",
                NotificationKind::Milestone,
                "Halfway",
                "50%",
            ))
            .await
            .unwrap();

        let report = store.erase_user("u1").await.unwrap();
        assert_eq!(report.achievements, 1);
        assert_eq!(report.notifications, 1);
        assert!(store.list_user_achievements("u1").await.unwrap().is_empty());
    }
}
