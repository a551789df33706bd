// SPDX-License-Identifier: MIT
//! Metric provider port — named numeric signals about a user's behavior.
//!
//! The engine never computes metrics itself; the study-time tracker, exam
//! grader, and spaced-repetition scheduler feed a provider implementing
//! [`MetricProvider`]. Field names form a closed set: an unknown name in a
//! condition evaluates to 0 with a warning rather than failing the pass.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// The closed set of metric fields condition evaluation can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricField {
    TotalQuestionsAnswered,
    CorrectAnswers,
    CurrentStreak,
    LongestStreak,
    TotalStudyMinutes,
    TotalXp,
    CurrentLevel,
    ExamsTaken,
    ExamAverageScore,
    ReviewsCompleted,
    CardsMastered,
}

impl MetricField {
    /// The wire/catalog name, camelCase to match the condition `field` keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricField::TotalQuestionsAnswered => "totalQuestionsAnswered",
            MetricField::CorrectAnswers => "correctAnswers",
            MetricField::CurrentStreak => "currentStreak",
            MetricField::LongestStreak => "longestStreak",
            MetricField::TotalStudyMinutes => "totalStudyMinutes",
            MetricField::TotalXp => "totalXp",
            MetricField::CurrentLevel => "currentLevel",
            MetricField::ExamsTaken => "examsTaken",
            MetricField::ExamAverageScore => "examAverageScore",
            MetricField::ReviewsCompleted => "reviewsCompleted",
            MetricField::CardsMastered => "cardsMastered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "totalQuestionsAnswered" => MetricField::TotalQuestionsAnswered,
            "correctAnswers" => MetricField::CorrectAnswers,
            "currentStreak" => MetricField::CurrentStreak,
            "longestStreak" => MetricField::LongestStreak,
            "totalStudyMinutes" => MetricField::TotalStudyMinutes,
            "totalXp" => MetricField::TotalXp,
            "currentLevel" => MetricField::CurrentLevel,
            "examsTaken" => MetricField::ExamsTaken,
            "examAverageScore" => MetricField::ExamAverageScore,
            "reviewsCompleted" => MetricField::ReviewsCompleted,
            "cardsMastered" => MetricField::CardsMastered,
            _ => return None,
        })
    }
}

/// A point-in-time snapshot of one user's metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSnapshot {
    values: HashMap<MetricField, f64>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: MetricField, value: f64) -> &mut Self {
        self.values.insert(field, value);
        self
    }

    pub fn with(mut self, field: MetricField, value: f64) -> Self {
        self.values.insert(field, value);
        self
    }

    /// Value for `field`, or 0 when the provider did not report it.
    pub fn get(&self, field: MetricField) -> f64 {
        self.values.get(&field).copied().unwrap_or(0.0)
    }

    /// Resolve a raw condition field name. Unknown names warn and yield 0.
    pub fn resolve(&self, user_id: &str, field_name: &str) -> f64 {
        match MetricField::parse(field_name) {
            Some(field) => self.get(field),
            None => {
                warn!(user_id, field = field_name, "unknown metric field, treating as 0");
                0.0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// External collaborator supplying metric snapshots.
///
/// Implementations should bound their own lookups; a failure here degrades
/// to an all-zero snapshot inside the engine, it never aborts a pass.
#[async_trait]
pub trait MetricProvider: Send + Sync {
    async fn snapshot(&self, user_id: &str) -> anyhow::Result<MetricSnapshot>;
}

/// In-memory provider for tests and embedding.
#[derive(Default)]
pub struct StaticMetrics {
    by_user: tokio::sync::RwLock<HashMap<String, MetricSnapshot>>,
}

impl StaticMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, user_id: impl Into<String>, snapshot: MetricSnapshot) {
        self.by_user.write().await.insert(user_id.into(), snapshot);
    }

    /// Set a single field for a user, creating the snapshot if needed.
    pub async fn set(&self, user_id: &str, field: MetricField, value: f64) {
        let mut guard = self.by_user.write().await;
        guard.entry(user_id.to_string()).or_default().set(field, value);
    }
}

#[async_trait]
impl MetricProvider for StaticMetrics {
    async fn snapshot(&self, user_id: &str) -> anyhow::Result<MetricSnapshot> {
        Ok(self
            .by_user
            .read()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// A provider that always fails — exercises the degrade-to-zero path.
pub struct FailingMetrics;

#[async_trait]
impl MetricProvider for FailingMetrics {
    async fn snapshot(&self, _user_id: &str) -> anyhow::Result<MetricSnapshot> {
        Err(anyhow::anyhow!("metric provider unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_roundtrip() {
        for f in [
            MetricField::TotalQuestionsAnswered,
            MetricField::CorrectAnswers,
            MetricField::CurrentStreak,
            MetricField::LongestStreak,
            MetricField::TotalStudyMinutes,
            MetricField::TotalXp,
            MetricField::CurrentLevel,
            MetricField::ExamsTaken,
            MetricField::ExamAverageScore,
            MetricField::ReviewsCompleted,
            MetricField::CardsMastered,
        ] {
            assert_eq!(MetricField::parse(f.as_str()), Some(f));
        }
        assert_eq!(MetricField::parse("linesOfCode"), None);
    }

    #[test]
    fn missing_and_unknown_fields_resolve_to_zero() {
        let snap = MetricSnapshot::new().with(MetricField::CurrentStreak, 4.0);
        assert_eq!(snap.get(MetricField::CurrentStreak), 4.0);
        assert_eq!(snap.get(MetricField::TotalXp), 0.0);
        assert_eq!(snap.resolve("u1", "notAField"), 0.0);
    }

    #[tokio::test]
    async fn static_provider_returns_per_user_snapshots() {
        let provider = StaticMetrics::new();
        provider
            .set("u1", MetricField::TotalQuestionsAnswered, 40.0)
            .await;

        let snap = provider.snapshot("u1").await.unwrap();
        assert_eq!(snap.get(MetricField::TotalQuestionsAnswered), 40.0);

        let empty = provider.snapshot("u2").await.unwrap();
        assert!(empty.is_empty());
    }
}
