// SPDX-License-Identifier: MIT
//! Achievement catalog types — definitions, conditions, rewards.
//!
//! A definition is an immutable-ish catalog entry; the engine never mutates
//! one outside the catalog CRUD surface. User records embed a
//! [`DefinitionSnapshot`] at initialization time so category/rarity
//! classification stays stable even if the catalog entry later changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── Classification enums ─────────────────────────────────────────────────────

/// Achievement category, used for grouping and per-category leaderboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    StudyStreak,
    Accuracy,
    ExamPerformance,
    StudyVolume,
    Mastery,
    Dedication,
    Special,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::StudyStreak => "study_streak",
            Category::Accuracy => "accuracy",
            Category::ExamPerformance => "exam_performance",
            Category::StudyVolume => "study_volume",
            Category::Mastery => "mastery",
            Category::Dedication => "dedication",
            Category::Special => "special",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "study_streak" => Category::StudyStreak,
            "accuracy" => Category::Accuracy,
            "exam_performance" => Category::ExamPerformance,
            "study_volume" => Category::StudyVolume,
            "mastery" => Category::Mastery,
            "dedication" => Category::Dedication,
            "special" => Category::Special,
            _ => return None,
        })
    }

    /// All categories, in display order.
    pub fn all() -> [Category; 7] {
        [
            Category::StudyStreak,
            Category::Accuracy,
            Category::ExamPerformance,
            Category::StudyVolume,
            Category::Mastery,
            Category::Dedication,
            Category::Special,
        ]
    }
}

/// Rarity tier, ordered `Common < … < Mythical`.
///
/// Completions at [`Rarity::Rare`] or above mark their notification as
/// important and count into the `rare_completions` leaderboard column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Mythical,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
            Rarity::Mythical => "mythical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "common" => Rarity::Common,
            "uncommon" => Rarity::Uncommon,
            "rare" => Rarity::Rare,
            "epic" => Rarity::Epic,
            "legendary" => Rarity::Legendary,
            "mythical" => Rarity::Mythical,
            _ => return None,
        })
    }

    /// Whether completions of this tier are flagged important.
    pub fn is_rare_tier(&self) -> bool {
        *self >= Rarity::Rare
    }

    pub fn all() -> [Rarity; 6] {
        [
            Rarity::Common,
            Rarity::Uncommon,
            Rarity::Rare,
            Rarity::Epic,
            Rarity::Legendary,
            Rarity::Mythical,
        ]
    }
}

/// Which kind of event causes an achievement to be (re-)evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Examined on every check pass regardless of event type.
    Immediate,
    SessionEnd,
    ExamCompletion,
    DailyCheck,
    WeeklyCheck,
    MonthlyCheck,
    /// Only examined via an explicit force-check id list.
    Manual,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Immediate => "immediate",
            TriggerType::SessionEnd => "session_end",
            TriggerType::ExamCompletion => "exam_completion",
            TriggerType::DailyCheck => "daily_check",
            TriggerType::WeeklyCheck => "weekly_check",
            TriggerType::MonthlyCheck => "monthly_check",
            TriggerType::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "immediate" => TriggerType::Immediate,
            "session_end" => TriggerType::SessionEnd,
            "exam_completion" => TriggerType::ExamCompletion,
            "daily_check" => TriggerType::DailyCheck,
            "weekly_check" => TriggerType::WeeklyCheck,
            "monthly_check" => TriggerType::MonthlyCheck,
            "manual" => TriggerType::Manual,
            _ => return None,
        })
    }
}

// ─── Conditions ───────────────────────────────────────────────────────────────

/// How a condition's current value is derived from the raw metric.
///
/// `Count`, `Percentage`, `Streak` and `TimeBased` accumulate — current is
/// the raw metric value. `Threshold` and `Comparison` saturate — current is
/// the full target once the raw value satisfies it, and below target it is
/// the raw value (`Threshold`) or zero (`Comparison`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Count,
    Percentage,
    Threshold,
    Streak,
    TimeBased,
    Comparison,
}

/// Comparison operator, consulted by [`ConditionKind::Comparison`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Gte,
    Gt,
    Eq,
    Lte,
    Lt,
}

impl ComparisonOp {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            ComparisonOp::Gte => lhs >= rhs,
            ComparisonOp::Gt => lhs > rhs,
            ComparisonOp::Eq => (lhs - rhs).abs() < f64::EPSILON,
            ComparisonOp::Lte => lhs <= rhs,
            ComparisonOp::Lt => lhs < rhs,
        }
    }
}

/// A single measurable criterion contributing to an achievement's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementCondition {
    pub kind: ConditionKind,
    /// Key into the metric snapshot, e.g. `"totalQuestionsAnswered"`.
    pub field: String,
    #[serde(default = "ComparisonOp::default_gte")]
    pub op: ComparisonOp,
    /// Target value. Contributes `floor(value)` to the achievement target.
    pub value: f64,
    /// Optional evaluation timeframe in days (informational — the metric
    /// provider is responsible for windowed fields).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe_days: Option<u32>,
    /// Free-form scoping data, e.g. which subject the condition applies to.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub scope: HashMap<String, serde_json::Value>,
}

impl ComparisonOp {
    fn default_gte() -> Self {
        ComparisonOp::Gte
    }
}

impl AchievementCondition {
    pub fn new(kind: ConditionKind, field: impl Into<String>, value: f64) -> Self {
        Self {
            kind,
            field: field.into(),
            op: ComparisonOp::Gte,
            value,
            timeframe_days: None,
            scope: HashMap::new(),
        }
    }
}

// ─── Rewards ──────────────────────────────────────────────────────────────────

/// A reward granted on completion.
///
/// Tagged by kind so XP, points, and cosmetic grants cannot be confused at
/// the call site. The engine records rewards as pending/collected only —
/// applying them to a profile is outside its scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reward {
    Xp(u64),
    Points(u64),
    Badge(String),
    Title(String),
    Cosmetic(String),
}

impl Reward {
    pub fn xp_value(&self) -> u64 {
        match self {
            Reward::Xp(v) => *v,
            _ => 0,
        }
    }

    pub fn points_value(&self) -> u64 {
        match self {
            Reward::Points(v) => *v,
            _ => 0,
        }
    }
}

// ─── Definition ───────────────────────────────────────────────────────────────

/// Catalog entry describing conditions, rewards, and metadata for one
/// achievement.
///
/// Invariants enforced at catalog-write time: at least one condition and one
/// reward; every prerequisite id references an existing definition; the
/// prerequisite graph is acyclic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub rarity: Rarity,
    pub trigger: TriggerType,
    pub conditions: Vec<AchievementCondition>,
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub repeatable: bool,
    /// Completion cap for repeatable achievements. `None` = unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completions: Option<u32>,
    /// Ids of definitions that must be completed before this one unlocks.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Active-window start; the achievement is not evaluated before this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    /// Active-window end; non-completed records expire once this passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub active: bool,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AchievementDefinition {
    /// Build a definition with the mandatory fields; everything else takes
    /// its default and can be set directly on the struct.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: Category,
        rarity: Rarity,
        trigger: TriggerType,
        conditions: Vec<AchievementCondition>,
        rewards: Vec<Reward>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            rarity,
            trigger,
            conditions,
            rewards,
            hidden: false,
            repeatable: false,
            max_completions: None,
            prerequisites: Vec::new(),
            starts_at: None,
            ends_at: None,
            tags: Vec::new(),
            active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the active window has opened (or there is none).
    pub fn window_open(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |s| now >= s)
    }

    /// Whether the active window has closed. Always false without an end.
    pub fn window_ended(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.map_or(false, |e| now > e)
    }

    /// Whether another completion cycle is allowed at `completion_count`.
    pub fn allows_another_completion(&self, completion_count: u32) -> bool {
        if completion_count == 0 {
            return true;
        }
        self.repeatable && self.max_completions.map_or(true, |max| completion_count < max)
    }

    /// Freeze the fields user records need for stable classification.
    pub fn snapshot(&self) -> DefinitionSnapshot {
        DefinitionSnapshot {
            name: self.name.clone(),
            category: self.category,
            rarity: self.rarity,
            trigger: self.trigger,
            hidden: self.hidden,
            repeatable: self.repeatable,
            max_completions: self.max_completions,
            rewards: self.rewards.clone(),
            definition_version: self.version,
        }
    }
}

/// The slice of a definition embedded into each [`crate::model::UserAchievement`]
/// at initialization time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionSnapshot {
    pub name: String,
    pub category: Category,
    pub rarity: Rarity,
    pub trigger: TriggerType,
    pub hidden: bool,
    pub repeatable: bool,
    pub max_completions: Option<u32>,
    pub rewards: Vec<Reward>,
    pub definition_version: u32,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_def() -> AchievementDefinition {
        AchievementDefinition::new(
            "streak_7",
            "Week of Fire",
            Category::StudyStreak,
            Rarity::Uncommon,
            TriggerType::Immediate,
            vec![AchievementCondition::new(
                ConditionKind::Streak,
                "currentStreak",
                7.0,
            )],
            vec![Reward::Xp(100)],
        )
    }

    #[test]
    fn rarity_ordering_and_tiers() {
        assert!(Rarity::Common < Rarity::Mythical);
        assert!(!Rarity::Uncommon.is_rare_tier());
        assert!(Rarity::Rare.is_rare_tier());
        assert!(Rarity::Legendary.is_rare_tier());
    }

    #[test]
    fn enum_string_roundtrips() {
        for c in Category::all() {
            assert_eq!(Category::parse(c.as_str()), Some(c));
        }
        for r in Rarity::all() {
            assert_eq!(Rarity::parse(r.as_str()), Some(r));
        }
        assert_eq!(TriggerType::parse("exam_completion"), Some(TriggerType::ExamCompletion));
        assert_eq!(TriggerType::parse("bogus"), None);
    }

    #[test]
    fn reward_tagged_serialisation() {
        let json = serde_json::to_string(&Reward::Xp(250)).unwrap();
        assert!(json.contains("\"kind\":\"xp\""));
        let back: Reward = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Reward::Xp(250));
        assert_eq!(back.xp_value(), 250);
        assert_eq!(back.points_value(), 0);
    }

    #[test]
    fn repeat_limits() {
        let mut def = minimal_def();
        assert!(def.allows_another_completion(0));
        assert!(!def.allows_another_completion(1), "non-repeatable completes once");

        def.repeatable = true;
        assert!(def.allows_another_completion(5), "unlimited when no cap");
        def.max_completions = Some(3);
        assert!(def.allows_another_completion(2));
        assert!(!def.allows_another_completion(3));
    }

    #[test]
    fn active_window_edges() {
        let mut def = minimal_def();
        let now = Utc::now();
        assert!(def.window_open(now));
        assert!(!def.window_ended(now));

        def.starts_at = Some(now + chrono::Duration::hours(1));
        assert!(!def.window_open(now));

        def.starts_at = None;
        def.ends_at = Some(now - chrono::Duration::hours(1));
        assert!(def.window_ended(now));
    }

    #[test]
    fn comparison_op_holds() {
        assert!(ComparisonOp::Gte.holds(5.0, 5.0));
        assert!(ComparisonOp::Gt.holds(6.0, 5.0));
        assert!(!ComparisonOp::Gt.holds(5.0, 5.0));
        assert!(ComparisonOp::Eq.holds(5.0, 5.0));
        assert!(ComparisonOp::Lt.holds(4.0, 5.0));
    }

    #[test]
    fn definition_roundtrip_json() {
        let def = minimal_def();
        let json = serde_json::to_string(&def).unwrap();
        let back: AchievementDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "streak_7");
        assert_eq!(back.conditions.len(), 1);
        assert_eq!(back.rewards, vec![Reward::Xp(100)]);
    }
}
