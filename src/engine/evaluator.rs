// SPDX-License-Identifier: MIT
//! Condition evaluator — maps one condition + a metric snapshot to its
//! current-value contribution.
//!
//! Accumulating kinds (`Count`, `Percentage`, `Streak`, `TimeBased`) pass
//! the raw metric through. Saturating kinds differ below target:
//! `Threshold` keeps the raw value, `Comparison` collapses to 0 until its
//! operator holds. Nothing here fails the caller — unknown fields and
//! missing metrics evaluate to 0 with a warning.

use crate::metrics::MetricSnapshot;
use crate::model::{AchievementCondition, ConditionKind};

/// Current-value contribution of `condition` for `user_id`, floored.
pub fn evaluate(
    user_id: &str,
    condition: &AchievementCondition,
    metrics: &MetricSnapshot,
) -> i64 {
    let raw = metrics.resolve(user_id, &condition.field);
    let target = condition.value;

    let current = match condition.kind {
        ConditionKind::Count
        | ConditionKind::Percentage
        | ConditionKind::Streak
        | ConditionKind::TimeBased => raw,
        ConditionKind::Threshold => {
            if raw >= target {
                target
            } else {
                raw
            }
        }
        ConditionKind::Comparison => {
            if condition.op.holds(raw, target) {
                target
            } else {
                0.0
            }
        }
    };

    current.floor() as i64
}
