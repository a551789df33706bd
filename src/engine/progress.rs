// SPDX-License-Identifier: MIT
//! Progress calculator — aggregates an achievement's conditions into one
//! progress record.
//!
//! Current and target are the SUM over all conditions, not a per-condition
//! AND. This preserves the reference behavior: an over-satisfied condition
//! can carry an under-satisfied one to 100% (see DESIGN.md, "Multi-condition
//! aggregation").

use chrono::Utc;

use crate::metrics::MetricSnapshot;
use crate::model::{AchievementDefinition, Progress};

use super::evaluator;

/// Compute progress for `def` from a metric snapshot.
///
/// Integers are floored; `percentage = min(100, current * 100 / target)` for
/// positive targets and 0 otherwise.
pub fn calculate(
    user_id: &str,
    def: &AchievementDefinition,
    metrics: &MetricSnapshot,
) -> Progress {
    let mut current: i64 = 0;
    let mut target: i64 = 0;
    for condition in &def.conditions {
        current += evaluator::evaluate(user_id, condition, metrics);
        target += condition.value.floor() as i64;
    }

    Progress {
        current,
        target,
        percentage: percentage(current, target),
        last_updated: Utc::now(),
    }
}

/// Clamped integer percentage.
pub fn percentage(current: i64, target: i64) -> u32 {
    if target <= 0 {
        return 0;
    }
    let pct = (current.max(0) as u128 * 100) / target as u128;
    pct.min(100) as u32
}
