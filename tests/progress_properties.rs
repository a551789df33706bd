//! Property tests for the arithmetic invariants of progress calculation.

use laurel::engine::evaluator;
use laurel::engine::progress;
use laurel::metrics::{MetricField, MetricSnapshot};
use laurel::model::{AchievementCondition, ConditionKind};
use proptest::prelude::*;

proptest! {
    /// percentage == clamp(floor(current/target*100), 0, 100) for all inputs:
    /// below the clamp it satisfies the floor definition exactly.
    #[test]
    fn percentage_is_always_clamped(current in -1_000_000i64..1_000_000_000i64,
                                    target in 1i64..1_000_000_000i64) {
        let pct = progress::percentage(current, target);
        prop_assert!(pct <= 100);
        let scaled = current.max(0) as u128 * 100;
        let t = target as u128;
        if pct < 100 {
            prop_assert!(u128::from(pct) * t <= scaled);
            prop_assert!(scaled < (u128::from(pct) + 1) * t);
        } else {
            prop_assert!(scaled >= 100 * t);
        }
    }

    #[test]
    fn zero_or_negative_target_means_zero_percent(current in any::<i64>(),
                                                  target in -1_000_000i64..=0i64) {
        prop_assert_eq!(progress::percentage(current, target), 0);
    }

    /// Threshold conditions never contribute more than their target.
    #[test]
    fn threshold_contribution_is_capped(raw in 0.0f64..1e12, target in 1.0f64..1e9) {
        let condition = AchievementCondition::new(
            ConditionKind::Threshold,
            "totalQuestionsAnswered",
            target,
        );
        let snap = MetricSnapshot::new().with(MetricField::TotalQuestionsAnswered, raw);
        let current = evaluator::evaluate("u", &condition, &snap);
        prop_assert!(current <= target.floor() as i64);
        prop_assert!(current >= 0);
    }

    /// Comparison conditions are all-or-nothing.
    #[test]
    fn comparison_contribution_is_zero_or_target(raw in 0.0f64..1e9, target in 1.0f64..1e9) {
        let condition = AchievementCondition::new(
            ConditionKind::Comparison,
            "totalQuestionsAnswered",
            target,
        );
        let snap = MetricSnapshot::new().with(MetricField::TotalQuestionsAnswered, raw);
        let current = evaluator::evaluate("u", &condition, &snap);
        let target_floor = target.floor() as i64;
        prop_assert!(current == 0 || current == target_floor);
    }
}
