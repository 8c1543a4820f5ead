// Metrics Aggregation
// Folds per-stage metrics into one plan-level summary

use crate::model::{PlanMetrics, StageResult};

use std::collections::HashMap;
use std::time::Duration;

/// Fold all stage metrics into a plan summary.
///
/// `duration` is the maximum single-stage duration rather than the sum,
/// since stages within a level run concurrently. `total_duration` is the
/// independently measured wall-clock time for the whole plan.
pub fn aggregate(results: &HashMap<String, StageResult>, total_duration: Duration) -> PlanMetrics {
    let mut metrics = PlanMetrics {
        total_duration,
        ..PlanMetrics::default()
    };

    for result in results.values() {
        let m = &result.metrics;
        metrics.duration = metrics.duration.max(m.duration);
        metrics.memory_bytes += m.memory_bytes;
        metrics.api_calls += m.api_calls;
        metrics.error_count += m.error_count;
        metrics.retry_count += m.retry_count;
        for (key, value) in &m.custom {
            *metrics.custom.entry(key.clone()).or_insert(0.0) += value;
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StageError, StageMetrics};

    fn result(metrics: StageMetrics) -> StageResult {
        StageResult::success(None).with_metrics(metrics)
    }

    #[test]
    fn test_duration_is_max_not_sum() {
        let mut results = HashMap::new();
        results.insert(
            "a".to_string(),
            result(StageMetrics {
                duration: Duration::from_millis(300),
                ..StageMetrics::default()
            }),
        );
        results.insert(
            "b".to_string(),
            result(StageMetrics {
                duration: Duration::from_millis(120),
                ..StageMetrics::default()
            }),
        );

        let plan = aggregate(&results, Duration::from_millis(310));
        assert_eq!(plan.duration, Duration::from_millis(300));
        assert_eq!(plan.total_duration, Duration::from_millis(310));
    }

    #[test]
    fn test_counters_are_summed() {
        let mut results = HashMap::new();
        results.insert(
            "a".to_string(),
            result(StageMetrics {
                memory_bytes: 1024,
                api_calls: 3,
                retry_count: 1,
                ..StageMetrics::default()
            }),
        );
        results.insert(
            "b".to_string(),
            StageResult::failure(StageError::execution("boom")).with_metrics(StageMetrics {
                memory_bytes: 512,
                api_calls: 2,
                error_count: 1,
                retry_count: 2,
                ..StageMetrics::default()
            }),
        );

        let plan = aggregate(&results, Duration::ZERO);
        assert_eq!(plan.memory_bytes, 1536);
        assert_eq!(plan.api_calls, 5);
        assert_eq!(plan.error_count, 1);
        assert_eq!(plan.retry_count, 3);
    }

    #[test]
    fn test_custom_metrics_sum_merged_by_key() {
        let mut first = StageMetrics::default();
        first.custom.insert("pages_scraped".to_string(), 12.0);
        first.custom.insert("tokens".to_string(), 900.0);

        let mut second = StageMetrics::default();
        second.custom.insert("tokens".to_string(), 100.0);

        let mut results = HashMap::new();
        results.insert("a".to_string(), result(first));
        results.insert("b".to_string(), result(second));

        let plan = aggregate(&results, Duration::ZERO);
        assert_eq!(plan.custom.get("pages_scraped"), Some(&12.0));
        assert_eq!(plan.custom.get("tokens"), Some(&1000.0));
    }

    #[test]
    fn test_empty_results() {
        let plan = aggregate(&HashMap::new(), Duration::from_secs(1));
        assert_eq!(plan.duration, Duration::ZERO);
        assert_eq!(plan.total_duration, Duration::from_secs(1));
        assert!(plan.custom.is_empty());
    }
}
