//! Pass-rate threshold evaluation for freshly written buckets.
//!
//! Evaluation is pure; delivery lives in the notifier. A bucket with no
//! counted events produces no decision at all, which keeps quiet hours
//! from paging anyone.

use crate::stats::types::StatsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertDecision {
    pub should_alert: bool,
    /// Whole-percent pass rate, `round(passed / total * 100)`.
    pub pass_rate: i64,
}

/// `None` when `total == 0`; a rate over nothing is undefined, not 0%.
pub fn pass_rate(total: i64, passed: i64) -> Option<i64> {
    if total <= 0 {
        return None;
    }
    Some(((passed as f64) * 100.0 / total as f64).round() as i64)
}

/// Strictly-below comparison: a bucket exactly at the threshold is healthy.
pub fn evaluate(total: i64, passed: i64, threshold: i64) -> Option<AlertDecision> {
    let pass_rate = pass_rate(total, passed)?;
    Some(AlertDecision {
        should_alert: pass_rate < threshold,
        pass_rate,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breach {
    pub name: String,
    pub pass_rate: i64,
    pub passed: i64,
    pub total: i64,
}

/// Evaluate a batch of `(name, total, passed)` rows and keep the breaches,
/// worst pass rate first so a truncated message still shows the most
/// broken job types.
pub fn collect_breaches(
    rows: &[(String, i64, i64)],
    threshold: i64,
) -> Result<Vec<Breach>, StatsError> {
    let mut breaches = Vec::new();
    for (name, total, passed) in rows {
        if *passed > *total || *passed < 0 || *total < 0 {
            return Err(StatsError::InvariantViolation {
                detail: format!("bad alert input for '{name}': passed {passed} of {total}"),
            });
        }
        if let Some(decision) = evaluate(*total, *passed, threshold) {
            if decision.should_alert {
                breaches.push(Breach {
                    name: name.clone(),
                    pass_rate: decision.pass_rate,
                    passed: *passed,
                    total: *total,
                });
            }
        }
    }
    breaches.sort_by(|a, b| a.pass_rate.cmp(&b.pass_rate).then(a.name.cmp(&b.name)));
    Ok(breaches)
}

/// One notice body for the whole batch.
pub fn format_breach_message(breaches: &[Breach], threshold: i64) -> String {
    let mut lines = vec![format!(
        "Pass rate below {threshold}% for {} job type(s) in the last hour:",
        breaches.len()
    )];
    for breach in breaches {
        lines.push(format!(
            "  {}: {}% ({}/{} passed)",
            breach.name, breach.pass_rate, breach.passed, breach.total
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_rate_is_rounded_whole_percent() {
        assert_eq!(pass_rate(40, 34), Some(85));
        assert_eq!(pass_rate(3, 2), Some(67));
        assert_eq!(pass_rate(0, 0), None);
    }

    #[test]
    fn threshold_comparison_is_strict() {
        let at_threshold = evaluate(40, 34, 85).unwrap();
        assert_eq!(at_threshold.pass_rate, 85);
        assert!(!at_threshold.should_alert);

        let below = evaluate(40, 34, 90).unwrap();
        assert!(below.should_alert);
    }

    #[test]
    fn empty_bucket_never_alerts() {
        assert_eq!(evaluate(0, 0, 99), None);
    }

    #[test]
    fn breaches_sort_worst_first_with_name_tiebreak() {
        let rows = vec![
            ("build".to_string(), 10, 9),
            ("lint".to_string(), 10, 4),
            ("deploy".to_string(), 10, 4),
            ("test".to_string(), 10, 10),
        ];
        let breaches = collect_breaches(&rows, 95).unwrap();
        let names: Vec<&str> = breaches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["deploy", "lint", "build"]);
        assert_eq!(breaches[0].pass_rate, 40);
    }

    #[test]
    fn impossible_inputs_are_rejected() {
        let rows = vec![("broken".to_string(), 2, 5)];
        assert!(matches!(
            collect_breaches(&rows, 90),
            Err(StatsError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn message_lists_each_breach() {
        let breaches = vec![Breach {
            name: "autopkgtest".to_string(),
            pass_rate: 62,
            passed: 5,
            total: 8,
        }];
        let message = format_breach_message(&breaches, 85);
        assert!(message.contains("below 85%"));
        assert!(message.contains("autopkgtest: 62% (5/8 passed)"));
    }
}
