//! Aggregates over the session ledger

use serde::Serialize;

/// Dwell aggregates for one weekday
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayOfWeekStats {
    pub day: String,
    pub avg_dwell_minutes: f64,
    pub visit_count: u64,
}

/// Dwell aggregates for one local entry hour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourStats {
    pub hour: u32,
    pub avg_dwell_minutes: f64,
    pub visit_count: u64,
}

/// Statistics over the closed sessions of a trailing window, plus the
/// state of the sessions open right now
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DwellStatistics {
    pub period_days: u32,
    pub total_visits: u64,
    pub avg_dwell_minutes: f64,
    pub min_dwell_minutes: f64,
    pub max_dwell_minutes: f64,
    /// Closed visits at or above the alert threshold
    pub campers_count: u64,
    /// Closed visits shorter than the quick-visit threshold
    pub quick_visits_count: u64,
    /// Monday first
    pub by_day_of_week: Vec<DayOfWeekStats>,
    /// Ascending hour
    pub by_entry_hour: Vec<HourStats>,
    pub current_active: usize,
    pub current_campers: usize,
    pub current_warnings: usize,
}

/// Estimated effect of bringing the average dwell down to a target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RevenueImpact {
    /// Average dwell is already at or below the target
    AtTarget {
        current_avg_minutes: f64,
        target_minutes: f64,
    },
    Gain {
        current_avg_minutes: f64,
        target_minutes: f64,
        excess_time_minutes: f64,
        improvement_potential_percent: f64,
        additional_customers_per_day: f64,
        potential_monthly_gain: f64,
        campers_per_month: u64,
        avg_spend_per_person: f64,
    },
}

impl RevenueImpact {
    /// Estimate from statistics covering a 30-day window.
    ///
    /// Shorter stays free seats for more visitors: with the average dwell
    /// cut from `current` to `target` the same hours serve
    /// `current / target` times as many people.
    pub fn estimate(stats: &DwellStatistics, avg_spend: f64, target_minutes: f64) -> Self {
        let current = stats.avg_dwell_minutes;
        if current <= 0.0 || current <= target_minutes {
            return Self::AtTarget {
                current_avg_minutes: current,
                target_minutes,
            };
        }

        let improvement_factor = target_minutes / current;
        let additional_customers_per_day =
            stats.total_visits as f64 * (1.0 / improvement_factor - 1.0) / 30.0;

        Self::Gain {
            current_avg_minutes: current,
            target_minutes,
            excess_time_minutes: current - target_minutes,
            improvement_potential_percent: (1.0 - improvement_factor) * 100.0,
            additional_customers_per_day,
            potential_monthly_gain: additional_customers_per_day * 30.0 * avg_spend,
            campers_per_month: stats.campers_count,
            avg_spend_per_person: avg_spend,
        }
    }

    pub fn potential_monthly_gain(&self) -> f64 {
        match self {
            Self::AtTarget { .. } => 0.0,
            Self::Gain {
                potential_monthly_gain,
                ..
            } => *potential_monthly_gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn stats(total_visits: u64, avg: f64) -> DwellStatistics {
        DwellStatistics {
            period_days: 30,
            total_visits,
            avg_dwell_minutes: avg,
            min_dwell_minutes: avg,
            max_dwell_minutes: avg,
            campers_count: 4,
            quick_visits_count: 0,
            by_day_of_week: Vec::new(),
            by_entry_hour: Vec::new(),
            current_active: 0,
            current_campers: 0,
            current_warnings: 0,
        }
    }

    #[test]
    fn test_gain() {
        // 300 visits averaging 100 min, target 75 => a third more visitors
        let impact = RevenueImpact::estimate(&stats(300, 100.0), 30.0, 75.0);
        match impact {
            RevenueImpact::Gain {
                excess_time_minutes,
                improvement_potential_percent,
                additional_customers_per_day,
                potential_monthly_gain,
                campers_per_month,
                ..
            } => {
                assert_abs_diff_eq!(excess_time_minutes, 25.0, epsilon = 1e-9);
                assert_abs_diff_eq!(improvement_potential_percent, 25.0, epsilon = 1e-9);
                assert_abs_diff_eq!(additional_customers_per_day, 10.0 / 3.0, epsilon = 1e-9);
                assert_abs_diff_eq!(potential_monthly_gain, 3000.0, epsilon = 1e-6);
                assert_eq!(campers_per_month, 4);
            }
            other => panic!("expected a gain, got {:?}", other),
        }
    }

    #[test]
    fn test_at_target() {
        let impact = RevenueImpact::estimate(&stats(10, 60.0), 30.0, 75.0);
        assert!(matches!(impact, RevenueImpact::AtTarget { .. }));
        assert_eq!(impact.potential_monthly_gain(), 0.0);
    }

    #[test]
    fn test_empty_ledger_is_at_target() {
        let impact = RevenueImpact::estimate(&stats(0, 0.0), 30.0, 75.0);
        assert!(matches!(impact, RevenueImpact::AtTarget { .. }));
    }

    #[test]
    fn test_serializes_with_status_tag() {
        let json = serde_json::to_value(RevenueImpact::estimate(&stats(0, 0.0), 30.0, 75.0))
            .unwrap();
        assert_eq!(json["status"], "at_target");
    }
}
