use time::{Duration, PrimitiveDateTime};

use crate::core::config::Settings;

/// Time-accounting knobs for an attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExamTiming {
    pub(crate) min_heartbeat_interval: Duration,
    pub(crate) inactivity_threshold: Duration,
    pub(crate) max_charge_seconds: i64,
    pub(crate) attempt_deadline: Duration,
    pub(crate) submit_lock_ttl: std::time::Duration,
    pub(crate) submitted_marker_ttl: std::time::Duration,
    pub(crate) question_cache_ttl: std::time::Duration,
}

impl Default for ExamTiming {
    fn default() -> Self {
        Self {
            min_heartbeat_interval: Duration::seconds(5),
            inactivity_threshold: Duration::seconds(300),
            max_charge_seconds: 30,
            attempt_deadline: Duration::days(3),
            submit_lock_ttl: std::time::Duration::from_secs(5),
            submitted_marker_ttl: std::time::Duration::from_secs(4 * 60 * 60),
            question_cache_ttl: std::time::Duration::from_secs(3 * 60),
        }
    }
}

impl ExamTiming {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let exam = settings.exam();
        Self {
            min_heartbeat_interval: Duration::seconds(exam.heartbeat_min_interval_seconds as i64),
            inactivity_threshold: Duration::seconds(exam.inactivity_threshold_seconds as i64),
            max_charge_seconds: exam.max_charge_seconds as i64,
            attempt_deadline: Duration::days(exam.attempt_deadline_days as i64),
            submit_lock_ttl: std::time::Duration::from_secs(exam.submit_lock_ttl_seconds),
            submitted_marker_ttl: std::time::Duration::from_secs(
                exam.submitted_marker_ttl_seconds,
            ),
            question_cache_ttl: std::time::Duration::from_secs(exam.question_cache_ttl_seconds),
        }
    }

    /// Time since the previous action, or `None` before the first one.
    pub(crate) fn gap(
        &self,
        last_action: Option<PrimitiveDateTime>,
        now: PrimitiveDateTime,
    ) -> Option<Duration> {
        last_action.map(|last| now - last)
    }

    pub(crate) fn is_too_frequent(&self, gap: Option<Duration>) -> bool {
        gap.is_some_and(|gap| gap < self.min_heartbeat_interval)
    }

    pub(crate) fn is_long_inactive(&self, gap: Option<Duration>) -> bool {
        gap.is_some_and(|gap| gap > self.inactivity_threshold)
    }

    /// Whole seconds to charge for `gap`, capped so one stale request never
    /// costs more than `max_charge_seconds`.
    pub(crate) fn charge_seconds(&self, gap: Option<Duration>) -> i32 {
        let elapsed = gap.map(|gap| gap.whole_seconds().max(0)).unwrap_or(0);
        elapsed.min(self.max_charge_seconds) as i32
    }
}
