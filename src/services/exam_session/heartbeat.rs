use serde_json::json;

use super::answers::dedupe_answers;
use super::{AnswerInput, ExamEngine, ExamError, SessionScope};
use crate::core::time::unix_seconds;
use crate::db::types::EventKind;
use crate::services::stores::ActionUpdate;

impl ExamEngine {
    /// Charges the time since the previous action, saves answers and returns
    /// the remaining seconds.
    ///
    /// A lost compare-and-set reports the winner's remaining time without
    /// charging again.
    pub(crate) async fn heartbeat(
        &self,
        scope: &SessionScope,
        answers: &[AnswerInput],
    ) -> Result<i32, ExamError> {
        let attempt = self
            .stores
            .attempts
            .get_by_association_id(&scope.association_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load attempt"))?
            .ok_or(ExamError::InvalidState("exam has not been started"))?;

        if attempt.submit_time.is_some() {
            return Err(ExamError::AlreadySubmitted);
        }

        let now = self.clock.now();
        let gap = self.timing.gap(attempt.last_action_time, now);

        if self.timing.is_too_frequent(gap) {
            metrics::counter!("exam_heartbeats_total", "outcome" => "rate_limited").increment(1);
            return Err(ExamError::RateLimited);
        }

        if let (true, Some(last_action), Some(gap)) =
            (self.timing.is_long_inactive(gap), attempt.last_action_time, gap)
        {
            tracing::info!(
                association_id = %scope.association_id,
                attempt_id = %attempt.id,
                user_id = %scope.context.user_id,
                gap_seconds = gap.whole_seconds(),
                "Examinee returned after long inactivity"
            );
            self.events.emit(
                &scope.context,
                &attempt.id,
                EventKind::LongInactive,
                json!({
                    "gap_seconds": gap.whole_seconds(),
                    "last_active": unix_seconds(last_action),
                    "current": unix_seconds(now),
                }),
            );
        }

        let charged = self.timing.charge_seconds(gap);
        let mut remaining = attempt.remaining_seconds - charged;
        if remaining <= 0 {
            metrics::counter!("exam_heartbeats_total", "outcome" => "exhausted").increment(1);
            return Ok(0);
        }

        let answered_count = dedupe_answers(answers).len() as i32;
        let rows = self
            .stores
            .attempts
            .conditional_update_action(ActionUpdate {
                attempt_id: &attempt.id,
                new_last_action: now,
                expected_last_action: attempt.last_action_time,
                remaining_seconds: remaining,
                answered_count,
            })
            .await
            .map_err(|err| ExamError::internal(err, "Failed to update attempt time"))?;

        let outcome = if rows == 0 {
            let current = self
                .stores
                .attempts
                .get_by_association_id(&scope.association_id)
                .await
                .map_err(|err| ExamError::internal(err, "Failed to reload attempt"))?
                .ok_or(ExamError::InvalidState("exam has not been started"))?;
            if current.submit_time.is_some() {
                metrics::counter!("exam_heartbeats_total", "outcome" => "submitted").increment(1);
                return Err(ExamError::AlreadySubmitted);
            }
            tracing::debug!(
                association_id = %scope.association_id,
                attempt_id = %attempt.id,
                "Concurrent heartbeat won; reporting stored remaining time"
            );
            remaining = current.remaining_seconds;
            "conflict"
        } else {
            "charged"
        };

        self.save_answers(&attempt.id, &scope.context.user_id, answers, now).await?;

        self.events.emit(&scope.context, &attempt.id, EventKind::Heartbeat, json!({}));
        metrics::counter!("exam_heartbeats_total", "outcome" => outcome).increment(1);

        Ok(remaining)
    }
}
