use serde_json::json;

use super::answers::dedupe_answers;
use super::{submit_lock_key, submitted_marker_key, AnswerInput, ExamEngine, ExamError, SessionScope};
use crate::core::ids::prefix;
use crate::db::types::{EventKind, Stage};
use crate::services::stores::{ActionUpdate, ReleaseOutcome};

impl ExamEngine {
    /// Finalises the attempt exactly once.
    ///
    /// Order: submitted marker, lock, authoritative stage check, final time
    /// charge, answers, stage transition, marker, lock release.
    pub(crate) async fn submit(
        &self,
        scope: &SessionScope,
        answers: &[AnswerInput],
    ) -> Result<(), ExamError> {
        let marker_key = submitted_marker_key(&scope.association_id);
        let already_submitted = self
            .stores
            .locks
            .exists(&marker_key)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to check submission marker"))?;
        if already_submitted {
            metrics::counter!("exam_submissions_total", "outcome" => "already_submitted")
                .increment(1);
            return Err(ExamError::AlreadySubmitted);
        }

        let lock_key = submit_lock_key(&scope.association_id);
        let lock_value = self
            .ids
            .next_id(prefix::SUBMIT_LOCK)
            .map_err(|err| ExamError::internal(err, "Failed to allocate lock token"))?;
        let acquired = self
            .stores
            .locks
            .set_if_absent(&lock_key, &lock_value, self.timing.submit_lock_ttl)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to acquire submit lock"))?;
        if !acquired {
            metrics::counter!("exam_submissions_total", "outcome" => "busy").increment(1);
            return Err(ExamError::Busy);
        }

        let result = self.submit_locked(scope, answers).await;
        self.release_lock(&lock_key, &lock_value, &scope.association_id).await;

        match &result {
            Ok(attempt_id) => {
                metrics::counter!("exam_submissions_total", "outcome" => "submitted").increment(1);
                tracing::info!(
                    association_id = %scope.association_id,
                    attempt_id = %attempt_id,
                    user_id = %scope.context.user_id,
                    "Exam submitted"
                );
                self.events.emit(&scope.context, attempt_id, EventKind::Submit, json!({}));
            }
            Err(ExamError::AlreadySubmitted) => {
                metrics::counter!("exam_submissions_total", "outcome" => "already_submitted")
                    .increment(1);
            }
            Err(_) => {
                metrics::counter!("exam_submissions_total", "outcome" => "failed").increment(1);
            }
        }

        result.map(|_| ())
    }

    async fn submit_locked(
        &self,
        scope: &SessionScope,
        answers: &[AnswerInput],
    ) -> Result<String, ExamError> {
        let association = self
            .stores
            .associations
            .get_by_id(&scope.association_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load exam association"))?
            .ok_or(ExamError::InvalidState("exam record not found"))?;

        match association.stage {
            Stage::InProgress => {}
            Stage::Submitted => return Err(ExamError::AlreadySubmitted),
            Stage::Expired => return Err(ExamError::Expired),
            Stage::NotStarted => return Err(ExamError::InvalidState("exam is not in progress")),
        }

        let attempt = self
            .stores
            .attempts
            .get_by_association_id(&scope.association_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load attempt"))?
            .ok_or(ExamError::InvalidState("exam has not been started"))?;

        let now = self.clock.now();
        let gap = self.timing.gap(attempt.last_action_time, now);
        let remaining = (attempt.remaining_seconds - self.timing.charge_seconds(gap)).max(0);

        let rows = self
            .stores
            .attempts
            .conditional_update_action(ActionUpdate {
                attempt_id: &attempt.id,
                new_last_action: now,
                expected_last_action: attempt.last_action_time,
                remaining_seconds: remaining,
                answered_count: dedupe_answers(answers).len() as i32,
            })
            .await
            .map_err(|err| ExamError::internal(err, "Failed to record final attempt time"))?;
        if rows == 0 {
            return Err(ExamError::internal(
                format!("attempt {} changed concurrently", attempt.id),
                "Failed to record final attempt time",
            ));
        }

        self.save_answers(&attempt.id, &scope.context.user_id, answers, now).await?;

        self.stores
            .attempts
            .submit_result(&attempt.id, now)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to record submit time"))?;

        let transitioned = self
            .stores
            .associations
            .update_stage(&scope.association_id, Stage::Submitted)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to mark exam submitted"))?;
        if !transitioned {
            return Err(ExamError::InvalidState("exam is not in progress"));
        }

        if let Err(err) = self
            .stores
            .locks
            .set(&submitted_marker_key(&scope.association_id), "", self.timing.submitted_marker_ttl)
            .await
        {
            tracing::warn!(
                error = %err,
                association_id = %scope.association_id,
                "Failed to set submission marker; stage check still guards resubmits"
            );
        }

        Ok(attempt.id)
    }

    async fn release_lock(&self, lock_key: &str, lock_value: &str, association_id: &str) {
        match self.stores.locks.compare_and_delete(lock_key, lock_value).await {
            Ok(ReleaseOutcome::Deleted) => {}
            Ok(ReleaseOutcome::NotOwned) => {
                tracing::warn!(
                    association_id = %association_id,
                    lock_key = %lock_key,
                    "Submit lock expired or taken over before release"
                );
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    association_id = %association_id,
                    lock_key = %lock_key,
                    "Failed to release submit lock"
                );
            }
        }
    }
}
