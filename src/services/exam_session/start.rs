use time::Duration;

use super::{ExamEngine, ExamError};
use crate::core::client::ClientInfo;
use crate::core::ids::prefix;
use crate::core::security::TokenError;
use crate::db::models::Attempt;
use crate::db::types::Stage;

pub(crate) struct StartCommand<'a> {
    pub(crate) access_token: &'a str,
    pub(crate) association_id: &'a str,
    pub(crate) client: &'a ClientInfo,
}

#[derive(Debug, Clone)]
pub(crate) struct StartOutcome {
    pub(crate) exam_token: String,
    pub(crate) total_duration_seconds: i32,
    pub(crate) remaining_seconds: i32,
    pub(crate) used_seconds: i32,
}

impl ExamEngine {
    /// Creates the attempt on first entry, reuses it afterwards, and mints an
    /// exam token covering the remaining time.
    pub(crate) async fn start(&self, command: StartCommand<'_>) -> Result<StartOutcome, ExamError> {
        let access = self
            .tokens
            .verify_access_token(command.access_token)
            .map_err(|err| TokenError::InvalidAccessToken(Box::new(err)))?;

        let association = self
            .stores
            .associations
            .get_by_id(command.association_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load exam association"))?
            .filter(|association| association.examinee_id == access.user_id)
            .ok_or(ExamError::NotFound("exam not found"))?;

        match association.stage {
            Stage::Submitted => return Err(ExamError::AlreadySubmitted),
            Stage::Expired => return Err(ExamError::Expired),
            Stage::NotStarted | Stage::InProgress => {}
        }

        let paper = self
            .stores
            .papers
            .get_enabled_paper(&association.sales_paper_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load paper"))?
            .filter(|paper| paper.is_enabled)
            .ok_or(ExamError::NotFound("paper not found"))?;

        let total_duration_seconds = paper.recommended_minutes.saturating_mul(60);
        let now = self.clock.now();

        let existing = self
            .stores
            .attempts
            .get_by_association_id(&association.id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load attempt"))?;

        let attempt = match existing {
            Some(attempt) => attempt,
            None => {
                let id = self
                    .ids
                    .next_id(prefix::ATTEMPT)
                    .map_err(|err| ExamError::internal(err, "Failed to allocate attempt id"))?;
                let attempt = Attempt {
                    id,
                    association_id: association.id.clone(),
                    examinee_id: association.examinee_id.clone(),
                    sales_paper_id: association.sales_paper_id.clone(),
                    begin_time: now,
                    last_action_time: Some(now),
                    remaining_seconds: total_duration_seconds,
                    completed_question_count: 0,
                    deadline: now + self.timing.attempt_deadline,
                    score: 0.0,
                    comparability: 0,
                    usability: 0,
                    submit_time: None,
                    created_by: access.user_id.clone(),
                    created_at: now,
                    updated_at: now,
                };

                let created = self
                    .stores
                    .attempts
                    .create(&attempt)
                    .await
                    .map_err(|err| ExamError::internal(err, "Failed to create attempt"))?;

                if created {
                    tracing::info!(
                        association_id = %association.id,
                        attempt_id = %attempt.id,
                        user_id = %access.user_id,
                        remaining_seconds = attempt.remaining_seconds,
                        "Exam attempt created"
                    );
                    attempt
                } else {
                    // A concurrent start inserted first; use its row.
                    self.stores
                        .attempts
                        .get_by_association_id(&association.id)
                        .await
                        .map_err(|err| ExamError::internal(err, "Failed to load attempt"))?
                        .ok_or_else(|| {
                            ExamError::internal("row vanished after conflict", "Failed to load attempt")
                        })?
                }
            }
        };

        if attempt.deadline < now {
            if let Err(err) =
                self.stores.associations.update_stage(&association.id, Stage::Expired).await
            {
                tracing::error!(
                    error = %err,
                    association_id = %association.id,
                    "Failed to mark association expired"
                );
            }
            tracing::info!(
                association_id = %association.id,
                attempt_id = %attempt.id,
                "Exam attempt past its deadline"
            );
            return Err(ExamError::Expired);
        }

        if association.stage == Stage::NotStarted {
            self.stores
                .associations
                .update_stage(&association.id, Stage::InProgress)
                .await
                .map_err(|err| ExamError::internal(err, "Failed to mark association in progress"))?;
        }

        let (exam_token, _) = self.tokens.issue_exam_token(
            command.access_token,
            &association.id,
            Duration::seconds(i64::from(attempt.remaining_seconds)),
            command.client,
        )?;

        Ok(StartOutcome {
            exam_token,
            total_duration_seconds,
            remaining_seconds: attempt.remaining_seconds,
            used_seconds: total_duration_seconds - attempt.remaining_seconds,
        })
    }
}
