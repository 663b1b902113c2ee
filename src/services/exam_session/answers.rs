use std::collections::HashMap;

use time::PrimitiveDateTime;

use super::{ExamEngine, ExamError, SessionScope};
use crate::core::ids::{prefix, IdGenerator};
use crate::db::models::{AnswerRecord, AssociationSummary};

/// Selected options for one question, as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AnswerInput {
    pub(crate) question_id: String,
    pub(crate) selected_option_serials: Vec<String>,
}

impl ExamEngine {
    /// Saved answers of the bound attempt, for restoring a reloaded page.
    pub(crate) async fn answer_record(
        &self,
        scope: &SessionScope,
    ) -> Result<Vec<AnswerInput>, ExamError> {
        let attempt = self
            .stores
            .attempts
            .get_by_association_id(&scope.association_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load attempt"))?
            .ok_or(ExamError::InvalidState("exam has not been started"))?;

        let records = self
            .stores
            .answers
            .get_by_attempt_id(&attempt.id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load saved answers"))?;

        Ok(records
            .into_iter()
            .map(|record| AnswerInput {
                selected_option_serials: decode_option_sign(&record.option_sign),
                question_id: record.question_id,
            })
            .collect())
    }

    pub(crate) async fn list_exams(
        &self,
        examinee_id: &str,
    ) -> Result<Vec<AssociationSummary>, ExamError> {
        self.stores
            .associations
            .list_by_examinee(examinee_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to list exams"))
    }

    pub(super) async fn save_answers(
        &self,
        attempt_id: &str,
        user_id: &str,
        answers: &[AnswerInput],
        now: PrimitiveDateTime,
    ) -> Result<(), ExamError> {
        if answers.is_empty() {
            return Ok(());
        }

        let records = build_records(&self.ids, attempt_id, user_id, answers, now)?;
        self.stores
            .answers
            .upsert_many(&records)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to save answers"))
    }
}

/// Collapses repeated question ids so the last submission wins.
pub(super) fn dedupe_answers(answers: &[AnswerInput]) -> Vec<&AnswerInput> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut unique: Vec<&AnswerInput> = Vec::with_capacity(answers.len());

    for answer in answers {
        match positions.get(answer.question_id.as_str()) {
            Some(&index) => unique[index] = answer,
            None => {
                positions.insert(answer.question_id.as_str(), unique.len());
                unique.push(answer);
            }
        }
    }

    unique
}

fn build_records(
    ids: &IdGenerator,
    attempt_id: &str,
    user_id: &str,
    answers: &[AnswerInput],
    now: PrimitiveDateTime,
) -> Result<Vec<AnswerRecord>, ExamError> {
    dedupe_answers(answers)
        .into_iter()
        .map(|answer| {
            let id = ids
                .next_id(prefix::ANSWER_RECORD)
                .map_err(|err| ExamError::internal(err, "Failed to allocate answer id"))?;
            let option_sign = serde_json::to_string(&answer.selected_option_serials)
                .map_err(|err| ExamError::internal(err, "Failed to encode answer"))?;

            Ok(AnswerRecord {
                id,
                attempt_id: attempt_id.to_string(),
                question_id: answer.question_id.clone(),
                option_sign,
                score: 0.0,
                created_by: user_id.to_string(),
                updated_by: user_id.to_string(),
                created_at: now,
                updated_at: now,
            })
        })
        .collect()
}

/// Stored signatures are JSON arrays of serials; anything else reads as no
/// selection.
pub(super) fn decode_option_sign(sign: &str) -> Vec<String> {
    if sign.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(sign).unwrap_or_default()
}
