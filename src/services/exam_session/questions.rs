use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{ExamEngine, ExamError, SessionScope};
use crate::db::models::{Question, QuestionOption};

/// A question as shown to the examinee. Options carry letter serials, which
/// are what heartbeat and submit send back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ExamQuestion {
    pub(crate) question_id: String,
    pub(crate) title: String,
    pub(crate) question_type: i16,
    pub(crate) order: i32,
    pub(crate) options: Vec<ExamQuestionOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ExamQuestionOption {
    pub(crate) option_id: String,
    pub(crate) description: String,
    pub(crate) serial_number: String,
}

pub(crate) fn question_cache_key(paper_id: &str) -> String {
    format!("questions:{paper_id}")
}

impl ExamEngine {
    /// Questions of the bound association's paper, served from the cache
    /// when possible. Cache failures fall through to the database.
    pub(crate) async fn questions(
        &self,
        scope: &SessionScope,
    ) -> Result<Vec<ExamQuestion>, ExamError> {
        let association = self
            .stores
            .associations
            .get_by_id(&scope.association_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load exam association"))?
            .ok_or(ExamError::NotFound("exam not found"))?;

        let key = question_cache_key(&association.sales_paper_id);
        if let Some(cached) = self.cached_questions(&key).await {
            metrics::counter!("exam_question_cache_total", "outcome" => "hit").increment(1);
            return Ok(cached);
        }
        metrics::counter!("exam_question_cache_total", "outcome" => "miss").increment(1);

        let questions = self
            .stores
            .questions
            .list_by_paper(&association.sales_paper_id)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load questions"))?;
        let question_ids: Vec<String> =
            questions.iter().map(|question| question.id.clone()).collect();
        let options = self
            .stores
            .questions
            .list_options(&question_ids)
            .await
            .map_err(|err| ExamError::internal(err, "Failed to load question options"))?;

        let assembled = assemble_questions(questions, options);

        match serde_json::to_string(&assembled) {
            Ok(encoded) => {
                if let Err(err) =
                    self.stores.cache.put(&key, &encoded, self.timing.question_cache_ttl).await
                {
                    tracing::warn!(error = %err, cache_key = %key, "Failed to cache questions");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, cache_key = %key, "Failed to encode questions");
            }
        }

        Ok(assembled)
    }

    async fn cached_questions(&self, key: &str) -> Option<Vec<ExamQuestion>> {
        let raw = match self.stores.cache.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(error = %err, cache_key = %key, "Question cache unavailable");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(questions) => Some(questions),
            Err(err) => {
                tracing::warn!(error = %err, cache_key = %key, "Discarding unreadable question cache");
                None
            }
        }
    }
}

fn assemble_questions(
    questions: Vec<Question>,
    options: Vec<QuestionOption>,
) -> Vec<ExamQuestion> {
    let mut by_question: HashMap<String, Vec<QuestionOption>> = HashMap::new();
    for option in options {
        by_question.entry(option.question_id.clone()).or_default().push(option);
    }

    questions
        .into_iter()
        .map(|question| {
            let mut options = by_question.remove(&question.id).unwrap_or_default();
            options.sort_by_key(|option| option.sort_order);
            ExamQuestion {
                options: options
                    .into_iter()
                    .map(|option| ExamQuestionOption {
                        serial_number: order_to_letter(option.sort_order),
                        option_id: option.id,
                        description: option.description,
                    })
                    .collect(),
                question_id: question.id,
                title: question.title,
                question_type: question.question_type,
                order: question.sort_order,
            }
        })
        .collect()
}

/// 0 -> "A", 1 -> "B", ...; orders outside A..=Z have no serial.
fn order_to_letter(order: i32) -> String {
    u8::try_from(order)
        .ok()
        .filter(|order| *order < 26)
        .map(|order| char::from(b'A' + order).to_string())
        .unwrap_or_default()
}
