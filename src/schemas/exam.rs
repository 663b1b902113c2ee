use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::AssociationSummary;
use crate::db::types::Stage;
use crate::services::exam_session::{AnswerInput, ExamQuestion, ExamQuestionOption, StartOutcome};

const MAX_SERIALS_PER_ANSWER: usize = 26;
const MAX_SERIAL_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnswerPayload {
    // Stored as VARCHAR(64).
    #[validate(length(min = 1, max = 64, message = "questionId must be 1-64 characters"))]
    pub(crate) question_id: String,
    #[serde(default)]
    #[validate(custom(function = validate_serials))]
    pub(crate) selected_option_serials: Vec<String>,
}

fn validate_serials(serials: &[String]) -> Result<(), validator::ValidationError> {
    if serials.len() > MAX_SERIALS_PER_ANSWER {
        return Err(validator::ValidationError::new("too_many_option_serials"));
    }
    if serials.iter().any(|serial| serial.is_empty() || serial.len() > MAX_SERIAL_LEN) {
        return Err(validator::ValidationError::new("invalid_option_serial"));
    }
    Ok(())
}

impl From<AnswerPayload> for AnswerInput {
    fn from(payload: AnswerPayload) -> Self {
        AnswerInput {
            question_id: payload.question_id,
            selected_option_serials: payload.selected_option_serials,
        }
    }
}

impl From<AnswerInput> for AnswerPayload {
    fn from(input: AnswerInput) -> Self {
        AnswerPayload {
            question_id: input.question_id,
            selected_option_serials: input.selected_option_serials,
        }
    }
}

/// Body of heartbeat and submit calls.
#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct AnswersRequest {
    #[serde(default)]
    #[validate(
        length(max = 500, message = "too many answers in one request"),
        nested
    )]
    pub(crate) answers: Vec<AnswerPayload>,
}

impl AnswersRequest {
    pub(crate) fn into_inputs(self) -> Vec<AnswerInput> {
        self.answers.into_iter().map(AnswerInput::from).collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartResponse {
    pub(crate) exam_token: String,
    pub(crate) total_duration_seconds: i32,
    pub(crate) remaining_seconds: i32,
    pub(crate) used_seconds: i32,
}

impl From<StartOutcome> for StartResponse {
    fn from(outcome: StartOutcome) -> Self {
        StartResponse {
            exam_token: outcome.exam_token,
            total_duration_seconds: outcome.total_duration_seconds,
            remaining_seconds: outcome.remaining_seconds,
            used_seconds: outcome.used_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HeartbeatResponse {
    pub(crate) remaining_seconds: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResponse {}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerRecordResponse {
    pub(crate) answers: Vec<AnswerPayload>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionOptionResponse {
    pub(crate) question_option_id: String,
    pub(crate) description: String,
    pub(crate) serial_number: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionResponse {
    pub(crate) question_id: String,
    pub(crate) title: String,
    pub(crate) question_type_id: i16,
    pub(crate) order: i32,
    pub(crate) options: Vec<QuestionOptionResponse>,
}

impl From<ExamQuestionOption> for QuestionOptionResponse {
    fn from(option: ExamQuestionOption) -> Self {
        QuestionOptionResponse {
            question_option_id: option.option_id,
            description: option.description,
            serial_number: option.serial_number,
        }
    }
}

impl From<ExamQuestion> for QuestionResponse {
    fn from(question: ExamQuestion) -> Self {
        QuestionResponse {
            question_id: question.question_id,
            title: question.title,
            question_type_id: question.question_type,
            order: question.order,
            options: question.options.into_iter().map(QuestionOptionResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionsResponse {
    pub(crate) questions: Vec<QuestionResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExamSummaryResponse {
    pub(crate) association_id: String,
    pub(crate) sales_paper_id: String,
    pub(crate) paper_name: String,
    pub(crate) stage: Stage,
    pub(crate) stage_number: i16,
    pub(crate) recommended_minutes: i32,
}

impl From<AssociationSummary> for ExamSummaryResponse {
    fn from(summary: AssociationSummary) -> Self {
        ExamSummaryResponse {
            association_id: summary.association_id,
            sales_paper_id: summary.sales_paper_id,
            paper_name: summary.paper_name,
            stage_number: summary.stage as i16,
            stage: summary.stage,
            recommended_minutes: summary.recommended_minutes,
        }
    }
}
