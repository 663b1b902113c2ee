//! Exam-scoped endpoints. Every handler requires both the access token and
//! the exam token issued by `start`.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::{exam_error, ApiError};
use crate::api::guards::ExamScope;
use crate::core::state::AppState;
use crate::schemas::exam::{
    AnswerPayload, AnswerRecordResponse, AnswersRequest, HeartbeatResponse, QuestionResponse,
    QuestionsResponse, SubmitResponse,
};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/heartbeat", post(heartbeat))
        .route("/submit", post(submit))
        .route("/answers", get(answer_record))
        .route("/questions", get(questions))
}

async fn heartbeat(
    State(state): State<AppState>,
    ExamScope(scope): ExamScope,
    Json(payload): Json<AnswersRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let guard = scope.context.abort_guard();
    let result = state.engine().heartbeat(&scope, &payload.into_inputs()).await;
    guard.disarm();

    let remaining_seconds = result.map_err(exam_error(&state))?;
    Ok(Json(HeartbeatResponse { remaining_seconds }))
}

async fn submit(
    State(state): State<AppState>,
    ExamScope(scope): ExamScope,
    Json(payload): Json<AnswersRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let guard = scope.context.abort_guard();
    let result = state.engine().submit(&scope, &payload.into_inputs()).await;
    guard.disarm();

    result.map_err(exam_error(&state))?;
    Ok(Json(SubmitResponse {}))
}

async fn answer_record(
    State(state): State<AppState>,
    ExamScope(scope): ExamScope,
) -> Result<Json<AnswerRecordResponse>, ApiError> {
    let answers = state.engine().answer_record(&scope).await.map_err(exam_error(&state))?;
    Ok(Json(AnswerRecordResponse {
        answers: answers.into_iter().map(AnswerPayload::from).collect(),
    }))
}

async fn questions(
    State(state): State<AppState>,
    ExamScope(scope): ExamScope,
) -> Result<Json<QuestionsResponse>, ApiError> {
    let questions = state.engine().questions(&scope).await.map_err(exam_error(&state))?;
    Ok(Json(QuestionsResponse {
        questions: questions.into_iter().map(QuestionResponse::from).collect(),
    }))
}
