use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::{exam_error, ApiError};
use crate::api::guards::{Client, CurrentUser};
use crate::core::state::AppState;
use crate::schemas::exam::{ExamSummaryResponse, StartResponse};
use crate::services::exam_session::StartCommand;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(list_exams)).route("/:association_id/start", post(start_exam))
}

async fn list_exams(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<ExamSummaryResponse>>, ApiError> {
    let exams =
        state.engine().list_exams(&user.claims.user_id).await.map_err(exam_error(&state))?;
    Ok(Json(exams.into_iter().map(ExamSummaryResponse::from).collect()))
}

async fn start_exam(
    State(state): State<AppState>,
    Path(association_id): Path<String>,
    user: CurrentUser,
    Client(client): Client,
) -> Result<Json<StartResponse>, ApiError> {
    let outcome = state
        .engine()
        .start(StartCommand {
            access_token: &user.token,
            association_id: &association_id,
            client: &client,
        })
        .await
        .map_err(exam_error(&state))?;

    tracing::info!(
        association_id = %association_id,
        user_id = %user.claims.user_id,
        remaining_seconds = outcome.remaining_seconds,
        "Exam session started"
    );

    Ok(Json(StartResponse::from(outcome)))
}
