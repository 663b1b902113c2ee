use sqlx::PgPool;

use crate::db::models::{Question, QuestionOption};

pub(crate) async fn list_by_paper(pool: &PgPool, paper_id: &str) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(
        "SELECT id, sales_paper_id, title, question_type, sort_order FROM questions
         WHERE sales_paper_id = $1
         ORDER BY sort_order ASC, id ASC",
    )
    .bind(paper_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_options(
    pool: &PgPool,
    question_ids: &[String],
) -> Result<Vec<QuestionOption>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, QuestionOption>(
        "SELECT id, question_id, description, sort_order FROM question_options
         WHERE question_id = ANY($1)
         ORDER BY question_id ASC, sort_order ASC",
    )
    .bind(question_ids)
    .fetch_all(pool)
    .await
}
