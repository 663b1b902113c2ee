use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::models::AnswerRecord;

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, question_id, option_sign, score, created_by, updated_by, \
    created_at, updated_at";

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<AnswerRecord>, sqlx::Error> {
    sqlx::query_as::<_, AnswerRecord>(&format!(
        "SELECT {COLUMNS} FROM examinee_answer_question_answers \
         WHERE attempt_id = $1 ORDER BY question_id"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn upsert_many(
    executor: impl sqlx::PgExecutor<'_>,
    records: &[AnswerRecord],
) -> Result<(), sqlx::Error> {
    if records.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO examinee_answer_question_answers ({COLUMNS}) "
    ));
    builder.push_values(records, |mut row, record| {
        row.push_bind(&record.id)
            .push_bind(&record.attempt_id)
            .push_bind(&record.question_id)
            .push_bind(&record.option_sign)
            .push_bind(record.score)
            .push_bind(&record.created_by)
            .push_bind(&record.updated_by)
            .push_bind(record.created_at)
            .push_bind(record.updated_at);
    });
    builder.push(
        " ON CONFLICT (attempt_id, question_id) DO UPDATE SET \
         option_sign = EXCLUDED.option_sign, \
         updated_by = EXCLUDED.updated_by, \
         updated_at = EXCLUDED.updated_at",
    );

    builder.build().execute(executor).await?;
    Ok(())
}
