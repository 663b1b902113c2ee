use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Attempt;
use crate::services::stores::ActionUpdate;

pub(crate) const COLUMNS: &str = "\
    id, association_id, examinee_id, sales_paper_id, begin_time, last_action_time, \
    remaining_seconds, completed_question_count, deadline, score, comparability, usability, \
    submit_time, created_by, created_at, updated_at";

const UPDATED_BY: &str = "service";

pub(crate) async fn find_by_association_id(
    pool: &PgPool,
    association_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM examinee_answers WHERE association_id = $1"
    ))
    .bind(association_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: &Attempt,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO examinee_answers (
            id, association_id, examinee_id, sales_paper_id, begin_time, last_action_time,
            remaining_seconds, completed_question_count, deadline, score, comparability,
            usability, submit_time, created_by, updated_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$14,$15,$16)
        ON CONFLICT (association_id) DO NOTHING",
    )
    .bind(&attempt.id)
    .bind(&attempt.association_id)
    .bind(&attempt.examinee_id)
    .bind(&attempt.sales_paper_id)
    .bind(attempt.begin_time)
    .bind(attempt.last_action_time)
    .bind(attempt.remaining_seconds)
    .bind(attempt.completed_question_count)
    .bind(attempt.deadline)
    .bind(attempt.score)
    .bind(attempt.comparability)
    .bind(attempt.usability)
    .bind(attempt.submit_time)
    .bind(&attempt.created_by)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_action(
    executor: impl sqlx::PgExecutor<'_>,
    update: &ActionUpdate<'_>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE examinee_answers
         SET last_action_time = $2,
             remaining_seconds = $3,
             completed_question_count = $4,
             updated_by = $5,
             updated_at = $2
         WHERE id = $1 AND last_action_time IS NOT DISTINCT FROM $6",
    )
    .bind(update.attempt_id)
    .bind(update.new_last_action)
    .bind(update.remaining_seconds)
    .bind(update.answered_count)
    .bind(UPDATED_BY)
    .bind(update.expected_last_action)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn update_result(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    score: f64,
    comparability: i32,
    usability: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE examinee_answers
         SET score = $2, comparability = $3, usability = $4, updated_by = $5,
             updated_at = (NOW() AT TIME ZONE 'utc')
         WHERE id = $1",
    )
    .bind(attempt_id)
    .bind(score)
    .bind(comparability)
    .bind(usability)
    .bind(UPDATED_BY)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn submit_result(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
    submit_time: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE examinee_answers
         SET submit_time = $2, updated_by = $3, updated_at = $2
         WHERE id = $1",
    )
    .bind(attempt_id)
    .bind(submit_time)
    .bind(UPDATED_BY)
    .execute(executor)
    .await?;
    Ok(())
}
