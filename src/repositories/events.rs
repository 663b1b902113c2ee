use crate::db::models::ExamEvent;

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    event: &ExamEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exam_events (
            id, attempt_id, session_id, user_id, event_type, client_ip, user_agent,
            metadata, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
    )
    .bind(&event.id)
    .bind(&event.attempt_id)
    .bind(&event.session_id)
    .bind(&event.user_id)
    .bind(&event.event_type)
    .bind(&event.client_ip)
    .bind(&event.user_agent)
    .bind(&event.metadata)
    .bind(event.created_at)
    .execute(executor)
    .await?;
    Ok(())
}
