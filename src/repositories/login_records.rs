use crate::db::models::LoginRecord;

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    record: &LoginRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sys_login_records (id, user_id, login_platform, created_at)
         VALUES ($1,$2,$3,$4)",
    )
    .bind(&record.id)
    .bind(&record.user_id)
    .bind(record.login_platform)
    .bind(record.created_at)
    .execute(executor)
    .await?;
    Ok(())
}
