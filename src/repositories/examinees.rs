use sqlx::PgPool;

use crate::db::models::Examinee;

pub(crate) const COLUMNS: &str =
    "id, username, email, hashed_password, is_active, created_at, updated_at";

pub(crate) async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Examinee>, sqlx::Error> {
    sqlx::query_as::<_, Examinee>(&format!(
        "SELECT {COLUMNS} FROM examinees WHERE lower(email) = lower($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
}
