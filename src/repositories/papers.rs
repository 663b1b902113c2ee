use sqlx::PgPool;

use crate::db::models::SalesPaper;

pub(crate) async fn find_enabled(pool: &PgPool, id: &str) -> Result<Option<SalesPaper>, sqlx::Error> {
    sqlx::query_as::<_, SalesPaper>(
        "SELECT id, name, recommended_minutes, is_enabled FROM sales_papers
         WHERE id = $1 AND is_enabled = TRUE",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
