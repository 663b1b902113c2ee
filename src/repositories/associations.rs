use sqlx::PgPool;

use crate::db::models::{Association, AssociationSummary};
use crate::db::types::Stage;

pub(crate) const COLUMNS: &str = "id, examinee_id, sales_paper_id, stage, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Association>, sqlx::Error> {
    sqlx::query_as::<_, Association>(&format!(
        "SELECT {COLUMNS} FROM examinee_sales_paper_associations WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Moves the association forward; rows already in a stage that cannot reach
/// `stage` are left untouched.
pub(crate) async fn update_stage(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    stage: Stage,
) -> Result<bool, sqlx::Error> {
    let sources: Vec<i16> = stage.sources().into_iter().map(|from| from as i16).collect();

    let result = sqlx::query(
        "UPDATE examinee_sales_paper_associations
         SET stage = $2, updated_at = (NOW() AT TIME ZONE 'utc')
         WHERE id = $1 AND stage = ANY($3)",
    )
    .bind(id)
    .bind(stage)
    .bind(sources)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_by_examinee(
    pool: &PgPool,
    examinee_id: &str,
) -> Result<Vec<AssociationSummary>, sqlx::Error> {
    sqlx::query_as::<_, AssociationSummary>(
        "SELECT a.id AS association_id, a.sales_paper_id, p.name AS paper_name, a.stage,
                p.recommended_minutes
         FROM examinee_sales_paper_associations a
         JOIN sales_papers p ON p.id = a.sales_paper_id
         WHERE a.examinee_id = $1
         ORDER BY a.created_at DESC",
    )
    .bind(examinee_id)
    .fetch_all(pool)
    .await
}
