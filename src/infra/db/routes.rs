use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, RoutesRepo},
    domain::entities::RouteEntry,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct RouteRow {
    hostname: String,
    page_id: Uuid,
    version_label: String,
    artifact_url: String,
    updated_at: OffsetDateTime,
}

impl From<RouteRow> for RouteEntry {
    fn from(row: RouteRow) -> Self {
        Self {
            hostname: row.hostname,
            page_id: row.page_id,
            version_label: row.version_label,
            artifact_url: row.artifact_url,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl RoutesRepo for PostgresRepositories {
    async fn replace_routes(&self, entries: Vec<RouteEntry>) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO page_routes (hostname, page_id, version_label, artifact_url, updated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (hostname) DO UPDATE
                SET page_id = EXCLUDED.page_id,
                    version_label = EXCLUDED.version_label,
                    artifact_url = EXCLUDED.artifact_url,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(entry.hostname)
            .bind(entry.page_id)
            .bind(entry.version_label)
            .bind(entry.artifact_url)
            .bind(entry.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn find_route(&self, hostname: &str) -> Result<Option<RouteEntry>, RepoError> {
        let row = sqlx::query_as::<_, RouteRow>(
            r#"
            SELECT hostname, page_id, version_label, artifact_url, updated_at
            FROM page_routes
            WHERE hostname = $1
            "#,
        )
        .bind(hostname)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(RouteEntry::from))
    }
}
