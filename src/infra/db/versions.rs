use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{NewVersionParams, RepoError, VersionsRepo},
    domain::{
        entities::VersionRecord,
        types::{VersionOrder, VersionStatus},
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const VERSION_COLUMNS: &str = "id, page_id, version_label, artifact_key, artifact_url, size_bytes, \
    checksum, status, pruned_at, created_at";

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: Uuid,
    page_id: Uuid,
    version_label: String,
    artifact_key: String,
    artifact_url: String,
    size_bytes: i64,
    checksum: String,
    status: VersionStatus,
    pruned_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl From<VersionRow> for VersionRecord {
    fn from(row: VersionRow) -> Self {
        Self {
            id: row.id,
            page_id: row.page_id,
            version_label: row.version_label,
            artifact_key: row.artifact_key,
            artifact_url: row.artifact_url,
            size_bytes: row.size_bytes,
            checksum: row.checksum,
            status: row.status,
            pruned_at: row.pruned_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl VersionsRepo for PostgresRepositories {
    async fn append_version(&self, params: NewVersionParams) -> Result<VersionRecord, RepoError> {
        let sql = format!(
            r#"
            INSERT INTO page_versions (
                id, page_id, version_label, artifact_key, artifact_url, size_bytes, checksum, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {VERSION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.page_id)
            .bind(params.version_label)
            .bind(params.artifact_key)
            .bind(params.artifact_url)
            .bind(params.size_bytes)
            .bind(params.checksum)
            .bind(params.status)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(VersionRecord::from(row))
    }

    async fn list_versions(
        &self,
        page_id: Uuid,
        order: VersionOrder,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        let direction = match order {
            VersionOrder::MostRecentFirst => "DESC",
            VersionOrder::OldestFirst => "ASC",
        };
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM page_versions WHERE page_id = $1 \
             ORDER BY created_at {direction}, version_label {direction}"
        );
        let rows = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(page_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(VersionRecord::from).collect())
    }

    async fn find_version(
        &self,
        page_id: Uuid,
        version_label: &str,
    ) -> Result<Option<VersionRecord>, RepoError> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM page_versions WHERE page_id = $1 AND version_label = $2"
        );
        let row = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(page_id)
            .bind(version_label)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(VersionRecord::from))
    }

    async fn update_status(&self, id: Uuid, status: VersionStatus) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE page_versions SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn mark_pruned(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE page_versions SET pruned_at = $2 WHERE id = $1 AND pruned_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
