use async_trait::async_trait;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CreatePageParams, PagesRepo, PublishTransition, RepoError, UpdatePageContentParams,
    },
    domain::{
        entities::{PageRecord, StoredContent},
        types::PublishState,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

const PAGE_COLUMNS: &str = "id, slug, owner_id, project_token, title, description, preview_image, \
    sections, content, theme, analytics_opt_in, publish_state, current_version_id, \
    last_publish_at, publish_error, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PageRow {
    id: Uuid,
    slug: String,
    owner_id: String,
    project_token: String,
    title: String,
    description: Option<String>,
    preview_image: Option<String>,
    sections: Json<Vec<String>>,
    content: serde_json::Value,
    theme: serde_json::Value,
    analytics_opt_in: bool,
    publish_state: PublishState,
    current_version_id: Option<Uuid>,
    last_publish_at: Option<OffsetDateTime>,
    publish_error: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PageRow> for PageRecord {
    fn from(row: PageRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            owner_id: row.owner_id,
            project_token: row.project_token,
            title: row.title,
            description: row.description,
            preview_image: row.preview_image,
            content: StoredContent {
                sections: row.sections.0,
                content: row.content,
                theme: row.theme,
                analytics_opt_in: row.analytics_opt_in,
            },
            publish_state: row.publish_state,
            current_version_id: row.current_version_id,
            last_publish_at: row.last_publish_at,
            publish_error: row.publish_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresRepositories {
    async fn fetch_page(
        &self,
        sql: &str,
        bind: PageLookup<'_>,
    ) -> Result<Option<PageRecord>, RepoError> {
        let query = sqlx::query_as::<_, PageRow>(sql);
        let query = match bind {
            PageLookup::Id(id) => query.bind(id),
            PageLookup::Slug(slug) => query.bind(slug),
            PageLookup::Token { owner_id, token } => query.bind(owner_id).bind(token),
        };
        let row = query
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PageRecord::from))
    }
}

enum PageLookup<'a> {
    Id(Uuid),
    Slug(&'a str),
    Token { owner_id: &'a str, token: &'a str },
}

#[async_trait]
impl PagesRepo for PostgresRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM published_pages WHERE id = $1");
        self.fetch_page(&sql, PageLookup::Id(id)).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PageRecord>, RepoError> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM published_pages WHERE slug = $1");
        self.fetch_page(&sql, PageLookup::Slug(slug)).await
    }

    async fn find_by_token(
        &self,
        owner_id: &str,
        project_token: &str,
    ) -> Result<Option<PageRecord>, RepoError> {
        let sql = format!(
            "SELECT {PAGE_COLUMNS} FROM published_pages WHERE owner_id = $1 AND project_token = $2"
        );
        self.fetch_page(
            &sql,
            PageLookup::Token {
                owner_id,
                token: project_token,
            },
        )
        .await
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<u64, RepoError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM published_pages WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Self::convert_count(count)
    }

    async fn create_page(&self, params: CreatePageParams) -> Result<PageRecord, RepoError> {
        let sql = format!(
            r#"
            INSERT INTO published_pages (
                id, slug, owner_id, project_token, title, description, preview_image,
                sections, content, theme, analytics_opt_in, publish_state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {PAGE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.slug)
            .bind(params.owner_id)
            .bind(params.project_token)
            .bind(params.title)
            .bind(params.description)
            .bind(params.preview_image)
            .bind(Json(params.content.sections))
            .bind(params.content.content)
            .bind(params.content.theme)
            .bind(params.content.analytics_opt_in)
            .bind(PublishState::None)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(PageRecord::from(row))
    }

    async fn update_content(
        &self,
        params: UpdatePageContentParams,
    ) -> Result<PageRecord, RepoError> {
        let sql = format!(
            r#"
            UPDATE published_pages
            SET slug = $2, title = $3, description = $4, preview_image = $5,
                sections = $6, content = $7, theme = $8, analytics_opt_in = $9,
                updated_at = now()
            WHERE id = $1
            RETURNING {PAGE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PageRow>(&sql)
            .bind(params.id)
            .bind(params.slug)
            .bind(params.title)
            .bind(params.description)
            .bind(params.preview_image)
            .bind(Json(params.content.sections))
            .bind(params.content.content)
            .bind(params.content.theme)
            .bind(params.content.analytics_opt_in)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(PageRecord::from).ok_or(RepoError::NotFound)
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: PublishTransition,
    ) -> Result<PageRecord, RepoError> {
        let query = match &transition {
            PublishTransition::Publishing => format!(
                "UPDATE published_pages SET publish_state = $2, publish_error = NULL, updated_at = now() \
                 WHERE id = $1 RETURNING {PAGE_COLUMNS}"
            ),
            PublishTransition::Published { .. } => format!(
                "UPDATE published_pages SET publish_state = $2, current_version_id = $3, \
                 last_publish_at = $4, publish_error = NULL, updated_at = now() \
                 WHERE id = $1 RETURNING {PAGE_COLUMNS}"
            ),
            PublishTransition::Failed { .. } => format!(
                "UPDATE published_pages SET publish_state = $2, publish_error = $3, updated_at = now() \
                 WHERE id = $1 RETURNING {PAGE_COLUMNS}"
            ),
        };

        let statement = sqlx::query_as::<_, PageRow>(&query).bind(id);
        let statement = match transition {
            PublishTransition::Publishing => statement.bind(PublishState::Publishing),
            PublishTransition::Published { version_id, at } => statement
                .bind(PublishState::Published)
                .bind(version_id)
                .bind(at),
            PublishTransition::Failed { message } => {
                statement.bind(PublishState::Failed).bind(message)
            }
        };

        let row = statement
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        row.map(PageRecord::from).ok_or(RepoError::NotFound)
    }
}
