//! Repository traits describing persistence adapters.
//!
//! Three independently failing stores back the publish pipeline: the page
//! content store, the append-only version ledger and the public route table.
//! None of them share a transaction.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{PageRecord, RouteEntry, StoredContent, VersionRecord};
use crate::domain::types::{VersionOrder, VersionStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePageParams {
    pub slug: String,
    pub owner_id: String,
    pub project_token: String,
    pub title: String,
    pub description: Option<String>,
    pub preview_image: Option<String>,
    pub content: StoredContent,
}

#[derive(Debug, Clone)]
pub struct UpdatePageContentParams {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub preview_image: Option<String>,
    pub content: StoredContent,
}

/// State changes applied to a page by the publish orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTransition {
    /// Enter `publishing`; the previous error is cleared.
    Publishing,
    /// Enter `published`, pointing the page at `version_id`.
    Published {
        version_id: Uuid,
        at: OffsetDateTime,
    },
    /// Enter `failed` with a diagnostic message.
    Failed { message: String },
}

#[derive(Debug, Clone)]
pub struct NewVersionParams {
    pub page_id: Uuid,
    pub version_label: String,
    pub artifact_key: String,
    pub artifact_url: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub status: VersionStatus,
}

/// Content store for page records and their raw editor model.
#[async_trait]
pub trait PagesRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PageRecord>, RepoError>;

    async fn find_by_token(
        &self,
        owner_id: &str,
        project_token: &str,
    ) -> Result<Option<PageRecord>, RepoError>;

    async fn count_by_owner(&self, owner_id: &str) -> Result<u64, RepoError>;

    async fn create_page(&self, params: CreatePageParams) -> Result<PageRecord, RepoError>;

    async fn update_content(&self, params: UpdatePageContentParams)
    -> Result<PageRecord, RepoError>;

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: PublishTransition,
    ) -> Result<PageRecord, RepoError>;
}

/// Append-only ledger of artifact versions.
///
/// The ledger never enforces a single active version; the orchestrator owns
/// that invariant through `PageRecord::current_version_id`.
#[async_trait]
pub trait VersionsRepo: Send + Sync {
    async fn append_version(&self, params: NewVersionParams) -> Result<VersionRecord, RepoError>;

    async fn list_versions(
        &self,
        page_id: Uuid,
        order: VersionOrder,
    ) -> Result<Vec<VersionRecord>, RepoError>;

    async fn find_version(
        &self,
        page_id: Uuid,
        version_label: &str,
    ) -> Result<Option<VersionRecord>, RepoError>;

    async fn update_status(&self, id: Uuid, status: VersionStatus) -> Result<(), RepoError>;

    async fn mark_pruned(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError>;
}

/// Public hostname → artifact mapping.
#[async_trait]
pub trait RoutesRepo: Send + Sync {
    /// Overwrite every entry in one step: readers observe either all previous
    /// entries or all new ones.
    async fn replace_routes(&self, entries: Vec<RouteEntry>) -> Result<(), RepoError>;

    async fn find_route(&self, hostname: &str) -> Result<Option<RouteEntry>, RepoError>;
}
