//! In-process repositories for local runs without a database, and for tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::{
    application::repos::{
        CreatePageParams, NewVersionParams, PagesRepo, PublishTransition, RepoError, RoutesRepo,
        UpdatePageContentParams, VersionsRepo,
    },
    domain::{
        entities::{PageRecord, RouteEntry, VersionRecord},
        types::{PublishState, VersionOrder, VersionStatus},
    },
};

fn read_guard<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!(
            target = "pagepress::infra::memory",
            op,
            lock_kind = "rwlock.read",
            "recovered from poisoned lock"
        );
        poisoned.into_inner()
    })
}

fn write_guard<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!(
            target = "pagepress::infra::memory",
            op,
            lock_kind = "rwlock.write",
            "recovered from poisoned lock"
        );
        poisoned.into_inner()
    })
}

/// Every repository trait over shared in-memory state. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    pages: Arc<RwLock<HashMap<Uuid, PageRecord>>>,
    // Each page's ledger in append order.
    versions: Arc<DashMap<Uuid, Vec<VersionRecord>>>,
    routes: Arc<RwLock<HashMap<String, RouteEntry>>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_version<F>(&self, id: Uuid, apply: F) -> Result<(), RepoError>
    where
        F: FnOnce(&mut VersionRecord) -> Result<(), RepoError>,
    {
        for mut ledger in self.versions.iter_mut() {
            if let Some(version) = ledger.value_mut().iter_mut().find(|version| version.id == id) {
                return apply(version);
            }
        }
        Err(RepoError::NotFound)
    }
}

fn duplicate(constraint: &str) -> RepoError {
    RepoError::Duplicate {
        constraint: constraint.to_string(),
    }
}

#[async_trait]
impl PagesRepo for InMemoryRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError> {
        Ok(read_guard(&self.pages, "pages.find_by_id").get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PageRecord>, RepoError> {
        Ok(read_guard(&self.pages, "pages.find_by_slug")
            .values()
            .find(|page| page.slug == slug)
            .cloned())
    }

    async fn find_by_token(
        &self,
        owner_id: &str,
        project_token: &str,
    ) -> Result<Option<PageRecord>, RepoError> {
        Ok(read_guard(&self.pages, "pages.find_by_token")
            .values()
            .find(|page| page.owner_id == owner_id && page.project_token == project_token)
            .cloned())
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<u64, RepoError> {
        let count = read_guard(&self.pages, "pages.count_by_owner")
            .values()
            .filter(|page| page.owner_id == owner_id)
            .count();
        u64::try_from(count).map_err(RepoError::from_persistence)
    }

    async fn create_page(&self, params: CreatePageParams) -> Result<PageRecord, RepoError> {
        let mut pages = write_guard(&self.pages, "pages.create_page");
        if pages.values().any(|page| page.slug == params.slug) {
            return Err(duplicate("published_pages_slug_key"));
        }
        if pages.values().any(|page| {
            page.owner_id == params.owner_id && page.project_token == params.project_token
        }) {
            return Err(duplicate("published_pages_owner_token_key"));
        }

        let now = OffsetDateTime::now_utc();
        let page = PageRecord {
            id: Uuid::new_v4(),
            slug: params.slug,
            owner_id: params.owner_id,
            project_token: params.project_token,
            title: params.title,
            description: params.description,
            preview_image: params.preview_image,
            content: params.content,
            publish_state: PublishState::None,
            current_version_id: None,
            last_publish_at: None,
            publish_error: None,
            created_at: now,
            updated_at: now,
        };
        pages.insert(page.id, page.clone());
        Ok(page)
    }

    async fn update_content(
        &self,
        params: UpdatePageContentParams,
    ) -> Result<PageRecord, RepoError> {
        let mut pages = write_guard(&self.pages, "pages.update_content");
        if pages
            .values()
            .any(|page| page.slug == params.slug && page.id != params.id)
        {
            return Err(duplicate("published_pages_slug_key"));
        }

        let page = pages.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        page.slug = params.slug;
        page.title = params.title;
        page.description = params.description;
        page.preview_image = params.preview_image;
        page.content = params.content;
        page.updated_at = OffsetDateTime::now_utc();
        Ok(page.clone())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: PublishTransition,
    ) -> Result<PageRecord, RepoError> {
        let mut pages = write_guard(&self.pages, "pages.apply_transition");
        let page = pages.get_mut(&id).ok_or(RepoError::NotFound)?;
        match transition {
            PublishTransition::Publishing => {
                page.publish_state = PublishState::Publishing;
                page.publish_error = None;
            }
            PublishTransition::Published { version_id, at } => {
                page.publish_state = PublishState::Published;
                page.current_version_id = Some(version_id);
                page.last_publish_at = Some(at);
                page.publish_error = None;
            }
            PublishTransition::Failed { message } => {
                page.publish_state = PublishState::Failed;
                page.publish_error = Some(message);
            }
        }
        page.updated_at = OffsetDateTime::now_utc();
        Ok(page.clone())
    }
}

#[async_trait]
impl VersionsRepo for InMemoryRepositories {
    async fn append_version(&self, params: NewVersionParams) -> Result<VersionRecord, RepoError> {
        if params.size_bytes < 0 {
            return Err(RepoError::Integrity {
                message: "size_bytes must not be negative".to_string(),
            });
        }

        let mut ledger = self.versions.entry(params.page_id).or_default();
        if ledger
            .iter()
            .any(|version| version.version_label == params.version_label)
        {
            return Err(duplicate("page_versions_page_label_key"));
        }

        let version = VersionRecord {
            id: Uuid::new_v4(),
            page_id: params.page_id,
            version_label: params.version_label,
            artifact_key: params.artifact_key,
            artifact_url: params.artifact_url,
            size_bytes: params.size_bytes,
            checksum: params.checksum,
            status: params.status,
            pruned_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        ledger.push(version.clone());
        Ok(version)
    }

    async fn list_versions(
        &self,
        page_id: Uuid,
        order: VersionOrder,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        let mut versions = self
            .versions
            .get(&page_id)
            .map(|ledger| ledger.value().clone())
            .unwrap_or_default();
        if order == VersionOrder::MostRecentFirst {
            versions.reverse();
        }
        Ok(versions)
    }

    async fn find_version(
        &self,
        page_id: Uuid,
        version_label: &str,
    ) -> Result<Option<VersionRecord>, RepoError> {
        Ok(self.versions.get(&page_id).and_then(|ledger| {
            ledger
                .iter()
                .find(|version| version.version_label == version_label)
                .cloned()
        }))
    }

    async fn update_status(&self, id: Uuid, status: VersionStatus) -> Result<(), RepoError> {
        self.with_version(id, |version| {
            version.status = status;
            Ok(())
        })
    }

    async fn mark_pruned(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        self.with_version(id, |version| {
            if version.pruned_at.is_some() {
                return Err(RepoError::NotFound);
            }
            version.pruned_at = Some(at);
            Ok(())
        })
    }
}

#[async_trait]
impl RoutesRepo for InMemoryRepositories {
    async fn replace_routes(&self, entries: Vec<RouteEntry>) -> Result<(), RepoError> {
        let mut routes = write_guard(&self.routes, "routes.replace_routes");
        for entry in entries {
            routes.insert(entry.hostname.clone(), entry);
        }
        Ok(())
    }

    async fn find_route(&self, hostname: &str) -> Result<Option<RouteEntry>, RepoError> {
        Ok(read_guard(&self.routes, "routes.find_route")
            .get(hostname)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::entities::StoredContent;

    use super::*;

    fn create_params(slug: &str, token: &str) -> CreatePageParams {
        CreatePageParams {
            slug: slug.to_string(),
            owner_id: "owner-1".to_string(),
            project_token: token.to_string(),
            title: "Title".to_string(),
            description: None,
            preview_image: None,
            content: StoredContent::default(),
        }
    }

    fn version_params(page_id: Uuid, label: &str) -> NewVersionParams {
        NewVersionParams {
            page_id,
            version_label: label.to_string(),
            artifact_key: format!("pages/{page_id}/{label}/index.html"),
            artifact_url: format!("https://cdn.test/pages/{page_id}/{label}/index.html"),
            size_bytes: 10,
            checksum: "00".to_string(),
            status: VersionStatus::Active,
        }
    }

    #[tokio::test]
    async fn slugs_and_tokens_are_unique() {
        let repos = InMemoryRepositories::new();
        repos.create_page(create_params("alpha", "t1")).await.expect("create");

        let slug_clash = repos.create_page(create_params("alpha", "t2")).await;
        assert!(matches!(slug_clash, Err(RepoError::Duplicate { .. })));

        let token_clash = repos.create_page(create_params("beta", "t1")).await;
        assert!(matches!(token_clash, Err(RepoError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn ledger_lists_in_append_order() {
        let repos = InMemoryRepositories::new();
        let page_id = Uuid::new_v4();
        for label in ["v1", "v2", "v3"] {
            repos
                .append_version(version_params(page_id, label))
                .await
                .expect("append");
        }

        let newest: Vec<_> = repos
            .list_versions(page_id, VersionOrder::MostRecentFirst)
            .await
            .expect("list")
            .into_iter()
            .map(|version| version.version_label)
            .collect();
        assert_eq!(newest, ["v3", "v2", "v1"]);

        let duplicate = repos.append_version(version_params(page_id, "v2")).await;
        assert!(matches!(duplicate, Err(RepoError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn prune_marker_is_written_once() {
        let repos = InMemoryRepositories::new();
        let version = repos
            .append_version(version_params(Uuid::new_v4(), "v1"))
            .await
            .expect("append");
        let now = OffsetDateTime::now_utc();

        repos.mark_pruned(version.id, now).await.expect("first prune");
        assert!(matches!(
            repos.mark_pruned(version.id, now).await,
            Err(RepoError::NotFound)
        ));
    }
}
