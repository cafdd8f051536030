#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use url::Url;
use uuid::Uuid;

use pagepress::application::artifacts::{
    ArtifactClient, ArtifactError, ArtifactKey, ArtifactStore, StoredObject,
};
use pagepress::application::delivery::DeliveryService;
use pagepress::application::plans::{ConfiguredPlanLimiter, PlanLimiter};
use pagepress::application::publish::{PublishRequest, PublishService, PublishSettings};
use pagepress::application::render::{RenderOptions, StaticRenderer};
use pagepress::application::repos::{
    CreatePageParams, NewVersionParams, PagesRepo, PublishTransition, RepoError, RoutesRepo,
    UpdatePageContentParams, VersionsRepo,
};
use pagepress::application::routes::RoutePublisher;
use pagepress::domain::entities::{PageRecord, RouteEntry, StoredContent, VersionRecord};
use pagepress::domain::types::{VersionOrder, VersionStatus};
use pagepress::infra::memory::InMemoryRepositories;

pub const DOMAIN: &str = "pagepress.test";
pub const ARTIFACT_BASE: &str = "https://artifacts.pagepress.test";
pub const OWNER: &str = "owner-1";

/// Artifact store keeping objects in memory and counting calls.
#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Bytes>>,
    pub puts: AtomicUsize,
    pub deletes: Mutex<Vec<String>>,
    pub put_delay: Option<Duration>,
    pub fail_puts: AtomicBool,
}

impl MemoryStore {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            put_delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn delete_count(&self, key: &str) -> usize {
        self.deletes
            .lock()
            .await
            .iter()
            .filter(|deleted| deleted.as_str() == key)
            .count()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn put_object(
        &self,
        key: &ArtifactKey,
        body: Bytes,
        _content_type: &str,
    ) -> Result<StoredObject, ArtifactError> {
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ArtifactError::Upload {
                key: key.to_string(),
                message: "store rejected the object".to_string(),
            });
        }
        let size_bytes = body.len() as i64;
        self.objects.lock().await.insert(key.to_string(), body);
        Ok(StoredObject {
            checksum: format!("sum-{size_bytes}"),
            size_bytes,
        })
    }

    async fn get_object(&self, key: &ArtifactKey) -> Result<Option<Bytes>, ArtifactError> {
        Ok(self.objects.lock().await.get(key.as_str()).cloned())
    }

    async fn delete_object(&self, key: &ArtifactKey) -> Result<(), ArtifactError> {
        self.deletes.lock().await.push(key.to_string());
        self.objects.lock().await.remove(key.as_str());
        Ok(())
    }
}

/// Ledger whose appends can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyVersions {
    pub inner: InMemoryRepositories,
    pub fail_append: Arc<AtomicBool>,
}

#[async_trait]
impl VersionsRepo for FlakyVersions {
    async fn append_version(&self, params: NewVersionParams) -> Result<VersionRecord, RepoError> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        self.inner.append_version(params).await
    }

    async fn list_versions(
        &self,
        page_id: Uuid,
        order: VersionOrder,
    ) -> Result<Vec<VersionRecord>, RepoError> {
        self.inner.list_versions(page_id, order).await
    }

    async fn find_version(
        &self,
        page_id: Uuid,
        version_label: &str,
    ) -> Result<Option<VersionRecord>, RepoError> {
        self.inner.find_version(page_id, version_label).await
    }

    async fn update_status(&self, id: Uuid, status: VersionStatus) -> Result<(), RepoError> {
        self.inner.update_status(id, status).await
    }

    async fn mark_pruned(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        self.inner.mark_pruned(id, at).await
    }
}

/// Content store whose `published` transition can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyPages {
    pub inner: InMemoryRepositories,
    pub fail_published: Arc<AtomicBool>,
}

#[async_trait]
impl PagesRepo for FlakyPages {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PageRecord>, RepoError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PageRecord>, RepoError> {
        self.inner.find_by_slug(slug).await
    }

    async fn find_by_token(
        &self,
        owner_id: &str,
        project_token: &str,
    ) -> Result<Option<PageRecord>, RepoError> {
        self.inner.find_by_token(owner_id, project_token).await
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<u64, RepoError> {
        self.inner.count_by_owner(owner_id).await
    }

    async fn create_page(&self, params: CreatePageParams) -> Result<PageRecord, RepoError> {
        self.inner.create_page(params).await
    }

    async fn update_content(
        &self,
        params: UpdatePageContentParams,
    ) -> Result<PageRecord, RepoError> {
        self.inner.update_content(params).await
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        transition: PublishTransition,
    ) -> Result<PageRecord, RepoError> {
        if matches!(transition, PublishTransition::Published { .. })
            && self.fail_published.load(Ordering::SeqCst)
        {
            return Err(RepoError::Persistence("connection reset".to_string()));
        }
        self.inner.apply_transition(id, transition).await
    }
}

/// Route table whose writes always fail.
#[derive(Clone, Default)]
pub struct BrokenRoutes;

#[async_trait]
impl RoutesRepo for BrokenRoutes {
    async fn replace_routes(&self, _entries: Vec<RouteEntry>) -> Result<(), RepoError> {
        Err(RepoError::Persistence("route table unavailable".to_string()))
    }

    async fn find_route(&self, _hostname: &str) -> Result<Option<RouteEntry>, RepoError> {
        Ok(None)
    }
}

/// Route table whose writes can be made to fail after the fact.
#[derive(Clone, Default)]
pub struct FlakyRoutes {
    pub inner: InMemoryRepositories,
    pub fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl RoutesRepo for FlakyRoutes {
    async fn replace_routes(&self, entries: Vec<RouteEntry>) -> Result<(), RepoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("route table unavailable".to_string()));
        }
        self.inner.replace_routes(entries).await
    }

    async fn find_route(&self, hostname: &str) -> Result<Option<RouteEntry>, RepoError> {
        self.inner.find_route(hostname).await
    }
}

pub fn renderer() -> Arc<StaticRenderer> {
    Arc::new(StaticRenderer::new(RenderOptions {
        published_domain: DOMAIN.to_string(),
        asset_base_url: Url::parse("https://assets.pagepress.test").expect("asset base"),
        stylesheet_href: "https://assets.pagepress.test/published.css".to_string(),
        form_script_src: "https://assets.pagepress.test/form.js".to_string(),
        analytics_script_src: "https://assets.pagepress.test/a.js".to_string(),
    }))
}

pub struct Harness {
    pub repos: InMemoryRepositories,
    pub store: Arc<MemoryStore>,
    pub publish: PublishService,
    pub delivery: DeliveryService,
}

pub struct HarnessBuilder {
    pub pages: Option<Arc<dyn PagesRepo>>,
    pub versions: Option<Arc<dyn VersionsRepo>>,
    pub routes: Option<Arc<dyn RoutesRepo>>,
    pub repos: InMemoryRepositories,
    pub store: Arc<MemoryStore>,
    pub upload_timeout: Duration,
    pub keep_count: usize,
    pub plans: Arc<dyn PlanLimiter>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            pages: None,
            versions: None,
            routes: None,
            repos: InMemoryRepositories::new(),
            store: Arc::new(MemoryStore::default()),
            upload_timeout: Duration::from_secs(15),
            keep_count: 10,
            plans: Arc::new(ConfiguredPlanLimiter::unlimited()),
        }
    }
}

impl HarnessBuilder {
    pub fn build(self) -> Harness {
        let pages = self
            .pages
            .unwrap_or_else(|| Arc::new(self.repos.clone()));
        let versions = self
            .versions
            .unwrap_or_else(|| Arc::new(self.repos.clone()));
        let routes = RoutePublisher::new(
            self.routes
                .unwrap_or_else(|| Arc::new(self.repos.clone())),
        );
        let store: Arc<dyn ArtifactStore> = self.store.clone();
        let artifacts = ArtifactClient::new(store, ARTIFACT_BASE, self.upload_timeout);
        let renderer = renderer();

        let publish = PublishService::new(
            pages.clone(),
            versions.clone(),
            routes.clone(),
            artifacts.clone(),
            self.plans,
            renderer.clone(),
            PublishSettings {
                published_domain: DOMAIN.to_string(),
                keep_count: self.keep_count,
                bundle_version: "1.4.0".to_string(),
            },
        );
        let delivery = DeliveryService::new(
            routes,
            pages,
            versions,
            artifacts,
            renderer,
            DOMAIN.to_string(),
        );

        Harness {
            repos: self.repos,
            store: self.store,
            publish,
            delivery,
        }
    }
}

pub fn demo_content() -> StoredContent {
    StoredContent {
        sections: vec!["hero".to_string(), "features".to_string()],
        content: json!({
            "hero": {
                "headline": "Launch faster",
                "subheadline": "Pages that publish themselves",
                "cta_text": "Get started",
                "cta_url": "/signup",
                "backgroundImage": "/images/hero.png"
            },
            "features": {
                "title": "Why us",
                "items": [
                    { "title": "Fast", "description": "Static documents" },
                    { "title": "Safe", "description": "Versioned artifacts" }
                ]
            }
        }),
        theme: json!({
            "typography": { "headingFont": "Poppins", "bodyFont": "Inter" },
            "colors": { "accentColor": "#3366ff" }
        }),
        analytics_opt_in: true,
    }
}

pub fn request(slug: &str, token: &str) -> PublishRequest {
    PublishRequest {
        owner_id: OWNER.to_string(),
        token: token.to_string(),
        slug: slug.to_string(),
        title: "Demo page".to_string(),
        description: Some("A page used in tests".to_string()),
        preview_image: None,
        content: demo_content(),
    }
}
