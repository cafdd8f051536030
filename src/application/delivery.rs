//! Public serving of published pages.
//!
//! The route table is the fast path. When it has no entry for a host, the
//! entry names a version other than the page's current one, or the artifact
//! behind the entry cannot be read, the page is rendered on demand from the
//! content store.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::domain::{
    entities::{PageRecord, RouteEntry},
    slug::slug_from_host,
    types::PublishState,
};

use super::{
    artifacts::ArtifactClient,
    publish::page_metadata,
    render::{RenderError, RenderInput, StaticRenderer},
    repos::{PagesRepo, RepoError, VersionsRepo},
    routes::RoutePublisher,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliverySource {
    Artifact { version_label: String },
    OnDemand,
}

#[derive(Debug, Clone)]
pub struct DeliveredPage {
    pub html: Bytes,
    pub source: DeliverySource,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Clone)]
pub struct DeliveryService {
    routes: RoutePublisher,
    pages: Arc<dyn PagesRepo>,
    versions: Arc<dyn VersionsRepo>,
    artifacts: ArtifactClient,
    renderer: Arc<StaticRenderer>,
    published_domain: String,
}

impl DeliveryService {
    pub fn new(
        routes: RoutePublisher,
        pages: Arc<dyn PagesRepo>,
        versions: Arc<dyn VersionsRepo>,
        artifacts: ArtifactClient,
        renderer: Arc<StaticRenderer>,
        published_domain: String,
    ) -> Self {
        Self {
            routes,
            pages,
            versions,
            artifacts,
            renderer,
            published_domain,
        }
    }

    /// `Ok(None)` when nothing is published at `host`.
    pub async fn serve(&self, host: &str) -> Result<Option<DeliveredPage>, DeliveryError> {
        match self.routes.lookup(host).await {
            Ok(Some(route)) => {
                if !self.route_is_current(&route).await {
                    tracing::info!(
                        target = "application::delivery",
                        host,
                        page_id = %route.page_id,
                        version_label = %route.version_label,
                        "route is stale; falling back to on-demand rendering"
                    );
                } else if let Some(html) = self.read_artifact(&route.artifact_url).await {
                    return Ok(Some(DeliveredPage {
                        html,
                        source: DeliverySource::Artifact {
                            version_label: route.version_label,
                        },
                    }));
                }
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(
                target = "application::delivery",
                host,
                error = %err,
                "route lookup failed; falling back to on-demand rendering"
            ),
        }

        self.render_on_demand(host).await
    }

    /// Whether `route` still names the version the page record points at.
    async fn route_is_current(&self, route: &RouteEntry) -> bool {
        match self.current_version_matches(route).await {
            Ok(current) => current,
            Err(err) => {
                tracing::warn!(
                    target = "application::delivery",
                    page_id = %route.page_id,
                    error = %err,
                    "route freshness check failed"
                );
                false
            }
        }
    }

    async fn current_version_matches(&self, route: &RouteEntry) -> Result<bool, RepoError> {
        let Some(page) = self.pages.find_by_id(route.page_id).await? else {
            return Ok(false);
        };
        let Some(current) = page.current_version_id else {
            return Ok(false);
        };
        let version = self
            .versions
            .find_version(route.page_id, &route.version_label)
            .await?;
        Ok(version.is_some_and(|version| version.id == current))
    }

    async fn read_artifact(&self, artifact_url: &str) -> Option<Bytes> {
        let key = self.artifacts.key_from_url(artifact_url)?;
        match self.artifacts.fetch(&key).await {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(
                    target = "application::delivery",
                    artifact_key = %key,
                    error = %err,
                    "artifact read failed"
                );
                None
            }
        }
    }

    async fn render_on_demand(&self, host: &str) -> Result<Option<DeliveredPage>, DeliveryError> {
        let Some(slug) = slug_from_host(host, &self.published_domain) else {
            return Ok(None);
        };
        let Some(page) = self.pages.find_by_slug(&slug).await? else {
            return Ok(None);
        };
        if page.publish_state == PublishState::None {
            return Ok(None);
        }
        self.render_page(&page, &slug).map(Some)
    }

    fn render_page(&self, page: &PageRecord, slug: &str) -> Result<DeliveredPage, DeliveryError> {
        let input = RenderInput::from_content_model(
            &page.content.sections,
            &page.content.content,
            &page.content.theme,
            page.content.analytics_opt_in,
        );
        let document = self.renderer.render(&input, &page_metadata(page))?;
        tracing::debug!(
            target = "application::delivery",
            page_id = %page.id,
            slug,
            "served on-demand render"
        );

        Ok(DeliveredPage {
            html: Bytes::from(document.html),
            source: DeliverySource::OnDemand,
        })
    }
}
