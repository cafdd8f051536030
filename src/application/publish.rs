//! Publish orchestrator.
//!
//! Drives a page through `none → publishing → published | failed` across the
//! artifact store, the version ledger and the route table. The stores share
//! no transaction, so writes are ordered and partial side effects are
//! compensated instead:
//!
//! 1. render the document;
//! 2. upload the artifact (timeout-bounded, never compensated);
//! 3. append the version (on failure the artifact is deleted);
//! 4. point the page at the version (on failure the version is marked deleted
//!    and the artifact removed);
//! 5. update the route table (failure is logged only);
//! 6. detach the retention sweep.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::{
    entities::{PageRecord, StoredContent, VersionRecord},
    error::DomainError,
    slug::{hostname_for, public_url_for, validate_slug},
    types::{PublishState, ResourceKind, VersionOrder, VersionStatus},
};

use super::{
    artifacts::{ArtifactClient, ArtifactError, ArtifactKey, UploadedArtifact},
    plans::PlanLimiter,
    render::{PageMetadata, RenderError, RenderInput, StaticRenderer},
    repos::{
        CreatePageParams, NewVersionParams, PagesRepo, PublishTransition, RepoError,
        UpdatePageContentParams, VersionsRepo,
    },
    retention::{RetentionSweeper, SweepReport},
    routes::RoutePublisher,
};

const METRIC_PUBLISH: &str = "pagepress_publish_total";
const METRIC_PUBLISH_FAILED: &str = "pagepress_publish_failed_total";
const METRIC_ROUTE_FAILED: &str = "pagepress_route_update_failed_total";
const METRIC_COMPENSATION_DELETE: &str = "pagepress_compensation_delete_total";

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub published_domain: String,
    pub keep_count: usize,
    /// Identifies the client bundle the artifact was rendered against.
    pub bundle_version: String,
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub owner_id: String,
    /// Idempotency token correlating retries to one editable project.
    pub token: String,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub preview_image: Option<String>,
    pub content: StoredContent,
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub url: String,
    pub page_id: Uuid,
    pub state: PublishState,
    pub version_label: Option<String>,
    /// Diagnostic message when the static artifact path failed.
    pub error: Option<String>,
    /// Detached retention sweep, present after a successful publish.
    pub sweep: Option<JoinHandle<SweepReport>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub url: String,
    pub page_id: Uuid,
    pub version_label: String,
}

/// Rejections that happen before the state machine runs, plus failures of
/// the page store itself.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("slug `{slug}` is already taken")]
    Conflict { slug: String },
    #[error("plan limit reached for published pages")]
    PlanLimit { limit: Option<u64> },
    #[error("page not found")]
    NotFound,
    #[error("version `{label}` not found")]
    VersionNotFound { label: String },
    #[error("version `{label}` cannot be used: {reason}")]
    VersionUnavailable { label: String, reason: &'static str },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A failed publish attempt. Recorded on the page, never returned to callers.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("artifact upload failed: {0}")]
    Upload(#[from] ArtifactError),
    #[error("version ledger write failed: {0}")]
    Ledger(RepoError),
    #[error("page state update failed: {0}")]
    Transition(RepoError),
}

#[derive(Clone)]
pub struct PublishService {
    pages: Arc<dyn PagesRepo>,
    versions: Arc<dyn VersionsRepo>,
    routes: RoutePublisher,
    artifacts: ArtifactClient,
    plans: Arc<dyn PlanLimiter>,
    renderer: Arc<StaticRenderer>,
    sweeper: RetentionSweeper,
    settings: PublishSettings,
}

impl PublishService {
    pub fn new(
        pages: Arc<dyn PagesRepo>,
        versions: Arc<dyn VersionsRepo>,
        routes: RoutePublisher,
        artifacts: ArtifactClient,
        plans: Arc<dyn PlanLimiter>,
        renderer: Arc<StaticRenderer>,
        settings: PublishSettings,
    ) -> Self {
        let sweeper = RetentionSweeper::new(pages.clone(), versions.clone(), artifacts.clone());
        Self {
            pages,
            versions,
            routes,
            artifacts,
            plans,
            renderer,
            sweeper,
            settings,
        }
    }

    pub fn sweeper(&self) -> &RetentionSweeper {
        &self.sweeper
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    /// Publishes a page, creating it on first use of the request's token.
    ///
    /// Failures of the static artifact path still return `Ok`: the outcome
    /// carries `state = failed` and the page remains reachable through
    /// on-demand rendering.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome, PublishError> {
        validate_request(&request)?;
        let page = self.resolve_page(&request).await?;

        if page.publish_state == PublishState::Publishing {
            tracing::warn!(
                target = "application::publish",
                page_id = %page.id,
                slug = %page.slug,
                "publish requested while another attempt is in flight; continuing"
            );
        }

        let previous_version = page.current_version_id;
        let page = self
            .pages
            .apply_transition(page.id, PublishTransition::Publishing)
            .await?;
        counter!(METRIC_PUBLISH).increment(1);

        let url = public_url_for(&page.slug, &self.settings.published_domain);

        match self.attempt(&page).await {
            Ok(version) => {
                self.finish(&page, &version, previous_version).await;
                let sweep = self.sweeper.spawn(page.id, self.settings.keep_count);
                tracing::info!(
                    target = "application::publish",
                    page_id = %page.id,
                    slug = %page.slug,
                    version_label = %version.version_label,
                    "page published"
                );
                Ok(PublishOutcome {
                    url,
                    page_id: page.id,
                    state: PublishState::Published,
                    version_label: Some(version.version_label),
                    error: None,
                    sweep: Some(sweep),
                })
            }
            Err(failure) => {
                counter!(METRIC_PUBLISH_FAILED).increment(1);
                let message = failure.to_string();
                tracing::error!(
                    target = "application::publish",
                    page_id = %page.id,
                    slug = %page.slug,
                    error = %message,
                    "publish attempt failed"
                );
                if let Err(err) = self
                    .pages
                    .apply_transition(
                        page.id,
                        PublishTransition::Failed {
                            message: message.clone(),
                        },
                    )
                    .await
                {
                    tracing::error!(
                        target = "application::publish",
                        page_id = %page.id,
                        error = %err,
                        "failed to record publish failure"
                    );
                }
                Ok(PublishOutcome {
                    url,
                    page_id: page.id,
                    state: PublishState::Failed,
                    version_label: None,
                    error: Some(message),
                    sweep: None,
                })
            }
        }
    }

    async fn resolve_page(&self, request: &PublishRequest) -> Result<PageRecord, PublishError> {
        let slug_owner = self.pages.find_by_slug(&request.slug).await?;
        let existing = self
            .pages
            .find_by_token(&request.owner_id, &request.token)
            .await?;

        if let Some(page) = existing {
            if slug_owner.is_some_and(|other| other.id != page.id) {
                return Err(PublishError::Conflict {
                    slug: request.slug.clone(),
                });
            }
            let page = self
                .pages
                .update_content(UpdatePageContentParams {
                    id: page.id,
                    slug: request.slug.clone(),
                    title: request.title.trim().to_string(),
                    description: request.description.clone(),
                    preview_image: request.preview_image.clone(),
                    content: request.content.clone(),
                })
                .await
                .map_err(|err| conflict_on_duplicate(err, &request.slug))?;
            return Ok(page);
        }

        if slug_owner.is_some() {
            return Err(PublishError::Conflict {
                slug: request.slug.clone(),
            });
        }

        let current = self.pages.count_by_owner(&request.owner_id).await?;
        let decision = match self
            .plans
            .check_limit(&request.owner_id, ResourceKind::PublishedPages, current)
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(
                    target = "application::publish",
                    owner_id = %request.owner_id,
                    error = %err,
                    "plan lookup failed; denying page creation"
                );
                return Err(PublishError::PlanLimit { limit: None });
            }
        };
        if !decision.allowed {
            return Err(PublishError::PlanLimit {
                limit: decision.limit,
            });
        }

        self.pages
            .create_page(CreatePageParams {
                slug: request.slug.clone(),
                owner_id: request.owner_id.clone(),
                project_token: request.token.clone(),
                title: request.title.trim().to_string(),
                description: request.description.clone(),
                preview_image: request.preview_image.clone(),
                content: request.content.clone(),
            })
            .await
            .map_err(|err| conflict_on_duplicate(err, &request.slug))
    }

    /// Steps 3–5. On error every side effect this attempt made is compensated.
    async fn attempt(&self, page: &PageRecord) -> Result<VersionRecord, AttemptFailure> {
        let input = RenderInput::from_content_model(
            &page.content.sections,
            &page.content.content,
            &page.content.theme,
            page.content.analytics_opt_in,
        );
        let document = self.renderer.render(&input, &page_metadata(page))?;

        let uploaded = self
            .artifacts
            .put(page.id, &document.html, &self.settings.bundle_version)
            .await?;

        let version = match self
            .versions
            .append_version(NewVersionParams {
                page_id: page.id,
                version_label: uploaded.version_label.clone(),
                artifact_key: uploaded.key.to_string(),
                artifact_url: uploaded.url.clone(),
                size_bytes: uploaded.size_bytes,
                checksum: uploaded.checksum.clone(),
                status: VersionStatus::Active,
            })
            .await
        {
            Ok(version) => version,
            Err(err) => {
                self.compensate_upload(page.id, &uploaded).await;
                return Err(AttemptFailure::Ledger(err));
            }
        };

        if let Err(err) = self
            .pages
            .apply_transition(
                page.id,
                PublishTransition::Published {
                    version_id: version.id,
                    at: OffsetDateTime::now_utc(),
                },
            )
            .await
        {
            if let Err(status_err) = self
                .versions
                .update_status(version.id, VersionStatus::Deleted)
                .await
            {
                tracing::warn!(
                    target = "application::publish",
                    page_id = %page.id,
                    version_label = %version.version_label,
                    error = %status_err,
                    "failed to retire version after page update failure"
                );
            }
            self.compensate_upload(page.id, &uploaded).await;
            return Err(AttemptFailure::Transition(err));
        }

        Ok(version)
    }

    async fn compensate_upload(&self, page_id: Uuid, uploaded: &UploadedArtifact) {
        counter!(METRIC_COMPENSATION_DELETE).increment(1);
        let removed = self.artifacts.delete(&uploaded.key).await;
        tracing::info!(
            target = "application::publish",
            %page_id,
            artifact_key = %uploaded.key,
            removed,
            "compensated uploaded artifact"
        );
    }

    /// Post-publish bookkeeping; nothing here can fail the publish.
    async fn finish(&self, page: &PageRecord, version: &VersionRecord, previous: Option<Uuid>) {
        if let Some(previous) = previous.filter(|previous| *previous != version.id) {
            self.demote(page.id, previous).await;
        }

        let hostnames = [hostname_for(&page.slug, &self.settings.published_domain)];
        if let Err(err) = self
            .routes
            .atomic_publish(page.id, &hostnames, &version.version_label, &version.artifact_url)
            .await
        {
            counter!(METRIC_ROUTE_FAILED).increment(1);
            tracing::warn!(
                target = "application::publish",
                page_id = %page.id,
                version_label = %version.version_label,
                error = %err,
                "route table update failed; page served by on-demand rendering"
            );
        }
    }

    async fn demote(&self, page_id: Uuid, version_id: Uuid) {
        if let Err(err) = self
            .versions
            .update_status(version_id, VersionStatus::Superseded)
            .await
        {
            tracing::warn!(
                target = "application::publish",
                %page_id,
                %version_id,
                error = %err,
                "failed to supersede previous version"
            );
        }
    }

    /// Repoints a page and its route at an earlier, still retained version.
    pub async fn rollback(
        &self,
        owner_id: &str,
        slug: &str,
        version_label: &str,
    ) -> Result<RollbackOutcome, PublishError> {
        let page = self.owned_page(owner_id, slug).await?;
        let version = self.owned_version(&page, version_label).await?;
        if !version.artifact_retained() {
            return Err(PublishError::VersionUnavailable {
                label: version.version_label,
                reason: "artifact is no longer retained",
            });
        }

        let previous = page.current_version_id;
        if previous != Some(version.id) {
            self.versions
                .update_status(version.id, VersionStatus::Active)
                .await?;
            let repointed = self
                .pages
                .apply_transition(
                    page.id,
                    PublishTransition::Published {
                        version_id: version.id,
                        at: OffsetDateTime::now_utc(),
                    },
                )
                .await;
            if let Err(err) = repointed {
                if let Err(revert) = self
                    .versions
                    .update_status(version.id, version.status)
                    .await
                {
                    tracing::warn!(
                        target = "application::publish",
                        page_id = %page.id,
                        version_label = %version.version_label,
                        error = %revert,
                        "failed to restore version status after rollback failure"
                    );
                }
                return Err(err.into());
            }
        }
        self.finish(&page, &version, previous).await;

        tracing::info!(
            target = "application::publish",
            page_id = %page.id,
            version_label = %version.version_label,
            "page rolled back"
        );

        Ok(RollbackOutcome {
            url: public_url_for(&page.slug, &self.settings.published_domain),
            page_id: page.id,
            version_label: version.version_label,
        })
    }

    /// Marks a non-current version deleted and removes its artifact.
    pub async fn delete_version(
        &self,
        owner_id: &str,
        slug: &str,
        version_label: &str,
    ) -> Result<VersionRecord, PublishError> {
        let page = self.owned_page(owner_id, slug).await?;
        let mut version = self.owned_version(&page, version_label).await?;
        if page.current_version_id == Some(version.id) {
            return Err(PublishError::VersionUnavailable {
                label: version.version_label,
                reason: "version is currently live",
            });
        }
        if version.status == VersionStatus::Deleted {
            return Ok(version);
        }

        self.versions
            .update_status(version.id, VersionStatus::Deleted)
            .await?;
        version.status = VersionStatus::Deleted;

        if version.pruned_at.is_none() {
            match ArtifactKey::parse(&version.artifact_key) {
                Ok(key) => {
                    self.artifacts.delete(&key).await;
                }
                Err(err) => tracing::warn!(
                    target = "application::publish",
                    page_id = %page.id,
                    version_label = %version.version_label,
                    error = %err,
                    "version deleted without removing artifact"
                ),
            }
        }

        Ok(version)
    }

    pub async fn list_versions(
        &self,
        owner_id: &str,
        slug: &str,
    ) -> Result<(PageRecord, Vec<VersionRecord>), PublishError> {
        let page = self.owned_page(owner_id, slug).await?;
        let versions = self
            .versions
            .list_versions(page.id, VersionOrder::MostRecentFirst)
            .await?;
        Ok((page, versions))
    }

    async fn owned_page(&self, owner_id: &str, slug: &str) -> Result<PageRecord, PublishError> {
        match self.pages.find_by_slug(slug).await? {
            Some(page) if page.owner_id == owner_id => Ok(page),
            _ => Err(PublishError::NotFound),
        }
    }

    async fn owned_version(
        &self,
        page: &PageRecord,
        version_label: &str,
    ) -> Result<VersionRecord, PublishError> {
        self.versions
            .find_version(page.id, version_label)
            .await?
            .ok_or_else(|| PublishError::VersionNotFound {
                label: version_label.to_string(),
            })
    }
}

pub(crate) fn page_metadata(page: &PageRecord) -> PageMetadata {
    PageMetadata {
        page_id: page.id,
        slug: page.slug.clone(),
        title: page.title.clone(),
        description: page.description.clone(),
        preview_image: page.preview_image.clone(),
        generated_at: OffsetDateTime::now_utc(),
    }
}

fn validate_request(request: &PublishRequest) -> Result<(), DomainError> {
    validate_slug(&request.slug)?;
    if request.title.trim().is_empty() {
        return Err(DomainError::EmptyField { field: "title" });
    }
    if request.token.trim().is_empty() {
        return Err(DomainError::EmptyField { field: "token" });
    }
    if request.owner_id.trim().is_empty() {
        return Err(DomainError::EmptyField { field: "owner_id" });
    }
    Ok(())
}

fn conflict_on_duplicate(err: RepoError, slug: &str) -> PublishError {
    match err {
        RepoError::Duplicate { .. } => PublishError::Conflict {
            slug: slug.to_string(),
        },
        other => PublishError::Repo(other),
    }
}
