//! Retention sweeper: prunes artifacts of versions outside the keep window.

use std::{collections::HashSet, sync::Arc};

use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::types::{VersionOrder, VersionStatus};

use super::{
    artifacts::{ArtifactClient, ArtifactKey},
    repos::{PagesRepo, RepoError, VersionsRepo},
};

const METRIC_SWEEP_SUPERSEDED: &str = "pagepress_sweep_superseded_total";
const METRIC_SWEEP_FAILED: &str = "pagepress_sweep_failed_total";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub page_id: Uuid,
    pub examined: usize,
    pub kept: usize,
    /// Versions whose artifacts were deleted during this sweep.
    pub pruned: usize,
    /// Versions outside the window that were already pruned or deleted.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct RetentionSweeper {
    pages: Arc<dyn PagesRepo>,
    versions: Arc<dyn VersionsRepo>,
    artifacts: ArtifactClient,
}

impl RetentionSweeper {
    pub fn new(
        pages: Arc<dyn PagesRepo>,
        versions: Arc<dyn VersionsRepo>,
        artifacts: ArtifactClient,
    ) -> Self {
        Self {
            pages,
            versions,
            artifacts,
        }
    }

    /// Keeps the `keep_count` most recent versions plus the current one and
    /// prunes the rest. Per-version failures are counted, never returned.
    pub async fn sweep(&self, page_id: Uuid, keep_count: usize) -> Result<SweepReport, RepoError> {
        let page = self
            .pages
            .find_by_id(page_id)
            .await?
            .ok_or(RepoError::NotFound)?;
        let versions = self
            .versions
            .list_versions(page_id, VersionOrder::MostRecentFirst)
            .await?;

        let mut retained: HashSet<Uuid> = versions
            .iter()
            .take(keep_count)
            .map(|version| version.id)
            .collect();
        retained.extend(page.current_version_id);

        let mut report = SweepReport {
            page_id,
            examined: versions.len(),
            ..SweepReport::default()
        };

        for version in versions {
            if retained.contains(&version.id) {
                report.kept += 1;
                continue;
            }
            if !version.artifact_retained() {
                report.skipped += 1;
                continue;
            }

            if version.status == VersionStatus::Active
                && let Err(err) = self
                    .versions
                    .update_status(version.id, VersionStatus::Superseded)
                    .await
            {
                tracing::warn!(
                    target = "application::retention",
                    %page_id,
                    version_label = %version.version_label,
                    error = %err,
                    "failed to supersede version"
                );
                report.failed += 1;
                continue;
            }

            let key = match ArtifactKey::parse(&version.artifact_key) {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(
                        target = "application::retention",
                        %page_id,
                        version_label = %version.version_label,
                        error = %err,
                        "skipping version with unusable artifact key"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            if !self.artifacts.delete(&key).await {
                report.failed += 1;
                continue;
            }

            if let Err(err) = self
                .versions
                .mark_pruned(version.id, OffsetDateTime::now_utc())
                .await
            {
                tracing::warn!(
                    target = "application::retention",
                    %page_id,
                    version_label = %version.version_label,
                    error = %err,
                    "artifact deleted but prune marker not recorded"
                );
                report.failed += 1;
                continue;
            }
            report.pruned += 1;
        }

        counter!(METRIC_SWEEP_SUPERSEDED).increment(report.pruned as u64);
        counter!(METRIC_SWEEP_FAILED).increment(report.failed as u64);
        tracing::info!(
            target = "application::retention",
            %page_id,
            kept = report.kept,
            pruned = report.pruned,
            skipped = report.skipped,
            failed = report.failed,
            "retention sweep finished"
        );

        Ok(report)
    }

    /// Runs [`Self::sweep`] on its own task; errors are logged.
    pub fn spawn(&self, page_id: Uuid, keep_count: usize) -> JoinHandle<SweepReport> {
        let sweeper = self.clone();
        tokio::spawn(async move {
            match sweeper.sweep(page_id, keep_count).await {
                Ok(report) => report,
                Err(err) => {
                    tracing::warn!(
                        target = "application::retention",
                        %page_id,
                        error = %err,
                        "retention sweep aborted"
                    );
                    SweepReport {
                        page_id,
                        ..SweepReport::default()
                    }
                }
            }
        })
    }
}
