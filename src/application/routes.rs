//! Route table publisher: public hostname → live artifact.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{entities::RouteEntry, slug::normalize_host};

use super::repos::{RepoError, RoutesRepo};

#[derive(Clone)]
pub struct RoutePublisher {
    routes: Arc<dyn RoutesRepo>,
}

impl RoutePublisher {
    pub fn new(routes: Arc<dyn RoutesRepo>) -> Self {
        Self { routes }
    }

    /// Points every hostname at `artifact_url` in one write.
    ///
    /// Must only be called once the version named by `version_label` exists in
    /// the ledger.
    pub async fn atomic_publish(
        &self,
        page_id: Uuid,
        hostnames: &[String],
        version_label: &str,
        artifact_url: &str,
    ) -> Result<(), RepoError> {
        let updated_at = OffsetDateTime::now_utc();
        let mut entries: Vec<RouteEntry> = Vec::with_capacity(hostnames.len());
        for hostname in hostnames {
            let hostname = normalize_host(hostname);
            if hostname.is_empty() || entries.iter().any(|entry| entry.hostname == hostname) {
                continue;
            }
            entries.push(RouteEntry {
                hostname,
                page_id,
                version_label: version_label.to_string(),
                artifact_url: artifact_url.to_string(),
                updated_at,
            });
        }

        if entries.is_empty() {
            return Ok(());
        }

        let count = entries.len();
        self.routes.replace_routes(entries).await?;
        tracing::info!(
            target = "application::routes",
            %page_id,
            version_label,
            hostnames = count,
            "route table updated"
        );
        Ok(())
    }

    pub async fn lookup(&self, host: &str) -> Result<Option<RouteEntry>, RepoError> {
        let hostname = normalize_host(host);
        if hostname.is_empty() {
            return Ok(None);
        }
        self.routes.find_route(&hostname).await
    }
}
