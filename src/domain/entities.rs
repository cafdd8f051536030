//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{PublishState, VersionStatus};

/// Raw editor model persisted alongside the page.
///
/// `content` and `theme` keep the editor's loose JSON shape; the render
/// boundary flattens them into a fixed structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredContent {
    pub sections: Vec<String>,
    pub content: serde_json::Value,
    pub theme: serde_json::Value,
    #[serde(default)]
    pub analytics_opt_in: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageRecord {
    pub id: Uuid,
    pub slug: String,
    pub owner_id: String,
    pub project_token: String,
    pub title: String,
    pub description: Option<String>,
    pub preview_image: Option<String>,
    pub content: StoredContent,
    pub publish_state: PublishState,
    pub current_version_id: Option<Uuid>,
    pub last_publish_at: Option<OffsetDateTime>,
    pub publish_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Ledger entry pointing at one immutable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    pub id: Uuid,
    pub page_id: Uuid,
    pub version_label: String,
    pub artifact_key: String,
    pub artifact_url: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub status: VersionStatus,
    pub pruned_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl VersionRecord {
    /// Whether the artifact behind this version is still expected to exist.
    pub fn artifact_retained(&self) -> bool {
        self.pruned_at.is_none() && self.status != VersionStatus::Deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub hostname: String,
    pub page_id: Uuid,
    pub version_label: String,
    pub artifact_url: String,
    pub updated_at: OffsetDateTime,
}
