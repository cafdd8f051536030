use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::publish::{PublishOutcome, PublishRequest};
use crate::domain::entities::{PageRecord, StoredContent, VersionRecord};
use crate::domain::types::{PublishState, VersionStatus};

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PublishBody {
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub preview_image: Option<String>,
    pub token: String,
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default = "empty_object")]
    pub content: serde_json::Value,
    #[serde(default = "empty_object")]
    pub theme: serde_json::Value,
    #[serde(default)]
    pub analytics_opt_in: bool,
}

impl PublishBody {
    pub fn into_request(self, owner_id: String) -> PublishRequest {
        PublishRequest {
            owner_id,
            token: self.token,
            slug: self.slug.trim().to_string(),
            title: self.title,
            description: self.description.filter(|value| !value.trim().is_empty()),
            preview_image: self.preview_image.filter(|value| !value.trim().is_empty()),
            content: StoredContent {
                sections: self.sections,
                content: self.content,
                theme: self.theme,
                analytics_opt_in: self.analytics_opt_in,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub url: String,
    pub page_id: Uuid,
    pub version_label: Option<String>,
    pub publish_state: PublishState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<PublishOutcome> for PublishResponse {
    fn from(outcome: PublishOutcome) -> Self {
        Self {
            url: outcome.url,
            page_id: outcome.page_id,
            version_label: outcome.version_label,
            publish_state: outcome.state,
            error: outcome.error,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RollbackBody {
    pub version_label: String,
}

#[derive(Debug, Serialize)]
pub struct VersionView {
    pub version_label: String,
    pub status: VersionStatus,
    pub artifact_url: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub current: bool,
    pub retained: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl VersionView {
    pub fn new(version: VersionRecord, current_version_id: Option<Uuid>) -> Self {
        Self {
            current: current_version_id == Some(version.id),
            retained: version.artifact_retained(),
            version_label: version.version_label,
            status: version.status,
            artifact_url: version.artifact_url,
            size_bytes: version.size_bytes,
            checksum: version.checksum,
            created_at: version.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionListResponse {
    pub page_id: Uuid,
    pub slug: String,
    pub publish_state: PublishState,
    pub versions: Vec<VersionView>,
}

impl VersionListResponse {
    pub fn new(page: PageRecord, versions: Vec<VersionRecord>) -> Self {
        let current = page.current_version_id;
        Self {
            page_id: page.id,
            slug: page.slug,
            publish_state: page.publish_state,
            versions: versions
                .into_iter()
                .map(|version| VersionView::new(version, current))
                .collect(),
        }
    }
}
