//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

/// Lifecycle of a page's static publish pipeline.
///
/// `Published` and `Failed` are terminal for a single attempt; either may move
/// back to `Publishing` when the page is published again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "publish_state", rename_all = "snake_case")]
pub enum PublishState {
    None,
    Publishing,
    Published,
    Failed,
}

impl PublishState {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishState::None => "none",
            PublishState::Publishing => "publishing",
            PublishState::Published => "published",
            PublishState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "version_status", rename_all = "snake_case")]
pub enum VersionStatus {
    Active,
    Superseded,
    Deleted,
}

impl VersionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VersionStatus::Active => "active",
            VersionStatus::Superseded => "superseded",
            VersionStatus::Deleted => "deleted",
        }
    }
}

/// Plan-limited resources consulted before creating new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    PublishedPages,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::PublishedPages => "published_pages",
        }
    }
}

/// Ordering used when reading the version ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrder {
    MostRecentFirst,
    OldestFirst,
}
