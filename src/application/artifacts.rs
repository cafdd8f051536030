//! Artifact store client: versioned, immutable uploads of rendered documents.

use std::{fmt, sync::Arc, time::Duration, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const DOCUMENT_NAME: &str = "index.html";

const METRIC_UPLOAD_MS: &str = "pagepress_artifact_upload_ms";
const METRIC_UPLOAD_TIMEOUT: &str = "pagepress_artifact_upload_timeout_total";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("upload of `{key}` failed: {message}")]
    Upload { key: String, message: String },
    #[error("upload of `{key}` exceeded {timeout_secs}s")]
    Timeout { key: String, timeout_secs: u64 },
    #[error("read of `{key}` failed: {message}")]
    Read { key: String, message: String },
    #[error("delete of `{key}` failed: {message}")]
    Delete { key: String, message: String },
    #[error("artifact key `{key}` is not valid")]
    InvalidKey { key: String },
}

/// Object key of one artifact: `pages/{page_id}/{version_label}/index.html`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    pub fn for_version(page_id: Uuid, version_label: &str) -> Self {
        Self(format!("pages/{page_id}/{version_label}/{DOCUMENT_NAME}"))
    }

    /// Accepts a stored key, rejecting anything that could address outside the store.
    pub fn parse(raw: &str) -> Result<Self, ArtifactError> {
        let valid = !raw.is_empty()
            && !raw.starts_with('/')
            && raw.split('/').all(|segment| {
                !segment.is_empty()
                    && segment != "."
                    && segment != ".."
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            });
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(ArtifactError::InvalidKey {
                key: raw.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub checksum: String,
    pub size_bytes: i64,
}

/// Backend holding artifact bytes.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put_object(
        &self,
        key: &ArtifactKey,
        body: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, ArtifactError>;

    async fn get_object(&self, key: &ArtifactKey) -> Result<Option<Bytes>, ArtifactError>;

    /// Removing an absent object succeeds.
    async fn delete_object(&self, key: &ArtifactKey) -> Result<(), ArtifactError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    pub version_label: String,
    pub key: ArtifactKey,
    pub url: String,
    pub size_bytes: i64,
    pub checksum: String,
}

#[derive(Clone)]
pub struct ArtifactClient {
    store: Arc<dyn ArtifactStore>,
    public_base_url: String,
    upload_timeout: Duration,
}

impl ArtifactClient {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        public_base_url: &str,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            store,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            upload_timeout,
        }
    }

    pub fn url_for(&self, key: &ArtifactKey) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Inverse of [`Self::url_for`] for URLs issued by this client.
    pub fn key_from_url(&self, url: &str) -> Option<ArtifactKey> {
        let relative = url.strip_prefix(&self.public_base_url)?.strip_prefix('/')?;
        ArtifactKey::parse(relative).ok()
    }

    /// Uploads one rendered document under a fresh version label.
    ///
    /// The upload races a timer; losing the race is reported as
    /// [`ArtifactError::Timeout`] and nothing is assumed about the store's state.
    pub async fn put(
        &self,
        page_id: Uuid,
        html: &str,
        bundle_version: &str,
    ) -> Result<UploadedArtifact, ArtifactError> {
        let version_label =
            version_label(OffsetDateTime::now_utc(), bundle_version, Uuid::new_v4());
        let key = ArtifactKey::for_version(page_id, &version_label);
        let body = Bytes::copy_from_slice(html.as_bytes());

        let started_at = Instant::now();
        let result = tokio::time::timeout(
            self.upload_timeout,
            self.store.put_object(&key, body, HTML_CONTENT_TYPE),
        )
        .await;
        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;

        let stored = match result {
            Ok(Ok(stored)) => {
                histogram!(METRIC_UPLOAD_MS, "outcome" => "ok").record(elapsed_ms);
                stored
            }
            Ok(Err(err)) => {
                histogram!(METRIC_UPLOAD_MS, "outcome" => "error").record(elapsed_ms);
                return Err(err);
            }
            Err(_) => {
                histogram!(METRIC_UPLOAD_MS, "outcome" => "timeout").record(elapsed_ms);
                counter!(METRIC_UPLOAD_TIMEOUT).increment(1);
                return Err(ArtifactError::Timeout {
                    key: key.to_string(),
                    timeout_secs: self.upload_timeout.as_secs(),
                });
            }
        };

        tracing::debug!(
            target = "application::artifacts",
            %page_id,
            artifact_key = %key,
            size_bytes = stored.size_bytes,
            elapsed_ms,
            "artifact uploaded"
        );

        Ok(UploadedArtifact {
            url: self.url_for(&key),
            version_label,
            key,
            size_bytes: stored.size_bytes,
            checksum: stored.checksum,
        })
    }

    pub async fn fetch(&self, key: &ArtifactKey) -> Result<Option<Bytes>, ArtifactError> {
        self.store.get_object(key).await
    }

    /// Best-effort removal. Failures are logged and reported as `false`.
    pub async fn delete(&self, key: &ArtifactKey) -> bool {
        match self.store.delete_object(key).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target = "application::artifacts",
                    artifact_key = %key,
                    error = %err,
                    "artifact delete failed; object left orphaned"
                );
                false
            }
        }
    }
}

/// `v{unix_millis}-{bundle_version}-{short_id}`; unique per upload attempt.
pub fn version_label(at: OffsetDateTime, bundle_version: &str, nonce: Uuid) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    let bundle: String = bundle_version
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    let bundle = if bundle.is_empty() { "0" } else { bundle.as_str() };
    let nonce = nonce.simple().to_string();
    format!("v{millis}-{bundle}-{}", &nonce[..8])
}
