//! Artifact store backends: a local directory and a remote object endpoint.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url, header};
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::application::artifacts::{ArtifactError, ArtifactKey, ArtifactStore, StoredObject};

fn describe(key: &ArtifactKey) -> String {
    key.as_str().to_string()
}

fn stored_object(body: &[u8], key: &ArtifactKey) -> Result<StoredObject, ArtifactError> {
    let size_bytes = i64::try_from(body.len()).map_err(|_| ArtifactError::Upload {
        key: describe(key),
        message: "artifact size exceeds supported range".to_string(),
    })?;
    Ok(StoredObject {
        checksum: hex::encode(Sha256::digest(body)),
        size_bytes,
    })
}

/// Stores artifacts as files beneath a root directory.
#[derive(Debug)]
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    /// Creates the root directory if it does not exist yet.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &ArtifactKey) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(key.as_str());
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(ArtifactError::InvalidKey { key: describe(key) });
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn put_object(
        &self,
        key: &ArtifactKey,
        body: Bytes,
        _content_type: &str,
    ) -> Result<StoredObject, ArtifactError> {
        let absolute = self.resolve(key)?;
        let upload_error = |err: std::io::Error| ArtifactError::Upload {
            key: describe(key),
            message: err.to_string(),
        };

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await.map_err(upload_error)?;
        }

        // Write to a sibling temp file and rename so readers never see a partial document.
        let staging = absolute.with_extension(format!("{}.partial", Uuid::new_v4().simple()));
        let write = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(&body).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&staging, &absolute).await
        };
        if let Err(err) = write.await {
            let _ = fs::remove_file(&staging).await;
            return Err(upload_error(err));
        }

        debug!(
            target = "pagepress::infra::artifacts",
            key = %key,
            bytes = body.len(),
            "artifact written"
        );
        stored_object(&body, key)
    }

    async fn get_object(&self, key: &ArtifactKey) -> Result<Option<Bytes>, ArtifactError> {
        let absolute = self.resolve(key)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ArtifactError::Read {
                key: describe(key),
                message: err.to_string(),
            }),
        }
    }

    async fn delete_object(&self, key: &ArtifactKey) -> Result<(), ArtifactError> {
        let absolute = self.resolve(key)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(ArtifactError::Delete {
                    key: describe(key),
                    message: err.to_string(),
                });
            }
        }

        if let Some(parent) = absolute.parent() {
            // Only succeeds once the version directory is empty.
            let _ = fs::remove_dir(parent).await;
        }
        Ok(())
    }
}

/// Stores artifacts on an HTTP object endpoint accepting `PUT`/`GET`/`DELETE`
/// on `{endpoint}/{key}`.
#[derive(Debug, Clone)]
pub struct HttpArtifactStore {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpArtifactStore {
    pub fn new(endpoint: Url, token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(Self::user_agent()).build()?;
        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("pagepress/", env!("CARGO_PKG_VERSION"))
    }

    fn object_url(&self, key: &ArtifactKey) -> Result<Url, ArtifactError> {
        let base = if self.endpoint.path().ends_with('/') {
            self.endpoint.clone()
        } else {
            let mut base = self.endpoint.clone();
            base.set_path(&format!("{}/", self.endpoint.path()));
            base
        };
        base.join(key.as_str())
            .map_err(|_| ArtifactError::InvalidKey { key: describe(key) })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    async fn put_object(
        &self,
        key: &ArtifactKey,
        body: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, ArtifactError> {
        let url = self.object_url(key)?;
        let upload_error = |message: String| ArtifactError::Upload {
            key: describe(key),
            message,
        };
        let stored = stored_object(&body, key)?;

        let response = self
            .authorize(self.client.put(url))
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
            .body(body)
            .send()
            .await
            .map_err(|err| upload_error(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(upload_error(format!("status {status} body {text}")));
        }

        Ok(stored)
    }

    async fn get_object(&self, key: &ArtifactKey) -> Result<Option<Bytes>, ArtifactError> {
        let url = self.object_url(key)?;
        let read_error = |message: String| ArtifactError::Read {
            key: describe(key),
            message,
        };

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|err| read_error(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .bytes()
                .await
                .map(Some)
                .map_err(|err| read_error(err.to_string())),
            status => Err(read_error(format!("status {status}"))),
        }
    }

    async fn delete_object(&self, key: &ArtifactKey) -> Result<(), ArtifactError> {
        let url = self.object_url(key)?;
        let delete_error = |message: String| ArtifactError::Delete {
            key: describe(key),
            message,
        };

        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(|err| delete_error(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(delete_error(format!("status {status}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ArtifactKey {
        ArtifactKey::for_version(Uuid::nil(), "v1700000000000-0.1.0-abcdef01")
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path().join("artifacts")).expect("store");
        let key = key();

        let stored = store
            .put_object(&key, Bytes::from_static(b"<html></html>"), "text/html")
            .await
            .expect("put");
        assert_eq!(stored.size_bytes, 13);
        assert_eq!(stored.checksum.len(), 64);

        let fetched = store.get_object(&key).await.expect("get");
        assert_eq!(fetched.as_deref(), Some(&b"<html></html>"[..]));

        store.delete_object(&key).await.expect("delete");
        assert!(store.get_object(&key).await.expect("get").is_none());
        store.delete_object(&key).await.expect("second delete is a no-op");
    }

    #[tokio::test]
    async fn missing_object_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemArtifactStore::new(dir.path().to_path_buf()).expect("store");
        assert!(store.get_object(&key()).await.expect("get").is_none());
    }

    #[test]
    fn object_url_keeps_endpoint_prefix() {
        let endpoint = Url::parse("https://objects.example.test/bucket").expect("url");
        let store = HttpArtifactStore::new(endpoint, None).expect("client");
        let url = store.object_url(&key()).expect("object url");
        assert_eq!(
            url.as_str(),
            "https://objects.example.test/bucket/pages/00000000-0000-0000-0000-000000000000/v1700000000000-0.1.0-abcdef01/index.html"
        );
    }
}
