use crate::{
    domain::FileStorage,
    errors::StorageError,
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{
    primitives::ByteStream,
    Client as S3Client,
};
use std::path::{Component, Path, PathBuf};
use tracing;

fn content_type_for(key: &str, content_type: Option<String>) -> String {
    content_type
        .or_else(|| mime_guess::from_path(key).first_raw().map(|s| s.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3FileStorage {
    /// `endpoint_url` is the LocalStack override, if any; objects are then
    /// addressed path-style under it.
    ///
    /// `public_url` hands out plain unsigned object URLs. They only resolve if
    /// the bucket (or at least its `memes/` prefix) allows anonymous
    /// `s3:GetObject`, e.g. through a bucket policy with Block Public Access
    /// turned off. Startup creates the bucket but never grants that access.
    pub fn new(client: S3Client, bucket_name: String, region: &str, endpoint_url: Option<&str>) -> Self {
        let public_base_url = match endpoint_url {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket_name),
            None => format!("https://{}.s3.{}.amazonaws.com", bucket_name, region),
        };
        Self { client, bucket_name, public_base_url }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Uploads data to S3 using PutObject. Sets Content-Type.
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        let content_type = content_type_for(key, content_type);
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, %content_type, "S3: Uploading file");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context(format!("S3: Failed to upload object with key '{}'", key))
            .map_err(|e| StorageError::UploadFailed(format!("{:#}", e)))?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}

/// Stores files below a local directory. The router serves that directory
/// at `/media`, so `base_url` normally ends in `/media`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalFileStorage {
    pub fn new(root: PathBuf, base_url: String) -> Self {
        Self { root, base_url: base_url.trim_end_matches('/').to_string() }
    }

    /// Resolves `key` under the root, refusing keys that would escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::UploadFailed(format!("invalid storage key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        tracing::debug!(key = %key, path = %path.display(), content_type = ?content_type, "Local: Writing file");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("Local: Failed to create directory '{}'", parent.display()))?;
        }
        tokio::fs::write(&path, data)
            .await
            .context(format!("Local: Failed to write file '{}'", path.display()))?;

        tracing::debug!(key = %key, "Local: Write successful");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_storage_writes_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf(), "http://localhost:3000/media/".to_string());

        storage.upload("memes/abc.jpg", vec![1, 2, 3], None).await.unwrap();

        let written = tokio::fs::read(dir.path().join("memes/abc.jpg")).await.unwrap();
        assert_eq!(written, vec![1, 2, 3]);
        assert_eq!(storage.public_url("memes/abc.jpg"), "http://localhost:3000/media/memes/abc.jpg");
    }

    #[tokio::test]
    async fn local_storage_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path().to_path_buf(), "http://localhost/media".to_string());

        for key in ["../outside.jpg", "/etc/passwd", ""] {
            assert!(matches!(
                storage.upload(key, vec![0], None).await,
                Err(StorageError::UploadFailed(_))
            ));
        }
    }

    fn s3_client() -> S3Client {
        let sdk_config = aws_config::SdkConfig::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new("eu-west-1"))
            .build();
        crate::aws_clients::create_s3_client(&sdk_config, false)
    }

    #[test]
    fn s3_public_urls_are_unsigned_object_urls() {
        let storage = S3FileStorage::new(s3_client(), "memes-bucket".to_string(), "eu-west-1", None);
        assert_eq!(
            storage.public_url("memes/abc.jpg"),
            "https://memes-bucket.s3.eu-west-1.amazonaws.com/memes/abc.jpg"
        );

        let local = S3FileStorage::new(s3_client(), "memes-bucket".to_string(), "eu-west-1", Some("http://localhost:4566/"));
        assert_eq!(local.public_url("memes/abc.jpg"), "http://localhost:4566/memes-bucket/memes/abc.jpg");
    }

    #[test]
    fn content_type_is_guessed_from_key() {
        assert_eq!(content_type_for("memes/a.jpg", None), "image/jpeg");
        assert_eq!(content_type_for("memes/a", None), "application/octet-stream");
        assert_eq!(content_type_for("memes/a.jpg", Some("image/png".into())), "image/png");
    }
}
