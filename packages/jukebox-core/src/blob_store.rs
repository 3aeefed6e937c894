//! Narrow interface over the external object store backing completed
//! ingests, plus a production adapter against Supabase Storage's HTTP REST
//! surface and an in-memory stand-in for tests.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{JukeboxError, JukeboxResult};

/// Metadata returned by [`BlobStore::info`].
#[derive(Debug, Clone)]
pub struct BlobInfo {
    pub size: u64,
}

/// Outcome of an [`BlobStore::upload`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded,
    AlreadyExists,
}

/// Capability set the ingest pipeline needs from the blob store. Kept
/// trait-based so C5 and its tests never depend on a specific backing store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> JukeboxResult<bool>;
    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> JukeboxResult<UploadOutcome>;
    async fn info(&self, key: &str) -> JukeboxResult<BlobInfo>;
    fn public_url(&self, key: &str) -> String;
}

/// Supabase Storage REST adapter. Default bucket `jukebox-tracks`, overridable
/// by `SUPABASE_BUCKET`. When `cdn_domain` is set, the public URL host is
/// rewritten to that domain while preserving the `bucket/key` path, matching
/// the reference service's Cloudflare-fronted storage convention.
pub struct SupabaseBlobStore {
    http: Client,
    base_url: String,
    api_key: String,
    bucket: String,
    cdn_domain: Option<String>,
}

impl SupabaseBlobStore {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bucket: impl Into<String>,
        cdn_domain: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            bucket: bucket.into(),
            cdn_domain,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            key
        )
    }
}

#[derive(Deserialize)]
struct ObjectInfoResponse {
    #[serde(rename = "metadata")]
    metadata: Option<ObjectMetadata>,
}

#[derive(Deserialize)]
struct ObjectMetadata {
    size: Option<u64>,
}

#[async_trait]
impl BlobStore for SupabaseBlobStore {
    async fn exists(&self, key: &str) -> JukeboxResult<bool> {
        let url = format!(
            "{}/storage/v1/object/info/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            key
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> JukeboxResult<UploadOutcome> {
        let url = self.object_url(key);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(bytes.to_vec())
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(UploadOutcome::Uploaded);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.as_u16() == 409
            || body.contains("already_exists")
            || body.contains("Duplicate")
        {
            return Ok(UploadOutcome::AlreadyExists);
        }
        Err(JukeboxError::BlobStore(format!(
            "upload failed: {status} {body}"
        )))
    }

    async fn info(&self, key: &str) -> JukeboxResult<BlobInfo> {
        let url = format!(
            "{}/storage/v1/object/info/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            key
        );
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(JukeboxError::BlobStore(format!(
                "info failed: {}",
                resp.status()
            )));
        }
        let parsed: ObjectInfoResponse = resp.json().await?;
        let size = parsed.metadata.and_then(|m| m.size).unwrap_or(0);
        Ok(BlobInfo { size })
    }

    fn public_url(&self, key: &str) -> String {
        if let Some(domain) = &self.cdn_domain {
            format!(
                "https://{}/storage/v1/object/public/{}/{}",
                domain.trim_end_matches('/'),
                self.bucket,
                key
            )
        } else {
            format!(
                "{}/storage/v1/object/public/{}/{}",
                self.base_url.trim_end_matches('/'),
                self.bucket,
                key
            )
        }
    }
}

/// In-memory implementation for tests: no network access, deterministic.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: DashMap<String, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn exists(&self, key: &str) -> JukeboxResult<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn upload(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
        upsert: bool,
    ) -> JukeboxResult<UploadOutcome> {
        if self.objects.contains_key(key) && !upsert {
            return Ok(UploadOutcome::AlreadyExists);
        }
        let existed = self.objects.contains_key(key);
        self.objects.insert(key.to_string(), bytes.to_vec());
        Ok(if existed {
            UploadOutcome::AlreadyExists
        } else {
            UploadOutcome::Uploaded
        })
    }

    async fn info(&self, key: &str) -> JukeboxResult<BlobInfo> {
        self.objects
            .get(key)
            .map(|v| BlobInfo {
                size: v.len() as u64,
            })
            .ok_or_else(|| JukeboxError::BlobStore(format!("no such object: {key}")))
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://jukebox-tracks/{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_upload_and_exists_round_trip() {
        let store = InMemoryBlobStore::new();
        assert!(!store.exists("yt-abc.mp3").await.unwrap());
        let outcome = store
            .upload("yt-abc.mp3", b"data", "audio/mpeg", true)
            .await
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Uploaded);
        assert!(store.exists("yt-abc.mp3").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_upload_without_upsert_reports_already_exists() {
        let store = InMemoryBlobStore::new();
        store
            .upload("k", b"data", "audio/mpeg", true)
            .await
            .unwrap();
        let outcome = store.upload("k", b"data", "audio/mpeg", false).await.unwrap();
        assert_eq!(outcome, UploadOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn info_reports_size() {
        let store = InMemoryBlobStore::new();
        store.upload("k", b"hello", "audio/mpeg", true).await.unwrap();
        let info = store.info("k").await.unwrap();
        assert_eq!(info.size, 5);
    }
}
