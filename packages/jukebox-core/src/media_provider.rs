//! External media metadata lookup, size estimation, and audio extraction.
//!
//! Trait-based so the download queue and its tests are never coupled to a
//! particular external extraction binary. The production implementation
//! shells out to an external tool on the blocking thread pool (§5); tests use
//! a deterministic in-memory stub.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{JukeboxError, JukeboxResult};
use crate::protocol_constants::{
    EXTRACT_BITRATE_KBPS, SIZE_ESTIMATE_BUFFER_PCT_DURATION_ONLY, SIZE_ESTIMATE_BUFFER_PCT_KNOWN_SIZE,
};

/// Result of a provider search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: String,
    pub channel: String,
    pub url: String,
}

/// Metadata for a single item, omitting format enumeration in `brief` mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub duration: Option<f64>,
    pub thumbnail: String,
    pub channel: String,
    /// A provider-reported audio filesize, when available. Preferred over
    /// the duration-derived estimate by `size_estimate`.
    pub filesize: Option<u64>,
}

/// Result of [`MediaProvider::extract_audio`].
#[derive(Debug, Clone)]
pub struct ExtractedAudio {
    pub local_path: PathBuf,
    pub title: String,
    pub duration: Option<f64>,
    pub artwork: Option<String>,
}

/// Deterministic URL template for a provider's thumbnail, used because
/// search results are not guaranteed to include one.
pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

#[async_trait]
pub trait MediaProvider: Send + Sync {
    async fn search(&self, query: &str, max: usize) -> JukeboxResult<Vec<SearchResult>>;
    async fn info(&self, id: &str, brief: bool) -> JukeboxResult<VideoInfo>;

    /// Returns `(bytes, over_limit, duration)`. Fail-closed: if duration
    /// cannot be determined, returns `(None, true, None)`.
    async fn size_estimate(&self, id: &str, max_mb: u64) -> JukeboxResult<(Option<u64>, bool, Option<f64>)>;

    async fn extract_audio(&self, id: &str, format: &str, dest_dir: &Path) -> JukeboxResult<ExtractedAudio>;
}

/// Computes the fallback byte-size estimate from a duration, applying the
/// spec's buffer: 30% over the bitrate-derived estimate, or 20% over a true
/// reported size.
pub fn estimate_bytes_from_duration(duration_secs: f64) -> u64 {
    let raw = (duration_secs * (EXTRACT_BITRATE_KBPS as f64) * 1000.0 / 8.0) as u64;
    raw + raw * SIZE_ESTIMATE_BUFFER_PCT_DURATION_ONLY / 100
}

/// Applies the smaller buffer used when a true reported size is known.
pub fn apply_known_size_buffer(reported_bytes: u64) -> u64 {
    reported_bytes + reported_bytes * SIZE_ESTIMATE_BUFFER_PCT_KNOWN_SIZE / 100
}

/// Shells out to an external audio-extraction tool (e.g. a `yt-dlp`-style
/// binary named by `tool_path`) on the blocking thread pool. Metadata is
/// read back from the tool's JSON sidecar output.
pub struct ExternalToolMediaProvider {
    tool_path: String,
}

impl ExternalToolMediaProvider {
    pub fn new(tool_path: impl Into<String>) -> Self {
        Self {
            tool_path: tool_path.into(),
        }
    }
}

#[derive(Deserialize)]
struct ToolMetadata {
    id: String,
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    filesize: Option<u64>,
}

#[async_trait]
impl MediaProvider for ExternalToolMediaProvider {
    async fn search(&self, query: &str, max: usize) -> JukeboxResult<Vec<SearchResult>> {
        let tool = self.tool_path.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || {
            let output = std::process::Command::new(&tool)
                .args(["--dump-json", "--flat-playlist", &format!("ytsearch{max}:{query}")])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .map_err(|e| JukeboxError::MediaProvider(e.to_string()))?;
            if !output.status.success() {
                return Err(JukeboxError::MediaProvider(
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                ));
            }
            let mut results = Vec::new();
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                let meta: ToolMetadata = serde_json::from_str(line)
                    .map_err(|e| JukeboxError::MediaProvider(e.to_string()))?;
                results.push(SearchResult {
                    id: meta.id,
                    title: meta.title,
                    duration: meta.duration,
                    thumbnail: meta.thumbnail.unwrap_or_default(),
                    channel: meta.uploader.unwrap_or_default(),
                    url: String::new(),
                });
            }
            Ok(results)
        })
        .await
        .map_err(|e| JukeboxError::Internal(e.to_string()))?
    }

    async fn info(&self, id: &str, _brief: bool) -> JukeboxResult<VideoInfo> {
        let tool = self.tool_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let output = std::process::Command::new(&tool)
                .args(["--dump-json", "--no-playlist", &id])
                .output()
                .map_err(|e| JukeboxError::MediaProvider(e.to_string()))?;
            if !output.status.success() {
                return Err(JukeboxError::MediaProvider(
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                ));
            }
            let meta: ToolMetadata = serde_json::from_slice(&output.stdout)
                .map_err(|e| JukeboxError::MediaProvider(e.to_string()))?;
            Ok(VideoInfo {
                id: id.clone(),
                title: meta.title,
                duration: meta.duration,
                thumbnail: meta.thumbnail.unwrap_or_else(|| thumbnail_url(&id)),
                channel: meta.uploader.unwrap_or_default(),
                filesize: meta.filesize,
            })
        })
        .await
        .map_err(|e| JukeboxError::Internal(e.to_string()))?
    }

    async fn size_estimate(
        &self,
        id: &str,
        max_mb: u64,
    ) -> JukeboxResult<(Option<u64>, bool, Option<f64>)> {
        let info = self.info(id, true).await?;
        let Some(duration) = info.duration else {
            return Ok((None, true, None));
        };
        let max_bytes = max_mb * 1024 * 1024;
        let estimated = match info.filesize {
            Some(reported) => apply_known_size_buffer(reported),
            None => estimate_bytes_from_duration(duration),
        };
        Ok((Some(estimated), estimated > max_bytes, Some(duration)))
    }

    async fn extract_audio(&self, id: &str, format: &str, dest_dir: &Path) -> JukeboxResult<ExtractedAudio> {
        let tool = self.tool_path.clone();
        let id = id.to_string();
        let format = format.to_string();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let output_template = dest_dir.join("%(id)s.%(ext)s");
            let status = std::process::Command::new(&tool)
                .args([
                    "-x",
                    "--audio-format",
                    &format,
                    "--audio-quality",
                    "0",
                    "-o",
                    output_template.to_string_lossy().as_ref(),
                    &id,
                ])
                .status()
                .map_err(|e| JukeboxError::MediaProvider(e.to_string()))?;
            if !status.success() {
                return Err(JukeboxError::MediaProvider(format!(
                    "extraction tool exited with {status}"
                )));
            }
            let local_path = dest_dir.join(format!("{id}.{format}"));
            Ok(ExtractedAudio {
                local_path,
                title: id.clone(),
                duration: None,
                artwork: Some(thumbnail_url(&id)),
            })
        })
        .await
        .map_err(|e| JukeboxError::Internal(e.to_string()))?
    }
}

/// Deterministic in-memory stub: no network or subprocess access.
pub struct StubMediaProvider {
    pub fixed_duration: f64,
}

impl Default for StubMediaProvider {
    fn default() -> Self {
        Self {
            fixed_duration: 180.0,
        }
    }
}

#[async_trait]
impl MediaProvider for StubMediaProvider {
    async fn search(&self, query: &str, max: usize) -> JukeboxResult<Vec<SearchResult>> {
        Ok((0..max.min(3))
            .map(|i| SearchResult {
                id: format!("{query}-{i}"),
                title: format!("{query} result {i}"),
                duration: Some(self.fixed_duration),
                thumbnail: thumbnail_url(&format!("{query}-{i}")),
                channel: "stub-channel".into(),
                url: format!("https://example.test/{query}-{i}"),
            })
            .collect())
    }

    async fn info(&self, id: &str, _brief: bool) -> JukeboxResult<VideoInfo> {
        Ok(VideoInfo {
            id: id.to_string(),
            title: format!("title-{id}"),
            duration: Some(self.fixed_duration),
            thumbnail: thumbnail_url(id),
            channel: "stub-channel".into(),
            filesize: None,
        })
    }

    async fn size_estimate(
        &self,
        _id: &str,
        max_mb: u64,
    ) -> JukeboxResult<(Option<u64>, bool, Option<f64>)> {
        let estimated = estimate_bytes_from_duration(self.fixed_duration);
        Ok((
            Some(estimated),
            estimated > max_mb * 1024 * 1024,
            Some(self.fixed_duration),
        ))
    }

    async fn extract_audio(&self, id: &str, format: &str, dest_dir: &Path) -> JukeboxResult<ExtractedAudio> {
        let local_path = dest_dir.join(format!("{id}.{format}"));
        tokio::fs::write(&local_path, b"stub audio bytes")
            .await
            .map_err(JukeboxError::from)?;
        Ok(ExtractedAudio {
            local_path,
            title: format!("title-{id}"),
            duration: Some(self.fixed_duration),
            artwork: Some(thumbnail_url(id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_size_buffer_adds_twenty_percent() {
        assert_eq!(apply_known_size_buffer(1000), 1200);
    }

    #[test]
    fn duration_estimate_adds_thirty_percent() {
        let bytes = estimate_bytes_from_duration(100.0);
        let raw = 100.0 * 192.0 * 1000.0 / 8.0;
        assert_eq!(bytes, (raw + raw * 0.3) as u64);
    }

    #[tokio::test]
    async fn stub_size_estimate_is_not_fail_closed_when_duration_known() {
        let provider = StubMediaProvider::default();
        let (bytes, over, duration) = provider.size_estimate("abc", 1000).await.unwrap();
        assert!(bytes.is_some());
        assert!(!over);
        assert_eq!(duration, Some(180.0));
    }

    #[tokio::test]
    async fn stub_extract_audio_writes_a_file() {
        let provider = StubMediaProvider::default();
        let dir = tempfile::tempdir().unwrap();
        let extracted = provider.extract_audio("abc", "mp3", dir.path()).await.unwrap();
        assert!(extracted.local_path.exists());
    }
}
