//! MediaRelay: materializes a MediaArtifact into a URL the client can fetch
//! (SPEC_FULL.md §4.7).
//!
//! Local-cache mode is grounded on
//! `examples/original_source/app/media_handler.py`'s `save_image_to_cache`/
//! `download_file_streaming`; external-host mode on `cfbed_upload.py`'s
//! `upload_base64_to_cfbed`/`upload_file_streaming_to_cfbed`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use assistgwcore::error::{GatewayError, Result};
use assistgwcore::model::{extension_for_mime, MediaArtifact, MediaSource};
use assistgwcore::storage::config::keys;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use rand::Rng;
use tokio::io::AsyncWriteExt;

use crate::pool::AccountPool;
use crate::runtime_config;
use crate::upstream::client;

pub struct MediaRelay {
    pool: Arc<AccountPool>,
    cache_root: PathBuf,
}

impl MediaRelay {
    pub fn new(pool: Arc<AccountPool>) -> Self {
        Self {
            pool,
            cache_root: PathBuf::from(runtime_config::media_cache_dir()),
        }
    }

    /// Turns one artifact into a client-fetchable URL, choosing local-cache
    /// or external-host mode from system config (SPEC_FULL.md §4.7).
    pub async fn relay(
        &self,
        jwt: &str,
        user_agent: Option<&str>,
        artifact: MediaArtifact,
        session_name: &str,
    ) -> Result<String> {
        let bytes = self.resolve_bytes(jwt, user_agent, session_name, &artifact).await?;

        let upload_endpoint = self.pool.get_config(keys::UPLOAD_ENDPOINT).filter(|v| !v.is_empty());
        let upload_api_token = self.pool.get_config(keys::UPLOAD_API_TOKEN).filter(|v| !v.is_empty());

        match (upload_endpoint, upload_api_token) {
            (Some(endpoint), Some(token)) => self.relay_external(&endpoint, &token, &artifact, bytes).await,
            _ => self.relay_local_cache(&artifact, bytes).await,
        }
    }

    async fn resolve_bytes(
        &self,
        jwt: &str,
        user_agent: Option<&str>,
        session_name: &str,
        artifact: &MediaArtifact,
    ) -> Result<Bytes> {
        match &artifact.source {
            MediaSource::Inline(bytes) => Ok(Bytes::from(bytes.clone())),
            MediaSource::Base64(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map(Bytes::from)
                .map_err(|err| GatewayError::Internal(format!("invalid base64 media payload: {err}"))),
            MediaSource::Remote { file_id, .. } => {
                let response = client::download_file(jwt, user_agent, session_name, file_id).await?;
                response
                    .bytes()
                    .await
                    .map_err(|err| GatewayError::AccountTransient(err.to_string()))
            }
        }
    }

    async fn relay_local_cache(&self, artifact: &MediaArtifact, bytes: Bytes) -> Result<String> {
        let dir = self.cache_root.join(artifact.kind.cache_dir_name());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| GatewayError::Internal(format!("failed to create media cache dir: {err}")))?;

        let rand_id: u64 = rand::thread_rng().gen();
        let ext = extension_for_mime(&artifact.mime_type);
        let filename = format!("{rand_id:016x}{ext}");
        let path = dir.join(&filename);

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|err| GatewayError::Internal(format!("failed to create cache file: {err}")))?;
        file.write_all(&bytes)
            .await
            .map_err(|err| GatewayError::Internal(format!("failed to write cache file: {err}")))?;

        self.evict_expired(&dir, artifact.kind.cache_ttl_secs()).await;

        Ok(format!("/{}/{}", artifact.kind.cache_dir_name(), filename))
    }

    /// Opportunistic TTL sweep: removes files older than the kind's TTL.
    /// A read racing an eviction is acceptable (serves 404), per
    /// SPEC_FULL.md §4.7.
    async fn evict_expired(&self, dir: &std::path::Path, ttl_secs: i64) {
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return;
        };
        let ttl = Duration::from_secs(ttl_secs.max(0) as u64);
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(metadata) = entry.metadata().await else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            if SystemTime::now().duration_since(modified).unwrap_or_default() > ttl {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
    }

    async fn relay_external(
        &self,
        endpoint: &str,
        token: &str,
        artifact: &MediaArtifact,
        bytes: Bytes,
    ) -> Result<String> {
        let filename = artifact
            .suggested_filename
            .clone()
            .unwrap_or_else(|| format!("media-{}{}", uuid::Uuid::new_v4().simple(), extension_for_mime(&artifact.mime_type)));

        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(filename)
            .mime_str(&artifact.mime_type)
            .map_err(|err| GatewayError::Internal(format!("invalid mime type: {err}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = runtime_config::upstream_client()
            .post(endpoint)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;

        let status = response.status();
        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::AccountTransient(format!("upload host returned {status}: {parsed}")));
        }

        let returned_path = parsed
            .get("src")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GatewayError::Internal("upload host response missing 'src'".to_string()))?;

        let base_url = self
            .pool
            .get_config(keys::IMAGE_BASE_URL)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| endpoint.trim_end_matches("/upload").trim_end_matches('/').to_string());
        let base_url = base_url.trim_end_matches('/');
        Ok(format!("{base_url}{returned_path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistgwcore::model::MediaKind;
    use assistgwcore::storage::Storage;
    use assistgwcore::time::SystemNow;

    fn relay_with_empty_pool() -> MediaRelay {
        let storage = Storage::open_in_memory().expect("open");
        let pool = Arc::new(AccountPool::new(storage, Arc::new(SystemNow)).expect("pool"));
        MediaRelay::new(pool)
    }

    #[tokio::test]
    async fn local_cache_mode_writes_file_and_returns_path_with_extension() {
        let relay = relay_with_empty_pool();
        let dir = tempfile::tempdir().unwrap();
        let relay = MediaRelay {
            pool: relay.pool,
            cache_root: dir.path().to_path_buf(),
        };
        let artifact = MediaArtifact {
            file_id: "f1".to_string(),
            mime_type: "image/png".to_string(),
            suggested_filename: None,
            kind: MediaKind::Image,
            source: MediaSource::Base64(base64::engine::general_purpose::STANDARD.encode(b"hello")),
        };
        let url = relay.relay("jwt", None, artifact, "sessions/1").await.unwrap();
        assert!(url.starts_with("/image/"));
        assert!(url.ends_with(".png"));
        let written = dir.path().join("image").join(url.trim_start_matches("/image/"));
        assert_eq!(tokio::fs::read(written).await.unwrap(), b"hello");
    }
}
