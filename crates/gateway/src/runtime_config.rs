//! Env-var-driven runtime configuration, cached in atomics/`OnceLock`s and
//! reloadable via `reload_from_env()` — same shape as `gateway/core/runtime_config.rs`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;

static UPSTREAM_CLIENT: OnceLock<Client> = OnceLock::new();
static RUNTIME_CONFIG_LOADED: OnceLock<()> = OnceLock::new();

static UPSTREAM_CONNECT_TIMEOUT_SECS: AtomicU64 = AtomicU64::new(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS);
static UPSTREAM_STREAM_TIMEOUT_SECS: AtomicU64 = AtomicU64::new(DEFAULT_UPSTREAM_STREAM_TIMEOUT_SECS);
static CREDENTIAL_TIMEOUT_SECS: AtomicU64 = AtomicU64::new(DEFAULT_CREDENTIAL_TIMEOUT_SECS);
static CANDIDATE_CACHE_TTL_MS: AtomicU64 = AtomicU64::new(DEFAULT_CANDIDATE_CACHE_TTL_MS);
static TRACE_BODY_PREVIEW_MAX_BYTES: AtomicUsize =
    AtomicUsize::new(DEFAULT_TRACE_BODY_PREVIEW_MAX_BYTES);
static MEDIA_CACHE_IMAGE_TTL_SECS: AtomicU64 = AtomicU64::new(DEFAULT_MEDIA_CACHE_IMAGE_TTL_SECS);
static MEDIA_CACHE_VIDEO_TTL_SECS: AtomicU64 = AtomicU64::new(DEFAULT_MEDIA_CACHE_VIDEO_TTL_SECS);

pub(crate) const DEFAULT_GATEWAY_DEBUG: bool = false;
const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 15;
/// Hard cap on the upstream streaming call, per SPEC_FULL.md §5.
const DEFAULT_UPSTREAM_STREAM_TIMEOUT_SECS: u64 = 300;
/// Hard cap on JWT fetch / session create / upload, per SPEC_FULL.md §5.
const DEFAULT_CREDENTIAL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CANDIDATE_CACHE_TTL_MS: u64 = 500;
const DEFAULT_TRACE_BODY_PREVIEW_MAX_BYTES: usize = 256;
const DEFAULT_MEDIA_CACHE_IMAGE_TTL_SECS: u64 = 3600;
const DEFAULT_MEDIA_CACHE_VIDEO_TTL_SECS: u64 = 6 * 3600;

const ENV_UPSTREAM_CONNECT_TIMEOUT_SECS: &str = "ASSISTGW_UPSTREAM_CONNECT_TIMEOUT_SECS";
const ENV_UPSTREAM_STREAM_TIMEOUT_SECS: &str = "ASSISTGW_UPSTREAM_STREAM_TIMEOUT_SECS";
const ENV_CREDENTIAL_TIMEOUT_SECS: &str = "ASSISTGW_CREDENTIAL_TIMEOUT_SECS";
const ENV_CANDIDATE_CACHE_TTL_MS: &str = "ASSISTGW_CANDIDATE_CACHE_TTL_MS";
const ENV_TRACE_BODY_PREVIEW_MAX_BYTES: &str = "ASSISTGW_TRACE_BODY_PREVIEW_MAX_BYTES";
const ENV_MEDIA_CACHE_IMAGE_TTL_SECS: &str = "ASSISTGW_MEDIA_CACHE_IMAGE_TTL_SECS";
const ENV_MEDIA_CACHE_VIDEO_TTL_SECS: &str = "ASSISTGW_MEDIA_CACHE_VIDEO_TTL_SECS";
const ENV_DB_PATH: &str = "ASSISTGW_DB_PATH";
const ENV_MEDIA_CACHE_DIR: &str = "ASSISTGW_MEDIA_CACHE_DIR";
const ENV_DEBUG: &str = "ASSISTGW_DEBUG";

pub fn upstream_client() -> &'static Client {
    UPSTREAM_CLIENT.get_or_init(|| {
        ensure_runtime_config_loaded();
        build_upstream_client()
    })
}

fn build_upstream_client() -> Client {
    Client::builder()
        // No total timeout: long-lived SSE responses would otherwise be cut
        // client-side; the stream cap below bounds it instead.
        .timeout(None::<Duration>)
        .connect_timeout(upstream_connect_timeout())
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn upstream_connect_timeout() -> Duration {
    ensure_runtime_config_loaded();
    Duration::from_secs(UPSTREAM_CONNECT_TIMEOUT_SECS.load(Ordering::Relaxed))
}

pub fn upstream_stream_timeout() -> Duration {
    ensure_runtime_config_loaded();
    Duration::from_secs(UPSTREAM_STREAM_TIMEOUT_SECS.load(Ordering::Relaxed))
}

pub fn credential_timeout() -> Duration {
    ensure_runtime_config_loaded();
    Duration::from_secs(CREDENTIAL_TIMEOUT_SECS.load(Ordering::Relaxed))
}

pub fn candidate_cache_ttl() -> Duration {
    ensure_runtime_config_loaded();
    Duration::from_millis(CANDIDATE_CACHE_TTL_MS.load(Ordering::Relaxed))
}

pub fn trace_body_preview_max_bytes() -> usize {
    ensure_runtime_config_loaded();
    TRACE_BODY_PREVIEW_MAX_BYTES.load(Ordering::Relaxed)
}

pub fn media_cache_ttl_secs(kind: assistgwcore::model::MediaKind) -> i64 {
    ensure_runtime_config_loaded();
    match kind {
        assistgwcore::model::MediaKind::Image => {
            MEDIA_CACHE_IMAGE_TTL_SECS.load(Ordering::Relaxed) as i64
        }
        assistgwcore::model::MediaKind::Video => {
            MEDIA_CACHE_VIDEO_TTL_SECS.load(Ordering::Relaxed) as i64
        }
    }
}

pub fn db_path() -> String {
    std::env::var(ENV_DB_PATH).unwrap_or_else(|_| "assistgw.db".to_string())
}

pub fn media_cache_dir() -> String {
    std::env::var(ENV_MEDIA_CACHE_DIR).unwrap_or_else(|_| ".".to_string())
}

/// Overrides the upstream auth host's base URL (scheme + host[:port]),
/// e.g. pointed at a `wiremock::MockServer` in integration tests. Unset in
/// production, where the real `business.gemini.google` host is used.
pub fn upstream_host_base_url_override() -> Option<String> {
    env_non_empty("ASSISTGW_UPSTREAM_HOST_BASE_URL")
}

/// Same as `upstream_host_base_url_override`, for the
/// `biz-discoveryengine.googleapis.com` API host.
pub fn upstream_api_host_base_url_override() -> Option<String> {
    env_non_empty("ASSISTGW_UPSTREAM_API_HOST_BASE_URL")
}

/// Shared-secret API keys accepted on `Authorization: Bearer <key>`
/// (SPEC_FULL.md §6). The real key store is an external collaborator this
/// core does not own; this env-var list is the minimal stand-in so the
/// HTTP surface can still enforce something out of the box. Empty means
/// "no keys configured" — requests are accepted unauthenticated.
pub fn configured_api_keys() -> Vec<String> {
    std::env::var("ASSISTGW_API_KEYS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

pub fn debug_enabled() -> bool {
    env_non_empty(ENV_DEBUG)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(DEFAULT_GATEWAY_DEBUG)
}

pub fn reload_from_env() {
    UPSTREAM_CONNECT_TIMEOUT_SECS.store(
        env_u64_or(ENV_UPSTREAM_CONNECT_TIMEOUT_SECS, DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
        Ordering::Relaxed,
    );
    UPSTREAM_STREAM_TIMEOUT_SECS.store(
        env_u64_or(ENV_UPSTREAM_STREAM_TIMEOUT_SECS, DEFAULT_UPSTREAM_STREAM_TIMEOUT_SECS),
        Ordering::Relaxed,
    );
    CREDENTIAL_TIMEOUT_SECS.store(
        env_u64_or(ENV_CREDENTIAL_TIMEOUT_SECS, DEFAULT_CREDENTIAL_TIMEOUT_SECS),
        Ordering::Relaxed,
    );
    CANDIDATE_CACHE_TTL_MS.store(
        env_u64_or(ENV_CANDIDATE_CACHE_TTL_MS, DEFAULT_CANDIDATE_CACHE_TTL_MS),
        Ordering::Relaxed,
    );
    TRACE_BODY_PREVIEW_MAX_BYTES.store(
        env_usize_or(ENV_TRACE_BODY_PREVIEW_MAX_BYTES, DEFAULT_TRACE_BODY_PREVIEW_MAX_BYTES),
        Ordering::Relaxed,
    );
    MEDIA_CACHE_IMAGE_TTL_SECS.store(
        env_u64_or(ENV_MEDIA_CACHE_IMAGE_TTL_SECS, DEFAULT_MEDIA_CACHE_IMAGE_TTL_SECS),
        Ordering::Relaxed,
    );
    MEDIA_CACHE_VIDEO_TTL_SECS.store(
        env_u64_or(ENV_MEDIA_CACHE_VIDEO_TTL_SECS, DEFAULT_MEDIA_CACHE_VIDEO_TTL_SECS),
        Ordering::Relaxed,
    );
}

fn ensure_runtime_config_loaded() {
    let _ = RUNTIME_CONFIG_LOADED.get_or_init(reload_from_env);
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64_or(name: &str, default: u64) -> u64 {
    env_non_empty(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize_or(name: &str, default: usize) -> usize {
    env_non_empty(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvGuard {
        key: &'static str,
        original: Option<std::ffi::OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let original = std::env::var_os(key);
            std::env::set_var(key, value);
            Self { key, original }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn reload_from_env_updates_stream_timeout() {
        let _guard = EnvGuard::set(ENV_UPSTREAM_STREAM_TIMEOUT_SECS, "42");
        reload_from_env();
        assert_eq!(upstream_stream_timeout(), Duration::from_secs(42));
    }
}
