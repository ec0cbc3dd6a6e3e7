//! Durable `Account` and the transient `AccountRuntimeState`, plus the small
//! value types shared across the pool, credential, session and media layers.
//!
//! `Account` is the row persisted in storage; `AccountRuntimeState` is
//! rebuilt from defaults on every process start and never persisted (per
//! SPEC_FULL.md §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One upstream identity: cookie triple + configId.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub session_cookie: String,
    pub host_cookie: String,
    pub session_index: String,
    pub config_id: String,
    pub user_agent: Option<String>,
    pub enabled: bool,
    pub temp_mail_url: Option<String>,
    pub last_cookie_refresh_at: Option<i64>,
    /// Insertion order; used as the stable round-robin tie-break.
    pub sort: i64,
}

/// A quota dimension a request can be tagged with. Extensible: unrecognized
/// strings round-trip through `Custom` instead of being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaKind {
    Images,
    Videos,
    TextQueries,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::Images => "images",
            QuotaKind::Videos => "videos",
            QuotaKind::TextQueries => "text_queries",
        }
    }
}

/// The cooldown reason attached to a whole-account or per-quota cooldown.
/// Durations per SPEC_FULL.md §3/§4.4 — distinct from the HTTP
/// status buckets in `gateway/routing/cooldown.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownKind {
    AuthError,
    RateLimit,
    Generic,
    QuotaDaily,
}

impl CooldownKind {
    /// Duration in seconds, given `now` (needed only for `QuotaDaily`, which
    /// resets at the next America/Los_Angeles midnight).
    pub fn duration_secs(&self, now: i64) -> i64 {
        match self {
            CooldownKind::AuthError => 15 * 60,
            CooldownKind::RateLimit => 5 * 60,
            CooldownKind::Generic => 2 * 60,
            CooldownKind::QuotaDaily => crate::time::seconds_until_next_pacific_midnight(now),
        }
    }
}

/// A bounded record of a recent account error, kept for operator visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: &'static str,
    pub http_status: Option<u16>,
    pub detail: String,
    pub at: i64,
}

pub const ERROR_RING_CAPACITY: usize = 5;

/// Transient, in-memory, per-account state. Never persisted — rebuilt at
/// startup to defaults (SPEC_FULL.md §3).
#[derive(Debug, Clone, Default)]
pub struct AccountRuntimeState {
    pub jwt: Option<String>,
    pub jwt_fetched_at: i64,
    pub session: Option<String>,
    pub session_created_at: i64,
    pub session_use_count: u32,
    /// Secondary index: `conversation_id -> session name`, used only when a
    /// client supplies a stable conversation id (see SPEC_FULL.md
    /// "SUPPLEMENTED FEATURES"). Absent a conversation id, `session` above
    /// is the single per-account session spec.md §3 describes.
    pub conversation_sessions: HashMap<String, ConversationSession>,
    pub cooldown_until: i64,
    pub cooldown_reason: Option<CooldownKind>,
    pub per_quota_cooldowns: HashMap<QuotaKind, i64>,
    pub cookie_expired: bool,
    pub errors: Vec<ErrorRecord>,
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub session: String,
    pub created_at: i64,
    pub use_count: u32,
}

impl AccountRuntimeState {
    pub fn push_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
        if self.errors.len() > ERROR_RING_CAPACITY {
            let overflow = self.errors.len() - ERROR_RING_CAPACITY;
            self.errors.drain(0..overflow);
        }
    }
}

/// Media kind, used to pick the relevant TTL and MIME table in MediaRelay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn cache_ttl_secs(&self) -> i64 {
        match self {
            MediaKind::Image => 3600,
            MediaKind::Video => 6 * 3600,
        }
    }

    pub fn cache_dir_name(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Where the artifact's bytes are: already in hand, or need a download.
#[derive(Debug, Clone)]
pub enum MediaSource {
    Inline(Vec<u8>),
    Base64(String),
    Remote { session_name: String, file_id: String },
}

/// Descriptor for a generated image or video, produced while decoding the
/// upstream stream and consumed by MediaRelay.
#[derive(Debug, Clone)]
pub struct MediaArtifact {
    pub file_id: String,
    pub mime_type: String,
    pub suggested_filename: Option<String>,
    pub kind: MediaKind,
    pub source: MediaSource,
}

/// MIME type to file extension, per SPEC_FULL.md §4.7. Unknown MIMEs fall
/// back to `.bin`.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        _ => ".bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_ring_keeps_newest_five() {
        let mut state = AccountRuntimeState::default();
        for i in 0..8 {
            state.push_error(ErrorRecord {
                kind: "test",
                http_status: Some(500),
                detail: format!("e{i}"),
                at: i,
            });
        }
        assert_eq!(state.errors.len(), ERROR_RING_CAPACITY);
        assert_eq!(state.errors.last().unwrap().detail, "e7");
        assert_eq!(state.errors.first().unwrap().detail, "e3");
    }

    #[test]
    fn extension_for_unknown_mime_falls_back() {
        assert_eq!(extension_for_mime("application/octet-stream"), ".bin");
        assert_eq!(extension_for_mime("image/png"), ".png");
    }
}
