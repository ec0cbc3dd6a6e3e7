//! SessionManager: ensures a valid upstream conversation session exists for
//! an account and returns its opaque name, rotating by age/use-count
//! (SPEC_FULL.md §4.3).
//!
//! Session rotation thresholds and the 12-hex-char display name are
//! grounded on `examples/original_source/app/session_manager.py`'s
//! `ensure_session_for_account`/`create_chat_session`
//! (`session_id = uuid.uuid4().hex[:12]`). Per spec.md's explicit Invariant
//! (authoritative over the original source — see DESIGN.md Open Question
//! decision #4), a JWT refresh here does **not** clear the session; only
//! the age/count rules below do.
//!
//! The per-account creation lock uses `tokio::sync::Mutex` rather than
//! `std::sync::Mutex`: its guard is held across the `client::create_session`
//! `.await`, and a `std` guard held there would make the axum handler's
//! future non-`Send`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assistgwcore::error::Result;
use assistgwcore::model::ConversationSession;
use assistgwcore::time::SharedNow;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::credential::CredentialCache;
use crate::pool::AccountPool;
use crate::upstream::client;

/// Rotate after this many uses on one session (SPEC_FULL.md §3).
const SESSION_MAX_USE_COUNT: u32 = 50;
/// Rotate after this much wall-clock age (SPEC_FULL.md §3).
const SESSION_MAX_AGE_SECS: i64 = 12 * 3600;
const SESSION_CREATE_STALE_SECS: i64 = 300;

struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    last_seen_at: i64,
}

pub struct SessionManager {
    locks: Mutex<HashMap<String, LockEntry>>,
    now: SharedNow,
}

pub struct ResolvedSession {
    pub session_name: String,
    pub jwt: String,
    pub config_id: String,
    pub user_agent: Option<String>,
}

fn new_display_name() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

impl SessionManager {
    pub fn new(now: SharedNow) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            now,
        }
    }

    fn account_lock(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        let now = self.now.now_ts();
        let mut table = self.locks.lock().expect("session lock table poisoned");
        table.retain(|_, entry| {
            Arc::strong_count(&entry.lock) > 1 || now - entry.last_seen_at < SESSION_CREATE_STALE_SECS
        });
        let entry = table.entry(account_id.to_string()).or_insert_with(|| LockEntry {
            lock: Arc::new(AsyncMutex::new(())),
            last_seen_at: now,
        });
        entry.last_seen_at = now;
        entry.lock.clone()
    }

    fn needs_rotation(&self, use_count: u32, created_at: i64, now: i64) -> bool {
        use_count >= SESSION_MAX_USE_COUNT || now - created_at >= SESSION_MAX_AGE_SECS
    }

    /// Resolves `(session, jwt, configId)` for a default (non-conversation-
    /// scoped) request, creating/rotating a session at most once per
    /// account at a time (Invariant 2).
    pub async fn session_for(
        &self,
        pool: &AccountPool,
        credentials: &CredentialCache,
        account_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<ResolvedSession> {
        let jwt = credentials.jwt_for(pool, account_id).await?;
        let account = pool
            .read_account(account_id)
            .ok_or_else(|| assistgwcore::error::GatewayError::Internal(format!("unknown account {account_id}")))?;

        let now = self.now.now_ts();

        if let Some(conversation_id) = conversation_id {
            if let Some(existing) = pool.conversation_session(account_id, conversation_id) {
                if !self.needs_rotation(existing.use_count, existing.created_at, now) {
                    pool.write_state(account_id, |state| {
                        if let Some(session) = state.conversation_sessions.get_mut(conversation_id) {
                            session.use_count += 1;
                        }
                    });
                    return Ok(ResolvedSession {
                        session_name: existing.session,
                        jwt,
                        config_id: account.config_id.clone(),
                        user_agent: account.user_agent.clone(),
                    });
                }
            }
            let lock = self.account_lock(account_id);
            let _guard = lock.lock().await;
            let display_name = new_display_name();
            let session_name =
                client::create_session(&jwt, account.user_agent.as_deref(), &account.config_id, &display_name)
                    .await?;
            let created_at = self.now.now_ts();
            pool.set_conversation_session(
                account_id,
                conversation_id,
                ConversationSession {
                    session: session_name.clone(),
                    created_at,
                    use_count: 1,
                },
            );
            return Ok(ResolvedSession {
                session_name,
                jwt,
                config_id: account.config_id.clone(),
                user_agent: account.user_agent.clone(),
            });
        }

        let existing = pool.read_state(account_id, |state| {
            (state.session.clone(), state.session_created_at, state.session_use_count)
        });
        if let Some((Some(session), created_at, use_count)) = existing.clone() {
            if !self.needs_rotation(use_count, created_at, now) {
                pool.write_state(account_id, |state| state.session_use_count += 1);
                return Ok(ResolvedSession {
                    session_name: session,
                    jwt,
                    config_id: account.config_id.clone(),
                    user_agent: account.user_agent.clone(),
                });
            }
        }

        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: another caller may have just
        // rotated this session for us.
        let recheck = pool.read_state(account_id, |state| {
            (state.session.clone(), state.session_created_at, state.session_use_count)
        });
        if let Some((Some(session), created_at, use_count)) = recheck {
            if !self.needs_rotation(use_count, created_at, self.now.now_ts()) {
                pool.write_state(account_id, |state| state.session_use_count += 1);
                return Ok(ResolvedSession {
                    session_name: session,
                    jwt,
                    config_id: account.config_id.clone(),
                    user_agent: account.user_agent.clone(),
                });
            }
        }

        let display_name = new_display_name();
        let session_name =
            client::create_session(&jwt, account.user_agent.as_deref(), &account.config_id, &display_name)
                .await?;
        let created_at = self.now.now_ts();
        pool.write_state(account_id, |state| {
            state.session = Some(session_name.clone());
            state.session_created_at = created_at;
            state.session_use_count = 1;
        });

        Ok(ResolvedSession {
            session_name,
            jwt,
            config_id: account.config_id.clone(),
            user_agent: account.user_agent.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_is_twelve_hex_chars() {
        let name = new_display_name();
        assert_eq!(name.len(), 12);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn rotation_triggers_at_fifty_uses() {
        let mgr = SessionManager::new(Arc::new(assistgwcore::time::SystemNow));
        assert!(mgr.needs_rotation(50, 0, 0));
        assert!(!mgr.needs_rotation(49, 0, 0));
    }

    #[test]
    fn rotation_triggers_after_twelve_hours() {
        let mgr = SessionManager::new(Arc::new(assistgwcore::time::SystemNow));
        assert!(mgr.needs_rotation(0, 0, SESSION_MAX_AGE_SECS + 1));
        assert!(!mgr.needs_rotation(0, 0, SESSION_MAX_AGE_SECS - 1));
    }
}
