//! CredentialCache: exchanges an account's cookies for a short-lived bearer
//! JWT, memoized with a 240s TTL (SPEC_FULL.md §4.2).
//!
//! The keyed single-flight lock table — `Arc<tokio::sync::Mutex<()>>` per
//! account id, with stale-lock reclamation via `Arc::strong_count` — is a
//! direct port of `gateway/token_exchange.rs`. There it lived behind a
//! process-wide `OnceLock<Mutex<HashMap<..>>>`; here it's a field on
//! `CredentialCache` itself, since SPEC_FULL.md §9 rules out module-level
//! singletons for anything the gateway explicitly constructs. The per-account
//! gate itself uses `tokio::sync::Mutex` rather than `std::sync::Mutex`
//! because its guard is held across the upstream `.await` in `jwt_for` —
//! a `std` guard held there would make the axum handler's future non-`Send`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assistgwcore::error::Result;
use assistgwcore::time::SharedNow;
use tokio::sync::Mutex as AsyncMutex;

use crate::pool::AccountPool;
use crate::upstream::client;

/// JWTs are considered fresh for this long (SPEC_FULL.md §3).
const JWT_TTL_SECS: i64 = 240;
/// Stale single-flight locks (no other waiters) older than this are
/// reclaimed on the same cadence as the lock table's owner module.
const LOCK_STALE_SECS: i64 = 300;

struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    last_seen_at: i64,
}

pub struct CredentialCache {
    locks: Mutex<HashMap<String, LockEntry>>,
    now: SharedNow,
}

impl CredentialCache {
    pub fn new(now: SharedNow) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            now,
        }
    }

    fn account_lock(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        let now = self.now.now_ts();
        let mut table = self.locks.lock().expect("credential lock table poisoned");
        self.maybe_cleanup(&mut table, now);
        let entry = table.entry(account_id.to_string()).or_insert_with(|| LockEntry {
            lock: Arc::new(AsyncMutex::new(())),
            last_seen_at: now,
        });
        entry.last_seen_at = now;
        entry.lock.clone()
    }

    fn maybe_cleanup(&self, table: &mut HashMap<String, LockEntry>, now: i64) {
        table.retain(|_, entry| {
            Arc::strong_count(&entry.lock) > 1 || now - entry.last_seen_at < LOCK_STALE_SECS
        });
    }

    /// Returns a JWT at most `JWT_TTL_SECS` old for the account, issuing at
    /// most one upstream refresh per account at a time; other concurrent
    /// callers observe the refresher's result (Invariant 1).
    pub async fn jwt_for(&self, pool: &AccountPool, account_id: &str) -> Result<String> {
        if let Some(fresh) = self.cached_fresh_jwt(pool, account_id) {
            return Ok(fresh);
        }

        let lock = self.account_lock(account_id);
        let _guard = lock.lock().await;

        if let Some(fresh) = self.cached_fresh_jwt(pool, account_id) {
            return Ok(fresh);
        }

        let account = pool
            .read_account(account_id)
            .ok_or_else(|| assistgwcore::error::GatewayError::Internal(format!("unknown account {account_id}")))?;
        let jwt = client::fetch_jwt(&account).await?;

        let fetched_at = self.now.now_ts();
        pool.write_state(account_id, |state| {
            state.jwt = Some(jwt.clone());
            state.jwt_fetched_at = fetched_at;
        });
        Ok(jwt)
    }

    fn cached_fresh_jwt(&self, pool: &AccountPool, account_id: &str) -> Option<String> {
        let now = self.now.now_ts();
        pool.read_state(account_id, |state| {
            let jwt = state.jwt.as_ref()?;
            if now - state.jwt_fetched_at < JWT_TTL_SECS {
                Some(jwt.clone())
            } else {
                None
            }
        })
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistgwcore::model::Account;
    use assistgwcore::storage::Storage;
    use assistgwcore::time::SystemNow;

    fn pool_with_one_account() -> AccountPool {
        let storage = Storage::open_in_memory().expect("open");
        storage
            .upsert_account(&Account {
                id: "a".into(),
                session_cookie: "sc".into(),
                host_cookie: "hc".into(),
                session_index: "0".into(),
                config_id: "cfg".into(),
                user_agent: None,
                enabled: true,
                temp_mail_url: None,
                last_cookie_refresh_at: None,
                sort: 0,
            })
            .unwrap();
        AccountPool::new(storage, Arc::new(SystemNow)).unwrap()
    }

    #[test]
    fn same_account_reuses_lock_entry() {
        let cache = CredentialCache::new(Arc::new(SystemNow));
        let lock1 = cache.account_lock("a");
        let lock2 = cache.account_lock("a");
        assert!(Arc::ptr_eq(&lock1, &lock2));
    }

    #[test]
    fn stale_unshared_lock_is_reclaimed() {
        struct FixedNow(std::sync::atomic::AtomicI64);
        impl assistgwcore::time::NowProvider for FixedNow {
            fn now_ts(&self) -> i64 {
                self.0.load(std::sync::atomic::Ordering::Relaxed)
            }
        }
        let now = Arc::new(FixedNow(std::sync::atomic::AtomicI64::new(0)));
        let cache = CredentialCache::new(now.clone());
        let _lock = cache.account_lock("a");
        drop(_lock);
        now.0.store(LOCK_STALE_SECS + 1, std::sync::atomic::Ordering::Relaxed);
        cache.account_lock("b");
        assert_eq!(cache.locks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn jwt_for_unknown_account_errors() {
        let pool = pool_with_one_account();
        let cache = CredentialCache::new(Arc::new(SystemNow));
        let result = cache.jwt_for(&pool, "missing").await;
        assert!(result.is_err());
    }

    #[test]
    fn cached_fresh_jwt_is_returned_without_network() {
        let pool = pool_with_one_account();
        pool.write_state("a", |state| {
            state.jwt = Some("cached-jwt".to_string());
            state.jwt_fetched_at = assistgwcore::time::now_ts();
        });
        let cached = pool.read_state("a", |s| s.jwt.clone()).flatten();
        assert_eq!(cached.as_deref(), Some("cached-jwt"));
    }
}
