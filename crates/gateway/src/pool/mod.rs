//! AccountPool: the single, explicitly constructed object holding account
//! rows + runtime states + the round-robin cursor, guarded by one pool-wide
//! mutex (SPEC_FULL.md §5, §9 — no module-level singletons).

pub mod availability;
pub mod cooldown;
pub mod selection;

use std::collections::HashMap;
use std::sync::Mutex;

use assistgwcore::error::{GatewayError, Result};
use assistgwcore::model::{Account, AccountRuntimeState, ConversationSession, ErrorRecord, QuotaKind};
use assistgwcore::storage::Storage;
use assistgwcore::time::SharedNow;

use crate::quota::classifier::{self, ClassifiedAction};

struct PoolState {
    accounts: Vec<Account>,
    runtime: HashMap<String, AccountRuntimeState>,
    cursor: usize,
}

/// Read-only view handed to callers outside the pool lock.
#[derive(Debug, Clone)]
pub struct AccountView {
    pub account: Account,
    pub runtime: AccountRuntimeState,
}

pub struct AccountPool {
    storage: Mutex<Storage>,
    state: Mutex<PoolState>,
    now: SharedNow,
}

impl AccountPool {
    pub fn new(storage: Storage, now: SharedNow) -> rusqlite::Result<Self> {
        let accounts = storage.list_accounts()?;
        let runtime = accounts
            .iter()
            .map(|a| (a.id.clone(), AccountRuntimeState::default()))
            .collect();
        Ok(Self {
            storage: Mutex::new(storage),
            state: Mutex::new(PoolState {
                accounts,
                runtime,
                cursor: 0,
            }),
            now,
        })
    }

    fn now(&self) -> i64 {
        self.now.now_ts()
    }

    /// Selects the next available account in round-robin order over the
    /// currently-available subset (SPEC_FULL.md §4.1).
    pub fn next(&self, quota: Option<QuotaKind>) -> Result<AccountView> {
        let now = self.now();
        let mut state = self.state.lock().expect("pool lock poisoned");
        let snapshot: Vec<(Account, AccountRuntimeState)> = state
            .accounts
            .iter()
            .map(|a| {
                let runtime = state.runtime.get(&a.id).cloned().unwrap_or_default();
                (a.clone(), runtime)
            })
            .collect();
        match selection::select_next(&snapshot, quota, state.cursor, now) {
            Some((idx, account)) => {
                let account = account.clone();
                state.cursor = idx + 1;
                let runtime = state.runtime.get(&account.id).cloned().unwrap_or_default();
                Ok(AccountView { account, runtime })
            }
            None => {
                let retry_hint = selection::shortest_remaining_cooldown(&snapshot, now);
                Err(GatewayError::NoAvailableAccount(
                    retry_hint.map(|secs| format!("retry in {secs}s")),
                ))
            }
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<AccountView> {
        let state = self.state.lock().expect("pool lock poisoned");
        let account = state.accounts.iter().find(|a| a.id == id)?.clone();
        let runtime = state.runtime.get(id).cloned().unwrap_or_default();
        Some(AccountView { account, runtime })
    }

    pub fn read_account(&self, id: &str) -> Option<Account> {
        let state = self.state.lock().expect("pool lock poisoned");
        state.accounts.iter().find(|a| a.id == id).cloned()
    }

    /// Reads a system-config value (SPEC_FULL.md §6). The core owns the
    /// pool's storage handle; external collaborators (admin UI, cookie
    /// refresh) write through the same table.
    pub fn get_config(&self, key: &str) -> Option<String> {
        let storage = self.storage.lock().expect("storage lock poisoned");
        storage.get_config(key).ok().flatten()
    }

    pub fn read_state<R>(&self, id: &str, f: impl FnOnce(&AccountRuntimeState) -> R) -> Option<R> {
        let state = self.state.lock().expect("pool lock poisoned");
        state.runtime.get(id).map(f)
    }

    pub fn write_state<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut AccountRuntimeState) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock().expect("pool lock poisoned");
        state.runtime.get_mut(id).map(f)
    }

    pub fn conversation_session(
        &self,
        id: &str,
        conversation_id: &str,
    ) -> Option<ConversationSession> {
        self.read_state(id, |runtime| {
            runtime.conversation_sessions.get(conversation_id).cloned()
        })
        .flatten()
    }

    pub fn set_conversation_session(
        &self,
        id: &str,
        conversation_id: &str,
        session: ConversationSession,
    ) {
        self.write_state(id, |runtime| {
            runtime
                .conversation_sessions
                .insert(conversation_id.to_string(), session);
        });
    }

    /// Applies the classifier's action to an account's runtime state
    /// (SPEC_FULL.md §4.4). Called on every non-2xx upstream response.
    pub fn mark_error(&self, id: &str, http_status: u16, detail: &str, quota: Option<QuotaKind>) {
        let now = self.now();
        let action = classifier::classify(http_status, quota);
        let mut disable_and_persist = false;

        self.write_state(id, |runtime| {
            runtime.push_error(ErrorRecord {
                kind: action.kind_label(),
                http_status: Some(http_status),
                detail: detail.chars().take(200).collect(),
                at: now,
            });
            match action {
                ClassifiedAction::AuthError => {
                    cooldown::mark_cooldown(runtime, assistgwcore::model::CooldownKind::AuthError, now);
                    runtime.cookie_expired = true;
                    runtime.jwt = None;
                    runtime.session = None;
                    disable_and_persist = true;
                }
                ClassifiedAction::QuotaDaily(kind) => {
                    cooldown::mark_quota_cooldown(runtime, kind, now);
                }
                ClassifiedAction::RateLimit => {
                    cooldown::mark_cooldown(runtime, assistgwcore::model::CooldownKind::RateLimit, now);
                }
                ClassifiedAction::Generic => {
                    cooldown::mark_cooldown(runtime, assistgwcore::model::CooldownKind::Generic, now);
                }
                ClassifiedAction::None => {}
            }
        });

        if disable_and_persist {
            self.mark_unavailable(id, "auth_error");
        }
    }

    /// Sets `enabled=false`; on an auth-shaped reason also flags
    /// `cookie_expired` so the refresh collaborator picks it up
    /// (SPEC_FULL.md §4.1).
    pub fn mark_unavailable(&self, id: &str, reason: &str) {
        {
            let mut state = self.state.lock().expect("pool lock poisoned");
            if let Some(account) = state.accounts.iter_mut().find(|a| a.id == id) {
                account.enabled = false;
            }
            if let Some(runtime) = state.runtime.get_mut(id) {
                if reason.contains("401") || reason.contains("403") || reason.contains("auth") {
                    runtime.cookie_expired = true;
                }
            }
        }
        if let Ok(storage) = self.storage.lock() {
            if let Err(err) = storage.set_account_enabled(id, false) {
                log::warn!("failed to persist mark_unavailable for {id}: {err}");
            }
        }
    }

    /// Publishes a freshly refreshed cookie triple and clears cooldowns
    /// (SPEC_FULL.md §4.1). Does *not* clear the cached JWT/session — the
    /// refresh collaborator that calls this does not imply they are stale.
    pub fn mark_cookie_refreshed(
        &self,
        id: &str,
        session_cookie: &str,
        host_cookie: &str,
        session_index: &str,
    ) {
        let now = self.now();
        {
            let mut state = self.state.lock().expect("pool lock poisoned");
            if let Some(account) = state.accounts.iter_mut().find(|a| a.id == id) {
                account.session_cookie = session_cookie.to_string();
                account.host_cookie = host_cookie.to_string();
                account.session_index = session_index.to_string();
                account.enabled = true;
                account.last_cookie_refresh_at = Some(now);
            }
            if let Some(runtime) = state.runtime.get_mut(id) {
                cooldown::clear_cooldowns(runtime);
            }
        }
        if let Ok(storage) = self.storage.lock() {
            if let Err(err) =
                storage.set_account_cookies(id, session_cookie, host_cookie, session_index, now)
            {
                log::warn!("failed to persist cookie refresh for {id}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistgwcore::time::SystemNow;
    use std::sync::Arc;

    fn account(id: &str, sort: i64) -> Account {
        Account {
            id: id.to_string(),
            session_cookie: "sc".into(),
            host_cookie: "hc".into(),
            session_index: "0".into(),
            config_id: "cfg".into(),
            user_agent: None,
            enabled: true,
            temp_mail_url: None,
            last_cookie_refresh_at: None,
            sort,
        }
    }

    fn pool_with_accounts(ids: &[&str]) -> AccountPool {
        let storage = Storage::open_in_memory().expect("open");
        for (i, id) in ids.iter().enumerate() {
            storage.upsert_account(&account(id, i as i64)).unwrap();
        }
        AccountPool::new(storage, Arc::new(SystemNow)).expect("pool")
    }

    #[test]
    fn next_round_robins_over_two_accounts() {
        let pool = pool_with_accounts(&["a", "b"]);
        let first = pool.next(None).unwrap().account.id;
        let second = pool.next(None).unwrap().account.id;
        assert_ne!(first, second);
    }

    #[test]
    fn next_returns_no_available_account_when_empty() {
        let pool = pool_with_accounts(&[]);
        assert!(matches!(
            pool.next(None),
            Err(GatewayError::NoAvailableAccount(_))
        ));
    }

    #[test]
    fn mark_error_401_disables_and_sets_cookie_expired() {
        let pool = pool_with_accounts(&["a"]);
        pool.mark_error("a", 401, "unauthorized", None);
        let view = pool.snapshot("a").unwrap();
        assert!(!view.account.enabled);
        assert!(view.runtime.cookie_expired);
        assert!(pool.next(None).is_err());
    }

    #[test]
    fn mark_error_401_clears_jwt_and_session() {
        let pool = pool_with_accounts(&["a"]);
        pool.write_state("a", |state| {
            state.jwt = Some("stale-jwt".to_string());
            state.session = Some("sessions/stale".to_string());
        });
        pool.mark_error("a", 401, "unauthorized", None);
        let view = pool.snapshot("a").unwrap();
        assert!(view.runtime.jwt.is_none());
        assert!(view.runtime.session.is_none());
    }

    #[test]
    fn mark_cookie_refreshed_reenables_and_clears_cooldowns() {
        let pool = pool_with_accounts(&["a"]);
        pool.mark_error("a", 401, "unauthorized", None);
        pool.mark_cookie_refreshed("a", "new-sc", "new-hc", "1");
        let view = pool.snapshot("a").unwrap();
        assert!(view.account.enabled);
        assert!(!view.runtime.cookie_expired);
        assert_eq!(view.account.session_cookie, "new-sc");
        assert!(pool.next(None).is_ok());
    }

    #[test]
    fn mark_error_429_with_quota_only_blocks_that_quota() {
        let pool = pool_with_accounts(&["a"]);
        pool.mark_error("a", 429, "images quota exhausted", Some(QuotaKind::Images));
        assert!(pool.next(Some(QuotaKind::Images)).is_err());
        assert!(pool.next(Some(QuotaKind::TextQueries)).is_ok());
    }
}
