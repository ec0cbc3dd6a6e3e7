//! Pure availability predicate. Grounded on
//! `account/account_availability.rs`'s style (a pure function plus exhaustive
//! unit tests) with the usage-percent threshold replaced by SPEC_FULL.md §3
//! Invariant 3's `enabled ∧ ¬cookie_expired ∧ now ≥ cooldown_until ∧ ...`.

use assistgwcore::model::{Account, AccountRuntimeState, QuotaKind};

use super::cooldown::{quota_cooldown_active, whole_account_cooldown_active};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(&'static str),
}

pub fn evaluate(
    account: &Account,
    state: &AccountRuntimeState,
    quota: Option<QuotaKind>,
    now: i64,
) -> Availability {
    if !account.enabled {
        return Availability::Unavailable("disabled");
    }
    if state.cookie_expired {
        return Availability::Unavailable("cookie_expired");
    }
    if whole_account_cooldown_active(state, now) {
        return Availability::Unavailable("cooldown");
    }
    if let Some(quota) = quota {
        if quota_cooldown_active(state, quota, now) {
            return Availability::Unavailable("quota_cooldown");
        }
    }
    Availability::Available
}

pub fn is_available(
    account: &Account,
    state: &AccountRuntimeState,
    quota: Option<QuotaKind>,
    now: i64,
) -> bool {
    matches!(evaluate(account, state, quota, now), Availability::Available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistgwcore::model::CooldownKind;

    fn account() -> Account {
        Account {
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
        }
    }

    #[test]
    fn disabled_account_is_unavailable() {
        let mut acc = account();
        acc.enabled = false;
        let state = AccountRuntimeState::default();
        assert_eq!(
            evaluate(&acc, &state, None, 0),
            Availability::Unavailable("disabled")
        );
    }

    #[test]
    fn cookie_expired_is_unavailable() {
        let acc = account();
        let mut state = AccountRuntimeState::default();
        state.cookie_expired = true;
        assert_eq!(
            evaluate(&acc, &state, None, 0),
            Availability::Unavailable("cookie_expired")
        );
    }

    #[test]
    fn whole_account_cooldown_blocks_any_quota() {
        let acc = account();
        let mut state = AccountRuntimeState::default();
        super::super::cooldown::mark_cooldown(&mut state, CooldownKind::RateLimit, 0);
        assert!(!is_available(&acc, &state, None, 1));
        assert!(!is_available(&acc, &state, Some(QuotaKind::Images), 1));
    }

    #[test]
    fn per_quota_cooldown_only_blocks_that_quota() {
        let acc = account();
        let mut state = AccountRuntimeState::default();
        super::super::cooldown::mark_quota_cooldown(&mut state, QuotaKind::Images, 0);
        assert!(!is_available(&acc, &state, Some(QuotaKind::Images), 1));
        assert!(is_available(&acc, &state, Some(QuotaKind::Videos), 1));
        assert!(is_available(&acc, &state, None, 1));
    }

    #[test]
    fn fully_healthy_account_is_available() {
        let acc = account();
        let state = AccountRuntimeState::default();
        assert!(is_available(&acc, &state, Some(QuotaKind::TextQueries), 100));
    }
}
