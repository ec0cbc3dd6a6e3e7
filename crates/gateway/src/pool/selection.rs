//! Round-robin selection over the currently-available subset. Grounded on
//! `gateway/routing/selection.rs`'s cursor-modulo-available-length algorithm
//! and stable-order tie-break via the account's `sort` field; its TTL'd
//! `CandidateSnapshotCache` is dropped — accounts number at most ~100
//! (SPEC_FULL.md §4.1), so recomputing the available subset on every call is
//! an acceptable O(N) scan, not a hot path worth caching (see DESIGN.md).

use assistgwcore::model::{Account, AccountRuntimeState, QuotaKind};

use super::availability::is_available;

/// Picks the next available account id in round-robin order. `cursor` is
/// read and advanced by the caller (held under the pool lock); this
/// function is a pure helper over a snapshot of (account, state) pairs.
pub fn select_next<'a>(
    accounts: &'a [(Account, AccountRuntimeState)],
    quota: Option<QuotaKind>,
    cursor: usize,
    now: i64,
) -> Option<(usize, &'a Account)> {
    let available: Vec<&(Account, AccountRuntimeState)> = accounts
        .iter()
        .filter(|(account, state)| is_available(account, state, quota, now))
        .collect();
    if available.is_empty() {
        return None;
    }
    let idx = cursor % available.len();
    Some((idx, &available[idx].0))
}

/// The shortest remaining cooldown among unavailable accounts, used to
/// build a retry-after hint for `NoAvailableAccount` (SPEC_FULL.md §4.1).
pub fn shortest_remaining_cooldown(
    accounts: &[(Account, AccountRuntimeState)],
    now: i64,
) -> Option<i64> {
    accounts
        .iter()
        .filter(|(account, _)| account.enabled)
        .map(|(_, state)| state.cooldown_until)
        .filter(|until| *until > now)
        .map(|until| until - now)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistgwcore::model::CooldownKind;

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

    #[test]
    fn round_robin_over_two_available_accounts() {
        let accounts = vec![
            (account("a", 0), AccountRuntimeState::default()),
            (account("b", 1), AccountRuntimeState::default()),
        ];
        let (idx0, acc0) = select_next(&accounts, None, 0, 0).unwrap();
        let (idx1, acc1) = select_next(&accounts, None, 1, 0).unwrap();
        assert_ne!(idx0, idx1);
        assert_ne!(acc0.id, acc1.id);
    }

    #[test]
    fn empty_available_set_returns_none() {
        let mut state = AccountRuntimeState::default();
        crate::pool::cooldown::mark_cooldown(&mut state, CooldownKind::AuthError, 0);
        let accounts = vec![(account("a", 0), state)];
        assert!(select_next(&accounts, None, 0, 1).is_none());
    }

    #[test]
    fn unavailable_account_is_skipped_in_cursor_math() {
        let mut cooling = AccountRuntimeState::default();
        crate::pool::cooldown::mark_cooldown(&mut cooling, CooldownKind::Generic, 0);
        let accounts = vec![
            (account("a", 0), cooling),
            (account("b", 1), AccountRuntimeState::default()),
        ];
        let (_, acc) = select_next(&accounts, None, 0, 1).unwrap();
        assert_eq!(acc.id, "b");
    }

    #[test]
    fn shortest_remaining_cooldown_picks_minimum() {
        let mut short = AccountRuntimeState::default();
        short.cooldown_until = 10;
        let mut long = AccountRuntimeState::default();
        long.cooldown_until = 100;
        let accounts = vec![(account("a", 0), short), (account("b", 1), long)];
        assert_eq!(shortest_remaining_cooldown(&accounts, 0), Some(10));
    }
}
