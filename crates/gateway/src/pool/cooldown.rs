//! Cooldown application, as pure functions over `AccountRuntimeState`.
//!
//! Grounded on `gateway/routing/cooldown.rs` — same
//! monotonic-extend-only semantics (`if cooldown_until > *until { *until =
//! cooldown_until }`) — but reshaped from a free-standing
//! `OnceLock<Mutex<HashMap<String, i64>>>` singleton into plain functions
//! over the state already guarded by `AccountPool`'s own lock, per
//! SPEC_FULL.md §9's explicit "no module-level singletons" note.

use assistgwcore::model::{AccountRuntimeState, CooldownKind, QuotaKind};

/// Extend-only: a shorter cooldown never overwrites a longer one already in
/// place (Invariant 5).
pub fn mark_cooldown(state: &mut AccountRuntimeState, kind: CooldownKind, now: i64) {
    let until = now + kind.duration_secs(now);
    if until > state.cooldown_until {
        state.cooldown_until = until;
        state.cooldown_reason = Some(kind);
    }
}

/// Per-quota-kind cooldown, independent of the whole-account cooldown
/// (SPEC_FULL.md §4.1 "independent dimensions").
pub fn mark_quota_cooldown(state: &mut AccountRuntimeState, quota: QuotaKind, now: i64) {
    let until = now + CooldownKind::QuotaDaily.duration_secs(now);
    let entry = state.per_quota_cooldowns.entry(quota).or_insert(0);
    if until > *entry {
        *entry = until;
    }
}

pub fn clear_cooldowns(state: &mut AccountRuntimeState) {
    state.cooldown_until = 0;
    state.cooldown_reason = None;
    state.per_quota_cooldowns.clear();
    state.cookie_expired = false;
}

pub fn whole_account_cooldown_active(state: &AccountRuntimeState, now: i64) -> bool {
    now < state.cooldown_until
}

pub fn quota_cooldown_active(state: &AccountRuntimeState, quota: QuotaKind, now: i64) -> bool {
    state
        .per_quota_cooldowns
        .get(&quota)
        .is_some_and(|until| now < *until)
}
