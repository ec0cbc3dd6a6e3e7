//! QuotaClassifier: a pure status->action mapping, applied by
//! `AccountPool::mark_error` on every non-2xx upstream response.
//! Grounded on `gateway/routing/cooldown.rs`'s
//! `cooldown_reason_for_status`, remapped to SPEC_FULL.md §4.4's table.

use assistgwcore::model::QuotaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedAction {
    AuthError,
    QuotaDaily(QuotaKind),
    RateLimit,
    Generic,
    None,
}

impl ClassifiedAction {
    pub fn kind_label(&self) -> &'static str {
        match self {
            ClassifiedAction::AuthError => "auth_error",
            ClassifiedAction::QuotaDaily(_) => "quota_daily",
            ClassifiedAction::RateLimit => "rate_limit",
            ClassifiedAction::Generic => "generic",
            ClassifiedAction::None => "none",
        }
    }
}

/// Maps `(http_status, quota_kind)` to a cooldown action per the table in
/// SPEC_FULL.md §4.4.
pub fn classify(http_status: u16, quota: Option<QuotaKind>) -> ClassifiedAction {
    match http_status {
        200..=299 => ClassifiedAction::None,
        401 | 403 => ClassifiedAction::AuthError,
        429 => match quota {
            Some(kind) => ClassifiedAction::QuotaDaily(kind),
            None => ClassifiedAction::RateLimit,
        },
        _ => ClassifiedAction::Generic,
    }
}
