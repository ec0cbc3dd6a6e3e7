//! Time source abstraction. Session rotation, cooldown arithmetic and the
//! PT-midnight quota reset all go through a `NowProvider` so tests can drive
//! them deterministically instead of sleeping real wall-clock time.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;

pub trait NowProvider: Send + Sync {
    /// Unix timestamp, seconds.
    fn now_ts(&self) -> i64;
}

#[derive(Clone, Copy, Default)]
pub struct SystemNow;

impl NowProvider for SystemNow {
    fn now_ts(&self) -> i64 {
        now_ts()
    }
}

/// Unix timestamp, seconds, per the current system clock.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Seconds from `now` until the next 00:00:00 in America/Los_Angeles,
/// honoring DST. Used for `CooldownKind::QuotaDaily`.
pub fn seconds_until_next_pacific_midnight(now: i64) -> i64 {
    let now_utc: DateTime<Utc> = Utc
        .timestamp_opt(now, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let now_pt = now_utc.with_timezone(&Los_Angeles);
    let today_midnight = now_pt
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight");
    let next_midnight_pt = match Los_Angeles.from_local_datetime(&today_midnight) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => now_pt,
    };
    let next_midnight_pt = if next_midnight_pt <= now_pt {
        next_midnight_pt + chrono::Duration::days(1)
    } else {
        next_midnight_pt
    };
    (next_midnight_pt.with_timezone(&Utc).timestamp() - now_utc.timestamp()).max(1)
}

pub type SharedNow = Arc<dyn NowProvider>;

pub fn system_now() -> SharedNow {
    Arc::new(SystemNow)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedNow(i64);
    impl NowProvider for FixedNow {
        fn now_ts(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn pacific_midnight_is_in_the_future() {
        let now = now_ts();
        let secs = seconds_until_next_pacific_midnight(now);
        assert!(secs > 0);
        assert!(secs <= 25 * 3600);
    }

    #[test]
    fn fixed_now_provider_returns_configured_value() {
        let provider: &dyn NowProvider = &FixedNow(42);
        assert_eq!(provider.now_ts(), 42);
    }
}
