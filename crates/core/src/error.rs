use thiserror::Error;

/// Error taxonomy shared by the pool, credential, session and storage layers.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no available account{}", detail_suffix(.0))]
    NoAvailableAccount(Option<String>),

    #[error("account auth error: {0}")]
    AccountAuthError(String),

    #[error("account rate limited: {0}")]
    AccountRateLimit(String),

    #[error("account quota exhausted: {0}")]
    AccountQuotaError(String),

    #[error("upstream transient error: {0}")]
    AccountTransient(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {detail}"),
        None => String::new(),
    }
}

impl GatewayError {
    /// HTTP status this error should surface to the client as, per the
    /// error-handling design in SPEC_FULL.md §7.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::NoAvailableAccount(_) => 503,
            GatewayError::AccountAuthError(_) => 502,
            GatewayError::AccountRateLimit(_) => 429,
            GatewayError::AccountQuotaError(_) => 429,
            GatewayError::AccountTransient(_) => 502,
            GatewayError::BadRequest(_) => 400,
            GatewayError::Storage(_) | GatewayError::Internal(_) => 500,
        }
    }

    pub fn openai_type(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "invalid_request_error",
            GatewayError::AccountRateLimit(_) | GatewayError::AccountQuotaError(_) => {
                "rate_limit_error"
            }
            _ => "api_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_available_account_appends_hint_when_present() {
        let without_hint = GatewayError::NoAvailableAccount(None);
        assert_eq!(without_hint.to_string(), "no available account");

        let with_hint = GatewayError::NoAvailableAccount(Some("all cooling down".to_string()));
        assert_eq!(with_hint.to_string(), "no available account: all cooling down");
    }

    #[test]
    fn http_status_matches_error_taxonomy() {
        assert_eq!(GatewayError::NoAvailableAccount(None).http_status(), 503);
        assert_eq!(GatewayError::AccountAuthError(String::new()).http_status(), 502);
        assert_eq!(GatewayError::AccountRateLimit(String::new()).http_status(), 429);
        assert_eq!(GatewayError::AccountQuotaError(String::new()).http_status(), 429);
        assert_eq!(GatewayError::AccountTransient(String::new()).http_status(), 502);
        assert_eq!(GatewayError::BadRequest(String::new()).http_status(), 400);
        assert_eq!(GatewayError::Internal(String::new()).http_status(), 500);
    }

    #[test]
    fn openai_type_groups_rate_limit_variants() {
        assert_eq!(GatewayError::BadRequest(String::new()).openai_type(), "invalid_request_error");
        assert_eq!(GatewayError::AccountRateLimit(String::new()).openai_type(), "rate_limit_error");
        assert_eq!(GatewayError::AccountQuotaError(String::new()).openai_type(), "rate_limit_error");
        assert_eq!(GatewayError::AccountAuthError(String::new()).openai_type(), "api_error");
    }
}
