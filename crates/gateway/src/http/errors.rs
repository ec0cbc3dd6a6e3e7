//! Maps `GatewayError` to the OpenAI-shaped error body and HTTP status
//! clients see (SPEC_FULL.md §7).

use assistgwcore::error::GatewayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::orchestrator::openai_types::error_body;

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &self.0 {
            GatewayError::NoAvailableAccount(hint) => hint.clone(),
            _ => None,
        };
        let body = error_body(&self.0.to_string(), self.0.openai_type(), code.as_deref());
        (status, Json(body)).into_response()
    }
}
