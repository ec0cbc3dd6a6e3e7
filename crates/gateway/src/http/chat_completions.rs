//! `POST /v1/chat/completions` — the OpenAI-compatible endpoint
//! (SPEC_FULL.md §6). Streams SSE frames when `stream: true`, otherwise
//! collects the whole turn into one `chat.completion` JSON body.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::orchestrator::openai_types::{
    self, negotiate_response_shape, ChatCompletionRequest, ResponseShape,
};
use crate::orchestrator::thought_filter::strip_code_fence;
use crate::orchestrator::{ChatEvent, ChatTurn, ChatTurnRequest};

use super::errors::ApiError;
use super::server::AppState;

const DEFAULT_LANGUAGE_CODE: &str = "en-US";
const DEFAULT_TIME_ZONE: &str = "UTC";

pub async fn handle(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }

    let stream_requested = request.stream;
    let shape = negotiate_response_shape(
        request.response_format.as_deref().or(request.image_format.as_deref()),
        header_str(&headers, "user-agent"),
    );

    let turn_request = ChatTurnRequest {
        conversation_id: conversation_id(&request, &headers),
        user_agent: header_str(&headers, "user-agent").map(str::to_string),
        language_code: DEFAULT_LANGUAGE_CODE.to_string(),
        time_zone: DEFAULT_TIME_ZONE.to_string(),
        request,
    };

    let turn = match state.orchestrator.execute(turn_request).await {
        Ok(turn) => turn,
        Err(err) => return ApiError::from(err).into_response(),
    };

    if stream_requested {
        stream_response(turn, shape)
    } else {
        collect_response(turn, shape).await
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    authorize_with_keys(&state.api_keys, headers)
}

fn authorize_with_keys(api_keys: &[String], headers: &HeaderMap) -> Result<(), Response> {
    if api_keys.is_empty() {
        return Ok(());
    }
    let presented = header_str(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match presented {
        Some(key) if api_keys.iter().any(|k| k == key) => Ok(()),
        _ => {
            let body = openai_types::error_body("invalid or missing API key", "invalid_request_error", None);
            Err((StatusCode::UNAUTHORIZED, Json(body)).into_response())
        }
    }
}

fn conversation_id(request: &ChatCompletionRequest, headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-conversation-id")
        .map(str::to_string)
        .or_else(|| request.user.clone())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn stream_response(turn: ChatTurn, shape: ResponseShape) -> Response {
    let ChatTurn {
        chat_id,
        created,
        model,
        events,
    } = turn;

    let frames = UnboundedReceiverStream::new(events).map(move |event| {
        let frame = match event {
            ChatEvent::Role => openai_types::sse_frame(&openai_types::role_chunk(&chat_id, created, &model)),
            ChatEvent::Text(text) => {
                openai_types::sse_frame(&openai_types::content_chunk(&chat_id, created, &model, text))
            }
            ChatEvent::MediaUrl(url) => openai_types::sse_frame(&openai_types::content_chunk(
                &chat_id,
                created,
                &model,
                render_media_url(&url, shape),
            )),
            ChatEvent::Done => {
                format!(
                    "{}{}",
                    openai_types::sse_frame(&openai_types::stop_chunk(&chat_id, created, &model)),
                    openai_types::SSE_DONE
                )
            }
        };
        Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(frame))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(frames))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn collect_response(turn: ChatTurn, shape: ResponseShape) -> Response {
    let ChatTurn {
        chat_id,
        created,
        model,
        mut events,
    } = turn;

    let mut content = String::new();
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::Role => {}
            ChatEvent::Text(text) => content.push_str(&text),
            ChatEvent::MediaUrl(url) => content.push_str(&render_media_url(&url, shape)),
            ChatEvent::Done => break,
        }
    }

    if shape == ResponseShape::Markdown {
        content = strip_code_fence(&content);
    }

    Json(openai_types::completion_response(&chat_id, created, &model, content)).into_response()
}

/// `url` already carries the orchestrator's `\n{url}\n` wrapping; shape only
/// changes whether the raw URL is echoed as-is (`Url`), wrapped in Markdown
/// image syntax, or left for the client to re-wrap as a content-part array.
fn render_media_url(url: &str, shape: ResponseShape) -> String {
    let trimmed = url.trim();
    match shape {
        ResponseShape::Markdown => format!("\n![]({trimmed})\n"),
        ResponseShape::Array | ResponseShape::Url => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    fn request_with_user(user: Option<&str>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gemini".to_string(),
            messages: Vec::new(),
            stream: false,
            image_format: None,
            response_format: None,
            user: user.map(str::to_string),
        }
    }

    #[test]
    fn authorize_passes_when_no_keys_configured() {
        let headers = HeaderMap::new();
        assert!(authorize_with_keys(&[], &headers).is_ok());
    }

    #[test]
    fn authorize_accepts_matching_bearer_key() {
        let headers = headers_with(&[("authorization", "Bearer secret123")]);
        assert!(authorize_with_keys(&["secret123".to_string()], &headers).is_ok());
    }

    #[test]
    fn authorize_rejects_missing_or_wrong_key() {
        let headers = HeaderMap::new();
        assert!(authorize_with_keys(&["secret123".to_string()], &headers).is_err());

        let wrong = headers_with(&[("authorization", "Bearer nope")]);
        assert!(authorize_with_keys(&["secret123".to_string()], &wrong).is_err());
    }

    #[test]
    fn conversation_id_prefers_header_over_user_field() {
        let request = request_with_user(Some("user-field-id"));
        let headers = headers_with(&[("x-conversation-id", "header-id")]);
        assert_eq!(conversation_id(&request, &headers).as_deref(), Some("header-id"));
    }

    #[test]
    fn conversation_id_falls_back_to_user_field() {
        let request = request_with_user(Some("user-field-id"));
        let headers = HeaderMap::new();
        assert_eq!(conversation_id(&request, &headers).as_deref(), Some("user-field-id"));
    }

    #[test]
    fn conversation_id_is_none_when_both_absent() {
        let request = request_with_user(None);
        let headers = HeaderMap::new();
        assert!(conversation_id(&request, &headers).is_none());
    }

    #[test]
    fn render_media_url_wraps_markdown() {
        assert_eq!(render_media_url("\nhttp://x/img.png\n", ResponseShape::Markdown), "\n![](http://x/img.png)\n");
    }

    #[test]
    fn render_media_url_leaves_url_shape_untouched() {
        assert_eq!(render_media_url("http://x/img.png", ResponseShape::Url), "http://x/img.png");
        assert_eq!(render_media_url("http://x/img.png", ResponseShape::Array), "http://x/img.png");
    }
}
