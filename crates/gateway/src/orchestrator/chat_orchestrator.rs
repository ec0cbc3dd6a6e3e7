//! ChatOrchestrator: glues account selection, session resolution, the
//! upstream streaming call and StreamDecoder together, emitting OpenAI
//! chunks (SPEC_FULL.md §4.6).
//!
//! The per-reply walk (`groundedContent.content`, `generatedImages`,
//! `inlineData`, `attachments`) is grounded on
//! `examples/original_source/app/chat_handler.py`'s
//! `stream_chat_realtime_generator`, `parse_generated_media`,
//! `parse_image_from_content` and `parse_attachment`.

use std::sync::Arc;

use assistgwcore::error::{GatewayError, Result};
use assistgwcore::model::{MediaArtifact, MediaKind, MediaSource, QuotaKind};
use assistgwcore::time::SharedNow;
use base64::Engine;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::credential::CredentialCache;
use crate::media::MediaRelay;
use crate::pool::AccountPool;
use crate::session::SessionManager;
use crate::stream::StreamDecoder;
use crate::upstream::client;

use super::openai_types::{ChatCompletionRequest, InlineAttachment};
use super::thought_filter;
use super::tools_spec;

pub struct ChatOrchestrator {
    pool: Arc<AccountPool>,
    credentials: Arc<CredentialCache>,
    sessions: Arc<SessionManager>,
    relay: Arc<MediaRelay>,
    now: SharedNow,
}

/// Everything the HTTP layer has already extracted from the inbound
/// request and its own context (user-agent, negotiated locale).
pub struct ChatTurnRequest {
    pub request: ChatCompletionRequest,
    pub conversation_id: Option<String>,
    pub user_agent: Option<String>,
    pub language_code: String,
    pub time_zone: String,
}

/// One unit of output the HTTP layer renders as either an SSE frame or
/// folds into the final non-streaming JSON body.
pub enum ChatEvent {
    Role,
    Text(String),
    MediaUrl(String),
    Done,
}

pub struct ChatTurn {
    pub chat_id: String,
    pub created: i64,
    pub model: String,
    pub events: mpsc::UnboundedReceiver<ChatEvent>,
}

struct StartedTurn {
    upstream: reqwest::Response,
    jwt: String,
    user_agent: Option<String>,
    session_name: String,
}

impl ChatOrchestrator {
    pub fn new(
        pool: Arc<AccountPool>,
        credentials: Arc<CredentialCache>,
        sessions: Arc<SessionManager>,
        relay: Arc<MediaRelay>,
        now: SharedNow,
    ) -> Self {
        Self {
            pool,
            credentials,
            sessions,
            relay,
            now,
        }
    }

    /// Starts one client turn: selects an account, resolves a session,
    /// uploads any inline attachments, and issues the upstream streaming
    /// call. Returns immediately with a channel the caller drains as the
    /// upstream body is decoded in the background (SPEC_FULL.md §4.6).
    pub async fn execute(&self, turn: ChatTurnRequest) -> Result<ChatTurn> {
        let ChatTurnRequest {
            request,
            conversation_id,
            user_agent,
            language_code,
            time_zone,
        } = turn;

        if request.messages.is_empty() {
            return Err(GatewayError::BadRequest("messages must not be empty".to_string()));
        }

        let query_text = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.as_ref())
            .map(|c| c.as_query_text())
            .unwrap_or_default();

        let attachments: Vec<InlineAttachment> = request
            .messages
            .iter()
            .filter_map(|m| m.content.as_ref())
            .flat_map(|c| c.inline_attachments())
            .collect();

        let quota = tools_spec::quota_kind_for_model(&request.model);
        let tools_spec_value = tools_spec::tools_spec_for_model(&request.model);
        let model_id = tools_spec::forwarded_model_id(&request.model).map(str::to_string);

        let chat_id = format!("chatcmpl-{}", uuid::Uuid::new_v4().simple());
        let created = self.now.now_ts();

        let mut last_err: Option<GatewayError> = None;
        for attempt in 0..2 {
            let account = self.pool.next(Some(quota))?;
            let account_id = account.account.id.clone();

            let outcome = self
                .start_turn(
                    &account_id,
                    quota,
                    &query_text,
                    &attachments,
                    &tools_spec_value,
                    model_id.as_deref(),
                    conversation_id.as_deref(),
                    user_agent.as_deref(),
                    &language_code,
                    &time_zone,
                )
                .await;

            match outcome {
                Ok(started) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    tokio::spawn(run_stream(
                        started,
                        tx,
                        self.relay.clone(),
                        self.pool.clone(),
                        account_id,
                        quota,
                    ));
                    return Ok(ChatTurn {
                        chat_id,
                        created,
                        model: request.model,
                        events: rx,
                    });
                }
                Err(err) if attempt == 0 && is_retryable_before_bytes(&err) => {
                    last_err = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| GatewayError::Internal("turn start failed".to_string())))
    }

    #[allow(clippy::too_many_arguments)]
    async fn start_turn(
        &self,
        account_id: &str,
        quota: QuotaKind,
        query_text: &str,
        attachments: &[InlineAttachment],
        tools_spec_value: &Value,
        model_id: Option<&str>,
        conversation_id: Option<&str>,
        user_agent_override: Option<&str>,
        language_code: &str,
        time_zone: &str,
    ) -> Result<StartedTurn> {
        let resolved = self
            .sessions
            .session_for(&self.pool, &self.credentials, account_id, conversation_id)
            .await
            .map_err(|err| self.observe(account_id, err, quota))?;

        let user_agent = user_agent_override
            .map(str::to_string)
            .or_else(|| resolved.user_agent.clone());

        let mut file_ids = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let file_name = attachment
                .filename
                .clone()
                .unwrap_or_else(|| format!("upload-{}", uuid::Uuid::new_v4().simple()));
            let file_id = client::add_context_file(
                &resolved.jwt,
                user_agent.as_deref(),
                &resolved.config_id,
                &resolved.session_name,
                &attachment.base64_data,
                &file_name,
                &attachment.mime_type,
            )
            .await
            .map_err(|err| self.observe(account_id, err, quota))?;
            file_ids.push(file_id);
        }

        let assist_generation_config = model_id.map(|id| json!({"modelId": id}));
        let upstream = client::stream_assist(
            &resolved.jwt,
            user_agent.as_deref(),
            &resolved.config_id,
            &resolved.session_name,
            query_text,
            &file_ids,
            tools_spec_value,
            language_code,
            time_zone,
            assist_generation_config.as_ref(),
        )
        .await
        .map_err(|err| self.observe(account_id, err, quota))?;

        Ok(StartedTurn {
            upstream,
            jwt: resolved.jwt,
            user_agent,
            session_name: resolved.session_name,
        })
    }

    /// Feeds a failed upstream call through QuotaClassifier before
    /// returning it, per SPEC_FULL.md §7's propagation policy.
    fn observe(&self, account_id: &str, err: GatewayError, quota: QuotaKind) -> GatewayError {
        if let Some(status) = synthetic_http_status(&err) {
            self.pool.mark_error(account_id, status, &err.to_string(), Some(quota));
        }
        err
    }
}

fn is_retryable_before_bytes(err: &GatewayError) -> bool {
    matches!(err, GatewayError::AccountAuthError(_) | GatewayError::AccountTransient(_))
}

fn synthetic_http_status(err: &GatewayError) -> Option<u16> {
    match err {
        GatewayError::AccountAuthError(_) => Some(401),
        GatewayError::AccountRateLimit(_) | GatewayError::AccountQuotaError(_) => Some(429),
        GatewayError::AccountTransient(_) => Some(502),
        _ => None,
    }
}

/// Drives the upstream byte stream through StreamDecoder, emitting events
/// as soon as they are decoded, then relays collected media and emits the
/// terminal chunk (SPEC_FULL.md §4.6 steps 8-10).
async fn run_stream(
    started: StartedTurn,
    tx: mpsc::UnboundedSender<ChatEvent>,
    relay: Arc<MediaRelay>,
    pool: Arc<AccountPool>,
    account_id: String,
    quota: QuotaKind,
) {
    let _ = tx.send(ChatEvent::Role);

    let mut decoder = StreamDecoder::new();
    let mut session_name = started.session_name.clone();
    let mut pending_media: Vec<MediaArtifact> = Vec::new();
    let mut byte_stream = started.upstream.bytes_stream();

    loop {
        let chunk = match byte_stream.next().await {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                pool.mark_error(&account_id, 502, &err.to_string(), Some(quota));
                break;
            }
            None => break,
        };
        let values = match decoder.feed(&chunk) {
            Ok(values) => values,
            Err(err) => {
                log::warn!("stream decode error: {err}");
                break;
            }
        };
        for value in values {
            let frame = process_frame(&value);
            if let Some(session) = frame.session {
                session_name = session;
            }
            for text in frame.texts {
                let _ = tx.send(ChatEvent::Text(text));
            }
            pending_media.extend(frame.media);
        }
        if decoder.is_ended() {
            break;
        }
    }

    if !pending_media.is_empty() {
        for artifact in pending_media {
            match relay.relay(&started.jwt, started.user_agent.as_deref(), artifact, &session_name).await {
                Ok(url) => {
                    let _ = tx.send(ChatEvent::MediaUrl(format!("\n{url}\n")));
                }
                Err(err) => {
                    log::warn!("media relay failed: {err}");
                }
            }
        }
    }

    let _ = tx.send(ChatEvent::Done);
}

struct ProcessedFrame {
    session: Option<String>,
    texts: Vec<String>,
    media: Vec<MediaArtifact>,
}

/// Walks one decoded `{streamAssistResponse: {...}}` element (SPEC_FULL.md
/// §4.6 step 8).
fn process_frame(value: &Value) -> ProcessedFrame {
    let mut out = ProcessedFrame {
        session: None,
        texts: Vec::new(),
        media: Vec::new(),
    };
    let Some(sar) = value.get("streamAssistResponse") else {
        return out;
    };

    if let Some(session) = sar.pointer("/sessionInfo/session").and_then(Value::as_str) {
        out.session = Some(session.to_string());
    }

    let answer = sar.get("answer").cloned().unwrap_or(Value::Null);

    collect_generated_images(sar.get("generatedImages"), &mut out.media);
    collect_generated_images(answer.get("generatedImages"), &mut out.media);

    for reply in answer
        .get("replies")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
    {
        collect_generated_images(reply.get("generatedImages"), &mut out.media);

        let grounded = reply.get("groundedContent").cloned().unwrap_or(Value::Null);
        let content = grounded.get("content").cloned().unwrap_or(Value::Null);
        let text = content.get("text").and_then(Value::as_str).unwrap_or("");

        let reply_thought = reply.get("thought").and_then(Value::as_bool).unwrap_or(false);
        let content_thought = content.get("thought").and_then(Value::as_bool).unwrap_or(false);

        if let Some(file) = content.get("file") {
            if let Some(artifact) = media_artifact_from_file(file) {
                out.media.push(artifact);
            }
        }
        if let Some(inline) = content.get("inlineData") {
            if let Some(artifact) = media_artifact_from_inline_data(inline) {
                out.media.push(artifact);
            }
        }

        for attachments_src in [reply.get("attachments"), grounded.get("attachments"), content.get("attachments")] {
            for attachment in attachments_src.and_then(Value::as_array).cloned().unwrap_or_default() {
                if let Some(artifact) = media_artifact_from_attachment(&attachment) {
                    out.media.push(artifact);
                }
            }
        }

        if !text.is_empty() && !thought_filter::is_thought(reply_thought, content_thought, text) {
            if let Some(cleaned) = thought_filter::clean_text(text) {
                out.texts.push(cleaned);
            }
        }
    }

    out
}

fn collect_generated_images(generated: Option<&Value>, out: &mut Vec<MediaArtifact>) {
    for item in generated.and_then(Value::as_array).cloned().unwrap_or_default() {
        let Some(image) = item.get("image") else { continue };
        if let Some(artifact) = media_artifact_from_inline_data(image) {
            out.push(artifact);
        }
    }
}

fn media_artifact_from_file(file: &Value) -> Option<MediaArtifact> {
    let file_id = file.get("fileId").and_then(Value::as_str)?.to_string();
    let mime_type = file
        .get("mimeType")
        .and_then(Value::as_str)
        .unwrap_or("image/png")
        .to_string();
    let suggested_filename = file.get("name").and_then(Value::as_str).map(str::to_string);
    Some(MediaArtifact {
        file_id: file_id.clone(),
        mime_type: mime_type.clone(),
        suggested_filename,
        kind: kind_for_mime(&mime_type),
        source: MediaSource::Remote {
            session_name: String::new(),
            file_id,
        },
    })
}

/// Covers both `generatedImages[].image` (`bytesBase64Encoded`) and
/// `content.inlineData` (`data`) shapes — same base64-payload structure,
/// different key name upstream.
fn media_artifact_from_inline_data(value: &Value) -> Option<MediaArtifact> {
    let b64 = value
        .get("bytesBase64Encoded")
        .or_else(|| value.get("data"))
        .and_then(Value::as_str)?
        .to_string();
    let mime_type = value
        .get("mimeType")
        .and_then(Value::as_str)
        .unwrap_or("image/png")
        .to_string();
    Some(MediaArtifact {
        file_id: format!("inline-{}", uuid::Uuid::new_v4().simple()),
        mime_type: mime_type.clone(),
        suggested_filename: None,
        kind: kind_for_mime(&mime_type),
        source: MediaSource::Base64(b64),
    })
}

fn media_artifact_from_attachment(attachment: &Value) -> Option<MediaArtifact> {
    let mime_type = attachment.get("mimeType").and_then(Value::as_str)?.to_string();
    if !mime_type.starts_with("image/") && !mime_type.starts_with("video/") {
        return None;
    }
    let b64 = attachment
        .get("data")
        .or_else(|| attachment.get("bytesBase64Encoded"))
        .and_then(Value::as_str)?
        .to_string();
    base64::engine::general_purpose::STANDARD.decode(&b64).ok()?;
    let suggested_filename = attachment.get("name").and_then(Value::as_str).map(str::to_string);
    Some(MediaArtifact {
        file_id: format!("attachment-{}", uuid::Uuid::new_v4().simple()),
        mime_type: mime_type.clone(),
        suggested_filename,
        kind: kind_for_mime(&mime_type),
        source: MediaSource::Base64(b64),
    })
}

fn kind_for_mime(mime: &str) -> MediaKind {
    if mime.starts_with("video/") {
        MediaKind::Video
    } else {
        MediaKind::Image
    }
}
