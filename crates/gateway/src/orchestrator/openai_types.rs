//! OpenAI-compatible request/response/chunk shapes consumed and produced by
//! ChatOrchestrator (SPEC_FULL.md §4.6, §6). Field set is the subset the
//! spec honors; unknown extra client fields are ignored via serde's default
//! "unknown fields are skipped" behavior.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub image_format: Option<String>,
    #[serde(default)]
    pub response_format: Option<String>,
    /// Some OpenAI-compatible clients pass a conversation/session hint here
    /// instead of (or alongside) the `X-Conversation-Id` header.
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrlField,
    },
    File {
        file: FileField,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUrlField {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileField {
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl MessageContent {
    /// Flattens the content into the single text blob forwarded as the
    /// upstream query (SPEC_FULL.md §4.6 step 7); multiple text parts are
    /// newline-joined.
    pub fn as_query_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Inline image/file parts that need uploading as upstream context
    /// files before the turn (SPEC_FULL.md §4.6 step 6).
    pub fn inline_attachments(&self) -> Vec<InlineAttachment> {
        match self {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => {
                        parse_data_url(&image_url.url).map(|(mime, b64)| InlineAttachment {
                            mime_type: mime,
                            base64_data: b64,
                            filename: None,
                        })
                    }
                    ContentPart::File { file } => file.file_data.as_ref().map(|data| InlineAttachment {
                        mime_type: "application/octet-stream".to_string(),
                        base64_data: data.clone(),
                        filename: file.filename.clone(),
                    }),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }
}

pub struct InlineAttachment {
    pub mime_type: String,
    pub base64_data: String,
    pub filename: Option<String>,
}

/// Parses a `data:<mime>;base64,<payload>` URL; client-hosted remote URLs
/// are not fetched by this gateway.
fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?.to_string();
    Some((mime, payload.to_string()))
}

/// Negotiated output shape for media URLs in emitted text
/// (SPEC_FULL.md §4.6 "Content-shape negotiation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Array,
    Markdown,
    Url,
}

pub fn negotiate_response_shape(requested: Option<&str>, user_agent: Option<&str>) -> ResponseShape {
    if let Some(requested) = requested {
        match requested {
            "markdown" => return ResponseShape::Markdown,
            "url" => return ResponseShape::Url,
            "array" => return ResponseShape::Array,
            _ => {}
        }
    }
    if let Some(ua) = user_agent {
        let ua = ua.to_ascii_lowercase();
        if ua.contains("chatbox") || ua.contains("nextchat") {
            return ResponseShape::Markdown;
        }
    }
    ResponseShape::Array
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub fn role_chunk(id: &str, created: i64, model: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk",
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: Some("assistant"),
                content: None,
            },
            finish_reason: None,
        }],
    }
}

pub fn content_chunk(id: &str, created: i64, model: &str, content: String) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk",
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: None,
                content: Some(content),
            },
            finish_reason: None,
        }],
    }
}

pub fn stop_chunk(id: &str, created: i64, model: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk",
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some("stop"),
        }],
    }
}

pub fn sse_frame(chunk: &ChatCompletionChunk) -> String {
    format!("data: {}\n\n", serde_json::to_string(chunk).unwrap_or_default())
}

pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Non-streaming `chat.completion` object (SPEC_FULL.md §6).
pub fn completion_response(id: &str, created: i64, model: &str, content: String) -> Value {
    serde_json::json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
        }],
    })
}

/// OpenAI-shaped error body for non-streaming responses (SPEC_FULL.md §7).
pub fn error_body(message: &str, error_type: &str, code: Option<&str>) -> Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": error_type,
            "code": code,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_content_round_trips_as_query_text() {
        let content = MessageContent::Text("hi".to_string());
        assert_eq!(content.as_query_text(), "hi");
        assert!(content.inline_attachments().is_empty());
    }

    #[test]
    fn data_url_image_part_becomes_inline_attachment() {
        let content = MessageContent::Parts(vec![ContentPart::ImageUrl {
            image_url: ImageUrlField {
                url: "data:image/png;base64,Zm9v".to_string(),
            },
        }]);
        let attachments = content.inline_attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].mime_type, "image/png");
        assert_eq!(attachments[0].base64_data, "Zm9v");
    }

    #[test]
    fn response_shape_prefers_explicit_request_field() {
        assert_eq!(
            negotiate_response_shape(Some("markdown"), None),
            ResponseShape::Markdown
        );
        assert_eq!(negotiate_response_shape(None, None), ResponseShape::Array);
    }
}
