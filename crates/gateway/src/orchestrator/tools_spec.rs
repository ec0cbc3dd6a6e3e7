//! Per-model tool configuration and virtual model ids (SPEC_FULL.md §4.6,
//! §"GLOSSARY"). Grounded on `examples/original_source/app/chat_handler.py`'s
//! `get_tools_spec_for_model`, renamed from `gemini-image`/`gemini-video` to
//! `image-gen`/`video-gen`.

use assistgwcore::model::QuotaKind;
use serde_json::{json, Value};

pub const IMAGE_GEN_MODEL: &str = "image-gen";
pub const VIDEO_GEN_MODEL: &str = "video-gen";

/// The quota dimension a request is tagged with, derived from the
/// client-requested model id.
pub fn quota_kind_for_model(model: &str) -> QuotaKind {
    match model {
        IMAGE_GEN_MODEL => QuotaKind::Images,
        VIDEO_GEN_MODEL => QuotaKind::Videos,
        _ => QuotaKind::TextQueries,
    }
}

/// The `toolsSpec` body field to send upstream for this model.
pub fn tools_spec_for_model(model: &str) -> Value {
    match model {
        IMAGE_GEN_MODEL => json!({"imageGenerationSpec": {}}),
        VIDEO_GEN_MODEL => json!({"videoGenerationSpec": {}}),
        _ => json!({
            "webGroundingSpec": {},
            "toolRegistry": "default_tool_registry",
            "imageGenerationSpec": {},
            "videoGenerationSpec": {},
        }),
    }
}

/// Virtual model ids select tool capabilities but are never forwarded as
/// `assistGenerationConfig.modelId`.
pub fn forwarded_model_id(model: &str) -> Option<&str> {
    match model {
        IMAGE_GEN_MODEL | VIDEO_GEN_MODEL => None,
        other => Some(other),
    }
}
