//! Thought/noise filtering (SPEC_FULL.md §4.6 step 8, Invariant 7).
//!
//! Grounded on `examples/original_source/app/chat_handler.py`'s inline
//! filter in `stream_chat_realtime_generator`: drop any reply marked
//! `thought=true` at either the reply or content level, drop any text whose
//! stripped form starts with `**` (the upstream's thought-heading
//! convention), strip the literal noise line, and drop text that is
//! nothing but a code-fence marker.

/// Literal line stripped from emitted text wherever it appears on its own
/// line (SPEC_FULL.md GLOSSARY "Noise list").
const NOISE_LINE: &str = "Image generated by Nano Banana Pro.";

/// True if this reply/content pair must never reach the client.
pub fn is_thought(reply_thought: bool, content_thought: bool, text: &str) -> bool {
    reply_thought || content_thought || text.trim_start().starts_with("**")
}

/// True if this line, trimmed, is nothing but a code-fence marker (with an
/// optional language tag, e.g. ` ```json `).
fn is_bare_fence_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed == "```" || (trimmed.starts_with("```") && trimmed[3..].chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Strips the noise line and bare code-fence marker lines from `text`,
/// wherever they appear on their own line in a multi-line reply. Returns
/// `None` if nothing is left to emit.
pub fn clean_text(text: &str) -> Option<String> {
    let filtered: Vec<&str> = text
        .split('\n')
        .filter(|line| line.trim() != NOISE_LINE && !is_bare_fence_line(line))
        .collect();
    let joined = filtered.join("\n");
    if joined.trim().is_empty() {
        return None;
    }
    Some(joined)
}

/// Unwraps a full reply the upstream wrapped whole in a single code fence
/// (``` or ```json), returning just the inner content. Used for the
/// `markdown` response shape, where a fenced JSON/text blob should read as
/// plain prose rather than as a code block. Grounded on
/// `chat_handler.py`'s `strip_markdown_codeblock`; text that isn't a single
/// full-message fence is returned unchanged.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return text.to_string();
    };
    let after_open = after_open
        .strip_prefix("json")
        .or_else(|| after_open.strip_prefix("JSON"))
        .unwrap_or(after_open);
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);
    let Some(inner) = after_open.strip_suffix("```") else {
        return text.to_string();
    };
    inner.trim().to_string()
}
