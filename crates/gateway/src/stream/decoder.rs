//! StreamDecoder: turns the upstream's array-framed, arbitrarily-chunked
//! JSON stream into a lazy sequence of decoded objects (SPEC_FULL.md §4.5).
//!
//! Grounded on `examples/original_source/app/chat_handler.py`'s
//! `JSONStreamParser`, which buffers incoming text and calls Python's
//! `json.JSONDecoder().raw_decode()` to pull one value at a time, treating
//! "extra data"/position errors as "need more bytes" and anything else as
//! fatal. `serde_json` has no direct `raw_decode` equivalent, so this
//! implements the minimal bracket/string-aware scanner SPEC_FULL.md §9
//! calls out as the fallback: find one complete JSON value's end offset,
//! then hand that slice to `serde_json::from_str`.

use serde_json::Value;

#[derive(Debug)]
pub enum DecodeError {
    InvalidUtf8,
    MalformedJson(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidUtf8 => write!(f, "invalid utf-8 in stream"),
            DecodeError::MalformedJson(detail) => write!(f, "malformed json: {detail}"),
        }
    }
}

impl std::error::Error for DecodeError {}

pub struct StreamDecoder {
    buffer: String,
    ended: bool,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            ended: false,
        }
    }

    /// Appends a raw chunk and returns every JSON value that is now fully
    /// decodable, leaving any trailing partial value buffered for the next
    /// call. Once the closing `]` of the outer array is seen, subsequent
    /// calls return an empty vec (the sequence is finite and
    /// non-restartable).
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>, DecodeError> {
        if self.ended {
            return Ok(Vec::new());
        }
        let text = std::str::from_utf8(chunk).map_err(|_| DecodeError::InvalidUtf8)?;
        self.buffer.push_str(text);
        self.drain_ready()
    }

    fn drain_ready(&mut self) -> Result<Vec<Value>, DecodeError> {
        let mut out = Vec::new();
        loop {
            self.skip_ignorable_prefix();
            if self.ended || self.buffer.is_empty() {
                break;
            }
            match find_value_end(&self.buffer) {
                ValueBoundary::Complete(end) => {
                    let slice = self.buffer[..end].to_string();
                    let value: Value = serde_json::from_str(&slice)
                        .map_err(|err| DecodeError::MalformedJson(err.to_string()))?;
                    self.buffer.drain(..end);
                    out.push(value);
                }
                ValueBoundary::Incomplete => break,
            }
        }
        Ok(out)
    }

    /// Drops leading whitespace and the `[`/`,` separators between array
    /// elements; detects the outer array's closing `]`.
    fn skip_ignorable_prefix(&mut self) {
        loop {
            let Some(ch) = self.buffer.chars().next() else {
                return;
            };
            if ch.is_whitespace() {
                self.buffer.drain(..ch.len_utf8());
                continue;
            }
            match ch {
                '[' | ',' => {
                    self.buffer.drain(..1);
                }
                ']' => {
                    self.buffer.drain(..1);
                    self.ended = true;
                }
                _ => return,
            }
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

enum ValueBoundary {
    Complete(usize),
    Incomplete,
}

/// Finds the byte offset (exclusive) one past the end of the first
/// complete JSON value at the start of `buf`, or reports the buffer is too
/// short to tell.
fn find_value_end(buf: &str) -> ValueBoundary {
    let bytes = buf.as_bytes();
    let Some(&first) = bytes.first() else {
        return ValueBoundary::Incomplete;
    };

    match first {
        b'{' | b'[' => find_bracketed_end(buf),
        b'"' => find_string_end(buf, 0).map_or(ValueBoundary::Incomplete, ValueBoundary::Complete),
        _ => find_scalar_end(buf),
    }
}

fn find_bracketed_end(buf: &str) -> ValueBoundary {
    let bytes = buf.as_bytes();
    let mut depth: i32 = 0;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => match find_string_end(buf, i) {
                Some(end) => i = end,
                None => return ValueBoundary::Incomplete,
            },
            b'{' | b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b']' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return ValueBoundary::Complete(i);
                }
            }
            _ => i += 1,
        }
    }
    ValueBoundary::Incomplete
}

/// Given a byte index pointing at an opening `"`, finds the index one past
/// the matching unescaped closing `"`.
fn find_string_end(buf: &str, start: usize) -> Option<usize> {
    let bytes = buf.as_bytes();
    let mut i = start + 1;
    let mut escaped = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if !escaped => escaped = true,
            b'"' if !escaped => return Some(i + 1),
            _ => escaped = false,
        }
        i += 1;
    }
    None
}

/// Scans a bare literal (`true`, `false`, `null`, a number) until a
/// delimiter. If the buffer ends before a delimiter is seen, the literal
/// might still be mid-stream, so this reports `Incomplete`.
fn find_scalar_end(buf: &str) -> ValueBoundary {
    let bytes = buf.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b',' | b']' | b'}') || (b as char).is_whitespace() {
            if i == 0 {
                return ValueBoundary::Incomplete;
            }
            return ValueBoundary::Complete(i);
        }
    }
    ValueBoundary::Incomplete
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_whole_array_fed_in_one_chunk() {
        let mut decoder = StreamDecoder::new();
        let values = decoder.feed(br#"[{"a":1},{"b":"x"}]"#).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["a"], 1);
        assert_eq!(values[1]["b"], "x");
        assert!(decoder.is_ended());
    }

    #[test]
    fn decodes_array_split_across_arbitrary_chunks() {
        let mut decoder = StreamDecoder::new();
        let mut all = Vec::new();
        for chunk in [r#"[{"a""#, r#":1},{"b"#, r#"":"x"#, r#""}]"#] {
            all.extend(decoder.feed(chunk.as_bytes()).unwrap());
        }
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["a"], 1);
        assert_eq!(all[1]["b"], "x");
    }

    #[test]
    fn partial_prefix_yields_partial_sequence() {
        let mut decoder = StreamDecoder::new();
        let values = decoder.feed(br#"[{"a":1},{"b":"#).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["a"], 1);
    }

    #[test]
    fn malformed_json_is_fatal() {
        let mut decoder = StreamDecoder::new();
        let result = decoder.feed(br#"[{"a": }]"#);
        assert!(result.is_err());
    }

    #[test]
    fn string_values_with_escaped_brackets_do_not_confuse_depth_tracking() {
        let mut decoder = StreamDecoder::new();
        let values = decoder
            .feed(br#"[{"text":"has a \"}\" inside"}]"#)
            .unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["text"], "has a \"}\" inside");
    }

    #[test]
    fn feed_after_ended_returns_empty() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(br#"[{"a":1}]"#).unwrap();
        assert!(decoder.is_ended());
        let more = decoder.feed(br#"{"b":2}"#).unwrap();
        assert!(more.is_empty());
    }
}
