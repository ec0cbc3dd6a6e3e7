//! Per-request tracing: a short id plus a size-capped body preview, logged
//! at request start and end. Grounded on `gateway/trace_log.rs`, minus its
//! background-thread file writer — that machinery exists there to feed an
//! admin UI's log viewer, which is out of scope here (SPEC_FULL.md "Request
//! tracing" keeps only the logging itself as an ambient-stack concern).

use uuid::Uuid;

pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn preview(body: &str) -> String {
    let max = crate::runtime_config::trace_body_preview_max_bytes();
    if max == 0 || body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

pub fn log_request_start(trace_id: &str, method: &str, path: &str, body_preview: &str) {
    log::info!(
        "trace_id={trace_id} start method={method} path={path} body={:?}",
        preview(body_preview)
    );
}

pub fn log_request_end(trace_id: &str, status: u16, duration_ms: u128) {
    log::info!("trace_id={trace_id} end status={status} duration_ms={duration_ms}");
}
