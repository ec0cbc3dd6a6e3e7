//! Upstream HTTP calls, bit-exact per SPEC_FULL.md §6. Headers are grounded
//! on `examples/original_source/app/session_manager.py`'s `get_headers`.

use assistgwcore::error::{GatewayError, Result};
use assistgwcore::model::Account;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::runtime_config::upstream_client;

const UPSTREAM_HOST: &str = "business.gemini.google";
const UPSTREAM_API_HOST: &str = "biz-discoveryengine.googleapis.com";

/// Base URL (scheme + host) for the auth host, overridable in tests via
/// `ASSISTGW_UPSTREAM_HOST_BASE_URL` so a `wiremock::MockServer` can stand
/// in for `business.gemini.google`.
fn upstream_base_url() -> String {
    crate::runtime_config::upstream_host_base_url_override()
        .unwrap_or_else(|| format!("https://{UPSTREAM_HOST}"))
}

/// Same as `upstream_base_url`, for the `biz-discoveryengine.googleapis.com`
/// API host.
fn upstream_api_base_url() -> String {
    crate::runtime_config::upstream_api_host_base_url_override()
        .unwrap_or_else(|| format!("https://{UPSTREAM_API_HOST}"))
}
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
/// The upstream OXSRF JSON response is prefixed with this anti-hijack
/// marker before the actual JSON body (SPEC_FULL.md §4.2/§6).
const ANTI_HIJACK_PREFIX: &str = ")]}'";

fn headers(jwt: Option<&str>, user_agent: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("accept", HeaderValue::from_static("*/*"));
    headers.insert("accept-encoding", HeaderValue::from_static("gzip, deflate, br"));
    headers.insert("accept-language", HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(
        "content-type",
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        "origin",
        HeaderValue::from_static("https://business.gemini.google"),
    );
    headers.insert(
        "referer",
        HeaderValue::from_str(&format!("https://{UPSTREAM_HOST}/")).unwrap(),
    );
    headers.insert(
        "x-server-timeout",
        HeaderValue::from_static("1800"),
    );
    let ua = user_agent.unwrap_or(DEFAULT_USER_AGENT);
    if let Ok(value) = HeaderValue::from_str(ua) {
        headers.insert("user-agent", value);
    }
    if let Some(jwt) = jwt {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {jwt}")) {
            headers.insert("authorization", value);
        }
    }
    headers
}

fn cookie_header(account: &Account) -> (HeaderName, HeaderValue) {
    let raw = format!(
        "__Secure-C_SES={}; __Host-C_OSES={}",
        account.session_cookie, account.host_cookie
    );
    (
        HeaderName::from_static("cookie"),
        HeaderValue::from_str(&raw).unwrap_or_else(|_| HeaderValue::from_static("")),
    )
}

/// GET the short-lived bearer JWT for an account's cookies
/// (SPEC_FULL.md §4.2/§6).
pub async fn fetch_jwt(account: &Account) -> Result<String> {
    let mut hdrs = headers(None, account.user_agent.as_deref());
    let (name, value) = cookie_header(account);
    hdrs.insert(name, value);

    let url = format!("{}/auth/getoxsrf?csesidx={}", upstream_base_url(), account.session_index);
    let response = upstream_client()
        .get(&url)
        .headers(hdrs)
        .send()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;
    if status != 200 {
        return Err(classify_transport_status(status, &body));
    }

    let stripped = body
        .strip_prefix(ANTI_HIJACK_PREFIX)
        .map(|rest| rest.trim_start_matches('\n'))
        .unwrap_or(&body);

    let parsed: Value = serde_json::from_str(stripped)
        .map_err(|err| GatewayError::AccountAuthError(format!("malformed oxsrf body: {err}")))?;
    match parsed.get("keyId").and_then(Value::as_str) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(GatewayError::AccountAuthError("missing keyId".to_string())),
    }
}

fn classify_transport_status(status: u16, body: &str) -> GatewayError {
    match status {
        401 | 403 => GatewayError::AccountAuthError(body.chars().take(200).collect()),
        429 => GatewayError::AccountRateLimit(body.chars().take(200).collect()),
        _ => GatewayError::AccountTransient(format!("status {status}: {}", body.chars().take(200).collect::<String>())),
    }
}

/// Creates a fresh upstream conversation session (SPEC_FULL.md §4.3/§6).
pub async fn create_session(
    jwt: &str,
    user_agent: Option<&str>,
    config_id: &str,
    display_name: &str,
) -> Result<String> {
    let body = json!({
        "configId": config_id,
        "additionalParams": {"token": "-"},
        "createSessionRequest": {
            "session": {"name": display_name, "displayName": display_name}
        }
    });
    let url = format!("{}/v1alpha/locations/global/widgetCreateSession", upstream_api_base_url());
    let response = upstream_client()
        .post(&url)
        .headers(headers(Some(jwt), user_agent))
        .json(&body)
        .send()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;

    let status = response.status().as_u16();
    let parsed: Value = response
        .json()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;
    if status != 200 {
        return Err(classify_transport_status(status, &parsed.to_string()));
    }
    parsed
        .pointer("/session/name")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| GatewayError::Internal("missing session.name in create-session response".to_string()))
}

/// Issues the streaming assist POST; the caller drives `StreamDecoder` over
/// the byte stream of the returned response (SPEC_FULL.md §4.5/§4.6/§6).
pub async fn stream_assist(
    jwt: &str,
    user_agent: Option<&str>,
    config_id: &str,
    session: &str,
    query_text: &str,
    file_ids: &[String],
    tools_spec: &Value,
    language_code: &str,
    time_zone: &str,
    assist_generation_config: Option<&Value>,
) -> Result<reqwest::Response> {
    let mut request_body = json!({
        "configId": config_id,
        "streamAssistRequest": {
            "session": session,
            "query": {"parts": [{"text": query_text}]},
            "fileIds": file_ids,
            "answerGenerationMode": "NORMAL",
            "toolsSpec": tools_spec,
            "languageCode": language_code,
            "userMetadata": {"timeZone": time_zone},
            "assistSkippingMode": "REQUEST_ASSIST",
        }
    });
    if let Some(config) = assist_generation_config {
        request_body["streamAssistRequest"]["assistGenerationConfig"] = config.clone();
    }

    let url = format!("{}/v1alpha/locations/global/widgetStreamAssist", upstream_api_base_url());
    let response = upstream_client()
        .post(&url)
        .headers(headers(Some(jwt), user_agent))
        .json(&request_body)
        .send()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;

    let status = response.status().as_u16();
    if status != 200 {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_transport_status(status, &body));
    }
    Ok(response)
}

/// Uploads an inline client-supplied file as upstream context
/// (SPEC_FULL.md §4.6 step 6/§6).
pub async fn add_context_file(
    jwt: &str,
    user_agent: Option<&str>,
    config_id: &str,
    session: &str,
    file_contents_b64: &str,
    file_name: &str,
    mime_type: &str,
) -> Result<String> {
    let body = json!({
        "addContextFileRequest": {
            "fileContents": file_contents_b64,
            "fileName": file_name,
            "mimeType": mime_type,
            "name": session,
        },
        "additionalParams": {"token": "-"},
        "configId": config_id,
    });
    let url = format!("{}/v1alpha/locations/global/widgetAddContextFile", upstream_api_base_url());
    let response = upstream_client()
        .post(&url)
        .headers(headers(Some(jwt), user_agent))
        .json(&body)
        .send()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;

    let status = response.status().as_u16();
    let parsed: Value = response
        .json()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;
    if status != 200 {
        return Err(classify_transport_status(status, &parsed.to_string()));
    }
    parsed
        .pointer("/addContextFileResponse/fileId")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| GatewayError::Internal("missing fileId in add-context-file response".to_string()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileMetadata {
    #[serde(rename = "fileId")]
    pub file_id: String,
    pub name: Option<String>,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// Lists file metadata for the session, memoized once per chat turn by the
/// caller (SPEC_FULL.md §4.7/§6).
pub async fn list_session_file_metadata(
    jwt: &str,
    user_agent: Option<&str>,
    config_id: &str,
    session: &str,
) -> Result<Vec<FileMetadata>> {
    let body = json!({
        "configId": config_id,
        "listSessionFileMetadataRequest": {"session": session},
    });
    let url = format!("{}/v1alpha/locations/global/widgetListSessionFileMetadata", upstream_api_base_url());
    let response = upstream_client()
        .post(&url)
        .headers(headers(Some(jwt), user_agent))
        .json(&body)
        .send()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;

    let status = response.status().as_u16();
    let parsed: Value = response
        .json()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;
    if status != 200 {
        return Err(classify_transport_status(status, &parsed.to_string()));
    }
    let files = parsed
        .get("files")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        if let Ok(meta) = serde_json::from_value::<FileMetadata>(file) {
            out.push(meta);
        }
    }
    Ok(out)
}

/// Streams raw media bytes for a file reference (SPEC_FULL.md §4.7/§6).
/// Must use a streaming transport; callers must never fully buffer a video.
pub async fn download_file(
    jwt: &str,
    user_agent: Option<&str>,
    session: &str,
    file_id: &str,
) -> Result<reqwest::Response> {
    let url = format!(
        "{}/v1alpha/{session}:downloadFile?fileId={}&alt=media",
        upstream_api_base_url(),
        urlencoding::encode(file_id)
    );
    let response = upstream_client()
        .get(&url)
        .headers(headers(Some(jwt), user_agent))
        .send()
        .await
        .map_err(|err| GatewayError::AccountTransient(err.to_string()))?;
    let status = response.status().as_u16();
    if status != 200 {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_transport_status(status, &body));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anti_hijack_prefix_is_stripped() {
        let raw = format!("{ANTI_HIJACK_PREFIX}\n{{\"keyId\":\"abc\"}}");
        let stripped = raw
            .strip_prefix(ANTI_HIJACK_PREFIX)
            .map(|rest| rest.trim_start_matches('\n'))
            .unwrap();
        let parsed: Value = serde_json::from_str(stripped).unwrap();
        assert_eq!(parsed["keyId"], "abc");
    }

    #[test]
    fn classify_transport_status_maps_auth_and_rate_limit() {
        assert!(matches!(
            classify_transport_status(401, "nope"),
            GatewayError::AccountAuthError(_)
        ));
        assert!(matches!(
            classify_transport_status(429, "slow down"),
            GatewayError::AccountRateLimit(_)
        ));
        assert!(matches!(
            classify_transport_status(500, "boom"),
            GatewayError::AccountTransient(_)
        ));
    }
}
