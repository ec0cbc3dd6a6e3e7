//! End-to-end: binds `build_router()` to a real listener and drives the
//! `/v1/chat/completions` route against a `wiremock` double standing in
//! for the upstream auth/session/assist hosts, mirroring
//! `crates/service/tests/e2e.rs`'s "real server, real client" shape.

use assistgwcore::model::Account;
use assistgwcore::storage::Storage;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct EnvGuard {
    key: &'static str,
    original: Option<std::ffi::OsString>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let original = std::env::var_os(key);
        std::env::set_var(key, value);
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.original {
            Some(value) => std::env::set_var(self.key, value),
            None => std::env::remove_var(self.key),
        }
    }
}

fn seed_account(db_path: &str) {
    let storage = Storage::open(db_path).expect("open seed db");
    storage
        .upsert_account(&Account {
            id: "acct-1".to_string(),
            session_cookie: "sc".to_string(),
            host_cookie: "hc".to_string(),
            session_index: "0".to_string(),
            config_id: "cfg-1".to_string(),
            user_agent: None,
            enabled: true,
            temp_mail_url: None,
            last_cookie_refresh_at: None,
            sort: 0,
        })
        .expect("seed account");
}

#[tokio::test]
async fn chat_completions_round_trips_through_mocked_upstream() {
    let upstream = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/getoxsrf"))
        .respond_with(ResponseTemplate::new(200).set_body_string(")]}'\n{\"keyId\":\"jwt-123\"}"))
        .mount(&upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1alpha/locations/global/widgetCreateSession"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session": {"name": "sessions/abc"}
        })))
        .mount(&upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1alpha/locations/global/widgetStreamAssist"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"streamAssistResponse":{"sessionInfo":{"session":"sessions/abc"},"answer":{"replies":[{"groundedContent":{"content":{"text":"hello from upstream"}}}]}}}]"#,
        ))
        .mount(&upstream)
        .await;

    let mut db_path = std::env::temp_dir();
    db_path.push(format!("assistgw-e2e-{}.db", std::process::id()));
    let mut media_dir = std::env::temp_dir();
    media_dir.push(format!("assistgw-e2e-media-{}", std::process::id()));
    std::fs::create_dir_all(&media_dir).expect("create media cache dir");
    seed_account(db_path.to_str().expect("utf8 path"));

    let _db_guard = EnvGuard::set("ASSISTGW_DB_PATH", db_path.to_str().unwrap());
    let _media_guard = EnvGuard::set("ASSISTGW_MEDIA_CACHE_DIR", media_dir.to_str().unwrap());
    let _host_guard = EnvGuard::set("ASSISTGW_UPSTREAM_HOST_BASE_URL", &upstream.uri());
    let _api_host_guard = EnvGuard::set("ASSISTGW_UPSTREAM_API_HOST_BASE_URL", &upstream.uri());

    let router = assistgw_gateway::http::server::build_router().expect("build router");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/v1/chat/completions"))
        .json(&json!({
            "model": "gemini-pro",
            "stream": false,
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .send()
        .await
        .expect("send request");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("parse json body");
    assert_eq!(
        body.pointer("/choices/0/message/content").and_then(|v| v.as_str()),
        Some("hello from upstream")
    );

    let _ = std::fs::remove_file(&db_path);
    let _ = std::fs::remove_dir_all(&media_dir);
}
