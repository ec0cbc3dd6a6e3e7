//! HTTP surface entry point: builds `AppState`, wires routes, and serves
//! the dual-stack `localhost:` bind style of `crates/web/src/main.rs`
//! (SPEC_FULL.md §6).

use std::sync::Arc;

use assistgwcore::storage::Storage;
use assistgwcore::time::SystemNow;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::watch;

use crate::credential::CredentialCache;
use crate::media::MediaRelay;
use crate::orchestrator::ChatOrchestrator;
use crate::pool::AccountPool;
use crate::runtime_config;
use crate::session::SessionManager;

use super::{chat_completions, files};

pub struct AppState {
    pub pool: Arc<AccountPool>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub api_keys: Vec<String>,
}

pub fn build_router() -> std::io::Result<Router> {
    let storage = Storage::open(&runtime_config::db_path())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
    let now = Arc::new(SystemNow);
    let pool = Arc::new(
        AccountPool::new(storage, now.clone())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?,
    );
    let credentials = Arc::new(CredentialCache::new(now.clone()));
    let sessions = Arc::new(SessionManager::new(now.clone()));
    let relay = Arc::new(MediaRelay::new(pool.clone()));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        pool.clone(),
        credentials,
        sessions,
        relay,
        now,
    ));

    let state = Arc::new(AppState {
        pool,
        orchestrator,
        api_keys: runtime_config::configured_api_keys(),
    });

    Ok(Router::new()
        .route("/v1/chat/completions", post(chat_completions::handle))
        .route("/image/{filename}", get(files::serve_image))
        .route("/video/{filename}", get(files::serve_video))
        .with_state(state))
}

async fn serve_on_listener(
    listener: tokio::net::TcpListener,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
}

/// `localhost:<port>` may only resolve to one stack on some platforms;
/// binding both v4 and v6 explicitly avoids client-visible connection
/// failures.
async fn serve(addr: &str, app: Router, shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
    let trimmed = addr.trim();
    if trimmed.len() > "localhost:".len()
        && trimmed[.."localhost:".len()].eq_ignore_ascii_case("localhost:")
    {
        let port = &trimmed["localhost:".len()..];
        let v4 = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await;
        let v6 = tokio::net::TcpListener::bind(format!("[::1]:{port}")).await;
        return match (v4, v6) {
            (Ok(v4_listener), Ok(v6_listener)) => {
                let v4_task = serve_on_listener(v4_listener, app.clone(), shutdown_rx.clone());
                let v6_task = serve_on_listener(v6_listener, app, shutdown_rx);
                let (v4_result, v6_result) = tokio::join!(v4_task, v6_task);
                v4_result.and(v6_result)
            }
            (Ok(listener), Err(_)) | (Err(_), Ok(listener)) => {
                serve_on_listener(listener, app, shutdown_rx).await
            }
            (Err(err), Err(_)) => Err(err),
        };
    }

    let listener = tokio::net::TcpListener::bind(trimmed).await?;
    serve_on_listener(listener, app, shutdown_rx).await
}

pub async fn run(addr: &str) -> std::io::Result<()> {
    let app = build_router()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });
    log::info!("assistgw-gateway listening on {addr}");
    serve(addr, app, shutdown_rx).await
}
