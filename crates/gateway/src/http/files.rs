//! `GET /image/{filename}`, `GET /video/{filename}` — serves files written
//! by `MediaRelay`'s local-cache mode (SPEC_FULL.md §4.7, §6). Unauthenticated
//! by design: the filename is an unguessable random hex id.

use std::path::{Path, PathBuf};

use axum::extract::Path as AxumPath;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::runtime_config;

pub async fn serve_image(AxumPath(filename): AxumPath<String>) -> Response {
    serve_cached("image", &filename).await
}

pub async fn serve_video(AxumPath(filename): AxumPath<String>) -> Response {
    serve_cached("video", &filename).await
}

async fn serve_cached(kind_dir: &str, filename: &str) -> Response {
    if filename.contains('/') || filename.contains("..") {
        return (StatusCode::BAD_REQUEST, "bad filename").into_response();
    }

    let path: PathBuf = Path::new(&runtime_config::media_cache_dir())
        .join(kind_dir)
        .join(filename);

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess_for_ext(path.extension().and_then(|e| e.to_str()).unwrap_or(""));
            let mut response = Response::new(axum::body::Body::from(bytes));
            response.headers_mut().insert(
                "content-type",
                axum::http::HeaderValue::from_static(mime),
            );
            response
        }
        Err(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

fn mime_guess_for_ext(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}
