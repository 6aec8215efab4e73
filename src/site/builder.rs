//! Site preparation.
//!
//! # Responsibilities
//! - Walk the site directory (hidden entries and symlinks skipped)
//! - Load every file into memory, keyed by the routes it answers to
//! - Build the axum Router that serves the loaded pages

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};

use crate::site::pages::{content_type_for, normalize, routes_for, Page};

/// Options for [`prepare`].
#[derive(Debug, Clone)]
pub struct SiteOptions {
    /// Directory to serve.
    pub root: PathBuf,
    /// Development mode: responses are not cacheable.
    pub dev: bool,
}

/// Error type for site preparation.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("site root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

struct Site {
    pages: HashMap<String, Page>,
    cache_control: &'static str,
}

/// Load the site and build its router.
///
/// Returns `Ok(None)` when the directory contains no servable files.
pub async fn prepare(options: SiteOptions) -> Result<Option<Router>, SiteError> {
    let started = Instant::now();
    let root = options.root;

    let metadata = tokio::fs::metadata(&root).await.map_err(io_error(&root))?;
    if !metadata.is_dir() {
        return Err(SiteError::NotADirectory(root));
    }

    let mut pages = HashMap::new();
    let mut files = 0usize;
    let mut pending = vec![root.clone()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_error(&dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
            let path = entry.path();
            if is_hidden(&path) {
                continue;
            }

            let file_type = entry.file_type().await.map_err(io_error(&path))?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let routes = match path.strip_prefix(&root).ok().and_then(routes_for) {
                Some(routes) => routes,
                None => {
                    tracing::warn!(
                        path = %path.display(),
                        "Skipping file with unsupported name"
                    );
                    continue;
                }
            };

            let body = tokio::fs::read(&path).await.map_err(io_error(&path))?;
            let page = Page {
                body: Bytes::from(body),
                content_type: content_type_for(&path),
            };
            for route in routes {
                pages.insert(route, page.clone());
            }
            files += 1;
        }
    }

    if files == 0 {
        tracing::warn!(root = %root.display(), "Site directory has no pages");
        return Ok(None);
    }

    tracing::info!(
        root = %root.display(),
        files,
        dev = options.dev,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Site prepared"
    );

    let site = Arc::new(Site {
        pages,
        cache_control: if options.dev {
            "no-store"
        } else {
            "public, max-age=3600"
        },
    });

    Ok(Some(Router::new().fallback(serve_page).with_state(site)))
}

async fn serve_page(State(site): State<Arc<Site>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
        )
            .into_response();
    }

    let path = match urlencoding::decode(uri.path()) {
        Ok(path) => path,
        Err(_) => return (StatusCode::BAD_REQUEST, "Bad Request").into_response(),
    };

    match site.pages.get(normalize(&path)) {
        Some(page) => (
            [
                (header::CONTENT_TYPE, page.content_type),
                (header::CACHE_CONTROL, site.cache_control),
            ],
            Body::from(page.body.clone()),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SiteError + '_ {
    move |source| SiteError::Io {
        path: path.to_path_buf(),
        source,
    }
}
