//! Page records and path helpers.

use std::path::{Component, Path};

use axum::body::Bytes;

/// A file loaded into memory.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: Bytes,
    pub content_type: &'static str,
}

/// MIME type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Routes a file under the site root answers to.
///
/// Every file answers to its own path. `index.html` also answers to its
/// directory. Returns `None` for paths that are not plain UTF-8 components.
pub fn routes_for(relative: &Path) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_str()?),
            _ => return None,
        }
    }

    let file_route = format!("/{}", segments.join("/"));
    let mut routes = vec![file_route];

    if segments.last() == Some(&"index.html") {
        let dir = &segments[..segments.len() - 1];
        routes.push(format!("/{}", dir.join("/")));
    }

    Some(routes)
}

/// Normalize a request path for lookup: drop trailing slashes except on `/`.
pub fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_answers_for_directory() {
        assert_eq!(
            routes_for(Path::new("index.html")).unwrap(),
            vec!["/index.html".to_string(), "/".to_string()]
        );
        assert_eq!(
            routes_for(Path::new("docs/index.html")).unwrap(),
            vec!["/docs/index.html".to_string(), "/docs".to_string()]
        );
    }

    #[test]
    fn plain_file_has_single_route() {
        assert_eq!(
            routes_for(Path::new("assets/app.js")).unwrap(),
            vec!["/assets/app.js".to_string()]
        );
    }

    #[test]
    fn parent_components_rejected() {
        assert!(routes_for(Path::new("../secret.txt")).is_none());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a/b.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("logo.svg")), "image/svg+xml");
        assert_eq!(content_type_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn normalize_trims_trailing_slash() {
        assert_eq!(normalize("/docs/"), "/docs");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("///"), "/");
    }
}
