//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use instant_listen::config::ServerConfig;
use instant_listen::{AppServer, DeferredHandler, Shutdown};
use tokio::net::TcpListener;

/// Bind an ephemeral port and run an `AppServer` for `handler` in the background.
///
/// The server stops when the returned `Shutdown` is triggered or dropped.
#[allow(dead_code)]
pub async fn start_server(handler: DeferredHandler<Router>) -> (SocketAddr, Shutdown) {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = AppServer::new(config, handler);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// HTTP client that ignores proxy environment variables.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// A scratch site directory, removed on drop.
pub struct TempSite {
    root: PathBuf,
}

#[allow(dead_code)]
impl TempSite {
    pub fn new() -> Self {
        let root = std::env::temp_dir().join(format!("instant-listen-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, relative: &str, contents: &str) -> &Self {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        self
    }
}

impl Drop for TempSite {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}
