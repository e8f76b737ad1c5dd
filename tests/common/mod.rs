//! Shared utilities for integration testing.

use std::net::SocketAddr;

use lendgate::config::AppConfig;
use lendgate::http::HttpServer;
use lendgate::lifecycle::Shutdown;
use lendgate::security::SecretKey;

/// Spawn a gateway on an ephemeral port, returning its address and the
/// shutdown coordinator that stops it.
pub async fn spawn_gateway(config: AppConfig) -> (SocketAddr, Shutdown) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config, SecretKey::ephemeral());
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (addr, shutdown)
}

/// Non-pooled client so each test drives fresh connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
