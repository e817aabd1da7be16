//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use strait::config::{BackendConfig, ProxyConfig, RouteConfig};
use strait::lifecycle::Shutdown;
use strait::net::Listener;
use strait::server::ProxyServer;

/// Read bytes one at a time until the blank line ending a message head.
/// Never over-reads, so body bytes stay on the socket.
pub async fn read_head(stream: &mut TcpStream) -> Vec<u8> {
    let mut data = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !data.ends_with(b"\r\n\r\n") {
        let read = stream.read(&mut byte).await.unwrap();
        assert!(
            read > 0,
            "peer closed before head completed: {:?}",
            String::from_utf8_lossy(&data)
        );
        data.push(byte[0]);
    }
    data
}

#[allow(dead_code)]
pub async fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

/// Start a mock backend that runs `script` on every accepted connection.
pub async fn start_script_backend<F, Fut>(script: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(script(socket));
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that reads one request head and answers with a fixed
/// response.
#[allow(dead_code)]
pub async fn start_fixed_backend(response: &'static str) -> SocketAddr {
    start_script_backend(move |mut socket| async move {
        let _ = read_head(&mut socket).await;
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    })
    .await
}

/// Like [`start_fixed_backend`], but also forwards each received request
/// head for assertions.
#[allow(dead_code)]
pub async fn start_capture_backend(
    response: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let addr = start_script_backend(move |mut socket| {
        let tx = tx.clone();
        async move {
            let head = read_head(&mut socket).await;
            let _ = tx.send(head);
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    })
    .await;
    (addr, rx)
}

/// A listener that only records whether anything ever connected.
#[allow(dead_code)]
pub async fn start_tripwire_backend() -> (SocketAddr, Arc<AtomicBool>) {
    let touched = Arc::new(AtomicBool::new(false));
    let flag = touched.clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if listener.accept().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    (addr, touched)
}

/// Spawn a proxy routing everything to `backend`. Returns the proxy
/// address and the shutdown handle keeping it alive.
#[allow(dead_code)]
pub async fn spawn_proxy(backend: SocketAddr) -> (SocketAddr, Shutdown) {
    spawn_proxy_with(backend, |_| {}).await
}

pub async fn spawn_proxy_with(
    backend: SocketAddr,
    tweak: impl FnOnce(&mut ProxyConfig),
) -> (SocketAddr, Shutdown) {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backends.push(BackendConfig {
        name: "b1".into(),
        address: backend.to_string(),
        host_header: None,
    });
    config.routes.push(RouteConfig {
        name: "r1".into(),
        host: None,
        path_prefix: Some("/".into()),
        backend: "b1".into(),
        priority: 0,
    });
    tweak(&mut config);

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = ProxyServer::new(config).unwrap();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    (addr, shutdown)
}
