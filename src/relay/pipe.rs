//! Post-upgrade byte pipe.
//!
//! After an honored `101 Switching Protocols` the two sockets stop being
//! HTTP: whatever either side sends is written to the other until one
//! closes or the idle timeout fires. Residual bytes buffered on either
//! side during header processing are flushed first so nothing is lost at
//! the switch.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

const PIPE_BUF: usize = 16 * 1024;

/// Why the pipe stopped shuttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
    ClientClosed,
    BackendClosed,
    Idle,
}

/// Shuttle bytes between the two sockets.
///
/// `head` is the encoded 101 response head; it and `backend_residual` go
/// to the client before the loop starts, `client_residual` goes to the
/// backend. Both sockets are shut down before returning.
pub async fn run(
    mut client: TcpStream,
    client_residual: Bytes,
    mut backend: TcpStream,
    backend_residual: Bytes,
    head: Vec<u8>,
    idle: Duration,
) -> io::Result<(PipeEnd, u64, u64)> {
    client.write_all(&head).await?;
    if !backend_residual.is_empty() {
        client.write_all(&backend_residual).await?;
    }
    if !client_residual.is_empty() {
        backend.write_all(&client_residual).await?;
    }

    let mut from_client = client_residual.len() as u64;
    let mut from_backend = backend_residual.len() as u64;
    let mut client_buf = [0u8; PIPE_BUF];
    let mut backend_buf = [0u8; PIPE_BUF];

    let end = loop {
        // Both reads are cancel-safe, so racing them under one idle
        // deadline loses no bytes.
        let event = time::timeout(idle, async {
            tokio::select! {
                read = client.read(&mut client_buf) => Flow::FromClient(read),
                read = backend.read(&mut backend_buf) => Flow::FromBackend(read),
            }
        })
        .await;

        match event {
            Err(_) => break PipeEnd::Idle,
            Ok(Flow::FromClient(read)) => match read? {
                0 => break PipeEnd::ClientClosed,
                n => {
                    backend.write_all(&client_buf[..n]).await?;
                    from_client += n as u64;
                }
            },
            Ok(Flow::FromBackend(read)) => match read? {
                0 => break PipeEnd::BackendClosed,
                n => {
                    client.write_all(&backend_buf[..n]).await?;
                    from_backend += n as u64;
                }
            },
        }
    };

    let _ = client.shutdown().await;
    let _ = backend.shutdown().await;

    Ok((end, from_client, from_backend))
}

enum Flow {
    FromClient(io::Result<usize>),
    FromBackend(io::Result<usize>),
}
