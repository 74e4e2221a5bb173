//! Control socket server: newline-delimited JSON over a Unix socket.
//!
//! One request object per line, one response object per line, matched by
//! request id. Connections are handled concurrently; a malformed line gets
//! an error response instead of dropping the connection.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::models::{WireRequest, WireResponse};
use crate::service::RelayService;

pub struct RelayServer {
    service: Arc<RelayService>,
    socket_path: PathBuf,
}

impl RelayServer {
    pub fn new(service: RelayService, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            service: Arc::new(service),
            socket_path: socket_path.into(),
        }
    }

    /// Bind the socket and serve until the process is terminated.
    pub async fn serve(self) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        cleanup_stale_socket(&self.socket_path)?;

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind {}", self.socket_path.display()))?;
        info!(socket = %self.socket_path.display(), "listening");

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, service).await {
                            warn!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Remove a leftover socket file, but only if nothing is listening on it.
pub fn cleanup_stale_socket(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => anyhow::bail!(
            "Socket {} is already in use by a running daemon",
            path.display()
        ),
        Err(_) => {
            warn!(socket = %path.display(), "removing stale socket");
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
            Ok(())
        }
    }
}

async fn handle_connection(stream: UnixStream, service: Arc<RelayService>) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => {
                debug!(id = %request.id, method = %request.method, "request");
                match service.dispatch(&request.method, request.params).await {
                    Ok(result) => WireResponse::ok(&request.id, result),
                    Err(e) => WireResponse::err(&request.id, format!("{:#}", e)),
                }
            }
            Err(e) => WireResponse::err("", format!("Invalid request: {}", e)),
        };
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
        write_half.flush().await?;
    }

    Ok(())
}
