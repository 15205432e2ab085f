//! The stdio server.
//!
//! Reads one JSON-RPC request per line and writes one JSON message per
//! line: responses, plus `onChangeBatch` and `onLogMessage`
//! notifications as the watcher produces them.

use crate::handlers;
use crate::protocol::{Notification, Request, Response};
use canopy_watcher::{WatchBackend, WatchOutput, WatcherConfig, WatcherService};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Errors that end the server loop.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration for the server.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub watcher: WatcherConfig,
}

/// Serves one host over a pair of byte streams.
pub struct CanopyServer {
    service: WatcherService,
    outputs: mpsc::UnboundedReceiver<WatchOutput>,
}

impl CanopyServer {
    /// Creates a server backed by the native watcher.
    pub fn new(config: ServerConfig) -> Self {
        let (service, outputs) = WatcherService::native(config.watcher);
        Self { service, outputs }
    }

    /// Creates a server on top of another backend.
    pub fn with_backend(backend: Arc<dyn WatchBackend>, config: ServerConfig) -> Self {
        let (service, outputs) = WatcherService::spawn(backend, config.watcher);
        Self { service, outputs }
    }

    /// A handle to the underlying service.
    pub fn service(&self) -> WatcherService {
        self.service.clone()
    }

    /// Serves stdin/stdout until stdin closes.
    pub async fn run_stdio(self) -> Result<(), ServerError> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.run(stdin, tokio::io::stdout()).await
    }

    /// Serves until `reader` reaches end of input, then stops every
    /// watcher.
    pub async fn run<R, W>(mut self, reader: R, mut writer: W) -> Result<(), ServerError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        info!("Canopy server ready");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<Request>(&line) {
                        Ok(request) => handlers::handle(&self.service, request).await,
                        Err(e) => {
                            warn!("Failed to parse input: {}", e);
                            Some(Response::parse_error())
                        }
                    };
                    if let Some(response) = response {
                        send(&mut writer, &response).await?;
                    }
                }
                Some(output) = self.outputs.recv() => {
                    let notification = match &output {
                        WatchOutput::Changes(batch) => Notification::change_batch(batch),
                        WatchOutput::Log(message) => Notification::log_message(message),
                    };
                    send(&mut writer, &notification).await?;
                }
            }
        }

        let stopped = self.service.stop().await;
        info!("Input closed, stopped {} watcher(s)", stopped);
        Ok(())
    }
}

async fn send<W, T>(writer: &mut W, message: &T) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_vec(message)?;
    json.push(b'\n');
    writer.write_all(&json).await?;
    writer.flush().await?;
    Ok(())
}
