//! Unix socket transport: one connection, one message, one response.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::debug;

use crate::config::Config;
use crate::discovery::{Discovery, DiscoveryFilter};
use crate::error::{IpcError, Result};
use crate::protocol::{wire, Message, Response};

/// Resolve the target socket and perform the single exchange.
///
/// An explicit `path` wins over discovery. When discovery comes up empty the
/// call fails with [`IpcError::NoMatch`] before any connection is attempted.
pub async fn resolve_and_send(
    config: &Config,
    path: Option<PathBuf>,
    filter: &DiscoveryFilter,
    message: &Message,
) -> Result<Response> {
    let path = match path {
        Some(path) => path,
        None => Discovery::from_config(config)
            .resolve(filter)
            .await?
            .ok_or(IpcError::NoMatch)?,
    };
    send_message(config, &path, message).await
}

/// Send one message over the socket at `path` and read the response.
///
/// The stream is owned by this call and dropped on every exit path. There is
/// no retry; any failure fails the whole invocation.
pub async fn send_message(config: &Config, path: &Path, message: &Message) -> Result<Response> {
    let mut stream = connect(path, config.timeouts.connect()).await?;
    debug!("connected to {}", path.display());

    wire::write_message(&mut stream, message).await?;

    match tokio::time::timeout(config.timeouts.request(), wire::read_response(&mut stream)).await {
        Ok(result) => result,
        Err(_) => Err(IpcError::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out waiting for response",
        ))),
    }
}

async fn connect(path: &Path, timeout: Duration) -> Result<UnixStream> {
    match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(classify_connect_error(err, path)),
        Err(_) => Err(IpcError::Transport(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connection timed out",
        ))),
    }
}

fn classify_connect_error(err: std::io::Error, path: &Path) -> IpcError {
    match err.kind() {
        std::io::ErrorKind::NotFound => IpcError::EndpointNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => IpcError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => IpcError::Transport(err),
    }
}
